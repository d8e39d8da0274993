//! SessionController — Spin lifecycle state machine
//!
//! ```text
//!            spin(bet)                 all reels stopped
//!   Idle ─────────────────> Spinning ─────────────────────> Presenting
//!    ^  <───── stop ────────┘   │                          │  │  ^
//!    │  <── no result / abort ──┘                          │  └──┘ gamble (won)
//!    │  <──── all reels stopped (small / no win) ──┘       │
//!    └──────────────── collect / gamble lost / skip ───────┘
//! ```
//!
//! The controller never awaits while holding its own state. `spin()` hands
//! out a `PendingSpin` ticket; whoever owns the controller awaits it and
//! delivers the `EngineReply`. Replies for a superseded spin are rejected.
//!
//! A spin requested while presenting runs the skip sequence first: the
//! rendering layer receives a `SkipToken`, fades out, returns the token via
//! `complete_skip`, and only then is the queued bet placed.

use std::future::Future;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use rf_stage::{StageTimeline, StagePayload};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::engine::{EngineContext, SlotEngine};
use crate::error::{ConfigurationError, SessionError, SessionResult};
use crate::gamble::{Gamble, GambleChoice, GambleOutcome};
use crate::jackpot::{JackpotAward, JackpotLedger, JackpotSnapshot};
use crate::render::{RenderSink, SkipToken};
use crate::scheduler::{TriggerLane, VisualSyncScheduler};
use crate::spin::{ForcedOutcome, SpinResult};
use crate::win_tiers::{WinTierClassifier, WinTierResult};

/// Controller state visible to the rendering layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    /// Reels animating, triggers firing
    Spinning,
    /// Win presentation visible, awaiting collect / gamble / skip
    Presenting,
}

/// Outcome of a spin request
#[derive(Debug)]
pub enum SpinStart<P> {
    /// Bet placed; await the ticket and deliver its reply
    Started(PendingSpin<P>),
    /// A presentation is fading out; the spin starts from `complete_skip`
    SkipRequested,
}

impl<P> SpinStart<P> {
    pub fn into_pending(self) -> Option<PendingSpin<P>> {
        match self {
            Self::Started(pending) => Some(pending),
            Self::SkipRequested => None,
        }
    }
}

/// Ticket for an engine result in flight
#[derive(Debug)]
pub struct PendingSpin<P> {
    generation: u64,
    future: P,
}

impl<P> PendingSpin<P>
where
    P: Future<Output = Option<SpinResult>>,
{
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Await the engine. Does not touch the controller.
    pub async fn wait(self) -> EngineReply {
        let result = self.future.await;
        EngineReply {
            generation: self.generation,
            result,
        }
    }
}

/// Engine answer for one spin generation
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReply {
    pub generation: u64,
    pub result: Option<SpinResult>,
}

/// Cursor position in the active timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageProgress {
    pub cursor: Option<usize>,
    pub len: usize,
    /// 0.0 before the first stage, 1.0 once the last one fired
    pub fraction: f64,
}

#[derive(Debug)]
struct ActiveSpin {
    generation: u64,
    bet: f64,
    result_arrived: bool,
    presents: bool,
}

#[derive(Debug)]
struct QueuedSpin {
    skip_id: u64,
    bet: f64,
    forced: Option<ForcedOutcome>,
}

/// Top-level session state machine
pub struct SessionController<E, S, C> {
    config: SessionConfig,
    context: EngineContext<E>,
    sink: S,
    clock: C,

    classifier: WinTierClassifier,
    ledger: JackpotLedger,
    timeline: StageTimeline,
    scheduler: VisualSyncScheduler,
    gamble: Gamble,

    state: SessionState,
    balance: f64,
    pending_win: f64,
    turbo: bool,

    spin: Option<ActiveSpin>,
    queued: Option<QueuedSpin>,
    current_result: Option<SpinResult>,
    tier_result: Option<WinTierResult>,
    last_jackpot: Option<JackpotAward>,

    generation: u64,
    next_skip_id: u64,
    last_tick_ms: u64,
}

impl<E, S, C> SessionController<E, S, C>
where
    E: SlotEngine,
    S: RenderSink,
    C: Clock,
{
    /// Validate `config` and build the controller. The engine context's
    /// lifecycle stays with the caller.
    pub fn new(
        config: SessionConfig,
        context: EngineContext<E>,
        sink: S,
        clock: C,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let classifier = WinTierClassifier::new(config.tiers.clone())?;
        let ledger = JackpotLedger::new(config.jackpots.clone())?;
        let scheduler = VisualSyncScheduler::new(config.reel_timing.clone(), config.reel_count);
        let gamble = Gamble::new(config.gamble.clone());
        let last_tick_ms = clock.now_ms();

        Ok(Self {
            balance: config.starting_balance,
            turbo: config.turbo,
            config,
            context,
            sink,
            clock,
            classifier,
            ledger,
            timeline: StageTimeline::new(),
            scheduler,
            gamble,
            state: SessionState::Idle,
            pending_win: 0.0,
            spin: None,
            queued: None,
            current_result: None,
            tier_result: None,
            last_jackpot: None,
            generation: 0,
            next_skip_id: 0,
            last_tick_ms,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SPIN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Request a spin. Rejections leave balance and state untouched.
    pub fn spin(&mut self, bet: f64) -> SessionResult<SpinStart<E::Pending>> {
        self.request_spin(bet, None)
    }

    /// Request a spin with an engine-forced outcome
    pub fn spin_forced(&mut self, outcome: ForcedOutcome, bet: f64) -> SessionResult<SpinStart<E::Pending>> {
        self.request_spin(bet, Some(outcome))
    }

    fn request_spin(&mut self, bet: f64, forced: Option<ForcedOutcome>) -> SessionResult<SpinStart<E::Pending>> {
        if !(bet.is_finite() && bet > 0.0) {
            return Err(SessionError::InvalidBet(bet));
        }

        match self.state {
            SessionState::Spinning => {
                warn!("Spin rejected: already spinning");
                Err(SessionError::AlreadySpinning)
            }
            SessionState::Presenting => {
                if self.queued.is_some() {
                    return Err(SessionError::SkipInProgress);
                }
                self.check_can_spin(bet, self.balance + self.pending_win)?;

                self.next_skip_id += 1;
                let skip_id = self.next_skip_id;
                if self.sink.request_skip_presentation(SkipToken::new(skip_id)).is_err() {
                    warn!("Skip {} could not be requested, presentation kept", skip_id);
                    return Err(SessionError::RenderUnavailable);
                }
                self.queued = Some(QueuedSpin { skip_id, bet, forced });
                info!("Skip {} requested before spin (bet {:.2})", skip_id, bet);
                Ok(SpinStart::SkipRequested)
            }
            SessionState::Idle => {
                self.check_can_spin(bet, self.balance)?;
                Ok(SpinStart::Started(self.begin_spin(bet, forced)))
            }
        }
    }

    fn check_can_spin(&self, bet: f64, available: f64) -> SessionResult<()> {
        if !self.context.is_ready() {
            warn!("Spin rejected: engine not ready");
            return Err(SessionError::NotReady);
        }
        if bet > available {
            warn!("Spin rejected: bet {:.2} exceeds balance {:.2}", bet, available);
            return Err(SessionError::InsufficientFunds {
                bet,
                balance: available,
            });
        }
        Ok(())
    }

    /// Funds and readiness already checked
    fn begin_spin(&mut self, bet: f64, forced: Option<ForcedOutcome>) -> PendingSpin<E::Pending> {
        // Old triggers go before anything new is planned
        self.scheduler.cancel_all();
        self.timeline.clear();
        self.current_result = None;
        self.tier_result = None;
        self.last_jackpot = None;
        self.pending_win = 0.0;
        self.gamble.reset();

        self.balance -= bet;
        self.generation += 1;
        self.spin = Some(ActiveSpin {
            generation: self.generation,
            bet,
            result_arrived: false,
            presents: false,
        });

        self.last_tick_ms = self.clock.now_ms();
        self.ledger.begin_contribution(bet);
        self.scheduler.schedule(self.config.reel_count, self.turbo);
        self.set_state(SessionState::Spinning);

        info!(
            "Spin {} started: bet {:.2}, balance {:.2}{}",
            self.generation,
            bet,
            self.balance,
            forced.map(|o| format!(", forced {}", o.name())).unwrap_or_default()
        );

        PendingSpin {
            generation: self.generation,
            future: self.context.spin(bet, forced),
        }
    }

    /// Await a ticket and deliver its reply
    pub async fn await_result(&mut self, pending: PendingSpin<E::Pending>) -> SessionResult<()> {
        let reply = pending.wait().await;
        self.deliver_result(reply)
    }

    /// Hand the engine's reply to the controller.
    ///
    /// Classifies the win, settles jackpots and arms the reel triggers from
    /// now. A missing result refunds the bet; an invalid win or a bad stage
    /// sequence aborts the spin. Both return the controller to `Idle` and
    /// report the error.
    pub fn deliver_result(&mut self, reply: EngineReply) -> SessionResult<()> {
        let EngineReply { generation, result } = reply;
        let bet = match &self.spin {
            Some(spin) if spin.generation == generation && !spin.result_arrived => spin.bet,
            _ => {
                warn!("Ignoring result for stale spin generation {}", generation);
                return Err(SessionError::StaleResult { generation });
            }
        };

        // Growth runs up to the arrival, then stops before any award is evaluated
        self.accrue_until(self.clock.now_ms());
        self.ledger.stop_contribution();

        let Some(mut result) = result else {
            warn!("Engine returned no result for spin {}, bet refunded", generation);
            self.balance += bet;
            self.finish_spin();
            return Err(SessionError::NoResult { generation });
        };

        if !(result.total_win.is_finite() && result.total_win >= 0.0) {
            return Err(self.abort_spin(SessionError::InvalidWin(result.total_win)));
        }

        let stages = std::mem::take(&mut result.stages);
        if let Err(e) = self.timeline.load(stages) {
            return Err(self.abort_spin(e.into()));
        }

        let tier = match self.classifier.classify(result.total_win, bet) {
            Ok(tier) => tier,
            Err(e) => return Err(self.abort_spin(e.into())),
        };

        // Nothing is paid out until the stage sequence is accepted
        let award_tier = self.ledger.select_award(tier.multiplier);
        let presents = award_tier.is_some()
            || (result.is_win && !tier.is_empty() && tier.multiplier >= self.config.presentation_threshold);
        let anticipate = award_tier.is_some() || tier.multiplier >= self.config.anticipation_threshold;

        if let Err(e) = self.scheduler.load_stages(self.timeline.stages(), anticipate) {
            return Err(self.abort_spin(e));
        }

        let jackpot = match award_tier.map(|tier| (tier, self.ledger.award(tier))) {
            Some((tier, Ok(amount))) => Some(JackpotAward { tier, amount }),
            Some((_, Err(e))) => return Err(self.abort_spin(e.into())),
            None => None,
        };

        if result.big_win_tier.is_big_win() != tier.is_big_win {
            debug!(
                "Engine hint {:?} disagrees with classified tier {:?}",
                result.big_win_tier,
                tier.display_label()
            );
        }
        info!(
            "Spin {} result: win {:.2} ({:.2}x, {}){}",
            generation,
            result.total_win,
            tier.multiplier,
            tier.display_label().unwrap_or("no win"),
            jackpot
                .map(|j| format!(", jackpot {} {:.2}", j.tier.display_name(), j.amount))
                .unwrap_or_default()
        );

        self.pending_win = result.total_win + jackpot.map_or(0.0, |j| j.amount);
        self.tier_result = Some(tier);
        self.last_jackpot = jackpot;
        self.current_result = Some(result);
        if let Some(spin) = self.spin.as_mut() {
            spin.result_arrived = true;
            spin.presents = presents;
        }

        let now = self.clock.now_ms();
        self.scheduler.arm(now);
        self.fire_due(now);
        Ok(())
    }

    /// Stop the reels before the result arrives. The bet is not refunded.
    pub fn stop(&mut self) -> SessionResult<()> {
        match &self.spin {
            Some(spin) if self.state == SessionState::Spinning => {
                if spin.result_arrived {
                    return Err(SessionError::StopAfterResult);
                }
            }
            _ => return Err(SessionError::NotSpinning),
        }

        self.accrue_until(self.clock.now_ms());
        self.ledger.stop_contribution();
        info!("Spin {} stopped", self.generation);
        self.finish_spin();
        Ok(())
    }

    fn abort_spin(&mut self, error: SessionError) -> SessionError {
        warn!("Spin {} aborted: {}", self.generation, error);
        self.timeline.clear();
        self.tier_result = None;
        self.last_jackpot = None;
        self.pending_win = 0.0;
        self.finish_spin();
        error
    }

    /// Cancel triggers, forget the spin, back to `Idle`
    fn finish_spin(&mut self) {
        self.scheduler.cancel_all();
        self.ledger.stop_contribution();
        self.spin = None;
        self.set_state(SessionState::Idle);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CLOCK
    // ═══════════════════════════════════════════════════════════════════════════

    /// Advance to the clock's current time: accrue jackpots and fire every
    /// due trigger. Returns the number of triggers fired.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.accrue_until(now);
        self.fire_due(now)
    }

    fn accrue_until(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.last_tick_ms);
        self.last_tick_ms = now;

        if self.ledger.is_contributing() && elapsed > 0 {
            self.ledger
                .tick(elapsed as f64 / self.config.jackpot_tick_ms as f64);
        }
    }

    fn fire_due(&mut self, now: u64) -> usize {
        let fired = self.scheduler.pop_due(now);
        let count = fired.len();

        for mut trigger in fired {
            if let Some(index) = trigger.stage_index {
                if self.timeline.cursor().is_none_or(|c| index > c) {
                    // Triggers are built from the loaded timeline
                    let advanced = self.timeline.advance_to(index).map(|_| ());
                    debug_assert!(advanced.is_ok(), "trigger outside the timeline: {advanced:?}");
                    if let Err(e) = advanced {
                        warn!("Timeline cursor not advanced: {}", e);
                    }
                }
            }

            if trigger.lane == TriggerLane::AllReelsStopped {
                self.describe_tier(&mut trigger.payload);
                self.sink.trigger_stage(&trigger.stage_type, &trigger.payload);
                self.on_all_reels_stopped();
            } else {
                self.sink.trigger_stage(&trigger.stage_type, &trigger.payload);
            }
        }

        count
    }

    fn describe_tier(&self, payload: &mut StagePayload) {
        let Some(tier) = &self.tier_result else {
            return;
        };
        payload.insert("win_multiplier", tier.multiplier);
        payload.insert("is_big_win", tier.is_big_win);
        payload.insert("pending_win", self.pending_win);
        payload.insert("presentation_ms", tier.presentation_duration_ms());
        if let Some(label) = tier.display_label() {
            payload.insert("tier_label", label);
        }
        if let Some(stage) = tier.presentation_stage() {
            payload.insert("presentation_stage", stage);
        }
        if let Some(jackpot) = &self.last_jackpot {
            payload.insert("jackpot_tier", jackpot.tier.stage_suffix());
        }
    }

    fn on_all_reels_stopped(&mut self) {
        let presents = self.spin.as_ref().is_some_and(|s| s.presents);
        if presents {
            self.set_state(SessionState::Presenting);
        } else {
            // Small or no win: credit now, remaining stages keep draining
            self.balance += self.pending_win;
            self.pending_win = 0.0;
            self.spin = None;
            self.set_state(SessionState::Idle);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRESENTATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Credit the pending win and end the presentation
    pub fn collect(&mut self) -> SessionResult<f64> {
        self.require_presenting()?;
        let amount = self.take_pending_win();
        info!("Collected {:.2}, balance {:.2}", amount, self.balance);
        self.finish_spin();
        Ok(amount)
    }

    /// Double-or-nothing on the pending win
    pub fn gamble(&mut self, choice: GambleChoice) -> SessionResult<GambleOutcome> {
        self.require_presenting()?;
        self.gamble
            .check(self.pending_win)
            .map_err(SessionError::GambleUnavailable)?;

        let outcome = self.gamble.resolve(choice, self.pending_win);
        self.pending_win = outcome.pending_win;
        info!(
            "Gamble {:?} drew {:?}: {} (pending {:.2})",
            choice,
            outcome.drawn,
            if outcome.won { "won" } else { "lost" },
            outcome.pending_win
        );

        if !outcome.won {
            self.finish_spin();
        }
        Ok(outcome)
    }

    /// The rendering layer finished fading out. Credits the pending win and
    /// starts the queued spin.
    pub fn complete_skip(&mut self, token: SkipToken) -> SessionResult<SpinStart<E::Pending>> {
        let queued = match self.queued.take() {
            Some(queued) if queued.skip_id == token.id() => queued,
            other => {
                self.queued = other;
                warn!("Unknown skip token {}", token.id());
                return Err(SessionError::UnknownSkipToken(token.id()));
            }
        };

        let credited = self.take_pending_win();
        debug!("Skip {} complete, credited {:.2}", queued.skip_id, credited);
        self.finish_spin();

        self.check_can_spin(queued.bet, self.balance)?;
        Ok(SpinStart::Started(self.begin_spin(queued.bet, queued.forced)))
    }

    /// Drop a requested skip whose token will never come back. The
    /// presentation stays up and can be collected or skipped again.
    pub fn cancel_skip(&mut self) -> SessionResult<()> {
        match self.queued.take() {
            Some(queued) => {
                warn!("Skip {} cancelled, bet {:.2} not placed", queued.skip_id, queued.bet);
                Ok(())
            }
            None => Err(SessionError::NoSkipPending),
        }
    }

    fn require_presenting(&self) -> SessionResult<()> {
        if self.state != SessionState::Presenting {
            return Err(SessionError::NotPresenting);
        }
        if self.queued.is_some() {
            return Err(SessionError::SkipInProgress);
        }
        Ok(())
    }

    fn take_pending_win(&mut self) -> f64 {
        let amount = std::mem::take(&mut self.pending_win);
        self.balance += amount;
        amount
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SESSION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fresh balance and jackpots back to seed. Idle only.
    pub fn new_session(&mut self) -> SessionResult<()> {
        if self.state != SessionState::Idle {
            return Err(SessionError::NotIdle);
        }
        self.scheduler.cancel_all();
        self.timeline.clear();
        self.ledger.reset_to_seeds();
        self.balance = self.config.starting_balance;
        self.pending_win = 0.0;
        self.current_result = None;
        self.tier_result = None;
        self.last_jackpot = None;
        info!("New session, balance {:.2}", self.balance);
        Ok(())
    }

    pub fn set_turbo(&mut self, turbo: bool) {
        self.turbo = turbo;
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("State {:?} -> {:?}", self.state, state);
            self.state = state;
            self.sink.on_state_change(state);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SNAPSHOTS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn pending_win(&self) -> f64 {
        self.pending_win
    }

    pub fn turbo(&self) -> bool {
        self.turbo
    }

    /// Tier of the current spin, once its result arrived
    pub fn tier_result(&self) -> Option<&WinTierResult> {
        self.tier_result.as_ref()
    }

    pub fn jackpot_values(&self) -> JackpotSnapshot {
        self.ledger.snapshot()
    }

    pub fn last_jackpot(&self) -> Option<JackpotAward> {
        self.last_jackpot
    }

    pub fn progress(&self) -> StageProgress {
        StageProgress {
            cursor: self.timeline.cursor(),
            len: self.timeline.len(),
            fraction: self.timeline.progress(),
        }
    }

    /// Result of the current spin (stages live in the timeline)
    pub fn current_result(&self) -> Option<&SpinResult> {
        self.current_result.as_ref()
    }

    pub fn timeline(&self) -> &StageTimeline {
        &self.timeline
    }

    pub fn scheduler(&self) -> &VisualSyncScheduler {
        &self.scheduler
    }

    pub fn ledger(&self) -> &JackpotLedger {
        &self.ledger
    }

    pub fn is_skip_pending(&self) -> bool {
        self.queued.is_some()
    }

    /// Generation of the latest spin
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn context(&self) -> &EngineContext<E> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut EngineContext<E> {
        &mut self.context
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
