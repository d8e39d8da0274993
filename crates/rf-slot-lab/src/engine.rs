//! Engine seam — Where spin results come from
//!
//! The sync core never decides outcomes. It asks a `SlotEngine` for a result
//! and gets back a future that owns everything it needs, so the session
//! controller is free while the engine works.
//!
//! - `SyntheticEngine`: seeded, in-process, instantly resolving
//! - `RemoteEngine`: forwards requests over a tokio channel to an external task

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::task::{Context, Poll};

use log::{debug, info, warn};
use rand::prelude::*;
use tokio::sync::{mpsc, oneshot};

use crate::spin::{ForcedOutcome, SpinOutline, SpinResult};
use crate::timing::{StageTiming, TimestampGenerator, TimingProfile};

/// Source of spin results
pub trait SlotEngine {
    /// Resolves to `None` when the engine could not produce a result
    type Pending: Future<Output = Option<SpinResult>>;

    fn is_ready(&self) -> bool;

    /// Called by `EngineContext::init`
    fn init(&mut self) {}

    /// Called by `EngineContext::shutdown`
    fn shutdown(&mut self) {}

    fn spin(&mut self, bet: f64) -> Self::Pending;

    fn spin_forced(&mut self, outcome: ForcedOutcome, bet: f64) -> Self::Pending;
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Explicit engine handle with a caller-owned lifecycle
#[derive(Debug)]
pub struct EngineContext<E> {
    engine: E,
    initialized: bool,
}

impl<E: SlotEngine> EngineContext<E> {
    /// Wrap an engine. Not ready until `init()`.
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            initialized: false,
        }
    }

    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.engine.init();
        self.initialized = true;
        info!("Engine context initialized");
    }

    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.engine.shutdown();
        self.initialized = false;
        info!("Engine context shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initialized and the engine itself reports ready
    pub fn is_ready(&self) -> bool {
        self.initialized && self.engine.is_ready()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub(crate) fn spin(&mut self, bet: f64, forced: Option<ForcedOutcome>) -> E::Pending {
        match forced {
            Some(outcome) => self.engine.spin_forced(outcome, bet),
            None => self.engine.spin(bet),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNTHETIC ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Deterministic in-process engine producing realistic stage sequences
#[derive(Debug)]
pub struct SyntheticEngine {
    rng: StdRng,
    reel_count: u8,
    timestamp_gen: TimestampGenerator,
    spin_count: u64,
    ready: bool,
}

impl SyntheticEngine {
    /// Engine seeded from the OS
    pub fn new(reel_count: u8) -> Self {
        Self::with_rng(StdRng::from_os_rng(), reel_count)
    }

    /// Reproducible engine
    pub fn seeded(seed: u64, reel_count: u8) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), reel_count)
    }

    fn with_rng(rng: StdRng, reel_count: u8) -> Self {
        Self {
            rng,
            reel_count,
            timestamp_gen: TimestampGenerator::new(StageTiming::normal()),
            spin_count: 0,
            ready: true,
        }
    }

    pub fn set_timing(&mut self, profile: TimingProfile) {
        self.timestamp_gen = TimestampGenerator::new(StageTiming::from_profile(profile));
    }

    /// Simulate an engine that is up but not accepting spins
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn spin_count(&self) -> u64 {
        self.spin_count
    }

    pub fn reel_count(&self) -> u8 {
        self.reel_count
    }

    /// Generate a result now
    pub fn generate(&mut self, bet: f64, forced: Option<ForcedOutcome>) -> SpinResult {
        let outcome = forced.unwrap_or_else(|| self.roll_outcome());
        self.spin_count += 1;

        // Forced outcomes are exact; random wins wobble around the target
        let jitter = match (forced, outcome) {
            (None, o) if o.target_ratio() > 1.0 && o.jackpot_tier().is_none() => {
                self.rng.random_range(0.8..1.2)
            }
            _ => 1.0,
        };

        let spin_id = format!("spin-{:06}", self.spin_count);
        let mut outline = SpinOutline::new(spin_id, self.reel_count, bet, bet * outcome.target_ratio() * jitter);
        outline.anticipation = matches!(outcome, ForcedOutcome::NearMiss) || outline.win_ratio() >= 15.0;
        outline.jackpot = outcome.jackpot_tier();
        if outcome == ForcedOutcome::Cascade {
            outline.cascade_steps = if forced.is_some() { 3 } else { self.rng.random_range(2..=4) };
        }
        if outcome.triggers_feature() {
            outline.feature_spins = Some(if forced.is_some() { 10 } else { self.rng.random_range(8..=12) });
        }

        debug!(
            "Synthetic spin {} -> {:?} ({:.2}x)",
            outline.spin_id,
            outcome,
            outline.win_ratio()
        );
        outline.into_result(&mut self.timestamp_gen)
    }

    fn roll_outcome(&mut self) -> ForcedOutcome {
        let roll: f64 = self.rng.random();
        match roll {
            r if r < 0.55 => ForcedOutcome::Lose,
            r if r < 0.60 => ForcedOutcome::NearMiss,
            r if r < 0.66 => ForcedOutcome::SubBet,
            r if r < 0.70 => ForcedOutcome::BreakEven,
            r if r < 0.85 => ForcedOutcome::SmallWin,
            r if r < 0.93 => ForcedOutcome::MediumWin,
            r if r < 0.96 => ForcedOutcome::BigWin,
            r if r < 0.975 => ForcedOutcome::FreeSpins,
            r if r < 0.985 => ForcedOutcome::Cascade,
            r if r < 0.992 => ForcedOutcome::MegaWin,
            r if r < 0.996 => ForcedOutcome::EpicWin,
            r if r < 0.9985 => ForcedOutcome::UltraWin,
            r if r < 0.9993 => ForcedOutcome::JackpotMini,
            r if r < 0.9997 => ForcedOutcome::JackpotMinor,
            r if r < 0.9999 => ForcedOutcome::JackpotMajor,
            _ => ForcedOutcome::JackpotGrand,
        }
    }

    fn resolve(&mut self, bet: f64, forced: Option<ForcedOutcome>) -> Ready<Option<SpinResult>> {
        if !self.ready {
            warn!("Synthetic engine not ready, no result");
            return ready(None);
        }
        ready(Some(self.generate(bet, forced)))
    }
}

impl SlotEngine for SyntheticEngine {
    type Pending = Ready<Option<SpinResult>>;

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn spin(&mut self, bet: f64) -> Self::Pending {
        self.resolve(bet, None)
    }

    fn spin_forced(&mut self, outcome: ForcedOutcome, bet: f64) -> Self::Pending {
        self.resolve(bet, Some(outcome))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REMOTE ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// A spin request travelling to an external engine task
#[derive(Debug)]
pub struct SpinRequest {
    pub bet: f64,
    pub forced: Option<ForcedOutcome>,
    reply: oneshot::Sender<Option<SpinResult>>,
}

impl SpinRequest {
    /// Answer the request. Dropping it unanswered means "no result".
    pub fn respond(self, result: Option<SpinResult>) {
        if self.reply.send(result).is_err() {
            debug!("Spin reply dropped by requester");
        }
    }
}

/// Engine living behind a tokio mpsc channel
#[derive(Debug, Clone)]
pub struct RemoteEngine {
    tx: mpsc::Sender<SpinRequest>,
}

impl RemoteEngine {
    /// Create the engine handle and the receiver the external task serves
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<SpinRequest>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    fn request(&mut self, bet: f64, forced: Option<ForcedOutcome>) -> RemoteReply {
        let (reply, rx) = oneshot::channel();
        match self.tx.try_send(SpinRequest { bet, forced, reply }) {
            Ok(()) => RemoteReply { rx: Some(rx) },
            Err(e) => {
                warn!("Remote engine rejected spin request: {}", e);
                RemoteReply { rx: None }
            }
        }
    }
}

impl SlotEngine for RemoteEngine {
    type Pending = RemoteReply;

    fn is_ready(&self) -> bool {
        !self.tx.is_closed()
    }

    fn spin(&mut self, bet: f64) -> Self::Pending {
        self.request(bet, None)
    }

    fn spin_forced(&mut self, outcome: ForcedOutcome, bet: f64) -> Self::Pending {
        self.request(bet, Some(outcome))
    }
}

/// Pending reply from a `RemoteEngine`
#[derive(Debug)]
pub struct RemoteReply {
    rx: Option<oneshot::Receiver<Option<SpinResult>>>,
}

impl Future for RemoteReply {
    type Output = Option<SpinResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            None => Poll::Ready(None),
            // A dropped sender is "no result"
            Some(rx) => Pin::new(rx).poll(cx).map(|reply| reply.ok().flatten()),
        }
    }
}

/// Serve spin requests from a synthetic engine until every sender is gone
pub async fn serve_synthetic(mut rx: mpsc::Receiver<SpinRequest>, mut engine: SyntheticEngine) {
    while let Some(request) = rx.recv().await {
        let result = match request.forced {
            Some(outcome) => engine.spin_forced(outcome, request.bet).await,
            None => engine.spin(request.bet).await,
        };
        request.respond(result);
    }
    debug!("Synthetic engine task finished after {} spins", engine.spin_count());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_lifecycle() {
        let mut ctx = EngineContext::new(SyntheticEngine::seeded(1, 5));
        assert!(!ctx.is_ready());
        ctx.init();
        assert!(ctx.is_ready());
        ctx.engine_mut().set_ready(false);
        assert!(!ctx.is_ready());
        ctx.engine_mut().set_ready(true);
        ctx.shutdown();
        assert!(!ctx.is_ready());
    }

    #[test]
    fn test_seeded_engine_is_deterministic() {
        let mut a = SyntheticEngine::seeded(42, 5);
        let mut b = SyntheticEngine::seeded(42, 5);
        for _ in 0..50 {
            assert_eq!(a.generate(1.0, None), b.generate(1.0, None));
        }
    }

    #[test]
    fn test_forced_outcomes_exact() {
        let mut engine = SyntheticEngine::seeded(7, 5);
        for outcome in ForcedOutcome::ALL {
            let result = engine.generate(2.0, Some(outcome));
            assert_eq!(result.total_win, 2.0 * outcome.target_ratio(), "{outcome:?}");
            assert!(result.stages.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
        }
    }

    #[test]
    fn test_forced_jackpot_stages() {
        let mut engine = SyntheticEngine::seeded(7, 5);
        let result = engine.generate(1.0, Some(ForcedOutcome::JackpotMajor));
        assert!(result.stage_names().contains(&"JACKPOT_PRESENT_MAJOR"));
    }

    #[tokio::test]
    async fn test_not_ready_resolves_none() {
        let mut engine = SyntheticEngine::seeded(1, 5);
        engine.set_ready(false);
        assert!(engine.spin(1.0).await.is_none());
    }

    #[tokio::test]
    async fn test_remote_roundtrip() {
        let (mut remote, rx) = RemoteEngine::channel(4);
        let server = tokio::spawn(serve_synthetic(rx, SyntheticEngine::seeded(3, 5)));

        let result = remote.spin_forced(ForcedOutcome::SmallWin, 1.0).await;
        assert_eq!(result.map(|r| r.total_win), Some(2.0));

        drop(remote);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_dropped_reply_is_none() {
        let (mut remote, mut rx) = RemoteEngine::channel(1);
        let pending = remote.spin(1.0);
        let request = rx.recv().await.unwrap();
        drop(request);
        assert!(pending.await.is_none());
    }

    #[tokio::test]
    async fn test_remote_closed_not_ready() {
        let (mut remote, rx) = RemoteEngine::channel(1);
        drop(rx);
        assert!(!remote.is_ready());
        assert!(remote.spin(1.0).await.is_none());
    }
}
