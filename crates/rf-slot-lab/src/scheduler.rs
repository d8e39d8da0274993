//! VisualSyncScheduler — Fires stage triggers when the UI shows them
//!
//! Every trigger lives in one ordered queue keyed by `(fire_at, lane, seq)`.
//! Firing removes the trigger from the queue, so a trigger can fire at most
//! once; cancellation empties the queue and bumps the generation, and the
//! generation is checked again at fire time.
//!
//! ```text
//! schedule()          REEL_STOP_0..n planned (offsets from arm)
//! load_stages()       engine stages retimed onto the reel schedule
//! arm(now)            plan enters the queue
//! pop_due(now)        REEL_STOP_n-2 ──> ANTICIPATION_ON (if qualified)
//!                     REEL_STOP_n-1 ──> ALL_REELS_STOPPED ──> presentation chain
//! cancel_all()        nothing from this batch fires again
//! ```

use std::collections::BTreeMap;

use log::{debug, warn};
use rf_stage::{ALL_REELS_STOPPED, StageEvent, StageKind, StagePayload};

use crate::error::SessionError;
use crate::timing::ReelTimingConfig;

/// Tie-break between triggers due at the same millisecond
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriggerLane {
    /// `REEL_STOP_<n>`
    ReelStop,
    /// Engine stage retimed onto the reel schedule
    ReelPhase,
    AnticipationOn,
    AnticipationOff,
    /// Synthetic `ALL_REELS_STOPPED`
    AllReelsStopped,
    /// Win / feature / jackpot stages after every reel has landed
    Presentation,
}

/// A trigger owned by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTrigger {
    pub stage_type: String,
    /// Relative offset while planned, absolute clock time once armed
    pub fire_at_ms: u64,
    pub lane: TriggerLane,
    pub payload: StagePayload,
    /// Index into the loaded timeline, for engine stages
    pub stage_index: Option<usize>,
    pub cancelled: bool,
    generation: u64,
}

impl ScheduledTrigger {
    fn new(stage_type: impl Into<String>, fire_at_ms: u64, lane: TriggerLane, generation: u64) -> Self {
        Self {
            stage_type: stage_type.into(),
            fire_at_ms,
            lane,
            payload: StagePayload::default(),
            stage_index: None,
            cancelled: false,
            generation,
        }
    }

    fn with_stage(mut self, stage: &StageEvent, index: usize) -> Self {
        self.payload = stage.payload.clone();
        self.stage_index = Some(index);
        self
    }
}

type TriggerKey = (u64, TriggerLane, u64);

/// Cancellable, clock-driven trigger scheduler
#[derive(Debug)]
pub struct VisualSyncScheduler {
    timing: ReelTimingConfig,
    reel_count: u8,
    turbo: bool,

    /// Planned reel stops and reel-phase stages (relative offsets)
    plan: Vec<ScheduledTrigger>,
    /// Presentation chain (offsets from ALL_REELS_STOPPED)
    deferred: Vec<ScheduledTrigger>,
    queue: BTreeMap<TriggerKey, ScheduledTrigger>,

    offsets: Vec<u64>,
    armed_at: Option<u64>,
    anticipation: Option<StagePayload>,
    anticipation_fired: bool,
    reels_stopped: u8,
    all_stopped_at: Option<u64>,

    generation: u64,
    next_seq: u64,
    last_fired: Option<TriggerKey>,
}

impl VisualSyncScheduler {
    pub fn new(timing: ReelTimingConfig, reel_count: u8) -> Self {
        Self {
            timing,
            reel_count,
            turbo: false,
            plan: Vec::new(),
            deferred: Vec::new(),
            queue: BTreeMap::new(),
            offsets: Vec::new(),
            armed_at: None,
            anticipation: None,
            anticipation_fired: false,
            reels_stopped: 0,
            all_stopped_at: None,
            generation: 0,
            next_seq: 0,
            last_fired: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PLANNING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Plan one `REEL_STOP_<n>` per reel. Any previous batch is cancelled first.
    ///
    /// Returned triggers carry offsets relative to the later `arm()` call.
    pub fn schedule(&mut self, reel_count: u8, turbo: bool) -> Vec<ScheduledTrigger> {
        self.cancel_all();

        self.reel_count = reel_count;
        self.turbo = turbo;
        self.offsets = self.timing.reel_stop_offsets(reel_count as usize, turbo);
        self.plan = self
            .offsets
            .iter()
            .enumerate()
            .map(|(reel, &at)| {
                let kind = StageKind::ReelStop(reel as u8);
                ScheduledTrigger::new(kind.name(), at, TriggerLane::ReelStop, self.generation)
            })
            .collect();

        debug!(
            "Scheduled {} reel stops (turbo: {}): {:?}",
            reel_count, turbo, self.offsets
        );
        self.plan.clone()
    }

    /// Retime the engine's stages onto the planned reel schedule.
    ///
    /// Stages up to the last `REEL_STOP_<n>` fire right after the reel stop
    /// preceding them (or at arm time before the first one); engine reel stops
    /// lend their payload to the scheduler's own reel triggers. Later stages
    /// form the presentation chain, released by `ALL_REELS_STOPPED` with
    /// their engine spacing kept. Engine anticipation markers never fire
    /// directly; with `anticipate` set, their payload goes to the scheduler's
    /// anticipation trigger.
    pub fn load_stages(&mut self, stages: &[StageEvent], anticipate: bool) -> Result<(), SessionError> {
        let kinds: Vec<StageKind> = stages.iter().map(StageEvent::kind).collect();

        // Validate before touching the plan so a bad sequence leaves it intact
        let planned_reels = self.offsets.len();
        if let Some(reel) = kinds
            .iter()
            .filter_map(StageKind::reel_index)
            .find(|&r| r as usize >= planned_reels)
        {
            return Err(SessionError::UnknownReel {
                reel,
                reel_count: planned_reels as u8,
            });
        }

        let split = kinds
            .iter()
            .rposition(|k| k.reel_index().is_some())
            .map(|i| i + 1)
            .unwrap_or_else(|| kinds.iter().take_while(|k| **k == StageKind::SpinStart).count());
        let anchor_ms = stages[..split].last().map_or(0, |s| s.timestamp_ms);

        let mut engine_anticipation: Option<StagePayload> = None;
        let mut last_reel: Option<u8> = None;

        for (index, (stage, kind)) in stages.iter().zip(&kinds).enumerate() {
            if kind.is_anticipation() {
                if *kind == StageKind::AnticipationOn && engine_anticipation.is_none() {
                    engine_anticipation = Some(stage.payload.clone());
                }
                continue;
            }

            if index < split {
                if let Some(reel) = kind.reel_index() {
                    match self.plan.get_mut(reel as usize) {
                        Some(slot) if slot.stage_index.is_none() => {
                            slot.payload = stage.payload.clone();
                            slot.stage_index = Some(index);
                        }
                        _ => warn!("Duplicate {} from engine ignored", stage.stage_type),
                    }
                    last_reel = Some(reel);
                    continue;
                }

                let at = last_reel
                    .and_then(|r| self.offsets.get(r as usize).copied())
                    .unwrap_or(0);
                let trigger = ScheduledTrigger::new(
                    stage.stage_type.clone(),
                    at,
                    TriggerLane::ReelPhase,
                    self.generation,
                )
                .with_stage(stage, index);
                self.plan.push(trigger);
            } else {
                let trigger = ScheduledTrigger::new(
                    stage.stage_type.clone(),
                    stage.timestamp_ms.saturating_sub(anchor_ms),
                    TriggerLane::Presentation,
                    self.generation,
                )
                .with_stage(stage, index);
                self.deferred.push(trigger);
            }
        }

        self.anticipation = anticipate.then(|| engine_anticipation.unwrap_or_default());
        Ok(())
    }

    /// Start the clock on the planned batch
    pub fn arm(&mut self, now_ms: u64) {
        if self.plan.is_empty() {
            return;
        }
        self.armed_at = Some(now_ms);
        for mut trigger in std::mem::take(&mut self.plan) {
            trigger.fire_at_ms += now_ms;
            self.enqueue(trigger);
        }
        debug!("Armed {} triggers at {}ms", self.queue.len(), now_ms);
    }

    fn enqueue(&mut self, trigger: ScheduledTrigger) {
        let key = (trigger.fire_at_ms, trigger.lane, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, trigger);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FIRING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Remove and return every trigger due at `now_ms`, in firing order.
    ///
    /// Triggers released by a firing (anticipation, all-stopped, presentation
    /// chain) are returned in the same call when they are already due.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<ScheduledTrigger> {
        let mut fired = Vec::new();

        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now_ms {
                break;
            }
            let (key, trigger) = entry.remove_entry();
            if trigger.cancelled || trigger.generation != self.generation {
                continue;
            }

            debug_assert!(
                self.last_fired.is_none_or(|last| key > last),
                "trigger {} fired out of order",
                trigger.stage_type
            );
            self.last_fired = Some(key);

            match trigger.lane {
                TriggerLane::ReelStop => self.on_reel_stop(key.0),
                TriggerLane::AllReelsStopped => self.on_all_reels_stopped(key.0),
                TriggerLane::AnticipationOn => self.anticipation_fired = true,
                _ => {}
            }

            debug!("Fire {} @ {}ms", trigger.stage_type, trigger.fire_at_ms);
            fired.push(trigger);
        }

        fired
    }

    fn on_reel_stop(&mut self, at: u64) {
        let reel = self.reels_stopped;
        self.reels_stopped += 1;

        if self.reel_count >= 2 && reel == self.reel_count - 2 {
            if let Some(payload) = self.anticipation.take() {
                // Must land before the last reel does
                let last_offset = self.offsets.last().copied().unwrap_or(0);
                let last_at = self.armed_at.unwrap_or(0) + last_offset;
                let fire_at = (at + self.timing.anticipation_lead(self.turbo))
                    .min(last_at.saturating_sub(1))
                    .max(at);
                let mut trigger = ScheduledTrigger::new(
                    StageKind::AnticipationOn.name(),
                    fire_at,
                    TriggerLane::AnticipationOn,
                    self.generation,
                );
                trigger.payload = payload;
                self.enqueue(trigger);
            }
        }

        if reel + 1 == self.reel_count {
            if self.anticipation_fired {
                let off = ScheduledTrigger::new(
                    StageKind::AnticipationOff.name(),
                    at,
                    TriggerLane::AnticipationOff,
                    self.generation,
                );
                self.enqueue(off);
            }
            let all = ScheduledTrigger::new(
                ALL_REELS_STOPPED,
                at,
                TriggerLane::AllReelsStopped,
                self.generation,
            );
            self.enqueue(all);
        }
    }

    fn on_all_reels_stopped(&mut self, at: u64) {
        self.all_stopped_at = Some(at);
        for mut trigger in std::mem::take(&mut self.deferred) {
            trigger.fire_at_ms += at;
            self.enqueue(trigger);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CANCELLATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Drop every planned, queued and deferred trigger. Idempotent.
    ///
    /// Returns the cancelled triggers (empty on a repeated call).
    pub fn cancel_all(&mut self) -> Vec<ScheduledTrigger> {
        let mut cancelled: Vec<ScheduledTrigger> = std::mem::take(&mut self.queue).into_values().collect();
        cancelled.append(&mut self.plan);
        cancelled.append(&mut self.deferred);
        for trigger in &mut cancelled {
            trigger.cancelled = true;
        }

        self.generation += 1;
        self.armed_at = None;
        self.anticipation = None;
        self.anticipation_fired = false;
        self.reels_stopped = 0;
        self.all_stopped_at = None;
        self.last_fired = None;

        if !cancelled.is_empty() {
            debug!("Cancelled {} triggers", cancelled.len());
        }
        cancelled
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Anything planned, queued or deferred
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty() || !self.plan.is_empty() || !self.deferred.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len() + self.plan.len() + self.deferred.len()
    }

    /// Time of the next queued trigger
    pub fn next_fire_at(&self) -> Option<u64> {
        self.queue.keys().next().map(|k| k.0)
    }

    pub fn reels_stopped(&self) -> u8 {
        self.reels_stopped
    }

    pub fn all_reels_stopped_at(&self) -> Option<u64> {
        self.all_stopped_at
    }

    /// Stop offsets of the current batch
    pub fn reel_stop_offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn reel_count(&self) -> u8 {
        self.reel_count
    }

    pub fn timing(&self) -> &ReelTimingConfig {
        &self.timing
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
