//! Timing — Reel stop offsets and engine-side stage timestamps
//!
//! `ReelTimingConfig` mirrors the rendering layer's reel animation so that
//! `REEL_STOP_<n>` triggers land exactly when reel `n` visually stops:
//!
//! ```text
//! stop(i) = stagger(i) + animation + per_reel_delay(i)
//!         = i * reel_start_stagger + spin_animation + (i * reel_stop_interval + extra[i])
//! ```
//!
//! Turbo mode scales every term by `turbo_factor`.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Timing profile for engine-side stage generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingProfile {
    /// Normal gameplay timing
    #[default]
    Normal,
    /// Fast/Turbo mode
    Turbo,
    /// Studio mode (wide gaps for audio testing)
    Studio,
}

/// Reel animation timing the visual sync scheduler reproduces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelTimingConfig {
    /// Delay between consecutive reels starting to spin (ms)
    pub reel_start_stagger_ms: u64,
    /// Spin animation length shared by every reel (ms)
    pub spin_animation_ms: u64,
    /// Additional landing delay per reel index (ms)
    pub reel_stop_interval_ms: u64,
    /// Extra landing delay for specific reels (index = reel)
    pub per_reel_extra_ms: Vec<u64>,
    /// Multiplier applied to every term in turbo mode
    pub turbo_factor: f64,
    /// How long after the second-to-last reel stop anticipation kicks in (ms)
    pub anticipation_lead_ms: u64,
}

impl Default for ReelTimingConfig {
    fn default() -> Self {
        Self {
            reel_start_stagger_ms: 60,
            spin_animation_ms: 800,
            reel_stop_interval_ms: 300,
            per_reel_extra_ms: Vec::new(),
            turbo_factor: 0.5,
            anticipation_lead_ms: 150,
        }
    }
}

impl ReelTimingConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.spin_animation_ms == 0 {
            return Err(ConfigurationError::Timing("spin animation must be > 0ms".into()));
        }
        if !(self.turbo_factor > 0.0 && self.turbo_factor <= 1.0) {
            return Err(ConfigurationError::Timing(format!(
                "turbo factor must be in (0, 1], got {}",
                self.turbo_factor
            )));
        }
        Ok(())
    }

    fn scale(&self, ms: u64, turbo: bool) -> u64 {
        if turbo {
            (ms as f64 * self.turbo_factor).round() as u64
        } else {
            ms
        }
    }

    /// Start stagger for reel `i`
    pub fn stagger(&self, reel: usize, turbo: bool) -> u64 {
        self.scale(reel as u64 * self.reel_start_stagger_ms, turbo)
    }

    /// Shared spin animation length
    pub fn animation_duration(&self, turbo: bool) -> u64 {
        self.scale(self.spin_animation_ms, turbo)
    }

    /// Landing delay for reel `i`
    pub fn per_reel_delay(&self, reel: usize, turbo: bool) -> u64 {
        let extra = self.per_reel_extra_ms.get(reel).copied().unwrap_or(0);
        self.scale(reel as u64 * self.reel_stop_interval_ms + extra, turbo)
    }

    /// Unclamped stop time of reel `i`
    pub fn stop_offset(&self, reel: usize, turbo: bool) -> u64 {
        self.stagger(reel, turbo) + self.animation_duration(turbo) + self.per_reel_delay(reel, turbo)
    }

    /// Reels must land left to right; equal stop times are allowed.
    pub fn check_stop_order(&self, reel_count: usize) -> Result<(), ConfigurationError> {
        for reel in 1..reel_count {
            let (prev, at) = (self.stop_offset(reel - 1, false), self.stop_offset(reel, false));
            if at < prev {
                return Err(ConfigurationError::Timing(format!(
                    "reel {reel} stops at {at}ms, before reel {} at {prev}ms",
                    reel - 1
                )));
            }
        }
        Ok(())
    }

    /// Stop offset of every reel from the moment the scheduler is armed.
    ///
    /// Strictly increasing for a config that passed `check_stop_order`: equal
    /// stop times and turbo rounding slips are pushed 1ms apart so reel `i`
    /// never lands with or before reel `i - 1`.
    pub fn reel_stop_offsets(&self, reel_count: usize, turbo: bool) -> Vec<u64> {
        let mut offsets: Vec<u64> = Vec::with_capacity(reel_count);
        for reel in 0..reel_count {
            let mut at = self.stop_offset(reel, turbo);
            if let Some(&prev) = offsets.last() {
                at = at.max(prev + 1);
            }
            offsets.push(at);
        }
        offsets
    }

    /// Anticipation lead, scaled for turbo
    pub fn anticipation_lead(&self, turbo: bool) -> u64 {
        self.scale(self.anticipation_lead_ms, turbo)
    }
}

/// Engine-side stage pacing (used by the synthetic engine)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub profile: TimingProfile,
    /// Time for the first reel to stop (ms)
    pub reel_spin_duration_ms: u64,
    /// Delay between reel stops (ms)
    pub reel_stop_interval_ms: u64,
    /// Anticipation duration on the last reel (ms)
    pub anticipation_duration_ms: u64,
    /// Delay before win presentation (ms)
    pub win_reveal_delay_ms: u64,
    /// Rollup speed (multiples of bet per second)
    pub rollup_speed: f64,
    /// Big win tier step (ms)
    pub big_win_step_ms: u64,
    /// Feature / cascade step (ms)
    pub feature_step_ms: u64,
    /// Minimum time between stage events (ms)
    pub min_event_interval_ms: u64,
}

impl StageTiming {
    pub fn normal() -> Self {
        Self {
            profile: TimingProfile::Normal,
            reel_spin_duration_ms: 800,
            reel_stop_interval_ms: 300,
            anticipation_duration_ms: 1500,
            win_reveal_delay_ms: 200,
            rollup_speed: 10.0,
            big_win_step_ms: 3000,
            feature_step_ms: 600,
            min_event_interval_ms: 50,
        }
    }

    pub fn turbo() -> Self {
        Self {
            profile: TimingProfile::Turbo,
            reel_spin_duration_ms: 400,
            reel_stop_interval_ms: 100,
            anticipation_duration_ms: 800,
            win_reveal_delay_ms: 100,
            rollup_speed: 40.0,
            big_win_step_ms: 1500,
            feature_step_ms: 300,
            min_event_interval_ms: 25,
        }
    }

    /// Studio mode (optimized for audio testing - visible reel stops with good sync)
    pub fn studio() -> Self {
        Self {
            profile: TimingProfile::Studio,
            reel_spin_duration_ms: 600,
            reel_stop_interval_ms: 350,
            anticipation_duration_ms: 500,
            win_reveal_delay_ms: 100,
            rollup_speed: 50.0,
            big_win_step_ms: 1000,
            feature_step_ms: 300,
            min_event_interval_ms: 50,
        }
    }

    pub fn from_profile(profile: TimingProfile) -> Self {
        match profile {
            TimingProfile::Normal => Self::normal(),
            TimingProfile::Turbo => Self::turbo(),
            TimingProfile::Studio => Self::studio(),
        }
    }

    /// Rollup length for a win multiplier, clamped to 0.5s..10s
    pub fn rollup_duration_ms(&self, multiplier: f64) -> u64 {
        if self.rollup_speed <= 0.0 {
            return 0;
        }
        (multiplier / self.rollup_speed * 1000.0).clamp(500.0, 10_000.0) as u64
    }
}

impl Default for StageTiming {
    fn default() -> Self {
        Self::normal()
    }
}

/// Timestamp generator for sequential events
#[derive(Debug, Clone)]
pub struct TimestampGenerator {
    current_ms: u64,
    timing: StageTiming,
}

impl TimestampGenerator {
    pub fn new(timing: StageTiming) -> Self {
        Self {
            current_ms: 0,
            timing,
        }
    }

    pub fn reset(&mut self) {
        self.current_ms = 0;
    }

    pub fn current(&self) -> u64 {
        self.current_ms
    }

    /// Advance by duration (at least the minimum event interval) and return new timestamp
    pub fn advance(&mut self, duration_ms: u64) -> u64 {
        self.current_ms += duration_ms.max(self.timing.min_event_interval_ms);
        self.current_ms
    }

    /// Advance for reel stop
    pub fn reel_stop(&mut self, reel_index: u8) -> u64 {
        if reel_index == 0 {
            self.advance(self.timing.reel_spin_duration_ms)
        } else {
            self.advance(self.timing.reel_stop_interval_ms)
        }
    }

    /// Anticipation extends the wait for the next reel
    pub fn anticipation(&mut self) -> u64 {
        self.advance(self.timing.anticipation_duration_ms)
    }

    pub fn win_reveal(&mut self) -> u64 {
        self.advance(self.timing.win_reveal_delay_ms)
    }

    /// Evenly spaced rollup ticks covering the rollup duration
    pub fn rollup_ticks(&mut self, multiplier: f64, tick_count: u32) -> Vec<u64> {
        let total = self.timing.rollup_duration_ms(multiplier);
        let interval = total / tick_count.max(1) as u64;
        (0..tick_count).map(|_| self.advance(interval)).collect()
    }

    pub fn big_win_step(&mut self) -> u64 {
        self.advance(self.timing.big_win_step_ms)
    }

    pub fn feature_step(&mut self) -> u64 {
        self.advance(self.timing.feature_step_ms)
    }

    pub fn timing(&self) -> &StageTiming {
        &self.timing
    }
}
