//! Spin result and stage event generation

use serde::{Deserialize, Serialize};

use rf_stage::{BigWinHint, JackpotTier, StageEvent, StageKind, StagePayload};

use crate::timing::TimestampGenerator;

/// Engine output for one spin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinResult {
    /// Opaque engine identifier
    pub spin_id: String,
    /// Total win (currency, same unit as the bet)
    pub total_win: f64,
    pub is_win: bool,
    /// Engine's own tier opinion; advisory only
    #[serde(default)]
    pub big_win_tier: BigWinHint,
    /// Stages in non-decreasing timestamp order
    pub stages: Vec<StageEvent>,
}

impl SpinResult {
    pub fn new(spin_id: impl Into<String>, total_win: f64) -> Self {
        Self {
            spin_id: spin_id.into(),
            total_win,
            is_win: total_win > 0.0,
            big_win_tier: BigWinHint::None,
            stages: Vec::new(),
        }
    }

    pub fn with_stages(mut self, stages: Vec<StageEvent>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_hint(mut self, hint: BigWinHint) -> Self {
        self.big_win_tier = hint;
        self
    }

    /// Stage identifiers in order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.stage_type.as_str()).collect()
    }
}

/// Engine-side hint for a win ratio (engine thresholds, not the core's tier table)
pub fn hint_for_ratio(ratio: f64) -> BigWinHint {
    if ratio >= 100.0 {
        BigWinHint::UltraWin
    } else if ratio >= 50.0 {
        BigWinHint::EpicWin
    } else if ratio >= 25.0 {
        BigWinHint::MegaWin
    } else if ratio >= 15.0 {
        BigWinHint::BigWin
    } else if ratio > 0.0 {
        BigWinHint::Win
    } else {
        BigWinHint::None
    }
}

/// Everything the engine decided about a spin, before stages are generated
#[derive(Debug, Clone, PartialEq)]
pub struct SpinOutline {
    pub spin_id: String,
    pub reel_count: u8,
    pub bet: f64,
    pub total_win: f64,
    /// Anticipation before the last reel
    pub anticipation: bool,
    /// Cascade steps (0 = none)
    pub cascade_steps: u32,
    /// Free spins awarded
    pub feature_spins: Option<u32>,
    pub jackpot: Option<JackpotTier>,
}

impl SpinOutline {
    pub fn new(spin_id: impl Into<String>, reel_count: u8, bet: f64, total_win: f64) -> Self {
        Self {
            spin_id: spin_id.into(),
            reel_count,
            bet,
            total_win,
            anticipation: false,
            cascade_steps: 0,
            feature_spins: None,
            jackpot: None,
        }
    }

    pub fn win_ratio(&self) -> f64 {
        if self.bet > 0.0 {
            self.total_win / self.bet
        } else {
            0.0
        }
    }

    /// Build the result with its full stage sequence
    pub fn into_result(self, timing: &mut TimestampGenerator) -> SpinResult {
        let stages = self.generate_stages(timing);
        SpinResult::new(self.spin_id.clone(), self.total_win)
            .with_hint(hint_for_ratio(self.win_ratio()))
            .with_stages(stages)
    }

    /// Generate all stage events for this spin.
    ///
    /// Timestamps come from one monotonic generator, so the sequence is
    /// already in order.
    pub fn generate_stages(&self, timing: &mut TimestampGenerator) -> Vec<StageEvent> {
        timing.reset();
        let mut events = Vec::new();

        events.push(StageEvent::with_payload(
            StageKind::SpinStart.name(),
            timing.current(),
            StagePayload::new().with("bet", self.bet),
        ));

        // Reel stops, anticipation wrapped around the last reel
        for reel in 0..self.reel_count {
            let last = reel + 1 == self.reel_count;
            if last && self.anticipation && self.reel_count >= 2 {
                events.push(StageEvent::with_payload(
                    StageKind::AnticipationOn.name(),
                    timing.current(),
                    StagePayload::new().with("reel_index", reel),
                ));
                timing.anticipation();
            }

            events.push(StageEvent::with_payload(
                StageKind::ReelStop(reel).name(),
                timing.reel_stop(reel),
                StagePayload::new().with("reel_index", reel),
            ));

            if last && self.anticipation && self.reel_count >= 2 {
                events.push(StageEvent::new(StageKind::AnticipationOff.name(), timing.current()));
            }
        }

        events.push(StageEvent::new(StageKind::EvaluateWins.name(), timing.advance(50)));

        if self.total_win > 0.0 {
            self.push_win_stages(&mut events, timing);
        }
        if self.cascade_steps > 0 {
            self.push_cascade_stages(&mut events, timing);
        }
        if let Some(spins) = self.feature_spins {
            self.push_feature_stages(spins, &mut events, timing);
        }
        if let Some(tier) = self.jackpot {
            self.push_jackpot_stages(tier, &mut events, timing);
        }

        events.push(StageEvent::new(StageKind::SpinEnd.name(), timing.advance(100)));
        events
    }

    fn push_win_stages(&self, events: &mut Vec<StageEvent>, timing: &mut TimestampGenerator) {
        let ratio = self.win_ratio();
        let win = StagePayload::new()
            .with("win_amount", self.total_win)
            .with("win_ratio", ratio);

        events.push(StageEvent::with_payload(
            StageKind::WinPresent(None).name(),
            timing.win_reveal(),
            win.clone(),
        ));

        let hint = hint_for_ratio(ratio);
        if hint.is_big_win() {
            events.push(StageEvent::with_payload(
                StageKind::BigWinTier(hint.level() - 1).name(),
                timing.big_win_step(),
                win.clone(),
            ));
        }

        let ticks = timing.rollup_ticks(ratio, 10);
        let start = ticks.first().copied().unwrap_or_else(|| timing.current());
        events.push(StageEvent::with_payload(
            StageKind::RollupStart.name(),
            start,
            win.clone(),
        ));
        let count = ticks.len();
        for (i, at) in ticks.into_iter().enumerate() {
            let progress = (i + 1) as f64 / count as f64;
            events.push(StageEvent::with_payload(
                StageKind::RollupTick.name(),
                at,
                StagePayload::new()
                    .with("current_amount", self.total_win * progress)
                    .with("progress", progress),
            ));
        }
        events.push(StageEvent::with_payload(
            StageKind::RollupEnd.name(),
            timing.advance(100),
            win,
        ));
    }

    fn push_cascade_stages(&self, events: &mut Vec<StageEvent>, timing: &mut TimestampGenerator) {
        events.push(StageEvent::new(StageKind::CascadeStart.name(), timing.feature_step()));
        for step in 0..self.cascade_steps {
            events.push(StageEvent::with_payload(
                StageKind::CascadeStep.name(),
                timing.feature_step(),
                StagePayload::new().with("step_index", step).with("multiplier", step + 1),
            ));
        }
        events.push(StageEvent::new(StageKind::CascadeEnd.name(), timing.feature_step()));
    }

    fn push_feature_stages(&self, spins: u32, events: &mut Vec<StageEvent>, timing: &mut TimestampGenerator) {
        events.push(StageEvent::with_payload(
            StageKind::FeatureEnter.name(),
            timing.feature_step(),
            StagePayload::new()
                .with("feature_type", "free_spins")
                .with("total_steps", spins),
        ));
        for step in 0..spins {
            events.push(StageEvent::with_payload(
                StageKind::FeatureStep.name(),
                timing.feature_step(),
                StagePayload::new().with("spins_remaining", spins - step - 1),
            ));
        }
        events.push(StageEvent::new(StageKind::FeatureExit.name(), timing.feature_step()));
    }

    fn push_jackpot_stages(&self, tier: JackpotTier, events: &mut Vec<StageEvent>, timing: &mut TimestampGenerator) {
        let payload = StagePayload::new().with("tier", tier.stage_suffix());
        events.push(StageEvent::with_payload(
            StageKind::JackpotTrigger.name(),
            timing.advance(500),
            payload.clone(),
        ));
        events.push(StageEvent::with_payload(
            StageKind::JackpotPresent(tier).name(),
            timing.advance(3000),
            payload.clone(),
        ));
        events.push(StageEvent::with_payload(
            StageKind::JackpotAward.name(),
            timing.advance(1000),
            payload,
        ));
    }
}

/// Outcome type for forcing specific results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedOutcome {
    /// No win
    Lose,
    /// Win below the bet (0.5x)
    SubBet,
    /// Win equal to the bet
    BreakEven,
    /// Small win (2x bet)
    SmallWin,
    /// Medium win (8x bet)
    MediumWin,
    /// Engine "big win" that stays below the core's big win threshold (18x)
    BigWin,
    /// Mega win (35x bet)
    MegaWin,
    /// Epic win (70x bet)
    EpicWin,
    /// Ultra win (150x bet)
    UltraWin,
    /// Free spins trigger
    FreeSpins,
    /// Cascade chain
    Cascade,
    /// Near miss (anticipation, no win)
    NearMiss,
    JackpotMini,
    JackpotMinor,
    JackpotMajor,
    JackpotGrand,
}

impl ForcedOutcome {
    pub const ALL: [ForcedOutcome; 16] = [
        Self::Lose,
        Self::SubBet,
        Self::BreakEven,
        Self::SmallWin,
        Self::MediumWin,
        Self::BigWin,
        Self::MegaWin,
        Self::EpicWin,
        Self::UltraWin,
        Self::FreeSpins,
        Self::Cascade,
        Self::NearMiss,
        Self::JackpotMini,
        Self::JackpotMinor,
        Self::JackpotMajor,
        Self::JackpotGrand,
    ];

    /// Win ratio (multiple of bet) this outcome produces
    pub fn target_ratio(&self) -> f64 {
        match self {
            Self::Lose | Self::NearMiss => 0.0,
            Self::SubBet => 0.5,
            Self::BreakEven => 1.0,
            Self::SmallWin => 2.0,
            Self::MediumWin => 8.0,
            Self::BigWin => 18.0,
            Self::MegaWin => 35.0,
            Self::EpicWin => 70.0,
            Self::UltraWin => 150.0,
            Self::FreeSpins => 5.0,
            Self::Cascade => 6.0,
            Self::JackpotMini => 1000.0,
            Self::JackpotMinor => 2500.0,
            Self::JackpotMajor => 5000.0,
            Self::JackpotGrand => 10000.0,
        }
    }

    /// Does this outcome trigger a feature?
    pub fn triggers_feature(&self) -> bool {
        matches!(self, Self::FreeSpins)
    }

    /// Does this outcome trigger a jackpot?
    pub fn jackpot_tier(&self) -> Option<JackpotTier> {
        match self {
            Self::JackpotMini => Some(JackpotTier::Mini),
            Self::JackpotMinor => Some(JackpotTier::Minor),
            Self::JackpotMajor => Some(JackpotTier::Major),
            Self::JackpotGrand => Some(JackpotTier::Grand),
            _ => None,
        }
    }

    /// CLI / config name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lose => "lose",
            Self::SubBet => "sub_bet",
            Self::BreakEven => "break_even",
            Self::SmallWin => "small_win",
            Self::MediumWin => "medium_win",
            Self::BigWin => "big_win",
            Self::MegaWin => "mega_win",
            Self::EpicWin => "epic_win",
            Self::UltraWin => "ultra_win",
            Self::FreeSpins => "free_spins",
            Self::Cascade => "cascade",
            Self::NearMiss => "near_miss",
            Self::JackpotMini => "jackpot_mini",
            Self::JackpotMinor => "jackpot_minor",
            Self::JackpotMajor => "jackpot_major",
            Self::JackpotGrand => "jackpot_grand",
        }
    }
}

impl std::str::FromStr for ForcedOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|o| o.name() == wanted)
            .ok_or_else(|| format!("unknown outcome '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::StageTiming;

    fn generator() -> TimestampGenerator {
        TimestampGenerator::new(StageTiming::studio())
    }

    fn is_sorted(stages: &[StageEvent]) -> bool {
        stages.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms)
    }

    #[test]
    fn test_losing_spin_stages() {
        let outline = SpinOutline::new("s-1", 5, 1.0, 0.0);
        let result = outline.into_result(&mut generator());

        assert!(!result.is_win);
        assert_eq!(result.big_win_tier, BigWinHint::None);
        assert_eq!(
            result.stage_names(),
            vec![
                "SPIN_START",
                "REEL_STOP_0",
                "REEL_STOP_1",
                "REEL_STOP_2",
                "REEL_STOP_3",
                "REEL_STOP_4",
                "EVALUATE_WINS",
                "SPIN_END"
            ]
        );
        assert!(is_sorted(&result.stages));
    }

    #[test]
    fn test_win_stages() {
        let outline = SpinOutline::new("s-2", 5, 2.0, 60.0);
        let stages = outline.generate_stages(&mut generator());
        let names: Vec<_> = stages.iter().map(|s| s.stage_type.as_str()).collect();

        assert!(names.contains(&"WIN_PRESENT"));
        // 30x: engine calls it a mega win
        assert!(names.contains(&"BIG_WIN_TIER_2"));
        assert_eq!(names.iter().filter(|n| **n == "ROLLUP_TICK").count(), 10);
        assert!(is_sorted(&stages));
        assert_eq!(*names.last().unwrap(), "SPIN_END");
    }

    #[test]
    fn test_anticipation_wraps_last_reel() {
        let mut outline = SpinOutline::new("s-3", 5, 1.0, 0.0);
        outline.anticipation = true;
        let stages = outline.generate_stages(&mut generator());
        let names: Vec<_> = stages.iter().map(|s| s.stage_type.as_str()).collect();

        let on = names.iter().position(|n| *n == "ANTICIPATION_ON").unwrap();
        let last = names.iter().position(|n| *n == "REEL_STOP_4").unwrap();
        let off = names.iter().position(|n| *n == "ANTICIPATION_OFF").unwrap();
        assert!(on < last && last < off);
        assert!(is_sorted(&stages));
    }

    #[test]
    fn test_feature_cascade_jackpot_stages() {
        let mut outline = SpinOutline::new("s-4", 3, 1.0, 1000.0);
        outline.cascade_steps = 2;
        outline.feature_spins = Some(3);
        outline.jackpot = Some(JackpotTier::Mini);
        let stages = outline.generate_stages(&mut generator());
        let names: Vec<_> = stages.iter().map(|s| s.stage_type.as_str()).collect();

        assert_eq!(names.iter().filter(|n| **n == "CASCADE_STEP").count(), 2);
        assert_eq!(names.iter().filter(|n| **n == "FEATURE_STEP").count(), 3);
        assert!(names.contains(&"JACKPOT_PRESENT_MINI"));
        assert!(is_sorted(&stages));
    }

    #[test]
    fn test_hint_thresholds() {
        assert_eq!(hint_for_ratio(0.0), BigWinHint::None);
        assert_eq!(hint_for_ratio(0.5), BigWinHint::Win);
        assert_eq!(hint_for_ratio(18.0), BigWinHint::BigWin);
        assert_eq!(hint_for_ratio(100.0), BigWinHint::UltraWin);
    }

    #[test]
    fn test_forced_outcome() {
        assert_eq!(ForcedOutcome::SmallWin.target_ratio(), 2.0);
        assert!(ForcedOutcome::FreeSpins.triggers_feature());
        assert_eq!(ForcedOutcome::JackpotGrand.jackpot_tier(), Some(JackpotTier::Grand));
        assert_eq!("jackpot-mini".parse::<ForcedOutcome>(), Ok(ForcedOutcome::JackpotMini));
        assert!("jackpot".parse::<ForcedOutcome>().is_err());
    }

    #[test]
    fn test_result_json() {
        let result = SpinResult::new("s-5", 3.0).with_stages(vec![StageEvent::new("SPIN_START", 0)]);
        let json = serde_json::to_string(&result).unwrap();
        let back: SpinResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);

        // Hint is optional on the wire
        let minimal = r#"{"spin_id":"x","total_win":0.0,"is_win":false,"stages":[]}"#;
        let parsed: SpinResult = serde_json::from_str(minimal).unwrap();
        assert_eq!(parsed.big_win_tier, BigWinHint::None);
    }
}
