//! StageKind — Typed view over the engine's stage identifiers
//!
//! Engines send stages as plain strings (`"REEL_STOP_2"`, `"WIN_PRESENT_3"`).
//! The sync core keeps the string as the wire truth and parses it into a
//! `StageKind` whenever it needs to reason about a stage.

use std::fmt;

use crate::taxonomy::JackpotTier;

/// Prefix shared by all per-reel stop stages
pub const REEL_STOP_PREFIX: &str = "REEL_STOP_";

/// Synthetic stage emitted by the scheduler once every reel has landed.
/// Not part of the engine vocabulary.
pub const ALL_REELS_STOPPED: &str = "ALL_REELS_STOPPED";

/// Canonical stage kinds understood by the sync core
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageKind {
    // ═══════════════════════════════════════════════════════════════════════
    // SPIN LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════
    /// `SPIN_START`
    SpinStart,
    /// `REEL_STOP_<n>` (0-indexed reel)
    ReelStop(u8),
    /// `EVALUATE_WINS`
    EvaluateWins,
    /// `SPIN_END`
    SpinEnd,

    // ═══════════════════════════════════════════════════════════════════════
    // ANTICIPATION
    // ═══════════════════════════════════════════════════════════════════════
    /// `ANTICIPATION_ON`
    AnticipationOn,
    /// `ANTICIPATION_OFF`
    AnticipationOff,

    // ═══════════════════════════════════════════════════════════════════════
    // WIN LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════
    /// `WIN_PRESENT` or `WIN_PRESENT_<tier>`
    WinPresent(Option<String>),
    /// `ROLLUP_START`
    RollupStart,
    /// `ROLLUP_TICK`
    RollupTick,
    /// `ROLLUP_END`
    RollupEnd,
    /// `BIG_WIN_TIER_<n>` (1-based)
    BigWinTier(u8),

    // ═══════════════════════════════════════════════════════════════════════
    // FEATURES / CASCADES
    // ═══════════════════════════════════════════════════════════════════════
    FeatureEnter,
    FeatureStep,
    FeatureExit,
    CascadeStart,
    CascadeStep,
    CascadeEnd,

    // ═══════════════════════════════════════════════════════════════════════
    // JACKPOT
    // ═══════════════════════════════════════════════════════════════════════
    /// `JACKPOT_TRIGGER`
    JackpotTrigger,
    /// `JACKPOT_PRESENT_<tier>`
    JackpotPresent(JackpotTier),
    /// `JACKPOT_AWARD`
    JackpotAward,

    /// Anything outside the known vocabulary, kept verbatim
    Custom(String),
}

impl StageKind {
    /// Parse an engine stage identifier. Never fails: unknown names become
    /// `Custom`.
    pub fn parse(name: &str) -> Self {
        match name {
            "SPIN_START" => return Self::SpinStart,
            "EVALUATE_WINS" => return Self::EvaluateWins,
            "SPIN_END" => return Self::SpinEnd,
            "ANTICIPATION_ON" => return Self::AnticipationOn,
            "ANTICIPATION_OFF" => return Self::AnticipationOff,
            "WIN_PRESENT" => return Self::WinPresent(None),
            "ROLLUP_START" => return Self::RollupStart,
            "ROLLUP_TICK" => return Self::RollupTick,
            "ROLLUP_END" => return Self::RollupEnd,
            "FEATURE_ENTER" => return Self::FeatureEnter,
            "FEATURE_STEP" => return Self::FeatureStep,
            "FEATURE_EXIT" => return Self::FeatureExit,
            "CASCADE_START" => return Self::CascadeStart,
            "CASCADE_STEP" => return Self::CascadeStep,
            "CASCADE_END" => return Self::CascadeEnd,
            "JACKPOT_TRIGGER" => return Self::JackpotTrigger,
            "JACKPOT_AWARD" => return Self::JackpotAward,
            _ => {}
        }

        if let Some(reel) = name.strip_prefix(REEL_STOP_PREFIX) {
            if let Ok(index) = reel.parse::<u8>() {
                return Self::ReelStop(index);
            }
        }
        if let Some(tier) = name.strip_prefix("WIN_PRESENT_") {
            if !tier.is_empty() {
                return Self::WinPresent(Some(tier.to_string()));
            }
        }
        if let Some(level) = name.strip_prefix("BIG_WIN_TIER_") {
            if let Ok(level) = level.parse::<u8>() {
                return Self::BigWinTier(level);
            }
        }
        if let Some(tier) = name.strip_prefix("JACKPOT_PRESENT_") {
            if let Some(tier) = JackpotTier::from_stage_suffix(tier) {
                return Self::JackpotPresent(tier);
            }
        }

        Self::Custom(name.to_string())
    }

    /// Engine identifier for this stage
    pub fn name(&self) -> String {
        match self {
            Self::SpinStart => "SPIN_START".into(),
            Self::ReelStop(reel) => format!("{REEL_STOP_PREFIX}{reel}"),
            Self::EvaluateWins => "EVALUATE_WINS".into(),
            Self::SpinEnd => "SPIN_END".into(),
            Self::AnticipationOn => "ANTICIPATION_ON".into(),
            Self::AnticipationOff => "ANTICIPATION_OFF".into(),
            Self::WinPresent(None) => "WIN_PRESENT".into(),
            Self::WinPresent(Some(tier)) => format!("WIN_PRESENT_{tier}"),
            Self::RollupStart => "ROLLUP_START".into(),
            Self::RollupTick => "ROLLUP_TICK".into(),
            Self::RollupEnd => "ROLLUP_END".into(),
            Self::BigWinTier(level) => format!("BIG_WIN_TIER_{level}"),
            Self::FeatureEnter => "FEATURE_ENTER".into(),
            Self::FeatureStep => "FEATURE_STEP".into(),
            Self::FeatureExit => "FEATURE_EXIT".into(),
            Self::CascadeStart => "CASCADE_START".into(),
            Self::CascadeStep => "CASCADE_STEP".into(),
            Self::CascadeEnd => "CASCADE_END".into(),
            Self::JackpotTrigger => "JACKPOT_TRIGGER".into(),
            Self::JackpotPresent(tier) => format!("JACKPOT_PRESENT_{}", tier.stage_suffix()),
            Self::JackpotAward => "JACKPOT_AWARD".into(),
            Self::Custom(name) => name.clone(),
        }
    }

    /// Reel index if this is a reel stop
    pub fn reel_index(&self) -> Option<u8> {
        match self {
            Self::ReelStop(reel) => Some(*reel),
            _ => None,
        }
    }

    /// Is this an engine-side anticipation marker?
    pub fn is_anticipation(&self) -> bool {
        matches!(self, Self::AnticipationOn | Self::AnticipationOff)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vocabulary() {
        assert_eq!(StageKind::parse("SPIN_START"), StageKind::SpinStart);
        assert_eq!(StageKind::parse("REEL_STOP_4"), StageKind::ReelStop(4));
        assert_eq!(StageKind::parse("WIN_PRESENT"), StageKind::WinPresent(None));
        assert_eq!(
            StageKind::parse("WIN_PRESENT_3"),
            StageKind::WinPresent(Some("3".into()))
        );
        assert_eq!(StageKind::parse("BIG_WIN_TIER_2"), StageKind::BigWinTier(2));
        assert_eq!(
            StageKind::parse("JACKPOT_PRESENT_GRAND"),
            StageKind::JackpotPresent(JackpotTier::Grand)
        );
        assert_eq!(StageKind::parse("CASCADE_STEP"), StageKind::CascadeStep);
    }

    #[test]
    fn test_unknown_is_custom() {
        assert_eq!(
            StageKind::parse("REEL_STOP_X"),
            StageKind::Custom("REEL_STOP_X".into())
        );
        assert_eq!(
            StageKind::parse("MUSIC_LAYER_UP"),
            StageKind::Custom("MUSIC_LAYER_UP".into())
        );
    }

    #[test]
    fn test_name_matches_parse() {
        for name in [
            "SPIN_START",
            "REEL_STOP_0",
            "ANTICIPATION_OFF",
            "WIN_PRESENT_EQUAL",
            "ROLLUP_TICK",
            "BIG_WIN_TIER_5",
            "FEATURE_EXIT",
            "JACKPOT_PRESENT_MINI",
            "JACKPOT_AWARD",
            "SPIN_END",
        ] {
            assert_eq!(StageKind::parse(name).name(), name);
        }
    }
}
