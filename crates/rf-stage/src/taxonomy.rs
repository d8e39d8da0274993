//! Stage Taxonomy — Enums for game elements
//!
//! Classifications shared between the engine payloads and the sync core.

use serde::{Deserialize, Serialize};

/// Big win hint sent by the engine alongside a spin result
///
/// Advisory only: the core's own classifier decides the display tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BigWinHint {
    #[default]
    None,
    Win,
    BigWin,
    MegaWin,
    EpicWin,
    UltraWin,
}

impl BigWinHint {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Win => "WIN",
            Self::BigWin => "BIG WIN",
            Self::MegaWin => "MEGA WIN",
            Self::EpicWin => "EPIC WIN",
            Self::UltraWin => "ULTRA WIN",
        }
    }

    /// Rough escalation level (0 = no win, 1 = regular win, 2.. = big win ladder)
    pub fn level(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Win => 1,
            Self::BigWin => 2,
            Self::MegaWin => 3,
            Self::EpicWin => 4,
            Self::UltraWin => 5,
        }
    }

    /// Does the hint claim a big win?
    pub fn is_big_win(&self) -> bool {
        self.level() >= 2
    }
}

/// Progressive jackpot tier, ordered from most common to rarest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JackpotTier {
    Mini,
    Minor,
    Major,
    Grand,
}

impl JackpotTier {
    /// All tiers, most common first
    pub const ALL: [JackpotTier; 4] = [Self::Mini, Self::Minor, Self::Major, Self::Grand];

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Mini => "Mini",
            Self::Minor => "Minor",
            Self::Major => "Major",
            Self::Grand => "Grand",
        }
    }

    /// Suffix used in `JACKPOT_PRESENT_<tier>`
    pub fn stage_suffix(&self) -> &'static str {
        match self {
            Self::Mini => "MINI",
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Grand => "GRAND",
        }
    }

    /// Parse a `JACKPOT_PRESENT_<tier>` suffix (case-insensitive)
    pub fn from_stage_suffix(suffix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.stage_suffix().eq_ignore_ascii_case(suffix))
    }

    /// Position in `ALL` (0 = Mini)
    pub fn index(&self) -> usize {
        match self {
            Self::Mini => 0,
            Self::Minor => 1,
            Self::Major => 2,
            Self::Grand => 3,
        }
    }
}
