//! Win Tiers — Config-driven win classification
//!
//! A single classifier takes an explicit `TierConfig`. The legacy hardcoded
//! ladder is just `TierConfig::legacy()`, not a separate code path.
//!
//! ## Band rules
//!
//! ```text
//! regular:  (from, to]      first band closed at 0, last band open at the threshold
//!           [v, v]          zero-width band, claims exactly v (break-even)
//! big win:  [from, to)      first band starts at the threshold, last ends at +inf
//! ```
//!
//! Together the bands partition `[0, ∞)`. Anything else is a
//! `ConfigurationError`.

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, ConfigurationError};

/// Legacy big win threshold (multiplier of bet)
pub const LEGACY_BIG_WIN_THRESHOLD: f64 = 20.0;

/// Regular (sub-threshold) win tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinTierDefinition {
    /// Tier id: -1 = sub-bet, 0 = break-even, 1.. = W1..Wn
    pub tier_id: i32,

    /// Lower bound (exclusive unless this is the first band)
    pub from_multiplier: f64,

    /// Upper bound (inclusive); equal to `from_multiplier` for a point band
    #[serde(default = "upper_bound::unbounded", with = "upper_bound")]
    pub to_multiplier: f64,

    /// Label shown by the rendering layer
    pub display_label: String,

    /// Rollup length, consumed by the rendering layer
    #[serde(default = "default_rollup_duration")]
    pub rollup_duration_ms: u64,

    /// Rollup tick rate, consumed by the rendering layer
    #[serde(default = "default_rollup_tick_rate")]
    pub rollup_tick_rate_hz: u32,
}

fn default_rollup_duration() -> u64 {
    1500
}

fn default_rollup_tick_rate() -> u32 {
    15
}

impl WinTierDefinition {
    pub fn new(
        tier_id: i32,
        from_multiplier: f64,
        to_multiplier: f64,
        display_label: impl Into<String>,
        rollup_duration_ms: u64,
        rollup_tick_rate_hz: u32,
    ) -> Self {
        Self {
            tier_id,
            from_multiplier,
            to_multiplier,
            display_label: display_label.into(),
            rollup_duration_ms,
            rollup_tick_rate_hz,
        }
    }

    /// Zero-width band claiming exactly one multiplier
    pub fn is_point(&self) -> bool {
        self.from_multiplier == self.to_multiplier
    }

    /// Suffix used in `WIN_PRESENT_<tier>`
    pub fn stage_suffix(&self) -> String {
        match self.tier_id {
            -1 => "LOW".to_string(),
            0 => "EQUAL".to_string(),
            n => n.to_string(),
        }
    }
}

/// Escalating big win tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigWinTierDefinition {
    /// 1-based position in the big win ladder
    pub tier_id: u32,

    /// Lower bound (inclusive)
    pub from_multiplier: f64,

    /// Upper bound (exclusive), +∞ when omitted
    #[serde(default = "upper_bound::unbounded", with = "upper_bound")]
    pub to_multiplier: f64,

    pub display_label: String,

    /// Celebration length for the rendering layer
    #[serde(default)]
    pub presentation_duration_ms: u64,
}

impl BigWinTierDefinition {
    pub fn new(
        tier_id: u32,
        from_multiplier: f64,
        to_multiplier: f64,
        display_label: impl Into<String>,
        presentation_duration_ms: u64,
    ) -> Self {
        Self {
            tier_id,
            from_multiplier,
            to_multiplier,
            display_label: display_label.into(),
            presentation_duration_ms,
        }
    }
}

/// Complete tier table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Multiplier at/above which a win is a big win
    #[serde(default = "default_threshold")]
    pub big_win_threshold: f64,

    /// Regular tiers (any order; validated and sorted internally)
    pub regular_tiers: Vec<WinTierDefinition>,

    /// Big win ladder (any order)
    #[serde(default)]
    pub big_win_tiers: Vec<BigWinTierDefinition>,
}

fn default_threshold() -> f64 {
    LEGACY_BIG_WIN_THRESHOLD
}

impl TierConfig {
    /// Legacy ladder: W_LOW / W_EQUAL / W1..W5 under 20x, big wins at 20/50/100/250/500
    pub fn legacy() -> Self {
        Self {
            big_win_threshold: LEGACY_BIG_WIN_THRESHOLD,
            regular_tiers: vec![
                WinTierDefinition::new(-1, 0.0, 1.0, "WIN", 800, 15),
                WinTierDefinition::new(0, 1.0, 1.0, "WIN", 1000, 15),
                WinTierDefinition::new(1, 1.0, 2.0, "WIN", 1500, 15),
                WinTierDefinition::new(2, 2.0, 5.0, "NICE WIN", 2000, 20),
                WinTierDefinition::new(3, 5.0, 8.0, "GREAT WIN", 2500, 20),
                WinTierDefinition::new(4, 8.0, 13.0, "SUPER WIN", 3000, 25),
                WinTierDefinition::new(5, 13.0, LEGACY_BIG_WIN_THRESHOLD, "AWESOME WIN", 4000, 30),
            ],
            big_win_tiers: vec![
                BigWinTierDefinition::new(1, 20.0, 50.0, "BIG WIN", 5000),
                BigWinTierDefinition::new(2, 50.0, 100.0, "MEGA WIN", 8000),
                BigWinTierDefinition::new(3, 100.0, 250.0, "EPIC WIN", 12000),
                BigWinTierDefinition::new(4, 250.0, 500.0, "ULTRA WIN", 15000),
                BigWinTierDefinition::new(5, 500.0, f64::INFINITY, "MAX WIN", 20000),
            ],
        }
    }

    /// Validate and normalise into a band table partitioning `[0, ∞)`
    pub fn bands(&self) -> Result<Vec<Band>, ConfigurationError> {
        if self.regular_tiers.is_empty() {
            return Err(ConfigurationError::Empty("no regular win tiers".into()));
        }

        let mut regular: Vec<usize> = (0..self.regular_tiers.len()).collect();
        for &i in &regular {
            let t = &self.regular_tiers[i];
            if t.from_multiplier.is_nan() || t.to_multiplier.is_nan() {
                return Err(malformed(format!("tier {} has NaN bounds", t.tier_id)));
            }
            if t.from_multiplier < 0.0 || t.to_multiplier < t.from_multiplier {
                return Err(malformed(format!(
                    "tier {} has inverted or negative bounds [{}, {}]",
                    t.tier_id, t.from_multiplier, t.to_multiplier
                )));
            }
        }
        regular.sort_by(|&a, &b| {
            let (a, b) = (&self.regular_tiers[a], &self.regular_tiers[b]);
            a.from_multiplier
                .total_cmp(&b.from_multiplier)
                .then(a.to_multiplier.total_cmp(&b.to_multiplier))
        });

        let has_big_wins = !self.big_win_tiers.is_empty();
        let ceiling = if has_big_wins {
            if !(self.big_win_threshold.is_finite() && self.big_win_threshold > 0.0) {
                return Err(malformed(format!(
                    "big win threshold must be positive and finite, got {}",
                    self.big_win_threshold
                )));
            }
            self.big_win_threshold
        } else {
            f64::INFINITY
        };

        let first = &self.regular_tiers[regular[0]];
        if first.from_multiplier != 0.0 {
            return Err(malformed(format!(
                "gap: lowest tier {} starts at {}x instead of 0x",
                first.tier_id, first.from_multiplier
            )));
        }

        for pair in regular.windows(2) {
            let (prev, next) = (&self.regular_tiers[pair[0]], &self.regular_tiers[pair[1]]);
            if next.from_multiplier > prev.to_multiplier {
                return Err(malformed(format!(
                    "gap between tier {} ({}x) and tier {} ({}x)",
                    prev.tier_id, prev.to_multiplier, next.tier_id, next.from_multiplier
                )));
            }
            if next.from_multiplier < prev.to_multiplier || (prev.is_point() && next.is_point()) {
                return Err(malformed(format!(
                    "tiers {} and {} overlap",
                    prev.tier_id, next.tier_id
                )));
            }
        }

        let last = &self.regular_tiers[regular[regular.len() - 1]];
        if last.is_point() || last.to_multiplier != ceiling {
            return Err(malformed(format!(
                "highest regular tier {} must end at {}x, ends at {}x",
                last.tier_id, ceiling, last.to_multiplier
            )));
        }

        let mut bands = Vec::with_capacity(regular.len() + self.big_win_tiers.len());
        for (pos, &i) in regular.iter().enumerate() {
            let t = &self.regular_tiers[i];
            if t.is_point() {
                bands.push(Band {
                    lower: t.from_multiplier,
                    upper: t.to_multiplier,
                    lower_inclusive: true,
                    upper_inclusive: true,
                    slot: BandSlot::Regular(i),
                });
                continue;
            }
            let next_is_point = regular
                .get(pos + 1)
                .is_some_and(|&n| self.regular_tiers[n].is_point());
            let is_last = pos + 1 == regular.len();
            bands.push(Band {
                lower: t.from_multiplier,
                upper: t.to_multiplier,
                lower_inclusive: pos == 0,
                upper_inclusive: !next_is_point && !is_last,
                slot: BandSlot::Regular(i),
            });
        }

        if has_big_wins {
            let mut big: Vec<usize> = (0..self.big_win_tiers.len()).collect();
            big.sort_by(|&a, &b| {
                self.big_win_tiers[a]
                    .from_multiplier
                    .total_cmp(&self.big_win_tiers[b].from_multiplier)
            });

            let mut expected_from = self.big_win_threshold;
            for (pos, &i) in big.iter().enumerate() {
                let t = &self.big_win_tiers[i];
                if t.from_multiplier != expected_from {
                    return Err(malformed(format!(
                        "big win tier {} starts at {}x, expected {}x",
                        t.tier_id, t.from_multiplier, expected_from
                    )));
                }
                // NaN fails this too
                if !(t.to_multiplier > t.from_multiplier) {
                    return Err(malformed(format!(
                        "big win tier {} is empty or inverted",
                        t.tier_id
                    )));
                }
                let is_last = pos + 1 == big.len();
                if is_last != t.to_multiplier.is_infinite() {
                    return Err(malformed(format!(
                        "only the highest big win tier may be unbounded (tier {})",
                        t.tier_id
                    )));
                }
                bands.push(Band {
                    lower: t.from_multiplier,
                    upper: t.to_multiplier,
                    lower_inclusive: true,
                    upper_inclusive: false,
                    slot: BandSlot::BigWin(i),
                });
                expected_from = t.to_multiplier;
            }
        }

        Ok(bands)
    }

    /// Validate without keeping the band table
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.bands().map(|_| ())
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self::legacy()
    }
}

fn malformed(msg: String) -> ConfigurationError {
    ConfigurationError::Malformed(msg)
}

/// Which definition a band belongs to (index into the config's vectors)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandSlot {
    Regular(usize),
    BigWin(usize),
}

/// Normalised multiplier interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
    pub lower_inclusive: bool,
    pub upper_inclusive: bool,
    pub slot: BandSlot,
}

impl Band {
    /// Check if a multiplier falls in this band
    pub fn contains(&self, ratio: f64) -> bool {
        let above = if self.lower_inclusive {
            ratio >= self.lower
        } else {
            ratio > self.lower
        };
        let below = if self.upper_inclusive {
            ratio <= self.upper
        } else {
            ratio < self.upper
        };
        above && below
    }
}

/// Classification outcome for one spin
#[derive(Debug, Clone, PartialEq)]
pub struct WinTierResult {
    pub is_big_win: bool,
    /// `total_win / bet`
    pub multiplier: f64,
    /// Set when `!is_big_win` and the spin won something
    pub regular_tier: Option<WinTierDefinition>,
    /// Set when `is_big_win`
    pub big_win_tier: Option<BigWinTierDefinition>,
    /// Highest tier id of the big win ladder (for "tier 2 of 5" displays)
    pub big_win_max_tier: Option<u32>,
}

impl WinTierResult {
    /// Result for `total_win <= 0`
    pub fn no_win() -> Self {
        Self {
            is_big_win: false,
            multiplier: 0.0,
            regular_tier: None,
            big_win_tier: None,
            big_win_max_tier: None,
        }
    }

    /// No tier assigned (no win)
    pub fn is_empty(&self) -> bool {
        self.regular_tier.is_none() && self.big_win_tier.is_none()
    }

    pub fn display_label(&self) -> Option<&str> {
        match (&self.big_win_tier, &self.regular_tier) {
            (Some(big), _) => Some(big.display_label.as_str()),
            (None, Some(regular)) => Some(regular.display_label.as_str()),
            (None, None) => None,
        }
    }

    /// Configured presentation length
    pub fn presentation_duration_ms(&self) -> u64 {
        match (&self.big_win_tier, &self.regular_tier) {
            (Some(big), _) => big.presentation_duration_ms,
            (None, Some(regular)) => regular.rollup_duration_ms,
            (None, None) => 0,
        }
    }

    /// Stage name the rendering layer expects for this tier
    pub fn presentation_stage(&self) -> Option<String> {
        match (&self.big_win_tier, &self.regular_tier) {
            (Some(big), _) => Some(format!("BIG_WIN_TIER_{}", big.tier_id)),
            (None, Some(regular)) => Some(format!("WIN_PRESENT_{}", regular.stage_suffix())),
            (None, None) => None,
        }
    }
}

/// Pure win classifier over a validated tier table
#[derive(Debug, Clone)]
pub struct WinTierClassifier {
    config: TierConfig,
    bands: Vec<Band>,
    max_big_tier: Option<u32>,
}

impl WinTierClassifier {
    /// Validate the config once; classification is infallible for valid input afterwards
    pub fn new(config: TierConfig) -> Result<Self, ConfigurationError> {
        let bands = config.bands()?;
        let max_big_tier = config.big_win_tiers.iter().map(|t| t.tier_id).max();
        Ok(Self {
            config,
            bands,
            max_big_tier,
        })
    }

    /// Classify `total_win` against `bet`
    pub fn classify(&self, total_win: f64, bet: f64) -> Result<WinTierResult, ClassifyError> {
        if !(bet.is_finite() && bet > 0.0) {
            return Err(ClassifyError::InvalidBet(bet));
        }
        if total_win.is_nan() {
            return Err(ClassifyError::InvalidWin(total_win));
        }
        if total_win <= 0.0 {
            return Ok(WinTierResult::no_win());
        }

        let ratio = total_win / bet;

        if !self.config.big_win_tiers.is_empty() && ratio >= self.config.big_win_threshold {
            // Highest floor first: a ratio on a boundary belongs to the higher band
            let tier = self
                .bands
                .iter()
                .rev()
                .filter_map(|b| match b.slot {
                    BandSlot::BigWin(i) => Some(&self.config.big_win_tiers[i]),
                    BandSlot::Regular(_) => None,
                })
                .find(|t| ratio >= t.from_multiplier)
                .ok_or_else(|| malformed(format!("no big win tier contains {ratio}x")))?;

            return Ok(WinTierResult {
                is_big_win: true,
                multiplier: ratio,
                regular_tier: None,
                big_win_tier: Some(tier.clone()),
                big_win_max_tier: self.max_big_tier,
            });
        }

        let tier = self
            .bands
            .iter()
            .find_map(|b| match b.slot {
                BandSlot::Regular(i) if b.contains(ratio) => Some(&self.config.regular_tiers[i]),
                _ => None,
            })
            .ok_or_else(|| malformed(format!("no regular tier contains {ratio}x")))?;

        Ok(WinTierResult {
            is_big_win: false,
            multiplier: ratio,
            regular_tier: Some(tier.clone()),
            big_win_tier: None,
            big_win_max_tier: None,
        })
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    /// Normalised bands, lowest first
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }
}

/// One-shot classification against an unvalidated config
pub fn classify(
    total_win: f64,
    bet: f64,
    config: &TierConfig,
) -> Result<WinTierResult, ClassifyError> {
    WinTierClassifier::new(config.clone())?.classify(total_win, bet)
}

/// Serde glue: +∞ upper bounds are written as `null` / omitted
mod upper_bound {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn unbounded() -> f64 {
        f64::INFINITY
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}
