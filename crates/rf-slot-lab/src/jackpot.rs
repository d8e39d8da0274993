//! Jackpot Ledger — Progressive Mini / Minor / Major / Grand pools
//!
//! Growth is driven by the active spin's contribution pool, one tick at a
//! time. Awards are a pure re-application of the engine's outcome: the tier
//! is selected from `total_win / bet`, never from an independent draw.

use rf_stage::JackpotTier;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, JackpotError};

/// Per-tier jackpot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackpotTierConfig {
    pub tier: JackpotTier,
    /// Value after an award (and at session start)
    pub seed_value: f64,
    /// Fraction of the contribution pool routed to this tier
    pub contribution_share: f64,
    /// Minimum win multiplier that makes this tier eligible (`None` = never by ratio)
    #[serde(default)]
    pub award_at_multiplier: Option<f64>,
}

impl JackpotTierConfig {
    pub fn new(tier: JackpotTier, seed_value: f64, contribution_share: f64, award_at: f64) -> Self {
        Self {
            tier,
            seed_value,
            contribution_share,
            award_at_multiplier: Some(award_at),
        }
    }
}

/// Jackpot system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackpotConfig {
    pub tiers: Vec<JackpotTierConfig>,
    /// Fraction of the bet that becomes the per-tick contribution pool
    #[serde(default = "default_contribution_rate")]
    pub contribution_rate: f64,
}

fn default_contribution_rate() -> f64 {
    0.011
}

impl JackpotConfig {
    /// Legacy four-tier progressive setup
    pub fn legacy() -> Self {
        Self {
            tiers: vec![
                JackpotTierConfig::new(JackpotTier::Mini, 50.0, 0.45, 1000.0),
                JackpotTierConfig::new(JackpotTier::Minor, 200.0, 0.27, 2500.0),
                JackpotTierConfig::new(JackpotTier::Major, 1000.0, 0.18, 5000.0),
                JackpotTierConfig::new(JackpotTier::Grand, 10000.0, 0.10, 10000.0),
            ],
            contribution_rate: default_contribution_rate(),
        }
    }

    /// Config for `tier`
    pub fn tier(&self, tier: JackpotTier) -> Option<&JackpotTierConfig> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let err = |msg: String| Err(ConfigurationError::Jackpot(msg));

        if self.tiers.is_empty() {
            return Err(ConfigurationError::Empty("no jackpot tiers".into()));
        }
        for tier in JackpotTier::ALL {
            let count = self.tiers.iter().filter(|t| t.tier == tier).count();
            if count != 1 {
                return err(format!("{tier:?} configured {count} times, expected once"));
            }
        }
        if !(self.contribution_rate.is_finite() && self.contribution_rate >= 0.0) {
            return err(format!("contribution rate {} invalid", self.contribution_rate));
        }

        let mut share_sum = 0.0;
        for t in &self.tiers {
            if !(t.seed_value.is_finite() && t.seed_value > 0.0) {
                return err(format!("{:?} seed must be positive, got {}", t.tier, t.seed_value));
            }
            if !(t.contribution_share.is_finite() && t.contribution_share >= 0.0) {
                return err(format!("{:?} share {} invalid", t.tier, t.contribution_share));
            }
            if let Some(at) = t.award_at_multiplier {
                if !(at > 0.0) {
                    return err(format!("{:?} award threshold must be positive", t.tier));
                }
            }
            share_sum += t.contribution_share;
        }
        if (share_sum - 1.0).abs() > 1e-9 {
            return err(format!("contribution shares sum to {share_sum}, expected 1.0"));
        }

        // Rarer tiers may never be easier to hit than more common ones
        let mut floor = 0.0_f64;
        for tier in JackpotTier::ALL {
            if let Some(at) = self.tier(tier).and_then(|t| t.award_at_multiplier) {
                if at < floor {
                    return err(format!(
                        "{tier:?} award threshold {at}x is below a more common tier's {floor}x"
                    ));
                }
                floor = at;
            }
        }

        Ok(())
    }
}

impl Default for JackpotConfig {
    fn default() -> Self {
        Self::legacy()
    }
}

/// Result of a jackpot award
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JackpotAward {
    pub tier: JackpotTier,
    pub amount: f64,
}

/// Current value of every tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JackpotSnapshot {
    pub mini: f64,
    pub minor: f64,
    pub major: f64,
    pub grand: f64,
}

impl JackpotSnapshot {
    pub fn get(&self, tier: JackpotTier) -> f64 {
        match tier {
            JackpotTier::Mini => self.mini,
            JackpotTier::Minor => self.minor,
            JackpotTier::Major => self.major,
            JackpotTier::Grand => self.grand,
        }
    }
}

/// Progressive jackpot accumulator
#[derive(Debug, Clone)]
pub struct JackpotLedger {
    config: JackpotConfig,
    /// Indexed by `JackpotTier::index()`
    values: [f64; 4],
    /// Active spin's per-tick contribution (0 = no growth)
    pool: f64,
    total_contributed: f64,
}

impl JackpotLedger {
    /// Create a ledger with every tier at its seed
    pub fn new(config: JackpotConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let values = seeds(&config);
        Ok(Self {
            config,
            values,
            pool: 0.0,
            total_contributed: 0.0,
        })
    }

    /// Restore previously captured values
    pub fn with_values(config: JackpotConfig, snapshot: JackpotSnapshot) -> Result<Self, ConfigurationError> {
        let mut ledger = Self::new(config)?;
        for tier in JackpotTier::ALL {
            ledger.values[tier.index()] = snapshot.get(tier);
        }
        Ok(ledger)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GROWTH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Grow every tier by `pool * share * dt`
    pub fn accrue(&mut self, contribution_pool: f64, dt_fraction_of_tick: f64) {
        let pool = sanitize(contribution_pool);
        let dt = sanitize(dt_fraction_of_tick);
        if pool == 0.0 || dt == 0.0 {
            return;
        }

        for t in &self.config.tiers {
            let growth = pool * t.contribution_share * dt;
            self.values[t.tier.index()] += growth;
            self.total_contributed += growth;
        }
    }

    /// Open the contribution pool for a placed bet
    pub fn begin_contribution(&mut self, bet: f64) {
        self.pool = sanitize(bet) * self.config.contribution_rate;
    }

    /// Close the pool; growth stops immediately
    pub fn stop_contribution(&mut self) {
        self.pool = 0.0;
    }

    /// Accrue from the active pool
    pub fn tick(&mut self, dt_fraction_of_tick: f64) {
        self.accrue(self.pool, dt_fraction_of_tick);
    }

    pub fn contribution_pool(&self) -> f64 {
        self.pool
    }

    pub fn is_contributing(&self) -> bool {
        self.pool > 0.0
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // AWARDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Tiers whose threshold `ratio` reaches, most common first
    pub fn eligible_tiers(&self, ratio: f64) -> Vec<JackpotTier> {
        JackpotTier::ALL
            .into_iter()
            .filter(|&tier| {
                self.config
                    .tier(tier)
                    .and_then(|t| t.award_at_multiplier)
                    .is_some_and(|at| ratio >= at)
            })
            .collect()
    }

    /// Rarest eligible tier for a win multiplier
    pub fn select_award(&self, ratio: f64) -> Option<JackpotTier> {
        self.eligible_tiers(ratio).into_iter().max()
    }

    /// Pay out `tier` and reset it to its seed
    pub fn award(&mut self, tier: JackpotTier) -> Result<f64, JackpotError> {
        let value = self.values[tier.index()];
        if !(value > 0.0) {
            return Err(JackpotError::NotSeeded { tier, value });
        }

        let seed = self.config.tier(tier).map(|t| t.seed_value).unwrap_or(0.0);
        self.values[tier.index()] = seed;
        log::info!("Jackpot {} awarded: {:.2} (reset to {:.2})", tier.display_name(), value, seed);
        Ok(value)
    }

    /// Select and pay the award for a result, if any
    pub fn award_for_ratio(&mut self, ratio: f64) -> Result<Option<JackpotAward>, JackpotError> {
        match self.select_award(ratio) {
            Some(tier) => {
                let amount = self.award(tier)?;
                Ok(Some(JackpotAward { tier, amount }))
            }
            None => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn current_value(&self, tier: JackpotTier) -> f64 {
        self.values[tier.index()]
    }

    pub fn snapshot(&self) -> JackpotSnapshot {
        JackpotSnapshot {
            mini: self.values[0],
            minor: self.values[1],
            major: self.values[2],
            grand: self.values[3],
        }
    }

    /// Total growth since the ledger was created or last reset
    pub fn total_contributed(&self) -> f64 {
        self.total_contributed
    }

    /// Explicit "new session": every tier back to its seed
    pub fn reset_to_seeds(&mut self) {
        self.values = seeds(&self.config);
        self.pool = 0.0;
        self.total_contributed = 0.0;
    }

    pub fn config(&self) -> &JackpotConfig {
        &self.config
    }
}

fn seeds(config: &JackpotConfig) -> [f64; 4] {
    let mut values = [0.0; 4];
    for t in &config.tiers {
        values[t.tier.index()] = t.seed_value;
    }
    values
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
