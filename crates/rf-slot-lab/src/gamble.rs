//! Gamble — Double-or-nothing on a pending win

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Gamble configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GambleConfig {
    /// Attempts allowed per presentation
    pub max_attempts: u8,
    /// A won gamble never pushes the pending win above this
    pub win_cap: f64,
    /// Fixed seed for reproducible sessions
    pub seed: Option<u64>,
}

impl Default for GambleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            win_cap: 10000.0,
            seed: None,
        }
    }
}

impl GambleConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.win_cap.is_finite() && self.win_cap > 0.0) {
            return Err(ConfigurationError::Malformed(format!(
                "gamble win cap must be positive, got {}",
                self.win_cap
            )));
        }
        Ok(())
    }
}

/// Card colour guess
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GambleChoice {
    Red,
    Black,
}

/// Result of one gamble attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GambleOutcome {
    pub choice: GambleChoice,
    pub drawn: GambleChoice,
    pub won: bool,
    /// Pending win after the attempt (0 on a loss)
    pub pending_win: f64,
    pub attempts_left: u8,
}

/// Gamble state for the current presentation
#[derive(Debug)]
pub struct Gamble {
    config: GambleConfig,
    rng: StdRng,
    attempts_used: u8,
}

impl Gamble {
    pub fn new(config: GambleConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            rng,
            attempts_used: 0,
        }
    }

    /// New presentation, full attempts again
    pub fn reset(&mut self) {
        self.attempts_used = 0;
    }

    pub fn attempts_left(&self) -> u8 {
        self.config.max_attempts.saturating_sub(self.attempts_used)
    }

    /// Why a gamble on `pending_win` is not allowed, if it isn't
    pub fn check(&self, pending_win: f64) -> Result<(), &'static str> {
        if pending_win <= 0.0 {
            return Err("nothing to gamble");
        }
        if self.attempts_left() == 0 {
            return Err("no attempts left");
        }
        if pending_win >= self.config.win_cap {
            return Err("win cap reached");
        }
        Ok(())
    }

    /// Draw a card. Call `check` first.
    pub fn resolve(&mut self, choice: GambleChoice, pending_win: f64) -> GambleOutcome {
        self.attempts_used = self.attempts_used.saturating_add(1);
        let drawn = if self.rng.random_bool(0.5) {
            GambleChoice::Red
        } else {
            GambleChoice::Black
        };
        let won = drawn == choice;
        let pending_win = if won {
            (pending_win * 2.0).min(self.config.win_cap)
        } else {
            0.0
        };

        GambleOutcome {
            choice,
            drawn,
            won,
            pending_win,
            attempts_left: self.attempts_left(),
        }
    }

    pub fn config(&self) -> &GambleConfig {
        &self.config
    }
}
