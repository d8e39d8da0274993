//! Error types for the Slot Lab sync core

use rf_stage::{JackpotTier, TimelineError};
use thiserror::Error;

/// Malformed tier / jackpot / timing configuration.
///
/// Fatal at startup; never silently replaced with defaults.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("configuration is empty: {0}")]
    Empty(String),

    #[error("malformed tier bands: {0}")]
    Malformed(String),

    #[error("invalid jackpot configuration: {0}")]
    Jackpot(String),

    #[error("invalid timing configuration: {0}")]
    Timing(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Win classification errors
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("bet must be positive and finite, got {0}")]
    InvalidBet(f64),

    #[error("win amount must be a number, got {0}")]
    InvalidWin(f64),
}

/// Jackpot ledger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JackpotError {
    /// Award requested on a tier that was never seeded
    #[error("jackpot {tier:?} is not seeded (value {value})")]
    NotSeeded { tier: JackpotTier, value: f64 },
}

/// Session controller errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("insufficient funds: bet {bet} exceeds balance {balance}")]
    InsufficientFunds { bet: f64, balance: f64 },

    #[error("engine not ready")]
    NotReady,

    #[error("bet must be positive and finite, got {0}")]
    InvalidBet(f64),

    #[error("a spin is already in progress")]
    AlreadySpinning,

    #[error("a presentation skip is already in progress")]
    SkipInProgress,

    #[error("no presentation is active")]
    NotPresenting,

    #[error("no spin is in progress")]
    NotSpinning,

    #[error("operation requires an idle session")]
    NotIdle,

    #[error("cannot stop a spin after its result has arrived")]
    StopAfterResult,

    #[error("result for superseded spin generation {generation} ignored")]
    StaleResult { generation: u64 },

    #[error("no presentation skip is pending")]
    NoSkipPending,

    #[error("rendering layer unreachable, skip not requested")]
    RenderUnavailable,

    #[error("skip token {0} does not match the pending skip")]
    UnknownSkipToken(u64),

    #[error("engine returned no result for spin generation {generation}")]
    NoResult { generation: u64 },

    #[error("engine reported an invalid win {0}")]
    InvalidWin(f64),

    #[error("stage references reel {reel} but only {reel_count} reels are configured")]
    UnknownReel { reel: u8, reel_count: u8 },

    #[error("gamble unavailable: {0}")]
    GambleUnavailable(&'static str),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Jackpot(#[from] JackpotError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
