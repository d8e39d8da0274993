//! # rf-slot-lab — Stage synchronisation core for Slot Lab
//!
//! Takes spin results from a game/audio engine and decides what tier a win
//! is, how the progressive jackpots move, and when every stage trigger
//! fires relative to the staggered reel-stop animation.
//!
//! ## Architecture
//!
//! ```text
//! SlotEngine ──SpinResult──> SessionController
//!                               ├── WinTierClassifier   (pure tier math)
//!                               ├── JackpotLedger       (growth + awards)
//!                               ├── StageTimeline       (sequence + cursor)
//!                               └── VisualSyncScheduler (clock-driven triggers)
//!                                         │
//!                                         v
//!                                    RenderSink
//! ```
//!
//! Everything runs on the thread that owns the controller. Engine calls are
//! the only asynchronous part and come back through `deliver_result`.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod gamble;
pub mod jackpot;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod spin;
pub mod timing;
pub mod win_tiers;

pub use clock::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use gamble::*;
pub use jackpot::*;
pub use render::*;
pub use scheduler::*;
pub use session::*;
pub use spin::*;
pub use timing::*;
pub use win_tiers::*;
