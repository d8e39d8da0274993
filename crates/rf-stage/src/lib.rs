//! # rf-stage — FluxForge Stage System
//!
//! Stage vocabulary and the per-spin stage timeline.
//! FluxForge never understands engine-specific events — only STAGES.
//!
//! ## Philosophy
//!
//! All slot games, regardless of engine, pass through the same semantic phases:
//! - Spin starts → Reels stop → Wins evaluated → Features triggered
//!
//! Engines send those phases as timestamped `StageEvent`s. This crate parses
//! them into `StageKind`s and holds the active spin's `StageTimeline`.

pub mod event;
pub mod stage;
pub mod taxonomy;
pub mod timeline;

pub use event::*;
pub use stage::*;
pub use taxonomy::*;
pub use timeline::*;
