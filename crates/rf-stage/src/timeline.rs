//! StageTimeline — The active spin's stage sequence plus a cursor
//!
//! Passive bookkeeping only: no timers, no callbacks. The visual sync
//! scheduler decides *when* stages fire and moves the cursor as they do.

use thiserror::Error;

use crate::event::StageEvent;

/// Timeline errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// Engine sent a timestamp lower than its predecessor
    #[error("stage {index} ({stage_type}) at {timestamp_ms}ms is earlier than previous stage at {previous_ms}ms")]
    OutOfOrderStages {
        index: usize,
        stage_type: String,
        previous_ms: u64,
        timestamp_ms: u64,
    },

    #[error("cursor cannot move backward from {current} to {requested}")]
    CursorBackward { current: usize, requested: usize },

    #[error("stage index {index} out of range (timeline has {len} stages)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered stage sequence for one spin with a monotonic cursor
#[derive(Debug, Clone, Default)]
pub struct StageTimeline {
    stages: Vec<StageEvent>,
    /// `None` = not started
    cursor: Option<usize>,
}

impl StageTimeline {
    /// Create an empty timeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sequence and reset the cursor.
    ///
    /// Timestamps must be non-decreasing. On failure the previous sequence
    /// and cursor are left untouched.
    pub fn load(&mut self, stages: Vec<StageEvent>) -> Result<(), TimelineError> {
        for (index, pair) in stages.windows(2).enumerate() {
            if pair[1].timestamp_ms < pair[0].timestamp_ms {
                return Err(TimelineError::OutOfOrderStages {
                    index: index + 1,
                    stage_type: pair[1].stage_type.clone(),
                    previous_ms: pair[0].timestamp_ms,
                    timestamp_ms: pair[1].timestamp_ms,
                });
            }
        }

        self.stages = stages;
        self.cursor = None;
        Ok(())
    }

    /// Drop the sequence (stale spin invalidated)
    pub fn clear(&mut self) {
        self.stages.clear();
        self.cursor = None;
    }

    /// Move the cursor forward to `index`.
    ///
    /// Re-advancing to the current index is a no-op; moving backward is
    /// rejected.
    pub fn advance_to(&mut self, index: usize) -> Result<&StageEvent, TimelineError> {
        if index >= self.stages.len() {
            return Err(TimelineError::IndexOutOfRange {
                index,
                len: self.stages.len(),
            });
        }
        if let Some(current) = self.cursor {
            if index < current {
                return Err(TimelineError::CursorBackward {
                    current,
                    requested: index,
                });
            }
        }

        self.cursor = Some(index);
        Ok(&self.stages[index])
    }

    /// Stage under the cursor
    pub fn current(&self) -> Option<&StageEvent> {
        self.cursor.and_then(|i| self.stages.get(i))
    }

    /// Cursor position (`None` = not started)
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Stage at `index`
    pub fn get(&self, index: usize) -> Option<&StageEvent> {
        self.stages.get(index)
    }

    pub fn stages(&self) -> &[StageEvent] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Fraction of stages reached so far (0.0 before start, 1.0 at the last stage)
    pub fn progress(&self) -> f64 {
        match self.cursor {
            Some(i) if !self.stages.is_empty() => (i + 1) as f64 / self.stages.len() as f64,
            _ => 0.0,
        }
    }

    /// Span between first and last stage
    pub fn duration_ms(&self) -> u64 {
        match (self.stages.first(), self.stages.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0,
        }
    }

    /// Index of the `REEL_STOP_<reel>` stage, if the engine sent one
    pub fn reel_stop_index(&self, reel: u8) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.kind().reel_index() == Some(reel))
    }

    /// Index of the last reel stop in the sequence
    pub fn last_reel_stop_index(&self) -> Option<usize> {
        self.stages
            .iter()
            .rposition(|s| s.kind().reel_index().is_some())
    }

    /// Highest reel index referenced by any `REEL_STOP_<n>` stage
    pub fn max_reel_index(&self) -> Option<u8> {
        self.stages.iter().filter_map(|s| s.kind().reel_index()).max()
    }
}
