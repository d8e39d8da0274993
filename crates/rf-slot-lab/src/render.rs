//! Rendering-layer seam
//!
//! The controller talks to the UI through `RenderSink`. `ChannelSink` turns
//! those calls into `RenderEvent`s on a crossbeam channel for a UI thread to
//! drain. Events are never dropped while the receiver lives.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::warn;
use rf_stage::StagePayload;

use crate::session::SessionState;

/// Proof that a skip was requested. Handing it back to
/// `SessionController::complete_skip` consumes it, so a fade-out can
/// complete only once.
#[derive(Debug, PartialEq, Eq)]
pub struct SkipToken {
    id: u64,
}

impl SkipToken {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Observer implemented by the rendering layer
pub trait RenderSink {
    /// A stage reached its visual moment. Called once per scheduled trigger.
    fn trigger_stage(&mut self, stage_type: &str, payload: &StagePayload);

    fn on_state_change(&mut self, state: SessionState);

    /// Fade the current presentation out, then return `token` to the controller.
    ///
    /// Hands the token back when the request cannot reach the rendering layer.
    fn request_skip_presentation(&mut self, token: SkipToken) -> Result<(), SkipToken>;
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn trigger_stage(&mut self, stage_type: &str, payload: &StagePayload) {
        (**self).trigger_stage(stage_type, payload)
    }

    fn on_state_change(&mut self, state: SessionState) {
        (**self).on_state_change(state)
    }

    fn request_skip_presentation(&mut self, token: SkipToken) -> Result<(), SkipToken> {
        (**self).request_skip_presentation(token)
    }
}

/// Message form of the `RenderSink` calls
#[derive(Debug, PartialEq)]
pub enum RenderEvent {
    Stage {
        stage_type: String,
        payload: StagePayload,
    },
    StateChanged(SessionState),
    SkipRequested(SkipToken),
}

impl RenderEvent {
    pub fn stage_type(&self) -> Option<&str> {
        match self {
            Self::Stage { stage_type, .. } => Some(stage_type),
            _ => None,
        }
    }
}

/// `RenderSink` writing to a crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<RenderEvent>,
}

impl ChannelSink {
    pub fn unbounded() -> (Self, Receiver<RenderEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: RenderEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Render layer gone, dropped {:?}", e.into_inner());
                false
            }
        }
    }
}

impl RenderSink for ChannelSink {
    fn trigger_stage(&mut self, stage_type: &str, payload: &StagePayload) {
        self.send(RenderEvent::Stage {
            stage_type: stage_type.to_string(),
            payload: payload.clone(),
        });
    }

    fn on_state_change(&mut self, state: SessionState) {
        self.send(RenderEvent::StateChanged(state));
    }

    fn request_skip_presentation(&mut self, token: SkipToken) -> Result<(), SkipToken> {
        let id = token.id();
        if self.send(RenderEvent::SkipRequested(token)) {
            Ok(())
        } else {
            Err(SkipToken::new(id))
        }
    }
}
