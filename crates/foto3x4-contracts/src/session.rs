use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::images::{BackgroundRequest, EncodedImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Empty,
    Ready,
    Processing,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Empty => "empty",
            SessionPhase::Ready => "ready",
            SessionPhase::Processing => "processing",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    FileSelected(Arc<EncodedImage>),
    GenerationStarted,
    ColorReady(BackgroundRequest, Arc<EncodedImage>),
    GenerationFailed(String),
    Reset,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::FileSelected(_) => "file_selected",
            SessionEvent::GenerationStarted => "generation_started",
            SessionEvent::ColorReady(..) => "color_ready",
            SessionEvent::GenerationFailed(_) => "generation_failed",
            SessionEvent::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event '{event}' is not valid while the session is {phase}")]
pub struct TransitionError {
    pub phase: &'static str,
    pub event: &'static str,
}

/// Snapshot of one upload session.
///
/// Images are shared behind `Arc` so transitions copy handles, never pixels.
/// `transition` consumes the current snapshot and returns the next one.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: SessionPhase,
    original: Option<Arc<EncodedImage>>,
    white: Option<Arc<EncodedImage>>,
    blue: Option<Arc<EncodedImage>>,
    status_message: String,
    error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Empty,
            original: None,
            white: None,
            blue: None,
            status_message: String::new(),
            error: None,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn original(&self) -> Option<&Arc<EncodedImage>> {
        self.original.as_ref()
    }

    pub fn result(&self, background: BackgroundRequest) -> Option<&Arc<EncodedImage>> {
        match background {
            BackgroundRequest::White => self.white.as_ref(),
            BackgroundRequest::Blue => self.blue.as_ref(),
        }
    }

    pub fn white(&self) -> Option<&Arc<EncodedImage>> {
        self.white.as_ref()
    }

    pub fn blue(&self) -> Option<&Arc<EncodedImage>> {
        self.blue.as_ref()
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_processing(&self) -> bool {
        self.phase == SessionPhase::Processing
    }

    /// Both colours are available, so the sheet can be printed.
    pub fn ready_to_print(&self) -> bool {
        self.white.is_some() && self.blue.is_some()
    }

    /// Status line shown alongside the state; does not change the phase.
    pub fn with_status(mut self, message: impl Into<String>) -> Self {
        self.status_message = message.into();
        self
    }

    pub fn transition(self, event: SessionEvent) -> Result<SessionState, TransitionError> {
        let reject = |state: &SessionState, event: &SessionEvent| TransitionError {
            phase: state.phase.as_str(),
            event: event.name(),
        };

        match event {
            SessionEvent::Reset => Ok(SessionState::default()),
            SessionEvent::FileSelected(image) => {
                if self.is_processing() {
                    return Err(reject(&self, &SessionEvent::FileSelected(image)));
                }
                Ok(SessionState {
                    phase: SessionPhase::Ready,
                    original: Some(image),
                    white: None,
                    blue: None,
                    status_message: String::new(),
                    error: None,
                })
            }
            SessionEvent::GenerationStarted => {
                if self.original.is_none() || self.is_processing() {
                    return Err(reject(&self, &SessionEvent::GenerationStarted));
                }
                Ok(SessionState {
                    phase: SessionPhase::Processing,
                    white: None,
                    blue: None,
                    error: None,
                    ..self
                })
            }
            SessionEvent::ColorReady(background, image) => {
                if !self.is_processing() {
                    return Err(reject(&self, &SessionEvent::ColorReady(background, image)));
                }
                let mut next = self;
                match background {
                    BackgroundRequest::White => next.white = Some(image),
                    BackgroundRequest::Blue => next.blue = Some(image),
                }
                if next.ready_to_print() {
                    next.phase = SessionPhase::Completed;
                }
                Ok(next)
            }
            SessionEvent::GenerationFailed(message) => {
                if !self.is_processing() {
                    return Err(reject(&self, &SessionEvent::GenerationFailed(message)));
                }
                Ok(SessionState {
                    phase: SessionPhase::Failed,
                    error: Some(message),
                    ..self
                })
            }
        }
    }
}
