use tracing::{debug, info, warn};

use crate::config::ProviderFamily;
use crate::errors::ProviderError;
use crate::events::{DiffContext, SessionEvent};
use crate::extract::{ExtractionResult, extract};
use crate::normalizer::StreamNormalizer;

/// Lifecycle of one generation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Finalizing,
    Done,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// One request/response cycle.
///
/// The session is a synchronous state machine: callers push transport
/// chunks and end/error signals in arrival order and forward the returned
/// events. Terminal states swallow every later call.
pub struct GenerationSession {
    id: uuid::Uuid,
    context: DiffContext,
    normalizer: StreamNormalizer,
    state: SessionState,
    result: Option<ExtractionResult>,
}

impl GenerationSession {
    pub fn new(family: ProviderFamily, context: DiffContext) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            context,
            normalizer: StreamNormalizer::new(family),
            state: SessionState::Idle,
            result: None,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn family(&self) -> ProviderFamily {
        self.normalizer.family()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Cumulative text received so far.
    pub fn snapshot(&self) -> &str {
        self.normalizer.cumulative()
    }

    /// Extraction result once the session is done.
    pub fn result(&self) -> Option<&ExtractionResult> {
        self.result.as_ref()
    }

    /// Idle → Streaming.
    pub fn start(&mut self) -> Vec<SessionEvent> {
        if self.state != SessionState::Idle {
            return Vec::new();
        }
        self.state = SessionState::Streaming;
        info!(session_id = %self.id, family = %self.family(), branch = %self.context.branch, "generation session started");
        vec![
            SessionEvent::Loading { active: true },
            SessionEvent::StreamStart {
                branch: self.context.branch.clone(),
                files: self.context.files.clone(),
                commits: self.context.commits.clone(),
            },
        ]
    }

    /// Feeds one transport chunk.
    ///
    /// Emits one `StreamChunk` per fragment. A terminator frame inside the
    /// chunk finalizes the session right away.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<SessionEvent> {
        if self.state != SessionState::Streaming {
            return Vec::new();
        }
        let mut events: Vec<SessionEvent> = self
            .normalizer
            .feed(chunk)
            .into_iter()
            .map(|fragment| SessionEvent::StreamChunk {
                cumulative_text: fragment.cumulative,
            })
            .collect();
        if self.normalizer.is_complete() {
            debug!(session_id = %self.id, "terminator frame received");
            events.extend(self.finalize());
        }
        events
    }

    /// Transport-level end of stream.
    pub fn end_of_stream(&mut self) -> Vec<SessionEvent> {
        if self.state != SessionState::Streaming {
            return Vec::new();
        }
        let mut events: Vec<SessionEvent> = self
            .normalizer
            .finish()
            .into_iter()
            .map(|fragment| SessionEvent::StreamChunk {
                cumulative_text: fragment.cumulative,
            })
            .collect();
        events.extend(self.finalize());
        events
    }

    /// Transport or provider failure; reported once.
    pub fn fail(&mut self, err: &ProviderError) -> Vec<SessionEvent> {
        if !matches!(self.state, SessionState::Streaming | SessionState::Finalizing) {
            return Vec::new();
        }
        self.state = SessionState::Failed;
        warn!(session_id = %self.id, error = %err, received_chars = self.snapshot().chars().count(), "generation session failed");
        vec![
            SessionEvent::Loading { active: false },
            SessionEvent::Error {
                message: err.user_message(),
            },
        ]
    }

    /// Abandons the session; nothing is emitted now or later.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            debug!(session_id = %self.id, "generation session cancelled");
            self.state = SessionState::Cancelled;
        }
    }

    fn finalize(&mut self) -> Vec<SessionEvent> {
        self.state = SessionState::Finalizing;
        let text = self.normalizer.finalize();
        let result = extract(&text);
        info!(
            session_id = %self.id,
            chars = text.chars().count(),
            categories = result.categories.len(),
            cases = result.case_count(),
            dropped_frames = self.normalizer.unparseable_count(),
            "generation session finished"
        );
        self.state = SessionState::Done;
        self.result = Some(result.clone());
        vec![
            SessionEvent::Loading { active: false },
            SessionEvent::StreamEnd {
                branch: self.context.branch.clone(),
                files: self.context.files.clone(),
                commits: self.context.commits.clone(),
                result,
            },
        ]
    }
}
