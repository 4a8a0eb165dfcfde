//! Streaming test-case generation from branch diffs.
//!
//! Provider responses arrive as server-sent events in one of two wire
//! families. They are decoded into text fragments, accumulated into a
//! cumulative transcript, and once the stream ends the transcript is parsed
//! into a requirement summary and a tree of categorized test cases.
//!
//! # Usage
//!
//! ```no_run
//! use commit2test_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CoreError> {
//! let config = GenerationConfig::from_env()?;
//! let generator = Generator::new(config)?;
//!
//! let context = DiffContext::new("feature/login", "diff --git a/src/login.rs b/src/login.rs")
//!     .commits(vec!["a1b2c3 add lockout".to_string()]);
//! let mut stream = generator.start(context)?;
//! while let Some(event) = stream.next_event().await {
//!     if let SessionEvent::StreamChunk { cumulative_text } = &event {
//!         eprintln!("{} chars so far", cumulative_text.chars().count());
//!     }
//! }
//! let result = stream.finish().await?;
//! println!("{}", result.requirement);
//! # Ok(())
//! # }
//! ```

/// Cumulative text accumulation.
pub mod accumulator;
/// Provider family selection and generation settings.
pub mod config;
/// Public error types.
pub mod errors;
/// Boundary events and diff context.
pub mod events;
/// Requirement and test-case extraction from model output.
pub mod extract;
/// Wire frame decoding for both provider families.
pub mod frame;
/// Bytes-in, fragments-out stream normalization.
pub mod normalizer;
/// Process-wide logging setup.
pub mod observability;
/// Session orchestration on top of a transport.
pub mod orchestrator;
/// Common imports for typical usage.
pub mod prelude;
/// Prompt construction.
pub mod prompt;
/// Per-request session state machine.
pub mod session;
/// Streaming transport contract and the default HTTP implementation.
pub mod transport;

pub use accumulator::{Accumulator, TextFragment};
pub use config::{GenerationConfig, ProviderFamily};
pub use errors::{CoreError, ProviderError, StatusCategory};
pub use events::{DiffContext, SessionEvent};
pub use extract::{ExtractionResult, TestCase, TestCaseCategory, extract};
pub use frame::{ContentBlockDecoder, DeltaStyleDecoder, Frame, FrameDecoder, WireDecoder};
pub use normalizer::StreamNormalizer;
pub use observability::{LogSettings, LogSink, init_observability};
pub use orchestrator::{AbortHandle, GenerationStream, Generator};
pub use session::{GenerationSession, SessionState};
pub use transport::{ChunkStream, HttpTransport, Transport, TransportRequest};
