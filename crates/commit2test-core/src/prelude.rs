//! Common imports for typical generator usage.
pub use crate::{
    AbortHandle, CoreError, DiffContext, ExtractionResult, GenerationConfig, GenerationStream,
    Generator, ProviderFamily, SessionEvent, TestCase, TestCaseCategory,
};
