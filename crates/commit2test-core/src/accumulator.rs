/// One normalized increment of model output.
///
/// `cumulative` always extends the previous fragment's `cumulative` by exactly
/// `delta`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextFragment {
    pub delta: String,
    pub cumulative: String,
}

/// Cumulative text buffer owned by one generation session.
///
/// Appends take `&mut self`, so there is never more than one writer. A host
/// that shares a session between threads has to put it behind a mutex.
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
    fragments: u64,
    finalized: bool,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `delta` and returns the resulting snapshot.
    ///
    /// Empty deltas and appends after [`Accumulator::finalize`] are ignored.
    pub fn append(&mut self, delta: &str) -> Option<TextFragment> {
        if delta.is_empty() || self.finalized {
            return None;
        }
        self.text.push_str(delta);
        self.fragments = self.fragments.saturating_add(1);
        Some(TextFragment {
            delta: delta.to_string(),
            cumulative: self.text.clone(),
        })
    }

    /// Current cumulative text.
    pub fn snapshot(&self) -> &str {
        &self.text
    }

    /// Number of fragments appended so far.
    pub fn fragment_count(&self) -> u64 {
        self.fragments
    }

    /// Freezes the buffer and returns the final text.
    pub fn finalize(&mut self) -> String {
        self.finalized = true;
        self.text.clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}
