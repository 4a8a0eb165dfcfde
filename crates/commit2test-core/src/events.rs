use crate::extract::ExtractionResult;

/// Static context for one generation, supplied by the diff collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DiffContext {
    pub branch: String,
    pub diff: String,
    pub files: Vec<String>,
    pub commits: Vec<String>,
}

impl DiffContext {
    pub fn new(branch: impl Into<String>, diff: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            diff: diff.into(),
            ..Self::default()
        }
    }

    pub fn files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn commits(mut self, commits: Vec<String>) -> Self {
        self.commits = commits;
        self
    }
}

/// Boundary events consumed by the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// Busy indicator toggle.
    Loading { active: bool },
    /// First content event of a session.
    StreamStart {
        branch: String,
        files: Vec<String>,
        commits: Vec<String>,
    },
    /// Full text received so far; consumers replace their view with it.
    StreamChunk {
        #[serde(rename = "cumulativeText")]
        cumulative_text: String,
    },
    /// Terminal success event.
    StreamEnd {
        branch: String,
        files: Vec<String>,
        commits: Vec<String>,
        result: ExtractionResult,
    },
    /// Terminal failure event.
    Error { message: String },
}

impl SessionEvent {
    /// Returns true for `StreamEnd` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamEnd { .. } | Self::Error { .. })
    }
}
