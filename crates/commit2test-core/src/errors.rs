use crate::config::ProviderFamily;

/// Human-readable bucket for a non-success provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusCategory {
    Unauthorized,
    RateLimited,
    ServerFault,
    Other,
}

impl StatusCategory {
    /// Maps an HTTP status code to its category.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            500..=599 => Self::ServerFault,
            _ => Self::Other,
        }
    }
}

/// Errors raised below the session orchestrator.
///
/// Each of these terminates a session in the failed state. Malformed frame
/// lines are not errors; they are counted by the normalizer and dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Network or connection fault, including a broken body stream.
    #[error("transport error ({family}): {message}")]
    Transport {
        family: ProviderFamily,
        message: String,
    },
    /// Provider answered with a non-success status.
    #[error("provider error ({family}, status {status}): {message}")]
    Status {
        family: ProviderFamily,
        status: u16,
        category: StatusCategory,
        message: String,
    },
}

impl ProviderError {
    /// Creates a transport-level error.
    pub fn transport(family: ProviderFamily, message: impl Into<String>) -> Self {
        Self::Transport {
            family,
            message: message.into(),
        }
    }

    /// Creates a status error; the category is derived from `status`.
    pub fn status(family: ProviderFamily, status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            family,
            status,
            category: StatusCategory::from_status(status),
            message: message.into(),
        }
    }

    /// Returns the family the failing request belonged to.
    pub fn family(&self) -> ProviderFamily {
        match self {
            Self::Transport { family, .. } | Self::Status { family, .. } => *family,
        }
    }

    /// Message shown to the user in the session's `error` event.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { message, .. } => {
                format!("无法连接到 AI 服务，请检查网络连接和 API 端点配置。({message})")
            }
            Self::Status {
                category: StatusCategory::Unauthorized,
                ..
            } => "API 密钥无效，请检查配置。".to_string(),
            Self::Status {
                category: StatusCategory::RateLimited,
                ..
            } => "API 调用频率超限，请稍后再试。".to_string(),
            Self::Status {
                category: StatusCategory::ServerFault,
                ..
            } => "AI 服务器错误，请稍后再试。".to_string(),
            Self::Status {
                category: StatusCategory::Other,
                status,
                message,
                ..
            } => format!("API 调用失败 ({status}): {message}"),
        }
    }
}

/// Top-level error type for the public generator API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Credentials or provider selection are missing or invalid.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
    /// The session failed after it started.
    #[error(transparent)]
    Failed(ProviderError),
    /// The caller abandoned the session.
    #[error("cancelled")]
    Cancelled,
    /// Internal misuse, such as a consumer dropping the event channel.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl CoreError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<ProviderError> for CoreError {
    fn from(value: ProviderError) -> Self {
        CoreError::Failed(value)
    }
}
