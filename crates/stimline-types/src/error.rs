use thiserror::Error;

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("stimulus kind '{actual}' is not accepted by {transformer} (accepts {expected})")]
    TypeMismatch {
        transformer: &'static str,
        expected: String,
        actual: &'static str,
    },

    #[error("transient failure after {attempts} attempt(s): {message}")]
    Transient { message: String, attempts: u32 },

    #[error("service configuration error: {message}")]
    AuthConfig { message: String },

    #[error("upstream error for item {index}: {message}")]
    UpstreamItem { index: usize, message: String },

    #[error("bulk response misaligned with request: {message}")]
    Protocol { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn type_mismatch(
        transformer: &'static str,
        expected: impl Into<String>,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            transformer,
            expected: expected.into(),
            actual,
        }
    }

    pub fn transient(message: impl Into<String>, attempts: u32) -> Self {
        Self::Transient {
            message: message.into(),
            attempts,
        }
    }

    pub fn auth_config(message: impl Into<String>) -> Self {
        Self::AuthConfig {
            message: message.into(),
        }
    }

    pub fn upstream_item(index: usize, message: impl Into<String>) -> Self {
        Self::UpstreamItem {
            index,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Whether the failure is worth another attempt with the same payload.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
