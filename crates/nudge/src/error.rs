use serde_json::{Value, json};

/// Wire-level error codes shared by every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    Invalid,
    Conflict,
    SecretRejected,
    ScopeInvalid,
    Quota,
}

impl ErrorCode {
    /// Numeric code propagated in JSON-RPC error objects.
    pub fn as_i64(self) -> i64 {
        match self {
            ErrorCode::NotFound => 40401,
            ErrorCode::Invalid => 40001,
            ErrorCode::Conflict => 40901,
            ErrorCode::SecretRejected => 40002,
            ErrorCode::ScopeInvalid => 40003,
            ErrorCode::Quota => 42901,
        }
    }
}

/// Errors raised by store mutations and request handlers.
///
/// Handlers convert these into the JSON-RPC error envelope; the matcher and
/// scorer never produce them (they degrade silently on bad metadata).
#[derive(Debug, Clone, thiserror::Error)]
pub enum NudgeError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Version mismatch: expected {expected}, got {current}")]
    Conflict { expected: u64, current: u64 },
    #[error("{0}")]
    SecretRejected(String),
    #[error("{0}")]
    ScopeInvalid(String),
    #[error("{message}")]
    Quota { message: String, limit: usize },
}

impl NudgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            NudgeError::NotFound(_) => ErrorCode::NotFound,
            NudgeError::Invalid(_) => ErrorCode::Invalid,
            NudgeError::Conflict { .. } => ErrorCode::Conflict,
            NudgeError::SecretRejected(_) => ErrorCode::SecretRejected,
            NudgeError::ScopeInvalid(_) => ErrorCode::ScopeInvalid,
            NudgeError::Quota { .. } => ErrorCode::Quota,
        }
    }

    /// Structured payload carried in the error object so callers can react
    /// without parsing messages (e.g. re-read after a version conflict).
    pub fn data(&self) -> Value {
        match self {
            NudgeError::Conflict { expected, current } => json!({
                "expected_version": expected,
                "current_version": current,
            }),
            NudgeError::Quota { limit, .. } => json!({ "limit": limit }),
            _ => json!({}),
        }
    }

    pub fn quota(what: &str, limit: usize) -> Self {
        NudgeError::Quota {
            message: format!("Maximum {what} ({limit}) exceeded"),
            limit,
        }
    }
}

pub type Result<T> = std::result::Result<T, NudgeError>;
