use thiserror::Error;

pub type AgoraResult<T> = Result<T, AgoraError>;

/// Failure taxonomy shared by the store, the gateway and the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgoraError {
    /// Malformed or missing required fields.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing, invalid or unknown identity token, or acting on someone else's data.
    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Uniqueness violation reported atomically by the store.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The durable store call failed.
    #[error("store unavailable: {0}")]
    Store(String),
}

impl AgoraError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Store code raises domain signals as `AgoraError` wrapped in `anyhow::Error`;
/// they come back out intact here. Anything else is a store failure.
impl From<anyhow::Error> for AgoraError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AgoraError>() {
            Ok(domain) => domain,
            Err(other) => AgoraError::Store(format!("{:#}", other)),
        }
    }
}
