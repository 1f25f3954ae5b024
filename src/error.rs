use thiserror::Error;

/// Failures reported by the backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("not connected")]
    NotConnected,
    #[error("auth failed: {0}")]
    Auth(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Local, non-fatal engine failures surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Nothing to send to: system conversation active and no peer named.
    #[error("no conversation selected; open one with /open @name or start with @name")]
    UnresolvableTarget,
    #[error("send failed: {reason}")]
    SendRejected { reason: String },
    #[error("no confirmation from server")]
    Expired,
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        EngineError::SendRejected {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_becomes_send_rejected() {
        let err: EngineError = BackendError::NotConnected.into();
        assert_eq!(
            err,
            EngineError::SendRejected {
                reason: "not connected".to_string()
            }
        );
        assert_eq!(err.to_string(), "send failed: not connected");
    }
}
