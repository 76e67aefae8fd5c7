use thiserror::Error;

use crate::{backend::BackendError, session::AuthType};

/// Failures a scheme can report back to the controller.
///
/// Messages are for logs. Responses to the browser never carry them.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("callback does not match the pending handshake")]
    CorrelationMismatch,
    #[error("identity provider failure: {0}")]
    IdentityProvider(String),
    #[error("credentials rejected")]
    CredentialRejected,
    #[error("request not supported by the {0} scheme")]
    Unsupported(AuthType),
}

impl From<BackendError> for FlowError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized => Self::CredentialRejected,
            other => Self::IdentityProvider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_rejection_is_a_credential_failure() {
        assert!(matches!(
            FlowError::from(BackendError::Unauthorized),
            FlowError::CredentialRejected
        ));
        assert!(matches!(
            FlowError::from(BackendError::Unexpected("502".to_string())),
            FlowError::IdentityProvider(_)
        ));
    }
}
