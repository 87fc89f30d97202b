use thiserror::Error;

/// Failures produced by the credential, broker, caller and inspector layers.
///
/// `Clone` so one failed acquisition can be handed to every caller waiting
/// on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// No usable identity mechanism in the current environment.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Identity provider rejected the request or could not be reached.
    #[error("token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// Downstream call failed: network error, non-success status or malformed body.
    #[error("remote call failed: {0}")]
    RemoteCall(String),

    /// Token could not be structurally decoded. Diagnostic only.
    #[error("token decode failed: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RelayError {
    /// Short, stable label used for metrics and the `title` of failure responses.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::CredentialUnavailable(_) => "credential_unavailable",
            RelayError::TokenAcquisition(_) => "token_acquisition",
            RelayError::RemoteCall(_) => "remote_call",
            RelayError::Decode(_) => "decode",
            RelayError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
