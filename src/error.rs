//! Operation-level error taxonomy. Every variant is recoverable and
//! displayable; nothing here is fatal to the process. Field-level validation
//! defects live in [`crate::validate`] and never reach the session manager.

use crate::authority::Rejection;
use crate::session::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The authority rejected the credential pair; the user may retry.
    #[error("invalid credentials")]
    CredentialsRejected,
    /// A required input was missing before any round trip was attempted.
    #[error("missing {0}")]
    PreconditionFailed(&'static str),
    /// The authority could not be reached or failed internally.
    #[error("authority unavailable: {0}")]
    Unavailable(String),
    /// The session could not be durably persisted or cleared.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::InvalidCredentials => Self::CredentialsRejected,
            Rejection::Unavailable(reason) => Self::Unavailable(reason),
        }
    }
}
