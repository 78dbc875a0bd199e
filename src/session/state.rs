//! In-memory session model. The session carries only non-sensitive identity
//! metadata; credentials never land here and the persisted half lives in the
//! session store.

use serde::{Deserialize, Serialize};

/// The authenticated principal. Created when authenticate/register succeeds,
/// immutable afterwards, destroyed on logout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Process-unique opaque identifier, minted fresh per grant.
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Where the session currently stands in its lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Before startup hydration has run; treat as "not yet trustworthy".
    #[default]
    Unknown,
    Anonymous,
    /// A credential operation is in flight with the authority.
    Authenticating,
    Authenticated(Identity),
}

/// Current authentication state of the running client, published to
/// subscribers on every transition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    /// True while a credential operation is in flight. Presentation should
    /// disable submit affordances while set.
    pub loading: bool,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Navigation signal for the presentation layer; routing itself stays with
/// the collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Default authenticated view.
    Home,
    /// Login view.
    Login,
}

/// Result of a session operation: a user-facing message plus an optional
/// desired destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub message: String,
    pub navigate: Option<Destination>,
}

impl Outcome {
    pub(crate) fn new(message: &str, navigate: Option<Destination>) -> Self {
        Self {
            message: message.to_string(),
            navigate,
        }
    }
}
