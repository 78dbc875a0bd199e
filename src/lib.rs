//! Client-side authentication session core.
//!
//! `accesso` tracks whether a visitor is signed in, mediates credential
//! submission, and remembers the session across restarts. The crate is the
//! core behind a front end: forms validate raw input with [`validate`], hand
//! clean submissions to the [`SessionManager`], and re-render from the
//! session state it publishes. The remote authority is an injected
//! [`Authority`] capability; the bundled [`SimulatedAuthority`] stands in for
//! it and performs no real credential verification.

pub mod authority;
pub mod config;
pub mod error;
pub mod session;
pub mod validate;

pub use authority::{Authority, Grant, Rejection, SimulatedAuthority};
pub use config::Config;
pub use error::Error;
pub use session::state::{Destination, Identity, Outcome, Session, SessionState};
pub use session::store::{FileStore, MemoryStore, PersistedRecord, SessionStore, StoreError};
pub use session::SessionManager;
pub use validate::{Defect, Field, FieldErrors};
