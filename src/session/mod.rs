//! Session lifecycle state machine. The manager is the sole owner of session
//! and persisted-record transitions: it validates nothing (callers pre-check
//! with [`crate::validate`]), delegates accept/reject to the injected
//! authority, and keeps the store and the in-memory state in step. State is
//! published through a watch channel; presentation collaborators subscribe
//! and re-render, they never mutate.

pub mod state;
pub mod store;

use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{debug, error, instrument, warn};
use ulid::Ulid;

use crate::authority::Authority;
use crate::error::Error;
use state::{Destination, Identity, Outcome, Session, SessionState};
use store::{PersistedRecord, SessionStore};

const MSG_LOGGED_IN: &str = "Logged in successfully";
const MSG_REGISTERED: &str = "Registration successful";
const MSG_LOGGED_OUT: &str = "Logged out successfully";
const MSG_RESET_REQUESTED: &str =
    "If an account with this email exists, password reset instructions have been sent";
const MSG_RESET_COMPLETE: &str = "Password has been reset successfully";

/// Orchestrates the credential operations over an injected authority and
/// session store. Construct one at application startup and share it by
/// reference; it holds no global state.
pub struct SessionManager<A, S> {
    authority: A,
    store: S,
    sessions: watch::Sender<Session>,
}

/// Clears the loading flag on every exit path, so the flag can never stay
/// stuck after an operation settles.
struct LoadingGuard<'a> {
    sessions: &'a watch::Sender<Session>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.sessions.send_modify(|session| session.loading = false);
    }
}

impl<A: Authority, S: SessionStore> SessionManager<A, S> {
    /// Starts in [`SessionState::Unknown`]; call [`hydrate`](Self::hydrate)
    /// once before trusting the session state.
    pub fn new(authority: A, store: S) -> Self {
        let (sessions, _) = watch::channel(Session::default());
        Self {
            authority,
            store,
            sessions,
        }
    }

    /// Subscribes to session transitions. Receivers see every settled state;
    /// intermediate states may coalesce under load, which is fine for
    /// re-render-on-change consumers.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.sessions.subscribe()
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.sessions.borrow().clone()
    }

    /// Rehydrates the session from the store: a valid remembered record means
    /// `Authenticated`, anything else means `Anonymous`. Runs exactly once:
    /// a second call is a no-op once the state has left `Unknown`. A corrupt
    /// or unreadable record is cleared and degrades to `Anonymous`; it is
    /// never surfaced as a user error.
    #[instrument(skip(self))]
    pub fn hydrate(&self) -> Session {
        if self.sessions.borrow().state != SessionState::Unknown {
            return self.session();
        }
        {
            // The guard must drop before the snapshot below, or callers
            // would see a stale loading flag.
            let _loading = self.begin();
            match self.store.load() {
                Ok(Some(record)) => {
                    debug!("Restored remembered session");
                    self.transition(SessionState::Authenticated(record.identity));
                }
                Ok(None) => self.transition(SessionState::Anonymous),
                Err(err) => {
                    warn!("Failed to load remembered session: {err}");
                    if let Err(err) = self.store.clear() {
                        error!("Failed to clear session store: {err}");
                    }
                    self.transition(SessionState::Anonymous);
                }
            }
        }
        self.session()
    }

    /// Logs in with the given credentials. Inputs are trusted to be
    /// pre-validated. On acceptance the manager synthesizes an identity (the
    /// display name is the email local-part), persists it, and settles
    /// `Authenticated`; on rejection it settles back to `Anonymous` with the
    /// store untouched. No automatic retry.
    ///
    /// # Errors
    /// [`Error::CredentialsRejected`], [`Error::Unavailable`], or
    /// [`Error::Store`] when persisting the granted session fails.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Outcome, Error> {
        let _loading = self.begin();
        self.transition(SessionState::Authenticating);

        let grant = match self.authority.authenticate(email, password).await {
            Ok(grant) => grant,
            Err(rejection) => {
                debug!("Authentication rejected: {rejection}");
                self.transition(SessionState::Anonymous);
                return Err(rejection.into());
            }
        };

        let identity = Identity {
            id: Ulid::new().to_string(),
            name: email_local_part(email).to_string(),
            email: email.to_string(),
        };
        self.establish(grant.token, identity)?;
        Ok(Outcome::new(MSG_LOGGED_IN, Some(Destination::Home)))
    }

    /// Registers a new account. Same shape as authenticate, but the identity
    /// carries the given display name and the authority accepts any
    /// syntactically valid registration.
    ///
    /// # Errors
    /// [`Error::Unavailable`] or [`Error::Store`].
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<Outcome, Error> {
        let _loading = self.begin();
        self.transition(SessionState::Authenticating);

        let grant = match self.authority.register(name, email, password).await {
            Ok(grant) => grant,
            Err(rejection) => {
                debug!("Registration rejected: {rejection}");
                self.transition(SessionState::Anonymous);
                return Err(rejection.into());
            }
        };

        let identity = Identity {
            id: Ulid::new().to_string(),
            name: name.to_string(),
            email: email.to_string(),
        };
        self.establish(grant.token, identity)?;
        Ok(Outcome::new(MSG_REGISTERED, Some(Destination::Home)))
    }

    /// Asks the authority to start a password reset. Session state is
    /// untouched and the outcome message is identical whether or not the
    /// email is known; the non-disclosure prevents account enumeration.
    ///
    /// # Errors
    /// [`Error::Unavailable`] only.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<Outcome, Error> {
        let _loading = self.begin();
        self.authority.request_password_reset(email).await?;
        Ok(Outcome::new(MSG_RESET_REQUESTED, None))
    }

    /// Completes a password reset. A blank reset token fails before any
    /// round trip. Success does not sign the user in; the outcome points the
    /// caller at the login view.
    ///
    /// # Errors
    /// [`Error::PreconditionFailed`] on a blank token,
    /// [`Error::CredentialsRejected`] when the authority refuses it, or
    /// [`Error::Unavailable`].
    #[instrument(skip(self, new_password))]
    pub async fn complete_reset(
        &self,
        reset_token: &str,
        new_password: &SecretString,
    ) -> Result<Outcome, Error> {
        if reset_token.trim().is_empty() {
            return Err(Error::PreconditionFailed("reset token"));
        }
        let _loading = self.begin();
        self.authority
            .complete_reset(reset_token, new_password)
            .await?;
        Ok(Outcome::new(MSG_RESET_COMPLETE, Some(Destination::Login)))
    }

    /// Signs out: clears the store and the in-memory identity and points the
    /// caller at the login view. Unconditional and idempotent: logging out
    /// while already anonymous only repeats the navigation signal. The
    /// in-memory state clears even if the store clear fails.
    #[instrument(skip(self))]
    pub fn logout(&self) -> Outcome {
        if let Err(err) = self.store.clear() {
            error!("Failed to clear session store: {err}");
        }
        self.transition(SessionState::Anonymous);
        Outcome::new(MSG_LOGGED_OUT, Some(Destination::Login))
    }

    /// Persists the granted session and settles `Authenticated`, or settles
    /// `Anonymous` when persistence fails.
    fn establish(&self, token: String, identity: Identity) -> Result<(), Error> {
        let record = PersistedRecord {
            token,
            identity: identity.clone(),
        };
        if let Err(err) = self.store.save(&record) {
            error!("Failed to persist session: {err}");
            self.transition(SessionState::Anonymous);
            return Err(err.into());
        }
        self.transition(SessionState::Authenticated(identity));
        Ok(())
    }

    fn begin(&self) -> LoadingGuard<'_> {
        self.sessions.send_modify(|session| session.loading = true);
        LoadingGuard {
            sessions: &self.sessions,
        }
    }

    fn transition(&self, state: SessionState) {
        self.sessions.send_modify(|session| session.state = state);
    }
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{Grant, Rejection, SimulatedAuthority};
    use crate::session::store::{MemoryStore, StoreError};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn manager() -> SessionManager<SimulatedAuthority, MemoryStore> {
        SessionManager::new(
            SimulatedAuthority::new(Duration::ZERO),
            MemoryStore::new(),
        )
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn starts_unknown_until_hydrated() {
        let manager = manager();
        assert_eq!(manager.session().state, SessionState::Unknown);

        let session = manager.hydrate();
        assert_eq!(session.state, SessionState::Anonymous);
        assert!(!session.loading);
    }

    #[test]
    fn hydrate_restores_a_remembered_session() {
        let store = MemoryStore::new();
        let identity = Identity {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
        };
        store
            .save(&PersistedRecord {
                token: "remembered".to_string(),
                identity: identity.clone(),
            })
            .expect("Failed to seed store");

        let manager = SessionManager::new(SimulatedAuthority::new(Duration::ZERO), store);
        let session = manager.hydrate();
        assert_eq!(session.state, SessionState::Authenticated(identity));
        assert!(session.is_authenticated());
        // The snapshot handed back is the settled one, not the in-flight one.
        assert!(!session.loading);
        assert!(!manager.session().loading);
    }

    #[test]
    fn hydrate_runs_exactly_once() {
        let manager = manager();
        manager.hydrate();

        // Seeding the store after hydration must not change anything.
        manager
            .store
            .save(&PersistedRecord {
                token: "late".to_string(),
                identity: Identity {
                    id: "id".to_string(),
                    name: "late".to_string(),
                    email: "late@example.com".to_string(),
                },
            })
            .expect("Failed to seed store");
        let session = manager.hydrate();
        assert_eq!(session.state, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn authenticate_settles_authenticated_and_persists() {
        let manager = manager();
        manager.hydrate();

        let outcome = manager
            .authenticate("alice@example.com", &secret("Passw0rd"))
            .await
            .expect("Failed to authenticate");
        assert_eq!(outcome.message, MSG_LOGGED_IN);
        assert_eq!(outcome.navigate, Some(Destination::Home));

        let session = manager.session();
        assert!(!session.loading);
        let identity = session.identity().expect("Missing identity");
        // Display name is synthesized from the email local-part.
        assert_eq!(identity.name, "alice");
        assert_eq!(identity.email, "alice@example.com");

        let record = manager
            .store
            .load()
            .expect("Failed to load")
            .expect("Missing record");
        assert_eq!(&record.identity, identity);
    }

    #[tokio::test]
    async fn rejected_authenticate_leaves_store_untouched() {
        let manager = manager();
        manager.hydrate();

        let result = manager
            .authenticate("alice@example.com", &secret("short"))
            .await;
        assert!(matches!(result, Err(Error::CredentialsRejected)));

        let session = manager.session();
        assert_eq!(session.state, SessionState::Anonymous);
        assert!(!session.loading, "loading must clear after failure");
        assert!(manager.store.is_empty());
    }

    #[tokio::test]
    async fn register_uses_the_given_name() {
        let manager = manager();
        manager.hydrate();

        let outcome = manager
            .register("Alice", "alice@example.com", &secret("Passw0rd"))
            .await
            .expect("Failed to register");
        assert_eq!(outcome.message, MSG_REGISTERED);
        assert_eq!(outcome.navigate, Some(Destination::Home));

        let identity = manager.session().identity().cloned().expect("Missing identity");
        assert_eq!(identity.name, "Alice");
        assert_eq!(identity.email, "alice@example.com");
        assert_eq!(
            manager.store.load().unwrap().map(|record| record.identity),
            Some(identity)
        );
    }

    #[tokio::test]
    async fn successive_grants_mint_distinct_identities() {
        let manager = manager();
        manager.hydrate();

        manager
            .authenticate("alice@example.com", &secret("Passw0rd"))
            .await
            .expect("Failed to authenticate");
        let first = manager.session().identity().cloned().unwrap();
        manager
            .authenticate("alice@example.com", &secret("Passw0rd"))
            .await
            .expect("Failed to authenticate");
        let second = manager.session().identity().cloned().unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn reset_request_does_not_touch_session_state() {
        let manager = manager();
        manager.hydrate();

        let outcome = manager
            .request_password_reset("nobody@example.com")
            .await
            .expect("Failed to request reset");
        assert_eq!(outcome.message, MSG_RESET_REQUESTED);
        assert_eq!(outcome.navigate, None);
        assert_eq!(manager.session().state, SessionState::Anonymous);
        assert!(!manager.session().loading);
    }

    #[tokio::test]
    async fn blank_reset_token_fails_before_any_round_trip() {
        let manager = manager();
        manager.hydrate();

        for token in ["", "   "] {
            let result = manager.complete_reset(token, &secret("NewPass1")).await;
            assert!(matches!(result, Err(Error::PreconditionFailed(_))));
        }
        let session = manager.session();
        assert_eq!(session.state, SessionState::Anonymous);
        assert!(!session.loading);
    }

    #[tokio::test]
    async fn complete_reset_does_not_sign_in() {
        let manager = manager();
        manager.hydrate();

        let outcome = manager
            .complete_reset("reset-token", &secret("NewPass1"))
            .await
            .expect("Failed to complete reset");
        assert_eq!(outcome.message, MSG_RESET_COMPLETE);
        assert_eq!(outcome.navigate, Some(Destination::Login));
        assert_eq!(manager.session().state, SessionState::Anonymous);
        assert!(manager.store.is_empty());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let manager = manager();
        manager.hydrate();
        manager
            .authenticate("alice@example.com", &secret("Passw0rd"))
            .await
            .expect("Failed to authenticate");

        let first = manager.logout();
        assert_eq!(first.navigate, Some(Destination::Login));
        assert_eq!(manager.session().state, SessionState::Anonymous);
        assert!(manager.store.is_empty());

        let second = manager.logout();
        assert_eq!(second.message, MSG_LOGGED_OUT);
        assert_eq!(manager.session().state, SessionState::Anonymous);
        assert!(manager.store.is_empty());
    }

    #[test]
    fn hydrate_repairs_a_half_written_record() {
        let store = MemoryStore::new();
        store.put_raw(crate::session::store::RAW_TOKEN_KEY, "stray-token");

        let manager = SessionManager::new(SimulatedAuthority::new(Duration::ZERO), store);
        let session = manager.hydrate();
        assert_eq!(session.state, SessionState::Anonymous);
        assert!(manager.store.is_empty());
    }

    /// Authority that records the session snapshot visible at call time,
    /// to pin down the mid-flight state.
    struct ProbeAuthority {
        sessions: Arc<Mutex<Option<watch::Receiver<Session>>>>,
        seen: Arc<Mutex<Option<Session>>>,
    }

    impl ProbeAuthority {
        fn observe(&self) {
            let receiver = self.sessions.lock().unwrap();
            let snapshot = receiver.as_ref().map(|rx| rx.borrow().clone());
            *self.seen.lock().unwrap() = snapshot;
        }
    }

    impl Authority for ProbeAuthority {
        async fn authenticate(
            &self,
            _email: &str,
            _password: &SecretString,
        ) -> Result<Grant, Rejection> {
            self.observe();
            Ok(Grant {
                token: "probe-token".to_string(),
            })
        }

        async fn register(
            &self,
            _name: &str,
            _email: &str,
            _password: &SecretString,
        ) -> Result<Grant, Rejection> {
            self.observe();
            Ok(Grant {
                token: "probe-token".to_string(),
            })
        }

        async fn request_password_reset(&self, _email: &str) -> Result<(), Rejection> {
            self.observe();
            Ok(())
        }

        async fn complete_reset(
            &self,
            _reset_token: &str,
            _new_password: &SecretString,
        ) -> Result<(), Rejection> {
            self.observe();
            Ok(())
        }
    }

    #[tokio::test]
    async fn operations_run_with_loading_set_and_authenticating_state() {
        let slot = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(None));
        let manager = SessionManager::new(
            ProbeAuthority {
                sessions: Arc::clone(&slot),
                seen: Arc::clone(&seen),
            },
            MemoryStore::new(),
        );
        *slot.lock().unwrap() = Some(manager.subscribe());
        manager.hydrate();

        manager
            .authenticate("alice@example.com", &secret("Passw0rd"))
            .await
            .expect("Failed to authenticate");

        let mid_flight = seen.lock().unwrap().clone().expect("Authority never ran");
        assert_eq!(mid_flight.state, SessionState::Authenticating);
        assert!(mid_flight.loading);
        assert!(!manager.session().loading);
    }

    /// Store whose writes always fail, to exercise the persistence error
    /// path.
    struct BrokenStore;

    impl SessionStore for BrokenStore {
        fn load(&self) -> Result<Option<PersistedRecord>, StoreError> {
            Ok(None)
        }

        fn save(&self, _record: &PersistedRecord) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }

        fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn persistence_failure_settles_anonymous() {
        let manager =
            SessionManager::new(SimulatedAuthority::new(Duration::ZERO), BrokenStore);
        manager.hydrate();

        let result = manager
            .authenticate("alice@example.com", &secret("Passw0rd"))
            .await;
        assert!(matches!(result, Err(Error::Store(_))));

        let session = manager.session();
        assert_eq!(session.state, SessionState::Anonymous);
        assert!(!session.loading);
    }

    #[tokio::test]
    async fn subscribers_see_the_settled_state() {
        let manager = manager();
        let mut receiver = manager.subscribe();
        manager.hydrate();

        manager
            .authenticate("alice@example.com", &secret("Passw0rd"))
            .await
            .expect("Failed to authenticate");

        assert!(receiver.has_changed().expect("Sender dropped"));
        let session = receiver.borrow_and_update().clone();
        assert!(session.is_authenticated());
    }
}
