//! The authority is the external system that accepts or rejects credentials.
//! The session manager only depends on this accept/reject surface, so a real
//! network client can replace [`SimulatedAuthority`] without touching the
//! state machine.

use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::time::sleep;

/// What the authority hands back on acceptance: the opaque session token to
/// remember. The raw token never goes into logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    pub token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authority unavailable: {0}")]
    Unavailable(String),
}

/// Accept/reject capability for the credential operations.
#[allow(async_fn_in_trait)]
pub trait Authority {
    /// # Errors
    /// `InvalidCredentials` when the authority rejects the pair.
    async fn authenticate(&self, email: &str, password: &SecretString)
        -> Result<Grant, Rejection>;

    /// # Errors
    /// The authority may still refuse for availability reasons.
    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<Grant, Rejection>;

    /// Always resolves success-shaped whether or not the email is known; the
    /// non-disclosure is the contract, not an accident.
    ///
    /// # Errors
    /// Availability failures only.
    async fn request_password_reset(&self, email: &str) -> Result<(), Rejection>;

    /// Verifies the reset token and applies the new password. Never signs the
    /// caller in.
    ///
    /// # Errors
    /// `InvalidCredentials` when the token is rejected.
    async fn complete_reset(
        &self,
        reset_token: &str,
        new_password: &SecretString,
    ) -> Result<(), Rejection>;
}

/// Stand-in authority that sleeps a configurable latency and applies demo
/// acceptance rules. This is a simulation, not credential verification:
/// authenticate accepts any password of eight or more characters, and the
/// other operations always accept.
#[derive(Clone, Debug)]
pub struct SimulatedAuthority {
    latency: Duration,
}

impl SimulatedAuthority {
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedAuthority {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

impl Authority for SimulatedAuthority {
    async fn authenticate(
        &self,
        _email: &str,
        password: &SecretString,
    ) -> Result<Grant, Rejection> {
        sleep(self.latency).await;
        if password.expose_secret().chars().count() < 8 {
            return Err(Rejection::InvalidCredentials);
        }
        Ok(Grant {
            token: mint_session_token()?,
        })
    }

    async fn register(
        &self,
        _name: &str,
        _email: &str,
        _password: &SecretString,
    ) -> Result<Grant, Rejection> {
        // Registration takes a little longer than login in the simulation.
        sleep(self.latency * 3 / 2).await;
        Ok(Grant {
            token: mint_session_token()?,
        })
    }

    async fn request_password_reset(&self, _email: &str) -> Result<(), Rejection> {
        sleep(self.latency).await;
        Ok(())
    }

    async fn complete_reset(
        &self,
        _reset_token: &str,
        _new_password: &SecretString,
    ) -> Result<(), Rejection> {
        sleep(self.latency).await;
        Ok(())
    }
}

/// Mint an opaque session token: 32 random bytes, base64 url-safe without
/// padding. Only ever stored client-side; a real authority would mint its own.
fn mint_session_token() -> Result<String, Rejection> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| Rejection::Unavailable(format!("failed to mint session token: {err}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}
