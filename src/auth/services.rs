use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::errors::{AuthError, StoreError};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{User, UserFilter, UserUpdate};

/// Orchestrates registration, session lifecycle and the password-reset flow
/// on top of the user store and the password hasher. Nothing outside this
/// service touches raw passwords or tokens.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Fresh opaque identifier for sessions and reset tokens. A v4 UUID
    /// carries 122 random bits, so collisions and guessing are off the table
    /// at any realistic user count.
    fn fresh_token() -> String {
        Uuid::new_v4().to_string()
    }

    /// Create a user with a hashed password. The email must be unused.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        match self.store.find_user_by(&UserFilter::by_email(email)).await {
            Ok(_) => return Err(AuthError::AlreadyRegistered),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        let hashed = hash_password(password)?;
        let user = self.store.add_user(email, &hashed).await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Whether `password` matches the hash stored for `email`. An unknown
    /// email reads exactly like a wrong password.
    pub async fn valid_login(&self, email: &str, password: &str) -> Result<bool, AuthError> {
        let user = match self.store.find_user_by(&UserFilter::by_email(email)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(verify_password(password, &user.hashed_password)?)
    }

    /// Issue a fresh session id for valid credentials, replacing any session
    /// the user already had.
    pub async fn create_session(&self, email: &str, password: &str) -> Result<String, AuthError> {
        if !self.valid_login(email, password).await? {
            warn!(email = %email, "session refused, invalid credentials");
            return Err(AuthError::InvalidCredentials);
        }
        let user = match self.store.find_user_by(&UserFilter::by_email(email)).await {
            Ok(user) => user,
            // The row vanished between the credential check and now; the
            // caller still only learns "invalid credentials".
            Err(StoreError::NotFound) => return Err(AuthError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };
        let session_id = Self::fresh_token();
        self.store
            .update_user(user.id, &UserUpdate::new().session_id(Some(&session_id)))
            .await?;
        info!(user_id = %user.id, "session created");
        Ok(session_id)
    }

    /// Resolve a session id to its user. Missing, empty and stale ids all
    /// collapse to `None`; this never fails outward.
    pub async fn user_from_session_id(&self, session_id: Option<&str>) -> Option<User> {
        let session_id = session_id.filter(|s| !s.is_empty())?;
        match self
            .store
            .find_user_by(&UserFilter::by_session_id(session_id))
            .await
        {
            Ok(user) => Some(user),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                warn!(error = %e, "session lookup failed");
                None
            }
        }
    }

    /// Clear the user's session. Idempotent: a user with no session, or no
    /// user at all, is not an error.
    pub async fn destroy_session(&self, user_id: Uuid) -> Result<(), AuthError> {
        match self
            .store
            .update_user(user_id, &UserUpdate::new().session_id(None))
            .await
        {
            Ok(()) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Issue a password-reset token, replacing any pending one.
    pub async fn reset_password_token(&self, email: &str) -> Result<String, AuthError> {
        let user = match self.store.find_user_by(&UserFilter::by_email(email)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(AuthError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let token = Self::fresh_token();
        self.store
            .update_user(user.id, &UserUpdate::new().reset_token(Some(&token)))
            .await?;
        info!(user_id = %user.id, "password reset requested");
        Ok(token)
    }

    /// Consume a reset token: store the new hash and clear the token in the
    /// same row update, so the token cannot be spent twice.
    pub async fn update_password(
        &self,
        reset_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = match self
            .store
            .find_user_by(&UserFilter::by_reset_token(reset_token))
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidResetToken),
            Err(e) => return Err(e.into()),
        };
        let hashed = hash_password(new_password)?;
        self.store
            .update_user(
                user.id,
                &UserUpdate::new().hashed_password(&hashed).reset_token(None),
            )
            .await?;
        info!(user_id = %user.id, "password updated");
        Ok(())
    }
}
