//! Login sessions and request authorisation.
//!
//! Sessions live in process memory and are keyed by an opaque bearer token. A restart logs
//! everyone out.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bloodbank_core::users::{Role, StaffRole};
use bloodbank_core::AuthenticatedUser;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use tokio::sync::RwLock;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid or expired session")]
    InvalidSession,
    #[error("administrator access required")]
    AdminRequired,
    #[error("failed to generate session token")]
    TokenGeneration,
}

/// Identity attached to an authorised request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub staff_role: Option<StaffRole>,
}

impl AuthContext {
    pub fn require_admin(&self) -> Result<(), AuthError> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(AuthError::AdminRequired),
        }
    }
}

impl From<AuthenticatedUser> for AuthContext {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            staff_role: user.staff_role,
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    context: AuthContext,
    expires_at: DateTime<Utc>,
}

/// Token handed back to the client at login.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// In-memory session table with a fixed lifetime per session.
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a session for `user`, valid until `now + ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenGeneration`] if the OS random source fails.
    pub async fn issue(
        &self,
        user: AuthenticatedUser,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, AuthError> {
        let mut raw = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut raw)
            .map_err(|_| AuthError::TokenGeneration)?;
        let token = URL_SAFE_NO_PAD.encode(raw);
        let expires_at = now + self.ttl;

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            token.clone(),
            Session {
                context: AuthContext::from(user),
                expires_at,
            },
        );
        tracing::info!(active_sessions = sessions.len(), "session issued");
        Ok(IssuedSession { token, expires_at })
    }

    /// Looks up a live session. Expired sessions are dropped on sight.
    pub async fn resolve(&self, token: &str, now: DateTime<Utc>) -> Result<AuthContext, AuthError> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(s) if s.expires_at > now => return Ok(s.context.clone()),
                Some(_) => {}
                None => return Err(AuthError::InvalidSession),
            }
        }
        self.sessions.write().await.remove(token);
        Err(AuthError::InvalidSession)
    }

    /// Ends a session. Returns false if the token was not live.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Ends every session held by `user_id` and returns how many were dropped.
    pub async fn revoke_user(&self, user_id: &str) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.context.user_id.eq_ignore_ascii_case(user_id.trim()));
        before - sessions.len()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?.trim();
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "0b8a6a8e-1f41-4a8c-9a55-3f2f6f4b6a10".into(),
            email: "ana@example.org".into(),
            display_name: "Ana Reyes".into(),
            role,
            staff_role: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn issued_token_resolves_until_expiry() {
        let store = SessionStore::new(Duration::minutes(30));
        let issued = store.issue(user(Role::Staff), t0()).await.unwrap();
        assert_eq!(issued.expires_at, t0() + Duration::minutes(30));
        assert_eq!(issued.token.len(), 43);

        let ctx = store
            .resolve(&issued.token, t0() + Duration::minutes(29))
            .await
            .unwrap();
        assert_eq!(ctx.email, "ana@example.org");

        let expired = store
            .resolve(&issued.token, t0() + Duration::minutes(30))
            .await;
        assert_eq!(expired, Err(AuthError::InvalidSession));
        assert!(!store.revoke(&issued.token).await);
    }

    #[tokio::test]
    async fn revoked_token_no_longer_resolves() {
        let store = SessionStore::new(Duration::minutes(30));
        let issued = store.issue(user(Role::Admin), t0()).await.unwrap();
        assert!(store.revoke(&issued.token).await);
        assert_eq!(
            store.resolve(&issued.token, t0()).await,
            Err(AuthError::InvalidSession)
        );
    }

    #[tokio::test]
    async fn revoking_a_user_ends_all_their_sessions() {
        let store = SessionStore::new(Duration::minutes(30));
        let first = store.issue(user(Role::Staff), t0()).await.unwrap();
        let second = store.issue(user(Role::Staff), t0()).await.unwrap();
        let mut other_user = user(Role::Admin);
        other_user.user_id = "7c1d2e3f-0000-4000-8000-000000000001".into();
        let other = store.issue(other_user, t0()).await.unwrap();

        let ended = store
            .revoke_user("0B8A6A8E-1F41-4A8C-9A55-3F2F6F4B6A10")
            .await;
        assert_eq!(ended, 2);
        assert!(store.resolve(&first.token, t0()).await.is_err());
        assert!(store.resolve(&second.token, t0()).await.is_err());
        assert!(store.resolve(&other.token, t0()).await.is_ok());
    }

    #[tokio::test]
    async fn tokens_are_unique() {
        let store = SessionStore::new(Duration::minutes(30));
        let a = store.issue(user(Role::Staff), t0()).await.unwrap();
        let b = store.issue(user(Role::Staff), t0()).await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn admin_check() {
        assert!(AuthContext::from(user(Role::Admin)).require_admin().is_ok());
        assert_eq!(
            AuthContext::from(user(Role::Hospital)).require_admin(),
            Err(AuthError::AdminRequired)
        );
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(Some("bearer  abc ")), Ok("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), Err(AuthError::MissingToken));
        assert_eq!(bearer_token(Some("Bearer")), Err(AuthError::MissingToken));
        assert_eq!(bearer_token(None), Err(AuthError::MissingToken));
    }
}
