use crate::store::{Store, KEY_AUTH_TOKEN, KEY_USER_PROFILE, NS_AUTH};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// Placeholder authentication.
///
/// With `demo_mode` on, any well-formed credentials are accepted and an
/// opaque token is minted and persisted. With it off, every operation fails
/// loudly rather than pretending a real backend exists.
pub struct AuthService {
    store: Store,
    demo_mode: bool,
}

impl AuthService {
    pub fn new(store: Store, demo_mode: bool) -> Self {
        Self { store, demo_mode }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.require_demo_mode()?;
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            bail!("Email and password are required");
        }

        let session = self
            .mint_session(email, email.split('@').next().unwrap_or("Demo User"))
            .await?;
        info!("Demo login for {}", session.user.email);
        Ok(session)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthSession> {
        self.require_demo_mode()?;
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() || email.is_empty() || password.is_empty() {
            bail!("Name, email and password are required");
        }

        let session = self.mint_session(email, name).await?;
        info!("Demo registration for {}", session.user.email);
        Ok(session)
    }

    pub async fn logout(&self) -> Result<()> {
        self.store.remove(NS_AUTH, KEY_AUTH_TOKEN).await?;
        self.store.remove(NS_AUTH, KEY_USER_PROFILE).await?;
        info!("Logged out, auth state cleared");
        Ok(())
    }

    /// Restore the persisted session, if any.
    pub async fn current_session(&self) -> Result<Option<AuthSession>> {
        let token = self.store.get(NS_AUTH, KEY_AUTH_TOKEN).await?;
        let user: Option<User> = self.store.get_json(NS_AUTH, KEY_USER_PROFILE).await?;
        Ok(match (token, user) {
            (Some(token), Some(user)) => Some(AuthSession { user, token }),
            _ => None,
        })
    }

    fn require_demo_mode(&self) -> Result<()> {
        if !self.demo_mode {
            bail!("Authentication backend is not configured; demo mode is disabled");
        }
        Ok(())
    }

    async fn mint_session(&self, email: &str, name: &str) -> Result<AuthSession> {
        let user = User {
            id: format!("demo-user-{}", Uuid::new_v4().simple()),
            email: email.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let token = format!("demo-token-{}", Uuid::new_v4().simple());

        self.store.set(NS_AUTH, KEY_AUTH_TOKEN, &token).await?;
        self.store.set_json(NS_AUTH, KEY_USER_PROFILE, &user).await?;

        Ok(AuthSession { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service(demo_mode: bool) -> (AuthService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("elisa.db")).await.unwrap();
        store.init().await.unwrap();
        (AuthService::new(store, demo_mode), dir)
    }

    #[tokio::test]
    async fn demo_login_persists_and_logout_clears() {
        let (auth, _dir) = service(true).await;

        let session = auth.login("tech@example.com", "hunter2").await.unwrap();
        assert!(session.token.starts_with("demo-token-"));
        assert_eq!(session.user.email, "tech@example.com");

        let restored = auth.current_session().await.unwrap().unwrap();
        assert_eq!(restored.token, session.token);
        assert_eq!(restored.user.email, "tech@example.com");

        auth.logout().await.unwrap();
        assert!(auth.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_credentials_are_rejected_even_in_demo_mode() {
        let (auth, _dir) = service(true).await;
        assert!(auth.login("", "pw").await.is_err());
        assert!(auth.login("a@b.c", "").await.is_err());
        assert!(auth.register("", "a@b.c", "pw").await.is_err());
    }

    #[tokio::test]
    async fn disabled_demo_mode_refuses_auth() {
        let (auth, _dir) = service(false).await;
        assert!(auth.login("tech@example.com", "hunter2").await.is_err());
        // Restoring persisted state still works without demo mode.
        assert!(auth.current_session().await.unwrap().is_none());
    }
}
