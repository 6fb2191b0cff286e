//! Session context and token storage.
//!
//! A [`Session`] is passed explicitly to everything that needs credentials
//! (the exchange controller, the REST client) instead of being read from
//! ambient global state. It wraps a [`TokenStore`], which holds the access
//! and refresh tokens plus the profile of the logged-in user.
//!
//! The exchange only ever reads the access token, once per connect attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Errors from the token store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// What a user may do in the moderation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Reviewer,
    Submitter,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Reviewer => write!(f, "reviewer"),
            Role::Submitter => write!(f, "submitter"),
        }
    }
}

/// The logged-in user as reported by the backend at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_reviewer: bool,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserProfile {
    /// Admin wins over reviewer; everyone else submits content.
    pub fn role(&self) -> Role {
        if self.is_admin {
            Role::Admin
        } else if self.is_reviewer {
            Role::Reviewer
        } else {
            Role::Submitter
        }
    }
}

/// Credential storage.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current bearer credential, if logged in.
    async fn access_token(&self) -> SessionResult<Option<String>>;

    async fn refresh_token(&self) -> SessionResult<Option<String>>;

    /// Replace both tokens, e.g. after login or a rotating refresh.
    async fn set_tokens(&self, access: &str, refresh: &str) -> SessionResult<()>;

    /// Replace only the access token.
    async fn set_access_token(&self, access: &str) -> SessionResult<()>;

    async fn profile(&self) -> SessionResult<Option<UserProfile>>;

    async fn set_profile(&self, profile: &UserProfile) -> SessionResult<()>;

    /// Forget tokens and profile.
    async fn clear(&self) -> SessionResult<()>;
}

/// Serialized contents of a token store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub profile: Option<UserProfile>,
}

// ---------------------------------------------------------------------------
// MemoryTokenStore
// ---------------------------------------------------------------------------

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: RwLock<StoredSession>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds an access token.
    pub fn with_access_token(access: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(StoredSession {
                access: Some(access.into()),
                ..StoredSession::default()
            }),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn access_token(&self) -> SessionResult<Option<String>> {
        Ok(self.inner.read().await.access.clone())
    }

    async fn refresh_token(&self) -> SessionResult<Option<String>> {
        Ok(self.inner.read().await.refresh.clone())
    }

    async fn set_tokens(&self, access: &str, refresh: &str) -> SessionResult<()> {
        let mut inner = self.inner.write().await;
        inner.access = Some(access.to_string());
        inner.refresh = Some(refresh.to_string());
        Ok(())
    }

    async fn set_access_token(&self, access: &str) -> SessionResult<()> {
        self.inner.write().await.access = Some(access.to_string());
        Ok(())
    }

    async fn profile(&self) -> SessionResult<Option<UserProfile>> {
        Ok(self.inner.read().await.profile.clone())
    }

    async fn set_profile(&self, profile: &UserProfile) -> SessionResult<()> {
        self.inner.write().await.profile = Some(profile.clone());
        Ok(())
    }

    async fn clear(&self) -> SessionResult<()> {
        *self.inner.write().await = StoredSession::default();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileTokenStore
// ---------------------------------------------------------------------------

/// Token store persisted as a JSON file.
///
/// A missing file reads as an empty session. Writes create parent
/// directories and are serialized through a lock so concurrent updates
/// do not interleave read-modify-write cycles.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> SessionResult<StoredSession> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredSession::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session: &StoredSession) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, bytes).await?;
        debug!(path = %self.path.display(), "session file written");
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> SessionResult<()>
    where
        F: FnOnce(&mut StoredSession) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load().await?;
        apply(&mut session);
        self.save(&session).await
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn access_token(&self) -> SessionResult<Option<String>> {
        Ok(self.load().await?.access)
    }

    async fn refresh_token(&self) -> SessionResult<Option<String>> {
        Ok(self.load().await?.refresh)
    }

    async fn set_tokens(&self, access: &str, refresh: &str) -> SessionResult<()> {
        self.update(|s| {
            s.access = Some(access.to_string());
            s.refresh = Some(refresh.to_string());
        })
        .await
    }

    async fn set_access_token(&self, access: &str) -> SessionResult<()> {
        self.update(|s| s.access = Some(access.to_string())).await
    }

    async fn profile(&self) -> SessionResult<Option<UserProfile>> {
        Ok(self.load().await?.profile)
    }

    async fn set_profile(&self, profile: &UserProfile) -> SessionResult<()> {
        let profile = profile.clone();
        self.update(move |s| s.profile = Some(profile)).await
    }

    async fn clear(&self) -> SessionResult<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Explicit session context shared by the exchange and the REST client.
#[derive(Clone)]
pub struct Session {
    tokens: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }

    /// Session backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStore::new()))
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub async fn access_token(&self) -> SessionResult<Option<String>> {
        self.tokens.access_token().await
    }

    pub async fn profile(&self) -> SessionResult<Option<UserProfile>> {
        self.tokens.profile().await
    }

    /// Role of the logged-in user, if any.
    pub async fn role(&self) -> SessionResult<Option<Role>> {
        Ok(self.tokens.profile().await?.map(|p| p.role()))
    }

    pub async fn is_logged_in(&self) -> SessionResult<bool> {
        Ok(self.tokens.access_token().await?.is_some())
    }
}
