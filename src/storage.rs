//! Session storage
//!
//! The single source of truth for "are we logged in with real tokens".
//! All credential and identity writes in the crate go through a
//! [`SessionStore`]; no other component touches the storage medium directly.
//!
//! Two implementations are provided: [`FileStore`] persists the session as a
//! JSON file scoped by profile name under the user cache directory (so two
//! profiles never share a session), and [`MemoryStore`] keeps everything
//! in-process for tests and ephemeral sessions.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{AuthError, Result};
use crate::session::UserIdentity;
use crate::token::CredentialPair;

/// Tokens currently held in storage.
///
/// Absence of either token is a normal, expected state (anonymous or
/// tokenless session), never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredTokens {
    /// Access token, if one is stored
    pub access_token: Option<String>,

    /// Refresh token, if one is stored
    pub refresh_token: Option<String>,
}

impl StoredTokens {
    /// Both tokens present, as a pair
    #[must_use]
    pub fn pair(&self) -> Option<CredentialPair> {
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) => {
                Some(CredentialPair::new(access.clone(), refresh.clone()))
            }
            _ => None,
        }
    }

    /// True when no tokens are stored at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Persistent session state: credential pair plus user identity.
///
/// Reads never fail: a missing or unreadable session decodes to the empty
/// state. Writes go through [`store_tokens`](SessionStore::store_tokens) /
/// [`store_identity`](SessionStore::store_identity) exclusively.
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Persist both tokens, overwriting any existing pair
    fn store_tokens(&self, pair: &CredentialPair) -> Result<()>;

    /// Read the currently stored tokens; empty when absent
    fn read_tokens(&self) -> StoredTokens;

    /// Remove both tokens
    fn clear_tokens(&self) -> Result<()>;

    /// Persist the user identity record
    fn store_identity(&self, identity: &UserIdentity) -> Result<()>;

    /// Read the stored identity, if any
    fn read_identity(&self) -> Option<UserIdentity>;

    /// Remove the identity record
    fn clear_identity(&self) -> Result<()>;

    /// Remove everything this store holds
    fn clear_all(&self) -> Result<()> {
        self.clear_tokens()?;
        self.clear_identity()
    }
}

/// On-disk shape of a stored session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(default)]
    access_token: Option<String>,

    #[serde(default)]
    refresh_token: Option<String>,

    #[serde(default)]
    identity: Option<UserIdentity>,
}

/// File-backed session store, one JSON file per profile
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store for the given profile under the default session dir
    pub fn for_profile(profile: &str) -> Result<Self> {
        let dir = crate::config::Config::session_dir()?;
        Ok(Self {
            path: dir.join(format!("session-{profile}.json")),
        })
    }

    /// Create a store at an explicit path
    #[must_use]
    pub const fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_record(&self) -> SessionRecord {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return SessionRecord::default();
        };

        serde_json::from_str(&contents).unwrap_or_default()
    }

    fn write_record(&self, record: &SessionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AuthError::Storage(format!("create {}: {e}", parent.display())))?;
        }

        let contents = serde_json::to_string_pretty(record)
            .map_err(|e| AuthError::Storage(format!("encode session: {e}")))?;

        fs::write(&self.path, contents)
            .map_err(|e| AuthError::Storage(format!("write {}: {e}", self.path.display())))?;

        // The file holds credentials
        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, Permissions::from_mode(0o600))
                .map_err(|e| AuthError::Storage(format!("chmod {}: {e}", self.path.display())))?;
        }

        Ok(())
    }
}

impl SessionStore for FileStore {
    fn store_tokens(&self, pair: &CredentialPair) -> Result<()> {
        let mut record = self.read_record();
        record.access_token = Some(pair.access_token.clone());
        record.refresh_token = Some(pair.refresh_token.clone());
        self.write_record(&record)
    }

    fn read_tokens(&self) -> StoredTokens {
        let record = self.read_record();
        StoredTokens {
            access_token: record.access_token,
            refresh_token: record.refresh_token,
        }
    }

    fn clear_tokens(&self) -> Result<()> {
        let mut record = self.read_record();
        record.access_token = None;
        record.refresh_token = None;
        self.write_record(&record)
    }

    fn store_identity(&self, identity: &UserIdentity) -> Result<()> {
        let mut record = self.read_record();
        record.identity = Some(identity.clone());
        self.write_record(&record)
    }

    fn read_identity(&self) -> Option<UserIdentity> {
        self.read_record().identity
    }

    fn clear_identity(&self) -> Result<()> {
        let mut record = self.read_record();
        record.identity = None;
        self.write_record(&record)
    }
}

/// In-memory session store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<SessionRecord>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<T>(&self, f: impl FnOnce(&mut SessionRecord) -> T) -> T {
        // A poisoned lock only happens after a panic in another test thread;
        // recover with the inner state rather than propagating.
        let mut guard = match self.record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl SessionStore for MemoryStore {
    fn store_tokens(&self, pair: &CredentialPair) -> Result<()> {
        self.with_record(|record| {
            record.access_token = Some(pair.access_token.clone());
            record.refresh_token = Some(pair.refresh_token.clone());
        });
        Ok(())
    }

    fn read_tokens(&self) -> StoredTokens {
        self.with_record(|record| StoredTokens {
            access_token: record.access_token.clone(),
            refresh_token: record.refresh_token.clone(),
        })
    }

    fn clear_tokens(&self) -> Result<()> {
        self.with_record(|record| {
            record.access_token = None;
            record.refresh_token = None;
        });
        Ok(())
    }

    fn store_identity(&self, identity: &UserIdentity) -> Result<()> {
        self.with_record(|record| record.identity = Some(identity.clone()));
        Ok(())
    }

    fn read_identity(&self) -> Option<UserIdentity> {
        self.with_record(|record| record.identity.clone())
    }

    fn clear_identity(&self) -> Result<()> {
        self.with_record(|record| record.identity = None);
        Ok(())
    }
}
