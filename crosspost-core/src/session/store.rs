use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored session for platform {0}")]
    NotFound(String),
    #[error("failed to {action} session file {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

/// Opaque persisted browser session snapshot for one platform. Only the
/// driver that produced a blob can interpret its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBlob(Vec<u8>);

impl SessionBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for SessionBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Owns the session files on disk: one `account.json` per platform under
/// `{base}/cookies/{platform}_uploader/`.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    base_dir: PathBuf,
}

impl CredentialStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn account_path(&self, platform: &str) -> PathBuf {
        self.base_dir
            .join("cookies")
            .join(format!("{platform}_uploader"))
            .join("account.json")
    }

    pub fn exists(&self, platform: &str) -> bool {
        self.account_path(platform).exists()
    }

    pub fn load(&self, platform: &str) -> StoreResult<SessionBlob> {
        let path = self.account_path(platform);
        if !path.exists() {
            return Err(StoreError::NotFound(platform.to_string()));
        }
        let bytes = fs::read(&path).map_err(|source| StoreError::Io {
            action: "read",
            path,
            source,
        })?;
        Ok(SessionBlob(bytes))
    }

    /// Overwrites atomically: the blob lands in a sibling temp file first and
    /// is renamed over the target, so a crash never leaves a torn file.
    pub fn save(&self, platform: &str, blob: &SessionBlob) -> StoreResult<()> {
        let path = self.account_path(platform);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                action: "prepare directory for",
                path: path.clone(),
                source,
            })?;
        }
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, blob.as_bytes()).map_err(|source| StoreError::Io {
            action: "stage",
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| StoreError::Io {
            action: "commit",
            path: path.clone(),
            source,
        })?;
        info!(platform, path = %path.display(), "session state saved");
        Ok(())
    }
}
