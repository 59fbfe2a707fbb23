use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::errors::ServiceError;

/// Persistence port for serialized carts, one record per session.
#[async_trait]
pub trait CartStorage: Send + Sync {
    async fn load(&self, session: &str) -> Result<Option<String>, ServiceError>;
    async fn save(&self, session: &str, payload: &str) -> Result<(), ServiceError>;
    async fn remove(&self, session: &str) -> Result<(), ServiceError>;
}

/// Process-local storage. Carts are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    records: DashMap<String, String>,
}

impl MemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw record for a session, as last saved.
    pub fn raw(&self, session: &str) -> Option<String> {
        self.records.get(session).map(|r| r.value().clone())
    }

    /// Seeds a record without going through a cart, e.g. to simulate a corrupt payload.
    pub fn put_raw(&self, session: &str, payload: impl Into<String>) {
        self.records.insert(session.to_string(), payload.into());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CartStorage for MemoryCartStorage {
    async fn load(&self, session: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.raw(session))
    }

    async fn save(&self, session: &str, payload: &str) -> Result<(), ServiceError> {
        self.records
            .insert(session.to_string(), payload.to_string());
        Ok(())
    }

    async fn remove(&self, session: &str) -> Result<(), ServiceError> {
        self.records.remove(session);
        Ok(())
    }
}

/// One JSON file per session under a directory.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session: &str) -> Result<PathBuf, ServiceError> {
        let safe = !session.is_empty()
            && session
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !safe {
            return Err(ServiceError::ValidationError(
                "cart session id contains unsupported characters".to_string(),
            ));
        }
        Ok(self.dir.join(format!("{session}.json")))
    }
}

fn storage_error(action: &str, path: &Path, err: std::io::Error) -> ServiceError {
    ServiceError::StorageError(format!("failed to {action} {}: {err}", path.display()))
}

#[async_trait]
impl CartStorage for FileCartStorage {
    async fn load(&self, session: &str) -> Result<Option<String>, ServiceError> {
        let path = self.path_for(session)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            // Non-UTF-8 bytes are a corrupt record, not an I/O failure.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(String::new()))
            }
            Err(e) => Err(storage_error("read", &path, e)),
        }
    }

    async fn save(&self, session: &str, payload: &str) -> Result<(), ServiceError> {
        let path = self.path_for(session)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error("create", &self.dir, e))?;

        // Write then rename so readers never observe a half-written cart.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| storage_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error("replace", &path, e))?;
        debug!(path = %path.display(), "cart saved");
        Ok(())
    }

    async fn remove(&self, session: &str) -> Result<(), ServiceError> {
        let path = self.path_for(session)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("remove", &path, e)),
        }
    }
}
