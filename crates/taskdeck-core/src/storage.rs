use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::PersistenceError;

pub const DEFAULT_STORAGE_KEY: &str = "todoWorkspaces";

/// Key-value slot holding the whole serialized collection.
pub trait Storage {
    fn save(&mut self, payload: &str) -> Result<(), PersistenceError>;
    fn load(&self) -> Result<Option<String>, PersistenceError>;
}

#[derive(Debug)]
pub struct FileStorage {
    pub data_dir: PathBuf,
    pub key: String,
    pub path: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, key: &str) -> Result<Self, PersistenceError> {
        let key = key.trim();
        if key.is_empty() || key.contains(['/', '\\']) {
            return Err(PersistenceError::Unavailable(format!(
                "invalid storage key: {key:?}"
            )));
        }

        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)?;
        let path = data_dir.join(format!("{key}.json"));

        info!(
            data_dir = %data_dir.display(),
            file = %path.display(),
            "opened storage"
        );

        Ok(Self {
            data_dir,
            key: key.to_string(),
            path,
        })
    }
}

impl Storage for FileStorage {
    #[tracing::instrument(skip(self, payload), fields(key = %self.key, bytes = payload.len()))]
    fn save(&mut self, payload: &str) -> Result<(), PersistenceError> {
        debug!(file = %self.path.display(), "saving document atomically");

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(payload.as_bytes())?;
        temp.flush()?;

        temp.persist(&self.path).map_err(|err| {
            PersistenceError::Unavailable(format!(
                "failed to persist {}: {}",
                self.path.display(),
                err
            ))
        })?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(key = %self.key))]
    fn load(&self) -> Result<Option<String>, PersistenceError> {
        if !self.path.exists() {
            debug!(file = %self.path.display(), "no stored document");
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        debug!(bytes = raw.len(), "loaded stored document");
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(raw))
    }
}

/// In-process slot; `quota` emulates a browser storage limit.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    value: Option<String>,
    quota: Option<usize>,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn set_quota(&mut self, bytes: Option<usize>) {
        self.quota = bytes;
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Storage for MemoryStorage {
    fn save(&mut self, payload: &str) -> Result<(), PersistenceError> {
        if let Some(limit) = self.quota
            && payload.len() > limit
        {
            return Err(PersistenceError::QuotaExceeded {
                needed: payload.len(),
                limit,
            });
        }
        self.value = Some(payload.to_string());
        self.writes += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, PersistenceError> {
        Ok(self.value.clone())
    }
}
