//! Data persistence layer
//!
//! JSON state files with a version/checksum envelope, atomic writes, and
//! rotating backups. This is the native replacement for the localStorage
//! blobs the web clients keep their sessions in.

use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Persistence error types
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State not initialized
    #[error("State not initialized")]
    NotInitialized,

    /// Corruption detected
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Version mismatch
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version
        expected: u32,
        /// Found version
        found: u32,
    },
}

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// On-disk envelope around the state data
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
struct StateEnvelope<T> {
    /// Schema version
    version: u32,
    /// Checksum of the serialized data
    checksum: String,
    /// The actual state
    data: T,
}

impl<T: Serialize> StateEnvelope<T> {
    fn new(version: u32, data: T) -> Result<Self> {
        let data_json = serde_json::to_string(&data)?;
        let checksum = format!("{:x}", md5::compute(&data_json));

        Ok(Self { version, checksum, data })
    }

    fn verify_checksum(&self) -> Result<()> {
        let data_json = serde_json::to_string(&self.data)?;
        let computed = format!("{:x}", md5::compute(&data_json));

        if computed != self.checksum {
            return Err(PersistenceError::Corruption(format!(
                "Checksum mismatch: expected {}, got {}",
                self.checksum, computed
            )));
        }

        Ok(())
    }
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the state file
    pub path: PathBuf,
    /// Current schema version
    pub version: u32,
    /// Write via temp file + rename
    pub atomic_writes: bool,
    /// Keep rotating backups of previous states
    pub auto_backup: bool,
    /// Number of backups to keep
    pub backup_count: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state.json"),
            version: 1,
            atomic_writes: true,
            auto_backup: true,
            backup_count: 3,
        }
    }
}

impl PersistenceConfig {
    /// Create a new configuration
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set schema version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Enable or disable atomic writes
    pub fn atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    /// Configure backups
    pub fn backups(mut self, enabled: bool, count: usize) -> Self {
        self.auto_backup = enabled;
        self.backup_count = count;
        self
    }
}

/// Persisted state manager
///
/// Holds a typed state value in memory and mirrors every change to disk.
/// Loading verifies the checksum and schema version before accepting the
/// file contents.
pub struct PersistedState<T> {
    config: PersistenceConfig,
    state: Arc<RwLock<Option<T>>>,
}

impl<T> PersistedState<T>
where
    T: Serialize + DeserializeOwned + Clone + Default,
{
    /// Create a new persisted state manager
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(None)),
        }
    }

    /// Initialize by loading from disk
    ///
    /// A missing file is not an error; the state starts from `T::default()`.
    pub async fn init(&self) -> Result<()> {
        match self.load_from_disk().await {
            Ok(data) => {
                let mut state = self.state.write().await;
                *state = Some(data);
                Ok(())
            }
            Err(PersistenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut state = self.state.write().await;
                *state = Some(T::default());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Get the current state
    pub async fn get(&self) -> Result<T> {
        let state = self.state.read().await;
        state.clone().ok_or(PersistenceError::NotInitialized)
    }

    /// Update the state in place and persist to disk
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.state.write().await;

        if let Some(current) = state.as_mut() {
            f(current);
            self.write_to_disk(current).await?;
            Ok(())
        } else {
            Err(PersistenceError::NotInitialized)
        }
    }

    /// Replace the entire state and persist
    pub async fn set(&self, new_state: T) -> Result<()> {
        let mut state = self.state.write().await;
        *state = Some(new_state.clone());
        self.write_to_disk(&new_state).await
    }

    /// Reset to default and delete the state file
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        *state = Some(T::default());

        if self.config.path.exists() {
            fs::remove_file(&self.config.path).await?;
        }

        Ok(())
    }

    async fn load_from_disk(&self) -> Result<T> {
        let contents = fs::read_to_string(&self.config.path).await?;

        let envelope: StateEnvelope<T> = serde_json::from_str(&contents)?;

        envelope.verify_checksum()?;

        if envelope.version != self.config.version {
            return Err(PersistenceError::VersionMismatch {
                expected: self.config.version,
                found: envelope.version,
            });
        }

        Ok(envelope.data)
    }

    async fn write_to_disk(&self, data: &T) -> Result<()> {
        let envelope = StateEnvelope::new(self.config.version, data.clone())?;
        let json = serde_json::to_string_pretty(&envelope)?;

        if self.config.atomic_writes {
            self.write_atomic(&json).await?;
        } else {
            fs::write(&self.config.path, json).await?;
        }

        if self.config.auto_backup {
            if let Err(e) = self.create_backup().await {
                tracing::warn!("backup rotation failed: {}", e);
            }
        }

        Ok(())
    }

    /// Write via temp file + rename so a crash never leaves a torn file
    async fn write_atomic(&self, contents: &str) -> Result<()> {
        let temp_path = self.config.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.config.path).await?;

        Ok(())
    }

    async fn create_backup(&self) -> Result<()> {
        if !self.config.path.exists() {
            return Ok(());
        }

        // Shift backup.N -> backup.N+1, oldest falls off
        for i in (1..self.config.backup_count).rev() {
            let from = self.backup_path(i);
            let to = self.backup_path(i + 1);

            if from.exists() {
                let _ = fs::rename(&from, &to).await;
            }
        }

        let backup_path = self.backup_path(1);
        let _ = fs::copy(&self.config.path, &backup_path).await;

        Ok(())
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut path = self.config.path.clone();
        let filename = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        path.set_file_name(format!("{}.backup.{}", filename, n));
        path
    }

    /// Restore a previous state from one of the rotating backups
    pub async fn restore_from_backup(&self, backup_number: usize) -> Result<()> {
        let backup_path = self.backup_path(backup_number);

        if !backup_path.exists() {
            return Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Backup not found",
            )));
        }

        fs::copy(&backup_path, &self.config.path).await?;
        self.init().await
    }
}
