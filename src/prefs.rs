//! Persisted preferences — the last-used homeserver address.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::PrefsError;

/// Preference key for the last-used homeserver address.
pub const LAST_HOMESERVER_KEY: &str = "last_homeserver_address";

/// Backend-agnostic preference storage.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// The homeserver address used in the previous session, if any.
    async fn last_homeserver(&self) -> Result<Option<String>, PrefsError>;

    /// Remember `address` as the default for the next session.
    async fn set_last_homeserver(&self, address: &str) -> Result<(), PrefsError>;
}

/// JSON-file backed preferences.
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_map(&self) -> Result<HashMap<String, String>, PrefsError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PreferenceStore for FilePreferences {
    async fn last_homeserver(&self) -> Result<Option<String>, PrefsError> {
        let map = self.read_map().await?;
        Ok(map.get(LAST_HOMESERVER_KEY).cloned())
    }

    async fn set_last_homeserver(&self, address: &str) -> Result<(), PrefsError> {
        let mut map = self.read_map().await?;
        map.insert(LAST_HOMESERVER_KEY.to_string(), address.to_string());
        let contents = serde_json::to_string_pretty(&map)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }
}

/// In-memory preferences for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryPreferences {
    map: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl PreferenceStore for MemoryPreferences {
    async fn last_homeserver(&self) -> Result<Option<String>, PrefsError> {
        Ok(self.map.read().await.get(LAST_HOMESERVER_KEY).cloned())
    }

    async fn set_last_homeserver(&self, address: &str) -> Result<(), PrefsError> {
        self.map
            .write()
            .await
            .insert(LAST_HOMESERVER_KEY.to_string(), address.to_string());
        Ok(())
    }
}
