//! Multi-file authentication state.
//!
//! One directory holds `creds.json` plus one JSON file per signal key
//! (`{category}-{id}.json`). The contents are opaque to this client; the
//! messaging library reads and writes them through [`SignalKeyStore`].

use crate::store::error::{Result, StoreError};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use wabot_core::creds::{CredsUpdate, Credentials};

const CREDS_FILE: &str = "creds.json";

/// Key material the library keeps between sessions, grouped by category
/// (`pre-key`, `session`, `sender-key`, `app-state-sync-key`, ...).
#[async_trait]
pub trait SignalKeyStore: Send + Sync {
    /// Returns the stored values for the ids that exist.
    async fn get(&self, category: &str, ids: &[String]) -> Result<HashMap<String, Value>>;

    /// Writes `Some` values and deletes ids mapped to `None`.
    async fn set(&self, category: &str, values: HashMap<String, Option<Value>>) -> Result<()>;
}

pub struct MultiFileAuthState {
    base_path: PathBuf,
    creds: RwLock<Credentials>,
}

impl MultiFileAuthState {
    /// Opens (creating if needed) the directory and loads the credentials.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = path.into();
        fs::create_dir_all(&base_path).await?;

        let creds_path = base_path.join(CREDS_FILE);
        let creds = match read_json::<Credentials>(&creds_path).await? {
            Some(creds) => {
                debug!("Loaded credentials from {}", creds_path.display());
                creds
            }
            None => {
                debug!("No credentials at {}, starting unpaired", creds_path.display());
                Credentials::default()
            }
        };

        Ok(Self {
            base_path,
            creds: RwLock::new(creds),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn credentials(&self) -> Credentials {
        self.creds.read().await.clone()
    }

    /// Merges a change notification into memory, then flushes to disk.
    /// A failed flush leaves memory updated; the next save retries it.
    pub async fn apply_update(&self, update: &CredsUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.creds.write().await.apply_update(update)?;
        self.save_creds().await
    }

    pub async fn save_creds(&self) -> Result<()> {
        let snapshot = self.creds.read().await.clone();
        write_json(&self.base_path.join(CREDS_FILE), &snapshot).await
    }

    fn key_path(&self, category: &str, id: &str) -> PathBuf {
        self.base_path
            .join(sanitize_filename(&format!("{category}-{id}.json")))
    }

    pub async fn read_key<T: DeserializeOwned>(&self, category: &str, id: &str) -> Result<Option<T>> {
        read_json(&self.key_path(category, id)).await
    }

    pub async fn write_key<T: Serialize>(&self, category: &str, id: &str, value: &T) -> Result<()> {
        write_json(&self.key_path(category, id), value).await
    }

    pub async fn remove_key(&self, category: &str, id: &str) -> Result<()> {
        match fs::remove_file(self.key_path(category, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[async_trait]
impl SignalKeyStore for MultiFileAuthState {
    async fn get(&self, category: &str, ids: &[String]) -> Result<HashMap<String, Value>> {
        let mut found = HashMap::new();
        for id in ids {
            match self.read_key::<Value>(category, id).await {
                Ok(Some(value)) => {
                    found.insert(id.clone(), value);
                }
                Ok(None) => {}
                Err(StoreError::Serialization(e)) => {
                    warn!("Ignoring unreadable {category} key {id}: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    async fn set(&self, category: &str, values: HashMap<String, Option<Value>>) -> Result<()> {
        for (id, value) in values {
            match value {
                Some(value) => self.write_key(category, &id, &value).await?,
                None => self.remove_key(category, &id).await?,
            }
        }
        Ok(())
    }
}

fn sanitize_filename(key: &str) -> String {
    key.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-', "_")
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io(e)),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data).await.map_err(StoreError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn starts_unpaired_and_persists_updates() {
        let dir = tempfile::tempdir().unwrap();
        let auth = MultiFileAuthState::open(dir.path().join("auth")).await.unwrap();
        assert!(!auth.credentials().await.registered);

        let update = CredsUpdate::default()
            .set("registered", true)
            .set("me", json!({"id": "15551234567@s.whatsapp.net"}));
        auth.apply_update(&update).await.unwrap();

        let reopened = MultiFileAuthState::open(dir.path().join("auth")).await.unwrap();
        let creds = reopened.credentials().await;
        assert!(creds.registered);
        assert_eq!(creds.me_jid().unwrap().user, "15551234567");
    }

    #[tokio::test]
    async fn empty_update_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let auth = MultiFileAuthState::open(dir.path()).await.unwrap();
        auth.apply_update(&CredsUpdate::default()).await.unwrap();
        assert!(!dir.path().join(CREDS_FILE).exists());
    }

    #[tokio::test]
    async fn key_files_are_sanitized_and_removable() {
        let dir = tempfile::tempdir().unwrap();
        let auth = MultiFileAuthState::open(dir.path()).await.unwrap();

        let id = "15551234567.0:2".to_string();
        let mut values = HashMap::new();
        values.insert(id.clone(), Some(json!({"record": "abc"})));
        auth.set("session", values).await.unwrap();

        assert!(dir.path().join("session-15551234567.0_2.json").exists());
        let got = auth.get("session", &[id.clone(), "missing".into()]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[&id], json!({"record": "abc"}));

        let mut removal = HashMap::new();
        removal.insert(id.clone(), None);
        auth.set("session", removal).await.unwrap();
        assert!(auth.get("session", &[id]).await.unwrap().is_empty());
        auth.remove_key("session", "never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_creds_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CREDS_FILE), b"{not json").unwrap();
        let result = MultiFileAuthState::open(dir.path()).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
