//! HTTP response cache for management API reads
//!
//! The cache handle is built by the caller and passed into `OcmClient::new`,
//! so its lifetime is the audit run rather than the process.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default on-disk cache location, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = ".ocm-http-cache";

/// Where cached responses live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// Never cache
    Disabled,
    /// Cache for this run only
    Memory,
    /// One JSON file per response under the given directory
    Disk(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: i64,
    body: Value,
}

/// Read-through cache of successful GET response bodies
pub struct ResponseCache {
    backend: CacheBackend,
    /// `None` keeps entries forever
    expire_after: Option<Duration>,
    memory: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(backend: CacheBackend, expire_after: Option<Duration>) -> Self {
        Self {
            backend,
            expire_after,
            memory: RwLock::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(CacheBackend::Disabled, None)
    }

    /// Look up a fresh entry for `key`
    pub async fn get(&self, key: &str) -> Option<Value> {
        let entry = match &self.backend {
            CacheBackend::Disabled => None,
            CacheBackend::Memory => self.memory.read().await.get(key).cloned(),
            CacheBackend::Disk(dir) => {
                let path = dir.join(Self::file_name(key));
                match tokio::fs::read(&path).await {
                    Ok(bytes) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            warn!(path = %path.display(), "Ignoring corrupt cache entry: {}", e);
                            None
                        }
                    },
                    Err(_) => None,
                }
            }
        }?;

        if self.is_expired(&entry) {
            debug!(key, "Cache entry expired");
            return None;
        }

        debug!(key, "Cache hit");
        Some(entry.body)
    }

    /// Store a response body. Write failures are logged and otherwise ignored.
    pub async fn put(&self, key: &str, body: &Value) {
        let entry = CacheEntry {
            stored_at: Utc::now().timestamp(),
            body: body.clone(),
        };

        match &self.backend {
            CacheBackend::Disabled => {}
            CacheBackend::Memory => {
                self.memory.write().await.insert(key.to_string(), entry);
            }
            CacheBackend::Disk(dir) => {
                if let Err(e) = Self::write_entry(dir, key, &entry).await {
                    warn!(dir = %dir.display(), "Failed to write cache entry: {}", e);
                }
            }
        }
    }

    async fn write_entry(dir: &Path, key: &str, entry: &CacheEntry) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        let contents = serde_json::to_vec(entry)?;
        tokio::fs::write(dir.join(Self::file_name(key)), contents).await?;
        Ok(())
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        match self.expire_after {
            None => false,
            Some(ttl) => {
                let age = Utc::now().timestamp().saturating_sub(entry.stored_at);
                age < 0 || age as u64 >= ttl.as_secs()
            }
        }
    }

    fn file_name(key: &str) -> String {
        format!("{}.json", urlencoding::encode(key))
    }
}
