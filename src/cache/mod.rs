//! Content-addressed dependency cache

pub mod archive;
pub mod resolver;

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteCacheStore;

pub use resolver::{CachePolicy, CacheResolver, Resolution};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Digest used when the manifest file does not exist
pub const MISSING_MANIFEST_DIGEST: &str = "0000000000000000";

/// Host OS identifier as used in cache namespaces
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        other => other,
    }
}

/// Deterministic identifier of a stored dependency cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// `{os}-{literal}`, e.g. `Linux-pip`
    pub namespace: String,

    /// Lowercase hex SHA-256 of the manifest bytes
    pub content_digest: String,
}

impl CacheKey {
    pub fn new<N: Into<String>, D: Into<String>>(namespace: N, content_digest: D) -> Self {
        Self {
            namespace: namespace.into(),
            content_digest: content_digest.into(),
        }
    }

    /// Key for raw manifest content
    pub fn from_bytes(namespace: &str, bytes: &[u8]) -> Self {
        Self::new(namespace, digest(bytes))
    }

    /// Key for a manifest file; a missing file maps to the sentinel digest
    pub fn for_manifest(namespace: &str, manifest: &Path) -> Result<Self> {
        match std::fs::read(manifest) {
            Ok(bytes) => Ok(Self::from_bytes(namespace, &bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::new(namespace, MISSING_MANIFEST_DIGEST))
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read manifest {}", manifest.display())),
        }
    }

    /// Default restore prefix: every key in this namespace
    pub fn namespace_prefix(&self) -> String {
        format!("{}-", self.namespace)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.namespace, self.content_digest)
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A stored cache payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Rendered key (`CacheKey` display form)
    pub key: String,

    /// Opaque payload
    pub payload: Vec<u8>,

    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new<K: Into<String>>(key: K, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Listing view of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntrySummary {
    pub key: String,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
}

/// Result of a write; entries are immutable once written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutOutcome {
    Stored,
    AlreadyExists,
}

/// How a restore was satisfied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    /// Exact key found
    Hit,
    /// A restore prefix matched another key
    Partial { matched_key: String },
    /// Nothing usable; dependencies are installed from scratch
    Miss,
}

/// Trait for cache storage backends
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Exact-key lookup
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Most recently written entry whose key starts with `prefix`
    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry; a second write to an existing key is a no-op
    async fn put(&self, entry: CacheEntry) -> Result<PutOutcome>;

    /// All entries, most recent first
    async fn list(&self) -> Result<Vec<CacheEntrySummary>>;
}

/// In-memory cache store (for testing or ephemeral use)
pub struct InMemoryCacheStore {
    // Insertion order is write order
    entries: tokio::sync::RwLock<Vec<CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| e.key == key).cloned())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().find(|e| e.key.starts_with(prefix)).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<PutOutcome> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.key == entry.key) {
            return Ok(PutOutcome::AlreadyExists);
        }
        entries.push(entry);
        Ok(PutOutcome::Stored)
    }

    async fn list(&self) -> Result<Vec<CacheEntrySummary>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .map(|e| CacheEntrySummary {
                key: e.key.clone(),
                size_bytes: e.payload.len(),
                created_at: e.created_at,
            })
            .collect())
    }
}
