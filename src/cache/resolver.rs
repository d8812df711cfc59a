//! Cache resolution - exact key, then restore prefixes, then miss

use crate::cache::{archive, host_os, CacheEntry, CacheKey, CacheStatus, CacheStore, PutOutcome};
use crate::core::matrix::RunPlan;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the dependency cache lives and how it is keyed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Dependency manifest, relative to the package root
    pub manifest: PathBuf,

    /// Root of the local cache directories (one subdirectory per run plan)
    pub path: PathBuf,

    /// Literal namespace component, e.g. `pip`
    pub namespace: String,

    /// Fallback prefixes, in priority order; empty means the host namespace
    pub restore_keys: Vec<String>,
}

impl CachePolicy {
    /// `{os}-{namespace}`, e.g. `Linux-pip`
    pub fn host_namespace(&self) -> String {
        format!("{}-{}", host_os(), self.namespace)
    }

    pub fn key_for(&self, workdir: &Path) -> Result<CacheKey> {
        CacheKey::for_manifest(&self.host_namespace(), &workdir.join(&self.manifest))
    }

    pub fn restore_prefixes(&self, key: &CacheKey) -> Vec<String> {
        if self.restore_keys.is_empty() {
            vec![key.namespace_prefix()]
        } else {
            self.restore_keys.clone()
        }
    }

    /// Local cache directory for one run plan
    pub fn dir_for(&self, plan: &RunPlan) -> PathBuf {
        self.path.join(plan.slug())
    }
}

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: CacheStatus,
    /// Empty on a miss
    pub payload: Vec<u8>,
}

/// Restores and saves dependency caches against a shared store
#[derive(Clone)]
pub struct CacheResolver {
    store: Arc<dyn CacheStore>,
}

impl CacheResolver {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Look up `key`, falling back to the restore prefixes in order.
    ///
    /// Store errors are logged and treated as a miss.
    pub async fn resolve(&self, key: &CacheKey, restore_prefixes: &[String]) -> Resolution {
        let rendered = key.to_string();

        match self.store.get(&rendered).await {
            Ok(Some(entry)) => {
                return Resolution {
                    status: CacheStatus::Hit,
                    payload: entry.payload,
                }
            }
            Ok(None) => debug!("No exact cache entry for {}", rendered),
            Err(e) => warn!("Cache lookup for {} failed: {:#}", rendered, e),
        }

        for prefix in restore_prefixes {
            match self.store.get_by_prefix(prefix).await {
                Ok(Some(entry)) => {
                    return Resolution {
                        status: CacheStatus::Partial {
                            matched_key: entry.key,
                        },
                        payload: entry.payload,
                    }
                }
                Ok(None) => debug!("No cache entry matches prefix {}", prefix),
                Err(e) => warn!("Cache prefix lookup for {} failed: {:#}", prefix, e),
            }
        }

        Resolution {
            status: CacheStatus::Miss,
            payload: Vec::new(),
        }
    }

    /// Resolve and unpack into `dir`
    pub async fn restore(&self, key: &CacheKey, restore_prefixes: &[String], dir: &Path) -> CacheStatus {
        let resolution = self.resolve(key, restore_prefixes).await;

        match archive::unpack_into(&resolution.payload, dir) {
            Ok(files) => {
                info!("Cache {} for {} ({} files restored)", describe(&resolution.status), key, files);
                resolution.status
            }
            Err(e) => {
                warn!("Failed to restore cache {} into {}: {:#}", key, dir.display(), e);
                CacheStatus::Miss
            }
        }
    }

    /// Persist `dir` under the exact key unless the restore was an exact hit.
    ///
    /// Returns `None` when nothing was written (exact hit, or a store error).
    pub async fn save(&self, key: &CacheKey, restored: &CacheStatus, dir: &Path) -> Option<PutOutcome> {
        if *restored == CacheStatus::Hit {
            debug!("Cache {} already stored; not saving", key);
            return None;
        }

        let payload = match archive::pack_dir(dir) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to pack cache directory {}: {:#}", dir.display(), e);
                return None;
            }
        };

        match self.store.put(CacheEntry::new(key.to_string(), payload)).await {
            Ok(outcome) => {
                match outcome {
                    PutOutcome::Stored => info!("Cache saved with key {}", key),
                    PutOutcome::AlreadyExists => {
                        info!("Cache {} was written concurrently; keeping the first write", key)
                    }
                }
                Some(outcome)
            }
            Err(e) => {
                warn!("Failed to save cache {}: {:#}", key, e);
                None
            }
        }
    }
}

fn describe(status: &CacheStatus) -> String {
    match status {
        CacheStatus::Hit => "hit".to_string(),
        CacheStatus::Partial { matched_key } => format!("partial hit via {}", matched_key),
        CacheStatus::Miss => "miss".to_string(),
    }
}
