// # File Domain Registry
//
// File-based implementation of DomainRegistry with crash recovery.
//
// ## Purpose
//
// Keeps monitored domains and their applied addresses across daemon restarts,
// so an unchanged address costs zero provider calls after a restart too.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Corruption detection: JSON validation on load
// - Automatic backup: `.backup` holds the previous good file
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "domains": [
//     {
//       "id": "home",
//       "name": "home.example.com",
//       "zone_id": "023e105f4ecef8ad9ca31a8372d0c353",
//       "record_kind": "A",
//       "ttl": 300,
//       "provider": "cf-main",
//       "notifier": "ops",
//       "active": true,
//       "last_applied_ip": "203.0.113.5",
//       "last_updated": "2025-01-09T12:00:00Z"
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::MonitoredDomain;
use crate::state::memory::{apply_commit, sorted_active};
use crate::traits::{CommitOutcome, DomainRegistry};

/// Registry file format version
const REGISTRY_FILE_VERSION: &str = "1.0";

/// File-based domain registry with crash recovery
///
/// Every mutation is written to disk before it becomes visible: the new
/// domain map is persisted first and only then swapped in, so a failed write
/// leaves both the file and the in-memory view untouched.
///
/// # Example
///
/// ```rust,no_run
/// use driftdns_core::state::FileDomainRegistry;
/// use driftdns_core::traits::DomainRegistry;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = FileDomainRegistry::new("/var/lib/driftdns/domains.json").await?;
///
///     for domain in registry.active_domains().await? {
///         println!("{} -> {:?}", domain.name, domain.last_applied_ip);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileDomainRegistry {
    path: PathBuf,
    domains: RwLock<HashMap<String, MonitoredDomain>>,
}

/// Serializable registry file
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RegistryFile {
    version: String,
    domains: Vec<MonitoredDomain>,
}

impl FileDomainRegistry {
    /// Create or load a file registry
    ///
    /// 1. Load the registry file
    /// 2. If it is corrupted, load the backup and restore it over the main file
    /// 3. If both are unusable, start empty
    ///
    /// A missing file is an empty registry. Parent directories are created.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create registry directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let domains = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            domains: RwLock::new(domains),
        })
    }

    /// Insert or replace a domain and persist the registry
    pub async fn put_domain(&self, domain: MonitoredDomain) -> Result<(), Error> {
        domain.validate()?;
        let mut guard = self.domains.write().await;
        let mut next = guard.clone();
        next.insert(domain.id.clone(), domain);
        self.write_file(&next).await?;
        *guard = next;
        Ok(())
    }

    /// Remove a domain and persist the registry
    pub async fn remove_domain(&self, id: &str) -> Result<Option<MonitoredDomain>, Error> {
        let mut guard = self.domains.write().await;
        if !guard.contains_key(id) {
            return Ok(None);
        }
        let mut next = guard.clone();
        let removed = next.remove(id);
        self.write_file(&next).await?;
        *guard = next;
        Ok(removed)
    }

    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, MonitoredDomain>, Error> {
        match Self::load(path).await {
            Ok(domains) => {
                tracing::debug!("Loaded domain registry: {} domains", domains.len());
                Ok(domains)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Registry file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with an empty registry.");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(domains) => {
                        tracing::info!("Recovered registry from backup: {} domains", domains.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore registry file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(domains)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unusable: {}. Starting with an empty registry.",
                            backup_err
                        );
                        Ok(HashMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Parse a registry file; `Error::Json` means the content is corrupted
    async fn load(path: &Path) -> Result<HashMap<String, MonitoredDomain>, Error> {
        if !path.exists() {
            tracing::debug!("Registry file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::registry(format!("Failed to read registry file {}: {}", path.display(), e))
        })?;
        let file: RegistryFile = serde_json::from_str(&content)?;

        if file.version != REGISTRY_FILE_VERSION {
            tracing::warn!(
                "Registry file version mismatch: expected {}, got {}. Attempting to load anyway.",
                REGISTRY_FILE_VERSION,
                file.version
            );
        }

        let mut domains = HashMap::with_capacity(file.domains.len());
        for domain in file.domains {
            if let Err(e) = domain.validate() {
                tracing::warn!("Skipping invalid domain {} in registry: {}", domain.id, e);
                continue;
            }
            domains.insert(domain.id.clone(), domain);
        }
        Ok(domains)
    }

    /// Write `domains` to disk atomically
    async fn write_file(&self, domains: &HashMap<String, MonitoredDomain>) -> Result<(), Error> {
        let mut list: Vec<MonitoredDomain> = domains.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));

        let file = RegistryFile {
            version: REGISTRY_FILE_VERSION.to_string(),
            domains: list,
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::registry(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::registry(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            temp.sync_all().await.map_err(|e| {
                Error::registry(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create registry backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::registry(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Registry written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DomainRegistry for FileDomainRegistry {
    async fn active_domains(&self) -> Result<Vec<MonitoredDomain>, Error> {
        Ok(sorted_active(&*self.domains.read().await))
    }

    async fn get_domain(&self, id: &str) -> Result<Option<MonitoredDomain>, Error> {
        Ok(self.domains.read().await.get(id).cloned())
    }

    async fn commit_applied(
        &self,
        id: &str,
        expected_previous: Option<IpAddr>,
        new_ip: IpAddr,
        at: DateTime<Utc>,
    ) -> Result<CommitOutcome, Error> {
        let mut guard = self.domains.write().await;
        let mut next = guard.clone();
        let outcome = apply_commit(&mut next, id, expected_previous, new_ip, at)?;
        if outcome.is_committed() {
            self.write_file(&next).await?;
            *guard = next;
        }
        Ok(outcome)
    }

    async fn flush(&self) -> Result<(), Error> {
        let guard = self.domains.read().await;
        self.write_file(&guard).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordKind;
    use tempfile::tempdir;

    fn home() -> MonitoredDomain {
        MonitoredDomain::new("home", "home.example.com", "Z1", RecordKind::A, "cf")
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domains.json");

        let registry = FileDomainRegistry::new(&path).await.unwrap();
        assert!(registry.active_domains().await.unwrap().is_empty());

        registry.put_domain(home()).await.unwrap();
        let ip: IpAddr = "203.0.113.5".parse().unwrap();
        registry
            .commit_applied("home", None, ip, Utc::now())
            .await
            .unwrap();
        assert!(path.exists());

        let reloaded = FileDomainRegistry::new(&path).await.unwrap();
        let domain = reloaded.get_domain("home").await.unwrap().unwrap();
        assert_eq!(domain.last_applied_ip, Some(ip));
        assert!(domain.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_conflict_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domains.json");

        let registry = FileDomainRegistry::new(&path).await.unwrap();
        registry
            .put_domain(home().with_last_applied_ip("203.0.113.5".parse().unwrap()))
            .await
            .unwrap();
        let before = fs::read_to_string(&path).await.unwrap();

        let outcome = registry
            .commit_applied("home", None, "203.0.113.9".parse().unwrap(), Utc::now())
            .await
            .unwrap();
        assert!(!outcome.is_committed());
        assert_eq!(fs::read_to_string(&path).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domains.json");

        let registry = FileDomainRegistry::new(&path).await.unwrap();
        registry.put_domain(home()).await.unwrap();
        let first: IpAddr = "203.0.113.5".parse().unwrap();
        registry
            .commit_applied("home", None, first, Utc::now())
            .await
            .unwrap();

        let backup_path = FileDomainRegistry::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after a rewrite");

        fs::write(&path, b"corrupted json data").await.unwrap();

        // Backup holds the file as it was before the last write
        let recovered = FileDomainRegistry::new(&path).await.unwrap();
        let domain = recovered.get_domain("home").await.unwrap().unwrap();
        assert_eq!(domain.last_applied_ip, None);

        // Main file restored from the backup
        let restored = fs::read_to_string(&path).await.unwrap();
        assert!(restored.contains("home.example.com"));
    }

    #[tokio::test]
    async fn test_corrupted_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("domains.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let registry = FileDomainRegistry::new(&path).await.unwrap();
        assert!(registry.active_domains().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_domain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("domains.json");

        let registry = FileDomainRegistry::new(&path).await.unwrap();
        registry.put_domain(home()).await.unwrap();
        assert!(registry.remove_domain("home").await.unwrap().is_some());
        assert!(registry.remove_domain("home").await.unwrap().is_none());

        let reloaded = FileDomainRegistry::new(&path).await.unwrap();
        assert!(reloaded.get_domain("home").await.unwrap().is_none());
    }
}
