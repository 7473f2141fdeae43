// # Memory Domain Registry
//
// In-memory implementation of DomainRegistry.
//
// ## Crash Behavior
//
// - Applied addresses are lost on restart
// - The first cycle after a restart sees every domain as never assigned and
//   upserts it once (harmless: the upsert is idempotent on the provider side)
//
// ## When to Use
//
// - Tests
// - Embedding the engine behind an external domain store
// - Deployments where one extra upsert per restart is acceptable

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::MonitoredDomain;
use crate::traits::{CommitOutcome, DomainRegistry};

/// In-memory domain registry
///
/// Domains are kept in a HashMap protected by a RwLock. Cloning shares the
/// underlying map.
///
/// # Example
///
/// ```rust,no_run
/// use driftdns_core::model::{MonitoredDomain, RecordKind};
/// use driftdns_core::state::MemoryDomainRegistry;
/// use driftdns_core::traits::DomainRegistry;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = MemoryDomainRegistry::new();
///     registry
///         .put_domain(MonitoredDomain::new("home", "home.example.com", "Z1", RecordKind::A, "cf"))
///         .await?;
///
///     let outcome = registry
///         .commit_applied("home", None, "203.0.113.5".parse()?, chrono::Utc::now())
///         .await?;
///     assert!(outcome.is_committed());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDomainRegistry {
    inner: Arc<RwLock<HashMap<String, MonitoredDomain>>>,
}

impl MemoryDomainRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `domains`
    ///
    /// Every domain is validated; duplicate ids are rejected.
    pub fn with_domains<I>(domains: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = MonitoredDomain>,
    {
        let mut map = HashMap::new();
        for domain in domains {
            domain.validate()?;
            if map.contains_key(&domain.id) {
                return Err(Error::registry(format!("duplicate domain id: {}", domain.id)));
            }
            map.insert(domain.id.clone(), domain);
        }
        Ok(Self {
            inner: Arc::new(RwLock::new(map)),
        })
    }

    /// Insert or replace a domain
    pub async fn put_domain(&self, domain: MonitoredDomain) -> Result<(), Error> {
        domain.validate()?;
        self.inner.write().await.insert(domain.id.clone(), domain);
        Ok(())
    }

    /// Remove a domain, returning it if it existed
    pub async fn remove_domain(&self, id: &str) -> Option<MonitoredDomain> {
        self.inner.write().await.remove(id)
    }

    /// Number of domains (active or not)
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Compare-and-swap shared by the registry implementations
pub(crate) fn apply_commit(
    domains: &mut HashMap<String, MonitoredDomain>,
    id: &str,
    expected_previous: Option<IpAddr>,
    new_ip: IpAddr,
    at: DateTime<Utc>,
) -> Result<CommitOutcome, Error> {
    let domain = domains
        .get_mut(id)
        .ok_or_else(|| Error::not_found(format!("domain {}", id)))?;

    if domain.last_applied_ip != expected_previous {
        return Ok(CommitOutcome::Conflict {
            current: domain.last_applied_ip,
        });
    }

    domain.last_applied_ip = Some(new_ip);
    domain.last_updated = Some(at);
    Ok(CommitOutcome::Committed)
}

/// Active domains, sorted by id so cycles walk them in a stable order
pub(crate) fn sorted_active(domains: &HashMap<String, MonitoredDomain>) -> Vec<MonitoredDomain> {
    let mut active: Vec<MonitoredDomain> = domains.values().filter(|d| d.active).cloned().collect();
    active.sort_by(|a, b| a.id.cmp(&b.id));
    active
}

#[async_trait]
impl DomainRegistry for MemoryDomainRegistry {
    async fn active_domains(&self) -> Result<Vec<MonitoredDomain>, Error> {
        Ok(sorted_active(&*self.inner.read().await))
    }

    async fn get_domain(&self, id: &str) -> Result<Option<MonitoredDomain>, Error> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn commit_applied(
        &self,
        id: &str,
        expected_previous: Option<IpAddr>,
        new_ip: IpAddr,
        at: DateTime<Utc>,
    ) -> Result<CommitOutcome, Error> {
        let mut guard = self.inner.write().await;
        apply_commit(&mut guard, id, expected_previous, new_ip, at)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to flush
        Ok(())
    }
}
