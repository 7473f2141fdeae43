// # Domain Registry Trait
//
// Defines the interface to the store of monitored domains.
//
// ## Purpose
//
// The registry supplies the list of active domains and receives the outcome
// of successful reconciliations. Creating, editing and deleting domains is
// done by whatever owns the registry (an API, a config file, an operator);
// the engine only reads domains and commits applied addresses.
//
// ## Implementations
//
// - [`MemoryDomainRegistry`](crate::state::MemoryDomainRegistry): tests and embedding
// - [`FileDomainRegistry`](crate::state::FileDomainRegistry): JSON file with crash recovery
//
// ## Usage
//
// ```rust,ignore
// use driftdns_core::traits::{CommitOutcome, DomainRegistry};
//
// let registry = /* DomainRegistry implementation */;
//
// for domain in registry.active_domains().await? {
//     let outcome = registry
//         .commit_applied(&domain.id, domain.last_applied_ip, new_ip, chrono::Utc::now())
//         .await?;
//     assert!(outcome.is_committed());
// }
// ```

use crate::model::MonitoredDomain;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Result of a compare-and-swap on a domain's applied address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The new address and timestamp were stored
    Committed,
    /// The stored address was not the expected one; nothing was written
    Conflict {
        /// Address currently stored
        current: Option<IpAddr>,
    },
}

impl CommitOutcome {
    /// Whether the write went through
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

/// Trait for domain registry implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Lock internally to serialize writes
///
/// ## Forbidden Capabilities
/// - ❌ Decide whether a domain needs an update (owned by `Reconciler`)
/// - ❌ Call DNS providers or notifiers
/// - ❌ Spawn background tasks
///
/// ## Single Writer
///
/// `last_applied_ip` and `last_updated` are written only through
/// [`commit_applied`](DomainRegistry::commit_applied), whose compare-and-swap
/// keeps a slow, stale write from clobbering a newer one.
#[async_trait]
pub trait DomainRegistry: Send + Sync {
    /// List every active domain
    async fn active_domains(&self) -> Result<Vec<MonitoredDomain>, crate::Error>;

    /// Look up one domain (active or not)
    async fn get_domain(&self, id: &str) -> Result<Option<MonitoredDomain>, crate::Error>;

    /// Record a provider-confirmed address for a domain
    ///
    /// The write happens only when the stored `last_applied_ip` equals
    /// `expected_previous`; both `last_applied_ip` and `last_updated` change
    /// together.
    ///
    /// # Returns
    ///
    /// - `Ok(CommitOutcome::Committed)`: state updated
    /// - `Ok(CommitOutcome::Conflict { .. })`: state untouched
    /// - `Err(Error::NotFound)`: unknown domain id
    /// - `Err(Error)`: storage error
    async fn commit_applied(
        &self,
        id: &str,
        expected_previous: Option<IpAddr>,
        new_ip: IpAddr,
        at: DateTime<Utc>,
    ) -> Result<CommitOutcome, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
