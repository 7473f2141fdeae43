// # Notifier Trait
//
// Defines how IP change messages leave the system.
//
// ## Implementations
//
// - Slack incoming webhook: `driftdns-notify-slack` crate
//
// Delivery is best-effort. The engine calls `notify` only after the DNS
// change has been committed, logs a failure and moves on; a notifier error
// can never roll back or block a DNS update.

use crate::model::{MonitoredDomain, RecordKind};
use async_trait::async_trait;
use std::net::IpAddr;

/// Everything a notifier needs to render an IP change message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpChangeNotice {
    /// Record name
    pub domain: String,
    /// Address before the change (`None` on first assignment)
    pub previous_ip: Option<IpAddr>,
    /// Address now published
    pub new_ip: IpAddr,
    /// Record kind
    pub record_kind: RecordKind,
    /// Record TTL in seconds
    pub ttl: u32,
}

impl IpChangeNotice {
    /// Build a notice for `domain` moving from `previous_ip` to `new_ip`
    pub fn for_domain(domain: &MonitoredDomain, previous_ip: Option<IpAddr>, new_ip: IpAddr) -> Self {
        Self {
            domain: domain.name.clone(),
            previous_ip,
            new_ip,
            record_kind: domain.record_kind,
            ttl: domain.ttl,
        }
    }

    /// Whether this is the first address ever assigned to the record
    pub fn is_first_assignment(&self) -> bool {
        self.previous_ip.is_none()
    }
}

/// Trait for notification channels
///
/// # Trust Level: Untrusted
///
/// One outbound request per call, bounded by a timeout. No retries, no
/// background tasks.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send an IP change message
    async fn notify(&self, notice: &IpChangeNotice) -> Result<(), crate::Error>;

    /// Send a test message to verify the endpoint is reachable
    async fn test_connection(&self) -> Result<(), crate::Error>;

    /// Notifier name for logging
    fn notifier_name(&self) -> &'static str;
}

/// Helper trait for constructing notifiers from configuration
pub trait NotifierFactory: Send + Sync {
    /// Create a Notifier from one notifier account
    fn create(
        &self,
        config: &crate::config::NotifierConfig,
    ) -> Result<Box<dyn Notifier>, crate::Error>;
}
