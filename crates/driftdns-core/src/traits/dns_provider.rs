// # DNS Provider Trait
//
// Defines the boundary between the reconciliation engine and a DNS service.
//
// ## Implementations
//
// - Cloudflare: `driftdns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use driftdns_core::traits::{DnsProvider, UpsertRequest};
// use driftdns_core::model::RecordKind;
//
// let provider = /* DnsProvider implementation */;
//
// for zone in provider.list_zones().await? {
//     println!("{} ({})", zone.name, zone.id);
// }
//
// provider.upsert(&UpsertRequest {
//     zone_id: "023e105f4ecef8ad9ca31a8372d0c353".into(),
//     name: "home.example.com".into(),
//     kind: RecordKind::A,
//     ttl: 300,
//     value: "203.0.113.5".parse()?,
// }).await?;
// ```

use crate::model::RecordKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A provider-side namespace holding record sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Provider zone identifier
    pub id: String,
    /// Zone apex name (e.g. "example.com")
    pub name: String,
    /// Number of record sets, when the provider reports it
    pub record_count: Option<u64>,
}

/// Create-or-update of a single-value address record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    pub zone_id: String,
    pub name: String,
    pub kind: RecordKind,
    pub ttl: u32,
    pub value: IpAddr,
}

/// What an upsert did on the provider side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The record was created or replaced
    Written,
    /// The record already held the requested value and TTL
    AlreadyCurrent,
    /// The write was only logged; the provider is unchanged
    DryRun,
}

/// Trait for DNS provider clients
///
/// # Trust Level: Untrusted
///
/// Providers perform API calls against their own endpoints and nothing else.
/// They do not retry, do not cache, do not spawn tasks and never touch the
/// domain registry. Deciding whether an upsert is needed, and what to do when
/// it fails, belongs to the [`Reconciler`](crate::engine::Reconciler).
///
/// Every transport problem (connection failure, timeout, non-2xx response,
/// unparsable body) must be returned as `Err`, never as a panic.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List the zones visible to this credential set
    async fn list_zones(&self) -> Result<Vec<Zone>, crate::Error>;

    /// Read the value currently published for `name`/`kind` in `zone_id`
    ///
    /// Returns `Ok(None)` when the record set does not exist.
    async fn current_value(
        &self,
        zone_id: &str,
        name: &str,
        kind: RecordKind,
    ) -> Result<Option<IpAddr>, crate::Error>;

    /// Create or replace the record set with a single value
    ///
    /// # Idempotency
    ///
    /// Applying the same value twice must leave the provider unchanged.
    /// A provider that skips the write (dry-run) must say so with
    /// [`UpsertOutcome::DryRun`]; the engine then leaves its state untouched.
    async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertOutcome, crate::Error>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider from one credential set
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
