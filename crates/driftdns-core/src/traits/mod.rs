//! Core traits for driftdns
//!
//! This module defines the boundaries to the external collaborators.
//!
//! - [`IpEchoSource`]: Query one public-IP echo endpoint
//! - [`DnsProvider`]: List zones, read and upsert records
//! - [`Notifier`]: Deliver IP change messages
//! - [`DomainRegistry`]: Supply monitored domains and store applied state

pub mod dns_provider;
pub mod domain_registry;
pub mod ip_source;
pub mod notifier;

pub use dns_provider::{DnsProvider, DnsProviderFactory, UpsertOutcome, UpsertRequest, Zone};
pub use domain_registry::{CommitOutcome, DomainRegistry};
pub use ip_source::IpEchoSource;
pub use notifier::{IpChangeNotice, Notifier, NotifierFactory};
