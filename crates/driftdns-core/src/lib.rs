// # driftdns-core
//
// Core library of the driftdns update-reconciliation engine.
//
// ## Architecture Overview
//
// - **IpResolver**: asks an ordered list of echo endpoints for the public
//   address, with per-endpoint timeout and fallback
// - **Reconciler**: compares resolved addresses with each domain's last
//   applied address and upserts drifted records
// - **Scheduler**: runs one reconciliation cycle per configured period
// - **DomainRegistry**: supplies monitored domains and stores applied state
// - **DnsProvider / Notifier**: external collaborators behind traits,
//   implemented in separate crates and created through the PluginRegistry
//
// ## Design Principles
//
// 1. **Local state is authoritative**: an unchanged address costs zero
//    provider calls
// 2. **Per-domain isolation**: one domain's failure never affects another
// 3. **Best-effort notification**: a notifier can never block or roll back
//    a DNS update
// 4. **Library-First**: the daemon is a thin composition root

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{DdnsConfig, EngineConfig, NotifierConfig, ProviderConfig, RegistryConfig};
pub use engine::{CycleReport, DomainOutcome, EngineEvent, ReconciliationOutcome, Reconciler};
pub use error::{Error, Result};
pub use model::{IpFamily, MonitoredDomain, RecordKind, ResolvedAddresses};
pub use registry::PluginRegistry;
pub use resolver::IpResolver;
pub use scheduler::{CycleRunner, Scheduler};
pub use settings::{MemorySettingsStore, Setting, SettingsStore};
pub use state::{FileDomainRegistry, MemoryDomainRegistry};
pub use traits::{DnsProvider, DomainRegistry, IpEchoSource, Notifier};
