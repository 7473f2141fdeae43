//! Reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Resolving the public addresses for a cycle
//! - Deciding, per domain, whether the published record has drifted
//! - Upserting drifted records through the domain's DnsProvider
//! - Committing the applied address after the provider confirmed it
//! - Notifying about the change (best-effort)
//!
//! ## Architecture
//!
//! ```text
//!                ┌─────────────┐
//!                │ IpResolver  │── ResolvedAddresses ──┐
//!                └─────────────┘                       │
//!                                                      ▼
//! ┌────────────────┐  active_domains   ┌──────────────────────────┐
//! │ DomainRegistry │─────────────────► │        Reconciler        │
//! └────────────────┘                   │  one task per domain,    │
//!         ▲                            │  max_concurrency bound   │
//!         │ commit_applied (CAS)       └──────────────────────────┘
//!         │                                 │             │
//!         └─────────────────────────────────┤             │
//!                                           ▼             ▼
//!                                  ┌─────────────┐  ┌──────────┐
//!                                  │ DnsProvider │  │ Notifier │
//!                                  │  (upsert)   │  │ (notify) │
//!                                  └─────────────┘  └──────────┘
//! ```
//!
//! ## Per-Domain Protocol
//!
//! 1. Pick the address of the record's family; none resolved -> `Unchanged`
//! 2. Equal to `last_applied_ip` -> `Unchanged`, zero provider calls
//! 3. Otherwise upsert exactly once; a dry-run provider ends here as `Unchanged`
//! 4. Provider success -> compare-and-swap commit -> `Updated`
//! 5. Provider failure -> `Failed`, state untouched, retried next cycle
//! 6. `Updated` -> notify once; a notifier failure is logged and discarded
//!
//! Every domain runs in its own task, so an error or a panic in one domain
//! never affects the outcome of another.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{MonitoredDomain, ResolvedAddresses};
use crate::resolver::IpResolver;
use crate::scheduler::CycleRunner;
use crate::traits::{
    CommitOutcome, DnsProvider, DomainRegistry, IpChangeNotice, Notifier, UpsertOutcome,
    UpsertRequest,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A cycle began
    CycleStarted {
        domains: usize,
        resolved: ResolvedAddresses,
    },

    /// A record was upserted and the new address committed
    UpdateSucceeded {
        domain: String,
        previous_ip: Option<IpAddr>,
        new_ip: IpAddr,
    },

    /// No provider write was needed
    UpdateSkipped {
        domain: String,
        current_ip: Option<IpAddr>,
    },

    /// The domain could not be brought up to date this cycle
    UpdateFailed { domain: String, error: String },

    /// The record was updated but the notification did not go out
    NotificationFailed { domain: String, error: String },

    /// A cycle finished
    CycleCompleted {
        updated: usize,
        unchanged: usize,
        failed: usize,
    },
}

/// Result of reconciling one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Nothing to do (address unchanged or not resolved this cycle)
    Unchanged,
    /// The provider accepted the new address and it was committed
    Updated {
        old_ip: Option<IpAddr>,
        new_ip: IpAddr,
    },
    /// Provider, registry or task failure; state untouched
    Failed { reason: String },
}

/// Outcome tagged with the domain it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainOutcome {
    pub domain_id: String,
    pub name: String,
    #[serde(flatten)]
    pub outcome: ReconciliationOutcome,
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub resolved: ResolvedAddresses,
    pub outcomes: Vec<DomainOutcome>,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl CycleReport {
    /// Aggregate the outcomes of a cycle
    pub fn new(resolved: ResolvedAddresses, outcomes: Vec<DomainOutcome>) -> Self {
        let mut updated = 0;
        let mut unchanged = 0;
        let mut failed = 0;
        for outcome in &outcomes {
            match outcome.outcome {
                ReconciliationOutcome::Unchanged => unchanged += 1,
                ReconciliationOutcome::Updated { .. } => updated += 1,
                ReconciliationOutcome::Failed { .. } => failed += 1,
            }
        }
        Self {
            resolved,
            outcomes,
            updated,
            unchanged,
            failed,
        }
    }
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Attach providers and notifiers by the names domains refer to
/// 3. Drive with [`Reconciler::run_cycle()`] (usually from the
///    [`Scheduler`](crate::scheduler::Scheduler))
///
/// ## Load Resistance
///
/// - **Bounded concurrency**: at most `max_concurrency` domains in flight
/// - **Bounded calls**: every provider and notifier call is time-limited
/// - **Bounded event channel**: when full, events are dropped (logged)
pub struct Reconciler {
    registry: Arc<dyn DomainRegistry>,
    resolver: IpResolver,
    providers: HashMap<String, Arc<dyn DnsProvider>>,
    notifiers: HashMap<String, Arc<dyn Notifier>>,
    config: EngineConfig,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        registry: Arc<dyn DomainRegistry>,
        resolver: IpResolver,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            registry,
            resolver,
            providers: HashMap::new(),
            notifiers: HashMap::new(),
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Attach a provider under the name domains use to refer to it
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn DnsProvider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Attach a notifier under the name domains use to refer to it
    ///
    /// Only active notifiers should be attached; a domain referring to a
    /// name that is not attached gets no notification.
    pub fn with_notifier(mut self, name: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.insert(name.into(), notifier);
        self
    }

    /// The domain registry this engine commits to
    pub fn registry(&self) -> &Arc<dyn DomainRegistry> {
        &self.registry
    }

    /// The resolver used by [`run_cycle`](Self::run_cycle)
    pub fn resolver(&self) -> &IpResolver {
        &self.resolver
    }

    /// Run one full cycle: resolve, list active domains, reconcile
    ///
    /// # Returns
    ///
    /// - `Ok(CycleReport)`: the cycle ran (individual domains may have failed)
    /// - `Err(Error::SchedulerFault)`: the active domains could not be listed
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let resolved = self.resolver.resolve_all().await;
        if resolved.is_empty() {
            warn!("No public address resolved for either family, nothing to reconcile");
        }

        let domains = self
            .registry
            .active_domains()
            .await
            .map_err(|e| Error::scheduler_fault(format!("failed to list active domains: {}", e)))?;

        self.emit_event(EngineEvent::CycleStarted {
            domains: domains.len(),
            resolved,
        });

        let outcomes = self.reconcile_all(&domains, resolved).await;
        let report = CycleReport::new(resolved, outcomes);

        info!(
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "Reconciliation cycle finished"
        );
        self.emit_event(EngineEvent::CycleCompleted {
            updated: report.updated,
            unchanged: report.unchanged,
            failed: report.failed,
        });

        Ok(report)
    }

    /// Reconcile `domains` against one resolution round
    ///
    /// Inactive domains are skipped and produce no outcome. Outcomes are
    /// returned in input order.
    pub async fn reconcile_all(
        &self,
        domains: &[MonitoredDomain],
        resolved: ResolvedAddresses,
    ) -> Vec<DomainOutcome> {
        let tasks: Vec<(MonitoredDomain, DomainTask)> = domains
            .iter()
            .filter(|domain| {
                if !domain.active {
                    debug!(domain = %domain.name, "Domain is inactive, skipping");
                }
                domain.active
            })
            .map(|domain| (domain.clone(), self.task_for(domain)))
            .collect();

        stream::iter(tasks)
            .map(|(domain, task)| async move {
                let domain_id = domain.id.clone();
                let name = domain.name.clone();

                // Spawned so that a panic stays inside this domain
                let outcome = match tokio::spawn(task.run(domain, resolved)).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(domain = %name, "Reconciliation task aborted: {}", e);
                        ReconciliationOutcome::Failed {
                            reason: format!("reconciliation task aborted: {}", e),
                        }
                    }
                };

                DomainOutcome {
                    domain_id,
                    name,
                    outcome,
                }
            })
            .buffered(self.config.max_concurrency)
            .collect()
            .await
    }

    /// Reconcile a single domain right now
    ///
    /// Resolves only the family the domain's record needs.
    ///
    /// # Returns
    ///
    /// - `Ok(DomainOutcome)`: the domain was processed
    /// - `Err(Error::NotFound)`: unknown domain id
    /// - `Err(Error::InvalidInput)`: the domain is inactive
    /// - `Err(Error::IpSource)`: no address of the needed family was detected
    pub async fn reconcile_domain(&self, id: &str) -> Result<DomainOutcome> {
        let domain = self
            .registry
            .get_domain(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("domain {}", id)))?;

        if !domain.active {
            return Err(Error::invalid_input(format!("domain {} is inactive", id)));
        }

        let family = domain.record_kind.family();
        let ip = self
            .resolver
            .resolve(family)
            .await
            .ok_or_else(|| Error::ip_source(format!("No {} address detected", family)))?;

        let mut resolved = ResolvedAddresses::default();
        match ip {
            IpAddr::V4(v4) => resolved.v4 = Some(v4),
            IpAddr::V6(v6) => resolved.v6 = Some(v6),
        }

        let mut outcomes = self.reconcile_all(std::slice::from_ref(&domain), resolved).await;
        outcomes
            .pop()
            .ok_or_else(|| Error::Other(format!("no outcome for domain {}", id)))
    }

    fn task_for(&self, domain: &MonitoredDomain) -> DomainTask {
        let notifier = domain.notifier.as_ref().and_then(|name| {
            let found = self.notifiers.get(name).cloned();
            if found.is_none() {
                debug!(
                    domain = %domain.name,
                    notifier = %name,
                    "Notifier is unknown or inactive, notifications disabled"
                );
            }
            found
        });

        DomainTask {
            registry: self.registry.clone(),
            provider: self.providers.get(&domain.provider).cloned(),
            notifier,
            call_timeout: Duration::from_secs(self.config.call_timeout_secs),
            verify_remote: self.config.verify_remote,
            event_tx: self.event_tx.clone(),
        }
    }

    fn emit_event(&self, event: EngineEvent) {
        emit(&self.event_tx, event);
    }
}

#[async_trait]
impl CycleRunner for Reconciler {
    async fn run_cycle(&self) -> Result<CycleReport> {
        Reconciler::run_cycle(self).await
    }
}

/// Everything one domain's reconciliation needs, owned so it can be spawned
struct DomainTask {
    registry: Arc<dyn DomainRegistry>,
    provider: Option<Arc<dyn DnsProvider>>,
    notifier: Option<Arc<dyn Notifier>>,
    call_timeout: Duration,
    verify_remote: bool,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DomainTask {
    async fn run(self, domain: MonitoredDomain, resolved: ResolvedAddresses) -> ReconciliationOutcome {
        let outcome = self.reconcile(&domain, resolved).await;

        match &outcome {
            ReconciliationOutcome::Unchanged => {
                emit(
                    &self.event_tx,
                    EngineEvent::UpdateSkipped {
                        domain: domain.name.clone(),
                        current_ip: domain.last_applied_ip,
                    },
                );
            }
            ReconciliationOutcome::Updated { old_ip, new_ip } => {
                emit(
                    &self.event_tx,
                    EngineEvent::UpdateSucceeded {
                        domain: domain.name.clone(),
                        previous_ip: *old_ip,
                        new_ip: *new_ip,
                    },
                );
                self.notify(&domain, *old_ip, *new_ip).await;
            }
            ReconciliationOutcome::Failed { reason } => {
                warn!(domain = %domain.name, "Reconciliation failed: {}", reason);
                emit(
                    &self.event_tx,
                    EngineEvent::UpdateFailed {
                        domain: domain.name.clone(),
                        error: reason.clone(),
                    },
                );
            }
        }

        outcome
    }

    async fn reconcile(
        &self,
        domain: &MonitoredDomain,
        resolved: ResolvedAddresses,
    ) -> ReconciliationOutcome {
        let Some(target) = resolved.for_kind(domain.record_kind) else {
            debug!(
                domain = %domain.name,
                family = %domain.record_kind.family(),
                "No address resolved for this family, skipping"
            );
            return ReconciliationOutcome::Unchanged;
        };

        let Some(provider) = &self.provider else {
            return ReconciliationOutcome::Failed {
                reason: format!("unknown provider '{}'", domain.provider),
            };
        };

        // What the record is believed to hold before the write
        let mut old_ip = domain.last_applied_ip;

        if domain.last_applied_ip == Some(target) {
            if !self.verify_remote {
                debug!(domain = %domain.name, ip = %target, "Address unchanged");
                return ReconciliationOutcome::Unchanged;
            }

            match self.published_value(provider.as_ref(), domain).await {
                Ok(Some(published)) if published == target => {
                    debug!(domain = %domain.name, ip = %target, "Address unchanged (verified)");
                    return ReconciliationOutcome::Unchanged;
                }
                Ok(published) => {
                    info!(
                        domain = %domain.name,
                        expected = %target,
                        published = ?published,
                        "Record changed out-of-band, repairing"
                    );
                    old_ip = published;
                }
                Err(e) => {
                    warn!(
                        domain = %domain.name,
                        "Could not verify published value, trusting local state: {}",
                        e
                    );
                    return ReconciliationOutcome::Unchanged;
                }
            }
        }

        let request = UpsertRequest {
            zone_id: domain.zone_id.clone(),
            name: domain.name.clone(),
            kind: domain.record_kind,
            ttl: domain.ttl,
            value: target,
        };

        let upsert = tokio::time::timeout(self.call_timeout, provider.upsert(&request)).await;
        match upsert {
            Ok(Ok(UpsertOutcome::Written | UpsertOutcome::AlreadyCurrent)) => {}
            Ok(Ok(UpsertOutcome::DryRun)) => {
                // Nothing was written, so nothing is committed or announced
                info!(
                    domain = %domain.name,
                    ip = %target,
                    "Dry-run: record not updated"
                );
                return ReconciliationOutcome::Unchanged;
            }
            Ok(Err(e)) => {
                return ReconciliationOutcome::Failed {
                    reason: e.to_string(),
                };
            }
            Err(_) => {
                return ReconciliationOutcome::Failed {
                    reason: Error::timeout(format!(
                        "{} upsert for {} after {:?}",
                        provider.provider_name(),
                        domain.name,
                        self.call_timeout
                    ))
                    .to_string(),
                };
            }
        }

        let commit = self
            .registry
            .commit_applied(
                &domain.id,
                domain.last_applied_ip,
                target,
                chrono::Utc::now(),
            )
            .await;

        match commit {
            Ok(CommitOutcome::Committed) => {
                info!(
                    domain = %domain.name,
                    old_ip = ?old_ip,
                    new_ip = %target,
                    "DNS record updated"
                );
                ReconciliationOutcome::Updated {
                    old_ip,
                    new_ip: target,
                }
            }
            Ok(CommitOutcome::Conflict { current }) => ReconciliationOutcome::Failed {
                reason: Error::Conflict {
                    domain: domain.id.clone(),
                    expected: domain.last_applied_ip,
                    found: current,
                }
                .to_string(),
            },
            Err(e) => ReconciliationOutcome::Failed {
                reason: format!("record updated but state not saved: {}", e),
            },
        }
    }

    async fn published_value(
        &self,
        provider: &dyn DnsProvider,
        domain: &MonitoredDomain,
    ) -> Result<Option<IpAddr>> {
        tokio::time::timeout(
            self.call_timeout,
            provider.current_value(&domain.zone_id, &domain.name, domain.record_kind),
        )
        .await
        .map_err(|_| Error::timeout(format!("reading {}", domain.name)))?
    }

    /// Best-effort notification; the result is logged and dropped
    async fn notify(&self, domain: &MonitoredDomain, old_ip: Option<IpAddr>, new_ip: IpAddr) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let notice = IpChangeNotice::for_domain(domain, old_ip, new_ip);
        let result = match tokio::time::timeout(self.call_timeout, notifier.notify(&notice)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "{} notification for {}",
                notifier.notifier_name(),
                domain.name
            ))),
        };

        if let Err(e) = result {
            warn!(domain = %domain.name, "Notification failed: {}", e);
            emit(
                &self.event_tx,
                EngineEvent::NotificationFailed {
                    domain: domain.name.clone(),
                    error: e.to_string(),
                },
            );
        }
    }
}

fn emit(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    // Dropped rather than buffered without bound
    if tx.try_send(event).is_err() {
        warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
    }
}
