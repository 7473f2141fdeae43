//! Test doubles and common utilities for contract tests
//!
//! Minimal collaborators that record every call so tests can assert on
//! exactly what the engine, resolver and scheduler did.

#![allow(dead_code)]

use driftdns_core::config::EngineConfig;
use driftdns_core::engine::{EngineEvent, Reconciler};
use driftdns_core::error::{Error, Result};
use driftdns_core::model::{MonitoredDomain, RecordKind};
use driftdns_core::resolver::IpResolver;
use driftdns_core::settings::{IPV4_SOURCES, IPV6_SOURCES, MemorySettingsStore, Setting};
use driftdns_core::state::MemoryDomainRegistry;
use driftdns_core::traits::{
    DnsProvider, IpChangeNotice, IpEchoSource, Notifier, UpsertOutcome, UpsertRequest, Zone,
};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How a scripted endpoint answers
#[derive(Debug, Clone)]
pub enum EchoReply {
    /// 2xx with this body
    Body(String),
    /// Transport error or non-2xx
    Fail,
    /// Never answers
    Hang,
}

/// An IpEchoSource answering from a script, recording every query
#[derive(Clone, Default)]
pub struct ScriptedIpSource {
    replies: Arc<Mutex<HashMap<String, EchoReply>>>,
    queried: Arc<Mutex<Vec<String>>>,
}

impl ScriptedIpSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply of one endpoint (unscripted endpoints fail)
    pub fn reply(self, endpoint: &str, reply: EchoReply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), reply);
        self
    }

    /// Endpoints queried so far, in order
    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IpEchoSource for ScriptedIpSource {
    async fn query(&self, endpoint: &str) -> Result<String> {
        self.queried.lock().unwrap().push(endpoint.to_string());
        let reply = self.replies.lock().unwrap().get(endpoint).cloned();

        match reply {
            Some(EchoReply::Body(body)) => Ok(body),
            Some(EchoReply::Hang) => std::future::pending::<Result<String>>().await,
            Some(EchoReply::Fail) | None => Err(Error::ip_source(format!("{} failed", endpoint))),
        }
    }
}

/// A mock DnsProvider that records upserts
#[derive(Clone)]
pub struct MockDnsProvider {
    upsert_call_count: Arc<AtomicUsize>,
    read_call_count: Arc<AtomicUsize>,
    upserts: Arc<Mutex<Vec<UpsertRequest>>>,
    /// Record names whose upsert fails
    failing: Arc<Mutex<HashSet<String>>>,
    /// Record names whose upsert panics
    panicking: Arc<Mutex<HashSet<String>>>,
    /// Values returned by current_value, keyed by record name
    published: Arc<Mutex<HashMap<String, IpAddr>>>,
    /// Log writes instead of applying them
    dry_run: bool,
    pub name: &'static str,
}

impl MockDnsProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            upsert_call_count: Arc::new(AtomicUsize::new(0)),
            read_call_count: Arc::new(AtomicUsize::new(0)),
            upserts: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            panicking: Arc::new(Mutex::new(HashSet::new())),
            published: Arc::new(Mutex::new(HashMap::new())),
            dry_run: false,
            name,
        }
    }

    /// Accept every upsert without publishing anything
    pub fn dry_run(self) -> Self {
        Self {
            dry_run: true,
            ..self
        }
    }

    /// Make every upsert of `record` fail
    pub fn fail_on(self, record: &str) -> Self {
        self.failing.lock().unwrap().insert(record.to_string());
        self
    }

    /// Make every upsert of `record` panic
    pub fn panic_on(self, record: &str) -> Self {
        self.panicking.lock().unwrap().insert(record.to_string());
        self
    }

    /// Pretend `record` currently holds `ip` on the provider side
    pub fn publish(&self, record: &str, ip: IpAddr) {
        self.published
            .lock()
            .unwrap()
            .insert(record.to_string(), ip);
    }

    pub fn upsert_call_count(&self) -> usize {
        self.upsert_call_count.load(Ordering::SeqCst)
    }

    pub fn read_call_count(&self) -> usize {
        self.read_call_count.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> Vec<UpsertRequest> {
        self.upserts.lock().unwrap().clone()
    }

    /// Create a new MockDnsProvider that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        other.clone()
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        Ok(vec![Zone {
            id: "Z1".to_string(),
            name: "example.com".to_string(),
            record_count: Some(3),
        }])
    }

    async fn current_value(
        &self,
        _zone_id: &str,
        name: &str,
        _kind: RecordKind,
    ) -> Result<Option<IpAddr>> {
        self.read_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.published.lock().unwrap().get(name).copied())
    }

    async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertOutcome> {
        self.upsert_call_count.fetch_add(1, Ordering::SeqCst);
        self.upserts.lock().unwrap().push(request.clone());

        if self.panicking.lock().unwrap().contains(&request.name) {
            panic!("provider blew up on {}", request.name);
        }
        if self.failing.lock().unwrap().contains(&request.name) {
            return Err(Error::provider(self.name, "HTTP 500 from provider"));
        }

        if self.dry_run {
            return Ok(UpsertOutcome::DryRun);
        }
        if self.published.lock().unwrap().get(&request.name) == Some(&request.value) {
            return Ok(UpsertOutcome::AlreadyCurrent);
        }

        self.publish(&request.name, request.value);
        Ok(UpsertOutcome::Written)
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

/// A mock Notifier that records notices
#[derive(Clone, Default)]
pub struct MockNotifier {
    notices: Arc<Mutex<Vec<IpChangeNotice>>>,
    test_call_count: Arc<AtomicUsize>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<IpChangeNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn test_call_count(&self) -> usize {
        self.test_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, notice: &IpChangeNotice) -> Result<()> {
        self.notices.lock().unwrap().push(notice.clone());
        if self.fail {
            return Err(Error::notification("mock", "webhook returned 500"));
        }
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        self.test_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "mock"
    }
}

pub fn ip(text: &str) -> IpAddr {
    text.parse().unwrap()
}

/// An active domain on provider "cf" in zone "Z1"
pub fn domain(id: &str, kind: RecordKind) -> MonitoredDomain {
    MonitoredDomain::new(id, format!("{}.example.com", id), "Z1", kind, "cf")
}

/// Settings whose source lists are exactly `v4` and `v6`
pub fn settings_with_sources(v4: &[&str], v6: &[&str]) -> Arc<MemorySettingsStore> {
    let list = |urls: &[&str]| Setting::StringList(urls.iter().map(|u| u.to_string()).collect());
    Arc::new(
        MemorySettingsStore::with_overrides([
            (IPV4_SOURCES.to_string(), list(v4)),
            (IPV6_SOURCES.to_string(), list(v6)),
        ])
        .unwrap(),
    )
}

/// A resolver whose v4 endpoint answers `v4` and v6 endpoint answers `v6`
pub fn resolver_answering(v4: Option<&str>, v6: Option<&str>) -> (IpResolver, ScriptedIpSource) {
    let mut source = ScriptedIpSource::new();
    if let Some(body) = v4 {
        source = source.reply("https://v4.test", EchoReply::Body(body.to_string()));
    }
    if let Some(body) = v6 {
        source = source.reply("https://v6.test", EchoReply::Body(body.to_string()));
    }

    let settings = settings_with_sources(&["https://v4.test"], &["https://v6.test"]);
    let resolver = IpResolver::new(Arc::new(source.clone()), settings)
        .with_query_timeout(Duration::from_secs(10));
    (resolver, source)
}

/// Engine over a memory registry with provider "cf" and notifier "ops"
pub fn engine_with(
    domains: Vec<MonitoredDomain>,
    resolver: IpResolver,
    provider: MockDnsProvider,
    notifier: MockNotifier,
    config: EngineConfig,
) -> (Reconciler, MemoryDomainRegistry, mpsc::Receiver<EngineEvent>) {
    let registry = MemoryDomainRegistry::with_domains(domains).unwrap();
    let (engine, events) = Reconciler::new(Arc::new(registry.clone()), resolver, config).unwrap();
    let engine = engine
        .with_provider("cf", Arc::new(provider))
        .with_notifier("ops", Arc::new(notifier));
    (engine, registry, events)
}

/// Drain every event currently in the channel
pub fn drain(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
