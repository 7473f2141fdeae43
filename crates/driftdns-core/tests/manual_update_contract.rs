//! Contract Test: Manual Update & Remote Verification
//!
//! Constraints verified:
//! - `reconcile_domain` updates one domain on demand, resolving only the
//!   family it needs
//! - Unknown, inactive or unresolvable domains are reported as errors
//! - With `verify_remote` off, a matching cache is trusted without reads
//! - With `verify_remote` on, an out-of-band change is detected and repaired

mod common;

use common::*;
use driftdns_core::config::EngineConfig;
use driftdns_core::engine::{EngineEvent, ReconciliationOutcome};
use driftdns_core::error::Error;
use driftdns_core::model::RecordKind;
use driftdns_core::traits::DomainRegistry;

#[tokio::test]
async fn manual_update_resolves_only_the_needed_family() {
    let provider = MockDnsProvider::new("cf");
    let (resolver, source) = resolver_answering(Some("203.0.113.5"), Some("2001:db8::5"));

    let (engine, registry, _events) = engine_with(
        vec![domain("home", RecordKind::A), domain("home6", RecordKind::Aaaa)],
        resolver,
        MockDnsProvider::sharing_counters_with(&provider),
        MockNotifier::new(),
        EngineConfig::default(),
    );

    let outcome = engine.reconcile_domain("home").await.unwrap();

    assert_eq!(outcome.domain_id, "home");
    assert_eq!(
        outcome.outcome,
        ReconciliationOutcome::Updated {
            old_ip: None,
            new_ip: ip("203.0.113.5"),
        }
    );
    assert_eq!(source.queried(), vec!["https://v4.test"]);
    assert_eq!(provider.upsert_call_count(), 1);

    // The other domain was not touched
    let other = registry.get_domain("home6").await.unwrap().unwrap();
    assert_eq!(other.last_applied_ip, None);
}

#[tokio::test]
async fn manual_update_errors() {
    let (resolver, _) = resolver_answering(None, Some("2001:db8::5"));
    let (engine, _registry, _events) = engine_with(
        vec![
            domain("home", RecordKind::A),
            domain("off", RecordKind::Aaaa).with_active(false),
        ],
        resolver,
        MockDnsProvider::new("cf"),
        MockNotifier::new(),
        EngineConfig::default(),
    );

    assert!(matches!(
        engine.reconcile_domain("ghost").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        engine.reconcile_domain("off").await,
        Err(Error::InvalidInput(_))
    ));
    // No IPv4 detected
    assert!(matches!(
        engine.reconcile_domain("home").await,
        Err(Error::IpSource(_))
    ));
}

#[tokio::test]
async fn drift_is_ignored_without_remote_verification() {
    let provider = MockDnsProvider::new("cf");
    provider.publish("home.example.com", ip("198.51.100.99"));
    let (resolver, _) = resolver_answering(Some("203.0.113.5"), None);

    let (engine, _registry, _events) = engine_with(
        vec![domain("home", RecordKind::A).with_last_applied_ip(ip("203.0.113.5"))],
        resolver,
        MockDnsProvider::sharing_counters_with(&provider),
        MockNotifier::new(),
        EngineConfig::default(),
    );

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.unchanged, 1);
    assert_eq!(provider.read_call_count(), 0);
    assert_eq!(provider.upsert_call_count(), 0);
}

#[tokio::test]
async fn remote_verification_repairs_out_of_band_change() {
    let provider = MockDnsProvider::new("cf");
    provider.publish("home.example.com", ip("198.51.100.99"));
    let notifier = MockNotifier::new();
    let (resolver, _) = resolver_answering(Some("203.0.113.5"), None);

    let config = EngineConfig {
        verify_remote: true,
        ..EngineConfig::default()
    };
    let (engine, registry, mut events) = engine_with(
        vec![
            domain("home", RecordKind::A)
                .with_notifier("ops")
                .with_last_applied_ip(ip("203.0.113.5")),
        ],
        resolver,
        MockDnsProvider::sharing_counters_with(&provider),
        notifier.clone(),
        config,
    );

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(
        report.outcomes[0].outcome,
        ReconciliationOutcome::Updated {
            old_ip: Some(ip("198.51.100.99")),
            new_ip: ip("203.0.113.5"),
        }
    );
    assert_eq!(provider.upsert_call_count(), 1);
    assert_eq!(notifier.notices().len(), 1);

    let stored = registry.get_domain("home").await.unwrap().unwrap();
    assert_eq!(stored.last_applied_ip, Some(ip("203.0.113.5")));
    assert!(stored.last_updated.is_some());

    // Repaired: the next cycle only reads
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(provider.upsert_call_count(), 1);
    assert_eq!(provider.read_call_count(), 2);

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(EngineEvent::CycleStarted { domains: 1, .. })));
    assert!(matches!(
        events.last(),
        Some(EngineEvent::CycleCompleted {
            updated: 0,
            unchanged: 1,
            failed: 0
        })
    ));
}
