//! Contract Test: HTTP Echo Source
//!
//! Constraints verified:
//! - A 2xx body is returned untouched (the resolver trims and validates)
//! - Non-2xx status is an error
//! - An oversized body is refused instead of buffered
//! - A slow endpoint is cut off by the client timeout
//! - Plugged into the resolver, fallback works over real HTTP

use driftdns_core::model::IpFamily;
use driftdns_core::resolver::IpResolver;
use driftdns_core::settings::{IPV4_SOURCES, MemorySettingsStore, Setting};
use driftdns_core::traits::IpEchoSource;
use driftdns_core::Error;
use driftdns_ip_http::{HttpEchoSource, MAX_BODY_BYTES};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn returns_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.5\n"))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpEchoSource::new().unwrap();
    let body = source.query(&format!("{}/ip", server.uri())).await.unwrap();

    assert_eq!(body, "203.0.113.5\n");
}

#[tokio::test]
async fn non_success_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let source = HttpEchoSource::new().unwrap();
    let err = source.query(&server.uri()).await.unwrap_err();

    assert!(matches!(err, Error::IpSource(_)));
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn oversized_body_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(64 * 1024)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limit"))
        .respond_with(ResponseTemplate::new(200).set_body_string("b".repeat(MAX_BODY_BYTES)))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpEchoSource::new().unwrap();

    let err = source
        .query(&format!("{}/huge", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IpSource(_)));
    assert!(err.to_string().contains("exceeds"));

    let body = source
        .query(&format!("{}/limit", server.uri()))
        .await
        .unwrap();
    assert_eq!(body.len(), MAX_BODY_BYTES);
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("203.0.113.5")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let source = HttpEchoSource::with_timeout(Duration::from_millis(200)).unwrap();
    let err = source.query(&server.uri()).await.unwrap_err();

    assert!(matches!(err, Error::IpSource(_)));
}

#[tokio::test]
async fn resolver_falls_back_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200).set_body_string(" 203.0.113.5 \n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/never"))
        .respond_with(ResponseTemplate::new(200).set_body_string("198.51.100.1"))
        .expect(0)
        .mount(&server)
        .await;

    let sources = vec![
        format!("{}/broken", server.uri()),
        format!("{}/good", server.uri()),
        format!("{}/never", server.uri()),
    ];
    let settings = MemorySettingsStore::with_overrides([(
        IPV4_SOURCES.to_string(),
        Setting::StringList(sources),
    )])
    .unwrap();

    let resolver = IpResolver::new(Arc::new(HttpEchoSource::new().unwrap()), Arc::new(settings));

    assert_eq!(
        resolver.resolve(IpFamily::V4).await,
        Some("203.0.113.5".parse().unwrap())
    );
}
