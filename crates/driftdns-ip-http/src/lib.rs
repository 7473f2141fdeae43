// # HTTP IP Echo Source
//
// This crate provides the HTTP transport behind the driftdns IP resolver.
//
// ## Purpose
//
// An echo endpoint (api.ipify.org, icanhazip.com, ...) answers a plain GET
// with the caller's public address as text. This source performs exactly
// that one request and hands the body back; the resolver in driftdns-core
// decides the order of endpoints, trims and validates the answer, and falls
// back to the next endpoint on failure.
//
// ## Error Contract
//
// - Invalid or non-http(s) URL: `Error::IpSource`
// - Transport failure or client timeout: `Error::IpSource`
// - Non-2xx status: `Error::IpSource`
// - Body over `MAX_BODY_BYTES` or not UTF-8: `Error::IpSource`
// - 2xx: the raw body

use driftdns_core::traits::IpEchoSource;
use driftdns_core::{Error, Result};

use std::time::Duration;

/// Client-side bound on one request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest echo body accepted; an address is at most 45 characters
pub const MAX_BODY_BYTES: usize = 1024;

/// IP echo source over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpEchoSource {
    client: reqwest::Client,
}

impl HttpEchoSource {
    /// Create a source with the default 10 s request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a source with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("driftdns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl IpEchoSource for HttpEchoSource {
    async fn query(&self, endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint)
            .map_err(|e| Error::ip_source(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::ip_source(format!(
                "Endpoint must be http(s): {}",
                endpoint
            )));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ip_source(format!("Request to {} failed: {}", endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ip_source(format!(
                "{} returned HTTP {}",
                endpoint, status
            )));
        }

        let body = read_bounded(response, endpoint).await?;

        tracing::trace!(%endpoint, "IP echo response received");
        Ok(body)
    }
}

/// Read at most `MAX_BODY_BYTES` of the body, chunk by chunk
async fn read_bounded(mut response: reqwest::Response, endpoint: &str) -> Result<String> {
    let too_large = || {
        Error::ip_source(format!(
            "Response from {} exceeds {} bytes",
            endpoint, MAX_BODY_BYTES
        ))
    };

    if response
        .content_length()
        .is_some_and(|len| len > MAX_BODY_BYTES as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        Error::ip_source(format!("Failed to read response from {}: {}", endpoint, e))
    })? {
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    String::from_utf8(body)
        .map_err(|_| Error::ip_source(format!("Response from {} is not UTF-8", endpoint)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpEchoSource>();
    }

    #[tokio::test]
    async fn rejects_non_http_endpoint() {
        let source = HttpEchoSource::new().unwrap();

        let err = source.query("ftp://example.com/ip").await.unwrap_err();
        assert!(matches!(err, Error::IpSource(_)));

        let err = source.query("not a url").await.unwrap_err();
        assert!(matches!(err, Error::IpSource(_)));
    }
}
