// # IP Echo Source Trait
//
// Transport used by the IP resolver to ask an external "what is my IP"
// endpoint for the caller's public address.
//
// ## Implementations
//
// - HTTP (reqwest): `driftdns-ip-http` crate
//
// The resolver owns ordering, fallback, validation and the per-query time
// bound. A source only performs one request and hands back the raw body.

use async_trait::async_trait;

/// Trait for IP echo transports
///
/// # Trust Level: Semi-Trusted
///
/// A source performs exactly one outbound request per call. It must not
/// retry, cache, or iterate over endpoints itself: fallback across the
/// configured endpoint list is the resolver's job.
///
/// ## Error Contract
///
/// - Non-2xx status: `Err`
/// - Transport failure or timeout: `Err`
/// - 2xx: `Ok(body)`, untrimmed and unvalidated
#[async_trait]
pub trait IpEchoSource: Send + Sync {
    /// Query one endpoint and return the response body
    async fn query(&self, endpoint: &str) -> Result<String, crate::Error>;
}
