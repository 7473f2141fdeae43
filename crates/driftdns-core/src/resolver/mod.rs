//! Public IP resolver
//!
//! Asks an ordered list of IP echo endpoints for the caller's public address
//! and returns the first answer that parses as an address of the requested
//! family.
//!
//! ## Fallback
//!
//! ```text
//! endpoints: [s1, s2, s3]
//!
//! s1 ── timeout ──────────┐
//!                         ▼
//! s2 ── "203.0.113.5\n" ── trim ── valid v4 ──► Some(203.0.113.5)   (s3 never queried)
//! ```
//!
//! A timeout, an error from the transport or an unparsable body moves on to
//! the next endpoint. When every endpoint fails the result is `None`: the
//! family is skipped for this cycle, which is not an error.
//!
//! Nothing is cached; every call is a fresh round of queries.

use crate::model::{IpFamily, ResolvedAddresses};
use crate::settings::{SettingsStore, ip_sources};
use crate::traits::IpEchoSource;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time bound for a single endpoint query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Multi-source public IP resolver
#[derive(Clone)]
pub struct IpResolver {
    source: Arc<dyn IpEchoSource>,
    settings: Arc<dyn SettingsStore>,
    query_timeout: Duration,
}

impl IpResolver {
    /// Create a resolver reading its endpoint lists from `settings`
    pub fn new(source: Arc<dyn IpEchoSource>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            source,
            settings,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Override the per-endpoint time bound
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// Resolve the public address of one family
    ///
    /// # Returns
    ///
    /// - `Some(ip)`: the first valid answer, always of `family`
    /// - `None`: every endpoint failed
    pub async fn resolve(&self, family: IpFamily) -> Option<IpAddr> {
        let endpoints = ip_sources(self.settings.as_ref(), family).await;
        self.resolve_from(family, &endpoints).await
    }

    /// Resolve both families
    ///
    /// Both lookups run concurrently; the call returns once both have
    /// finished, so no domain is reconciled on a half-resolved round.
    pub async fn resolve_all(&self) -> ResolvedAddresses {
        let (v4, v6) = tokio::join!(self.resolve(IpFamily::V4), self.resolve(IpFamily::V6));

        let resolved = ResolvedAddresses {
            v4: v4.and_then(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            }),
            v6: v6.and_then(|ip| match ip {
                IpAddr::V6(v6) => Some(v6),
                IpAddr::V4(_) => None,
            }),
        };

        info!(
            ipv4 = ?resolved.v4,
            ipv6 = ?resolved.v6,
            "Public address resolution finished"
        );
        resolved
    }

    /// Walk `endpoints` in order and return the first valid answer
    pub async fn resolve_from(&self, family: IpFamily, endpoints: &[String]) -> Option<IpAddr> {
        for endpoint in endpoints {
            let body = match tokio::time::timeout(self.query_timeout, self.source.query(endpoint))
                .await
            {
                Ok(Ok(body)) => body,
                Ok(Err(e)) => {
                    debug!(%endpoint, %family, "IP source failed: {}", e);
                    continue;
                }
                Err(_) => {
                    debug!(%endpoint, %family, "IP source timed out after {:?}", self.query_timeout);
                    continue;
                }
            };

            match parse_address(family, &body) {
                Some(ip) => {
                    debug!(%endpoint, %ip, "IP source answered");
                    return Some(ip);
                }
                None => {
                    debug!(%endpoint, %family, body = %body.trim(), "IP source returned an invalid address");
                }
            }
        }

        warn!(%family, sources = endpoints.len(), "No IP source returned a valid address");
        None
    }
}

/// Parse an echo endpoint body as an address of `family`
///
/// Surrounding whitespace is ignored.
pub fn parse_address(family: IpFamily, body: &str) -> Option<IpAddr> {
    let text = body.trim();
    match family {
        IpFamily::V4 => parse_dotted_quad(text).map(IpAddr::V4),
        IpFamily::V6 => text.parse::<Ipv6Addr>().ok().map(IpAddr::V6),
    }
}

/// Four decimal octets, each 0-255
fn parse_dotted_quad(text: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');

    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse::<u8>().ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}
