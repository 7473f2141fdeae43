//! Domain model shared by the engine, the registries and the adapters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Default TTL for new records (seconds)
pub const DEFAULT_TTL: u32 = 300;

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Whether `ip` belongs to this family
    pub fn matches(self, ip: &IpAddr) -> bool {
        match self {
            IpFamily::V4 => ip.is_ipv4(),
            IpFamily::V6 => ip.is_ipv6(),
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => f.write_str("IPv4"),
            IpFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// DNS record type; decides which address family a domain tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// A record (IPv4)
    #[serde(rename = "A")]
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordKind {
    /// The address family this record kind carries
    pub fn family(self) -> IpFamily {
        match self {
            RecordKind::A => IpFamily::V4,
            RecordKind::Aaaa => IpFamily::V6,
        }
    }

    /// Wire name used by DNS providers
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::A => "A",
            RecordKind::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One DNS name kept in sync with the public address
///
/// Created and edited by the domain registry. The reconciliation engine only
/// ever writes `last_applied_ip` and `last_updated`, through
/// [`DomainRegistry::commit_applied`](crate::traits::DomainRegistry::commit_applied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredDomain {
    /// Registry key
    pub id: String,
    /// Fully-qualified record name
    pub name: String,
    /// Provider-side zone identifier
    pub zone_id: String,
    /// Record kind (A or AAAA)
    pub record_kind: RecordKind,
    /// Record TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Name of the provider credential set this domain is bound to
    pub provider: String,
    /// Optional notifier reference
    #[serde(default)]
    pub notifier: Option<String>,
    /// Inactive domains are not reconciled
    #[serde(default = "default_active")]
    pub active: bool,
    /// Address last confirmed by the provider
    #[serde(default)]
    pub last_applied_ip: Option<IpAddr>,
    /// When `last_applied_ip` was last written
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MonitoredDomain {
    /// Create an active domain with no applied state
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        zone_id: impl Into<String>,
        record_kind: RecordKind,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            zone_id: zone_id.into(),
            record_kind,
            ttl: DEFAULT_TTL,
            provider: provider.into(),
            notifier: None,
            active: true,
            last_applied_ip: None,
            last_updated: None,
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Attach a notifier
    pub fn with_notifier(mut self, notifier: impl Into<String>) -> Self {
        self.notifier = Some(notifier.into());
        self
    }

    /// Enable or disable the domain
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Seed the last applied address
    pub fn with_last_applied_ip(mut self, ip: IpAddr) -> Self {
        self.last_applied_ip = Some(ip);
        self
    }

    /// Check the registry-side invariants
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.id.is_empty() {
            return Err(crate::Error::invalid_input("domain id cannot be empty"));
        }
        if self.name.is_empty() {
            return Err(crate::Error::invalid_input(format!(
                "domain {} has an empty name",
                self.id
            )));
        }
        if self.zone_id.is_empty() {
            return Err(crate::Error::invalid_input(format!(
                "domain {} has an empty zone id",
                self.id
            )));
        }
        if self.ttl == 0 {
            return Err(crate::Error::invalid_input(format!(
                "domain {} has a zero TTL",
                self.id
            )));
        }
        if let Some(ip) = &self.last_applied_ip
            && !self.record_kind.family().matches(ip)
        {
            return Err(crate::Error::invalid_input(format!(
                "domain {} is {} but its applied address {} is not {}",
                self.id,
                self.record_kind,
                ip,
                self.record_kind.family()
            )));
        }
        Ok(())
    }
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

fn default_active() -> bool {
    true
}

/// Public addresses found in one resolution round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedAddresses {
    pub v4: Option<Ipv4Addr>,
    pub v6: Option<Ipv6Addr>,
}

impl ResolvedAddresses {
    /// The address a record of `kind` should point at, if one was found
    pub fn for_kind(&self, kind: RecordKind) -> Option<IpAddr> {
        match kind {
            RecordKind::A => self.v4.map(IpAddr::V4),
            RecordKind::Aaaa => self.v6.map(IpAddr::V6),
        }
    }

    /// Whether neither family resolved
    pub fn is_empty(&self) -> bool {
        self.v4.is_none() && self.v6.is_none()
    }
}
