//! Runtime settings
//!
//! Settings are a small tagged union rather than free-form JSON: every known
//! key has exactly one accepted shape, checked by [`validate_setting`] before a
//! value can enter a [`SettingsStore`].
//!
//! | key | shape | default |
//! |---|---|---|
//! | `scheduler.refresh_interval` | `Int`, seconds, > 0 | 300 |
//! | `ip_detection.ipv4_sources` | `StringList`, non-empty, http(s) | [`DEFAULT_IPV4_SOURCES`] |
//! | `ip_detection.ipv6_sources` | `StringList`, non-empty, http(s) | [`DEFAULT_IPV6_SOURCES`] |

use crate::config::is_http_url;
use crate::error::{Error, Result};
use crate::model::IpFamily;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// Refresh interval key
pub const REFRESH_INTERVAL: &str = "scheduler.refresh_interval";
/// IPv4 echo endpoints key
pub const IPV4_SOURCES: &str = "ip_detection.ipv4_sources";
/// IPv6 echo endpoints key
pub const IPV6_SOURCES: &str = "ip_detection.ipv6_sources";

/// Refresh interval used when nothing is configured
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// IPv4 echo endpoints used when nothing is configured
pub const DEFAULT_IPV4_SOURCES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
    "https://ident.me",
    "https://checkip.amazonaws.com",
];

/// IPv6 echo endpoints used when nothing is configured
pub const DEFAULT_IPV6_SOURCES: &[&str] = &[
    "https://api6.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
    "https://ident.me",
];

/// A setting value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setting {
    /// Integer setting
    Int(i64),
    /// Ordered list of strings
    StringList(Vec<String>),
}

impl Setting {
    /// Integer value, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Setting::Int(v) => Some(*v),
            Setting::StringList(_) => None,
        }
    }

    /// List value, if this is a `StringList`
    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            Setting::StringList(v) => Some(v),
            Setting::Int(_) => None,
        }
    }
}

/// The built-in value of a known key
pub fn default_setting(key: &str) -> Option<Setting> {
    match key {
        REFRESH_INTERVAL => Some(Setting::Int(DEFAULT_REFRESH_INTERVAL_SECS as i64)),
        IPV4_SOURCES => Some(to_list(DEFAULT_IPV4_SOURCES)),
        IPV6_SOURCES => Some(to_list(DEFAULT_IPV6_SOURCES)),
        _ => None,
    }
}

/// Check a value against the rules of its key
///
/// Unknown keys are accepted as-is; known keys must have the right shape.
pub fn validate_setting(key: &str, value: &Setting) -> Result<()> {
    match key {
        REFRESH_INTERVAL => match value {
            Setting::Int(secs) if *secs >= 1 => Ok(()),
            _ => Err(Error::settings(
                "Refresh interval must be a positive integer (seconds)",
            )),
        },
        IPV4_SOURCES | IPV6_SOURCES => {
            let urls = value.as_string_list().ok_or_else(|| {
                Error::settings("IP sources must be a non-empty list of URLs")
            })?;
            if urls.is_empty() {
                return Err(Error::settings(
                    "IP sources must be a non-empty list of URLs",
                ));
            }
            if let Some(bad) = urls.iter().find(|url| !is_http_url(url)) {
                return Err(Error::settings(format!("Invalid URL: {}", bad)));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Store of runtime settings
///
/// Implementations validate on write; readers may still find a key missing
/// and fall back to the built-in defaults.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a setting
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    /// Validate and store a setting
    async fn set(&self, key: &str, value: Setting) -> Result<()>;

    /// Restore the built-in default of a key (removes unknown keys)
    async fn reset(&self, key: &str) -> Result<()>;
}

/// In-memory settings store, seeded with the built-in defaults
#[derive(Debug)]
pub struct MemorySettingsStore {
    inner: RwLock<HashMap<String, Setting>>,
}

impl MemorySettingsStore {
    /// Create a store holding the built-in defaults
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(defaults()),
        }
    }

    /// Create a store with the defaults overlaid by `overrides`
    pub fn with_overrides<I>(overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Setting)>,
    {
        Ok(Self {
            inner: RwLock::new(overlay(overrides)?),
        })
    }

    /// Replace every setting with the defaults overlaid by `overrides`
    ///
    /// All values are validated before anything is replaced.
    pub async fn replace_all<I>(&self, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Setting)>,
    {
        let fresh = overlay(overrides)?;
        *self.inner.write().await = fresh;
        Ok(())
    }
}

fn defaults() -> HashMap<String, Setting> {
    [REFRESH_INTERVAL, IPV4_SOURCES, IPV6_SOURCES]
        .into_iter()
        .filter_map(|key| default_setting(key).map(|value| (key.to_string(), value)))
        .collect()
}

fn overlay<I>(overrides: I) -> Result<HashMap<String, Setting>>
where
    I: IntoIterator<Item = (String, Setting)>,
{
    let mut settings = defaults();
    for (key, value) in overrides {
        validate_setting(&key, &value)?;
        settings.insert(key, value);
    }
    Ok(settings)
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Setting) -> Result<()> {
        validate_setting(key, &value)?;
        self.inner.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        match default_setting(key) {
            Some(value) => {
                guard.insert(key.to_string(), value);
            }
            None => {
                guard.remove(key);
            }
        }
        Ok(())
    }
}

/// Read the scheduler period
///
/// A missing or malformed value falls back to the default; a store failure
/// is returned to the caller.
pub async fn refresh_interval(store: &dyn SettingsStore) -> Result<Duration> {
    let secs = match store.get(REFRESH_INTERVAL).await? {
        Some(Setting::Int(secs)) if secs >= 1 => secs as u64,
        Some(other) => {
            warn!(
                "Ignoring invalid {} value {:?}, using {}s",
                REFRESH_INTERVAL, other, DEFAULT_REFRESH_INTERVAL_SECS
            );
            DEFAULT_REFRESH_INTERVAL_SECS
        }
        None => DEFAULT_REFRESH_INTERVAL_SECS,
    };
    Ok(Duration::from_secs(secs))
}

/// Read the ordered echo endpoints for a family
///
/// Never fails and never returns an empty list: any problem falls back to
/// the built-in defaults.
pub async fn ip_sources(store: &dyn SettingsStore, family: IpFamily) -> Vec<String> {
    let (key, defaults) = match family {
        IpFamily::V4 => (IPV4_SOURCES, DEFAULT_IPV4_SOURCES),
        IpFamily::V6 => (IPV6_SOURCES, DEFAULT_IPV6_SOURCES),
    };

    match store.get(key).await {
        Ok(Some(Setting::StringList(urls))) if !urls.is_empty() => urls,
        Ok(Some(other)) => {
            warn!("Ignoring invalid {} value {:?}, using defaults", key, other);
            defaults.iter().map(|s| s.to_string()).collect()
        }
        Ok(None) => defaults.iter().map(|s| s.to_string()).collect(),
        Err(e) => {
            warn!("Failed to read {}: {}. Using defaults", key, e);
            defaults.iter().map(|s| s.to_string()).collect()
        }
    }
}

fn to_list(values: &[&str]) -> Setting {
    Setting::StringList(values.iter().map(|s| s.to_string()).collect())
}
