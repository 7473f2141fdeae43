//! Configuration types for driftdns
//!
//! This module defines the structures the daemon deserializes from its JSON
//! configuration file. Everything is validated here, at the configuration
//! boundary, before the core sees it.

use crate::model::MonitoredDomain;
use crate::settings::{Setting, validate_setting};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Main driftdns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// Runtime settings (`scheduler.refresh_interval`, `ip_detection.*`)
    #[serde(default)]
    pub settings: BTreeMap<String, Setting>,

    /// DNS provider credential sets, keyed by the name domains refer to
    pub providers: HashMap<String, ProviderConfig>,

    /// Notifier accounts, keyed by the name domains refer to
    #[serde(default)]
    pub notifiers: HashMap<String, NotifierConfig>,

    /// Where monitored domains live
    pub registry: RegistryConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdnsConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.providers.is_empty() {
            return Err(crate::Error::config("No DNS providers configured"));
        }

        for (key, value) in &self.settings {
            validate_setting(key, value)?;
        }

        for (name, provider) in &self.providers {
            provider
                .validate()
                .map_err(|e| crate::Error::config(format!("provider '{}': {}", name, e)))?;
        }

        for (name, notifier) in &self.notifiers {
            notifier
                .validate()
                .map_err(|e| crate::Error::config(format!("notifier '{}': {}", name, e)))?;
        }

        self.registry.validate()?;
        if let RegistryConfig::Memory { domains } = &self.registry {
            self.check_references(domains)?;
        }

        self.engine.validate()?;

        Ok(())
    }

    /// Verify that every domain points at a configured provider and notifier
    pub fn check_references(&self, domains: &[MonitoredDomain]) -> Result<(), crate::Error> {
        for domain in domains {
            if !self.providers.contains_key(&domain.provider) {
                return Err(crate::Error::config(format!(
                    "domain {} refers to unknown provider '{}'",
                    domain.id, domain.provider
                )));
            }
            if let Some(notifier) = &domain.notifier
                && !self.notifiers.contains_key(notifier)
            {
                return Err(crate::Error::config(format!(
                    "domain {} refers to unknown notifier '{}'",
                    domain.id, notifier
                )));
            }
        }
        Ok(())
    }
}

/// DNS provider credential set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare API v4
    Cloudflare {
        /// API token with Zone:Read and DNS:Edit permissions
        api_token: String,
        /// Account ID (optional, narrows zone listing)
        #[serde(default)]
        account_id: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                validate_custom("provider", factory, config)
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Notifier account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Inactive notifiers are never invoked
    #[serde(default = "default_true")]
    pub active: bool,

    /// Channel-specific settings
    #[serde(flatten)]
    pub kind: NotifierKind,
}

/// Notification channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierKind {
    /// Slack incoming webhook
    Slack {
        /// Webhook URL
        webhook_url: String,
        /// Account name shown in test messages
        #[serde(default)]
        display_name: Option<String>,
    },

    /// Custom notifier
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl NotifierConfig {
    /// Create an active Slack notifier configuration
    pub fn slack(webhook_url: impl Into<String>) -> Self {
        Self {
            active: true,
            kind: NotifierKind::Slack {
                webhook_url: webhook_url.into(),
                display_name: None,
            },
        }
    }

    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match &self.kind {
            NotifierKind::Slack { webhook_url, .. } => {
                if !is_http_url(webhook_url) {
                    return Err(crate::Error::config(format!(
                        "Slack webhook URL must be http(s): {}",
                        webhook_url
                    )));
                }
                Ok(())
            }
            NotifierKind::Custom { factory, config } => validate_custom("notifier", factory, config),
        }
    }

    /// Get the notifier type name
    pub fn type_name(&self) -> &str {
        match &self.kind {
            NotifierKind::Slack { .. } => "slack",
            NotifierKind::Custom { factory, .. } => factory,
        }
    }
}

/// Domain registry backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryConfig {
    /// JSON file holding domain definitions and applied state
    File {
        /// Path to the registry file
        path: String,
    },

    /// In-memory registry seeded from the configuration (state lost on restart)
    Memory {
        /// Domains to monitor
        #[serde(default)]
        domains: Vec<MonitoredDomain>,
    },
}

impl RegistryConfig {
    /// Validate the registry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RegistryConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("Registry file path cannot be empty"));
                }
                Ok(())
            }
            RegistryConfig::Memory { domains } => {
                let mut seen = HashSet::new();
                for domain in domains {
                    domain
                        .validate()
                        .map_err(|e| crate::Error::config(e.to_string()))?;
                    if !seen.insert(domain.id.as_str()) {
                        return Err(crate::Error::config(format!(
                            "duplicate domain id: {}",
                            domain.id
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of domains reconciled concurrently within a cycle
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Upper bound for every outbound call (IP source, provider, webhook), in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Re-read the provider's published value when the local cache matches
    ///
    /// Off by default: the locally recorded address is treated as
    /// authoritative and an unchanged address costs zero provider calls.
    /// When on, a record changed out-of-band is detected and re-upserted.
    #[serde(default)]
    pub verify_remote: bool,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_concurrency == 0 {
            return Err(crate::Error::config("engine.max_concurrency must be > 0"));
        }
        if self.call_timeout_secs == 0 {
            return Err(crate::Error::config("engine.call_timeout_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config(
                "engine.event_channel_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            verify_remote: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

pub(crate) fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn validate_custom(
    what: &str,
    factory: &str,
    config: &serde_json::Value,
) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {} factory cannot be empty",
            what
        )));
    }
    if config.is_null() {
        return Err(crate::Error::config(format!(
            "Custom {} config cannot be null",
            what
        )));
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const SAMPLE: &str = r#"{
        "settings": {
            "scheduler.refresh_interval": 120,
            "ip_detection.ipv4_sources": ["https://api.ipify.org"]
        },
        "providers": {
            "cf-main": { "type": "cloudflare", "api_token": "abc123" }
        },
        "notifiers": {
            "ops": { "type": "slack", "webhook_url": "https://hooks.slack.com/services/T/B/X" }
        },
        "registry": {
            "type": "memory",
            "domains": [
                {
                    "id": "home",
                    "name": "home.example.com",
                    "zone_id": "Z1",
                    "record_kind": "A",
                    "provider": "cf-main",
                    "notifier": "ops"
                }
            ]
        }
    }"#;

    #[test]
    fn parses_and_validates_sample() {
        let config = DdnsConfig::from_json(SAMPLE).unwrap();
        assert_ok!(config.validate());

        assert_eq!(
            config.settings.get("scheduler.refresh_interval"),
            Some(&Setting::Int(120))
        );
        assert!(config.notifiers["ops"].active);
        assert_eq!(config.notifiers["ops"].type_name(), "slack");
        assert_eq!(config.engine.max_concurrency, 4);
        assert!(!config.engine.verify_remote);
    }

    #[test]
    fn rejects_unknown_provider_reference() {
        let mut config = DdnsConfig::from_json(SAMPLE).unwrap();
        if let RegistryConfig::Memory { domains } = &mut config.registry {
            domains[0].provider = "route53".to_string();
        }

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn rejects_zero_interval_setting() {
        let mut config = DdnsConfig::from_json(SAMPLE).unwrap();
        config
            .settings
            .insert("scheduler.refresh_interval".to_string(), Setting::Int(0));

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_cloudflare_token() {
        let provider = ProviderConfig::Cloudflare {
            api_token: String::new(),
            account_id: None,
        };
        assert!(provider.validate().is_err());
    }

    #[test]
    fn rejects_non_http_webhook() {
        assert_err!(NotifierConfig::slack("ftp://hooks.example.com").validate());
        assert_ok!(NotifierConfig::slack("https://hooks.example.com").validate());
    }
}
