//! Plugin registry for DNS providers and notifiers
//!
//! Provider and notifier implementations live in their own crates and
//! register a factory here under a type name. The daemon then builds
//! instances from configuration without knowing the concrete types.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use driftdns_core::registry::PluginRegistry;
//!
//! let registry = PluginRegistry::new();
//! driftdns_provider_cloudflare::register(&registry);
//! driftdns_notify_slack::register(&registry);
//!
//! let provider = registry.create_provider(&config.providers["cf-main"])?;
//! let notifier = registry.create_notifier(&config.notifiers["ops"])?;
//! ```
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In the driftdns-provider-cloudflare crate
//! pub fn register(registry: &PluginRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::config::{NotifierConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, Notifier, NotifierFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry mapping type names to provider and notifier factories
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent lookups, exclusive
/// registration.
#[derive(Default)]
pub struct PluginRegistry {
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
    notifiers: RwLock<HashMap<String, Box<dyn NotifierFactory>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under a type name (e.g. "cloudflare")
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a notifier factory under a type name (e.g. "slack")
    pub fn register_notifier(&self, name: impl Into<String>, factory: Box<dyn NotifierFactory>) {
        self.notifiers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create a DNS provider from one credential set
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: provider type not registered
    /// - `Err(Error)`: the factory rejected the configuration
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create a notifier from one notifier account
    pub fn create_notifier(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        let notifier_type = config.type_name();
        let notifiers = self.notifiers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = notifiers
            .get(notifier_type)
            .ok_or_else(|| Error::config(format!("Unknown notifier type: {}", notifier_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// List all registered notifier types
    pub fn list_notifiers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a notifier type is registered
    pub fn has_notifier(&self, name: &str) -> bool {
        self.notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
