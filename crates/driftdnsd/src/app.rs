//! Composition root
//!
//! Turns a validated [`DdnsConfig`] into a wired reconciler: settings store,
//! domain registry, IP resolver, and the providers and notifiers created
//! through the plugin registry.

use anyhow::{Context, Result};
use driftdns_core::traits::{DnsProvider, DomainRegistry, Notifier};
use driftdns_core::{
    DdnsConfig, EngineEvent, FileDomainRegistry, IpResolver, MemoryDomainRegistry,
    MemorySettingsStore, PluginRegistry, Reconciler, RegistryConfig,
};
use driftdns_ip_http::HttpEchoSource;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Everything the subcommands operate on
pub struct App {
    pub settings: Arc<MemorySettingsStore>,
    pub registry: Arc<dyn DomainRegistry>,
    pub reconciler: Arc<Reconciler>,
    pub events: mpsc::Receiver<EngineEvent>,
    pub providers: HashMap<String, Arc<dyn DnsProvider>>,
    pub notifiers: HashMap<String, Arc<dyn Notifier>>,
}

/// Read, parse and validate the configuration file
pub fn load_config(path: &Path) -> Result<DdnsConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = DdnsConfig::from_json(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Plugin registry with every adapter compiled into this binary
pub fn plugins() -> PluginRegistry {
    let plugins = PluginRegistry::new();

    #[cfg(feature = "cloudflare")]
    {
        debug!("Registering Cloudflare provider");
        driftdns_provider_cloudflare::register(&plugins);
    }

    #[cfg(feature = "slack")]
    {
        debug!("Registering Slack notifier");
        driftdns_notify_slack::register(&plugins);
    }

    plugins
}

impl App {
    /// Build all components from `config`
    pub async fn build(config: &DdnsConfig, plugins: &PluginRegistry) -> Result<Self> {
        let settings = Arc::new(
            MemorySettingsStore::with_overrides(config.settings.clone())
                .context("Invalid settings")?,
        );

        let registry: Arc<dyn DomainRegistry> = match &config.registry {
            RegistryConfig::File { path } => Arc::new(
                FileDomainRegistry::new(path)
                    .await
                    .with_context(|| format!("Failed to open domain registry {}", path))?,
            ),
            RegistryConfig::Memory { domains } => Arc::new(
                MemoryDomainRegistry::with_domains(domains.clone())
                    .context("Invalid domain list")?,
            ),
        };

        // Domains in a registry file are edited outside the config; a dangling
        // reference fails only that domain at reconcile time.
        let domains = registry.active_domains().await?;
        if let Err(e) = config.check_references(&domains) {
            warn!("{}", e);
        }
        info!("Monitoring {} active domain(s)", domains.len());

        let call_timeout = Duration::from_secs(config.engine.call_timeout_secs);
        let source = HttpEchoSource::with_timeout(call_timeout)?;
        let resolver =
            IpResolver::new(Arc::new(source), settings.clone()).with_query_timeout(call_timeout);

        let mut providers: HashMap<String, Arc<dyn DnsProvider>> = HashMap::new();
        for (name, provider_config) in &config.providers {
            let provider = plugins
                .create_provider(provider_config)
                .with_context(|| format!("Failed to create provider '{}'", name))?;
            info!("Provider '{}' ready ({})", name, provider_config.type_name());
            providers.insert(name.clone(), Arc::from(provider));
        }

        let mut notifiers: HashMap<String, Arc<dyn Notifier>> = HashMap::new();
        for (name, notifier_config) in &config.notifiers {
            if !notifier_config.active {
                debug!("Notifier '{}' is inactive", name);
                continue;
            }
            let notifier = plugins
                .create_notifier(notifier_config)
                .with_context(|| format!("Failed to create notifier '{}'", name))?;
            info!("Notifier '{}' ready ({})", name, notifier_config.type_name());
            notifiers.insert(name.clone(), Arc::from(notifier));
        }

        let (mut reconciler, events) =
            Reconciler::new(registry.clone(), resolver, config.engine.clone())?;
        for (name, provider) in &providers {
            reconciler = reconciler.with_provider(name.clone(), provider.clone());
        }
        for (name, notifier) in &notifiers {
            reconciler = reconciler.with_notifier(name.clone(), notifier.clone());
        }

        Ok(Self {
            settings,
            registry,
            reconciler: Arc::new(reconciler),
            events,
            providers,
            notifiers,
        })
    }

    pub fn provider(&self, name: &str) -> Result<&Arc<dyn DnsProvider>> {
        self.providers.get(name).with_context(|| {
            format!(
                "Unknown provider '{}'. Configured: {}",
                name,
                sorted_keys(&self.providers).join(", ")
            )
        })
    }

    pub fn notifier(&self, name: &str) -> Result<&Arc<dyn Notifier>> {
        self.notifiers.get(name).with_context(|| {
            format!(
                "Unknown or inactive notifier '{}'. Active: {}",
                name,
                sorted_keys(&self.notifiers).join(", ")
            )
        })
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

/// Log engine events until the reconciler is dropped
pub fn spawn_event_logger(mut events: mpsc::Receiver<EngineEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                EngineEvent::UpdateFailed { domain, error } => {
                    warn!(%domain, %error, "Update failed");
                }
                EngineEvent::NotificationFailed { domain, error } => {
                    warn!(%domain, %error, "Notification failed");
                }
                other => debug!(event = ?other, "Engine event"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftdns_core::settings::{REFRESH_INTERVAL, Setting, refresh_interval};
    use std::io::Write;

    const CONFIG: &str = r#"{
        "settings": { "scheduler.refresh_interval": 120 },
        "providers": {
            "cf": { "type": "cloudflare", "api_token": "tok-123" }
        },
        "notifiers": {
            "ops": { "type": "slack", "webhook_url": "https://hooks.slack.com/services/a" },
            "muted": { "type": "slack", "webhook_url": "https://hooks.slack.com/services/b", "active": false }
        },
        "registry": {
            "type": "memory",
            "domains": [
                {
                    "id": "home",
                    "name": "home.example.com",
                    "record_kind": "A",
                    "zone_id": "Z1",
                    "provider": "cf",
                    "notifier": "ops"
                }
            ]
        }
    }"#;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/driftdns.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn load_config_rejects_invalid_settings() {
        let file = write_config(
            &CONFIG.replace(r#""scheduler.refresh_interval": 120"#, r#""scheduler.refresh_interval": 0"#),
        );
        assert!(load_config(file.path()).is_err());
    }

    #[tokio::test]
    async fn builds_from_memory_config() {
        let file = write_config(CONFIG);
        let config = load_config(file.path()).unwrap();

        let app = App::build(&config, &plugins()).await.unwrap();

        assert_eq!(
            refresh_interval(app.settings.as_ref()).await.unwrap(),
            Duration::from_secs(120)
        );
        assert_eq!(app.registry.active_domains().await.unwrap().len(), 1);
        assert!(app.provider("cf").is_ok());
        assert!(app.notifier("ops").is_ok());

        let err = app.notifier("muted").err().unwrap();
        assert!(err.to_string().contains("Active: ops"));
        assert!(app.provider("route53").is_err());
    }

    #[tokio::test]
    async fn builds_with_file_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry_path = dir.path().join("domains.json");
        let text = CONFIG.replace(
            r#""type": "memory","#,
            &format!(r#""type": "file", "path": "{}","#, registry_path.display()),
        );
        let file = write_config(&text);
        let config = load_config(file.path()).unwrap();

        let app = App::build(&config, &plugins()).await.unwrap();

        assert!(app.registry.active_domains().await.unwrap().is_empty());
        app.registry.flush().await.unwrap();
        assert!(registry_path.exists());
    }

    #[test]
    fn settings_overrides_are_validated() {
        let overrides = [(REFRESH_INTERVAL.to_string(), Setting::Int(-5))];
        assert!(MemorySettingsStore::with_overrides(overrides).is_err());
    }
}
