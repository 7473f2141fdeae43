// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare API v4 implementation of `DnsProvider`.
//
// ## Scope
//
// - Zone listing, paginated and optionally narrowed to one account
// - Read of the value published for a name/type
// - Single-value upsert: PUT when the record exists, POST when it does not,
//   nothing at all when it already carries the requested value and TTL
// - Dry-run mode (`DRIFTDNS_MODE=dry-run`): reads go out, writes are logged
//
// Retries, caching and scheduling are not done here. Every failure is
// returned to the reconciler, which keeps the domain's previous state and
// tries again on the next cycle.
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Provider construction fails fast if the token is empty
//
// ## API Reference
//
// - List Zones: GET `/zones?account.id=...&page=...&per_page=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use driftdns_core::config::ProviderConfig;
use driftdns_core::model::RecordKind;
use driftdns_core::traits::{
    DnsProvider, DnsProviderFactory, UpsertOutcome, UpsertRequest, Zone,
};
use driftdns_core::{Error, PluginRegistry, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const ZONES_PER_PAGE: &str = "50";

/// Environment variable selecting live or dry-run mode
pub const MODE_ENV: &str = "DRIFTDNS_MODE";

/// Cloudflare DNS provider
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot: each trait call maps to a fixed, small number
/// of API requests and keeps nothing between calls.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone listing, record lookup)
/// - Log the intended POST/PUT payload
/// - **NOT** modify DNS records
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Narrows zone listing to one account
    account_id: Option<String>,

    base_url: Url,

    client: reqwest::Client,

    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url.as_str())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Envelope shared by every Cloudflare v4 response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    page: u32,
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
    #[serde(default)]
    ttl: Option<u32>,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: API token with Zone:Read and DNS:Edit permissions
    /// - `account_id`: Optional account filter for zone listing
    /// - `dry_run`: If true, perform GET requests but skip writes
    pub fn new(
        api_token: impl Into<String>,
        account_id: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(CLOUDFLARE_API_BASE)
            .map_err(|e| Error::config(format!("Invalid Cloudflare base URL: {}", e)))?;

        Ok(Self {
            api_token,
            account_id,
            base_url,
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API root (test servers, proxies)
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid Cloudflare base URL '{}': {}", base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "Cloudflare base URL must be http(s): {}",
                base_url
            )));
        }
        self.base_url = url;
        Ok(self)
    }

    /// Whether writes are suppressed
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Build `<base>/<segments...>`, escaping each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config("Cloudflare base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one request and decode the v4 envelope
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        context: &str,
    ) -> Result<ApiResponse<T>> {
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &error_text, context));
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("Failed to parse response: {}", e)))?;

        if envelope.success == Some(false) {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|m| format!("{} ({})", m.message, m.code))
                .collect();
            return Err(Error::provider(
                "cloudflare",
                format!("{} rejected: {}", context, messages.join("; ")),
            ));
        }

        Ok(envelope)
    }

    /// Look up the record set for `name`/`kind`
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=home.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn find_record(
        &self,
        zone_id: &str,
        name: &str,
        kind: RecordKind,
    ) -> Result<Option<DnsRecord>> {
        let name = fqdn(name);
        tracing::debug!(zone_id, record = name, record_type = %kind, "Looking up DNS record");

        let mut url = self.endpoint(&["zones", zone_id, "dns_records"])?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("type", kind.as_str());

        let envelope: ApiResponse<Vec<DnsRecord>> =
            self.call(Method::GET, url, None, "Record lookup").await?;

        let mut records = envelope.result.unwrap_or_default();
        if records.len() > 1 {
            tracing::warn!(
                record = name,
                record_type = %kind,
                count = records.len(),
                "Multiple records share this name; only the first is managed"
            );
        }
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }
}

/// Map a non-2xx status to the error the reconciler reports
fn status_error(status: StatusCode, error_text: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::provider(
            "cloudflare",
            format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => Error::not_found(format!("{}: {}", context, error_text)),
        409 => Error::provider(
            "cloudflare",
            format!("Conflict: Record is being updated by another process. Status: {}", status),
        ),
        429 => Error::provider(
            "cloudflare",
            format!("Rate limit exceeded. Please retry later. Status: {}", status),
        ),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, error_text),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{} failed: {} - {}", context, status, error_text),
        ),
    }
}

/// Cloudflare stores names without the trailing root dot
fn fqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

fn parse_content(record: &DnsRecord) -> Result<IpAddr> {
    record.content.parse().map_err(|e| {
        Error::provider(
            "cloudflare",
            format!("Invalid IP in record content '{}': {}", record.content, e),
        )
    })
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut url = self.endpoint(&["zones"])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("page", &page.to_string())
                    .append_pair("per_page", ZONES_PER_PAGE);
                if let Some(account_id) = &self.account_id {
                    query.append_pair("account.id", account_id);
                }
            }

            let envelope: ApiResponse<Vec<ZoneEntry>> =
                self.call(Method::GET, url, None, "Zone listing").await?;

            zones.extend(envelope.result.unwrap_or_default().into_iter().map(|z| Zone {
                id: z.id,
                name: z.name,
                record_count: None,
            }));

            match envelope.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }

        tracing::debug!(count = zones.len(), "Listed Cloudflare zones");
        Ok(zones)
    }

    async fn current_value(
        &self,
        zone_id: &str,
        name: &str,
        kind: RecordKind,
    ) -> Result<Option<IpAddr>> {
        match self.find_record(zone_id, name, kind).await? {
            Some(record) => parse_content(&record).map(Some),
            None => Ok(None),
        }
    }

    /// Create or replace the record with one value
    ///
    /// ```http
    /// # Record exists with a different value or TTL
    /// PUT /zones/:zone_id/dns_records/:record_id
    ///
    /// # Record absent
    /// POST /zones/:zone_id/dns_records
    ///
    /// {"type": "A", "name": "...", "content": "203.0.113.5", "ttl": 300, "proxied": false}
    /// ```
    async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertOutcome> {
        tracing::info!(
            "Upserting Cloudflare DNS record: {} -> {} ({}) [mode: {}]",
            request.name,
            request.value,
            request.kind,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let existing = self
            .find_record(&request.zone_id, &request.name, request.kind)
            .await?;

        if let Some(record) = &existing
            && record.content.parse::<IpAddr>().ok() == Some(request.value)
            && record.ttl.is_none_or(|ttl| ttl == request.ttl)
        {
            tracing::info!(
                "DNS record already has correct IP: {} -> {}",
                request.name,
                request.value
            );
            return Ok(UpsertOutcome::AlreadyCurrent);
        }

        let payload = serde_json::json!({
            "type": request.kind.as_str(),
            "name": fqdn(&request.name),
            "content": request.value.to_string(),
            "ttl": request.ttl,
            "proxied": false,
        });

        let (method, url) = match &existing {
            Some(record) => (
                Method::PUT,
                self.endpoint(&["zones", &request.zone_id, "dns_records", &record.id])?,
            ),
            None => (
                Method::POST,
                self.endpoint(&["zones", &request.zone_id, "dns_records"])?,
            ),
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send {} request to {} with payload: {}",
                method,
                url,
                payload
            );
            return Ok(UpsertOutcome::DryRun);
        }

        let _: ApiResponse<serde_json::Value> =
            self.call(method, url, Some(&payload), "Record update").await?;

        tracing::info!(
            "DNS record updated successfully: {} -> {}",
            request.name,
            request.value
        );
        Ok(UpsertOutcome::Written)
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
///
/// Reads [`MODE_ENV`] at creation time; `dry-run` suppresses writes.
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                account_id,
            } => {
                let dry_run = std::env::var(MODE_ENV)
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(CloudflareProvider::new(
                    api_token.clone(),
                    account_id.clone(),
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a plugin registry
///
/// # Example
///
/// ```rust
/// use driftdns_core::PluginRegistry;
///
/// let registry = PluginRegistry::new();
/// driftdns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &PluginRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}
