// # Slack Notifier
//
// Posts IP change messages to a Slack incoming webhook.
//
// Each call is a single JSON `POST` with a 10 second timeout. Anything other
// than a 2xx answer is returned as `Error::Notification`; the reconciler logs
// it and moves on, so a broken webhook never affects DNS state.
//
// ## Security Requirements
//
// - The webhook URL is a credential: it never appears in logs or Debug output

use async_trait::async_trait;
use driftdns_core::config::{NotifierConfig, NotifierKind};
use driftdns_core::traits::{IpChangeNotice, Notifier, NotifierFactory};
use driftdns_core::{Error, PluginRegistry, Result};
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Default HTTP timeout for webhook delivery
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Name shown as the message author and footer
const BOT_NAME: &str = "driftdns";

const COLOR_CHANGED: &str = "#ff9500";
const COLOR_ASSIGNED: &str = "#36a64f";

/// Slack incoming webhook notifier
pub struct SlackNotifier {
    /// ⚠️ NEVER log this value
    webhook_url: Url,

    /// Account label used in the connection test message
    display_name: String,

    client: reqwest::Client,
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("webhook_url", &"<REDACTED>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SlackMessage<'a> {
    username: &'a str,
    icon_emoji: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
struct Attachment {
    color: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<Field>,
    footer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

#[derive(Debug, Serialize)]
struct Field {
    title: &'static str,
    value: String,
    short: bool,
}

impl Field {
    fn short(title: &'static str, value: String) -> Self {
        Self {
            title,
            value,
            short: true,
        }
    }
}

impl SlackNotifier {
    /// Create a notifier for one webhook
    pub fn new(webhook_url: impl Into<String>, display_name: impl Into<String>) -> Result<Self> {
        // Parse errors never echo the input, so the secret path stays out of logs
        let webhook_url = Url::parse(&webhook_url.into())
            .map_err(|e| Error::config(format!("Invalid Slack webhook URL: {}", e)))?;
        if !matches!(webhook_url.scheme(), "http" | "https") || !webhook_url.has_host() {
            return Err(Error::config("Slack webhook URL must be http(s)"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            webhook_url,
            display_name: display_name.into(),
            client,
        })
    }

    async fn post(&self, message: &SlackMessage<'_>) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| {
                // reqwest errors embed the URL; strip it
                Error::notification("slack", format!("Webhook request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::notification(
                "slack",
                format!("Webhook returned {}: {}", status, error_text),
            ));
        }

        Ok(())
    }
}

/// Render the change message; `ts` is the unix timestamp of the message
fn change_message(notice: &IpChangeNotice, ts: i64) -> SlackMessage<'static> {
    let (color, title, text, mut fields) = match notice.previous_ip {
        Some(previous) => (
            COLOR_CHANGED,
            "🔄 IP address changed",
            format!("The record `{}` now points to a new address", notice.domain),
            vec![
                Field::short("Old IP", format!("`{}`", previous)),
                Field::short("New IP", format!("`{}`", notice.new_ip)),
            ],
        ),
        None => (
            COLOR_ASSIGNED,
            "🆕 First IP assignment",
            format!("The record `{}` was published for the first time", notice.domain),
            vec![Field::short("Assigned IP", format!("`{}`", notice.new_ip))],
        ),
    };

    fields.push(Field::short("Record Type", notice.record_kind.to_string()));
    fields.push(Field::short("TTL", format!("{}s", notice.ttl)));

    SlackMessage {
        username: BOT_NAME,
        icon_emoji: ":globe_with_meridians:",
        text: None,
        attachments: vec![Attachment {
            color,
            title: Some(title.to_string()),
            text,
            fields,
            footer: BOT_NAME.to_string(),
            ts: Some(ts),
        }],
    }
}

fn test_message(display_name: &str) -> SlackMessage<'static> {
    SlackMessage {
        username: BOT_NAME,
        icon_emoji: ":white_check_mark:",
        text: Some(format!(
            "✅ Connection test succeeded for Slack account `{}`",
            display_name
        )),
        attachments: vec![Attachment {
            color: COLOR_ASSIGNED,
            title: None,
            text: "Your Slack webhook is configured correctly!".to_string(),
            fields: Vec::new(),
            footer: format!("{} - connection test", BOT_NAME),
            ts: None,
        }],
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, notice: &IpChangeNotice) -> Result<()> {
        let message = change_message(notice, chrono::Utc::now().timestamp());
        self.post(&message).await?;

        tracing::info!(
            domain = %notice.domain,
            new_ip = %notice.new_ip,
            "Slack notification sent"
        );
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        self.post(&test_message(&self.display_name)).await?;
        tracing::info!(account = %self.display_name, "Slack webhook test succeeded");
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "slack"
    }
}

/// Factory for creating Slack notifiers
pub struct SlackFactory;

impl NotifierFactory for SlackFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        match &config.kind {
            NotifierKind::Slack {
                webhook_url,
                display_name,
            } => Ok(Box::new(SlackNotifier::new(
                webhook_url.clone(),
                display_name.clone().unwrap_or_else(|| "slack".to_string()),
            )?)),
            _ => Err(Error::config("Invalid config for Slack notifier")),
        }
    }
}

/// Register the Slack notifier with a plugin registry
pub fn register(registry: &PluginRegistry) {
    registry.register_notifier("slack", Box::new(SlackFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftdns_core::model::RecordKind;

    fn notice(previous: Option<&str>) -> IpChangeNotice {
        IpChangeNotice {
            domain: "home.example.com".to_string(),
            previous_ip: previous.map(|ip| ip.parse().unwrap()),
            new_ip: "203.0.113.5".parse().unwrap(),
            record_kind: RecordKind::A,
            ttl: 300,
        }
    }

    #[test]
    fn change_message_lists_old_and_new() {
        let json = serde_json::to_value(change_message(&notice(Some("198.51.100.1")), 1700000000))
            .unwrap();
        let attachment = &json["attachments"][0];

        assert_eq!(attachment["color"], COLOR_CHANGED);
        assert!(attachment["title"].as_str().unwrap().contains("IP address changed"));
        assert_eq!(attachment["fields"][0]["title"], "Old IP");
        assert_eq!(attachment["fields"][0]["value"], "`198.51.100.1`");
        assert_eq!(attachment["fields"][1]["value"], "`203.0.113.5`");
        assert_eq!(attachment["fields"][2]["value"], "A");
        assert_eq!(attachment["fields"][3]["value"], "300s");
        assert_eq!(attachment["ts"], 1700000000);
        assert!(json.get("text").is_none());
    }

    #[test]
    fn first_assignment_message() {
        let json = serde_json::to_value(change_message(&notice(None), 1)).unwrap();
        let attachment = &json["attachments"][0];

        assert_eq!(attachment["color"], COLOR_ASSIGNED);
        assert!(attachment["title"].as_str().unwrap().contains("First IP assignment"));
        assert_eq!(attachment["fields"].as_array().unwrap().len(), 3);
        assert_eq!(attachment["fields"][0]["title"], "Assigned IP");
    }

    #[test]
    fn test_message_names_the_account() {
        let json = serde_json::to_value(test_message("ops-team")).unwrap();
        assert!(json["text"].as_str().unwrap().contains("`ops-team`"));
        assert!(json["attachments"][0].get("fields").is_none());
    }

    #[test]
    fn webhook_not_exposed_in_debug() {
        let notifier =
            SlackNotifier::new("https://hooks.slack.com/services/T0/B0/secret", "ops").unwrap();
        let debug_str = format!("{:?}", notifier);
        assert!(!debug_str.contains("secret"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[test]
    fn malformed_webhook_is_rejected() {
        for url in [
            "https//hooks.slack.com/services/x",
            "https://",
            "hooks.slack.com/services/x",
            "ftp://hooks.slack.com/services/x",
            "https-evil:hooks.slack.com",
        ] {
            let err = SlackNotifier::new(url, "ops").unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{} accepted: {:?}", url, err);
        }
        assert!(SlackNotifier::new("http://127.0.0.1:8080/hook", "ops").is_ok());
    }

    #[test]
    fn factory_rejects_foreign_config() {
        let config = NotifierConfig {
            active: true,
            kind: NotifierKind::Custom {
                factory: "teams".to_string(),
                config: serde_json::json!({"url": "x"}),
            },
        };
        assert!(SlackFactory.create(&config).is_err());

        let notifier = SlackFactory
            .create(&NotifierConfig::slack("https://hooks.slack.com/services/x"))
            .unwrap();
        assert_eq!(notifier.notifier_name(), "slack");
    }
}
