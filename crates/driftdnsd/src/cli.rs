//! Command-line interface
//!
//! Every option also reads from its `DRIFTDNS_*` environment variable, so the
//! daemon can be configured entirely from a systemd unit or container env.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default location of the JSON configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/driftdns/config.json";

/// driftdns: keeps DNS address records in sync with the public IP
#[derive(Debug, Parser)]
#[command(name = "driftdnsd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the JSON configuration file
    #[arg(
        long,
        short,
        global = true,
        env = "DRIFTDNS_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DRIFTDNS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the scheduler until SIGTERM/SIGINT
    Run,
    /// Run one reconciliation cycle and print the report
    Once,
    /// Resolve the public IPv4 and IPv6 addresses and print them
    CheckIp,
    /// List the zones visible to a configured provider
    ListZones {
        /// Provider name from the configuration
        provider: String,
    },
    /// Send a test message through a configured notifier
    TestNotifier {
        /// Notifier name from the configuration
        notifier: String,
    },
}

impl Cli {
    /// The subcommand to execute, `run` when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

/// Check a log level string before handing it to the subscriber
pub fn validate_log_level(level: &str) -> anyhow::Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => anyhow::bail!(
            "DRIFTDNS_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("driftdnsd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = parse(&["--config", "/tmp/driftdns.json"]);
        assert_eq!(cli.command(), Command::Run);
        assert_eq!(cli.config, PathBuf::from("/tmp/driftdns.json"));
    }

    #[test]
    fn subcommands_take_names() {
        assert_eq!(
            parse(&["list-zones", "cf"]).command(),
            Command::ListZones {
                provider: "cf".to_string()
            }
        );
        assert_eq!(
            parse(&["test-notifier", "ops", "-c", "/tmp/x.json"]).command(),
            Command::TestNotifier {
                notifier: "ops".to_string()
            }
        );
        assert_eq!(parse(&["once"]).command(), Command::Once);
        assert_eq!(parse(&["check-ip"]).command(), Command::CheckIp);
    }

    #[test]
    fn list_zones_requires_provider() {
        assert!(Cli::try_parse_from(["driftdnsd", "list-zones"]).is_err());
    }

    #[test]
    fn log_level_validation() {
        assert!(validate_log_level("DEBUG").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }
}
