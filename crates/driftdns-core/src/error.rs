//! Error types for driftdns
//!
//! Every failure class the reconciliation core can run into is a variant of
//! [`Error`]. None of them is fatal to a running daemon:
//!
//! - IP resolution that finds nothing is not an error at all; the resolver
//!   returns `None` and the family is skipped for the cycle.
//! - [`Error::Provider`] covers DNS upsert/list/read failures. The domain keeps
//!   its previous state and the next cycle retries.
//! - [`Error::Notification`] covers webhook delivery failures. They are logged
//!   and never affect DNS state.
//! - [`Error::SchedulerFault`] is an unexpected failure inside a cycle, caught at
//!   the cycle boundary.

use std::net::IpAddr;
use thiserror::Error;

/// Result type alias for driftdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for driftdns
#[derive(Error, Debug)]
pub enum Error {
    /// An IP echo endpoint could not be queried or returned garbage
    #[error("IP source error: {0}")]
    IpSource(String),

    /// DNS provider call failed
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Webhook notification failed
    #[error("Notification error ({notifier}): {message}")]
    Notification {
        /// Notifier name
        notifier: String,
        /// Error message
        message: String,
    },

    /// Unexpected failure inside a reconciliation cycle
    #[error("Scheduler fault: {0}")]
    SchedulerFault(String),

    /// Domain registry errors
    #[error("Domain registry error: {0}")]
    Registry(String),

    /// Settings store errors
    #[error("Settings error: {0}")]
    Settings(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another writer changed the domain state first
    #[error("State conflict for {domain}: expected {expected:?}, found {found:?}")]
    Conflict {
        /// Domain id
        domain: String,
        /// Value the writer expected to replace
        expected: Option<IpAddr>,
        /// Value actually stored
        found: Option<IpAddr>,
    },

    /// An outbound call exceeded its time bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record or zone not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a notification error
    pub fn notification(notifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notification {
            notifier: notifier.into(),
            message: message.into(),
        }
    }

    /// Create a scheduler fault
    pub fn scheduler_fault(msg: impl Into<String>) -> Self {
        Self::SchedulerFault(msg.into())
    }

    /// Create a domain registry error
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Create a settings error
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the next cycle can be expected to succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::IpSource(_) | Self::Provider { .. } | Self::Timeout(_) | Self::Io(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
