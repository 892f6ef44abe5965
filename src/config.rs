// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the mirror engine.
//!
//! A [`MirrorConfig`] is built once (programmatically or deserialized from
//! YAML/JSON), validated by [`MirrorConfig::validate()`], and then handed to
//! [`MirrorEngine::new()`](crate::MirrorEngine::new). Nothing in the engine
//! mutates it afterwards.
//!
//! # Quick Start
//!
//! ```rust
//! use keyspace_mirror::config::MirrorConfig;
//!
//! let config = MirrorConfig {
//!     prefix: "/app/".into(),
//!     dest_prefix: Some("/app-mirror/".into()),
//!     ..MirrorConfig::for_testing("127.0.0.1:2379")
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! MirrorConfig
//! ├── destination: DestinationConfig  # endpoint, TLS, auth (opaque to the core)
//! ├── prefix: String                  # source prefix to mirror
//! ├── dest_prefix: Option<String>     # defaults to `prefix`
//! ├── no_dest_prefix: bool            # mirror to the destination root
//! ├── start_revision: i64             # 0 = full resync
//! ├── max_txn_ops: usize              # max operations per transaction
//! ├── progress_interval: String       # progress report cadence
//! └── retry: RetrySettings            # opt-in bounded retry of target calls
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! destination:
//!   endpoint: "10.0.0.5:2379"
//!   tls:
//!     insecure_transport: false
//!     cacert: "/etc/mirror/ca.pem"
//! prefix: "/registry/"
//! dest_prefix: "/registry-dr/"
//! max_txn_ops: 128
//! progress_interval: "30s"
//! ```

use crate::error::{MirrorError, Result};
use crate::key_mapper::PrefixMapping;
use crate::resilience::RetryConfig;
use crate::source::Revision;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum number of operations in one destination transaction.
pub const DEFAULT_MAX_TXN_OPS: usize = 128;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `MirrorEngine::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Where to mirror to. Only the endpoint is checked by the core.
    pub destination: DestinationConfig,

    /// Key prefix to mirror from the source.
    #[serde(default)]
    pub prefix: String,

    /// Destination prefix. Unset means "same as `prefix`".
    #[serde(default)]
    pub dest_prefix: Option<String>,

    /// Mirror keys to the root of the destination (strip the prefix).
    /// Conflicts with an explicit `dest_prefix`.
    #[serde(default)]
    pub no_dest_prefix: bool,

    /// Revision to start mirroring from. `0` replays a full snapshot first.
    #[serde(default)]
    pub start_revision: Revision,

    /// Maximum operations permitted in one transaction while syncing updates.
    #[serde(default = "default_max_txn_ops")]
    pub max_txn_ops: usize,

    /// How often the progress total is reported (e.g. "30s").
    #[serde(default = "default_progress_interval")]
    pub progress_interval: String,

    /// Bounded retry of target calls. Disabled (one attempt) by default.
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_max_txn_ops() -> usize {
    DEFAULT_MAX_TXN_OPS
}

fn default_progress_interval() -> String {
    "30s".to_string()
}

impl MirrorConfig {
    /// Create a minimal config for testing: whole keyspace, identity mapping.
    pub fn for_testing(endpoint: &str) -> Self {
        Self {
            destination: DestinationConfig::new(endpoint),
            prefix: String::new(),
            dest_prefix: None,
            no_dest_prefix: false,
            start_revision: 0,
            max_txn_ops: DEFAULT_MAX_TXN_OPS,
            progress_interval: default_progress_interval(),
            retry: RetrySettings::default(),
        }
    }

    /// Check the configuration before any connection is made.
    pub fn validate(&self) -> Result<()> {
        if self.destination.endpoint.trim().is_empty() {
            return Err(MirrorError::Config(
                "make-mirror takes one destination argument".to_string(),
            ));
        }

        let explicit_dest = self.dest_prefix.as_deref().is_some_and(|p| !p.is_empty());
        if self.no_dest_prefix && explicit_dest {
            return Err(MirrorError::Config(
                "`--dest-prefix` and `--no-dest-prefix` cannot be set at the same time, choose one"
                    .to_string(),
            ));
        }

        if self.max_txn_ops == 0 {
            return Err(MirrorError::Config(
                "max_txn_ops must be at least 1".to_string(),
            ));
        }

        if self.start_revision < 0 {
            return Err(MirrorError::Config(format!(
                "start_revision must not be negative (got {})",
                self.start_revision
            )));
        }

        match humantime::parse_duration(&self.progress_interval) {
            Ok(d) if !d.is_zero() => {}
            _ => {
                return Err(MirrorError::Config(format!(
                    "invalid progress_interval: {:?}",
                    self.progress_interval
                )))
            }
        }

        self.destination.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    /// The resolved prefix mapping for this run.
    pub fn prefix_mapping(&self) -> PrefixMapping {
        PrefixMapping::resolve(&self.prefix, self.dest_prefix.as_deref(), self.no_dest_prefix)
    }

    /// Revision the watch continues after (`start_revision - 1`, floored at 0).
    pub fn watch_from_revision(&self) -> Revision {
        (self.start_revision - 1).max(0)
    }

    /// Whether the run replays a full snapshot before watching.
    pub fn needs_snapshot(&self) -> bool {
        self.watch_from_revision() == 0
    }

    /// Parse `progress_interval`, falling back to 30 seconds.
    pub fn progress_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.progress_interval)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(30))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DestinationConfig: transport parameters for the caller's target store
// ═══════════════════════════════════════════════════════════════════════════════

/// Destination cluster connection parameters.
///
/// The core never dials the destination itself; these settings are carried
/// for the code that builds the [`TargetStore`](crate::target::TargetStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Destination endpoint, e.g. `"10.0.0.5:2379"`.
    pub endpoint: String,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Dial timeout (e.g. "2s").
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout: String,
}

fn default_dial_timeout() -> String {
    "2s".to_string()
}

impl DestinationConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            tls: TlsConfig::default(),
            auth: None,
            dial_timeout: default_dial_timeout(),
        }
    }

    /// Parse the dial timeout string to a Duration.
    pub fn dial_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.dial_timeout).unwrap_or(Duration::from_secs(2))
    }

    fn validate(&self) -> Result<()> {
        self.tls.validate()
    }
}

/// TLS settings for the destination connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Client certificate file.
    #[serde(default)]
    pub cert: Option<String>,

    /// Client key file.
    #[serde(default)]
    pub key: Option<String>,

    /// CA bundle used to verify the destination.
    #[serde(default)]
    pub cacert: Option<String>,

    /// Disable transport security.
    #[serde(default = "default_true")]
    pub insecure_transport: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert: None,
            key: None,
            cacert: None,
            insecure_transport: true,
        }
    }
}

impl TlsConfig {
    /// Whether the destination connection uses TLS.
    pub fn is_secure(&self) -> bool {
        !self.insecure_transport || self.cert.is_some() || self.cacert.is_some()
    }

    fn validate(&self) -> Result<()> {
        match (&self.cert, &self.key) {
            (Some(_), None) => Err(MirrorError::Config(
                "destination TLS certificate given without a key".to_string(),
            )),
            (None, Some(_)) => Err(MirrorError::Config(
                "destination TLS key given without a certificate".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Destination credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    /// Build credentials from `--dest-user` / `--dest-password` style input.
    ///
    /// `user` may carry the password as `name:password`; an explicit
    /// `password` takes precedence and `user` is then used verbatim. An
    /// empty `user` means "no authentication". A user with no password at
    /// all is rejected: prompting is up to the caller.
    pub fn from_user_flags(user: &str, password: Option<&str>) -> Result<Option<Self>> {
        if user.is_empty() {
            return Ok(None);
        }

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            return Ok(Some(Self {
                username: user.to_string(),
                password: password.to_string(),
            }));
        }

        match user.split_once(':') {
            Some((username, password)) => Ok(Some(Self {
                username: username.to_string(),
                password: password.to_string(),
            })),
            None => Err(MirrorError::Config(format!(
                "no password supplied for destination user {:?}",
                user
            ))),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RetrySettings: opt-in bounded retry of target calls
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable retry settings, turned into a [`RetryConfig`].
///
/// The default is a single attempt: write failures are fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per target call (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first retry (e.g. "100ms").
    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,

    /// Ceiling for the exponential backoff (e.g. "5s").
    #[serde(default = "default_max_delay")]
    pub max_delay: String,

    /// Backoff multiplier.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_attempts() -> usize {
    1
}

fn default_initial_delay() -> String {
    "100ms".to_string()
}

fn default_max_delay() -> String {
    "5s".to_string()
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_factor: 2.0,
        }
    }
}

impl RetrySettings {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(MirrorError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.backoff_factor >= 1.0) {
            return Err(MirrorError::Config(format!(
                "retry.backoff_factor must be >= 1.0 (got {})",
                self.backoff_factor
            )));
        }
        for (name, value) in [("initial_delay", &self.initial_delay), ("max_delay", &self.max_delay)] {
            if humantime::parse_duration(value).is_err() {
                return Err(MirrorError::Config(format!(
                    "invalid retry.{}: {:?}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Convert into the runtime retry policy.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: humantime::parse_duration(&self.initial_delay)
                .unwrap_or(Duration::from_millis(100)),
            max_delay: humantime::parse_duration(&self.max_delay)
                .unwrap_or(Duration::from_secs(5)),
            backoff_factor: self.backoff_factor,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
