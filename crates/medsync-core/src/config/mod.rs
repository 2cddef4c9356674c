//! Sync configuration shared by client apps.
//!
//! `SyncSettings` carries the remote endpoint, the owner whose records are
//! synced, and the engine's timing knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::OwnerId;
use crate::util::{is_http_url, normalize_text_option};

/// Default periodic sync interval
pub const DEFAULT_PERIODIC_INTERVAL_SECS: u64 = 300;
/// Default per-request timeout for the HTTP remote store
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
/// Default reachability poll interval
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Runtime sync configuration.
///
/// The bearer token is a credential: it is never logged and `Debug` redacts it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    pub remote_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub owner_id: OwnerId,
    #[serde(default = "default_periodic_interval_secs")]
    pub periodic_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl SyncSettings {
    /// Build settings with default timings.
    pub fn new(remote_url: impl Into<String>, owner_id: OwnerId) -> Result<Self> {
        let settings = Self {
            remote_url: remote_url.into().trim().trim_end_matches('/').to_string(),
            auth_token: None,
            owner_id,
            periodic_interval_secs: DEFAULT_PERIODIC_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        };
        settings.validate()?;
        Ok(settings)
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = normalize_text_option(token);
        self
    }

    #[must_use]
    pub const fn with_periodic_interval(mut self, interval: Duration) -> Self {
        self.periodic_interval_secs = interval.as_secs();
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.remote_url) {
            return Err(Error::Config(format!(
                "remote URL must include http:// or https://, got '{}'",
                self.remote_url
            )));
        }
        for (name, secs) in [
            ("periodic interval", self.periodic_interval_secs),
            ("request timeout", self.request_timeout_secs),
            ("poll interval", self.poll_interval_secs),
        ] {
            if secs == 0 {
                return Err(Error::Config(format!("{name} must be at least one second")));
            }
        }
        Ok(())
    }

    pub const fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl std::fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSettings")
            .field("remote_url", &self.remote_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("owner_id", &self.owner_id)
            .field("periodic_interval_secs", &self.periodic_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .finish()
    }
}

const fn default_periodic_interval_secs() -> u64 {
    DEFAULT_PERIODIC_INTERVAL_SECS
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
