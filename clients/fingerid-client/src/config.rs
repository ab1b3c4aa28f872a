// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Network, polling and runner configuration

use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{EnumString, VariantNames};
use thiserror::Error;
use url::Url;

/// Public CSI:FingerID deployment
pub const DEFAULT_BASE_URL: &str = "https://bio.informatik.uni-jena.de/csi-fingerid";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("custom proxy mode requires a proxy URL")]
    MissingProxyUrl,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Proxy
// ============================================================================

/// How outgoing connections reach the service
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProxyMode {
    /// Honour `HTTP_PROXY` / `HTTPS_PROXY` from the environment
    #[default]
    System,
    /// Connect directly
    None,
    /// Use [`ProxyConfig::url`]
    Custom,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub mode: ProxyMode,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("mode", &self.mode)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// Network
// ============================================================================

/// Settings every transport is (re)built from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub base_url: String,
    pub proxy: ProxyConfig,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy: ProxyConfig::default(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            user_agent: concat!("fingerid-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl NetworkConfig {
    /// Config pointing at `base_url` with every other field defaulted
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `FINGERID_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("FINGERID_URL") {
            config.base_url = url;
        }

        config.proxy.url = lookup("FINGERID_PROXY").filter(|s| !s.trim().is_empty());
        config.proxy.username = lookup("FINGERID_PROXY_USER").filter(|s| !s.is_empty());
        config.proxy.password = lookup("FINGERID_PROXY_PASSWORD").filter(|s| !s.is_empty());
        config.proxy.mode = match lookup("FINGERID_PROXY_MODE") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "FINGERID_PROXY_MODE",
                value,
            })?,
            // An explicit proxy URL implies custom mode
            None if config.proxy.url.is_some() => ProxyMode::Custom,
            None => ProxyMode::System,
        };

        config.connect_timeout_secs = parse_secs(
            &lookup,
            "FINGERID_CONNECT_TIMEOUT_SECS",
            config.connect_timeout_secs,
        )?;
        config.request_timeout_secs = parse_secs(
            &lookup,
            "FINGERID_REQUEST_TIMEOUT_SECS",
            config.request_timeout_secs,
        )?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file. Missing fields take defaults.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.proxy.mode == ProxyMode::Custom && self.proxy.url.is_none() {
            return Err(ConfigError::MissingProxyUrl);
        }
        Ok(())
    }

    /// Base URL with a trailing slash, so relative endpoint paths join
    /// underneath it instead of replacing its last segment.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        None => Ok(default),
    }
}

/// The active [`NetworkConfig`], shared between a registry and every
/// transport it created.
#[derive(Clone, Debug, Default)]
pub struct SharedNetworkConfig(Arc<RwLock<NetworkConfig>>);

impl SharedNetworkConfig {
    pub fn new(config: NetworkConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> NetworkConfig {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in new settings. Existing transports pick them up on their next
    /// reconnect.
    pub fn replace(&self, config: NetworkConfig) {
        *self
            .0
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }
}

// ============================================================================
// Polling and runner
// ============================================================================

/// Attempt budget and backoff for polling one job.
///
/// The delay before attempt `n` (0-based) is `base_delay + n * delay_increment`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub delay_increment_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 600,
            base_delay_ms: 3000,
            delay_increment_ms: 30,
        }
    }
}

impl PollPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let increment = self.delay_increment_ms.saturating_mul(u64::from(attempt));
        Duration::from_millis(self.base_delay_ms.saturating_add(increment))
    }

    /// Total time spent sleeping if every attempt comes back pending
    pub fn total_budget(&self) -> Duration {
        (0..self.max_attempts)
            .map(|attempt| self.delay_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Jobs allowed to be submitted or polling at the same time
    pub max_concurrent_jobs: usize,
    pub poll: PollPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            poll: PollPolicy::default(),
        }
    }
}

impl RunnerConfig {
    /// Defaults, with `FINGERID_MAX_JOBS` overriding the pool size
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("FINGERID_MAX_JOBS") {
            config.max_concurrent_jobs = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidEnv {
                    name: "FINGERID_MAX_JOBS",
                    value,
                })?;
        }
        Ok(config)
    }
}
