// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Proxy-aware HTTP transport with replace-on-reconnect.
//!
//! A [`Transport`] owns one `reqwest::Client`. Requests borrow it through a
//! [`Lease`], a shared read guard held for the whole request including the
//! response body. [`Transport::reconnect`] and [`Transport::close`] take the
//! exclusive side of the same lock, so they wait for in-flight requests and
//! no request ever straddles an old and a new client.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

use crate::config::{NetworkConfig, ProxyMode, SharedNetworkConfig};
use crate::error::ClientError;

/// Shared borrow of the live HTTP client
pub type Lease<'a> = RwLockReadGuard<'a, reqwest::Client>;

struct State {
    http: Option<reqwest::Client>,
    closed: bool,
}

pub struct Transport {
    config: SharedNetworkConfig,
    state: RwLock<State>,
    /// Bumped every time a new client is installed
    generation: AtomicU64,
}

impl Transport {
    /// Build a transport from the current shared settings.
    pub fn new(config: SharedNetworkConfig) -> Result<Self, ClientError> {
        let http = build_http_client(&config.snapshot())?;
        Ok(Self {
            config,
            state: RwLock::new(State {
                http: Some(http),
                closed: false,
            }),
            generation: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &SharedNetworkConfig {
        &self.config
    }

    /// Number of clients this transport has installed so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Borrow the current client for one request.
    ///
    /// Waits while a reconnect is in progress.
    pub async fn lease(&self) -> Result<Lease<'_>, ClientError> {
        let guard = self.state.read().await;
        if guard.closed {
            return Err(ClientError::Connectivity("transport is closed".to_string()));
        }
        RwLockReadGuard::try_map(guard, |state| state.http.as_ref()).map_err(|_| {
            ClientError::Connectivity("transport has no client, reconnect failed".to_string())
        })
    }

    /// Check that the service answers. On failure, reconnect once and check
    /// again. Never fails; problems are logged.
    pub async fn probe(&self) -> bool {
        if self.check().await {
            return true;
        }
        warn!("Prediction service unreachable, reconnecting");
        self.reconnect().await;
        let reachable = self.check().await;
        if !reachable {
            warn!("Prediction service still unreachable after reconnect");
        }
        reachable
    }

    /// `HEAD` the base URL. Any HTTP answer counts as reachable.
    async fn check(&self) -> bool {
        let config = self.config.snapshot();
        let url = match config.base_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot probe, base URL is invalid");
                return false;
            }
        };
        let client = match self.lease().await {
            Ok(client) => client,
            Err(e) => {
                debug!(error = %e, "No client to probe with");
                return false;
            }
        };
        match client
            .head(url.clone())
            .timeout(config.probe_timeout())
            .send()
            .await
        {
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Probe answered");
                true
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Probe failed");
                false
            }
        }
    }

    /// Drop the current client and install a fresh one built from the
    /// current shared settings.
    ///
    /// Returns whether a new client is in place. Failures are logged and
    /// leave the transport without a client until the next reconnect.
    pub async fn reconnect(&self) -> bool {
        let mut state = self.state.write().await;
        if state.closed {
            debug!("Ignoring reconnect of a closed transport");
            return false;
        }

        // Dropping the client closes its idle connections
        state.http = None;

        match build_http_client(&self.config.snapshot()) {
            Ok(http) => {
                state.http = Some(http);
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!(generation, "Transport reconnected");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to rebuild HTTP client, transport disconnected");
                false
            }
        }
    }

    /// Release the client. Further leases fail. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if state.closed {
            return;
        }
        state.closed = true;
        state.http = None;
        debug!("Transport closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }
}

/// Install the process-wide rustls provider. Safe to call repeatedly.
fn install_crypto_provider() {
    // Fails only when a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Build a `reqwest::Client` for `config`.
pub fn build_http_client(config: &NetworkConfig) -> Result<reqwest::Client, ClientError> {
    install_crypto_provider();
    config.validate()?;

    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.clone());

    builder = match config.proxy.mode {
        ProxyMode::System => builder,
        ProxyMode::None => builder.no_proxy(),
        ProxyMode::Custom => {
            let url = config.proxy.url.as_deref().unwrap_or_default();
            let mut proxy = reqwest::Proxy::all(url).map_err(ClientError::Http)?;
            if let Some(username) = config.proxy.username.as_deref() {
                proxy = proxy.basic_auth(username, config.proxy.password.as_deref().unwrap_or(""));
            }
            builder.proxy(proxy)
        }
    };

    builder.build().map_err(ClientError::Http)
}
