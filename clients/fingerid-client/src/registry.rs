// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Registry of live clients.
//!
//! Lets a network settings change (e.g. a new proxy) reach every open
//! client without callers keeping track of them. The registry only holds
//! weak references: a client lives as long as its [`ClientHandle`] and
//! whatever it was shared with, and closing or dropping the handle removes
//! the entry.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, warn};

use crate::client::FingerIdClient;
use crate::config::{NetworkConfig, SharedNetworkConfig};
use crate::error::ClientError;

/// Outcome of broadcasting a reconnect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectSummary {
    pub reconnected: usize,
    pub failed: usize,
}

pub struct ClientRegistry {
    config: SharedNetworkConfig,
    clients: Mutex<BTreeMap<u64, Weak<FingerIdClient>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new(config: NetworkConfig) -> Arc<Self> {
        Arc::new(Self {
            config: SharedNetworkConfig::new(config),
            clients: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &SharedNetworkConfig {
        &self.config
    }

    fn clients(&self) -> MutexGuard<'_, BTreeMap<u64, Weak<FingerIdClient>>> {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build a client on the shared settings and start tracking it
    pub fn create(self: &Arc<Self>) -> Result<ClientHandle, ClientError> {
        let client = Arc::new(FingerIdClient::new(self.config.clone())?);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients().insert(id, Arc::downgrade(&client));
        debug!(client_id = id, "Registered client");

        Ok(ClientHandle {
            id,
            client,
            registry: Arc::downgrade(self),
        })
    }

    /// Stop tracking client `id`. Returns whether it was tracked.
    pub fn remove(&self, id: u64) -> bool {
        let removed = self.clients().remove(&id).is_some();
        if removed {
            debug!(client_id = id, "Deregistered client");
        }
        removed
    }

    /// Number of tracked clients that are still alive
    pub fn len(&self) -> usize {
        self.clients()
            .values()
            .filter(|client| client.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live clients at this instant. Dead entries are pruned.
    fn snapshot(&self) -> Vec<(u64, Arc<FingerIdClient>)> {
        let mut clients = self.clients();
        clients.retain(|_, client| client.strong_count() > 0);
        clients
            .iter()
            .filter_map(|(id, client)| client.upgrade().map(|c| (*id, c)))
            .collect()
    }

    /// Reconnect every client registered when the call started.
    ///
    /// Runs on a snapshot, so clients can be created and removed meanwhile.
    /// A failed reconnect is logged and the rest carry on.
    pub async fn reconnect_all(&self) -> ReconnectSummary {
        let snapshot = self.snapshot();
        let mut summary = ReconnectSummary::default();

        for (id, client) in snapshot {
            if client.transport().reconnect().await {
                summary.reconnected += 1;
            } else {
                warn!(client_id = id, "Client could not be reconnected");
                summary.failed += 1;
            }
        }

        info!(
            reconnected = summary.reconnected,
            failed = summary.failed,
            "Reconnected registered clients"
        );
        summary
    }

    /// Replace the shared network settings and reconnect everyone onto them
    pub async fn apply_config(&self, config: NetworkConfig) -> ReconnectSummary {
        self.config.replace(config);
        self.reconnect_all().await
    }
}

/// Owning handle for a registered client.
///
/// Derefs to [`FingerIdClient`]. [`ClientHandle::shared`] hands out extra
/// references (e.g. for a job runner); those keep the client alive but not
/// registered once the handle is gone.
pub struct ClientHandle {
    id: u64,
    client: Arc<FingerIdClient>,
    registry: Weak<ClientRegistry>,
}

impl ClientHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shared(&self) -> Arc<FingerIdClient> {
        Arc::clone(&self.client)
    }

    /// Deregister and close the transport
    pub async fn close(self) {
        self.deregister();
        self.client.transport().close().await;
    }

    fn deregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl Deref for ClientHandle {
    type Target = FingerIdClient;

    fn deref(&self) -> &FingerIdClient {
        &self.client
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.deregister();
    }
}
