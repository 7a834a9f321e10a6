/*! In-process DHT substrate.

Nodes form a ring ordered by their `DhtKey`s. The successor of a key is the
first node whose key is not less than it, wrapping around the ring. Published
values are visible to every node. Calls are dispatched directly to the
handler of the node, bounded by the call timeout and repeated on timeout.
*/

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};

use shallot_crypto::*;

use crate::config::Config;
use crate::errors::*;
use crate::substrate::*;

#[derive(Default)]
struct NetworkState {
    /// Nodes of the ring with their request handlers.
    nodes: BTreeMap<DhtKey, Arc<dyn RequestHandler>>,
    /// Published values.
    items: HashMap<DhtKey, Vec<u8>>,
    /// How many times every key was looked up.
    lookups: HashMap<DhtKey, usize>,
    /// Delay of every substrate operation.
    latency: Duration,
}

impl NetworkState {
    fn successor(&self, key: &DhtKey) -> Option<DhtKey> {
        self.nodes.range(key ..)
            .next()
            .or_else(|| self.nodes.iter().next())
            .map(|(node, _)| *node)
    }
}

/// In-process network of nodes.
#[derive(Clone, Default)]
pub struct MemNetwork {
    state: Arc<RwLock<NetworkState>>,
}

impl MemNetwork {
    /// Create new empty `MemNetwork`.
    pub fn new() -> MemNetwork {
        MemNetwork::default()
    }

    /// Create a substrate handle for a node using timeouts from `config`.
    pub fn endpoint(&self, config: &Config) -> MemEndpoint {
        MemEndpoint {
            network: Arc::downgrade(&self.state),
            call_timeout: config.call_timeout,
            max_call_retries: config.max_call_retries,
        }
    }

    /// Add node to the ring. Requests to `key` will be handled by `handler`.
    pub async fn join(&self, key: DhtKey, handler: Arc<dyn RequestHandler>) {
        debug!("Node {} joined the network", key);
        self.state.write().await.nodes.insert(key, handler);
    }

    /// Remove node from the ring.
    pub async fn leave(&self, key: &DhtKey) {
        debug!("Node {} left the network", key);
        self.state.write().await.nodes.remove(key);
    }

    /// Publish `value` under `key`.
    pub async fn publish(&self, key: DhtKey, value: Vec<u8>) {
        self.state.write().await.items.insert(key, value);
    }

    /// Publish identity under its own `DhtKey`.
    pub async fn publish_identity(&self, identity: &PublicIdentity) {
        self.publish(identity.dht_key(), identity.to_bytes().to_vec()).await
    }

    /// Set delay of every substrate operation.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    /// Number of times `key` was looked up.
    pub async fn lookup_count(&self, key: &DhtKey) -> usize {
        self.state.read().await.lookups.get(key).copied().unwrap_or(0)
    }

    /// Keys of all nodes in ring order.
    pub async fn nodes(&self) -> Vec<DhtKey> {
        self.state.read().await.nodes.keys().copied().collect()
    }
}

/// Substrate handle of a single node in `MemNetwork`.
#[derive(Clone)]
pub struct MemEndpoint {
    network: Weak<RwLock<NetworkState>>,
    call_timeout: Duration,
    max_call_retries: u32,
}

impl MemEndpoint {
    async fn state(&self, node: &DhtKey) -> Result<Arc<RwLock<NetworkState>>, CallError> {
        let state = self.network.upgrade().ok_or(CallError::Unreachable(*node))?;
        let latency = state.read().await.latency;
        if latency > Duration::ZERO {
            sleep(latency).await;
        }
        Ok(state)
    }

    async fn dispatch(&self, node: &DhtKey, tag: HandlerTag, params: Vec<u8>) -> Result<Vec<u8>, CallError> {
        let state = self.state(node).await?;
        let handler = state.read().await.nodes.get(node).cloned();
        let handler = handler.ok_or(CallError::Unreachable(*node))?;
        handler.handle_request(tag, params).await.map_err(CallError::from)
    }
}

#[async_trait]
impl Substrate for MemEndpoint {
    async fn find_successor(&self, key: &DhtKey) -> Result<DhtKey, CallError> {
        let state = self.state(key).await?;
        let state = state.read().await;
        state.successor(key).ok_or(CallError::Unreachable(*key))
    }

    async fn lookup_item(&self, key: &DhtKey) -> Result<Option<Vec<u8>>, CallError> {
        let state = self.state(key).await?;
        let mut state = state.write().await;
        *state.lookups.entry(*key).or_insert(0) += 1;
        Ok(state.items.get(key).cloned())
    }

    async fn call(&self, node: &DhtKey, tag: HandlerTag, params: Vec<u8>) -> Result<Vec<u8>, CallError> {
        for attempt in 0 ..= self.max_call_retries {
            match timeout(self.call_timeout, self.dispatch(node, tag, params.clone())).await {
                Ok(result) => return result,
                Err(_) => debug!("Call '{}' to {} timed out, attempt {}", tag, node, attempt + 1),
            }
        }
        Err(CallError::Timeout)
    }
}
