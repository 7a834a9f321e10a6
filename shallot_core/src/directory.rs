/*! Cache of verified identities.

An identity is published in the DHT under its own `DhtKey` which is the hash
of the identity. Since the key can't match a different identity, cached
entries never expire. They are only evicted when the cache is full.
*/

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::lock::Mutex;
use lru::LruCache;

use shallot_crypto::*;

use crate::errors::*;
use crate::substrate::Substrate;

type LookupFuture = Shared<BoxFuture<'static, Result<PublicIdentity, LookupError>>>;

struct DirectoryState {
    /// Verified identities.
    cache: LruCache<DhtKey, PublicIdentity>,
    /// Lookups that are not finished yet. Concurrent requests for the same
    /// key wait for the same lookup.
    in_flight: HashMap<DhtKey, LookupFuture>,
}

/// Resolves `DhtKey`s to verified `PublicIdentity`s.
#[derive(Clone)]
pub struct IdentityDirectory {
    substrate: Arc<dyn Substrate>,
    state: Arc<Mutex<DirectoryState>>,
}

impl IdentityDirectory {
    /// Create new `IdentityDirectory` holding up to `capacity` identities.
    pub fn new(substrate: Arc<dyn Substrate>, capacity: usize) -> IdentityDirectory {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        IdentityDirectory {
            substrate,
            state: Arc::new(Mutex::new(DirectoryState {
                cache: LruCache::new(capacity),
                in_flight: HashMap::new(),
            })),
        }
    }

    /// Get identity published under `key` checking that its hash is `key`.
    pub async fn resolve(&self, key: &DhtKey) -> Result<PublicIdentity, LookupError> {
        let lookup = {
            let mut state = self.state.lock().await;
            if let Some(identity) = state.cache.get(key) {
                return Ok(identity.clone());
            }
            if let Some(lookup) = state.in_flight.get(key) {
                trace!("Joining lookup of identity {}", key);
                lookup.clone()
            } else {
                let lookup = IdentityDirectory::lookup(self.substrate.clone(), *key).boxed().shared();
                state.in_flight.insert(*key, lookup.clone());
                lookup
            }
        };

        let result = lookup.await;

        let mut state = self.state.lock().await;
        // a newer lookup might be started after this one failed
        if state.in_flight.get(key).map_or(false, |lookup| lookup.peek().is_some()) {
            state.in_flight.remove(key);
        }
        if let Ok(ref identity) = result {
            state.cache.put(*key, identity.clone());
        }
        result
    }

    /// Check whether identity for `key` is cached.
    pub async fn is_cached(&self, key: &DhtKey) -> bool {
        self.state.lock().await.cache.contains(key)
    }

    async fn lookup(substrate: Arc<dyn Substrate>, key: DhtKey) -> Result<PublicIdentity, LookupError> {
        debug!("Looking up identity {}", key);
        let bytes = substrate.lookup_item(&key).await
            .map_err(LookupError::Call)?
            .ok_or(LookupError::NotFound(key))?;
        if DhtKey::digest(&bytes) != key {
            warn!("Identity published under {} has a different hash", key);
            return Err(LookupError::IdentityMismatch(key));
        }
        PublicIdentity::from_slice(&bytes).ok_or(LookupError::InvalidIdentity(key))
    }
}
