/*! Circuits passing through a node.
*/

use std::collections::HashMap;
use std::sync::Arc;

use futures::channel::mpsc;
use futures::lock::Mutex;
use tokio::sync::RwLock;

use shallot_crypto::*;

/// Where a circuit continues after this node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NextHop {
    /// `DhtKey` of the next node
    pub node: DhtKey,
    /// Id of the circuit on the next node
    pub circuit_id: CircuitId,
}

/// Receiving end of a circuit that terminates on this node.
#[derive(Clone, Debug)]
pub struct InboundLink {
    /// Entry of the circuit as declared by the originator
    pub entry: DhtKey,
    /// Sink for data arrived via the circuit
    pub data_tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// State of a single circuit on a node.
#[derive(Debug)]
pub struct CircuitState {
    /// Key of the layer this node peels
    pub key: LayerKey,
    /// Node the circuit came from
    pub prev_hop: DhtKey,
    /// Set once the circuit is extended through this node
    pub next: Option<NextHop>,
    /// Set once the circuit is finished on this node
    pub session: Option<InboundLink>,
}

impl CircuitState {
    /// Create state of a just admitted circuit.
    pub fn new(key: LayerKey, prev_hop: DhtKey) -> CircuitState {
        CircuitState {
            key,
            prev_hop,
            next: None,
            session: None,
        }
    }

    /// Get copy of everything known about the circuit except the key.
    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            prev_hop: self.prev_hop,
            next: self.next,
            entry: self.session.as_ref().map(|session| session.entry),
        }
    }
}

/// What a node knows about a circuit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CircuitSnapshot {
    /// Node the circuit came from
    pub prev_hop: DhtKey,
    /// Where the circuit continues
    pub next: Option<NextHop>,
    /// Declared entry if the circuit ends here
    pub entry: Option<DhtKey>,
}

impl CircuitSnapshot {
    /// Check if the node knows about `key` from this circuit.
    pub fn references(&self, key: &DhtKey) -> bool {
        self.prev_hop == *key
            || self.next.map_or(false, |next| next.node == *key)
            || self.entry.as_ref() == Some(key)
    }
}

/// Result of admitting a circuit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    /// New circuit was added.
    Added,
    /// The same node admitted the circuit before. Its state is kept.
    Readmitted,
    /// Another node uses this circuit id.
    Conflict,
}

/// Circuits of a node by their local ids. Every circuit has its own lock so
/// requests of one circuit are serialized while different circuits proceed
/// in parallel.
#[derive(Clone, Default)]
pub struct CircuitTable {
    circuits: Arc<RwLock<HashMap<CircuitId, Arc<Mutex<CircuitState>>>>>,
}

impl CircuitTable {
    /// Create new empty `CircuitTable`.
    pub fn new() -> CircuitTable {
        CircuitTable::default()
    }

    /// Add circuit unless it's known already.
    pub async fn admit(&self, circuit_id: CircuitId, state: CircuitState) -> Admission {
        let mut circuits = self.circuits.write().await;
        if let Some(existing) = circuits.get(&circuit_id) {
            return if existing.lock().await.prev_hop == state.prev_hop {
                Admission::Readmitted
            } else {
                Admission::Conflict
            };
        }
        circuits.insert(circuit_id, Arc::new(Mutex::new(state)));
        Admission::Added
    }

    /// Get circuit by its local id.
    pub async fn get(&self, circuit_id: &CircuitId) -> Option<Arc<Mutex<CircuitState>>> {
        self.circuits.read().await.get(circuit_id).cloned()
    }

    /// Ids of all circuits.
    pub async fn ids(&self) -> Vec<CircuitId> {
        self.circuits.read().await.keys().copied().collect()
    }

    /// Number of circuits.
    pub async fn len(&self) -> usize {
        self.circuits.read().await.len()
    }

    /// Get what is known about a circuit.
    pub async fn snapshot(&self, circuit_id: &CircuitId) -> Option<CircuitSnapshot> {
        let state = self.get(circuit_id).await?;
        let snapshot = state.lock().await.snapshot();
        Some(snapshot)
    }
}
