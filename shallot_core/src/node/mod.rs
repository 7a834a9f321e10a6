/*!
Node of the shallot overlay. It builds circuits to other nodes and relays
circuits of others.

Circuit build is telescoping: the originator admits the circuit on the first
hop directly and then extends it one hop at a time by sending extension
requests through the part of the circuit that is already built. Every hop
knows only its neighbours on the circuit.
*/

pub mod circuit_table;
pub mod session;
mod builder;
mod relay;

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use nom::combinator::all_consuming;
use tokio::sync::RwLock;

use shallot_binary_io::*;
use shallot_crypto::*;
use shallot_packet::*;

use crate::config::Config;
use crate::directory::IdentityDirectory;
use crate::errors::*;
use crate::substrate::*;
use self::circuit_table::*;
use self::session::*;

/// Sink for circuits that end on this node.
#[derive(Default)]
struct InboundState {
    /// Sink set by the application.
    sink: Option<mpsc::UnboundedSender<InboundSession>>,
    /// Sessions finished while there was no sink. Their data is buffered.
    pending: Vec<InboundSession>,
}

impl InboundState {
    /// Pass session to the sink or keep it until a sink is set.
    fn announce(&mut self, session: InboundSession) {
        let session = match self.sink {
            Some(ref sink) => match sink.unbounded_send(session) {
                Ok(()) => return,
                Err(e) => e.into_inner(),
            },
            None => session,
        };
        if self.sink.take().is_some() {
            warn!("Inbound sink is dropped, circuit {} waits for a new one", session.circuit_id());
        } else {
            debug!("No inbound sink, circuit {} waits for it", session.circuit_id());
        }
        self.pending.push(session);
    }
}

/// Own node data.
#[derive(Clone)]
pub struct Node {
    /// Own keys.
    keys: NodeKeys,
    /// DHT the node works on.
    substrate: Arc<dyn Substrate>,
    /// Verified identities of other nodes.
    directory: IdentityDirectory,
    /// Circuits passing through this node.
    circuits: CircuitTable,
    /// Protocol settings.
    config: Config,
    /// Sink for circuits that end on this node.
    inbound: Arc<RwLock<InboundState>>,
}

impl Node {
    /// Create new `Node`.
    pub fn new(keys: NodeKeys, substrate: Arc<dyn Substrate>, config: Config) -> Node {
        let directory = IdentityDirectory::new(substrate.clone(), config.identity_cache_size);
        Node {
            keys,
            substrate,
            directory,
            circuits: CircuitTable::new(),
            config,
            inbound: Arc::new(RwLock::new(InboundState::default())),
        }
    }

    /// Identity other nodes should find under our `DhtKey`.
    pub fn public_identity(&self) -> PublicIdentity {
        self.keys.public()
    }

    /// Own `DhtKey`.
    pub fn dht_key(&self) -> DhtKey {
        self.keys.dht_key()
    }

    /// Protocol settings.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set sink for circuits finished on this node. Circuits finished before
    /// are passed to it right away.
    pub async fn set_inbound_sink(&self, inbound_sink: mpsc::UnboundedSender<InboundSession>) {
        let mut inbound = self.inbound.write().await;
        inbound.sink = Some(inbound_sink);
        for session in mem::take(&mut inbound.pending) {
            inbound.announce(session);
        }
    }

    /// Pass session of a circuit finished on this node to the application.
    pub(crate) async fn announce_inbound(&self, session: InboundSession) {
        self.inbound.write().await.announce(session);
    }

    /// Ids of all circuits passing through this node.
    pub async fn circuit_ids(&self) -> Vec<CircuitId> {
        self.circuits.ids().await
    }

    /// Get what this node knows about a circuit.
    pub async fn circuit_snapshot(&self, circuit_id: &CircuitId) -> Option<CircuitSnapshot> {
        self.circuits.snapshot(circuit_id).await
    }
}

#[async_trait]
impl RequestHandler for Node {
    async fn handle_request(&self, tag: HandlerTag, params: Vec<u8>) -> Result<Vec<u8>, HandleRequestError> {
        match tag {
            HandlerTag::Build => {
                let (_, request) = all_consuming(BuildRequest::from_bytes)(&params)
                    .map_err(|_| HandleRequestError::Deserialize)?;
                self.handle_build(request).await
            },
            HandlerTag::Relay => {
                let (_, request) = all_consuming(RelayRequest::from_bytes)(&params)
                    .map_err(|_| HandleRequestError::Deserialize)?;
                self.handle_relay(request).await
            },
        }
    }
}
