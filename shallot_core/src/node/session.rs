/*! Ends of an established circuit.
*/

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{Stream, StreamExt};

use shallot_crypto::*;
use shallot_packet::onion::*;

use crate::errors::*;
use crate::node::Node;

/** Originator side of a circuit.

Data sent through the session is wrapped with the keys of all hops and relayed
to the destination. The first failed send closes the session. Relays are not
notified about it and keep their circuit states.
*/
pub struct Session {
    node: Node,
    route: Vec<PublicIdentity>,
    keys: Vec<LayerKey>,
    circuit_id: CircuitId,
    closed: AtomicBool,
    close_sink: Option<mpsc::UnboundedSender<DhtKey>>,
}

impl Session {
    pub(crate) fn new(node: Node, route: Vec<PublicIdentity>, keys: Vec<LayerKey>, circuit_id: CircuitId) -> Session {
        Session {
            node,
            route,
            keys,
            circuit_id,
            closed: AtomicBool::new(false),
            close_sink: None,
        }
    }

    /// Set sink that receives `DhtKey` of the destination when the session
    /// is closed.
    pub fn set_close_sink(&mut self, close_sink: mpsc::UnboundedSender<DhtKey>) {
        self.close_sink = Some(close_sink);
    }

    /// Send data to the destination.
    pub async fn send(&self, data: &[u8]) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }

        let packet = InnerPacket::Content(ContentPayload { payload: data.to_vec() });
        match self.node.send_onion(&self.route[0], self.circuit_id, &self.keys, &packet).await {
            Ok(_) => Ok(()),
            Err(error) => {
                warn!("Failed to send data to {}: {}", self.destination(), error);
                self.close();
                Err(SendError::Call(error))
            },
        }
    }

    /// Check whether the session was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// `DhtKey` of the destination.
    pub fn destination(&self) -> DhtKey {
        self.route[self.route.len() - 1].dht_key()
    }

    /// Identities of all hops, destination is the last one.
    pub fn route(&self) -> &[PublicIdentity] {
        &self.route
    }

    /// Id of the circuit on the first hop.
    pub fn circuit_id(&self) -> CircuitId {
        self.circuit_id
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(ref close_sink) = self.close_sink {
            if close_sink.unbounded_send(self.destination()).is_err() {
                debug!("Close sink of session to {} is dropped", self.destination());
            }
        }
    }
}

/** Destination side of a circuit.

Yields data in the order it was relayed by the last hop.
*/
pub struct InboundSession {
    circuit_id: CircuitId,
    entry: DhtKey,
    data_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl InboundSession {
    pub(crate) fn new(circuit_id: CircuitId, entry: DhtKey, data_rx: mpsc::UnboundedReceiver<Vec<u8>>) -> InboundSession {
        InboundSession {
            circuit_id,
            entry,
            data_rx,
        }
    }

    /// Id of the circuit on this node.
    pub fn circuit_id(&self) -> CircuitId {
        self.circuit_id
    }

    /// Entry of the circuit as declared by the originator.
    pub fn entry(&self) -> DhtKey {
        self.entry
    }
}

impl Stream for InboundSession {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Vec<u8>>> {
        self.data_rx.poll_next_unpin(cx)
    }
}
