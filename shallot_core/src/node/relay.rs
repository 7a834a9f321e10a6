/*! Relay side of circuits: admission, forwarding, extension and termination.
*/

use std::sync::Arc;

use futures::channel::mpsc;
use futures::lock::Mutex;
use rand::thread_rng;

use shallot_crypto::*;
use shallot_packet::*;
use shallot_packet::onion::*;

use crate::errors::*;
use crate::node::Node;
use crate::node::circuit_table::*;
use crate::node::session::InboundSession;
use crate::substrate::HandlerTag;

impl Node {
    /// Handle received `BuildRequest` packet and admit the circuit if it's
    /// signed by the node it claims to come from.
    pub async fn handle_build(&self, request: BuildRequest) -> Result<Vec<u8>, HandleRequestError> {
        let KeyPayload { key } = request.wrapped_key.get_payload(self.keys.box_sk())?;
        let origin: CircuitOriginPayload = request.wrapped_circuit.get_payload(self.keys.box_sk())?;

        let upstream = self.directory.resolve(&origin.origin).await
            .map_err(HandleRequestError::Lookup)?;
        if !request.verify(&upstream) {
            warn!("Rejected circuit {} from {}: invalid signature", origin.circuit_id, origin.origin);
            return Err(HandleRequestError::SignatureInvalid);
        }

        match self.circuits.admit(origin.circuit_id, CircuitState::new(key, origin.origin)).await {
            Admission::Added => debug!("Admitted circuit {} from {}", origin.circuit_id, origin.origin),
            Admission::Readmitted => debug!("Circuit {} from {} is admitted already", origin.circuit_id, origin.origin),
            Admission::Conflict => {
                warn!("Rejected circuit {} from {}: id is taken", origin.circuit_id, origin.origin);
                return Err(HandleRequestError::CircuitExists(origin.circuit_id));
            },
        }
        Ok(Vec::new())
    }

    /// Handle received `RelayRequest` packet: peel our layer and act on what
    /// is left.
    pub async fn handle_relay(&self, request: RelayRequest) -> Result<Vec<u8>, HandleRequestError> {
        let header = request.get_header(self.keys.box_sk())?;
        let circuit_id = header.circuit_id;
        let state = self.circuits.get(&circuit_id).await
            .ok_or(HandleRequestError::UnknownCircuit(circuit_id))?;

        let plaintext = {
            let state = state.lock().await;
            peel_layer(&request.ciphertext, &state.key, &header.iv)
                .map_err(|_| HandleRequestError::Decrypt)?
        };

        let packet = classify(plaintext).map_err(|e| {
            debug!("Malformed packet on circuit {}: {}", circuit_id, e);
            HandleRequestError::MalformedPacket(e)
        })?;
        match packet {
            InnerPacket::Relay(onion) => {
                trace!("Relay packet on circuit {}", circuit_id);
                self.forward_onion(circuit_id, &state, header.iv, onion).await
            },
            InnerPacket::Build(build) => {
                trace!("Build packet on circuit {}", circuit_id);
                self.extend_circuit(circuit_id, &state, build).await
            },
            InnerPacket::Finish(finish) => {
                trace!("Finish packet on circuit {}", circuit_id);
                self.finish_circuit(circuit_id, &state, finish).await
            },
            InnerPacket::Content(content) => {
                trace!("Content packet on circuit {}", circuit_id);
                self.deliver_content(circuit_id, &state, content).await
            },
        }
    }

    /// Send onion with our layer peeled to the next hop of the circuit.
    async fn forward_onion(
        &self,
        circuit_id: CircuitId,
        state: &Arc<Mutex<CircuitState>>,
        iv: Iv,
        onion: Vec<u8>
    ) -> Result<Vec<u8>, HandleRequestError> {
        let next = state.lock().await.next
            .ok_or(HandleRequestError::CircuitNotExtended(circuit_id))?;
        let next_identity = self.directory.resolve(&next.node).await
            .map_err(HandleRequestError::Lookup)?;

        let header = SecuredHeaderPayload { circuit_id: next.circuit_id, iv };
        let request = RelayRequest::new(&mut thread_rng(), &next_identity.box_pk, &header, onion);
        let params = request.to_vec()
            .map_err(|_| HandleRequestError::Serialize)?;
        debug!("Forwarding circuit {} to {}", circuit_id, next.node);
        self.substrate.call(&next.node, HandlerTag::Relay, params).await
            .map_err(HandleRequestError::Forward)
    }

    /// Extend the circuit to the next hop named by the originator. Repeated
    /// extension reuses the next hop chosen the first time.
    async fn extend_circuit(
        &self,
        circuit_id: CircuitId,
        state: &Arc<Mutex<CircuitState>>,
        build: BuildPayload
    ) -> Result<Vec<u8>, HandleRequestError> {
        let next = {
            let mut state = state.lock().await;
            match state.next {
                Some(next) => {
                    debug!("Circuit {} is extended to {} already", circuit_id, next.node);
                    next
                },
                None => {
                    let NextHopPayload { next_hop } = build.next_hop.get_payload(self.keys.box_sk())?;
                    let next = NextHop {
                        node: next_hop,
                        circuit_id: CircuitId::random(&mut thread_rng()),
                    };
                    state.next = Some(next);
                    next
                },
            }
        };

        let next_identity = self.directory.resolve(&next.node).await
            .map_err(HandleRequestError::Lookup)?;
        let request = {
            let mut rng = thread_rng();
            let origin = CircuitOriginPayload { circuit_id: next.circuit_id, origin: self.dht_key() };
            BuildRequest::new(&self.keys, build.key, origin.seal(&mut rng, &next_identity.box_pk))
        };
        let params = request.to_vec()
            .map_err(|_| HandleRequestError::Serialize)?;
        debug!("Extending circuit {} to {} as {}", circuit_id, next.node, next.circuit_id);
        self.substrate.call(&next.node, HandlerTag::Build, params).await
            .map_err(HandleRequestError::Forward)
    }

    /// Terminate the circuit on this node and announce a new inbound session.
    /// Repeated finish from the same entry keeps the existing session.
    async fn finish_circuit(
        &self,
        circuit_id: CircuitId,
        state: &Arc<Mutex<CircuitState>>,
        finish: FinishPayload
    ) -> Result<Vec<u8>, HandleRequestError> {
        let session = {
            let mut state = state.lock().await;
            if let Some(ref link) = state.session {
                if link.entry == finish.origin {
                    debug!("Circuit {} is finished already", circuit_id);
                    return Ok(Vec::new());
                }
                warn!("Rejected finish of circuit {} from {}: finished by {}", circuit_id, finish.origin, link.entry);
                return Err(HandleRequestError::CircuitFinished(circuit_id));
            }

            let (data_tx, data_rx) = mpsc::unbounded();
            state.session = Some(InboundLink {
                entry: finish.origin,
                data_tx,
            });
            InboundSession::new(circuit_id, finish.origin, data_rx)
        };

        info!("Inbound circuit {} from {}", circuit_id, finish.origin);
        self.announce_inbound(session).await;
        Ok(Vec::new())
    }

    /// Pass data to the session of a circuit finished on this node.
    async fn deliver_content(
        &self,
        circuit_id: CircuitId,
        state: &Arc<Mutex<CircuitState>>,
        content: ContentPayload
    ) -> Result<Vec<u8>, HandleRequestError> {
        let state = state.lock().await;
        let session = state.session.as_ref()
            .ok_or(HandleRequestError::NoSession(circuit_id))?;
        session.data_tx.unbounded_send(content.payload)
            .map_err(|_| HandleRequestError::NoSession(circuit_id))?;
        Ok(Vec::new())
    }
}
