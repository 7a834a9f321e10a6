/*! Errors enums for circuits and the substrate.
*/

use thiserror::Error;

use shallot_crypto::*;
use shallot_packet::{GetPayloadError, MalformedPacketError};

/// Error that can happen when calling another node through the substrate.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CallError {
    /// Node didn't respond in time after all retries.
    #[error("Call timed out")]
    Timeout,
    /// There is no node with such key in the network.
    #[error("Node {0} is unreachable")]
    Unreachable(DhtKey),
    /// Node responded with an error.
    #[error("Remote error: {0}")]
    Remote(Box<HandleRequestError>),
}

impl CallError {
    /// Get the error returned by the last node that was reached. A relay that
    /// failed to forward a request wraps the error of the next hop, so this
    /// walks the chain of such wrappers.
    pub fn remote_cause(&self) -> Option<&HandleRequestError> {
        let mut cause = match self {
            CallError::Remote(error) => error.as_ref(),
            _ => return None,
        };
        while let HandleRequestError::Forward(CallError::Remote(error)) = cause {
            cause = error.as_ref();
        }
        Some(cause)
    }
}

impl From<HandleRequestError> for CallError {
    fn from(error: HandleRequestError) -> CallError {
        CallError::Remote(Box::new(error))
    }
}

/// Error that can happen when resolving an identity by its `DhtKey`.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum LookupError {
    /// Nothing is published under the key.
    #[error("No identity published under {0}")]
    NotFound(DhtKey),
    /// Hash of the published identity is not the key.
    #[error("Identity published under {0} doesn't match the key")]
    IdentityMismatch(DhtKey),
    /// Published bytes are not an identity.
    #[error("Invalid identity published under {0}")]
    InvalidIdentity(DhtKey),
    /// Substrate call failed.
    #[error("Lookup call error: {0}")]
    Call(CallError),
}

/// Error that can happen when choosing a route.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RouteError {
    /// No node owns exactly the destination key.
    #[error("Destination {0} is unreachable")]
    DestinationUnreachable(DhtKey),
    /// Failed to resolve a waypoint identity.
    #[error("Route lookup error: {0}")]
    Lookup(LookupError),
    /// Failed to find a successor of a random key.
    #[error("Route call error: {0}")]
    Call(CallError),
}

/// Error that can happen when handling a request sent to this node.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum HandleRequestError {
    /// Request can't be parsed.
    #[error("Deserialize request error")]
    Deserialize,
    /// Sealed data or onion layer can't be decrypted.
    #[error("Decrypt error")]
    Decrypt,
    /// Sealed data was decrypted but can't be parsed.
    #[error("Invalid payload: {0}")]
    InvalidPayload(GetPayloadError),
    /// Build request is not signed by the node it claims to come from.
    #[error("Invalid signature of build request")]
    SignatureInvalid,
    /// There is no circuit with such id on this node.
    #[error("Unknown circuit {0}")]
    UnknownCircuit(CircuitId),
    /// Another node admitted a circuit with the same id.
    #[error("Circuit {0} exists already")]
    CircuitExists(CircuitId),
    /// Circuit has to be relayed further but wasn't extended.
    #[error("Circuit {0} is not extended")]
    CircuitNotExtended(CircuitId),
    /// Circuit ends here already and was finished by another entry.
    #[error("Circuit {0} is finished already")]
    CircuitFinished(CircuitId),
    /// Content arrived on a circuit that doesn't end here.
    #[error("No session on circuit {0}")]
    NoSession(CircuitId),
    /// Peeled layer is not a valid inner packet.
    #[error("Malformed packet: {0}")]
    MalformedPacket(MalformedPacketError),
    /// Packet can't be serialized to send it further.
    #[error("Serialize packet error")]
    Serialize,
    /// Failed to resolve identity of a neighbour.
    #[error("Lookup error: {0}")]
    Lookup(LookupError),
    /// The next hop failed to handle the forwarded request.
    #[error("Forward error: {0}")]
    Forward(CallError),
}

impl From<GetPayloadError> for HandleRequestError {
    fn from(error: GetPayloadError) -> HandleRequestError {
        match error {
            GetPayloadError::Decrypt => HandleRequestError::Decrypt,
            error => HandleRequestError::InvalidPayload(error),
        }
    }
}

/// Error that can happen when building a circuit.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConnectError {
    /// Failed to choose a route.
    #[error("Route error: {0}")]
    Route(RouteError),
    /// The first hop rejected the circuit.
    #[error("Build error: {0}")]
    Build(CallError),
    /// Circuit extension failed.
    #[error("Extend error at step {step}: {error}")]
    Extend {
        /// Position in the route of the hop that was being added
        step: usize,
        /// Error returned by the first hop
        error: CallError,
    },
    /// Destination didn't accept the finish packet.
    #[error("Finish error: {0}")]
    Finish(CallError),
}

impl ConnectError {
    /// Get the error returned by the farthest node that was reached.
    pub fn remote_cause(&self) -> Option<&HandleRequestError> {
        match self {
            ConnectError::Route(_) => None,
            ConnectError::Build(error) | ConnectError::Extend { error, .. } | ConnectError::Finish(error) =>
                error.remote_cause(),
        }
    }
}

/// Error that can happen when sending data through a session.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SendError {
    /// Session was closed after a previous failure.
    #[error("Session is closed")]
    Closed,
    /// The first hop failed to relay data.
    #[error("Send call error: {0}")]
    Call(CallError),
}
