/*! Interface of the DHT the circuits are built on.

The substrate finds nodes by key, stores published identities and delivers
requests between nodes. Timeouts and retries of calls are its business.
*/

use std::fmt;

use async_trait::async_trait;

use shallot_crypto::*;

use crate::errors::*;

/// Kind of request delivered to a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HandlerTag {
    /// [`RelayRequest`](../../shallot_packet/relay_request/struct.RelayRequest.html)
    Relay,
    /// [`BuildRequest`](../../shallot_packet/build_request/struct.BuildRequest.html)
    Build,
}

impl HandlerTag {
    /// Short name of the handler as it's registered in the substrate.
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerTag::Relay => "r",
            HandlerTag::Build => "b",
        }
    }
}

impl fmt::Display for HandlerTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a node needs from the DHT.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Find the node responsible for `key`.
    async fn find_successor(&self, key: &DhtKey) -> Result<DhtKey, CallError>;

    /// Get the value published under `key`.
    async fn lookup_item(&self, key: &DhtKey) -> Result<Option<Vec<u8>>, CallError>;

    /// Send request to `node` and wait for its response.
    async fn call(&self, node: &DhtKey, tag: HandlerTag, params: Vec<u8>) -> Result<Vec<u8>, CallError>;
}

/// Receiver of requests dispatched by the substrate.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle request and return the response for the caller.
    async fn handle_request(&self, tag: HandlerTag, params: Vec<u8>) -> Result<Vec<u8>, HandleRequestError>;
}
