/*!
Packets of the shallot circuit protocol.

Two packets travel between nodes: [`BuildRequest`](build_request/struct.BuildRequest.html)
admits a circuit at a hop and [`RelayRequest`](relay_request/struct.RelayRequest.html)
carries an onion along an existing circuit. What is left after a hop peels its
layer is an [`InnerPacket`](onion/enum.InnerPacket.html).
*/

#![forbid(unsafe_code)]

pub mod errors;
pub mod sealed_box;
pub mod build_request;
pub mod relay_request;
pub mod onion;

pub use self::errors::*;
pub use self::sealed_box::*;
pub use self::build_request::*;
pub use self::relay_request::*;
