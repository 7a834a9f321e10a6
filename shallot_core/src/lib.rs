/*!
Core of shallot, an onion routing overlay on top of a DHT.

A node builds a circuit of randomly chosen relays to a destination known only
by its `DhtKey`. Each relay knows just its neighbours on the circuit and can't
read the data it carries.
*/

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod errors;
pub mod config;
pub mod substrate;
pub mod directory;
pub mod mem_network;
pub mod node;
