//! This crate rexports all shallot crates.
//!
//! Typical use goes through [`core`]: create a `Node` on top of a
//! `Substrate`, publish its identity and call `connect_to` with the `DhtKey`
//! of the destination.

pub use shallot_binary_io as binary_io;
pub use shallot_core as core;
pub use shallot_crypto as crypto;
pub use shallot_packet as packet;

/// The shallot crate version string in the form "major.minor.patch"
pub fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
