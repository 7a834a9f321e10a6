//! Functions for the core crypto.
//!
//! Every node owns two key pairs: a `crypto_box` key pair used to receive
//! sealed packets and an Ed25519 key pair used to sign circuit builds. Onion
//! layers are encrypted with AES-128-GCM keys negotiated per hop.

#![forbid(unsafe_code)]

pub mod identity;
pub mod layer;

pub use crypto_box::{PublicKey, SecretKey};
pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};

pub use self::identity::*;
pub use self::layer::*;

use std::fmt;

use crypto_box::{SalsaBox, aead::generic_array::typenum::marker_traits::Unsigned};
use crypto_box::aead::AeadCore;
use rand::Rng;

pub type Nonce = [u8; <SalsaBox as AeadCore>::NonceSize::USIZE];
pub const NONCEBYTES: usize = <SalsaBox as AeadCore>::NonceSize::USIZE;
/// Size of the MAC appended by `SalsaBox` encryption.
pub const MACBYTES: usize = <SalsaBox as AeadCore>::TagSize::USIZE;

/// Size of `Signature` in bytes.
pub const SIGNATURE_SIZE: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Size of `CircuitId` in bytes.
pub const CIRCUIT_ID_SIZE: usize = 8;

/** Hop-local name of a circuit.

Every relay picks the id its successor should use, so the same circuit has a
different id on every hop and ids can't be linked across hops.
*/
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct CircuitId(pub [u8; CIRCUIT_ID_SIZE]);

impl CircuitId {
    /// Generate new random `CircuitId`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> CircuitId {
        CircuitId(rng.gen())
    }
}

impl From<[u8; CIRCUIT_ID_SIZE]> for CircuitId {
    fn from(bytes: [u8; CIRCUIT_ID_SIZE]) -> Self {
        CircuitId(bytes)
    }
}

impl AsRef<[u8]> for CircuitId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CircuitId({})", hex::encode(self.0))
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn circuit_id_random_differs() {
        let mut rng = thread_rng();
        let a = CircuitId::random(&mut rng);
        let b = CircuitId::random(&mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn circuit_id_display() {
        let id = CircuitId([0, 1, 2, 3, 0xfc, 0xfd, 0xfe, 0xff]);
        assert_eq!(id.to_string(), "00010203fcfdfeff");
        assert_eq!(format!("{:?}", id), "CircuitId(00010203fcfdfeff)");
    }
}
