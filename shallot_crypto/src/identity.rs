/*! Self-certifying node identities.

A node's DHT key is the SHA-256 digest of its serialized public identity.
Anyone who fetches the public identity published under a key can check that
it really belongs to that key.
*/

use std::cmp::Ordering;
use std::fmt;

use ed25519_dalek::{Signer, Verifier};
use rand::{CryptoRng, Rng, RngCore};
use sha2::{Digest, Sha256};

use super::*;

/// Size of `DhtKey` in bytes.
pub const DHT_KEY_SIZE: usize = 32;

/// Size of serialized `PublicIdentity` in bytes.
pub const PUBLIC_IDENTITY_SIZE: usize = crypto_box::KEY_SIZE + ed25519_dalek::PUBLIC_KEY_LENGTH;

/// Fixed-width key of the DHT key space. Node ids are keys too.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct DhtKey(pub [u8; DHT_KEY_SIZE]);

impl DhtKey {
    /// Generate random key. Used to pick random waypoints in the key space.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> DhtKey {
        DhtKey(rng.gen())
    }

    /// Key of arbitrary data, i.e. its SHA-256 digest.
    pub fn digest(data: &[u8]) -> DhtKey {
        DhtKey(Sha256::digest(data).into())
    }

    /// Get key as bytes.
    pub fn as_bytes(&self) -> &[u8; DHT_KEY_SIZE] {
        &self.0
    }

    /// Key that follows this one in the key space. The largest key is
    /// followed by zero.
    pub fn next(&self) -> DhtKey {
        let mut bytes = self.0;
        for byte in bytes.iter_mut().rev() {
            let (value, overflow) = byte.overflowing_add(1);
            *byte = value;
            if !overflow {
                break;
            }
        }
        DhtKey(bytes)
    }
}

impl From<[u8; DHT_KEY_SIZE]> for DhtKey {
    fn from(bytes: [u8; DHT_KEY_SIZE]) -> Self {
        DhtKey(bytes)
    }
}

impl AsRef<[u8]> for DhtKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialOrd for DhtKey {
    fn partial_cmp(&self, other: &DhtKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keys are compared as big-endian numbers.
impl Ord for DhtKey {
    fn cmp(&self, other: &DhtKey) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for DhtKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DhtKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for DhtKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/** Public part of node's keys which is published in the DHT.

Serialized form:

Length   | Content
-------- | ------
`32`     | `PublicKey` used to seal packets for the node
`32`     | `VerifyingKey` used to check node's signatures

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicIdentity {
    /// `PublicKey` used to seal packets for the node.
    pub box_pk: PublicKey,
    /// `VerifyingKey` used to check node's signatures.
    pub verifying_key: VerifyingKey,
}

impl PublicIdentity {
    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_IDENTITY_SIZE] {
        let mut bytes = [0; PUBLIC_IDENTITY_SIZE];
        bytes[..crypto_box::KEY_SIZE].copy_from_slice(self.box_pk.as_bytes());
        bytes[crypto_box::KEY_SIZE..].copy_from_slice(self.verifying_key.as_bytes());
        bytes
    }

    /// Deserialize from bytes. Returns `None` if the length is wrong or the
    /// verifying key is not a valid curve point.
    pub fn from_slice(bytes: &[u8]) -> Option<PublicIdentity> {
        if bytes.len() != PUBLIC_IDENTITY_SIZE {
            return None;
        }
        let box_pk: [u8; crypto_box::KEY_SIZE] = bytes[..crypto_box::KEY_SIZE].try_into().ok()?;
        let verifying_key: [u8; ed25519_dalek::PUBLIC_KEY_LENGTH] = bytes[crypto_box::KEY_SIZE..].try_into().ok()?;
        let verifying_key = VerifyingKey::from_bytes(&verifying_key).ok()?;
        Some(PublicIdentity {
            box_pk: PublicKey::from(box_pk),
            verifying_key,
        })
    }

    /// DHT key this identity certifies.
    pub fn dht_key(&self) -> DhtKey {
        DhtKey::digest(&self.to_bytes())
    }

    /// Check `signature` of `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.verifying_key.verify(message, signature).is_ok()
    }
}

/// Secret keys of a node.
#[derive(Clone)]
pub struct NodeKeys {
    box_sk: SecretKey,
    signing_key: SigningKey,
}

impl NodeKeys {
    /// Generate new random keys.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> NodeKeys {
        NodeKeys {
            box_sk: SecretKey::generate(rng),
            signing_key: SigningKey::generate(rng),
        }
    }

    /// `SecretKey` used to open sealed packets.
    pub fn box_sk(&self) -> &SecretKey {
        &self.box_sk
    }

    /// Public identity corresponding to these keys.
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity {
            box_pk: self.box_sk.public_key(),
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// DHT key of the node owning these keys.
    pub fn dht_key(&self) -> DhtKey {
        self.public().dht_key()
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}
