/*! Symmetric onion layers.

Every hop of a circuit shares a 16-byte AES key with the originator. A layer
is AES-128-GCM with a 16-byte IV, so the tag makes a wrong key or IV always
fail instead of producing garbage.
*/

use std::fmt;

use aes_gcm::{AesGcm, aes::Aes128};
use aes_gcm::aead::{Aead, KeyInit, generic_array::{GenericArray, typenum::U16}};
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use aes_gcm::aead::Error as LayerError;

/// Size of `LayerKey` in bytes.
pub const LAYER_KEY_SIZE: usize = 16;
/// Size of `Iv` in bytes.
pub const IV_SIZE: usize = 16;
/// Number of bytes every layer adds to the ciphertext.
pub const LAYER_TAG_SIZE: usize = 16;

type LayerCipher = AesGcm<Aes128, U16>;

/// Symmetric key of one circuit hop.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct LayerKey([u8; LAYER_KEY_SIZE]);

impl LayerKey {
    /// Generate new random key.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> LayerKey {
        LayerKey(rng.gen())
    }

    /// Get key as bytes.
    pub fn as_bytes(&self) -> &[u8; LAYER_KEY_SIZE] {
        &self.0
    }
}

impl From<[u8; LAYER_KEY_SIZE]> for LayerKey {
    fn from(bytes: [u8; LAYER_KEY_SIZE]) -> Self {
        LayerKey(bytes)
    }
}

impl fmt::Debug for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("LayerKey(..)")
    }
}

/// IV shared by all layers of one onion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Iv(pub [u8; IV_SIZE]);

impl Iv {
    /// Generate new random IV.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Iv {
        Iv(rng.gen())
    }
}

impl From<[u8; IV_SIZE]> for Iv {
    fn from(bytes: [u8; IV_SIZE]) -> Self {
        Iv(bytes)
    }
}

/// Put one layer of encryption on `plaintext`.
pub fn encrypt_layer(key: &LayerKey, iv: &Iv, plaintext: &[u8]) -> Vec<u8> {
    let cipher = LayerCipher::new(GenericArray::from_slice(key.as_bytes()));
    cipher.encrypt(GenericArray::from_slice(&iv.0), plaintext)
        .expect("Plaintext is far below AES-GCM length limit")
}

/// Remove one layer of encryption. Fails when the tag doesn't match.
pub fn decrypt_layer(key: &LayerKey, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>, LayerError> {
    let cipher = LayerCipher::new(GenericArray::from_slice(key.as_bytes()));
    cipher.decrypt(GenericArray::from_slice(&iv.0), ciphertext)
}
