/*! Onion layers of a circuit.

An onion is an [`InnerPacket`](./enum.InnerPacket.html) encrypted once per
hop. The key of the first hop makes the outermost layer, so every hop peels
exactly one layer with its own key and the IV from the relay header.
*/

mod inner_packet;

pub use self::inner_packet::*;

use shallot_crypto::*;

/// Encrypt `plaintext` with every key starting from the last one, so the
/// first key makes the outermost layer.
pub fn wrap_onion(plaintext: &[u8], keys: &[LayerKey], iv: &Iv) -> Vec<u8> {
    keys.iter()
        .rev()
        .fold(plaintext.to_vec(), |data, key| encrypt_layer(key, iv, &data))
}

/// Serialize `packet` and wrap it into an onion.
pub fn wrap_packet(packet: &InnerPacket, keys: &[LayerKey], iv: &Iv) -> Vec<u8> {
    wrap_onion(&packet.to_plaintext(), keys, iv)
}

/// Remove the outermost layer of an onion.
pub fn peel_layer(ciphertext: &[u8], key: &LayerKey, iv: &Iv) -> Result<Vec<u8>, LayerError> {
    decrypt_layer(key, iv, ciphertext)
}
