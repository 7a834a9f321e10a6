/*! Sealed box: data encrypted for a node's `PublicKey` by an anonymous sender.
*/

use crypto_box::{SalsaBox, aead::{Aead, AeadCore}};
use nom::combinator::{all_consuming, rest, verify};
use cookie_factory::{do_gen, gen_slice};
use rand::{CryptoRng, RngCore};

use shallot_binary_io::*;
use shallot_crypto::*;

use crate::errors::*;

/// Number of bytes sealing adds to the plaintext.
pub const SEALED_BOX_OVERHEAD: usize = crypto_box::KEY_SIZE + NONCEBYTES + MACBYTES;

/** Data encrypted with a temporary `SecretKey` for the `PublicKey` of the
receiver. Only the receiver can open it and it doesn't reveal the sender.

Serialized form:

Length   | Content
-------- | ------
`32`     | Temporary `PublicKey`
`24`     | `Nonce`
variable | Payload

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SealedBox {
    /// Temporary `PublicKey` for the current encrypted payload
    pub temporary_pk: PublicKey,
    /// Nonce for the current encrypted payload
    pub nonce: Nonce,
    /// Encrypted payload
    pub payload: Vec<u8>,
}

impl FromBytes for SealedBox {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, temporary_pk) = PublicKey::from_bytes(input)?;
        let (input, nonce) = Nonce::from_bytes(input)?;
        let (input, payload) = verify(rest, |payload: &[u8]| payload.len() >= MACBYTES)(input)?;
        Ok((input, SealedBox {
            temporary_pk,
            nonce,
            payload: payload.to_vec(),
        }))
    }
}

impl ToBytes for SealedBox {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.temporary_pk.as_ref()) >>
            gen_slice!(self.nonce.as_ref()) >>
            gen_slice!(self.payload.as_slice())
        )
    }
}

impl SealedBox {
    /// Seal `plaintext` for `receiver_pk` using new temporary key pair.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, receiver_pk: &PublicKey, plaintext: &[u8]) -> SealedBox {
        let temporary_sk = SecretKey::generate(&mut *rng);
        let shared_secret = SalsaBox::new(receiver_pk, &temporary_sk);
        let nonce = SalsaBox::generate_nonce(&mut *rng);
        let payload = shared_secret.encrypt(&nonce, plaintext)
            .expect("SalsaBox encryption of a short plaintext can not fail");

        SealedBox {
            temporary_pk: temporary_sk.public_key(),
            nonce: nonce.into(),
            payload,
        }
    }

    /// Seal serialized `payload` for `receiver_pk`.
    pub fn seal<R: RngCore + CryptoRng, T: ToBytes>(rng: &mut R, receiver_pk: &PublicKey, payload: &T, max_size: usize) -> Result<SealedBox, GenError> {
        let plaintext = to_vec(payload, max_size)?;
        Ok(SealedBox::new(rng, receiver_pk, &plaintext))
    }

    /// Length of serialized `SealedBox`.
    pub fn size(&self) -> usize {
        crypto_box::KEY_SIZE + NONCEBYTES + self.payload.len()
    }

    /// Decrypt payload with our `SecretKey`.
    pub fn open(&self, sk: &SecretKey) -> Result<Vec<u8>, GetPayloadError> {
        let shared_secret = SalsaBox::new(&self.temporary_pk, sk);
        shared_secret.decrypt((&self.nonce).into(), self.payload.as_slice())
            .map_err(|_| GetPayloadError::decrypt())
    }

    /** Decrypt payload and try to parse it as `T`.

    Returns `Error` in case of failure:

    - fails to decrypt
    - fails to parse as `T` or there are trailing bytes
    */
    pub fn get_payload<T: FromBytes>(&self, sk: &SecretKey) -> Result<T, GetPayloadError> {
        let decrypted = self.open(sk)?;
        let res = match all_consuming(T::from_bytes)(&decrypted) {
            Err(error) => {
                Err(GetPayloadError::deserialize(error, decrypted.clone()))
            },
            Ok((_, inner)) => {
                Ok(inner)
            }
        };
        res
    }

    /// Serialize to a `Vec`.
    pub fn to_vec(&self) -> Vec<u8> {
        to_vec(self, self.size())
            .expect("SealedBox serialization into a buffer of its size can not fail")
    }

    /// Parse `SealedBox` that should have exactly `size` bytes.
    pub fn from_slice_sized(bytes: &[u8], size: usize) -> Option<SealedBox> {
        if bytes.len() != size {
            return None;
        }
        all_consuming(SealedBox::from_bytes)(bytes)
            .ok()
            .map(|(_, sealed)| sealed)
    }
}
