/*! RelayRequest packet
*/

use nom::bytes::complete::take;
use nom::combinator::{map, map_parser, rest, verify};
use cookie_factory::{do_gen, gen_call, gen_slice};
use rand::{CryptoRng, RngCore};

use shallot_binary_io::*;
use shallot_crypto::*;

use crate::sealed_box::*;

/// Size of serialized `SecuredHeaderPayload`.
pub const SECURED_HEADER_PAYLOAD_SIZE: usize = CIRCUIT_ID_SIZE + IV_SIZE;
/// Size of sealed `SecuredHeaderPayload`.
pub const SEALED_HEADER_SIZE: usize = SEALED_BOX_OVERHEAD + SECURED_HEADER_PAYLOAD_SIZE;

/** Onion travelling along an established circuit. The header is sealed
separately for every hop, so consecutive hops see different headers for the
same onion.

Serialized form:

Length   | Content
-------- | ------
`96`     | Sealed [`SecuredHeaderPayload`](./struct.SecuredHeaderPayload.html)
`[16,]`  | Onion ciphertext

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelayRequest {
    /// Circuit id and IV sealed for the receiving hop
    pub secured_header: SealedBox,
    /// Onion with the receiving hop's layer outermost
    pub ciphertext: Vec<u8>,
}

impl FromBytes for RelayRequest {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, secured_header) = map_parser(take(SEALED_HEADER_SIZE), SealedBox::from_bytes)(input)?;
        let (input, ciphertext) = map(verify(rest, |ciphertext: &[u8]| ciphertext.len() >= LAYER_TAG_SIZE), <[u8]>::to_vec)(input)?;
        Ok((input, RelayRequest {
            secured_header,
            ciphertext,
        }))
    }
}

impl ToBytes for RelayRequest {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        if self.secured_header.size() != SEALED_HEADER_SIZE || self.ciphertext.len() < LAYER_TAG_SIZE {
            return gen_error(buf, 0);
        }
        do_gen!(buf,
            gen_call!(|buf, sealed| SealedBox::to_bytes(sealed, buf), &self.secured_header) >>
            gen_slice!(self.ciphertext.as_slice())
        )
    }
}

impl RelayRequest {
    /// Create new `RelayRequest` for the hop owning `receiver_pk`.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, receiver_pk: &PublicKey, header: &SecuredHeaderPayload, ciphertext: Vec<u8>) -> RelayRequest {
        RelayRequest {
            secured_header: header.seal(rng, receiver_pk),
            ciphertext,
        }
    }

    /// Open the header with our secret key.
    pub fn get_header(&self, sk: &SecretKey) -> Result<SecuredHeaderPayload, crate::errors::GetPayloadError> {
        self.secured_header.get_payload(sk)
    }

    /// Serialize to a `Vec`.
    pub fn to_vec(&self) -> Result<Vec<u8>, GenError> {
        to_vec(self, SEALED_HEADER_SIZE + self.ciphertext.len())
    }
}

/** Header of a `RelayRequest`: the circuit id on the receiving hop and the
IV shared by all layers of the onion.

Serialized form:

Length   | Content
-------- | ------
`8`      | `CircuitId`
`16`     | `Iv`

*/
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SecuredHeaderPayload {
    /// Circuit id on the receiving hop
    pub circuit_id: CircuitId,
    /// IV of the onion layers
    pub iv: Iv,
}

impl FromBytes for SecuredHeaderPayload {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, circuit_id) = CircuitId::from_bytes(input)?;
        let (input, iv) = Iv::from_bytes(input)?;
        Ok((input, SecuredHeaderPayload {
            circuit_id,
            iv,
        }))
    }
}

impl ToBytes for SecuredHeaderPayload {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.circuit_id.as_ref()) >>
            gen_slice!(&self.iv.0)
        )
    }
}

impl SecuredHeaderPayload {
    /// Seal the header for `receiver_pk`.
    pub fn seal<R: RngCore + CryptoRng>(&self, rng: &mut R, receiver_pk: &PublicKey) -> SealedBox {
        SealedBox::seal(rng, receiver_pk, self, SECURED_HEADER_PAYLOAD_SIZE)
            .expect("Payload has fixed size")
    }
}
