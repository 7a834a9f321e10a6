/*! BuildRequest packet with its sealed payloads.
*/

use nom::bytes::complete::take;
use nom::combinator::{map, map_parser};
use cookie_factory::{do_gen, gen_call, gen_slice};
use rand::{CryptoRng, RngCore};

use shallot_binary_io::*;
use shallot_crypto::*;

use crate::sealed_box::*;

/// Size of serialized `KeyPayload`.
pub const KEY_PAYLOAD_SIZE: usize = LAYER_KEY_SIZE;
/// Size of serialized `CircuitOriginPayload`.
pub const CIRCUIT_ORIGIN_PAYLOAD_SIZE: usize = CIRCUIT_ID_SIZE + DHT_KEY_SIZE;
/// Size of serialized `NextHopPayload`.
pub const NEXT_HOP_PAYLOAD_SIZE: usize = DHT_KEY_SIZE;

/// Size of sealed `KeyPayload`.
pub const SEALED_KEY_SIZE: usize = SEALED_BOX_OVERHEAD + KEY_PAYLOAD_SIZE;
/// Size of sealed `CircuitOriginPayload`.
pub const SEALED_CIRCUIT_ORIGIN_SIZE: usize = SEALED_BOX_OVERHEAD + CIRCUIT_ORIGIN_PAYLOAD_SIZE;
/// Size of sealed `NextHopPayload`.
pub const SEALED_NEXT_HOP_SIZE: usize = SEALED_BOX_OVERHEAD + NEXT_HOP_PAYLOAD_SIZE;

/// Size of serialized `BuildRequest`.
pub const BUILD_REQUEST_SIZE: usize = SEALED_KEY_SIZE + SEALED_CIRCUIT_ORIGIN_SIZE + SIGNATURE_SIZE;

/** Request to admit a circuit at the receiving node. It's sent directly
by the node that becomes the previous hop of the circuit: by the originator
for the first hop and by the current end of the circuit when it's extended.

Serialized form:

Length   | Content
-------- | ------
`88`     | Sealed [`KeyPayload`](./struct.KeyPayload.html)
`112`    | Sealed [`CircuitOriginPayload`](./struct.CircuitOriginPayload.html)
`64`     | Signature of the two sealed fields by the sender

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildRequest {
    /// Layer key of the receiver sealed for it by the originator
    pub wrapped_key: SealedBox,
    /// Circuit id and sender's `DhtKey` sealed for the receiver
    pub wrapped_circuit: SealedBox,
    /// Sender's signature of `wrapped_key` and `wrapped_circuit`
    pub signature: Signature,
}

impl FromBytes for BuildRequest {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, wrapped_key) = map_parser(take(SEALED_KEY_SIZE), SealedBox::from_bytes)(input)?;
        let (input, wrapped_circuit) = map_parser(take(SEALED_CIRCUIT_ORIGIN_SIZE), SealedBox::from_bytes)(input)?;
        let (input, signature) = map(<[u8; SIGNATURE_SIZE]>::from_bytes, |bytes| Signature::from_bytes(&bytes))(input)?;
        Ok((input, BuildRequest {
            wrapped_key,
            wrapped_circuit,
            signature,
        }))
    }
}

impl ToBytes for BuildRequest {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        if self.wrapped_key.size() != SEALED_KEY_SIZE || self.wrapped_circuit.size() != SEALED_CIRCUIT_ORIGIN_SIZE {
            return gen_error(buf, 0);
        }
        let signature = self.signature.to_bytes();
        do_gen!(buf,
            gen_call!(|buf, sealed| SealedBox::to_bytes(sealed, buf), &self.wrapped_key) >>
            gen_call!(|buf, sealed| SealedBox::to_bytes(sealed, buf), &self.wrapped_circuit) >>
            gen_slice!(&signature)
        )
    }
}

impl BuildRequest {
    /// Create new `BuildRequest` signing sealed fields with our keys.
    pub fn new(keys: &NodeKeys, wrapped_key: SealedBox, wrapped_circuit: SealedBox) -> BuildRequest {
        let signature = keys.sign(&BuildRequest::signed_data(&wrapped_key, &wrapped_circuit));
        BuildRequest {
            wrapped_key,
            wrapped_circuit,
            signature,
        }
    }

    /// Data covered by the signature: both sealed fields concatenated.
    pub fn signed_data(wrapped_key: &SealedBox, wrapped_circuit: &SealedBox) -> Vec<u8> {
        let mut data = wrapped_key.to_vec();
        data.extend_from_slice(&wrapped_circuit.to_vec());
        data
    }

    /// Check that the request was signed by `identity`.
    pub fn verify(&self, identity: &PublicIdentity) -> bool {
        identity.verify(&BuildRequest::signed_data(&self.wrapped_key, &self.wrapped_circuit), &self.signature)
    }

    /// Serialize to a `Vec`.
    pub fn to_vec(&self) -> Result<Vec<u8>, GenError> {
        to_vec(self, BUILD_REQUEST_SIZE)
    }
}

/** Layer key of a hop. It's sealed by the originator for the hop and passes
through the previous hop unchanged.

Serialized form:

Length   | Content
-------- | ------
`16`     | `LayerKey`

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPayload {
    /// Layer key the hop shares with the originator
    pub key: LayerKey,
}

impl FromBytes for KeyPayload {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(LayerKey::from_bytes, |key| KeyPayload { key })(input)
    }
}

impl ToBytes for KeyPayload {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.key.as_bytes())
        )
    }
}

impl KeyPayload {
    /// Seal the key for `receiver_pk`.
    pub fn seal<R: RngCore + CryptoRng>(&self, rng: &mut R, receiver_pk: &PublicKey) -> SealedBox {
        SealedBox::seal(rng, receiver_pk, self, KEY_PAYLOAD_SIZE)
            .expect("Payload has fixed size")
    }
}

/** Circuit id the receiver should use and `DhtKey` of the sender which
must be used to check the signature.

Serialized form:

Length   | Content
-------- | ------
`8`      | `CircuitId`
`32`     | `DhtKey` of the previous hop

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CircuitOriginPayload {
    /// Circuit id on the receiving hop
    pub circuit_id: CircuitId,
    /// `DhtKey` of the previous hop
    pub origin: DhtKey,
}

impl FromBytes for CircuitOriginPayload {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, circuit_id) = CircuitId::from_bytes(input)?;
        let (input, origin) = DhtKey::from_bytes(input)?;
        Ok((input, CircuitOriginPayload {
            circuit_id,
            origin,
        }))
    }
}

impl ToBytes for CircuitOriginPayload {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.circuit_id.as_ref()) >>
            gen_slice!(self.origin.as_ref())
        )
    }
}

impl CircuitOriginPayload {
    /// Seal the payload for `receiver_pk`.
    pub fn seal<R: RngCore + CryptoRng>(&self, rng: &mut R, receiver_pk: &PublicKey) -> SealedBox {
        SealedBox::seal(rng, receiver_pk, self, CIRCUIT_ORIGIN_PAYLOAD_SIZE)
            .expect("Payload has fixed size")
    }
}

/** `DhtKey` of the node a circuit should be extended to. Sealed by the
originator for the current end of the circuit.

Serialized form:

Length   | Content
-------- | ------
`32`     | `DhtKey` of the next hop

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NextHopPayload {
    /// `DhtKey` of the next hop
    pub next_hop: DhtKey,
}

impl FromBytes for NextHopPayload {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(DhtKey::from_bytes, |next_hop| NextHopPayload { next_hop })(input)
    }
}

impl ToBytes for NextHopPayload {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.next_hop.as_ref())
        )
    }
}

impl NextHopPayload {
    /// Seal the payload for `receiver_pk`.
    pub fn seal<R: RngCore + CryptoRng>(&self, rng: &mut R, receiver_pk: &PublicKey) -> SealedBox {
        SealedBox::seal(rng, receiver_pk, self, NEXT_HOP_PAYLOAD_SIZE)
            .expect("Payload has fixed size")
    }
}
