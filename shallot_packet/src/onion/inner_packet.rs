/*! What is left of an onion after a hop peels its layer.

Structured packets are JSON objects with hex encoded fields. Anything that
isn't JSON is another onion layer and is relayed further unchanged.
*/

use serde::{Deserialize, Serialize};

use shallot_crypto::*;

use crate::build_request::*;
use crate::errors::MalformedPacketError;
use crate::sealed_box::SealedBox;

/// Binary field of an inner packet, hex encoded in JSON.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
struct HexBytes(#[serde(with = "hex")] Vec<u8>);

/// Inner packet as it's written in JSON. Classification is done by the set of
/// present fields.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawInnerPacket {
    /// Next hop sealed for the current end of the circuit
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    next_hop: Option<HexBytes>,
    /// Layer key sealed for the next hop
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    key: Option<HexBytes>,
    /// `DhtKey` of the circuit originator
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    origin: Option<HexBytes>,
    /// Application data
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    payload: Option<HexBytes>,
}

/** Request to extend the circuit by one hop. It surfaces at the current end
of the circuit.
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildPayload {
    /// [`NextHopPayload`](../build_request/struct.NextHopPayload.html) sealed
    /// for the hop that extends the circuit
    pub next_hop: SealedBox,
    /// [`KeyPayload`](../build_request/struct.KeyPayload.html) sealed for the
    /// new hop, passed on unchanged
    pub key: SealedBox,
}

/// Announce that the circuit ends here.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FinishPayload {
    /// `DhtKey` of the circuit originator
    pub origin: DhtKey,
}

/// Application data for the end of the circuit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentPayload {
    /// Data
    pub payload: Vec<u8>,
}

/// Classified plaintext of a peeled onion layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InnerPacket {
    /// More layers remain. The bytes are forwarded to the next hop.
    Relay(Vec<u8>),
    /// [`BuildPayload`](./struct.BuildPayload.html) structure.
    Build(BuildPayload),
    /// [`FinishPayload`](./struct.FinishPayload.html) structure.
    Finish(FinishPayload),
    /// [`ContentPayload`](./struct.ContentPayload.html) structure.
    Content(ContentPayload),
}

impl InnerPacket {
    /// Serialize the packet so that it can be wrapped into an onion.
    pub fn to_plaintext(&self) -> Vec<u8> {
        let raw = match self {
            InnerPacket::Relay(data) => return data.clone(),
            InnerPacket::Build(build) => RawInnerPacket {
                next_hop: Some(HexBytes(build.next_hop.to_vec())),
                key: Some(HexBytes(build.key.to_vec())),
                ..RawInnerPacket::default()
            },
            InnerPacket::Finish(finish) => RawInnerPacket {
                origin: Some(HexBytes(finish.origin.as_bytes().to_vec())),
                ..RawInnerPacket::default()
            },
            InnerPacket::Content(content) => RawInnerPacket {
                payload: Some(HexBytes(content.payload.clone())),
                ..RawInnerPacket::default()
            },
        };
        serde_json::to_vec(&raw)
            .expect("Serialization of string fields can not fail")
    }
}

/** Classify plaintext of a peeled layer.

Plaintext that is not JSON is `Relay`. A JSON object with `d` and `k` fields
is `Build`, otherwise with `f` it's `Finish`, otherwise with `c` it's
`Content`. Every other JSON value is malformed.
*/
pub fn classify(plaintext: Vec<u8>) -> Result<InnerPacket, MalformedPacketError> {
    let value = match serde_json::from_slice::<serde_json::Value>(&plaintext) {
        Ok(value) => value,
        Err(_) => return Ok(InnerPacket::Relay(plaintext)),
    };
    if !value.is_object() {
        return Err(MalformedPacketError::InvalidStructure("not an object".to_owned()));
    }
    let raw = serde_json::from_value::<RawInnerPacket>(value)
        .map_err(|e| MalformedPacketError::InvalidStructure(e.to_string()))?;

    match raw {
        RawInnerPacket { next_hop: Some(next_hop), key: Some(key), .. } => {
            let next_hop = SealedBox::from_slice_sized(&next_hop.0, SEALED_NEXT_HOP_SIZE)
                .ok_or(MalformedPacketError::InvalidField("d"))?;
            let key = SealedBox::from_slice_sized(&key.0, SEALED_KEY_SIZE)
                .ok_or(MalformedPacketError::InvalidField("k"))?;
            Ok(InnerPacket::Build(BuildPayload { next_hop, key }))
        },
        RawInnerPacket { origin: Some(origin), .. } => {
            let origin = <[u8; DHT_KEY_SIZE]>::try_from(origin.0.as_slice())
                .map_err(|_| MalformedPacketError::InvalidField("f"))?;
            Ok(InnerPacket::Finish(FinishPayload { origin: DhtKey::from(origin) }))
        },
        RawInnerPacket { payload: Some(payload), .. } =>
            Ok(InnerPacket::Content(ContentPayload { payload: payload.0 })),
        _ => Err(MalformedPacketError::UnknownShape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn build_payload() -> BuildPayload {
        let mut rng = thread_rng();
        let current = NodeKeys::generate(&mut rng);
        let next = NodeKeys::generate(&mut rng);
        BuildPayload {
            next_hop: NextHopPayload { next_hop: next.dht_key() }.seal(&mut rng, &current.public().box_pk),
            key: KeyPayload { key: LayerKey::generate(&mut rng) }.seal(&mut rng, &next.public().box_pk),
        }
    }

    #[test]
    fn classify_relay() {
        let data = vec![0xff, 0x00, 0x42, 0x13];
        assert_eq!(classify(data.clone()), Ok(InnerPacket::Relay(data)));
    }

    #[test]
    fn classify_empty_is_relay() {
        assert_eq!(classify(Vec::new()), Ok(InnerPacket::Relay(Vec::new())));
    }

    #[test]
    fn classify_build() {
        let packet = InnerPacket::Build(build_payload());
        assert_eq!(classify(packet.to_plaintext()), Ok(packet));
    }

    #[test]
    fn classify_finish() {
        let packet = InnerPacket::Finish(FinishPayload { origin: DhtKey::random(&mut thread_rng()) });
        assert_eq!(classify(packet.to_plaintext()), Ok(packet));
    }

    #[test]
    fn classify_content() {
        let packet = InnerPacket::Content(ContentPayload { payload: b"hello".to_vec() });
        let plaintext = packet.to_plaintext();
        assert_eq!(plaintext, br#"{"c":"68656c6c6f"}"#.to_vec());
        assert_eq!(classify(plaintext), Ok(packet));
    }

    #[test]
    fn classify_empty_content() {
        let packet = InnerPacket::Content(ContentPayload { payload: Vec::new() });
        assert_eq!(classify(packet.to_plaintext()), Ok(packet));
    }

    #[test]
    fn classify_build_has_priority() {
        let build = build_payload();
        let json = format!(
            r#"{{"d":"{}","k":"{}","f":"{}","c":"00"}}"#,
            hex::encode(build.next_hop.to_vec()),
            hex::encode(build.key.to_vec()),
            hex::encode([1; DHT_KEY_SIZE]),
        );
        assert_eq!(classify(json.into_bytes()), Ok(InnerPacket::Build(build)));
    }

    #[test]
    fn classify_finish_has_priority_over_content() {
        let json = format!(r#"{{"c":"00","f":"{}"}}"#, hex::encode([1; DHT_KEY_SIZE]));
        assert_eq!(
            classify(json.into_bytes()),
            Ok(InnerPacket::Finish(FinishPayload { origin: DhtKey([1; DHT_KEY_SIZE]) }))
        );
    }

    #[test]
    fn classify_half_build_with_content() {
        let build = build_payload();
        let json = format!(r#"{{"d":"{}","c":"2a"}}"#, hex::encode(build.next_hop.to_vec()));
        assert_eq!(
            classify(json.into_bytes()),
            Ok(InnerPacket::Content(ContentPayload { payload: vec![42] }))
        );
    }

    #[test]
    fn classify_unknown_shape() {
        assert_eq!(classify(br#"{}"#.to_vec()), Err(MalformedPacketError::UnknownShape));
        assert_eq!(classify(br#"{"x":"00"}"#.to_vec()), Err(MalformedPacketError::UnknownShape));
        let build = build_payload();
        let json = format!(r#"{{"k":"{}"}}"#, hex::encode(build.key.to_vec()));
        assert_eq!(classify(json.into_bytes()), Err(MalformedPacketError::UnknownShape));
    }

    #[test]
    fn classify_not_object() {
        assert!(matches!(classify(b"42".to_vec()), Err(MalformedPacketError::InvalidStructure(_))));
        assert!(matches!(classify(br#"["c"]"#.to_vec()), Err(MalformedPacketError::InvalidStructure(_))));
        assert!(matches!(classify(b"null".to_vec()), Err(MalformedPacketError::InvalidStructure(_))));
    }

    #[test]
    fn classify_wrong_field_type() {
        assert!(matches!(classify(br#"{"c":42}"#.to_vec()), Err(MalformedPacketError::InvalidStructure(_))));
        assert!(matches!(classify(br#"{"c":"not hex"}"#.to_vec()), Err(MalformedPacketError::InvalidStructure(_))));
    }

    #[test]
    fn classify_invalid_fields() {
        let build = build_payload();
        let json = format!(r#"{{"d":"00","k":"{}"}}"#, hex::encode(build.key.to_vec()));
        assert_eq!(classify(json.into_bytes()), Err(MalformedPacketError::InvalidField("d")));

        let json = format!(r#"{{"d":"{}","k":"{}"}}"#, hex::encode(build.next_hop.to_vec()), hex::encode(build.next_hop.to_vec()));
        assert_eq!(classify(json.into_bytes()), Err(MalformedPacketError::InvalidField("k")));

        let json = format!(r#"{{"f":"{}"}}"#, hex::encode([1; DHT_KEY_SIZE - 1]));
        assert_eq!(classify(json.into_bytes()), Err(MalformedPacketError::InvalidField("f")));
    }
}
