use std::convert::TryInto;

use nom::IResult;
use nom::bytes::complete::take;
use nom::combinator::{map, map_opt};

use crypto_box::{PublicKey, KEY_SIZE};
use shallot_crypto::{CircuitId, DhtKey, Iv, LayerKey, CIRCUIT_ID_SIZE, DHT_KEY_SIZE, IV_SIZE, LAYER_KEY_SIZE};

use super::FromBytes;

impl FromBytes for PublicKey {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(map_opt(take(KEY_SIZE), |pk: &[u8]| pk.try_into().ok()), |pk: [u8; KEY_SIZE]| pk.into())(input)
    }
}

impl FromBytes for DhtKey {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(<[u8; DHT_KEY_SIZE]>::from_bytes, DhtKey::from)(input)
    }
}

impl FromBytes for CircuitId {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(<[u8; CIRCUIT_ID_SIZE]>::from_bytes, CircuitId::from)(input)
    }
}

impl FromBytes for Iv {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(<[u8; IV_SIZE]>::from_bytes, Iv::from)(input)
    }
}

impl FromBytes for LayerKey {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(<[u8; LAYER_KEY_SIZE]>::from_bytes, LayerKey::from)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_parse_bytes_test() {
        let bytes = [42; KEY_SIZE];
        let (_rest, pk) = PublicKey::from_bytes(&bytes).unwrap();

        assert_eq!(pk.as_bytes(), &bytes as &[u8]);
    }

    #[test]
    fn dht_key_parse_bytes_test() {
        let mut bytes = vec![7; DHT_KEY_SIZE];
        bytes.push(1);
        let (rest, key) = DhtKey::from_bytes(&bytes).unwrap();

        assert_eq!(key, DhtKey([7; DHT_KEY_SIZE]));
        assert_eq!(rest, &[1]);
    }

    #[test]
    fn circuit_id_and_iv_parse_bytes_test() {
        let bytes = [3; CIRCUIT_ID_SIZE + IV_SIZE];
        let (rest, circuit_id) = CircuitId::from_bytes(&bytes).unwrap();
        let (rest, iv) = Iv::from_bytes(rest).unwrap();

        assert_eq!(circuit_id, CircuitId([3; CIRCUIT_ID_SIZE]));
        assert_eq!(iv, Iv([3; IV_SIZE]));
        assert!(rest.is_empty());
    }

    #[test]
    fn layer_key_parse_short_bytes_test() {
        let bytes = [42; LAYER_KEY_SIZE - 1];
        assert!(LayerKey::from_bytes(&bytes).is_err());
    }

    #[test]
    fn public_key_parse_short_bytes_test() {
        let bytes = [42; KEY_SIZE - 1];
        assert!(PublicKey::from_bytes(&bytes).is_err());
    }
}
