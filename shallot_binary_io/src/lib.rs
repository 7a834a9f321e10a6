/*! Traits and helpers for binary serialization of shallot packets.

Parsing is done with `nom`, serialization with `cookie_factory`.
*/

#![forbid(unsafe_code)]

pub use nom::IResult;
pub use cookie_factory::GenError;

use nom::bytes::complete::take;
use nom::combinator::map_opt;

#[cfg(feature = "crypto")]
mod crypto;

/// The trait provides method to deserialize struct from raw bytes
pub trait FromBytes: Sized {
    /// Deserialize struct using `nom` from raw bytes
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self>;
}

/// The trait provides method to serialize struct into raw bytes
pub trait ToBytes: Sized {
    /// Serialize struct into raw bytes using `cookie_factory`
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError>;
}

impl<const N: usize> FromBytes for [u8; N] {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map_opt(take(N), |bytes: &[u8]| bytes.try_into().ok())(input)
    }
}

/// Fail serialization with custom error code.
pub fn gen_error(_buf: (&mut [u8], usize), error: u32) -> Result<(&mut [u8], usize), GenError> {
    Err(GenError::CustomError(error))
}

/// Serialize `value` into a new `Vec` which can hold at most `max_size`
/// bytes. The `Vec` is truncated to the serialized length.
pub fn to_vec<T: ToBytes>(value: &T, max_size: usize) -> Result<Vec<u8>, GenError> {
    let mut buf = vec![0; max_size];
    let (_, size) = value.to_bytes((&mut buf, 0))?;
    buf.truncate(size);
    Ok(buf)
}

/// Generate a test that serializes a value and parses it back.
#[macro_export]
macro_rules! encode_decode_test (
    ($test:ident, $value:expr) => (
        #[test]
        fn $test() {
            let value = $value;
            let mut buf = [0; 4096];
            let (_, size) = value.to_bytes((&mut buf, 0)).unwrap();
            // decoded value has the same type as value
            fn decode_as<'a, T: $crate::FromBytes>(_value: &T, input: &'a [u8]) -> $crate::IResult<&'a [u8], T> {
                T::from_bytes(input)
            }
            let (rest, decoded_value) = decode_as(&value, &buf[..size]).unwrap();
            assert_eq!(decoded_value, value);
            assert!(rest.is_empty());
        }
    )
);
