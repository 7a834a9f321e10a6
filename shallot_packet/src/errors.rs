/*! Errors enum for shallot packets.
*/

use nom::{error::{Error as NomError, ErrorKind}, Err};
use thiserror::Error;

/// Error that can happen when calling `get_payload` of packet.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum GetPayloadError {
    /// Error indicates that received payload of encrypted packet can't be decrypted
    #[error("Decrypt payload error")]
    Decrypt,
    /// Error indicates that decrypted payload of packet can't be parsed
    #[error("Deserialize payload error: {:?}, data: {:?}", error, payload)]
    Deserialize {
        /// Kind of the parsing error
        error: ErrorKind,
        /// Received payload of packet
        payload: Vec<u8>,
    },
}

impl GetPayloadError {
    pub(crate) fn decrypt() -> GetPayloadError {
        GetPayloadError::Decrypt
    }

    pub(crate) fn deserialize(e: Err<NomError<&[u8]>>, payload: Vec<u8>) -> GetPayloadError {
        let error = match e {
            Err::Error(e) | Err::Failure(e) => e.code,
            // parsers are complete so missing input is the end of payload
            Err::Incomplete(_) => ErrorKind::Eof,
        };
        GetPayloadError::Deserialize { error, payload }
    }
}

/// Error that can happen when a decrypted onion layer is valid JSON but not
/// one of the known inner packets.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum MalformedPacketError {
    /// Decoded object has no known combination of fields.
    #[error("Inner packet has unknown shape")]
    UnknownShape,
    /// Decoded object is not an object or has fields of wrong types.
    #[error("Inner packet has invalid structure: {0}")]
    InvalidStructure(String),
    /// Known field has invalid content.
    #[error("Inner packet field '{0}' is invalid")]
    InvalidField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom::Needed;

    #[test]
    fn get_payload_error_display() {
        let error = GetPayloadError::deserialize(Err::Error(NomError::new(&[][..], ErrorKind::Eof)), vec![1, 2, 3, 4]);
        assert_eq!(
            format!("{}", error),
            "Deserialize payload error: Eof, data: [1, 2, 3, 4]".to_owned()
        );
        assert_eq!(format!("{}", GetPayloadError::decrypt()), "Decrypt payload error".to_owned());
    }

    #[test]
    fn get_payload_error_incomplete() {
        let error = GetPayloadError::deserialize(Err::Incomplete(Needed::new(5)), vec![1, 2]);
        assert_eq!(error, GetPayloadError::Deserialize { error: ErrorKind::Eof, payload: vec![1, 2] });
    }

    #[test]
    fn get_payload_error_is_cloned() {
        let error = GetPayloadError::deserialize(Err::Failure(NomError::new(&[1][..], ErrorKind::Verify)), vec![1]);
        assert_eq!(error.clone(), error);
    }

    #[test]
    fn malformed_packet_error_display() {
        assert_eq!(format!("{}", MalformedPacketError::InvalidField("f")), "Inner packet field 'f' is invalid".to_owned());
    }
}
