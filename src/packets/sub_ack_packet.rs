use std::fmt;

use bytes::BufMut;

use crate::{
    constants::MESSAGE_ID_LEN,
    protocol::{ControlPacketType, DecodeError, EncodeError, Qos},
};

use super::{fixed_header::FixedHeader, message_id_packet::encode_message_id};

const FAILURE: u8 = 0x80;

/// Outcome of one requested subscription.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718071>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAckReturnCode {
    Granted(Qos),
    Failure,
}

impl SubAckReturnCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            FAILURE => Some(Self::Failure),
            value => Qos::from_u8(value).map(Self::Granted),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Granted(qos) => qos.to_u8(),
            Self::Failure => FAILURE,
        }
    }
}

impl From<Qos> for SubAckReturnCode {
    fn from(qos: Qos) -> Self {
        Self::Granted(qos)
    }
}

impl fmt::Display for SubAckReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted(qos) => write!(f, "granted {qos}"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Decodes the return codes of a SUBACK, one byte per subscription.
///
/// # Errors
/// - `DecodeError::InvalidPayloadBytes` for an empty list.
/// - `DecodeError::InvalidQosLevel` for a byte other than 0, 1, 2 or 0x80.
pub fn decode_return_codes(buf: &[u8]) -> Result<Vec<SubAckReturnCode>, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::InvalidPayloadBytes);
    }

    buf.iter()
        .map(|value| SubAckReturnCode::from_u8(*value).ok_or(DecodeError::InvalidQosLevel))
        .collect()
}

/// Server reply to SUBSCRIBE. `return_codes` is parallel to the requested subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub fixed_header: FixedHeader,
    pub message_id: u16,
    pub return_codes: Vec<SubAckReturnCode>,
}

impl SubAckPacket {
    /// A SUBACK granting every subscription.
    pub fn new(message_id: u16, granted_qos: Vec<Qos>) -> Self {
        Self::with_return_codes(message_id, granted_qos.into_iter().map(Into::into).collect())
    }

    pub fn with_return_codes(message_id: u16, return_codes: Vec<SubAckReturnCode>) -> Self {
        let remaining_length = MESSAGE_ID_LEN + return_codes.len();

        Self {
            fixed_header: FixedHeader::new(ControlPacketType::SubAck, remaining_length),
            message_id,
            return_codes,
        }
    }

    pub fn encode_parts<B: BufMut>(&self, dst: &mut B) -> Result<(), EncodeError> {
        if self.return_codes.is_empty() {
            return Err(EncodeError::EmptyPayload(ControlPacketType::SubAck));
        }

        encode_message_id(self.message_id, dst);

        for return_code in &self.return_codes {
            dst.put_u8(return_code.to_u8());
        }

        Ok(())
    }
}
