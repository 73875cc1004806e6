use bytes::BufMut;

use crate::protocol::{
    decoding::decode_variable_byte_int,
    encoding::{encode_variable_byte_int, variable_byte_int_len},
    ControlPacketType, DecodeError, EncodeError, Qos,
};

/// First part of every control packet: type, flags and remaining length.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718020>
///
/// ```text
/// Bit      7   6   5   4 | 3    2   1    0
/// byte 1   packet type   | dup  qos qos  retain
/// byte 2.. remaining length (1 to 4 bytes)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: ControlPacketType,
    pub dup: bool,
    pub qos: Qos,
    pub retain: bool,
    pub remaining_length: usize,
}

impl FixedHeader {
    /// Header with the flags each type mandates: `QoS` 1 for PUBREL/SUBSCRIBE/UNSUBSCRIBE,
    /// all clear otherwise.
    pub fn new(packet_type: ControlPacketType, remaining_length: usize) -> Self {
        let qos = if packet_type.requires_qos_one() { Qos::AtLeastOnce } else { Qos::AtMostOnce };

        Self { packet_type, dup: false, qos, retain: false, remaining_length }
    }

    /// Decodes the fixed header from the start of `buf`.
    ///
    /// Returns `Ok(None)` while the remaining length has not terminated yet; nothing is
    /// consumed in that case.
    ///
    /// # Errors
    /// - `DecodeError::InvalidMessageType` for an unknown high nibble.
    /// - `DecodeError::InvalidQosLevel` for `QoS` bits `11`, or PUBREL/SUBSCRIBE/UNSUBSCRIBE not at `QoS` 1.
    /// - `DecodeError::RemainingLengthExceeded` when the length needs a 5th byte.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, DecodeError> {
        let Some(&first_byte) = buf.first() else {
            return Ok(None);
        };

        let type_value = first_byte >> 4;
        let packet_type = ControlPacketType::from_u8(type_value)
            .ok_or(DecodeError::InvalidMessageType(type_value))?;

        let dup = (first_byte >> 3) & 1 == 1;
        let qos = Qos::from_u8((first_byte >> 1) & 0b0000_0011).ok_or(DecodeError::InvalidQosLevel)?;
        let retain = first_byte & 1 == 1;

        if packet_type.requires_qos_one() && qos != Qos::AtLeastOnce {
            return Err(DecodeError::InvalidQosLevel);
        }

        let Some((remaining_length, len_bytes)) = decode_variable_byte_int(&buf[1..])? else {
            return Ok(None);
        };

        Ok(Some((Self { packet_type, dup, qos, retain, remaining_length }, 1 + len_bytes)))
    }

    /// Number of bytes the header takes on the wire.
    pub fn encoded_len(&self) -> usize {
        1 + variable_byte_int_len(self.remaining_length)
    }

    /// Writes the header.
    ///
    /// # Errors
    /// - `EncodeError::InvalidQosLevel` if PUBREL/SUBSCRIBE/UNSUBSCRIBE is not at `QoS` 1.
    /// - `EncodeError::RemainingLengthExceeded` if the length does not fit in 4 bytes.
    pub fn encode<B: BufMut>(&self, dst: &mut B) -> Result<(), EncodeError> {
        if self.packet_type.requires_qos_one() && self.qos != Qos::AtLeastOnce {
            return Err(EncodeError::InvalidQosLevel);
        }

        let mut first_byte = self.packet_type.to_u8() << 4;
        first_byte |= u8::from(self.dup) << 3;
        first_byte |= self.qos.to_u8() << 1;
        first_byte |= u8::from(self.retain);

        dst.put_u8(first_byte);
        encode_variable_byte_int(self.remaining_length, dst)
    }
}
