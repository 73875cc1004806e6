use bytes::{BufMut, Bytes};

use crate::{
    constants::MESSAGE_ID_LEN,
    protocol::{
        decoding::{decode_u16, decode_utf8_string, peek_string_len},
        encoding::{encode_utf8_string, prefixed_len},
        ControlPacketType, DecodeError, EncodeError, Qos,
    },
};

use super::fixed_header::FixedHeader;

/// Variable header of a PUBLISH packet.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718039>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishVariableHeader {
    pub topic_name: String,

    /// Present only when the fixed header `QoS` is above 0.
    pub packet_id: Option<u16>,
}

impl PublishVariableHeader {
    /// Bytes needed before a decode attempt can succeed: the topic length prefix, the topic,
    /// and the packet id when `qos` is above 0.
    pub fn min_len(buf: &[u8], qos: Qos) -> usize {
        let packet_id_len = if qos > Qos::AtMostOnce { MESSAGE_ID_LEN } else { 0 };

        match peek_string_len(buf) {
            Some(topic_len) => prefixed_len(topic_len) + packet_id_len,
            None => 2,
        }
    }

    /// # Errors
    /// - `DecodeError::InvalidVariableHeader` for an empty topic or one with wildcards.
    pub fn decode(buf: &[u8], qos: Qos) -> Result<Option<(Self, usize)>, DecodeError> {
        let Some((topic_name, mut offset)) = decode_utf8_string(buf)? else {
            return Ok(None);
        };

        if topic_name.is_empty() {
            return Err(DecodeError::InvalidVariableHeader("topic name is required".into()));
        }

        if topic_name.contains(|c| c == '+' || c == '#') {
            return Err(DecodeError::InvalidVariableHeader(format!(
                "topic name contains wildcards: {topic_name}"
            )));
        }

        let packet_id = if qos > Qos::AtMostOnce {
            let Some((packet_id, len)) = decode_u16(&buf[offset..]) else {
                return Ok(None);
            };
            offset += len;
            Some(packet_id)
        } else {
            None
        };

        Ok(Some((Self { topic_name, packet_id }, offset)))
    }

    pub fn encoded_len(&self) -> usize {
        prefixed_len(self.topic_name.len()) + self.packet_id.map_or(0, |_| MESSAGE_ID_LEN)
    }

    /// # Errors
    /// - `EncodeError::InvalidTopicName` for an empty topic or one with wildcards.
    pub fn encode<B: BufMut>(&self, dst: &mut B) -> Result<(), EncodeError> {
        if self.topic_name.is_empty() || self.topic_name.contains(|c| c == '+' || c == '#') {
            return Err(EncodeError::InvalidTopicName(self.topic_name.clone()));
        }

        encode_utf8_string(&self.topic_name, dst)?;

        if let Some(packet_id) = self.packet_id {
            dst.put_u16(packet_id);
        }

        Ok(())
    }
}

/// Application message. The payload is the opaque rest of the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub fixed_header: FixedHeader,
    pub variable_header: PublishVariableHeader,
    pub payload: Bytes,
}

impl PublishPacket {
    /// Builds a PUBLISH. `packet_id` must be `Some` exactly when `qos` is above 0 for the
    /// packet to be encodable.
    pub fn new(topic_name: impl Into<String>, qos: Qos, packet_id: Option<u16>, payload: Bytes) -> Self {
        let variable_header = PublishVariableHeader { topic_name: topic_name.into(), packet_id };

        let mut fixed_header = FixedHeader::new(
            ControlPacketType::Publish,
            variable_header.encoded_len() + payload.len(),
        );
        fixed_header.qos = qos;

        Self { fixed_header, variable_header, payload }
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.fixed_header.retain = retain;
        self
    }

    pub fn with_dup(mut self, dup: bool) -> Self {
        self.fixed_header.dup = dup;
        self
    }

    pub fn topic_name(&self) -> &str {
        &self.variable_header.topic_name
    }

    pub fn packet_id(&self) -> Option<u16> {
        self.variable_header.packet_id
    }

    pub fn qos(&self) -> Qos {
        self.fixed_header.qos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_len_follows_topic_prefix() {
        assert_eq!(PublishVariableHeader::min_len(&[0x00], Qos::AtLeastOnce), 2);
        assert_eq!(PublishVariableHeader::min_len(&[0x00, 0x03], Qos::AtMostOnce), 5);
        assert_eq!(PublishVariableHeader::min_len(&[0x00, 0x03], Qos::ExactlyOnce), 7);
    }

    #[test]
    fn packet_id_only_above_qos_zero() {
        let buf = [0x00, 0x01, b't', 0x12, 0x34];

        let (header, consumed) = PublishVariableHeader::decode(&buf, Qos::AtMostOnce).unwrap().unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(header.packet_id, None);

        let (header, consumed) =
            PublishVariableHeader::decode(&buf, Qos::AtLeastOnce).unwrap().unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(header.packet_id, Some(0x1234));

        assert_eq!(PublishVariableHeader::decode(&buf[..4], Qos::AtLeastOnce).unwrap(), None);
    }

    #[test]
    fn topic_name_required() {
        assert!(matches!(
            PublishVariableHeader::decode(&[0x00, 0x00], Qos::AtMostOnce),
            Err(DecodeError::InvalidVariableHeader(_))
        ));
        assert!(matches!(
            PublishVariableHeader::decode(&[0x00, 0x01, b'#'], Qos::AtMostOnce),
            Err(DecodeError::InvalidVariableHeader(_))
        ));
    }

    #[test]
    fn constructor_computes_remaining_length() {
        let packet =
            PublishPacket::new("a/b", Qos::AtLeastOnce, Some(7), Bytes::from_static(b"hello"));
        assert_eq!(packet.fixed_header.remaining_length, 5 + 2 + 5);
        assert_eq!(packet.qos(), Qos::AtLeastOnce);
    }
}
