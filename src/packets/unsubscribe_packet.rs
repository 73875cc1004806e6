use bytes::BufMut;

use crate::{
    constants::MESSAGE_ID_LEN,
    protocol::{
        decoding::decode_utf8_string,
        encoding::{encode_utf8_string, prefixed_len},
        ControlPacketType, DecodeError, EncodeError,
    },
};

use super::{fixed_header::FixedHeader, message_id_packet::encode_message_id, required};

/// Decodes the topic filters of an UNSUBSCRIBE payload.
///
/// # Errors
/// - `DecodeError::InvalidPayloadBytes` for an empty list or a truncated filter.
pub fn decode_topic_filters(buf: &[u8]) -> Result<Vec<String>, DecodeError> {
    let mut topic_filters = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let (topic_filter, len) = required(decode_utf8_string(&buf[offset..])?)?;
        offset += len;
        topic_filters.push(topic_filter);
    }

    if topic_filters.is_empty() {
        return Err(DecodeError::InvalidPayloadBytes);
    }

    Ok(topic_filters)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub fixed_header: FixedHeader,
    pub message_id: u16,
    pub topic_filters: Vec<String>,
}

impl UnsubscribePacket {
    pub fn new(message_id: u16, topic_filters: Vec<String>) -> Self {
        let remaining_length = MESSAGE_ID_LEN + Self::topic_filters_len(&topic_filters);

        Self {
            fixed_header: FixedHeader::new(ControlPacketType::Unsubscribe, remaining_length),
            message_id,
            topic_filters,
        }
    }

    pub fn topic_filters_len(topic_filters: &[String]) -> usize {
        topic_filters.iter().map(|filter| prefixed_len(filter.len())).sum()
    }

    pub fn encode_parts<B: BufMut>(&self, dst: &mut B) -> Result<(), EncodeError> {
        if self.topic_filters.is_empty() {
            return Err(EncodeError::EmptyPayload(ControlPacketType::Unsubscribe));
        }

        encode_message_id(self.message_id, dst);

        for topic_filter in &self.topic_filters {
            encode_utf8_string(topic_filter, dst)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_filters() {
        let buf = [0x00, 0x01, b'a', 0x00, 0x02, b'b', b'c'];
        assert_eq!(decode_topic_filters(&buf).unwrap(), vec!["a".to_string(), "bc".to_string()]);
    }

    #[test]
    fn rejects_empty_and_truncated() {
        assert_eq!(decode_topic_filters(&[]), Err(DecodeError::InvalidPayloadBytes));
        assert_eq!(decode_topic_filters(&[0x00, 0x02, b'a']), Err(DecodeError::InvalidPayloadBytes));
    }
}
