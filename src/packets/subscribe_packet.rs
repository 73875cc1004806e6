use bytes::BufMut;
use log::debug;

use crate::{
    constants::MESSAGE_ID_LEN,
    protocol::{
        decoding::{decode_u8, decode_utf8_string},
        encoding::{encode_utf8_string, prefixed_len},
        ControlPacketType, DecodeError, EncodeError, Qos,
    },
};

use super::{fixed_header::FixedHeader, message_id_packet::encode_message_id, required};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSubscription {
    pub topic_filter: String,
    pub requested_qos: Qos,
}

impl TopicSubscription {
    pub fn new(topic_filter: impl Into<String>, requested_qos: Qos) -> Self {
        Self { topic_filter: topic_filter.into(), requested_qos }
    }
}

/// Decodes a SUBSCRIBE payload from exactly the payload bytes.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718066>
///
/// # Errors
/// - `DecodeError::InvalidPayloadBytes` for an empty list or a truncated entry.
/// - `DecodeError::InvalidQosLevel` for a requested `QoS` byte other than 0, 1 or 2.
pub fn decode_subscriptions(buf: &[u8]) -> Result<Vec<TopicSubscription>, DecodeError> {
    let mut subscriptions = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let (topic_filter, len) = required(decode_utf8_string(&buf[offset..])?)?;
        offset += len;

        let (requested_qos, len) = required(decode_u8(&buf[offset..]))?;
        offset += len;

        // Upper 6 bits are reserved
        let requested_qos = Qos::from_u8(requested_qos).ok_or(DecodeError::InvalidQosLevel)?;

        debug!("topic filter: {topic_filter}, requested qos: {requested_qos}");
        subscriptions.push(TopicSubscription { topic_filter, requested_qos });
    }

    if subscriptions.is_empty() {
        return Err(DecodeError::InvalidPayloadBytes);
    }

    Ok(subscriptions)
}

pub fn subscriptions_len(subscriptions: &[TopicSubscription]) -> usize {
    subscriptions.iter().map(|subscription| prefixed_len(subscription.topic_filter.len()) + 1).sum()
}

pub fn encode_subscriptions<B: BufMut>(
    subscriptions: &[TopicSubscription],
    dst: &mut B,
) -> Result<(), EncodeError> {
    for subscription in subscriptions {
        encode_utf8_string(&subscription.topic_filter, dst)?;
        dst.put_u8(subscription.requested_qos.to_u8());
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub fixed_header: FixedHeader,
    pub message_id: u16,
    pub subscriptions: Vec<TopicSubscription>,
}

impl SubscribePacket {
    pub fn new(message_id: u16, subscriptions: Vec<TopicSubscription>) -> Self {
        let remaining_length = MESSAGE_ID_LEN + subscriptions_len(&subscriptions);

        Self {
            fixed_header: FixedHeader::new(ControlPacketType::Subscribe, remaining_length),
            message_id,
            subscriptions,
        }
    }

    pub fn encode_parts<B: BufMut>(&self, dst: &mut B) -> Result<(), EncodeError> {
        if self.subscriptions.is_empty() {
            return Err(EncodeError::EmptyPayload(ControlPacketType::Subscribe));
        }

        encode_message_id(self.message_id, dst);
        encode_subscriptions(&self.subscriptions, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ordered_list() {
        let buf = [0x00, 0x01, b'a', 0x01, 0x00, 0x03, b'b', b'/', b'c', 0x02];
        let subscriptions = decode_subscriptions(&buf).unwrap();

        assert_eq!(
            subscriptions,
            vec![
                TopicSubscription::new("a", Qos::AtLeastOnce),
                TopicSubscription::new("b/c", Qos::ExactlyOnce),
            ]
        );
        assert_eq!(subscriptions_len(&subscriptions), buf.len());
    }

    #[test]
    fn rejects_empty_and_truncated() {
        assert_eq!(decode_subscriptions(&[]), Err(DecodeError::InvalidPayloadBytes));
        assert_eq!(decode_subscriptions(&[0x00, 0x01, b'a']), Err(DecodeError::InvalidPayloadBytes));
        assert_eq!(decode_subscriptions(&[0x00, 0x05, b'a']), Err(DecodeError::InvalidPayloadBytes));
    }

    #[test]
    fn rejects_reserved_qos_bits() {
        assert_eq!(decode_subscriptions(&[0x00, 0x01, b'a', 0x03]), Err(DecodeError::InvalidQosLevel));
        assert_eq!(decode_subscriptions(&[0x00, 0x01, b'a', 0x81]), Err(DecodeError::InvalidQosLevel));
    }
}
