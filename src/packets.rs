use bytes::Bytes;

use crate::{
    constants::{CONNECT_VARIABLE_HEADER_MIN_LEN, MESSAGE_ID_LEN, CONNACK_VARIABLE_HEADER_LEN},
    protocol::{ControlPacketType, DecodeError},
};

pub mod conn_ack_packet;
pub mod connect_packet;
pub mod fixed_header;
pub mod message_id_packet;
pub mod publish_packet;
pub mod sub_ack_packet;
pub mod subscribe_packet;
pub mod unsubscribe_packet;

use conn_ack_packet::{ConnAckPacket, ConnAckVariableHeader};
use connect_packet::{ConnectPacket, ConnectPayload, ConnectVariableHeader};
use fixed_header::FixedHeader;
use message_id_packet::{decode_message_id, MessageIdPacket};
use publish_packet::{PublishPacket, PublishVariableHeader};
use sub_ack_packet::{decode_return_codes, SubAckPacket, SubAckReturnCode};
use subscribe_packet::{decode_subscriptions, SubscribePacket, TopicSubscription};
use unsubscribe_packet::{decode_topic_filters, UnsubscribePacket};

/// Turns a truncated field inside a fully buffered payload into an error.
pub(crate) fn required<T>(value: Option<(T, usize)>) -> Result<(T, usize), DecodeError> {
    value.ok_or(DecodeError::InvalidPayloadBytes)
}

/// The variable header decoded for the packet under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableHeader {
    Connect(ConnectVariableHeader),
    ConnAck(ConnAckVariableHeader),
    Publish(PublishVariableHeader),
    MessageId(u16),
}

impl VariableHeader {
    /// Cheap lower bound on the bytes the variable header of this packet needs.
    pub fn min_len(fixed_header: &FixedHeader, buf: &[u8]) -> usize {
        match fixed_header.packet_type {
            ControlPacketType::Connect => CONNECT_VARIABLE_HEADER_MIN_LEN,
            ControlPacketType::ConnAck => CONNACK_VARIABLE_HEADER_LEN,
            ControlPacketType::Publish => PublishVariableHeader::min_len(buf, fixed_header.qos),
            ControlPacketType::PingReq
            | ControlPacketType::PingResp
            | ControlPacketType::Disconnect => 0,
            _ => MESSAGE_ID_LEN,
        }
    }

    /// Decodes the variable header for `fixed_header` from the start of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` ends before the header does.
    pub fn decode(fixed_header: &FixedHeader, buf: &[u8]) -> Result<Option<(Self, usize)>, DecodeError> {
        let decoded = match fixed_header.packet_type {
            ControlPacketType::Connect => {
                ConnectVariableHeader::decode(buf)?.map(|(header, len)| (Self::Connect(header), len))
            }
            ControlPacketType::ConnAck => {
                ConnAckVariableHeader::decode(buf)?.map(|(header, len)| (Self::ConnAck(header), len))
            }
            ControlPacketType::Publish => PublishVariableHeader::decode(buf, fixed_header.qos)?
                .map(|(header, len)| (Self::Publish(header), len)),
            ControlPacketType::PingReq
            | ControlPacketType::PingResp
            | ControlPacketType::Disconnect => {
                return Err(DecodeError::InvalidVariableHeader(format!(
                    "{} has no variable header",
                    fixed_header.packet_type
                )))
            }
            _ => decode_message_id(buf).map(|(message_id, len)| (Self::MessageId(message_id), len)),
        };

        Ok(decoded)
    }
}

/// The payload decoded for the packet under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Connect(ConnectPayload),
    Publish(Bytes),
    Subscribe(Vec<TopicSubscription>),
    SubAck(Vec<SubAckReturnCode>),
    Unsubscribe(Vec<String>),
}

impl Payload {
    /// Decodes a payload from `buf`, which holds exactly the payload bytes.
    pub fn decode(
        fixed_header: &FixedHeader,
        variable_header: &VariableHeader,
        buf: &[u8],
    ) -> Result<Self, DecodeError> {
        match (fixed_header.packet_type, variable_header) {
            (ControlPacketType::Connect, VariableHeader::Connect(header)) => {
                ConnectPayload::decode(buf, header).map(Self::Connect)
            }
            (ControlPacketType::Publish, _) => Ok(Self::Publish(Bytes::copy_from_slice(buf))),
            (ControlPacketType::Subscribe, _) => decode_subscriptions(buf).map(Self::Subscribe),
            (ControlPacketType::SubAck, _) => decode_return_codes(buf).map(Self::SubAck),
            (ControlPacketType::Unsubscribe, _) => decode_topic_filters(buf).map(Self::Unsubscribe),
            (packet_type, _) => Err(DecodeError::InvalidVariableHeader(format!(
                "{packet_type} has no payload"
            ))),
        }
    }
}

/// Any MQTT 3.1/3.1.1 control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(MessageIdPacket),
    PubRec(MessageIdPacket),
    PubRel(MessageIdPacket),
    PubComp(MessageIdPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(MessageIdPacket),
    PingReq(FixedHeader),
    PingResp(FixedHeader),
    Disconnect(FixedHeader),
}

impl Packet {
    /// Assembles a packet from the parts the parser accumulated.
    ///
    /// # Errors
    /// - `DecodeError::InvalidVariableHeader` if the parts do not belong to the packet type.
    pub fn from_parts(
        fixed_header: FixedHeader,
        variable_header: Option<VariableHeader>,
        payload: Option<Payload>,
    ) -> Result<Self, DecodeError> {
        use ControlPacketType as T;

        let packet = match (fixed_header.packet_type, variable_header, payload) {
            (T::Connect, Some(VariableHeader::Connect(variable_header)), Some(Payload::Connect(payload))) => {
                Self::Connect(ConnectPacket { fixed_header, variable_header, payload })
            }
            (T::ConnAck, Some(VariableHeader::ConnAck(variable_header)), None) => {
                Self::ConnAck(ConnAckPacket { fixed_header, variable_header })
            }
            (T::Publish, Some(VariableHeader::Publish(variable_header)), Some(Payload::Publish(payload))) => {
                Self::Publish(PublishPacket { fixed_header, variable_header, payload })
            }
            (T::Subscribe, Some(VariableHeader::MessageId(message_id)), Some(Payload::Subscribe(subscriptions))) => {
                Self::Subscribe(SubscribePacket { fixed_header, message_id, subscriptions })
            }
            (T::SubAck, Some(VariableHeader::MessageId(message_id)), Some(Payload::SubAck(return_codes))) => {
                Self::SubAck(SubAckPacket { fixed_header, message_id, return_codes })
            }
            (T::Unsubscribe, Some(VariableHeader::MessageId(message_id)), Some(Payload::Unsubscribe(topic_filters))) => {
                Self::Unsubscribe(UnsubscribePacket { fixed_header, message_id, topic_filters })
            }
            (packet_type, Some(VariableHeader::MessageId(message_id)), None) => {
                let packet = MessageIdPacket { fixed_header, message_id };
                match packet_type {
                    T::PubAck => Self::PubAck(packet),
                    T::PubRec => Self::PubRec(packet),
                    T::PubRel => Self::PubRel(packet),
                    T::PubComp => Self::PubComp(packet),
                    T::UnsubAck => Self::UnsubAck(packet),
                    _ => return Err(mismatch(packet_type)),
                }
            }
            (T::PingReq, None, None) => Self::PingReq(fixed_header),
            (T::PingResp, None, None) => Self::PingResp(fixed_header),
            (T::Disconnect, None, None) => Self::Disconnect(fixed_header),
            (packet_type, _, _) => return Err(mismatch(packet_type)),
        };

        Ok(packet)
    }

    pub fn ping_req() -> Self {
        Self::PingReq(FixedHeader::new(ControlPacketType::PingReq, 0))
    }

    pub fn ping_resp() -> Self {
        Self::PingResp(FixedHeader::new(ControlPacketType::PingResp, 0))
    }

    pub fn disconnect() -> Self {
        Self::Disconnect(FixedHeader::new(ControlPacketType::Disconnect, 0))
    }

    pub fn pub_ack(message_id: u16) -> Self {
        Self::PubAck(MessageIdPacket::new(ControlPacketType::PubAck, message_id))
    }

    pub fn pub_rec(message_id: u16) -> Self {
        Self::PubRec(MessageIdPacket::new(ControlPacketType::PubRec, message_id))
    }

    pub fn pub_rel(message_id: u16) -> Self {
        Self::PubRel(MessageIdPacket::new(ControlPacketType::PubRel, message_id))
    }

    pub fn pub_comp(message_id: u16) -> Self {
        Self::PubComp(MessageIdPacket::new(ControlPacketType::PubComp, message_id))
    }

    pub fn unsub_ack(message_id: u16) -> Self {
        Self::UnsubAck(MessageIdPacket::new(ControlPacketType::UnsubAck, message_id))
    }

    pub fn fixed_header(&self) -> &FixedHeader {
        match self {
            Self::Connect(packet) => &packet.fixed_header,
            Self::ConnAck(packet) => &packet.fixed_header,
            Self::Publish(packet) => &packet.fixed_header,
            Self::PubAck(packet)
            | Self::PubRec(packet)
            | Self::PubRel(packet)
            | Self::PubComp(packet)
            | Self::UnsubAck(packet) => &packet.fixed_header,
            Self::Subscribe(packet) => &packet.fixed_header,
            Self::SubAck(packet) => &packet.fixed_header,
            Self::Unsubscribe(packet) => &packet.fixed_header,
            Self::PingReq(fixed_header)
            | Self::PingResp(fixed_header)
            | Self::Disconnect(fixed_header) => fixed_header,
        }
    }

    pub fn packet_type(&self) -> ControlPacketType {
        self.fixed_header().packet_type
    }
}

fn mismatch(packet_type: ControlPacketType) -> DecodeError {
    DecodeError::InvalidVariableHeader(format!("parts do not match a {packet_type} packet"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Qos;

    #[test]
    fn from_parts_matches_type() {
        let fixed_header = FixedHeader::new(ControlPacketType::PubAck, 2);
        let packet =
            Packet::from_parts(fixed_header, Some(VariableHeader::MessageId(9)), None).unwrap();
        assert_eq!(packet, Packet::pub_ack(9));
        assert_eq!(packet.packet_type(), ControlPacketType::PubAck);

        let fixed_header = FixedHeader::new(ControlPacketType::Subscribe, 2);
        assert!(matches!(
            Packet::from_parts(fixed_header, Some(VariableHeader::MessageId(9)), None),
            Err(DecodeError::InvalidVariableHeader(_))
        ));
    }

    #[test]
    fn variable_header_min_len() {
        let connect = FixedHeader::new(ControlPacketType::Connect, 20);
        assert_eq!(VariableHeader::min_len(&connect, &[]), 10);

        let ping = FixedHeader::new(ControlPacketType::PingReq, 0);
        assert_eq!(VariableHeader::min_len(&ping, &[]), 0);

        let mut publish = FixedHeader::new(ControlPacketType::Publish, 20);
        publish.qos = Qos::AtLeastOnce;
        assert_eq!(VariableHeader::min_len(&publish, &[0x00, 0x04]), 8);
    }
}
