use bytes::BufMut;

use crate::{
    constants::MESSAGE_ID_LEN,
    protocol::{decoding::decode_u16, ControlPacketType},
};

use super::fixed_header::FixedHeader;

/// Decodes the 2-byte message id that forms the whole variable header of the ack packets
/// and of SUBSCRIBE/SUBACK/UNSUBSCRIBE.
pub fn decode_message_id(buf: &[u8]) -> Option<(u16, usize)> {
    decode_u16(buf)
}

pub fn encode_message_id<B: BufMut>(message_id: u16, dst: &mut B) {
    dst.put_u16(message_id);
}

/// PUBACK, PUBREC, PUBREL, PUBCOMP and UNSUBACK: a fixed header and a message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageIdPacket {
    pub fixed_header: FixedHeader,
    pub message_id: u16,
}

impl MessageIdPacket {
    pub fn new(packet_type: ControlPacketType, message_id: u16) -> Self {
        Self { fixed_header: FixedHeader::new(packet_type, MESSAGE_ID_LEN), message_id }
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::Qos;

    use super::*;

    #[test]
    fn pub_rel_is_qos_one() {
        let packet = MessageIdPacket::new(ControlPacketType::PubRel, 10);
        assert_eq!(packet.fixed_header.qos, Qos::AtLeastOnce);
        assert_eq!(packet.fixed_header.remaining_length, 2);

        let packet = MessageIdPacket::new(ControlPacketType::PubAck, 10);
        assert_eq!(packet.fixed_header.qos, Qos::AtMostOnce);
    }

    #[test]
    fn message_id_needs_two_bytes() {
        assert_eq!(decode_message_id(&[0x01]), None);
        assert_eq!(decode_message_id(&[0x01, 0x02]), Some((0x0102, 2)));

        let mut buf = Vec::new();
        encode_message_id(0x0102, &mut buf);
        assert_eq!(buf, [0x01, 0x02]);
    }
}
