use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    constants::MESSAGE_ID_LEN,
    packets::{
        fixed_header::FixedHeader, message_id_packet::encode_message_id,
        subscribe_packet::subscriptions_len, unsubscribe_packet::UnsubscribePacket, Packet,
    },
    protocol::{EncodeError, Qos},
};

/// Encodes a packet into a fresh buffer.
///
/// # Errors
/// See [`encode_into`].
pub fn encode(packet: &Packet) -> Result<Bytes, EncodeError> {
    let mut buf = BytesMut::new();
    encode_into(packet, &mut buf)?;
    Ok(buf.freeze())
}

/// Appends the wire form of `packet` to `dst`.
///
/// The remaining length is recomputed from the parts; the value stored in the packet's
/// fixed header is not trusted. Nothing is written when an error is returned.
///
/// # Errors
/// - `EncodeError::InvalidPacketId` unless a PUBLISH has a packet id exactly when its `QoS` is above 0.
/// - `EncodeError::ExceedsMaxStringLength` for a string or binary field over 65,535 bytes.
/// - `EncodeError::RemainingLengthExceeded` if the packet does not fit the remaining length field.
/// - `EncodeError::InvalidQosLevel` for PUBREL/SUBSCRIBE/UNSUBSCRIBE not at `QoS` 1.
/// - Any error of [`ConnectPacket::validate`] for a CONNECT.
/// - `EncodeError::InvalidTopicName` for a PUBLISH topic the decoder would refuse.
/// - `EncodeError::EmptyPayload` for SUBSCRIBE, SUBACK or UNSUBSCRIBE without entries.
/// - `EncodeError::InvalidUtf8String` for a string containing U+0000.
///
/// [`ConnectPacket::validate`]: crate::packets::connect_packet::ConnectPacket::validate
pub fn encode_into(packet: &Packet, dst: &mut BytesMut) -> Result<(), EncodeError> {
    if let Packet::Publish(publish) = packet {
        let has_packet_id = publish.variable_header.packet_id.is_some();
        if has_packet_id != (publish.fixed_header.qos > Qos::AtMostOnce) {
            return Err(EncodeError::InvalidPacketId);
        }
    }

    let fixed_header = FixedHeader { remaining_length: body_len(packet), ..*packet.fixed_header() };

    let mut buf = BytesMut::with_capacity(fixed_header.encoded_len() + fixed_header.remaining_length);
    fixed_header.encode(&mut buf)?;
    encode_body(packet, &mut buf)?;

    dst.extend_from_slice(&buf);
    Ok(())
}

/// Exact number of bytes after the fixed header.
pub fn body_len(packet: &Packet) -> usize {
    match packet {
        Packet::Connect(connect) => {
            connect.variable_header.encoded_len() + connect.payload.encoded_len()
        }
        Packet::ConnAck(conn_ack) => conn_ack.variable_header.encoded_len(),
        Packet::Publish(publish) => publish.variable_header.encoded_len() + publish.payload.len(),
        Packet::PubAck(_)
        | Packet::PubRec(_)
        | Packet::PubRel(_)
        | Packet::PubComp(_)
        | Packet::UnsubAck(_) => MESSAGE_ID_LEN,
        Packet::Subscribe(subscribe) => MESSAGE_ID_LEN + subscriptions_len(&subscribe.subscriptions),
        Packet::SubAck(sub_ack) => MESSAGE_ID_LEN + sub_ack.return_codes.len(),
        Packet::Unsubscribe(unsubscribe) => {
            MESSAGE_ID_LEN + UnsubscribePacket::topic_filters_len(&unsubscribe.topic_filters)
        }
        Packet::PingReq(_) | Packet::PingResp(_) | Packet::Disconnect(_) => 0,
    }
}

fn encode_body<B: BufMut>(packet: &Packet, dst: &mut B) -> Result<(), EncodeError> {
    match packet {
        Packet::Connect(connect) => {
            connect.validate()?;
            connect.variable_header.encode(dst)?;
            connect.payload.encode(dst)
        }
        Packet::ConnAck(conn_ack) => conn_ack.variable_header.encode(dst),
        Packet::Publish(publish) => {
            publish.variable_header.encode(dst)?;
            dst.put_slice(&publish.payload);
            Ok(())
        }
        Packet::PubAck(packet)
        | Packet::PubRec(packet)
        | Packet::PubRel(packet)
        | Packet::PubComp(packet)
        | Packet::UnsubAck(packet) => {
            encode_message_id(packet.message_id, dst);
            Ok(())
        }
        Packet::Subscribe(subscribe) => subscribe.encode_parts(dst),
        Packet::SubAck(sub_ack) => sub_ack.encode_parts(dst),
        Packet::Unsubscribe(unsubscribe) => unsubscribe.encode_parts(dst),
        Packet::PingReq(_) | Packet::PingResp(_) | Packet::Disconnect(_) => Ok(()),
    }
}
