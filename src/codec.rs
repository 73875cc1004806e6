use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace};

use crate::{
    constants::READ_BUFFER_CAPACITY,
    packets::Packet,
    parser::{ParseStep, Parser},
    protocol::DecodeError,
};

/// Turns the byte chunks of one connection into packets.
///
/// Owns the cumulation buffer and the parser of that connection. At most one parse pass
/// runs at a time: a chunk handed to [`StreamDecoder::on_bytes`] while a pass is running
/// (from inside the `deliver` callback) is queued and drained by the running pass, and its
/// packets go to the running pass's callback.
///
/// Any decode error closes the decoder for good: the buffer and queued chunks are discarded
/// and later chunks are ignored.
#[derive(Debug)]
pub struct StreamDecoder {
    parser: RefCell<Parser>,
    buffer: RefCell<BytesMut>,
    pending: RefCell<VecDeque<Bytes>>,
    parsing: Cell<bool>,
    closed: Cell<bool>,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            parser: RefCell::new(Parser::new()),
            buffer: RefCell::new(BytesMut::with_capacity(READ_BUFFER_CAPACITY)),
            pending: RefCell::new(VecDeque::new()),
            parsing: Cell::new(false),
            closed: Cell::new(false),
        }
    }

    /// Appends `chunk` and delivers every packet that can be completed, in order.
    ///
    /// # Errors
    /// Returns the first decode error; the connection must then be closed.
    pub fn on_bytes<F>(&self, chunk: &[u8], mut deliver: F) -> Result<(), DecodeError>
    where
        F: FnMut(Packet),
    {
        if self.closed.get() {
            debug!("Dropping {} bytes received after close", chunk.len());
            return Ok(());
        }

        trace!("inbound chunk: {}", hex::encode(chunk));

        if self.parsing.get() {
            self.pending.borrow_mut().push_back(Bytes::copy_from_slice(chunk));
            return Ok(());
        }

        self.parsing.set(true);
        self.buffer.borrow_mut().extend_from_slice(chunk);

        let result = self.drain(&mut deliver);

        self.parsing.set(false);

        if result.is_err() {
            self.discard();
        }

        result
    }

    /// Bytes buffered but not yet part of a completed stage.
    pub fn buffered_len(&self) -> usize {
        self.buffer.borrow().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn drain<F>(&self, deliver: &mut F) -> Result<(), DecodeError>
    where
        F: FnMut(Packet),
    {
        loop {
            self.parse_buffer(deliver)?;

            // Chunks that arrived while delivering
            let Some(chunk) = self.pending.borrow_mut().pop_front() else {
                return Ok(());
            };
            self.buffer.borrow_mut().extend_from_slice(&chunk);
        }
    }

    fn parse_buffer<F>(&self, deliver: &mut F) -> Result<(), DecodeError>
    where
        F: FnMut(Packet),
    {
        loop {
            // Borrows end before `deliver` runs so that it may call back into `on_bytes`
            let step = {
                let buffer = self.buffer.borrow();
                self.parser.borrow_mut().step(&buffer)?
            };

            match step {
                ParseStep::Insufficient => return Ok(()),
                ParseStep::Advanced(consumed) => self.buffer.borrow_mut().advance(consumed),
                ParseStep::Complete { packet, consumed } => {
                    self.buffer.borrow_mut().advance(consumed);
                    debug!("Decoded {} packet", packet.packet_type());
                    deliver(packet);
                }
            }
        }
    }

    fn discard(&self) {
        self.closed.set(true);
        self.parser.borrow_mut().reset();
        self.buffer.borrow_mut().clear();
        self.pending.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        encoder::encode,
        packets::{
            connect_packet::ConnectPacket,
            publish_packet::PublishPacket,
            subscribe_packet::{SubscribePacket, TopicSubscription},
        },
        protocol::Qos,
    };

    fn sample_packets() -> Vec<Packet> {
        vec![
            Packet::Connect(ConnectPacket::new("client", 60)),
            Packet::Subscribe(SubscribePacket::new(
                1,
                vec![TopicSubscription::new("t", Qos::AtLeastOnce)],
            )),
            Packet::Publish(PublishPacket::new(
                "t",
                Qos::AtLeastOnce,
                Some(2),
                Bytes::from_static(b"hi"),
            )),
            Packet::ping_req(),
        ]
    }

    fn collect(decoder: &StreamDecoder, chunk: &[u8]) -> Result<Vec<Packet>, DecodeError> {
        let mut packets = Vec::new();
        decoder.on_bytes(chunk, |packet| packets.push(packet))?;
        Ok(packets)
    }

    #[test]
    fn byte_at_a_time() {
        for packet in sample_packets() {
            let bytes = encode(&packet).unwrap();
            let decoder = StreamDecoder::new();
            let mut packets = Vec::new();

            for byte in bytes.iter() {
                packets.extend(collect(&decoder, &[*byte]).unwrap());
            }

            assert_eq!(packets, collect(&StreamDecoder::new(), &bytes).unwrap());
            assert_eq!(packets, vec![packet]);
            assert_eq!(decoder.buffered_len(), 0);
        }
    }

    #[test]
    fn many_packets_in_one_chunk() {
        let expected = sample_packets();
        let mut chunk = BytesMut::new();
        for packet in &expected {
            chunk.extend_from_slice(&encode(packet).unwrap());
        }

        let decoder = StreamDecoder::new();
        assert_eq!(collect(&decoder, &chunk).unwrap(), expected);
    }

    #[test]
    fn packet_split_across_chunks() {
        let first = encode(&sample_packets()[2]).unwrap();
        let second = encode(&Packet::ping_req()).unwrap();
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&first);
        bytes.extend_from_slice(&second);

        let decoder = StreamDecoder::new();
        let split = first.len() + 1;

        assert_eq!(collect(&decoder, &bytes[..split]).unwrap(), vec![sample_packets()[2].clone()]);
        assert_eq!(decoder.buffered_len(), 1);
        assert_eq!(collect(&decoder, &bytes[split..]).unwrap(), vec![Packet::ping_req()]);
    }

    #[test]
    fn malformed_remaining_length_emits_nothing() {
        let decoder = StreamDecoder::new();
        let mut delivered = 0;

        let result = decoder.on_bytes(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], |_| delivered += 1);

        assert_eq!(result, Err(DecodeError::RemainingLengthExceeded));
        assert_eq!(delivered, 0);
        assert!(decoder.is_closed());
        assert_eq!(decoder.buffered_len(), 0);

        // Closed for good
        assert_eq!(collect(&decoder, &[0xC0, 0x00]).unwrap(), vec![]);
    }

    #[test]
    fn error_after_valid_packet() {
        let decoder = StreamDecoder::new();
        let mut chunk = encode(&Packet::ping_req()).unwrap().to_vec();
        chunk.extend([0x00, 0x00]);

        let mut packets = Vec::new();
        let result = decoder.on_bytes(&chunk, |packet| packets.push(packet));

        assert_eq!(result, Err(DecodeError::InvalidMessageType(0)));
        assert_eq!(packets, vec![Packet::ping_req()]);
    }

    #[test]
    fn reentrant_chunk_is_queued() {
        let decoder = Rc::new(StreamDecoder::new());
        let second = encode(&Packet::pub_ack(9)).unwrap();
        let mut packets = Vec::new();

        let inner = Rc::clone(&decoder);
        decoder
            .on_bytes(&encode(&Packet::ping_req()).unwrap(), |packet| {
                if packet == Packet::ping_req() {
                    // Delivered to the running pass, not to this callback
                    inner.on_bytes(&second, |_| panic!("re-entrant pass ran")).unwrap();
                }
                packets.push(packet);
            })
            .unwrap();

        assert_eq!(packets, vec![Packet::ping_req(), Packet::pub_ack(9)]);
        assert_eq!(decoder.buffered_len(), 0);
    }
}
