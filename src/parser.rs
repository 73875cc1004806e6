//! Resumable packet parser.
//!
//! The parser never consumes bytes it cannot fully interpret: each call to [`Parser::step`]
//! either reports that more data is needed (nothing consumed), advances one stage and
//! reports how many bytes that stage took, or completes a packet.

use log::trace;

use crate::{
    packets::{fixed_header::FixedHeader, Packet, Payload, VariableHeader},
    protocol::DecodeError,
};

/// Stage the parser is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    AwaitingFixedHeader,
    AwaitingVariableHeader,
    AwaitingPayload,
}

/// Result of a single parser step.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseStep {
    /// Not enough bytes for the current stage; nothing was consumed.
    Insufficient,

    /// A stage was decoded; the caller must drop this many bytes from the front of its buffer.
    Advanced(usize),

    /// A packet was completed; the caller must drop `consumed` bytes from the front of its buffer.
    Complete { packet: Packet, consumed: usize },
}

#[derive(Debug, Default)]
pub struct Parser {
    state: ParserState,
    fixed_header: Option<FixedHeader>,
    variable_header: Option<VariableHeader>,

    /// Bytes still owed to the current packet after the stages decoded so far.
    remaining: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Back to `AwaitingFixedHeader`, dropping any partial packet.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Cheap check that `buf` is definitely too short for the current stage.
    pub fn needs_more_data(&self, buf: &[u8]) -> bool {
        match (self.state, &self.fixed_header) {
            // First byte plus at least one remaining length byte
            (ParserState::AwaitingFixedHeader, _) => buf.len() < 2,
            (ParserState::AwaitingVariableHeader, Some(fixed_header)) => {
                buf.len() < VariableHeader::min_len(fixed_header, buf).min(self.remaining)
            }
            (ParserState::AwaitingPayload, _) => buf.len() < self.remaining,
            (ParserState::AwaitingVariableHeader, None) => false,
        }
    }

    /// Decodes the current stage from the front of `buf`.
    ///
    /// On error the parser is reset; the connection the bytes came from must be closed.
    pub fn step(&mut self, buf: &[u8]) -> Result<ParseStep, DecodeError> {
        if self.needs_more_data(buf) {
            return Ok(ParseStep::Insufficient);
        }

        let result = match self.state {
            ParserState::AwaitingFixedHeader => self.step_fixed_header(buf),
            ParserState::AwaitingVariableHeader => self.step_variable_header(buf),
            ParserState::AwaitingPayload => self.step_payload(buf),
        };

        if result.is_err() {
            self.reset();
        }

        result
    }

    fn step_fixed_header(&mut self, buf: &[u8]) -> Result<ParseStep, DecodeError> {
        let Some((fixed_header, consumed)) = FixedHeader::decode(buf)? else {
            return Ok(ParseStep::Insufficient);
        };

        trace!("fixed header: {fixed_header:?}");

        let packet_type = fixed_header.packet_type;
        self.remaining = fixed_header.remaining_length;
        self.fixed_header = Some(fixed_header);

        if packet_type.has_variable_header() {
            self.state = ParserState::AwaitingVariableHeader;
            return Ok(ParseStep::Advanced(consumed));
        }

        if self.remaining != 0 {
            return Err(DecodeError::InvalidPayloadBytes);
        }

        self.complete(None, consumed)
    }

    fn step_variable_header(&mut self, buf: &[u8]) -> Result<ParseStep, DecodeError> {
        let fixed_header = self.current_fixed_header()?;

        // Never read past the bytes this packet owns
        let window = &buf[..buf.len().min(self.remaining)];

        let Some((variable_header, consumed)) = VariableHeader::decode(&fixed_header, window)? else {
            if window.len() == self.remaining {
                return Err(DecodeError::InvalidVariableHeader(format!(
                    "{} variable header does not fit in remaining length {}",
                    fixed_header.packet_type, fixed_header.remaining_length
                )));
            }
            return Ok(ParseStep::Insufficient);
        };

        trace!("variable header: {variable_header:?}");

        self.remaining -= consumed;

        if fixed_header.packet_type.has_payload() {
            self.variable_header = Some(variable_header);
            self.state = ParserState::AwaitingPayload;
            return Ok(ParseStep::Advanced(consumed));
        }

        if self.remaining != 0 {
            return Err(DecodeError::InvalidPayloadBytes);
        }

        self.complete(Some(variable_header), consumed)
    }

    fn step_payload(&mut self, buf: &[u8]) -> Result<ParseStep, DecodeError> {
        let fixed_header = self.current_fixed_header()?;
        let variable_header = self.variable_header.take().ok_or_else(|| {
            DecodeError::InvalidVariableHeader("payload reached without a variable header".into())
        })?;

        let consumed = self.remaining;
        let payload = Payload::decode(&fixed_header, &variable_header, &buf[..consumed])?;

        self.remaining = 0;
        self.complete_with(fixed_header, Some(variable_header), Some(payload), consumed)
    }

    fn complete(
        &mut self,
        variable_header: Option<VariableHeader>,
        consumed: usize,
    ) -> Result<ParseStep, DecodeError> {
        let fixed_header = self.current_fixed_header()?;
        self.complete_with(fixed_header, variable_header, None, consumed)
    }

    fn complete_with(
        &mut self,
        fixed_header: FixedHeader,
        variable_header: Option<VariableHeader>,
        payload: Option<Payload>,
        consumed: usize,
    ) -> Result<ParseStep, DecodeError> {
        let packet = Packet::from_parts(fixed_header, variable_header, payload)?;
        self.reset();

        Ok(ParseStep::Complete { packet, consumed })
    }

    fn current_fixed_header(&self) -> Result<FixedHeader, DecodeError> {
        self.fixed_header.ok_or_else(|| {
            DecodeError::InvalidVariableHeader("stage reached without a fixed header".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{
        encoder::encode,
        packets::{connect_packet::ConnectPacket, publish_packet::PublishPacket},
        protocol::Qos,
    };

    /// Runs the parser over `buf` the way the stream decoder does.
    fn parse_all(parser: &mut Parser, mut buf: &[u8]) -> Result<(Vec<Packet>, usize), DecodeError> {
        let mut packets = Vec::new();

        loop {
            match parser.step(buf)? {
                ParseStep::Insufficient => return Ok((packets, buf.len())),
                ParseStep::Advanced(consumed) => buf = &buf[consumed..],
                ParseStep::Complete { packet, consumed } => {
                    packets.push(packet);
                    buf = &buf[consumed..];
                }
            }
        }
    }

    #[test]
    fn walks_every_stage() {
        let packet = Packet::Publish(PublishPacket::new(
            "a/b",
            Qos::AtLeastOnce,
            Some(1),
            Bytes::from_static(b"xyz"),
        ));
        let bytes = encode(&packet).unwrap();
        let mut parser = Parser::new();

        assert_eq!(parser.step(&bytes).unwrap(), ParseStep::Advanced(2));
        assert_eq!(parser.state(), ParserState::AwaitingVariableHeader);

        assert_eq!(parser.step(&bytes[2..]).unwrap(), ParseStep::Advanced(7));
        assert_eq!(parser.state(), ParserState::AwaitingPayload);

        assert_eq!(parser.step(&bytes[9..11]).unwrap(), ParseStep::Insufficient);
        assert_eq!(parser.state(), ParserState::AwaitingPayload);

        assert_eq!(
            parser.step(&bytes[9..]).unwrap(),
            ParseStep::Complete { packet, consumed: 3 }
        );
        assert_eq!(parser.state(), ParserState::AwaitingFixedHeader);
    }

    #[test]
    fn insufficient_consumes_nothing() {
        let bytes = encode(&Packet::Connect(ConnectPacket::new("client", 60))).unwrap();
        let mut parser = Parser::new();

        assert_eq!(parser.step(&bytes[..1]).unwrap(), ParseStep::Insufficient);
        assert_eq!(parser.step(&bytes).unwrap(), ParseStep::Advanced(2));

        // CONNECT needs at least 10 variable header bytes
        assert!(parser.needs_more_data(&bytes[2..11]));
        assert_eq!(parser.step(&bytes[2..11]).unwrap(), ParseStep::Insufficient);
        assert_eq!(parser.step(&bytes[2..]).unwrap(), ParseStep::Advanced(10));
    }

    #[test]
    fn ping_completes_from_fixed_header() {
        let mut parser = Parser::new();
        assert_eq!(
            parser.step(&[0xC0, 0x00]).unwrap(),
            ParseStep::Complete { packet: Packet::ping_req(), consumed: 2 }
        );

        assert_eq!(parser.step(&[0xE0, 0x01, 0x00]), Err(DecodeError::InvalidPayloadBytes));
        assert_eq!(parser.state(), ParserState::AwaitingFixedHeader);
    }

    #[test]
    fn ack_completes_from_variable_header() {
        let mut parser = Parser::new();
        let (packets, left) = parse_all(&mut parser, &[0x40, 0x02, 0x00, 0x05]).unwrap();
        assert_eq!(packets, vec![Packet::pub_ack(5)]);
        assert_eq!(left, 0);
    }

    #[test]
    fn variable_header_cannot_outgrow_remaining_length() {
        let mut parser = Parser::new();
        assert!(matches!(
            parse_all(&mut parser, &[0x40, 0x01, 0x00, 0x05]),
            Err(DecodeError::InvalidVariableHeader(_))
        ));
        assert_eq!(parser.state(), ParserState::AwaitingFixedHeader);

        assert!(matches!(
            parse_all(&mut parser, &[0x40, 0x00]),
            Err(DecodeError::InvalidVariableHeader(_))
        ));
    }

    #[test]
    fn extra_bytes_after_ack() {
        let mut parser = Parser::new();
        assert_eq!(
            parse_all(&mut parser, &[0x40, 0x03, 0x00, 0x05, 0x00]),
            Err(DecodeError::InvalidPayloadBytes)
        );
    }

    #[test]
    fn resets_after_error() {
        let mut parser = Parser::new();
        assert_eq!(parser.step(&[0x30, 0x05]).unwrap(), ParseStep::Advanced(2));
        assert!(parser.step(&[0x00, 0x00, 0x00]).is_err());
        assert_eq!(parser.state(), ParserState::AwaitingFixedHeader);

        let (packets, _) = parse_all(&mut parser, &[0xD0, 0x00]).unwrap();
        assert_eq!(packets, vec![Packet::ping_resp()]);
    }
}
