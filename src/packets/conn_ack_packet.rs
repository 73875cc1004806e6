use std::fmt;

use bytes::BufMut;

use crate::{
    constants::CONNACK_VARIABLE_HEADER_LEN,
    protocol::{ControlPacketType, DecodeError, EncodeError},
};

use super::fixed_header::FixedHeader;

/// Outcome of a connection attempt carried by CONNACK.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718035>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    Accepted,

    /// The Server does not support the level of the MQTT protocol requested by the Client.
    UnacceptableProtocolVersion,

    /// The Client identifier is correct UTF-8 but not allowed by the Server.
    IdentifierRejected,

    /// The Network Connection has been made but the MQTT service is unavailable.
    ServerUnavailable,

    /// The data in the user name or password is malformed.
    BadUserNameOrPassword,

    /// The Client is not authorized to connect.
    NotAuthorized,

    /// Any byte outside 0x00..=0x05, preserved as received.
    Other(u8),
}

impl ConnectReturnCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Accepted,
            0x01 => Self::UnacceptableProtocolVersion,
            0x02 => Self::IdentifierRejected,
            0x03 => Self::ServerUnavailable,
            0x04 => Self::BadUserNameOrPassword,
            0x05 => Self::NotAuthorized,
            other => Self::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Accepted => 0x00,
            Self::UnacceptableProtocolVersion => 0x01,
            Self::IdentifierRejected => 0x02,
            Self::ServerUnavailable => 0x03,
            Self::BadUserNameOrPassword => 0x04,
            Self::NotAuthorized => 0x05,
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "Connection Accepted"),
            Self::UnacceptableProtocolVersion => write!(f, "Unacceptable Protocol Version"),
            Self::IdentifierRejected => write!(f, "Identifier Rejected"),
            Self::ServerUnavailable => write!(f, "Server Unavailable"),
            Self::BadUserNameOrPassword => write!(f, "Bad User Name or Password"),
            Self::NotAuthorized => write!(f, "Not Authorized"),
            Self::Other(value) => write!(f, "Unknown Return Code {value:#04x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckVariableHeader {
    pub is_session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAckVariableHeader {
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, DecodeError> {
        let [acknowledge_flags, return_code, ..] = buf else {
            return Ok(None);
        };

        // Bits 7-1 are reserved
        if acknowledge_flags & 0b1111_1110 != 0 {
            return Err(DecodeError::InvalidVariableHeader(
                "reserved connect acknowledge flags are set".into(),
            ));
        }

        let variable_header = Self {
            is_session_present: acknowledge_flags & 1 == 1,
            return_code: ConnectReturnCode::from_u8(*return_code),
        };

        Ok(Some((variable_header, CONNACK_VARIABLE_HEADER_LEN)))
    }

    pub fn encoded_len(&self) -> usize {
        CONNACK_VARIABLE_HEADER_LEN
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) -> Result<(), EncodeError> {
        dst.put_u8(u8::from(self.is_session_present));
        dst.put_u8(self.return_code.to_u8());

        Ok(())
    }
}

/// Server reply to CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub fixed_header: FixedHeader,
    pub variable_header: ConnAckVariableHeader,
}

impl ConnAckPacket {
    pub fn new(is_session_present: bool, return_code: ConnectReturnCode) -> Self {
        Self {
            fixed_header: FixedHeader::new(ControlPacketType::ConnAck, CONNACK_VARIABLE_HEADER_LEN),
            variable_header: ConnAckVariableHeader { is_session_present, return_code },
        }
    }

    pub fn accepted() -> Self {
        Self::new(false, ConnectReturnCode::Accepted)
    }

    pub fn refused(return_code: ConnectReturnCode) -> Self {
        Self::new(false, return_code)
    }
}
