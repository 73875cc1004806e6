use std::{error::Error, fmt};

use super::ControlPacketType;

/// Reasons an inbound byte stream cannot be turned into packets.
///
/// Every variant is fatal to the connection that produced the bytes. Running out of
/// bytes is not an error and is never reported through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The high nibble of the first byte is not a known control packet type.
    InvalidMessageType(u8),

    /// QoS bits are out of range, or PUBREL/SUBSCRIBE/UNSUBSCRIBE is not at QoS 1.
    InvalidQosLevel,

    /// The remaining length field did not terminate within 4 bytes.
    RemainingLengthExceeded,

    /// CONNECT named something other than ("MQTT", 4) or ("MQIsdp", 3).
    ProtocolVersionMismatch { name: String, level: u8 },

    /// The client identifier is not acceptable for the protocol level.
    InvalidClientId,

    /// The variable header is malformed.
    InvalidVariableHeader(String),

    /// The bytes left for the payload do not match what the payload decodes to.
    InvalidPayloadBytes,

    /// String bytes are not valid UTF-8 or contain U+0000.
    InvalidUtf8String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMessageType(value) => write!(f, "Invalid message type: {value}"),
            Self::InvalidQosLevel => write!(f, "Invalid QoS level"),
            Self::RemainingLengthExceeded => write!(f, "Remaining length exceeded"),
            Self::ProtocolVersionMismatch { name, level } => {
                write!(f, "Protocol version mismatch: ({name}, {level})")
            }
            Self::InvalidClientId => write!(f, "Invalid client identifier"),
            Self::InvalidVariableHeader(reason) => write!(f, "Invalid variable header: {reason}"),
            Self::InvalidPayloadBytes => write!(f, "Invalid payload bytes"),
            Self::InvalidUtf8String => write!(f, "Invalid UTF-8 string"),
        }
    }
}

impl Error for DecodeError {}

/// Reasons a packet value cannot be written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A string or binary field is longer than a 2-byte length prefix allows.
    ExceedsMaxStringLength(usize),

    /// The packet does not fit in a 4-byte remaining length.
    RemainingLengthExceeded(usize),

    /// PUBLISH packet id presence does not match its QoS.
    InvalidPacketId,

    /// PUBREL/SUBSCRIBE/UNSUBSCRIBE fixed header is not at QoS 1.
    InvalidQosLevel,

    /// CONNECT names something other than ("MQTT", 4) or ("MQIsdp", 3).
    UnsupportedProtocol { name: String, level: u8 },

    /// The client identifier is not acceptable for the CONNECT's protocol level.
    InvalidClientId,

    /// CONNECT flags disagree with each other or with the fields present in the payload.
    InconsistentConnectFlags(String),

    /// PUBLISH topic is empty or contains wildcards.
    InvalidTopicName(String),

    /// SUBSCRIBE, SUBACK or UNSUBSCRIBE without a single entry.
    EmptyPayload(ControlPacketType),

    /// A string contains U+0000.
    InvalidUtf8String,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExceedsMaxStringLength(len) => {
                write!(f, "Exceeds max string length: {len} bytes")
            }
            Self::RemainingLengthExceeded(len) => {
                write!(f, "Remaining length exceeded: {len} bytes")
            }
            Self::InvalidPacketId => write!(f, "Packet id does not match QoS"),
            Self::InvalidQosLevel => write!(f, "Invalid QoS level"),
            Self::UnsupportedProtocol { name, level } => {
                write!(f, "Unsupported protocol: ({name}, {level})")
            }
            Self::InvalidClientId => write!(f, "Invalid client identifier"),
            Self::InconsistentConnectFlags(reason) => {
                write!(f, "Inconsistent connect flags: {reason}")
            }
            Self::InvalidTopicName(topic_name) => write!(f, "Invalid topic name: {topic_name:?}"),
            Self::EmptyPayload(packet_type) => write!(f, "{packet_type} without entries"),
            Self::InvalidUtf8String => write!(f, "Invalid UTF-8 string"),
        }
    }
}

impl Error for EncodeError {}
