use std::fmt;

/// Represents the MQTT 3.1/3.1.1 Control Packet Types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPacketType {
    /// Connection request.
    /// Sent by: Client to Server.
    Connect = 0x01,

    /// Connect acknowledgment.
    /// Sent by: Server to Client.
    ConnAck = 0x02,

    /// Publish message.
    /// Sent by: Client to Server or Server to Client.
    Publish = 0x03,

    /// Publish acknowledgment (`QoS` 1).
    /// Sent by: Client to Server or Server to Client.
    PubAck = 0x04,

    /// Publish received (`QoS` 2 delivery part 1).
    /// Sent by: Client to Server or Server to Client.
    PubRec = 0x05,

    /// Publish release (`QoS` 2 delivery part 2).
    /// Sent by: Client to Server or Server to Client.
    PubRel = 0x06,

    /// Publish complete (`QoS` 2 delivery part 3).
    /// Sent by: Client to Server or Server to Client.
    PubComp = 0x07,

    /// Subscribe request.
    /// Sent by: Client to Server.
    Subscribe = 0x08,

    /// Subscribe acknowledgment.
    /// Sent by: Server to Client.
    SubAck = 0x09,

    /// Unsubscribe request.
    /// Sent by: Client to Server.
    Unsubscribe = 0x0A,

    /// Unsubscribe acknowledgment.
    /// Sent by: Server to Client.
    UnsubAck = 0x0B,

    /// PING request.
    /// Sent by: Client to Server.
    PingReq = 0x0C,

    /// PING response.
    /// Sent by: Server to Client.
    PingResp = 0x0D,

    /// Disconnect notification.
    /// Sent by: Client to Server.
    Disconnect = 0x0E,
}

impl ControlPacketType {
    /// Converts a numeric value to a `ControlPacketType`.
    ///
    /// Returns `None` if the value does not match a known type.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Connect),
            0x02 => Some(Self::ConnAck),
            0x03 => Some(Self::Publish),
            0x04 => Some(Self::PubAck),
            0x05 => Some(Self::PubRec),
            0x06 => Some(Self::PubRel),
            0x07 => Some(Self::PubComp),
            0x08 => Some(Self::Subscribe),
            0x09 => Some(Self::SubAck),
            0x0A => Some(Self::Unsubscribe),
            0x0B => Some(Self::UnsubAck),
            0x0C => Some(Self::PingReq),
            0x0D => Some(Self::PingResp),
            0x0E => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Converts the `ControlPacketType` to its numeric value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether the fixed header of this type must carry `QoS` 1 (flags `0010`).
    pub fn requires_qos_one(self) -> bool {
        matches!(self, Self::PubRel | Self::Subscribe | Self::Unsubscribe)
    }

    /// Whether a variable header follows the fixed header.
    pub fn has_variable_header(self) -> bool {
        !matches!(self, Self::PingReq | Self::PingResp | Self::Disconnect)
    }

    /// Whether a payload follows the variable header.
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            Self::Connect | Self::Publish | Self::Subscribe | Self::SubAck | Self::Unsubscribe
        )
    }
}

impl fmt::Display for ControlPacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Connect => "CONNECT",
            Self::ConnAck => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::PubRec => "PUBREC",
            Self::PubRel => "PUBREL",
            Self::PubComp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubAck => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubAck => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
        };

        write!(f, "{value}")
    }
}
