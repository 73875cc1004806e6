use bytes::{BufMut, Bytes};

use crate::{
    constants::{
        LEGACY_PROTOCOL_LEVEL, LEGACY_PROTOCOL_NAME, PROTOCOL_LEVEL, PROTOCOL_NAME,
    },
    protocol::{
        decoding::{decode_binary_data, decode_u16, decode_u8, decode_utf8_string},
        encoding::{encode_binary_data, encode_utf8_string, prefixed_len},
        validation::validate_client_id,
        ControlPacketType, DecodeError, EncodeError, Qos,
    },
};

use super::{fixed_header::FixedHeader, required};

/// Variable header of a CONNECT packet.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718030>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectVariableHeader {
    /// "MQTT" for 3.1.1, "MQIsdp" for 3.1.
    pub protocol_name: String,

    /// 4 for 3.1.1, 3 for 3.1.
    pub protocol_level: u8,

    pub has_user_name: bool,
    pub has_password: bool,
    pub is_will_retain: bool,
    pub will_qos: Qos,
    pub is_will_flag: bool,
    pub is_clean_session: bool,

    /// Maximum interval in seconds between two control packets sent by the client.
    pub keep_alive_time_seconds: u16,
}

impl ConnectVariableHeader {
    /// A 3.1.1 clean session with no will and no credentials.
    pub fn new(keep_alive_time_seconds: u16) -> Self {
        Self {
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_level: PROTOCOL_LEVEL,
            has_user_name: false,
            has_password: false,
            is_will_retain: false,
            will_qos: Qos::AtMostOnce,
            is_will_flag: false,
            is_clean_session: true,
            keep_alive_time_seconds,
        }
    }

    /// Decodes the variable header from `buf`.
    ///
    /// **Specification:**
    ///
    /// ```text
    /// protocol name   length-prefixed string
    /// protocol level  1 byte
    /// connect flags   1 byte: user name | password | will retain | will qos (2) | will flag | clean session | reserved
    /// keep alive      2 bytes
    /// ```
    ///
    /// # Errors
    /// - `DecodeError::ProtocolVersionMismatch` unless the pair is ("MQTT", 4) or ("MQIsdp", 3).
    /// - `DecodeError::InvalidVariableHeader` for a set reserved flag, will options without the
    ///   will flag, or a password without a user name.
    /// - `DecodeError::InvalidQosLevel` for a will `QoS` of 3.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, DecodeError> {
        let Some((protocol_name, mut offset)) = decode_utf8_string(buf)? else {
            return Ok(None);
        };

        let Some((protocol_level, len)) = decode_u8(&buf[offset..]) else {
            return Ok(None);
        };
        offset += len;

        let supported = (protocol_name == PROTOCOL_NAME && protocol_level == PROTOCOL_LEVEL)
            || (protocol_name == LEGACY_PROTOCOL_NAME && protocol_level == LEGACY_PROTOCOL_LEVEL);
        if !supported {
            return Err(DecodeError::ProtocolVersionMismatch {
                name: protocol_name,
                level: protocol_level,
            });
        }

        let Some((connect_flags, len)) = decode_u8(&buf[offset..]) else {
            return Ok(None);
        };
        offset += len;

        let Some((keep_alive_time_seconds, len)) = decode_u16(&buf[offset..]) else {
            return Ok(None);
        };
        offset += len;

        // Reserved connect flag (last bit) must be set to 0
        if connect_flags & 1 != 0 {
            return Err(DecodeError::InvalidVariableHeader("reserved connect flag is set".into()));
        }

        let is_clean_session = (connect_flags >> 1) & 1 == 1;
        let is_will_flag = (connect_flags >> 2) & 1 == 1;
        let will_qos =
            Qos::from_u8((connect_flags >> 3) & 0b0000_0011).ok_or(DecodeError::InvalidQosLevel)?;
        let is_will_retain = (connect_flags >> 5) & 1 == 1;
        let has_password = (connect_flags >> 6) & 1 == 1;
        let has_user_name = (connect_flags >> 7) & 1 == 1;

        if !is_will_flag && (is_will_retain || will_qos != Qos::AtMostOnce) {
            return Err(DecodeError::InvalidVariableHeader(
                "will qos and retain require the will flag".into(),
            ));
        }

        if has_password && !has_user_name {
            return Err(DecodeError::InvalidVariableHeader(
                "password flag set without user name flag".into(),
            ));
        }

        let variable_header = Self {
            protocol_name,
            protocol_level,
            has_user_name,
            has_password,
            is_will_retain,
            will_qos,
            is_will_flag,
            is_clean_session,
            keep_alive_time_seconds,
        };

        Ok(Some((variable_header, offset)))
    }

    pub fn encoded_len(&self) -> usize {
        prefixed_len(self.protocol_name.len()) + 1 + 1 + 2
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) -> Result<(), EncodeError> {
        encode_utf8_string(&self.protocol_name, dst)?;
        dst.put_u8(self.protocol_level);
        dst.put_u8(self.connect_flags());
        dst.put_u16(self.keep_alive_time_seconds);

        Ok(())
    }

    fn connect_flags(&self) -> u8 {
        (u8::from(self.has_user_name) << 7)
            | (u8::from(self.has_password) << 6)
            | (u8::from(self.is_will_retain) << 5)
            | (self.will_qos.to_u8() << 3)
            | (u8::from(self.is_will_flag) << 2)
            | (u8::from(self.is_clean_session) << 1)
    }
}

/// Payload of a CONNECT packet. Optional fields are present exactly when the matching
/// connect flag is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPayload {
    pub client_identifier: String,
    pub will_topic: Option<String>,
    pub will_message: Option<Bytes>,
    pub user_name: Option<String>,
    pub password: Option<Bytes>,
}

impl ConnectPayload {
    pub fn new(client_identifier: impl Into<String>) -> Self {
        Self {
            client_identifier: client_identifier.into(),
            will_topic: None,
            will_message: None,
            user_name: None,
            password: None,
        }
    }

    /// Decodes the payload from `buf`, which must hold exactly the payload bytes.
    ///
    /// # Errors
    /// - `DecodeError::InvalidClientId` if the identifier is not valid for the protocol level.
    /// - `DecodeError::InvalidPayloadBytes` if a field is truncated or bytes are left over.
    pub fn decode(buf: &[u8], variable_header: &ConnectVariableHeader) -> Result<Self, DecodeError> {
        let (client_identifier, mut offset) = required(decode_utf8_string(buf)?)?;
        validate_client_id(&client_identifier, variable_header.protocol_level)?;

        let (will_topic, will_message) = if variable_header.is_will_flag {
            let (topic, len) = required(decode_utf8_string(&buf[offset..])?)?;
            offset += len;

            let (message, len) = required(decode_binary_data(&buf[offset..]))?;
            offset += len;

            (Some(topic), Some(Bytes::copy_from_slice(message)))
        } else {
            (None, None)
        };

        let user_name = if variable_header.has_user_name {
            let (user_name, len) = required(decode_utf8_string(&buf[offset..])?)?;
            offset += len;
            Some(user_name)
        } else {
            None
        };

        let password = if variable_header.has_password {
            let (password, len) = required(decode_binary_data(&buf[offset..]))?;
            offset += len;
            Some(Bytes::copy_from_slice(password))
        } else {
            None
        };

        if offset != buf.len() {
            return Err(DecodeError::InvalidPayloadBytes);
        }

        Ok(Self { client_identifier, will_topic, will_message, user_name, password })
    }

    pub fn encoded_len(&self) -> usize {
        prefixed_len(self.client_identifier.len())
            + self.will_topic.as_ref().map_or(0, |value| prefixed_len(value.len()))
            + self.will_message.as_ref().map_or(0, |value| prefixed_len(value.len()))
            + self.user_name.as_ref().map_or(0, |value| prefixed_len(value.len()))
            + self.password.as_ref().map_or(0, |value| prefixed_len(value.len()))
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) -> Result<(), EncodeError> {
        encode_utf8_string(&self.client_identifier, dst)?;

        if let Some(will_topic) = &self.will_topic {
            encode_utf8_string(will_topic, dst)?;
        }
        if let Some(will_message) = &self.will_message {
            encode_binary_data(will_message, dst)?;
        }
        if let Some(user_name) = &self.user_name {
            encode_utf8_string(user_name, dst)?;
        }
        if let Some(password) = &self.password {
            encode_binary_data(password, dst)?;
        }

        Ok(())
    }
}

/// Connection request sent by a client as its first packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub fixed_header: FixedHeader,
    pub variable_header: ConnectVariableHeader,
    pub payload: ConnectPayload,
}

impl ConnectPacket {
    /// A 3.1.1 clean-session CONNECT.
    pub fn new(client_identifier: impl Into<String>, keep_alive_time_seconds: u16) -> Self {
        Self::from_parts(
            ConnectVariableHeader::new(keep_alive_time_seconds),
            ConnectPayload::new(client_identifier),
        )
    }

    pub fn from_parts(variable_header: ConnectVariableHeader, payload: ConnectPayload) -> Self {
        let remaining_length = variable_header.encoded_len() + payload.encoded_len();
        let fixed_header = FixedHeader::new(ControlPacketType::Connect, remaining_length);

        Self { fixed_header, variable_header, payload }
    }

    /// Checks what the decoder would reject: the protocol pair, the client id, and connect
    /// flags that disagree with each other or with the payload.
    ///
    /// # Errors
    /// - `EncodeError::UnsupportedProtocol`, `EncodeError::InvalidClientId` or
    ///   `EncodeError::InconsistentConnectFlags`.
    pub fn validate(&self) -> Result<(), EncodeError> {
        let header = &self.variable_header;
        let payload = &self.payload;

        let name = header.protocol_name.as_str();
        let supported = (name == PROTOCOL_NAME && header.protocol_level == PROTOCOL_LEVEL)
            || (name == LEGACY_PROTOCOL_NAME && header.protocol_level == LEGACY_PROTOCOL_LEVEL);
        if !supported {
            return Err(EncodeError::UnsupportedProtocol {
                name: header.protocol_name.clone(),
                level: header.protocol_level,
            });
        }

        validate_client_id(&payload.client_identifier, header.protocol_level)
            .map_err(|_| EncodeError::InvalidClientId)?;

        let inconsistent = |reason: &str| -> Result<(), EncodeError> {
            Err(EncodeError::InconsistentConnectFlags(reason.into()))
        };

        if header.has_user_name != payload.user_name.is_some() {
            return inconsistent("user name flag does not match the payload");
        }
        if header.has_password != payload.password.is_some() {
            return inconsistent("password flag does not match the payload");
        }
        if header.has_password && !header.has_user_name {
            return inconsistent("password without user name");
        }
        if header.is_will_flag != payload.will_topic.is_some()
            || header.is_will_flag != payload.will_message.is_some()
        {
            return inconsistent("will flag does not match the payload");
        }
        if !header.is_will_flag && (header.is_will_retain || header.will_qos != Qos::AtMostOnce) {
            return inconsistent("will qos and retain require the will flag");
        }

        Ok(())
    }

    pub fn with_credentials(self, user_name: impl Into<String>, password: Option<Bytes>) -> Self {
        let Self { mut variable_header, mut payload, .. } = self;

        variable_header.has_user_name = true;
        variable_header.has_password = password.is_some();
        payload.user_name = Some(user_name.into());
        payload.password = password;

        Self::from_parts(variable_header, payload)
    }

    pub fn with_will(
        self,
        topic: impl Into<String>,
        message: Bytes,
        qos: Qos,
        retain: bool,
    ) -> Self {
        let Self { mut variable_header, mut payload, .. } = self;

        variable_header.is_will_flag = true;
        variable_header.will_qos = qos;
        variable_header.is_will_retain = retain;
        payload.will_topic = Some(topic.into());
        payload.will_message = Some(message);

        Self::from_parts(variable_header, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable_header_bytes(name: &str, level: u8, flags: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend((name.len() as u16).to_be_bytes());
        buf.extend(name.as_bytes());
        buf.extend([level, flags, 0x00, 0x3C]);
        buf
    }

    #[test]
    fn decodes_both_protocol_versions() {
        let buf = variable_header_bytes("MQTT", 4, 0b1100_0010);
        let (header, consumed) = ConnectVariableHeader::decode(&buf).unwrap().unwrap();
        assert_eq!(consumed, 10);
        assert!(header.has_user_name);
        assert!(header.has_password);
        assert!(header.is_clean_session);
        assert_eq!(header.keep_alive_time_seconds, 60);

        let buf = variable_header_bytes("MQIsdp", 3, 0b0000_0010);
        let (header, consumed) = ConnectVariableHeader::decode(&buf).unwrap().unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(header.protocol_level, 3);
    }

    #[test]
    fn rejects_protocol_mismatch() {
        for (name, level) in [("MQTT", 3), ("MQIsdp", 4), ("MQTT", 5), ("HTTP", 4)] {
            let buf = variable_header_bytes(name, level, 0);
            assert_eq!(
                ConnectVariableHeader::decode(&buf),
                Err(DecodeError::ProtocolVersionMismatch { name: name.into(), level })
            );
        }
    }

    #[test]
    fn rejects_password_without_user_name() {
        let buf = variable_header_bytes("MQTT", 4, 0b0100_0010);
        assert!(matches!(
            ConnectVariableHeader::decode(&buf),
            Err(DecodeError::InvalidVariableHeader(_))
        ));
    }

    #[test]
    fn rejects_reserved_and_orphan_will_flags() {
        for flags in [0b0000_0001, 0b0010_0000, 0b0000_1000] {
            let buf = variable_header_bytes("MQTT", 4, flags);
            assert!(matches!(
                ConnectVariableHeader::decode(&buf),
                Err(DecodeError::InvalidVariableHeader(_))
            ));
        }
    }

    #[test]
    fn truncated_variable_header() {
        let buf = variable_header_bytes("MQTT", 4, 0);
        assert_eq!(ConnectVariableHeader::decode(&buf[..9]).unwrap(), None);
    }

    #[test]
    fn decodes_full_payload() {
        let packet = ConnectPacket::new("sensor-1", 30)
            .with_will("status/sensor-1", Bytes::from_static(b"gone"), Qos::AtLeastOnce, true)
            .with_credentials("user", Some(Bytes::from_static(b"secret")));

        let mut buf = Vec::new();
        packet.payload.encode(&mut buf).unwrap();

        let payload = ConnectPayload::decode(&buf, &packet.variable_header).unwrap();
        assert_eq!(payload, packet.payload);
    }

    #[test]
    fn client_id_rules() {
        let mut header = ConnectVariableHeader::new(0);

        let empty = [0x00, 0x00];
        assert_eq!(ConnectPayload::decode(&empty, &header), Err(DecodeError::InvalidClientId));

        let mut long = Vec::new();
        encode_utf8_string(&"c".repeat(24), &mut long).unwrap();
        assert!(ConnectPayload::decode(&long, &header).is_ok());

        header.protocol_name = LEGACY_PROTOCOL_NAME.into();
        header.protocol_level = LEGACY_PROTOCOL_LEVEL;
        assert_eq!(ConnectPayload::decode(&long, &header), Err(DecodeError::InvalidClientId));
    }

    #[test]
    fn payload_accounting() {
        let header = ConnectVariableHeader::new(0);

        let mut buf = Vec::new();
        encode_utf8_string("client", &mut buf).unwrap();
        buf.push(0xAA);
        assert_eq!(ConnectPayload::decode(&buf, &header), Err(DecodeError::InvalidPayloadBytes));

        assert_eq!(
            ConnectPayload::decode(&buf[..4], &header),
            Err(DecodeError::InvalidPayloadBytes)
        );
    }
}
