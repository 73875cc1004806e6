use crate::constants::{LEGACY_MAX_CLIENT_ID_LENGTH, LEGACY_PROTOCOL_LEVEL, PROTOCOL_LEVEL};

use super::DecodeError;

/// Validates a decoded UTF-8 string based on MQTT protocol requirements.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718016>
///
/// **Requirements:**
/// - Must not contain the null character U+0000.
///
/// Surrogates cannot appear in a Rust `str`, so well-formedness is already covered by the
/// UTF-8 conversion.
///
/// # Errors
/// - Returns `DecodeError::InvalidUtf8String` if the string contains U+0000.
pub(crate) fn validate_utf8_string(value: &str) -> Result<(), DecodeError> {
    if value.contains('\u{0000}') {
        return Err(DecodeError::InvalidUtf8String);
    }

    Ok(())
}

/// Validates a client identifier for the negotiated protocol level.
///
/// - Level 4 (`MQTT`): must be non-empty.
/// - Level 3 (`MQIsdp`): must be 1 to 23 UTF-8 bytes.
///
/// # Errors
/// - Returns `DecodeError::InvalidClientId` if the identifier is not acceptable.
pub(crate) fn validate_client_id(client_id: &str, protocol_level: u8) -> Result<(), DecodeError> {
    let len = client_id.len();

    let valid = match protocol_level {
        PROTOCOL_LEVEL => len > 0,
        LEGACY_PROTOCOL_LEVEL => (1..=LEGACY_MAX_CLIENT_ID_LENGTH).contains(&len),
        _ => false,
    };

    if !valid {
        return Err(DecodeError::InvalidClientId);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_null_character() {
        assert!(validate_utf8_string("sensors/temp").is_ok());
        assert_eq!(validate_utf8_string("a\u{0000}b"), Err(DecodeError::InvalidUtf8String));
    }

    #[test]
    fn client_id_per_level() {
        assert!(validate_client_id("client", 4).is_ok());
        assert_eq!(validate_client_id("", 4), Err(DecodeError::InvalidClientId));

        assert!(validate_client_id(&"x".repeat(23), 3).is_ok());
        assert_eq!(validate_client_id(&"x".repeat(24), 3), Err(DecodeError::InvalidClientId));
        assert_eq!(validate_client_id("", 3), Err(DecodeError::InvalidClientId));

        // Long identifiers are fine on 3.1.1
        assert!(validate_client_id(&"x".repeat(64), 4).is_ok());
    }
}
