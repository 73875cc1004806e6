use bytes::BufMut;

use crate::constants::{MAX_REMAINING_LENGTH, MAX_STRING_LENGTH};

use super::EncodeError;

/// Number of bytes `value` takes as a variable byte integer.
pub fn variable_byte_int_len(value: usize) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encode a variable byte integer.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718023>
///
/// **Specification:**
///
/// ```text
/// do
///    encodedByte = X MOD 128
///    X = X DIV 128
///    // if there are more data to encode, set the top bit of this byte
///    if (X > 0)
///       encodedByte = encodedByte OR 128
///    endif
///    'output' encodedByte
/// while (X > 0)
/// ```
///
/// # Errors
/// - Returns `EncodeError::RemainingLengthExceeded` if `value` is above `MAX_REMAINING_LENGTH`.
pub fn encode_variable_byte_int<B: BufMut>(mut value: usize, dst: &mut B) -> Result<(), EncodeError> {
    if value > MAX_REMAINING_LENGTH {
        return Err(EncodeError::RemainingLengthExceeded(value));
    }

    loop {
        let mut encoded_byte = (value % 128) as u8;
        value /= 128;

        // More digits follow
        if value > 0 {
            encoded_byte |= 128;
        }

        dst.put_u8(encoded_byte);

        if value == 0 {
            return Ok(());
        }
    }
}

/// Encode binary data: a 2-byte big-endian length followed by the bytes.
///
/// # Errors
/// - Returns `EncodeError::ExceedsMaxStringLength` if the data is longer than `MAX_STRING_LENGTH`.
pub fn encode_binary_data<B: BufMut>(value: &[u8], dst: &mut B) -> Result<(), EncodeError> {
    let len = value.len();
    if len > MAX_STRING_LENGTH {
        return Err(EncodeError::ExceedsMaxStringLength(len));
    }

    dst.put_u16(len as u16);
    dst.put_slice(value);

    Ok(())
}

/// Encode a UTF-8 string.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718016>
///
/// **Specification:**
/// - Length must fit in a 16-bit unsigned integer.
/// - The 2-byte length prefix is written before the UTF-8 bytes.
///
/// # Errors
/// - Returns `EncodeError::ExceedsMaxStringLength` if the string length exceeds the maximum allowed.
/// - Returns `EncodeError::InvalidUtf8String` if the string contains U+0000.
pub fn encode_utf8_string<B: BufMut>(value: &str, dst: &mut B) -> Result<(), EncodeError> {
    if value.contains('\u{0000}') {
        return Err(EncodeError::InvalidUtf8String);
    }

    encode_binary_data(value.as_bytes(), dst)
}

/// Encoded size of a length-prefixed string or binary field.
pub fn prefixed_len(value_len: usize) -> usize {
    2 + value_len
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::protocol::decoding::decode_variable_byte_int;

    #[test]
    fn variable_byte_int_boundaries() {
        for value in [0, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, 268_435_455] {
            let mut buf = BytesMut::new();
            encode_variable_byte_int(value, &mut buf).unwrap();

            assert_eq!(buf.len(), variable_byte_int_len(value));
            assert_eq!(decode_variable_byte_int(&buf).unwrap(), Some((value, buf.len())));
        }
    }

    #[test]
    fn variable_byte_int_too_large() {
        let mut buf = BytesMut::new();
        assert_eq!(
            encode_variable_byte_int(268_435_456, &mut buf),
            Err(EncodeError::RemainingLengthExceeded(268_435_456))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn utf8_string_prefix() {
        let mut buf = BytesMut::new();
        encode_utf8_string("MQTT", &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x04, b'M', b'Q', b'T', b'T']);
    }

    #[test]
    fn utf8_string_too_long() {
        let value = "a".repeat(65_536);
        let mut buf = BytesMut::new();
        assert_eq!(
            encode_utf8_string(&value, &mut buf),
            Err(EncodeError::ExceedsMaxStringLength(65_536))
        );
    }
}
