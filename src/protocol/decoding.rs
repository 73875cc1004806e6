//! Primitive decoders over a byte window.
//!
//! Every decoder returns `Ok(None)` when the window ends before the value does, and
//! `Ok(Some((value, consumed)))` otherwise. Nothing is consumed from the caller's
//! buffer; the caller advances by `consumed` once the whole stage has decoded.

use crate::constants::MAX_REMAINING_LENGTH_BYTES;

use super::{validation::validate_utf8_string, DecodeError};

/// Decode a variable byte integer (the remaining length).
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718023>
///
/// **Specification:**
///
/// ```text
/// multiplier = 1
/// value = 0
/// do
///    encodedByte = 'next byte from stream'
///    value += (encodedByte AND 127) * multiplier
///    multiplier *= 128
///    if (multiplier > 128*128*128)
///       throw Error(Malformed Remaining Length)
/// while ((encodedByte AND 128) != 0)
/// ```
///
/// # Errors
/// - Returns `DecodeError::RemainingLengthExceeded` if the 4th byte still has the continuation bit set.
pub fn decode_variable_byte_int(buf: &[u8]) -> Result<Option<(usize, usize)>, DecodeError> {
    let mut multiplier = 1;
    let mut decoded_value = 0;

    for (index, encoded_byte) in buf.iter().enumerate() {
        // Take the 7 least significant bits
        let value = (encoded_byte & 127) as usize;

        // Multiply by current multiplier and add to decoded value
        decoded_value += value * multiplier;

        // If the continuation bit is not set, we are done
        if encoded_byte & 128 == 0 {
            return Ok(Some((decoded_value, index + 1)));
        }

        // A 5th digit would be required
        if index + 1 == MAX_REMAINING_LENGTH_BYTES {
            return Err(DecodeError::RemainingLengthExceeded);
        }

        multiplier *= 128;
    }

    Ok(None)
}

/// Decode a 1-byte unsigned integer.
pub fn decode_u8(buf: &[u8]) -> Option<(u8, usize)> {
    buf.first().map(|value| (*value, 1))
}

/// Decode a 2-byte big-endian unsigned integer.
pub fn decode_u16(buf: &[u8]) -> Option<(u16, usize)> {
    match buf {
        [msb, lsb, ..] => Some((u16::from_be_bytes([*msb, *lsb]), 2)),
        _ => None,
    }
}

/// Decode binary data: a 2-byte length followed by that many bytes.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718016>
pub fn decode_binary_data(buf: &[u8]) -> Option<(&[u8], usize)> {
    let (len, offset) = decode_u16(buf)?;
    let end = offset + len as usize;

    if buf.len() < end {
        return None;
    }

    Some((&buf[offset..end], end))
}

/// Decode a UTF-8 string: a 2-byte length followed by that many UTF-8 bytes.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718016>
///
/// The 2-byte prefix bounds the length, so there is no separate length check here.
///
/// # Errors
/// - Returns `DecodeError::InvalidUtf8String` if the bytes are not valid UTF-8 or contain U+0000.
pub fn decode_utf8_string(buf: &[u8]) -> Result<Option<(String, usize)>, DecodeError> {
    let Some((encoded_value, consumed)) = decode_binary_data(buf) else {
        return Ok(None);
    };

    let decoded_value =
        std::str::from_utf8(encoded_value).map_err(|_| DecodeError::InvalidUtf8String)?;
    validate_utf8_string(decoded_value)?;

    Ok(Some((decoded_value.to_string(), consumed)))
}

/// Peek the length prefix of a string without decoding it.
///
/// Used by cheap "is there enough data" checks.
pub fn peek_string_len(buf: &[u8]) -> Option<usize> {
    decode_u16(buf).map(|(len, _)| len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_byte_int_boundaries() {
        assert_eq!(decode_variable_byte_int(&[0x00]).unwrap(), Some((0, 1)));
        assert_eq!(decode_variable_byte_int(&[0x7F]).unwrap(), Some((127, 1)));
        assert_eq!(decode_variable_byte_int(&[0x80, 0x01]).unwrap(), Some((128, 2)));
        assert_eq!(decode_variable_byte_int(&[0xFF, 0x7F]).unwrap(), Some((16_383, 2)));
        assert_eq!(decode_variable_byte_int(&[0x80, 0x80, 0x01]).unwrap(), Some((16_384, 3)));
        assert_eq!(decode_variable_byte_int(&[0xFF, 0xFF, 0x7F]).unwrap(), Some((2_097_151, 3)));
        assert_eq!(
            decode_variable_byte_int(&[0x80, 0x80, 0x80, 0x01]).unwrap(),
            Some((2_097_152, 4))
        );
        assert_eq!(
            decode_variable_byte_int(&[0xFF, 0xFF, 0xFF, 0x7F]).unwrap(),
            Some((268_435_455, 4))
        );
    }

    #[test]
    fn variable_byte_int_needs_more() {
        assert_eq!(decode_variable_byte_int(&[]).unwrap(), None);
        assert_eq!(decode_variable_byte_int(&[0x80]).unwrap(), None);
        assert_eq!(decode_variable_byte_int(&[0xFF, 0xFF, 0xFF]).unwrap(), None);
    }

    #[test]
    fn variable_byte_int_fifth_digit() {
        assert_eq!(
            decode_variable_byte_int(&[0xFF, 0xFF, 0xFF, 0xFF]),
            Err(DecodeError::RemainingLengthExceeded)
        );
        assert_eq!(
            decode_variable_byte_int(&[0x80, 0x80, 0x80, 0x80, 0x01]),
            Err(DecodeError::RemainingLengthExceeded)
        );
    }

    #[test]
    fn utf8_string() {
        let buf = [0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04];
        assert_eq!(decode_utf8_string(&buf).unwrap(), Some(("MQTT".to_string(), 6)));
        assert_eq!(decode_utf8_string(&buf[..5]).unwrap(), None);
        assert_eq!(decode_utf8_string(&buf[..1]).unwrap(), None);
    }

    #[test]
    fn utf8_string_rejects_invalid_bytes() {
        assert_eq!(decode_utf8_string(&[0x00, 0x01, 0xFF]), Err(DecodeError::InvalidUtf8String));
        assert_eq!(
            decode_utf8_string(&[0x00, 0x02, b'a', 0x00]),
            Err(DecodeError::InvalidUtf8String)
        );
    }

    #[test]
    fn utf8_string_at_prefix_limit() {
        let mut buf = vec![0xFF, 0xFF];
        buf.extend(std::iter::repeat(b'a').take(65_535));

        let (value, consumed) = decode_utf8_string(&buf).unwrap().unwrap();
        assert_eq!(value.len(), 65_535);
        assert_eq!(consumed, 65_537);
    }

    #[test]
    fn binary_data() {
        let buf = [0x00, 0x02, 0xDE, 0xAD, 0xBE];
        assert_eq!(decode_binary_data(&buf), Some((&[0xDE, 0xAD][..], 4)));
        assert_eq!(decode_binary_data(&buf[..3]), None);
    }
}
