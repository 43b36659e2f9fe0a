//! NMEA 0183 sentence framing
//!
//! A sentence is `$TAG,fields*HH\r\n`: the tag is up to five characters of
//! `A-Z0-9`, every character up to `*` is printable, and `HH` is the XOR of
//! everything between `$` and `*` in upper-case hex.

use super::checksum::xor_checksum;
use super::framing::{ParseCursor, ParseError};
use super::message_id::{MessageId, NmeaId, NMEA_TAG_MAX};

const START: u8 = b'$';
const CHECKSUM_MARK: u8 = b'*';
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn is_tag_char(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit()
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

/// Stream parser: one NMEA sentence at the cursor.
pub fn parse(cursor: &mut ParseCursor<'_>) -> Result<MessageId, ParseError> {
    if cursor.next_byte().ok_or(ParseError::Timeout)? != START {
        return Err(ParseError::NotFound);
    }

    let mut crc = 0u8;
    let mut tag = [0u8; NMEA_TAG_MAX];
    let mut tag_len = 0;
    loop {
        let ch = cursor.next_byte().ok_or(ParseError::Timeout)?;
        crc ^= ch;
        if ch == b',' {
            break;
        }
        if tag_len >= NMEA_TAG_MAX || !is_tag_char(ch) {
            return Err(ParseError::NotFound);
        }
        tag[tag_len] = ch;
        tag_len += 1;
    }

    loop {
        let ch = cursor.next_byte().ok_or(ParseError::Timeout)?;
        if !is_printable(ch) {
            return Err(ParseError::NotFound);
        }
        if ch == CHECKSUM_MARK {
            break;
        }
        crc ^= ch;
    }

    let expected = [
        HEX_DIGITS[usize::from(crc >> 4)],
        HEX_DIGITS[usize::from(crc & 0x0F)],
        b'\r',
        b'\n',
    ];
    for want in expected {
        if cursor.next_byte().ok_or(ParseError::Timeout)? != want {
            return Err(ParseError::NotFound);
        }
    }

    Ok(MessageId::Nmea(NmeaId::from_bytes(&tag[..tag_len])))
}

/// Frame `body` (e.g. `GPGGA,...`) as a complete sentence.
pub fn encode(body: &str) -> String {
    format!("${}*{:02X}\r\n", body, xor_checksum(body.as_bytes()))
}

/// Text between `$` and `*` of a framed sentence
pub fn sentence_body(frame: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(frame).ok()?;
    let text = text.strip_prefix('$')?;
    text.rfind('*').map(|star| &text[..star])
}

#[cfg(test)]
mod tests {
    use super::*;

    const GSA: &[u8] = b"$GNGSA,A,1,,,,,,,,,,,,,99.99,99.99,99.99*2E\r\n";

    #[test]
    fn test_parse_sentence() {
        let mut cursor = ParseCursor::from_slice(GSA);
        assert_eq!(parse(&mut cursor), Ok(MessageId::nmea("GNGSA").unwrap()));
        assert_eq!(cursor.position(), GSA.len());
    }

    #[test]
    fn test_encode_matches_receiver_output() {
        assert_eq!(
            encode("GNGSA,A,1,,,,,,,,,,,,,99.99,99.99,99.99").as_bytes(),
            GSA
        );
    }

    #[test]
    fn test_parse_rejects_lowercase_hex() {
        let mut cursor = ParseCursor::from_slice(b"$GNGSA,A,1,,,,,,,,,,,,,99.99,99.99,99.99*2e\r\n");
        assert_eq!(parse(&mut cursor), Err(ParseError::NotFound));
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let mut cursor = ParseCursor::from_slice(b"$GNGSA,A,1,,,,,,,,,,,,,99.99,99.99,99.98*2E\r\n");
        assert_eq!(parse(&mut cursor), Err(ParseError::NotFound));
    }

    #[test]
    fn test_parse_rejects_long_tag_and_bad_chars() {
        let long = encode("GPGGAX,1");
        assert_eq!(
            parse(&mut ParseCursor::from_slice(long.as_bytes())),
            Err(ParseError::NotFound)
        );
        let lower = encode("gpgga,1");
        assert_eq!(
            parse(&mut ParseCursor::from_slice(lower.as_bytes())),
            Err(ParseError::NotFound)
        );
        assert_eq!(
            parse(&mut ParseCursor::from_slice(b"$GPGGA,1\x01*00\r\n")),
            Err(ParseError::NotFound)
        );
    }

    #[test]
    fn test_parse_truncated_waits() {
        let mut cursor = ParseCursor::from_slice(&GSA[..GSA.len() - 1]);
        assert_eq!(parse(&mut cursor), Err(ParseError::Timeout));
        let mut cursor = ParseCursor::from_slice(b"$GNG");
        assert_eq!(parse(&mut cursor), Err(ParseError::Timeout));
    }

    #[test]
    fn test_sentence_body() {
        assert_eq!(
            sentence_body(GSA),
            Some("GNGSA,A,1,,,,,,,,,,,,,99.99,99.99,99.99")
        );
        assert_eq!(sentence_body(b"GNGSA"), None);
    }
}
