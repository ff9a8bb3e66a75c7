//! Advertisement name sanitization.
//!
//! Device names arrive as raw advertisement bytes: arbitrary binary, UTF-8,
//! or text containing the protocol's field separator. [`sanitize_name`]
//! reduces them to a printable ASCII fragment that can be embedded as one
//! unescaped field in a `DEV` line.

/// The wire format's only field separator.
const DELIMITER: u8 = b',';

/// Convert raw name bytes into a protocol-safe printable fragment.
///
/// `capacity` is the size of the destination buffer including its
/// terminator, so at most `capacity - 1` characters are produced.
///
/// - `,` becomes a space
/// - printable ASCII (32..=126) is copied
/// - other ASCII bytes are dropped
/// - a byte >= 128 starts a multi-byte sequence, which is skipped whole
#[must_use]
pub fn sanitize_name(raw: &[u8], capacity: usize) -> String {
    let limit = capacity.saturating_sub(1);
    let mut out = String::with_capacity(limit.min(raw.len()));

    let mut i = 0;
    while i < raw.len() && out.len() < limit {
        let byte = raw[i];
        match byte {
            DELIMITER => out.push(' '),
            0x20..=0x7E => out.push(char::from(byte)),
            0x00..=0x7F => {}
            _ => i += continuation_len(byte),
        }
        i += 1;
    }

    out
}

/// Number of continuation bytes following a multi-byte lead byte.
const fn continuation_len(lead: u8) -> usize {
    if lead & 0xF0 == 0xF0 {
        3
    } else if lead & 0xE0 == 0xE0 {
        2
    } else if lead & 0xC0 == 0xC0 {
        1
    } else {
        // Stray continuation byte: skip just itself.
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ascii_is_copied() {
        assert_eq!(sanitize_name(b"Sensor-01", 32), "Sensor-01");
    }

    #[test]
    fn test_comma_becomes_space() {
        assert_eq!(sanitize_name(b"a,b,,c", 32), "a b  c");
    }

    #[test]
    fn test_control_bytes_are_dropped() {
        assert_eq!(sanitize_name(b"\x00Tag\r\n\x1f1\x7f", 32), "Tag1");
    }

    #[test]
    fn test_multibyte_sequences_are_skipped_whole() {
        // 2-byte (é), 3-byte (€), 4-byte (😀)
        let raw = "caf\u{e9} 5\u{20ac} \u{1F600}!".as_bytes();
        assert_eq!(sanitize_name(raw, 32), "caf 5 !");
    }

    #[test]
    fn test_continuation_bytes_are_not_emitted_as_ascii() {
        // 0xE2 claims two continuation bytes; the "AB" that follows is consumed.
        assert_eq!(sanitize_name(&[b'x', 0xE2, b'A', b'B', b'y'], 32), "xy");
    }

    #[test]
    fn test_truncated_multibyte_at_end_of_input() {
        assert_eq!(sanitize_name(&[b'o', b'k', 0xF0, 0x9F], 32), "ok");
    }

    #[test]
    fn test_stops_at_capacity_minus_one() {
        let long = [b'A'; 100];
        assert_eq!(sanitize_name(&long, 32).len(), 31);
        assert_eq!(sanitize_name(b"abc", 1), "");
        assert_eq!(sanitize_name(b"abc", 0), "");
    }

    #[test]
    fn test_output_is_always_protocol_safe() {
        let every_byte: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        for window in every_byte.chunks(37) {
            let out = sanitize_name(window, 64);
            assert!(!out.contains(','));
            assert!(out.bytes().all(|b| (32..=126).contains(&b)));
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize_name(&[], 32), "");
    }
}
