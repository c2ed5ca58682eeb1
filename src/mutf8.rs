//! Modified UTF-8 codec for constant-pool text entries.
//!
//! Class files do not store strings in standard UTF-8: NUL is encoded as the
//! two-byte sequence `C0 80` so payloads never contain a raw zero byte, and
//! supplementary-plane characters appear as two 3-byte surrogate encodings
//! instead of a 4-byte form. Both directions here operate on raw bytes and
//! 16-bit code units so re-encoded output is byte-for-byte what the format
//! expects, independent of how the host represents strings.

use anyhow::{Result, bail};

pub fn decode(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            if i + 1 >= bytes.len() {
                bail!("truncated two-byte sequence at offset {i}");
            }
            units.push((u16::from(b & 0x1F) << 6) | u16::from(bytes[i + 1] & 0x3F));
            i += 2;
        } else {
            if i + 2 >= bytes.len() {
                bail!("truncated three-byte sequence at offset {i}");
            }
            units.push(
                (u16::from(b & 0x0F) << 12)
                    | (u16::from(bytes[i + 1] & 0x3F) << 6)
                    | u16::from(bytes[i + 2] & 0x3F),
            );
            i += 3;
        }
    }

    String::from_utf16(&units).map_err(|_| anyhow::anyhow!("unpaired surrogate in text constant"))
}

pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());

    for unit in s.encode_utf16() {
        if unit != 0 && unit < 0x80 {
            out.push(unit as u8);
        } else if unit < 0x800 {
            out.push(0b1100_0000 | (unit >> 6) as u8);
            out.push(0b1000_0000 | (unit & 0b0011_1111) as u8);
        } else {
            out.push(0b1110_0000 | (unit >> 12) as u8);
            out.push(0b1000_0000 | ((unit >> 6) & 0b0011_1111) as u8);
            out.push(0b1000_0000 | (unit & 0b0011_1111) as u8);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_encodes_one_byte_per_char() {
        let encoded = encode("a/b/Foo");
        assert_eq!(encoded, b"a/b/Foo");
        assert_eq!(decode(&encoded).unwrap(), "a/b/Foo");
    }

    #[test]
    fn nul_encodes_as_two_bytes() {
        let encoded = encode("a\0b");
        assert_eq!(encoded, &[b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode(&encoded).unwrap(), "a\0b");
    }

    #[test]
    fn two_and_three_byte_forms_round_trip() {
        for s in ["café", "\u{7f}", "\u{80}", "\u{7ff}", "\u{800}", "\u{ffff}", "中文"] {
            let encoded = encode(s);
            assert_eq!(decode(&encoded).unwrap(), s, "round trip failed for {s:?}");
            // A second pass over the same text must produce identical bytes.
            assert_eq!(encode(&decode(&encoded).unwrap()), encoded);
        }
    }

    #[test]
    fn supplementary_chars_become_surrogate_pairs() {
        let encoded = encode("😀");
        assert_eq!(encoded.len(), 6);
        assert_eq!(decode(&encoded).unwrap(), "😀");
    }

    #[test]
    fn truncated_sequences_are_rejected() {
        assert!(decode(&[0xC3]).is_err());
        assert!(decode(&[0xE4, 0xB8]).is_err());
    }

    #[test]
    fn lone_surrogate_is_rejected() {
        // 0xD800 encoded in the 3-byte form with no trailing low surrogate.
        assert!(decode(&[0xED, 0xA0, 0x80]).is_err());
    }
}
