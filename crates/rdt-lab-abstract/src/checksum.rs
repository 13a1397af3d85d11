//! 16-bit Internet checksum (ones' complement) rendered as 4 hex digits.
//!
//! Packets carry the checksum as text so that a corrupting channel can
//! damage it like any other character of the line.

/// Number of characters the checksum occupies on the wire.
pub const CHECKSUM_WIDTH: usize = 4;

/// Ones' complement of the folded 16-bit word sum of `data`.
///
/// Words are big-endian byte pairs; a trailing odd byte is the low byte of a
/// word whose high byte is zero.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);

    for chunk in &mut chunks {
        let value = u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        sum = sum.wrapping_add(value);
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum = sum.wrapping_add(byte as u32);
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Checksum of `s` as a zero-padded lowercase hex string.
pub fn compute(s: &str) -> String {
    format!("{:04x}", internet_checksum(s.as_bytes()))
}

/// Returns true when `checksum` is the checksum of `s`.
///
/// The freshly computed value is complemented, added to the supplied one and
/// the sum complemented again; a zero syndrome means no corruption was
/// detected. Anything that is not exactly four hex digits fails.
pub fn verify(s: &str, checksum: &str) -> bool {
    let Some(supplied) = parse_hex(checksum) else {
        return false;
    };
    let fresh = internet_checksum(s.as_bytes()) as i64;
    let syndrome = 0xFFFF - ((0xFFFF - fresh) + supplied as i64);
    syndrome == 0
}

fn parse_hex(field: &str) -> Option<u16> {
    if field.len() != CHECKSUM_WIDTH || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(field, 16).ok()
}
