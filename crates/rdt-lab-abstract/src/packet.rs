use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::checksum::{self, CHECKSUM_WIDTH};

/// Data value of a positive acknowledgment.
pub const ACK: &str = "ACK";
/// Data value of a negative acknowledgment (rdt2.0 and rdt2.1 only).
pub const NAK: &str = "NAK";

/// Alternating-bit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeqNum {
    Zero,
    One,
}

impl SeqNum {
    pub fn flip(self) -> Self {
        match self {
            SeqNum::Zero => SeqNum::One,
            SeqNum::One => SeqNum::Zero,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            SeqNum::Zero => '0',
            SeqNum::One => '1',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(SeqNum::Zero),
            '1' => Some(SeqNum::One),
            _ => None,
        }
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Which header fields precede the data on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketFormat {
    /// `checksum || data` (rdt1.0, rdt2.0)
    Checksummed,
    /// `checksum || seqnum || data` (rdt2.1 onwards)
    Sequenced,
}

impl PacketFormat {
    /// Characters preceding the data.
    pub fn header_width(self) -> usize {
        match self {
            PacketFormat::Checksummed => CHECKSUM_WIDTH,
            PacketFormat::Sequenced => CHECKSUM_WIDTH + 1,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("line has {len} characters, {format:?} header needs {needed}")]
    TooShort {
        format: PacketFormat,
        len: usize,
        needed: usize,
    },
}

/// One protocol message. Never mutated once built, so a retransmission
/// carries exactly the checksum of the first transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    checksum: String,
    seqnum: Option<char>,
    data: String,
}

impl Packet {
    /// Checksum-only packet with a computed checksum.
    pub fn new(data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            checksum: checksum::compute(&data),
            seqnum: None,
            data,
        }
    }

    /// Sequenced packet; the checksum covers `seqnum + data`.
    pub fn sequenced(data: impl Into<String>, seq: SeqNum) -> Self {
        let data = data.into();
        let seqnum = seq.as_char();
        let mut covered = String::with_capacity(data.len() + 1);
        covered.push(seqnum);
        covered.push_str(&data);
        Self {
            checksum: checksum::compute(&covered),
            seqnum: Some(seqnum),
            data,
        }
    }

    /// Packet with a supplied (possibly wrong) checksum.
    pub fn from_parts(
        data: impl Into<String>,
        seqnum: Option<char>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            checksum: checksum.into(),
            seqnum,
            data: data.into(),
        }
    }

    pub fn ack() -> Self {
        Self::new(ACK)
    }

    pub fn nak() -> Self {
        Self::new(NAK)
    }

    /// Sequenced ACK. Rebuilding it for the same `seq` always yields the
    /// same wire line.
    pub fn ack_for(seq: SeqNum) -> Self {
        Self::sequenced(ACK, seq)
    }

    pub fn nak_for(seq: SeqNum) -> Self {
        Self::sequenced(NAK, seq)
    }

    /// Rebuilds a packet from a received line, keeping the received checksum
    /// verbatim so that damage can be detected.
    pub fn parse(format: PacketFormat, line: &str) -> Result<Self, PacketError> {
        let needed = format.header_width();
        let len = line.chars().count();
        if len < needed {
            return Err(PacketError::TooShort {
                format,
                len,
                needed,
            });
        }

        let checksum_end = line
            .char_indices()
            .nth(CHECKSUM_WIDTH)
            .map_or(line.len(), |(idx, _)| idx);
        let checksum = &line[..checksum_end];
        let rest = &line[checksum_end..];

        match format {
            PacketFormat::Checksummed => Ok(Self::from_parts(rest, None, checksum)),
            PacketFormat::Sequenced => {
                let mut rest_chars = rest.chars();
                let seqnum = rest_chars.next();
                Ok(Self::from_parts(rest_chars.as_str(), seqnum, checksum))
            }
        }
    }

    pub fn format(&self) -> PacketFormat {
        match self.seqnum {
            Some(_) => PacketFormat::Sequenced,
            None => PacketFormat::Checksummed,
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn into_data(self) -> String {
        self.data
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Raw sequence character, if the format has one.
    pub fn seqnum(&self) -> Option<char> {
        self.seqnum
    }

    /// Sequence number when the seqnum character is `'0'` or `'1'`.
    pub fn seq(&self) -> Option<SeqNum> {
        self.seqnum.and_then(SeqNum::from_char)
    }

    pub fn is_ack(&self) -> bool {
        self.data == ACK
    }

    pub fn is_nak(&self) -> bool {
        self.data == NAK
    }

    /// Sequence number acknowledged by this packet, `None` if it is not an ACK.
    pub fn ack_num(&self) -> Option<SeqNum> {
        if self.is_ack() { self.seq() } else { None }
    }

    pub fn is_corrupt(&self) -> bool {
        !checksum::verify(&self.covered(), &self.checksum)
    }

    /// Wire form: `checksum || seqnum? || data`.
    pub fn serialize(&self) -> String {
        let mut line = String::with_capacity(self.checksum.len() + 1 + self.data.len());
        line.push_str(&self.checksum);
        if let Some(seqnum) = self.seqnum {
            line.push(seqnum);
        }
        line.push_str(&self.data);
        line
    }

    fn covered(&self) -> String {
        match self.seqnum {
            Some(seqnum) => format!("{seqnum}{}", self.data),
            None => self.data.clone(),
        }
    }
}

impl fmt::Display for Packet {
    /// `data seqnum (received checksum/recomputed checksum)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recomputed = checksum::compute(&self.covered());
        match self.seqnum {
            Some(seqnum) => write!(
                f,
                "{} {} ({}/{})",
                self.data, seqnum, self.checksum, recomputed
            ),
            None => write!(f, "{} ({}/{})", self.data, self.checksum, recomputed),
        }
    }
}

/// An inbound line after checksum validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Intact(Packet),
    /// Failed verification or too short to parse; holds the raw line.
    Corrupt(String),
}

impl Received {
    pub fn classify(format: PacketFormat, line: &str) -> Self {
        match Packet::parse(format, line) {
            Ok(packet) if !packet.is_corrupt() => Received::Intact(packet),
            _ => Received::Corrupt(line.to_string()),
        }
    }

    pub fn intact(&self) -> Option<&Packet> {
        match self {
            Received::Intact(packet) => Some(packet),
            Received::Corrupt(_) => None,
        }
    }
}

impl fmt::Display for Received {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Received::Intact(packet) => write!(f, "{packet}"),
            Received::Corrupt(line) => write!(f, "corrupt {line:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_layout() {
        let plain = Packet::new("hello");
        let expected = format!("{}hello", checksum::compute("hello"));
        assert_eq!(plain.serialize(), expected);

        let seq = Packet::sequenced("hello", SeqNum::One);
        let expected = format!("{}1hello", checksum::compute("1hello"));
        assert_eq!(seq.serialize(), expected);
        assert_eq!(seq.format(), PacketFormat::Sequenced);
    }

    #[test]
    fn parse_keeps_received_checksum() {
        let line = format!("{}0data", "beef");
        let packet = Packet::parse(PacketFormat::Sequenced, &line).unwrap();
        assert_eq!(packet.checksum(), "beef");
        assert_eq!(packet.seqnum(), Some('0'));
        assert_eq!(packet.data(), "data");
        assert!(packet.is_corrupt());
    }

    #[test]
    fn parse_rejects_short_lines() {
        assert_eq!(
            Packet::parse(PacketFormat::Sequenced, "abcd"),
            Err(PacketError::TooShort {
                format: PacketFormat::Sequenced,
                len: 4,
                needed: 5
            })
        );
        // an empty payload is still a packet
        let empty = Packet::new("");
        let parsed = Packet::parse(PacketFormat::Checksummed, &empty.serialize()).unwrap();
        assert_eq!(parsed, empty);
        assert!(!parsed.is_corrupt());
    }

    #[test]
    fn parse_handles_multibyte_data() {
        let packet = Packet::sequenced("naïve café", SeqNum::Zero);
        let parsed = Packet::parse(PacketFormat::Sequenced, &packet.serialize()).unwrap();
        assert_eq!(parsed.data(), "naïve café");
        assert!(!parsed.is_corrupt());
    }

    #[test]
    fn damage_to_any_field_is_corruption() {
        let line = Packet::sequenced("payload", SeqNum::Zero).serialize();
        // checksum digit, seqnum and a data character
        for idx in [1, 4, 7] {
            let mut chars: Vec<char> = line.chars().collect();
            chars[idx] = '#';
            let damaged: String = chars.into_iter().collect();
            assert!(matches!(
                Received::classify(PacketFormat::Sequenced, &damaged),
                Received::Corrupt(_)
            ));
        }
    }

    #[test]
    fn acknowledgments() {
        let ack = Packet::ack_for(SeqNum::One);
        assert!(ack.is_ack());
        assert_eq!(ack.ack_num(), Some(SeqNum::One));
        assert_eq!(ack, Packet::ack_for(SeqNum::One));

        let nak = Packet::nak_for(SeqNum::One);
        assert!(nak.is_nak());
        assert_eq!(nak.ack_num(), None);

        let unsequenced = Packet::ack();
        assert!(unsequenced.is_ack());
        assert_eq!(unsequenced.ack_num(), None);
    }

    #[test]
    fn classify_intact_line() {
        let packet = Packet::sequenced("x", SeqNum::One);
        let received = Received::classify(PacketFormat::Sequenced, &packet.serialize());
        assert_eq!(received.intact(), Some(&packet));
    }

    #[test]
    fn seqnum_flip() {
        assert_eq!(SeqNum::Zero.flip(), SeqNum::One);
        assert_eq!(SeqNum::One.flip().flip(), SeqNum::One);
        assert_eq!(SeqNum::from_char('x'), None);
    }
}
