//! ICC wire frame: header layout, flag bits and checksum

use std::fmt;

/// Magic of frames sent by the host and of replies to them
pub const ICC_MAGIC: u8 = 0x42;
/// Magic of unsolicited event frames
pub const ICC_EVENT_MAGIC: u8 = 0x24;

/// Minor flag: frame answers a request
pub const ICC_REPLY: u16 = 0x4000;
/// Minor flag: frame is an unsolicited event
pub const ICC_EVENT: u16 = 0x8000;

/// Packed header size in bytes
pub const HEADER_SIZE: usize = 12;
/// Frames on the wire are never shorter than this
pub const MIN_FRAME_SIZE: usize = 0x20;
/// Largest frame a slot can hold
pub const MAX_FRAME_SIZE: usize = 0x7f0;
/// Payload bytes always written, zero-padded if shorter
pub const MIN_PAYLOAD: usize = MIN_FRAME_SIZE - HEADER_SIZE;
/// Largest payload a request or reply can carry
pub const MAX_PAYLOAD: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// 16-bit additive checksum over `bytes`
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &byte| sum.wrapping_add(u16::from(byte)))
}

/// What a received frame claims to be, from its minor flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Event,
    Reply,
    Unknown,
}

/// Frame header
///
/// Little-endian, packed:
///
/// ```text
/// 0  magic    u8
/// 1  major    u8
/// 2  minor    u16
/// 4  reserved u16
/// 6  cookie   u16
/// 8  length   u16   total frame length, header included
/// 10 checksum u16
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub magic: u8,
    pub major: u8,
    pub minor: u16,
    pub reserved: u16,
    pub cookie: u16,
    pub length: u16,
    pub checksum: u16,
}

impl FrameHeader {
    /// Builds a sealed request header for `payload`
    ///
    /// The length is clamped up to [`MIN_FRAME_SIZE`]; the zero padding that
    /// fills the gap contributes nothing to the checksum.
    pub fn request(major: u8, minor: u16, cookie: u16, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        let length = (HEADER_SIZE + payload.len()).max(MIN_FRAME_SIZE) as u16;
        let mut header = Self {
            magic: ICC_MAGIC,
            major,
            minor,
            reserved: 0,
            cookie,
            length,
            checksum: 0,
        };
        header.checksum = header.header_checksum().wrapping_add(checksum(payload));
        header
    }

    /// Parses a header from its wire bytes
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let word = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        Self {
            magic: bytes[0],
            major: bytes[1],
            minor: word(2),
            reserved: word(4),
            cookie: word(6),
            length: word(8),
            checksum: word(10),
        }
    }

    /// Serializes the header to its wire bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.magic;
        bytes[1] = self.major;
        bytes[2..4].copy_from_slice(&self.minor.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.reserved.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.cookie.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.length.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Checksum of the header bytes with the checksum field taken as zero
    pub fn header_checksum(&self) -> u16 {
        let mut bytes = self.to_bytes();
        bytes[10] = 0;
        bytes[11] = 0;
        checksum(&bytes)
    }

    /// Classifies the frame by its minor flags; the event flag wins
    pub fn kind(&self) -> FrameKind {
        if self.minor & ICC_EVENT != 0 {
            FrameKind::Event
        } else if self.minor & ICC_REPLY != 0 {
            FrameKind::Reply
        } else {
            FrameKind::Unknown
        }
    }

    /// Payload length implied by the length field
    pub fn payload_len(&self) -> usize {
        usize::from(self.length).saturating_sub(HEADER_SIZE)
    }

    /// Whether the length field is within slot bounds
    pub fn length_in_bounds(&self) -> bool {
        (HEADER_SIZE..=MAX_FRAME_SIZE).contains(&usize::from(self.length))
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:02x}] {:02x}:{:04x} unk {:x} #{} len {} cksum {:#x}",
            self.magic,
            self.major,
            self.minor,
            self.reserved,
            self.cookie,
            self.length,
            self.checksum
        )
    }
}
