//! # Packet Model
//!
//! Header bit fields, length rules and the decoded `Packet` record.
//!
//! ## Wire Format
//! ```text
//! byte 0:  [ type bits 0-2 (3) ][ car (5) ]
//! byte 1:  [ length / inline data (7)   ][ type bit 3 (1) ]
//! ```
//!
//! Every packet starts with this two byte header. There is no length prefix:
//! how many payload bytes follow depends on the category, and is one of four
//! encodings (special, short, long, fixed). Total on-wire size is 2..=129.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::FramingError;

/// Header size in bytes (fixed, exactly 2).
pub const HEADER_LEN: usize = 2;

/// Maximal payload length, excluding the header.
pub const MAX_PACKET_LEN: usize = 127;

/// Largest total frame a header can describe.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PACKET_LEN;

/// Highest grid index a car packet may refer to.
pub const MAX_CAR_NUMBER: u8 = 99;

/// Length of the fixed-size system packet (timestamp), header included.
pub const FIXED_FRAME_LEN: usize = 4;

/// Category codes are four bits wide.
pub const TYPE_MASK: u8 = 0x0F;

/// Non-atom packet types carried by car packets.
///
/// Codes 1..=14 are per-driver data atoms whose meaning depends on the event
/// type; they all share the short encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarPacketType {
    PositionUpdate = 0,
    PositionHistory = 15,
}

impl CarPacketType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::PositionUpdate),
            15 => Some(Self::PositionHistory),
            _ => None,
        }
    }
}

/// Packets that are not about a single car.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemPacketType {
    EventId = 1,
    KeyFrame = 2,
    ValidMarker = 3,
    Commentary = 4,
    RefreshRate = 5,
    Notice = 6,
    Timestamp = 7,
    Weather = 9,
    Speed = 10,
    TrackStatus = 11,
    Copyright = 12,
}

impl SystemPacketType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::EventId),
            2 => Some(Self::KeyFrame),
            3 => Some(Self::ValidMarker),
            4 => Some(Self::Commentary),
            5 => Some(Self::RefreshRate),
            6 => Some(Self::Notice),
            7 => Some(Self::Timestamp),
            9 => Some(Self::Weather),
            10 => Some(Self::Speed),
            11 => Some(Self::TrackStatus),
            12 => Some(Self::Copyright),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Unnamed system code that uses the special encoding.
const SYS_UNNAMED_SPECIAL: u8 = 8;

/// How a category encodes its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameForm {
    /// Header only; all seven upper bits of byte 1 are inline data.
    Special,
    /// Payload length in the high nibble of byte 1, three bits of inline data.
    Short,
    /// Payload length in the upper seven bits of byte 1.
    Long,
    /// Constant total length.
    Fixed(usize),
}

impl FrameForm {
    /// Encoding used by a category, branching on car then type.
    pub fn for_category(car: u8, code: u8) -> Result<Self, FramingError> {
        if car != 0 {
            return match CarPacketType::from_code(code) {
                Some(CarPacketType::PositionUpdate) => Ok(Self::Special),
                Some(CarPacketType::PositionHistory) => Ok(Self::Long),
                None if code <= TYPE_MASK => Ok(Self::Short),
                None => Err(FramingError::UnknownCategory { car, code }),
            };
        }

        match SystemPacketType::from_code(code) {
            Some(SystemPacketType::ValidMarker | SystemPacketType::RefreshRate) => Ok(Self::Special),
            Some(
                SystemPacketType::EventId
                | SystemPacketType::KeyFrame
                | SystemPacketType::Weather
                | SystemPacketType::TrackStatus,
            ) => Ok(Self::Short),
            Some(SystemPacketType::Timestamp) => Ok(Self::Fixed(FIXED_FRAME_LEN)),
            Some(
                SystemPacketType::Commentary
                | SystemPacketType::Notice
                | SystemPacketType::Speed
                | SystemPacketType::Copyright,
            ) => Ok(Self::Long),
            None if code == SYS_UNNAMED_SPECIAL => Ok(Self::Special),
            None if code <= TYPE_MASK => Ok(Self::Long),
            None => Err(FramingError::UnknownCategory { car, code }),
        }
    }
}

/// The two raw header bytes of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketHeader {
    bytes: [u8; HEADER_LEN],
}

impl PacketHeader {
    pub const fn new(b0: u8, b1: u8) -> Self {
        Self { bytes: [b0, b1] }
    }

    /// Grid index, 0 for system packets.
    #[inline]
    pub fn car(&self) -> u8 {
        self.bytes[0] & 0x1F
    }

    /// Four bit category code spanning both bytes.
    #[inline]
    pub fn type_code(&self) -> u8 {
        (self.bytes[0] >> 5) | ((self.bytes[1] & 0x01) << 3)
    }

    #[inline]
    pub fn short_data(&self) -> u8 {
        (self.bytes[1] & 0x0E) >> 1
    }

    #[inline]
    pub fn special_data(&self) -> u8 {
        self.bytes[1] >> 1
    }

    /// A nominally short packet with no following data.
    #[inline]
    pub fn is_short_nul(&self) -> bool {
        (self.bytes[1] & 0xF0) == 0xF0
    }

    pub fn is_system(&self) -> bool {
        self.car() == 0
    }

    pub fn form(&self) -> Result<FrameForm, FramingError> {
        FrameForm::for_category(self.car(), self.type_code())
    }

    /// Total on-wire length (header included) announced by this header.
    pub fn frame_len(&self) -> Result<usize, FramingError> {
        let total = match self.form()? {
            FrameForm::Special => HEADER_LEN,
            FrameForm::Short if self.is_short_nul() => HEADER_LEN,
            FrameForm::Short => usize::from(self.bytes[1] >> 4) + HEADER_LEN,
            FrameForm::Long => usize::from(self.special_data()) + HEADER_LEN,
            FrameForm::Fixed(len) => len,
        };

        if total > MAX_FRAME_LEN {
            return Err(FramingError::LengthExceedsMaximum {
                car: self.car(),
                code: self.type_code(),
                claimed: total - HEADER_LEN,
                limit: MAX_PACKET_LEN,
            });
        }
        Ok(total)
    }

    /// Inline data value for this header's encoding.
    pub fn data(&self) -> Result<u8, FramingError> {
        Ok(match self.form()? {
            FrameForm::Special => self.special_data(),
            FrameForm::Short => self.short_data(),
            FrameForm::Long | FrameForm::Fixed(_) => 0,
        })
    }

    pub fn as_bytes(&self) -> [u8; HEADER_LEN] {
        self.bytes
    }
}

/// A completely framed packet.
///
/// The `car` index is the grid position at the start of the session, not the
/// car's race number. The payload may still be encrypted; `len()` always
/// equals the number of payload bytes copied off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    header: PacketHeader,
    data: u8,
    at: SystemTime,
    payload: Vec<u8>,
}

impl Packet {
    /// Build a packet from a complete frame (header followed by payload).
    pub fn from_frame(frame: &[u8], at: SystemTime) -> Result<Self, FramingError> {
        if frame.len() < HEADER_LEN {
            return Err(FramingError::LengthMismatch {
                expected: HEADER_LEN,
                actual: frame.len(),
            });
        }
        let header = PacketHeader::new(frame[0], frame[1]);
        let data = header.data()?;
        let expected = header.frame_len()?;
        if frame.len() != expected {
            return Err(FramingError::LengthMismatch {
                expected,
                actual: frame.len(),
            });
        }

        Ok(Self {
            header,
            data,
            at,
            payload: frame[HEADER_LEN..].to_vec(),
        })
    }

    pub fn header(&self) -> PacketHeader {
        self.header
    }

    pub fn car(&self) -> u8 {
        self.header.car()
    }

    pub fn type_code(&self) -> u8 {
        self.header.type_code()
    }

    pub fn data(&self) -> u8 {
        self.data
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Receipt time of the read that completed this packet.
    pub fn at(&self) -> SystemTime {
        self.at
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Mutable payload access for in-place decryption. The length is fixed.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    pub fn is_system(&self) -> bool {
        self.header.is_system()
    }

    pub fn system_type(&self) -> Option<SystemPacketType> {
        if self.is_system() {
            SystemPacketType::from_code(self.type_code())
        } else {
            None
        }
    }

    pub fn car_type(&self) -> Option<CarPacketType> {
        if self.is_system() {
            None
        } else {
            CarPacketType::from_code(self.type_code())
        }
    }

    /// Whether the payload of this category passes through the session cipher.
    pub fn is_encrypted(&self) -> bool {
        match self.car() {
            0 => matches!(
                self.system_type(),
                Some(
                    SystemPacketType::Timestamp
                        | SystemPacketType::Weather
                        | SystemPacketType::TrackStatus
                        | SystemPacketType::Commentary
                        | SystemPacketType::Notice
                        | SystemPacketType::Speed
                )
            ),
            car if car <= MAX_CAR_NUMBER => self.car_type() != Some(CarPacketType::PositionUpdate),
            _ => false,
        }
    }

    /// Whether this packet restarts the session cipher from its seed.
    pub fn resets_decryption(&self) -> bool {
        matches!(
            self.system_type(),
            Some(SystemPacketType::EventId | SystemPacketType::KeyFrame)
        )
    }

    /// Re-encode header and payload as they appeared on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.header.as_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}
