//! Acknowledge packet confirmation codes and reply payload parsing

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use std::fmt;

use crate::{
    command::Command,
    error::{Error, Result},
    packet::Packet,
};

/// Confirmation code carried by the first byte of every acknowledge packet
///
/// The set is closed: codes the module may send that are not listed here
/// fail [`Outcome::try_from`] and are treated as protocol errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Outcome {
    Success = 0x00,
    PacketError = 0x01,
    NoFinger = 0x02,
    ImageFail = 0x03,
    ImageMessy = 0x06,
    FeatureFail = 0x07,
    NoMatch = 0x08,
    NotFound = 0x09,
    EnrollMismatch = 0x0A,
    BadLocation = 0x0B,
    ReadTemplateFail = 0x0C,
    UploadFail = 0x0D,
    PacketResponseFail = 0x0E,
    UploadImageFail = 0x0F,
    DeleteFail = 0x10,
    ClearFail = 0x11,
    WrongPassword = 0x13,
    InvalidImage = 0x15,
    FlashError = 0x18,
    InvalidRegister = 0x1A,
    BadConfiguration = 0x1B,
    BadNotepadPage = 0x1C,
    CommPortFail = 0x1D,
    LibraryFull = 0x1F,
    SensorAbnormal = 0x29,
}

impl Outcome {
    /// Check if the module reported success
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Outcomes caused by the finger image rather than the link
    pub fn is_image_problem(self) -> bool {
        matches!(
            self,
            Self::ImageFail | Self::ImageMessy | Self::FeatureFail | Self::InvalidImage
        )
    }

    /// Human readable description
    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PacketError => "error receiving packet",
            Self::NoFinger => "no finger on sensor",
            Self::ImageFail => "failed to capture image",
            Self::ImageMessy => "image too messy",
            Self::FeatureFail => "too few feature points",
            Self::NoMatch => "fingers do not match",
            Self::NotFound => "no matching template",
            Self::EnrollMismatch => "samples do not belong to one finger",
            Self::BadLocation => "template id beyond library",
            Self::ReadTemplateFail => "error reading template",
            Self::UploadFail => "error uploading template",
            Self::PacketResponseFail => "module cannot receive data packets",
            Self::UploadImageFail => "error uploading image",
            Self::DeleteFail => "failed to delete template",
            Self::ClearFail => "failed to clear library",
            Self::WrongPassword => "wrong password",
            Self::InvalidImage => "no valid primary image",
            Self::FlashError => "error writing flash",
            Self::InvalidRegister => "invalid register",
            Self::BadConfiguration => "incorrect register configuration",
            Self::BadNotepadPage => "wrong notepad page",
            Self::CommPortFail => "communication port failure",
            Self::LibraryFull => "fingerprint library full",
            Self::SensorAbnormal => "sensor abnormal",
        }
    }
}

impl TryFrom<u8> for Outcome {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Success),
            0x01 => Ok(Self::PacketError),
            0x02 => Ok(Self::NoFinger),
            0x03 => Ok(Self::ImageFail),
            0x06 => Ok(Self::ImageMessy),
            0x07 => Ok(Self::FeatureFail),
            0x08 => Ok(Self::NoMatch),
            0x09 => Ok(Self::NotFound),
            0x0A => Ok(Self::EnrollMismatch),
            0x0B => Ok(Self::BadLocation),
            0x0C => Ok(Self::ReadTemplateFail),
            0x0D => Ok(Self::UploadFail),
            0x0E => Ok(Self::PacketResponseFail),
            0x0F => Ok(Self::UploadImageFail),
            0x10 => Ok(Self::DeleteFail),
            0x11 => Ok(Self::ClearFail),
            0x13 => Ok(Self::WrongPassword),
            0x15 => Ok(Self::InvalidImage),
            0x18 => Ok(Self::FlashError),
            0x1A => Ok(Self::InvalidRegister),
            0x1B => Ok(Self::BadConfiguration),
            0x1C => Ok(Self::BadNotepadPage),
            0x1D => Ok(Self::CommPortFail),
            0x1F => Ok(Self::LibraryFull),
            0x29 => Ok(Self::SensorAbnormal),
            _ => Err(Error::UnknownConfirmationCode(value)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), *self as u8)
    }
}

/// Parsed acknowledge for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Confirmation outcome
    pub outcome: Outcome,

    /// Bytes following the confirmation code
    pub data: Bytes,
}

impl Response {
    /// Interpret an acknowledge packet as the reply to `command`
    ///
    /// # Errors
    ///
    /// - Unknown confirmation code
    /// - Successful reply shorter than the command's reply shape
    pub fn from_ack(command: &Command, packet: &Packet) -> Result<Self> {
        let code = *packet.payload.first().ok_or(Error::ShortReply {
            instruction: command.instruction(),
            expected: 1,
            actual: 0,
        })?;
        let outcome = Outcome::try_from(code)?;

        // Failing acks may omit the data block
        let expected = command.reply_shape().min_len;
        if outcome.is_success() && packet.payload.len() < expected {
            return Err(Error::ShortReply {
                instruction: command.instruction(),
                expected,
                actual: packet.payload.len(),
            });
        }

        Ok(Self {
            outcome,
            data: packet.payload.slice(1..),
        })
    }

    /// Page id and score from a Search reply
    pub fn search_hit(&self) -> Option<(u16, u16)> {
        (self.data.len() >= 4).then(|| {
            (
                BigEndian::read_u16(&self.data[0..2]),
                BigEndian::read_u16(&self.data[2..4]),
            )
        })
    }

    /// Template count from a TemplateNum reply
    pub fn template_count(&self) -> Option<u16> {
        (self.data.len() >= 2).then(|| BigEndian::read_u16(&self.data[0..2]))
    }

    /// First free slot below `capacity` in an index table page
    ///
    /// Bit `n` of byte `b` describes slot `page * 256 + b * 8 + n`.
    pub fn first_free_slot(&self, page: u8, capacity: u16) -> Option<u16> {
        let base = u32::from(page) * 256;
        self.data.iter().enumerate().find_map(|(index, byte)| {
            (0..8u32).find_map(|bit| {
                let slot = base + index as u32 * 8 + bit;
                let occupied = byte & (1 << bit) != 0;
                (!occupied && slot < u32::from(capacity)).then_some(slot as u16)
            })
        })
    }
}
