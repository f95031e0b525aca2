//! Error types for fpsense-core

/// Result type alias for fpsense-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Packet is too short to be valid
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// Frame does not open with the start code
    #[error("Bad start code: 0x{0:04X}")]
    BadStartCode(u16),

    /// Length field cannot describe a valid frame
    #[error("Invalid length field: {0}")]
    InvalidLength(u16),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Unknown packet type tag
    #[error("Unknown packet type: 0x{0:02X}")]
    UnknownPacketType(u8),

    /// Unknown instruction code
    #[error("Unknown instruction code: 0x{0:02X}")]
    UnknownInstruction(u8),

    /// Unknown confirmation code in an acknowledge packet
    #[error("Unknown confirmation code: 0x{0:02X}")]
    UnknownConfirmationCode(u8),

    /// Acknowledge payload shorter than the command's reply shape
    #[error("Short reply to {instruction}: expected {expected} bytes, got {actual} bytes")]
    ShortReply {
        instruction: crate::command::Instruction,
        expected: usize,
        actual: usize,
    },

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Payload too large
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Command parameter out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// Check if the error came from damaged bytes on the wire
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::PacketTooShort { .. }
                | Self::BadStartCode(_)
                | Self::InvalidLength(_)
                | Self::ChecksumMismatch { .. }
                | Self::UnknownPacketType(_)
        )
    }
}
