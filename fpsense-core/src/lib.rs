//! # fpsense-core
//!
//! Core protocol implementation for R50x / AS608 fingerprint modules.
//!
//! This crate provides the low-level protocol primitives:
//! - Packet structure and encoding/decoding
//! - Checksum calculation
//! - Incremental framing of a byte stream
//! - Instruction and confirmation code definitions
//! - Protocol constants

pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod framer;
pub mod packet;
pub mod pairing;
pub mod response;
pub mod session;

pub use command::{Command, Instruction, ReplyShape};
pub use error::{Error, Result};
pub use framer::{CorruptFrame, CorruptReason, Decoded, Framer};
pub use packet::{Packet, PacketType};
pub use response::{Outcome, Response};
pub use session::{Session, SessionState};

/// Start code that opens every frame
pub const START_CODE: u16 = 0xEF01;

/// Default module address
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;

/// Maximum payload size (instruction/confirmation byte included)
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// Header size: start code, address, packet type, length
pub const HEADER_SIZE: usize = 9;
