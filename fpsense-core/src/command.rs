//! Module instruction definitions
//!
//! Names follow the datasheet so they can be looked up directly.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    constants::{notepad, CHAR_BUFFERS, INDEX_TABLE_PAGES},
    error::{Error, Result},
    packet::{Packet, PacketType},
};

/// Instruction codes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    // Fingerprint processing
    GenImg = 0x01,
    Img2Tz = 0x02,
    Match = 0x03,
    Search = 0x04,
    RegModel = 0x05,

    // Library management
    Store = 0x06,
    LoadChar = 0x07,
    DeletChar = 0x0C,
    Empty = 0x0D,

    // System
    ReadSysPara = 0x0F,
    VfyPwd = 0x13,
    WriteNotepad = 0x18,
    ReadNotepad = 0x19,
    TemplateNum = 0x1D,
    ReadIndexTable = 0x1F,
    AuraLedConfig = 0x35,
    HandShake = 0x40,
}

impl Instruction {
    /// Get instruction name as written in the datasheet
    pub fn name(self) -> &'static str {
        match self {
            Self::GenImg => "GenImg",
            Self::Img2Tz => "Img2Tz",
            Self::Match => "Match",
            Self::Search => "Search",
            Self::RegModel => "RegModel",
            Self::Store => "Store",
            Self::LoadChar => "LoadChar",
            Self::DeletChar => "DeletChar",
            Self::Empty => "Empty",
            Self::ReadSysPara => "ReadSysPara",
            Self::VfyPwd => "VfyPwd",
            Self::WriteNotepad => "WriteNotepad",
            Self::ReadNotepad => "ReadNotepad",
            Self::TemplateNum => "TemplateNum",
            Self::ReadIndexTable => "ReadIndexTable",
            Self::AuraLedConfig => "AuraLedConfig",
            Self::HandShake => "HandShake",
        }
    }
}

impl From<Instruction> for u8 {
    fn from(instruction: Instruction) -> u8 {
        instruction as u8
    }
}

impl TryFrom<u8> for Instruction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::GenImg),
            0x02 => Ok(Self::Img2Tz),
            0x03 => Ok(Self::Match),
            0x04 => Ok(Self::Search),
            0x05 => Ok(Self::RegModel),
            0x06 => Ok(Self::Store),
            0x07 => Ok(Self::LoadChar),
            0x0C => Ok(Self::DeletChar),
            0x0D => Ok(Self::Empty),
            0x0F => Ok(Self::ReadSysPara),
            0x13 => Ok(Self::VfyPwd),
            0x18 => Ok(Self::WriteNotepad),
            0x19 => Ok(Self::ReadNotepad),
            0x1D => Ok(Self::TemplateNum),
            0x1F => Ok(Self::ReadIndexTable),
            0x35 => Ok(Self::AuraLedConfig),
            0x40 => Ok(Self::HandShake),
            _ => Err(Error::UnknownInstruction(value)),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Expected shape of the acknowledge packet for a command
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReplyShape {
    /// Minimum ack payload length, confirmation code included
    pub min_len: usize,
}

impl ReplyShape {
    /// Confirmation code only
    pub const CODE_ONLY: Self = Self { min_len: 1 };

    /// Confirmation code followed by `data` bytes
    pub const fn with_data(data: usize) -> Self {
        Self { min_len: 1 + data }
    }
}

/// A command ready to be sent: instruction plus ordered parameter bytes
///
/// # Examples
///
/// ```
/// use fpsense_core::{Command, Instruction};
///
/// let cmd = Command::search(1, 0, 200);
/// assert_eq!(cmd.instruction(), Instruction::Search);
/// assert_eq!(cmd.params().as_ref(), &[0x01, 0x00, 0x00, 0x00, 0xC8]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    instruction: Instruction,
    params: Bytes,
    reply: ReplyShape,
}

impl Command {
    fn new(instruction: Instruction, params: impl Into<Bytes>, reply: ReplyShape) -> Self {
        Self {
            instruction,
            params: params.into(),
            reply,
        }
    }

    /// Capture a finger image into the image buffer
    pub fn gen_img() -> Self {
        Self::new(Instruction::GenImg, Bytes::new(), ReplyShape::CODE_ONLY)
    }

    /// Extract features from the image buffer into a character buffer (1-based)
    pub fn img2tz(buffer: u8) -> Self {
        Self::new(Instruction::Img2Tz, vec![buffer], ReplyShape::CODE_ONLY)
    }

    /// Search the library for the features in `buffer`
    ///
    /// Reply data: page id (u16) and match score (u16).
    pub fn search(buffer: u8, start_page: u16, page_count: u16) -> Self {
        let mut params = BytesMut::with_capacity(5);
        params.put_u8(buffer);
        params.put_u16(start_page);
        params.put_u16(page_count);
        Self::new(Instruction::Search, params, ReplyShape::with_data(4))
    }

    /// Merge the character buffers into one template
    pub fn reg_model() -> Self {
        Self::new(Instruction::RegModel, Bytes::new(), ReplyShape::CODE_ONLY)
    }

    /// Store the template in `buffer` at library slot `page_id`
    pub fn store(buffer: u8, page_id: u16) -> Self {
        let mut params = BytesMut::with_capacity(3);
        params.put_u8(buffer);
        params.put_u16(page_id);
        Self::new(Instruction::Store, params, ReplyShape::CODE_ONLY)
    }

    /// Delete `count` templates starting at `page_id`
    pub fn delet_char(page_id: u16, count: u16) -> Self {
        let mut params = BytesMut::with_capacity(4);
        params.put_u16(page_id);
        params.put_u16(count);
        Self::new(Instruction::DeletChar, params, ReplyShape::CODE_ONLY)
    }

    /// Delete every template in the library
    pub fn empty() -> Self {
        Self::new(Instruction::Empty, Bytes::new(), ReplyShape::CODE_ONLY)
    }

    /// Read the 16-byte system parameter block
    pub fn read_sys_para() -> Self {
        Self::new(Instruction::ReadSysPara, Bytes::new(), ReplyShape::with_data(16))
    }

    /// Verify the handshake password
    pub fn vfy_pwd(password: u32) -> Self {
        Self::new(
            Instruction::VfyPwd,
            password.to_be_bytes().to_vec(),
            ReplyShape::CODE_ONLY,
        )
    }

    /// Number of stored templates (u16)
    pub fn template_num() -> Self {
        Self::new(Instruction::TemplateNum, Bytes::new(), ReplyShape::with_data(2))
    }

    /// Read one page (32 bytes, 256 slots) of the occupancy index table
    pub fn read_index_table(page: u8) -> Result<Self> {
        if page >= INDEX_TABLE_PAGES {
            return Err(Error::InvalidParameter(format!(
                "index table page {} out of range",
                page
            )));
        }
        Ok(Self::new(
            Instruction::ReadIndexTable,
            vec![page],
            ReplyShape::with_data(32),
        ))
    }

    /// Configure the Aura ring LED
    pub fn aura_led_config(control: u8, speed: u8, colour: u8, cycles: u8) -> Self {
        Self::new(
            Instruction::AuraLedConfig,
            vec![control, speed, colour, cycles],
            ReplyShape::CODE_ONLY,
        )
    }

    /// Write 32 bytes of user data to a notepad page; shorter content is zero padded
    pub fn write_notepad(page: u8, content: &[u8]) -> Result<Self> {
        if page >= notepad::PAGES {
            return Err(Error::InvalidParameter(format!("notepad page {} out of range", page)));
        }
        if content.len() > notepad::PAGE_SIZE {
            return Err(Error::PayloadTooLarge {
                size: content.len(),
                max: notepad::PAGE_SIZE,
            });
        }

        let mut params = BytesMut::with_capacity(1 + notepad::PAGE_SIZE);
        params.put_u8(page);
        params.put_slice(content);
        params.put_bytes(0, notepad::PAGE_SIZE - content.len());
        Ok(Self::new(Instruction::WriteNotepad, params, ReplyShape::CODE_ONLY))
    }

    /// Read one notepad page (32 bytes)
    pub fn read_notepad(page: u8) -> Result<Self> {
        if page >= notepad::PAGES {
            return Err(Error::InvalidParameter(format!("notepad page {} out of range", page)));
        }
        Ok(Self::new(
            Instruction::ReadNotepad,
            vec![page],
            ReplyShape::with_data(notepad::PAGE_SIZE),
        ))
    }

    /// Instruction code
    pub fn instruction(&self) -> Instruction {
        self.instruction
    }

    /// Parameter bytes following the instruction code
    pub fn params(&self) -> &Bytes {
        &self.params
    }

    /// Expected acknowledge shape
    pub fn reply_shape(&self) -> ReplyShape {
        self.reply
    }

    /// Build the command packet for `address`
    pub fn to_packet(&self, address: u32) -> Packet {
        let mut payload = BytesMut::with_capacity(1 + self.params.len());
        payload.put_u8(self.instruction.into());
        payload.put_slice(&self.params);
        Packet::with_payload(PacketType::Command, address, payload.freeze())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("instruction", &self.instruction)
            .field("params", &hex::encode(&self.params))
            .finish()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.instruction)
    }
}

/// Valid 1-based character buffer ids
pub fn is_char_buffer(buffer: u8) -> bool {
    (1..=CHAR_BUFFERS).contains(&buffer)
}
