//! Module system parameters (ReadSysPara reply)

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};
use std::fmt;

use crate::error::{Error, Result};

bitflags! {
    /// Module status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u16 {
        /// Module is executing a command
        const BUSY = 0x0001;

        /// Last finger verification passed
        const PASS = 0x0002;

        /// Handshake password verified
        const PASSWORD_OK = 0x0004;

        /// Image buffer holds a valid image
        const IMAGE_BUFFER_VALID = 0x0008;
    }
}

/// Decoded ReadSysPara data block
///
/// # Layout
///
/// ```text
/// status u16 | system id u16 | library size u16 | security level u16 |
/// address u32 | packet size code u16 | baud setting u16
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemParameters {
    pub status: StatusFlags,
    pub system_id: u16,

    /// Template library capacity
    pub capacity: u16,

    /// Matching threshold, 1 (lenient) ..= 5 (strict)
    pub security_level: u16,

    pub address: u32,

    /// 0 = 32, 1 = 64, 2 = 128, 3 = 256 bytes
    pub packet_size_code: u16,

    /// Baud rate divided by 9600
    pub baud_setting: u16,
}

impl SystemParameters {
    /// Size of the encoded block
    pub const SIZE: usize = 16;

    /// Parse the 16 data bytes that follow the confirmation code
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Parse(format!(
                "system parameters need {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        let capacity = BigEndian::read_u16(&data[4..6]);
        if capacity == 0 {
            return Err(Error::Validation("module reports an empty template library".into()));
        }

        Ok(Self {
            status: StatusFlags::from_bits_truncate(BigEndian::read_u16(&data[0..2])),
            system_id: BigEndian::read_u16(&data[2..4]),
            capacity,
            security_level: BigEndian::read_u16(&data[6..8]),
            address: BigEndian::read_u32(&data[8..12]),
            packet_size_code: BigEndian::read_u16(&data[12..14]),
            baud_setting: BigEndian::read_u16(&data[14..16]),
        })
    }

    /// Data packet size in bytes
    pub fn packet_size(&self) -> usize {
        32 << self.packet_size_code.min(3)
    }

    /// Baud rate in bits per second
    pub fn baud_rate(&self) -> u32 {
        u32::from(self.baud_setting) * 9600
    }
}

impl fmt::Display for SystemParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SystemParameters[capacity: {}, security: {}, addr: 0x{:08X}, baud: {}]",
            self.capacity,
            self.security_level,
            self.address,
            self.baud_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_bytes() {
        let data = [
            0x00, 0x04, // status: password ok
            0x00, 0x00, // system id
            0x00, 0xC8, // capacity 200
            0x00, 0x03, // security level
            0xFF, 0xFF, 0xFF, 0xFF, // address
            0x00, 0x02, // 128 byte packets
            0x00, 0x06, // 57600 baud
        ];

        let params = SystemParameters::from_bytes(&data).unwrap();

        assert_eq!(params.status, StatusFlags::PASSWORD_OK);
        assert_eq!(params.capacity, 200);
        assert_eq!(params.security_level, 3);
        assert_eq!(params.address, 0xFFFF_FFFF);
        assert_eq!(params.packet_size(), 128);
        assert_eq!(params.baud_rate(), 57_600);
    }

    #[test]
    fn test_from_short_bytes() {
        assert!(matches!(
            SystemParameters::from_bytes(&[0u8; 10]),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            SystemParameters::from_bytes(&[0u8; 16]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_status_bits_ignored() {
        let mut data = [0u8; 16];
        data[0] = 0xFF;
        data[1] = 0x09;
        data[5] = 0x64;

        let params = SystemParameters::from_bytes(&data).unwrap();
        assert_eq!(params.status, StatusFlags::BUSY | StatusFlags::IMAGE_BUFFER_VALID);
    }
}
