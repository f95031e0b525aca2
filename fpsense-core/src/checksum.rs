//! Module checksum algorithm
//!
//! From the module datasheet:
//! 1. Take the packet type byte
//! 2. Add both bytes of the length field
//! 3. Add every payload byte
//! 4. Discard overflow above 16 bits

use tracing::trace;

/// Calculate packet checksum
///
/// # Algorithm
///
/// ```text
/// sum = type + len_hi + len_lo + payload[0] + ... + payload[n-1]   (mod 0x10000)
/// ```
///
/// `length` is the value of the length field, i.e. payload length plus the
/// two checksum bytes.
///
/// # Examples
///
/// ```
/// use fpsense_core::checksum;
///
/// // GenImg command: type 0x01, length 0x0003, instruction 0x01
/// assert_eq!(checksum::calculate(0x01, 0x0003, &[0x01]), 0x0005);
/// ```
pub fn calculate(packet_type: u8, length: u16, payload: &[u8]) -> u16 {
    let [len_hi, len_lo] = length.to_be_bytes();

    let sum = payload
        .iter()
        .fold(
            u16::from(packet_type)
                .wrapping_add(u16::from(len_hi))
                .wrapping_add(u16::from(len_lo)),
            |acc, byte| acc.wrapping_add(u16::from(*byte)),
        );

    trace!(
        packet_type = packet_type,
        length = length,
        payload_len = payload.len(),
        checksum = format!("0x{:04X}", sum),
        "Calculated checksum"
    );

    sum
}

/// Verify checksum
pub fn verify(packet_type: u8, length: u16, payload: &[u8], expected: u16) -> bool {
    calculate(packet_type, length, payload) == expected
}
