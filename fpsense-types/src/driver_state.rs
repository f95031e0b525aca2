//! Observable driver state

use std::fmt;

use crate::match_result::MatchResult;

/// Snapshot of what the driver last learned from the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverState {
    /// A finger is currently on the sensor
    pub finger_present: bool,

    /// Most recent search result
    pub last_match: Option<MatchResult>,

    /// Templates stored on the module
    pub enrolled_count: u16,

    /// Last published status text
    pub status: String,

    /// Template library size
    pub capacity: u16,

    pub security_level: u16,

    /// `None` until pairing has been checked
    pub pairing_valid: Option<bool>,
}

impl DriverState {
    pub fn new(capacity: u16) -> Self {
        Self {
            finger_present: false,
            last_match: None,
            enrolled_count: 0,
            status: String::new(),
            capacity,
            security_level: 0,
            pairing_valid: None,
        }
    }

    /// Check if `id` addresses a library slot
    pub fn is_valid_template_id(&self, id: u16) -> bool {
        id < self.capacity
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DriverState[enrolled: {}/{}, finger: {}, status: {:?}]",
            self.enrolled_count, self.capacity, self.finger_present, self.status
        )
    }
}
