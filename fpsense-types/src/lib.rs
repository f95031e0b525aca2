//! Shared value types for fpsense

pub mod driver_state;
pub mod error;
pub mod match_result;
pub mod system_parameters;

pub use driver_state::DriverState;
pub use error::{Error, Result};
pub use match_result::MatchResult;
pub use system_parameters::{StatusFlags, SystemParameters};
