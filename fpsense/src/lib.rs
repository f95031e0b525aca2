//! # fpsense
//!
//! Host-side driver for R50x / AS608 UART fingerprint modules.
//!
//! ## Features
//!
//! - Checksummed framing with resynchronisation after line noise
//! - One command in flight per link, with deadlines and caller retry policy
//! - Finger polling with ring / match / no-match notifications
//! - Multi-sample enrollment that waits for a lift between placements
//! - Template names, Aura LED feedback and sensor pairing
//!
//! ## Quick Start
//!
//! ```no_run
//! use fpsense::{Driver, DriverConfig, SerialTransport};
//!
//! #[tokio::main]
//! async fn main() -> fpsense::Result<()> {
//!     let config = DriverConfig::default().with_port("/dev/ttyUSB0");
//!     let transport = SerialTransport::new(&config.serial.port);
//!
//!     let mut driver = Driver::new(Box::new(transport), config);
//!     driver.set_status_observer(|status: String| println!("{}", status));
//!     driver.setup().await?;
//!
//!     // Poll on a background task and enroll into slot 3
//!     let (handle, task) = driver.spawn();
//!     handle.start_enrollment(Some(3), Some("Alice".into())).await?;
//!
//!     handle.shutdown().await?;
//!     task.await.ok();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod enroll;
pub mod error;
pub mod handle;
pub mod led;
pub mod names;
pub mod observer;
pub mod pairing;
pub mod poll;
pub mod retry;

// Re-exports
pub use config::DriverConfig;
pub use driver::Driver;
pub use engine::ProtocolEngine;
pub use enroll::{EnrollPhase, EnrollmentOutcome, FailureReason};
pub use error::{Error, Result};
pub use handle::DriverHandle;
pub use names::{JsonFileNames, MemoryNames, NameRegistry};
pub use observer::{Event, Observer};
pub use pairing::{
    JsonFilePairingStore, MemoryPairingStore, PairingRecord, PairingStatus, PairingStore,
};
pub use retry::{Backoff, RetryPolicy};

// Re-export lower layers
pub use fpsense_core::{Command, Instruction, Outcome, Packet, Response};
pub use fpsense_transport::{MemoryTransport, SerialTransport, Transport};
pub use fpsense_types::{DriverState, MatchResult, SystemParameters};
