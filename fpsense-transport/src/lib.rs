//! Transport layer for fpsense
//!
//! Provides UART communication with fingerprint modules, plus an in-memory
//! transport for host-side tests.

pub mod error;
pub mod memory;
pub mod serial;

pub use error::{Error, Result};
pub use memory::{MemoryTransport, Responder, WriteLog};
pub use serial::SerialTransport;

use async_trait::async_trait;
use bytes::BytesMut;

/// Byte link to one module
#[async_trait]
pub trait Transport: Send {
    /// Open the link
    async fn open(&mut self) -> Result<()>;

    /// Close the link
    async fn close(&mut self) -> Result<()>;

    /// Check if the link is open
    fn is_open(&self) -> bool;

    /// Write raw bytes
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Take whatever bytes have arrived without waiting (possibly none)
    async fn read_available(&mut self) -> Result<BytesMut>;

    /// Port or link name for logging
    fn port_name(&self) -> String;
}
