//! In-memory transport
//!
//! Every write is handed to a responder closure standing in for the module;
//! whatever the responder returns becomes readable input. Writes are recorded
//! in a shared [`WriteLog`] so tests can inspect the traffic after the
//! transport has been moved into a driver.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::trace;

use crate::{error::*, Transport};

/// Produces the module's reply bytes for one write
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Shared record of written frames
#[derive(Debug, Clone, Default)]
pub struct WriteLog {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl WriteLog {
    /// All writes so far, oldest first
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.lock().is_empty()
    }

    pub fn clear(&self) {
        self.writes.lock().clear();
    }

    fn record(&self, data: &[u8]) {
        self.writes.lock().push(data.to_vec());
    }
}

/// Transport backed by a responder closure
pub struct MemoryTransport {
    name: String,
    open: bool,
    responder: Responder,
    pending: BytesMut,
    chunk_size: usize,
    log: WriteLog,
}

impl MemoryTransport {
    /// Create a closed transport
    pub fn new(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            name: "memory".into(),
            open: false,
            responder: Box::new(responder),
            pending: BytesMut::new(),
            chunk_size: usize::MAX,
            log: WriteLog::default(),
        }
    }

    /// A transport whose module never answers
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Deliver replies at most `chunk_size` bytes per read
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Handle on the write record
    pub fn write_log(&self) -> WriteLog {
        self.log.clone()
    }

    /// Queue unsolicited input
    pub fn inject(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::AlreadyConnected);
        }
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.pending.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(Error::NotConnected);
        }

        trace!("{} <- {} bytes", self.name, data.len());

        self.log.record(data);
        let reply = (self.responder)(data);
        self.pending.extend_from_slice(&reply);

        Ok(())
    }

    async fn read_available(&mut self) -> Result<BytesMut> {
        if !self.open {
            return Err(Error::NotConnected);
        }

        let take = self.pending.len().min(self.chunk_size);
        Ok(self.pending.split_to(take))
    }

    fn port_name(&self) -> String {
        self.name.clone()
    }
}
