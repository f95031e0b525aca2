//! Link session state
//!
//! A session represents one conversation with one module and tracks:
//! - Module address
//! - Link state (closed, open, password verified)
//! - Exchange counter (used to correlate log lines)

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not open
    Closed,

    /// Transport open but handshake password not verified
    Open,

    /// Handshake done, ready for commands
    Verified,
}

/// Session manager
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Module address used in every frame
    address: AtomicU32,

    /// Exchanges issued in this session
    exchanges: AtomicU32,

    /// Current session state
    state: parking_lot::RwLock<SessionState>,
}

impl Session {
    /// Create a new closed session for `address`
    pub fn new(address: u32) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                address: AtomicU32::new(address),
                exchanges: AtomicU32::new(0),
                state: parking_lot::RwLock::new(SessionState::Closed),
            }),
        }
    }

    /// Get module address
    pub fn address(&self) -> u32 {
        self.inner.address.load(Ordering::Acquire)
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Check if the link is open
    pub fn is_open(&self) -> bool {
        !matches!(self.state(), SessionState::Closed)
    }

    /// Check if the handshake succeeded
    pub fn is_verified(&self) -> bool {
        matches!(self.state(), SessionState::Verified)
    }

    /// Mark the link as open
    pub fn open(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Closed {
            return Err(Error::InvalidSessionState(format!(
                "Cannot open from state: {:?}",
                *state
            )));
        }

        self.inner.exchanges.store(0, Ordering::Release);
        *state = SessionState::Open;

        Ok(())
    }

    /// Mark the handshake password as verified
    pub fn verify(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Open {
            return Err(Error::InvalidSessionState(format!(
                "Cannot verify from state: {:?}",
                *state
            )));
        }

        *state = SessionState::Verified;
        Ok(())
    }

    /// Close session
    pub fn close(&self) {
        self.inner.exchanges.store(0, Ordering::Release);
        *self.inner.state.write() = SessionState::Closed;
    }

    /// Get next exchange number (wraps around)
    pub fn next_exchange(&self) -> u32 {
        self.inner.exchanges.fetch_add(1, Ordering::AcqRel)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(crate::DEFAULT_ADDRESS)
    }
}
