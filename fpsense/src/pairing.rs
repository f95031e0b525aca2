//! Sensor pairing
//!
//! On first boot the host writes a random code to notepad page 0 and keeps a
//! copy in a [`PairingStore`]. Later checks read the page back. A different
//! code means the module was replaced or wiped; the pairing is invalidated
//! and stays invalid until the host pairs again.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use fpsense_core::pairing::{code_from_page, derive_code, NOTEPAD_PAGE};
use fpsense_core::Command;

use crate::engine::{ensure_success, ProtocolEngine};
use crate::error::{Error, Result};
use crate::observer::Event;
use crate::retry::{execute_with_retry, RetryPolicy};

pub const WARNING_INVALIDATED: &str =
    "SECURITY: Pairing invalid! Sensor may have been replaced. Do re-pairing.";
pub const WARNING_MISMATCH: &str = "SECURITY ALERT: Sensor pairing mismatch! Possible attack or sensor replacement detected. Fingerprint matches will be blocked. If you replaced the sensor, do re-pairing.";
pub const STATUS_PAIRED: &str = "Pairing successful";
pub const STATUS_PAIR_FAILED: &str = "Pairing failed - check sensor connection";

/// Host-side copy of the pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingRecord {
    /// Code written to the module, `None` before the first pairing
    pub code: Option<String>,
    pub valid: bool,
}

impl Default for PairingRecord {
    fn default() -> Self {
        Self {
            code: None,
            valid: true,
        }
    }
}

/// Persistence for the host-side record
#[cfg_attr(test, mockall::automock)]
pub trait PairingStore: Send + Sync {
    fn load(&self) -> Result<PairingRecord>;
    fn save(&mut self, record: &PairingRecord) -> Result<()>;
}

/// Store that lives as long as the driver
#[derive(Debug, Default)]
pub struct MemoryPairingStore {
    record: PairingRecord,
}

impl MemoryPairingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: PairingRecord) -> Self {
        Self { record }
    }
}

impl PairingStore for MemoryPairingStore {
    fn load(&self) -> Result<PairingRecord> {
        Ok(self.record.clone())
    }

    fn save(&mut self, record: &PairingRecord) -> Result<()> {
        self.record = record.clone();
        Ok(())
    }
}

/// Record persisted as JSON, so an invalidated pairing survives a restart
///
/// A missing file reads as the first-boot record. Saves are written through.
#[derive(Debug)]
pub struct JsonFilePairingStore {
    path: PathBuf,
}

impl JsonFilePairingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        // Fail early on a damaged file rather than on the first check
        let record = store.load()?;
        info!(
            "Pairing record at {}: {}",
            store.path.display(),
            match (&record.code, record.valid) {
                (None, _) => "not paired",
                (Some(_), true) => "paired",
                (Some(_), false) => "invalidated",
            }
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PairingStore for JsonFilePairingStore {
    fn load(&self) -> Result<PairingRecord> {
        if !self.path.exists() {
            debug!("No pairing file at {}", self.path.display());
            return Ok(PairingRecord::default());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| Error::Pairing(format!("Failed to read {}: {e}", self.path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Pairing(format!("Failed to parse {}: {e}", self.path.display())))
    }

    fn save(&mut self, record: &PairingRecord) -> Result<()> {
        let contents = serde_json::to_string_pretty(record)
            .map_err(|e| Error::Pairing(format!("Failed to encode pairing record: {e}")))?;
        fs::write(&self.path, contents)
            .map_err(|e| Error::Pairing(format!("Failed to write {}: {e}", self.path.display())))
    }
}

/// Outcome of a pairing check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    /// A new code was written (first boot or explicit re-pair)
    Paired,

    /// The module holds the expected code
    Valid,

    /// The module holds a different code; the pairing is now invalid
    Mismatch,

    /// The pairing was invalidated earlier
    Invalidated,

    /// The notepad could not be read; nothing changed
    Unreadable,
}

impl PairingStatus {
    /// Validity to report, `None` when unknown
    pub fn valid(self) -> Option<bool> {
        match self {
            Self::Paired | Self::Valid => Some(true),
            Self::Mismatch | Self::Invalidated => Some(false),
            Self::Unreadable => None,
        }
    }

    pub fn warning(self) -> Option<&'static str> {
        match self {
            Self::Paired | Self::Valid => Some(""),
            Self::Mismatch => Some(WARNING_MISMATCH),
            Self::Invalidated => Some(WARNING_INVALIDATED),
            Self::Unreadable => None,
        }
    }

    /// Observer notifications for this status
    pub fn events(self) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(valid) = self.valid() {
            events.push(Event::PairingValid(valid));
        }
        if let Some(warning) = self.warning() {
            events.push(Event::PairingWarning(warning.to_string()));
        }
        events
    }
}

/// Pairing logic bound to one store
pub struct Pairing {
    store: Box<dyn PairingStore>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl Pairing {
    pub fn new(store: Box<dyn PairingStore>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self { store, timeout, retry }
    }

    /// Write a fresh code to the module and remember it
    pub async fn pair(&mut self, engine: &mut ProtocolEngine) -> Result<PairingStatus> {
        let nonce = uuid::Uuid::new_v4();
        let now = chrono::Utc::now().timestamp_millis();
        let code = derive_code(&[
            nonce.as_bytes(),
            &now.to_be_bytes(),
            &engine.address().to_be_bytes(),
        ]);

        let command = Command::write_notepad(NOTEPAD_PAGE, code.as_bytes())?;
        let response = execute_with_retry(engine, &command, self.timeout, &self.retry).await?;
        ensure_success(&command, response)?;

        self.store.save(&PairingRecord {
            code: Some(code),
            valid: true,
        })?;

        info!("Sensor paired");
        Ok(PairingStatus::Paired)
    }

    /// Compare the module's code with the stored one, pairing on first boot
    pub async fn check(&mut self, engine: &mut ProtocolEngine) -> Result<PairingStatus> {
        let mut record = self.store.load()?;

        let Some(expected) = record.code.clone() else {
            info!("No pairing recorded, pairing sensor");
            return self.pair(engine).await;
        };

        if !record.valid {
            warn!("Pairing was invalidated earlier");
            return Ok(PairingStatus::Invalidated);
        }

        let found = match self.read_code(engine).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Could not read pairing code: {}", e);
                return Ok(PairingStatus::Unreadable);
            }
        };

        if found.as_deref() == Some(expected.as_str()) {
            debug!("Pairing code verified");
            return Ok(PairingStatus::Valid);
        }

        error!("Pairing code mismatch, blocking matches");
        record.valid = false;
        self.store
            .save(&record)
            .map_err(|e| Error::Pairing(format!("Failed to record invalid pairing: {e}")))?;

        Ok(PairingStatus::Mismatch)
    }

    async fn read_code(&self, engine: &mut ProtocolEngine) -> Result<Option<String>> {
        let command = Command::read_notepad(NOTEPAD_PAGE)?;
        let response = execute_with_retry(engine, &command, self.timeout, &self.retry).await?;
        let response = ensure_success(&command, response)?;
        Ok(code_from_page(&response.data))
    }
}

impl std::fmt::Debug for Pairing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pairing")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
