//! Template name registry
//!
//! The module stores only numbered templates; names live on the host.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Name reported for a template without a registry entry
pub const UNKNOWN_NAME: &str = "Unknown";

/// Maps template ids to human readable names
pub trait NameRegistry: Send + Sync {
    fn name(&self, id: u16) -> Option<String>;
    fn insert(&mut self, id: u16, name: String) -> Result<()>;
    fn remove(&mut self, id: u16) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Look up `id`, falling back to [`UNKNOWN_NAME`]
pub fn resolve(registry: Option<&dyn NameRegistry>, id: u16) -> String {
    registry
        .and_then(|registry| registry.name(id))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

/// Registry kept in memory only
#[derive(Debug, Clone, Default)]
pub struct MemoryNames {
    names: BTreeMap<u16, String>,
}

impl MemoryNames {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameRegistry for MemoryNames {
    fn name(&self, id: u16) -> Option<String> {
        self.names.get(&id).cloned()
    }

    fn insert(&mut self, id: u16, name: String) -> Result<()> {
        self.names.insert(id, name);
        Ok(())
    }

    fn remove(&mut self, id: u16) -> Result<()> {
        self.names.remove(&id);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.names.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

/// Registry persisted as a JSON object (`{"3": "Alice"}`)
///
/// Every change is written through to disk.
#[derive(Debug)]
pub struct JsonFileNames {
    path: PathBuf,
    names: BTreeMap<u16, String>,
}

impl JsonFileNames {
    /// Load `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let names = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| Error::Registry(format!("Failed to read {}: {e}", path.display())))?;
            serde_json::from_str(&contents)
                .map_err(|e| Error::Registry(format!("Failed to parse {}: {e}", path.display())))?
        } else {
            debug!("No name file at {}, starting empty", path.display());
            BTreeMap::new()
        };

        info!("Loaded {} template names from {}", names.len(), path.display());

        Ok(Self { path, names })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.names)
            .map_err(|e| Error::Registry(format!("Failed to encode names: {e}")))?;
        fs::write(&self.path, contents)
            .map_err(|e| Error::Registry(format!("Failed to write {}: {e}", self.path.display())))
    }
}

impl NameRegistry for JsonFileNames {
    fn name(&self, id: u16) -> Option<String> {
        self.names.get(&id).cloned()
    }

    fn insert(&mut self, id: u16, name: String) -> Result<()> {
        self.names.insert(id, name);
        self.persist()
    }

    fn remove(&mut self, id: u16) -> Result<()> {
        if self.names.remove(&id).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.names.clear();
        self.persist()
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}
