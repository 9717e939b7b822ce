//! Best-effort persistence of session state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::StorageKind;
use crate::error::StorageError;
use crate::state::State;

pub trait Storage {
    /// The state stored under `key`, or `None` if nothing is.
    ///
    /// # Errors
    /// - If the backing store could not be read, or holds something that is
    ///   not a JSON object.
    fn load(&self, key: &str) -> Result<Option<State>, StorageError>;

    /// # Errors
    /// - If the backing store could not be written.
    fn save(&self, key: &str, state: &State) -> Result<(), StorageError>;
}

/// Storage that lives as long as the engine does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<State>, StorageError> {
        self.entries
            .borrow()
            .get(key)
            .map(|raw| {
                serde_json::from_str(raw).map_err(|source| StorageError::Json {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    fn save(&self, key: &str, state: &State) -> Result<(), StorageError> {
        let raw = serde_json::to_string(state).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        self.entries.borrow_mut().insert(key.to_string(), raw);
        Ok(())
    }
}

/// Storage that survives the process: one `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{}.json", file_name))
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<State>, StorageError> {
        let raw = match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Json {
                key: key.to_string(),
                source,
            })
    }

    fn save(&self, key: &str, state: &State) -> Result<(), StorageError> {
        let io_error = |source: std::io::Error| StorageError::Io {
            key: key.to_string(),
            source,
        };
        let raw = serde_json::to_string_pretty(state).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        std::fs::create_dir_all(&self.directory).map_err(io_error)?;
        std::fs::write(self.path_for(key), raw).map_err(io_error)
    }
}

/// Builds the backend `kind` selects.
pub(crate) fn open(kind: &StorageKind) -> Box<dyn Storage> {
    match kind {
        StorageKind::Session => Box::new(MemoryStorage::new()),
        StorageKind::Durable { directory } => Box::new(FileStorage::new(directory)),
    }
}
