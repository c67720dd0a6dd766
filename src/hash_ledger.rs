//! Content hash ledger for duplicate prevention
//!
//! The ledger is a flat text file with one lowercase hex digest per line.
//! Every payload that gets saved has its digest appended; a payload whose
//! digest is already listed is a duplicate and must not be saved again.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Errors for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error on ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Digest used to fingerprint downloaded payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
    /// Reads ledgers written by older MD5-based tools.
    Md5,
}

impl HashAlgorithm {
    /// Hashes the full payload and returns the lowercase hex digest.
    pub fn content_hash(self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
            HashAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
        }
    }
}

/// Flat-file set of content hashes.
#[derive(Debug)]
pub struct HashLedger {
    path: PathBuf,
    entries: HashSet<String>,
}

/// Ledger shared between download workers. The lock is the single point
/// through which every check and append goes.
pub type SharedLedger = Arc<Mutex<HashLedger>>;

impl HashLedger {
    /// Opens the ledger at `path`. A missing file is an empty ledger.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let mut ledger = Self {
            path: path.as_ref().to_path_buf(),
            entries: HashSet::new(),
        };
        ledger.reload()?;
        Ok(ledger)
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct hashes currently in the ledger.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-reads the whole file into memory.
    pub fn reload(&mut self) -> LedgerResult<()> {
        self.entries = match fs::read_to_string(&self.path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(self.io_error(e)),
        };
        debug!(path = %self.path.display(), entries = self.entries.len(), "Loaded hash ledger");
        Ok(())
    }

    /// Checks membership against the current file contents.
    pub fn contains(&mut self, hash: &str) -> LedgerResult<bool> {
        self.reload()?;
        Ok(self.entries.contains(hash))
    }

    /// Appends a hash to the file. Hashes already present are not written twice.
    pub fn record(&mut self, hash: &str) -> LedgerResult<()> {
        if self.entries.contains(hash) {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{}", hash).map_err(|e| self.io_error(e))?;

        self.entries.insert(hash.to_string());
        Ok(())
    }

    /// Runs `store` and records `hash` only when the hash is not yet known.
    ///
    /// Returns `Ok(None)` for a duplicate. If `store` fails the hash is left
    /// unrecorded so a later attempt can retry it.
    pub fn record_if_new<T, E>(
        &mut self,
        hash: &str,
        store: impl FnOnce() -> Result<T, E>,
    ) -> Result<Option<T>, E>
    where
        E: From<LedgerError>,
    {
        if self.contains(hash)? {
            return Ok(None);
        }
        let stored = store()?;
        self.record(hash)?;
        Ok(Some(stored))
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
