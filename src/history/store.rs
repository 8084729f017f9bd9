//! JSON log store with atomic rewrite.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::models::ServiceLog;

/// Log store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed log store: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to replace log store: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// All services' history, keyed by service name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogStore(BTreeMap<String, ServiceLog>);

impl LogStore {
    /// Load the store from `path`. A missing file yields an empty store.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let content = match fs::read(path.as_ref()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    /// Rewrite the whole store at `path`.
    ///
    /// Writes to a temporary file in the same directory and renames it over
    /// the target, so a failed save leaves the previous file intact.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut content = serde_json::to_vec_pretty(&self.0)?;
        content.push(b'\n');

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&content)?;
        // Temp files are created 0600; keep the store's mode, or 0644 for a new one
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match fs::metadata(path) {
                Ok(meta) => meta.permissions().mode() & 0o777,
                Err(_) => 0o644,
            };
            tmp.as_file().set_permissions(fs::Permissions::from_mode(mode))?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }

    /// Log for `name`, created empty on first use.
    pub fn service_mut(&mut self, name: &str) -> &mut ServiceLog {
        self.0.entry(name.to_string()).or_default()
    }

    #[cfg(test)]
    pub fn service(&self, name: &str) -> Option<&ServiceLog> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
