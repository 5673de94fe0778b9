//! Best-effort JSON state files.
//!
//! Small pieces of host state (window bounds, install bookkeeping, feature
//! toggles) live in single JSON documents next to the logs. The contract is
//! deliberately forgiving: losing this state is an inconvenience, not a
//! failure, so loading never errors (the caller's default stands in for
//! anything unreadable) and saving has a best-effort flavor that logs and
//! moves on.
//!
//! # Atomic Writes
//!
//! Saves use the write-to-temp-then-rename pattern:
//! 1. Write to `<path>.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<path>`
//! 4. fsync the parent directory
//!
//! Readers always see either the old or the new document, never a partial
//! write.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when saving a state file.
#[derive(Debug, Error)]
pub enum StateFileError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for state file operations.
pub type Result<T> = std::result::Result<T, StateFileError>;

/// A typed state document backed by one JSON file on disk.
///
/// `S` is the caller's schema; there is no versioning or migration here.
pub struct StateFile<S> {
    /// Path to the JSON document.
    path: PathBuf,
    /// The in-memory state, mutated through [`StateFile::state_mut`].
    state: S,
}

impl<S: Serialize + DeserializeOwned> StateFile<S> {
    /// Loads the state file, falling back to `default` when it cannot be
    /// read.
    ///
    /// Infallible by design: a missing file is the first-run case and is
    /// logged at `debug`; any other failure (unreadable file, malformed or
    /// mismatched JSON) is logged at `warn`. Either way the caller gets a
    /// working store seeded with `default`.
    pub fn load(path: impl AsRef<Path>, default: S) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "State file is malformed, starting from the default"
                    );
                    default
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file yet, starting from the default");
                default
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read state file, starting from the default"
                );
                default
            }
        };

        StateFile { path, state }
    }

    /// Returns the current in-memory state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Returns the in-memory state for mutation.
    ///
    /// Changes are not persisted until one of the save methods is called.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Returns the path to the JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves the state atomically, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any IO operation fails.
    pub fn save(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    /// Saves the state, logging and swallowing any failure.
    pub fn save_best_effort(&self) {
        if let Err(e) = self.save() {
            warn!(path = %self.path.display(), error = %e, "Failed to persist state file");
        }
    }

    /// Saves the state without blocking the caller on file IO.
    ///
    /// Serialization happens on the calling thread; only the bytes and the
    /// path move to the worker, so `S` needs no `Send` bound. Failures are
    /// logged at `warn`. The returned handle may be dropped for
    /// fire-and-forget or joined when completion matters.
    pub fn save_in_background(&self) -> thread::JoinHandle<()> {
        let path = self.path.clone();
        let bytes = serde_json::to_vec_pretty(&self.state);
        thread::spawn(move || match bytes {
            Ok(bytes) => {
                if let Err(e) = write_atomic(&path, &bytes) {
                    warn!(path = %path.display(), error = %e, "Failed to persist state file");
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to serialize state");
            }
        })
    }
}

/// Writes `bytes` to `path` via the temp-then-rename pattern.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = parent_dir(path) {
        fs::create_dir_all(parent)?;
    }

    // `<path>.tmp`, appended rather than with_extension so state files
    // without an extension still get a distinct temp name
    let mut tmp_path = path.as_os_str().to_os_string();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    if let Some(parent) = parent_dir(path) {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Parent directory of `path`, with the empty parent of a bare file name
/// mapped to the current directory so it can be created and fsynced.
fn parent_dir(path: &Path) -> Option<&Path> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Some(Path::new(".")),
        parent => parent,
    }
}

/// Syncs a directory so the rename above survives a power loss.
fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
