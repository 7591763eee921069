//! Window marks: single-character labels bound to windows.
//!
//! The mark map is the only durable state in the system. It lives in a flat
//! JSON file, read once at startup and rewritten wholesale on every mutation.
//! Saves go through a temp file and rename so another process reading the
//! file never observes a torn write.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::workspace::WindowId;

/// Mark persistence errors.
#[derive(Debug, Error)]
pub enum MarkError {
    /// Filesystem failure while saving.
    #[error("failed to write mark file: {0}")]
    Io(#[from] io::Error),

    /// The in-memory map could not be serialized.
    #[error("failed to serialize marks: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The window-mark map with write-through persistence.
#[derive(Debug)]
pub struct MarkStore {
    path: PathBuf,
    marks: HashMap<WindowId, char>,
}

impl MarkStore {
    /// Loads the store from `path`. A missing or unreadable file yields an
    /// empty map; marks are convenience state, not something worth refusing
    /// to start over.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let marks = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(marks) => marks,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "mark file unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, marks }
    }

    /// Assigns `label` to `window` and persists. A label is unique: if
    /// another window currently holds it, that entry is removed (last write
    /// wins). Re-marking a window replaces its old label.
    ///
    /// # Errors
    /// Returns [`MarkError`] when the save fails; the in-memory map keeps
    /// the new state regardless.
    pub fn set(&mut self, window: WindowId, label: char) -> Result<(), MarkError> {
        self.marks.retain(|_, existing| *existing != label);
        self.marks.insert(window, label);
        debug!(window, %label, "mark set");
        self.save()
    }

    /// The window currently holding `label`, if any.
    #[must_use]
    pub fn window_for(&self, label: char) -> Option<WindowId> {
        self.marks
            .iter()
            .find(|(_, l)| **l == label)
            .map(|(id, _)| *id)
    }

    /// Number of marks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether no marks exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), MarkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string(&self.marks)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
