use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::filesystem::write_atomic;

/// Pinned roll numbers in the order they were pinned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PinSet(Vec<String>);

impl PinSet {
    pub fn contains(&self, roll: &str) -> bool {
        self.0.iter().any(|pinned| pinned == roll)
    }

    /// Returns `false` when `roll` was already pinned.
    pub fn insert(&mut self, roll: &str) -> bool {
        if self.contains(roll) {
            return false;
        }
        self.0.push(roll.to_string());
        true
    }

    /// Returns `false` when `roll` was not pinned.
    pub fn remove(&mut self, roll: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|pinned| pinned != roll);
        self.0.len() != before
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PinSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = PinSet::default();
        for roll in iter {
            let roll = roll.into();
            set.insert(&roll);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinToggle {
    Pinned,
    Unpinned,
}

impl PinToggle {
    pub fn message(self, roll: &str) -> String {
        match self {
            Self::Pinned => format!("Student {roll} pinned."),
            Self::Unpinned => format!("Student {roll} unpinned."),
        }
    }
}

/// File-backed pin set. Toggles within one process are serialized.
#[derive(Debug)]
pub struct PinStore {
    path: PathBuf,
    toggle_lock: Mutex<()>,
}

impl PinStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            toggle_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current pins; a missing or unreadable file counts as no pins.
    pub fn read(&self) -> PinSet {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no pin file yet, starting with no pins");
                return PinSet::default();
            }
            Err(error) => {
                warn!(path = %self.path.display(), %error, "failed to read pin file, ignoring pins");
                return PinSet::default();
            }
        };
        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(rolls) => rolls.into_iter().collect(),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "pin file is corrupt, ignoring pins");
                PinSet::default()
            }
        }
    }

    pub fn write(&self, pins: &PinSet) -> Result<()> {
        let rendered = serde_json::to_string_pretty(pins).context("failed to serialize pins")?;
        write_atomic(&self.path, rendered.as_bytes())
    }

    pub fn toggle(&self, roll: &str) -> Result<PinToggle> {
        let roll = roll.trim();
        if roll.is_empty() {
            bail!("roll number cannot be empty");
        }

        let _guard = self
            .toggle_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("pin store lock poisoned"))?;
        let mut pins = self.read();
        let outcome = if pins.remove(roll) {
            PinToggle::Unpinned
        } else {
            pins.insert(roll);
            PinToggle::Pinned
        };
        self.write(&pins)
            .with_context(|| format!("failed to persist pin change for {roll}"))?;
        let pinned = outcome == PinToggle::Pinned;
        info!(%roll, pinned, "pin toggled");
        Ok(outcome)
    }
}
