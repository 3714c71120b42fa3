//! Named, saved chart layouts.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::SetupError;
use crate::state::{ChartHeight, ChartWidth};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSetup {
    #[serde(default)]
    pub series: Vec<Option<String>>,
    #[serde(default)]
    pub width: ChartWidth,
    #[serde(default)]
    pub height: ChartHeight,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    #[serde(default)]
    pub visible: Vec<usize>,
    /// Keyed by chart id ("1" … "8").
    #[serde(default)]
    pub charts: BTreeMap<String, ChartSetup>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub sheet_name: Option<String>,
}

impl Setup {
    /// `NAME  (file / sheet)` when the setup was saved with a file loaded.
    pub fn label(&self, name: &str) -> String {
        let mut label = name.to_string();
        if let Some(file) = self.file_name.as_deref().filter(|f| !f.is_empty()) {
            label.push_str(&format!("  ({file}"));
            if let Some(sheet) = self.sheet_name.as_deref().filter(|s| !s.is_empty()) {
                label.push_str(&format!(" / {sheet}"));
            }
            label.push(')');
        }
        label
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupOption {
    pub value: String,
    pub label: String,
}

/// In-memory setups, optionally mirrored to a JSON file.
#[derive(Debug, Default)]
pub struct SetupStore {
    path: Option<PathBuf>,
    setups: BTreeMap<String, Setup>,
}

impl SetupStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, SetupError> {
        let storage = |message: String| SetupError::Storage {
            path: path.display().to_string(),
            message,
        };
        let setups: BTreeMap<String, Setup> = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| storage(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(storage(e.to_string())),
        };
        Ok(SetupStore {
            path: Some(path.to_path_buf()),
            setups,
        })
    }

    pub fn len(&self) -> usize {
        self.setups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setups.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Setup> {
        self.setups.get(name)
    }

    pub fn options(&self) -> Vec<SetupOption> {
        self.setups
            .iter()
            .map(|(name, setup)| SetupOption {
                value: name.clone(),
                label: setup.label(name),
            })
            .collect()
    }

    /// Store `setup` under the trimmed `name`, replacing any previous one.
    /// Returns the name actually used.
    pub fn save(&mut self, name: &str, setup: Setup) -> Result<String, SetupError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SetupError::EmptyName);
        }
        self.setups.insert(name.to_string(), setup);
        self.flush()?;
        Ok(name.to_string())
    }

    pub fn delete(&mut self, name: &str) -> Result<Setup, SetupError> {
        if name.trim().is_empty() {
            return Err(SetupError::NothingSelected);
        }
        let removed = self
            .setups
            .remove(name)
            .ok_or_else(|| SetupError::NotFound(name.to_string()))?;
        self.flush()?;
        Ok(removed)
    }

    fn flush(&self) -> Result<(), SetupError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let storage = |message: String| SetupError::Storage {
            path: path.display().to_string(),
            message,
        };
        let text = serde_json::to_string_pretty(&self.setups).map_err(|e| storage(e.to_string()))?;

        // sibling temp file + rename: readers see the old or the new store, never half of one
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| storage(e.to_string()))?;
        tmp.write_all(text.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| storage(e.to_string()))?;
        tmp.persist(path).map_err(|e| storage(e.error.to_string()))?;
        Ok(())
    }
}
