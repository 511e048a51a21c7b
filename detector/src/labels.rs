//! Model label table.
//!
//! The label file is plain text, one label per line; the zero-based line
//! number is the model class id, so blank lines keep their slot.

use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::types::TargetClass;

/// Class-id indexed label table with the pipeline class for each entry.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    entries: Vec<(String, TargetClass)>,
}

impl LabelTable {
    /// Loads and parses a label file. A missing or unreadable file is an
    /// initialisation failure.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| PipelineError::LabelError(format!("{}: {err}", path.display())))?;
        let table = Self::parse(&text);
        log::info!(
            "loaded {} labels from {} ({} tracked)",
            table.len(),
            path.display(),
            table
                .entries
                .iter()
                .filter(|(_, class)| *class != TargetClass::Unknown)
                .count()
        );
        Ok(table)
    }

    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(|line| {
                let label = line.trim();
                (label.to_string(), TargetClass::from_label(label))
            })
            .collect();
        Self { entries }
    }

    /// Pipeline class for a model class id; `Unknown` when the id is out of
    /// range or the label is not in the dictionary.
    pub fn class(&self, id: usize) -> TargetClass {
        self.entries
            .get(id)
            .map(|(_, class)| *class)
            .unwrap_or(TargetClass::Unknown)
    }

    /// Raw label string for a model class id.
    pub fn label(&self, id: usize) -> Option<&str> {
        self.entries.get(id).map(|(label, _)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
