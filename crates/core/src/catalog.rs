use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest id that still fits a `priority_<id>` callback payload within the
/// 64-byte Telegram limit.
pub const MAX_ENTRY_ID_LEN: usize = 48;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub label: String,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { id: id.into(), label: label.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub departments: Vec<CatalogEntry>,
    pub priorities: Vec<CatalogEntry>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog.{kind} must contain at least one entry")]
    Empty { kind: &'static str },
    #[error("catalog.{kind} entry has an empty id or label")]
    BlankEntry { kind: &'static str },
    #[error("catalog.{kind} id `{id}` is longer than {max} bytes", max = MAX_ENTRY_ID_LEN)]
    IdTooLong { kind: &'static str, id: String },
    #[error("catalog.{kind} id `{id}` is declared more than once")]
    DuplicateId { kind: &'static str, id: String },
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            departments: vec![
                CatalogEntry::new("it", "IT"),
                CatalogEntry::new("office", "Office"),
                CatalogEntry::new("warehouse", "Warehouse"),
                CatalogEntry::new("production", "Production"),
                CatalogEntry::new("accounting", "Accounting"),
            ],
            priorities: vec![
                CatalogEntry::new("low", "Low"),
                CatalogEntry::new("normal", "Normal"),
                CatalogEntry::new("high", "High"),
                CatalogEntry::new("urgent", "Urgent"),
            ],
        }
    }
}

impl Catalog {
    pub fn department(&self, id: &str) -> Option<&CatalogEntry> {
        self.departments.iter().find(|entry| entry.id == id)
    }

    pub fn priority(&self, id: &str) -> Option<&CatalogEntry> {
        self.priorities.iter().find(|entry| entry.id == id)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        validate_entries("departments", &self.departments)?;
        validate_entries("priorities", &self.priorities)
    }
}

fn validate_entries(kind: &'static str, entries: &[CatalogEntry]) -> Result<(), CatalogError> {
    if entries.is_empty() {
        return Err(CatalogError::Empty { kind });
    }

    let mut seen = HashSet::new();
    for entry in entries {
        if entry.id.trim().is_empty() || entry.label.trim().is_empty() {
            return Err(CatalogError::BlankEntry { kind });
        }
        if entry.id.len() > MAX_ENTRY_ID_LEN {
            return Err(CatalogError::IdTooLong { kind, id: entry.id.clone() });
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(CatalogError::DuplicateId { kind, id: entry.id.clone() });
        }
    }

    Ok(())
}
