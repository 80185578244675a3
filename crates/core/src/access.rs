//! Access registry: which users may place orders and which of them receive
//! the finished orders.
//!
//! The registry is read on every inbound event and replaced wholesale on
//! `/reload_users`. Readers clone an `Arc<RegistrySnapshot>`; reload builds a
//! new snapshot off to the side and swaps the pointer, so no reader ever sees
//! a half-applied update.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use crate::transport::UserId;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not read user registry `{source_name}`: {detail}")]
    ReadSource { source_name: String, detail: String },
    #[error("user registry `{source_name}` does not list any valid administrator")]
    NoAdministrators { source_name: String },
}

/// Where the registry text comes from.
pub trait RegistrySource: Send + Sync {
    fn name(&self) -> String;
    fn read(&self) -> Result<String, RegistryError>;
}

#[derive(Clone, Debug)]
pub struct FileRegistrySource {
    path: PathBuf,
}

impl FileRegistrySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RegistrySource for FileRegistrySource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<String, RegistryError> {
        fs::read_to_string(&self.path).map_err(|error| RegistryError::ReadSource {
            source_name: self.name(),
            detail: error.to_string(),
        })
    }
}

/// Registry text held in memory. `replace` swaps the text seen by the next
/// `reload`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRegistrySource {
    text: Arc<Mutex<String>>,
}

impl InMemoryRegistrySource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: Arc::new(Mutex::new(text.into())) }
    }

    pub fn replace(&self, text: impl Into<String>) {
        match self.text.lock() {
            Ok(mut current) => *current = text.into(),
            Err(poisoned) => *poisoned.into_inner() = text.into(),
        }
    }
}

impl RegistrySource for InMemoryRegistrySource {
    fn name(&self) -> String {
        "memory".to_owned()
    }

    fn read(&self) -> Result<String, RegistryError> {
        match self.text.lock() {
            Ok(text) => Ok(text.clone()),
            Err(poisoned) => Ok(poisoned.into_inner().clone()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    admins: HashSet<UserId>,
    allowed: HashSet<UserId>,
}

impl RegistrySnapshot {
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    pub fn is_allowed(&self, user: UserId) -> bool {
        self.allowed.contains(&user)
    }

    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }

    pub fn allowed_count(&self) -> usize {
        self.allowed.len()
    }

    /// Sorted copy so callers get a stable fan-out order.
    pub fn admin_ids(&self) -> Vec<UserId> {
        let mut ids = self.admins.iter().copied().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Administrators,
    AllowedUsers,
    Unknown,
}

fn section_for(header: &str) -> Section {
    match header.trim().to_ascii_uppercase().as_str() {
        "ADMINISTRATORS" | "ADMINS" => Section::Administrators,
        "ALLOWED_USERS" | "USERS" => Section::AllowedUsers,
        _ => Section::Unknown,
    }
}

fn strip_comment(line: &str) -> &str {
    let end = line.find(['#', ';']).unwrap_or(line.len());
    line[..end].trim()
}

fn parse_user_id(entry: &str) -> Option<UserId> {
    // `123 = alice` style lines keep the key, the way INI readers do.
    let key = entry.split(['=', ':']).next().unwrap_or(entry).trim();
    key.parse::<i64>().ok().map(UserId)
}

/// Parses registry text into a snapshot. Unparseable lines are skipped with a
/// warning; zero administrators is a hard failure.
pub fn parse_registry(
    source_name: &str,
    text: &str,
) -> Result<RegistrySnapshot, RegistryError> {
    let mut admins = HashSet::new();
    let mut allowed = HashSet::new();
    let mut section = None::<Section>;

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let entry = strip_comment(raw_line);
        if entry.is_empty() {
            continue;
        }

        if let Some(header) = entry.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let parsed = section_for(header);
            if parsed == Section::Unknown {
                warn!(
                    event_name = "registry.unknown_section",
                    source_name,
                    line_number,
                    section = header,
                    "ignoring unknown registry section"
                );
            }
            section = Some(parsed);
            continue;
        }

        let target = match section {
            Some(Section::Administrators) => &mut admins,
            Some(Section::AllowedUsers) => &mut allowed,
            Some(Section::Unknown) => continue,
            None => {
                warn!(
                    event_name = "registry.entry_outside_section",
                    source_name,
                    line_number,
                    entry,
                    "skipping registry entry that precedes any section header"
                );
                continue;
            }
        };

        match parse_user_id(entry) {
            Some(user) => {
                target.insert(user);
            }
            None => {
                warn!(
                    event_name = "registry.invalid_user_id",
                    source_name,
                    line_number,
                    entry,
                    section = ?section,
                    "skipping registry line that is not an integer user id"
                );
            }
        }
    }

    if admins.is_empty() {
        return Err(RegistryError::NoAdministrators { source_name: source_name.to_owned() });
    }

    allowed.extend(admins.iter().copied());
    Ok(RegistrySnapshot { admins, allowed })
}

pub struct AccessRegistry {
    source: Box<dyn RegistrySource>,
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl AccessRegistry {
    pub fn load<S>(source: S) -> Result<Self, RegistryError>
    where
        S: RegistrySource + 'static,
    {
        let snapshot = read_snapshot(&source)?;
        Ok(Self { source: Box::new(source), current: RwLock::new(Arc::new(snapshot)) })
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        Self::load(FileRegistrySource::new(path))
    }

    pub fn source_name(&self) -> String {
        self.source.name()
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        match self.current.read() {
            Ok(current) => Arc::clone(&current),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.snapshot().is_admin(user)
    }

    pub fn is_allowed(&self, user: UserId) -> bool {
        self.snapshot().is_allowed(user)
    }

    pub fn admin_ids(&self) -> Vec<UserId> {
        self.snapshot().admin_ids()
    }

    /// Re-reads the source. On failure the previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<RegistrySnapshot>, RegistryError> {
        let fresh = Arc::new(read_snapshot(self.source.as_ref())?);
        match self.current.write() {
            Ok(mut current) => *current = Arc::clone(&fresh),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&fresh),
        }
        Ok(fresh)
    }
}

fn read_snapshot(source: &dyn RegistrySource) -> Result<RegistrySnapshot, RegistryError> {
    let source_name = source.name();
    let text = source.read()?;
    let snapshot = parse_registry(&source_name, &text)?;
    info!(
        event_name = "registry.loaded",
        source_name = %source_name,
        admins = snapshot.admin_count(),
        allowed_users = snapshot.allowed_count(),
        "user registry loaded"
    );
    Ok(snapshot)
}
