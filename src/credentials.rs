//! Per-backend API key storage.
//!
//! The core never inspects a secret; it only looks keys up, stores them,
//! and deletes them by backend. The file-backed store keeps a small TOML
//! table under the app directory; the in-memory store backs tests.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::types::Backend;

pub trait CredentialStore: Send + Sync {
    fn get(&self, backend: Backend) -> Result<Option<String>>;
    fn put(&self, backend: Backend, secret: &str) -> Result<()>;
    fn delete(&self, backend: Backend) -> Result<()>;

    fn exists(&self, backend: Backend) -> bool {
        matches!(self.get(backend), Ok(Some(_)))
    }
}

// --- File-backed store ---

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".routerchat").join("credentials.toml"))
    }

    fn read_table(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn write_table(&self, table: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(table).context("Failed to serialize credentials")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, backend: Backend) -> Result<Option<String>> {
        let table = self.read_table()?;
        Ok(table
            .get(backend.credential_name())
            .filter(|s| !s.is_empty())
            .cloned())
    }

    fn put(&self, backend: Backend, secret: &str) -> Result<()> {
        let mut table = self.read_table()?;
        table.insert(backend.credential_name().to_string(), secret.to_string());
        self.write_table(&table)
    }

    fn delete(&self, backend: Backend) -> Result<()> {
        let mut table = self.read_table()?;
        table.remove(backend.credential_name());
        self.write_table(&table)
    }
}

// --- In-memory store ---

#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<&'static str, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, backend: Backend) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(backend.credential_name()).cloned())
    }

    fn put(&self, backend: Backend, secret: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(backend.credential_name(), secret.to_string());
        Ok(())
    }

    fn delete(&self, backend: Backend) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(backend.credential_name());
        Ok(())
    }
}
