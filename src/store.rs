//! On-device transcript persistence.
//!
//! A deliberately small interface: insert one entry, wipe everything,
//! fetch everything ordered by time. The file-backed store keeps the
//! transcript as JSON under the app directory, the way sessions are kept
//! on disk; the in-memory store backs tests.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::types::ChatMessage;

pub trait MessageStore: Send + Sync {
    fn insert(&self, entry: &ChatMessage) -> Result<()>;
    fn delete_all(&self) -> Result<()>;
    fn fetch_all_sorted_by_time(&self) -> Result<Vec<ChatMessage>>;
}

// --- File-backed store ---

pub struct FileMessageStore {
    path: PathBuf,
}

impl FileMessageStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".routerchat").join("messages.json"))
    }

    fn read_entries(&self) -> Result<Vec<ChatMessage>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn write_entries(&self, entries: &[ChatMessage]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl MessageStore for FileMessageStore {
    fn insert(&self, entry: &ChatMessage) -> Result<()> {
        let mut entries = self.read_entries()?;
        entries.push(entry.clone());
        self.write_entries(&entries)
    }

    fn delete_all(&self) -> Result<()> {
        self.write_entries(&[])
    }

    fn fetch_all_sorted_by_time(&self) -> Result<Vec<ChatMessage>> {
        let mut entries = self.read_entries()?;
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}

// --- In-memory store ---

#[derive(Default)]
pub struct MemoryMessageStore {
    entries: Mutex<Vec<ChatMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryMessageStore {
    fn insert(&self, entry: &ChatMessage) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    fn fetch_all_sorted_by_time(&self) -> Result<Vec<ChatMessage>> {
        let mut entries = self.entries.lock().unwrap().clone();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}
