use crate::model::Credentials;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const SECURITY_KEY: &str = "security";

pub trait CredentialStore {
    fn exists(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Result<Option<Credentials>>;
    fn put(&mut self, key: &str, record: &Credentials) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read store {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse store {}", self.path.display()))
    }
}

impl CredentialStore for JsonFileStore {
    fn exists(&self, key: &str) -> bool {
        self.read_all()
            .map(|records| records.contains_key(key))
            .unwrap_or(false)
    }

    fn get(&self, key: &str) -> Result<Option<Credentials>> {
        let mut records = self.read_all()?;
        let Some(value) = records.remove(key) else {
            return Ok(None);
        };
        let record = serde_json::from_value(value)
            .with_context(|| format!("malformed record {key} in {}", self.path.display()))?;
        Ok(Some(record))
    }

    fn put(&mut self, key: &str, record: &Credentials) -> Result<()> {
        // A corrupt file is replaced rather than blocking setup.
        let mut records = self.read_all().unwrap_or_default();
        records.insert(key.to_string(), serde_json::to_value(record)?);

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&Value::Object(records))?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write store {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<String, Credentials>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn exists(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    fn get(&self, key: &str) -> Result<Option<Credentials>> {
        Ok(self.records.get(key).cloned())
    }

    fn put(&mut self, key: &str, record: &Credentials) -> Result<()> {
        self.records.insert(key.to_string(), record.clone());
        Ok(())
    }
}
