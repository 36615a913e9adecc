use std::path::{Path, PathBuf};

use domain::equipment::{Equipment, EquipmentSet};
use domain::error::{DomainError, Result};
use serde_json::Value;
use tracing::debug;

/// Raw bytes of every `*.json` file in the equipment directory, sorted by path.
/// Two equal snapshots mean nothing changed on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    files: Vec<(PathBuf, Vec<u8>)>,
}

impl DirectorySnapshot {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Reads equipment documents from a directory, one document (or an array of
/// documents) per `*.json` file.
#[derive(Debug, Clone)]
pub struct EquipmentLoader {
    dir: PathBuf,
}

impl EquipmentLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn load(&self) -> Result<EquipmentSet> {
        let snapshot = self.read_snapshot().await?;
        Self::parse_snapshot(&snapshot)
    }

    pub async fn read_snapshot(&self) -> Result<DirectorySnapshot> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            DomainError::Configuration(format!(
                "cannot read equipment directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            DomainError::Configuration(format!("cannot list {}: {e}", self.dir.display()))
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read(&path).await.map_err(|e| {
                DomainError::Configuration(format!("cannot read {}: {e}", path.display()))
            })?;
            files.push((path, content));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(DirectorySnapshot { files })
    }

    /// All-or-nothing: any invalid document rejects the whole set
    pub fn parse_snapshot(snapshot: &DirectorySnapshot) -> Result<EquipmentSet> {
        let mut equipment = Vec::new();
        for (path, content) in &snapshot.files {
            let source = path.display().to_string();
            let parsed = Self::parse_document(&source, content)?;
            debug!(file = %source, count = parsed.len(), "Parsed equipment document");
            equipment.extend(parsed);
        }
        EquipmentSet::new(equipment)
    }

    pub fn parse_document(source: &str, content: &[u8]) -> Result<Vec<Equipment>> {
        let value: Value = serde_json::from_slice(content)
            .map_err(|e| DomainError::Configuration(format!("{source}: invalid JSON: {e}")))?;

        let documents = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        documents
            .into_iter()
            .map(|doc| {
                let mut equipment: Equipment = serde_json::from_value(doc)
                    .map_err(|e| DomainError::Configuration(format!("{source}: {e}")))?;
                equipment
                    .validate()
                    .map_err(|e| DomainError::Configuration(format!("{source}: {e}")))?;
                Ok(equipment)
            })
            .collect()
    }
}
