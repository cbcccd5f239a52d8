//! Append-only JSON Lines files

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One record per line. Existing lines are never rewritten.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append entries in order. The caller serializes concurrent writers.
    pub fn append<T: Serialize>(&self, entries: &[T]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            serde_json::to_writer(&mut writer, entry)
                .with_context(|| format!("Failed to serialize entry for {}", self.path.display()))?;
            writer.write_all(b"\n")?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Read every entry back. A missing file reads as empty.
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        BufReader::new(file)
            .lines()
            .enumerate()
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(|(n, line)| {
                let line = line?;
                serde_json::from_str(&line).with_context(|| {
                    format!("Malformed entry at {}:{}", self.path.display(), n + 1)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: u32,
        note: String,
    }

    #[test]
    fn test_append_preserves_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("log.jsonl"));
        assert!(store.read_all::<Entry>().unwrap().is_empty());

        store
            .append(&[Entry { id: 1, note: "a".into() }, Entry { id: 2, note: "b".into() }])
            .unwrap();
        store.append(&[Entry { id: 3, note: "c".into() }]).unwrap();
        store.append::<Entry>(&[]).unwrap();

        let entries: Vec<Entry> = store.read_all().unwrap();
        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "{\"id\":1,\"note\":\"a\"}\nnot json\n").unwrap();
        let err = JsonlStore::new(&path).read_all::<Entry>().unwrap_err();
        assert!(err.to_string().contains(":2"));
    }
}
