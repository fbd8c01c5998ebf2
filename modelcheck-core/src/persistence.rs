//! Shared persistence utilities: atomic file writes, append-only logs, JSON load.
//!
//! Model artifacts and golden files are written with the write-to-`.tmp`-then-rename
//! pattern so a crashed test never leaves a half-written artifact behind. Metric
//! dumps are append-only so concurrent test processes never clobber each other.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON, writes it to a `.tmp` sibling,
/// then renames it onto the target path. Creates parent directories.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Append one line to a file, writing `header` first if the file is new or empty.
///
/// The line is emitted with a single `write_all` on a handle opened in append
/// mode, so records from separate processes never interleave mid-line.
pub fn append_line(path: &Path, header: Option<&str>, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut buffer = String::new();
    if let Some(header) = header {
        if file.metadata()?.len() == 0 {
            buffer.push_str(header);
            buffer.push('\n');
        }
    }
    buffer.push_str(line);
    buffer.push('\n');
    file.write_all(buffer.as_bytes())?;
    file.flush()
}

/// Read a JSON document, or `None` when the file is absent.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Header {
        kind: String,
        version: u32,
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("header.json");
        let header = Header {
            kind: "LINEAR".into(),
            version: 1,
        };

        atomic_write_json(&path, &header).unwrap();
        let loaded: Option<Header> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(header));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("golden").join("model.bin");
        atomic_write(&path, b"abc").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_load_json_nonexistent() {
        let result: io::Result<Option<Header>> = load_json(Path::new("/nonexistent/file.json"));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_append_line_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump").join("my_test.csv");

        append_line(&path, Some("a,b"), "1,2").unwrap();
        append_line(&path, Some("a,b"), "3,4").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,b\n1,2\n3,4\n");
    }
}
