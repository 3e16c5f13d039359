//! Hex-encoded signature files, one signature per file.

use std::path::Path;

use crate::error::{Error, Result};

/// Write `signature` to `path` as lowercase hex.
pub fn save(path: impl AsRef<Path>, signature: &[u8]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, hex::encode(signature)).map_err(|e| Error::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read a hex signature file, ignoring surrounding whitespace.
pub fn read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| Error::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(hex::decode(text.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_writes_hex_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msg.sig");

        save(&path, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "deadbeef");
        assert_eq!(read(&path).unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_read_tolerates_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msg.sig");
        std::fs::write(&path, "  00ff10\n").unwrap();
        assert_eq!(read(&path).unwrap(), vec![0x00, 0xFF, 0x10]);
    }

    #[test]
    fn test_read_rejects_non_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msg.sig");
        std::fs::write(&path, "not hex").unwrap();
        assert!(matches!(read(&path), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read(dir.path().join("absent.sig")),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_save_failure_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("doc.sig");
        match save(&path, &[1, 2, 3]) {
            Err(Error::WriteError { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected WriteError, got {:?}", other),
        }
    }
}
