//! Snapshot persistence: plain or AES-GCM encrypted JSON.

use crate::error::{Result, TrackerError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Per-file snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Formatted modification time at scan.
    pub last_write_time: String,
    /// SHA-256 of the file content, hex encoded.
    pub hash: String,
    /// File size in bytes.
    pub size: u64,
    /// File extension including the dot, e.g. `.json`.
    #[serde(rename = "type")]
    pub file_type: String,
}

/// A snapshot maps each tracked path to its entry. Ordered keys keep the
/// persisted form stable and comparable.
pub type Snapshot = BTreeMap<String, FileEntry>;

/// Header magic marking an encrypted snapshot, followed by the 12-byte nonce
/// and the ciphertext (auth tag appended by AES-GCM).
const ENCRYPTED_MAGIC: &[u8; 4] = b"MTRK";

fn derive_key(key: &str) -> [u8; 32] {
    let digest = Sha256::digest(key.as_bytes());
    digest.into()
}

/// Serialize and write a snapshot atomically (temp file + rename).
///
/// With a key, the payload is AES-256-GCM encrypted under a fresh nonce
/// stored in the file header.
pub(crate) fn save_snapshot(path: &Path, snapshot: &Snapshot, key: Option<&str>) -> Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| TrackerError::Serialization(e.to_string()))?;

    let payload = match key {
        Some(key) => {
            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derive_key(key)));
            let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
            let ciphertext = cipher
                .encrypt(&nonce, json.as_slice())
                .map_err(|e| TrackerError::Encryption(e.to_string()))?;
            let mut out = Vec::with_capacity(ENCRYPTED_MAGIC.len() + nonce.len() + ciphertext.len());
            out.extend_from_slice(ENCRYPTED_MAGIC);
            out.extend_from_slice(&nonce);
            out.extend_from_slice(&ciphertext);
            out
        }
        None => json,
    };

    let temp = path.with_extension("tmp");
    fs::write(&temp, &payload).map_err(|e| TrackerError::io(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| TrackerError::io(path, e))?;
    debug!(path = %path.display(), bytes = payload.len(), encrypted = key.is_some(), "snapshot written");
    Ok(())
}

/// Load a snapshot, decrypting when a key is supplied and the file carries
/// the encrypted header. A missing file yields an empty snapshot.
pub(crate) fn load_snapshot(path: &Path, key: Option<&str>) -> Result<Snapshot> {
    if !path.exists() {
        trace!(path = %path.display(), "no snapshot on disk");
        return Ok(Snapshot::new());
    }
    let raw = fs::read(path).map_err(|e| TrackerError::io(path, e))?;

    let json = if raw.starts_with(ENCRYPTED_MAGIC) {
        let key = key.ok_or(TrackerError::Decryption)?;
        let body = &raw[ENCRYPTED_MAGIC.len()..];
        if body.len() < 12 {
            return Err(TrackerError::Decryption);
        }
        let (nonce, ciphertext) = body.split_at(12);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derive_key(key)));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TrackerError::Decryption)?
    } else {
        raw
    };

    serde_json::from_slice(&json).map_err(|e| TrackerError::Serialization(e.to_string()))
}

/// SHA-256 of a file's content, hex encoded.
pub(crate) fn hash_file(path: &Path) -> std::io::Result<String> {
    let content = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "a.txt".to_string(),
            FileEntry {
                last_write_time: "2024-01-04 12:00:00".to_string(),
                hash: "deadbeef".to_string(),
                size: 4,
                file_type: ".txt".to_string(),
            },
        );
        snapshot
    }

    #[test]
    fn plain_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        save_snapshot(&path, &sample(), None).unwrap();
        let loaded = load_snapshot(&path, None).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = load_snapshot(&dir.path().join("none.json"), None).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn encrypted_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        save_snapshot(&path, &sample(), Some("hunter2")).unwrap();

        // On-disk form is not JSON.
        let raw = fs::read(&path).unwrap();
        assert!(raw.starts_with(b"MTRK"));
        assert!(serde_json::from_slice::<Snapshot>(&raw).is_err());

        let loaded = load_snapshot(&path, Some("hunter2")).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn wrong_key_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        save_snapshot(&path, &sample(), Some("right")).unwrap();
        let err = load_snapshot(&path, Some("wrong")).unwrap_err();
        assert!(matches!(err, TrackerError::Decryption));

        let err = load_snapshot(&path, None).unwrap_err();
        assert!(matches!(err, TrackerError::Decryption));
    }

    #[test]
    fn hash_is_sha256_hex() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("x");
        fs::write(&file, b"abc").unwrap();
        assert_eq!(
            hash_file(&file).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
