//! # File Digests
//!
//! `FileDigest` is the content hash recorded per file in a manifest: a
//! SHA-256 digest rendered as 64 lowercase hex characters, which is the
//! on-disk format of `checksum.json`.
//!
//! Digests are produced by streaming the input through `sha2::Sha256` in
//! fixed-size chunks, so large bundle files are never read into memory whole.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex length of a SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Read buffer size used while hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// A SHA-256 content digest as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileDigest(String);

impl FileDigest {
    /// Parse a hex digest, normalizing to lowercase.
    ///
    /// Returns a description of the problem when the input is not exactly
    /// 64 hex characters.
    pub fn parse(hex: &str) -> Result<Self, String> {
        let d = hex.trim().to_ascii_lowercase();
        if d.len() != DIGEST_HEX_LEN {
            return Err(format!(
                "digest must be {DIGEST_HEX_LEN} hex chars, got {} chars",
                d.len()
            ));
        }
        if !d.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("digest contains non-hex characters".to_string());
        }
        Ok(Self(d))
    }

    /// The digest as a hex string slice.
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    fn from_hash(hash: &[u8]) -> Self {
        Self(hash.iter().map(|b| format!("{b:02x}")).collect())
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FileDigest {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FileDigest> for String {
    fn from(value: FileDigest) -> Self {
        value.0
    }
}

/// Hash everything readable from `reader`.
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<FileDigest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(FileDigest::from_hash(&hasher.finalize()))
}

/// Hash the contents of the file at `path`.
pub fn sha256_file(path: &Path) -> io::Result<FileDigest> {
    sha256_reader(File::open(path)?)
}

/// Hash an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> FileDigest {
    FileDigest::from_hash(&Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sha256_vector() {
        assert_eq!(
            sha256_bytes(b"").as_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_bytes(b"abc").as_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_reader_matches_bytes_across_chunk_boundary() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 13];
        let streamed = sha256_reader(data.as_slice()).unwrap();
        assert_eq!(streamed, sha256_bytes(&data));
    }

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(b"abc"));
    }

    #[test]
    fn test_parse_normalizes_case_and_rejects_garbage() {
        let upper = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        assert_eq!(FileDigest::parse(upper).unwrap(), sha256_bytes(b"abc"));
        assert!(FileDigest::parse("abc").is_err());
        assert!(FileDigest::parse(&"z".repeat(64)).is_err());
    }

    #[test]
    fn test_serde_is_plain_hex_string() {
        let d = sha256_bytes(b"abc");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.as_hex()));
        let back: FileDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
