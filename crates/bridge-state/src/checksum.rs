//! Artifact checksumming for `add_artifact`/`validate_artifacts` (spec §4.8).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening artifact {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("reading artifact {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn same_content_hashes_identically() {
        let td = tempdir().unwrap();
        let a = td.path().join("a.txt");
        let b = td.path().join("b.txt");
        std::fs::write(&a, b"hello world").unwrap();
        std::fs::write(&b, b"hello world").unwrap();
        assert_eq!(sha256_file(&a).unwrap(), sha256_file(&b).unwrap());
    }

    #[test]
    fn different_content_hashes_differently() {
        let td = tempdir().unwrap();
        let a = td.path().join("a.txt");
        std::fs::write(&a, b"v1").unwrap();
        let hash1 = sha256_file(&a).unwrap();
        let mut f = std::fs::OpenOptions::new().append(true).open(&a).unwrap();
        write!(f, "v2").unwrap();
        drop(f);
        let hash2 = sha256_file(&a).unwrap();
        assert_ne!(hash1, hash2);
    }
}
