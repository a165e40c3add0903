//! Dense, monotonic ID allocation by scanning existing entry files (spec
//! §4.3, "compute the next ID by scanning existing entry files for the
//! maximum numeric suffix and allocating dense successors").

use std::path::Path;

use anyhow::{Context, Result};
use bridge_types::VisionId;

pub fn entry_file_name(id: &VisionId) -> String {
    format!("{}.md", id.as_str())
}

/// Scan `dir` for `vision-NNN.md` files and return the next unused ID.
pub fn next_id(dir: &Path) -> Result<VisionId> {
    if !dir.exists() {
        return VisionId::from_sequence(1);
    }
    let mut max_seq: u32 = 0;
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(".md") else { continue };
        if let Ok(id) = VisionId::parse(stem) {
            max_seq = max_seq.max(id.sequence());
        }
    }
    VisionId::from_sequence(max_seq + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_directory_allocates_vision_001() {
        let td = tempdir().unwrap();
        assert_eq!(next_id(td.path()).unwrap().as_str(), "vision-001");
    }

    #[test]
    fn allocates_dense_successor_of_max_existing() {
        let td = tempdir().unwrap();
        std::fs::write(td.path().join("vision-001.md"), "").unwrap();
        std::fs::write(td.path().join("vision-003.md"), "").unwrap();
        assert_eq!(next_id(td.path()).unwrap().as_str(), "vision-004");
    }

    #[test]
    fn ignores_files_that_are_not_entry_files() {
        let td = tempdir().unwrap();
        std::fs::write(td.path().join("index.md"), "").unwrap();
        std::fs::write(td.path().join("vision-002.md"), "").unwrap();
        assert_eq!(next_id(td.path()).unwrap().as_str(), "vision-003");
    }
}
