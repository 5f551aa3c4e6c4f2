use std::path::PathBuf;
use log::{debug, warn};
use walkdir::WalkDir;
use crate::error::{Result, TranscodeError};

/// Number of shard folders (`f00`..`fff`) in a Hydrus file store
pub const SHARD_COUNT: usize = 256;

/// Finds files in the content-addressed store layout `<root>/f<xx>/<hash>.<ext>`
#[derive(Debug, Clone)]
pub struct FileLocator {
    root: PathBuf,
}

impl FileLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Shard folder holding files whose hash starts with the same two characters
    pub fn shard_dir(&self, hash: &str) -> Option<PathBuf> {
        let prefix = hash.get(0..2)?;
        Some(self.root.join(format!("f{}", prefix.to_lowercase())))
    }

    /// Resolve the single on-disk file for `hash`
    ///
    /// Fails with `NotFound` when nothing matches and with `LookupAmbiguity`
    /// when more than one file starts with the hash.
    pub fn locate(&self, hash: &str) -> Result<PathBuf> {
        let not_found = || TranscodeError::NotFound {
            hash: hash.to_string(),
        };
        let shard = self.shard_dir(hash).ok_or_else(not_found)?;
        if !shard.is_dir() {
            return Err(not_found());
        }

        let mut matches: Vec<PathBuf> = WalkDir::new(&shard)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(hash))
            .map(|entry| entry.into_path())
            .collect();

        match matches.len() {
            0 => Err(not_found()),
            1 => {
                let path = matches.remove(0);
                debug!("Resolved {} to {}", hash, path.display());
                Ok(path)
            }
            _ => {
                warn!("⚠️  Several files on disk start with {}, refusing to pick one: {:?}", hash, matches);
                Err(TranscodeError::LookupAmbiguity {
                    hash: hash.to_string(),
                    matches: matches.iter().map(|p| p.display().to_string()).collect(),
                })
            }
        }
    }

    /// Check that the root looks like a Hydrus file store
    pub fn verify_layout(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(TranscodeError::config(format!(
                "data path is not a directory: {}",
                self.root.display()
            )));
        }

        let shards = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter(|entry| is_shard_name(&entry.file_name().to_string_lossy()))
            .count();

        if shards != SHARD_COUNT {
            return Err(TranscodeError::config(format!(
                "data path {} has {} shard folders, expected {}; is it the Hydrus file folder?",
                self.root.display(),
                shards,
                SHARD_COUNT
            )));
        }
        Ok(())
    }
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 3
        && name.starts_with('f')
        && name[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"data").unwrap();
        }
        dir
    }

    #[test]
    fn test_locate_single_match() {
        let dir = store_with(&["fab/ab12cd.jpg", "fab/ab99.png"]);
        let locator = FileLocator::new(dir.path());
        assert_eq!(locator.locate("ab12cd").unwrap(), dir.path().join("fab/ab12cd.jpg"));
    }

    #[test]
    fn test_locate_missing() {
        let dir = store_with(&["fab/ab99.png"]);
        let locator = FileLocator::new(dir.path());
        assert!(matches!(locator.locate("ab12"), Err(TranscodeError::NotFound { .. })));
        assert!(matches!(locator.locate("cd12"), Err(TranscodeError::NotFound { .. })));
        assert!(matches!(locator.locate("a"), Err(TranscodeError::NotFound { .. })));
    }

    #[test]
    fn test_locate_ambiguous() {
        let dir = store_with(&["fab/ab12.jpg", "fab/ab12.png"]);
        let locator = FileLocator::new(dir.path());
        match locator.locate("ab12") {
            Err(TranscodeError::LookupAmbiguity { matches, .. }) => assert_eq!(matches.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_layout() {
        let dir = tempfile::tempdir().unwrap();
        let locator = FileLocator::new(dir.path());
        assert!(matches!(locator.verify_layout(), Err(TranscodeError::Configuration(_))));

        for i in 0..SHARD_COUNT {
            fs::create_dir(dir.path().join(format!("f{:02x}", i))).unwrap();
        }
        fs::create_dir(dir.path().join("thumbnails")).unwrap();
        assert!(locator.verify_layout().is_ok());

        assert!(FileLocator::new(dir.path().join("missing")).verify_layout().is_err());
    }
}
