use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// What a file looked like when it was last loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl FileSignature {
    #[must_use]
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }

    /// # Errors
    /// Returns the I/O error if the file's metadata cannot be read.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        std::fs::metadata(path).map(|meta| Self::from_metadata(&meta))
    }
}

/// Per-file "is latest" markers for the template directory.
#[derive(Debug, Default)]
pub struct FreshnessTracker {
    seen: HashMap<PathBuf, FileSignature>,
}

impl FreshnessTracker {
    /// True when `path` was loaded with exactly this signature.
    #[must_use]
    pub fn is_latest(&self, path: &Path, signature: &FileSignature) -> bool {
        self.seen.get(path) == Some(signature)
    }

    pub fn record(&mut self, path: PathBuf, signature: FileSignature) {
        self.seen.insert(path, signature);
    }

    pub fn forget(&mut self, path: &Path) {
        self.seen.remove(path);
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_change_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xml");
        std::fs::write(&path, "<root/>").unwrap();

        let mut tracker = FreshnessTracker::default();
        let sig = FileSignature::of(&path).unwrap();
        assert!(!tracker.is_latest(&path, &sig));

        tracker.record(path.clone(), sig);
        assert!(tracker.is_latest(&path, &sig));

        std::fs::write(&path, "<root><x/></root>").unwrap();
        let changed = FileSignature::of(&path).unwrap();
        assert!(!tracker.is_latest(&path, &changed));

        tracker.forget(&path);
        assert!(tracker.is_empty());
    }
}
