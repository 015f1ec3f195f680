//! Template cache backed by a directory of XML files.
//!
//! Lookups that hit a loaded key only take a read lock. A miss serializes behind one
//! scan lock, rescans the directory, and re-parses only files whose signature changed
//! since they were last loaded. Changes found by a scan are applied in one step, so a
//! concurrent reader never sees a partially applied scan.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::error::SqlTemplateError;
use crate::template::Template;

pub mod config;
pub mod freshness;
pub mod loader;

pub use config::{CacheOptions, CacheOptionsBuilder};
pub use freshness::{FileSignature, FreshnessTracker};

/// Counters describing the work the cache has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub rescans: usize,
    pub files_parsed: usize,
    pub files_skipped: usize,
    pub templates: usize,
}

/// Outcome of one directory scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files_parsed: usize,
    pub files_skipped: usize,
    /// Per-file load failures; the scan continued past each of them.
    pub errors: Vec<SqlTemplateError>,
}

#[derive(Debug, Default)]
struct ScanState {
    freshness: FreshnessTracker,
    file_keys: HashMap<PathBuf, Vec<String>>,
    last_errors: Vec<(PathBuf, String)>,
}

#[derive(Debug, Default)]
struct Counters {
    rescans: AtomicUsize,
    files_parsed: AtomicUsize,
    files_skipped: AtomicUsize,
}

/// Named SQL templates loaded from every XML file under one root directory.
#[derive(Debug)]
pub struct TemplateCache {
    root: PathBuf,
    default_connection_name: String,
    templates: RwLock<HashMap<String, Arc<Template>>>,
    scan: Mutex<ScanState>,
    counters: Counters,
}

impl TemplateCache {
    /// Resolve the root directory from `options` and create an empty cache.
    ///
    /// Nothing is read until the first lookup or [`TemplateCache::reload`].
    ///
    /// # Errors
    /// Returns `SqlTemplateError::ConfigError` if no candidate root directory exists.
    pub fn open(options: &CacheOptions) -> Result<Self, SqlTemplateError> {
        let root = options.resolve_root()?;
        debug!(root = %root.display(), "opened template cache");
        Ok(Self {
            root,
            default_connection_name: options.default_connection_name.clone(),
            templates: RwLock::new(HashMap::new()),
            scan: Mutex::new(ScanState::default()),
            counters: Counters::default(),
        })
    }

    /// Drop every loaded template and freshness marker.
    pub fn close(self) {
        self.invalidate();
        debug!(root = %self.root.display(), "closed template cache");
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find a template by case-insensitive key, rescanning the directory on a miss.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::TemplateNotFound` if the key is still absent after the
    /// rescan, or `SqlTemplateError::CacheLoad` if the root directory cannot be listed.
    pub fn lookup(&self, key: &str) -> Result<Arc<Template>, SqlTemplateError> {
        let normalized = key.to_lowercase();
        if let Some(found) = self.read_templates().get(&normalized) {
            return Ok(Arc::clone(found));
        }

        let mut state = self.lock_scan();
        // Another caller may have loaded it while we waited.
        if let Some(found) = self.read_templates().get(&normalized) {
            return Ok(Arc::clone(found));
        }

        let report = self.rescan(&mut state)?;
        for err in &report.errors {
            warn!(error = %err, "template file failed to load");
        }

        self.read_templates()
            .get(&normalized)
            .cloned()
            .ok_or_else(|| SqlTemplateError::TemplateNotFound {
                key: key.to_string(),
            })
    }

    /// Rescan the directory now, re-parsing only changed files.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::CacheLoad` if the root directory cannot be listed.
    pub fn reload(&self) -> Result<ScanReport, SqlTemplateError> {
        let mut state = self.lock_scan();
        self.rescan(&mut state)
    }

    /// Clear all entries; the next lookup rescans and re-parses every file.
    pub fn invalidate(&self) {
        let mut state = self.lock_scan();
        state.freshness.clear();
        state.file_keys.clear();
        self.write_templates().clear();
        debug!(root = %self.root.display(), "template cache invalidated");
    }

    /// Drop one key; the next lookup for it re-parses the file it came from.
    ///
    /// Returns whether the key was loaded.
    pub fn evict(&self, key: &str) -> bool {
        let normalized = key.to_lowercase();
        let mut state = self.lock_scan();
        let removed = self.write_templates().remove(&normalized);
        if let Some(source) = removed.as_ref().and_then(|t| t.source()) {
            state.freshness.forget(source);
        }
        removed.is_some()
    }

    /// Loaded keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read_templates().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_templates().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_templates().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            rescans: self.counters.rescans.load(Ordering::Relaxed),
            files_parsed: self.counters.files_parsed.load(Ordering::Relaxed),
            files_skipped: self.counters.files_skipped.load(Ordering::Relaxed),
            templates: self.len(),
        }
    }

    /// Load failures from the most recent scan.
    #[must_use]
    pub fn last_load_errors(&self) -> Vec<SqlTemplateError> {
        self.lock_scan()
            .last_errors
            .iter()
            .map(|(path, cause)| SqlTemplateError::cache_load(path, cause))
            .collect()
    }

    fn rescan(&self, state: &mut ScanState) -> Result<ScanReport, SqlTemplateError> {
        self.counters.rescans.fetch_add(1, Ordering::Relaxed);
        let files = loader::collect_xml_files(&self.root)?;
        let present: HashSet<PathBuf> = files.iter().cloned().collect();

        let mut report = ScanReport::default();
        let mut replaced: Vec<(PathBuf, Vec<Template>)> = Vec::new();
        let mut failures = Vec::new();

        for path in files {
            let signature = match FileSignature::of(&path) {
                Ok(sig) => sig,
                Err(e) => {
                    failures.push((path.clone(), e.to_string()));
                    report.errors.push(SqlTemplateError::cache_load(&path, e));
                    continue;
                }
            };
            if state.freshness.is_latest(&path, &signature) {
                report.files_skipped += 1;
                continue;
            }

            match loader::load_file(&path, &self.default_connection_name) {
                Ok(templates) => {
                    report.files_parsed += 1;
                    state.freshness.record(path.clone(), signature);
                    replaced.push((path, templates));
                }
                Err(err) => {
                    // No signature is recorded, so the file is retried on the next scan.
                    state.freshness.forget(&path);
                    if let SqlTemplateError::CacheLoad { path, cause } = &err {
                        failures.push((path.clone(), cause.clone()));
                    }
                    report.errors.push(err);
                }
            }
        }

        let vanished: Vec<PathBuf> = state
            .file_keys
            .keys()
            .filter(|p| !present.contains(p.as_path()))
            .cloned()
            .collect();

        {
            let mut templates = self.write_templates();
            for path in vanished {
                debug!(file = %path.display(), "template file removed");
                state.freshness.forget(&path);
                for key in state.file_keys.remove(&path).unwrap_or_default() {
                    if remove_owned(&mut templates, &key, &path) {
                        release_shadowed(state, &key, &path);
                    }
                }
            }
            for (path, loaded) in replaced {
                if let Some(old_keys) = state.file_keys.remove(&path) {
                    for key in old_keys {
                        if remove_owned(&mut templates, &key, &path) {
                            release_shadowed(state, &key, &path);
                        }
                    }
                }
                let mut keys = Vec::with_capacity(loaded.len());
                for template in loaded {
                    let key = template.key().to_string();
                    if let Some(previous) = templates.get(&key) {
                        if previous.source() != Some(path.as_path()) {
                            warn!(
                                key = %key,
                                file = %path.display(),
                                "template key defined in more than one file; last one wins"
                            );
                        }
                    }
                    keys.push(key.clone());
                    templates.insert(key, Arc::new(template));
                }
                state.file_keys.insert(path, keys);
            }
        }

        state.last_errors = failures;
        self.counters
            .files_parsed
            .fetch_add(report.files_parsed, Ordering::Relaxed);
        self.counters
            .files_skipped
            .fetch_add(report.files_skipped, Ordering::Relaxed);
        debug!(
            root = %self.root.display(),
            parsed = report.files_parsed,
            skipped = report.files_skipped,
            failed = report.errors.len(),
            "template directory scanned"
        );
        Ok(report)
    }

    fn read_templates(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Template>>> {
        match self.templates.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_templates(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Template>>> {
        match self.templates.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_scan(&self) -> MutexGuard<'_, ScanState> {
        match self.scan.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Drops `key` only while the cached entry still comes from `path`; another file may
/// have redefined it since.
fn remove_owned(templates: &mut HashMap<String, Arc<Template>>, key: &str, path: &Path) -> bool {
    let owned = templates
        .get(key)
        .is_some_and(|t| t.source() == Some(path));
    if owned {
        templates.remove(key);
    }
    owned
}

/// Other files that also define `key` lost it to `path`; forget them so the next scan
/// parses them again.
fn release_shadowed(state: &mut ScanState, key: &str, path: &Path) {
    for (other, keys) in &state.file_keys {
        if other.as_path() != path && keys.iter().any(|k| k == key) {
            state.freshness.forget(other);
        }
    }
}
