//! Panel cache
//!
//! Reading and merging the CSV exports is the slow part of a run. The cache
//! keeps the last built panel together with a fingerprint of the source
//! files it came from. Only the panel is cached; features and coefficients
//! are always recomputed, so a cached panel can never be paired with a fit
//! from another specification.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::Result;
use crate::panel::DailyPanel;

/// Identity of a source-file set: paths, sizes and modification times,
/// plus any settings that change how the panel is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceFingerprint(u64);

impl SourceFingerprint {
    pub fn compute(paths: &[PathBuf], settings: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        settings.hash(&mut hasher);
        for path in paths {
            path.hash(&mut hasher);
            file_stamp(path).hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

/// Size and modification time, or `None` when the file is absent.
fn file_stamp(path: &Path) -> Option<(u64, SystemTime)> {
    let meta = fs::metadata(path).ok()?;
    Some((meta.len(), meta.modified().ok()?))
}

/// A built panel and what was skipped while building it.
#[derive(Debug, Clone)]
pub struct CachedPanel {
    pub fingerprint: SourceFingerprint,
    pub panel: DailyPanel,
    /// Optional files that were missing at build time
    pub skipped_files: Vec<PathBuf>,
}

/// Single-entry cache for the daily panel.
#[derive(Debug, Default)]
pub struct PanelCache {
    entry: Option<Arc<CachedPanel>>,
    hits: u64,
    misses: u64,
}

impl PanelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached panel when `fingerprint` matches, otherwise run
    /// `build` and store its result.
    pub fn get_or_build<F>(&mut self, fingerprint: SourceFingerprint, build: F) -> Result<Arc<CachedPanel>>
    where
        F: FnOnce() -> Result<(DailyPanel, Vec<PathBuf>)>,
    {
        if let Some(entry) = self.entry.as_ref().filter(|e| e.fingerprint == fingerprint) {
            self.hits += 1;
            tracing::debug!("Panel cache hit ({} rows)", entry.panel.len());
            return Ok(Arc::clone(entry));
        }

        self.misses += 1;
        let (panel, skipped_files) = build()?;
        let entry = Arc::new(CachedPanel {
            fingerprint,
            panel,
            skipped_files,
        });
        self.entry = Some(Arc::clone(&entry));
        Ok(entry)
    }

    /// Drop the cached panel; the next request rebuilds it.
    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            tracing::debug!("Panel cache invalidated");
        }
    }

    pub fn is_cached(&self, fingerprint: SourceFingerprint) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|e| e.fingerprint == fingerprint)
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
