//! Batch ingest of spectrum files into any store.

use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use wafermap_core::HierarchicalStore;
use wafermap_ingest::{ingest_spx, IngestConfig, IngestedScan};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Extension of Bruker spectrum exports.
pub const SPX_EXTENSION: &str = "spx";

/// What to do when one file of a batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailurePolicy {
    /// Abort the batch on the first failure.
    #[default]
    Stop,
    /// Log the failure and continue with the next file.
    Skip,
}

/// Outcome of a batch ingest.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub ingested: Vec<IngestedScan>,
    /// Files that failed under [`FailurePolicy::Skip`], with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Sorted `.spx` files directly inside `dir`.
///
/// # Errors
/// Returns an I/O error if the directory cannot be read.
pub fn collect_spx_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_spx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SPX_EXTENSION));
        if path.is_file() && is_spx {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Ingests every file into `store`, one scan per file.
///
/// A failed file may leave a partial scan group behind.
///
/// # Errors
/// Under [`FailurePolicy::Stop`], returns the first ingest error.
pub fn ingest_batch<S, P>(
    store: &mut S,
    files: &[P],
    config: &IngestConfig,
    policy: FailurePolicy,
) -> Result<BatchReport>
where
    S: HierarchicalStore,
    P: AsRef<Path>,
{
    let mut report = BatchReport::default();
    for file in files {
        let file = file.as_ref();
        match ingest_spx(store, file, config) {
            Ok(scan) => report.ingested.push(scan),
            Err(err) if policy == FailurePolicy::Skip => {
                log::warn!("skipping {}: {err}", file.display());
                report.failed.push((file.to_path_buf(), err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    }
    log::info!(
        "ingested {} of {} files",
        report.ingested.len(),
        files.len()
    );
    Ok(report)
}
