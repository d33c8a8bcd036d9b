use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::domain::{BATCH_EXTENSIONS, Batch, BatchId};
use crate::error::MergeError;

pub struct BatchCatalog;

impl BatchCatalog {
    /// A base name found with any of the three extensions must carry all
    /// three; validated before any extraction starts.
    pub fn discover(dir: &Utf8Path) -> Result<Vec<Batch>, MergeError> {
        let entries = fs::read_dir(dir.as_std_path()).map_err(|err| {
            MergeError::Filesystem(format!("failed to read batch directory {dir}: {err}"))
        })?;

        let mut prefixes = BTreeMap::<BatchId, Utf8PathBuf>::new();
        for entry in entries {
            let entry = entry.map_err(|err| MergeError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
                continue;
            };
            if !BATCH_EXTENSIONS.contains(&extension) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let id: BatchId = stem.parse()?;
            prefixes.entry(id).or_insert_with(|| dir.join(stem));
        }

        if prefixes.is_empty() {
            return Err(MergeError::NoBatches(dir.to_path_buf()));
        }

        let mut batches = Vec::with_capacity(prefixes.len());
        for (id, prefix) in prefixes {
            let batch = Batch::new(id, prefix);
            let missing = batch.missing_artifacts();
            if !missing.is_empty() {
                return Err(MergeError::IncompleteBatch {
                    batch: batch.id().to_string(),
                    missing: missing.join(", "),
                });
            }
            batches.push(batch);
        }

        info!(count = batches.len(), dir = %dir, "discovered batches");
        Ok(batches)
    }
}
