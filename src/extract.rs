use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{Batch, ExtractedBatch};
use crate::error::MergeError;
use crate::keep_list::SampleKeepList;
use crate::tool::{ExtractRequest, GenotypeTool};
use crate::workspace::Workspace;

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Shared cancellation flag. Checked at every stage gate and before each
/// queued extraction task; an in-flight tool call runs to completion and its
/// result is discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRound {
    Initial,
    Corrected,
}

pub struct BatchExtractor<'a, T: GenotypeTool> {
    tool: &'a T,
    concurrency: usize,
    retries: u32,
}

impl<'a, T: GenotypeTool> BatchExtractor<'a, T> {
    pub fn new(tool: &'a T, concurrency: usize, retries: u32) -> Self {
        Self {
            tool,
            concurrency,
            retries,
        }
    }

    /// Subsets every batch to the keep-list, optionally excluding variants.
    /// One tool call per batch on a pool bounded by the configured
    /// concurrency. All-or-nothing: the first failure aborts the run, and
    /// outputs of batches that already completed stay on disk.
    pub fn extract_all(
        &self,
        batches: &[Batch],
        keep_list: &SampleKeepList,
        exclude: Option<&Utf8Path>,
        workspace: &Workspace,
        round: ExtractionRound,
        cancel: &CancelToken,
    ) -> Result<Vec<ExtractedBatch>, MergeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency.min(batches.len().max(1)))
            .build()
            .map_err(|err| MergeError::Filesystem(err.to_string()))?;

        let results: Vec<Result<ExtractedBatch, MergeError>> = pool.install(|| {
            batches
                .par_iter()
                .map(|batch| self.extract_one(batch, keep_list, exclude, workspace, round, cancel))
                .collect()
        });

        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled("extraction".to_string()));
        }

        let mut extracted = Vec::with_capacity(results.len());
        for result in results {
            extracted.push(result?);
        }
        Ok(extracted)
    }

    fn extract_one(
        &self,
        batch: &Batch,
        keep_list: &SampleKeepList,
        exclude: Option<&Utf8Path>,
        workspace: &Workspace,
        round: ExtractionRound,
        cancel: &CancelToken,
    ) -> Result<ExtractedBatch, MergeError> {
        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled("extraction".to_string()));
        }

        let output = match round {
            ExtractionRound::Initial => ExtractedBatch::for_subset(workspace, batch.id()),
            ExtractionRound::Corrected => ExtractedBatch::for_correction(workspace, batch.id()),
        };
        let request = ExtractRequest {
            batch,
            keep_list: keep_list.path(),
            exclude,
            out_prefix: output.prefix(),
        };

        let mut attempt = 0u32;
        loop {
            let invocation = self.tool.extract(&request)?;
            if invocation.success {
                let missing = output.missing_artifacts();
                if !missing.is_empty() {
                    return Err(MergeError::ExtractionFailed {
                        batch: batch.id().to_string(),
                        stderr: format!(
                            "tool exited 0 but did not produce: {}",
                            missing.join(", ")
                        ),
                    });
                }
                info!(batch = %batch.id(), out = %output.prefix(), "extracted batch");
                return Ok(output);
            }
            if invocation.timed_out && attempt < self.retries && !cancel.is_cancelled() {
                attempt += 1;
                warn!(
                    batch = %batch.id(),
                    attempt,
                    max = self.retries,
                    "extraction timed out, retrying"
                );
                thread::sleep(RETRY_BACKOFF * attempt);
                continue;
            }
            return Err(MergeError::ExtractionFailed {
                batch: batch.id().to_string(),
                stderr: invocation.stderr.trim().to_string(),
            });
        }
    }
}
