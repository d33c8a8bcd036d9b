use tracing::{error, info, warn};

use crate::catalog::BatchCatalog;
use crate::config::ResolvedConfig;
use crate::convert::VcfConverter;
use crate::domain::{FinalCohort, MergeOutcome, RunStatus, Stage};
use crate::error::MergeError;
use crate::extract::{BatchExtractor, CancelToken, ExtractionRound};
use crate::keep_list::SampleKeepList;
use crate::merge::{ConflictResolver, MergeRunner};
use crate::report::RunReport;
use crate::tool::GenotypeTool;
use crate::workspace::{Workspace, count_lines};

/// Drives the whole run as an explicit state machine:
///
/// ```text
/// Init -> Extracted -> MergeAttempted --Clean--> Merged
///                      MergeAttempted --Conflicting--> Correcting
/// Correcting -> ReExtracted -> FinalMergeAttempted --Clean--> Merged
///               FinalMergeAttempted --Conflicting--> Failed
/// Merged -> Converted -> Done
/// ```
///
/// Exactly one correction round; a second conflicting merge is a data
/// problem escalated to the operator, never an automated retry.
pub struct Pipeline<'a, T: GenotypeTool> {
    tool: &'a T,
    config: &'a ResolvedConfig,
}

impl<'a, T: GenotypeTool> Pipeline<'a, T> {
    pub fn new(tool: &'a T, config: &'a ResolvedConfig) -> Self {
        Self { tool, config }
    }

    /// A report is produced and written whatever the outcome. Intermediate
    /// artifacts are never cleaned up on failure.
    pub fn run(&self, cancel: &CancelToken) -> (RunReport, Result<FinalCohort, MergeError>) {
        let mut report = RunReport::new();
        let result = self.execute(&mut report, cancel);

        match &result {
            Ok(cohort) => {
                info!(prefix = %cohort.prefix, samples = cohort.sample_count, "run complete");
                report.finish(RunStatus::Done, None);
            }
            Err(MergeError::Cancelled(stage)) => {
                warn!(stage = %stage, "run cancelled");
                report.finish(RunStatus::Cancelled, Some(format!("cancelled during {stage}")));
            }
            Err(err) => {
                error!(error = %err, "run failed");
                report.finish(RunStatus::Failed, Some(err.to_string()));
            }
        }

        let report_path = self.config.output_dir.join("run_report.tsv");
        if let Err(err) = report.write_tsv(&report_path) {
            warn!(error = %err, path = %report_path, "failed to write run report");
        }
        (report, result)
    }

    fn execute(
        &self,
        report: &mut RunReport,
        cancel: &CancelToken,
    ) -> Result<FinalCohort, MergeError> {
        report.record_stage(Stage::Init);
        gate(cancel, "init")?;

        let batches = BatchCatalog::discover(&self.config.batch_dir)?;
        report.batch_count = batches.len();
        if batches.len() < 2 {
            return Err(MergeError::InsufficientBatches(batches.len()));
        }

        let keep_list = SampleKeepList::load(&self.config.keep_list)?;
        report.samples_kept = keep_list.len();

        let workspace = Workspace::create(
            &self.config.work_dir,
            &self.config.output_dir,
            &self.config.output_prefix,
        )?;
        if let Some(version) = self.tool.version() {
            info!(tool = %self.config.tool, version = %version, "genotype tool resolved");
        }
        info!(
            run_dir = %workspace.run_dir(),
            batches = batches.len(),
            samples = keep_list.len(),
            "starting merge run"
        );

        gate(cancel, "extraction")?;
        let extractor = BatchExtractor::new(
            self.tool,
            self.config.concurrency,
            self.config.tool_retries,
        );
        let extracted = extractor.extract_all(
            &batches,
            &keep_list,
            None,
            &workspace,
            ExtractionRound::Initial,
            cancel,
        )?;
        report.record_stage(Stage::Extracted);

        gate(cancel, "merge")?;
        let merge_runner = MergeRunner::new(self.tool);
        let outcome = merge_runner.attempt(
            &extracted,
            &workspace.merge_list_path(),
            &workspace.merge_attempt_prefix(),
            "merge_attempt",
        )?;
        report.record_stage(Stage::MergeAttempted);

        let final_prefix = workspace.final_prefix();
        match outcome {
            MergeOutcome::Clean => {
                Workspace::promote_artifacts(&workspace.merge_attempt_prefix(), &final_prefix)?;
                report.record_stage(Stage::Merged);
            }
            MergeOutcome::Conflicting(conflicts) => {
                report.record_stage(Stage::Correcting);
                report.excluded_variant_count = conflicts.len();
                report.correction_applied = true;
                info!(
                    conflicts = conflicts.len(),
                    "excluding conflicting variants from every batch"
                );

                gate(cancel, "correction")?;
                let exclusion = ConflictResolver::write_exclusion_file(&workspace, &conflicts)?;
                let corrected = extractor.extract_all(
                    &batches,
                    &keep_list,
                    Some(&exclusion),
                    &workspace,
                    ExtractionRound::Corrected,
                    cancel,
                )?;
                report.record_stage(Stage::ReExtracted);

                gate(cancel, "final_merge")?;
                let outcome = merge_runner.attempt(
                    &corrected,
                    &workspace.corrected_merge_list_path(),
                    &final_prefix,
                    "final_merge",
                )?;
                report.record_stage(Stage::FinalMergeAttempted);

                match outcome {
                    MergeOutcome::Clean => report.record_stage(Stage::Merged),
                    MergeOutcome::Conflicting(remaining) => {
                        return Err(MergeError::UnresolvedConflict {
                            remaining: remaining.len(),
                        });
                    }
                }
            }
        }

        let sample_count = count_lines(&camino::Utf8PathBuf::from(format!("{final_prefix}.fam")))?;
        let variant_count = count_lines(&camino::Utf8PathBuf::from(format!("{final_prefix}.bim")))?;
        report.final_sample_count = Some(sample_count);
        report.final_variant_count = Some(variant_count);
        report.output_prefix = Some(final_prefix.to_string());
        if sample_count != keep_list.len() {
            return Err(MergeError::CohortVerification {
                expected: keep_list.len(),
                actual: sample_count,
            });
        }

        let vcf = if self.config.convert_to_vcf {
            gate(cancel, "conversion")?;
            let vcf_path = workspace.vcf_path();
            VcfConverter::new(self.tool).convert(&final_prefix, &vcf_path)?;
            report.vcf_path = Some(vcf_path.to_string());
            report.record_stage(Stage::Converted);
            Some(vcf_path)
        } else {
            None
        };

        Ok(FinalCohort {
            prefix: final_prefix,
            sample_count,
            variant_count,
            vcf,
        })
    }
}

fn gate(cancel: &CancelToken, stage: &str) -> Result<(), MergeError> {
    if cancel.is_cancelled() {
        return Err(MergeError::Cancelled(stage.to_string()));
    }
    Ok(())
}
