use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::domain::{ConflictSet, ExtractedBatch, MergeOutcome, VariantId};
use crate::error::MergeError;
use crate::tool::{GenotypeTool, MergeRequest};
use crate::workspace::Workspace;

/// The tool writes its conflict report next to the requested output prefix.
pub fn conflict_report_path(out_prefix: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{out_prefix}-merge.missnp"))
}

pub struct MergeRunner<'a, T: GenotypeTool> {
    tool: &'a T,
}

impl<'a, T: GenotypeTool> MergeRunner<'a, T> {
    pub fn new(tool: &'a T) -> Self {
        Self { tool }
    }

    /// The tool signals unreconcilable variants by failing and leaving a
    /// conflict report; any failure without a usable report is a tool error,
    /// not a conflict.
    pub fn attempt(
        &self,
        extracted: &[ExtractedBatch],
        merge_list: &Utf8Path,
        out_prefix: &Utf8Path,
        stage: &str,
    ) -> Result<MergeOutcome, MergeError> {
        if extracted.len() < 2 {
            return Err(MergeError::InsufficientBatches(extracted.len()));
        }

        let rest: Vec<String> = extracted[1..]
            .iter()
            .map(|batch| batch.prefix().to_string())
            .collect();
        Workspace::write_lines_atomic(merge_list, &rest)?;

        let request = MergeRequest {
            first_prefix: extracted[0].prefix(),
            merge_list,
            out_prefix,
        };
        let invocation = self.tool.merge(&request)?;

        if invocation.success {
            let missing: Vec<&str> = crate::domain::BATCH_EXTENSIONS
                .into_iter()
                .filter(|ext| {
                    !Utf8PathBuf::from(format!("{out_prefix}.{ext}"))
                        .as_std_path()
                        .exists()
                })
                .collect();
            if !missing.is_empty() {
                return Err(MergeError::MergeToolError {
                    stage: stage.to_string(),
                    stderr: format!("tool exited 0 but did not produce: {}", missing.join(", ")),
                });
            }
            info!(out = %out_prefix, batches = extracted.len(), "merge attempt clean");
            return Ok(MergeOutcome::Clean);
        }
        if invocation.timed_out {
            return Err(MergeError::MergeToolError {
                stage: stage.to_string(),
                stderr: invocation.stderr.trim().to_string(),
            });
        }

        let report = conflict_report_path(out_prefix);
        if !report.as_std_path().exists() {
            return Err(MergeError::MergeToolError {
                stage: stage.to_string(),
                stderr: invocation.stderr.trim().to_string(),
            });
        }

        let conflicts = parse_conflict_report(&report)?;
        if conflicts.is_empty() {
            return Err(MergeError::EmptyConflictReport(report));
        }
        warn!(out = %out_prefix, conflicts = conflicts.len(), "merge attempt conflicting");
        Ok(MergeOutcome::Conflicting(conflicts))
    }
}

pub fn parse_conflict_report(path: &Utf8Path) -> Result<ConflictSet, MergeError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| MergeError::MissingConflictReport(path.to_path_buf()))?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.parse::<VariantId>())
        .collect()
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// The set iterates in sorted order, so the same conflicts always
    /// produce a byte-identical exclusion file.
    pub fn write_exclusion_file(
        workspace: &Workspace,
        conflicts: &ConflictSet,
    ) -> Result<Utf8PathBuf, MergeError> {
        let path = workspace.exclusion_path();
        let lines: Vec<String> = conflicts
            .iter()
            .map(|variant| variant.as_str().to_string())
            .collect();
        Workspace::write_lines_atomic(&path, &lines)?;
        info!(path = %path, excluded = conflicts.len(), "wrote variant exclusion list");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn report_path_naming() {
        let path = conflict_report_path(Utf8Path::new("/tmp/work/merge_attempt"));
        assert_eq!(path, Utf8PathBuf::from("/tmp/work/merge_attempt-merge.missnp"));
    }

    #[test]
    fn parse_report_skips_blank_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("attempt-merge.missnp");
        std::fs::write(&path, "rs2\n\nrs1\nrs2\n").unwrap();

        let path = Utf8PathBuf::from_path_buf(path).unwrap();
        let conflicts = parse_conflict_report(&path).unwrap();
        assert_eq!(conflicts.len(), 2);
        let ids: Vec<&str> = conflicts.iter().map(|v| v.as_str()).collect();
        assert_eq!(ids, vec!["rs1", "rs2"]);
    }

    #[test]
    fn parse_report_missing_file() {
        let err = parse_conflict_report(Utf8Path::new("/nonexistent/report.missnp")).unwrap_err();
        assert_matches!(err, MergeError::MissingConflictReport(_));
    }

    #[test]
    fn exclusion_file_is_deterministic() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let workspace =
            Workspace::create(&root.join("work"), &root.join("delivery"), "final").unwrap();

        let conflicts: ConflictSet = ["rsZ", "rsA", "rsM"]
            .into_iter()
            .map(|id| id.parse::<VariantId>().unwrap())
            .collect();

        let path = ConflictResolver::write_exclusion_file(&workspace, &conflicts).unwrap();
        let first = std::fs::read(path.as_std_path()).unwrap();
        ConflictResolver::write_exclusion_file(&workspace, &conflicts).unwrap();
        let second = std::fs::read(path.as_std_path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(String::from_utf8(first).unwrap(), "rsA\nrsM\nrsZ\n");
    }
}
