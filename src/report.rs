use camino::Utf8Path;
use serde::Serialize;

use crate::domain::{RunStatus, Stage};
use crate::error::MergeError;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub at: String,
}

/// Structured summary of a pipeline run, written regardless of outcome.
/// Consumed by operators and monitoring, not by downstream pipeline stages.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub batch_count: usize,
    pub samples_kept: usize,
    pub excluded_variant_count: usize,
    pub correction_applied: bool,
    pub final_sample_count: Option<usize>,
    pub final_variant_count: Option<usize>,
    pub output_prefix: Option<String>,
    pub vcf_path: Option<String>,
    pub error: Option<String>,
    pub stages: Vec<StageEvent>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            status: RunStatus::Failed,
            started_at: iso_timestamp(),
            finished_at: None,
            batch_count: 0,
            samples_kept: 0,
            excluded_variant_count: 0,
            correction_applied: false,
            final_sample_count: None,
            final_variant_count: None,
            output_prefix: None,
            vcf_path: None,
            error: None,
            stages: Vec::new(),
        }
    }

    pub fn record_stage(&mut self, stage: Stage) {
        self.stages.push(StageEvent {
            stage,
            at: iso_timestamp(),
        });
    }

    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(iso_timestamp());
        self.record_stage(match status {
            RunStatus::Done => Stage::Done,
            RunStatus::Failed => Stage::Failed,
            RunStatus::Cancelled => Stage::Cancelled,
        });
    }

    pub fn tsv_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("status\t{}", self.status),
            format!("started_at\t{}", self.started_at),
            format!(
                "finished_at\t{}",
                self.finished_at.as_deref().unwrap_or("-")
            ),
            format!("batch_count\t{}", self.batch_count),
            format!("samples_kept\t{}", self.samples_kept),
            format!("excluded_variant_count\t{}", self.excluded_variant_count),
            format!("correction_applied\t{}", self.correction_applied),
        ];
        if let Some(count) = self.final_sample_count {
            lines.push(format!("final_sample_count\t{count}"));
        }
        if let Some(count) = self.final_variant_count {
            lines.push(format!("final_variant_count\t{count}"));
        }
        if let Some(prefix) = &self.output_prefix {
            lines.push(format!("output_prefix\t{prefix}"));
        }
        if let Some(path) = &self.vcf_path {
            lines.push(format!("vcf\t{path}"));
        }
        if let Some(error) = &self.error {
            lines.push(format!("error\t{error}"));
        }
        for event in &self.stages {
            lines.push(format!("stage:{}\t{}", event.stage, event.at));
        }
        lines
    }

    pub fn write_tsv(&self, path: &Utf8Path) -> Result<(), MergeError> {
        Workspace::write_lines_atomic(path, &self.tsv_lines())
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_contains_status_counts_and_stages() {
        let mut report = RunReport::new();
        report.batch_count = 3;
        report.samples_kept = 120;
        report.record_stage(Stage::Init);
        report.record_stage(Stage::Extracted);
        report.excluded_variant_count = 2;
        report.correction_applied = true;
        report.final_sample_count = Some(120);
        report.finish(RunStatus::Done, None);

        let lines = report.tsv_lines();
        assert_eq!(lines[0], "status\tdone");
        assert!(lines.iter().any(|l| l == "batch_count\t3"));
        assert!(lines.iter().any(|l| l == "excluded_variant_count\t2"));
        assert!(lines.iter().any(|l| l == "correction_applied\ttrue"));
        assert!(lines.iter().any(|l| l == "final_sample_count\t120"));
        assert!(lines.iter().any(|l| l.starts_with("stage:init\t")));
        assert!(lines.iter().any(|l| l.starts_with("stage:done\t")));
        assert!(!lines.iter().any(|l| l.starts_with("error\t")));
    }

    #[test]
    fn failed_report_carries_error() {
        let mut report = RunReport::new();
        report.record_stage(Stage::Init);
        report.finish(RunStatus::Failed, Some("extraction failed".to_string()));

        let lines = report.tsv_lines();
        assert_eq!(lines[0], "status\tfailed");
        assert!(lines.iter().any(|l| l == "error\textraction failed"));
        assert!(lines.iter().any(|l| l.starts_with("stage:failed\t")));
    }

    #[test]
    fn write_tsv_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let path =
            camino::Utf8PathBuf::from_path_buf(temp.path().join("run_report.tsv")).unwrap();

        let mut report = RunReport::new();
        report.finish(RunStatus::Cancelled, None);
        report.write_tsv(&path).unwrap();

        let content = std::fs::read_to_string(path.as_std_path()).unwrap();
        assert!(content.starts_with("status\tcancelled\n"));
    }
}
