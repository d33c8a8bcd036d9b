use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MergeError {
    #[error("invalid batch id: {0}")]
    InvalidBatchId(String),

    #[error("invalid variant id: {0}")]
    InvalidVariantId(String),

    #[error("batch {batch} is missing required artifact(s): {missing}")]
    IncompleteBatch { batch: String, missing: String },

    #[error("no batches discovered under {0}")]
    NoBatches(Utf8PathBuf),

    #[error("merging requires at least 2 batches, found {0}")]
    InsufficientBatches(usize),

    #[error("failed to read keep-list at {path}: {message}")]
    KeepListRead { path: Utf8PathBuf, message: String },

    #[error("keep-list at {0} contains no sample ids")]
    EmptyKeepList(Utf8PathBuf),

    #[error("extraction failed for batch {batch}: {stderr}")]
    ExtractionFailed { batch: String, stderr: String },

    #[error("merge tool failed during {stage}: {stderr}")]
    MergeToolError { stage: String, stderr: String },

    #[error("merge reported conflicts but the conflict report at {0} is missing")]
    MissingConflictReport(Utf8PathBuf),

    #[error("merge reported conflicts but the conflict report at {0} is empty")]
    EmptyConflictReport(Utf8PathBuf),

    #[error("{remaining} variant(s) still conflict after exclusion round")]
    UnresolvedConflict { remaining: usize },

    #[error("vcf conversion failed: {stderr}")]
    ConversionError { stderr: String },

    #[error("vcf artifact at {path} failed verification: {message}")]
    InvalidVcfArtifact { path: Utf8PathBuf, message: String },

    #[error("merged cohort has {actual} sample(s), keep-list has {expected}")]
    CohortVerification { expected: usize, actual: usize },

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value for {field}: {message}")]
    ConfigValue { field: String, message: String },

    #[error("genotype tool not found: {0}")]
    MissingTool(String),

    #[error("run cancelled during {0}")]
    Cancelled(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
