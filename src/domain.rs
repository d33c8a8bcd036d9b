use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::MergeError;

pub const BATCH_EXTENSIONS: [&str; 3] = ["bed", "bim", "fam"];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = MergeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && !normalized
                .chars()
                .any(|ch| ch == '/' || ch == '\\' || ch.is_whitespace());
        if !is_valid {
            return Err(MergeError::InvalidBatchId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantId(String);

impl VariantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VariantId {
    type Err = MergeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        if normalized.is_empty() || normalized.chars().any(|ch| ch.is_whitespace()) {
            return Err(MergeError::InvalidVariantId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    id: BatchId,
    prefix: Utf8PathBuf,
}

impl Batch {
    pub fn new(id: BatchId, prefix: Utf8PathBuf) -> Self {
        Self { id, prefix }
    }

    pub fn id(&self) -> &BatchId {
        &self.id
    }

    pub fn prefix(&self) -> &Utf8Path {
        &self.prefix
    }

    pub fn artifact(&self, extension: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.{extension}", self.prefix))
    }

    pub fn missing_artifacts(&self) -> Vec<&'static str> {
        BATCH_EXTENSIONS
            .into_iter()
            .filter(|ext| !self.artifact(ext).as_std_path().exists())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBatch {
    source: BatchId,
    prefix: Utf8PathBuf,
}

impl ExtractedBatch {
    pub fn new(source: BatchId, prefix: Utf8PathBuf) -> Self {
        Self { source, prefix }
    }

    pub fn source(&self) -> &BatchId {
        &self.source
    }

    pub fn prefix(&self) -> &Utf8Path {
        &self.prefix
    }

    pub fn artifact(&self, extension: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.{extension}", self.prefix))
    }

    pub fn missing_artifacts(&self) -> Vec<&'static str> {
        BATCH_EXTENSIONS
            .into_iter()
            .filter(|ext| !self.artifact(ext).as_std_path().exists())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalCohort {
    pub prefix: Utf8PathBuf,
    pub sample_count: usize,
    pub variant_count: usize,
    pub vcf: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSet(BTreeSet<VariantId>);

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, variant: VariantId) {
        self.0.insert(variant);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, variant: &VariantId) -> bool {
        self.0.contains(variant)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantId> {
        self.0.iter()
    }
}

impl FromIterator<VariantId> for ConflictSet {
    fn from_iter<I: IntoIterator<Item = VariantId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Clean,
    Conflicting(ConflictSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Done => write!(f, "done"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Extracted,
    MergeAttempted,
    Correcting,
    ReExtracted,
    FinalMergeAttempted,
    Merged,
    Converted,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Extracted => "extracted",
            Stage::MergeAttempted => "merge_attempted",
            Stage::Correcting => "correcting",
            Stage::ReExtracted => "re_extracted",
            Stage::FinalMergeAttempted => "final_merge_attempted",
            Stage::Merged => "merged",
            Stage::Converted => "converted",
            Stage::Done => "done",
            Stage::Failed => "failed",
            Stage::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}
