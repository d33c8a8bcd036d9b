use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::MergeError;

/// One record per line; the first whitespace-separated field is the sample
/// id. Read-only input produced by the cohort filtering step.
#[derive(Debug, Clone)]
pub struct SampleKeepList {
    path: Utf8PathBuf,
    samples: Vec<String>,
}

impl SampleKeepList {
    pub fn load(path: &Utf8Path) -> Result<Self, MergeError> {
        let content =
            fs::read_to_string(path.as_std_path()).map_err(|err| MergeError::KeepListRead {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;

        let mut samples = Vec::new();
        let mut seen = HashSet::new();
        for line in content.lines() {
            let Some(id) = line.split_whitespace().next() else {
                continue;
            };
            if seen.insert(id.to_string()) {
                samples.push(id.to_string());
            }
        }

        if samples.is_empty() {
            return Err(MergeError::EmptyKeepList(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            samples,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }
}
