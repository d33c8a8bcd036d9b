use std::fs;
use std::io::{self, BufRead, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{BatchId, ExtractedBatch};
use crate::error::MergeError;

/// Per-run directory layout. Every invocation claims its own run directory
/// under the work root; intermediates are left in place on failure.
#[derive(Debug, Clone)]
pub struct Workspace {
    run_dir: Utf8PathBuf,
    output_dir: Utf8PathBuf,
    output_prefix: String,
}

impl Workspace {
    pub fn create(
        work_root: &Utf8Path,
        output_dir: &Utf8Path,
        output_prefix: &str,
    ) -> Result<Self, MergeError> {
        fs::create_dir_all(work_root.as_std_path())
            .map_err(|err| MergeError::Filesystem(err.to_string()))?;
        fs::create_dir_all(output_dir.as_std_path())
            .map_err(|err| MergeError::Filesystem(err.to_string()))?;

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let run_dir = claim_run_dir(work_root, &stamp.to_string())?;
        for sub in ["subsets", "corrected"] {
            fs::create_dir_all(run_dir.join(sub).as_std_path())
                .map_err(|err| MergeError::Filesystem(err.to_string()))?;
        }

        Ok(Self {
            run_dir,
            output_dir: output_dir.to_path_buf(),
            output_prefix: output_prefix.to_string(),
        })
    }

    pub fn run_dir(&self) -> &Utf8Path {
        &self.run_dir
    }

    pub fn subset_prefix(&self, batch: &BatchId) -> Utf8PathBuf {
        self.run_dir.join("subsets").join(format!("{batch}_subset"))
    }

    pub fn corrected_prefix(&self, batch: &BatchId) -> Utf8PathBuf {
        self.run_dir
            .join("corrected")
            .join(format!("{batch}_corrected"))
    }

    pub fn merge_attempt_prefix(&self) -> Utf8PathBuf {
        self.run_dir.join("merge_attempt")
    }

    pub fn merge_list_path(&self) -> Utf8PathBuf {
        self.run_dir.join("merge_list.txt")
    }

    pub fn corrected_merge_list_path(&self) -> Utf8PathBuf {
        self.run_dir.join("merge_list_corrected.txt")
    }

    pub fn exclusion_path(&self) -> Utf8PathBuf {
        self.run_dir.join("exclude_variants.txt")
    }

    pub fn final_prefix(&self) -> Utf8PathBuf {
        self.output_dir.join(&self.output_prefix)
    }

    pub fn vcf_path(&self) -> Utf8PathBuf {
        self.output_dir.join(format!("{}.vcf.gz", self.output_prefix))
    }

    /// Writes via a sibling temp file and rename, so a crashed run never
    /// leaves a half-written list behind.
    pub fn write_lines_atomic(path: &Utf8Path, lines: &[String]) -> Result<(), MergeError> {
        let parent = path
            .parent()
            .ok_or_else(|| MergeError::Filesystem(format!("invalid destination path: {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| MergeError::Filesystem(err.to_string()))?;

        let mut content = lines.join("\n");
        content.push('\n');
        let mut temp = tempfile::Builder::new()
            .prefix(".cohort-merge")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| MergeError::Filesystem(err.to_string()))?;
        temp.write_all(content.as_bytes())
            .map_err(|err| MergeError::Filesystem(err.to_string()))?;
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| MergeError::Filesystem(err.to_string()))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| MergeError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Moves the merge triple (and the tool log, when present) from a work
    /// prefix to the final prefix without re-running the tool.
    pub fn promote_artifacts(from: &Utf8Path, to: &Utf8Path) -> Result<(), MergeError> {
        for ext in ["bed", "bim", "fam", "log"] {
            let src = Utf8PathBuf::from(format!("{from}.{ext}"));
            if !src.as_std_path().exists() {
                continue;
            }
            let dst = Utf8PathBuf::from(format!("{to}.{ext}"));
            fs::rename(src.as_std_path(), dst.as_std_path()).map_err(|err| {
                MergeError::Filesystem(format!("failed to move {src} to {dst}: {err}"))
            })?;
        }
        Ok(())
    }
}

impl ExtractedBatch {
    pub fn for_subset(workspace: &Workspace, batch: &BatchId) -> Self {
        Self::new(batch.clone(), workspace.subset_prefix(batch))
    }

    pub fn for_correction(workspace: &Workspace, batch: &BatchId) -> Self {
        Self::new(batch.clone(), workspace.corrected_prefix(batch))
    }
}

fn claim_run_dir(work_root: &Utf8Path, stamp: &str) -> Result<Utf8PathBuf, MergeError> {
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("run-{stamp}")
        } else {
            format!("run-{stamp}-{attempt}")
        };
        let candidate = work_root.join(name);
        match fs::create_dir(candidate.as_std_path()) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                attempt += 1;
            }
            Err(err) => return Err(MergeError::Filesystem(err.to_string())),
        }
    }
}

pub fn count_lines(path: &Utf8Path) -> Result<usize, MergeError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| MergeError::Filesystem(format!("failed to open {path}: {err}")))?;
    let reader = io::BufReader::new(file);
    let mut count = 0;
    for line in reader.lines() {
        let line = line.map_err(|err| MergeError::Filesystem(err.to_string()))?;
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(temp: &tempfile::TempDir) -> Workspace {
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Workspace::create(&root.join("work"), &root.join("delivery"), "cohort_final").unwrap()
    }

    #[test]
    fn layout_paths() {
        let temp = tempfile::tempdir().unwrap();
        let ws = workspace(&temp);
        let batch: BatchId = "batch_01".parse().unwrap();

        assert!(ws.subset_prefix(&batch).ends_with("subsets/batch_01_subset"));
        assert!(
            ws.corrected_prefix(&batch)
                .ends_with("corrected/batch_01_corrected")
        );
        assert!(ws.final_prefix().ends_with("delivery/cohort_final"));
        assert!(ws.vcf_path().ends_with("delivery/cohort_final.vcf.gz"));
    }

    #[test]
    fn run_dirs_are_unique() {
        let temp = tempfile::tempdir().unwrap();
        let a = workspace(&temp);
        let b = workspace(&temp);
        assert_ne!(a.run_dir(), b.run_dir());
    }

    #[test]
    fn write_lines_atomic_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("list.txt")).unwrap();
        Workspace::write_lines_atomic(&path, &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(std::fs::read_to_string(path.as_std_path()).unwrap(), "a\nb\n");
        assert_eq!(count_lines(&path).unwrap(), 2);
    }

    #[test]
    fn promote_moves_triple() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for ext in ["bed", "bim", "fam"] {
            std::fs::write(temp.path().join(format!("attempt.{ext}")), b"x").unwrap();
        }

        Workspace::promote_artifacts(&root.join("attempt"), &root.join("final")).unwrap();
        assert!(root.join("final.bed").as_std_path().exists());
        assert!(!root.join("attempt.bed").as_std_path().exists());
    }
}
