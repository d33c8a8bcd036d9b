use std::fs;
use std::io::Read;

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;
use tracing::info;

use crate::error::MergeError;
use crate::tool::{ConvertRequest, GenotypeTool};

pub struct VcfConverter<'a, T: GenotypeTool> {
    tool: &'a T,
}

impl<'a, T: GenotypeTool> VcfConverter<'a, T> {
    pub fn new(tool: &'a T) -> Self {
        Self { tool }
    }

    /// The tool can exit zero with an empty or truncated archive; the
    /// artifact must decode, not just exist.
    pub fn convert(&self, prefix: &Utf8Path, vcf_path: &Utf8Path) -> Result<(), MergeError> {
        let invocation = self.tool.convert(&ConvertRequest { prefix })?;
        if !invocation.success {
            return Err(MergeError::ConversionError {
                stderr: invocation.stderr.trim().to_string(),
            });
        }
        verify_vcf_artifact(vcf_path)?;
        info!(path = %vcf_path, "vcf artifact written and verified");
        Ok(())
    }
}

pub fn verify_vcf_artifact(path: &Utf8Path) -> Result<(), MergeError> {
    let metadata = fs::metadata(path.as_std_path()).map_err(|_| MergeError::InvalidVcfArtifact {
        path: path.to_path_buf(),
        message: "artifact is missing".to_string(),
    })?;
    if metadata.len() == 0 {
        return Err(MergeError::InvalidVcfArtifact {
            path: path.to_path_buf(),
            message: "artifact is empty".to_string(),
        });
    }

    let file = fs::File::open(path.as_std_path()).map_err(|err| MergeError::InvalidVcfArtifact {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let mut decoder = MultiGzDecoder::new(file);
    let mut head = [0u8; 64];
    let read = decoder
        .read(&mut head)
        .map_err(|err| MergeError::InvalidVcfArtifact {
            path: path.to_path_buf(),
            message: format!("not a valid gzip stream: {err}"),
        })?;
    if read == 0 {
        return Err(MergeError::InvalidVcfArtifact {
            path: path.to_path_buf(),
            message: "gzip stream decodes to nothing".to_string(),
        });
    }
    if !head.starts_with(b"##") {
        return Err(MergeError::InvalidVcfArtifact {
            path: path.to_path_buf(),
            message: "payload does not start with a VCF header".to_string(),
        });
    }
    Ok(())
}
