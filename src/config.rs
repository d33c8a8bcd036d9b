use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::MergeError;

pub const DEFAULT_CONFIG_FILE: &str = "cohort-merge.json";
pub const DEFAULT_OUTPUT_PREFIX: &str = "cohort_final";
pub const DEFAULT_TOOL: &str = "plink";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub batch_dir: Option<String>,
    #[serde(default)]
    pub keep_list: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub output_prefix: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub tool_retries: Option<u32>,
    #[serde(default)]
    pub convert_to_vcf: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub batch_dir: Option<String>,
    pub keep_list: Option<String>,
    pub work_dir: Option<String>,
    pub output_dir: Option<String>,
    pub output_prefix: Option<String>,
    pub tool: Option<String>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub tool_retries: Option<u32>,
    pub no_vcf: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub batch_dir: Utf8PathBuf,
    pub keep_list: Utf8PathBuf,
    pub work_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub output_prefix: String,
    pub tool: String,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub tool_retries: u32,
    pub convert_to_vcf: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: CliOverrides,
    ) -> Result<ResolvedConfig, MergeError> {
        let config = Self::load(path)?;
        Self::resolve_config(config, overrides)
    }

    /// Resolves just the batch directory, for read-only discovery commands
    /// that do not need a keep-list or output layout.
    pub fn resolve_batch_dir(
        path: Option<&str>,
        batch_dir: Option<String>,
    ) -> Result<Utf8PathBuf, MergeError> {
        if let Some(dir) = batch_dir {
            return Ok(Utf8PathBuf::from(dir));
        }
        Self::load(path)?
            .batch_dir
            .map(Utf8PathBuf::from)
            .ok_or_else(|| missing("batch_dir"))
    }

    fn load(path: Option<&str>) -> Result<Config, MergeError> {
        match path {
            Some(path) => Self::read_file(path),
            None => {
                let default_path = Utf8PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.as_std_path().exists() {
                    Self::read_file(default_path.as_str())
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    fn read_file(path: &str) -> Result<Config, MergeError> {
        let config_path = Utf8PathBuf::from(path);
        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| MergeError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| MergeError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        config: Config,
        overrides: CliOverrides,
    ) -> Result<ResolvedConfig, MergeError> {
        let batch_dir = overrides
            .batch_dir
            .or(config.batch_dir)
            .ok_or_else(|| missing("batch_dir"))?;
        let keep_list = overrides
            .keep_list
            .or(config.keep_list)
            .ok_or_else(|| missing("keep_list"))?;

        let work_dir = overrides
            .work_dir
            .or(config.work_dir)
            .unwrap_or_else(|| "work".to_string());
        let output_dir = overrides
            .output_dir
            .or(config.output_dir)
            .unwrap_or_else(|| "delivery".to_string());
        let output_prefix = overrides
            .output_prefix
            .or(config.output_prefix)
            .unwrap_or_else(|| DEFAULT_OUTPUT_PREFIX.to_string());
        let tool = overrides
            .tool
            .or(config.tool)
            .unwrap_or_else(|| DEFAULT_TOOL.to_string());

        let concurrency = overrides
            .concurrency
            .or(config.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(MergeError::ConfigValue {
                field: "concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let timeout_secs = overrides
            .timeout_secs
            .or(config.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(MergeError::ConfigValue {
                field: "timeout_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let tool_retries = overrides.tool_retries.or(config.tool_retries).unwrap_or(0);

        let convert_to_vcf = if overrides.no_vcf {
            false
        } else {
            config.convert_to_vcf.unwrap_or(true)
        };

        if output_prefix.is_empty() || output_prefix.contains('/') {
            return Err(MergeError::ConfigValue {
                field: "output_prefix".to_string(),
                message: format!("not a plain file name: {output_prefix}"),
            });
        }

        Ok(ResolvedConfig {
            batch_dir: Utf8PathBuf::from(batch_dir),
            keep_list: Utf8PathBuf::from(keep_list),
            work_dir: Utf8PathBuf::from(work_dir),
            output_dir: Utf8PathBuf::from(output_dir),
            output_prefix,
            tool,
            concurrency,
            timeout_secs,
            tool_retries,
            convert_to_vcf,
        })
    }
}

fn missing(field: &str) -> MergeError {
    MergeError::ConfigValue {
        field: field.to_string(),
        message: "required (set it in the config file or pass the flag)".to_string(),
    }
}
