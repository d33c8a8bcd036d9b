use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::domain::Batch;
use crate::error::MergeError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ExtractRequest<'a> {
    pub batch: &'a Batch,
    pub keep_list: &'a Utf8Path,
    pub exclude: Option<&'a Utf8Path>,
    pub out_prefix: &'a Utf8Path,
}

#[derive(Debug, Clone)]
pub struct MergeRequest<'a> {
    pub first_prefix: &'a Utf8Path,
    pub merge_list: &'a Utf8Path,
    pub out_prefix: &'a Utf8Path,
}

#[derive(Debug, Clone)]
pub struct ConvertRequest<'a> {
    pub prefix: &'a Utf8Path,
}

/// Outcome of one blocking tool call. A timeout is reported here and treated
/// by callers exactly like a non-zero exit; only spawn-level problems surface
/// as errors.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub success: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

pub trait GenotypeTool: Send + Sync {
    fn extract(&self, request: &ExtractRequest<'_>) -> Result<ToolInvocation, MergeError>;
    fn merge(&self, request: &MergeRequest<'_>) -> Result<ToolInvocation, MergeError>;
    fn convert(&self, request: &ConvertRequest<'_>) -> Result<ToolInvocation, MergeError>;

    fn version(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct PlinkTool {
    exec: Utf8PathBuf,
    timeout: Duration,
}

impl PlinkTool {
    pub fn new(tool: &str, timeout: Duration) -> Result<Self, MergeError> {
        let exec = if tool.contains('/') || tool.contains('\\') {
            let path = Utf8PathBuf::from(tool);
            if !path.as_std_path().exists() {
                return Err(MergeError::MissingTool(tool.to_string()));
            }
            path
        } else {
            find_in_path(tool).ok_or_else(|| MergeError::MissingTool(tool.to_string()))?
        };
        Ok(Self { exec, timeout })
    }

    fn run(&self, args: &[String]) -> Result<ToolInvocation, MergeError> {
        info!(tool = %self.exec, args = %args.join(" "), "invoking genotype tool");

        let mut command = Command::new(self.exec.as_std_path());
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                MergeError::MissingTool(self.exec.to_string())
            } else {
                MergeError::Filesystem(format!("failed to spawn {}: {err}", self.exec))
            }
        })?;

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = self.wait_with_deadline(&mut child)?;
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        match status {
            Some(status) => Ok(ToolInvocation {
                success: status.success(),
                timed_out: false,
                stdout,
                stderr,
            }),
            None => {
                warn!(tool = %self.exec, timeout_secs = self.timeout.as_secs(), "tool timed out, killed");
                Ok(ToolInvocation {
                    success: false,
                    timed_out: true,
                    stdout,
                    stderr: format!(
                        "timed out after {}s and was killed",
                        self.timeout.as_secs()
                    ),
                })
            }
        }
    }

    fn wait_with_deadline(
        &self,
        child: &mut Child,
    ) -> Result<Option<std::process::ExitStatus>, MergeError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(None);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(MergeError::Filesystem(err.to_string())),
            }
        }
    }
}

impl GenotypeTool for PlinkTool {
    fn extract(&self, request: &ExtractRequest<'_>) -> Result<ToolInvocation, MergeError> {
        let mut args = vec![
            "--bfile".to_string(),
            request.batch.prefix().to_string(),
            "--keep".to_string(),
            request.keep_list.to_string(),
        ];
        if let Some(exclude) = request.exclude {
            args.push("--exclude".to_string());
            args.push(exclude.to_string());
        }
        args.push("--make-bed".to_string());
        args.push("--out".to_string());
        args.push(request.out_prefix.to_string());
        self.run(&args)
    }

    fn merge(&self, request: &MergeRequest<'_>) -> Result<ToolInvocation, MergeError> {
        let args = vec![
            "--bfile".to_string(),
            request.first_prefix.to_string(),
            "--merge-list".to_string(),
            request.merge_list.to_string(),
            "--make-bed".to_string(),
            "--out".to_string(),
            request.out_prefix.to_string(),
        ];
        self.run(&args)
    }

    fn convert(&self, request: &ConvertRequest<'_>) -> Result<ToolInvocation, MergeError> {
        let args = vec![
            "--bfile".to_string(),
            request.prefix.to_string(),
            "--recode".to_string(),
            "vcf".to_string(),
            "bgz".to_string(),
            "--out".to_string(),
            request.prefix.to_string(),
        ];
        self.run(&args)
    }

    fn version(&self) -> Option<String> {
        let output = Command::new(self.exec.as_std_path())
            .arg("--version")
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() { None } else { Some(stdout) }
    }
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn find_in_path(name: &str) -> Option<Utf8PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Utf8PathBuf::from_path_buf(exe).ok();
        }
        let plain = path.join(name);
        if plain.exists() {
            return Utf8PathBuf::from_path_buf(plain).ok();
        }
    }
    None
}
