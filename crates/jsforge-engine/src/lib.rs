use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_RUNTIME: &str = "node";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured output of one script run. A non-zero exit is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("script runtime `{runtime}` was not found")]
    RuntimeNotFound { runtime: String },
    #[error("failed starting `{runtime}`: {source}")]
    Spawn {
        runtime: String,
        #[source]
        source: io::Error,
    },
    #[error("script did not finish within {limit:?} and was killed")]
    Timeout { limit: Duration },
    #[error("failed waiting for script: {0}")]
    Wait(#[source] io::Error),
}

pub trait ScriptRunner {
    fn run(&self, script: &Path)
    -> impl Future<Output = Result<ExecutionResult, ExecutionError>> + Send;
}

/// Runs a script file with an external interpreter.
///
/// The child gets a cleared environment (only `PATH` survives), no stdin, and
/// the script's own directory as working directory. It is killed when the
/// timeout fires.
#[derive(Debug, Clone)]
pub struct NodeRunner {
    runtime: String,
    timeout: Option<Duration>,
}

impl Default for NodeRunner {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME)
    }
}

impl NodeRunner {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// `None` waits for the script however long it takes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new(&self.runtime);
        cmd.arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .kill_on_drop(true);
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        if let Some(dir) = working_dir(script) {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn working_dir(script: &Path) -> Option<PathBuf> {
    script
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

impl ScriptRunner for NodeRunner {
    async fn run(&self, script: &Path) -> Result<ExecutionResult, ExecutionError> {
        // The child runs from the script's directory, so relative paths
        // would no longer resolve.
        let script = std::path::absolute(script).map_err(|source| ExecutionError::Spawn {
            runtime: self.runtime.clone(),
            source,
        })?;
        debug!(runtime = %self.runtime, script = %script.display(), "starting script");
        let child = self.command(&script).spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ExecutionError::RuntimeNotFound {
                    runtime: self.runtime.clone(),
                }
            } else {
                ExecutionError::Spawn {
                    runtime: self.runtime.clone(),
                    source,
                }
            }
        })?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited.map_err(ExecutionError::Wait)?,
                Err(_) => {
                    warn!(?limit, "script timed out");
                    return Err(ExecutionError::Timeout { limit });
                }
            },
            None => child.wait_with_output().await.map_err(ExecutionError::Wait)?,
        };

        let result = ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code(),
        };
        debug!(exit_code = ?result.exit_code, "script finished");
        Ok(result)
    }
}
