use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "jsforge.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ollama_url: Option<String>,
    pub model: Option<String>,
    pub script_path: Option<PathBuf>,
    pub isolate: Option<bool>,
    pub runtime: Option<String>,
    pub exec_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ollama_url: Option<String>,
    pub model: Option<String>,
    pub script_path: Option<PathBuf>,
    pub isolate: Option<bool>,
    pub runtime: Option<String>,
    pub exec_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ollama_url: Option<String>,
    pub model: Option<String>,
    pub script_path: Option<PathBuf>,
    pub isolate: Option<bool>,
    pub runtime: Option<String>,
    pub exec_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub ollama_url: String,
    pub model: String,
    pub script_path: PathBuf,
    pub isolate: bool,
    pub runtime: String,
    pub exec_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            ollama_url: "http://localhost:11434".to_string(),
            model: "deepseek-coder".to_string(),
            script_path: PathBuf::from("generated.js"),
            isolate: false,
            runtime: "node".to_string(),
            exec_timeout_secs: 10,
            request_timeout_secs: 120,
            verbose: false,
        }
    }
}

impl Settings {
    /// `None` when the timeout was configured as `0`.
    pub fn exec_timeout(&self) -> Option<Duration> {
        unbounded_if_zero(self.exec_timeout_secs)
    }

    /// `None` when the timeout was configured as `0`.
    pub fn request_timeout(&self) -> Option<Duration> {
        unbounded_if_zero(self.request_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Directory that receives per-request scripts when isolation is on.
    pub fn isolation_dir(&self) -> PathBuf {
        match self.script_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => env::temp_dir().join("jsforge"),
        }
    }
}

fn unbounded_if_zero(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

pub fn load_file_config(explicit_path: Option<&Path>, cwd: &Path) -> Result<Option<FileConfig>> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = cwd.join(CONFIG_FILE_NAME);
            if !candidate.exists() {
                return Ok(None);
            }
            candidate
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            host: lookup("JSFORGE_HOST"),
            port: lookup("JSFORGE_PORT").and_then(|v| v.trim().parse().ok()),
            ollama_url: lookup("JSFORGE_OLLAMA_URL"),
            model: lookup("JSFORGE_MODEL"),
            script_path: lookup("JSFORGE_SCRIPT_PATH").map(PathBuf::from),
            isolate: lookup("JSFORGE_ISOLATE").and_then(|v| parse_bool(&v)),
            runtime: lookup("JSFORGE_RUNTIME"),
            exec_timeout_secs: lookup("JSFORGE_EXEC_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok()),
            request_timeout_secs: lookup("JSFORGE_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok()),
            verbose: lookup("JSFORGE_VERBOSE").and_then(|v| parse_bool(&v)),
        }
    }
}

/// Precedence: CLI, then environment, then config file, then defaults.
pub fn resolve_settings(
    cli: &CliOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
) -> Settings {
    let base = Settings::default();

    macro_rules! pick {
        ($field:ident) => {
            cli.$field
                .clone()
                .or_else(|| env_cfg.$field.clone())
                .or_else(|| file_cfg.and_then(|c| c.$field.clone()))
                .unwrap_or(base.$field)
        };
    }

    Settings {
        host: pick!(host),
        port: pick!(port),
        ollama_url: pick!(ollama_url),
        model: pick!(model),
        script_path: pick!(script_path),
        isolate: pick!(isolate),
        runtime: pick!(runtime),
        exec_timeout_secs: pick!(exec_timeout_secs),
        request_timeout_secs: pick!(request_timeout_secs),
        verbose: pick!(verbose),
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
