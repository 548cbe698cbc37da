use anyhow::{Context, Result};
use clap::Args;
use jsforge_config::{CliOverrides, EnvConfig, Settings, load_file_config, resolve_settings};
use jsforge_core::Pipeline;
use jsforge_engine::NodeRunner;
use jsforge_llm_ollama::OllamaClient;
use jsforge_sanitizer::ScriptTarget;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub(crate) type JsforgePipeline = Pipeline<OllamaClient, NodeRunner>;

/// Flags shared by every command that talks to the model or runs scripts.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct RuntimeArgs {
    /// Path to a jsforge.json config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub ollama_url: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    /// File the generated script is written to.
    #[arg(long)]
    pub script_path: Option<PathBuf>,
    /// Write each request's script to its own temporary file.
    #[arg(long)]
    pub isolate: bool,
    /// Executable used to run the generated script.
    #[arg(long)]
    pub runtime: Option<String>,
    /// Seconds before a running script is killed; 0 waits forever.
    #[arg(long)]
    pub exec_timeout: Option<u64>,
    /// Seconds to wait for the model to answer; 0 waits forever.
    #[arg(long)]
    pub request_timeout: Option<u64>,
    #[arg(long)]
    pub verbose: bool,
}

impl RuntimeArgs {
    pub(crate) fn overrides(&self) -> CliOverrides {
        CliOverrides {
            ollama_url: self.ollama_url.clone(),
            model: self.model.clone(),
            script_path: self.script_path.clone(),
            isolate: self.isolate.then_some(true),
            runtime: self.runtime.clone(),
            exec_timeout_secs: self.exec_timeout,
            request_timeout_secs: self.request_timeout,
            verbose: self.verbose.then_some(true),
            ..CliOverrides::default()
        }
    }
}

pub(crate) fn resolve(overrides: &CliOverrides, config: Option<&PathBuf>) -> Result<Settings> {
    let cwd = std::env::current_dir().context("failed resolving current directory")?;
    let file_cfg = load_file_config(config.map(PathBuf::as_path), &cwd)?;
    Ok(resolve_settings(
        overrides,
        &EnvConfig::from_current_env(),
        file_cfg.as_ref(),
    ))
}

pub(crate) fn script_target(settings: &Settings) -> ScriptTarget {
    if settings.isolate {
        ScriptTarget::PerRequest {
            dir: settings.isolation_dir(),
        }
    } else {
        ScriptTarget::Fixed(settings.script_path.clone())
    }
}

pub(crate) fn ollama_client(settings: &Settings) -> OllamaClient {
    OllamaClient::new(settings.ollama_url.clone()).with_timeout(settings.request_timeout())
}

pub(crate) fn node_runner(settings: &Settings) -> NodeRunner {
    NodeRunner::new(settings.runtime.clone()).with_timeout(settings.exec_timeout())
}

pub(crate) fn build_pipeline(settings: &Settings) -> JsforgePipeline {
    Pipeline::new(
        ollama_client(settings),
        node_runner(settings),
        script_target(settings),
        settings.model.clone(),
    )
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when verbose.
pub(crate) fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::{RuntimeArgs, script_target};
    use jsforge_config::Settings;
    use jsforge_sanitizer::ScriptTarget;
    use std::path::PathBuf;

    #[test]
    fn unset_flags_do_not_override() {
        let overrides = RuntimeArgs::default().overrides();
        assert_eq!(overrides.isolate, None);
        assert_eq!(overrides.verbose, None);
        assert_eq!(overrides.model, None);
    }

    #[test]
    fn set_flags_override() {
        let overrides = RuntimeArgs {
            isolate: true,
            exec_timeout: Some(0),
            model: Some("codellama".to_string()),
            ..RuntimeArgs::default()
        }
        .overrides();
        assert_eq!(overrides.isolate, Some(true));
        assert_eq!(overrides.exec_timeout_secs, Some(0));
        assert_eq!(overrides.model.as_deref(), Some("codellama"));
    }

    #[test]
    fn default_target_is_fixed_file() {
        assert_eq!(
            script_target(&Settings::default()),
            ScriptTarget::Fixed(PathBuf::from("generated.js"))
        );
    }

    #[test]
    fn isolation_uses_per_request_files() {
        let settings = Settings {
            isolate: true,
            script_path: PathBuf::from("scripts/generated.js"),
            ..Settings::default()
        };
        assert_eq!(
            script_target(&settings),
            ScriptTarget::PerRequest {
                dir: PathBuf::from("scripts")
            }
        );
    }
}
