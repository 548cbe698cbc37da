mod page;
mod runtime_context;
mod server;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use jsforge_config::Settings;
use jsforge_sanitizer::{ScriptTarget, sanitize, sanitize_and_persist};
use runtime_context::{RuntimeArgs, build_pipeline, init_tracing, ollama_client, resolve};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "jsforge",
    version,
    about = "Turn a prompt into JavaScript with a local model and run it"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the prompt form over HTTP (default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Generate, save and run one script from the terminal.
    Run {
        prompt: String,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Clean up a model reply read from stdin.
    Sanitize {
        /// Write the script here instead of printing it.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show resolved settings and check the model endpoint and runtime.
    Doctor {
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
}

fn async_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed starting async runtime")
}

fn serve_command(host: Option<String>, port: Option<u16>, runtime: RuntimeArgs) -> Result<()> {
    let mut overrides = runtime.overrides();
    overrides.host = host;
    overrides.port = port;
    let settings = resolve(&overrides, runtime.config.as_ref())?;
    init_tracing(settings.verbose);

    let pipeline = Arc::new(build_pipeline(&settings));
    if !ollama_client(&settings).is_reachable() {
        warn!(url = %settings.ollama_url, "model endpoint is not reachable yet");
    }
    if settings.exec_timeout().is_none() {
        warn!("script execution timeout disabled; a runaway script blocks its request");
    }
    info!(
        model = %pipeline.model(),
        runtime = %settings.runtime,
        target = ?pipeline.target(),
        "starting jsforge"
    );

    async_runtime()?.block_on(server::serve(&settings.bind_addr(), pipeline))
}

fn run_command(prompt: String, runtime: RuntimeArgs) -> Result<()> {
    let settings = resolve(&runtime.overrides(), runtime.config.as_ref())?;
    init_tracing(settings.verbose);

    let pipeline = build_pipeline(&settings);
    let outcome = async_runtime()?.block_on(pipeline.run(&prompt));

    if !outcome.generated.is_empty() {
        println!("/* ===== generated code ===== */");
        println!("{}", outcome.generated);
    }
    if let Some(execution) = outcome.execution.as_ref() {
        println!("/* ===== output ===== */");
        println!("{}", execution.stdout);
        if !execution.stderr.is_empty() {
            println!("/* ===== errors ===== */");
            println!("{}", execution.stderr);
        }
        if !execution.succeeded() {
            match execution.exit_code {
                Some(code) => println!("/* ===== exit code {code} ===== */"),
                None => println!("/* ===== killed by signal ===== */"),
            }
        }
    }

    match outcome.failure {
        Some(err) => Err(anyhow!(err)),
        None => Ok(()),
    }
}

fn sanitize_command(output: Option<PathBuf>) -> Result<()> {
    init_tracing(false);
    let mut reply = String::new();
    io::stdin()
        .read_to_string(&mut reply)
        .context("failed reading model reply from stdin")?;

    match output {
        Some(path) => {
            let (_, persisted) = sanitize_and_persist(&reply, &ScriptTarget::Fixed(path))?;
            println!("{}", persisted.path().display());
        }
        None => println!("{}", sanitize(&reply)),
    }
    Ok(())
}

fn doctor_command(runtime: RuntimeArgs) -> Result<()> {
    let settings = resolve(&runtime.overrides(), runtime.config.as_ref())?;
    init_tracing(settings.verbose);
    print_settings(&settings);

    let endpoint = if ollama_client(&settings).is_reachable() {
        "reachable"
    } else {
        "unreachable"
    };
    println!("model endpoint: {} ({endpoint})", settings.ollama_url);

    let runtime_status = match std::process::Command::new(&settings.runtime)
        .arg("--version")
        .output()
    {
        Ok(out) if out.status.success() => {
            format!("found {}", String::from_utf8_lossy(&out.stdout).trim())
        }
        Ok(out) => format!("exited with {}", out.status),
        Err(err) if err.kind() == io::ErrorKind::NotFound => "not found".to_string(),
        Err(err) => format!("failed to start: {err}"),
    };
    println!("script runtime: {} ({runtime_status})", settings.runtime);
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("listen: {}", settings.bind_addr());
    println!("model: {}", settings.model);
    if settings.isolate {
        println!(
            "scripts: per request in {}",
            settings.isolation_dir().display()
        );
    } else {
        println!("scripts: {}", settings.script_path.display());
    }
    match settings.exec_timeout() {
        Some(limit) => println!("execution timeout: {}s", limit.as_secs()),
        None => println!("execution timeout: none"),
    }
    match settings.request_timeout() {
        Some(limit) => println!("model timeout: {}s", limit.as_secs()),
        None => println!("model timeout: none"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => serve_command(None, None, RuntimeArgs::default()),
        Some(Commands::Serve {
            host,
            port,
            runtime,
        }) => serve_command(host, port, runtime),
        Some(Commands::Run { prompt, runtime }) => run_command(prompt, runtime),
        Some(Commands::Sanitize { output }) => sanitize_command(output),
        Some(Commands::Doctor { runtime }) => doctor_command(runtime),
    }
}
