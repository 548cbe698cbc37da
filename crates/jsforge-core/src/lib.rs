use jsforge_engine::{ExecutionError, ExecutionResult, ScriptRunner};
use jsforge_llm::{CodeGenerator, GenerateRequest, GenerationError};
use jsforge_sanitizer::{PersistError, ScriptTarget, persist, sanitize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The stage that stopped a pipeline run. Script stderr is never one of
/// these; it travels in [`ExecutionResult`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("saving script failed: {0}")]
    Persist(#[from] PersistError),
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("pipeline aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation",
            Self::Persist(_) => "persist",
            Self::Execution(_) => "execution",
            Self::Aborted(_) => "pipeline",
        }
    }
}

/// Everything one request produced, including how far it got.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub prompt: String,
    pub generated: String,
    pub script: Option<String>,
    pub execution: Option<ExecutionResult>,
    pub failure: Option<PipelineError>,
}

impl PipelineOutcome {
    pub fn stdout(&self) -> &str {
        self.execution.as_ref().map_or("", |e| e.stdout.as_str())
    }

    pub fn stderr(&self) -> &str {
        self.execution.as_ref().map_or("", |e| e.stderr.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct Pipeline<G, R> {
    generator: Arc<G>,
    runner: R,
    target: ScriptTarget,
    model: String,
    script_lock: Mutex<()>,
}

impl<G, R> Pipeline<G, R>
where
    G: CodeGenerator + Send + Sync + 'static,
    R: ScriptRunner,
{
    pub fn new(generator: G, runner: R, target: ScriptTarget, model: impl Into<String>) -> Self {
        Self {
            generator: Arc::new(generator),
            runner,
            target,
            model: model.into(),
            script_lock: Mutex::new(()),
        }
    }

    pub fn target(&self) -> &ScriptTarget {
        &self.target
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate, sanitize, persist, execute. Never fails as a whole: a
    /// stage error is recorded in the outcome next to whatever the earlier
    /// stages produced.
    pub async fn run(&self, prompt: &str) -> PipelineOutcome {
        let mut outcome = PipelineOutcome {
            prompt: prompt.to_string(),
            ..PipelineOutcome::default()
        };

        match self.generate(prompt).await {
            Ok(reply) => outcome.generated = reply,
            Err(err) => return fail(outcome, err),
        }
        debug!(bytes = outcome.generated.len(), "reply generated");

        let script = sanitize(&outcome.generated);
        outcome.script = Some(script.clone());

        // A shared file must not be rewritten by another request between
        // our write and our run.
        let _guard = if self.target.is_shared() {
            Some(self.script_lock.lock().await)
        } else {
            None
        };

        let persisted = match persist(&self.target, &script) {
            Ok(p) => p,
            Err(err) => return fail(outcome, err.into()),
        };
        debug!(path = %persisted.path().display(), "script persisted");

        match self.runner.run(persisted.path()).await {
            Ok(result) => outcome.execution = Some(result),
            Err(err) => return fail(outcome, err.into()),
        }

        outcome
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let generator = Arc::clone(&self.generator);
        let req = GenerateRequest::new(prompt, self.model.as_str());
        tokio::task::spawn_blocking(move || generator.generate(&req))
            .await
            .map_err(|err| PipelineError::Aborted(err.to_string()))?
            .map_err(PipelineError::from)
    }
}

fn fail(mut outcome: PipelineOutcome, err: PipelineError) -> PipelineOutcome {
    warn!(stage = err.stage(), error = %err, "pipeline stopped");
    outcome.failure = Some(err);
    outcome
}
