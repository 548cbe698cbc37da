use crate::page::{self, PageView};
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use jsforge_core::Pipeline;
use jsforge_engine::ScriptRunner;
use jsforge_llm::CodeGenerator;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Deserialize)]
struct PromptForm {
    prompt: Option<String>,
}

pub(crate) fn router<G, R>(pipeline: Arc<Pipeline<G, R>>) -> Router
where
    G: CodeGenerator + Send + Sync + 'static,
    R: ScriptRunner + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(show_form).post(submit::<G, R>))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn show_form() -> Html<String> {
    Html(page::render(&PageView::default()))
}

async fn submit<G, R>(
    State(pipeline): State<Arc<Pipeline<G, R>>>,
    Form(form): Form<PromptForm>,
) -> (StatusCode, Html<String>)
where
    G: CodeGenerator + Send + Sync + 'static,
    R: ScriptRunner + Send + Sync + 'static,
{
    let Some(prompt) = form.prompt else {
        return (
            StatusCode::BAD_REQUEST,
            Html(page::render(&PageView::rejected(
                "missing required field `prompt`",
            ))),
        );
    };

    let outcome = pipeline.run(&prompt).await;
    (StatusCode::OK, Html(page::render(&PageView::from_outcome(&outcome))))
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

pub(crate) async fn serve<G, R>(bind_addr: &str, pipeline: Arc<Pipeline<G, R>>) -> Result<()>
where
    G: CodeGenerator + Send + Sync + 'static,
    R: ScriptRunner + Send + Sync + 'static,
{
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed binding web server on {bind_addr}"))?;
    let local = listener
        .local_addr()
        .context("failed reading listener local address")?;
    info!(url = %format!("http://{local}/"), "serving");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server failed")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use jsforge_core::Pipeline;
    use jsforge_engine::{ExecutionError, ExecutionResult, ScriptRunner};
    use jsforge_llm::{CodeGenerator, GenerateRequest, GenerationError};
    use jsforge_sanitizer::ScriptTarget;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    struct StubGenerator(Option<&'static str>);

    impl CodeGenerator for StubGenerator {
        fn generate(&self, _req: &GenerateRequest) -> Result<String, GenerationError> {
            self.0
                .map(ToString::to_string)
                .ok_or_else(|| GenerationError::Transport {
                    endpoint: "http://localhost:11434/api/generate".to_string(),
                    message: "connection refused".to_string(),
                })
        }
    }

    /// Reports the script text as stdout and a fixed warning as stderr.
    struct EchoRunner;

    impl ScriptRunner for EchoRunner {
        async fn run(&self, script: &Path) -> Result<ExecutionResult, ExecutionError> {
            let text = fs::read_to_string(script).map_err(ExecutionError::Wait)?;
            Ok(ExecutionResult {
                stdout: format!("ran: {text}"),
                stderr: "warning: <deprecated>".to_string(),
                exit_code: Some(0),
            })
        }
    }

    fn app(reply: Option<&'static str>) -> (axum::Router, TempDir) {
        let dir = tempdir().expect("tempdir should work");
        let pipeline = Pipeline::new(
            StubGenerator(reply),
            EchoRunner,
            ScriptTarget::PerRequest {
                dir: dir.path().to_path_buf(),
            },
            "deepseek-coder",
        );
        (router(Arc::new(pipeline)), dir)
    }

    fn form_post(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request should build")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        String::from_utf8(bytes.to_vec()).expect("body should be utf8")
    }

    #[tokio::test]
    async fn get_renders_empty_form() {
        let (app, _dir) = app(Some("1"));
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("name=\"prompt\""));
        assert!(!html.contains("<section"));
    }

    #[tokio::test]
    async fn post_renders_all_values() {
        let (app, _dir) = app(Some("```javascript\nalert(\"hello world\")\n```"));
        let response = app
            .oneshot(form_post("prompt=write+a+function+that+logs+hello+world"))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(">write a function that logs hello world</textarea>"));
        assert!(html.contains("alert(&quot;hello world&quot;)"));
        assert!(html.contains("ran: console.log(&quot;hello world&quot;)"));
        assert!(html.contains("warning: &lt;deprecated&gt;"));
        assert!(!html.contains("system-error\" role"));
    }

    #[tokio::test]
    async fn missing_prompt_is_rejected() {
        let (app, _dir) = app(Some("1"));
        let response = app
            .oneshot(form_post("other=1"))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = body_text(response).await;
        assert!(html.contains("missing required field `prompt`"));
    }

    #[tokio::test]
    async fn empty_prompt_is_processed() {
        let (app, _dir) = app(Some("console.log(0)"));
        let response = app
            .oneshot(form_post("prompt="))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("ran: console.log(0)"));
    }

    #[tokio::test]
    async fn unreachable_model_renders_prompt_and_error() {
        let (app, _dir) = app(None);
        let response = app
            .oneshot(form_post("prompt=%3Cb%3Ehi%3C%2Fb%3E"))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;</textarea>"));
        assert!(html.contains("<div class=\"system-error\" role=\"alert\">generation failed"));
        assert!(!html.contains("<section"));
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let (app, _dir) = app(Some("1"));
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (app, _dir) = app(Some("1"));
        let response = app
            .oneshot(Request::get("/elsewhere").body(Body::empty()).expect("request"))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
