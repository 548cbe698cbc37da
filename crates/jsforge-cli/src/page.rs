use jsforge_core::PipelineOutcome;

/// Values shown on the single page served at `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PageView {
    pub prompt: String,
    pub generated: String,
    pub stdout: String,
    pub stderr: String,
    pub system_error: Option<String>,
}

impl PageView {
    pub(crate) fn from_outcome(outcome: &PipelineOutcome) -> Self {
        Self {
            prompt: outcome.prompt.clone(),
            generated: outcome.generated.clone(),
            stdout: outcome.stdout().to_string(),
            stderr: outcome.stderr().to_string(),
            system_error: outcome.failure.as_ref().map(ToString::to_string),
        }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self {
            system_error: Some(message.into()),
            ..Self::default()
        }
    }
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn section(title: &str, class: &str, body: &str) -> String {
    if body.is_empty() {
        return String::new();
    }
    format!(
        "<section class=\"{class}\"><h2>{title}</h2><pre>{}</pre></section>\n",
        escape_html(body)
    )
}

pub(crate) fn render(view: &PageView) -> String {
    let system_error = view
        .system_error
        .as_deref()
        .map(|msg| {
            format!(
                "<div class=\"system-error\" role=\"alert\">{}</div>\n",
                escape_html(msg)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>jsforge</title>
<style>
body {{ font-family: sans-serif; max-width: 60rem; margin: 2rem auto; }}
textarea {{ width: 100%; min-height: 6rem; }}
pre {{ background: #f4f4f4; padding: 0.75rem; overflow-x: auto; }}
.system-error {{ background: #fde2e2; border: 1px solid #c00; padding: 0.75rem; }}
.stderr pre {{ color: #a00; }}
</style>
</head>
<body>
<h1>Prompt to JavaScript</h1>
<form method="post" action="/">
<textarea name="prompt" placeholder="Describe the script you want">{prompt}</textarea>
<button type="submit">Generate and run</button>
</form>
{system_error}{code}{stdout}{stderr}</body>
</html>
"#,
        prompt = escape_html(&view.prompt),
        system_error = system_error,
        code = section("Generated code", "code", &view.generated),
        stdout = section("Output", "stdout", &view.stdout),
        stderr = section("Errors", "stderr", &view.stderr),
    )
}
