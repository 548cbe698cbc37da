//! Turns a free-form model reply into a runnable script and puts it on disk.

use regex::Regex;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::TempPath;
use thiserror::Error;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:javascript)?\s*([\s\S]*?)\s*```").expect("fenced block pattern is valid")
});

const REWRITES: &[(&str, &str)] = &[("alert(", "console.log("), ("print(", "console.log(")];

const ZERO_WIDTH_SPACE: char = '\u{200B}';

/// Returns the body of the first fenced block, if the reply has one.
pub fn extract_fenced_block(reply: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Browser and Python output helpers become `console.log`.
pub fn rewrite_output_calls(code: &str) -> String {
    REWRITES
        .iter()
        .fold(code.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Appends a single closing brace when opens outnumber closes. Deeper
/// imbalance is left as is.
pub fn close_dangling_brace(mut code: String) -> String {
    let opens = code.matches('{').count();
    let closes = code.matches('}').count();
    if opens > closes {
        code.push_str("\n}");
    }
    code
}

pub fn strip_zero_width(code: &str) -> String {
    code.chars().filter(|c| *c != ZERO_WIDTH_SPACE).collect()
}

pub fn sanitize(reply: &str) -> String {
    let working = extract_fenced_block(reply).unwrap_or(reply);
    let rewritten = rewrite_output_calls(working);
    let closed = close_dangling_brace(rewritten);
    strip_zero_width(&closed).trim().to_string()
}

/// Where a sanitized script is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTarget {
    /// One well-known file, overwritten on every write.
    Fixed(PathBuf),
    /// A fresh uniquely named file inside `dir`, removed once dropped.
    PerRequest { dir: PathBuf },
}

impl ScriptTarget {
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

#[derive(Debug, Error)]
#[error("failed writing script {}: {source}", .path.display())]
pub struct PersistError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A script on disk. Per-request files are deleted when this is dropped.
#[derive(Debug)]
pub struct PersistedScript {
    path: PathBuf,
    _temp: Option<TempPath>,
}

impl PersistedScript {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn persist(target: &ScriptTarget, script: &str) -> Result<PersistedScript, PersistError> {
    match target {
        ScriptTarget::Fixed(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| PersistError {
                    path: path.clone(),
                    source,
                })?;
            }
            fs::write(path, script).map_err(|source| PersistError {
                path: path.clone(),
                source,
            })?;
            Ok(PersistedScript {
                path: path.clone(),
                _temp: None,
            })
        }
        ScriptTarget::PerRequest { dir } => {
            let fail = |source| PersistError {
                path: dir.clone(),
                source,
            };
            fs::create_dir_all(dir).map_err(fail)?;
            let mut file = tempfile::Builder::new()
                .prefix("jsforge-")
                .suffix(".js")
                .tempfile_in(dir)
                .map_err(fail)?;
            file.write_all(script.as_bytes()).map_err(fail)?;
            file.flush().map_err(fail)?;
            let temp = file.into_temp_path();
            Ok(PersistedScript {
                path: temp.to_path_buf(),
                _temp: Some(temp),
            })
        }
    }
}

/// Sanitizes `reply`, writes it to `target`, and hands back both the text
/// and the file it landed in.
pub fn sanitize_and_persist(
    reply: &str,
    target: &ScriptTarget,
) -> Result<(String, PersistedScript), PersistError> {
    let script = sanitize(reply);
    let persisted = persist(target, &script)?;
    Ok((script, persisted))
}
