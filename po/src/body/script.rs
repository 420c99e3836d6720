//! Script-execution capability
//!
//! Builds callables out of external script source. The executor writes the
//! source plus a small harness into the sandbox, then spawns `python3` per
//! invocation: arguments go in as JSON on stdin, the result comes back as
//! JSON on stdout. Nonzero exit or unparsable output is a script error.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::error::ToolError;
use super::fs::FileSystem;
use crate::reference::{Callable, CellValue};

const HARNESS: &str = r#"
import json, sys
args = json.load(sys.stdin)
result = __ENTRYPOINT__(**args)
json.dump(result, sys.stdout)
"#;

/// Spawns script processes confined to the run sandbox
#[derive(Clone)]
pub struct ScriptRunner {
    fs: FileSystem,
    interpreter: String,
}

impl ScriptRunner {
    pub fn new(fs: FileSystem) -> Self {
        Self {
            fs,
            interpreter: "python3".to_string(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Compile script source into a callable bound to `entrypoint`
    pub async fn create_function_executor(&self, source: &str, entrypoint: &str) -> Result<Callable, ToolError> {
        let script = format!("{source}\n{}", HARNESS.replace("__ENTRYPOINT__", entrypoint));
        let script_path = self
            .fs
            .write(
                &PathBuf::from(".scripts").join(format!("{entrypoint}.py")),
                script.as_bytes(),
            )
            .await?;

        let interpreter = self.interpreter.clone();
        let entrypoint = entrypoint.to_string();
        let cwd = self.fs.sandbox().to_path_buf();

        Ok(Callable::new(entrypoint.clone(), move |args| {
            let interpreter = interpreter.clone();
            let entrypoint = entrypoint.clone();
            let script_path = script_path.clone();
            let cwd = cwd.clone();
            Box::pin(async move {
                let json_args = args_to_json(&args, &entrypoint)?;
                run_script(&interpreter, &script_path, &cwd, &entrypoint, &json_args).await
            })
        }))
    }
}

fn args_to_json(args: &BTreeMap<String, CellValue>, entrypoint: &str) -> Result<serde_json::Value, ToolError> {
    let mut map = serde_json::Map::new();
    for (key, value) in args {
        let json = match value {
            CellValue::Literal(v) => v.clone(),
            CellValue::Sign(s) => serde_json::Value::String(s.payload.clone()),
            other => other
                .to_json()
                .map_err(|_| ToolError::ScriptError {
                    entrypoint: entrypoint.to_string(),
                    message: format!("argument {key} is not JSON-representable"),
                })?,
        };
        map.insert(key.clone(), json);
    }
    Ok(serde_json::Value::Object(map))
}

async fn run_script(
    interpreter: &str,
    script_path: &std::path::Path,
    cwd: &std::path::Path,
    entrypoint: &str,
    args: &serde_json::Value,
) -> Result<Vec<CellValue>, ToolError> {
    debug!(%entrypoint, script = %script_path.display(), "Running script");

    let mut child = tokio::process::Command::new(interpreter)
        .arg(script_path)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ToolError::ScriptError {
            entrypoint: entrypoint.to_string(),
            message: format!("spawn failed: {e}"),
        })?;

    let payload = serde_json::to_vec(args).map_err(|e| ToolError::ScriptError {
        entrypoint: entrypoint.to_string(),
        message: e.to_string(),
    })?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(&payload).await.map_err(|e| ToolError::ScriptError {
            entrypoint: entrypoint.to_string(),
            message: format!("stdin write: {e}"),
        })?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output().await.map_err(|e| ToolError::ScriptError {
        entrypoint: entrypoint.to_string(),
        message: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(ToolError::ScriptError {
            entrypoint: entrypoint.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let result: serde_json::Value =
        serde_json::from_slice(&output.stdout).map_err(|e| ToolError::ScriptError {
            entrypoint: entrypoint.to_string(),
            message: format!("bad output JSON: {e}"),
        })?;
    Ok(vec![CellValue::from_leaf(result)])
}
