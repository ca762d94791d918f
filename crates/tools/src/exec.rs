//! Tool command execution.
//!
//! A tool invocation is a synchronous child process: the argument object
//! is delivered as JSON on stdin and additionally as `MOCHI_ARG_*`
//! environment variables, stdout is the string result. The process runs
//! on the blocking pool so the cooperative scheduler is never stalled.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

use serde_json::{Map, Value};

use mochi_domain::error::{Error, Result};

/// Outcome of one tool execution.
///
/// `result` is always a string; failures carry an empty result and a
/// populated `error_message`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolExecution {
    pub ok: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl ToolExecution {
    /// The string handed back to the model as the tool message content.
    pub fn result_string(&self) -> String {
        if self.ok {
            self.result.clone()
        } else {
            format!(
                "Error: {}",
                self.error_message.as_deref().unwrap_or("tool failed")
            )
        }
    }
}

/// Run one manifest command to completion off the async scheduler.
pub(crate) async fn run_tool_command(
    command: Vec<String>,
    dir: PathBuf,
    args: Map<String, Value>,
) -> Result<ToolExecution> {
    let started = Instant::now();

    let outcome = tokio::task::spawn_blocking(move || run_blocking(command, dir, args))
        .await
        .map_err(|e| Error::Other(format!("tool worker panicked: {e}")))?;

    let duration_ms = started.elapsed().as_millis() as u64;
    Ok(match outcome {
        Ok(result) => ToolExecution {
            duration_ms,
            ..result
        },
        Err(message) => ToolExecution {
            ok: false,
            result: String::new(),
            error_message: Some(message),
            duration_ms,
        },
    })
}

fn run_blocking(
    command: Vec<String>,
    dir: PathBuf,
    args: Map<String, Value>,
) -> std::result::Result<ToolExecution, String> {
    let Some(program) = command.first() else {
        return Err("tool has an empty command".into());
    };
    // Relative programs resolve against the manifest directory.
    let program_path = if program.contains('/') {
        dir.join(program)
    } else {
        PathBuf::from(program)
    };

    let mut cmd = Command::new(&program_path);
    cmd.args(&command[1..])
        .current_dir(&dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (key, value) in &args {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        cmd.env(format!("MOCHI_ARG_{}", key.to_ascii_uppercase()), rendered);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("failed to spawn '{program}': {e}"))?;

    if let Some(stdin) = child.stdin.take() {
        use std::io::Write;
        let payload = Value::Object(args).to_string();
        let mut stdin = stdin;
        // A tool that never reads stdin may close the pipe early.
        let _ = stdin.write_all(payload.as_bytes());
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("failed to wait for '{program}': {e}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout)
        .trim_end_matches('\n')
        .to_string();

    if output.status.success() {
        Ok(ToolExecution {
            ok: true,
            result: stdout,
            error_message: None,
            duration_ms: 0,
        })
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("'{program}' exited with {}", output.status)
        } else {
            stderr
        };
        Ok(ToolExecution {
            ok: false,
            result: String::new(),
            error_message: Some(message),
            duration_ms: 0,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn echo_succeeds() {
        let result = run_tool_command(
            vec!["echo".into(), "hello".into()],
            std::env::temp_dir(),
            Map::new(),
        )
        .await
        .unwrap();
        assert!(result.ok);
        assert_eq!(result.result, "hello");
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn args_arrive_as_env() {
        let result = run_tool_command(
            vec!["sh".into(), "-c".into(), "printf %s \"$MOCHI_ARG_CITY\"".into()],
            std::env::temp_dir(),
            args(&[("city", Value::String("Kyoto".into()))]),
        )
        .await
        .unwrap();
        assert!(result.ok);
        assert_eq!(result.result, "Kyoto");
    }

    #[tokio::test]
    async fn args_arrive_on_stdin() {
        let result = run_tool_command(
            vec!["sh".into(), "-c".into(), "cat".into()],
            std::env::temp_dir(),
            args(&[("n", Value::from(7))]),
        )
        .await
        .unwrap();
        assert!(result.ok);
        assert_eq!(result.result, r#"{"n":7}"#);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_stderr() {
        let result = run_tool_command(
            vec!["sh".into(), "-c".into(), "echo boom >&2; exit 3".into()],
            std::env::temp_dir(),
            Map::new(),
        )
        .await
        .unwrap();
        assert!(!result.ok);
        assert_eq!(result.result, "");
        assert_eq!(result.error_message.as_deref(), Some("boom"));
        assert_eq!(result.result_string(), "Error: boom");
    }

    #[tokio::test]
    async fn missing_program_is_failure() {
        let result = run_tool_command(
            vec!["definitely-not-a-binary-xyz".into()],
            std::env::temp_dir(),
            Map::new(),
        )
        .await
        .unwrap();
        assert!(!result.ok);
        assert!(result.error_message.unwrap().contains("failed to spawn"));
    }
}
