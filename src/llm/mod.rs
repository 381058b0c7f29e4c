//! LLM boundary.
//!
//! The core assembles a prompt and consumes a structured reply; which
//! model answers is not its business. The shipped client shells out to a
//! configured command (prompt on stdin, reply on stdout), keeping
//! credentials and transport outside the engine. Tests use the scripted
//! client.

use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion round: system instruction plus user prompt in,
    /// raw reply text out.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

/// Client invoking an external command per completion
pub struct CommandLlm {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandLlm {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout_seconds: u64) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl LlmClient for CommandLlm {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(program = %self.program, "invoking LLM command");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LlmError::Transport {
                reason: format!("spawn {}: {e}", self.program),
            })?;

        let input = format!("{system}\n\n{prompt}");
        // The child may start emitting output before it has read all of
        // stdin; feed stdin from its own task so wait_with_output can
        // drain stdout/stderr concurrently. Writing inline would deadlock
        // once the prompt and the child's output both exceed their pipe
        // buffers.
        let stdin = child.stdin.take();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                let result = stdin.write_all(input.as_bytes()).await;
                // stdin drops here so the command sees EOF
                drop(stdin);
                result
            } else {
                Ok(())
            }
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LlmError::Transport {
                reason: format!("{} timed out after {}s", self.program, self.timeout.as_secs()),
            })?
            .map_err(|e| LlmError::Transport {
                reason: format!("wait {}: {e}", self.program),
            })?;

        match writer.await {
            Ok(Ok(())) => {}
            // EPIPE from a command that exited early is only fatal when
            // it also produced no reply
            Ok(Err(e)) if !output.status.success() => {
                return Err(LlmError::Transport {
                    reason: format!("write prompt: {e}"),
                });
            }
            Ok(Err(_)) => {}
            Err(e) => {
                return Err(LlmError::Transport {
                    reason: format!("stdin writer task failed: {e}"),
                })
            }
        }

        if !output.status.success() {
            return Err(LlmError::Transport {
                reason: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Scripted client replaying canned replies, for tests
#[derive(Default)]
pub struct StaticLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
}

impl StaticLlm {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, for assertions.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl LlmClient for StaticLlm {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
        self.calls.lock().expect("poisoned").push(prompt.to_string());
        self.replies
            .lock()
            .expect("poisoned")
            .pop_front()
            .ok_or(LlmError::NotConfigured)
    }
}
