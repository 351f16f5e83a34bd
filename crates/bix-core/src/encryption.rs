use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bix_config::PipelineConfig;
use bix_types::{PipelineError, ProcessOutcome, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Hard ceiling on one encryption tool run.
pub const ENCRYPTION_TIMEOUT: Duration = Duration::from_millis(300_000);

/// A fully built command line for the encryption tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl ToolInvocation {
    /// `-i <plaintext> -o <ciphertext> -c <configName> -C <columnActions>`
    pub fn new(config: &PipelineConfig, plaintext: &Path, ciphertext: &Path) -> Self {
        Self {
            program: config.tool_path.clone(),
            args: vec![
                "-i".to_string(),
                plaintext.display().to_string(),
                "-o".to_string(),
                ciphertext.display().to_string(),
                "-c".to_string(),
                config.tool_config_name.clone(),
                "-C".to_string(),
                config.tool_column_actions.clone(),
            ],
            working_dir: config.tool_working_dir.clone(),
        }
    }

    /// Arguments as an operator would type them, config name quoted.
    pub fn argument_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len());
        let mut quote_next = false;
        for arg in &self.args {
            if quote_next {
                parts.push(format!("\"{arg}\""));
            } else {
                parts.push(arg.clone());
            }
            quote_next = arg == "-c";
        }
        parts.join(" ")
    }
}

/// Runs the encryption tool and reports what it observed.
///
/// A runner never interprets the outcome; that is the orchestrator's job.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation, timeout: Duration) -> ProcessOutcome;
}

/// Runs the tool as a child process with captured stdout.
pub struct ProcessToolRunner;

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, invocation: &ToolInvocation, timeout: Duration) -> ProcessOutcome {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return ProcessOutcome::not_started(e.to_string()),
        };
        debug!(pid = ?child.id(), "Encryption tool started");

        // Dropping the wait future on timeout kills the child (kill_on_drop).
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => return ProcessOutcome::timed_out(),
            Ok(Err(e)) => {
                return ProcessOutcome {
                    started: true,
                    failure: Some(format!("Failed to wait for encryption tool: {e}")),
                    ..Default::default()
                };
            }
            Ok(Ok(output)) => output,
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "Encryption tool wrote to stderr");
        }

        ProcessOutcome::exited(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            output.status.code(),
        )
    }
}

/// Drives one encryption: plaintext in, verified ciphertext out.
///
/// Flow: write plaintext → start tool → bounded wait → exact stdout
/// check → retention check → delete plaintext → require ciphertext.
/// There are no retries; every failure goes back to the caller.
pub struct EncryptionOrchestrator {
    runner: Arc<dyn ToolRunner>,
    config: PipelineConfig,
    timeout: Duration,
}

impl EncryptionOrchestrator {
    pub fn new(config: PipelineConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            config,
            timeout: ENCRYPTION_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Encrypt `plaintext` and return the path of the encrypted file.
    pub async fn encrypt(&self, plaintext: &str) -> Result<PathBuf> {
        let plaintext_path = self.config.plaintext_path();
        let ciphertext_path = self.config.ciphertext_path();

        write_private(&plaintext_path, plaintext.as_bytes()).await?;
        debug!(path = %plaintext_path.display(), bytes = plaintext.len(), "Plaintext written");

        let invocation = ToolInvocation::new(&self.config, &plaintext_path, &ciphertext_path);
        let arguments = invocation.argument_string();
        info!(program = %invocation.program.display(), %arguments, "Launching encryption tool");

        let start = Instant::now();
        let outcome = self.runner.run(&invocation, self.timeout).await;
        let duration_secs = start.elapsed().as_secs_f64();

        if !outcome.started {
            return Err(PipelineError::ToolLaunch {
                arguments,
                reason: outcome
                    .failure
                    .unwrap_or_else(|| "process did not start".to_string()),
            });
        }

        if !outcome.exited {
            // Started but never seen to exit: the wait failed, or the deadline passed.
            if let Some(reason) = outcome.failure {
                return Err(PipelineError::ToolWait { arguments, reason });
            }
            return Err(PipelineError::ToolTimeout {
                arguments,
                timeout_ms: self.timeout.as_millis() as u64,
            });
        }

        info!(exit_code = ?outcome.exit_code, duration_secs, "Encryption tool exited");

        if outcome.stdout != self.config.tool_success_marker {
            return Err(PipelineError::ToolOutputMismatch {
                actual: outcome.stdout,
                expected: self.config.tool_success_marker.clone(),
            });
        }

        if self.config.retain_plaintext_after_encryption {
            warn!(
                path = %plaintext_path.display(),
                "RetainPlaintextAfterEncryption is set, halting with files left in place"
            );
            return Err(PipelineError::RetainedPlaintext {
                path: plaintext_path,
            });
        }

        tokio::fs::remove_file(&plaintext_path)
            .await
            .map_err(|e| PipelineError::fs(&plaintext_path, e))?;
        debug!(path = %plaintext_path.display(), "Plaintext deleted");

        match tokio::fs::metadata(&ciphertext_path).await {
            Ok(meta) if meta.is_file() => {
                info!(path = %ciphertext_path.display(), bytes = meta.len(), "Extract encrypted");
                Ok(ciphertext_path)
            }
            Ok(_) => Err(PipelineError::MissingEncryptedOutput {
                path: ciphertext_path,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PipelineError::MissingEncryptedOutput {
                    path: ciphertext_path,
                })
            }
            Err(e) => Err(PipelineError::fs(&ciphertext_path, e)),
        }
    }
}

/// Write a file only the current user can read.
async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .map_err(|e| PipelineError::fs(path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| PipelineError::fs(path, e))?;
    file.sync_all()
        .await
        .map_err(|e| PipelineError::fs(path, e))?;
    Ok(())
}
