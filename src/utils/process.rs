//! Cancel-aware subprocess execution.
//!
//! Output streams are drained by dedicated reader tasks so the caller can observe
//! cancellation without waiting for the child's next line. On cancellation the child
//! is killed instead of being left to exit on its own.

use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::PipelineError;

/// Exit status and captured standard error of a finished child
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Trimmed stderr, or the exit status when the tool printed nothing
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exited with {}", self.status)
        } else {
            stderr.to_string()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("cancelled")]
    Cancelled,

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("failed while waiting for {tool}: {source}")]
    Io {
        tool: String,
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Map into the pipeline taxonomy, keeping cancellation distinct from failure
    pub fn into_pipeline(self, wrap: fn(String) -> PipelineError) -> PipelineError {
        match self {
            ProcessError::Cancelled => PipelineError::Cancelled,
            other => wrap(other.to_string()),
        }
    }
}

/// Run `command`, handing every stdout line to `on_line` as it arrives.
///
/// No process is spawned when `token` is already cancelled.
pub async fn run_streaming<F>(
    mut command: Command,
    tool: &str,
    token: &CancellationToken,
    mut on_line: F,
) -> Result<ProcessOutput, ProcessError>
where
    F: FnMut(&str),
{
    if token.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    tracing::debug!("Spawned {} (pid {:?})", tool, child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    let stdout_reader = stdout.map(|stream| spawn_line_forwarder(stream, line_tx));
    let stderr_reader = stderr.map(spawn_collector);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                terminate(&mut child, tool).await;
                abort_readers(stdout_reader, stderr_reader);
                return Err(ProcessError::Cancelled);
            }
            line = line_rx.recv() => match line {
                Some(line) => {
                    tracing::debug!("[{}] {}", tool, line);
                    on_line(&line);
                }
                None => break,
            },
        }
    }

    let status = tokio::select! {
        biased;
        _ = token.cancelled() => {
            terminate(&mut child, tool).await;
            abort_readers(stdout_reader, stderr_reader);
            return Err(ProcessError::Cancelled);
        }
        status = child.wait() => status.map_err(|source| ProcessError::Io {
            tool: tool.to_string(),
            source,
        })?,
    };

    if let Some(reader) = stdout_reader {
        let _ = reader.await;
    }
    let stderr = match stderr_reader {
        Some(reader) => reader.await.unwrap_or_default(),
        None => String::new(),
    };

    // A stop requested while the tool was exiting still wins
    if token.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    Ok(ProcessOutput { status, stderr })
}

/// Run `command` to completion and return its full stdout alongside the output
pub async fn run_captured(
    command: Command,
    tool: &str,
    token: &CancellationToken,
) -> Result<(String, ProcessOutput), ProcessError> {
    let mut stdout = String::new();
    let output = run_streaming(command, tool, token, |line| {
        stdout.push_str(line);
        stdout.push('\n');
    })
    .await?;

    Ok((stdout, output))
}

fn spawn_line_forwarder<R>(stream: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

fn spawn_collector<R>(stream: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut collected = String::new();
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

/// Next line without its terminator, invalid UTF-8 replaced rather than ending the stream.
///
/// Tools echo media titles and tags in whatever encoding they were written in;
/// the pipe has to stay drained until EOF or the child dies on SIGPIPE.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            Some(String::from_utf8_lossy(buf).into_owned())
        }
        Err(e) => {
            tracing::debug!("Stopped reading tool output: {}", e);
            None
        }
    }
}

async fn terminate(child: &mut Child, tool: &str) {
    tracing::info!("Stopping {} (pid {:?})", tool, child.id());
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill {}: {}", tool, e);
    }
}

fn abort_readers(stdout: Option<JoinHandle<()>>, stderr: Option<JoinHandle<String>>) {
    if let Some(reader) = stdout {
        reader.abort();
    }
    if let Some(reader) = stderr {
        reader.abort();
    }
}
