use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::ExecutorError;

/// Which of the two remote output streams a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of remote output, newline stripped.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: Stream,
    pub line: String,
}

pub(crate) enum OutputEvent {
    Line(OutputLine),
    /// Sent once per task to shut the consumer down.
    Shutdown,
}

/// Handle a backend uses to emit output lines into its host task's channel.
///
/// Cloneable and infallible from the backend's point of view: once the
/// consumer is gone the lines have nowhere to go and are dropped.
#[derive(Clone)]
pub struct OutputSink {
    tx: mpsc::UnboundedSender<OutputEvent>,
}

impl OutputSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<OutputEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, stream: Stream, line: String) {
        let _ = self.tx.send(OutputEvent::Line(OutputLine { stream, line }));
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(OutputEvent::Shutdown);
    }
}

/// Job-scoped half of a backend. Constructed once per job, holds anything
/// shared across hosts (credentials, ssh options) and fails fast if a
/// required dependency is missing.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Executor type string ("ssh", "session", ...).
    fn name(&self) -> &str;

    /// Build the host-scoped half for one host. Errors here are reported
    /// through the host's stderr stream, not raised to the job.
    async fn host_executor(
        &self,
        hostname: &str,
        command: &[String],
        timeout: Option<Duration>,
        sink: OutputSink,
    ) -> Result<Box<dyn HostExecutor>, ExecutorError>;
}

/// Host-scoped half of a backend: performs the actual remote invocation.
///
/// `run` may call the sink any number of times before returning the remote
/// exit code. Cancellation is by drop: when the host task times out it drops
/// the `run` future, which must tear down the process or session with it.
#[async_trait::async_trait]
pub trait HostExecutor: Send {
    async fn run(&mut self) -> Result<i32, ExecutorError>;
}
