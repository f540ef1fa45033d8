use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::executor::{Executor, OutputEvent, OutputSink, Stream};
use crate::hook::HookSet;

/// Exit code reported when a host's command exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the backend itself fails (cannot be constructed,
/// connection refused, auth failure). The error detail goes to stderr.
pub const BACKEND_FAILURE_EXIT_CODE: i32 = 255;

/// Host task lifecycle. Transitions are forward-only:
/// `Queued -> Running -> {Success, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Failed,
}

/// One host's execution record: owns the output channel, applies the
/// per-host timeout, and drives the hook callbacks for this host.
pub struct HostTask {
    hostname: String,
    command: Arc<Vec<String>>,
    timeout: Option<Duration>,
    hooks: HookSet,
    state: Mutex<TaskState>,
    return_code: Mutex<Option<i32>>,
}

impl HostTask {
    pub(crate) fn new(
        hostname: String,
        command: Arc<Vec<String>>,
        timeout: Option<Duration>,
        hooks: HookSet,
    ) -> Arc<Self> {
        Arc::new(Self {
            hostname,
            command,
            timeout,
            hooks,
            state: Mutex::new(TaskState::Queued),
            return_code: Mutex::new(None),
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn return_code(&self) -> Option<i32> {
        *self.return_code.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance(&self, next: TaskState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if next > *state {
            *state = next;
        }
    }

    /// Run this host to completion: pre_host hooks, backend start, output
    /// streaming, timeout enforcement, finalization, post_host hooks.
    ///
    /// Ordering note: the consumer shutdown sentinel is enqueued *after*
    /// post_host, matching the original design. post_host can therefore fire
    /// while buffered update_host events are still being delivered for this
    /// host; run() itself only returns once the consumer has drained, so
    /// callers of Job::wait always observe full delivery.
    pub(crate) async fn run(self: &Arc<Self>, executor: Arc<dyn Executor>) {
        self.hooks.pre_host(&self.hostname).await;
        self.advance(TaskState::Running);
        debug!(host = %self.hostname, "host task running");

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = OutputSink::new(tx);
        let consumer = tokio::spawn(Self::consume(rx, self.hostname.clone(), self.hooks.clone()));

        let rc = self.execute(executor, sink.clone()).await;

        *self.return_code.lock().unwrap_or_else(|e| e.into_inner()) = Some(rc);
        self.advance(if rc == 0 {
            TaskState::Success
        } else {
            TaskState::Failed
        });

        self.hooks.post_host(&self.hostname, rc).await;

        sink.shutdown();
        let _ = consumer.await;
        debug!(host = %self.hostname, rc, "host task finished");
    }

    /// Start the backend and wait it out under the task timeout. Backend
    /// errors and timeouts are folded into reserved exit codes here; they
    /// never propagate upward.
    async fn execute(&self, executor: Arc<dyn Executor>, sink: OutputSink) -> i32 {
        let mut backend = match executor
            .host_executor(&self.hostname, &self.command, self.timeout, sink.clone())
            .await
        {
            Ok(backend) => backend,
            Err(err) => {
                warn!(host = %self.hostname, %err, "backend construction failed");
                sink.emit(Stream::Stderr, format!("fanout: {err}"));
                return BACKEND_FAILURE_EXIT_CODE;
            }
        };

        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, backend.run()).await {
                Ok(result) => result,
                Err(_) => {
                    // Dropping the run future tears the backend down
                    // (kill_on_drop process, closed session).
                    warn!(host = %self.hostname, ?timeout, "command timed out");
                    sink.emit(
                        Stream::Stderr,
                        format!("fanout: command timed out after {timeout:?}"),
                    );
                    return TIMEOUT_EXIT_CODE;
                }
            },
            None => backend.run().await,
        };

        match result {
            Ok(rc) => rc,
            Err(err) => {
                warn!(host = %self.hostname, %err, "backend run failed");
                sink.emit(Stream::Stderr, format!("fanout: {err}"));
                BACKEND_FAILURE_EXIT_CODE
            }
        }
    }

    /// Single consumer per host: drains the output channel in arrival order
    /// and fans each line out to the hooks. One consumer means hook calls
    /// for a given host are never concurrent with each other.
    async fn consume(
        mut rx: mpsc::UnboundedReceiver<OutputEvent>,
        hostname: String,
        hooks: HookSet,
    ) {
        while let Some(event) = rx.recv().await {
            match event {
                OutputEvent::Line(output) => {
                    hooks
                        .update_host(&hostname, output.stream, &output.line)
                        .await;
                }
                OutputEvent::Shutdown => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_are_forward_only() {
        let task = HostTask::new(
            "a".to_string(),
            Arc::new(vec!["true".to_string()]),
            None,
            HookSet::default(),
        );
        assert_eq!(task.state(), TaskState::Queued);
        task.advance(TaskState::Running);
        assert_eq!(task.state(), TaskState::Running);
        task.advance(TaskState::Failed);
        assert_eq!(task.state(), TaskState::Failed);
        // No going back.
        task.advance(TaskState::Running);
        assert_eq!(task.state(), TaskState::Failed);
        task.advance(TaskState::Queued);
        assert_eq!(task.state(), TaskState::Failed);
    }
}
