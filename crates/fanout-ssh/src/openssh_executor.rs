use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use fanout_core::executor::{Executor, HostExecutor, OutputSink, Stream};
use fanout_core::{ExecutorError, ExecutorSpec};

/// Built-in backend: one local `ssh` child process per host, reaching out to
/// the target and running the command there. Password prompts are disabled
/// so an unreachable key setup fails instead of hanging every host.
pub struct OpenSshExecutor {
    binary: String,
    options: Vec<String>,
}

impl OpenSshExecutor {
    pub fn new() -> Self {
        Self {
            binary: "ssh".to_string(),
            options: Vec::new(),
        }
    }

    /// Build from an executor spec. Positional args are passed to ssh as
    /// extra options verbatim; recognized kwargs: `binary`, `user`, `port`.
    pub fn from_spec(spec: &ExecutorSpec) -> Result<Self, ExecutorError> {
        let mut executor = Self::new();
        if let Some(binary) = spec.kwarg("binary") {
            executor.binary = binary.to_string();
        }
        if let Some(user) = spec.kwarg("user") {
            executor.options.push("-l".to_string());
            executor.options.push(user.to_string());
        }
        if let Some(port) = spec.kwarg("port") {
            port.parse::<u16>()
                .map_err(|_| ExecutorError::Config(format!("invalid ssh port: {port}")))?;
            executor.options.push("-p".to_string());
            executor.options.push(port.to_string());
        }
        executor.options.extend(spec.args.iter().cloned());
        Ok(executor)
    }

    /// Add a raw ssh option (`-o Key=value` style arguments).
    pub fn push_option(&mut self, option: impl Into<String>) {
        self.options.push(option.into());
    }

    fn argv(&self, hostname: &str, command: &[String]) -> Vec<String> {
        let mut argv = vec![
            "-o".to_string(),
            "PasswordAuthentication=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        argv.extend(self.options.iter().cloned());
        argv.push(hostname.to_string());
        argv.extend(command.iter().cloned());
        argv
    }
}

impl Default for OpenSshExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Executor for OpenSshExecutor {
    fn name(&self) -> &str {
        "ssh"
    }

    async fn host_executor(
        &self,
        hostname: &str,
        command: &[String],
        _timeout: Option<Duration>,
        sink: OutputSink,
    ) -> Result<Box<dyn HostExecutor>, ExecutorError> {
        Ok(Box::new(SshChild {
            binary: self.binary.clone(),
            argv: self.argv(hostname, command),
            sink,
        }))
    }
}

struct SshChild {
    binary: String,
    argv: Vec<String>,
    sink: OutputSink,
}

#[async_trait::async_trait]
impl HostExecutor for SshChild {
    async fn run(&mut self) -> Result<i32, ExecutorError> {
        debug!(binary = %self.binary, argv = ?self.argv, "spawning ssh");

        // kill_on_drop: when the host task times out it drops this future,
        // which takes the child down with it.
        let mut child = Command::new(&self.binary)
            .args(&self.argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ExecutorError::Process(format!("failed to spawn ssh: {err}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::Process("ssh stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutorError::Process("ssh stderr not captured".to_string()))?;

        let (status, _, _) = tokio::join!(
            child.wait(),
            stream_lines(stdout, Stream::Stdout, self.sink.clone()),
            stream_lines(stderr, Stream::Stderr, self.sink.clone()),
        );

        let status =
            status.map_err(|err| ExecutorError::Process(format!("wait on ssh failed: {err}")))?;

        // No exit code means the child died on a signal.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Read one stream to end-of-file, emitting each line as it arrives.
async fn stream_lines(reader: impl AsyncRead + Unpin, stream: Stream, sink: OutputSink) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.emit(stream, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_puts_options_before_host_and_command() {
        let mut spec = ExecutorSpec::new("ssh");
        spec.kwargs.insert("user".to_string(), "deploy".to_string());
        spec.kwargs.insert("port".to_string(), "2222".to_string());
        spec.args.push("-4".to_string());

        let executor = OpenSshExecutor::from_spec(&spec).unwrap();
        let argv = executor.argv("web01", &["uptime".to_string()]);

        let host_at = argv.iter().position(|a| a == "web01").unwrap();
        assert_eq!(argv[host_at + 1], "uptime");
        assert!(argv[..host_at].contains(&"-4".to_string()));
        assert!(argv[..host_at].contains(&"PasswordAuthentication=no".to_string()));
        let user_flag = argv.iter().position(|a| a == "-l").unwrap();
        assert_eq!(argv[user_flag + 1], "deploy");
        assert!(user_flag < host_at);
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let mut spec = ExecutorSpec::new("ssh");
        spec.kwargs.insert("port".to_string(), "lots".to_string());
        assert!(matches!(
            OpenSshExecutor::from_spec(&spec),
            Err(ExecutorError::Config(_))
        ));
    }
}
