use ssh2::Session;
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use fanout_core::executor::{Executor, HostExecutor, OutputSink, Stream};
use fanout_core::{ExecutorError, ExecutorSpec};

/// Added to the per-task timeout when bounding libssh2's own blocking
/// calls, so the task-level timeout always reports first.
const SESSION_TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Alternative backend: a libssh2 session per host instead of an ssh child
/// process. Authentication is pubkey-file or agent; configuration shared
/// across hosts lives here, per-host state in the inner executor.
pub struct SessionExecutor {
    user: String,
    port: u16,
    key_path: Option<String>,
}

impl SessionExecutor {
    /// Recognized kwargs: `user` (defaults to $USER), `port`, `key`.
    /// Fails at job scope when no username can be determined.
    pub fn from_spec(spec: &ExecutorSpec) -> Result<Self, ExecutorError> {
        let user = match spec.kwarg("user") {
            Some(user) => user.to_string(),
            None => std::env::var("USER")
                .map_err(|_| ExecutorError::Config("session executor requires 'user'".into()))?,
        };
        let port = match spec.kwarg("port") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| ExecutorError::Config(format!("invalid port: {port}")))?,
            None => 22,
        };
        Ok(Self {
            user,
            port,
            key_path: spec.kwarg("key").map(str::to_string),
        })
    }
}

#[async_trait::async_trait]
impl Executor for SessionExecutor {
    fn name(&self) -> &str {
        "session"
    }

    async fn host_executor(
        &self,
        hostname: &str,
        command: &[String],
        timeout: Option<Duration>,
        sink: OutputSink,
    ) -> Result<Box<dyn HostExecutor>, ExecutorError> {
        Ok(Box::new(SessionHost {
            hostname: hostname.to_string(),
            command: shell_join(command),
            user: self.user.clone(),
            port: self.port,
            key_path: self.key_path.clone(),
            timeout,
            sink,
        }))
    }
}

#[derive(Clone)]
struct SessionHost {
    hostname: String,
    command: String,
    user: String,
    port: u16,
    key_path: Option<String>,
    timeout: Option<Duration>,
    sink: OutputSink,
}

impl SessionHost {
    fn connect(&self) -> Result<Session, ExecutorError> {
        debug!(host = %self.hostname, port = self.port, user = %self.user, "connecting");
        let tcp = TcpStream::connect((self.hostname.as_str(), self.port)).map_err(|err| {
            ExecutorError::Connection(format!("{}:{}: {err}", self.hostname, self.port))
        })?;

        let mut sess = Session::new()
            .map_err(|err| ExecutorError::Connection(format!("session init: {err}")))?;
        sess.set_tcp_stream(tcp);
        if let Some(timeout) = self.timeout {
            // Bounds the blocking libssh2 calls, reclaiming a worker the
            // task-level timeout has abandoned.
            let bound = timeout + SESSION_TEARDOWN_GRACE;
            sess.set_timeout(bound.as_millis().min(u32::MAX as u128) as u32);
        }
        sess.handshake()
            .map_err(|err| ExecutorError::Connection(format!("handshake: {err}")))?;

        if let Some(key_path) = &self.key_path {
            sess.userauth_pubkey_file(&self.user, None, Path::new(key_path), None)
                .map_err(|err| ExecutorError::Auth(format!("pubkey auth: {err}")))?;
        } else {
            sess.userauth_agent(&self.user)
                .map_err(|err| ExecutorError::Auth(format!("agent auth: {err}")))?;
        }

        if !sess.authenticated() {
            return Err(ExecutorError::Auth("not authenticated".into()));
        }

        info!(host = %self.hostname, "session established");
        Ok(sess)
    }
}

#[async_trait::async_trait]
impl HostExecutor for SessionHost {
    /// All libssh2 I/O is blocking, so it runs on the blocking pool; this
    /// future just awaits the worker and stays pollable, letting the host
    /// task's timeout fire mid-session. A worker abandoned by that timeout
    /// keeps running until the session timeout set in `connect` trips.
    async fn run(&mut self) -> Result<i32, ExecutorError> {
        let work = self.clone();
        tokio::task::spawn_blocking(move || work.run_blocking())
            .await
            .map_err(|err| ExecutorError::Process(format!("session worker: {err}")))?
    }
}

impl SessionHost {
    fn run_blocking(&self) -> Result<i32, ExecutorError> {
        let sess = self.connect()?;

        let mut channel = sess
            .channel_session()
            .map_err(|err| ExecutorError::Connection(format!("channel: {err}")))?;
        channel
            .exec(&self.command)
            .map_err(|err| ExecutorError::Process(format!("exec '{}': {err}", self.command)))?;

        for line in BufReader::new(channel.stream(0)).lines() {
            match line {
                Ok(line) => self.sink.emit(Stream::Stdout, line),
                Err(_) => break,
            }
        }
        for line in BufReader::new(channel.stderr()).lines() {
            match line {
                Ok(line) => self.sink.emit(Stream::Stderr, line),
                Err(_) => break,
            }
        }

        channel.wait_close().ok();
        let rc = channel
            .exit_status()
            .map_err(|err| ExecutorError::Process(format!("exit status: {err}")))?;
        Ok(rc)
    }
}

/// Join command tokens into one shell line, single-quoting each token the
/// way the remote shell expects.
pub fn shell_join(command: &[String]) -> String {
    command
        .iter()
        .map(|token| format!("'{}'", token.replace('\'', "'\\''")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_join_quotes_every_token() {
        let command = vec!["echo".to_string(), "a b".to_string(), "it's".to_string()];
        assert_eq!(shell_join(&command), "'echo' 'a b' 'it'\\''s'");
    }

    #[test]
    fn from_spec_reads_kwargs() {
        let spec = ExecutorSpec::parse("session:user=deploy,port=2222,key=/home/deploy/.ssh/id");
        let executor = SessionExecutor::from_spec(&spec).unwrap();
        assert_eq!(executor.user, "deploy");
        assert_eq!(executor.port, 2222);
        assert_eq!(executor.key_path.as_deref(), Some("/home/deploy/.ssh/id"));
    }

    #[test]
    fn bad_port_fails_at_job_scope() {
        let spec = ExecutorSpec::parse("session:user=deploy,port=nope");
        assert!(matches!(
            SessionExecutor::from_spec(&spec),
            Err(ExecutorError::Config(_))
        ));
    }
}
