//! Shared test doubles: a scripted in-memory backend and an event-recording
//! hook.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fanout_core::executor::{Executor, HostExecutor, OutputSink, Stream};
use fanout_core::hook::Hook;
use fanout_core::ExecutorError;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PreJob { hosts: Vec<String> },
    PreHost { host: String },
    Update { host: String, stream: Stream, line: String },
    PostHost { host: String, rc: i32 },
    PostJob,
}

/// Records every lifecycle event in arrival order.
#[derive(Default)]
pub struct RecordingHook {
    events: Mutex<Vec<Event>>,
}

impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait::async_trait]
impl Hook for RecordingHook {
    async fn pre_job(&self, _command: &[String], hosts: &[String], _at: DateTime<Utc>) {
        self.push(Event::PreJob {
            hosts: hosts.to_vec(),
        });
    }

    async fn pre_host(&self, hostname: &str, _at: DateTime<Utc>) {
        self.push(Event::PreHost {
            host: hostname.to_string(),
        });
    }

    async fn update_host(&self, hostname: &str, stream: Stream, line: &str) {
        self.push(Event::Update {
            host: hostname.to_string(),
            stream,
            line: line.to_string(),
        });
    }

    async fn post_host(&self, hostname: &str, rc: i32, _at: DateTime<Utc>) {
        self.push(Event::PostHost {
            host: hostname.to_string(),
            rc,
        });
    }

    async fn post_job(&self, _at: DateTime<Utc>) {
        self.push(Event::PostJob);
    }
}

/// What a scripted host should do when run.
#[derive(Debug, Clone, Default)]
pub struct HostScript {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub rc: i32,
    /// Sleep before returning, to exercise the pool.
    pub delay: Option<Duration>,
    /// Never return; relies on the task timeout to get killed.
    pub hang: bool,
    /// Fail host-level backend construction.
    pub refuse_connection: bool,
}

impl HostScript {
    pub fn ok_line(line: &str) -> Self {
        Self {
            stdout: vec![line.to_string()],
            ..Self::default()
        }
    }

    pub fn rc(rc: i32) -> Self {
        Self {
            rc,
            ..Self::default()
        }
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }
}

/// In-memory backend replaying per-host scripts. Tracks the peak number of
/// concurrently running host executors so tests can assert pool bounds.
pub struct ScriptedExecutor {
    scripts: HashMap<String, HostScript>,
    default: HostScript,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedExecutor {
    pub fn uniform(script: HostScript) -> Arc<Self> {
        Self::with_scripts(script, HashMap::new())
    }

    pub fn with_scripts(default: HostScript, scripts: HashMap<String, HostScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts,
            default,
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn host_executor(
        &self,
        hostname: &str,
        _command: &[String],
        _timeout: Option<Duration>,
        sink: OutputSink,
    ) -> Result<Box<dyn HostExecutor>, ExecutorError> {
        let script = self
            .scripts
            .get(hostname)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        if script.refuse_connection {
            return Err(ExecutorError::Connection(format!(
                "no route to host {hostname}"
            )));
        }

        Ok(Box::new(ScriptedHost {
            script,
            sink,
            running: self.running.clone(),
            peak: self.peak.clone(),
        }))
    }
}

struct ScriptedHost {
    script: HostScript,
    sink: OutputSink,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl HostExecutor for ScriptedHost {
    async fn run(&mut self) -> Result<i32, ExecutorError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        for line in &self.script.stdout {
            self.sink.emit(Stream::Stdout, line.clone());
        }
        for line in &self.script.stderr {
            self.sink.emit(Stream::Stderr, line.clone());
        }

        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.hang {
            std::future::pending::<()>().await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(self.script.rc)
    }
}
