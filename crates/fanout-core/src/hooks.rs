//! Built-in hooks: live printers, a JSONL event stream, a progress counter,
//! and the transcript collector backing library-mode usage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

use crate::executor::Stream;
use crate::hook::Hook;

/// Prints remote output lines as they arrive, stdout lines to stdout and
/// stderr lines to stderr. With a host prefix enabled, hostnames are padded
/// to the longest name in the job so columns line up.
pub struct PrinterHook {
    prefix_host: bool,
    pad: AtomicUsize,
}

impl PrinterHook {
    /// Plain printer: raw lines, no hostname.
    pub fn new() -> Self {
        Self {
            prefix_host: false,
            pad: AtomicUsize::new(0),
        }
    }

    /// Printer that prefixes each line with its hostname.
    pub fn prefixed() -> Self {
        Self {
            prefix_host: true,
            pad: AtomicUsize::new(0),
        }
    }

    fn write(&self, out: &mut dyn Write, hostname: &str, line: &str) {
        if self.prefix_host {
            let pad = self.pad.load(Ordering::Relaxed);
            let _ = writeln!(out, "{:<pad$} {}", format!("{hostname}:"), line);
        } else {
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
    }
}

impl Default for PrinterHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Hook for PrinterHook {
    async fn pre_job(&self, _command: &[String], hosts: &[String], _at: DateTime<Utc>) {
        // One extra column for the ':'.
        let longest = hosts.iter().map(|h| h.len()).max().unwrap_or(0) + 1;
        self.pad.store(longest, Ordering::Relaxed);
    }

    async fn update_host(&self, hostname: &str, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => self.write(&mut std::io::stdout().lock(), hostname, line),
            Stream::Stderr => self.write(&mut std::io::stderr().lock(), hostname, line),
        }
    }
}

/// Machine-readable printer: one JSON object per lifecycle event on stdout.
pub struct JsonLinesHook;

impl JsonLinesHook {
    pub fn new() -> Self {
        Self
    }

    fn emit(&self, value: serde_json::Value) {
        let mut out = std::io::stdout().lock();
        if let Ok(line) = serde_json::to_string(&value) {
            let _ = writeln!(out, "{line}");
        }
    }
}

impl Default for JsonLinesHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Hook for JsonLinesHook {
    async fn pre_job(&self, command: &[String], hosts: &[String], at: DateTime<Utc>) {
        self.emit(serde_json::json!({
            "event": "pre_job",
            "command": command,
            "hosts": hosts,
            "at": at.to_rfc3339(),
        }));
    }

    async fn pre_host(&self, hostname: &str, at: DateTime<Utc>) {
        self.emit(serde_json::json!({
            "event": "pre_host",
            "host": hostname,
            "at": at.to_rfc3339(),
        }));
    }

    async fn update_host(&self, hostname: &str, stream: Stream, line: &str) {
        self.emit(serde_json::json!({
            "event": "update_host",
            "host": hostname,
            "stream": stream,
            "line": line,
        }));
    }

    async fn post_host(&self, hostname: &str, rc: i32, at: DateTime<Utc>) {
        self.emit(serde_json::json!({
            "event": "post_host",
            "host": hostname,
            "rc": rc,
            "at": at.to_rfc3339(),
        }));
    }

    async fn post_job(&self, at: DateTime<Utc>) {
        self.emit(serde_json::json!({
            "event": "post_job",
            "at": at.to_rfc3339(),
        }));
    }
}

/// Prints a completion counter to stderr after each host finishes.
/// Counters are atomics: post_host fires concurrently across hosts.
pub struct ProgressHook {
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ProgressHook {
    pub fn new() -> Self {
        Self {
            total: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        }
    }
}

impl Default for ProgressHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Hook for ProgressHook {
    async fn pre_job(&self, _command: &[String], hosts: &[String], _at: DateTime<Utc>) {
        self.total.store(hosts.len(), Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    async fn post_host(&self, hostname: &str, rc: i32, _at: DateTime<Utc>) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed).max(1);
        let mut err = std::io::stderr().lock();
        let _ = writeln!(
            err,
            "fanout: {done}/{total} ({}%) {hostname} rc={rc}",
            done * 100 / total,
        );
    }
}

/// Forwards every lifecycle event to tracing at debug level.
pub struct TraceHook;

#[async_trait::async_trait]
impl Hook for TraceHook {
    async fn pre_job(&self, command: &[String], hosts: &[String], _at: DateTime<Utc>) {
        debug!(?command, hosts = hosts.len(), "pre_job");
    }

    async fn pre_host(&self, hostname: &str, _at: DateTime<Utc>) {
        debug!(host = hostname, "pre_host");
    }

    async fn update_host(&self, hostname: &str, stream: Stream, line: &str) {
        debug!(host = hostname, %stream, line, "update_host");
    }

    async fn post_host(&self, hostname: &str, rc: i32, _at: DateTime<Utc>) {
        debug!(host = hostname, rc, "post_host");
    }

    async fn post_job(&self, _at: DateTime<Utc>) {
        debug!("post_job");
    }
}

/// Captured output for one host.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostTranscript {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub return_code: Option<i32>,
}

/// Composite collector: allocates a fresh transcript per host on pre_host
/// and routes subsequent events to it by hostname. This is the buffering
/// hook used by the library-mode entry point.
pub struct TranscriptHook {
    hosts: Mutex<BTreeMap<String, HostTranscript>>,
}

impl TranscriptHook {
    pub fn new() -> Self {
        Self {
            hosts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Copy of everything captured so far, keyed by hostname.
    pub fn snapshot(&self) -> BTreeMap<String, HostTranscript> {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for TranscriptHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Hook for TranscriptHook {
    async fn pre_host(&self, hostname: &str, _at: DateTime<Utc>) {
        self.hosts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(hostname.to_string(), HostTranscript::default());
    }

    async fn update_host(&self, hostname: &str, stream: Stream, line: &str) {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        let transcript = hosts.entry(hostname.to_string()).or_default();
        match stream {
            Stream::Stdout => transcript.stdout.push(line.to_string()),
            Stream::Stderr => transcript.stderr.push(line.to_string()),
        }
    }

    async fn post_host(&self, hostname: &str, rc: i32, _at: DateTime<Utc>) {
        self.hosts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(hostname.to_string())
            .or_default()
            .return_code = Some(rc);
    }
}
