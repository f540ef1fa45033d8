//! Core orchestration engine for fanout: run one command across a fleet of
//! hosts concurrently, under a bounded pool, streaming per-host output
//! through lifecycle hooks as it is produced.
//!
//! The pieces, leaves first:
//!
//! - [`executor::Executor`] / [`executor::HostExecutor`] — the pluggable
//!   two-level backend contract that performs the actual remote invocation
//! - [`hook::Hook`] — passive lifecycle observers; [`hooks`] has built-ins
//! - [`host::HostTask`] — one host's spawn/stream/timeout/report lifecycle
//! - [`job::Job`] — owns the host set, pool, and hook list; aggregates the
//!   job-wide return code

pub mod config;
pub mod error;
pub mod executor;
pub mod hook;
pub mod hooks;
pub mod host;
pub mod job;
pub mod registry;

pub use config::{Config, ExecutorSpec};
pub use error::{ConfigError, ExecutorError, JobError};
pub use executor::{Executor, HostExecutor, OutputSink, Stream};
pub use hook::{Hook, HookSet};
pub use hooks::{HostTranscript, TranscriptHook};
pub use host::{HostTask, TaskState, BACKEND_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
pub use job::{ForkLimit, Job};
pub use registry::Registry;
