//! Built-in ssh backend (local `ssh` subprocess per host) and the
//! library-mode entry point for running a command across a fleet without
//! wiring up jobs and hooks by hand.

pub mod openssh_executor;

pub use openssh_executor::OpenSshExecutor;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fanout_core::{ForkLimit, HostTranscript, Job, JobError, TranscriptHook};

/// Run `command` on every host over ssh and collect full transcripts.
///
/// Attaches a buffering hook internally, runs the job to completion, and
/// returns captured stdout lines, stderr lines, and return code per host.
/// This is the programmatic counterpart of the CLI.
///
/// ```no_run
/// # async fn demo() -> Result<(), fanout_core::JobError> {
/// let results = fanout_ssh::run_remote_command(
///     vec!["web01".to_string(), "web02".to_string()],
///     vec!["uptime".to_string()],
///     ForkLimit::Count(16),
///     Some(std::time::Duration::from_secs(30)),
/// )
/// .await?;
/// for (host, transcript) in &results {
///     println!("{host}: rc={:?}", transcript.return_code);
/// }
/// # Ok(())
/// # }
/// # use fanout_core::ForkLimit;
/// ```
pub async fn run_remote_command(
    hosts: impl IntoIterator<Item = String>,
    command: Vec<String>,
    fork_limit: ForkLimit,
    timeout: Option<Duration>,
) -> Result<BTreeMap<String, HostTranscript>, JobError> {
    let transcripts = Arc::new(TranscriptHook::new());
    let executor = Arc::new(OpenSshExecutor::new());

    let mut job = Job::new(
        hosts,
        command,
        fork_limit,
        timeout,
        vec![transcripts.clone()],
        executor,
    );
    job.run_async().await;
    job.wait(None).await?;

    Ok(transcripts.snapshot())
}
