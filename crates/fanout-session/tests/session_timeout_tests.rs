//! The session backend must honor the host task's timeout even though all
//! libssh2 I/O is blocking: a stuck session gets the timeout exit code and
//! the synthetic stderr line, same as the subprocess backend.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use fanout_core::{ExecutorSpec, ForkLimit, Job, TranscriptHook, TIMEOUT_EXIT_CODE};
use fanout_session::SessionExecutor;

#[tokio::test]
async fn stuck_session_is_killed_by_the_task_timeout() {
    // Accepts the TCP connection but never speaks SSH, so the handshake
    // blocks until torn down.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let spec = ExecutorSpec::parse(&format!("session:user=nobody,port={port}"));
    let executor = Arc::new(SessionExecutor::from_spec(&spec).unwrap());
    let transcripts = Arc::new(TranscriptHook::new());

    let mut job = Job::new(
        vec!["127.0.0.1".to_string()],
        vec!["true".to_string()],
        ForkLimit::Count(1),
        Some(Duration::from_millis(150)),
        vec![transcripts.clone()],
        executor,
    );
    job.run_async().await;
    assert_eq!(job.wait(None).await.unwrap(), TIMEOUT_EXIT_CODE);

    let captured = transcripts.snapshot();
    let transcript = &captured["127.0.0.1"];
    assert_eq!(transcript.return_code, Some(TIMEOUT_EXIT_CODE));
    assert!(
        transcript.stderr.iter().any(|l| l.contains("timed out")),
        "synthetic timeout line missing: {:?}",
        transcript.stderr
    );

    // Closing the listener resets the queued connection, unblocking the
    // abandoned session worker.
    drop(listener);
}
