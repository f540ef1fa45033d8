use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::JobError;
use crate::executor::Executor;
use crate::hook::{Hook, HookSet};
use crate::host::HostTask;

/// Concurrency limit in its raw form: an absolute count or a percentage of
/// the host set, resolved at job construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForkLimit {
    Count(usize),
    Percent(f64),
}

impl ForkLimit {
    /// Parse a limit from its string form ("16" or "50%"). Anything
    /// unparseable degrades to serial execution, never to unbounded.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(count) = raw.parse::<usize>() {
            return ForkLimit::Count(count);
        }
        if let Some(pct) = raw.strip_suffix('%') {
            if let Ok(pct) = pct.trim().parse::<f64>() {
                return ForkLimit::Percent(pct);
            }
        }
        ForkLimit::Count(1)
    }

    /// Resolve against the host count. Always at least 1.
    pub fn resolve(&self, num_hosts: usize) -> usize {
        let limit = match self {
            ForkLimit::Count(count) => *count,
            ForkLimit::Percent(pct) => (num_hosts as f64 * pct / 100.0).floor() as usize,
        };
        limit.max(1)
    }
}

impl From<usize> for ForkLimit {
    fn from(count: usize) -> Self {
        ForkLimit::Count(count)
    }
}

impl<'de> Deserialize<'de> for ForkLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(usize),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Count(count) => ForkLimit::Count(count),
            Raw::Text(text) => ForkLimit::parse(&text),
        })
    }
}

/// One invocation: a command fanned out across a host set under a bounded
/// worker pool, with lifecycle hooks around the whole batch and each host.
///
/// Single-use: `run_async` once, then `wait` until it returns `Ok` (a
/// timed-out wait may be retried).
pub struct Job {
    id: Uuid,
    hosts: Vec<String>,
    command: Arc<Vec<String>>,
    fork_limit: usize,
    timeout: Option<Duration>,
    hooks: HookSet,
    executor: Arc<dyn Executor>,
    tasks: Vec<Arc<HostTask>>,
    finalizer: Option<JoinHandle<()>>,
}

impl Job {
    /// Build a job. Hosts are deduplicated preserving first-seen order,
    /// which is also task submission order. A zero timeout means none.
    pub fn new(
        hosts: impl IntoIterator<Item = String>,
        command: Vec<String>,
        fork_limit: ForkLimit,
        timeout: Option<Duration>,
        hooks: Vec<Arc<dyn Hook>>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let mut seen = HashSet::new();
        let hosts: Vec<String> = hosts
            .into_iter()
            .filter(|host| seen.insert(host.clone()))
            .collect();

        let timeout = timeout.filter(|t| !t.is_zero());
        let fork_limit = fork_limit.resolve(hosts.len());

        Self {
            id: Uuid::new_v4(),
            hosts,
            command: Arc::new(command),
            fork_limit,
            timeout,
            hooks: HookSet::new(hooks),
            executor,
            tasks: Vec::new(),
            finalizer: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Resolved concurrency limit (absolute, >= 1).
    pub fn fork_limit(&self) -> usize {
        self.fork_limit
    }

    /// Per-host tasks, in submission order. Empty until `run_async`.
    pub fn tasks(&self) -> &[Arc<HostTask>] {
        &self.tasks
    }

    /// Run all pre_job hooks to completion, then submit one task per host
    /// into the bounded pool and schedule the post_job hooks to fire after
    /// every task finishes. Returns without waiting for the hosts.
    pub async fn run_async(&mut self) {
        info!(
            job = %self.id,
            hosts = self.hosts.len(),
            fork_limit = self.fork_limit,
            "starting job"
        );

        // Barrier: no host may start before every pre_job has returned.
        self.hooks.pre_job(&self.command, &self.hosts).await;

        for host in self.hosts.clone() {
            self.tasks.push(HostTask::new(
                host,
                self.command.clone(),
                self.timeout,
                self.hooks.clone(),
            ));
        }

        // One dispatcher admits tasks strictly in submission order as pool
        // permits free up, then doubles as the finalizer for post_job.
        let pool = Arc::new(Semaphore::new(self.fork_limit));
        let tasks = self.tasks.clone();
        let executor = self.executor.clone();
        let hooks = self.hooks.clone();
        let id = self.id;
        self.finalizer = Some(tokio::spawn(async move {
            let mut handles = Vec::with_capacity(tasks.len());
            for task in tasks {
                let Ok(permit) = pool.clone().acquire_owned().await else {
                    break;
                };
                let executor = executor.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    task.run(executor).await;
                }));
            }
            for handle in handles {
                let _ = handle.await;
            }
            hooks.post_job().await;
            debug!(job = %id, "all host tasks complete");
        }));
    }

    /// Block until every host task and the post_job hooks have completed,
    /// or until `timeout` elapses. On success returns the aggregate return
    /// code: the first non-zero code in submission order, else 0.
    ///
    /// A wait timeout fails only the wait; in-flight tasks keep running and
    /// a later `wait` can still collect the result.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<i32, JobError> {
        let handle = self.finalizer.as_mut().ok_or(JobError::NotStarted)?;

        let joined = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut *handle)
                .await
                .map_err(|_| JobError::WaitTimeout(limit))?,
            None => (&mut *handle).await,
        };
        // Only a finished finalizer is consumed; a timed-out wait leaves
        // the handle in place for the retry.
        self.finalizer = None;
        joined.map_err(|err| JobError::Join(err.to_string()))?;

        Ok(self.aggregate_rc())
    }

    fn aggregate_rc(&self) -> i32 {
        for task in &self.tasks {
            match task.return_code() {
                Some(rc) if rc != 0 => return rc,
                _ => {}
            }
        }
        0
    }
}
