use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::executor::Stream;

/// Lifecycle observer. All callbacks default to no-ops so implementations
/// override only the events they care about. Hooks cannot alter control
/// flow; side effects only.
///
/// `update_host`/`post_host` for *different* hosts may run concurrently, so
/// hooks keeping cross-host state must synchronize it themselves. Calls for
/// any single host are serialized by that host's task.
#[async_trait::async_trait]
pub trait Hook: Send + Sync {
    async fn pre_job(&self, _command: &[String], _hosts: &[String], _at: DateTime<Utc>) {}

    async fn pre_host(&self, _hostname: &str, _at: DateTime<Utc>) {}

    async fn update_host(&self, _hostname: &str, _stream: Stream, _line: &str) {}

    async fn post_host(&self, _hostname: &str, _rc: i32, _at: DateTime<Utc>) {}

    async fn post_job(&self, _at: DateTime<Utc>) {}
}

/// Immutable, ordered hook list shared by reference across all host tasks.
/// Dispatch is sequential in registration order for every event, so a slow
/// hook delays the hooks after it.
#[derive(Clone, Default)]
pub struct HookSet {
    hooks: Arc<Vec<Arc<dyn Hook>>>,
}

impl HookSet {
    pub fn new(hooks: Vec<Arc<dyn Hook>>) -> Self {
        Self {
            hooks: Arc::new(hooks),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub async fn pre_job(&self, command: &[String], hosts: &[String]) {
        let at = Utc::now();
        for hook in self.hooks.iter() {
            hook.pre_job(command, hosts, at).await;
        }
    }

    pub async fn pre_host(&self, hostname: &str) {
        let at = Utc::now();
        for hook in self.hooks.iter() {
            hook.pre_host(hostname, at).await;
        }
    }

    pub async fn update_host(&self, hostname: &str, stream: Stream, line: &str) {
        for hook in self.hooks.iter() {
            hook.update_host(hostname, stream, line).await;
        }
    }

    pub async fn post_host(&self, hostname: &str, rc: i32) {
        let at = Utc::now();
        for hook in self.hooks.iter() {
            hook.post_host(hostname, rc, at).await;
        }
    }

    pub async fn post_job(&self) {
        let at = Utc::now();
        for hook in self.hooks.iter() {
            hook.post_job(at).await;
        }
    }
}
