use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ExecutorSpec;
use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::hook::Hook;

type HookFactory = Box<dyn Fn() -> Arc<dyn Hook> + Send + Sync>;
type ExecutorFactory = Box<dyn Fn(&ExecutorSpec) -> Result<Arc<dyn Executor>, ExecutorError> + Send + Sync>;

/// Name -> factory registry for hooks and executor backends. The core only
/// consumes it; front ends decide what goes in and how names are found.
#[derive(Default)]
pub struct Registry {
    hooks: HashMap<String, HookFactory>,
    executors: HashMap<String, ExecutorFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hook<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Hook> + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Box::new(factory));
    }

    pub fn register_executor<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ExecutorSpec) -> Result<Arc<dyn Executor>, ExecutorError> + Send + Sync + 'static,
    {
        self.executors.insert(name.into(), Box::new(factory));
    }

    pub fn hook(&self, name: &str) -> Result<Arc<dyn Hook>, ExecutorError> {
        self.hooks
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ExecutorError::HookNotFound(name.to_string()))
    }

    /// Instantiate the backend named by the spec. Job-level construction
    /// failures surface here, before any host task exists.
    pub fn executor(&self, spec: &ExecutorSpec) -> Result<Arc<dyn Executor>, ExecutorError> {
        let factory = self
            .executors
            .get(&spec.name)
            .ok_or_else(|| ExecutorError::ExecutorNotFound(spec.name.clone()))?;
        factory(spec)
    }

    pub fn hook_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn executor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::TranscriptHook;

    #[test]
    fn unknown_names_are_errors() {
        let registry = Registry::new();
        assert!(matches!(
            registry.hook("nope"),
            Err(ExecutorError::HookNotFound(_))
        ));
        assert!(matches!(
            registry.executor(&ExecutorSpec::new("nope")),
            Err(ExecutorError::ExecutorNotFound(_))
        ));
    }

    #[test]
    fn registered_hook_is_constructed_per_call() {
        let mut registry = Registry::new();
        registry.register_hook("transcript", || Arc::new(TranscriptHook::new()));
        let first = registry.hook("transcript").unwrap();
        let second = registry.hook("transcript").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
