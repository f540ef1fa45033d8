use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown executor: {0}")]
    ExecutorNotFound(String),

    #[error("unknown hook: {0}")]
    HookNotFound(String),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("job has not been started (call run_async first)")]
    NotStarted,

    #[error("wait timed out after {0:?}")]
    WaitTimeout(Duration),

    #[error("job task failed: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration ({path}): {detail}")]
    Invalid { path: String, detail: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}
