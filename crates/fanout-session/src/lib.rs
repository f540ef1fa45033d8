//! libssh2-backed session executor: same streaming and timeout contract as
//! the subprocess backend, different transport. The blocking libssh2 work
//! runs on the blocking pool; cancellation abandons that worker, which the
//! session's own timeout then tears down.

pub mod session_executor;

pub use session_executor::SessionExecutor;
