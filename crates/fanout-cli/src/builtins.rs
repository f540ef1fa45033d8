use std::sync::Arc;

use fanout_core::hooks::{JsonLinesHook, PrinterHook, ProgressHook, TraceHook};
use fanout_core::Registry;
use fanout_session::SessionExecutor;
use fanout_ssh::OpenSshExecutor;

/// Registry populated with every hook and executor shipped in-tree.
pub fn registry() -> Registry {
    let mut registry = Registry::new();

    registry.register_hook("printer", || Arc::new(PrinterHook::new()));
    registry.register_hook("machine-printer", || Arc::new(PrinterHook::prefixed()));
    registry.register_hook("jsonl", || Arc::new(JsonLinesHook::new()));
    registry.register_hook("progress", || Arc::new(ProgressHook::new()));
    registry.register_hook("trace", || Arc::new(TraceHook));

    registry.register_executor("ssh", |spec| Ok(Arc::new(OpenSshExecutor::from_spec(spec)?)));
    registry.register_executor("session", |spec| {
        Ok(Arc::new(SessionExecutor::from_spec(spec)?))
    });

    registry
}
