use tracing::info;

/// Receives single-line, human-readable progress messages from the migrator.
pub trait ProgressSink {
    fn report(&self, message: &str);
}

/// Discards every message. The migrator's default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _message: &str) {}
}

/// Forwards messages to the `tracing` subscriber at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, message: &str) {
        info!(target: "tidemark::progress", "{message}");
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&str),
{
    fn report(&self, message: &str) {
        self(message)
    }
}
