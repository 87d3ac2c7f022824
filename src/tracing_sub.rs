//! Tracing setup shared by the binaries.
//!
//! Focus transitions are logged from the dispatch thread while callers log
//! from their own threads, so records carry thread names. When the terminal
//! is owned by an interactive view, records go to the in-process log buffer
//! instead of stderr.

use std::io::{self, Write};

use tracing::Level;

use crate::log_buffer::{LogBufferHandle, LogBufferWriter, global_log_buffer};

/// Where formatted records end up.
#[derive(Clone, Debug, Default)]
pub struct LogSink {
    buffer: Option<LogBufferHandle>,
}

impl LogSink {
    /// Follow the global log buffer, falling back to stderr while none is
    /// registered. Resolved per record, so a buffer registered after
    /// initialization is picked up.
    pub fn global() -> Self {
        Self { buffer: None }
    }

    pub fn to_buffer(handle: LogBufferHandle) -> Self {
        Self {
            buffer: Some(handle),
        }
    }

    fn resolve(&self) -> Option<LogBufferHandle> {
        self.buffer.clone().or_else(global_log_buffer)
    }
}

pub enum SinkWriter {
    Buffer(LogBufferWriter),
    Stderr(io::Stderr),
}

impl SinkWriter {
    fn inner(&mut self) -> &mut dyn Write {
        match self {
            SinkWriter::Buffer(w) => w as &mut dyn Write,
            SinkWriter::Stderr(s) => s,
        }
    }
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        match self.resolve() {
            Some(handle) => SinkWriter::Buffer(handle.writer()),
            None => SinkWriter::Stderr(io::stderr()),
        }
    }
}

/// Compact subscriber writing to `sink`. Colors are only emitted when the
/// records can end up on stderr.
pub fn subscriber(level: Level, sink: LogSink) -> impl tracing::Subscriber + Send + Sync {
    let ansi = sink.resolve().is_none();
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(sink)
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_names(true)
        .finish()
}

/// Install the global subscriber. Register the log buffer first when the
/// terminal belongs to a view. Later calls are no-ops.
pub fn init_with_level(level: Level) {
    let _ = tracing::subscriber::set_global_default(subscriber(level, LogSink::global()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_land_in_the_chosen_buffer() {
        let handle = LogBufferHandle::new(16);
        let sub = subscriber(Level::DEBUG, LogSink::to_buffer(handle.clone()));
        tracing::subscriber::with_default(sub, || {
            tracing::debug!(owner = 3, "focus owner changed");
            tracing::trace!("below the level");
        });
        let lines = handle.lines();
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("focus owner changed"));
        assert!(lines[0].contains("owner=3"));
        assert!(!lines[0].contains('\u{1b}'));
    }
}
