//! The batch's single serialization point
//!
//! [`Console`] owns both the [`StatusBoard`] and the output sink behind one
//! mutex. Workers mark themselves running, then print their whole block and
//! mark themselves completed in one critical section, so a progress report
//! can never observe a status that disagrees with what has been printed.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::error::format_duration;
use super::runner::TaskOutput;
use super::status::{StatusBoard, StatusSnapshot};
use crate::filter::Pattern;

/// Destination for batch output: a line-oriented pair of streams.
pub trait OutputSink: Send {
    fn out(&mut self) -> &mut dyn Write;
    fn err(&mut self) -> &mut dyn Write;
}

/// Process stdout/stderr.
pub struct StdSink {
    out: io::Stdout,
    err: io::Stderr,
}

impl StdSink {
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            err: io::stderr(),
        }
    }
}

impl Default for StdSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for StdSink {
    fn out(&mut self) -> &mut dyn Write {
        &mut self.out
    }

    fn err(&mut self) -> &mut dyn Write {
        &mut self.err
    }
}

/// Cloneable in-memory byte buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that captures both streams in memory; clones share the buffers.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    pub out: SharedBuffer,
    pub err: SharedBuffer,
}

impl OutputSink for BufferSink {
    fn out(&mut self) -> &mut dyn Write {
        &mut self.out
    }

    fn err(&mut self) -> &mut dyn Write {
        &mut self.err
    }
}

struct ConsoleState {
    board: StatusBoard,
    sink: Box<dyn OutputSink>,
}

/// Lock-guarded status board plus output sink, shared by workers and the
/// progress reporter of one batch.
#[derive(Clone)]
pub struct Console {
    inner: Arc<Mutex<ConsoleState>>,
}

impl Console {
    pub fn new(board: StatusBoard, sink: Box<dyn OutputSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConsoleState { board, sink })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_running(&self, target: &str) {
        self.lock().board.mark_running(target, Instant::now());
    }

    /// Print a finished context's block and mark it completed.
    pub fn complete(&self, target: &str, output: &TaskOutput, filter: Option<&Pattern>) {
        let mut state = self.lock();
        if let Err(e) = write_block(state.sink.as_mut(), target, output, filter) {
            tracing::warn!("failed to write output for {target}: {e}");
        }
        state.board.mark_completed(target);
    }

    /// Print the progress report.
    pub fn print_progress(&self) {
        let mut state = self.lock();
        let snapshot = state.board.snapshot(Instant::now());
        let out = state.sink.out();
        if let Err(e) = write_progress(out, &snapshot).and_then(|_| out.flush()) {
            tracing::warn!("failed to write progress report: {e}");
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().board.snapshot(Instant::now())
    }
}

/// Write one context's output block.
///
/// ```text
/// Context: <name>
///   <line>
///   Error: <reason>        (error stream)
///
/// ```
pub fn write_block(
    sink: &mut dyn OutputSink,
    target: &str,
    output: &TaskOutput,
    filter: Option<&Pattern>,
) -> io::Result<()> {
    let out = sink.out();
    writeln!(out, "Context: {target}")?;
    for line in output.lines.iter().filter(|l| !l.is_empty()) {
        if filter.is_none_or(|p| p.is_match(line)) {
            writeln!(out, "  {line}")?;
        }
    }
    out.flush()?;

    if let Some(error) = &output.error {
        let err = sink.err();
        writeln!(err, "  {}", error.footer())?;
        err.flush()?;
    }

    let out = sink.out();
    writeln!(out)?;
    out.flush()
}

/// Write the progress report for a snapshot.
pub fn write_progress(out: &mut dyn Write, snapshot: &StatusSnapshot) -> io::Result<()> {
    writeln!(out, "\n--- Progress Status ---")?;
    writeln!(
        out,
        "Total: {}, Completed: {}, Running: {}, Queued: {}",
        snapshot.total, snapshot.completed, snapshot.running, snapshot.queued
    )?;

    if !snapshot.in_flight.is_empty() {
        writeln!(out, "\nCurrently running:")?;
        for (name, elapsed) in &snapshot.in_flight {
            let rounded = Duration::from_secs(elapsed.as_secs_f64().round() as u64);
            writeln!(
                out,
                "  {name} - running for {}",
                format_duration(rounded)
            )?;
        }
    }

    writeln!(out, "----------------------")
}
