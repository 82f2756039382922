//! On-demand progress reporting
//!
//! A [`Trigger`] is a push channel of "print progress now" signals. The
//! reporter task waits on it for the lifetime of one batch and prints a
//! snapshot through the batch [`Console`] whenever a signal arrives.

use std::io::BufRead;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::console::Console;

/// Receiving side of a progress signal source.
pub struct Trigger {
    rx: mpsc::Receiver<()>,
}

/// Sending side handed to whatever produces the signals.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Request a report. Returns false if the signal was dropped because one
    /// is already pending or the reporter is gone.
    pub fn fire(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

impl Trigger {
    /// A programmatic source.
    pub fn channel() -> (TriggerHandle, Trigger) {
        // one pending signal is enough; extra presses while busy are dropped
        let (tx, rx) = mpsc::channel(1);
        (TriggerHandle { tx }, Trigger { rx })
    }

    /// A source that never fires, for headless runs.
    pub fn none() -> Self {
        let (_, trigger) = Self::channel();
        trigger
    }

    /// Fire on every newline read from the operator's terminal.
    ///
    /// Reading stdin blocks, so this runs on a detached OS thread rather than
    /// on the runtime. The thread ends at EOF or on the first keypress after
    /// the trigger was dropped.
    pub fn stdin() -> Self {
        let (handle, trigger) = Self::channel();
        let spawned = std::thread::Builder::new()
            .name("kxctl-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match stdin.lock().read_until(b'\n', &mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            if handle.tx.is_closed() {
                                break;
                            }
                            handle.fire();
                        }
                    }
                }
            });

        if let Err(e) = spawned {
            tracing::warn!("progress reporting disabled, cannot read stdin: {e}");
        }
        trigger
    }

    /// Stdin-backed when stdin is a terminal, otherwise inert.
    pub fn interactive() -> Self {
        if atty::is(atty::Stream::Stdin) {
            Self::stdin()
        } else {
            tracing::debug!("stdin is not a terminal; progress reporting disabled");
            Self::none()
        }
    }
}

/// Spawn the reporter for one batch. It exits once `stop` is cancelled.
pub fn spawn(console: Console, mut trigger: Trigger, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                signal = trigger.rx.recv() => match signal {
                    Some(()) => console.print_progress(),
                    // source gone; nothing left to wait for but the stop signal
                    None => {
                        stop.cancelled().await;
                        break;
                    }
                },
            }
        }
        tracing::trace!("progress reporter stopped");
    })
}
