//! Spinner rendering for long-running stages.
//!
//! A [`Spinner`] is a background task that redraws a single console line on a
//! fixed interval. It is stopped through a oneshot channel and its task handle
//! is awaited, so once [`Spinner::stop`] returns the renderer can no longer
//! write. [`Progress::track`] wraps a future with a spinner and prints the
//! final status line only after the renderer has been joined.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::console::Console;

const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// A running spinner task.
pub struct Spinner {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Starts redrawing `label` every `interval`.
    pub fn start(console: Console, label: impl Into<String>, interval: Duration) -> Self {
        let label = label.into();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick
            let mut frames = FRAMES.iter().cycle();

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = tick.tick() => {
                        let frame = frames.next().copied().unwrap_or("-");
                        console.write(&format!("\r  {label} {frame}"));
                    }
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Signals the renderer to stop and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::debug!(error = %e, "Spinner task ended abnormally");
            }
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        // Only reached when the tracked future was dropped mid-flight.
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Console progress for pipeline stages.
#[derive(Debug, Clone)]
pub struct Progress {
    console: Console,
    interval: Duration,
}

impl Progress {
    pub fn new(console: Console, interval: Duration) -> Self {
        Self { console, interval }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Prints a one-off status line.
    pub fn step(&self, label: &str, detail: &str) {
        self.console.line(&format!("\r  {label} {detail}"));
    }

    /// Awaits `fut` while a spinner renders `label`, then prints the outcome.
    pub async fn track<F, T, E>(&self, label: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let spinner = Spinner::start(self.console.clone(), label, self.interval);
        let result = fut.await;
        spinner.stop().await;

        let status = if result.is_ok() { "done !" } else { "failed !" };
        self.step(label, status);
        result
    }
}
