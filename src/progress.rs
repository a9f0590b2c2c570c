//! Stderr spinner shown while a warehouse call is in flight.

use std::future::Future;
use std::io::{IsTerminal, Write};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const INTERVAL: Duration = Duration::from_millis(100);

/// A running spinner. Call [`Spinner::stop`] before printing results so the
/// line is cleared first.
pub struct Spinner {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner unless disabled or stderr is not a terminal.
    pub fn start(message: &str, enabled: bool) -> Self {
        if !enabled || !std::io::stderr().is_terminal() {
            return Self::disabled();
        }
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(spin(message.to_string(), rx));
        Self {
            stop: Some(tx),
            task: Some(task),
        }
    }

    pub fn disabled() -> Self {
        Self {
            stop: None,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Signal the spinner task and wait until it has cleared its line.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn spin(message: String, mut stop: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(INTERVAL);
    let mut frame = 0usize;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let mut stderr = std::io::stderr().lock();
                let _ = write!(stderr, "\r{} {}", FRAMES[frame % FRAMES.len()], message);
                let _ = stderr.flush();
                frame += 1;
            }
        }
    }
    let width = message.chars().count() + 2;
    let mut stderr = std::io::stderr().lock();
    let _ = write!(stderr, "\r{}\r", " ".repeat(width));
    let _ = stderr.flush();
}

/// Run `fut` with a spinner, stopping it before returning the result.
pub async fn with_spinner<F, T>(message: &str, enabled: bool, fut: F) -> T
where
    F: Future<Output = T>,
{
    let spinner = Spinner::start(message, enabled);
    let result = fut.await;
    spinner.stop().await;
    result
}
