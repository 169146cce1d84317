use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(90);

/// Indefinite stderr spinner shown while a scan or connection is pending.
#[derive(Debug)]
pub(crate) struct Spinner {
    enabled: bool,
}

impl Spinner {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Awaits `operation`, rendering `message` beside a spinner when enabled.
    pub(crate) async fn run<T>(&self, message: &str, operation: impl Future<Output = T>) -> T {
        if !self.enabled {
            return operation.await;
        }

        let spinner = ProgressBar::new_spinner()
            .with_style(spinner_style())
            .with_message(message.to_string());
        spinner.enable_steady_tick(TICK_INTERVAL);
        let result = operation.await;
        spinner.finish_and_clear();
        result
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}
