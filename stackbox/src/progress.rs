use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use stackbox_lib::stack::installer::types::ProgressReporter;
use std::sync::Mutex;
use std::time::Duration;

/// Terminal front end for the acquisition pipeline: one bar per step.
#[derive(Default)]
pub struct TerminalReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalReporter {
    fn current(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|bar| bar.clone())
    }

    /// Clear any bar so prompts and log lines are not drawn over.
    pub fn suspend(&self) {
        if let Some(bar) = self.bar.lock().ok().and_then(|mut bar| bar.take()) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn start_step(&self, name: &str) {
        self.suspend();
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {prefix:.bold} {msg}") {
            bar.set_style(style);
        }
        bar.set_prefix(name.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn update_bytes(&self, transferred: u64, total: Option<u64>) {
        let Some(bar) = self.current() else {
            return;
        };
        match total {
            Some(total) => {
                if bar.length() != Some(total) {
                    if let Ok(style) = ProgressStyle::with_template(
                        "{spinner:.cyan.bold} {prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} {eta}",
                    ) {
                        bar.set_style(style.progress_chars("=>-"));
                    }
                    bar.set_length(total);
                }
                bar.set_position(transferred);
            }
            None => bar.set_message(HumanBytes(transferred).to_string()),
        }
    }

    fn set_message(&self, message: &str) {
        match self.current() {
            Some(bar) => bar.set_message(message.to_string()),
            None => log::info!("{}", message),
        }
    }

    fn done(&self, success: bool, message: Option<&str>) {
        let Some(bar) = self.bar.lock().ok().and_then(|mut bar| bar.take()) else {
            return;
        };
        let prefix = bar.prefix();
        bar.finish_and_clear();
        match (success, message) {
            (true, _) => println!("  ok  {prefix}"),
            (false, Some(reason)) => println!("  !!  {prefix}: {reason}"),
            (false, None) => println!("  !!  {prefix}"),
        }
    }
}
