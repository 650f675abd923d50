use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Bar when the frame total is known, spinner otherwise.
pub fn build_progress(total_frames: Option<u64>) -> ProgressBar {
    let progress = match total_frames {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {percent:>3}% {pos}/{len} frames [{elapsed_precise}<{eta_precise}]",
                )
                .unwrap(),
            );
            bar
        }
        None => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner:.cyan.bold} [{elapsed_precise}] frames {pos}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
            spinner
        }
    };
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}
