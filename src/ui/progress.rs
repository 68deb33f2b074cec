use indicatif::{ProgressBar, ProgressStyle};

/// Bar over the scheduled run time in seconds; the message carries live stats.
pub fn create_run_bar(total_secs: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_secs);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("▕{bar:25}▏ {pos}s/{len}s • {wide_msg}")
            .expect("Invalid progress template")
            .progress_chars("█░ "),
    );
    pb
}
