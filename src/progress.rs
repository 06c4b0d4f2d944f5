/// Trait for reporting compression progress
///
/// The core engine calls into this from its worker threads, so implementations
/// must be thread-safe.
pub trait ProgressReporter: Send + Sync {
    /// Set the total number of files to be processed
    fn set_total_files(&self, total: usize);

    /// Update current progress
    fn update_progress(&self, processed: usize, failed: usize);

    /// Report that the operation has started
    fn start_operation(&self) {}

    /// Report that the operation has finished
    fn finish_operation(&self) {}

    /// Report an error for a specific file
    fn report_error(&self, _file_path: &str, _error: &str) {}

    /// Report successful compression of a file
    fn report_success(&self, _file_path: &str, _original_size: u64, _compressed_size: u64) {}
}

/// Integer percentage of `done` out of `total`; 0 for an empty batch.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (done.min(total) * 100 / total) as u8
}

/// Console-based progress reporter using indicatif
#[cfg(feature = "cli")]
pub struct ConsoleProgressReporter {
    progress_bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl ConsoleProgressReporter {
    pub fn new() -> Self {
        let progress_bar = indicatif::ProgressBar::new(0);
        let style = indicatif::ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {percent}% ({eta}) {msg}",
            )
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("#>-");
        progress_bar.set_style(style);

        Self { progress_bar }
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for ConsoleProgressReporter {
    fn set_total_files(&self, total: usize) {
        self.progress_bar.set_length(total as u64);
    }

    fn update_progress(&self, processed: usize, failed: usize) {
        self.progress_bar.set_position((processed + failed) as u64);
        if failed > 0 {
            self.progress_bar.set_message(format!("{failed} failed"));
        }
    }

    fn start_operation(&self) {
        self.progress_bar.set_message("Compressing images...");
    }

    fn finish_operation(&self) {
        self.progress_bar.finish_with_message("Done");
    }

    fn report_error(&self, file_path: &str, error: &str) {
        self.progress_bar
            .println(format!("❌ Error processing {file_path}: {error}"));
    }

    fn report_success(&self, file_path: &str, original_size: u64, compressed_size: u64) {
        let ratio = if original_size > 0 {
            (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0
        } else {
            0.0
        };

        self.progress_bar.println(format!(
            "✅ {} -> {} ({:.1}% reduction)",
            file_path,
            humansize::format_size(compressed_size, humansize::DECIMAL),
            ratio
        ));
    }
}
