use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct CompressionStats {
    pub processed_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub skipped_count: Arc<AtomicU64>,
    pub over_target_count: Arc<AtomicU64>,
    pub original_size: Arc<AtomicU64>,
    pub compressed_size: Arc<AtomicU64>,
    format_stats: Arc<Mutex<HashMap<String, u64>>>,
    errors: Arc<Mutex<Vec<ErrorRecord>>>,
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub file_path: String,
    pub error_message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CompressionStats {
    pub fn new() -> Self {
        Self {
            processed_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            skipped_count: Arc::new(AtomicU64::new(0)),
            over_target_count: Arc::new(AtomicU64::new(0)),
            original_size: Arc::new(AtomicU64::new(0)),
            compressed_size: Arc::new(AtomicU64::new(0)),
            format_stats: Arc::new(Mutex::new(HashMap::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record_success(&self, original_size: u64, compressed_size: u64, target_met: bool) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        self.original_size.fetch_add(original_size, Ordering::Relaxed);
        self.compressed_size.fetch_add(compressed_size, Ordering::Relaxed);
        if !target_met {
            self.over_target_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self, file_path: String, error: String) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(ErrorRecord {
                file_path,
                error_message: error,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    pub fn record_skip(&self) {
        self.skipped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_format(&self, format: &str) {
        if let Ok(mut stats) = self.format_stats.lock() {
            *stats.entry(format.to_string()).or_insert(0) += 1;
        }
    }

    /// Output bytes over input bytes; 0.0 before anything was written.
    pub fn get_compression_ratio(&self) -> f64 {
        let original = self.original_size.load(Ordering::Relaxed) as f64;
        let compressed = self.compressed_size.load(Ordering::Relaxed) as f64;

        if original > 0.0 {
            compressed / original
        } else {
            0.0
        }
    }

    pub fn get_format_stats(&self) -> HashMap<String, u64> {
        self.format_stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub fn get_errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .map(|errors| {
                errors
                    .iter()
                    .map(|e| format!("{}: {}", e.file_path, e.error_message))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Files that finished, successfully or not.
    pub fn completed(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
            + self.error_count.load(Ordering::Relaxed)
            + self.skipped_count.load(Ordering::Relaxed)
    }
}

impl Default for CompressionStats {
    fn default() -> Self {
        Self::new()
    }
}
