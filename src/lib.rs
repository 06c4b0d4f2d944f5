//! # imgpress
//!
//! Image compression library built around a size-targeting encode loop.
//!
//! Each image is re-encoded as JPEG, PNG or WebP at decreasing quality and,
//! after a few misses, decreasing resolution until it fits a byte budget or the
//! attempt budget runs out. Folder operations walk a directory tree and run the
//! loop on every supported image in parallel, with progress reporting.

pub mod compressor;
pub mod config;
pub mod core;
pub mod progress;
pub mod stats;
pub mod utils;
pub mod worker;

// Re-export commonly used types
pub use compressor::{CompressError, CompressionSettings, EncodedImage, SizeTargetCompressor};
pub use config::{CompressOptions, Config, ProfileConfig};
pub use core::ImgpressCore;
pub use progress::ProgressReporter;
pub use stats::CompressionStats;
pub use utils::{format_duration, is_valid_image_file, validate_image_file, ImageValidationError};
pub use worker::{JobEvent, JobHandle};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Summary of one operation, written out by [`generate_report`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompressionReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub operation: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub skipped_files: u64,
    /// Files written even though the attempt budget ran out above the target size.
    pub over_target_files: u64,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub files_per_second: f64,
    pub thread_count: usize,
    pub quality: u8,
    pub scale: f32,
    pub target_size: u64,
    pub max_attempts: u32,
    pub format_stats: HashMap<String, u64>,
    pub errors: Vec<String>,
}

/// Report output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
    Html,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
        }
    }

    /// Parse a format name as used in config files.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "html" => Some(ReportFormat::Html),
            _ => None,
        }
    }
}

/// Codecs the size-targeting loop can encode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    /// File extension written for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// Map a detected container format to a loop codec. Other formats pass through.
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            image::ImageFormat::Png => Some(OutputFormat::Png),
            image::ImageFormat::WebP => Some(OutputFormat::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => write!(f, "JPEG"),
            OutputFormat::Png => write!(f, "PNG"),
            OutputFormat::WebP => write!(f, "WEBP"),
        }
    }
}

/// The jobs a caller can run against the library.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Compress one image, keeping its format.
    CompressFile(PathBuf),
    /// Compress every supported image under a directory, keeping names and formats.
    CompressFolder(PathBuf),
    /// Re-encode one image to another format.
    ConvertFile { input: PathBuf, target: OutputFormat },
    /// Re-encode every supported image under a directory to another format.
    ConvertFolder { input: PathBuf, target: OutputFormat },
    /// Compress every image under a directory and name the outputs `<base>-<n>`.
    RenameFolder { input: PathBuf, base_name: String },
}

impl Operation {
    pub fn input(&self) -> &Path {
        match self {
            Operation::CompressFile(input) | Operation::CompressFolder(input) => input,
            Operation::ConvertFile { input, .. }
            | Operation::ConvertFolder { input, .. }
            | Operation::RenameFolder { input, .. } => input,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(
            self,
            Operation::CompressFolder(_)
                | Operation::ConvertFolder { .. }
                | Operation::RenameFolder { .. }
        )
    }

    /// Short name used in logs and reports.
    pub fn name(&self) -> String {
        match self {
            Operation::CompressFile(_) => "compress-file".to_string(),
            Operation::CompressFolder(_) => "compress-folder".to_string(),
            Operation::ConvertFile { target, .. } => format!("convert-file-{}", target.extension()),
            Operation::ConvertFolder { target, .. } => {
                format!("convert-folder-{}", target.extension())
            }
            Operation::RenameFolder { .. } => "rename-folder".to_string(),
        }
    }
}

/// Write `report` into `dir` as `imgpress_report.<ext>` and return the path.
pub fn generate_report(report: &CompressionReport, format: ReportFormat, dir: &Path) -> Result<PathBuf> {
    let report_path = dir.join(format!("imgpress_report.{}", format.extension()));
    match format {
        ReportFormat::Json => generate_json_report(report, &report_path)?,
        ReportFormat::Csv => generate_csv_report(report, &report_path)?,
        ReportFormat::Html => generate_html_report(report, &report_path)?,
    }
    log::info!("Report saved to: {}", report_path.display());
    Ok(report_path)
}

fn generate_json_report(report: &CompressionReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}

fn generate_csv_report(report: &CompressionReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report: {}", path.display()))?;

    let rows: Vec<(&str, String)> = vec![
        ("start_time", report.start_time.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ("end_time", report.end_time.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ("duration_seconds", format!("{:.3}", report.duration.as_secs_f64())),
        ("operation", report.operation.clone()),
        ("input_path", report.input_path.display().to_string()),
        ("output_dir", report.output_dir.display().to_string()),
        ("total_files", report.total_files.to_string()),
        ("processed_files", report.processed_files.to_string()),
        ("failed_files", report.failed_files.to_string()),
        ("skipped_files", report.skipped_files.to_string()),
        ("over_target_files", report.over_target_files.to_string()),
        ("original_size_bytes", report.original_size.to_string()),
        ("compressed_size_bytes", report.compressed_size.to_string()),
        ("compression_ratio", format!("{:.4}", report.compression_ratio)),
        ("files_per_second", format!("{:.2}", report.files_per_second)),
        ("thread_count", report.thread_count.to_string()),
        ("quality", report.quality.to_string()),
        ("scale", format!("{:.2}", report.scale)),
        ("target_size_bytes", report.target_size.to_string()),
        ("max_attempts", report.max_attempts.to_string()),
    ];

    writer.write_record(["metric", "value"])?;
    for (metric, value) in rows {
        writer.write_record([metric, value.as_str()])?;
    }
    for error in &report.errors {
        writer.write_record(["error", error.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn generate_html_report(report: &CompressionReport, path: &Path) -> Result<()> {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>imgpress Report</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        .header {{ color: #2c3e50; }}
        .stats {{ background: #f8f9fa; padding: 20px; border-radius: 5px; }}
        .metric {{ margin: 10px 0; }}
        .success {{ color: #27ae60; }}
        .error {{ color: #e74c3c; }}
    </style>
</head>
<body>
    <h1 class="header">imgpress Report: {}</h1>
    <div class="stats">
        <div class="metric"><strong>Duration:</strong> {:.1} seconds</div>
        <div class="metric"><strong>Files Processed:</strong> <span class="success">{}</span></div>
        <div class="metric"><strong>Files Failed:</strong> <span class="error">{}</span></div>
        <div class="metric"><strong>Files Skipped:</strong> {}</div>
        <div class="metric"><strong>Over Target Size:</strong> {}</div>
        <div class="metric"><strong>Size Ratio:</strong> {:.2}%</div>
        <div class="metric"><strong>Processing Speed:</strong> {:.2} files/sec</div>
        <div class="metric"><strong>Quality:</strong> {}</div>
        <div class="metric"><strong>Target Size:</strong> {} bytes</div>
    </div>
</body>
</html>"#,
        report.operation,
        report.duration.as_secs_f64(),
        report.processed_files,
        report.failed_files,
        report.skipped_files,
        report.over_target_files,
        report.compression_ratio * 100.0,
        report.files_per_second,
        report.quality,
        report.target_size,
    );

    std::fs::write(path, html)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> CompressionReport {
        let now = Utc::now();
        CompressionReport {
            start_time: now,
            end_time: now,
            duration: Duration::from_millis(1500),
            operation: "compress-folder".to_string(),
            input_path: PathBuf::from("photos"),
            output_dir: PathBuf::from("photos/compressed"),
            total_files: 3,
            processed_files: 2,
            failed_files: 1,
            skipped_files: 0,
            over_target_files: 1,
            original_size: 300_000,
            compressed_size: 40_000,
            compression_ratio: 40_000.0 / 300_000.0,
            files_per_second: 2.0,
            thread_count: 4,
            quality: 75,
            scale: 1.0,
            target_size: 20 * 1024,
            max_attempts: 5,
            format_stats: HashMap::from([("jpg".to_string(), 2)]),
            errors: vec!["photos/bad.jpg: decode failed".to_string()],
        }
    }

    #[test]
    fn output_format_maps_detected_formats() {
        assert_eq!(
            OutputFormat::from_image_format(image::ImageFormat::Jpeg),
            Some(OutputFormat::Jpeg)
        );
        assert_eq!(
            OutputFormat::from_image_format(image::ImageFormat::WebP),
            Some(OutputFormat::WebP)
        );
        assert_eq!(OutputFormat::from_image_format(image::ImageFormat::Bmp), None);
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
    }

    #[test]
    fn operation_names_and_inputs() {
        let op = Operation::ConvertFolder {
            input: PathBuf::from("in"),
            target: OutputFormat::WebP,
        };
        assert_eq!(op.name(), "convert-folder-webp");
        assert!(op.is_folder());
        assert_eq!(op.input(), Path::new("in"));
        assert!(!Operation::CompressFile(PathBuf::from("a.png")).is_folder());
    }

    #[test]
    fn json_report_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate_report(&sample_report(), ReportFormat::Json, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "imgpress_report.json");

        let parsed: CompressionReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.processed_files, 2);
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn csv_report_lists_metrics_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate_report(&sample_report(), ReportFormat::Csv, dir.path()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert!(rows.iter().any(|r| &r[0] == "failed_files" && &r[1] == "1"));
        assert!(rows.iter().any(|r| &r[0] == "error" && r[1].contains("bad.jpg")));
    }

    #[test]
    fn report_format_parse() {
        assert_eq!(ReportFormat::parse("HTML"), Some(ReportFormat::Html));
        assert_eq!(ReportFormat::parse("xml"), None);
    }
}
