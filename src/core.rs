use anyhow::{bail, Context, Result};
use chrono::Utc;
use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageFormat};
use rayon::prelude::*;
use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Instant;
use walkdir::WalkDir;

use crate::{
    compressor::{scaled_dimensions, SizeTargetCompressor},
    config::CompressOptions,
    progress::ProgressReporter,
    stats::CompressionStats,
    utils::{get_file_extension, is_supported_extension, validate_image_file, ImageValidationError},
    CompressionReport, Operation, OutputFormat,
};

/// How an output file is named inside its directory.
#[derive(Debug, Clone, PartialEq)]
enum Naming {
    /// Same file name as the input.
    KeepFileName,
    /// Input stem plus the output extension.
    Stem,
    /// `<base>-<index>` plus the output extension.
    Sequence { base: String, index: usize },
}

/// One image to process.
#[derive(Debug, Clone)]
struct Task {
    input: PathBuf,
    output_dir: PathBuf,
    naming: Naming,
    target: Option<OutputFormat>,
}

impl Task {
    fn output_path(&self, extension: &str) -> Result<PathBuf> {
        let name = match &self.naming {
            Naming::KeepFileName => self
                .input
                .file_name()
                .context("Failed to get filename")?
                .to_os_string(),
            Naming::Stem => {
                let mut name = self
                    .input
                    .file_stem()
                    .context("Failed to get file stem")?
                    .to_os_string();
                name.push(".");
                name.push(extension);
                name
            }
            Naming::Sequence { base, index } => OsString::from(format!("{base}-{index}.{extension}")),
        };
        Ok(self.output_dir.join(name))
    }
}

enum TaskOutcome {
    Written {
        output_path: PathBuf,
        original_size: u64,
        output_size: u64,
        target_met: bool,
    },
    Skipped,
}

/// Core engine that runs an [`Operation`] over one image or a directory tree
pub struct ImgpressCore {
    options: CompressOptions,
    stats: CompressionStats,
}

impl ImgpressCore {
    /// Create a new core engine with the given options
    pub fn new(options: CompressOptions) -> Self {
        Self {
            options,
            stats: CompressionStats::new(),
        }
    }

    pub fn options(&self) -> &CompressOptions {
        &self.options
    }

    /// Run an operation without progress reporting
    pub fn run(&mut self, operation: &Operation) -> Result<CompressionReport> {
        self.run_with_progress(operation, None)
    }

    /// Run an operation with progress reporting
    pub fn run_with_progress(
        &mut self,
        operation: &Operation,
        progress_reporter: Option<Box<dyn ProgressReporter>>,
    ) -> Result<CompressionReport> {
        let start_time = Instant::now();
        let start_time_utc = Utc::now();

        self.options.validate()?;
        if let Operation::RenameFolder { base_name, .. } = operation {
            validate_base_name(base_name)?;
        }

        let input = operation.input();
        if operation.is_folder() {
            if !input.is_dir() {
                bail!("Input directory not found: {}", input.display());
            }
        } else if !input.is_file() {
            bail!("Input file not found: {}", input.display());
        }

        // Setup thread pool (only if not already initialized)
        let threads = self.options.get_thread_count();
        if rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .is_err()
        {
            log::debug!("Thread pool already initialized, using existing configuration");
        }

        let output_dir = self.options.get_output_dir(input, operation.is_folder());
        if !self.options.dry_run {
            std::fs::create_dir_all(&output_dir).with_context(|| {
                format!("Failed to create output directory: {}", output_dir.display())
            })?;
        }

        self.stats = CompressionStats::new();

        let tasks = self.plan(operation, &output_dir)?;
        if tasks.is_empty() {
            log::warn!("No supported image files found in {}", input.display());
            if let Some(reporter) = &progress_reporter {
                reporter.set_total_files(0);
                reporter.finish_operation();
            }
            return Ok(self.create_empty_report(operation, start_time_utc, start_time, output_dir));
        }

        log::info!(
            "{}: {} image(s) from {} into {}",
            operation.name(),
            tasks.len(),
            input.display(),
            output_dir.display()
        );

        let reporter = progress_reporter.as_deref();
        if let Some(reporter) = reporter {
            reporter.set_total_files(tasks.len());
            reporter.start_operation();
        }

        let compressor = SizeTargetCompressor::new(self.options.settings());

        let engine = &*self;
        if operation.is_folder() {
            tasks.par_iter().for_each(|task| {
                // Failures are recorded in the stats; the batch carries on
                let _ = engine.execute(&compressor, task, reporter);
            });
        } else {
            for task in &tasks {
                engine.execute(&compressor, task, reporter)?;
            }
        }

        if let Some(reporter) = reporter {
            reporter.finish_operation();
        }

        let duration = start_time.elapsed();
        let processed = self.stats.processed_count.load(Ordering::Relaxed);

        Ok(CompressionReport {
            start_time: start_time_utc,
            end_time: Utc::now(),
            duration,
            operation: operation.name(),
            input_path: input.to_path_buf(),
            output_dir,
            total_files: tasks.len() as u64,
            processed_files: processed,
            failed_files: self.stats.error_count.load(Ordering::Relaxed),
            skipped_files: self.stats.skipped_count.load(Ordering::Relaxed),
            over_target_files: self.stats.over_target_count.load(Ordering::Relaxed),
            original_size: self.stats.original_size.load(Ordering::Relaxed),
            compressed_size: self.stats.compressed_size.load(Ordering::Relaxed),
            compression_ratio: self.stats.get_compression_ratio(),
            files_per_second: processed as f64 / duration.as_secs_f64().max(f64::EPSILON),
            thread_count: rayon::current_num_threads(),
            quality: self.options.quality,
            scale: self.options.scale,
            target_size: self.options.target_size,
            max_attempts: self.options.max_attempts,
            format_stats: self.stats.get_format_stats(),
            errors: self.stats.get_errors(),
        })
    }

    /// Expand an operation into per-image tasks
    fn plan(&self, operation: &Operation, output_dir: &Path) -> Result<Vec<Task>> {
        let tasks = match operation {
            Operation::CompressFile(input) => vec![Task {
                input: input.clone(),
                output_dir: output_dir.to_path_buf(),
                naming: Naming::Stem,
                target: None,
            }],
            Operation::ConvertFile { input, target } => vec![Task {
                input: input.clone(),
                output_dir: output_dir.to_path_buf(),
                naming: Naming::Stem,
                target: Some(*target),
            }],
            Operation::CompressFolder(input) => self
                .folder_tasks(input, output_dir)?
                .into_iter()
                .map(|(path, dir)| Task {
                    input: path,
                    output_dir: dir,
                    naming: Naming::KeepFileName,
                    target: None,
                })
                .collect(),
            Operation::ConvertFolder { input, target } => self
                .folder_tasks(input, output_dir)?
                .into_iter()
                .map(|(path, dir)| Task {
                    input: path,
                    output_dir: dir,
                    naming: Naming::Stem,
                    target: Some(*target),
                })
                .collect(),
            Operation::RenameFolder { input, base_name } => {
                let base = base_name.trim().to_string();
                self.folder_tasks(input, output_dir)?
                    .into_iter()
                    .enumerate()
                    .map(|(i, (path, dir))| Task {
                        input: path,
                        output_dir: dir,
                        naming: Naming::Sequence {
                            base: base.clone(),
                            index: i + 1,
                        },
                        target: None,
                    })
                    .collect()
            }
        };
        Ok(tasks)
    }

    /// Scan a folder and pair each image with the output directory mirroring its location
    fn folder_tasks(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
        scan_input_files(input_dir, output_dir)?
            .into_iter()
            .map(|path| {
                let relative_dir = path
                    .parent()
                    .and_then(|parent| parent.strip_prefix(input_dir).ok())
                    .with_context(|| {
                        format!(
                            "Input path {} is not under input directory {}",
                            path.display(),
                            input_dir.display()
                        )
                    })?
                    .to_path_buf();
                Ok((path, output_dir.join(relative_dir)))
            })
            .collect()
    }

    /// Process one task and record its outcome
    fn execute(
        &self,
        compressor: &SizeTargetCompressor,
        task: &Task,
        reporter: Option<&dyn ProgressReporter>,
    ) -> Result<()> {
        let result = self.process_task(compressor, task);
        let input_display = task.input.display().to_string();

        match &result {
            Ok(TaskOutcome::Written {
                output_path,
                original_size,
                output_size,
                target_met,
            }) => {
                self.stats.record_success(*original_size, *output_size, *target_met);
                log::debug!(
                    "{} -> {} ({} -> {} bytes)",
                    input_display,
                    output_path.display(),
                    original_size,
                    output_size
                );
                if let Some(reporter) = reporter {
                    reporter.report_success(&input_display, *original_size, *output_size);
                }
            }
            Ok(TaskOutcome::Skipped) => {
                self.stats.record_skip();
                log::debug!("Skipping {}: output exists", input_display);
            }
            Err(e) => {
                self.stats.record_error(input_display.clone(), format!("{e:#}"));
                log::error!("Failed to compress {}: {:#}", input_display, e);
                if let Some(reporter) = reporter {
                    reporter.report_error(&input_display, &format!("{e:#}"));
                }
            }
        }

        if let Some(reporter) = reporter {
            let done = self.stats.processed_count.load(Ordering::Relaxed)
                + self.stats.skipped_count.load(Ordering::Relaxed);
            reporter.update_progress(
                done as usize,
                self.stats.error_count.load(Ordering::Relaxed) as usize,
            );
        }

        result.map(|_| ())
    }

    fn process_task(&self, compressor: &SizeTargetCompressor, task: &Task) -> Result<TaskOutcome> {
        match validate_image_file(&task.input) {
            Ok(()) => {}
            Err(ImageValidationError::InvalidHeader) => log::warn!(
                "{} does not match its extension, detecting format from content",
                task.input.display()
            ),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Invalid image file: {}", task.input.display()));
            }
        }

        let bytes = std::fs::read(&task.input)
            .with_context(|| format!("Failed to read image: {}", task.input.display()))?;
        let original_size = bytes.len() as u64;

        // TGA has no magic number, so fall back to the extension
        let source_format = image::guess_format(&bytes)
            .or_else(|_| ImageFormat::from_path(&task.input))
            .with_context(|| format!("Unrecognized image format: {}", task.input.display()))?;
        let codec = task
            .target
            .or_else(|| OutputFormat::from_image_format(source_format));

        let extension = match codec {
            Some(codec) => codec.extension(),
            None => source_format
                .extensions_str()
                .first()
                .copied()
                .context("Image format has no file extension")?,
        };

        let output_path = task.output_path(extension)?;
        if self.options.skip_existing && output_path.exists() {
            return Ok(TaskOutcome::Skipped);
        }

        self.stats.record_format(extension_label(&task.input, source_format).as_str());

        let (data, target_met) = match codec {
            Some(codec) => {
                let image = self.decode(&bytes, source_format, &task.input)?;
                let encoded = compressor.compress(&image, codec).with_context(|| {
                    format!("Failed to encode {} as {}", task.input.display(), codec)
                })?;
                if !encoded.target_met {
                    log::warn!(
                        "{}: {} bytes after {} attempts, above target of {} bytes",
                        task.input.display(),
                        encoded.data.len(),
                        encoded.attempts,
                        compressor.settings().target_size
                    );
                }
                (encoded.data, encoded.target_met)
            }
            None if self.options.scale < 1.0 => {
                if source_format == ImageFormat::Gif && is_animated_gif(&bytes) {
                    log::warn!(
                        "{}: animated GIF is resized from its first frame only",
                        task.input.display()
                    );
                }
                let image = self.decode(&bytes, source_format, &task.input)?;
                let mut cursor = Cursor::new(Vec::new());
                image.write_to(&mut cursor, source_format).with_context(|| {
                    format!("Failed to re-encode {}", task.input.display())
                })?;
                (cursor.into_inner(), true)
            }
            None => (bytes, true),
        };

        let output_size = data.len() as u64;
        if !self.options.dry_run {
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            std::fs::write(&output_path, &data)
                .with_context(|| format!("Failed to write image: {}", output_path.display()))?;
        }

        Ok(TaskOutcome::Written {
            output_path,
            original_size,
            output_size,
            target_met,
        })
    }

    /// Decode and apply the user pre-scale
    fn decode(&self, bytes: &[u8], format: ImageFormat, path: &Path) -> Result<DynamicImage> {
        let image = image::load_from_memory_with_format(bytes, format)
            .with_context(|| format!("Failed to decode image: {}", path.display()))?;

        if self.options.scale >= 1.0 {
            return Ok(image);
        }

        let (width, height) = image.dimensions();
        let (new_width, new_height) = scaled_dimensions(width, height, self.options.scale);
        Ok(image.resize_exact(new_width, new_height, FilterType::Lanczos3))
    }

    /// Create an empty report for when no files are found
    fn create_empty_report(
        &self,
        operation: &Operation,
        start_time_utc: chrono::DateTime<Utc>,
        start_time: Instant,
        output_dir: PathBuf,
    ) -> CompressionReport {
        CompressionReport {
            start_time: start_time_utc,
            end_time: Utc::now(),
            duration: start_time.elapsed(),
            operation: operation.name(),
            input_path: operation.input().to_path_buf(),
            output_dir,
            total_files: 0,
            processed_files: 0,
            failed_files: 0,
            skipped_files: 0,
            over_target_files: 0,
            original_size: 0,
            compressed_size: 0,
            compression_ratio: 0.0,
            files_per_second: 0.0,
            thread_count: rayon::current_num_threads(),
            quality: self.options.quality,
            scale: self.options.scale,
            target_size: self.options.target_size,
            max_attempts: self.options.max_attempts,
            format_stats: std::collections::HashMap::new(),
            errors: vec!["No supported image files found in the specified directory".to_string()],
        }
    }

    /// Get statistics of the last run
    pub fn get_stats(&self) -> &CompressionStats {
        &self.stats
    }
}

/// Collect supported images under `input_dir`, sorted, never entering `output_dir`
pub fn scan_input_files(input_dir: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir
        .canonicalize()
        .unwrap_or_else(|_| output_dir.to_path_buf());
    let mut files = Vec::new();

    let walker = WalkDir::new(input_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let path = entry.path();
            let is_output = path == output_dir
                || path
                    .canonicalize()
                    .map(|canonical| canonical == output_dir)
                    .unwrap_or(false);
            !is_output
        });

    for entry in walker {
        let entry = entry.context("Failed to read directory entry")?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let supported = get_file_extension(path)
            .map(|ext| is_supported_extension(&ext))
            .unwrap_or(false);
        if supported {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Reject base names that are blank or would escape the output directory
pub fn validate_base_name(base_name: &str) -> Result<()> {
    let trimmed = base_name.trim();
    if trimmed.is_empty() {
        bail!("Base name for renamed files must not be empty");
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        bail!("Base name must be a plain file name: {trimmed}");
    }
    Ok(())
}

fn is_animated_gif(bytes: &[u8]) -> bool {
    GifDecoder::new(Cursor::new(bytes))
        .map(|decoder| decoder.into_frames().take(2).count() > 1)
        .unwrap_or(false)
}

fn extension_label(path: &Path, format: ImageFormat) -> String {
    get_file_extension(path).unwrap_or_else(|| {
        format
            .extensions_str()
            .first()
            .map(|ext| ext.to_string())
            .unwrap_or_default()
    })
}
