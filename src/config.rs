use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::compressor::{
    CompressionSettings, DEFAULT_MAX_ATTEMPTS, DEFAULT_QUALITY, DEFAULT_TARGET_SIZE,
};
use crate::ReportFormat;

/// Name of the directory created next to the input when no output dir is set.
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "compressed";

/// Main configuration structure loaded from config files
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub general: Option<GeneralConfig>,
    pub compression: Option<CompressionConfig>,
    pub output: Option<OutputConfig>,
    pub profiles: Option<HashMap<String, ProfileConfig>>,
}

/// Configuration profile for predefined settings
#[derive(Debug, Deserialize, Clone)]
pub struct ProfileConfig {
    pub description: Option<String>,
    pub quality: Option<u8>,
    pub scale: Option<f32>,
    pub target_size_kb: Option<u64>,
    pub max_attempts: Option<u32>,
    pub threads: Option<usize>,
    pub skip_existing: Option<bool>,
}

/// General configuration options
#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub output_dir: Option<String>,
    pub threads: Option<usize>,
    pub skip_existing: Option<bool>,
    pub dry_run: Option<bool>,
}

/// Compression-related configuration
#[derive(Debug, Deserialize)]
pub struct CompressionConfig {
    pub quality: Option<u8>,
    pub scale: Option<f32>,
    pub target_size_kb: Option<u64>,
    pub max_attempts: Option<u32>,
}

/// Output and reporting configuration
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    pub verbose: Option<bool>,
    pub quiet: Option<bool>,
    pub generate_report: Option<bool>,
    pub report_format: Option<String>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// `<config dir>/imgpress/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("imgpress").join("config.toml"))
    }

    /// Load the config at [`Config::default_path`] if the file exists.
    pub fn load_default() -> Result<Option<Self>> {
        match Self::default_path() {
            Some(path) if path.is_file() => {
                log::debug!("Loading config from {}", path.display());
                Self::load(&path).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn profile(&self, name: &str) -> Result<&ProfileConfig> {
        match self.profiles.as_ref().and_then(|profiles| profiles.get(name)) {
            Some(profile) => Ok(profile),
            None => bail!("Unknown profile: {name}"),
        }
    }

    /// Layer the file's settings over `options`.
    pub fn apply(&self, mut options: CompressOptions) -> Result<CompressOptions> {
        if let Some(general) = &self.general {
            if let Some(output_dir) = &general.output_dir {
                options.output_dir = Some(PathBuf::from(output_dir));
            }
            if let Some(threads) = general.threads {
                options.threads = Some(threads);
            }
            if let Some(skip_existing) = general.skip_existing {
                options.skip_existing = skip_existing;
            }
            if let Some(dry_run) = general.dry_run {
                options.dry_run = dry_run;
            }
        }

        if let Some(compression) = &self.compression {
            if let Some(quality) = compression.quality {
                options.quality = quality;
            }
            if let Some(scale) = compression.scale {
                options.scale = scale;
            }
            if let Some(target_size_kb) = compression.target_size_kb {
                options.target_size = target_size_kb * 1024;
            }
            if let Some(max_attempts) = compression.max_attempts {
                options.max_attempts = max_attempts;
            }
        }

        if let Some(output) = &self.output {
            if let Some(generate_report) = output.generate_report {
                options.generate_report = generate_report;
            }
            if let Some(format) = &output.report_format {
                options.report_format = ReportFormat::parse(format)
                    .with_context(|| format!("Unknown report format: {format}"))?;
            }
        }

        Ok(options)
    }
}

impl ProfileConfig {
    pub fn apply(&self, mut options: CompressOptions) -> CompressOptions {
        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        if let Some(scale) = self.scale {
            options.scale = scale;
        }
        if let Some(target_size_kb) = self.target_size_kb {
            options.target_size = target_size_kb * 1024;
        }
        if let Some(max_attempts) = self.max_attempts {
            options.max_attempts = max_attempts;
        }
        if let Some(threads) = self.threads {
            options.threads = Some(threads);
        }
        if let Some(skip_existing) = self.skip_existing {
            options.skip_existing = skip_existing;
        }
        options
    }
}

/// Options that can be passed to the core library
#[derive(Debug, Clone)]
pub struct CompressOptions {
    pub output_dir: Option<PathBuf>,
    pub quality: u8,
    /// Pre-scale applied to every image before the loop, in (0, 1].
    pub scale: f32,
    /// Target size in bytes.
    pub target_size: u64,
    pub max_attempts: u32,
    pub threads: Option<usize>,
    pub skip_existing: bool,
    pub dry_run: bool,
    pub generate_report: bool,
    pub report_format: ReportFormat,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            quality: DEFAULT_QUALITY,
            scale: 1.0,
            target_size: DEFAULT_TARGET_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            threads: None,
            skip_existing: false,
            dry_run: false,
            generate_report: false,
            report_format: ReportFormat::Json,
        }
    }
}

impl CompressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern for setting quality
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Builder pattern for setting the pre-scale factor
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Builder pattern for setting the target size in KiB
    pub fn with_target_size_kb(mut self, target_size_kb: u64) -> Self {
        self.target_size = target_size_kb * 1024;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Builder pattern for setting output directory
    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = Some(output_dir);
        self
    }

    /// Builder pattern for setting thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    /// Builder pattern for enabling dry run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            bail!("Scale must be in (0, 1], got {}", self.scale);
        }
        if self.target_size == 0 {
            bail!("Target size must be greater than zero");
        }
        if self.max_attempts == 0 {
            bail!("Max attempts must be at least 1");
        }
        if self.threads == Some(0) {
            bail!("Thread count must be at least 1");
        }
        Ok(())
    }

    pub fn settings(&self) -> CompressionSettings {
        CompressionSettings {
            quality: self.quality,
            target_size: self.target_size,
            max_attempts: self.max_attempts,
        }
    }

    /// Get the effective output directory for an input path.
    ///
    /// Without an explicit directory, folders get `<dir>/compressed` and single
    /// files get `<parent>/compressed`.
    pub fn get_output_dir(&self, input: &Path, input_is_folder: bool) -> PathBuf {
        if let Some(output_dir) = &self.output_dir {
            return output_dir.clone();
        }
        let base = if input_is_folder {
            input
        } else {
            input.parent().unwrap_or_else(|| Path::new("."))
        };
        base.join(DEFAULT_OUTPUT_DIR_NAME)
    }

    /// Get the effective thread count (calculated if not set)
    pub fn get_thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}
