use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use imgpress::{
    config::{CompressOptions, Config},
    generate_report,
    progress::{ConsoleProgressReporter, ProgressReporter},
    worker, CompressionReport, JobEvent, Operation, OutputFormat, ReportFormat,
};

/// imgpress - compress images down to a target file size
#[derive(Parser)]
#[command(name = "imgpress")]
#[command(about = "imgpress - compress and convert images down to a target file size")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = r#"
imgpress re-encodes JPEG, PNG and WebP images at decreasing quality, palette size
and resolution until each file fits a byte budget or the attempt budget runs out.
Other formats (BMP, GIF, TIFF, ICO, TGA) are passed through.

Outputs go to a "compressed" folder next to the input unless --output is given.
"#)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Starting JPEG/WebP quality (clamped to 20-95)
    #[arg(short, long, global = true, value_name = "QUALITY",
          value_parser = clap::value_parser!(u8).range(0..=100))]
    pub quality: Option<u8>,

    /// Resize every image to this percentage before compressing
    #[arg(short, long, global = true, value_name = "PERCENT",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub scale: Option<u8>,

    /// Target file size in KiB
    #[arg(long, global = true, value_name = "KB")]
    pub target_size: Option<u64>,

    /// Maximum number of encode attempts per image
    #[arg(long, global = true, value_name = "NUM")]
    pub max_attempts: Option<u32>,

    /// Output directory (defaults to a "compressed" folder next to the input)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Number of parallel threads (defaults to CPU core count)
    #[arg(short, long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,

    /// Leave existing output files untouched
    #[arg(long, global = true)]
    pub skip_existing: bool,

    /// Compress without writing any files
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use a profile from the configuration file
    #[arg(long, global = true, value_name = "PROFILE")]
    pub profile: Option<String>,

    /// Verbose output mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no progress or summary)
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write a report into the output directory
    #[arg(long, global = true)]
    pub report: bool,

    /// Report output format
    #[arg(long, global = true, value_enum)]
    pub report_format: Option<ReportFormatArg>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compress one image or every image in a folder, keeping formats
    Compress {
        /// Image file or folder
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Convert one image or every image in a folder to another format
    Convert {
        /// Image file or folder
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Target format
        #[arg(long, value_enum)]
        to: TargetFormatArg,
    },
    /// Compress every image in a folder and name them <base>-1, <base>-2, ...
    Rename {
        /// Folder to process
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Base name for the numbered files
        #[arg(long, value_name = "NAME")]
        base_name: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TargetFormatArg {
    Png,
    #[value(alias = "jpg")]
    Jpeg,
    Webp,
}

impl From<TargetFormatArg> for OutputFormat {
    fn from(format: TargetFormatArg) -> Self {
        match format {
            TargetFormatArg::Png => OutputFormat::Png,
            TargetFormatArg::Jpeg => OutputFormat::Jpeg,
            TargetFormatArg::Webp => OutputFormat::WebP,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormatArg {
    Json,
    Csv,
    Html,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(format: ReportFormatArg) -> Self {
        match format {
            ReportFormatArg::Json => ReportFormat::Json,
            ReportFormatArg::Csv => ReportFormat::Csv,
            ReportFormatArg::Html => ReportFormat::Html,
        }
    }
}

fn main() -> Result<()> {
    if std::env::args().len() == 1 {
        print_banner();
        Args::command().print_help()?;
        println!();
        std::process::exit(0);
    }

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Some(Config::load(path)?),
        None => Config::load_default()?,
    };

    let output_config = config.as_ref().and_then(|c| c.output.as_ref());
    let verbose = args.verbose || output_config.and_then(|o| o.verbose).unwrap_or(false);
    let quiet = !args.verbose && (args.quiet || output_config.and_then(|o| o.quiet).unwrap_or(false));

    // Initialize logging
    if verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else if !quiet {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let options = resolve_options(&args, config.as_ref())?;
    let operation = build_operation(&args.command);

    let console = if quiet {
        None
    } else {
        print_banner();
        Some(ConsoleProgressReporter::new())
    };

    let handle = worker::spawn(options.clone(), operation)?;
    let report = handle.wait_with(|event| {
        if let Some(console) = &console {
            forward_event(console, event, verbose);
        }
    })?;

    if options.generate_report {
        let report_dir = if options.dry_run {
            Path::new(".")
        } else {
            report.output_dir.as_path()
        };
        generate_report(&report, options.report_format, report_dir)?;
    }

    if !quiet {
        print_results_summary(&report);
    }

    Ok(())
}

/// Defaults, then the config file, then the profile, then command-line flags
fn resolve_options(args: &Args, config: Option<&Config>) -> Result<CompressOptions> {
    let mut options = CompressOptions::new();

    if let Some(config) = config {
        options = config.apply(options)?;
    }

    if let Some(profile) = &args.profile {
        let config = config.context("--profile needs a configuration file")?;
        options = config.profile(profile)?.apply(options);
    }

    if let Some(quality) = args.quality {
        options = options.with_quality(quality);
    }
    if let Some(scale) = args.scale {
        options = options.with_scale(f32::from(scale) / 100.0);
    }
    if let Some(target_size) = args.target_size {
        options = options.with_target_size_kb(target_size);
    }
    if let Some(max_attempts) = args.max_attempts {
        options = options.with_max_attempts(max_attempts);
    }
    if let Some(output) = &args.output {
        options = options.with_output_dir(output.clone());
    }
    if let Some(threads) = args.threads {
        options = options.with_threads(threads);
    }
    if args.skip_existing {
        options = options.with_skip_existing(true);
    }
    if args.dry_run {
        options = options.with_dry_run(true);
    }
    if args.report {
        options.generate_report = true;
    }
    if let Some(format) = args.report_format {
        options.report_format = format.into();
    }

    options.validate()?;
    Ok(options)
}

fn build_operation(command: &Command) -> Operation {
    match command {
        Command::Compress { path } if path.is_dir() => Operation::CompressFolder(path.clone()),
        Command::Compress { path } => Operation::CompressFile(path.clone()),
        Command::Convert { path, to } if path.is_dir() => Operation::ConvertFolder {
            input: path.clone(),
            target: (*to).into(),
        },
        Command::Convert { path, to } => Operation::ConvertFile {
            input: path.clone(),
            target: (*to).into(),
        },
        Command::Rename { dir, base_name } => Operation::RenameFolder {
            input: dir.clone(),
            base_name: base_name.clone(),
        },
    }
}

fn forward_event(console: &ConsoleProgressReporter, event: &JobEvent, verbose: bool) {
    match event {
        JobEvent::Started { total } => {
            console.set_total_files(*total);
            console.start_operation();
        }
        JobEvent::Progress {
            processed, failed, ..
        } => console.update_progress(*processed, *failed),
        JobEvent::FileSucceeded {
            path,
            original_size,
            compressed_size,
        } if verbose => console.report_success(path, *original_size, *compressed_size),
        JobEvent::FileSucceeded { .. } => {}
        JobEvent::FileFailed { path, error } => console.report_error(path, error),
        JobEvent::Finished(_) | JobEvent::Failed(_) => console.finish_operation(),
    }
}

fn print_banner() {
    println!(
        r#"
  _
 (_)_ __ ___   __ _ _ __  _ __ ___  ___ ___
 | | '_ ` _ \ / _` | '_ \| '__/ _ \/ __/ __|
 | | | | | | | (_| | |_) | | |  __/\__ \__ \
 |_|_| |_| |_|\__, | .__/|_|  \___||___/___/
              |___/|_|

        Target-size image compressor v{}
    "#,
        env!("CARGO_PKG_VERSION")
    );
}

fn print_results_summary(report: &CompressionReport) {
    use humansize::{format_size, DECIMAL};

    println!("\n🎉 {} completed!", report.operation);
    println!("📊 Results Summary:");
    println!("  ✅ Processed: {} files", report.processed_files);
    if report.failed_files > 0 {
        println!("  ❌ Failed: {} files", report.failed_files);
    }
    if report.skipped_files > 0 {
        println!("  ⏭️ Skipped: {} files", report.skipped_files);
    }
    if report.over_target_files > 0 {
        println!(
            "  ⚠️ Above {} target: {} files",
            format_size(report.target_size, DECIMAL),
            report.over_target_files
        );
    }

    if report.original_size > 0 {
        println!("\n💾 Space Analysis:");
        println!("  📦 Original size: {}", format_size(report.original_size, DECIMAL));
        println!("  🗜️ Compressed size: {}", format_size(report.compressed_size, DECIMAL));
        println!(
            "  💾 Space saved: {:.1}%",
            (1.0 - report.compression_ratio) * 100.0
        );
    }

    println!("\n⏱️ Performance:");
    println!("  🕐 Duration: {}", imgpress::format_duration(report.duration));
    println!("  🚀 Speed: {:.1} files/sec", report.files_per_second);
    println!("  🧵 Threads used: {}", report.thread_count);
    println!("  📂 Output: {}", report.output_dir.display());

    if !report.errors.is_empty() && report.errors.len() <= 5 {
        println!("\n❌ Errors:");
        for error in &report.errors {
            println!("  • {}", error);
        }
    } else if report.errors.len() > 5 {
        println!("\n❌ {} errors occurred (use --report for full details)", report.errors.len());
    }
}
