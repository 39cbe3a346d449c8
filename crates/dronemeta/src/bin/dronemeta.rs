//! dronemeta - batch metadata extraction and reporting for drone flight videos.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use dronemeta::batch::{summarize, BatchProcessor, CheckpointStore, LogProgress};
use dronemeta::config::{load_config, Config};
use dronemeta::flight::{
    batch_summary, scan_flight_directory, write_batch_reports, write_report, FlightProcessor,
    FlightReport, ReportFormat,
};
use dronemeta::formatter::MissionOrganizer;
use dronemeta::models::VideoAnalysisResult;
use dronemeta::pipeline::{analyze_file, JobRunner, Pipeline};
use dronemeta::storage::write_atomic;

#[derive(Parser)]
#[command(
    name = "dronemeta",
    version,
    about = "Extract, classify and document drone flight videos in parallel batches"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum FlightReportFormat {
    Json,
    Csv,
    Markdown,
}

impl From<FlightReportFormat> for ReportFormat {
    fn from(format: FlightReportFormat) -> Self {
        match format {
            FlightReportFormat::Json => ReportFormat::Json,
            FlightReportFormat::Csv => ReportFormat::Csv,
            FlightReportFormat::Markdown => ReportFormat::Markdown,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process every video under the given files and directories
    Batch(BatchArgs),

    /// Analyze one video and print the result as JSON
    Probe {
        file: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the summary of a saved checkpoint
    Summary { checkpoint: PathBuf },

    /// Build a flight report from one directory of telemetry and media
    Flight(FlightArgs),

    /// Build flight reports for every flight directory under a parent
    Flights(FlightsArgs),

    /// List the telemetry and media found in a flight directory
    Scan { directory: PathBuf },
}

#[derive(Args)]
struct FlightArgs {
    directory: PathBuf,

    #[arg(long, value_enum, default_value_t = FlightReportFormat::Json)]
    format: FlightReportFormat,

    /// Report path; named after the directory and the clock when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML or JSON config file with the bay definitions
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct FlightsArgs {
    parent: PathBuf,

    #[arg(long, value_enum, default_value_t = FlightReportFormat::Json)]
    format: FlightReportFormat,

    /// Directory for the reports
    #[arg(short, long, default_value = "flight_reports")]
    output: PathBuf,

    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip batch_summary.json
    #[arg(long)]
    no_summary: bool,
}

#[derive(Args)]
struct BatchArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Resume or name a batch; generated from the clock when omitted
    #[arg(long)]
    batch_id: Option<String>,

    /// Output directory (overrides the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML or JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Ignore any existing checkpoint
    #[arg(long)]
    no_resume: bool,

    /// Regenerate outputs that already exist
    #[arg(long)]
    overwrite: bool,

    /// Write the summary JSON here instead of stdout
    #[arg(long)]
    summary_file: Option<PathBuf>,

    /// Copy outputs into per-mission folders after the batch
    #[arg(long)]
    organize: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format)?;

    match cli.command {
        Commands::Batch(args) => run_batch(args),
        Commands::Probe { file, config } => run_probe(&file, config.as_deref()),
        Commands::Summary { checkpoint } => run_summary(&checkpoint),
        Commands::Flight(args) => run_flight(args),
        Commands::Flights(args) => run_flights(args),
        Commands::Scan { directory } => run_scan(&directory),
    }
}

fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .context("Failed to set tracing subscriber")
}

fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn run_batch(args: BatchArgs) -> Result<ExitCode> {
    let mut config = load_or_default(args.config.as_deref())?;
    if let Some(output) = args.output {
        config.output.directory = output;
    }
    if let Some(workers) = args.workers {
        config.batch.max_workers = workers;
    }
    if args.no_resume {
        config.batch.enable_resume = false;
    }
    if args.overwrite {
        config.batch.overwrite_existing = true;
    }
    if args.organize {
        config.output.organize_by_mission = true;
    }

    let pipeline = Arc::new(Pipeline::from_config(&config).context("Invalid classifier rules")?);
    let runner: Arc<dyn JobRunner> = pipeline.clone();
    let processor = BatchProcessor::new(&config, runner, Arc::new(LogProgress))?;

    let shutdown = processor.shutdown_handle();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing in-flight videos");
        shutdown.store(true, Ordering::Relaxed);
    })
    .context("Failed to install Ctrl-C handler")?;

    let progress = processor.process_batch(args.paths.as_slice(), args.batch_id.as_deref())?;

    // Completed jobs restored from a checkpoint carry no analysis in memory.
    let results: Vec<VideoAnalysisResult> = progress
        .jobs()
        .iter()
        .filter(|job| job.status == dronemeta::worker::JobStatus::Completed)
        .filter_map(|job| match &job.result {
            Some(result) => Some(result.clone()),
            None => pipeline
                .analyze(&job.video_path)
                .map_err(|e| warn!("Leaving {} out of dataset files: {}", job.file_name(), e))
                .ok(),
        })
        .collect();
    let dataset_files = pipeline.formatters().format_batch(&results);
    info!("Wrote {} dataset files", dataset_files.len());

    if config.output.organize_by_mission {
        let organizer = MissionOrganizer::from_config(&config, config.batch.overwrite_existing);
        organizer
            .organize(&results, |result| {
                pipeline.formatters().planned_outputs(&result.video.path)
            })
            .with_context(|| format!("Failed to organize into {}", organizer.root().display()))?;
    }

    let summary = summarize(&progress);
    let json = serde_json::to_string_pretty(&summary)?;
    match &args.summary_file {
        Some(path) => {
            write_atomic(path, json.as_bytes())
                .with_context(|| format!("Failed to write summary to {}", path.display()))?;
            info!("Summary written to {}", path.display());
        }
        None => println!("{}", json),
    }

    if progress.failed() > 0 || progress.pending() > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn run_probe(file: &Path, config: Option<&Path>) -> Result<ExitCode> {
    let config = load_or_default(config)?;
    let result = analyze_file(&config, file)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(ExitCode::SUCCESS)
}

fn run_summary(checkpoint: &Path) -> Result<ExitCode> {
    let Some(progress) = CheckpointStore::new(checkpoint).read()? else {
        bail!("No checkpoint at {}", checkpoint.display());
    };
    println!("{}", serde_json::to_string_pretty(&summarize(&progress))?);
    Ok(ExitCode::SUCCESS)
}

fn print_flight_summary(report: &FlightReport) {
    let metrics = &report.metrics;
    println!("Flight:     {}", report.flight_id);
    println!("Bay:        {}", report.bay_id().unwrap_or("unidentified"));
    println!(
        "Inspection: {} ({:.0}% via {})",
        report.inspection.inspection_type,
        report.inspection.confidence * 100.0,
        report.inspection.basis
    );
    println!("Duration:   {:.1} min", metrics.duration_seconds / 60.0);
    println!("Distance:   {:.2} mi", metrics.total_distance_miles);
    println!("Quality:    {:.2} ({})", report.quality.overall, report.grade);
    println!("Anomalies:  {}", report.anomalies.len());
}

fn run_flight(args: FlightArgs) -> Result<ExitCode> {
    let config = load_or_default(args.config.as_deref())?;
    let format = ReportFormat::from(args.format);
    let report = FlightProcessor::new(config.flight)
        .process_directory(&args.directory)
        .with_context(|| format!("Failed to process {}", args.directory.display()))?;

    let path = args.output.unwrap_or_else(|| {
        let directory_name = args
            .directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "flight".to_string());
        PathBuf::from(format!(
            "flight_report_{}_{}.{}",
            directory_name,
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            format.extension()
        ))
    });
    write_report(&report, &path, format)?;

    print_flight_summary(&report);
    println!("Report:     {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn run_flights(args: FlightsArgs) -> Result<ExitCode> {
    let config = load_or_default(args.config.as_deref())?;
    let format = ReportFormat::from(args.format);
    let reports = FlightProcessor::new(config.flight)
        .process_batch_directories(&args.parent)
        .with_context(|| format!("Failed to process flights under {}", args.parent.display()))?;

    let written = write_batch_reports(&reports, &args.output, format, !args.no_summary)?;
    info!("Wrote {} flight files to {}", written.len(), args.output.display());

    let summary = batch_summary(&reports);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::SUCCESS)
}

fn run_scan(directory: &Path) -> Result<ExitCode> {
    let dataset = scan_flight_directory(directory)
        .with_context(|| format!("Failed to scan {}", directory.display()))?;

    println!("Directory:       {}", dataset.directory.display());
    println!(
        "Bay:             {}",
        dataset.bay_id.as_deref().unwrap_or("unidentified")
    );
    println!(
        "Inspection:      {}",
        dataset
            .inspection_type
            .or(dataset.inferred_inspection())
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!("Airdata logs:    {}", dataset.airdata_files.len());
    println!("SRT files:       {}", dataset.srt_files.len());
    println!(
        "Media files:     {} ({} videos, {} photos)",
        dataset.media_files.len(),
        dataset.video_count(),
        dataset.photo_count()
    );
    println!("Flight records:  {}", dataset.flight_record_files.len());

    println!("\nCompleteness:");
    for (name, passed) in dataset.completeness().checks() {
        println!("  [{}] {}", if passed { "x" } else { " " }, name);
    }

    let recommendations = dataset.recommendations();
    if !recommendations.is_empty() {
        println!("\nRecommendations:");
        for recommendation in recommendations {
            println!("  - {}", recommendation);
        }
    }
    Ok(ExitCode::SUCCESS)
}
