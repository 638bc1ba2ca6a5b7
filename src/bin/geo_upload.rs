use std::path::PathBuf;
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use geo_upload_sanitizer::config::ConfigLoader;
use geo_upload_sanitizer::error::SanitizeError;
use geo_upload_sanitizer::extensions::ExtensionPolicy;
use geo_upload_sanitizer::inspector::HeaderInspector;
use geo_upload_sanitizer::output::{
    ClassifyEntry, JsonOutput, OutputMode, ShapefileReport, TracingProgress,
};
use geo_upload_sanitizer::quota::{LedgerQuotaStore, format_size};
use geo_upload_sanitizer::sanitizer::{Sanitizer, Submission};
use geo_upload_sanitizer::shapefile::missing_shapefile_parts;
use geo_upload_sanitizer::staging::OutputDirectory;
use geo_upload_sanitizer::upload::collect_uploads;

#[derive(Parser)]
#[command(name = "geo-upload")]
#[command(about = "Validate and stage geospatial uploads (shapefiles, rasters, nested zips)")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Flatten, validate and stage uploaded files")]
    Sanitize(SanitizeArgs),
    #[command(about = "Report shapefiles missing any of .shp/.dbf/.shx/.prj")]
    CheckShapefiles(NamesArgs),
    #[command(about = "Show how file names are classified by extension")]
    Classify(ClassifyArgs),
}

#[derive(Args)]
struct SanitizeArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    output_root: Option<Utf8PathBuf>,

    #[arg(long)]
    quota: Option<u64>,

    #[arg(long)]
    strict: bool,

    #[arg(long)]
    keep: bool,

    #[arg(long)]
    commit: bool,
}

#[derive(Args)]
struct NamesArgs {
    #[arg(required = true)]
    names: Vec<String>,
}

#[derive(Args)]
struct ClassifyArgs {
    #[arg(required = true)]
    names: Vec<String>,

    #[arg(long)]
    config: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SanitizeError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SanitizeError) -> u8 {
    match error {
        SanitizeError::QuotaExceeded { .. } | SanitizeError::IncompleteShapefileGroup { .. } => 2,
        SanitizeError::QuotaStore(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Sanitize(args) => run_sanitize(args, output_mode),
        Commands::CheckShapefiles(args) => run_check_shapefiles(args, output_mode),
        Commands::Classify(args) => run_classify(args, output_mode),
    }
}

fn run_sanitize(args: SanitizeArgs, output_mode: OutputMode) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(root) = args.output_root {
        config.output_root = Some(root);
    }
    if let Some(quota) = args.quota {
        config.quota_bytes = Some(quota);
    }
    if args.strict {
        config.strict_shapefile_validation = true;
    }

    let ledger_path = match &config.ledger_path {
        Some(path) => path.clone(),
        None => LedgerQuotaStore::default_path()?,
    };
    let ledger = LedgerQuotaStore::new(ledger_path);
    let user = args
        .user
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "anonymous".to_string());

    let uploads = collect_uploads(&args.paths)?;
    let sanitizer = Sanitizer::new(config, HeaderInspector, &ledger);
    let mut submission = sanitizer.sanitize(&user, uploads, &TracingProgress)?;

    let mut kept_path = None;
    if submission.is_accepted() {
        if args.commit {
            ledger.record(&user, submission.total_size)?;
        }
        if args.keep {
            kept_path = submission.take_output().map(OutputDirectory::keep);
        }
    }

    match output_mode {
        OutputMode::Json => {
            JsonOutput::print_submission(&submission, kept_path.as_deref()).into_diagnostic()?
        }
        OutputMode::Human => print_submission_summary(&submission, kept_path.as_deref()),
    }

    if let Some(err) = submission.error.take() {
        return Err(err.into());
    }
    Ok(())
}

fn run_check_shapefiles(args: NamesArgs, output_mode: OutputMode) -> miette::Result<()> {
    let missing = missing_shapefile_parts(args.names.iter().map(String::as_str));
    let report = ShapefileReport {
        complete: missing.is_empty(),
        missing,
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_shapefile_report(&report).into_diagnostic()?,
        OutputMode::Human => {
            if report.complete {
                println!("all shapefiles complete");
            }
            for base in &report.missing {
                println!("incomplete: {base}");
            }
        }
    }
    if !report.complete {
        return Err(SanitizeError::IncompleteShapefileGroup {
            bases: report.missing,
        }
        .into());
    }
    Ok(())
}

fn run_classify(args: ClassifyArgs, output_mode: OutputMode) -> miette::Result<()> {
    let policy: ExtensionPolicy = ConfigLoader::resolve(args.config.as_deref())?.policy;
    let entries: Vec<ClassifyEntry> = args
        .names
        .into_iter()
        .map(|name| ClassifyEntry {
            class: policy.classify(&name),
            name,
        })
        .collect();
    match output_mode {
        OutputMode::Json => JsonOutput::print_classify(&entries).into_diagnostic()?,
        OutputMode::Human => {
            for entry in &entries {
                println!("{:<10} {}", entry.class.to_string(), entry.name);
            }
        }
    }
    Ok(())
}

fn print_submission_summary(submission: &Submission, kept_path: Option<&Utf8Path>) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}geo-upload summary{reset}");
    println!(
        "{green}accepted files: {} ({}){reset}",
        submission.accepted.len(),
        format_size(submission.total_size)
    );
    println!("{yellow}warnings: {}{reset}", submission.warnings.len());

    for file in &submission.accepted {
        println!("{green}  + {} ({}){reset}", file.name, format_size(file.size));
    }
    for warning in &submission.warnings {
        println!("{yellow}  ! {warning}{reset}");
    }
    if let Some(err) = &submission.error {
        println!("{red}rejected: {err}{reset}");
    }
    if let Some(path) = kept_path {
        println!("{cyan}staged files kept in {path}{reset}");
    }
}
