// ========================================================================================
//
//                      THE COMMAND-LINE FRONT END: GSPICE
//
// ========================================================================================
//
// Loads a covariance matrix and a set of spectra, runs the pixelwise scan, and writes
// the predicted spectra and their variances next to each other. Scan parameters come
// from an optional TOML file and are overridden by command-line flags.

use clap::{Args, Parser, Subcommand};
use gspice::io::{read_matrix_csv, write_matrix_csv};
use gspice::progress::ConsoleScanProgress;
use gspice::{PixelRange, PixelwiseScanner, ScanConfig, SchurComplement, Spectra};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "gspice",
    version,
    about = "Gaussian conditional estimation of spectral pixels over a fixed covariance."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict every pixel from all others outside a guard window
    #[command(about = "Run a pixelwise scan (outputs: <prefix>.prediction.csv, <prefix>.variance.csv)")]
    Scan(ScanArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Headerless CSV file holding the N x N covariance matrix
    #[arg(long)]
    covariance: PathBuf,

    /// Headerless CSV file holding the spectra, one per row (N columns)
    #[arg(long)]
    spectra: PathBuf,

    /// Optional TOML file with scan parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Guard window half-width; overrides the config file
    #[arg(long)]
    guard: Option<usize>,

    /// Inclusive pixel range FIRST:LAST; overrides the config file
    #[arg(long, value_name = "FIRST:LAST")]
    range: Option<PixelRange>,

    /// Run the per-pixel phase on a single thread
    #[arg(long)]
    sequential: bool,

    /// Output path prefix
    #[arg(long, default_value = "gspice")]
    output_prefix: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Scan(args) => run_scan(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn resolve_config(args: &ScanArgs) -> Result<ScanConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    if let Some(guard) = args.guard {
        config.guard_width = guard;
    }
    if args.range.is_some() {
        config.range = args.range;
    }
    if args.sequential {
        config.parallel = false;
    }
    Ok(config)
}

fn output_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn run_scan(args: ScanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    let start = Instant::now();

    let cov = read_matrix_csv(&args.covariance)?;
    let spectra = read_matrix_csv(&args.spectra)?;
    log::info!(
        "Loaded {}x{} covariance and {} spectra in {:.2?}",
        cov.nrows(),
        cov.ncols(),
        spectra.nrows(),
        start.elapsed()
    );

    let progress = ConsoleScanProgress::new("pixels");
    let output = PixelwiseScanner::from_config(&config).scan_with(
        &SchurComplement,
        Spectra::from(&spectra),
        cov.view(),
        &progress,
    )?;

    let prediction_path = output_path(&args.output_prefix, ".prediction.csv");
    let variance_path = output_path(&args.output_prefix, ".variance.csv");
    write_matrix_csv(&prediction_path, &output.prediction)?;
    write_matrix_csv(&variance_path, &output.variance)?;
    log::info!(
        "Wrote {} and {} in {:.2?}",
        prediction_path.display(),
        variance_path.display(),
        start.elapsed()
    );
    Ok(())
}
