use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};

use hscpana::output::io::{load_events, save_bincode, save_histograms_json, save_json};
use hscpana::{AnalysisConfig, Analyzer, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Bincode,
}

/// Evaluate HSCP candidates of a set of events
#[derive(Parser, Debug)]
#[command(name = "hscp-analyze", version, about)]
struct Cli {
    /// JSON analysis configuration, defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event records, JSON (.json) or bincode with optional zstd
    #[arg(short, long)]
    events: PathBuf,

    /// N-tuple output file, histograms go next to it as <output>.hist.json
    #[arg(short, long)]
    output: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// zstd compress bincode output
    #[arg(long)]
    compress: bool,

    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(config: &AnalysisConfig, verbose: u8) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level()).parse_default_env();
    if verbose > 0 {
        let level = match verbose {
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        builder.filter_level(level);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    init_logging(&config, cli.verbose);

    let events = load_events(&cli.events)?;
    info!("read {} events from {}", events.len(), cli.events.display());

    let mut analyzer = Analyzer::new(config)?;
    let rows = analyzer.run(&events);
    let (book, _, _) = analyzer.finish();

    match cli.format {
        Format::Json => save_json(&cli.output, &rows)?,
        Format::Bincode => save_bincode(&cli.output, &rows, cli.compress)?,
    }
    let mut hist_path = cli.output.clone().into_os_string();
    hist_path.push(".hist.json");
    save_histograms_json(&hist_path, &book)?;

    info!("wrote {} event rows to {}", rows.len(), cli.output.display());
    Ok(())
}
