mod debug_report;

use clap::Parser;
use morphosearch::{Analyzer, CancellationToken, Context, EntryId, MemoryCatalog, Options, SearchRequest};
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "MORPHOSEARCH_LOG";

#[derive(Parser)]
#[command(name = "morphosearch", version, about = "Morphological analysis by rule and sandhi search")]
struct Cli {
    /// Catalog file (TOML) with entries, rules, sandhi patterns and frequencies.
    #[arg(long)]
    catalog: PathBuf,

    /// Options file (TOML). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bound on rule-application depth.
    #[arg(long)]
    max_depth: Option<usize>,

    /// Weight of lexical frequency in ratings, within [0, 1].
    #[arg(long)]
    freq_ratio: Option<f64>,

    /// Analyze the stored entry with this id instead of a word.
    #[arg(long, conflicts_with = "word")]
    id: Option<EntryId>,

    /// Print the rated tree and metrics as JSON.
    #[arg(long)]
    json: bool,

    /// Force ANSI color output.
    #[arg(long, conflicts_with = "no_color")]
    color: bool,

    /// Disable ANSI color output.
    #[arg(long)]
    no_color: bool,

    /// Word to analyze. Read from stdin when omitted.
    word: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let catalog = MemoryCatalog::from_toml_str(&read_file(&cli.catalog)?).map_err(|err| err.to_string())?;

    let mut options = match &cli.config {
        Some(path) => Options::from_toml_str(&read_file(path)?).map_err(|err| err.to_string())?,
        None => Options::default(),
    };
    if let Some(depth) = cli.max_depth {
        options.max_depth_level = depth;
    }
    if let Some(ratio) = cli.freq_ratio {
        options.freq_rating_ratio = ratio;
    }

    let analyzer = Analyzer::new(Context::from_catalog(Arc::new(catalog))).with_options(options);
    let cancel = CancellationToken::new();
    let result = match (cli.id, cli.word) {
        (Some(id), _) => analyzer.analyze_id(id, &cancel),
        (None, Some(word)) => analyzer.analyze_verbose(&SearchRequest::new(word.trim()), &cancel),
        (None, None) => analyzer.analyze_verbose(&SearchRequest::new(read_stdin_input()?.trim()), &cancel),
    }
    .map_err(|err| err.to_string())?;

    if cli.json {
        let json = serde_json::to_string_pretty(&result).map_err(|err| format!("failed to encode result: {err}"))?;
        println!("{json}");
    } else {
        let color = !cli.no_color && (cli.color || io::stdout().is_terminal());
        debug_report::print_run(&result, color);
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("failed to read {}: {err}", path.display()))
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("failed to read stdin: {err}"))?;
    Ok(buffer)
}
