use clap::Parser;
use console::Style;
use spam_check_lib::{
    load_env_config, parse_identifiers, ConfigManager, FileConfig, InMemoryDirectory,
    PipelineConfig, Services, SpamChecker, MAX_LIMIT,
};
use std::io::Read;
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "spam-check")]
#[command(version)]
#[command(about = "Build a deduplicated, sorted spam report from user identifiers")]
#[command(
    long_about = "Build a deduplicated, sorted spam report from user identifiers.\n\nIdentifiers are looked up, alias-resolved and deduplicated; their messages are fetched in batches and classified with a bounded number of concurrent checks."
)]
pub struct Args {
    /// User identifiers to check (read from stdin when none are given)
    #[arg(value_name = "IDENTIFIERS", help_heading = "Input")]
    pub identifiers: Vec<String>,

    /// Input file with identifiers (one per line, '#' starts a comment)
    #[arg(short = 'f', long = "file", value_name = "FILE", help_heading = "Input")]
    pub file: Option<String>,

    /// JSON fixture describing users, messages and spam verdicts
    #[arg(short = 'd', long = "directory", value_name = "FIXTURE", help_heading = "Services")]
    pub directory: String,

    /// Alias mapping an email to another identifier (FROM=TO, FROM is matched case-insensitively)
    #[arg(
        short = 'a',
        long = "alias",
        value_name = "FROM=TO",
        action = clap::ArgAction::Append,
        help_heading = "Services"
    )]
    pub aliases: Vec<String>,

    /// Users per message lookup call (1-1000)
    #[arg(short = 'b', long = "batch-size", value_name = "N", help_heading = "Performance")]
    pub batch_size: Option<usize>,

    /// Max concurrent spam checks (1-1000)
    #[arg(short = 'c', long = "max-checks", value_name = "N", help_heading = "Performance")]
    pub max_checks: Option<usize>,

    /// Use a specific config file instead of discovered ones
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Colour spam lines
    #[arg(short = 'p', long = "pretty", help_heading = "Output Format")]
    pub pretty: bool,

    /// Print spam/clean counts and elapsed time to stderr
    #[arg(short = 's', long = "summary", help_heading = "Output Format")]
    pub summary: bool,

    /// Show detailed logging of dropped items and stage progress
    #[arg(short = 'v', long = "verbose", help_heading = "Debugging")]
    pub verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_tracing(args.verbose);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "spam-check starting");

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_report(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr log subscriber. RUST_LOG wins over --verbose.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if !args.identifiers.is_empty() && args.file.is_some() {
        return Err("Cannot specify both identifiers and --file".to_string());
    }

    for (name, value) in [("--batch-size", args.batch_size), ("--max-checks", args.max_checks)] {
        if let Some(value) = value {
            if value == 0 || value > MAX_LIMIT {
                return Err(format!("{} must be between 1 and {}", name, MAX_LIMIT));
            }
        }
    }

    parse_aliases(&args.aliases)?;

    Ok(())
}

/// Parse FROM=TO alias arguments. FROM is canonicalised to match looked-up emails.
fn parse_aliases(raw: &[String]) -> Result<Vec<(String, String)>, String> {
    raw.iter()
        .map(|alias| match alias.split_once('=') {
            Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
                Ok((from.trim().to_lowercase(), to.trim().to_string()))
            }
            _ => Err(format!("Invalid alias '{}', expected FROM=TO", alias)),
        })
        .collect()
}

async fn run_report(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    let identifiers = get_identifiers(&args)?;

    let directory = InMemoryDirectory::from_file(&args.directory)?
        .with_batch_limit(config.message_batch_size)
        .with_check_limit(config.max_concurrent_checks);
    let checker = SpamChecker::with_config(config, Services::from_backend(Arc::new(directory)));

    let start_time = Instant::now();
    let lines = checker.report(identifiers).await;
    let duration = start_time.elapsed();

    display_report(&lines, args.pretty);

    if args.summary {
        let spam = lines.iter().filter(|line| line.starts_with("true ")).count();
        eprintln!(
            "Summary: {} messages, {} spam, {} clean in {:.2?}",
            lines.len(),
            spam,
            lines.len() - spam,
            duration
        );
    }

    Ok(())
}

/// Build the pipeline config: defaults < config files < environment < flags.
fn build_config(args: &Args) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let env_config = load_env_config();
    let manager = ConfigManager::new(args.verbose);

    let file_config = match args.config.as_ref().or(env_config.config.as_ref()) {
        Some(path) => manager.load_file(path)?,
        None => manager.discover_and_load().unwrap_or_else(|e| {
            if args.verbose {
                eprintln!("Warning: ignoring configuration files: {}", e);
            }
            FileConfig::default()
        }),
    };

    let config = env_config.apply_to(file_config.apply_to(PipelineConfig::default()));
    Ok(apply_cli_args_to_config(config, args)?)
}

fn apply_cli_args_to_config(
    mut config: PipelineConfig,
    args: &Args,
) -> Result<PipelineConfig, String> {
    if let Some(size) = args.batch_size {
        config = config.with_message_batch_size(size);
    }
    if let Some(max) = args.max_checks {
        config = config.with_max_concurrent_checks(max);
    }

    // CLI aliases extend, and override, the configured table.
    config.aliases.extend(parse_aliases(&args.aliases)?);

    Ok(config)
}

/// Collect identifiers from arguments, a file or stdin.
fn get_identifiers(args: &Args) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    if !args.identifiers.is_empty() {
        return Ok(args.identifiers.clone());
    }

    let text = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?,
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    Ok(parse_identifiers(&text))
}

fn display_report(lines: &[String], pretty: bool) {
    let spam_style = Style::new().red().bold();
    let clean_style = Style::new().green();

    for line in lines {
        if !pretty {
            println!("{}", line);
        } else if line.starts_with("true ") {
            println!("{}", spam_style.apply_to(line));
        } else {
            println!("{}", clean_style.apply_to(line));
        }
    }
}
