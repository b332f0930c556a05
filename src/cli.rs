//! Command-line interface for logsieve.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, FailOn, CONFIG_FILE_NAMES, DEFAULT_CONFIG_YAML};
use crate::context::ParseContext;
use crate::report::{self, LogReport, OutputFormat, Summary};
use crate::stream::RecordStream;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Extensions picked up when a directory is scanned.
const LOG_EXTENSIONS: &[&str] = &["log", "txt", "out"];

/// Extract structured errors and warnings from CI build logs.
///
/// Logsieve reads raw tool output (compilers, linters, test runners,
/// package managers) and reports each diagnostic once, with its file,
/// location, category and a remediation hint where one is known.
#[derive(Parser)]
#[command(name = "logsieve")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Emit debug logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract diagnostics from log files or standard input
    #[command(visible_alias = "check")]
    Scan(ScanArgs),
    /// List the built-in parsers
    Parsers(ParsersArgs),
    /// Write a default logsieve.yaml
    Init(InitArgs),
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Log files or directories; `-` reads standard input
    #[arg(default_value = "-")]
    pub paths: Vec<PathBuf>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty, json, or sarif
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Severity that fails the scan: error, warning, or never
    #[arg(long)]
    pub fail_on: Option<String>,

    /// Workflow job name attached to every record (default: $GITHUB_JOB)
    #[arg(long)]
    pub job: Option<String>,

    /// Workflow step name attached to every record
    #[arg(long)]
    pub step: Option<String>,

    /// Action name attached to every record (default: $GITHUB_ACTION)
    #[arg(long)]
    pub action: Option<String>,

    /// Directory SARIF paths are made relative to (default: $GITHUB_WORKSPACE)
    #[arg(long)]
    pub root: Option<PathBuf>,
}

/// Arguments for the parsers command.
#[derive(Parser)]
pub struct ParsersArgs {
    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = CONFIG_FILE_NAMES[0])]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// One log to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogInput {
    Stdin,
    File(PathBuf),
}

impl LogInput {
    fn name(&self) -> String {
        match self {
            LogInput::Stdin => "-".to_string(),
            LogInput::File(path) => path.display().to_string(),
        }
    }

    fn read(&self) -> anyhow::Result<String> {
        let bytes = match self {
            LogInput::Stdin => {
                let mut buf = Vec::new();
                io::stdin().lock().read_to_end(&mut buf).context("failed to read stdin")?;
                buf
            }
            LogInput::File(path) => {
                std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
            }
        };
        // CI logs are not always valid UTF-8
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Collect logs to scan: files as given, directories walked for log files.
fn collect_logs(paths: &[PathBuf]) -> anyhow::Result<Vec<LogInput>> {
    let mut inputs = Vec::new();

    for path in paths {
        if path.as_os_str() == "-" {
            if !inputs.contains(&LogInput::Stdin) {
                inputs.push(LogInput::Stdin);
            }
            continue;
        }

        let metadata = std::fs::metadata(path)
            .with_context(|| format!("cannot access path {}", path.display()))?;
        if !metadata.is_dir() {
            inputs.push(LogInput::File(path.clone()));
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| {
                // Skip hidden directories below the root
                !(e.depth() > 0 && e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.'))
            })
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry.path().extension().and_then(|e| e.to_str()).unwrap_or("");
            if LOG_EXTENSIONS.contains(&ext) {
                found.push(entry.path().to_path_buf());
            }
        }
        found.sort();
        inputs.extend(found.into_iter().map(LogInput::File));
    }

    Ok(inputs)
}

/// Workflow attribution from flags, falling back to GitHub Actions variables.
fn workflow_context(args: &ScanArgs) -> ParseContext {
    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    let mut ctx = ParseContext::new();
    ctx.job = args.job.clone().or_else(|| env("GITHUB_JOB"));
    ctx.step = args.step.clone();
    ctx.action = args.action.clone().or_else(|| env("GITHUB_ACTION"));
    ctx
}

/// Scan one log with a registry of its own.
fn scan_log(input: &LogInput, config: &Config, ctx: &ParseContext) -> anyhow::Result<LogReport> {
    let text = input.read()?;
    let stream = RecordStream::with_registry(text.lines(), config.build_registry(), ctx.clone());
    let records: Vec<_> = stream.collect();
    tracing::debug!(log = %input.name(), records = records.len(), "scanned log");
    Ok(LogReport {
        name: input.name(),
        records,
    })
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    let format: OutputFormat = match args.format.parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let cwd = std::env::current_dir()?;
    let config = match Config::load(args.config.as_deref(), &cwd) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let fail_on: FailOn = match &args.fail_on {
        Some(level) => match level.parse() {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_ERROR);
            }
        },
        None => config.fail_on,
    };

    let inputs = match collect_logs(&args.paths) {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if inputs.is_empty() {
        eprintln!("Warning: no log files to scan");
        return Ok(EXIT_SUCCESS);
    }

    let ctx = workflow_context(args);
    crate::parser::initialize_patterns();
    let reports = inputs
        .par_iter()
        .map(|input| scan_log(input, &config, &ctx))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let root = args
        .root
        .clone()
        .or_else(|| std::env::var_os("GITHUB_WORKSPACE").map(PathBuf::from));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => report::write_json(&mut out, &reports, fail_on)?,
        OutputFormat::Sarif => report::write_sarif(&mut out, &reports, root.as_deref())?,
        OutputFormat::Pretty => report::write_pretty(&mut out, &reports, fail_on)?,
    }

    if Summary::from_reports(&reports).failed(fail_on) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the parsers command.
pub fn run_parsers(args: &ParsersArgs) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir()?;
    let config = match Config::load(args.config.as_deref(), &cwd) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    println!("Built-in parsers (highest priority first):");
    println!();

    let registry = crate::parser::ParserRegistry::new();
    let mut parsers: Vec<_> = registry.parsers().collect();
    parsers.sort_by(|a, b| b.priority().cmp(&a.priority()));
    for parser in parsers {
        let mut notes = Vec::new();
        if parser.is_multi_line() {
            notes.push("multi-line");
        }
        if config.parsers.disabled.iter().any(|d| d == parser.id()) {
            notes.push("disabled");
        }
        println!(
            "  {:<16} priority {:>3}  {}",
            parser.id(),
            parser.priority(),
            notes.join(", ")
        );
    }

    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() && !args.force {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or pass --force to overwrite");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, DEFAULT_CONFIG_YAML) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to tune limits and disabled parsers", args.output.display());
    println!("  2. Run: logsieve scan build.log --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}
