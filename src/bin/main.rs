//! EPUB Flattening CLI
//!
//! Command-line tool for merging the documents of an EPUB into one XHTML file.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use epub_flatten::{flatten, MergeError, MergeOptions, MergeOutput};

#[derive(Parser)]
#[command(name = "epub-flatten")]
#[command(about = "Flatten a multi-document EPUB into a single XHTML document")]
#[command(version)]
struct Cli {
    /// Path to an .epub file or an unpacked EPUB directory
    #[arg(value_parser = existing_path)]
    epub: PathBuf,

    /// Document whose head and tail wrap the output (default: first in reading order)
    reference: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a JSON report of sections and renamed identifiers
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Reject missing inputs during argument parsing
fn existing_path(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.exists() {
        Ok(path)
    } else {
        Err(format!("no such file or directory: {}", value))
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Write output to file or stdout
fn write_output(content: &str, output: Option<&Path>) -> Result<(), MergeError> {
    match output {
        Some(path) => {
            fs::write(path, format!("{}\n", content))?;
            eprintln!("Wrote flattened document to {}", path.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

fn write_report(result: &MergeOutput, path: &Path) -> Result<(), MergeError> {
    let json = serde_json::to_string_pretty(&result.report)?;
    fs::write(path, json)?;
    eprintln!("Wrote merge report to {}", path.display());
    Ok(())
}

fn run(cli: Cli) -> Result<(), MergeError> {
    let options = MergeOptions {
        reference: cli.reference,
        ..MergeOptions::default()
    };

    let result = flatten(&cli.epub, &options)?;

    let stats = &result.report.stats;
    eprintln!(
        "Merged {} documents, {} identifiers renamed ({} disambiguated), {} links rewritten",
        stats.documents,
        stats.identifiers_rewritten,
        stats.identifiers_disambiguated,
        stats.links_rewritten
    );

    write_output(&result.document, cli.output.as_deref())?;
    if let Some(path) = cli.report.as_deref() {
        write_report(&result, path)?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
