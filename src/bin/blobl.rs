//! Command-line mapping runner
//!
//! Reads newline-delimited documents from stdin, maps each one and writes
//! the results to stdout. Failures are reported per line on stderr.

use std::fs;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bloblang::{MessageBatch, Part, environment, parse_mapping};
use clap::Parser;

#[derive(Parser)]
#[command(name = "blobl")]
#[command(about = "Map newline-delimited documents from stdin with a mapping")]
#[command(version)]
struct Cli {
    /// Mapping text
    mapping: Option<String>,
    /// Read the mapping from a file instead
    #[arg(short, long, conflicts_with = "mapping")]
    file: Option<String>,
    /// Pretty-print JSON output
    #[arg(short, long)]
    pretty: bool,
}

fn main() -> Result<()> {
    // Setup human-panic for better error messages
    human_panic::setup_panic!();
    env_logger::init();

    let cli = Cli::parse();
    let text = match (&cli.mapping, &cli.file) {
        (Some(mapping), None) => mapping.clone(),
        (None, Some(path)) => {
            fs::read_to_string(path)
                .with_context(|| format!("failed to read mapping file '{path}'"))?
        }
        _ => bail!("provide either a mapping or --file"),
    };

    let mapping = parse_mapping(&environment::parsing_context(), "blobl", &text)
        .map_err(|e| anyhow::anyhow!("failed to parse mapping: {}", e.describe(&text)))?;

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for (number, line) in stdin.lock().lines().enumerate() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let batch = Arc::new(MessageBatch::new(vec![Part::new(line)]));
        match mapping.map_part(0, &batch) {
            Ok(Some(part)) => {
                writeln!(stdout, "{}", render(part.content(), cli.pretty))?;
            }
            Ok(None) => {}
            Err(e) => eprintln!("line {}: {e}", number + 1),
        }
    }
    Ok(())
}

fn render(content: &[u8], pretty: bool) -> String {
    if pretty {
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(content) {
            if let Ok(formatted) = serde_json::to_string_pretty(&json) {
                return formatted;
            }
        }
    }
    String::from_utf8_lossy(content).into_owned()
}
