//! Dump hydralog tsv0/tsv1 log files to stdout.
//!
//! One file is streamed through a [`Reader`]; several files are merged by
//! timestamp through a [`MergeReader`]. Output is either human-readable
//! lines (optionally restricted to selected fields, TAB-separated) or one
//! JSON object per record.

use anyhow::{Context, Result};
use clap::Parser;
use hydralog::{LogRecord, MergeReader, Reader};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "hydralog-dump")]
#[command(about = "Dump hydralog tsv0/tsv1 log files to stdout")]
#[command(version)]
struct Cli {
    /// Comma-separated fields to emit (default: rendered log line)
    #[arg(short = 'f', long = "fields", value_name = "FIELDS")]
    fields: Option<String>,

    /// Output format
    #[arg(short = 'o', long = "output", default_value = "tsv", value_parser = ["tsv", "json"])]
    output: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Input log files, merged by timestamp when several are given
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn record_json(record: &LogRecord, fields: Option<&[String]>) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    match fields {
        Some(names) => {
            for name in names {
                if name == "timestamp" {
                    obj.insert(name.clone(), record.timestamp().into());
                } else if let Ok(v) = record.get(name) {
                    obj.insert(name.clone(), v.into());
                }
            }
        }
        None => {
            obj.insert("timestamp".to_string(), record.timestamp().into());
            for (name, value) in record.fields() {
                obj.insert(name.to_string(), value.into());
            }
        }
    }
    serde_json::Value::Object(obj)
}

fn record_tsv(record: &LogRecord, fields: Option<&[String]>) -> String {
    match fields {
        Some(names) => names
            .iter()
            .map(|name| {
                if name == "timestamp" {
                    record.timestamp().to_string()
                } else {
                    record.get(name).unwrap_or("").to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\t"),
        None => record.to_string(),
    }
}

fn emit(out: &mut impl Write, record: &LogRecord, cli: &Cli, fields: Option<&[String]>) -> Result<()> {
    if cli.output == "json" {
        serde_json::to_writer(&mut *out, &record_json(record, fields))?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", record_tsv(record, fields))?;
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let fields: Option<Vec<String>> = cli
        .fields
        .as_ref()
        .map(|f| f.split(',').map(|s| s.trim().to_string()).collect());
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if cli.files.len() == 1 {
        let path = &cli.files[0];
        let mut reader =
            Reader::open(path).with_context(|| format!("opening {}", path.display()))?;
        while let Some(record) = reader
            .next()
            .with_context(|| format!("reading {}", path.display()))?
        {
            emit(&mut out, &record, cli, fields.as_deref())?;
        }
    } else {
        let mut readers = Vec::with_capacity(cli.files.len());
        for path in &cli.files {
            readers.push(
                Reader::open(path).with_context(|| format!("opening {}", path.display()))?,
            );
        }
        let mut merge = MergeReader::new(readers).context("building merge")?;
        while let Some(record) = merge.next().context("reading merged stream")? {
            emit(&mut out, &record, cli, fields.as_deref())?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    run(&cli)
}
