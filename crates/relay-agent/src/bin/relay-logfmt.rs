//! # relay-logfmt
//!
//! Reads `relayd` JSON log lines on stdin and prints them in a readable
//! block form:
//!
//! ```text
//! [INFO] 2026-01-01T00:00:00.000000Z relay_server::registry
//!   connection registered
//!   identity=0190... count=1
//! ----------------------------------------
//! ```

#![deny(unsafe_code)]

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};

const SEPARATOR_WIDTH: usize = 40;

/// Pretty-print JSON logs from stdin.
#[derive(Parser, Debug)]
#[command(name = "relay-logfmt", about = "Pretty-print relayd JSON logs from stdin")]
struct Cli {
    /// Print only lines at or above this level (trace, debug, info, warn, error).
    #[arg(long)]
    level: Option<String>,
}

fn severity(level: &str) -> u8 {
    match level.to_ascii_lowercase().as_str() {
        "trace" => 0,
        "debug" => 1,
        "info" => 2,
        "warn" | "warning" => 3,
        "error" => 4,
        _ => 2,
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Indent every line of `text` by two spaces.
fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render one JSON log record. Returns `None` when the record falls below
/// `min_level`.
fn format_record(record: &Map<String, Value>, min_level: Option<u8>) -> Option<String> {
    let level = record.get("level").map(scalar).unwrap_or_default();
    if min_level.is_some_and(|min| severity(&level) < min) {
        return None;
    }
    let timestamp = record.get("timestamp").map(scalar).unwrap_or_default();

    let mut out = format!("[{level}] {timestamp}");
    if let Some(target) = record.get("target") {
        out.push(' ');
        out.push_str(&scalar(target));
    }
    out.push('\n');

    let fields = record.get("fields").and_then(Value::as_object);
    if let Some(message) = fields.and_then(|f| f.get("message")) {
        out.push_str(&indent(&scalar(message)));
        out.push('\n');
    }

    let extra: Vec<String> = fields
        .into_iter()
        .flatten()
        .filter(|(key, _)| key.as_str() != "message")
        .map(|(key, value)| format!("{key}={}", scalar(value)))
        .collect();
    if !extra.is_empty() {
        out.push_str(&indent(&extra.join(" ")));
        out.push('\n');
    }

    if let Some(span) = record.get("span").and_then(|s| s.get("name")) {
        out.push_str(&indent(&format!("in {}", scalar(span))));
        out.push('\n');
    }

    out.push_str(&"-".repeat(SEPARATOR_WIDTH));
    Some(out)
}

/// Render one input line. Lines that are not JSON objects come back as an
/// error notice carrying the original text.
fn format_line(line: &str, min_level: Option<u8>) -> Option<String> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => format_record(&record, min_level),
        Ok(_) => Some(format!("not a log record: {line}")),
        Err(e) => Some(format!("unparseable line ({e}): {line}")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let min_level = cli.level.as_deref().map(severity);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(rendered) = format_line(&line, min_level) {
            writeln!(stdout, "{rendered}").context("Failed to write stdout")?;
        }
    }
    Ok(())
}
