//! Output layer for snowctl.
//!
//! Centralizes stdout/stderr separation and result rendering.
//! - stdout: data (the rendered result, in json, yaml, csv or tsv)
//! - stderr: diagnostics (progress, warnings, errors)

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

use crate::error::Error;
use crate::shape::{normalize, Render, Table};

/// Result encodings selectable with `-o/--output`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Csv,
    Tsv,
}

impl OutputFormat {
    pub const SUPPORTED: &'static [&'static str] = &["json", "yaml", "csv", "tsv"];

    pub fn is_tabular(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Tsv)
    }

    fn delimiter(&self) -> u8 {
        match self {
            OutputFormat::Tsv => b'\t',
            _ => b',',
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Tsv => write!(f, "tsv"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_lowercase().as_str() {
            "" | "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            "csv" => Ok(OutputFormat::Csv),
            "tsv" => Ok(OutputFormat::Tsv),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Render `value` in the named format. Unknown formats fail before any
/// output is produced.
pub fn render<T: Render + ?Sized>(value: &T, format: &str) -> Result<Vec<u8>, Error> {
    let format: OutputFormat = format.parse()?;
    render_as(value, format)
}

pub fn render_as<T: Render + ?Sized>(value: &T, format: OutputFormat) -> Result<Vec<u8>, Error> {
    match format {
        OutputFormat::Json => {
            let mut buf =
                serde_json::to_vec_pretty(value).map_err(|e| Error::serialize("encode json", e))?;
            buf.push(b'\n');
            Ok(buf)
        }
        OutputFormat::Yaml => {
            let mut text =
                serde_yaml_ng::to_string(value).map_err(|e| Error::serialize("encode yaml", e))?;
            if !text.ends_with('\n') {
                text.push('\n');
            }
            Ok(text.into_bytes())
        }
        OutputFormat::Csv | OutputFormat::Tsv => {
            let table = normalize(value)?;
            write_delimited(&table, format.delimiter())
        }
    }
}

/// Metadata block (pretty JSON plus a blank line), then header and rows.
/// No rows means no table at all, not a header-only table.
fn write_delimited(table: &Table, delimiter: u8) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();

    if let Some(metadata) = &table.metadata {
        let block = serde_json::to_vec_pretty(metadata)
            .map_err(|e| Error::serialize("encode metadata", e))?;
        out.extend_from_slice(&block);
        out.push(b'\n');
        if !table.rows.is_empty() {
            out.push(b'\n');
        }
    }

    if table.rows.is_empty() {
        return Ok(out);
    }

    let headers = table.headers();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(out);
    writer
        .write_record(&headers)
        .map_err(|e| Error::serialize("encode table", e))?;
    for row in &table.rows {
        writer
            .write_record(headers.iter().map(|h| cell(row.get(h))))
            .map_err(|e| Error::serialize("encode table", e))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::serialize("encode table", e.error()))
}

/// Cell text: strings raw, null or missing empty, nested values as compact
/// JSON.
fn cell(value: Option<&serde_json::Value>) -> String {
    use serde_json::Value;
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Output helper that centralizes all CLI output
#[derive(Debug, Clone)]
pub struct Output {
    pub format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool, verbose: bool) -> Self {
        Self {
            format,
            quiet,
            verbose,
        }
    }

    /// Render a result and write it to stdout in a single write.
    pub fn print<T: Render + ?Sized>(&self, value: &T) -> Result<(), Error> {
        let bytes = render_as(value, self.format)?;
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(&bytes)
            .and_then(|_| stdout.flush())
            .map_err(|e| Error::io("write output", e))
    }

    /// Diagnostic/progress message to stderr, suppressed by --quiet
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        eprintln!("{}", message);
    }

    /// Only shown with --verbose
    pub fn verbose(&self, message: &str) {
        if self.quiet || !self.verbose {
            return;
        }
        eprintln!("{}", message);
    }

    pub fn warn(&self, message: &str) {
        if self.quiet {
            return;
        }
        eprintln!("{} {}", "warning:".yellow(), message);
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

/// Error payload printed to stderr when the output format is json.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            error: error.into(),
            hint,
        }
    }

    pub fn print(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("{}", self.error),
        }
    }
}
