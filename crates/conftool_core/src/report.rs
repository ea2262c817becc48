use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};

/// Output serialization for tabular reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Yaml,
    Csv,
    Tsv,
}

impl ReportFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            other => bail!("unsupported report format: {other} (expected text|json|yaml|csv|tsv)"),
        }
    }

    /// Format implied by an output file's extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        Self::parse(extension).ok()
    }
}

/// Ordered columns plus value rows, serializable in every report format.
pub struct Report {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Report {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn write(&self, out: &mut dyn Write, format: ReportFormat) -> Result<()> {
        match format {
            ReportFormat::Text => self.write_text(out),
            ReportFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, &self.records())
                    .context("failed to serialize report as JSON")?;
                writeln!(out)?;
                Ok(())
            }
            ReportFormat::Yaml => {
                serde_yaml::to_writer(out, &self.records())
                    .context("failed to serialize report as YAML")
            }
            ReportFormat::Csv => self.write_delimited(out, b','),
            ReportFormat::Tsv => self.write_delimited(out, b'\t'),
        }
    }

    fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    fn write_text(&self, out: &mut dyn Write) -> Result<()> {
        let mut widths = self
            .columns
            .iter()
            .map(String::len)
            .collect::<Vec<_>>();
        let rendered = self
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        for row in &rendered {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let header = self
            .columns
            .iter()
            .zip(widths.iter().copied())
            .map(|(column, width)| format!("{column:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(out, "{}", header.trim_end())?;
        for row in &rendered {
            let line = row
                .iter()
                .zip(widths.iter().copied())
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ");
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    fn write_delimited(&self, out: &mut dyn Write, delimiter: u8) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(out);
        writer
            .write_record(&self.columns)
            .context("failed to write report header")?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(cell_text))
                .context("failed to write report row")?;
        }
        writer.flush().context("failed to flush report")?;
        Ok(())
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
