//! Per-image count records and the batch summary files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const CSV_HEADER: [&str; 3] = ["image", "cells", "concentration_cells_per_mL"];

/// Result for one processed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRecord {
    /// File name without directories.
    pub image: String,
    pub cells: usize,
    /// Cells per mL, when dilution and frame volume were both given.
    pub concentration: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Renders the summary table; the concentration cell is empty when unavailable.
pub fn summary_csv(records: &[CountRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for r in records {
        let conc = r.concentration.map(|c| c.to_string()).unwrap_or_default();
        out.push_str(&format!("{},{},{}\n", csv_field(&r.image), r.cells, conc));
    }
    out
}

pub fn write_summary_csv(path: &Path, records: &[CountRecord]) -> Result<(), ReportError> {
    ensure_parent(path)?;
    fs::write(path, summary_csv(records))?;
    Ok(())
}

pub fn write_summary_json(path: &Path, records: &[CountRecord]) -> Result<(), ReportError> {
    ensure_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<CountRecord> {
        vec![
            CountRecord {
                image: "a.jpg".into(),
                cells: 250,
                concentration: Some(5_000_000.0),
            },
            CountRecord {
                image: "b, copy.jpg".into(),
                cells: 3,
                concentration: None,
            },
        ]
    }

    #[test]
    fn csv_has_header_and_blank_concentration() {
        let csv = summary_csv(&records());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "image,cells,concentration_cells_per_mL");
        assert_eq!(lines[1], "a.jpg,250,5000000");
        assert_eq!(lines[2], "\"b, copy.jpg\",3,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_batch_writes_only_the_header() {
        assert_eq!(summary_csv(&[]), "image,cells,concentration_cells_per_mL\n");
    }

    #[test]
    fn json_summary_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/summary.json");
        write_summary_json(&path, &records()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let back: Vec<CountRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, records());
    }
}
