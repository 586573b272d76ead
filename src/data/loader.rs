use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, Float32Array, Float64Array};
use log::{info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;

use super::model::PhaseNoiseDataset;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a phase-noise measurement from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.txt` / `.dat` – `frequency, measured[, reference]` per line,
///   separated by commas and/or whitespace
/// * `.json`    – records `[{ "frequency": .., "measured": .., "reference": .. }]`
///   or columns `{ "frequency": [..], "measured": [..], "reference": [..] }`
/// * `.parquet` – Float64/Float32 columns `frequency`, `measured`, `reference`
///
/// The dataset is named after the file stem.
pub fn load_file(path: &Path) -> Result<PhaseNoiseDataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "csv" | "txt" | "dat" => load_text(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    info!(
        "Loaded {} data points from {} (reference: {})",
        dataset.len(),
        path.display(),
        if dataset.has_reference() { "yes" } else { "no" }
    );
    Ok(dataset)
}

fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

// ---------------------------------------------------------------------------
// Text / CSV loader
// ---------------------------------------------------------------------------

fn load_text(path: &Path) -> Result<PhaseNoiseDataset> {
    let text = std::fs::read_to_string(path).context("reading measurement file")?;
    parse_text(&text, &dataset_name(path))
}

/// Parse the analyzer text format.
///
/// ```text
/// # offset_hz, ssb_dbc_hz, reference_dbc_hz
/// 10, -92.1, -120.4
/// 100  -110.7  -131.0
/// ```
///
/// Empty lines and lines starting with `#` or `;` are ignored. The field count
/// of the first remaining line decides whether a reference column exists
/// (three or more fields). Rows that cannot be parsed, or whose frequency is
/// not positive, are skipped with a warning.
pub fn parse_text(text: &str, name: &str) -> Result<PhaseNoiseDataset> {
    let mut frequency = Vec::new();
    let mut measured = Vec::new();
    let mut reference = Vec::new();
    let mut has_reference: Option<bool> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        let with_reference = *has_reference.get_or_insert(fields.len() >= 3);

        if fields.len() < 2 {
            warn!("Skipping line {line_no}: not enough data fields ({})", fields.len());
            continue;
        }

        let freq = fields[0].parse::<f64>();
        let noise = fields[1].parse::<f64>();
        let reference_value = match fields.get(2) {
            Some(tok) if with_reference => tok.parse::<f64>().map(Some),
            _ => Ok(None),
        };
        let (Ok(freq), Ok(noise), Ok(reference_value)) = (freq, noise, reference_value) else {
            warn!("Skipping line {line_no}: could not parse numeric data {fields:?}");
            continue;
        };

        if !(freq.is_finite() && freq > 0.0) {
            warn!("Skipping line {line_no}: frequency offset must be positive ({freq})");
            continue;
        }

        frequency.push(freq);
        measured.push(noise);
        reference.push(reference_value.unwrap_or(f64::NAN));
    }

    if frequency.is_empty() {
        bail!("No valid data points found");
    }

    let reference = has_reference.unwrap_or(false).then_some(reference);
    Ok(PhaseNoiseDataset::new(name, frequency, measured, reference)?)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JsonRecord {
    frequency: f64,
    #[serde(alias = "phase_noise")]
    measured: f64,
    #[serde(default, alias = "reference_noise")]
    reference: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct JsonColumns {
    frequency: Vec<f64>,
    #[serde(alias = "phase_noise")]
    measured: Vec<f64>,
    #[serde(default, alias = "reference_noise")]
    reference: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonLayout {
    Records(Vec<JsonRecord>),
    Columns(JsonColumns),
}

fn load_json(path: &Path) -> Result<PhaseNoiseDataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    parse_json(&text, &dataset_name(path))
}

/// Parse either JSON layout; `null` reference values become NaN.
pub fn parse_json(text: &str, name: &str) -> Result<PhaseNoiseDataset> {
    let layout: JsonLayout = serde_json::from_str(text)
        .context("Expected an array of records or an object of columns")?;

    let (frequency, measured, reference) = match layout {
        JsonLayout::Records(records) => {
            let has_reference = records.iter().any(|r| r.reference.is_some());
            let reference = has_reference.then(|| {
                records
                    .iter()
                    .map(|r| r.reference.unwrap_or(f64::NAN))
                    .collect::<Vec<f64>>()
            });
            let (frequency, measured): (Vec<f64>, Vec<f64>) =
                records.iter().map(|r| (r.frequency, r.measured)).unzip();
            (frequency, measured, reference)
        }
        JsonLayout::Columns(cols) => {
            let reference = cols
                .reference
                .map(|r| r.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect::<Vec<f64>>());
            (cols.frequency, cols.measured, reference)
        }
    };

    Ok(PhaseNoiseDataset::new(name, frequency, measured, reference)?)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one row per sample.
///
/// Expected schema:
/// - `frequency`: Float64 or Float32 – offset in Hz
/// - `measured`: Float64 or Float32 – SSB phase noise in dBc/Hz
/// - `reference` (optional): Float64 or Float32 – nulls become NaN
///
/// Rows with a null frequency or measured value are skipped.
fn load_parquet(path: &Path) -> Result<PhaseNoiseDataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut frequency = Vec::new();
    let mut measured = Vec::new();
    let mut reference = Vec::new();
    let mut has_reference = false;
    let mut row_offset = 0;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let freq_idx = schema
            .index_of("frequency")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'frequency' column"))?;
        let meas_idx = schema
            .index_of("measured")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'measured' column"))?;
        let ref_idx = schema.index_of("reference").ok();

        let freq_col = extract_f64_column(batch.column(freq_idx)).context("column 'frequency'")?;
        let meas_col = extract_f64_column(batch.column(meas_idx)).context("column 'measured'")?;
        let ref_col = match ref_idx {
            Some(idx) => {
                has_reference = true;
                Some(extract_f64_column(batch.column(idx)).context("column 'reference'")?)
            }
            None => None,
        };

        for row in 0..batch.num_rows() {
            let (Some(f), Some(m)) = (freq_col[row], meas_col[row]) else {
                warn!("Skipping row {}: null frequency or measured value", row_offset + row);
                continue;
            };
            if !(f.is_finite() && f > 0.0) {
                warn!("Skipping row {}: frequency offset must be positive ({f})", row_offset + row);
                continue;
            }
            frequency.push(f);
            measured.push(m);
            reference.push(
                ref_col
                    .as_ref()
                    .and_then(|c| c[row])
                    .unwrap_or(f64::NAN),
            );
        }
        row_offset += batch.num_rows();
    }

    if frequency.is_empty() {
        bail!("No valid data points found");
    }

    let reference = has_reference.then_some(reference);
    Ok(PhaseNoiseDataset::new(dataset_name(path), frequency, measured, reference)?)
}

/// Read a Float64 or Float32 column, keeping nulls as `None`.
fn extract_f64_column(col: &ArrayRef) -> Result<Vec<Option<f64>>> {
    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        Ok(arr.iter().collect())
    } else if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        Ok(arr.iter().map(|v| v.map(f64::from)).collect())
    } else {
        bail!("Expected Float64 or Float32 column, got {:?}", col.data_type())
    }
}
