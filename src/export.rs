use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use crate::data::model::{DecadePoint, PhaseNoiseDataset, SpotNoisePoint};

// ---------------------------------------------------------------------------
// Spot noise
// ---------------------------------------------------------------------------

const SPOT_NOISE_HEADER: [&str; 3] = [
    "Frequency Point",
    "Actual Frequency (Hz)",
    "Phase Noise (dBc/Hz)",
];

/// Write spot noise as CSV, one row per decade point in frequency order.
pub fn write_spot_noise_csv<W: Write>(
    writer: W,
    spots: &BTreeMap<DecadePoint, SpotNoisePoint>,
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(SPOT_NOISE_HEADER)?;
    for spot in spots.values() {
        csv.write_record([
            spot.label.label(),
            format_significant(spot.actual_frequency, 9),
            format!("{:.3}", spot.noise_value),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn export_spot_noise_csv(path: &Path, spots: &BTreeMap<DecadePoint, SpotNoisePoint>) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_spot_noise_csv(file, spots).context("writing spot noise CSV")?;
    info!("Spot noise data exported to {}", path.display());
    Ok(())
}

/// Aligned text table with a centred "Spot Noise" title:
///
/// ```text
///         Spot Noise
///  10.000 Hz :  -92.10 dBc/Hz
///   1.000 kHz: ...
/// ```
///
/// Returns an empty string when there are no points.
pub fn format_spot_noise_table(spots: &BTreeMap<DecadePoint, SpotNoisePoint>) -> String {
    if spots.is_empty() {
        return String::new();
    }

    let rows: Vec<(String, String)> = spots
        .values()
        .map(|s| (s.label.long_label(), format!("{:.2}", s.noise_value)))
        .collect();
    let label_width = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    // one extra column so positive values line up with the minus sign
    let value_width = rows.iter().map(|(_, v)| v.len()).max().unwrap_or(0) + 1;

    let lines: Vec<String> = rows
        .iter()
        .map(|(label, value)| format!("{label:>label_width$} :{value:>value_width$} dBc/Hz"))
        .collect();

    let title = "Spot Noise";
    let widest = lines.iter().map(|l| l.len()).max().unwrap_or(0);
    let padding = widest.saturating_sub(title.len()) / 2;

    let mut table = format!("{}{title}", " ".repeat(padding));
    for line in &lines {
        table.push('\n');
        table.push_str(line);
    }
    table
}

/// `value` with at most `digits` significant digits, trailing zeros dropped.
fn format_significant(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let magnitude = value.abs().log10().floor() as i64;
    let decimals = (digits as i64 - 1 - magnitude).max(0) as usize;
    let text = format!("{value:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Processed curves
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ProcessedRow {
    frequency_hz: f64,
    measured_dbc_hz: f64,
    reference_dbc_hz: Option<f64>,
    measured_processed_dbc_hz: f64,
    reference_processed_dbc_hz: Option<f64>,
}

fn defined(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// Raw and processed channels of `dataset` as CSV. Missing reference samples
/// are written as empty fields.
pub fn write_processed_csv<W: Write>(writer: W, dataset: &PhaseNoiseDataset) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    let reference = dataset.reference();
    let reference_processed = dataset.reference_processed();

    for i in 0..dataset.len() {
        csv.serialize(ProcessedRow {
            frequency_hz: dataset.frequency()[i],
            measured_dbc_hz: dataset.measured()[i],
            reference_dbc_hz: defined(reference.map(|r| r[i])),
            measured_processed_dbc_hz: dataset.measured_processed()[i],
            reference_processed_dbc_hz: defined(reference_processed.map(|r| r[i])),
        })?;
    }
    csv.flush()?;
    Ok(())
}

pub fn export_processed_csv(path: &Path, dataset: &PhaseNoiseDataset) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_processed_csv(file, dataset)
        .with_context(|| format!("writing processed curves of '{}'", dataset.name))?;
    info!("Processed curves of '{}' exported to {}", dataset.name, path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Write the raw channels in the column layout the Parquet loader reads.
pub fn write_parquet(path: &Path, dataset: &PhaseNoiseDataset) -> Result<()> {
    let mut fields = vec![
        Field::new("frequency", DataType::Float64, false),
        Field::new("measured", DataType::Float64, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from(dataset.frequency().to_vec())),
        Arc::new(Float64Array::from(dataset.measured().to_vec())),
    ];
    if let Some(reference) = dataset.reference() {
        fields.push(Field::new("reference", DataType::Float64, true));
        let values: Float64Array = reference.iter().map(|&v| defined(Some(v))).collect();
        columns.push(Arc::new(values));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
