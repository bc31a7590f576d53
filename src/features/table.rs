//! The canonical per-epoch-per-channel feature table, its deterministic
//! column order (the contract between C4, C7 and C6), and Parquet
//! persistence.

use crate::config::FeaturesConfig;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One row: `epoch_id`, `channel`, then the feature columns in the
/// canonical order from §4.4.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    pub epoch_id: i64,
    pub channel: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    pub column_names: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

/// `band_<name>` (band order), then `rel_<name>`, then the fixed
/// time-domain stat order, then Hjorth, then sample entropy.
pub fn canonical_column_names(features: &FeaturesConfig) -> Vec<String> {
    let mut columns = Vec::new();
    for band in &features.bands {
        columns.push(format!("band_{}", band.name));
    }
    for band in &features.bands {
        columns.push(format!("rel_{}", band.name));
    }
    columns.extend(
        ["mean", "std", "skewness", "excess_kurtosis", "rms", "peak_to_peak", "zero_crossings"]
            .iter()
            .map(|s| s.to_string()),
    );
    columns.extend(
        ["hjorth_activity", "hjorth_mobility", "hjorth_complexity"]
            .iter()
            .map(|s| s.to_string()),
    );
    columns.push("sample_entropy".to_string());
    columns
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub epoch_count: usize,
    pub channel_count: usize,
    pub feature_names: Vec<String>,
    pub stats: std::collections::BTreeMap<String, FeatureColumnStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureColumnStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

pub fn summarize(table: &FeatureTable) -> FeatureSummary {
    let channel_count = table
        .rows
        .iter()
        .map(|r| r.channel.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    let epoch_count = table
        .rows
        .iter()
        .map(|r| r.epoch_id)
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    let mut stats = std::collections::BTreeMap::new();
    for (col_idx, name) in table.column_names.iter().enumerate() {
        let values: Vec<f64> = table.rows.iter().map(|r| r.values[col_idx]).collect();
        let n = values.len().max(1) as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        stats.insert(
            name.clone(),
            FeatureColumnStats {
                mean,
                std: var.sqrt(),
                min,
                max,
            },
        );
    }

    FeatureSummary {
        epoch_count,
        channel_count,
        feature_names: table.column_names.clone(),
        stats,
    }
}

/// Channel-averaged view used by the trainer by default (§4.4, and Open
/// Question (a): this loses spatial information, an intended
/// simplification).
pub fn channel_averaged(table: &FeatureTable) -> FeatureTable {
    use std::collections::BTreeMap;
    let mut by_epoch: BTreeMap<i64, Vec<&FeatureRow>> = BTreeMap::new();
    for row in &table.rows {
        by_epoch.entry(row.epoch_id).or_default().push(row);
    }

    let n_cols = table.column_names.len();
    let mut rows = Vec::with_capacity(by_epoch.len());
    for (epoch_id, members) in by_epoch {
        let mut values = vec![0.0; n_cols];
        for member in &members {
            for (i, v) in member.values.iter().enumerate() {
                values[i] += v / members.len() as f64;
            }
        }
        rows.push(FeatureRow {
            epoch_id,
            channel: "average".to_string(),
            values,
        });
    }

    FeatureTable {
        column_names: table.column_names.clone(),
        rows,
    }
}

/// Serialize the feature table to columnar Parquet with columns
/// `epoch_id:int, channel:string, <feature_columns>:float64`, per §6.
pub fn write_parquet(table: &FeatureTable) -> Result<Vec<u8>> {
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    let mut fields = vec![
        Field::new("epoch_id", DataType::Int64, false),
        Field::new("channel", DataType::Utf8, false),
    ];
    for name in &table.column_names {
        fields.push(Field::new(name, DataType::Float64, false));
    }
    let schema = Arc::new(Schema::new(fields));

    let epoch_ids = Int64Array::from(table.rows.iter().map(|r| r.epoch_id).collect::<Vec<_>>());
    let channels = StringArray::from(table.rows.iter().map(|r| r.channel.clone()).collect::<Vec<_>>());

    let mut columns: Vec<Arc<dyn arrow::array::Array>> = vec![Arc::new(epoch_ids), Arc::new(channels)];
    for col_idx in 0..table.column_names.len() {
        let values: Vec<f64> = table.rows.iter().map(|r| r.values[col_idx]).collect();
        columns.push(Arc::new(Float64Array::from(values)));
    }

    let batch = RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| PipelineError::Data(format!("failed to build feature record batch: {e}")))?;

    let mut buffer = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)
            .map_err(|e| PipelineError::Data(format!("failed to open parquet writer: {e}")))?;
        writer
            .write(&batch)
            .map_err(|e| PipelineError::Data(format!("failed to write parquet batch: {e}")))?;
        writer
            .close()
            .map_err(|e| PipelineError::Data(format!("failed to close parquet writer: {e}")))?;
    }
    Ok(buffer)
}

pub fn read_parquet(bytes: &[u8]) -> Result<FeatureTable> {
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::copy_from_slice(bytes))
        .map_err(|e| PipelineError::Data(format!("failed to open parquet reader: {e}")))?
        .build()
        .map_err(|e| PipelineError::Data(format!("failed to build parquet reader: {e}")))?;

    let mut column_names = Vec::new();
    let mut rows = Vec::new();

    for batch in reader {
        let batch = batch.map_err(|e| PipelineError::Data(format!("failed to read parquet batch: {e}")))?;
        if column_names.is_empty() {
            column_names = batch
                .schema()
                .fields()
                .iter()
                .skip(2)
                .map(|f| f.name().clone())
                .collect();
        }
        let epoch_ids = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| PipelineError::Data("epoch_id column has unexpected type".into()))?;
        let channels = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| PipelineError::Data("channel column has unexpected type".into()))?;
        let feature_cols: Vec<&Float64Array> = (2..batch.num_columns())
            .map(|i| {
                batch
                    .column(i)
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .expect("feature columns are float64")
            })
            .collect();

        for row_idx in 0..batch.num_rows() {
            let values = feature_cols.iter().map(|col| col.value(row_idx)).collect();
            rows.push(FeatureRow {
                epoch_id: epoch_ids.value(row_idx),
                channel: channels.value(row_idx).to_string(),
                values,
            });
        }
    }

    Ok(FeatureTable { column_names, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeaturesConfig;

    #[test]
    fn canonical_order_matches_spec_sequence() {
        let features = FeaturesConfig::default();
        let columns = canonical_column_names(&features);
        assert_eq!(columns[0], "band_delta");
        assert_eq!(columns[5], "rel_delta");
        assert!(columns.contains(&"hjorth_activity".to_string()));
        assert_eq!(columns.last().unwrap(), "sample_entropy");
    }

    fn sample_table() -> FeatureTable {
        let columns = vec!["band_delta".to_string(), "rel_delta".to_string()];
        FeatureTable {
            column_names: columns,
            rows: vec![
                FeatureRow { epoch_id: 0, channel: "Fz".into(), values: vec![1.0, 0.5] },
                FeatureRow { epoch_id: 0, channel: "Pz".into(), values: vec![2.0, 0.7] },
                FeatureRow { epoch_id: 1, channel: "Fz".into(), values: vec![1.5, 0.6] },
                FeatureRow { epoch_id: 1, channel: "Pz".into(), values: vec![2.5, 0.8] },
            ],
        }
    }

    #[test]
    fn parquet_round_trip_preserves_values() {
        let table = sample_table();
        let bytes = write_parquet(&table).unwrap();
        let decoded = read_parquet(&bytes).unwrap();
        assert_eq!(decoded.column_names, table.column_names);
        assert_eq!(decoded.rows.len(), table.rows.len());
    }

    #[test]
    fn channel_averaging_reduces_to_one_row_per_epoch() {
        let table = sample_table();
        let averaged = channel_averaged(&table);
        assert_eq!(averaged.rows.len(), 2);
        assert_eq!(averaged.rows[0].values[0], 1.5);
    }

    #[test]
    fn summary_reports_expected_counts() {
        let table = sample_table();
        let summary = summarize(&table);
        assert_eq!(summary.epoch_count, 2);
        assert_eq!(summary.channel_count, 2);
    }
}
