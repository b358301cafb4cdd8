//! Ingestion side: infer column types from observed values and write the
//! packed, optionally deflated, dataset file that [`Dataset`] loads.
//!
//! Parsing of the source CSV stays with the caller; this module starts from
//! typed [`Value`]s.

use std::io::Write;
use std::path::Path;

use flate2::{Compression, write::ZlibEncoder};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::processor::{
    EngineError, Result, Value,
    codec::RowEncoder,
    dataset::{Dataset, HEADER_PREFIX},
    schema::{ColumnDescriptor, ColumnType, Schema, round_up4},
};

/// Running statistics of one column's values
#[derive(Debug, Clone)]
pub struct ColumnStats {
    min: f64,
    max: f64,
    fractional: bool,
    numbers: u64,
    texts: u64,
    max_len: usize,
}

impl Default for ColumnStats {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            fractional: false,
            numbers: 0,
            texts: 0,
            max_len: 0,
        }
    }
}

impl ColumnStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, value: &Value) {
        match value {
            Value::Int(v) => self.observe_number(*v as f64),
            Value::Float(v) => self.observe_number(*v),
            Value::Bytes(b) => {
                self.texts += 1;
                self.max_len = self.max_len.max(b.len());
            }
        }
    }

    fn observe_number(&mut self, v: f64) {
        self.numbers += 1;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.fractional |= v.fract() != 0.0;
    }

    /// Smallest column type that holds every observed value.
    ///
    /// Any text makes the column a string; any fractional number makes it
    /// `Float32`. Integers pick the signed ladder when a negative value was
    /// seen and the unsigned ladder otherwise.
    pub fn infer_type(&self) -> Result<ColumnType> {
        if self.texts > 0 || self.numbers == 0 {
            return Ok(ColumnType::String);
        }
        if self.fractional {
            return Ok(ColumnType::Float32);
        }

        let (min, max) = (self.min as i64, self.max as i64);
        let ladder: &[ColumnType] = if min < 0 {
            &[ColumnType::Int8, ColumnType::Int16, ColumnType::Int32]
        } else {
            &[ColumnType::Uint8, ColumnType::Uint16, ColumnType::Uint32]
        };

        ladder
            .iter()
            .copied()
            .find(|t| {
                t.int_range()
                    .is_some_and(|(lo, hi)| min >= lo && max <= hi)
            })
            .ok_or_else(|| {
                EngineError::Encode(format!("range [{min}, {max}] does not fit 32 bits"))
            })
    }

    /// Byte width for the inferred type; text columns use the longest value.
    pub fn width(&self) -> Result<usize> {
        let column_type = self.infer_type()?;
        Ok(column_type.fixed_width().unwrap_or(self.max_len.max(1)))
    }
}

/// Lays out a packed row: numeric columns, then text and date columns, then
/// the pinned columns in pin order. Input order is kept as the original order.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, ColumnType, usize)>,
    pinned_last: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn numeric(self, name: &str, column_type: ColumnType) -> Self {
        let width = column_type.fixed_width().unwrap_or(1);
        self.column(name, column_type, width)
    }

    pub fn text(self, name: &str, size: usize) -> Self {
        self.column(name, ColumnType::String, size)
    }

    pub fn date(self, name: &str, size: usize) -> Self {
        self.column(name, ColumnType::Date, size)
    }

    pub fn column(mut self, name: &str, column_type: ColumnType, size: usize) -> Self {
        self.fields.push((name.to_string(), column_type, size));
        self
    }

    pub fn inferred(self, name: &str, stats: &ColumnStats) -> Result<Self> {
        Ok(self.column(name, stats.infer_type()?, stats.width()?))
    }

    /// Keeps `name` at the end of the row, after every other column.
    pub fn pin_last(mut self, name: &str) -> Self {
        self.pinned_last.push(name.to_string());
        self
    }

    pub fn build(self) -> Result<Schema> {
        if self.fields.is_empty() {
            return Err(EngineError::Schema("schema has no columns".into()));
        }

        let pinned = |name: &str| self.pinned_last.iter().any(|p| p == name);
        let numeric = self
            .fields
            .iter()
            .filter(|(n, t, _)| !t.is_bytes() && !pinned(n.as_str()));
        let bytes = self
            .fields
            .iter()
            .filter(|(n, t, _)| t.is_bytes() && !pinned(n.as_str()));
        let last = self
            .pinned_last
            .iter()
            .filter_map(|p| self.fields.iter().find(|(n, _, _)| n == p));

        let mut offset = 0;
        let columns: Vec<ColumnDescriptor> = numeric
            .chain(bytes)
            .chain(last)
            .map(|(name, column_type, size)| {
                let column = ColumnDescriptor {
                    name: name.clone(),
                    column_type: *column_type,
                    size: *size,
                    offset,
                };
                offset += size;
                column
            })
            .collect();

        let original = self.fields.iter().map(|(n, _, _)| n.clone()).collect();
        Ok(Schema::new(columns, round_up4(offset), 0)?.with_original_order(original))
    }
}

/// Packs rows and writes the dataset file.
///
/// Values are given in the schema's original column order.
#[derive(Debug)]
pub struct DatasetWriter {
    schema: Schema,
    encoder: RowEncoder,
    rows: Vec<u8>,
    count: usize,
}

impl DatasetWriter {
    pub fn new(schema: Schema) -> Self {
        let by_original: Option<Vec<&ColumnDescriptor>> = schema
            .column_order_original()
            .iter()
            .map(|name| schema.column(name))
            .collect();
        let encoder = match by_original {
            Some(columns) if columns.len() == schema.len() => {
                RowEncoder::new(columns, schema.row_size())
            }
            _ => RowEncoder::new(schema.columns(), schema.row_size()),
        };

        Self {
            schema,
            encoder,
            rows: Vec::new(),
            count: 0,
        }
    }

    pub fn push(&mut self, values: Vec<Value>) -> Result<()> {
        let row_size = self.schema.row_size();
        let start = self.rows.len();
        self.rows.resize(start + row_size, 0);
        if let Err(e) = self.encoder.encode(&values, &mut self.rows[start..]) {
            self.rows.truncate(start);
            return Err(e);
        }
        self.count += 1;
        Ok(())
    }

    /// Encodes a batch of rows in parallel.
    pub fn extend(&mut self, batch: &[Vec<Value>]) -> Result<()> {
        let row_size = self.schema.row_size();
        if row_size == 0 || batch.is_empty() {
            return Ok(());
        }

        let start = self.rows.len();
        self.rows.resize(start + batch.len() * row_size, 0);
        let encoder = &self.encoder;
        let result = self.rows[start..]
            .par_chunks_mut(row_size)
            .zip(batch.par_iter())
            .try_for_each(|(slot, values)| encoder.encode(values, slot));

        if let Err(e) = result {
            self.rows.truncate(start);
            return Err(e);
        }
        self.count += batch.len();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Header-length prefix, zero-padded JSON header, then the packed rows.
    pub fn finish_raw(self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.count)
            .map_err(|_| EngineError::Encode(format!("{} rows exceed u32", self.count)))?;
        let schema = self.schema.with_row_count(count);

        let mut header = serde_json::to_vec(&schema.to_header())?;
        header.resize(header.len().next_multiple_of(4), 0);

        let mut out = Vec::with_capacity(HEADER_PREFIX + header.len() + self.rows.len());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.rows);
        debug!(rows = count, header = header.len(), bytes = out.len(), "packed dataset");
        Ok(out)
    }

    /// The raw blob deflated with zlib at maximum compression.
    pub fn finish_compressed(self) -> Result<Vec<u8>> {
        let raw = self.finish_raw()?;
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::best());
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    }

    pub fn write_to(self, path: &Path) -> Result<()> {
        let rows = self.count;
        let bytes = self.finish_compressed()?;
        std::fs::write(path, &bytes)?;
        info!(path = %path.display(), rows, bytes = bytes.len(), "dataset written");
        Ok(())
    }

    pub fn into_dataset(self) -> Result<Dataset> {
        Dataset::from_raw(self.finish_raw()?)
    }
}
