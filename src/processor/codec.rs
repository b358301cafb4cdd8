use std::collections::HashMap;
use std::sync::Arc;

use crate::processor::byte_string::FixedByteBuffer;
use crate::processor::schema::{ColumnDescriptor, ColumnType, Schema};
use crate::processor::{EngineError, Result, Value};

/// Numeric storage kind, resolved once per column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    F32,
}

impl NumericKind {
    fn of(column_type: ColumnType) -> Option<Self> {
        match column_type {
            ColumnType::Int8 => Some(NumericKind::I8),
            ColumnType::Int16 => Some(NumericKind::I16),
            ColumnType::Int32 => Some(NumericKind::I32),
            ColumnType::Uint8 => Some(NumericKind::U8),
            ColumnType::Uint16 => Some(NumericKind::U16),
            ColumnType::Uint32 => Some(NumericKind::U32),
            ColumnType::Float32 => Some(NumericKind::F32),
            ColumnType::String | ColumnType::Date => None,
        }
    }
}

/// Borrowed cell produced by the row decoder; byte columns alias the row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Int(i64),
    Float(f64),
    Bytes(FixedByteBuffer<'a>),
}

impl Cell<'_> {
    pub fn to_value(&self) -> Value {
        match self {
            Cell::Int(v) => Value::Int(*v),
            Cell::Float(v) => Value::Float(*v),
            Cell::Bytes(b) => Value::Bytes(b.to_vec()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            Cell::Bytes(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericDecoder {
    offset: usize,
    kind: NumericKind,
}

impl NumericDecoder {
    #[inline]
    fn read_i64(&self, row: &[u8]) -> i64 {
        let o = self.offset;
        match self.kind {
            NumericKind::I8 => row[o] as i8 as i64,
            NumericKind::U8 => row[o] as i64,
            NumericKind::I16 => i16::from_le_bytes([row[o], row[o + 1]]) as i64,
            NumericKind::U16 => u16::from_le_bytes([row[o], row[o + 1]]) as i64,
            NumericKind::I32 => {
                i32::from_le_bytes([row[o], row[o + 1], row[o + 2], row[o + 3]]) as i64
            }
            NumericKind::U32 => {
                u32::from_le_bytes([row[o], row[o + 1], row[o + 2], row[o + 3]]) as i64
            }
            NumericKind::F32 => self.read_f32(row) as i64,
        }
    }

    #[inline]
    fn read_f32(&self, row: &[u8]) -> f32 {
        let o = self.offset;
        f32::from_le_bytes([row[o], row[o + 1], row[o + 2], row[o + 3]])
    }

    /// Reads the column as `f64`; every supported width converts exactly.
    #[inline]
    pub fn read_f64(&self, row: &[u8]) -> f64 {
        match self.kind {
            NumericKind::F32 => self.read_f32(row) as f64,
            _ => self.read_i64(row) as f64,
        }
    }

    /// Reads the column truncated to `u32`, for accumulation into totals.
    #[inline]
    pub fn read_u32(&self, row: &[u8]) -> u32 {
        match self.kind {
            NumericKind::F32 => self.read_f32(row) as u32,
            _ => self.read_i64(row) as u32,
        }
    }

    #[inline]
    pub fn read_cell(&self, row: &[u8]) -> Cell<'static> {
        match self.kind {
            NumericKind::F32 => Cell::Float(self.read_f32(row) as f64),
            _ => Cell::Int(self.read_i64(row)),
        }
    }

    pub fn kind(&self) -> NumericKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesDecoder {
    offset: usize,
    size: usize,
}

impl BytesDecoder {
    /// Repoints `view` at this column's slot in `row`.
    #[inline]
    pub fn rebind<'a>(&self, row: &'a [u8], view: &mut FixedByteBuffer<'a>) {
        view.rebind(row, self.offset, self.offset + self.size);
    }

    #[inline]
    pub fn view<'a>(&self, row: &'a [u8]) -> FixedByteBuffer<'a> {
        FixedByteBuffer::new(self.slice(row))
    }

    #[inline]
    pub fn slice<'a>(&self, row: &'a [u8]) -> &'a [u8] {
        &row[self.offset..self.offset + self.size]
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Reads one column out of a row slice.
///
/// The variant is chosen once when the codec is built so the scan loop never
/// re-inspects the column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDecoder {
    Numeric(NumericDecoder),
    Bytes(BytesDecoder),
}

impl ColumnDecoder {
    pub fn new(column: &ColumnDescriptor) -> Self {
        match NumericKind::of(column.column_type) {
            Some(kind) => ColumnDecoder::Numeric(NumericDecoder {
                offset: column.offset,
                kind,
            }),
            None => ColumnDecoder::Bytes(BytesDecoder {
                offset: column.offset,
                size: column.size,
            }),
        }
    }

    #[inline]
    pub fn decode<'a>(&self, row: &'a [u8]) -> Cell<'a> {
        match self {
            ColumnDecoder::Numeric(d) => d.read_cell(row),
            ColumnDecoder::Bytes(d) => Cell::Bytes(d.view(row)),
        }
    }

    pub fn as_numeric(&self) -> Option<&NumericDecoder> {
        match self {
            ColumnDecoder::Numeric(d) => Some(d),
            ColumnDecoder::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&BytesDecoder> {
        match self {
            ColumnDecoder::Bytes(d) => Some(d),
            ColumnDecoder::Numeric(_) => None,
        }
    }
}

/// Writes one column into a row slice, rejecting values the column cannot hold.
#[derive(Debug, Clone)]
pub struct ColumnEncoder {
    name: String,
    column_type: ColumnType,
    offset: usize,
    size: usize,
}

impl ColumnEncoder {
    pub fn new(column: &ColumnDescriptor) -> Self {
        Self {
            name: column.name.clone(),
            column_type: column.column_type,
            offset: column.offset,
            size: column.size,
        }
    }

    pub fn encode(&self, value: &Value, row: &mut [u8]) -> Result<()> {
        let slot = &mut row[self.offset..self.offset + self.size];

        if self.column_type.is_bytes() {
            let Value::Bytes(bytes) = value else {
                return Err(self.mismatch(value));
            };
            if bytes.len() > self.size {
                return Err(EngineError::Encode(format!(
                    "{} bytes do not fit column {} of size {}",
                    bytes.len(),
                    self.name,
                    self.size
                )));
            }
            slot[..bytes.len()].copy_from_slice(bytes);
            slot[bytes.len()..].fill(0);
            return Ok(());
        }

        if self.column_type == ColumnType::Float32 {
            let v = value.as_f64().ok_or_else(|| self.mismatch(value))?;
            slot.copy_from_slice(&(v as f32).to_le_bytes());
            return Ok(());
        }

        let v = match value {
            Value::Int(v) => *v,
            Value::Float(f) if f.fract() == 0.0 => *f as i64,
            _ => return Err(self.mismatch(value)),
        };
        let (min, max) = self.column_type.int_range().unwrap_or((i64::MIN, i64::MAX));
        if v < min || v > max {
            return Err(EngineError::Encode(format!(
                "{v} out of range for column {} of type {}",
                self.name, self.column_type
            )));
        }

        // Two's complement little-endian; the low bytes carry the value for every width.
        slot.copy_from_slice(&v.to_le_bytes()[..self.size]);
        Ok(())
    }

    fn mismatch(&self, value: &Value) -> EngineError {
        EngineError::Encode(format!(
            "value {value} cannot be stored in column {} of type {}",
            self.name, self.column_type
        ))
    }
}

/// Owned snapshot of a decoded row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    names: Arc<HashMap<String, usize>>,
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names.get(name).map(|&i| &self.values[i])
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Applies every column decoder in schema order.
#[derive(Debug, Clone)]
pub struct RowDecoder {
    decoders: Vec<ColumnDecoder>,
    names: Arc<HashMap<String, usize>>,
}

impl RowDecoder {
    /// Fills `out` with one cell per column. Reuses `out`'s allocation, and
    /// byte cells left by a previous row are rebound in place.
    pub fn decode_into<'a>(&self, row: &'a [u8], out: &mut Vec<Cell<'a>>) {
        if out.len() != self.decoders.len() {
            out.clear();
            out.extend(self.decoders.iter().map(|d| d.decode(row)));
            return;
        }
        for (cell, decoder) in out.iter_mut().zip(&self.decoders) {
            match (decoder, cell) {
                (ColumnDecoder::Bytes(d), Cell::Bytes(view)) => d.rebind(row, view),
                (d, cell) => *cell = d.decode(row),
            }
        }
    }

    pub fn decode_owned(&self, row: &[u8]) -> Row {
        Row {
            names: Arc::clone(&self.names),
            values: self.decoders.iter().map(|d| d.decode(row).to_value()).collect(),
        }
    }
}

/// Encodes a full row from values given in schema order.
#[derive(Debug, Clone)]
pub struct RowEncoder {
    encoders: Vec<ColumnEncoder>,
    row_size: usize,
}

impl RowEncoder {
    /// Encoder whose value order follows `columns` instead of the schema.
    pub fn new<'c>(columns: impl IntoIterator<Item = &'c ColumnDescriptor>, row_size: usize) -> Self {
        Self {
            encoders: columns.into_iter().map(ColumnEncoder::new).collect(),
            row_size,
        }
    }

    pub fn encode(&self, values: &[Value], row: &mut [u8]) -> Result<()> {
        if values.len() != self.encoders.len() {
            return Err(EngineError::Encode(format!(
                "expected {} values, got {}",
                self.encoders.len(),
                values.len()
            )));
        }
        if row.len() < self.row_size {
            return Err(EngineError::Encode(format!(
                "row buffer of {} bytes is smaller than row size {}",
                row.len(),
                self.row_size
            )));
        }
        row[..self.row_size].fill(0);
        for (encoder, value) in self.encoders.iter().zip(values) {
            encoder.encode(value, row)?;
        }
        Ok(())
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }
}

/// Schema-bound decoders and encoders for every column.
#[derive(Debug, Clone)]
pub struct ColumnCodec {
    decoders: Vec<ColumnDecoder>,
    encoders: Vec<ColumnEncoder>,
    name_to_index: Arc<HashMap<String, usize>>,
    row_size: usize,
}

impl ColumnCodec {
    pub fn build(schema: &Schema) -> Self {
        let decoders = schema.columns().iter().map(ColumnDecoder::new).collect();
        let encoders = schema.columns().iter().map(ColumnEncoder::new).collect();
        let name_to_index = schema
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        Self {
            decoders,
            encoders,
            name_to_index: Arc::new(name_to_index),
            row_size: schema.row_size(),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn decoder(&self, name: &str) -> Result<&ColumnDecoder> {
        self.index_of(name)
            .map(|i| &self.decoders[i])
            .ok_or_else(|| EngineError::MissingColumn(name.to_string()))
    }

    pub fn row_decoder(&self) -> RowDecoder {
        RowDecoder {
            decoders: self.decoders.clone(),
            names: Arc::clone(&self.name_to_index),
        }
    }

    pub fn row_encoder(&self) -> RowEncoder {
        RowEncoder {
            encoders: self.encoders.clone(),
            row_size: self.row_size,
        }
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }
}
