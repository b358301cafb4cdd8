use std::{fs::File, io::Read, path::Path, sync::Arc, time::Instant};

use flate2::read::ZlibDecoder;
use memmap2::Mmap;
use tracing::{debug, info};

use crate::processor::{
    EngineError, Result,
    schema::{DatasetHeader, Schema},
};

/// Size of the little-endian header-length prefix
pub const HEADER_PREFIX: usize = 4;

/// Decompressed dataset: the parsed schema plus the packed rows.
///
/// Read-only after load; workers share it through an `Arc` without locking.
#[derive(Debug)]
pub struct Dataset {
    schema: Arc<Schema>,
    bytes: Vec<u8>,
    rows_start: usize,
}

impl Dataset {
    /// Inflates a zlib-compressed dataset file and parses it
    ///
    /// # Errors
    /// Returns an [`EngineError`] if:
    /// - the payload is not a valid zlib stream
    /// - the header is malformed (see [`Dataset::from_raw`])
    pub fn load(compressed: &[u8]) -> Result<Self> {
        let start = Instant::now();
        let mut bytes = Vec::with_capacity(compressed.len() * 4);
        ZlibDecoder::new(compressed).read_to_end(&mut bytes)?;
        debug!(
            compressed = compressed.len(),
            inflated = bytes.len(),
            "inflated dataset"
        );

        let dataset = Self::from_raw(bytes)?;
        info!(
            rows = dataset.row_count(),
            row_size = dataset.row_size(),
            columns = dataset.schema.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Memory-maps a compressed dataset file and loads it
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::load(&mmap[..])
    }

    /// Parses an already-inflated blob: length prefix, JSON header, packed rows.
    ///
    /// Fails closed; no partially valid dataset is ever returned.
    pub fn from_raw(bytes: Vec<u8>) -> Result<Self> {
        let (header, rows_start) = parse_header(&bytes)?;
        let schema = Schema::from_header(&header)?;

        let expected = schema.row_count() as usize * schema.row_size();
        let actual = bytes.len() - rows_start;
        if actual < expected {
            return Err(EngineError::Truncated { expected, actual });
        }

        Ok(Self {
            schema: Arc::new(schema),
            bytes,
            rows_start,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn row_count(&self) -> u32 {
        self.schema.row_count()
    }

    pub fn row_size(&self) -> usize {
        self.schema.row_size()
    }

    /// Packed row bytes, `row_count * row_size` long.
    pub fn rows(&self) -> &[u8] {
        let len = self.row_count() as usize * self.row_size();
        &self.bytes[self.rows_start..self.rows_start + len]
    }

    #[inline]
    pub fn row(&self, index: u32) -> &[u8] {
        let size = self.row_size();
        let start = self.rows_start + index as usize * size;
        &self.bytes[start..start + size]
    }
}

fn parse_header(bytes: &[u8]) -> Result<(DatasetHeader, usize)> {
    if bytes.len() < HEADER_PREFIX {
        return Err(EngineError::Schema("missing header length".into()));
    }
    let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if header_len % 4 != 0 {
        return Err(EngineError::Schema(format!(
            "header length {header_len} is not 4-byte aligned"
        )));
    }
    let rows_start = HEADER_PREFIX + header_len;
    if bytes.len() < rows_start {
        return Err(EngineError::Schema(format!(
            "header length {header_len} exceeds file size {}",
            bytes.len()
        )));
    }

    let json = crate::processor::trim_padding(&bytes[HEADER_PREFIX..rows_start]);
    let header = serde_json::from_slice(json)?;
    Ok((header, rows_start))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{Compression, write::ZlibEncoder};

    use super::*;

    fn blob(header: &str, rows: &[u8]) -> Vec<u8> {
        let mut json = header.as_bytes().to_vec();
        json.resize(json.len().next_multiple_of(4), 0);
        let mut out = (json.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&json);
        out.extend_from_slice(rows);
        out
    }

    const HEADER: &str = r#"{"columns":{"Passengers":{"type":"Uint32","size":4,"offset":0},"Origin_airport":{"type":"string","size":3,"offset":4}},"columnOrder":["Passengers","Origin_airport"],"count":2,"rowSize":8}"#;

    fn rows() -> Vec<u8> {
        let mut rows = Vec::new();
        rows.extend_from_slice(&120u32.to_le_bytes());
        rows.extend_from_slice(b"BOS\0");
        rows.extend_from_slice(&50u32.to_le_bytes());
        rows.extend_from_slice(b"ORD\0");
        rows
    }

    #[test]
    fn test_from_raw_reads_rows() {
        let dataset = Dataset::from_raw(blob(HEADER, &rows())).unwrap();
        assert_eq!(dataset.row_count(), 2);
        assert_eq!(&dataset.row(1)[4..7], b"ORD");
        assert_eq!(dataset.rows().len(), 16);
    }

    #[test]
    fn test_load_inflates() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&blob(HEADER, &rows())).unwrap();
        let compressed = encoder.finish().unwrap();

        let dataset = Dataset::load(&compressed).unwrap();
        assert_eq!(&dataset.row(0)[0..4], &120u32.to_le_bytes());
    }

    #[test]
    fn test_truncated_rows_fail() {
        let short = rows()[..12].to_vec();
        assert!(matches!(
            Dataset::from_raw(blob(HEADER, &short)),
            Err(EngineError::Truncated {
                expected: 16,
                actual: 12
            })
        ));
    }

    #[test]
    fn test_bad_prefix_fails() {
        assert!(matches!(Dataset::from_raw(vec![1, 0]), Err(EngineError::Schema(_))));

        let mut misaligned = blob(HEADER, &rows());
        misaligned[0] += 1;
        assert!(matches!(Dataset::from_raw(misaligned), Err(EngineError::Schema(_))));

        let mut oversized = blob(HEADER, &rows());
        oversized[..4].copy_from_slice(&4096u32.to_le_bytes());
        assert!(matches!(Dataset::from_raw(oversized), Err(EngineError::Schema(_))));
    }

    #[test]
    fn test_not_zlib_fails() {
        assert!(matches!(
            Dataset::load(b"definitely not deflate"),
            Err(EngineError::Io(_))
        ));
    }
}
