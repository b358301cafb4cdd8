use std::{cell::Cell, sync::Arc};

use tracing::{debug, trace};

use crate::processor::{
    EngineError, FilterOp, FilterSpec, FilterValue, Result,
    byte_string::{FixedByteBuffer, FixedByteBufferMut},
    codec::{BytesDecoder, ColumnCodec, ColumnDecoder, NumericDecoder, NumericKind},
    config::{RouteLayout, WebGlLayout},
    dataset::Dataset,
    hash_table::{ConcurrentHashTable, InsertOutcome},
    region::SharedRegion,
    scan_state::{CancelToken, ScanState},
    schema::{INSTANCES_COLUMN, Schema, WEBGL_RECORD_SIZE, route_schema},
};

/// A compiled single-column predicate
#[derive(Debug, Clone)]
pub enum RowFilter {
    Numeric {
        decoder: NumericDecoder,
        op: FilterOp,
        value: f64,
    },
    Text {
        decoder: BytesDecoder,
        op: FilterOp,
        needle: Vec<u8>,
    },
}

impl RowFilter {
    /// Resolves `spec` against the dataset schema.
    ///
    /// All type checks happen here, so a query that fails them never reaches
    /// a worker. For `equal`/`notEqual` on byte columns the needle is
    /// zero-padded to the column width, since padding is part of the value.
    pub fn compile(spec: &FilterSpec, schema: &Schema, codec: &ColumnCodec) -> Result<Self> {
        let column = schema.require(&spec.column)?;
        if !spec.op.supports(column.column_type) {
            return Err(EngineError::FilterTypeMismatch {
                column: spec.column.clone(),
                op: spec.op,
                column_type: column.column_type,
            });
        }

        match *codec.decoder(&spec.column)? {
            ColumnDecoder::Numeric(decoder) => {
                let value = match &spec.value {
                    FilterValue::Number(n) => *n,
                    FilterValue::Text(text) => fast_float::parse::<f64, _>(text.trim())
                        .map_err(|_| EngineError::InvalidFilterValue {
                            column: spec.column.clone(),
                            value: text.clone(),
                        })?,
                };
                // Float32 columns compare at f32 precision.
                let value = match decoder.kind() {
                    NumericKind::F32 => value as f32 as f64,
                    _ => value,
                };
                Ok(RowFilter::Numeric {
                    decoder,
                    op: spec.op,
                    value,
                })
            }
            ColumnDecoder::Bytes(decoder) => {
                let mut needle = match &spec.value {
                    FilterValue::Text(text) => text.as_bytes().to_vec(),
                    FilterValue::Number(n) => n.to_string().into_bytes(),
                };
                if spec.op != FilterOp::Contains && needle.len() < decoder.size() {
                    needle.resize(decoder.size(), 0);
                }
                Ok(RowFilter::Text {
                    decoder,
                    op: spec.op,
                    needle,
                })
            }
        }
    }

    #[inline]
    pub fn matches(&self, row: &[u8]) -> bool {
        match self {
            RowFilter::Numeric { decoder, op, value } => {
                let v = decoder.read_f64(row);
                match op {
                    FilterOp::Equal => v == *value,
                    FilterOp::NotEqual => v != *value,
                    FilterOp::MoreThan => v > *value,
                    FilterOp::LessThan => v < *value,
                    FilterOp::Contains => false,
                }
            }
            RowFilter::Text {
                decoder,
                op,
                needle,
            } => {
                let view = decoder.view(row);
                let needle = FixedByteBuffer::new(needle);
                match op {
                    FilterOp::Contains => view.contains_case_insensitive(&needle),
                    FilterOp::Equal => view.equals_case_insensitive(&needle),
                    FilterOp::NotEqual => !view.equals_case_insensitive(&needle),
                    FilterOp::MoreThan | FilterOp::LessThan => false,
                }
            }
        }
    }
}

fn key_column(schema: &Schema, codec: &ColumnCodec, name: &str) -> Result<BytesDecoder> {
    codec.decoder(name)?.as_bytes().copied().ok_or_else(|| {
        let column_type = schema.column(name).map(|c| c.column_type.to_string());
        EngineError::Schema(format!(
            "route column {name} must be a string column, found {}",
            column_type.unwrap_or_default()
        ))
    })
}

/// A column summed into `u32` record fields.
fn count_column(schema: &Schema, codec: &ColumnCodec, name: &str) -> Result<NumericDecoder> {
    let column = schema.require(name)?;
    if !column.column_type.is_unsigned() {
        return Err(EngineError::Schema(format!(
            "column {name} must be an unsigned integer, found {}",
            column.column_type
        )));
    }
    numeric_column(schema, codec, name)
}

fn numeric_column(schema: &Schema, codec: &ColumnCodec, name: &str) -> Result<NumericDecoder> {
    codec.decoder(name)?.as_numeric().copied().ok_or_else(|| {
        EngineError::Schema(format!(
            "column {name} must be numeric, found {}",
            schema.require(name).map(|c| c.column_type.to_string()).unwrap_or_default()
        ))
    })
}

/// Origin and destination slots concatenated into one table key
#[derive(Debug, Clone)]
pub struct RouteKey {
    origin: BytesDecoder,
    destination: BytesDecoder,
}

impl RouteKey {
    fn new(schema: &Schema, codec: &ColumnCodec, layout: &RouteLayout) -> Result<Self> {
        Ok(Self {
            origin: key_column(schema, codec, &layout.origin)?,
            destination: key_column(schema, codec, &layout.destination)?,
        })
    }

    pub fn size(&self) -> usize {
        self.origin.size() + self.destination.size()
    }

    /// Writes the key for `row` into `scratch`, which must be `size()` long.
    #[inline]
    fn fill(&self, row: &[u8], scratch: &mut [u8]) {
        let (head, tail) = scratch.split_at_mut(self.origin.size());
        FixedByteBufferMut::new(head).copy_from(&self.origin.view(row));
        FixedByteBufferMut::new(tail).copy_from(&self.destination.view(row));
    }
}

/// How `byRoute` fills a result record
#[derive(Debug, Clone)]
pub struct RoutePlan {
    key: RouteKey,
    instances: usize,
    measures: Vec<(NumericDecoder, usize)>,
    result_schema: Schema,
}

impl RoutePlan {
    pub fn new(schema: &Schema, codec: &ColumnCodec, layout: &RouteLayout) -> Result<Self> {
        let key = RouteKey::new(schema, codec, layout)?;

        let mut present = Vec::with_capacity(layout.measures.len());
        for name in &layout.measures {
            match schema.column(name) {
                Some(c) if c.column_type.is_unsigned() => present.push(name.as_str()),
                Some(c) => {
                    debug!(
                        column = %name,
                        column_type = %c.column_type,
                        "skipping measure that is not an unsigned integer"
                    )
                }
                None => debug!(column = %name, "skipping absent measure"),
            }
        }

        let result_schema = route_schema(
            schema.require(&layout.origin)?,
            schema.require(&layout.destination)?,
            &present,
        )?;
        let instances = result_schema.require(INSTANCES_COLUMN)?.offset;
        let measures = present
            .iter()
            .map(|name| {
                Ok((
                    count_column(schema, codec, name)?,
                    result_schema.require(name)?.offset,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            key,
            instances,
            measures,
            result_schema,
        })
    }

    pub fn result_schema(&self) -> &Schema {
        &self.result_schema
    }

    pub fn key_size(&self) -> usize {
        self.key.size()
    }
}

/// How `WebGL` fills a 24-byte render record
#[derive(Debug, Clone)]
pub struct WebGlPlan {
    key: RouteKey,
    coords: [NumericDecoder; 4],
    weight: NumericDecoder,
    length: NumericDecoder,
}

impl WebGlPlan {
    pub fn new(
        schema: &Schema,
        codec: &ColumnCodec,
        route: &RouteLayout,
        layout: &WebGlLayout,
    ) -> Result<Self> {
        let coord = |name: &str| numeric_column(schema, codec, name);
        Ok(Self {
            key: RouteKey::new(schema, codec, route)?,
            coords: [
                coord(&layout.origin_long)?,
                coord(&layout.origin_lat)?,
                coord(&layout.destination_long)?,
                coord(&layout.destination_lat)?,
            ],
            weight: count_column(schema, codec, &layout.weight)?,
            length: count_column(schema, codec, &layout.length)?,
        })
    }

    pub fn key_size(&self) -> usize {
        self.key.size()
    }
}

/// Weight and length extremes over the records of a `WebGL` result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub weight_min: u32,
    pub weight_max: u32,
    pub length_min: u32,
    pub length_max: u32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            weight_min: u32::MAX,
            weight_max: 0,
            length_min: u32::MAX,
            length_max: 0,
        }
    }
}

impl Bounds {
    #[inline]
    pub fn include(&mut self, weight: u32, length: u32) {
        self.weight_min = self.weight_min.min(weight);
        self.weight_max = self.weight_max.max(weight);
        self.length_min = self.length_min.min(length);
        self.length_max = self.length_max.max(length);
    }

    #[inline]
    pub fn include_weight(&mut self, weight: u32) {
        self.weight_min = self.weight_min.min(weight);
        self.weight_max = self.weight_max.max(weight);
    }

    /// Resets the weight range to the final weights of `records`.
    ///
    /// Workers see running totals, so their minimum can undershoot every
    /// finished record.
    pub fn settle_weights(&mut self, records: &[u8]) {
        let mut weights = records.chunks_exact(WEBGL_RECORD_SIZE).map(|r| {
            let w = &r[WEIGHT_FIELD..WEIGHT_FIELD + 4];
            u32::from_le_bytes([w[0], w[1], w[2], w[3]])
        });
        if let Some(first) = weights.next() {
            let (min, max) = weights.fold((first, first), |(lo, hi), w| (lo.min(w), hi.max(w)));
            self.weight_min = min;
            self.weight_max = max;
        }
    }

    pub fn merge(&mut self, other: &Bounds) {
        self.weight_min = self.weight_min.min(other.weight_min);
        self.weight_max = self.weight_max.max(other.weight_max);
        self.length_min = self.length_min.min(other.length_min);
        self.length_max = self.length_max.max(other.length_max);
    }
}

/// Where matches of a query go
#[derive(Debug)]
pub enum ResultTarget {
    /// Matching rows copied verbatim, `capacity` rows at most
    Raw(SharedRegion),
    Route {
        table: ConcurrentHashTable,
        plan: RoutePlan,
    },
    WebGl {
        table: ConcurrentHashTable,
        plan: WebGlPlan,
    },
}

/// Immutable parameters broadcast to every worker of one query
#[derive(Debug)]
pub struct ScanJob {
    pub chunk_size: u32,
    pub filter: RowFilter,
    pub target: ResultTarget,
    pub cancel: CancelToken,
}

/// What a worker sends back when its loop ends
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub rows_scanned: u64,
    pub matches: u64,
    /// Present in `WebGL` mode when the worker saw at least one match
    pub bounds: Option<Bounds>,
}

trait MatchSink {
    fn accept(&mut self, row: &[u8]);

    fn finish(self, report: &mut WorkerReport);
}

struct RawSink<'q> {
    scan: &'q ScanState,
    region: &'q SharedRegion,
    row_size: usize,
}

impl MatchSink for RawSink<'_> {
    #[inline]
    fn accept(&mut self, row: &[u8]) {
        // Past capacity the match is still counted, but not stored.
        if let Some(slot) = self.scan.record_result() {
            self.region.store_bytes(slot as usize * self.row_size, row);
        }
    }

    fn finish(self, _report: &mut WorkerReport) {}
}

struct RouteSink<'q> {
    scan: &'q ScanState,
    table: &'q ConcurrentHashTable,
    plan: &'q RoutePlan,
    key: Vec<u8>,
}

impl MatchSink for RouteSink<'_> {
    #[inline]
    fn accept(&mut self, row: &[u8]) {
        self.scan.count_match();
        self.plan.key.fill(row, &mut self.key);
        let plan = self.plan;
        let key = &self.key;

        self.table.insert_or_update(
            &FixedByteBuffer::new(key),
            |record| {
                record.put_bytes(0, key);
                record.put_u32(plan.instances, 1);
                for (decoder, field) in &plan.measures {
                    record.put_u32(*field, decoder.read_u32(row));
                }
            },
            |record| {
                record.add_u32(plan.instances, 1);
                for (decoder, field) in &plan.measures {
                    record.add_u32(*field, decoder.read_u32(row));
                }
            },
        );
    }

    fn finish(self, _report: &mut WorkerReport) {}
}

struct WebGlSink<'q> {
    scan: &'q ScanState,
    table: &'q ConcurrentHashTable,
    plan: &'q WebGlPlan,
    key: Vec<u8>,
    bounds: Option<Bounds>,
}

const WEIGHT_FIELD: usize = 16;
const LENGTH_FIELD: usize = 20;

impl MatchSink for WebGlSink<'_> {
    #[inline]
    fn accept(&mut self, row: &[u8]) {
        self.scan.count_match();
        self.plan.key.fill(row, &mut self.key);
        let plan = self.plan;
        let weight = plan.weight.read_u32(row);
        let length = plan.length.read_u32(row);
        let total = Cell::new(weight);

        let outcome = self.table.insert_or_update(
            &FixedByteBuffer::new(&self.key),
            |record| {
                for (i, decoder) in plan.coords.iter().enumerate() {
                    record.put_f32(i * 4, decoder.read_f64(row) as f32);
                }
                record.put_u32(WEIGHT_FIELD, weight);
                record.put_u32(LENGTH_FIELD, length);
            },
            |record| {
                total.set(record.add_u32(WEIGHT_FIELD, weight).wrapping_add(weight));
            },
        );

        // Bounds follow what the records hold: a record's length is set once,
        // its weight grows with every update.
        match outcome {
            InsertOutcome::Inserted(_) => self
                .bounds
                .get_or_insert_with(Bounds::default)
                .include(weight, length),
            InsertOutcome::Updated(_) => self
                .bounds
                .get_or_insert_with(Bounds::default)
                .include_weight(total.get()),
            InsertOutcome::Full => {}
        }
    }

    fn finish(self, report: &mut WorkerReport) {
        report.bounds = self.bounds;
    }
}

/// One scan worker: its identity plus the shared state handed over at init.
#[derive(Debug, Clone)]
pub struct WorkerTask {
    id: usize,
    dataset: Arc<Dataset>,
    scan: Arc<ScanState>,
}

impl WorkerTask {
    pub fn new(id: usize, dataset: Arc<Dataset>, scan: Arc<ScanState>) -> Self {
        Self { id, dataset, scan }
    }

    /// Claims chunks until none are left or the job is cancelled.
    pub fn run(&self, job: &ScanJob) -> WorkerReport {
        let scan = self.scan.as_ref();
        let mut report = WorkerReport {
            worker_id: self.id,
            ..WorkerReport::default()
        };

        match &job.target {
            ResultTarget::Raw(region) => self.scan_with(
                job,
                RawSink {
                    scan,
                    region,
                    row_size: self.dataset.row_size(),
                },
                &mut report,
            ),
            ResultTarget::Route { table, plan } => self.scan_with(
                job,
                RouteSink {
                    scan,
                    table,
                    plan,
                    key: vec![0; plan.key_size()],
                },
                &mut report,
            ),
            ResultTarget::WebGl { table, plan } => self.scan_with(
                job,
                WebGlSink {
                    scan,
                    table,
                    plan,
                    key: vec![0; plan.key_size()],
                    bounds: None,
                },
                &mut report,
            ),
        }

        trace!(
            worker = self.id,
            rows = report.rows_scanned,
            matches = report.matches,
            "worker done"
        );
        report
    }

    fn scan_with<S: MatchSink>(&self, job: &ScanJob, mut sink: S, report: &mut WorkerReport) {
        while !job.cancel.is_cancelled() {
            let Some(range) = self.scan.claim(job.chunk_size) else {
                break;
            };
            report.rows_scanned += range.len() as u64;
            for index in range {
                let row = self.dataset.row(index);
                if job.filter.matches(row) {
                    report.matches += 1;
                    sink.accept(row);
                }
            }
        }
        sink.finish(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{
        Value,
        ingest::{DatasetWriter, SchemaBuilder},
        schema::ColumnType,
    };

    fn cities() -> Dataset {
        let schema = SchemaBuilder::new()
            .text("city", 8)
            .numeric("Passengers", ColumnType::Uint16)
            .build()
            .unwrap();
        let mut writer = DatasetWriter::new(schema);
        for (city, passengers) in [("Boston", 10), ("boston", 20), ("Denver", 30)] {
            writer
                .push(vec![Value::text(city), Value::Int(passengers)])
                .unwrap();
        }
        writer.into_dataset().unwrap()
    }

    fn matching(dataset: &Dataset, spec: FilterSpec) -> Vec<u32> {
        let codec = ColumnCodec::build(dataset.schema());
        let filter = RowFilter::compile(&spec, dataset.schema(), &codec).unwrap();
        (0..dataset.row_count())
            .filter(|&i| filter.matches(dataset.row(i)))
            .collect()
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let dataset = cities();
        let hits = matching(&dataset, FilterSpec::text("city", FilterOp::Contains, "BOS"));
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn test_text_equality_uses_full_slot() {
        let dataset = cities();
        assert_eq!(
            matching(&dataset, FilterSpec::text("city", FilterOp::Equal, "BOSTON")),
            vec![0, 1]
        );
        assert!(matching(&dataset, FilterSpec::text("city", FilterOp::Equal, "Bos")).is_empty());
        assert_eq!(
            matching(&dataset, FilterSpec::text("city", FilterOp::NotEqual, "denver")),
            vec![0, 1]
        );
    }

    #[test]
    fn test_numeric_operators() {
        let dataset = cities();
        let check = |op, value: f64| matching(&dataset, FilterSpec::number("Passengers", op, value));
        assert_eq!(check(FilterOp::MoreThan, 10.0), vec![1, 2]);
        assert_eq!(check(FilterOp::LessThan, 30.0), vec![0, 1]);
        assert_eq!(check(FilterOp::Equal, 20.0), vec![1]);
        assert_eq!(check(FilterOp::NotEqual, 20.0), vec![0, 2]);
        assert_eq!(
            matching(&dataset, FilterSpec::parse("Passengers", "moreThan", " 15 ").unwrap()),
            vec![1, 2]
        );
    }

    #[test]
    fn test_compile_rejects_bad_filters() {
        let dataset = cities();
        let codec = ColumnCodec::build(dataset.schema());
        let compile = |spec: FilterSpec| RowFilter::compile(&spec, dataset.schema(), &codec);

        assert!(matches!(
            compile(FilterSpec::text("Passengers", FilterOp::Contains, "1")),
            Err(EngineError::FilterTypeMismatch { .. })
        ));
        assert!(matches!(
            compile(FilterSpec::text("city", FilterOp::MoreThan, "a")),
            Err(EngineError::FilterTypeMismatch { .. })
        ));
        assert!(matches!(
            compile(FilterSpec::text("Passengers", FilterOp::Equal, "ten")),
            Err(EngineError::InvalidFilterValue { .. })
        ));
        assert!(matches!(
            compile(FilterSpec::text("state", FilterOp::Equal, "MA")),
            Err(EngineError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_raw_worker_drops_overflow() {
        let dataset = Arc::new(cities());
        let scan = Arc::new(ScanState::new());
        scan.reset(dataset.row_count(), 1, 2, 1).unwrap();

        let codec = ColumnCodec::build(dataset.schema());
        let spec = FilterSpec::text("city", FilterOp::Contains, "");
        let job = ScanJob {
            chunk_size: 2,
            filter: RowFilter::compile(&spec, dataset.schema(), &codec).unwrap(),
            target: ResultTarget::Raw(SharedRegion::new(dataset.row_size())),
            cancel: CancelToken::new(),
        };

        let report = WorkerTask::new(0, Arc::clone(&dataset), Arc::clone(&scan)).run(&job);
        assert_eq!(report.rows_scanned, 3);
        assert_eq!(report.matches, 3);
        assert_eq!(scan.result_count(), 3);

        let ResultTarget::Raw(region) = &job.target else {
            unreachable!()
        };
        assert_eq!(region.to_bytes(dataset.row_size()), dataset.row(0));
    }

    #[test]
    fn test_cancelled_job_scans_nothing() {
        let dataset = Arc::new(cities());
        let scan = Arc::new(ScanState::new());
        scan.reset(dataset.row_count(), 10, 1, 1).unwrap();
        let codec = ColumnCodec::build(dataset.schema());
        let spec = FilterSpec::number("Passengers", FilterOp::MoreThan, 0.0);
        let job = ScanJob {
            chunk_size: 1,
            filter: RowFilter::compile(&spec, dataset.schema(), &codec).unwrap(),
            target: ResultTarget::Raw(SharedRegion::new(10 * dataset.row_size())),
            cancel: CancelToken::new(),
        };
        job.cancel.cancel();

        let report = WorkerTask::new(3, dataset, scan).run(&job);
        assert_eq!(report.worker_id, 3);
        assert_eq!(report.rows_scanned, 0);
    }

    #[test]
    fn test_float32_filters_at_column_precision() {
        let schema = SchemaBuilder::new()
            .numeric("lat", ColumnType::Float32)
            .build()
            .unwrap();
        let mut writer = DatasetWriter::new(schema);
        for lat in [42.3643, 0.1, 5.0] {
            writer.push(vec![Value::Float(lat)]).unwrap();
        }
        let dataset = writer.into_dataset().unwrap();

        let check = |op, value: f64| matching(&dataset, FilterSpec::number("lat", op, value));
        assert_eq!(check(FilterOp::Equal, 42.3643), vec![0]);
        assert_eq!(check(FilterOp::NotEqual, 0.1), vec![0, 2]);
        assert_eq!(check(FilterOp::MoreThan, 0.1), vec![0, 2]);
        assert!(check(FilterOp::LessThan, 0.1).is_empty());
        assert_eq!(
            matching(&dataset, FilterSpec::parse("lat", "equal", "42.3643").unwrap()),
            vec![0]
        );
    }

    fn flights(passengers: ColumnType, rows: &[(&str, &str, i64)]) -> Dataset {
        let schema = SchemaBuilder::new()
            .text("Origin_airport", 3)
            .text("Destination_airport", 3)
            .numeric("Passengers", passengers)
            .numeric("Seats", ColumnType::Uint32)
            .numeric("Distance", ColumnType::Uint16)
            .numeric("Org_airport_lat", ColumnType::Float32)
            .numeric("Org_airport_long", ColumnType::Float32)
            .numeric("Dest_airport_lat", ColumnType::Float32)
            .numeric("Dest_airport_long", ColumnType::Float32)
            .build()
            .unwrap();
        let mut writer = DatasetWriter::new(schema);
        for &(origin, destination, n) in rows {
            writer
                .push(vec![
                    Value::text(origin),
                    Value::text(destination),
                    Value::Int(n),
                    Value::Int(300),
                    Value::Int(if destination == "LAX" { 2611 } else { 867 }),
                    Value::Float(42.25),
                    Value::Float(-71.0),
                    Value::Float(34.0),
                    Value::Float(-118.5),
                ])
                .unwrap();
        }
        writer.into_dataset().unwrap()
    }

    #[test]
    fn test_route_plan_skips_signed_measures() {
        let dataset = flights(ColumnType::Int16, &[("BOS", "LAX", -5)]);
        let codec = ColumnCodec::build(dataset.schema());
        let plan = RoutePlan::new(dataset.schema(), &codec, &RouteLayout::default()).unwrap();

        let result = plan.result_schema();
        assert!(result.column("Passengers").is_none());
        assert!(result.column("Seats").is_some());
        assert!(result.column("Flights").is_none());
        assert_eq!(plan.measures.len(), 1);
    }

    #[test]
    fn test_webgl_plan_requires_unsigned_weight() {
        let dataset = flights(ColumnType::Int32, &[("BOS", "LAX", 1)]);
        let codec = ColumnCodec::build(dataset.schema());
        assert!(matches!(
            WebGlPlan::new(
                dataset.schema(),
                &codec,
                &RouteLayout::default(),
                &WebGlLayout::default()
            ),
            Err(EngineError::Schema(_))
        ));
    }

    #[test]
    fn test_webgl_bounds_cover_accumulated_weights() {
        let dataset = Arc::new(flights(
            ColumnType::Uint32,
            &[("BOS", "LAX", 10), ("BOS", "LAX", 100), ("BOS", "ORD", 50)],
        ));
        let scan = Arc::new(ScanState::new());
        scan.reset(dataset.row_count(), 16, 1, 1).unwrap();
        let codec = ColumnCodec::build(dataset.schema());
        let plan = WebGlPlan::new(
            dataset.schema(),
            &codec,
            &RouteLayout::default(),
            &WebGlLayout::default(),
        )
        .unwrap();
        let spec = FilterSpec::number("Passengers", FilterOp::MoreThan, 0.0);
        let job = ScanJob {
            chunk_size: 1,
            filter: RowFilter::compile(&spec, dataset.schema(), &codec).unwrap(),
            target: ResultTarget::WebGl {
                table: ConcurrentHashTable::new(16, plan.key_size(), WEBGL_RECORD_SIZE),
                plan,
            },
            cancel: CancelToken::new(),
        };

        let report = WorkerTask::new(0, dataset, scan).run(&job);
        let mut bounds = report.bounds.unwrap();
        assert_eq!((bounds.weight_min, bounds.weight_max), (10, 110));
        assert_eq!((bounds.length_min, bounds.length_max), (867, 2611));

        let ResultTarget::WebGl { table, .. } = &job.target else {
            unreachable!()
        };
        bounds.settle_weights(&table.rows_snapshot());
        assert_eq!((bounds.weight_min, bounds.weight_max), (50, 110));
        assert_eq!((bounds.length_min, bounds.length_max), (867, 2611));
    }

    #[test]
    fn test_bounds_merge() {
        let mut a = Bounds::default();
        a.include(5, 100);
        let mut b = Bounds::default();
        b.include(1, 300);
        b.include(9, 200);
        a.merge(&b);
        assert_eq!(
            a,
            Bounds {
                weight_min: 1,
                weight_max: 9,
                length_min: 100,
                length_max: 300
            }
        );
    }
}
