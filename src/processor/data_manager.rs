use std::{path::Path, sync::Arc, time::Instant};

use crossbeam_channel::bounded;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::processor::{
    AggregationMode, EngineError, FilterSpec, Result,
    codec::{Cell, ColumnCodec, Row, RowDecoder},
    config::EngineConfig,
    dataset::Dataset,
    hash_table::ConcurrentHashTable,
    region::SharedRegion,
    scan_state::{CancelToken, ScanState},
    schema::{Schema, WEBGL_RECORD_SIZE, webgl_schema},
    worker::{
        Bounds, ResultTarget, RoutePlan, RowFilter, ScanJob, WebGlPlan, WorkerReport, WorkerTask,
    },
};

/// Chunk size used by [`QueryBuilder`] when none is given
pub const DEFAULT_CHUNK_SIZE: u32 = 1024;

/// Loads a dataset and runs queries over it on a fixed worker pool.
///
/// # Examples
///
/// ```rust,no_run
/// # use rowscan::{DataManager, EngineConfig, FilterOp, FilterSpec, AggregationMode};
/// let mut manager = DataManager::open("flights.bin".as_ref(), EngineConfig::default()).unwrap();
/// let view = manager
///     .query_builder(FilterSpec::text("Origin_city", FilterOp::Contains, "bos"))
///     .aggregate(AggregationMode::ByRoute)
///     .execute()
///     .unwrap();
/// println!("{} routes", view.len());
/// ```
#[derive(Debug)]
pub struct DataManager {
    config: EngineConfig,
    dataset: Arc<Dataset>,
    codec: ColumnCodec,
    scan: Arc<ScanState>,
    workers: Vec<WorkerTask>,
    pool: Option<Arc<ThreadPool>>,
}

impl DataManager {
    /// Wraps a loaded dataset and initializes one task per pool slot.
    ///
    /// The pool threads themselves start on the first query.
    pub fn new(dataset: Dataset, config: EngineConfig) -> Self {
        let dataset = Arc::new(dataset);
        let scan = Arc::new(ScanState::new());
        let max_workers = config.max_workers.max(1);
        let workers = (0..max_workers)
            .map(|id| WorkerTask::new(id, Arc::clone(&dataset), Arc::clone(&scan)))
            .collect();

        Self {
            codec: ColumnCodec::build(dataset.schema()),
            config,
            dataset,
            scan,
            workers,
            pool: None,
        }
    }

    /// Inflates and parses a compressed dataset
    pub fn load(compressed: &[u8], config: EngineConfig) -> Result<Self> {
        Ok(Self::new(Dataset::load(compressed)?, config))
    }

    pub fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        Ok(Self::new(Dataset::open(path)?, config))
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn schema(&self) -> &Schema {
        self.dataset.schema()
    }

    pub fn codec(&self) -> &ColumnCodec {
        &self.codec
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn pool(&mut self) -> Result<Arc<ThreadPool>> {
        if let Some(pool) = &self.pool {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(self.workers.len())
                .thread_name(|i| format!("scan-worker-{i}"))
                .build()?,
        );
        debug!(threads = self.workers.len(), "worker pool started");
        self.pool = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// Runs one filter over the whole dataset.
    ///
    /// `worker_count` is clamped to `[1, max_workers]`. Filter errors are
    /// returned before any worker starts. Capacity overflow is not an error;
    /// it shows up in [`ResultView::total_matches`] and
    /// [`ResultView::groups_rejected`].
    pub fn query(
        &mut self,
        filter: &FilterSpec,
        chunk_size: u32,
        worker_count: usize,
        mode: AggregationMode,
    ) -> Result<ResultView> {
        self.run_query(filter, chunk_size, worker_count, mode, CancelToken::new())
    }

    pub fn query_builder(&mut self, filter: FilterSpec) -> QueryBuilder<'_> {
        QueryBuilder::new(self, filter)
    }

    fn run_query(
        &mut self,
        filter: &FilterSpec,
        chunk_size: u32,
        worker_count: usize,
        mode: AggregationMode,
        cancel: CancelToken,
    ) -> Result<ResultView> {
        let start = Instant::now();
        if chunk_size == 0 {
            return Err(EngineError::InvalidQuery("chunk size must be positive".into()));
        }
        let workers = worker_count.clamp(1, self.workers.len());

        let filter = RowFilter::compile(filter, self.dataset.schema(), &self.codec)?;
        let (target, result_schema, capacity) = self.prepare_target(mode)?;
        self.scan
            .reset(self.dataset.row_count(), capacity, chunk_size, workers as u32)?;

        let job = ScanJob {
            chunk_size,
            filter,
            target,
            cancel,
        };
        let pool = self.pool()?;
        debug!(workers, chunk_size, ?mode, "dispatching query");

        let (done, completions) = bounded::<WorkerReport>(workers);
        pool.scope(|s| {
            for worker in &self.workers[..workers] {
                let done = done.clone();
                let job = &job;
                s.spawn(move |_| {
                    // The receiver outlives the scope, so this cannot fail.
                    let _ = done.send(worker.run(job));
                });
            }
        });
        drop(done);

        let mut rows_processed = 0u64;
        let mut bounds: Option<Bounds> = None;
        for report in completions.iter() {
            debug!(
                worker = report.worker_id,
                rows = report.rows_scanned,
                matches = report.matches,
                "worker finished"
            );
            rows_processed += report.rows_scanned;
            if let Some(b) = report.bounds {
                bounds.get_or_insert_with(Bounds::default).merge(&b);
            }
        }

        let total_matches = self.scan.result_count();
        let (bytes, count, groups_rejected) = match &job.target {
            ResultTarget::Raw(region) => {
                let count = total_matches.min(capacity) as usize;
                let row_size = result_schema.row_size();
                (region.to_bytes(count * row_size), count, 0)
            }
            ResultTarget::Route { table, .. } => {
                (table.rows_snapshot(), table.len() as usize, table.rejected())
            }
            ResultTarget::WebGl { table, .. } => {
                let records = table.rows_snapshot();
                if let Some(b) = bounds.as_mut() {
                    b.settle_weights(&records);
                }
                (records, table.len() as usize, table.rejected())
            }
        };

        let view = ResultView::new(
            result_schema.with_row_count(count as u32),
            bytes,
            ResultStats {
                count,
                total_matches,
                rows_processed,
                mode,
                bounds,
                groups_rejected,
                cancelled: job.cancel.is_cancelled(),
            },
        );

        if view.is_truncated() {
            warn!(
                ?mode,
                stored = view.len(),
                matches = total_matches,
                groups_rejected,
                "result capacity exhausted; extra matches were dropped"
            );
        }
        info!(
            ?mode,
            workers,
            rows = rows_processed,
            matches = total_matches,
            results = view.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query complete"
        );
        Ok(view)
    }

    /// Allocates the result storage for `mode`, with the schema results are read with.
    fn prepare_target(&self, mode: AggregationMode) -> Result<(ResultTarget, Schema, u32)> {
        let schema = self.dataset.schema();
        match mode {
            AggregationMode::None => {
                let capacity = self.config.raw_result_capacity;
                let region = SharedRegion::new(capacity as usize * schema.row_size());
                Ok((ResultTarget::Raw(region), schema.as_ref().clone(), capacity))
            }
            AggregationMode::ByRoute => {
                let plan = RoutePlan::new(schema, &self.codec, &self.config.route)?;
                let table = ConcurrentHashTable::new(
                    self.config.table_capacity,
                    plan.key_size(),
                    plan.result_schema().row_size(),
                );
                let result_schema = plan.result_schema().clone();
                Ok((
                    ResultTarget::Route { table, plan },
                    result_schema,
                    self.config.table_capacity,
                ))
            }
            AggregationMode::WebGl => {
                let plan =
                    WebGlPlan::new(schema, &self.codec, &self.config.route, &self.config.webgl)?;
                let table = ConcurrentHashTable::new(
                    self.config.table_capacity,
                    plan.key_size(),
                    WEBGL_RECORD_SIZE,
                );
                Ok((
                    ResultTarget::WebGl { table, plan },
                    webgl_schema(),
                    self.config.table_capacity,
                ))
            }
        }
    }
}

/// Consuming builder over [`DataManager::query`]
#[derive(Debug)]
pub struct QueryBuilder<'m> {
    manager: &'m mut DataManager,
    filter: FilterSpec,
    chunk_size: u32,
    workers: Option<usize>,
    mode: AggregationMode,
    cancel: CancelToken,
}

impl<'m> QueryBuilder<'m> {
    pub fn new(manager: &'m mut DataManager, filter: FilterSpec) -> Self {
        Self {
            manager,
            filter,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: None,
            mode: AggregationMode::None,
            cancel: CancelToken::new(),
        }
    }

    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Worker count; defaults to the whole pool
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn aggregate(mut self, mode: AggregationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Token the caller can trip from another thread to stop the scan early
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn execute(self) -> Result<ResultView> {
        let workers = self.workers.unwrap_or(self.manager.workers.len());
        self.manager
            .run_query(&self.filter, self.chunk_size, workers, self.mode, self.cancel)
    }
}

#[derive(Debug, Clone, Default)]
struct ResultStats {
    count: usize,
    total_matches: u32,
    rows_processed: u64,
    mode: AggregationMode,
    bounds: Option<Bounds>,
    groups_rejected: u32,
    cancelled: bool,
}

/// Read-only view over a finished query's result rows.
///
/// Rows are decoded on demand with a codec bound to the result schema, which
/// is the dataset schema for raw results and a derived layout when grouping.
#[derive(Debug)]
pub struct ResultView {
    schema: Arc<Schema>,
    decoder: RowDecoder,
    bytes: Vec<u8>,
    stats: ResultStats,
}

impl ResultView {
    fn new(schema: Schema, bytes: Vec<u8>, stats: ResultStats) -> Self {
        let decoder = ColumnCodec::build(&schema).row_decoder();
        Self {
            schema: Arc::new(schema),
            decoder,
            bytes,
            stats,
        }
    }

    /// Rows available to read, capped at the result capacity
    pub fn len(&self) -> usize {
        self.stats.count
    }

    pub fn is_empty(&self) -> bool {
        self.stats.count == 0
    }

    /// Every match found, including those dropped for capacity
    pub fn total_matches(&self) -> u32 {
        self.stats.total_matches
    }

    pub fn rows_processed(&self) -> u64 {
        self.stats.rows_processed
    }

    /// Group inserts refused because the hash table was full
    pub fn groups_rejected(&self) -> u32 {
        self.stats.groups_rejected
    }

    pub fn is_truncated(&self) -> bool {
        match self.stats.mode {
            AggregationMode::None => self.stats.total_matches as usize > self.stats.count,
            AggregationMode::ByRoute | AggregationMode::WebGl => self.stats.groups_rejected > 0,
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.stats.cancelled
    }

    pub fn mode(&self) -> AggregationMode {
        self.stats.mode
    }

    /// Merged weight/length extremes, `WebGL` mode only
    pub fn bounds(&self) -> Option<Bounds> {
        self.stats.bounds
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The packed result rows, e.g. for direct upload as a vertex buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn row_bytes(&self, index: usize) -> Option<&[u8]> {
        if index >= self.stats.count {
            return None;
        }
        let size = self.schema.row_size();
        self.bytes.get(index * size..(index + 1) * size)
    }

    pub fn get_row(&self, index: usize) -> Option<Row> {
        self.row_bytes(index).map(|row| self.decoder.decode_owned(row))
    }

    /// Decodes row `index` into `cells` without allocating per row.
    /// Returns `false` when the index is out of range.
    pub fn decode_into<'v>(&'v self, index: usize, cells: &mut Vec<Cell<'v>>) -> bool {
        match self.row_bytes(index) {
            Some(row) => {
                self.decoder.decode_into(row, cells);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.stats.count).filter_map(|i| self.get_row(i))
    }
}
