//! # rowscan
//!
//! `rowscan` is an in-process analytical engine over fixed-width packed row
//! datasets. A query is a single predicate; matches are either copied out
//! verbatim or grouped in place, with all workers writing into shared memory
//! instead of exchanging messages.
//!
//! # Features
//!
//! - **Packed dataset loading**: zlib-compressed file with a JSON header,
//!   memory-mapped from disk
//! - **Schema-driven codec**: per-column decoders chosen once, no per-row
//!   type dispatch and no per-row allocation
//! - **Lock-free work distribution**: workers claim row chunks with a single
//!   atomic fetch-and-add
//! - **Concurrent hash table**: fixed-capacity, chained, insert-or-accumulate
//!   with per-link locking only
//! - **Aggregation modes**: raw rows, `byRoute` totals, `WebGL` render records
//!
//! # Example
//!
//! ```rust,no_run
//! use rowscan::{AggregationMode, DataManager, EngineConfig, FilterOp, FilterSpec};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut manager = DataManager::open(Path::new("flights.bin"), EngineConfig::default())?;
//!
//!     // Every flight with more than 100 passengers, grouped by route
//!     let filter = FilterSpec::number("Passengers", FilterOp::MoreThan, 100.0);
//!     let routes = manager.query(&filter, 1024, 8, AggregationMode::ByRoute)?;
//!     for row in routes.iter().take(10) {
//!         println!("{:?}", row.values());
//!     }
//!
//!     // Raw rows, capped at the configured result capacity
//!     let filter = FilterSpec::text("Origin_city", FilterOp::Contains, "bos");
//!     let rows = manager.query(&filter, 1024, 8, AggregationMode::None)?;
//!     println!("{} of {} matches stored", rows.len(), rows.total_matches());
//!
//!     Ok(())
//! }
//! ```

mod helpers;
pub mod processor;

pub use processor::{
    AggregationMode, EngineError, FilterOp, FilterSpec, FilterValue, Result, Value,
    byte_string::FixedByteBuffer,
    codec::{Cell, ColumnCodec, Row},
    config::EngineConfig,
    data_manager::{DEFAULT_CHUNK_SIZE, DataManager, QueryBuilder, ResultView},
    dataset::Dataset,
    hash_table::ConcurrentHashTable,
    scan_state::{CancelToken, ScanState},
    schema::{ColumnType, Schema},
    worker::{Bounds, WorkerTask},
};
