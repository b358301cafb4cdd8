use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use jemallocator::Jemalloc;
use rowscan::{
    AggregationMode, DEFAULT_CHUNK_SIZE, DataManager, EngineConfig, FilterOp, FilterSpec,
};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Runs one filter query over a packed dataset and prints the results.
#[derive(Parser, Debug)]
#[command(name = "rowscan")]
#[command(version)]
struct Args {
    /// Packed dataset file
    file: PathBuf,

    /// Column the filter applies to
    column: String,

    /// contains, equal, notEqual, moreThan or lessThan
    op: FilterOp,

    /// Right-hand side of the filter
    #[arg(allow_hyphen_values = true)]
    value: String,

    /// none, byRoute or WebGL
    #[arg(default_value = "none")]
    mode: AggregationMode,

    /// Workers to scan with (defaults to the pool size)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Rows claimed per chunk
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u32,
}

fn run(args: Args) -> rowscan::Result<()> {
    let filter = FilterSpec::text(&args.column, args.op, &args.value);
    let mut manager = DataManager::open(&args.file, EngineConfig::default())?;

    let mut query = manager
        .query_builder(filter)
        .chunk_size(args.chunk_size)
        .aggregate(args.mode);
    if let Some(workers) = args.workers {
        query = query.workers(workers);
    }
    let view = query.execute()?;

    println!(
        "{} rows scanned, {} matches, {} results{}",
        view.rows_processed(),
        view.total_matches(),
        view.len(),
        if view.is_truncated() { " (truncated)" } else { "" }
    );
    if let Some(b) = view.bounds() {
        println!(
            "weight [{}, {}], length [{}, {}]",
            b.weight_min, b.weight_max, b.length_min, b.length_max
        );
    }

    let header: Vec<&str> = view.schema().columns().iter().map(|c| c.name.as_str()).collect();
    println!("{}", header.join("\t"));
    for row in view.iter().take(20) {
        let cells: Vec<String> = row.values().iter().map(|v| v.to_string()).collect();
        println!("{}", cells.join("\t"));
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_op_and_mode() {
        let args =
            Args::try_parse_from(["rowscan", "f.bin", "Passengers", "moreThan", "0", "byRoute"])
                .unwrap();
        assert_eq!(args.op, FilterOp::MoreThan);
        assert_eq!(args.mode, AggregationMode::ByRoute);
        assert_eq!(args.workers, None);
        assert_eq!(args.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_args_workers_without_mode() {
        let args = Args::try_parse_from([
            "rowscan", "f.bin", "Origin_city", "contains", "bos", "--workers", "3",
        ])
        .unwrap();
        assert_eq!(args.mode, AggregationMode::None);
        assert_eq!(args.workers, Some(3));
    }

    #[test]
    fn test_args_negative_value() {
        let args =
            Args::try_parse_from(["rowscan", "f.bin", "Org_airport_long", "lessThan", "-100"])
                .unwrap();
        assert_eq!(args.value, "-100");
    }

    #[test]
    fn test_args_rejected_at_parse_time() {
        assert!(
            Args::try_parse_from(["rowscan", "f.bin", "Passengers", "moreThan", "0", "-w", "eight"])
                .is_err()
        );
        assert!(Args::try_parse_from(["rowscan", "f.bin", "Passengers", "above", "0"]).is_err());
        assert!(Args::try_parse_from(["rowscan", "f.bin", "Passengers", "moreThan"]).is_err());
    }
}
