use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use jemallocator::Jemalloc;
use rand::Rng;
use rowscan::{
    AggregationMode, ColumnType, DataManager, Dataset, EngineConfig, FilterOp, FilterSpec, Value,
    processor::ingest::{DatasetWriter, SchemaBuilder},
};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

const ROWS: usize = 1_000_000;
const CODES: [&str; 12] = [
    "BOS", "LAX", "ORD", "JFK", "DEN", "SEA", "ATL", "SFO", "MIA", "DFW", "PHX", "IAD",
];

fn synthetic_flights(rows: usize) -> Dataset {
    let schema = SchemaBuilder::new()
        .text("Origin_airport", 3)
        .text("Destination_airport", 3)
        .text("Origin_city", 16)
        .numeric("Passengers", ColumnType::Uint16)
        .numeric("Seats", ColumnType::Uint16)
        .numeric("Flights", ColumnType::Uint8)
        .numeric("Distance", ColumnType::Uint16)
        .numeric("Org_airport_lat", ColumnType::Float32)
        .numeric("Org_airport_long", ColumnType::Float32)
        .numeric("Dest_airport_lat", ColumnType::Float32)
        .numeric("Dest_airport_long", ColumnType::Float32)
        .pin_last("Origin_airport")
        .pin_last("Destination_airport")
        .build()
        .unwrap();

    let mut rng = rand::rng();
    let batch: Vec<Vec<Value>> = (0..rows)
        .map(|_| {
            let o = rng.random_range(0..CODES.len());
            let d = rng.random_range(0..CODES.len());
            let seats = rng.random_range(50..400i64);
            vec![
                Value::text(CODES[o]),
                Value::text(CODES[d]),
                Value::text(&format!("City {o}")),
                Value::Int(rng.random_range(0..=seats)),
                Value::Int(seats),
                Value::Int(rng.random_range(1..10)),
                Value::Int(rng.random_range(100..3000)),
                Value::Float(30.0 + o as f64),
                Value::Float(-70.0 - o as f64),
                Value::Float(30.0 + d as f64),
                Value::Float(-70.0 - d as f64),
            ]
        })
        .collect();

    let mut writer = DatasetWriter::new(schema);
    writer.extend(&batch).unwrap();
    writer.into_dataset().unwrap()
}

fn scan_modes(c: &mut Criterion) {
    let mut manager = DataManager::new(synthetic_flights(ROWS), EngineConfig::default());

    let mut group = c.benchmark_group("DataManager");
    group.sample_size(20);
    group.throughput(Throughput::Elements(ROWS as u64));

    let numeric = FilterSpec::number("Passengers", FilterOp::MoreThan, 100.0);
    let text = FilterSpec::text("Origin_city", FilterOp::Contains, "city 1");

    group.bench_function("raw_numeric_filter", |b| {
        b.iter(|| {
            manager
                .query(&numeric, 1024, 8, AggregationMode::None)
                .unwrap()
        })
    });

    group.bench_function("raw_contains_filter", |b| {
        b.iter(|| {
            manager
                .query(&text, 1024, 8, AggregationMode::None)
                .unwrap()
        })
    });

    group.bench_function("by_route", |b| {
        b.iter(|| {
            manager
                .query(&numeric, 1024, 8, AggregationMode::ByRoute)
                .unwrap()
        })
    });

    group.bench_function("webgl", |b| {
        b.iter(|| {
            manager
                .query(&numeric, 1024, 8, AggregationMode::WebGl)
                .unwrap()
        })
    });

    group.finish();
}

fn load(c: &mut Criterion) {
    let mut writer = DatasetWriter::new(synthetic_flights(1).schema().as_ref().clone());
    let rows: Vec<Vec<Value>> = (0..100_000)
        .map(|i| {
            vec![
                Value::text(CODES[i % CODES.len()]),
                Value::text(CODES[(i + 1) % CODES.len()]),
                Value::text("City"),
                Value::Int((i % 300) as i64),
                Value::Int(300),
                Value::Int(1),
                Value::Int(1000),
                Value::Float(40.0),
                Value::Float(-70.0),
                Value::Float(41.0),
                Value::Float(-71.0),
            ]
        })
        .collect();
    writer.extend(&rows).unwrap();
    let compressed = writer.finish_compressed().unwrap();

    let mut group = c.benchmark_group("Dataset");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(compressed.len() as u64));
    group.bench_function("load_compressed", |b| {
        b.iter(|| Dataset::load(&compressed).unwrap())
    });
    group.finish();
}

criterion_group!(benches, scan_modes, load);
criterion_main!(benches);
