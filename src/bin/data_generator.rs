use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rand::Rng;
use rowscan::Value;
use rowscan::processor::ingest::{ColumnStats, DatasetWriter, SchemaBuilder};

const COLUMNS: [&str; 15] = [
    "Origin_airport",
    "Destination_airport",
    "Origin_city",
    "Destination_city",
    "Passengers",
    "Seats",
    "Flights",
    "Distance",
    "Fly_date",
    "Origin_population",
    "Destination_population",
    "Org_airport_lat",
    "Org_airport_long",
    "Dest_airport_lat",
    "Dest_airport_long",
];

// code, city, population, lat, long
const AIRPORTS: [(&str, &str, i64, f64, f64); 8] = [
    ("BOS", "Boston, MA", 4_552_402, 42.3643, -71.0052),
    ("LAX", "Los Angeles, CA", 12_828_837, 33.9425, -118.4081),
    ("ORD", "Chicago, IL", 9_461_105, 41.9786, -87.9048),
    ("JFK", "New York, NY", 18_897_109, 40.6398, -73.7789),
    ("DEN", "Denver, CO", 2_543_482, 39.8617, -104.6731),
    ("SEA", "Seattle, WA", 3_439_809, 47.4490, -122.3093),
    ("ATL", "Atlanta, GA", 5_268_860, 33.6367, -84.4281),
    ("MBS", "Saginaw, MI", 200_169, 43.5329, -84.0796),
];

const BATCH: usize = 65_536;

/// Writes a synthetic flights dataset in the packed format.
#[derive(Parser, Debug)]
#[command(name = "data_generator")]
struct Args {
    /// Output file
    out: PathBuf,

    /// Number of rows to generate
    rows: usize,
}

fn generate_row(rng: &mut impl Rng) -> Vec<Value> {
    let origin = AIRPORTS[rng.random_range(0..AIRPORTS.len())];
    let mut destination = AIRPORTS[rng.random_range(0..AIRPORTS.len())];
    while destination.0 == origin.0 {
        destination = AIRPORTS[rng.random_range(0..AIRPORTS.len())];
    }

    let flights = rng.random_range(1..30i64);
    let seats = flights * rng.random_range(50..200i64);
    let passengers = rng.random_range(0..=seats);
    let distance = ((origin.3 - destination.3).hypot(origin.4 - destination.4) * 60.0) as i64;
    let date = format!(
        "{}-{:02}-01",
        rng.random_range(1990..2010),
        rng.random_range(1..=12)
    );

    vec![
        Value::text(origin.0),
        Value::text(destination.0),
        Value::text(origin.1),
        Value::text(destination.1),
        Value::Int(passengers),
        Value::Int(seats),
        Value::Int(flights),
        Value::Int(distance),
        Value::text(&date),
        Value::Int(origin.2),
        Value::Int(destination.2),
        Value::Float(origin.3),
        Value::Float(origin.4),
        Value::Float(destination.3),
        Value::Float(destination.4),
    ]
}

fn main() -> ExitCode {
    let Args { out, rows } = Args::parse();

    let mut rng = rand::rng();
    let data: Vec<Vec<Value>> = (0..rows).map(|_| generate_row(&mut rng)).collect();

    let mut stats = vec![ColumnStats::new(); COLUMNS.len()];
    for row in &data {
        for (s, v) in stats.iter_mut().zip(row) {
            s.observe(v);
        }
    }

    let schema = COLUMNS
        .iter()
        .zip(&stats)
        .try_fold(SchemaBuilder::new(), |builder, (name, s)| {
            builder.inferred(name, s)
        })
        .and_then(|builder| {
            builder
                .pin_last("Origin_airport")
                .pin_last("Destination_airport")
                .build()
        });

    let result = schema.and_then(|schema| {
        let mut writer = DatasetWriter::new(schema);
        for batch in data.chunks(BATCH) {
            writer.extend(batch)?;
        }
        writer.write_to(&out)
    });

    match result {
        Ok(()) => {
            println!("Dataset generated: {} ({rows} rows)", out.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
