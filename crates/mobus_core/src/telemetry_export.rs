//! Telemetry export: passenger journeys and the cab ledger as parquet.

use std::error::Error;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, UInt16Array, UInt32Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::ledger::CabLedger;
use crate::location::Stop;
use crate::passenger::PassengerRegistry;

fn u32_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt32, false)
}

fn u64_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt64, false)
}

fn nullable_u64_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt64, true)
}

fn u16_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt16, false)
}

fn f64_field(name: &'static str) -> Field {
    Field::new(name, DataType::Float64, false)
}

fn bool_field(name: &'static str) -> Field {
    Field::new(name, DataType::Boolean, false)
}

fn write_record_batch<P: AsRef<Path>>(
    path: P,
    schema: Schema,
    arrays: Vec<ArrayRef>,
) -> Result<(), Box<dyn Error>> {
    let schema = Arc::new(schema);
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Stop encoded as main_station * 1000 + branch * 100 + order; trunk stops
/// keep their plain station number.
fn stop_code(stop: Stop) -> u32 {
    match stop {
        Stop::Trunk(s) => s as u32,
        Stop::Side {
            anchor,
            branch,
            order,
        } => anchor as u32 * 1000 + branch as u32 * 100 + order as u32,
    }
}

/// One row per passenger: demand plus recorded trip timings.
pub fn write_passengers_parquet<P: AsRef<Path>>(
    path: P,
    registry: &PassengerRegistry,
) -> Result<(), Box<dyn Error>> {
    let n = registry.len();
    let mut ids = Vec::with_capacity(n);
    let mut board_stops = Vec::with_capacity(n);
    let mut alight_stops = Vec::with_capacity(n);
    let mut actual_stops: Vec<Option<u64>> = Vec::with_capacity(n);
    let mut side_trips = Vec::with_capacity(n);
    let mut arrived = Vec::with_capacity(n);
    let mut boarded: Vec<Option<u64>> = Vec::with_capacity(n);
    let mut alighted: Vec<Option<u64>> = Vec::with_capacity(n);
    let mut dwell_waits = Vec::with_capacity(n);

    for passenger in registry.iter() {
        ids.push(passenger.id.0);
        board_stops.push(stop_code(passenger.board_stop));
        alight_stops.push(stop_code(passenger.alight_stop));
        actual_stops.push(passenger.actual_alight.map(|s| stop_code(s) as u64));
        side_trips.push(passenger.side_trip);
        arrived.push(passenger.arrived_at);
        boarded.push(passenger.boarded_at);
        alighted.push(passenger.alighted_at);
        dwell_waits.push(passenger.dwell_wait_s);
    }

    let schema = Schema::new(vec![
        u32_field("passenger_id"),
        u32_field("board_stop"),
        u32_field("alight_stop"),
        nullable_u64_field("actual_alight_stop"),
        bool_field("side_trip"),
        u64_field("arrived_at"),
        nullable_u64_field("boarded_at"),
        nullable_u64_field("alighted_at"),
        u64_field("dwell_wait_s"),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt32Array::from(ids)),
        Arc::new(UInt32Array::from(board_stops)),
        Arc::new(UInt32Array::from(alight_stops)),
        Arc::new(UInt64Array::from(actual_stops)),
        Arc::new(BooleanArray::from(side_trips)),
        Arc::new(UInt64Array::from(arrived)),
        Arc::new(UInt64Array::from(boarded)),
        Arc::new(UInt64Array::from(alighted)),
        Arc::new(UInt64Array::from(dwell_waits)),
    ];
    write_record_batch(path, schema, arrays)
}

/// One row per cab: lifetime summary.
pub fn write_cab_ledger_parquet<P: AsRef<Path>>(
    path: P,
    ledger: &CabLedger,
) -> Result<(), Box<dyn Error>> {
    let n = ledger.len();
    let mut ids = Vec::with_capacity(n);
    let mut distances = Vec::with_capacity(n);
    let mut dispatched = Vec::with_capacity(n);
    let mut ended: Vec<Option<u64>> = Vec::with_capacity(n);
    let mut departure_counts = Vec::with_capacity(n);
    let mut peak_loads = Vec::with_capacity(n);

    for (id, record) in ledger.iter() {
        ids.push(id.0);
        distances.push(record.distance_m);
        dispatched.push(record.dispatched_at);
        ended.push(record.ended_at);
        departure_counts.push(record.departures.len() as u64);
        peak_loads.push(record.peak_occupants());
    }

    let schema = Schema::new(vec![
        u32_field("cab_id"),
        f64_field("distance_m"),
        u64_field("dispatched_at"),
        nullable_u64_field("ended_at"),
        u64_field("departure_count"),
        u16_field("peak_occupants"),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt32Array::from(ids)),
        Arc::new(Float64Array::from(distances)),
        Arc::new(UInt64Array::from(dispatched)),
        Arc::new(UInt64Array::from(ended)),
        Arc::new(UInt64Array::from(departure_counts)),
        Arc::new(UInt16Array::from(peak_loads)),
    ];
    write_record_batch(path, schema, arrays)
}

/// One row per recorded cab departure.
pub fn write_cab_departures_parquet<P: AsRef<Path>>(
    path: P,
    ledger: &CabLedger,
) -> Result<(), Box<dyn Error>> {
    let mut ids = Vec::new();
    let mut times = Vec::new();
    let mut loads = Vec::new();
    for (id, record) in ledger.iter() {
        for departure in &record.departures {
            ids.push(id.0);
            times.push(departure.at);
            loads.push(departure.occupants);
        }
    }

    let schema = Schema::new(vec![
        u32_field("cab_id"),
        u64_field("departed_at"),
        u16_field("occupants"),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt32Array::from(ids)),
        Arc::new(UInt64Array::from(times)),
        Arc::new(UInt16Array::from(loads)),
    ];
    write_record_batch(path, schema, arrays)
}
