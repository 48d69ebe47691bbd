//! Bulk CSV loading in dependency order: lines and stops first, then the
//! rows that reference them. Lines, stops, route associations, and trips are
//! upserted so re-loading a data directory is idempotent; stop events are
//! plain inserts. The CSVs reference lines, stops, and trips by name, which
//! the loader resolves to ids before handing rows to the store.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::error::StoreError;
use crate::schema::{
    line::{LineId, VehicleType},
    stop::StopId,
    trip::{Trip, TripId},
};
use crate::store::{RowCounts, TransitStore};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record: {0}")]
    Csv(#[from] csv::Error),

    #[error("unparseable timestamp {value:?}")]
    Timestamp { value: String },

    #[error("{file} references unknown {entity} {name:?}")]
    UnknownName {
        file: &'static str,
        entity: &'static str,
        name: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Deserialize, Debug)]
struct LineRecord {
    line_name: String,
    vehicle_type: String,
}

#[derive(Deserialize, Debug)]
struct StopRecord {
    stop_name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize, Debug)]
struct LineStopRecord {
    line_name: String,
    stop_name: String,
    sequence: i32,
    time_offset: i32,
}

#[derive(Deserialize, Debug)]
struct TripRecord {
    trip_id: String,
    line_name: String,
    scheduled_departure: String,
    vehicle_id: String,
}

#[derive(Deserialize, Debug)]
struct StopEventRecord {
    trip_id: String,
    stop_name: String,
    scheduled: String,
    actual: String,
    passengers_on: i32,
    passengers_off: i32,
}

/// Load all five CSVs from a directory and report the resulting table sizes.
pub fn load_dir<P: AsRef<Path>>(store: &mut TransitStore, dir: P) -> Result<RowCounts, LoadError> {
    let dir = dir.as_ref();

    let rows = load_lines(store, open(&dir.join("lines.csv"))?)?;
    info!(rows, "loaded lines.csv");
    let rows = load_stops(store, open(&dir.join("stops.csv"))?)?;
    info!(rows, "loaded stops.csv");
    let rows = load_line_stops(store, open(&dir.join("line_stops.csv"))?)?;
    info!(rows, "loaded line_stops.csv");
    let rows = load_trips(store, open(&dir.join("trips.csv"))?)?;
    info!(rows, "loaded trips.csv");
    let rows = load_stop_events(store, open(&dir.join("stop_events.csv"))?)?;
    info!(rows, "loaded stop_events.csv");

    Ok(store.row_counts())
}

pub fn load_lines<R: Read>(store: &mut TransitStore, rdr: R) -> Result<usize, LoadError> {
    let records: Vec<LineRecord> = read_records(rdr)?;
    let count = records.len();
    for r in records {
        let vehicle_type: VehicleType = r.vehicle_type.parse()?;
        store.upsert_line(&r.line_name, vehicle_type);
    }
    Ok(count)
}

pub fn load_stops<R: Read>(store: &mut TransitStore, rdr: R) -> Result<usize, LoadError> {
    let records: Vec<StopRecord> = read_records(rdr)?;
    let count = records.len();
    for r in records {
        store.upsert_stop(&r.stop_name, r.latitude, r.longitude);
    }
    Ok(count)
}

pub fn load_line_stops<R: Read>(store: &mut TransitStore, rdr: R) -> Result<usize, LoadError> {
    let records: Vec<LineStopRecord> = read_records(rdr)?;
    let stops = stops_by_name(store);
    let count = records.len();
    for r in records {
        let line_id = line_id_by_name(store, "line_stops.csv", &r.line_name)?;
        let stop_id = resolve_stop(&stops, "line_stops.csv", &r.stop_name)?;
        store.upsert_line_stop(line_id, stop_id, r.sequence, r.time_offset)?;
    }
    Ok(count)
}

pub fn load_trips<R: Read>(store: &mut TransitStore, rdr: R) -> Result<usize, LoadError> {
    let records: Vec<TripRecord> = read_records(rdr)?;
    let count = records.len();
    for r in records {
        let line_id = line_id_by_name(store, "trips.csv", &r.line_name)?;
        let departure_time = parse_timestamp(&r.scheduled_departure)?;
        store.upsert_trip(Trip::new(
            TripId::new(r.trip_id),
            line_id,
            departure_time,
            r.vehicle_id,
        ))?;
    }
    Ok(count)
}

pub fn load_stop_events<R: Read>(store: &mut TransitStore, rdr: R) -> Result<usize, LoadError> {
    let records: Vec<StopEventRecord> = read_records(rdr)?;
    let stops = stops_by_name(store);
    let count = records.len();
    for r in records {
        let trip_id = TripId::new(r.trip_id);
        let stop_id = resolve_stop(&stops, "stop_events.csv", &r.stop_name)?;
        store.insert_stop_event(
            &trip_id,
            stop_id,
            parse_timestamp(&r.scheduled)?,
            parse_timestamp(&r.actual)?,
            r.passengers_on,
            r.passengers_off,
        )?;
    }
    Ok(count)
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn read_records<T: serde::de::DeserializeOwned, R: Read>(rdr: R) -> Result<Vec<T>, csv::Error> {
    csv::Reader::from_reader(rdr).deserialize().collect()
}

/// Name-to-id view of the stops table. Stop names are not unique on their
/// own; when a name repeats, the most recently inserted stop wins.
fn stops_by_name(store: &TransitStore) -> HashMap<String, StopId> {
    store.stops().map(|s| (s.name.clone(), s.id)).collect()
}

fn line_id_by_name(
    store: &TransitStore,
    file: &'static str,
    name: &str,
) -> Result<LineId, LoadError> {
    store
        .line_by_name(name)
        .map(|l| l.id)
        .ok_or_else(|| LoadError::UnknownName {
            file,
            entity: "line",
            name: name.to_owned(),
        })
}

fn resolve_stop(
    stops: &HashMap<String, StopId>,
    file: &'static str,
    name: &str,
) -> Result<StopId, LoadError> {
    stops.get(name).copied().ok_or_else(|| LoadError::UnknownName {
        file,
        entity: "stop",
        name: name.to_owned(),
    })
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, LoadError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| LoadError::Timestamp {
            value: value.to_owned(),
        })
}
