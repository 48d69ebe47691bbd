//! Read-only aggregation and join queries over the store: route listings,
//! ridership totals, and punctuality counts. Missing line, trip, or stop
//! names behave like the joins they mirror and produce empty result sets
//! rather than errors.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use geo_types::Point;
use itertools::Itertools;
use serde::Serialize;

use crate::schema::{line::LineId, stop::StopId, trip::TripId};
use crate::store::TransitStore;

#[derive(Serialize, Debug, PartialEq)]
pub struct RouteStopRow {
    pub stop_name: String,
    pub sequence_number: i32,
    pub time_offset_minutes: i32,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct TripDepartureRow {
    pub trip_id: TripId,
    pub line_name: String,
    pub departure_time: NaiveDateTime,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct TransferStopRow {
    pub stop_name: String,
    pub line_count: usize,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct StopNameRow {
    pub stop_name: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct LineNameRow {
    pub line_name: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct LineAverageRow {
    pub line_name: String,
    pub avg_passengers: f64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct StopActivityRow {
    pub stop_name: String,
    pub total_activity: i64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct LineDelayRow {
    pub line_name: String,
    pub delay_count: usize,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct TripDelayRow {
    pub trip_id: TripId,
    pub delayed_stop_count: usize,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct StopBoardingsRow {
    pub stop_name: String,
    pub total_boardings: i64,
}

/// Stops of a line in sequence order, with their cumulative offsets.
pub fn stops_on_line(store: &TransitStore, line_name: &str) -> Vec<RouteStopRow> {
    let Some(line) = store.line_by_name(line_name) else {
        return vec![];
    };
    store
        .line_stops_of(line.id)
        .filter_map(|ls| {
            store.stop(ls.stop_id).map(|s| RouteStopRow {
                stop_name: s.name.clone(),
                sequence_number: ls.sequence_number,
                time_offset_minutes: ls.time_offset_minutes,
            })
        })
        .collect()
}

/// Trips departing within the inclusive time-of-day window, ordered by
/// departure then trip id.
pub fn trips_between(store: &TransitStore, start: NaiveTime, end: NaiveTime) -> Vec<TripDepartureRow> {
    store
        .trips()
        .filter(|t| {
            let tod = t.departure_time.time();
            tod >= start && tod <= end
        })
        .sorted_by_key(|t| (t.departure_time, t.trip_id.clone()))
        .map(|t| TripDepartureRow {
            trip_id: t.trip_id.clone(),
            line_name: store
                .line(t.line_id)
                .map(|l| l.name.clone())
                .unwrap_or_default(),
            departure_time: t.departure_time,
        })
        .collect()
}

/// Stop names carrying more than one line membership. Counted per
/// association row, not per distinct line.
pub fn transfer_stops(store: &TransitStore) -> Vec<TransferStopRow> {
    store
        .line_stops()
        .filter_map(|ls| store.stop(ls.stop_id).map(|s| s.name.clone()))
        .counts()
        .into_iter()
        .filter(|&(_, n)| n > 1)
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(stop_name, line_count)| TransferStopRow {
            stop_name,
            line_count,
        })
        .collect()
}

/// The full route of the trip's line, in sequence order.
pub fn trip_route(store: &TransitStore, trip_id: &str) -> Vec<StopNameRow> {
    let Some(trip) = store.trip(&TripId::new(trip_id)) else {
        return vec![];
    };
    store
        .line_stops_of(trip.line_id)
        .filter_map(|ls| store.stop(ls.stop_id))
        .map(|s| StopNameRow {
            stop_name: s.name.clone(),
        })
        .collect()
}

/// Lines whose route covers every one of the named stops.
pub fn lines_serving_all(store: &TransitStore, stop_names: &[String]) -> Vec<LineNameRow> {
    let wanted: HashSet<&str> = stop_names.iter().map(String::as_str).collect();
    if wanted.is_empty() {
        return vec![];
    }

    let mut served: HashMap<LineId, HashSet<&str>> = HashMap::new();
    for ls in store.line_stops() {
        if let Some(stop) = store.stop(ls.stop_id) {
            if let Some(&name) = wanted.get(stop.name.as_str()) {
                served.entry(ls.line_id).or_default().insert(name);
            }
        }
    }

    served
        .into_iter()
        .filter(|(_, names)| names.len() == wanted.len())
        .filter_map(|(line_id, _)| store.line(line_id))
        .map(|l| l.name.clone())
        .sorted()
        .map(|line_name| LineNameRow { line_name })
        .collect()
}

/// Mean boardings per stop event, grouped by line.
pub fn average_boardings_by_line(store: &TransitStore) -> Vec<LineAverageRow> {
    let mut sums: HashMap<LineId, (i64, usize)> = HashMap::new();
    for e in store.stop_events() {
        if let Some(trip) = store.trip(&e.trip_id) {
            let entry = sums.entry(trip.line_id).or_default();
            entry.0 += i64::from(e.passengers_on);
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .filter_map(|(line_id, (sum, n))| {
            store
                .line(line_id)
                .map(|l| (l.name.clone(), sum as f64 / n as f64))
        })
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(line_name, avg_passengers)| LineAverageRow {
            line_name,
            avg_passengers,
        })
        .collect()
}

/// Stop names ranked by total boardings plus alightings.
pub fn busiest_stops(store: &TransitStore, limit: usize) -> Vec<StopActivityRow> {
    let mut totals: HashMap<String, i64> = HashMap::new();
    for e in store.stop_events() {
        if let Some(stop) = store.stop(e.stop_id) {
            *totals.entry(stop.name.clone()).or_default() += e.activity();
        }
    }

    totals
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(limit)
        .map(|(stop_name, total_activity)| StopActivityRow {
            stop_name,
            total_activity,
        })
        .collect()
}

/// Per line, the number of stop events arriving more than the threshold
/// after schedule. Lines without any such event are omitted.
pub fn delays_by_line(store: &TransitStore, threshold_minutes: i64) -> Vec<LineDelayRow> {
    let threshold = TimeDelta::minutes(threshold_minutes);
    let mut counts: HashMap<LineId, usize> = HashMap::new();
    for e in store.stop_events() {
        if e.delay() <= threshold {
            continue;
        }
        if let Some(trip) = store.trip(&e.trip_id) {
            *counts.entry(trip.line_id).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .filter_map(|(line_id, n)| store.line(line_id).map(|l| (l.name.clone(), n)))
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(line_name, delay_count)| LineDelayRow {
            line_name,
            delay_count,
        })
        .collect()
}

/// Trips with at least `min_delayed_stops` stop events past the threshold.
pub fn delayed_trips(
    store: &TransitStore,
    threshold_minutes: i64,
    min_delayed_stops: usize,
) -> Vec<TripDelayRow> {
    let threshold = TimeDelta::minutes(threshold_minutes);
    store
        .stop_events()
        .filter(|e| e.delay() > threshold)
        .map(|e| e.trip_id.clone())
        .counts()
        .into_iter()
        .filter(|&(_, n)| n >= min_delayed_stops)
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(trip_id, delayed_stop_count)| TripDelayRow {
            trip_id,
            delayed_stop_count,
        })
        .collect()
}

/// Stop names whose total boardings exceed the mean of per-stop totals.
/// The mean is taken over stop ids while output groups by name, matching
/// the aggregation this mirrors.
pub fn stops_above_average_boardings(store: &TransitStore) -> Vec<StopBoardingsRow> {
    let mut by_id: HashMap<StopId, i64> = HashMap::new();
    for e in store.stop_events() {
        *by_id.entry(e.stop_id).or_default() += i64::from(e.passengers_on);
    }
    if by_id.is_empty() {
        return vec![];
    }
    let mean = by_id.values().sum::<i64>() as f64 / by_id.len() as f64;

    let mut by_name: HashMap<String, i64> = HashMap::new();
    for e in store.stop_events() {
        if let Some(stop) = store.stop(e.stop_id) {
            *by_name.entry(stop.name.clone()).or_default() += i64::from(e.passengers_on);
        }
    }

    by_name
        .into_iter()
        .filter(|&(_, total)| total as f64 > mean)
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(stop_name, total_boardings)| StopBoardingsRow {
            stop_name,
            total_boardings,
        })
        .collect()
}

#[derive(Serialize)]
struct StopFeature {
    id: StopId,
    name: String,
    #[serde(serialize_with = "geojson::ser::serialize_geometry")]
    geometry: Point,
}

/// All stops as a GeoJSON FeatureCollection.
pub fn stops_geojson(store: &TransitStore) -> anyhow::Result<String> {
    let features: Vec<StopFeature> = store
        .stops()
        .map(|s| StopFeature {
            id: s.id,
            name: s.name.clone(),
            geometry: s.location(),
        })
        .collect();

    geojson::ser::to_feature_collection_string(&features).context("Failed to serialize stops")
}
