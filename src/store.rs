//! In-memory tables for the transit schema, together with the constraint
//! layer a relational engine would enforce declaratively: primary and unique
//! keys, foreign keys with cascade or restrict delete behaviour, and range
//! checks. Every check runs before any table is touched, so a rejected write
//! leaves the store unchanged and cascades are all-or-nothing.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::schema::{
    line::{Line, LineId, VehicleType},
    line_stop::LineStop,
    stop::{Stop, StopId},
    stop_event::{StopEvent, StopEventId},
    trip::{Trip, TripId},
};

/// Unique index key for stops. Coordinates participate by bit pattern, the
/// same equality a (name, latitude, longitude) unique constraint compares.
fn stop_key(name: &str, latitude: f64, longitude: f64) -> (String, u64, u64) {
    (name.to_owned(), latitude.to_bits(), longitude.to_bits())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub lines: usize,
    pub stops: usize,
    pub line_stops: usize,
    pub trips: usize,
    pub stop_events: usize,
}

impl RowCounts {
    pub fn total(&self) -> usize {
        self.lines + self.stops + self.line_stops + self.trips + self.stop_events
    }
}

#[derive(Debug, Default)]
pub struct TransitStore {
    lines: BTreeMap<LineId, Line>,
    stops: BTreeMap<StopId, Stop>,
    // The (line, sequence) tuple is the primary key, so keying the table by
    // it makes position uniqueness structural.
    line_stops: BTreeMap<(LineId, i32), LineStop>,
    trips: BTreeMap<TripId, Trip>,
    stop_events: BTreeMap<StopEventId, StopEvent>,

    line_names: HashMap<String, LineId>,
    stop_keys: HashMap<(String, u64, u64), StopId>,

    next_line_id: u32,
    next_stop_id: u32,
    next_event_id: u32,
}

impl TransitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_line(&mut self, name: &str, vehicle_type: VehicleType) -> Result<LineId, StoreError> {
        if self.line_names.contains_key(name) {
            return Err(StoreError::DuplicateKey {
                entity: "line",
                key: name.to_owned(),
            });
        }
        Ok(self.put_line(name.to_owned(), vehicle_type))
    }

    /// Insert, or update the vehicle type of the line already carrying this
    /// name.
    pub fn upsert_line(&mut self, name: &str, vehicle_type: VehicleType) -> LineId {
        if let Some(&id) = self.line_names.get(name) {
            if let Some(line) = self.lines.get_mut(&id) {
                line.vehicle_type = vehicle_type;
            }
            return id;
        }
        self.put_line(name.to_owned(), vehicle_type)
    }

    fn put_line(&mut self, name: String, vehicle_type: VehicleType) -> LineId {
        self.next_line_id += 1;
        let id = LineId::new(self.next_line_id);
        self.line_names.insert(name.clone(), id);
        self.lines.insert(id, Line::new(id, name, vehicle_type));
        id
    }

    pub fn insert_stop(&mut self, name: &str, latitude: f64, longitude: f64) -> Result<StopId, StoreError> {
        if self.stop_keys.contains_key(&stop_key(name, latitude, longitude)) {
            return Err(StoreError::DuplicateKey {
                entity: "stop",
                key: format!("({name}, {latitude}, {longitude})"),
            });
        }
        Ok(self.put_stop(name.to_owned(), latitude, longitude))
    }

    /// Insert, or hand back the stop already registered under this exact
    /// (name, latitude, longitude) triple.
    pub fn upsert_stop(&mut self, name: &str, latitude: f64, longitude: f64) -> StopId {
        if let Some(&id) = self.stop_keys.get(&stop_key(name, latitude, longitude)) {
            return id;
        }
        self.put_stop(name.to_owned(), latitude, longitude)
    }

    fn put_stop(&mut self, name: String, latitude: f64, longitude: f64) -> StopId {
        self.next_stop_id += 1;
        let id = StopId::new(self.next_stop_id);
        self.stop_keys.insert(stop_key(&name, latitude, longitude), id);
        self.stops.insert(id, Stop::new(id, name, latitude, longitude));
        id
    }

    pub fn insert_line_stop(
        &mut self,
        line_id: LineId,
        stop_id: StopId,
        sequence_number: i32,
        time_offset_minutes: i32,
    ) -> Result<(), StoreError> {
        self.check_line_stop(line_id, stop_id, sequence_number, time_offset_minutes)?;
        if self.line_stops.contains_key(&(line_id, sequence_number)) {
            return Err(StoreError::DuplicateKey {
                entity: "line_stop",
                key: format!("({line_id}, {sequence_number})"),
            });
        }
        self.line_stops.insert(
            (line_id, sequence_number),
            LineStop {
                line_id,
                stop_id,
                sequence_number,
                time_offset_minutes,
            },
        );
        Ok(())
    }

    /// Insert, or replace the stop and offset at an already-taken position.
    pub fn upsert_line_stop(
        &mut self,
        line_id: LineId,
        stop_id: StopId,
        sequence_number: i32,
        time_offset_minutes: i32,
    ) -> Result<(), StoreError> {
        self.check_line_stop(line_id, stop_id, sequence_number, time_offset_minutes)?;
        self.line_stops.insert(
            (line_id, sequence_number),
            LineStop {
                line_id,
                stop_id,
                sequence_number,
                time_offset_minutes,
            },
        );
        Ok(())
    }

    fn check_line_stop(
        &self,
        line_id: LineId,
        stop_id: StopId,
        sequence_number: i32,
        time_offset_minutes: i32,
    ) -> Result<(), StoreError> {
        if !self.lines.contains_key(&line_id) {
            return Err(StoreError::missing_reference("line", line_id));
        }
        if !self.stops.contains_key(&stop_id) {
            return Err(StoreError::missing_reference("stop", stop_id));
        }
        if sequence_number < 1 {
            return Err(StoreError::RangeViolation {
                field: "sequence_number",
                value: sequence_number.to_string(),
            });
        }
        if time_offset_minutes < 0 {
            return Err(StoreError::RangeViolation {
                field: "time_offset_minutes",
                value: time_offset_minutes.to_string(),
            });
        }
        Ok(())
    }

    pub fn insert_trip(&mut self, trip: Trip) -> Result<(), StoreError> {
        if !self.lines.contains_key(&trip.line_id) {
            return Err(StoreError::missing_reference("line", trip.line_id));
        }
        if self.trips.contains_key(&trip.trip_id) {
            return Err(StoreError::DuplicateKey {
                entity: "trip",
                key: trip.trip_id.to_string(),
            });
        }
        self.trips.insert(trip.trip_id.clone(), trip);
        Ok(())
    }

    /// Insert, or replace the fields of the trip already keyed by this id.
    pub fn upsert_trip(&mut self, trip: Trip) -> Result<(), StoreError> {
        if !self.lines.contains_key(&trip.line_id) {
            return Err(StoreError::missing_reference("line", trip.line_id));
        }
        self.trips.insert(trip.trip_id.clone(), trip);
        Ok(())
    }

    pub fn insert_stop_event(
        &mut self,
        trip_id: &TripId,
        stop_id: StopId,
        scheduled_time: NaiveDateTime,
        actual_time: NaiveDateTime,
        passengers_on: i32,
        passengers_off: i32,
    ) -> Result<StopEventId, StoreError> {
        if !self.trips.contains_key(trip_id) {
            return Err(StoreError::missing_reference("trip", trip_id));
        }
        if !self.stops.contains_key(&stop_id) {
            return Err(StoreError::missing_reference("stop", stop_id));
        }
        if passengers_on < 0 {
            return Err(StoreError::RangeViolation {
                field: "passengers_on",
                value: passengers_on.to_string(),
            });
        }
        if passengers_off < 0 {
            return Err(StoreError::RangeViolation {
                field: "passengers_off",
                value: passengers_off.to_string(),
            });
        }
        self.next_event_id += 1;
        let id = StopEventId::new(self.next_event_id);
        self.stop_events.insert(
            id,
            StopEvent {
                id,
                trip_id: trip_id.clone(),
                stop_id,
                scheduled_time,
                actual_time,
                passengers_on,
                passengers_off,
            },
        );
        Ok(id)
    }

    /// Cascade: removes the line's route associations and trips, and the
    /// stop events of those trips. Dependents are enumerated first, so the
    /// delete is all-or-nothing.
    pub fn delete_line(&mut self, id: LineId) -> Result<(), StoreError> {
        let name = match self.lines.get(&id) {
            Some(line) => line.name.clone(),
            None => {
                return Err(StoreError::NotFound {
                    entity: "line",
                    key: id.to_string(),
                })
            }
        };

        let doomed_trips: HashSet<TripId> = self
            .trips
            .values()
            .filter(|t| t.line_id == id)
            .map(|t| t.trip_id.clone())
            .collect();

        self.stop_events.retain(|_, e| !doomed_trips.contains(&e.trip_id));
        self.trips.retain(|_, t| t.line_id != id);
        self.line_stops.retain(|&(line, _), _| line != id);
        self.line_names.remove(&name);
        self.lines.remove(&id);

        debug!(line = %name, trips = doomed_trips.len(), "deleted line");
        Ok(())
    }

    /// Restrict: rejected while any route association or stop event still
    /// references the stop.
    pub fn delete_stop(&mut self, id: StopId) -> Result<(), StoreError> {
        let stop = self.stops.get(&id).ok_or_else(|| StoreError::NotFound {
            entity: "stop",
            key: id.to_string(),
        })?;

        let dependents = self.line_stops.values().filter(|ls| ls.stop_id == id).count()
            + self.stop_events.values().filter(|e| e.stop_id == id).count();
        if dependents > 0 {
            return Err(StoreError::restricted_delete("stop", id, dependents));
        }

        let key = stop_key(&stop.name, stop.latitude, stop.longitude);
        self.stop_keys.remove(&key);
        self.stops.remove(&id);
        Ok(())
    }

    /// Cascade: removes the trip's stop events along with it.
    pub fn delete_trip(&mut self, id: &TripId) -> Result<(), StoreError> {
        if self.trips.remove(id).is_none() {
            return Err(StoreError::NotFound {
                entity: "trip",
                key: id.to_string(),
            });
        }
        self.stop_events.retain(|_, e| &e.trip_id != id);
        Ok(())
    }

    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines.get(&id)
    }

    pub fn line_by_name(&self, name: &str) -> Option<&Line> {
        self.line_names.get(name).and_then(|id| self.lines.get(id))
    }

    pub fn stop(&self, id: StopId) -> Option<&Stop> {
        self.stops.get(&id)
    }

    pub fn trip(&self, id: &TripId) -> Option<&Trip> {
        self.trips.get(id)
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }

    pub fn stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.values()
    }

    pub fn line_stops(&self) -> impl Iterator<Item = &LineStop> {
        self.line_stops.values()
    }

    /// The line's route associations in sequence order.
    pub fn line_stops_of(&self, line_id: LineId) -> impl Iterator<Item = &LineStop> {
        self.line_stops
            .range((line_id, i32::MIN)..=(line_id, i32::MAX))
            .map(|(_, ls)| ls)
    }

    pub fn trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips.values()
    }

    pub fn stop_events(&self) -> impl Iterator<Item = &StopEvent> {
        self.stop_events.values()
    }

    pub fn row_counts(&self) -> RowCounts {
        RowCounts {
            lines: self.lines.len(),
            stops: self.stops.len(),
            line_stops: self.line_stops.len(),
            trips: self.trips.len(),
            stop_events: self.stop_events.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    /// Red Line with stops A (seq 1) and B (seq 2), trip T1, one stop event
    /// at A.
    fn fixture() -> (TransitStore, LineId, StopId, StopId) {
        let mut store = TransitStore::new();
        let line = store.insert_line("Red Line", VehicleType::Rail).unwrap();
        let a = store.insert_stop("A", 0.0, 0.0).unwrap();
        let b = store.insert_stop("B", 1.0, 1.0).unwrap();
        store.insert_line_stop(line, a, 1, 0).unwrap();
        store.insert_line_stop(line, b, 2, 10).unwrap();
        store
            .insert_trip(Trip::new(
                TripId::new("T1"),
                line,
                ts(8, 0),
                "bus-7".to_owned(),
            ))
            .unwrap();
        store
            .insert_stop_event(&TripId::new("T1"), a, ts(8, 0), ts(8, 1), 5, 0)
            .unwrap();
        (store, line, a, b)
    }

    #[test]
    fn duplicate_line_name_rejected() {
        let mut store = TransitStore::new();
        store.insert_line("Red Line", VehicleType::Rail).unwrap();
        let err = store.insert_line("Red Line", VehicleType::Bus).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { entity: "line", .. }));
    }

    #[test]
    fn duplicate_stop_triple_rejected_but_same_name_elsewhere_allowed() {
        let mut store = TransitStore::new();
        store.insert_stop("Main St", 34.06, -118.44).unwrap();
        let err = store.insert_stop("Main St", 34.06, -118.44).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { entity: "stop", .. }));

        // Same name at different coordinates is a different stop.
        store.insert_stop("Main St", 34.10, -118.30).unwrap();
        assert_eq!(store.row_counts().stops, 2);
    }

    #[test]
    fn line_stop_requires_existing_line_and_stop() {
        let (mut store, line, a, _) = fixture();
        let err = store
            .insert_line_stop(LineId::new(999), a, 3, 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: "line", .. }));

        let err = store
            .insert_line_stop(line, StopId::new(999), 3, 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: "stop", .. }));
    }

    #[test]
    fn line_stop_range_checks() {
        let (mut store, line, a, _) = fixture();
        let err = store.insert_line_stop(line, a, 0, 0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RangeViolation { field: "sequence_number", .. }
        ));

        let err = store.insert_line_stop(line, a, 3, -1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RangeViolation { field: "time_offset_minutes", .. }
        ));
    }

    #[test]
    fn duplicate_sequence_on_same_line_rejected() {
        let (mut store, line, _, b) = fixture();
        // Position 1 is already taken by stop A.
        let err = store.insert_line_stop(line, b, 1, 5).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { entity: "line_stop", .. }));
    }

    #[test]
    fn same_sequence_on_other_line_allowed() {
        let (mut store, _, a, _) = fixture();
        let other = store.insert_line("Blue Line", VehicleType::Bus).unwrap();
        store.insert_line_stop(other, a, 1, 0).unwrap();
    }

    #[test]
    fn sequence_numbers_within_line_distinct_and_positive() {
        let (store, line, _, _) = fixture();
        let seqs: Vec<i32> = store.line_stops_of(line).map(|ls| ls.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(seqs.iter().all(|&s| s >= 1));
    }

    #[test]
    fn trip_requires_existing_line_and_fresh_id() {
        let (mut store, line, _, _) = fixture();
        let err = store
            .insert_trip(Trip::new(
                TripId::new("T2"),
                LineId::new(999),
                ts(9, 0),
                "bus-9".to_owned(),
            ))
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: "line", .. }));

        let err = store
            .insert_trip(Trip::new(TripId::new("T1"), line, ts(9, 0), "bus-9".to_owned()))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { entity: "trip", .. }));
    }

    #[test]
    fn stop_event_requires_existing_trip_and_stop() {
        let (mut store, _, a, _) = fixture();
        let err = store
            .insert_stop_event(&TripId::new("missing"), a, ts(8, 0), ts(8, 0), 1, 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: "trip", .. }));

        let err = store
            .insert_stop_event(&TripId::new("T1"), StopId::new(999), ts(8, 0), ts(8, 0), 1, 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: "stop", .. }));
    }

    #[test]
    fn stop_event_rejects_negative_counts() {
        let (mut store, _, a, _) = fixture();
        let t1 = TripId::new("T1");
        let err = store
            .insert_stop_event(&t1, a, ts(8, 0), ts(8, 0), -1, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::RangeViolation { field: "passengers_on", .. }
        ));

        let err = store
            .insert_stop_event(&t1, a, ts(8, 0), ts(8, 0), 0, -3)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::RangeViolation { field: "passengers_off", .. }
        ));
        // Nothing was written by the rejected inserts.
        assert_eq!(store.row_counts().stop_events, 1);
    }

    #[test]
    fn delete_line_cascades_to_trips_and_their_events() {
        let (mut store, line, a, b) = fixture();
        store.delete_line(line).unwrap();

        assert_eq!(store.row_counts().lines, 0);
        assert_eq!(store.row_counts().line_stops, 0);
        assert_eq!(store.row_counts().trips, 0);
        assert_eq!(store.row_counts().stop_events, 0);

        // Stops are only restrict-checked, never cascaded.
        assert!(store.stop(a).is_some());
        assert!(store.stop(b).is_some());
    }

    #[test]
    fn delete_trip_cascades_to_its_events_only() {
        let (mut store, line, _, _) = fixture();
        store.delete_trip(&TripId::new("T1")).unwrap();
        assert_eq!(store.row_counts().trips, 0);
        assert_eq!(store.row_counts().stop_events, 0);
        assert!(store.line(line).is_some());
        assert_eq!(store.row_counts().line_stops, 2);
    }

    #[test]
    fn delete_stop_restricted_while_referenced() {
        let (mut store, line, a, b) = fixture();

        // A is referenced by a line association and a stop event.
        let err = store.delete_stop(a).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: "stop", .. }));
        assert!(store.stop(a).is_some());

        // B is only referenced by its line association.
        let err = store.delete_stop(b).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: "stop", .. }));

        // Once the dependents are gone the delete goes through.
        store.delete_line(line).unwrap();
        store.delete_stop(a).unwrap();
        store.delete_stop(b).unwrap();
        assert_eq!(store.row_counts().stops, 0);
    }

    #[test]
    fn deleted_stop_triple_can_be_reinserted() {
        let mut store = TransitStore::new();
        let id = store.insert_stop("A", 0.0, 0.0).unwrap();
        store.delete_stop(id).unwrap();
        store.insert_stop("A", 0.0, 0.0).unwrap();
    }

    #[test]
    fn deletes_of_missing_rows_are_not_found() {
        let mut store = TransitStore::new();
        assert!(matches!(
            store.delete_line(LineId::new(1)),
            Err(StoreError::NotFound { entity: "line", .. })
        ));
        assert!(matches!(
            store.delete_stop(StopId::new(1)),
            Err(StoreError::NotFound { entity: "stop", .. })
        ));
        assert!(matches!(
            store.delete_trip(&TripId::new("T9")),
            Err(StoreError::NotFound { entity: "trip", .. })
        ));
    }

    #[test]
    fn delete_line_leaves_other_lines_untouched() {
        let (mut store, line, a, _) = fixture();
        let other = store.insert_line("Blue Line", VehicleType::Bus).unwrap();
        store.insert_line_stop(other, a, 1, 0).unwrap();
        store
            .insert_trip(Trip::new(TripId::new("B1"), other, ts(7, 30), "bus-2".to_owned()))
            .unwrap();

        store.delete_line(line).unwrap();

        assert!(store.line(other).is_some());
        assert!(store.trip(&TripId::new("B1")).is_some());
        assert_eq!(store.line_stops_of(other).count(), 1);
    }

    #[test]
    fn upsert_line_updates_in_place() {
        let mut store = TransitStore::new();
        let id = store.upsert_line("Route 20", VehicleType::Bus);
        let again = store.upsert_line("Route 20", VehicleType::Rail);
        assert_eq!(id, again);
        assert_eq!(store.line(id).unwrap().vehicle_type, VehicleType::Rail);
        assert_eq!(store.row_counts().lines, 1);
    }

    #[test]
    fn upsert_stop_is_idempotent_per_triple() {
        let mut store = TransitStore::new();
        let id = store.upsert_stop("A", 0.5, 0.5);
        assert_eq!(store.upsert_stop("A", 0.5, 0.5), id);
        assert_ne!(store.upsert_stop("A", 0.5, 0.6), id);
    }

    #[test]
    fn upsert_line_stop_replaces_position() {
        let (mut store, line, _, b) = fixture();
        store.upsert_line_stop(line, b, 1, 3).unwrap();
        let first = store.line_stops_of(line).next().unwrap();
        assert_eq!(first.stop_id, b);
        assert_eq!(first.time_offset_minutes, 3);
        assert_eq!(store.row_counts().line_stops, 2);
    }

    #[test]
    fn upsert_trip_replaces_fields_but_checks_line() {
        let (mut store, line, _, _) = fixture();
        store
            .upsert_trip(Trip::new(TripId::new("T1"), line, ts(9, 15), "bus-8".to_owned()))
            .unwrap();
        let trip = store.trip(&TripId::new("T1")).unwrap();
        assert_eq!(trip.vehicle_id, "bus-8");
        assert_eq!(store.row_counts().trips, 1);

        let err = store
            .upsert_trip(Trip::new(
                TripId::new("T1"),
                LineId::new(999),
                ts(9, 15),
                "bus-8".to_owned(),
            ))
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: "line", .. }));
    }
}
