use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::schema::line::LineId;

/// Natural key: trip identifiers are assigned upstream and are stable, so no
/// surrogate id is introduced for them.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize)]
pub struct TripId(String);

impl TripId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One scheduled run of a line.
#[derive(Debug, Clone)]
pub struct Trip {
    pub trip_id: TripId,
    pub line_id: LineId,
    pub departure_time: NaiveDateTime,
    pub vehicle_id: String,
}

impl Trip {
    pub fn new(
        trip_id: TripId,
        line_id: LineId,
        departure_time: NaiveDateTime,
        vehicle_id: String,
    ) -> Self {
        Self {
            trip_id,
            line_id,
            departure_time,
            vehicle_id,
        }
    }
}
