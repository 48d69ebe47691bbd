use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::schema::{stop::StopId, trip::TripId};

/// Surrogate key assigned by the store on insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StopEventId(u32);

impl StopEventId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StopEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded visit of a trip to a stop.
#[derive(Debug, Clone)]
pub struct StopEvent {
    pub id: StopEventId,
    pub trip_id: TripId,
    pub stop_id: StopId,
    pub scheduled_time: NaiveDateTime,
    pub actual_time: NaiveDateTime,
    pub passengers_on: i32,
    pub passengers_off: i32,
}

impl StopEvent {
    /// Positive when the vehicle arrived late.
    pub fn delay(&self) -> TimeDelta {
        self.actual_time - self.scheduled_time
    }

    pub fn activity(&self) -> i64 {
        i64::from(self.passengers_on) + i64::from(self.passengers_off)
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

    #[test]
    fn delay_is_signed() {
        let event = StopEvent {
            id: StopEventId::new(1),
            trip_id: TripId::new("T1"),
            stop_id: StopId::new(1),
            scheduled_time: ts(8, 0),
            actual_time: ts(8, 5),
            passengers_on: 3,
            passengers_off: 1,
        };
        assert_eq!(event.delay(), TimeDelta::minutes(5));
        assert_eq!(event.activity(), 4);

        let early = StopEvent {
            actual_time: ts(7, 58),
            ..event
        };
        assert_eq!(early.delay(), TimeDelta::minutes(-2));
    }
}
