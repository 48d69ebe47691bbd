use std::fmt;

use geo_types::Point;
use serde::Serialize;

/// Surrogate key assigned by the store on insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StopId(u32);

impl StopId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A physical location. Stop names repeat across a network, so identity is
/// the full (name, latitude, longitude) triple, not the name alone.
#[derive(Debug, Clone)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Stop {
    pub fn new(id: StopId, name: String, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            name,
            latitude,
            longitude,
        }
    }

    pub fn location(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}
