use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::StoreError;

/// Surrogate key assigned by the store on insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LineId(u32);

impl LineId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Rail,
    Bus,
}

impl FromStr for VehicleType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rail" => Ok(VehicleType::Rail),
            "bus" => Ok(VehicleType::Bus),
            _ => Err(StoreError::RangeViolation {
                field: "vehicle_type",
                value: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleType::Rail => write!(f, "rail"),
            VehicleType::Bus => write!(f, "bus"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub vehicle_type: VehicleType,
}

impl Line {
    pub fn new(id: LineId, name: String, vehicle_type: VehicleType) -> Self {
        Self {
            id,
            name,
            vehicle_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_type_parses_both_variants() {
        assert_eq!("rail".parse::<VehicleType>().unwrap(), VehicleType::Rail);
        assert_eq!("bus".parse::<VehicleType>().unwrap(), VehicleType::Bus);
    }

    #[test]
    fn vehicle_type_rejects_unknown_values() {
        let err = "tram".parse::<VehicleType>().unwrap_err();
        assert!(matches!(
            err,
            StoreError::RangeViolation {
                field: "vehicle_type",
                ..
            }
        ));
    }

    #[test]
    fn vehicle_type_display_round_trips() {
        for vt in [VehicleType::Rail, VehicleType::Bus] {
            assert_eq!(vt.to_string().parse::<VehicleType>().unwrap(), vt);
        }
    }
}
