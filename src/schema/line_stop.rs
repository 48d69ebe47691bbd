use crate::schema::{line::LineId, stop::StopId};

/// Ordered membership of a stop within a line's route. Keyed by
/// (line, sequence_number); the same stop may appear at several positions.
#[derive(Debug, Clone)]
pub struct LineStop {
    pub line_id: LineId,
    pub stop_id: StopId,
    pub sequence_number: i32,
    pub time_offset_minutes: i32,
}
