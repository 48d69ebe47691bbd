//! A normalized relational model of transit lines, stops, trips, and
//! per-stop ridership events, held in memory with the schema's integrity
//! contract (keys, foreign keys, range checks, cascade/restrict deletes)
//! enforced on every write. Includes a CSV bulk loader and a set of
//! read-only ridership and punctuality queries.

pub mod error;
pub mod loader;
pub mod queries;
pub mod schema;
pub mod store;
