use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use serde::Serialize;

use transit_ridership::{loader, queries, store::TransitStore};

#[derive(Parser)]
#[command(
    name = "transit-ridership",
    about = "Load a transit ridership dataset and answer canned queries over it"
)]
struct Cli {
    /// Directory containing lines.csv, stops.csv, line_stops.csv, trips.csv,
    /// and stop_events.csv
    #[arg(long, global = true, default_value = "data")]
    datadir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the dataset and report per-table row counts
    Load,
    /// Run a read-only query and print its rows as JSON
    #[command(subcommand)]
    Query(Query),
    /// Print all stops as a GeoJSON FeatureCollection
    ExportStops,
}

#[derive(Subcommand)]
enum Query {
    /// Stops of a line in route order
    LineStops {
        /// Line name, e.g. "Route 20"
        line: String,
    },
    /// Trips departing within a time-of-day window
    TripsBetween {
        #[arg(default_value = "07:00:00")]
        start: NaiveTime,
        #[arg(default_value = "09:00:00")]
        end: NaiveTime,
    },
    /// Stops appearing on more than one line
    TransferStops,
    /// Full route of a trip
    TripRoute {
        /// Trip identifier, e.g. T0001
        trip: String,
    },
    /// Lines serving every one of the given stops
    LinesServing {
        #[arg(required = true)]
        stops: Vec<String>,
    },
    /// Average boardings per stop event, by line
    LineRidership,
    /// Stops with the highest combined boardings and alightings
    BusiestStops {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Late stop events counted by line
    DelaysByLine {
        #[arg(long, default_value_t = 2)]
        threshold_minutes: i64,
    },
    /// Trips with several late stop events
    DelayedTrips {
        #[arg(long, default_value_t = 2)]
        threshold_minutes: i64,
        #[arg(long, default_value_t = 3)]
        min_stops: usize,
    },
    /// Stops whose total boardings beat the network average
    AboveAverageStops,
}

#[derive(Serialize)]
struct QueryOutput<T: Serialize> {
    query: &'static str,
    description: &'static str,
    results: Vec<T>,
    count: usize,
}

fn print_rows<T: Serialize>(
    query: &'static str,
    description: &'static str,
    results: Vec<T>,
) -> anyhow::Result<()> {
    let count = results.len();
    let output = QueryOutput {
        query,
        description,
        results,
        count,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_query(store: &TransitStore, query: Query) -> anyhow::Result<()> {
    match query {
        Query::LineStops { line } => print_rows(
            "line-stops",
            "Stops on the line in route order",
            queries::stops_on_line(store, &line),
        ),
        Query::TripsBetween { start, end } => print_rows(
            "trips-between",
            "Trips departing within the time window",
            queries::trips_between(store, start, end),
        ),
        Query::TransferStops => print_rows(
            "transfer-stops",
            "Stops appearing on more than one line",
            queries::transfer_stops(store),
        ),
        Query::TripRoute { trip } => print_rows(
            "trip-route",
            "Complete route of the trip",
            queries::trip_route(store, &trip),
        ),
        Query::LinesServing { stops } => print_rows(
            "lines-serving",
            "Lines serving all of the given stops",
            queries::lines_serving_all(store, &stops),
        ),
        Query::LineRidership => print_rows(
            "line-ridership",
            "Average boardings per stop event, by line",
            queries::average_boardings_by_line(store),
        ),
        Query::BusiestStops { limit } => print_rows(
            "busiest-stops",
            "Busiest stops by total passenger activity",
            queries::busiest_stops(store, limit),
        ),
        Query::DelaysByLine { threshold_minutes } => print_rows(
            "delays-by-line",
            "Late stop events counted by line",
            queries::delays_by_line(store, threshold_minutes),
        ),
        Query::DelayedTrips {
            threshold_minutes,
            min_stops,
        } => print_rows(
            "delayed-trips",
            "Trips with several late stop events",
            queries::delayed_trips(store, threshold_minutes, min_stops),
        ),
        Query::AboveAverageStops => print_rows(
            "above-average-stops",
            "Stops with above-average total boardings",
            queries::stops_above_average_boardings(store),
        ),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut store = TransitStore::new();
    let counts = loader::load_dir(&mut store, &cli.datadir)
        .with_context(|| format!("loading dataset from {}", cli.datadir.display()))?;

    match cli.command {
        Command::Load => {
            println!("lines:       {}", counts.lines);
            println!("stops:       {}", counts.stops);
            println!("line_stops:  {}", counts.line_stops);
            println!("trips:       {}", counts.trips);
            println!("stop_events: {}", counts.stop_events);
            println!("total: {} rows loaded", counts.total());
        }
        Command::Query(query) => run_query(&store, query)?,
        Command::ExportStops => println!("{}", queries::stops_geojson(&store)?),
    }

    Ok(())
}
