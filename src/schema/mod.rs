pub mod line;
pub mod line_stop;
pub mod stop;
pub mod stop_event;
pub mod trip;
