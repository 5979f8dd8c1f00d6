//! Command-line front end: engine wiring and the JSON-lines request loop.

pub mod app;
