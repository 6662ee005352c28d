pub mod ingest;
pub mod input;
pub mod output;
pub mod runner;
pub mod snapshot;
