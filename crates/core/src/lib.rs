pub mod config;
pub mod csv_ingest;
pub mod domain;
pub mod error;
pub mod phone;
pub mod secrets;
