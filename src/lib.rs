pub mod config;
pub mod db;
pub mod discovery;
pub mod feed;
pub mod ingest;
pub mod monitoring;
pub mod tracker;
