pub mod aggregate;
pub mod bucket;
pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod ingest;
pub mod measurement;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod publish;
pub mod query;
pub mod services;
pub mod store;
pub mod trends;
