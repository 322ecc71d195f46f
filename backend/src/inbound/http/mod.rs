//! HTTP inbound adapter exposing REST endpoints.

pub mod actor;
pub mod error;
pub mod health;
pub mod ingest;
pub mod orders;
pub mod reports;
pub mod request_span;
pub mod schemas;
pub mod state;
pub mod technicians;
#[cfg(test)]
pub mod test_utils;

pub use error::ApiResult;
