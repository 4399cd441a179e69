//! Infrastructure adapters and runtime bootstrap.

pub mod blobs;
pub mod cache;
pub mod db;
pub mod error;
pub mod http;
pub mod notify;
pub mod telemetry;
