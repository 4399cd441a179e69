//! School website content API: resource lifecycle, caching, authentication and authorization.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
