//! Application services: the resource lifecycle, authentication and the
//! collaborator traits they depend on.

pub mod audit;
pub mod auth;
pub mod blobs;
pub mod cache;
pub mod error;
pub mod lifecycle;
pub mod news;
pub mod notify;
pub mod passwords;
pub mod repos;
pub mod resource;
pub mod resources;
