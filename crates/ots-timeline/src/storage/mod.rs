//! `SQLite` storage for the deployment timeline.
//!
//! Provides persistence for deployment records, image aliases, and the
//! service instance registry.

mod db;
mod models;
mod queries;
mod queries_services;
mod timeline;

#[cfg(test)]
mod tests;

pub use db::{DatabaseError, TimelineDb};
pub use models::*;
pub use queries::NewDeployment;
pub use queries_services::ServiceInstanceParams;
