//! Database connection and initialization.

pub use ots_core::db::DatabaseError;

ots_core::define_database!(TimelineDb, "Timeline database migrations complete");
