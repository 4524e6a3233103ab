//! Persistence layer for the event commerce backend.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - Query metrics
//!
//! Repository methods that take `&mut PgConnection` run inside a transaction
//! owned by the caller; the others use the pool directly.

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
