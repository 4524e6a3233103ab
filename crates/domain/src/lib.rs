//! Domain layer for the event commerce backend.
//!
//! This crate contains:
//! - Domain models (registrations, payments, tickets, event images, reminders)
//! - Pure decision logic (format validation, payment transitions, primary-image election)
//! - Service seams for notification dispatch and checkout
//! - Domain error types

pub mod models;
pub mod services;
