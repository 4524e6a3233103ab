//! HTTP route handlers.

pub mod health;
pub mod images;
pub mod payments;
pub mod registrations;
pub mod reminders;
pub mod tickets;
