//! Shared utilities and common types for the event commerce backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Cryptographic utilities (hashing, HMAC signing, random tokens)
//! - Ticket code generation
//! - Signed ticket verification tokens (HS256 JWT)
//! - Payment provider webhook signature verification
//! - Common validation logic

pub mod crypto;
pub mod signature;
pub mod ticket_jwt;
pub mod ticket_token;
pub mod validation;
