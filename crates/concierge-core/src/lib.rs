//! # Concierge Core
//!
//! Shared, I/O-free logic for Concierge: data models, keyword rules,
//! the pattern matcher, calendar selection, contact extraction, the
//! in-memory vector index, and the embedder trait.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or other
//! runtime dependencies. Everything here is deterministic and can be
//! exercised from unit tests.

pub mod calendar;
pub mod contact;
pub mod embedding;
pub mod index;
pub mod keywords;
pub mod models;
pub mod patterns;
