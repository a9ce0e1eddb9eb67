//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the relay:
//! - The documentation assistant API
//! - Chat services (e.g., Slack)
//! - Thread session storage (e.g., SurrealDB)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod assistant;
pub mod chat;
pub mod db;
