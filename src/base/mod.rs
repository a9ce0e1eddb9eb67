//! Core components, types, and utilities for the relay.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The markdown to Slack markup transformer.
//! - Common types and result handling.

pub mod config;
pub mod markup;
pub mod types;
