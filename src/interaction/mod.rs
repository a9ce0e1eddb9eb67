//! Event handling for the relay.
//!
//! This module turns inbound chat events into replies:
//! - Admitting events and folding thread history (`chat_event`)
//! - Running a single turn against the assistant (`turn`)
//! - Rendering answers, citations, and diagnostics (`reply`)

pub mod chat_event;
pub mod reply;
pub mod turn;
