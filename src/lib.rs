//! Library root for `docs-relay`.
//!
//! Docs-relay answers Slack threads with a hosted documentation assistant:
//! - Each Slack thread is mapped to one remote assistant session
//! - @-mentions start (or continue) a conversation, with thread history folded in
//! - Follow-up thread messages are answered once the bot has replied in the thread
//! - Answers are converted from markdown to Slack markup, with cited sources
//!
//! The relay integrates with Slack for chat, SurrealDB for session storage,
//! and the assistant's HTTP API for answers. Each service sits behind a trait
//! so other implementations (and test doubles) can be swapped in.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the relay runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with session store, assistant, and chat clients
/// - Starts the main event loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting docs-relay ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install the rustls crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
