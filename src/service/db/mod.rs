//! Thread session storage.
//!
//! Maps a (channel, thread root) pair to the id of the remote assistant session that
//! carries the thread's conversation.

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use chrono::TimeDelta;

use crate::base::types::{Res, Void};

pub mod surreal;

/// Days a thread session survives after its last write.
pub const SESSION_RETENTION_DAYS: i64 = 7;

/// The retention window applied on every write.
pub fn session_retention() -> TimeDelta {
    TimeDelta::days(SESSION_RETENTION_DAYS)
}

/// Derives the store key for a thread.
pub fn thread_session_key(channel_id: &str, thread_ts: &str) -> String {
    format!("{channel_id}:{thread_ts}")
}

// Traits.

/// Generic database client trait that clients must implement.
///
/// Writes are last-write-wins and reads are not serialized per key: two turns racing on a
/// brand new thread may both create a remote session, and the later write orphans the
/// earlier one.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Gets the session stored for a thread, if one exists and has not expired.
    async fn get_thread_session(&self, channel_id: &str, thread_ts: &str) -> Res<Option<String>>;

    /// Stores the session for a thread, overwriting any previous value and restarting the retention window.
    async fn put_thread_session(&self, channel_id: &str, thread_ts: &str, session_id: &str) -> Void;
}

/// Database client for the relay.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    /// The database client instance.
    pub inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}
