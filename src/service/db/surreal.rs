//! SurrealDB implementation of the thread session store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{DbClient, GenericDbClient, session_retention, thread_session_key};

const THREAD_SESSION_TABLE: &str = "thread_session";

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Connects to the database configured for the relay.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::new(&config.db_endpoint, config.db_credentials(), &config.db_namespace, &config.db_database).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates a throwaway in-memory store.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::new("mem://", None, "docs_relay", "sessions").await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Records.

/// A thread session record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurrealThreadSession {
    pub channel_id: String,
    pub thread_ts: String,
    pub session_id: String,
    /// Unix seconds of the last write.
    pub updated_at: i64,
    /// Unix seconds after which the record no longer counts.
    pub expires_at: i64,
}

impl SurrealThreadSession {
    fn new(channel_id: &str, thread_ts: &str, session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            session_id: session_id.to_string(),
            updated_at: now.timestamp(),
            expires_at: (now + session_retention()).timestamp(),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }
}

// Specific implementations.

/// SurrealDB client implementation.
#[derive(Clone)]
pub struct SurrealDbClient {
    db: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connects, signs in when credentials are given, and defines the schema.
    #[instrument(name = "SurrealDbClient::new", skip(credentials))]
    pub async fn new(endpoint: &str, credentials: Option<(&str, &str)>, namespace: &str, database: &str) -> Res<Self> {
        let db = any::connect(endpoint).await?;

        if let Some((username, password)) = credentials {
            db.signin(Root { username, password }).await?;
        }

        db.use_ns(namespace).use_db(database).await?;

        // Define schemas.

        db.query(format!("DEFINE TABLE IF NOT EXISTS {THREAD_SESSION_TABLE} SCHEMAFULL;"))
            .query(format!("DEFINE FIELD IF NOT EXISTS channel_id ON {THREAD_SESSION_TABLE} TYPE string;"))
            .query(format!("DEFINE FIELD IF NOT EXISTS thread_ts ON {THREAD_SESSION_TABLE} TYPE string;"))
            .query(format!("DEFINE FIELD IF NOT EXISTS session_id ON {THREAD_SESSION_TABLE} TYPE string;"))
            .query(format!("DEFINE FIELD IF NOT EXISTS updated_at ON {THREAD_SESSION_TABLE} TYPE int;"))
            .query(format!("DEFINE FIELD IF NOT EXISTS expires_at ON {THREAD_SESSION_TABLE} TYPE int;"))
            .await?
            .check()?;

        info!("Database initialized successfully.");

        Ok(Self { db })
    }

    /// Expired-aware lookup with an explicit clock.
    async fn get_at(&self, channel_id: &str, thread_ts: &str, now: DateTime<Utc>) -> Res<Option<String>> {
        let key = thread_session_key(channel_id, thread_ts);
        let record: Option<SurrealThreadSession> = self.db.select((THREAD_SESSION_TABLE, key.as_str())).await?;

        match record {
            Some(record) if record.is_expired(now) => {
                debug!("Session for `{}` expired, removing.", key);

                let _: Option<SurrealThreadSession> = self.db.delete((THREAD_SESSION_TABLE, key.as_str())).await?;

                Ok(None)
            }
            Some(record) => Ok(Some(record.session_id)),
            None => Ok(None),
        }
    }

    /// Write with an explicit clock.
    async fn put_at(&self, channel_id: &str, thread_ts: &str, session_id: &str, now: DateTime<Utc>) -> Void {
        let key = thread_session_key(channel_id, thread_ts);
        let record = SurrealThreadSession::new(channel_id, thread_ts, session_id, now);

        let _: Option<SurrealThreadSession> = self.db.upsert((THREAD_SESSION_TABLE, key.as_str())).content(record).await?;

        Ok(())
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn get_thread_session(&self, channel_id: &str, thread_ts: &str) -> Res<Option<String>> {
        self.get_at(channel_id, thread_ts, Utc::now()).await
    }

    #[instrument(skip(self))]
    async fn put_thread_session(&self, channel_id: &str, thread_ts: &str, session_id: &str) -> Void {
        self.put_at(channel_id, thread_ts, session_id, Utc::now()).await?;

        info!("Stored session `{}` for thread `{}`.", session_id, thread_session_key(channel_id, thread_ts));

        Ok(())
    }
}

// Tests.
