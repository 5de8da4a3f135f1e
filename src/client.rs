//! Main ops-link client with builder pattern.
//!
//! One client serves one logical datastore. The execution strategy is
//! decided once, when the client is built: supplying a privileged
//! [`DirectBackend`] selects direct local execution; otherwise calls are
//! serialized to the configured proxy endpoint with a bearer token managed
//! by the [`TokenManager`].

use crate::error::{OpsLinkError, Result};
use crate::executor::ExecutionStrategy;
use crate::local::DirectBackend;
use crate::mutation::{DeleteBuilder, InsertBuilder, UpdateBuilder};
use crate::query::QueryBuilder;
use crate::remote::RemoteExecutor;
use crate::session::{SessionStore, TokenManager};
use crate::timeouts::OpsLinkTimeouts;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Shared execution context handed to every builder.
#[derive(Clone)]
pub(crate) struct QueryContext {
    pub(crate) database: String,
    pub(crate) strategy: Arc<ExecutionStrategy>,
    pub(crate) deadline: Duration,
}

/// Client for one logical datastore.
///
/// Use [`OpsLinkClient::builder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use ops_link::{OpsLinkClient, SessionStore};
/// use std::sync::Arc;
///
/// # async fn example(store: Arc<dyn SessionStore>) -> ops_link::Result<()> {
/// let client = OpsLinkClient::builder()
///     .database("LOGMONITOR")
///     .proxy_url("https://edge.example.com/functions/v1/multi-db-proxy")
///     .session_store(store)
///     .build()?;
///
/// let rows = client
///     .from("error_logs")
///     .select::<serde_json::Value>("id, message")
///     .eq("level", "error")
///     .order_desc("created_at")
///     .limit(50)
///     .fetch()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OpsLinkClient {
    database: String,
    strategy: Arc<ExecutionStrategy>,
    tokens: Option<Arc<TokenManager>>,
    timeouts: OpsLinkTimeouts,
}

impl OpsLinkClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> OpsLinkClientBuilder {
        OpsLinkClientBuilder::new()
    }

    /// Entry point for building queries and mutations against a table.
    pub fn from(&self, table: &str) -> TableRef {
        TableRef {
            ctx: QueryContext {
                database: self.database.clone(),
                strategy: self.strategy.clone(),
                deadline: self.timeouts.request_timeout,
            },
            table: table.to_string(),
        }
    }

    /// Logical datastore this client serves.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// `true` when calls go through the proxy endpoint.
    pub fn is_remote(&self) -> bool {
        self.strategy.is_remote()
    }

    /// Configured timeouts.
    pub fn timeouts(&self) -> &OpsLinkTimeouts {
        &self.timeouts
    }

    /// Subscribe to the session-expired broadcast. Only meaningful for
    /// remote clients; local execution carries no session.
    pub fn subscribe_session_expired(&self) -> Result<broadcast::Receiver<String>> {
        self.tokens
            .as_ref()
            .map(|tokens| tokens.subscribe_expired())
            .ok_or_else(|| {
                OpsLinkError::ConfigurationError(
                    "local execution has no session to expire".to_string(),
                )
            })
    }
}

/// One table within the client's datastore.
pub struct TableRef {
    ctx: QueryContext,
    table: String,
}

impl TableRef {
    /// Start a read with the given projection (`*` or a column list).
    pub fn select<T: DeserializeOwned>(&self, columns: &str) -> QueryBuilder<T> {
        QueryBuilder::new(self.ctx.clone(), &self.table, columns)
    }

    /// Start an insert of one record or an array of records.
    pub fn insert<T: DeserializeOwned>(&self, record: impl Serialize) -> InsertBuilder<T> {
        InsertBuilder::new(self.ctx.clone(), &self.table, record)
    }

    /// Start an update; filters are mandatory before execution.
    pub fn update<T: DeserializeOwned>(&self, changes: impl Serialize) -> UpdateBuilder<T> {
        UpdateBuilder::new(self.ctx.clone(), &self.table, changes)
    }

    /// Start a delete; filters are mandatory before execution.
    pub fn delete<T: DeserializeOwned>(&self) -> DeleteBuilder<T> {
        DeleteBuilder::new(self.ctx.clone(), &self.table)
    }
}

/// Builder for configuring [`OpsLinkClient`] instances.
pub struct OpsLinkClientBuilder {
    database: Option<String>,
    proxy_url: Option<String>,
    session_store: Option<Arc<dyn SessionStore>>,
    direct_backend: Option<Arc<dyn DirectBackend>>,
    timeouts: OpsLinkTimeouts,
}

impl OpsLinkClientBuilder {
    fn new() -> Self {
        Self {
            database: None,
            proxy_url: None,
            session_store: None,
            direct_backend: None,
            timeouts: OpsLinkTimeouts::default(),
        }
    }

    /// Logical datastore selector sent with every proxy request.
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    /// Proxy endpoint URL (required for remote execution).
    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// External session store supplying bearer tokens (required for
    /// remote execution).
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Privileged local backend handle. Supplying one selects direct
    /// local execution for the lifetime of the client.
    pub fn direct_backend(mut self, backend: Arc<dyn DirectBackend>) -> Self {
        self.direct_backend = Some(backend);
        self
    }

    /// Timeout configuration for all operations.
    pub fn timeouts(mut self, timeouts: OpsLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Shorthand for setting just the per-call deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Build the client, fixing the execution strategy for its lifetime.
    pub fn build(self) -> Result<OpsLinkClient> {
        let database = self
            .database
            .ok_or_else(|| OpsLinkError::ConfigurationError("database is required".into()))?;

        if let Some(backend) = self.direct_backend {
            debug!("[CLIENT] db={database} using direct local execution");
            return Ok(OpsLinkClient {
                database,
                strategy: Arc::new(ExecutionStrategy::Local(backend)),
                tokens: None,
                timeouts: self.timeouts,
            });
        }

        let proxy_url = self.proxy_url.ok_or_else(|| {
            OpsLinkError::ConfigurationError("proxy_url is required for remote execution".into())
        })?;
        let store = self.session_store.ok_or_else(|| {
            OpsLinkError::ConfigurationError(
                "session_store is required for remote execution".into(),
            )
        })?;

        // Pooled keep-alive connections; per-call deadlines are enforced
        // around each request rather than on the client.
        let http = reqwest::Client::builder()
            .connect_timeout(self.timeouts.connect_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| OpsLinkError::ConfigurationError(e.to_string()))?;

        debug!("[CLIENT] db={database} using proxy endpoint {proxy_url}");
        let tokens = Arc::new(TokenManager::new(store));
        let remote = RemoteExecutor::new(proxy_url, http, tokens.clone());
        Ok(OpsLinkClient {
            database,
            strategy: Arc::new(ExecutionStrategy::Remote(remote)),
            tokens: Some(tokens),
            timeouts: self.timeouts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryBackend;
    use crate::session::{SessionStore, SessionToken};
    use async_trait::async_trait;

    struct NoStore;

    #[async_trait]
    impl SessionStore for NoStore {
        async fn current_session(&self) -> Result<Option<SessionToken>> {
            Ok(None)
        }

        async fn refresh_session(&self) -> Result<SessionToken> {
            Err(OpsLinkError::NoSession("no session".into()))
        }
    }

    #[test]
    fn test_builder_requires_database() {
        let result = OpsLinkClient::builder()
            .proxy_url("http://localhost:9999")
            .session_store(Arc::new(NoStore))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_remote_requires_proxy_url_and_store() {
        let result = OpsLinkClient::builder().database("PQNC_QA").build();
        assert!(result.is_err());

        let result = OpsLinkClient::builder()
            .database("PQNC_QA")
            .proxy_url("http://localhost:9999")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_selects_local_strategy() {
        let client = OpsLinkClient::builder()
            .database("PQNC_QA")
            .direct_backend(Arc::new(MemoryBackend::new()))
            .build()
            .unwrap();
        assert!(!client.is_remote());
        assert!(client.subscribe_session_expired().is_err());
    }

    #[test]
    fn test_remote_strategy_builds() {
        let client = OpsLinkClient::builder()
            .database("PQNC_QA")
            .proxy_url("http://localhost:9999")
            .session_store(Arc::new(NoStore))
            .build()
            .unwrap();
        assert!(client.is_remote());
        assert!(client.subscribe_session_expired().is_ok());
    }
}
