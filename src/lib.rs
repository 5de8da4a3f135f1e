//! ops-link: client SDK for the dashboard's secure query proxy.
//!
//! Provides a fluent, deferred query/mutation builder over logical
//! datastores. Descriptors execute either against a privileged local
//! backend handle (trusted context) or through an authenticated proxy
//! endpoint (untrusted context); the strategy is fixed when the client is
//! built and call sites cannot tell the two apart. On the remote path the
//! session credential is managed independently: proactive refresh near
//! expiry, a single refresh-and-replay on 401, and terminal session expiry
//! with a process-wide broadcast after repeated rejection.
//!
//! ```rust,no_run
//! use ops_link::{OpsLinkClient, SessionStore};
//! use std::sync::Arc;
//!
//! # async fn example(store: Arc<dyn SessionStore>) -> ops_link::Result<()> {
//! let client = OpsLinkClient::builder()
//!     .database("PQNC_QA")
//!     .proxy_url("https://edge.example.com/functions/v1/multi-db-proxy")
//!     .session_store(store)
//!     .build()?;
//!
//! let open = client
//!     .from("tickets")
//!     .select::<serde_json::Value>("*")
//!     .eq("status", "open")
//!     .or_raw("severity.gte.4,escalated.eq.true")
//!     .order_desc("created_at")
//!     .range(0, 49)
//!     .fetch()
//!     .await?;
//! println!("{} open tickets", open.rows.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod descriptor;
pub mod disjunction;
pub mod error;
mod executor;
pub mod local;
pub mod models;
pub mod mutation;
pub mod query;
pub mod remote;
mod retry;
pub mod session;
pub mod timeouts;

pub use client::{OpsLinkClient, OpsLinkClientBuilder, TableRef};
pub use descriptor::{
    CountMode, MutationDescriptor, MutationKind, OrderBy, Pagination, Predicate, PredicateOp,
    QueryDescriptor, ResultShape,
};
pub use disjunction::Disjunction;
pub use error::{OpsLinkError, Result};
pub use local::{DirectBackend, MemoryBackend};
pub use models::{FilterValue, Operation, Payload, ProxyRequest, ProxyResponse, Rows};
pub use mutation::{DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use query::QueryBuilder;
pub use session::{SessionStore, SessionToken, TokenManager, REFRESH_MARGIN};
pub use timeouts::{OpsLinkTimeouts, OpsLinkTimeoutsBuilder};
