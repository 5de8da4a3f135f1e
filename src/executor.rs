//! Execution strategy selected once at client construction.
//!
//! Call sites never know which path ran: both accept identical descriptors
//! and produce the same [`Payload`] envelope. The choice is an explicit
//! configuration value injected through the client builder and is never
//! re-evaluated per call.

use crate::descriptor::{MutationDescriptor, MutationKind, QueryDescriptor};
use crate::error::Result;
use crate::local::DirectBackend;
use crate::models::{Payload, ProxyRequest};
use crate::remote::RemoteExecutor;
use std::sync::Arc;
use std::time::Duration;

pub(crate) enum ExecutionStrategy {
    /// Privileged local backend handle; no token handling.
    Local(Arc<dyn DirectBackend>),
    /// Authenticated proxy endpoint.
    Remote(RemoteExecutor),
}

impl ExecutionStrategy {
    pub(crate) fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub(crate) async fn query(
        &self,
        database: &str,
        query: &QueryDescriptor,
        deadline: Duration,
    ) -> Result<Payload> {
        match self {
            Self::Local(backend) => backend.select(query).await,
            Self::Remote(remote) => {
                let request = ProxyRequest::from_query(database, query);
                remote.execute(&request, deadline).await
            }
        }
    }

    pub(crate) async fn mutate(
        &self,
        database: &str,
        mutation: &MutationDescriptor,
        deadline: Duration,
    ) -> Result<Payload> {
        match self {
            Self::Local(backend) => match mutation.kind {
                MutationKind::Insert => backend.insert(mutation).await,
                MutationKind::Update => backend.update(mutation).await,
                MutationKind::Delete => backend.delete(mutation).await,
            },
            Self::Remote(remote) => {
                let request = ProxyRequest::from_mutation(database, mutation);
                remote.execute(&request, deadline).await
            }
        }
    }
}
