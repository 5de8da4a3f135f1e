//! Remote execution through the authenticated proxy endpoint.
//!
//! Serializes a descriptor into one JSON POST, attaches a bearer token from
//! the [`TokenManager`], and classifies the response. Exactly one request
//! leaves this module per logical call, and the per-call deadline bounds
//! the complete exchange (send, body read, envelope parse), not just the
//! arrival of response headers. A 401 hands control to the
//! refresh-and-replay path in [`crate::retry`], which replays at most once.

use crate::error::{OpsLinkError, Result};
use crate::models::{Payload, ProxyRequest, ProxyResponse};
use crate::retry;
use crate::session::TokenManager;
use log::{debug, warn};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one POST: either a classified payload or an authorization
/// rejection for the replay path to handle.
pub(crate) enum Attempt {
    Unauthorized,
    Completed(Payload),
}

/// Executes proxy requests over HTTP.
pub struct RemoteExecutor {
    endpoint: String,
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
}

impl RemoteExecutor {
    pub(crate) fn new(endpoint: String, http: reqwest::Client, tokens: Arc<TokenManager>) -> Self {
        Self {
            endpoint,
            http,
            tokens,
        }
    }

    pub(crate) fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Execute one proxy request under the given deadline.
    pub async fn execute(&self, request: &ProxyRequest, deadline: Duration) -> Result<Payload> {
        // NoSession and SessionExpired fail fast here, before any I/O
        let token = self.tokens.access_token().await?;

        match self.attempt(request, &token, deadline).await? {
            Attempt::Completed(payload) => Ok(payload),
            Attempt::Unauthorized => retry::replay_unauthorized(self, request, deadline).await,
        }
    }

    /// One complete POST under the deadline: send, read the body, classify.
    /// A server that returns headers and then stalls the body still times
    /// out. Split out so the replay path can reuse it with a new token.
    pub(crate) async fn attempt(
        &self,
        request: &ProxyRequest,
        token: &str,
        deadline: Duration,
    ) -> Result<Attempt> {
        debug!(
            "[PROXY] POST {} op={:?} table={} db={}",
            self.endpoint, request.operation, request.table, request.database
        );
        let started = Instant::now();
        let call = async {
            let response = self
                .http
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .bearer_auth(token)
                .json(request)
                .send()
                .await?;
            let status = response.status();
            debug!(
                "[PROXY] Response status={} duration_ms={}",
                status,
                started.elapsed().as_millis()
            );
            if status == StatusCode::UNAUTHORIZED {
                return Ok(Attempt::Unauthorized);
            }
            Ok(Attempt::Completed(Self::classify(response).await?))
        };
        match tokio::time::timeout(deadline, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "[PROXY] Deadline of {deadline:?} exceeded for {}",
                    self.endpoint
                );
                Err(OpsLinkError::TimeoutError(deadline))
            }
        }
    }

    /// Map a non-401 response into the uniform envelope.
    async fn classify(response: reqwest::Response) -> Result<Payload> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProxyResponse>(&body)
                .ok()
                .and_then(|envelope| envelope.error)
                .unwrap_or_else(|| {
                    if body.is_empty() {
                        format!("HTTP {status}")
                    } else {
                        body.clone()
                    }
                });
            warn!("[PROXY] Server error: status={status} message=\"{message}\"");
            return Err(OpsLinkError::ServerError {
                status_code: status.as_u16(),
                message,
            });
        }

        let envelope: ProxyResponse = response.json().await?;
        if let Some(message) = envelope.error {
            warn!("[PROXY] Proxy reported error: {message}");
            return Err(OpsLinkError::ServerError {
                status_code: status.as_u16(),
                message,
            });
        }
        Ok(Payload::from_wire(envelope.data, envelope.count))
    }
}
