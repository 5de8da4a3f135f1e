//! Refresh-and-replay handling for authorization rejections.
//!
//! A 401 from the proxy means the presented token was rejected. The
//! recovery is fixed: force one token refresh, replay the original request
//! exactly once with the new token, and if that is rejected too (or the
//! refresh itself fails) the session is terminally expired. Never a third
//! request for the same logical call.

use crate::error::{OpsLinkError, Result};
use crate::models::{Payload, ProxyRequest};
use crate::remote::{Attempt, RemoteExecutor};
use log::warn;
use std::time::Duration;

pub(crate) async fn replay_unauthorized(
    executor: &RemoteExecutor,
    request: &ProxyRequest,
    deadline: Duration,
) -> Result<Payload> {
    warn!("[AUTH_RETRY] Proxy rejected token, forcing refresh");
    // A failed refresh terminates the session and broadcasts inside the
    // manager; the SessionExpired error propagates from there.
    let token = executor
        .tokens()
        .force_refresh("proxy returned 401")
        .await?;

    match executor.attempt(request, &token, deadline).await? {
        Attempt::Completed(payload) => Ok(payload),
        Attempt::Unauthorized => {
            let reason = "authorization rejected after token refresh";
            warn!("[AUTH_RETRY] Replay rejected, terminating session");
            executor.tokens().terminate(reason).await;
            Err(OpsLinkError::SessionExpired(reason.to_string()))
        }
    }
}
