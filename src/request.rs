// Copyright (c) 2025 - Cowboy AI, Inc.
//! Request Adapter
//!
//! Turns one remote call into an [`Eventual`] so it can be gathered with
//! others. The call runs on its own task and the caller gets the handle
//! back immediately.
//!
//! | Peer behaviour             | Eventual                      |
//! |----------------------------|-------------------------------|
//! | replies with a value       | `Completed(Ok(value))`        |
//! | replies with a fault       | `Completed(Err(..))`          |
//! | connection fails / closes  | `Completed(Err(..))`          |
//! | never replies              | stays pending                 |
//!
//! A peer that answers with an error has still answered, so its eventual
//! completes and a filter gets to judge it. Only silence is left for the
//! gather deadline to resolve.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::errors::{QuorumError, QuorumResult};
use crate::eventual::{self, Eventual};
use crate::transport::Transport;

/// Call `method` on the peer behind `transport` without waiting for it
///
/// Must be called from within a tokio runtime.
pub fn fetch<Req, Resp>(
    transport: Arc<dyn Transport>,
    method: impl Into<String>,
    request: Req,
) -> Eventual<QuorumResult<Resp>>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + Sync + 'static,
{
    eventual::spawn(call(transport, method.into(), request))
}

/// Typed remote call, awaited in place
///
/// [`fetch`] runs this on its own task.
pub async fn call<Req, Resp>(
    transport: Arc<dyn Transport>,
    method: String,
    request: Req,
) -> QuorumResult<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let params = serde_json::to_value(&request)?;
    let reply = transport.call(&method, params).await;
    debug!(method = %method, ok = reply.is_ok(), "remote call settled");
    serde_json::from_value(reply?).map_err(|e| QuorumError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventual::Outcome;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    /// Replies after a delay, or never for `method == "Silent"`
    struct Scripted;

    #[async_trait]
    impl Transport for Scripted {
        async fn call(&self, method: &str, params: Value) -> QuorumResult<Value> {
            match method {
                "Silent" => futures::future::pending().await,
                "Broken" => Err(QuorumError::Disconnected),
                _ => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(params)
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_returns_before_reply() {
        let reply: Eventual<QuorumResult<u32>> = fetch(Arc::new(Scripted), "Echo", 5u32);

        assert!(!reply.is_terminal());
        assert_eq!(reply.observe().await, Outcome::Completed(Ok(5)));
    }

    #[tokio::test]
    async fn test_transport_failure_completes_with_error() {
        let reply: Eventual<QuorumResult<u32>> = fetch(Arc::new(Scripted), "Broken", 5u32);

        assert_eq!(
            reply.observe().await,
            Outcome::Completed(Err(QuorumError::Disconnected))
        );
    }

    #[tokio::test]
    async fn test_undecodable_reply_completes_with_error() {
        let reply: Eventual<QuorumResult<String>> = fetch(Arc::new(Scripted), "Echo", 5u32);

        assert!(matches!(
            reply.observe().await,
            Outcome::Completed(Err(QuorumError::Deserialization(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_stays_pending() {
        let reply: Eventual<QuorumResult<u32>> = fetch(Arc::new(Scripted), "Silent", 5u32);

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(reply.try_outcome(), None);
    }
}
