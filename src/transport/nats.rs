// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS request/reply transport
//!
//! A call to `method` becomes a NATS request on `{subject_prefix}.{method}`
//! carrying an [`RpcRequest`]; the responder answers on the reply inbox
//! with an [`RpcResponse`]. Any number of responders may share a subject;
//! NATS delivers each request to one of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{dispatch, RequestHandler, RpcRequest, RpcResponse, Transport};
use crate::config::NatsConfig;
use crate::errors::{QuorumError, QuorumResult};

/// Build the subject a method is served on
pub fn method_subject(prefix: &str, method: &str) -> String {
    format!("{prefix}.{method}")
}

async fn connect(config: &NatsConfig) -> QuorumResult<Client> {
    let connect_options = ConnectOptions::new()
        .name(&config.name)
        .connection_timeout(config.connect_timeout)
        .request_timeout(Some(config.request_timeout));

    let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
        .await
        .map_err(|e| QuorumError::NatsConnection(e.to_string()))?;

    info!("Connected to NATS at {:?}", config.servers);
    Ok(client)
}

/// Client side of NATS request/reply
#[derive(Clone)]
pub struct NatsTransport {
    client: Client,
    subject_prefix: String,
    next_id: Arc<AtomicU64>,
}

impl NatsTransport {
    /// Connect with the given configuration
    pub async fn new(config: NatsConfig) -> QuorumResult<Self> {
        let client = connect(&config).await?;
        Ok(Self::with_client(client, config.subject_prefix))
    }

    /// Use an existing connection
    pub fn with_client(client: Client, subject_prefix: impl Into<String>) -> Self {
        Self {
            client,
            subject_prefix: subject_prefix.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Get the underlying NATS client for advanced operations
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn call(&self, method: &str, params: Value) -> QuorumResult<Value> {
        let request = RpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: method.to_string(),
            params,
        };
        let payload = serde_json::to_vec(&request)?;
        let subject = method_subject(&self.subject_prefix, method);

        let message = self
            .client
            .request(subject.clone(), payload.into())
            .await
            .map_err(|e| QuorumError::NatsRequest(e.to_string()))?;

        debug!("Received reply to {} on {}", request.id, subject);

        let response: RpcResponse = serde_json::from_slice(&message.payload)
            .map_err(|e| QuorumError::Deserialization(e.to_string()))?;

        if response.id != request.id {
            return Err(QuorumError::Protocol(format!(
                "reply id {} does not match request {}",
                response.id, request.id
            )));
        }
        response.into_result()
    }
}

impl std::fmt::Debug for NatsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsTransport")
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

/// Serves a [`RequestHandler`] on its NATS subject
pub struct NatsResponder {
    subject: String,
    task: JoinHandle<()>,
}

impl NatsResponder {
    /// Connect and start answering requests for `handler`
    pub async fn start<H>(config: NatsConfig, handler: H) -> QuorumResult<Self>
    where
        H: RequestHandler,
    {
        let client = connect(&config).await?;
        Self::with_client(client, &config.subject_prefix, handler).await
    }

    /// Answer requests for `handler` over an existing connection
    pub async fn with_client<H>(client: Client, subject_prefix: &str, handler: H) -> QuorumResult<Self>
    where
        H: RequestHandler,
    {
        let subject = method_subject(subject_prefix, handler.method());
        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(|e| QuorumError::NatsSubscribe(e.to_string()))?;

        info!("Subscribed to subject: {}", subject);

        let handler = Arc::new(handler);
        let serving = subject.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let Some(reply_to) = message.reply else {
                    warn!("Request on {} has no reply subject", serving);
                    continue;
                };

                let request: RpcRequest = match serde_json::from_slice(&message.payload) {
                    Ok(request) => request,
                    Err(e) => {
                        error!("Failed to deserialize request on {}: {}", serving, e);
                        continue;
                    }
                };

                let client = client.clone();
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let response = dispatch(handler.as_ref(), request).await;
                    match serde_json::to_vec(&response) {
                        Ok(payload) => {
                            if let Err(e) = client.publish(reply_to, payload.into()).await {
                                error!("Failed to publish reply {}: {}", response.id, e);
                            }
                        }
                        Err(e) => error!("Failed to encode reply {}: {}", response.id, e),
                    }
                });
            }
            debug!("Subscription to {} ended", serving);
        });

        Ok(Self { subject, task })
    }

    /// Subject this responder answers on
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl Drop for NatsResponder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for NatsResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsResponder")
            .field("subject", &self.subject)
            .finish()
    }
}
