// Copyright (c) 2025 - Cowboy AI, Inc.
//! Remote Call Boundary
//!
//! A [`Transport`] carries one request to a peer and brings back one reply.
//! A [`RequestHandler`] is the peer side of the same call. Both speak the
//! envelope defined here, whatever wire sits underneath.
//!
//! # Envelope
//!
//! ```text
//! RpcRequest  { id, method, params }
//! RpcResponse { id, result }          success
//! RpcResponse { id, fault }           failure
//! ```
//!
//! Faults carry a [`FaultCode`] so a client can tell a malformed request
//! (`Validation`) from a handler failure (`Application`) or a broken
//! exchange (`UnknownMethod`, `BadRequest`).
//!
//! # Implementations
//!
//! - [`tcp`] - one JSON document per line over TCP
//! - [`nats`] - NATS request/reply

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{QuorumError, QuorumResult};

pub mod nats;
pub mod tcp;

pub use nats::{NatsResponder, NatsTransport};
pub use tcp::{RpcServer, TcpTransport};

/// Client side of a remote call
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `params` to `method` on the peer and wait for its reply
    ///
    /// May wait forever if the peer never answers; callers bound the wait.
    async fn call(&self, method: &str, params: Value) -> QuorumResult<Value>;
}

/// Peer side of a remote call
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// The request this handler accepts
    type Request: DeserializeOwned + Send;

    /// The reply this handler produces
    type Response: Serialize + Send;

    /// Method name this handler answers to
    fn method(&self) -> &str;

    /// Handle a request
    async fn handle(&self, request: Self::Request) -> QuorumResult<Self::Response>;
}

/// A request on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlates the reply; unique per connection
    pub id: u64,
    /// Target method
    pub method: String,
    /// Request body
    #[serde(default)]
    pub params: Value,
}

/// A reply on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Id of the request this answers
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

impl RpcResponse {
    /// Successful reply
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            fault: None,
        }
    }

    /// Failed reply
    pub fn failure(id: u64, fault: Fault) -> Self {
        Self {
            id,
            result: None,
            fault: Some(fault),
        }
    }

    /// Unwrap the envelope into the caller's result
    pub fn into_result(self) -> QuorumResult<Value> {
        match (self.result, self.fault) {
            (_, Some(fault)) => Err(fault.into()),
            (Some(result), None) => Ok(result),
            // A null result deserializes to None
            (None, None) => Ok(Value::Null),
        }
    }
}

/// Kind of failure reported by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCode {
    /// The request was well formed but its content was invalid
    Validation,
    /// The handler failed
    Application,
    /// No handler for the requested method
    UnknownMethod,
    /// The request could not be decoded
    BadRequest,
}

/// Failure reported by a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub code: FaultCode,
    pub message: String,
}

impl Fault {
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<Fault> for QuorumError {
    fn from(fault: Fault) -> Self {
        match fault.code {
            FaultCode::Validation => QuorumError::Validation(fault.message),
            FaultCode::Application => QuorumError::Remote(fault.message),
            FaultCode::UnknownMethod | FaultCode::BadRequest => {
                QuorumError::Protocol(fault.message)
            }
        }
    }
}

impl From<&QuorumError> for Fault {
    fn from(err: &QuorumError) -> Self {
        match err {
            QuorumError::Validation(message) => Fault::new(FaultCode::Validation, message.clone()),
            QuorumError::Deserialization(message) => {
                Fault::new(FaultCode::BadRequest, message.clone())
            }
            other => Fault::new(FaultCode::Application, other.to_string()),
        }
    }
}

/// Run `handler` against a decoded request and build the reply
///
/// Shared by every server side so all wires answer the same way.
pub async fn dispatch<H>(handler: &H, request: RpcRequest) -> RpcResponse
where
    H: RequestHandler,
{
    if request.method != handler.method() {
        return RpcResponse::failure(
            request.id,
            Fault::new(
                FaultCode::UnknownMethod,
                format!("unknown method: {}", request.method),
            ),
        );
    }

    let typed: H::Request = match serde_json::from_value(request.params) {
        Ok(typed) => typed,
        Err(e) => {
            return RpcResponse::failure(
                request.id,
                Fault::new(FaultCode::BadRequest, format!("malformed params: {e}")),
            )
        }
    };

    let reply = handler
        .handle(typed)
        .await
        .and_then(|response| serde_json::to_value(response).map_err(QuorumError::from));

    match reply {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(err) => RpcResponse::failure(request.id, Fault::from(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        type Request = String;
        type Response = String;

        fn method(&self) -> &str {
            "Echo.Say"
        }

        async fn handle(&self, request: String) -> QuorumResult<String> {
            if request.is_empty() {
                return Err(QuorumError::Validation("empty".to_string()));
            }
            Ok(request)
        }
    }

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            id: 7,
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let reply = dispatch(&Echo, request("Echo.Say", json!("hi"))).await;

        assert_eq!(reply.id, 7);
        assert_eq!(reply.into_result(), Ok(json!("hi")));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method() {
        let reply = dispatch(&Echo, request("Echo.Shout", json!("hi"))).await;

        assert!(matches!(reply.into_result(), Err(QuorumError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_dispatch_bad_params() {
        let reply = dispatch(&Echo, request("Echo.Say", json!({"not": "a string"}))).await;

        assert_eq!(reply.fault.as_ref().map(|f| f.code), Some(FaultCode::BadRequest));
    }

    #[tokio::test]
    async fn test_dispatch_validation_fault() {
        let reply = dispatch(&Echo, request("Echo.Say", json!(""))).await;

        assert_eq!(
            reply.into_result(),
            Err(QuorumError::Validation("empty".to_string()))
        );
    }

    #[test]
    fn test_response_wire_format() {
        let reply = RpcResponse::failure(3, Fault::new(FaultCode::Validation, "bad id"));
        let encoded = serde_json::to_value(&reply).unwrap();

        assert_eq!(
            encoded,
            json!({"id": 3, "fault": {"code": "validation", "message": "bad id"}})
        );
    }

    #[test]
    fn test_null_result_survives_the_wire() {
        let encoded = serde_json::to_string(&RpcResponse::success(1, Value::Null)).unwrap();
        let decoded: RpcResponse = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.into_result(), Ok(Value::Null));
    }
}
