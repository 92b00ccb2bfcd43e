//! The JSON-RPC 2.0 protocol processor.
//!
//! Parses a request or batch, resolves the method through the service
//! registry and the server's rpc map, and serializes a response envelope
//! carrying exactly one of `result` and `error`. Every failure is converted
//! to a numbered error object; nothing escapes to the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::errors::RpcError;
use crate::operation::Arguments;
use crate::server::{CallContext, Server};

pub const CONTENT_TYPE: &str = "application/json; charset=UTF-8";
pub const VERSION: &str = "2.0";

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&RpcError> for ErrorObject {
    fn from(err: &RpcError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            data: err.data().cloned(),
        }
    }
}

/// A JSON-RPC 2.0 response envelope. The absent member of `result`/`error`
/// is omitted from the serialized object, never emitted as null alongside
/// the other.
#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl Response {
    fn result(id: Option<Value>, value: Value) -> Self {
        Self {
            jsonrpc: VERSION,
            result: Some(value),
            error: None,
            id,
        }
    }

    fn error(id: Option<Value>, err: &RpcError) -> Self {
        Self {
            jsonrpc: VERSION,
            result: None,
            error: Some(ErrorObject::from(err)),
            id,
        }
    }
}

/// Processes a raw JSON-RPC body into a serialized response body. A decoded
/// array is treated as a batch whose responses stay positionally aligned to
/// the inputs; malformed JSON yields a single `-32700` error with no id.
pub fn process(server: &Server, body: &[u8], ctx: &CallContext) -> String {
    let payload = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            return to_body(&Response::error(None, &RpcError::parse(err.to_string())));
        }
    };

    match payload {
        Value::Array(batch) => {
            let responses: Vec<Response> = batch
                .into_iter()
                .map(|item| process_request(server, item, ctx))
                .collect();
            to_body(&responses)
        }
        single => to_body(&process_request(server, single, ctx)),
    }
}

/// Processes one decoded request object. A request is valid only if it is an
/// object carrying a non-null id; an id-less request is answered with a
/// `-32600` error rather than silently dropped.
fn process_request(server: &Server, payload: Value, ctx: &CallContext) -> Response {
    let Value::Object(request) = payload else {
        return Response::error(None, &RpcError::invalid_request("request must be an object"));
    };

    let id = request.get("id").filter(|id| !id.is_null()).cloned();
    if id.is_none() {
        return Response::error(None, &RpcError::invalid_request("missing request id"));
    }

    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return Response::error(id, &RpcError::invalid_request("missing method name"));
    };

    let outcome = dispatch(server, method, request.get("params").cloned(), ctx);
    info!(
        method = %method,
        protocol = "jsonrpc",
        outcome = if outcome.is_ok() { "success" } else { "failure" },
        "rpc call dispatched"
    );

    match outcome {
        Ok(value) => Response::result(id, value),
        Err(err) => Response::error(id, &err),
    }
}

/// Resolves a method name: the service registry first (operation path), the
/// server's rpc map second.
fn dispatch(
    server: &Server,
    method: &str,
    params: Option<Value>,
    ctx: &CallContext,
) -> Result<Value, RpcError> {
    let args = Arguments::from_params(params)?;
    match server.service().get(method) {
        Some(entry) => entry.invoke(args, ctx),
        None => server.invoke(method, args, ctx),
    }
}

fn to_body<T: Serialize>(response: &T) -> String {
    let mut body = serde_json::to_string(response).expect("jsonrpc response serialization");
    body.push('\n');
    body
}
