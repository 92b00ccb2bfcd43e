use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};

pub mod config;
pub mod errors;
pub mod logging;
pub mod operand;
pub mod operation;
pub mod proto;
pub mod server;
pub mod service;

use proto::{jsonrpc, xmlrpc, xmlrpc::XmlRpcOptions};
use server::{CallContext, Protocol, Server};

pub const DEFAULT_PATH: &str = "/rpc";

#[derive(Clone)]
pub struct EndpointState {
    pub server: Arc<Server>,
    pub rpc_path: Arc<str>,
    pub xmlrpc: XmlRpcOptions,
}

impl EndpointState {
    pub fn new(server: Server, rpc_path: &str, xmlrpc: XmlRpcOptions) -> Self {
        Self {
            server: Arc::new(server),
            rpc_path: Arc::from(rpc_path),
            xmlrpc,
        }
    }
}

pub fn build_app(state: EndpointState) -> Router {
    let rpc_path = state.rpc_path.to_string();
    Router::new()
        .route(&rpc_path, any(rpc_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

/// The endpoint router: POSTs on the configured path with a recognized
/// content type are dispatched to a protocol processor; everything else is
/// passed through to the surrounding router, which answers not-found.
/// Protocol-level failures never surface as HTTP errors.
pub async fn rpc_endpoint(
    State(state): State<EndpointState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return StatusCode::NOT_FOUND.into_response();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let Some(protocol) = select_protocol(content_type.as_deref()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let ctx = CallContext {
        protocol,
        path: state.rpc_path.to_string(),
        content_type: content_type.clone(),
    };

    let (response_body, default_content_type) = match protocol {
        Protocol::XmlRpc => (
            xmlrpc::process(&state.server, &body, &ctx, &state.xmlrpc),
            xmlrpc::CONTENT_TYPE,
        ),
        Protocol::JsonRpc => (
            jsonrpc::process(&state.server, &body, &ctx),
            jsonrpc::CONTENT_TYPE,
        ),
    };

    let response_content_type =
        content_type.unwrap_or_else(|| default_content_type.to_string());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, response_content_type)],
        response_body,
    )
        .into_response()
}

fn select_protocol(content_type: Option<&str>) -> Option<Protocol> {
    let content_type = content_type?;
    if content_type.starts_with("application/xml") || content_type.starts_with("text/xml") {
        Some(Protocol::XmlRpc)
    } else if content_type.starts_with("application/json") {
        Some(Protocol::JsonRpc)
    } else {
        None
    }
}
