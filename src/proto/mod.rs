//! Protocol processors: one per wire format, each parsing a request,
//! driving dispatch, and serializing a protocol-correct response or error.

pub mod jsonrpc;
pub mod xmlrpc;
