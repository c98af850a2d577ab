//! Model Context Protocol server core
//!
//! Schema adaptation, the tool registry, JSON-RPC envelope encoding and the request
//! dispatcher that ties them together.

pub mod registry;
pub mod rpc;
pub mod schema;
pub mod server;
