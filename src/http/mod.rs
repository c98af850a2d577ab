//! HTTP transport layer for the Model Context Protocol
//!
//! `transport` holds the framework-neutral streamable HTTP rules; `handlers` adapts them
//! (and the metadata endpoints) to axum.

pub mod handlers;
pub mod transport;
