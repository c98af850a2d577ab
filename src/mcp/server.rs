//! The central Model Context Protocol engine
//!
//! Decodes JSON-RPC envelopes (single or batched), routes `initialize`, `ping`,
//! `tools/list` and `tools/call`, validates tool arguments against the registered
//! schema, invokes handlers and wraps their output into response envelopes.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::{
    future,
    stream::{self, BoxStream},
    FutureExt, StreamExt,
};
use rust_mcp_sdk::schema::{
    CallToolRequestParams, CallToolResult, Implementation, InitializeResult, ServerCapabilities,
    ServerCapabilitiesTools,
};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::mcp::registry::{ToolError, ToolRegistry};
use crate::mcp::rpc::{
    failure_to_json_rpc, is_json_rpc_error, json_rpc_result, json_rpc_serialized, RpcFailure,
};

pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];
pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;
pub const MAX_PUBLIC_ERROR_LEN: usize = 200;
const GENERIC_TOOL_FAILURE: &str = "tool execution failed";

/// One decoded JSON-RPC request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// `None` marks a notification.
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug)]
pub enum Incoming {
    Request(RequestEnvelope),
    /// Rejected during decoding; carries the ready-made error envelope.
    Rejected(Value),
}

impl Incoming {
    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Request(envelope) if envelope.id.is_none())
    }
}

#[derive(Debug)]
pub enum DecodedPayload {
    Single(Incoming),
    Batch(Vec<Incoming>),
}

impl DecodedPayload {
    pub fn into_items(self) -> Vec<Incoming> {
        match self {
            Self::Single(incoming) => vec![incoming],
            Self::Batch(items) => items,
        }
    }
}

pub fn decode_payload(body: &[u8]) -> DecodedPayload {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => {
            return DecodedPayload::Single(Incoming::Rejected(failure_to_json_rpc(
                None,
                RpcFailure::Parse,
            )))
        }
    };

    match payload {
        Value::Array(items) if items.is_empty() => DecodedPayload::Single(Incoming::Rejected(
            failure_to_json_rpc(None, RpcFailure::InvalidRequest("empty batch")),
        )),
        Value::Array(items) => {
            DecodedPayload::Batch(items.into_iter().map(decode_envelope).collect())
        }
        other => DecodedPayload::Single(decode_envelope(other)),
    }
}

pub fn decode_envelope(value: Value) -> Incoming {
    let reject = |id: Option<Value>, reason: &'static str| {
        Incoming::Rejected(failure_to_json_rpc(id, RpcFailure::InvalidRequest(reason)))
    };

    let Value::Object(mut object) = value else {
        return reject(None, "envelope must be an object");
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(id @ Value::String(_)) => Some(id),
        Some(Value::Number(number)) if number.is_i64() => Some(Value::Number(number)),
        Some(_) => return reject(None, "id must be a string or an integer"),
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return reject(id, "jsonrpc must be \"2.0\"");
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.trim().is_empty() => method,
        _ => return reject(id, "method must be a non-empty string"),
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => None,
        Some(Value::Object(params)) => Some(params),
        Some(_) => {
            return Incoming::Rejected(failure_to_json_rpc(
                id,
                RpcFailure::invalid_params("invalid_params", "params must be an object"),
            ))
        }
    };

    Incoming::Request(RequestEnvelope { id, method, params })
}

pub struct McpServer {
    registry: Arc<ToolRegistry>,
    batch_concurrency: usize,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Returns `None` for notifications.
    pub async fn handle_incoming(&self, incoming: Incoming) -> Option<Value> {
        match incoming {
            Incoming::Rejected(response) => Some(response),
            Incoming::Request(envelope) => {
                let notification = envelope.id.is_none();
                let response = self.handle_request(envelope).await;
                (!notification).then_some(response)
            }
        }
    }

    /// Processes envelopes concurrently while yielding responses in input order.
    ///
    /// Dropping the stream cancels every envelope that has not completed yet.
    pub fn responses(self: Arc<Self>, items: Vec<Incoming>) -> BoxStream<'static, Value> {
        let concurrency = self.batch_concurrency;
        stream::iter(items)
            .map(move |incoming| {
                let server = Arc::clone(&self);
                async move { server.handle_incoming(incoming).await }
            })
            .buffered(concurrency)
            .filter_map(future::ready)
            .boxed()
    }

    pub async fn handle_request(&self, envelope: RequestEnvelope) -> Value {
        let RequestEnvelope { id, method, params } = envelope;
        let audit_params = redact_audit_params(params.as_ref());

        let response = match method.as_str() {
            "initialize" => match negotiate_protocol_version(params.as_ref()) {
                Ok(protocol_version) => {
                    json_rpc_serialized(id, &initialize_result(protocol_version))
                }
                Err(failure) => failure_to_json_rpc(id, failure),
            },
            "ping" => json_rpc_result(id, json!({})),
            "tools/list" => json_rpc_result(id, json!({ "tools": self.registry.descriptors() })),
            "tools/call" => match self.call_tool(params).await {
                Ok(result) => json_rpc_serialized(id, &result),
                Err(failure) => failure_to_json_rpc(id, failure),
            },
            notification if notification.starts_with("notifications/") => {
                json_rpc_result(id, json!({}))
            }
            _ => failure_to_json_rpc(id, RpcFailure::MethodNotFound(method.clone())),
        };

        info!(
            method = %method,
            params = %audit_params,
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp action audited"
        );

        response
    }

    /// Resolves, validates and runs one `tools/call`.
    pub async fn call_tool(
        &self,
        params: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, RpcFailure> {
        let Some(params) = params else {
            return Err(RpcFailure::invalid_params(
                "missing_params",
                "tools/call requires params",
            ));
        };

        let call: CallToolRequestParams =
            serde_json::from_value(Value::Object(params)).map_err(|_| {
                RpcFailure::invalid_params(
                    "malformed_params",
                    "tools/call params must contain a string name and object arguments",
                )
            })?;

        let tool = self
            .registry
            .lookup(&call.name)
            .ok_or_else(|| RpcFailure::ToolNotFound(call.name.clone()))?;

        let arguments = tool
            .input_schema()
            .validate(Value::Object(call.arguments.unwrap_or_default()))?;

        let outcome = AssertUnwindSafe(tool.handler().invoke(arguments))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => Ok(output.into_call_result()),
            Ok(Err(ToolError::InvalidArguments(validation))) => Err(validation.into()),
            Ok(Err(err)) => {
                error!(tool = %call.name, error = %err, "tool handler failed");
                Err(RpcFailure::InternalTool {
                    tool: call.name,
                    message: sanitize_public_message(&err.public_message()),
                })
            }
            Err(_) => {
                error!(tool = %call.name, "tool handler panicked");
                Err(RpcFailure::InternalTool {
                    tool: call.name,
                    message: GENERIC_TOOL_FAILURE.to_string(),
                })
            }
        }
    }
}

fn initialize_result(protocol_version: String) -> InitializeResult {
    InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            resources: None,
            prompts: None,
            ..Default::default()
        },
        protocol_version,
        instructions: None,
        meta: None,
    }
}

/// Echoes a supported offered version and answers anything else with the latest one.
pub fn negotiate_protocol_version(
    params: Option<&Map<String, Value>>,
) -> Result<String, RpcFailure> {
    let offered_version = params
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            RpcFailure::invalid_params(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    if SUPPORTED_PROTOCOL_VERSIONS.contains(&offered_version) {
        Ok(offered_version.to_string())
    } else {
        Ok(LATEST_PROTOCOL_VERSION.to_string())
    }
}

/// Strips control characters and bounds the length of a handler-supplied message.
pub fn sanitize_public_message(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_PUBLIC_ERROR_LEN)
        .collect();

    if cleaned.trim().is_empty() {
        GENERIC_TOOL_FAILURE.to_string()
    } else {
        cleaned
    }
}

const SENSITIVE_KEY_FRAGMENTS: [&str; 8] = [
    "token",
    "secret",
    "password",
    "credential",
    "authorization",
    "bearer",
    "api_key",
    "apikey",
];

pub fn redact_audit_params(params: Option<&Map<String, Value>>) -> Value {
    params
        .map(|params| redact_audit_value(&Value::Object(params.clone())))
        .unwrap_or(Value::Null)
}

fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| normalized.contains(fragment))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::mcp::rpc::{INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct MessageArgs {
        message: String,
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct DelayArgs {
        millis: u64,
        label: String,
    }

    fn server_with_counter() -> (Arc<McpServer>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = ToolRegistry::new();
        registry
            .register_typed("echo", "Echo a message", move |args: MessageArgs| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, ToolError>(args.message) }
            })
            .expect("register echo");
        registry
            .register_typed("explode", "Always fails", |_args: MessageArgs| async move {
                Err::<String, _>(ToolError::failed(
                    "upstream\u{0007} unavailable",
                    "connection refused at 10.0.0.3:443",
                ))
            })
            .expect("register explode");
        registry
            .register_typed("panic", "Always panics", |_args: MessageArgs| async move {
                if true {
                    panic!("handler bug");
                }
                Ok::<String, ToolError>(String::new())
            })
            .expect("register panic");
        registry
            .register_typed("delay", "Sleeps then echoes", |args: DelayArgs| async move {
                tokio::time::sleep(Duration::from_millis(args.millis)).await;
                Ok::<_, ToolError>(args.label)
            })
            .expect("register delay");

        (Arc::new(McpServer::new(Arc::new(registry))), calls)
    }

    fn request(id: Value, method: &str, params: Value) -> Incoming {
        decode_envelope(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
    }

    async fn call(server: &McpServer, id: Value, name: &str, arguments: Value) -> Value {
        server
            .handle_incoming(request(
                id,
                "tools/call",
                json!({"name": name, "arguments": arguments}),
            ))
            .await
            .expect("request has a response")
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let DecodedPayload::Single(Incoming::Rejected(response)) = decode_payload(b"{") else {
            panic!("expected rejected single payload");
        };
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["error"]["data"]["code"], "parse_error");
        assert_eq!(response.get("id"), Some(&Value::Null));
    }

    #[test]
    fn empty_batch_is_invalid_request() {
        let DecodedPayload::Single(Incoming::Rejected(response)) = decode_payload(b"[]") else {
            panic!("expected rejected single payload");
        };
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
    }

    #[test]
    fn null_and_absent_ids_are_notifications() {
        let absent = decode_envelope(json!({"jsonrpc": "2.0", "method": "ping"}));
        let null = decode_envelope(json!({"jsonrpc": "2.0", "id": null, "method": "ping"}));
        let present = decode_envelope(json!({"jsonrpc": "2.0", "id": 0, "method": "ping"}));

        assert!(absent.is_notification());
        assert!(null.is_notification());
        assert!(!present.is_notification());
    }

    #[test]
    fn invalid_envelopes_keep_recoverable_id() {
        let Incoming::Rejected(response) =
            decode_envelope(json!({"jsonrpc": "1.0", "id": 9, "method": "ping"}))
        else {
            panic!("wrong jsonrpc version must be rejected");
        };
        assert_eq!(response["id"], 9);
        assert_eq!(response["error"]["code"], INVALID_REQUEST);

        let Incoming::Rejected(response) =
            decode_envelope(json!({"jsonrpc": "2.0", "id": {"nested": true}, "method": "ping"}))
        else {
            panic!("object id must be rejected");
        };
        assert_eq!(response.get("id"), Some(&Value::Null));

        assert!(matches!(
            decode_envelope(json!("ping")),
            Incoming::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn echo_round_trip_wraps_text_content() {
        let (server, calls) = server_with_counter();
        let response = call(&server, json!(1), "echo", json!({"message": "hi"})).await;

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["content"][0]["type"], "text");
        assert_eq!(response["result"]["content"][0]["text"], "hi");
        assert_eq!(
            response["result"]["content"].as_array().map(Vec::len),
            Some(1)
        );
        assert!(response.get("error").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_handler() {
        let (server, calls) = server_with_counter();

        for (id, arguments) in [
            (json!("a"), json!({})),
            (json!("b"), json!({"message": 1})),
            (json!("c"), json!({"message": "hi", "extra": true})),
        ] {
            let response = call(&server, id.clone(), "echo", arguments).await;
            assert_eq!(response["id"], id);
            assert_eq!(response["error"]["code"], INVALID_PARAMS);
            assert_eq!(response["error"]["data"]["code"], "invalid_params");
            assert!(response["error"]["data"]["details"]["errors"][0]["path"]
                .as_str()
                .is_some_and(|path| path.starts_with("arguments")));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_with_request_id() {
        let (server, _) = server_with_counter();
        let response = call(&server, json!(77), "nope", json!({})).await;

        assert_eq!(response["id"], 77);
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(response["error"]["data"]["code"], "tool_not_found");
    }

    #[tokio::test]
    async fn failing_handler_yields_sanitized_internal_error() {
        let (server, _) = server_with_counter();
        let response = call(&server, json!(5), "explode", json!({"message": "x"})).await;

        assert_eq!(response["id"], 5);
        assert_eq!(response["error"]["code"], INTERNAL_ERROR);
        assert_eq!(response["error"]["data"]["code"], "internal_tool_error");
        assert_eq!(response["error"]["data"]["message"], "upstream unavailable");
        assert!(!response.to_string().contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let (server, _) = server_with_counter();
        let response = call(&server, json!(6), "panic", json!({"message": "x"})).await;

        assert_eq!(response["error"]["data"]["code"], "internal_tool_error");
        assert_eq!(response["error"]["data"]["message"], GENERIC_TOOL_FAILURE);

        let follow_up = call(&server, json!(7), "echo", json!({"message": "still alive"})).await;
        assert_eq!(follow_up["result"]["content"][0]["text"], "still alive");
    }

    #[tokio::test]
    async fn batch_preserves_order_and_skips_notifications() {
        let (server, _) = server_with_counter();
        let items = vec![
            request(
                json!(1),
                "tools/call",
                json!({"name": "delay", "arguments": {"millis": 60, "label": "slow"}}),
            ),
            decode_envelope(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})),
            request(
                json!(2),
                "tools/call",
                json!({"name": "delay", "arguments": {"millis": 0, "label": "fast"}}),
            ),
            decode_envelope(json!({"jsonrpc": "2.0", "id": null, "method": "ping"})),
            request(json!(3), "ping", json!({})),
        ];

        let responses: Vec<Value> = Arc::clone(&server).responses(items).collect().await;

        let ids: Vec<i64> = responses
            .iter()
            .filter_map(|item| item["id"].as_i64())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(responses[0]["result"]["content"][0]["text"], "slow");
        assert_eq!(responses[1]["result"]["content"][0]["text"], "fast");
    }

    #[tokio::test]
    async fn dropping_the_response_stream_cancels_pending_calls() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (started_in_tool, finished_in_tool) = (Arc::clone(&started), Arc::clone(&finished));
        let mut registry = ToolRegistry::new();
        registry
            .register_typed("tracked", "Sleeps and counts", move |args: DelayArgs| {
                let started = Arc::clone(&started_in_tool);
                let finished = Arc::clone(&finished_in_tool);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(args.millis)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ToolError>(args.label)
                }
            })
            .expect("register tracked");
        let server = Arc::new(McpServer::new(Arc::new(registry)));
        let items = vec![
            request(
                json!(1),
                "tools/call",
                json!({"name": "tracked", "arguments": {"millis": 10, "label": "fast"}}),
            ),
            request(
                json!(2),
                "tools/call",
                json!({"name": "tracked", "arguments": {"millis": 200, "label": "slow"}}),
            ),
        ];

        let mut responses = server.responses(items);
        let first = responses.next().await.expect("first response");
        assert_eq!(first["id"], 1);
        assert_eq!(started.load(Ordering::SeqCst), 2);

        drop(responses);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tools_list_uses_registration_order() {
        let (server, _) = server_with_counter();
        let response = server
            .handle_incoming(request(json!(1), "tools/list", json!({})))
            .await
            .expect("response");

        let names: Vec<&str> = response["result"]["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert_eq!(names, vec!["echo", "explode", "panic", "delay"]);
        assert_eq!(
            response["result"]["tools"][0]["inputSchema"]["type"],
            "object"
        );
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let (server, _) = server_with_counter();
        let response = server
            .handle_incoming(request(json!(4), "tools/call", json!({"arguments": {}})))
            .await
            .expect("response");

        assert_eq!(response["id"], 4);
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert_eq!(response["error"]["data"]["code"], "malformed_params");
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let (server, _) = server_with_counter();
        let response = server
            .handle_incoming(request(json!(8), "resources/list", json!({})))
            .await
            .expect("response");

        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(response["error"]["data"]["code"], "method_not_found");
    }

    #[test]
    fn negotiates_supported_and_falls_back_to_latest() {
        let offered = json!({"protocolVersion": "2024-11-05"});
        let version = negotiate_protocol_version(offered.as_object()).expect("supported");
        assert_eq!(version, "2024-11-05");

        let future = json!({"protocolVersion": "2031-01-01"});
        let version = negotiate_protocol_version(future.as_object()).expect("fallback");
        assert_eq!(version, LATEST_PROTOCOL_VERSION);

        let missing = json!({});
        assert!(negotiate_protocol_version(missing.as_object()).is_err());
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "summarize_arxiv_paper",
            "arguments": {
                "arxiv_id": "2301.00001",
                "api_token": "should-not-appear",
                "nested": {"Password": "should-not-appear"}
            }
        });

        let redacted = redact_audit_params(params.as_object());

        assert_eq!(redacted["arguments"]["arxiv_id"], "2301.00001");
        assert_eq!(redacted["arguments"]["api_token"], "[REDACTED]");
        assert_eq!(redacted["arguments"]["nested"]["Password"], "[REDACTED]");
    }

    #[test]
    fn sanitizer_bounds_length_and_falls_back() {
        let long = "x".repeat(MAX_PUBLIC_ERROR_LEN * 2);
        assert_eq!(sanitize_public_message(&long).len(), MAX_PUBLIC_ERROR_LEN);
        assert_eq!(sanitize_public_message("\n\t"), GENERIC_TOOL_FAILURE);
    }
}
