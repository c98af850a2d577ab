//! JSON-RPC envelope encoding
//!
//! Maps dispatcher failures onto JSON-RPC error envelopes with a stable numeric code and a
//! machine-readable `data.code`, and wraps successful results into result envelopes.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::schema::{FieldError, ValidationError};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Per-request failure, always recovered into an error envelope.
#[derive(Debug, Error)]
pub enum RpcFailure {
    #[error("parse error")]
    Parse,
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("invalid params: {message}")]
    InvalidParams {
        code: &'static str,
        message: String,
        errors: Vec<FieldError>,
    },
    #[error("tool `{tool}` failed: {message}")]
    InternalTool { tool: String, message: String },
}

impl RpcFailure {
    pub fn invalid_params(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::Parse => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MethodNotFound(_) | Self::ToolNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::InternalTool { .. } => INTERNAL_ERROR,
        }
    }

    /// Stable machine-readable code placed in `error.data.code`.
    pub fn data_code(&self) -> &'static str {
        match self {
            Self::Parse => "parse_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::MethodNotFound(_) => "method_not_found",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::InvalidParams { code, .. } => code,
            Self::InternalTool { .. } => "internal_tool_error",
        }
    }
}

impl From<ValidationError> for RpcFailure {
    fn from(error: ValidationError) -> Self {
        Self::InvalidParams {
            code: "invalid_params",
            message: error.to_string(),
            errors: error.errors,
        }
    }
}

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn failure_to_json_rpc(id: Option<Value>, failure: RpcFailure) -> Value {
    let code = failure.rpc_code();
    let data_code = failure.data_code();
    match failure {
        RpcFailure::Parse => json_rpc_error_with_data(
            id,
            code,
            "Parse error",
            Some(error_data(data_code, "malformed JSON", json!({}))),
        ),
        RpcFailure::InvalidRequest(reason) => json_rpc_error_with_data(
            id,
            code,
            "Invalid Request",
            Some(error_data(data_code, reason, json!({}))),
        ),
        RpcFailure::MethodNotFound(method) => json_rpc_error_with_data(
            id,
            code,
            "Method not found",
            Some(error_data(
                data_code,
                "unknown method",
                json!({ "method": method }),
            )),
        ),
        RpcFailure::ToolNotFound(name) => json_rpc_error_with_data(
            id,
            code,
            "Method not found",
            Some(error_data(
                data_code,
                "unknown tool name",
                json!({ "name": name }),
            )),
        ),
        RpcFailure::InvalidParams {
            message, errors, ..
        } => json_rpc_error_with_data(
            id,
            code,
            "Invalid params",
            Some(error_data(
                data_code,
                &message,
                json!({ "errors": errors }),
            )),
        ),
        RpcFailure::InternalTool { tool, message } => json_rpc_error_with_data(
            id,
            code,
            "Internal error",
            Some(error_data(data_code, &message, json!({ "tool": tool }))),
        ),
    }
}

fn error_data(code: &str, message: &str, details: Value) -> Value {
    json!({
        "code": code,
        "message": message,
        "details": details,
    })
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let response = JsonrpcErrorResponse::new(
        RpcError {
            code: i64::from(code),
            data: data.clone(),
            message: message.to_string(),
        },
        id.as_ref().and_then(value_to_request_id),
    );
    let mut envelope = encode(response, || {
        let mut fallback = json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        });
        if let Some(data) = data {
            fallback["error"]["data"] = data;
        }
        fallback
    });
    // Error envelopes always carry `id`, even when the request id is unknown.
    if let Value::Object(fields) = &mut envelope {
        fields.entry("id").or_insert(Value::Null);
    }
    envelope
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
        return encode(response, || {
            json!({"jsonrpc": "2.0", "id": id, "result": result})
        });
    }

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn json_rpc_serialized<T: Serialize>(id: Option<Value>, result: &T) -> Value {
    match serde_json::to_value(result) {
        Ok(value) => json_rpc_result(id, value),
        Err(err) => {
            tracing::error!(error = %err, "result serialization failed");
            json_rpc_error(id, INTERNAL_ERROR, "Internal error")
        }
    }
}

fn encode<T: Serialize>(response: T, fallback: impl FnOnce() -> Value) -> Value {
    serde_json::to_value(response).unwrap_or_else(|err| {
        tracing::error!(error = %err, "jsonrpc envelope serialization failed");
        fallback()
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}
