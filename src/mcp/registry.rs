//! Tool registry
//!
//! Holds every tool exposed through `tools/list` and `tools/call`. The registry is filled
//! once at startup and shared read-only (behind an `Arc`) with the dispatcher afterwards,
//! so lookups never take a lock.

use std::{collections::HashMap, fmt, future::Future, marker::PhantomData};

use async_trait::async_trait;
use rust_mcp_sdk::schema::{CallToolResult, ContentBlock, TextContent};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::schema::{
    SchemaAdaptationError, SchemaDescriptor, ValidationError, ARGUMENTS_PATH,
};

pub const MAX_TOOL_NAME_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
    #[error("tool name `{0}` must be 1-128 characters of [A-Za-z0-9_.-]")]
    InvalidToolName(String),
    #[error("input schema of tool `{name}` cannot be adapted: {source}")]
    Schema {
        name: String,
        #[source]
        source: SchemaAdaptationError,
    },
}

/// Failure reported by a tool handler.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The arguments passed schema validation but the handler still refused them.
    #[error(transparent)]
    InvalidArguments(#[from] ValidationError),
    /// Execution failed. Only `public` is ever returned to the client.
    #[error("{public}: {detail}")]
    Failed { public: String, detail: String },
}

impl ToolError {
    pub fn failed(public: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::Failed {
            public: public.into(),
            detail: detail.to_string(),
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidArguments(error) => error.to_string(),
            Self::Failed { public, .. } => public.clone(),
        }
    }
}

/// Whatever a handler produced, before it is normalized into a `CallToolResult`.
#[derive(Debug)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
    Content(Vec<ContentBlock>),
    Result(CallToolResult),
}

impl ToolOutput {
    pub fn into_call_result(self) -> CallToolResult {
        match self {
            Self::Text(text) => text_result(text, None),
            Self::Json(value) => {
                let text =
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                text_result(text, value.as_object().cloned())
            }
            Self::Content(content) => CallToolResult {
                content,
                is_error: None,
                meta: None,
                structured_content: None,
            },
            Self::Result(result) => result,
        }
    }
}

fn text_result(text: String, structured: Option<serde_json::Map<String, Value>>) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: structured,
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<ContentBlock>> for ToolOutput {
    fn from(content: Vec<ContentBlock>) -> Self {
        Self::Content(content)
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        Self::Result(result)
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with arguments that already passed the tool's input schema.
    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError>;
}

/// Adapts a closure over raw JSON arguments.
pub struct FnHandler<F> {
    handler: F,
}

impl<F> FnHandler<F> {
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        (self.handler)(arguments).await
    }
}

/// Adapts a closure over a typed argument struct decoded with serde.
pub struct TypedHandler<Args, F> {
    handler: F,
    _args: PhantomData<fn(Args)>,
}

impl<Args, F> TypedHandler<Args, F> {
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<Args, F, Fut, Out> ToolHandler for TypedHandler<Args, F>
where
    Args: DeserializeOwned + Send + 'static,
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Out, ToolError>> + Send + 'static,
    Out: Into<ToolOutput> + Send + 'static,
{
    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let args: Args = serde_json::from_value(arguments)
            .map_err(|err| ValidationError::single(ARGUMENTS_PATH, err.to_string()))?;
        (self.handler)(args).await.map(Into::into)
    }
}

pub struct Tool {
    name: String,
    description: String,
    input_schema: SchemaDescriptor,
    handler: Box<dyn ToolHandler>,
}

impl Tool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &SchemaDescriptor {
        &self.input_schema
    }

    pub fn handler(&self) -> &dyn ToolHandler {
        self.handler.as_ref()
    }

    /// Entry advertised by `tools/list`.
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema.describe(),
        })
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: SchemaDescriptor,
        handler: H,
    ) -> Result<&Tool, RegistryError>
    where
        H: ToolHandler + 'static,
    {
        let name = name.into();
        if !is_valid_tool_name(&name) {
            return Err(RegistryError::InvalidToolName(name));
        }
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }

        let position = self.tools.len();
        self.index.insert(name.clone(), position);
        self.tools.push(Tool {
            name,
            description: description.into(),
            input_schema,
            handler: Box::new(handler),
        });
        Ok(&self.tools[position])
    }

    /// Registers a handler over `Args`, deriving the input schema from the type.
    pub fn register_typed<Args, F, Fut, Out>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Result<&Tool, RegistryError>
    where
        Args: JsonSchema + DeserializeOwned + Send + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, ToolError>> + Send + 'static,
        Out: Into<ToolOutput> + Send + 'static,
    {
        let name = name.into();
        let input_schema = SchemaDescriptor::for_type::<Args>().map_err(|source| {
            RegistryError::Schema {
                name: name.clone(),
                source,
            }
        })?;
        self.register(name, description, input_schema, TypedHandler::new(handler))
    }

    pub fn lookup(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|position| &self.tools[*position])
    }

    /// Tools in registration order.
    pub fn list(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn descriptors(&self) -> Vec<Value> {
        self.tools.iter().map(Tool::descriptor).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
