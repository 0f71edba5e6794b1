//! MCP (Model Context Protocol) client for communicating with endpoint servers.
//!
//! Implements JSON-RPC 2.0 over stdio transport for tool calls.

use crate::error::{McpError, McpResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

/// JSON-RPC 2.0 version string
const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version
const MCP_PROTOCOL_VERSION: &str = "2025-11-25";

/// Client name and version
const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new request with an ID (expects response)
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    /// Create a notification (no response expected)
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Get the result or error
    pub fn into_result(self) -> McpResult<Value> {
        if let Some(error) = self.error {
            Err(McpError::RpcError {
                code: error.code,
                message: error.message,
            })
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// JSON-RPC Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tool call result content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
}

/// Tool call result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResult {
    /// All text content blocks joined by newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// MCP Client capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

/// MCP Server capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
}

/// Initialize request params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

/// Client info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Initialize result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: Option<String>,
}

/// MCP Client for one stdio server
pub struct McpClient {
    /// Child process
    process: Option<Child>,
    /// Stdin for writing
    stdin: Option<ChildStdin>,
    /// Stdout reader
    stdout_reader: Option<BufReader<ChildStdout>>,
    /// Request ID counter
    next_id: AtomicU64,
    /// Is initialized
    initialized: bool,
    /// Command to spawn MCP server
    command: String,
    /// Arguments for MCP server
    args: Vec<String>,
    /// Extra environment for MCP server
    env: BTreeMap<String, String>,
}

impl McpClient {
    /// Create a new MCP client
    pub fn new(command: String, args: Vec<String>) -> Self {
        Self {
            process: None,
            stdin: None,
            stdout_reader: None,
            next_id: AtomicU64::new(1),
            initialized: false,
            command,
            args,
            env: BTreeMap::new(),
        }
    }

    /// Set extra environment variables for the server process
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Get the next request ID
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Connect to the MCP server (spawn process)
    pub fn connect(&mut self) -> McpResult<()> {
        if self.process.is_some() {
            return Err(McpError::AlreadyConnected);
        }

        tracing::debug!(command = %self.command, args = ?self.args, "Spawning MCP server");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("{}: {}", self.command, e)))?;

        self.stdin = child.stdin.take();
        self.stdout_reader = child.stdout.take().map(BufReader::new);
        self.process = Some(child);

        Ok(())
    }

    /// Send a JSON-RPC request and get response
    fn send_request(&mut self, request: &JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let stdin = self.stdin.as_mut().ok_or(McpError::NotConnected)?;
        let stdout_reader = self.stdout_reader.as_mut().ok_or(McpError::NotConnected)?;

        // Serialize and send
        let msg = serde_json::to_string(request)
            .map_err(|e| McpError::SerializationError(e.to_string()))?;

        writeln!(stdin, "{}", msg).map_err(|e| McpError::IoError(e.to_string()))?;
        stdin
            .flush()
            .map_err(|e| McpError::IoError(e.to_string()))?;

        // If this is a notification (no id), don't wait for response
        let Some(expected_id) = request.id else {
            return Ok(JsonRpcResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id: None,
                result: Some(Value::Null),
                error: None,
            });
        };

        // Read until the matching response; servers may interleave
        // notifications and log lines
        loop {
            let mut line = String::new();
            let read = stdout_reader
                .read_line(&mut line)
                .map_err(|e| McpError::IoError(e.to_string()))?;
            if read == 0 {
                return Err(McpError::Closed);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.id == Some(expected_id) => return Ok(response),
                Ok(_) => tracing::trace!(line = trimmed, "Skipping unrelated MCP message"),
                Err(e) if trimmed.starts_with('{') => {
                    return Err(McpError::DeserializationError(e.to_string()))
                }
                Err(_) => tracing::trace!(line = trimmed, "Skipping non-JSON server output"),
            }
        }
    }

    /// Send a notification (no response expected)
    fn send_notification(&mut self, method: &str, params: Option<Value>) -> McpResult<()> {
        let request = JsonRpcRequest::notification(method, params);
        self.send_request(&request)?;
        Ok(())
    }

    /// Initialize the MCP connection
    pub fn initialize(&mut self) -> McpResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities {
                sampling: Some(serde_json::json!({})),
            },
            client_info: ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: CLIENT_VERSION.to_string(),
            },
        };
        let params =
            serde_json::to_value(params).map_err(|e| McpError::SerializationError(e.to_string()))?;

        let request = JsonRpcRequest::new(self.next_request_id(), "initialize", Some(params));

        let response = self.send_request(&request)?;
        let result: InitializeResult = serde_json::from_value(response.into_result()?)
            .map_err(|e| McpError::DeserializationError(e.to_string()))?;

        // Send initialized notification
        self.send_notification("notifications/initialized", None)?;

        self.initialized = true;
        Ok(result)
    }

    /// Call a tool
    pub fn call_tool(&mut self, name: &str, arguments: Value) -> McpResult<ToolResult> {
        if !self.initialized {
            return Err(McpError::NotInitialized);
        }

        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let request = JsonRpcRequest::new(self.next_request_id(), "tools/call", Some(params));

        let response = self.send_request(&request)?;
        let result: ToolResult = serde_json::from_value(response.into_result()?)
            .map_err(|e| McpError::DeserializationError(e.to_string()))?;

        Ok(result)
    }

    /// Close the connection and kill the process.
    ///
    /// Never waits for the server to answer: stdin is closed first (the
    /// stdio shutdown signal), then the process is killed and reaped.
    pub fn close(&mut self) {
        self.stdin = None;
        self.stdout_reader = None;
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.kill() {
                tracing::trace!("MCP server already exited: {}", e);
            }
            let _ = process.wait();
        }
        self.initialized = false;
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.process.is_some()
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.close();
    }
}
