//! Named endpoint registry.
//!
//! Maps logical endpoint names ("github", "filesystem", "http", ...) to
//! handles for configured MCP servers. The mapping is fixed at construction
//! and shared read-only; each handle serializes access to its own client.

use super::mcp::{McpClient, ToolResult};
use crate::config::EndpointConfig;
use crate::error::{McpError, McpResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Well-known endpoint names
pub const GITHUB: &str = "github";
pub const FILESYSTEM: &str = "filesystem";
pub const HTTP: &str = "http";

/// Handle for one configured MCP server.
///
/// The server process is spawned and initialized on the first tool call.
pub struct EndpointHandle {
    name: String,
    config: EndpointConfig,
    client: Mutex<Option<McpClient>>,
}

impl EndpointHandle {
    pub fn new(name: impl Into<String>, config: EndpointConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Check if the server process has been started
    pub fn is_connected(&self) -> bool {
        self.client
            .lock()
            .map(|guard| guard.as_ref().is_some_and(McpClient::is_connected))
            .unwrap_or(false)
    }

    /// Call a tool on this endpoint, connecting first if needed
    pub fn call_tool(&self, tool: &str, arguments: Value) -> McpResult<ToolResult> {
        let mut guard = self
            .client
            .lock()
            .map_err(|_| McpError::IoError(format!("client lock poisoned for {}", self.name)))?;

        if guard.is_none() {
            let mut client = McpClient::new(self.config.command.clone(), self.config.args.clone())
                .with_env(self.config.env.clone());
            client.connect()?;
            let init = client.initialize()?;
            tracing::info!(
                endpoint = %self.name,
                server = ?init.server_info.map(|s| s.name),
                "Connected to MCP endpoint"
            );
            *guard = Some(client);
        }

        let Some(client) = guard.as_mut() else {
            return Err(McpError::NotConnected);
        };

        tracing::debug!(endpoint = %self.name, tool, "Calling MCP tool");
        let result = client.call_tool(tool, arguments);

        // A broken transport is not reusable; reconnect on the next call
        if matches!(result, Err(McpError::IoError(_)) | Err(McpError::Closed)) {
            *guard = None;
        }
        result
    }
}

impl std::fmt::Debug for EndpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHandle")
            .field("name", &self.name)
            .field("command", &self.config.command)
            .finish()
    }
}

/// Read-only view of the configured endpoints
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Arc<EndpointHandle>>,
}

impl EndpointRegistry {
    /// Build a registry from pre-constructed handles
    pub fn new(handles: impl IntoIterator<Item = EndpointHandle>) -> Self {
        Self {
            endpoints: handles
                .into_iter()
                .map(|h| (h.name.clone(), Arc::new(h)))
                .collect(),
        }
    }

    /// Build a registry from the `[endpoints]` configuration table
    pub fn from_config(endpoints: &BTreeMap<String, EndpointConfig>) -> Self {
        Self::new(
            endpoints
                .iter()
                .map(|(name, config)| EndpointHandle::new(name.clone(), config.clone())),
        )
    }

    /// Look up an endpoint by name; `None` when it is not configured
    pub fn lookup(&self, name: &str) -> Option<Arc<EndpointHandle>> {
        self.endpoints.get(name).cloned()
    }

    pub fn github(&self) -> Option<Arc<EndpointHandle>> {
        self.lookup(GITHUB)
    }

    pub fn filesystem(&self) -> Option<Arc<EndpointHandle>> {
        self.lookup(FILESYSTEM)
    }

    pub fn http(&self) -> Option<Arc<EndpointHandle>> {
        self.lookup(HTTP)
    }

    /// Configured endpoint names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
