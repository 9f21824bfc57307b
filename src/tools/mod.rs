// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for Parley
//!
//! Tools are functions the model may request during a turn. The engine only
//! relies on the [`ToolExecutor`] contract and looks executors up by name in
//! a [`ToolRegistry`].

pub mod builtin;
pub mod definition;

pub use definition::*;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::llm::provider::ToolDefinition;

/// Trait for all tool executors
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Get the tool definition for the model
    fn definition(&self) -> ToolDefinition;

    /// Get the tool name
    fn name(&self) -> String {
        self.definition().name
    }

    /// Execute the tool with already-parsed arguments.
    ///
    /// Errors are encoded into the tool's result payload by the caller.
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Registry of available tools, keyed by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in tools
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::AddTool));
        registry.register(Arc::new(builtin::SubtractTool));
        registry.register(Arc::new(builtin::MultiplyTool));
        registry
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn ToolExecutor>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolExecutor>> {
        self.tools.get(name)
    }

    /// Get all tool definitions, ordered by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// List all tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
