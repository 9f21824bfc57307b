// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool definition types
//!
//! These types are used to describe tools to the model.

use serde_json::Value;

use crate::llm::provider::ToolInputSchema;

/// Helper to create a tool input schema
pub struct SchemaBuilder {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self {
            properties: serde_json::Map::new(),
            required: vec![],
        }
    }

    fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a string property
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "string",
                "description": description
            }),
            required,
        )
    }

    /// Add a number property that also accepts numeric strings
    pub fn number(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": ["number", "string"],
                "description": description
            }),
            required,
        )
    }

    /// Add a boolean property
    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "boolean",
                "description": description
            }),
            required,
        )
    }

    /// Build the schema
    pub fn build(self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: Value::Object(self.properties),
            required: self.required,
        }
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder_empty() {
        let schema = SchemaBuilder::default().build();
        assert_eq!(schema.schema_type, "object");
        assert!(schema.required.is_empty());
        assert_eq!(schema.properties, serde_json::json!({}));
    }

    #[test]
    fn test_schema_builder_number_accepts_strings() {
        let schema = SchemaBuilder::new()
            .number("a", "First operand", true)
            .build();
        assert_eq!(
            schema.properties["a"]["type"],
            serde_json::json!(["number", "string"])
        );
        assert_eq!(schema.required, vec!["a".to_string()]);
    }

    #[test]
    fn test_schema_builder_optional_not_required() {
        let schema = SchemaBuilder::new()
            .string("name", "Name", false)
            .boolean("flag", "Flag", true)
            .build();
        assert!(schema.properties.get("name").is_some());
        assert_eq!(schema.required, vec!["flag".to_string()]);
    }
}
