//! Tool registry for model function-calling.
//!
//! Tools are side-effect-free lookups over static reference data; they
//! never touch sessions, transcripts, or counters. The set of tools is a
//! closed enum validated at compile time, so an unknown tool name from the
//! model is a representable error payload rather than a missing-key lookup.
//! Each tool declares a JSON Schema used in OpenAI-format function
//! definitions sent with every model round.

pub mod reference;

use serde::{Deserialize, Serialize};

use reference::ReferenceLibrary;

/// Closed set of tools the model may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolId {
    ListReferenceCategories,
    LookupReferenceTools,
}

impl ToolId {
    pub const ALL: [ToolId; 2] = [
        ToolId::ListReferenceCategories,
        ToolId::LookupReferenceTools,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolId::ListReferenceCategories => "list_reference_categories",
            ToolId::LookupReferenceTools => "lookup_reference_tools",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolId::ListReferenceCategories => {
                "학습 활동 설계에 참고할 수 있는 디지털 도구의 카테고리 목록을 반환한다."
            }
            ToolId::LookupReferenceTools => {
                "지정한 카테고리에 속한 참고 도구 목록(이름과 설명)을 반환한다."
            }
        }
    }

    /// Resolve a model-supplied name to a tool, if one exists.
    pub fn resolve(name: &str) -> Option<ToolId> {
        Self::ALL.into_iter().find(|id| id.name() == name.trim())
    }

    pub fn parameters_schema(self) -> serde_json::Value {
        match self {
            ToolId::ListReferenceCategories => serde_json::json!({
                "type": "object",
                "properties": {},
            }),
            ToolId::LookupReferenceTools => serde_json::json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "description": "조회할 카테고리 이름"
                    }
                },
                "required": ["category"]
            }),
        }
    }
}

/// OpenAI-format function definition for LLM function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// OpenAI-format tool definition (wraps FunctionDef).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

/// Registry binding the closed tool set to its reference data.
pub struct ToolRegistry {
    library: ReferenceLibrary,
}

impl ToolRegistry {
    pub fn new(library: ReferenceLibrary) -> Self {
        Self { library }
    }

    /// Function definitions for every registered tool, ready for the
    /// `tools` parameter of a chat-completions request.
    pub fn definitions(&self) -> Vec<ToolDef> {
        ToolId::ALL
            .into_iter()
            .map(|id| ToolDef {
                tool_type: "function".to_string(),
                function: FunctionDef {
                    name: id.name().to_string(),
                    description: id.description().to_string(),
                    parameters: id.parameters_schema(),
                },
            })
            .collect()
    }

    /// Dispatch one model-requested call by name with raw JSON arguments.
    ///
    /// Every failure mode (unknown tool, malformed arguments, unknown
    /// category) is converted into a structured JSON payload fed back to
    /// the model; this method never fails the surrounding turn.
    pub fn dispatch(&self, name: &str, raw_arguments: &str) -> String {
        let Some(id) = ToolId::resolve(name) else {
            tracing::warn!("Model requested unknown tool '{}'", name);
            return error_payload(&format!("tool '{}' not found", name));
        };

        let arguments: serde_json::Value = match serde_json::from_str(raw_arguments) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Malformed arguments for tool '{}': {}", name, e);
                return error_payload(&format!("invalid arguments: {}", e));
            }
        };

        self.execute(id, &arguments)
    }

    fn execute(&self, id: ToolId, arguments: &serde_json::Value) -> String {
        match id {
            ToolId::ListReferenceCategories => serde_json::json!({
                "categories": self.library.categories(),
            })
            .to_string(),
            ToolId::LookupReferenceTools => {
                let category = arguments
                    .get("category")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                match self.library.lookup(category) {
                    Some(entries) => serde_json::json!({
                        "category": category.trim(),
                        "tools": entries,
                    })
                    .to_string(),
                    // Explicit no-results payload so the model never has to
                    // guess between "empty" and "unknown".
                    None => serde_json::json!({
                        "category": category.trim(),
                        "tools": [],
                        "message": "해당 카테고리에서 찾은 도구가 없습니다.",
                        "available_categories": self.library.categories(),
                    })
                    .to_string(),
                }
            }
        }
    }
}

fn error_payload(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ToolRegistry {
        ToolRegistry::new(ReferenceLibrary::builtin())
    }

    #[test]
    fn resolve_is_total_over_the_closed_set() {
        for id in ToolId::ALL {
            assert_eq!(ToolId::resolve(id.name()), Some(id));
        }
        assert_eq!(ToolId::resolve("foo"), None);
    }

    #[test]
    fn definitions_are_openai_function_format() {
        let defs = registry().definitions();
        assert_eq!(defs.len(), ToolId::ALL.len());
        for def in &defs {
            assert_eq!(def.tool_type, "function");
            assert!(def.function.parameters.is_object());
        }
        let json = serde_json::to_value(&defs).unwrap();
        assert_eq!(json[0]["type"], "function");
    }

    #[test]
    fn dispatch_unknown_tool_returns_error_payload() {
        let payload = registry().dispatch("foo", "{}");
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert!(value["error"].as_str().unwrap().contains("not found"));
    }

    #[test]
    fn dispatch_malformed_arguments_returns_error_payload() {
        let payload = registry().dispatch("lookup_reference_tools", "{not json");
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert!(value["error"].as_str().unwrap().contains("invalid arguments"));
    }

    #[test]
    fn lookup_known_category_returns_entries() {
        let payload = registry().dispatch("lookup_reference_tools", r#"{"category": "협업"}"#);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["category"], "협업");
        assert!(!value["tools"].as_array().unwrap().is_empty());
        assert!(value.get("message").is_none());
    }

    #[test]
    fn lookup_unknown_category_returns_no_results_payload() {
        let payload = registry().dispatch("lookup_reference_tools", r#"{"category": "없음"}"#);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert!(value["tools"].as_array().unwrap().is_empty());
        assert!(value["message"].as_str().is_some());
        assert!(!value["available_categories"].as_array().unwrap().is_empty());
    }

    #[test]
    fn list_categories_names_builtin_categories() {
        let payload = registry().dispatch("list_reference_categories", "{}");
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let categories = value["categories"].as_array().unwrap();
        assert!(categories.iter().any(|c| c == "협업"));
    }
}
