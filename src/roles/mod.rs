//! Role Engines: Planner, Coder, Reviewer, Analyzer, each a thin wrapper
//! around the Model Client with a stable system prompt, an output schema,
//! and a parser.
//!
//! System prompt assembly, a JSON-schema-constrained output, and a typed
//! parse. [`ModelBackend`] is the seam that lets role engines be driven by
//! a real [`crate::router::Router`] + [`crate::model_client::ModelClient`]
//! pair in production and by a scripted stub in tests — role engines never
//! see the transport directly.

pub mod analyzer;
pub mod coder;
pub mod planner;
pub mod prompts;
pub mod reviewer;

use crate::config::{Role, Size};
use crate::error::EngineError;
use crate::model_client::Message;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The seam between a role engine and the model transport. Implemented for
/// production by a [`RoutedBackend`] that resolves a model via the Router
/// on every call (tasks in the same wave may prefer different tiers as
/// complexity/size vary); implemented for tests by a `MockModel`.
pub trait ModelBackend: Send + Sync {
    fn call<'a>(&'a self, role: Role, messages: Vec<Message>, size: Size) -> BoxFuture<'a, Result<String, EngineError>>;
}

/// Production backend: resolves `(role, complexity, size)` through the
/// Router on every call, then drives the resolved model through the Model
/// Client.
pub struct RoutedBackend<'a> {
    pub client: &'a crate::model_client::ModelClient,
    pub router: &'a crate::router::Router,
    pub complexity: crate::config::Complexity,
}

impl<'a> ModelBackend for RoutedBackend<'a> {
    fn call<'b>(&'b self, role: Role, messages: Vec<Message>, size: Size) -> BoxFuture<'b, Result<String, EngineError>> {
        Box::pin(async move {
            let spec = self.router.resolve(role, self.complexity, size, self.client).await?;
            let outcome = self
                .client
                .call(role, messages, &spec, size, &crate::model_client::CancelFlag::new())
                .await?;
            Ok(outcome.text)
        })
    }
}

/// Strips a `<think>...</think>` span that a reasoning-capable model may
/// still emit ahead of its JSON payload, and extracts the first balanced
/// `{...}` object from the remaining text — models routinely wrap JSON in
/// prose or fences despite instructions not to.
pub fn extract_json_object(text: &str) -> Result<serde_json::Value, EngineError> {
    let stripped = crate::model_client::think_strip::strip_think_spans(text);
    let start = stripped.find('{').ok_or_else(|| EngineError::ParseError("no JSON object found".into()))?;
    let bytes = stripped.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    let mut end = None;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let end = end.ok_or_else(|| EngineError::ParseError("unbalanced JSON object".into()))?;
    serde_json::from_str(&stripped[start..end]).map_err(|e| EngineError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let text = "Sure, here you go:\n```json\n{\"a\": 1, \"b\": [1,2]}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn strips_reasoning_trace_before_json() {
        let text = "<think>let me think...</think>{\"ok\": true}";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn rejects_text_with_no_object() {
        assert!(extract_json_object("no json here").is_err());
    }

    #[test]
    fn handles_nested_braces_and_strings_with_braces() {
        let text = r#"{"a": {"b": 1}, "s": "a{weird}string"}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["a"]["b"], 1);
        assert_eq!(value["s"], "a{weird}string");
    }
}
