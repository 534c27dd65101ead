//! Elicitation types for server-initiated structured user input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of a server-initiated elicitation/create request. The
/// requested schema is a JSON-Schema object describing the form the client
/// should present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitRequest {
    /// Human-readable message explaining what input is needed.
    pub message: String,
    /// JSON Schema for the requested content.
    #[serde(rename = "requestedSchema")]
    pub requested_schema: Value,
}

/// How the user responded to an elicitation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    /// The user submitted the form.
    Accept,
    /// The user explicitly declined.
    Decline,
    /// The user dismissed the form.
    Cancel,
}

/// The client's answer to an elicitation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitResult {
    /// The user's action.
    pub action: ElicitAction,
    /// Submitted field values; present only on accept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ElicitResult {
    /// True when the user accepted.
    pub fn accepted(&self) -> bool {
        self.action == ElicitAction::Accept
    }

    /// A string field from the accepted content.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        if self.action != ElicitAction::Accept {
            return None;
        }
        self.content.as_ref()?.get(key)?.as_str()
    }

    /// An integer field from the accepted content.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        if self.action != ElicitAction::Accept {
            return None;
        }
        self.content.as_ref()?.get(key)?.as_i64()
    }

    /// A boolean field from the accepted content.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        if self.action != ElicitAction::Accept {
            return None;
        }
        self.content.as_ref()?.get(key)?.as_bool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_response_hides_content() {
        let result: ElicitResult = serde_json::from_value(serde_json::json!({
            "action": "decline",
            "content": { "unit": "celsius" }
        }))
        .unwrap();
        assert!(!result.accepted());
        assert_eq!(result.get_str("unit"), None);
    }

    #[test]
    fn accepted_fields_are_readable() {
        let result: ElicitResult = serde_json::from_value(serde_json::json!({
            "action": "accept",
            "content": { "unit": "celsius", "interval": 30, "alarm": true }
        }))
        .unwrap();
        assert_eq!(result.get_str("unit"), Some("celsius"));
        assert_eq!(result.get_i64("interval"), Some(30));
        assert_eq!(result.get_bool("alarm"), Some(true));
    }
}
