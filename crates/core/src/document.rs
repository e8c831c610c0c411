//! Documents: the unit of indexing

use serde::{Deserialize, Serialize};

use crate::types::Payload;

/// A document to be indexed into the vector store.
///
/// `tenant_id` must be non-empty; it is written into the payload of every
/// indexed point and is the isolation boundary for all queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique ID (string or UUID form); assigned by the caller when empty
    #[serde(default)]
    pub id: String,
    /// Full text content
    pub content: String,
    /// Tenant isolation key (required, non-empty once validated)
    #[serde(default)]
    pub tenant_id: String,
    /// Owning session, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form metadata merged into the point payload
    #[serde(default)]
    pub metadata: Payload,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            tenant_id: tenant_id.into(),
            session_id: None,
            metadata: Payload::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Assemble turn content from its role parts.
///
/// Non-empty parts are joined with a blank line, each prefixed with its
/// literal role label. An all-empty turn yields an empty string.
pub fn assemble_turn_content(user: &str, assistant: &str, reasoning: &str) -> String {
    let mut parts = Vec::with_capacity(3);
    if !user.is_empty() {
        parts.push(format!("User: {user}"));
    }
    if !assistant.is_empty() {
        parts.push(format!("Assistant: {assistant}"));
    }
    if !reasoning.is_empty() {
        parts.push(format!("Reasoning: {reasoning}"));
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_all_parts() {
        let content = assemble_turn_content("fix it", "done", "checked the logs");
        assert_eq!(
            content,
            "User: fix it\n\nAssistant: done\n\nReasoning: checked the logs"
        );
    }

    #[test]
    fn test_assemble_user_only() {
        let content = assemble_turn_content("hello", "", "");
        assert_eq!(content, "User: hello");
        assert!(!content.contains("Assistant:"));
    }

    #[test]
    fn test_assemble_empty() {
        assert_eq!(assemble_turn_content("", "", ""), "");
    }
}
