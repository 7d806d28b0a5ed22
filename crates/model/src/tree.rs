use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Document,
    Section,
    Clause,
    Block,
    Table,
    Cell,
}

/// One node of the document hierarchy produced by the external
/// document-structure extractor: Document → Section → Clause → Block.
///
/// The tree is linked by IDs, not object references, and is read-only to
/// the pipeline. Child offsets lie within the parent's range and `level`
/// strictly increases from parent to child; nodes violating that are
/// rejected by the orchestrator before any stage sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTreeNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Hierarchy level (0 = document, 1 = section, ...)
    pub level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub page_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DocumentTreeNode {
    pub fn new(
        id: impl Into<String>,
        node_type: NodeType,
        level: u32,
        text: impl Into<String>,
        start_char: usize,
        end_char: usize,
        page_number: u32,
    ) -> Self {
        Self {
            id: id.into(),
            node_type,
            level,
            title: None,
            text: text.into(),
            start_char,
            end_char,
            page_number,
            parent_id: None,
            children_ids: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Offsets are sane on their own: a node must cover a non-empty range.
    pub fn has_valid_offsets(&self) -> bool {
        self.start_char < self.end_char
    }
}
