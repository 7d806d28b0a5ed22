use crate::concept::ConceptEntry;
use crate::edge::{KnowledgeGraphEdge, TaxonomyEdge};
use crate::tree::DocumentTreeNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete pipeline output for one document, produced once at the end of
/// a run and handed to storage/query layers as-is.
///
/// A degenerate run still returns one of these (empty collections plus
/// diagnostics in `validation_errors`) rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionPipelineOutput {
    pub document_id: String,
    #[serde(default)]
    pub document_metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub document_tree: Vec<DocumentTreeNode>,
    #[serde(default)]
    pub concept_registry: Vec<ConceptEntry>,
    #[serde(default)]
    pub taxonomy_edges: Vec<TaxonomyEdge>,
    #[serde(default)]
    pub kg_edges: Vec<KnowledgeGraphEdge>,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    /// Mean confidence per edge collection. A key is absent when the
    /// collection is empty; "no data" is never reported as 0.0.
    #[serde(default)]
    pub confidence_summary: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl ExtractionPipelineOutput {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            document_metadata: HashMap::new(),
            document_tree: Vec::new(),
            concept_registry: Vec::new(),
            taxonomy_edges: Vec::new(),
            kg_edges: Vec::new(),
            validation_errors: Vec::new(),
            confidence_summary: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_serializes_to_json() {
        let output = ExtractionPipelineOutput::new("doc-1");
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"document_id\":\"doc-1\""));
        let back: ExtractionPipelineOutput = serde_json::from_str(&json).unwrap();
        assert!(back.confidence_summary.is_empty());
    }
}
