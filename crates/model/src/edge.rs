use crate::evidence::EvidenceSpan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which extractor produced a record. Carried as provenance on every
/// entry and edge, and used as a deterministic tie-break when two edges
/// have equal confidence (higher priority wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    ConceptInventory,
    Pattern,
    SchemaLlm,
    TaxonomyBuilder,
    SeedExpansion,
}

impl ExtractorKind {
    /// Schema-constrained extraction is trusted over pattern matching,
    /// which in turn beats inventory-derived records.
    pub fn priority(self) -> u8 {
        match self {
            ExtractorKind::SchemaLlm => 4,
            ExtractorKind::TaxonomyBuilder => 3,
            ExtractorKind::SeedExpansion => 3,
            ExtractorKind::Pattern => 2,
            ExtractorKind::ConceptInventory => 1,
        }
    }
}

/// Fixed vocabulary for hierarchical relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyRelation {
    IsA,
    PartOf,
    AppliesTo,
    InstanceOf,
}

impl TaxonomyRelation {
    pub const ALL: [TaxonomyRelation; 4] = [
        TaxonomyRelation::IsA,
        TaxonomyRelation::PartOf,
        TaxonomyRelation::AppliesTo,
        TaxonomyRelation::InstanceOf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaxonomyRelation::IsA => "is_a",
            TaxonomyRelation::PartOf => "part_of",
            TaxonomyRelation::AppliesTo => "applies_to",
            TaxonomyRelation::InstanceOf => "instance_of",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "is_a" => Some(TaxonomyRelation::IsA),
            "part_of" => Some(TaxonomyRelation::PartOf),
            "applies_to" => Some(TaxonomyRelation::AppliesTo),
            "instance_of" => Some(TaxonomyRelation::InstanceOf),
            _ => None,
        }
    }
}

/// Hierarchical parent→child relationship with evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyEdge {
    pub parent_id: String,
    pub child_id: String,
    pub relationship_type: TaxonomyRelation,
    pub evidence_spans: Vec<EvidenceSpan>,
    pub confidence: f64,
    pub extracted_by: ExtractorKind,
    pub timestamp: DateTime<Utc>,
}

impl TaxonomyEdge {
    pub fn new(
        parent_id: impl Into<String>,
        child_id: impl Into<String>,
        relationship_type: TaxonomyRelation,
        confidence: f64,
        extracted_by: ExtractorKind,
    ) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
            relationship_type,
            evidence_spans: Vec::new(),
            confidence,
            extracted_by,
            timestamp: Utc::now(),
        }
    }
}

/// General typed relationship between two concepts.
///
/// `predicate` is drawn from a constrained schema when `schema_aligned`
/// is set; `relationship_type` is the schema category the predicate
/// belongs to (e.g. "dependency", "mitigation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub predicate: String,
    pub relationship_type: String,
    pub evidence_spans: Vec<EvidenceSpan>,
    pub confidence: f64,
    pub schema_aligned: bool,
    pub extracted_by: ExtractorKind,
    pub timestamp: DateTime<Utc>,
}

impl KnowledgeGraphEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        predicate: impl Into<String>,
        relationship_type: impl Into<String>,
        confidence: f64,
        extracted_by: ExtractorKind,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            predicate: predicate.into(),
            relationship_type: relationship_type.into(),
            evidence_spans: Vec::new(),
            confidence,
            schema_aligned: false,
            extracted_by,
            timestamp: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, span: EvidenceSpan) -> Self {
        self.evidence_spans.push(span);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_relation_roundtrip() {
        for rel in TaxonomyRelation::ALL {
            assert_eq!(TaxonomyRelation::parse(rel.as_str()), Some(rel));
        }
        assert_eq!(TaxonomyRelation::parse("sibling_of"), None);
    }

    #[test]
    fn test_extractor_priority_order() {
        assert!(ExtractorKind::SchemaLlm.priority() > ExtractorKind::Pattern.priority());
        assert!(ExtractorKind::Pattern.priority() > ExtractorKind::ConceptInventory.priority());
    }

    #[test]
    fn test_edge_serde_snake_case() {
        let edge = TaxonomyEdge::new("p", "c", TaxonomyRelation::IsA, 0.9, ExtractorKind::TaxonomyBuilder);
        let json = serde_json::to_string(&edge).unwrap();
        assert!(json.contains("\"relationship_type\":\"is_a\""));
        assert!(json.contains("\"extracted_by\":\"taxonomy_builder\""));
    }
}
