use crate::edge::ExtractorKind;
use crate::evidence::EvidenceSpan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Canonical concept with synonyms, definitions and examples.
///
/// `canonical_id` is unique within one document's registry. Synonyms are
/// kept case-insensitively distinct from the canonical term. Entries are
/// immutable after the registry is built, except for the synonym merge
/// performed during dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptEntry {
    pub canonical_id: String,
    pub canonical_term: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub definition_spans: Vec<EvidenceSpan>,
    #[serde(default)]
    pub example_spans: Vec<EvidenceSpan>,
    pub category: String,
    pub confidence: f64,
    pub extracted_by: ExtractorKind,
    pub timestamp: DateTime<Utc>,
}

impl ConceptEntry {
    pub fn new(term: impl Into<String>, category: impl Into<String>, confidence: f64) -> Self {
        let canonical_term = term.into();
        Self {
            canonical_id: concept_id(&canonical_term),
            canonical_term,
            synonyms: Vec::new(),
            definition_spans: Vec::new(),
            example_spans: Vec::new(),
            category: category.into(),
            confidence,
            extracted_by: ExtractorKind::ConceptInventory,
            timestamp: Utc::now(),
        }
    }

    /// All evidence backing this concept, definitions first.
    pub fn evidence(&self) -> impl Iterator<Item = &EvidenceSpan> {
        self.definition_spans.iter().chain(self.example_spans.iter())
    }

    pub fn has_evidence(&self) -> bool {
        !self.definition_spans.is_empty() || !self.example_spans.is_empty()
    }

    /// Add a synonym, keeping the list case-insensitively distinct from
    /// both the canonical term and existing synonyms.
    pub fn add_synonym(&mut self, term: &str) {
        let lower = term.to_lowercase();
        if lower == self.canonical_term.to_lowercase() {
            return;
        }
        if self.synonyms.iter().any(|s| s.to_lowercase() == lower) {
            return;
        }
        self.synonyms.push(term.to_string());
    }

    /// Case-insensitive match against the canonical term or any synonym.
    pub fn matches_term(&self, term: &str) -> bool {
        let lower = term.to_lowercase();
        self.canonical_term.to_lowercase() == lower
            || self.synonyms.iter().any(|s| s.to_lowercase() == lower)
    }
}

/// Generate a stable concept ID from the canonical term.
pub fn concept_id(term: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(term.to_lowercase().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}
