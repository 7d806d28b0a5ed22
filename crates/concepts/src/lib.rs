pub mod normalizer;

pub use normalizer::TermNormalizer;

use model::{concept_id, verify_span, ConceptEntry, DocumentTreeNode, EvidenceSpan, NodeType};
use providers::{CandidateExtractor, RetryPolicy};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ConceptBuilderConfig {
    /// Drop entries that end up with no definition or example span
    pub require_evidence: bool,
    /// Word-overlap threshold for synonym merging
    pub similarity_threshold: f64,
}

impl Default for ConceptBuilderConfig {
    fn default() -> Self {
        Self {
            require_evidence: true,
            similarity_threshold: 0.7,
        }
    }
}

/// Builds the canonical concept registry from raw document-tree nodes.
///
/// Candidate terms come from an external entity/keyphrase capability;
/// this builder owns synonym merging, evidence harvesting and the
/// evidence requirement. A node whose extraction fails contributes zero
/// concepts and one diagnostic, never a failed run.
pub struct ConceptRegistryBuilder {
    extractor: Arc<dyn CandidateExtractor>,
    retry: RetryPolicy,
    config: ConceptBuilderConfig,
}

impl ConceptRegistryBuilder {
    pub fn new(
        extractor: Arc<dyn CandidateExtractor>,
        retry: RetryPolicy,
        config: ConceptBuilderConfig,
    ) -> Self {
        Self {
            extractor,
            retry,
            config,
        }
    }

    /// Build registry entries for a document.
    ///
    /// `existing_concepts` are canonical IDs already known to the caller
    /// (e.g. from a previous run); matching candidates are skipped rather
    /// than re-created. Returns entries plus per-node diagnostics.
    pub async fn build(
        &self,
        document_tree: &[DocumentTreeNode],
        document_text: &str,
        existing_concepts: &[String],
    ) -> (Vec<ConceptEntry>, Vec<String>) {
        let existing: HashSet<&str> = existing_concepts.iter().map(String::as_str).collect();
        let mut normalizer = TermNormalizer::new(self.config.similarity_threshold);
        let mut entries: Vec<ConceptEntry> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut errors = Vec::new();

        for node in document_tree {
            // The root node's text contains every child's text; extracting
            // from it would double-count each term.
            if node.node_type == NodeType::Document {
                continue;
            }

            let candidates = match self
                .retry
                .retry("extract_candidates", || {
                    self.extractor.extract_candidates(&node.text)
                })
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    errors.push(format!(
                        "concept extraction failed for node {}: {e}",
                        node.id
                    ));
                    continue;
                }
            };

            for candidate in candidates {
                let key = normalizer.normalize(&candidate.term);
                if key.is_empty() {
                    continue;
                }
                if existing.contains(concept_id(&key).as_str()) {
                    continue;
                }

                let evidence = find_evidence(node, &candidate.term, document_text, candidate.confidence);

                match by_key.get(&key) {
                    Some(&idx) => {
                        let entry = &mut entries[idx];
                        if candidate.confidence > entry.confidence {
                            // Higher-confidence term takes over as canonical
                            let old =
                                std::mem::replace(&mut entry.canonical_term, candidate.term.clone());
                            let new_lower = candidate.term.to_lowercase();
                            entry.synonyms.retain(|s| s.to_lowercase() != new_lower);
                            entry.add_synonym(&old);
                            entry.confidence = candidate.confidence;
                        } else {
                            entry.add_synonym(&candidate.term);
                        }
                        if let Some((span, is_definition)) = evidence {
                            push_span(entry, span, is_definition);
                        }
                    }
                    None => {
                        let mut entry =
                            ConceptEntry::new(candidate.term, candidate.category, candidate.confidence);
                        // ID keyed by the normalized form so casing and
                        // punctuation variants hash identically
                        entry.canonical_id = concept_id(&key);
                        if let Some((span, is_definition)) = evidence {
                            push_span(&mut entry, span, is_definition);
                        }
                        by_key.insert(key, entries.len());
                        entries.push(entry);
                    }
                }
            }
        }

        if self.config.require_evidence {
            entries.retain(|e| {
                if !e.has_evidence() {
                    debug!(term = %e.canonical_term, "Dropping concept without evidence");
                }
                e.has_evidence()
            });
        }

        (entries, errors)
    }
}

fn push_span(entry: &mut ConceptEntry, span: EvidenceSpan, is_definition: bool) {
    // One span per sentence is enough; skip exact repeats
    let exists = entry
        .evidence()
        .any(|s| s.start_char == span.start_char && s.end_char == span.end_char);
    if exists {
        return;
    }
    if is_definition {
        entry.definition_spans.push(span);
    } else {
        entry.example_spans.push(span);
    }
}

/// Locate the sentence containing the first occurrence of `term` in the
/// node and turn it into a verified evidence span with global offsets.
/// Returns None when the term is absent or the span fails verification.
fn find_evidence(
    node: &DocumentTreeNode,
    term: &str,
    document_text: &str,
    confidence: f64,
) -> Option<(EvidenceSpan, bool)> {
    let re = Regex::new(&format!("(?i){}", regex::escape(term))).ok()?;
    let m = re.find(&node.text)?;

    let (sent_start, sent_end) = sentence_bounds(&node.text, m.start(), m.end());
    let raw = &node.text[sent_start..sent_end];
    let lead = raw.len() - raw.trim_start().len();
    let trail = raw.len() - raw.trim_end().len();
    if lead + trail >= raw.len() {
        return None;
    }
    let start = sent_start + lead;
    let end = sent_end - trail;

    let span = EvidenceSpan::new(
        &node.text[start..end],
        node.start_char + start,
        node.start_char + end,
        node.page_number,
    )
    .with_section(&node.id)
    .with_confidence(confidence);

    // Mismatched spans are rejected at creation, regardless of settings
    if !verify_span(document_text, &span) {
        return None;
    }

    let after = if m.end() <= end {
        node.text[m.end()..end].to_lowercase()
    } else {
        String::new()
    };
    let after = after.trim_start();
    let is_definition = after.starts_with("is ")
        || after.starts_with("are ")
        || after.starts_with("means ")
        || after.starts_with("refers to ")
        || after.contains("is defined as");

    Some((span, is_definition))
}

/// Byte range of the sentence around `[match_start, match_end)`,
/// exclusive of the terminating punctuation.
fn sentence_bounds(text: &str, match_start: usize, match_end: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let is_terminator = |b: u8| b == b'.' || b == b'!' || b == b'?' || b == b'\n';

    let mut start = 0;
    for i in (0..match_start).rev() {
        if is_terminator(bytes[i]) {
            start = i + 1;
            break;
        }
    }

    let mut end = text.len();
    for (i, &b) in bytes.iter().enumerate().skip(match_end) {
        if is_terminator(b) {
            end = i;
            break;
        }
    }

    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use model::NodeType;
    use providers::CandidateTerm;

    struct StubExtractor {
        candidates: Vec<CandidateTerm>,
    }

    #[async_trait]
    impl CandidateExtractor for StubExtractor {
        async fn extract_candidates(&self, text: &str) -> Result<Vec<CandidateTerm>> {
            if text.contains("FAIL") {
                bail!("extractor exploded");
            }
            Ok(self.candidates.clone())
        }
    }

    fn term(t: &str, confidence: f64) -> CandidateTerm {
        CandidateTerm {
            term: t.to_string(),
            category: "concept".to_string(),
            confidence,
        }
    }

    fn builder(candidates: Vec<CandidateTerm>, config: ConceptBuilderConfig) -> ConceptRegistryBuilder {
        ConceptRegistryBuilder::new(
            Arc::new(StubExtractor { candidates }),
            RetryPolicy::new(0, 1, 1, 5),
            config,
        )
    }

    fn section(id: &str, text: &str, start: usize) -> DocumentTreeNode {
        DocumentTreeNode::new(id, NodeType::Section, 1, text, start, start + text.len(), 1)
    }

    #[tokio::test]
    async fn test_definition_vs_example_spans() {
        let doc = "Data protection means safeguarding information. GDPR requires data protection.";
        let tree = vec![
            DocumentTreeNode::new("root", NodeType::Document, 0, doc, 0, doc.len(), 1),
            section("s1", doc, 0),
        ];
        let b = builder(
            vec![term("Data protection", 0.8), term("GDPR", 0.6)],
            ConceptBuilderConfig::default(),
        );
        let (entries, errors) = b.build(&tree, doc, &[]).await;

        assert!(errors.is_empty());
        assert_eq!(entries.len(), 2);

        let dp = entries.iter().find(|e| e.canonical_term == "Data protection").unwrap();
        assert_eq!(dp.definition_spans.len(), 1);
        assert_eq!(
            dp.definition_spans[0].text,
            "Data protection means safeguarding information"
        );

        let gdpr = entries.iter().find(|e| e.canonical_term == "GDPR").unwrap();
        assert!(gdpr.definition_spans.is_empty());
        assert_eq!(gdpr.example_spans.len(), 1);
        assert_eq!(gdpr.example_spans[0].text, "GDPR requires data protection");
    }

    #[tokio::test]
    async fn test_synonym_merge_keeps_higher_confidence_canonical() {
        let doc = "DP regulation is strict. DP is enforced everywhere.";
        let tree = vec![section("s1", doc, 0)];
        let b = builder(
            vec![term("DP regulation", 0.5), term("DP", 0.9)],
            ConceptBuilderConfig::default(),
        );
        let (entries, _) = b.build(&tree, doc, &[]).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].canonical_term, "DP");
        assert_eq!(entries[0].synonyms, vec!["DP regulation"]);
        assert_eq!(entries[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_node_failure_is_contained() {
        let good = "GDPR is a regulation.";
        let doc = format!("{good} FAIL here.");
        let tree = vec![
            section("s1", good, 0),
            section("s2", "FAIL here.", good.len() + 1),
        ];
        let b = builder(vec![term("GDPR", 0.7)], ConceptBuilderConfig::default());
        let (entries, errors) = b.build(&tree, &doc, &[]).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("s2"));
    }

    #[tokio::test]
    async fn test_require_evidence_drops_unsupported_terms() {
        let doc = "GDPR is a regulation.";
        let tree = vec![section("s1", doc, 0)];

        let b = builder(
            vec![term("GDPR", 0.7), term("Phantom", 0.9)],
            ConceptBuilderConfig::default(),
        );
        let (entries, _) = b.build(&tree, doc, &[]).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].canonical_term, "GDPR");

        let b = builder(
            vec![term("GDPR", 0.7), term("Phantom", 0.9)],
            ConceptBuilderConfig {
                require_evidence: false,
                ..Default::default()
            },
        );
        let (entries, _) = b.build(&tree, doc, &[]).await;
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_existing_concepts_are_skipped() {
        let doc = "GDPR is a regulation.";
        let tree = vec![section("s1", doc, 0)];
        let existing = vec![concept_id("gdpr")];
        let b = builder(vec![term("GDPR", 0.7)], ConceptBuilderConfig::default());
        let (entries, _) = b.build(&tree, doc, &existing).await;
        assert!(entries.is_empty());
    }
}
