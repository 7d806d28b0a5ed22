pub mod resolve;

pub use resolve::{resolve_contradictions, resolve_duplicates};

use model::{
    verify_span, ConceptEntry, DocumentTreeNode, EvidenceSpan, ExtractorKind, KnowledgeGraphEdge,
    NodeType,
};
use providers::{
    ProposalRequest, RelationProposal, RelationProposer, RelationSchema, RetryPolicy,
    TripleExtractor,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

/// Fixed confidence for pattern-extracted edges, reflecting the strategy's
/// high-recall/low-precision nature relative to schema-constrained calls.
pub const PATTERN_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct LinkExtractorConfig {
    /// Document nodes per schema-constrained proposal call
    pub node_batch_size: usize,
    /// Concepts listed in a proposal prompt before truncation
    pub max_prompt_concepts: usize,
}

impl Default for LinkExtractorConfig {
    fn default() -> Self {
        Self {
            node_batch_size: 5,
            max_prompt_concepts: 50,
        }
    }
}

/// Extracts typed relationship edges via two independent strategies and
/// reconciles the combined result.
///
/// Pattern extraction is fast and noisy; schema-constrained extraction is
/// slower and precise. Both run over the same tree, their edges are
/// concatenated, and the contradiction and duplicate passes reduce the
/// combined set deterministically.
pub struct LinkExtractor {
    triple_extractor: Arc<dyn TripleExtractor>,
    proposer: Arc<dyn RelationProposer>,
    retry: RetryPolicy,
    schema: RelationSchema,
    config: LinkExtractorConfig,
}

impl LinkExtractor {
    pub fn new(
        triple_extractor: Arc<dyn TripleExtractor>,
        proposer: Arc<dyn RelationProposer>,
        retry: RetryPolicy,
        schema: RelationSchema,
        config: LinkExtractorConfig,
    ) -> Self {
        Self {
            triple_extractor,
            proposer,
            retry,
            schema,
            config,
        }
    }

    pub async fn extract(
        &self,
        document_tree: &[DocumentTreeNode],
        registry: &[ConceptEntry],
        document_text: &str,
        use_pattern_extraction: bool,
        use_schema_extraction: bool,
    ) -> (Vec<KnowledgeGraphEdge>, Vec<String>) {
        let mut edges = Vec::new();
        let mut errors = Vec::new();

        // The root node's text duplicates every child's text, so only
        // non-document nodes are scanned.
        let nodes: Vec<&DocumentTreeNode> = document_tree
            .iter()
            .filter(|n| n.node_type != NodeType::Document)
            .collect();

        if use_pattern_extraction {
            for node in &nodes {
                edges.extend(self.pattern_edges(node, registry, document_text));
            }
        }

        if use_schema_extraction {
            let (schema_edges, schema_errors) =
                self.schema_edges(&nodes, registry, document_text).await;
            edges.extend(schema_edges);
            errors.extend(schema_errors);
        }

        let edges = resolve_duplicates(resolve_contradictions(edges));
        (edges, errors)
    }

    /// OpenIE-style extraction over one node. Subject and object map to
    /// registry ids when a case-insensitive term match exists, otherwise
    /// they stay as free text.
    fn pattern_edges(
        &self,
        node: &DocumentTreeNode,
        registry: &[ConceptEntry],
        document_text: &str,
    ) -> Vec<KnowledgeGraphEdge> {
        let mut edges = Vec::new();

        for triple in self.triple_extractor.extract_triples(&node.text) {
            let span = EvidenceSpan::new(
                &node.text[triple.start_char..triple.end_char],
                node.start_char + triple.start_char,
                node.start_char + triple.end_char,
                node.page_number,
            )
            .with_section(&node.id)
            .with_confidence(PATTERN_CONFIDENCE);

            // No verifiable span, no edge
            if !verify_span(document_text, &span) {
                debug!(node = %node.id, "Dropping pattern triple with unverifiable span");
                continue;
            }

            let source_id = map_term(&triple.subject, registry);
            let target_id = map_term(&triple.object, registry);
            let relationship_type = self
                .schema
                .category_of(&triple.relation)
                .unwrap_or("semantic")
                .to_string();
            let schema_aligned = self.schema.contains(&triple.relation);

            let mut edge = KnowledgeGraphEdge::new(
                source_id,
                target_id,
                triple.relation,
                relationship_type,
                PATTERN_CONFIDENCE,
                ExtractorKind::Pattern,
            )
            .with_evidence(span);
            edge.schema_aligned = schema_aligned;
            edges.push(edge);
        }

        edges
    }

    /// Schema-constrained extraction over node batches. Proposals missing
    /// verifiable evidence or using out-of-schema predicates are discarded
    /// before they ever reach the merge step.
    async fn schema_edges(
        &self,
        nodes: &[&DocumentTreeNode],
        registry: &[ConceptEntry],
        document_text: &str,
    ) -> (Vec<KnowledgeGraphEdge>, Vec<String>) {
        if nodes.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let concept_block = build_concept_block(registry, self.config.max_prompt_concepts);
        let requests: Vec<ProposalRequest> = nodes
            .chunks(self.config.node_batch_size)
            .map(|batch| ProposalRequest {
                context: build_node_context(batch, &concept_block),
                schema: self.schema.clone(),
            })
            .collect();

        let mut join_set = JoinSet::new();
        for (batch_idx, request) in requests.into_iter().enumerate() {
            let proposer = Arc::clone(&self.proposer);
            let retry = self.retry.clone();
            join_set.spawn(async move {
                let result = retry
                    .retry("propose_kg_relations", || proposer.propose_relations(&request))
                    .await;
                (batch_idx, result)
            });
        }

        let mut batch_results: Vec<Option<Result<Vec<RelationProposal>, String>>> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((batch_idx, result)) => {
                    if batch_results.len() <= batch_idx {
                        batch_results.resize_with(batch_idx + 1, || None);
                    }
                    batch_results[batch_idx] = Some(result.map_err(|e| e.to_string()));
                }
                Err(e) => {
                    batch_results.push(Some(Err(format!("batch task failed: {e}"))));
                }
            }
        }

        let mut edges = Vec::new();
        let mut errors = Vec::new();
        for (batch_idx, result) in batch_results.into_iter().flatten().enumerate() {
            match result {
                Ok(proposals) => {
                    for proposal in proposals {
                        if let Some(edge) = self.admit_proposal(proposal, registry, document_text) {
                            edges.push(edge);
                        }
                    }
                }
                Err(e) => {
                    errors.push(format!("link extraction failed for batch {batch_idx}: {e}"));
                }
            }
        }

        (edges, errors)
    }

    fn admit_proposal(
        &self,
        proposal: RelationProposal,
        registry: &[ConceptEntry],
        document_text: &str,
    ) -> Option<KnowledgeGraphEdge> {
        // Strictly constrained: anything outside the vocabulary is noise
        let relationship_type = self.schema.category_of(&proposal.predicate)?.to_string();

        let span = EvidenceSpan::new(
            proposal.evidence_text.clone(),
            proposal.start_char,
            proposal.end_char,
            proposal.page_number,
        )
        .with_confidence(proposal.confidence);
        if !verify_span(document_text, &span) {
            debug!(predicate = %proposal.predicate, "Discarding proposal with unverifiable evidence");
            return None;
        }

        let source_id = resolve_endpoint(&proposal.source, registry);
        let target_id = resolve_endpoint(&proposal.target, registry);
        if source_id == target_id {
            return None;
        }

        let mut edge = KnowledgeGraphEdge::new(
            source_id,
            target_id,
            proposal.predicate,
            relationship_type,
            proposal.confidence,
            ExtractorKind::SchemaLlm,
        )
        .with_evidence(span);
        edge.schema_aligned = true;
        Some(edge)
    }
}

/// Registry id for a term when one matches, otherwise the term itself.
fn map_term(term: &str, registry: &[ConceptEntry]) -> String {
    registry
        .iter()
        .find(|c| c.matches_term(term))
        .map(|c| c.canonical_id.clone())
        .unwrap_or_else(|| term.to_string())
}

/// Proposal endpoints may be ids or terms; prefer an exact id match.
fn resolve_endpoint(value: &str, registry: &[ConceptEntry]) -> String {
    if registry.iter().any(|c| c.canonical_id == value) {
        return value.to_string();
    }
    map_term(value, registry)
}

fn build_concept_block(registry: &[ConceptEntry], limit: usize) -> String {
    registry
        .iter()
        .take(limit)
        .map(|c| format!("- {} ({})", c.canonical_term, c.canonical_id))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_node_context(batch: &[&DocumentTreeNode], concept_block: &str) -> String {
    let mut parts = vec!["Text:".to_string()];
    for node in batch {
        parts.push(format!(
            "[Node {}, page {}, chars {}-{}]\n{}",
            node.id, node.page_number, node.start_char, node.end_char, node.text
        ));
    }
    parts.push(String::new());
    parts.push("Concepts to consider:".to_string());
    parts.push(concept_block.to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use providers::PatternTripleExtractor;

    struct StubProposer {
        proposals: Vec<RelationProposal>,
        fail: bool,
    }

    #[async_trait]
    impl RelationProposer for StubProposer {
        async fn propose_relations(&self, _request: &ProposalRequest) -> Result<Vec<RelationProposal>> {
            if self.fail {
                bail!("proposer down");
            }
            Ok(self.proposals.clone())
        }
    }

    fn registry() -> Vec<ConceptEntry> {
        vec![
            ConceptEntry::new("GDPR", "entity", 0.9),
            ConceptEntry::new("data protection", "concept", 0.8),
            ConceptEntry::new("Risk", "concept", 0.7),
        ]
    }

    fn block_node(doc: &str) -> DocumentTreeNode {
        DocumentTreeNode::new("b1", NodeType::Block, 1, doc, 0, doc.len(), 1)
    }

    fn extractor(proposer: StubProposer) -> LinkExtractor {
        LinkExtractor::new(
            Arc::new(PatternTripleExtractor::default()),
            Arc::new(proposer),
            RetryPolicy::new(0, 1, 1, 5),
            RelationSchema::default_regulatory(),
            LinkExtractorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_pattern_mode_gdpr_scenario() {
        let doc = "GDPR requires data protection. Data protection mitigates Risk.";
        let tree = vec![block_node(doc)];
        let registry = registry();

        let x = extractor(StubProposer { proposals: Vec::new(), fail: false });
        let (edges, errors) = x.extract(&tree, &registry, doc, true, false).await;

        assert!(errors.is_empty());
        assert_eq!(edges.len(), 2);

        let gdpr_id = &registry[0].canonical_id;
        let dp_id = &registry[1].canonical_id;
        let risk_id = &registry[2].canonical_id;

        let requires = edges.iter().find(|e| e.predicate == "requires").unwrap();
        assert_eq!(&requires.source_id, gdpr_id);
        assert_eq!(&requires.target_id, dp_id);
        assert_eq!(requires.confidence, PATTERN_CONFIDENCE);
        assert_eq!(requires.evidence_spans[0].text, "GDPR requires data protection");

        let mitigates = edges.iter().find(|e| e.predicate == "mitigates").unwrap();
        assert_eq!(&mitigates.source_id, dp_id);
        assert_eq!(&mitigates.target_id, risk_id);
        assert_eq!(mitigates.evidence_spans[0].text, "Data protection mitigates Risk");
        assert!(verify_span(doc, &mitigates.evidence_spans[0]));
    }

    #[tokio::test]
    async fn test_unmapped_terms_stay_free_text() {
        let doc = "Basel requires capital buffers.";
        let tree = vec![block_node(doc)];
        let x = extractor(StubProposer { proposals: Vec::new(), fail: false });
        let (edges, _) = x.extract(&tree, &registry(), doc, true, false).await;

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_id, "Basel");
        assert_eq!(edges[0].target_id, "capital buffers");
    }

    #[tokio::test]
    async fn test_schema_mode_discards_missing_evidence() {
        let doc = "GDPR requires data protection.";
        let tree = vec![block_node(doc)];
        let reg = registry();

        let good = RelationProposal {
            source: reg[0].canonical_id.clone(),
            target: reg[1].canonical_id.clone(),
            predicate: "requires".to_string(),
            evidence_text: "GDPR requires data protection".to_string(),
            start_char: 0,
            end_char: 29,
            page_number: 1,
            confidence: 0.9,
        };
        let mut no_evidence = good.clone();
        no_evidence.predicate = "depends_on".to_string();
        no_evidence.evidence_text = String::new();
        no_evidence.start_char = 0;
        no_evidence.end_char = 0;

        let x = extractor(StubProposer { proposals: vec![good, no_evidence], fail: false });
        let (edges, errors) = x.extract(&tree, &reg, doc, false, true).await;

        assert!(errors.is_empty());
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].predicate, "requires");
        assert!(edges[0].schema_aligned);
        assert_eq!(edges[0].extracted_by, ExtractorKind::SchemaLlm);
    }

    #[tokio::test]
    async fn test_out_of_schema_predicate_is_discarded() {
        let doc = "GDPR requires data protection.";
        let tree = vec![block_node(doc)];
        let reg = registry();

        let rogue = RelationProposal {
            source: reg[0].canonical_id.clone(),
            target: reg[1].canonical_id.clone(),
            predicate: "fancies".to_string(),
            evidence_text: "GDPR requires data protection".to_string(),
            start_char: 0,
            end_char: 29,
            page_number: 1,
            confidence: 0.95,
        };
        let x = extractor(StubProposer { proposals: vec![rogue], fail: false });
        let (edges, _) = x.extract(&tree, &reg, doc, false, true).await;
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn test_cross_strategy_contradiction_resolution() {
        // Pattern finds "requires" at 0.6; the schema proposer asserts
        // "depends_on" for the same pair at 0.9. One edge must survive.
        let doc = "GDPR requires data protection.";
        let tree = vec![block_node(doc)];
        let reg = registry();

        let strong = RelationProposal {
            source: reg[0].canonical_id.clone(),
            target: reg[1].canonical_id.clone(),
            predicate: "depends_on".to_string(),
            evidence_text: "GDPR requires data protection".to_string(),
            start_char: 0,
            end_char: 29,
            page_number: 1,
            confidence: 0.9,
        };
        let x = extractor(StubProposer { proposals: vec![strong], fail: false });
        let (edges, _) = x.extract(&tree, &reg, doc, true, true).await;

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].predicate, "depends_on");
        assert_eq!(edges[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_proposer_failure_degrades_to_pattern_only() {
        let doc = "GDPR requires data protection.";
        let tree = vec![block_node(doc)];
        let reg = registry();

        let x = extractor(StubProposer { proposals: Vec::new(), fail: true });
        let (edges, errors) = x.extract(&tree, &reg, doc, true, true).await;

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].extracted_by, ExtractorKind::Pattern);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("batch 0"));
    }
}
