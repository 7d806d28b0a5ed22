use model::{verify_span, ConceptEntry, EvidenceSpan, ExtractorKind, TaxonomyEdge, TaxonomyRelation};
use providers::{
    Clusterer, Embedder, ProposalRequest, RelationProposal, RelationProposer, RelationSchema,
    RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

/// Existing taxonomy to expand instead of building from scratch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedTaxonomy {
    pub concepts: Vec<SeedConcept>,
    /// (parent_id, child_id) pairs already in the seed graph
    pub edges: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConcept {
    pub id: String,
    pub term: String,
}

#[derive(Debug, Clone)]
pub struct TaxonomyBuilderConfig {
    pub require_evidence: bool,
    /// Concept pairs per proposal call; bounds prompt size, carries no
    /// semantic meaning
    pub pair_batch_size: usize,
    /// Seed attachment candidates considered per new concept
    pub max_candidates_per_concept: usize,
}

impl Default for TaxonomyBuilderConfig {
    fn default() -> Self {
        Self {
            require_evidence: true,
            pair_batch_size: 10,
            max_candidates_per_concept: 3,
        }
    }
}

/// One candidate pair handed to the proposer. Both orderings are left to
/// the proposer to resolve; it answers with parent as `source`.
#[derive(Debug, Clone)]
struct CandidatePair {
    a_id: String,
    a_term: String,
    b_id: String,
    b_term: String,
}

/// Builds hierarchical edges between registry concepts.
///
/// Cold-start mode clusters concept embeddings and asks the proposer
/// about within-cluster pairs only; expansion mode attaches new concepts
/// to their most similar seed nodes. The builder rejects evidence
/// violations at creation but leaves dedup, cycle checks and confidence
/// thresholds to the orchestrator's validation pass.
pub struct TaxonomyBuilder {
    embedder: Arc<dyn Embedder>,
    clusterer: Arc<dyn Clusterer>,
    proposer: Arc<dyn RelationProposer>,
    retry: RetryPolicy,
    config: TaxonomyBuilderConfig,
}

impl TaxonomyBuilder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        clusterer: Arc<dyn Clusterer>,
        proposer: Arc<dyn RelationProposer>,
        retry: RetryPolicy,
        config: TaxonomyBuilderConfig,
    ) -> Self {
        Self {
            embedder,
            clusterer,
            proposer,
            retry,
            config,
        }
    }

    pub async fn build(
        &self,
        registry: &[ConceptEntry],
        document_text: &str,
        seed: Option<&SeedTaxonomy>,
    ) -> (Vec<TaxonomyEdge>, Vec<String>) {
        match seed {
            Some(seed) if !seed.concepts.is_empty() => {
                self.expand_seed(registry, document_text, seed).await
            }
            _ => self.cold_start(registry, document_text).await,
        }
    }

    /// Cluster embeddings, pair within clusters, propose per batch.
    async fn cold_start(
        &self,
        registry: &[ConceptEntry],
        document_text: &str,
    ) -> (Vec<TaxonomyEdge>, Vec<String>) {
        if registry.len() < 2 {
            return (Vec::new(), Vec::new());
        }

        let texts: Vec<String> = registry.iter().map(|c| c.canonical_term.clone()).collect();
        let embeddings = match self
            .retry
            .retry("embed_concepts", || self.embedder.embed(&texts))
            .await
        {
            Ok(vectors) => vectors,
            Err(e) => {
                return (Vec::new(), vec![format!("taxonomy embedding failed: {e}")]);
            }
        };

        let clusters = self.clusterer.cluster(&embeddings);
        debug!(clusters = clusters.len(), concepts = registry.len(), "Clustered concepts");

        // Pairs are generated within clusters only; cross-cluster pairs
        // never reach the proposer.
        let mut pairs = Vec::new();
        for cluster in &clusters {
            if cluster.len() < 2 {
                continue;
            }
            for i in 0..cluster.len() {
                for j in (i + 1)..cluster.len() {
                    let a = &registry[cluster[i]];
                    let b = &registry[cluster[j]];
                    pairs.push(CandidatePair {
                        a_id: a.canonical_id.clone(),
                        a_term: a.canonical_term.clone(),
                        b_id: b.canonical_id.clone(),
                        b_term: b.canonical_term.clone(),
                    });
                }
            }
        }

        self.propose_batches(pairs, registry, document_text, ExtractorKind::TaxonomyBuilder)
            .await
    }

    /// Attach new concepts to their nearest seed nodes by embedding
    /// similarity, then propose edges for those attachment candidates.
    async fn expand_seed(
        &self,
        registry: &[ConceptEntry],
        document_text: &str,
        seed: &SeedTaxonomy,
    ) -> (Vec<TaxonomyEdge>, Vec<String>) {
        let seed_ids: HashSet<&str> = seed.concepts.iter().map(|c| c.id.as_str()).collect();
        let new_concepts: Vec<&ConceptEntry> = registry
            .iter()
            .filter(|c| !seed_ids.contains(c.canonical_id.as_str()))
            .collect();
        if new_concepts.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let mut texts: Vec<String> = new_concepts
            .iter()
            .map(|c| c.canonical_term.clone())
            .collect();
        texts.extend(seed.concepts.iter().map(|c| c.term.clone()));

        let embeddings = match self
            .retry
            .retry("embed_concepts", || self.embedder.embed(&texts))
            .await
        {
            Ok(vectors) => vectors,
            Err(e) => {
                return (Vec::new(), vec![format!("taxonomy embedding failed: {e}")]);
            }
        };
        let (new_vecs, seed_vecs) = embeddings.split_at(new_concepts.len());

        let mut pairs = Vec::new();
        for (ci, concept) in new_concepts.iter().enumerate() {
            let mut ranked: Vec<(usize, f64)> = seed_vecs
                .iter()
                .enumerate()
                .map(|(si, v)| (si, cosine_similarity(&new_vecs[ci], v)))
                .collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            for &(si, _) in ranked.iter().take(self.config.max_candidates_per_concept) {
                let seed_node = &seed.concepts[si];
                pairs.push(CandidatePair {
                    a_id: seed_node.id.clone(),
                    a_term: seed_node.term.clone(),
                    b_id: concept.canonical_id.clone(),
                    b_term: concept.canonical_term.clone(),
                });
            }
        }

        let mut edges_and_errors = self
            .propose_batches(pairs, registry, document_text, ExtractorKind::SeedExpansion)
            .await;
        // Seed ids are valid endpoints too, so nothing to re-map here;
        // propose_batches already accepted them via the pair list.
        edges_and_errors.0.retain(|e| e.parent_id != e.child_id);
        edges_and_errors
    }

    async fn propose_batches(
        &self,
        pairs: Vec<CandidatePair>,
        registry: &[ConceptEntry],
        document_text: &str,
        extracted_by: ExtractorKind,
    ) -> (Vec<TaxonomyEdge>, Vec<String>) {
        if pairs.is_empty() {
            return (Vec::new(), Vec::new());
        }

        // Every id named in a pair is an acceptable edge endpoint
        let mut known_ids: HashSet<String> = HashSet::new();
        for pair in &pairs {
            known_ids.insert(pair.a_id.clone());
            known_ids.insert(pair.b_id.clone());
        }
        let term_to_id: HashMap<String, String> = pairs
            .iter()
            .flat_map(|p| {
                [
                    (p.a_term.to_lowercase(), p.a_id.clone()),
                    (p.b_term.to_lowercase(), p.b_id.clone()),
                ]
            })
            .collect();

        let requests: Vec<ProposalRequest> = pairs
            .chunks(self.config.pair_batch_size)
            .map(|batch| ProposalRequest {
                context: build_pair_context(batch, registry),
                schema: RelationSchema::taxonomy(),
            })
            .collect();

        // Fan out one task per batch; results are re-ordered by batch
        // index so concurrency never changes the output order.
        let mut join_set = JoinSet::new();
        for (batch_idx, request) in requests.into_iter().enumerate() {
            let proposer = Arc::clone(&self.proposer);
            let retry = self.retry.clone();
            join_set.spawn(async move {
                let result = retry
                    .retry("propose_taxonomy_relations", || {
                        proposer.propose_relations(&request)
                    })
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
                    // Task panicked or was aborted; degrade like a failed call
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
                        if let Some(edge) = self.admit_proposal(
                            proposal,
                            &known_ids,
                            &term_to_id,
                            document_text,
                            extracted_by,
                        ) {
                            edges.push(edge);
                        }
                    }
                }
                Err(e) => {
                    errors.push(format!("taxonomy proposal failed for batch {batch_idx}: {e}"));
                }
            }
        }

        (edges, errors)
    }

    /// Turn a raw proposal into an edge, enforcing the vocabulary and the
    /// evidence discipline. Returns None for anything that must not enter
    /// the edge list.
    fn admit_proposal(
        &self,
        proposal: RelationProposal,
        known_ids: &HashSet<String>,
        term_to_id: &HashMap<String, String>,
        document_text: &str,
        extracted_by: ExtractorKind,
    ) -> Option<TaxonomyEdge> {
        let relation = TaxonomyRelation::parse(&proposal.predicate)?;

        let parent_id = resolve_id(&proposal.source, known_ids, term_to_id)?;
        let child_id = resolve_id(&proposal.target, known_ids, term_to_id)?;
        if parent_id == child_id {
            return None;
        }

        let mut edge = TaxonomyEdge::new(parent_id, child_id, relation, proposal.confidence, extracted_by);

        let span = EvidenceSpan::new(
            proposal.evidence_text.clone(),
            proposal.start_char,
            proposal.end_char,
            proposal.page_number,
        )
        .with_confidence(proposal.confidence);

        // A mismatched span is always rejected; an absent span is only
        // tolerated when evidence is not required.
        if verify_span(document_text, &span) {
            edge.evidence_spans.push(span);
        } else if !proposal.evidence_text.is_empty() {
            debug!(
                parent = %edge.parent_id,
                child = %edge.child_id,
                "Discarding taxonomy evidence that does not match the document"
            );
        }

        if self.config.require_evidence && edge.evidence_spans.is_empty() {
            return None;
        }
        Some(edge)
    }
}

fn resolve_id(
    value: &str,
    known_ids: &HashSet<String>,
    term_to_id: &HashMap<String, String>,
) -> Option<String> {
    if known_ids.contains(value) {
        return Some(value.to_string());
    }
    term_to_id.get(&value.to_lowercase()).cloned()
}

/// Prompt context for one batch: the candidate pairs plus supporting
/// excerpts the proposer can quote from.
fn build_pair_context(batch: &[CandidatePair], registry: &[ConceptEntry]) -> String {
    let mut lines = vec!["Concept pairs:".to_string()];
    for pair in batch {
        lines.push(format!(
            "- Pair: {} ({}) / {} ({})",
            pair.a_term, pair.a_id, pair.b_term, pair.b_id
        ));
    }

    let by_id: HashMap<&str, &ConceptEntry> = registry
        .iter()
        .map(|c| (c.canonical_id.as_str(), c))
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut excerpts = Vec::new();
    for pair in batch {
        for id in [pair.a_id.as_str(), pair.b_id.as_str()] {
            if !seen.insert(id) {
                continue;
            }
            if let Some(concept) = by_id.get(id) {
                if let Some(span) = concept.evidence().next() {
                    excerpts.push(format!(
                        "[chars {}-{}, page {}] {}",
                        span.start_char, span.end_char, span.page_number, span.text
                    ));
                }
            }
        }
    }
    if !excerpts.is_empty() {
        lines.push(String::new());
        lines.push("Supporting excerpts:".to_string());
        lines.extend(excerpts);
    }

    lines.join("\n")
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
