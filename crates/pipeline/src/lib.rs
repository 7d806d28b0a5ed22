//! Orchestrates the full extraction run for one document: concept
//! registry, taxonomy edges, knowledge-graph edges, validation, and the
//! final confidence summary.
//!
//! The pipeline is pluggable at the capability seams (candidate
//! extraction, embedding, clustering, relation proposal, triple
//! extraction) so production Ollama-backed providers and test stubs wire
//! in the same way. Cancellation is drop-based: dropping the future
//! returned by [`Pipeline::run`] aborts any in-flight batch tasks.

mod config;
mod validate;

pub use config::{ClusterConfig, PipelineConfig, RetryConfig};
pub use taxonomy::{SeedConcept, SeedTaxonomy};

use anyhow::{Context, Result, bail};
use concepts::ConceptRegistryBuilder;
use links::LinkExtractor;
use model::{DocumentTreeNode, ExtractionPipelineOutput, NodeType};
use providers::{
    CandidateExtractor, Clusterer, DbscanClusterer, Embedder, RelationProposer, RelationSchema,
    TripleExtractor,
};
use std::collections::HashMap;
use std::sync::Arc;
use taxonomy::TaxonomyBuilder;

/// The pluggable capabilities a pipeline run needs.
///
/// `clusterer` defaults to DBSCAN over cosine distance with the knobs
/// from [`PipelineConfig::cluster`] when left unset.
pub struct Capabilities {
    pub candidate_extractor: Arc<dyn CandidateExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub clusterer: Option<Arc<dyn Clusterer>>,
    pub proposer: Arc<dyn RelationProposer>,
    pub triple_extractor: Arc<dyn TripleExtractor>,
}

pub struct Pipeline {
    config: PipelineConfig,
    concepts: ConceptRegistryBuilder,
    taxonomy: TaxonomyBuilder,
    links: LinkExtractor,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, capabilities: Capabilities) -> Self {
        let clusterer = capabilities.clusterer.unwrap_or_else(|| {
            Arc::new(DbscanClusterer::new(
                config.cluster.eps,
                config.cluster.min_samples,
            ))
        });

        let concepts = ConceptRegistryBuilder::new(
            capabilities.candidate_extractor,
            config.retry_policy(),
            config.concept_config(),
        );
        let taxonomy = TaxonomyBuilder::new(
            capabilities.embedder,
            clusterer,
            Arc::clone(&capabilities.proposer),
            config.retry_policy(),
            config.taxonomy_config(),
        );
        let links = LinkExtractor::new(
            capabilities.triple_extractor,
            capabilities.proposer,
            config.retry_policy(),
            RelationSchema::default_regulatory(),
            config.link_config(),
        );

        Self {
            config,
            concepts,
            taxonomy,
            links,
        }
    }

    /// Run the full pipeline over one document tree.
    ///
    /// Provider failures degrade the affected stage (empty output plus a
    /// diagnostic in `validation_errors`) rather than failing the run;
    /// only an empty or fully malformed tree is an error.
    pub async fn run(
        &self,
        document_tree: Vec<DocumentTreeNode>,
        document_id: &str,
        metadata: HashMap<String, serde_json::Value>,
        seed: Option<&SeedTaxonomy>,
    ) -> Result<ExtractionPipelineOutput> {
        if document_tree.is_empty() {
            bail!("document tree is empty");
        }

        let mut errors = Vec::new();
        let tree = sanitize_tree(document_tree, &mut errors);
        if tree.is_empty() {
            bail!("document tree has no structurally valid nodes");
        }

        let document_text = derive_document_text(&tree)?;

        tracing::info!(
            document_id,
            nodes = tree.len(),
            text_bytes = document_text.len(),
            "starting extraction run"
        );

        let (registry, concept_errors) = self.concepts.build(&tree, &document_text, &[]).await;
        errors.extend(concept_errors);
        tracing::info!(concepts = registry.len(), "concept registry built");

        let (taxonomy_edges, taxonomy_errors) =
            self.taxonomy.build(&registry, &document_text, seed).await;
        errors.extend(taxonomy_errors);
        tracing::info!(edges = taxonomy_edges.len(), "taxonomy edges proposed");

        let (kg_edges, link_errors) = self
            .links
            .extract(
                &tree,
                &registry,
                &document_text,
                self.config.use_pattern_extraction,
                self.config.use_schema_extraction,
            )
            .await;
        errors.extend(link_errors);
        tracing::info!(edges = kg_edges.len(), "kg edges extracted");

        let outcome = validate::validate(
            taxonomy_edges,
            kg_edges,
            self.config.require_evidence,
            self.config.min_confidence,
        );
        errors.extend(outcome.errors);

        let mut output = ExtractionPipelineOutput::new(document_id);
        output.document_metadata = metadata;
        output.confidence_summary = confidence_summary(&outcome.taxonomy_edges, &outcome.kg_edges);
        output.document_tree = tree;
        output.concept_registry = registry;
        output.taxonomy_edges = outcome.taxonomy_edges;
        output.kg_edges = outcome.kg_edges;
        output.validation_errors = errors;

        tracing::info!(
            document_id,
            concepts = output.concept_registry.len(),
            taxonomy_edges = output.taxonomy_edges.len(),
            kg_edges = output.kg_edges.len(),
            diagnostics = output.validation_errors.len(),
            "extraction run complete"
        );
        Ok(output)
    }
}

/// Drop structurally invalid nodes before any stage sees them: bad
/// offset ranges, text that disagrees with its offsets, children outside
/// their parent's range, or levels that fail to increase down the tree.
fn sanitize_tree(tree: Vec<DocumentTreeNode>, errors: &mut Vec<String>) -> Vec<DocumentTreeNode> {
    let by_id: HashMap<String, (usize, usize, u32)> = tree
        .iter()
        .map(|n| (n.id.clone(), (n.start_char, n.end_char, n.level)))
        .collect();

    tree.into_iter()
        .filter(|node| {
            if !node.has_valid_offsets() {
                errors.push(format!("node {} has invalid offsets; dropped", node.id));
                return false;
            }
            if node.text.len() != node.end_char - node.start_char {
                errors.push(format!(
                    "node {} text length disagrees with its offsets; dropped",
                    node.id
                ));
                return false;
            }
            if let Some(parent_id) = &node.parent_id
                && let Some(&(p_start, p_end, p_level)) = by_id.get(parent_id)
            {
                if node.start_char < p_start || node.end_char > p_end {
                    errors.push(format!(
                        "node {} lies outside parent {parent_id}; dropped",
                        node.id
                    ));
                    return false;
                }
                if node.level <= p_level {
                    errors.push(format!(
                        "node {} level does not increase from parent {parent_id}; dropped",
                        node.id
                    ));
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Recover the full document text that all offsets index into.
///
/// A document-level root carries the whole text directly; without one,
/// the text is reassembled by writing each node's bytes at its offsets.
fn derive_document_text(tree: &[DocumentTreeNode]) -> Result<String> {
    if let Some(root) = tree.iter().find(|n| n.node_type == NodeType::Document) {
        return Ok(root.text.clone());
    }

    let total = tree.iter().map(|n| n.end_char).max().unwrap_or(0);
    let mut buffer = vec![b' '; total];
    for node in tree {
        buffer[node.start_char..node.end_char].copy_from_slice(node.text.as_bytes());
    }
    String::from_utf8(buffer).context("document nodes do not reassemble into valid UTF-8")
}

/// Mean confidence per edge collection. Empty collections contribute no
/// key at all; "no data" must stay distinguishable from 0.0.
fn confidence_summary(
    taxonomy_edges: &[model::TaxonomyEdge],
    kg_edges: &[model::KnowledgeGraphEdge],
) -> HashMap<String, f64> {
    let mut summary = HashMap::new();
    if !taxonomy_edges.is_empty() {
        let sum: f64 = taxonomy_edges.iter().map(|e| e.confidence).sum();
        summary.insert("taxonomy_avg".to_string(), sum / taxonomy_edges.len() as f64);
    }
    if !kg_edges.is_empty() {
        let sum: f64 = kg_edges.iter().map(|e| e.confidence).sum();
        summary.insert("kg_avg".to_string(), sum / kg_edges.len() as f64);
    }
    summary
}
