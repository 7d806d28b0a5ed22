pub mod cluster;
pub mod ollama;
pub mod patterns;
pub mod prompt;
pub mod retry;
pub mod schema;

pub use cluster::DbscanClusterer;
pub use ollama::{OllamaEmbedder, OllamaGenerator, OllamaProposer};
pub use patterns::{KeyphraseCandidateExtractor, PatternTripleExtractor};
pub use retry::RetryPolicy;
pub use schema::{RelationCategory, RelationSchema};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Candidate term proposed for the concept registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTerm {
    pub term: String,
    pub category: String,
    pub confidence: f64,
}

/// Request for a constrained relation-proposal call.
///
/// The same capability serves taxonomy building and link extraction; the
/// two differ only in `context` content and the schema they constrain
/// proposals to.
#[derive(Debug, Clone)]
pub struct ProposalRequest {
    /// Prompt-ready source context: tagged node texts, concept list
    pub context: String,
    pub schema: RelationSchema,
}

/// One proposed relation with its mandatory evidence quote.
///
/// For taxonomy proposals `source` is the parent and `target` the child.
/// A pair the proposer abstains on simply does not appear in the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationProposal {
    pub source: String,
    pub target: String,
    pub predicate: String,
    pub evidence_text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub page_number: u32,
    pub confidence: f64,
}

/// One (subject, relation, object) triple matched in raw text, with the
/// byte range of the matched surface string.
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub subject: String,
    pub relation: String,
    pub object: String,
    pub start_char: usize,
    pub end_char: usize,
}

/// Entity/keyphrase extraction over one node's text.
#[async_trait]
pub trait CandidateExtractor: Send + Sync {
    async fn extract_candidates(&self, text: &str) -> Result<Vec<CandidateTerm>>;
}

/// Batch text embedding. Returns one vector per input, same order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Groups vectors into non-overlapping, variable-size clusters by index.
/// Sparse points are treated as noise and omitted from the result.
pub trait Clusterer: Send + Sync {
    fn cluster(&self, vectors: &[Vec<f32>]) -> Vec<Vec<usize>>;
}

/// Schema-constrained relation proposal (LLM-backed in production).
#[async_trait]
pub trait RelationProposer: Send + Sync {
    async fn propose_relations(&self, request: &ProposalRequest) -> Result<Vec<RelationProposal>>;
}

/// Pattern-based (OpenIE-style) triple extraction. Pure and synchronous.
pub trait TripleExtractor: Send + Sync {
    fn extract_triples(&self, text: &str) -> Vec<Triple>;
}
