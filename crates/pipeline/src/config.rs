use concepts::ConceptBuilderConfig;
use links::LinkExtractorConfig;
use providers::RetryPolicy;
use serde::{Deserialize, Serialize};
use taxonomy::TaxonomyBuilderConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Require evidence spans on every concept and edge
    pub require_evidence: bool,
    /// Edges below this confidence are reported and excluded from the
    /// final output
    pub min_confidence: f64,
    /// Word-overlap threshold for synonym merging
    pub similarity_threshold: f64,
    pub use_pattern_extraction: bool,
    pub use_schema_extraction: bool,
    /// Taxonomy pair batch size; a prompt-size knob, not a semantic one
    pub pair_batch_size: usize,
    /// Link-extraction node batch size
    pub node_batch_size: usize,
    pub max_candidates_per_concept: usize,
    pub max_prompt_concepts: usize,
    pub cluster: ClusterConfig,
    pub retry: RetryConfig,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub eps: f64,
    pub min_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            require_evidence: true,
            min_confidence: 0.3,
            similarity_threshold: 0.7,
            use_pattern_extraction: true,
            use_schema_extraction: true,
            pair_batch_size: 10,
            node_batch_size: 5,
            max_candidates_per_concept: 3,
            max_prompt_concepts: 50,
            cluster: ClusterConfig {
                eps: 0.3,
                min_samples: 2,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
            call_timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
            self.call_timeout_secs,
        )
    }

    pub fn concept_config(&self) -> ConceptBuilderConfig {
        ConceptBuilderConfig {
            require_evidence: self.require_evidence,
            similarity_threshold: self.similarity_threshold,
        }
    }

    pub fn taxonomy_config(&self) -> TaxonomyBuilderConfig {
        TaxonomyBuilderConfig {
            require_evidence: self.require_evidence,
            pair_batch_size: self.pair_batch_size,
            max_candidates_per_concept: self.max_candidates_per_concept,
        }
    }

    pub fn link_config(&self) -> LinkExtractorConfig {
        LinkExtractorConfig {
            node_batch_size: self.node_batch_size,
            max_prompt_concepts: self.max_prompt_concepts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_knobs() {
        let config = PipelineConfig::default();
        assert!(config.require_evidence);
        assert_eq!(config.min_confidence, 0.3);
        assert_eq!(config.pair_batch_size, 10);
        assert_eq!(config.node_batch_size, 5);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cluster.min_samples, 2);
        assert_eq!(back.retry.max_retries, 3);
    }
}
