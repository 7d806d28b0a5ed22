use crate::{prompt, Embedder, ProposalRequest, RelationProposal, RelationProposer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Thin JSON-mode client for a local Ollama instance.
#[derive(Clone)]
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String, // "json" for structured output
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json".to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(body.response)
    }

    /// Generate, re-prompting once per attempt when the model returns
    /// invalid JSON.
    pub async fn generate_json_with_retry(&self, prompt: &str, max_retries: usize) -> Result<String> {
        for attempt in 0..max_retries {
            let response = self.generate(prompt).await?;

            if serde_json::from_str::<serde_json::Value>(&response).is_ok() {
                return Ok(response);
            }

            if attempt < max_retries - 1 {
                let retry_prompt = prompt::build_json_retry_prompt(&response);
                let corrected = self.generate(&retry_prompt).await?;
                if serde_json::from_str::<serde_json::Value>(&corrected).is_ok() {
                    return Ok(corrected);
                }
            }
        }

        anyhow::bail!("Failed to get valid JSON after {} retries", max_retries)
    }
}

impl Default for OllamaGenerator {
    fn default() -> Self {
        Self::new("http://localhost:11434", "llama3")
    }
}

/// Relation proposer backed by an Ollama generator.
///
/// Chooses the taxonomy or link-extraction prompt based on the request
/// schema and parses the constrained JSON response.
#[derive(Clone)]
pub struct OllamaProposer {
    generator: OllamaGenerator,
    json_retries: usize,
}

#[derive(Deserialize)]
struct ProposalEnvelope {
    #[serde(default)]
    relations: Vec<WireProposal>,
}

#[derive(Deserialize)]
struct WireProposal {
    source: String,
    target: String,
    predicate: String,
    evidence_text: String,
    #[serde(alias = "evidence_start_char", default)]
    start_char: usize,
    #[serde(alias = "evidence_end_char", default)]
    end_char: usize,
    #[serde(alias = "evidence_page_number", default = "default_page")]
    page_number: u32,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_page() -> u32 {
    1
}

fn default_confidence() -> f64 {
    0.5
}

impl OllamaProposer {
    pub fn new(generator: OllamaGenerator) -> Self {
        Self {
            generator,
            json_retries: 3,
        }
    }

    /// Accepts either `{"relations": [...]}` or a bare JSON array.
    pub fn parse_proposals(json_str: &str) -> Result<Vec<RelationProposal>> {
        let wire: Vec<WireProposal> = match serde_json::from_str::<ProposalEnvelope>(json_str) {
            Ok(envelope) => envelope.relations,
            Err(_) => serde_json::from_str(json_str).context("Failed to parse proposal response")?,
        };

        Ok(wire
            .into_iter()
            .map(|w| RelationProposal {
                source: w.source,
                target: w.target,
                predicate: w.predicate,
                evidence_text: w.evidence_text,
                start_char: w.start_char,
                end_char: w.end_char,
                page_number: w.page_number,
                confidence: w.confidence.clamp(0.0, 1.0),
            })
            .collect())
    }

    fn is_taxonomy_request(request: &ProposalRequest) -> bool {
        request
            .schema
            .categories
            .iter()
            .all(|c| c.name == "taxonomy")
    }
}

#[async_trait]
impl RelationProposer for OllamaProposer {
    async fn propose_relations(&self, request: &ProposalRequest) -> Result<Vec<RelationProposal>> {
        let prompt_text = if Self::is_taxonomy_request(request) {
            prompt::build_taxonomy_prompt(request)
        } else {
            prompt::build_relation_prompt(request)
        };

        let json_str = self
            .generator
            .generate_json_with_retry(&prompt_text, self.json_retries)
            .await
            .context("Relation proposal call failed")?;

        Self::parse_proposals(&json_str)
    }
}

/// Embedding client for Ollama's embeddings endpoint.
#[derive(Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let request = EmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Embedding request failed: {}", response.status());
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        Ok(body.embedding)
    }
}

impl Default for OllamaEmbedder {
    fn default() -> Self {
        Self::new("http://localhost:11434", "llama3")
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proposals_envelope() {
        let json = r#"{"relations": [{"source": "a", "target": "b", "predicate": "requires",
            "evidence_text": "a requires b", "start_char": 0, "end_char": 12,
            "page_number": 2, "confidence": 0.8}]}"#;
        let proposals = OllamaProposer::parse_proposals(json).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].predicate, "requires");
        assert_eq!(proposals[0].page_number, 2);
    }

    #[test]
    fn test_parse_proposals_bare_array_and_aliases() {
        let json = r#"[{"source": "a", "target": "b", "predicate": "is_a",
            "evidence_text": "quote", "evidence_start_char": 3, "evidence_end_char": 8,
            "evidence_page_number": 4, "confidence": 1.5}]"#;
        let proposals = OllamaProposer::parse_proposals(json).unwrap();
        assert_eq!(proposals[0].start_char, 3);
        assert_eq!(proposals[0].end_char, 8);
        assert_eq!(proposals[0].page_number, 4);
        // out-of-range confidence is clamped
        assert_eq!(proposals[0].confidence, 1.0);
    }

    #[test]
    fn test_parse_proposals_empty_envelope() {
        let proposals = OllamaProposer::parse_proposals(r#"{"relations": []}"#).unwrap();
        assert!(proposals.is_empty());
    }
}
