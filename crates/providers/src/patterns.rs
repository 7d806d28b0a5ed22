use crate::{CandidateExtractor, CandidateTerm, Triple, TripleExtractor};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;

/// Lexical pattern rule mapping a surface form to a canonical predicate.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub predicate: String,
    pub surface: String,
}

impl PatternRule {
    pub fn new(predicate: impl Into<String>, surface: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            surface: surface.into(),
        }
    }
}

/// Deterministic pattern-based triple extractor.
///
/// Scans sentence-bounded text for "X <verb phrase> Y" patterns. High
/// recall, low precision; callers assign it a lower fixed confidence than
/// schema-constrained extraction.
pub struct PatternTripleExtractor {
    rules: Vec<(PatternRule, Regex)>,
}

impl PatternTripleExtractor {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        let compiled = rules
            .into_iter()
            .filter_map(|rule| {
                // Subject is lazy so it stops at the verb; both captures are
                // bounded by sentence punctuation.
                let pattern = format!(r"(?i)([^.!?\n]+?)\s+{}\s+([^.!?\n]+)", rule.surface);
                match Regex::new(&pattern) {
                    Ok(re) => Some((rule, re)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unparseable pattern rule");
                        None
                    }
                }
            })
            .collect();
        Self { rules: compiled }
    }

    /// Default rule set covering the dependency, mitigation, supersession,
    /// definition and mapping categories of the regulatory schema.
    pub fn default_rules() -> Vec<PatternRule> {
        vec![
            PatternRule::new("depends_on", r"depends\s+on"),
            PatternRule::new("requires", "requires"),
            PatternRule::new("triggers", "triggers"),
            PatternRule::new("mitigates", "mitigates"),
            PatternRule::new("defines", "defines"),
            PatternRule::new("supersedes", "supersedes"),
            PatternRule::new("maps_to", r"maps\s+to"),
        ]
    }
}

impl Default for PatternTripleExtractor {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

impl TripleExtractor for PatternTripleExtractor {
    fn extract_triples(&self, text: &str) -> Vec<Triple> {
        let mut triples = Vec::new();

        for (rule, re) in &self.rules {
            for caps in re.captures_iter(text) {
                let (Some(subj), Some(obj)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };

                let subj_text = subj.as_str();
                let obj_text = obj.as_str();
                let subj_lead = subj_text.len() - subj_text.trim_start().len();
                let obj_trail = obj_text.len() - obj_text.trim_end().len();

                let subject = subj_text.trim().to_string();
                let object = obj_text.trim().to_string();
                if subject.is_empty() || object.is_empty() {
                    continue;
                }

                triples.push(Triple {
                    subject,
                    relation: rule.predicate.clone(),
                    object,
                    start_char: subj.start() + subj_lead,
                    end_char: obj.end() - obj_trail,
                });
            }
        }

        // Rule iteration order must not leak into the output order
        triples.sort_by(|a, b| {
            a.start_char
                .cmp(&b.start_char)
                .then_with(|| a.relation.cmp(&b.relation))
        });
        triples
    }
}

/// Deterministic keyphrase-based candidate extractor.
///
/// A reference stand-in for NER/keyphrase models: picks up terms that are
/// the subject of a definitional sentence, plus capitalized phrases.
pub struct KeyphraseCandidateExtractor {
    definitional: Regex,
    capitalized: Regex,
    stopwords: HashSet<&'static str>,
}

impl KeyphraseCandidateExtractor {
    pub fn new() -> Self {
        Self {
            definitional: Regex::new(
                r"\b([A-Za-z][A-Za-z0-9\- ]{1,58}?)\s+(?:is defined as|refers to|means|is|are)\s+",
            )
            .expect("definitional pattern is valid"),
            capitalized: Regex::new(r"\b([A-Z][A-Za-z0-9\-]+(?:\s+[A-Z][A-Za-z0-9\-]+)*)\b")
                .expect("capitalized pattern is valid"),
            stopwords: [
                "the", "this", "that", "these", "those", "a", "an", "it", "its", "in", "on", "if",
                "for", "and", "or", "but", "when", "where", "while", "however", "therefore",
            ]
            .into_iter()
            .collect(),
        }
    }

    fn is_stopword(&self, term: &str) -> bool {
        self.stopwords.contains(term.to_lowercase().as_str())
    }
}

impl Default for KeyphraseCandidateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandidateExtractor for KeyphraseCandidateExtractor {
    async fn extract_candidates(&self, text: &str) -> Result<Vec<CandidateTerm>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        // Definitional subjects first: they carry the stronger signal
        for caps in self.definitional.captures_iter(text) {
            if let Some(term) = caps.get(1) {
                let term = term.as_str().trim();
                if term.is_empty() || self.is_stopword(term) {
                    continue;
                }
                if seen.insert(term.to_lowercase()) {
                    candidates.push(CandidateTerm {
                        term: term.to_string(),
                        category: "concept".to_string(),
                        confidence: 0.7,
                    });
                }
            }
        }

        for caps in self.capitalized.captures_iter(text) {
            if let Some(term) = caps.get(1) {
                let term = term.as_str().trim();
                if term.is_empty() || self.is_stopword(term) {
                    continue;
                }
                if seen.insert(term.to_lowercase()) {
                    candidates.push(CandidateTerm {
                        term: term.to_string(),
                        category: "entity".to_string(),
                        confidence: 0.5,
                    });
                }
            }
        }

        Ok(candidates)
    }
}
