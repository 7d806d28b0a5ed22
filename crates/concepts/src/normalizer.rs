use regex::Regex;
use std::collections::HashMap;

/// Canonicalizes term surface forms and folds near-duplicates together.
///
/// Two terms are judged equivalent when one contains the other after
/// normalization (handles "AI" vs "AI systems") or when multi-word terms
/// share most of their words.
pub struct TermNormalizer {
    /// Maps normalized form -> canonical normalized form
    aliases: HashMap<String, String>,
    overlap_threshold: f64,
    punct: Regex,
    whitespace: Regex,
}

impl TermNormalizer {
    pub fn new(overlap_threshold: f64) -> Self {
        Self {
            aliases: HashMap::new(),
            overlap_threshold,
            punct: Regex::new(r"[.,!?;:']").expect("punctuation pattern is valid"),
            whitespace: Regex::new(r"\s+").expect("whitespace pattern is valid"),
        }
    }

    /// Normalize a term and resolve it to the canonical form of any
    /// previously seen equivalent term.
    pub fn normalize(&mut self, name: &str) -> String {
        let mut normalized = name.to_lowercase().trim().to_string();
        normalized = self.punct.replace_all(&normalized, "").to_string();
        normalized = self.whitespace.replace_all(&normalized, " ").to_string();

        if let Some(canonical) = self.aliases.get(&normalized) {
            return canonical.clone();
        }

        let mut found_canonical = None;
        for (existing_norm, canonical) in &self.aliases {
            if self.are_similar(&normalized, existing_norm) {
                found_canonical = Some(canonical.clone());
                break;
            }
        }

        if let Some(canonical) = found_canonical {
            self.aliases.insert(normalized, canonical.clone());
            return canonical;
        }

        self.aliases.insert(normalized.clone(), normalized.clone());
        normalized
    }

    fn are_similar(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }

        if a.contains(b) || b.contains(a) {
            return true;
        }

        let words_a: Vec<&str> = a.split_whitespace().collect();
        let words_b: Vec<&str> = b.split_whitespace().collect();

        if words_a.len() > 1 && words_b.len() > 1 {
            let common = words_a.iter().filter(|w| words_b.contains(w)).count();
            let total = words_a.len().max(words_b.len());
            return common as f64 / total as f64 > self.overlap_threshold;
        }

        false
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }
}
