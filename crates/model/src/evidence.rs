use serde::{Deserialize, Serialize};

/// Exact text location supporting an extraction.
///
/// Every relationship and taxonomy edge carries at least one of these so
/// that each fact can be traced back to the source document. Offsets are
/// byte offsets into the document's UTF-8 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    /// Exact quoted text from the document
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub page_number: u32,
    /// Section/node ID if available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    /// Confidence in span accuracy, 0.0-1.0
    pub confidence: f64,
}

impl EvidenceSpan {
    pub fn new(
        text: impl Into<String>,
        start_char: usize,
        end_char: usize,
        page_number: u32,
    ) -> Self {
        Self {
            text: text.into(),
            start_char,
            end_char,
            page_number,
            section_id: None,
            confidence: 0.5,
        }
    }

    pub fn with_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Check that a span quotes the document exactly at its claimed offsets.
///
/// This is the structural guard against fabricated provenance: a component
/// that cannot produce a span passing this check must not emit the
/// associated fact. Inverted offsets or offsets that do not land on UTF-8
/// boundaries fail the check rather than panic.
pub fn verify_span(document_text: &str, span: &EvidenceSpan) -> bool {
    if span.start_char >= span.end_char {
        return false;
    }
    match document_text.get(span.start_char..span.end_char) {
        Some(slice) => slice == span.text,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_span_exact_match() {
        let doc = "GDPR requires data protection.";
        let span = EvidenceSpan::new("requires data", 5, 18, 1);
        assert!(verify_span(doc, &span));
    }

    #[test]
    fn test_verify_span_text_mismatch() {
        let doc = "GDPR requires data protection.";
        let span = EvidenceSpan::new("mandates data", 5, 18, 1);
        assert!(!verify_span(doc, &span));
    }

    #[test]
    fn test_verify_span_inverted_offsets() {
        let doc = "GDPR requires data protection.";
        let span = EvidenceSpan::new("", 10, 10, 1);
        assert!(!verify_span(doc, &span));
        let span = EvidenceSpan::new("x", 12, 4, 1);
        assert!(!verify_span(doc, &span));
    }

    #[test]
    fn test_verify_span_out_of_bounds() {
        let doc = "short";
        let span = EvidenceSpan::new("shortish", 0, 8, 1);
        assert!(!verify_span(doc, &span));
    }

    #[test]
    fn test_verify_span_non_boundary_offset() {
        // 'é' is two bytes; slicing into the middle must fail, not panic
        let doc = "café requires milk";
        let span = EvidenceSpan::new("caf", 0, 4, 1);
        assert!(!verify_span(doc, &span));
    }
}
