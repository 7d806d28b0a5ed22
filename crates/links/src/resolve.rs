use model::KnowledgeGraphEdge;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Preference order between two edges competing for the same slot.
///
/// Higher confidence wins; equal confidence falls back to extractor
/// priority (schema-constrained beats pattern), then the
/// lexicographically smaller predicate, then the better-evidenced edge.
/// The order is total, so resolution never depends on arrival order.
fn prefer(a: &KnowledgeGraphEdge, b: &KnowledgeGraphEdge) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then_with(|| a.extracted_by.priority().cmp(&b.extracted_by.priority()))
        .then_with(|| b.predicate.cmp(&a.predicate))
        .then_with(|| a.evidence_spans.len().cmp(&b.evidence_spans.len()))
        .then_with(|| {
            let a_start = a.evidence_spans.first().map(|s| s.start_char);
            let b_start = b.evidence_spans.first().map(|s| s.start_char);
            b_start.cmp(&a_start)
        })
}

fn keep_best(group: Vec<KnowledgeGraphEdge>) -> Option<KnowledgeGraphEdge> {
    group.into_iter().reduce(|best, candidate| {
        if prefer(&candidate, &best) == Ordering::Greater {
            candidate
        } else {
            best
        }
    })
}

/// Resolve contradictions: edges sharing a `(source, target)` pair but
/// disagreeing on predicate collapse to the single preferred edge.
/// Groups with one predicate pass through untouched. Idempotent.
pub fn resolve_contradictions(edges: Vec<KnowledgeGraphEdge>) -> Vec<KnowledgeGraphEdge> {
    let mut groups: BTreeMap<(String, String), Vec<KnowledgeGraphEdge>> = BTreeMap::new();
    for edge in edges {
        groups
            .entry((edge.source_id.clone(), edge.target_id.clone()))
            .or_default()
            .push(edge);
    }

    let mut resolved = Vec::new();
    for (_, group) in groups {
        if distinct_predicates(&group) > 1 {
            if let Some(best) = keep_best(group) {
                resolved.push(best);
            }
        } else {
            resolved.extend(group);
        }
    }
    resolved
}

fn distinct_predicates(group: &[KnowledgeGraphEdge]) -> usize {
    let mut predicates: Vec<&str> = group.iter().map(|e| e.predicate.as_str()).collect();
    predicates.sort();
    predicates.dedup();
    predicates.len()
}

/// Resolve duplicates: edges identical on `(source, target, predicate)`
/// collapse to the single preferred edge. Idempotent.
pub fn resolve_duplicates(edges: Vec<KnowledgeGraphEdge>) -> Vec<KnowledgeGraphEdge> {
    let mut groups: BTreeMap<(String, String, String), Vec<KnowledgeGraphEdge>> = BTreeMap::new();
    for edge in edges {
        groups
            .entry((
                edge.source_id.clone(),
                edge.target_id.clone(),
                edge.predicate.clone(),
            ))
            .or_default()
            .push(edge);
    }

    groups.into_values().filter_map(keep_best).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ExtractorKind;

    fn edge(
        source: &str,
        target: &str,
        predicate: &str,
        confidence: f64,
        extracted_by: ExtractorKind,
    ) -> KnowledgeGraphEdge {
        KnowledgeGraphEdge::new(source, target, predicate, "dependency", confidence, extracted_by)
    }

    #[test]
    fn test_contradiction_keeps_highest_confidence() {
        let edges = vec![
            edge("a", "b", "depends_on", 0.9, ExtractorKind::SchemaLlm),
            edge("a", "b", "mitigates", 0.6, ExtractorKind::SchemaLlm),
        ];
        let resolved = resolve_contradictions(edges);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].predicate, "depends_on");
        assert_eq!(resolved[0].confidence, 0.9);
    }

    #[test]
    fn test_contradiction_tie_prefers_schema_extractor() {
        let edges = vec![
            edge("a", "b", "requires", 0.7, ExtractorKind::Pattern),
            edge("a", "b", "mitigates", 0.7, ExtractorKind::SchemaLlm),
        ];
        let resolved = resolve_contradictions(edges);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].predicate, "mitigates");
    }

    #[test]
    fn test_same_predicate_pairs_are_not_contradictions() {
        let edges = vec![
            edge("a", "b", "requires", 0.7, ExtractorKind::Pattern),
            edge("a", "b", "requires", 0.9, ExtractorKind::SchemaLlm),
            edge("a", "c", "requires", 0.5, ExtractorKind::Pattern),
        ];
        let resolved = resolve_contradictions(edges);
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn test_duplicates_keep_highest_confidence() {
        let edges = vec![
            edge("a", "b", "requires", 0.7, ExtractorKind::Pattern),
            edge("a", "b", "requires", 0.9, ExtractorKind::SchemaLlm),
        ];
        let resolved = resolve_duplicates(edges);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].confidence, 0.9);
        assert_eq!(resolved[0].extracted_by, ExtractorKind::SchemaLlm);
    }

    #[test]
    fn test_resolution_is_arrival_order_independent() {
        let forward = vec![
            edge("a", "b", "depends_on", 0.9, ExtractorKind::SchemaLlm),
            edge("a", "b", "mitigates", 0.6, ExtractorKind::Pattern),
            edge("c", "d", "requires", 0.8, ExtractorKind::SchemaLlm),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let from_forward = resolve_contradictions(forward);
        let from_backward = resolve_contradictions(backward);
        assert_eq!(from_forward.len(), from_backward.len());
        for (a, b) in from_forward.iter().zip(from_backward.iter()) {
            assert_eq!(a.source_id, b.source_id);
            assert_eq!(a.predicate, b.predicate);
            assert_eq!(a.confidence, b.confidence);
        }
    }

    #[test]
    fn test_both_passes_are_idempotent() {
        let edges = vec![
            edge("a", "b", "depends_on", 0.9, ExtractorKind::SchemaLlm),
            edge("a", "b", "mitigates", 0.6, ExtractorKind::Pattern),
            edge("a", "b", "depends_on", 0.5, ExtractorKind::Pattern),
            edge("c", "d", "requires", 0.8, ExtractorKind::SchemaLlm),
        ];

        let once = resolve_contradictions(edges.clone());
        let twice = resolve_contradictions(once.clone());
        assert_eq!(once.len(), twice.len());

        let once = resolve_duplicates(edges);
        let twice = resolve_duplicates(once.clone());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.predicate, b.predicate);
            assert_eq!(a.confidence, b.confidence);
        }
    }
}
