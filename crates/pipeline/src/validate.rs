use model::{KnowledgeGraphEdge, TaxonomyEdge};
use std::collections::{HashMap, HashSet};

/// Result of the aggregate validation pass: the surviving edges plus one
/// diagnostic per violation found.
pub struct ValidationOutcome {
    pub taxonomy_edges: Vec<TaxonomyEdge>,
    pub kg_edges: Vec<KnowledgeGraphEdge>,
    pub errors: Vec<String>,
}

/// Walk the aggregate output and enforce evidence, confidence and
/// structural policy.
///
/// Evidence and confidence violations exclude the edge from the final
/// collections; each exclusion is reported so operators can inspect
/// near-threshold cases. Cycle breaking admits taxonomy edges in
/// descending confidence order and drops any edge that would close a
/// cycle. Surviving contradictions among kg edges are reported but left
/// alone, since the link extractor already ran its resolution passes.
pub fn validate(
    taxonomy_edges: Vec<TaxonomyEdge>,
    kg_edges: Vec<KnowledgeGraphEdge>,
    require_evidence: bool,
    min_confidence: f64,
) -> ValidationOutcome {
    let mut errors = Vec::new();

    let mut kept_taxonomy = Vec::new();
    for edge in taxonomy_edges {
        if require_evidence && edge.evidence_spans.is_empty() {
            errors.push(format!(
                "taxonomy edge {}->{} missing evidence",
                edge.parent_id, edge.child_id
            ));
            continue;
        }
        if edge.confidence < min_confidence {
            errors.push(format!(
                "taxonomy edge {}->{} below confidence threshold ({:.2} < {:.2})",
                edge.parent_id, edge.child_id, edge.confidence, min_confidence
            ));
            continue;
        }
        kept_taxonomy.push(edge);
    }

    let kept_taxonomy = break_cycles(kept_taxonomy, &mut errors);

    let mut kept_kg = Vec::new();
    for edge in kg_edges {
        if require_evidence && edge.evidence_spans.is_empty() {
            errors.push(format!(
                "kg edge {}->{} missing evidence",
                edge.source_id, edge.target_id
            ));
            continue;
        }
        if edge.confidence < min_confidence {
            errors.push(format!(
                "kg edge {}->{} below confidence threshold ({:.2} < {:.2})",
                edge.source_id, edge.target_id, edge.confidence, min_confidence
            ));
            continue;
        }
        kept_kg.push(edge);
    }

    report_contradictions(&kept_kg, &mut errors);

    ValidationOutcome {
        taxonomy_edges: kept_taxonomy,
        kg_edges: kept_kg,
        errors,
    }
}

/// Admit edges in descending confidence order (ties broken by parent then
/// child id) and drop any edge that would close a cycle in the aggregate
/// parent→child graph, recording one diagnostic per dropped edge.
fn break_cycles(edges: Vec<TaxonomyEdge>, errors: &mut Vec<String>) -> Vec<TaxonomyEdge> {
    let mut order: Vec<usize> = (0..edges.len()).collect();
    order.sort_by(|&a, &b| {
        edges[b]
            .confidence
            .total_cmp(&edges[a].confidence)
            .then_with(|| edges[a].parent_id.cmp(&edges[b].parent_id))
            .then_with(|| edges[a].child_id.cmp(&edges[b].child_id))
    });

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut dropped: HashSet<usize> = HashSet::new();

    for &idx in &order {
        let edge = &edges[idx];
        if reachable(&children, &edge.child_id, &edge.parent_id) {
            errors.push(format!(
                "taxonomy edge {}->{} would create a cycle; dropped",
                edge.parent_id, edge.child_id
            ));
            dropped.insert(idx);
            continue;
        }
        children
            .entry(edge.parent_id.as_str())
            .or_default()
            .push(edge.child_id.as_str());
    }

    edges
        .iter()
        .enumerate()
        .filter(|(idx, _)| !dropped.contains(idx))
        .map(|(_, e)| e.clone())
        .collect()
}

/// Depth-first reachability in the parent→child graph.
fn reachable(children: &HashMap<&str, Vec<&str>>, from: &str, to: &str) -> bool {
    if from == to {
        return true;
    }
    let mut stack = vec![from];
    let mut visited: HashSet<&str> = HashSet::new();
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = children.get(node) {
            for &child in next {
                if child == to {
                    return true;
                }
                stack.push(child);
            }
        }
    }
    false
}

fn report_contradictions(edges: &[KnowledgeGraphEdge], errors: &mut Vec<String>) {
    let mut predicates: HashMap<(&str, &str), HashSet<&str>> = HashMap::new();
    for edge in edges {
        predicates
            .entry((edge.source_id.as_str(), edge.target_id.as_str()))
            .or_default()
            .insert(edge.predicate.as_str());
    }
    let mut conflicting: Vec<(&str, &str)> = predicates
        .into_iter()
        .filter(|(_, preds)| preds.len() > 1)
        .map(|(pair, _)| pair)
        .collect();
    conflicting.sort();
    for (source, target) in conflicting {
        errors.push(format!(
            "unresolved contradiction between {source} and {target}"
        ));
    }
}
