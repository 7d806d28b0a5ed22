use model::TaxonomyRelation;
use serde::{Deserialize, Serialize};

/// One category of permitted predicates, e.g. "dependency" covering
/// depends_on / requires / triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationCategory {
    pub name: String,
    pub predicates: Vec<String>,
}

/// Fixed vocabulary of relation types a proposer may draw from.
///
/// Constraining the label set is what suppresses hallucinated relation
/// names: anything outside the schema is either dropped or marked as not
/// schema-aligned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSchema {
    pub categories: Vec<RelationCategory>,
}

impl RelationSchema {
    /// Default schema for the regulatory/legal domain.
    pub fn default_regulatory() -> Self {
        let categories = [
            ("dependency", vec!["depends_on", "requires", "triggers"]),
            ("mitigation", vec!["mitigates", "controls", "reduces"]),
            ("supersession", vec!["supersedes", "replaces", "updates"]),
            ("definition", vec!["defines", "specifies", "describes"]),
            ("mapping", vec!["maps_to", "corresponds_to", "relates_to"]),
            ("semantic", vec!["related_to", "associated_with", "similar_to"]),
        ];
        Self {
            categories: categories
                .into_iter()
                .map(|(name, predicates)| RelationCategory {
                    name: name.to_string(),
                    predicates: predicates.into_iter().map(str::to_string).collect(),
                })
                .collect(),
        }
    }

    /// Schema used for taxonomy proposals: a single category holding the
    /// fixed hierarchical vocabulary.
    pub fn taxonomy() -> Self {
        Self {
            categories: vec![RelationCategory {
                name: "taxonomy".to_string(),
                predicates: TaxonomyRelation::ALL
                    .iter()
                    .map(|r| r.as_str().to_string())
                    .collect(),
            }],
        }
    }

    pub fn contains(&self, predicate: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.predicates.iter().any(|p| p == predicate))
    }

    /// Category name a predicate belongs to, if any.
    pub fn category_of(&self, predicate: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.predicates.iter().any(|p| p == predicate))
            .map(|c| c.name.as_str())
    }

    /// One "category: p1, p2, p3" line per category, for prompts.
    pub fn describe(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("{}: {}", c.name, c.predicates.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for RelationSchema {
    fn default() -> Self {
        Self::default_regulatory()
    }
}
