pub mod concept;
pub mod edge;
pub mod evidence;
pub mod output;
pub mod tree;

pub use concept::{concept_id, ConceptEntry};
pub use edge::{ExtractorKind, KnowledgeGraphEdge, TaxonomyEdge, TaxonomyRelation};
pub use evidence::{verify_span, EvidenceSpan};
pub use output::ExtractionPipelineOutput;
pub use tree::{DocumentTreeNode, NodeType};
