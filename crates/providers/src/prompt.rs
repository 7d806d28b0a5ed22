use crate::ProposalRequest;

/// Prompt for schema-constrained relation extraction over document text.
pub fn build_relation_prompt(request: &ProposalRequest) -> String {
    format!(
        r#"Extract relationships between concepts from this text.

{context}

Allowed relation types (by category):
{schema}

Requirements:
1. Extract only relationships explicitly stated in the text
2. For each relationship, provide exact quoted evidence text
3. Include character offsets (start_char, end_char) for the evidence
4. Assign a confidence score (0.0-1.0)
5. Use concept IDs where given, not terms

Output ONLY a JSON object with this shape, no markdown, no explanations:
{{
  "relations": [
    {{"source": "...", "target": "...", "predicate": "...", "evidence_text": "...", "start_char": 0, "end_char": 0, "page_number": 1, "confidence": 0.0}}
  ]
}}

Do not invent relationships. Only extract what is explicitly stated.
If nothing qualifies, return {{"relations": []}}.

JSON OUTPUT:"#,
        context = request.context,
        schema = request.schema.describe(),
    )
}

/// Prompt for taxonomy relation proposal over candidate concept pairs.
///
/// `source` in the response is the parent concept, `target` the child.
pub fn build_taxonomy_prompt(request: &ProposalRequest) -> String {
    format!(
        r#"Analyze these concept pairs and propose taxonomy relationships.

{context}

Allowed relationship types:
{schema}

For each pair:
1. Determine whether a hierarchical relationship exists
2. Identify the relationship type (parent is "source", child is "target")
3. Find an exact quoted evidence span supporting the relationship
4. Assign a confidence score (0.0-1.0)

Output ONLY a JSON object with this shape, no markdown, no explanations:
{{
  "relations": [
    {{"source": "...", "target": "...", "predicate": "...", "evidence_text": "...", "start_char": 0, "end_char": 0, "page_number": 1, "confidence": 0.0}}
  ]
}}

Only propose relationships with strong evidence. If uncertain about a pair,
skip it entirely rather than guessing.

JSON OUTPUT:"#,
        context = request.context,
        schema = request.schema.describe(),
    )
}

pub fn build_json_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid:

{invalid_json}

Fix this JSON. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
    )
}
