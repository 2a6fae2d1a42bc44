//! Grounded-answer prompt: numbered context blocks, the question, then the
//! output contract for the configured wire shape.

use std::fmt::Write;

use sciqa_core::config::WireShape;
use sciqa_core::types::RetrievedDocument;

/// Returned without calling the model when retrieval found nothing.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the knowledge base to answer your question.";

const MISSING_URL: &str = "N/A";

const PREAMBLE: &str = "You are a RAG answerer. Your job is to answer the user's question ONLY using the provided CONTEXT.
If the context is insufficient, say so clearly and suggest what information is missing.";

const COMMON_RULES: &str = "Rules:
1) Cite every non-trivial claim with inline numeric citations like [1], [2], [3].
2) Each citation number must correspond to the ORDER of the \"citations\" array (first entry = [1], second entry = [2], etc.).
3) Use separate brackets for each citation: [1], [2], [3] NOT [1,2,3].
4) If you used any chunks of kind \"caption\" to support the answer, include their image URLs (ending with .jpg) in \"image_citations\".
5) NEVER invent sources or URLs. Use ONLY the URLs from the \"URL\" field in the context.
6) DO NOT extract URLs from the content text for regular citations (DOIs, PubMed links, etc.).
7) Citations are per URL, not per chunk: the same URL gets exactly one citation number.
8) Only include URLs that were actually used to support your answer.
9) Use double line breaks (\\n\\n) between paragraphs.
10) No hidden reasoning or chain-of-thought in the output.";

const SHAPE_A_CONTRACT: &str = r#"11) Provide a confidence score from 0-100 for the answer quality.
12) Include keywords that could be used to search for related images.

Output format (JSON):
{
  "answer_markdown": "Answer with inline [1], [2] citations.",
  "citations": ["https://example.com/paper1", "https://example.com/paper2"],
  "image_citations": [{"id": "ctx-id", "url": "https://...jpg", "caption_or_alt": "short description"}],
  "image_keywords": ["microgravity effects", "space biology"],
  "confidence_score": 85
}"#;

const SHAPE_B_CONTRACT: &str = r#"11) Say whether the context was sufficient with the boolean "confident".
12) List the Citation IDs of every context block you used in "used_context_ids".

Output format (JSON):
{
  "answer_markdown": "Answer with inline [1], [2] citations.",
  "citations": [{"id": "citation id", "url": "https://example.com/paper1", "why_relevant": "specific reason"}],
  "image_citations": [{"id": "ctx-id", "url": "https://...jpg", "caption_or_alt": "short description"}],
  "used_context_ids": ["citation id"],
  "confident": true
}"#;

const VALIDATION: &str = "Validation:
- Every [n] in answer_markdown must have a matching entry in \"citations\" at position n-1.
- URLs must come from CONTEXT exactly (no rewriting).
- \"citations\" contains only unique URLs in the order they first appear in the answer.
- Output MUST be valid JSON only, with no text before or after it.";

/// One context block per document, numbered from 1.
pub fn format_context(docs: &[RetrievedDocument]) -> String {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        let n = i + 1;
        let citation_id = doc.citation_id().map_or_else(|| format!("ctx-{n}"), str::to_string);
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(
            out,
            "Context {n}:\nCitation ID: {citation_id}\nKind: {kind:?}\nText: {text}\nURL: {url}\nSection: {section}\nDocument ID: {doc_id}",
            kind = doc.kind(),
            text = doc.text,
            url = doc.url().unwrap_or(MISSING_URL),
            section = doc.section,
            doc_id = doc.chunk_id,
        );
    }
    out
}

pub fn build_prompt(question: &str, docs: &[RetrievedDocument], shape: WireShape) -> String {
    let contract = match shape {
        WireShape::Urls => SHAPE_A_CONTRACT,
        WireShape::Objects => SHAPE_B_CONTRACT,
    };
    format!(
        "{PREAMBLE}\n\nCONTEXT INFORMATION:\n{context}\n\nQUESTION: {question}\n\n{COMMON_RULES}\n{contract}\n\n{VALIDATION}",
        context = format_context(docs),
    )
}
