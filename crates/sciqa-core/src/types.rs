//! Domain types shared by ingestion, retrieval and answer synthesis.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::identity;

/// Delimiter between the provenance header lines and the chunk body in `text`.
pub const HEADER_DELIMITER: char = '\n';
/// Number of header lines (`section path`, `url | pmcid | PMID | DOI`) before the body.
pub const HEADER_LINES: usize = 2;

pub type ChunkId = String;

/// Kind of extracted unit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    #[default]
    Paragraph,
    Caption,
    Table,
}

/// One line of a corpus JSONL file as produced by the document parser.
///
/// - `id`: `{pmcid}:{section-slug}:{hash}`, see [`identity::chunk_id`]
/// - `section`/`section_path`: short label and full `Title — Section` path
/// - `text`: provenance header followed by the body, see [`ChunkRecord::body`]
/// - `url`/`pmcid`/`pmid`/`doi`: provenance, immutable once ingested
/// - `image_hrefs`: figure images (captions only)
///
/// Fields this struct does not know about are kept in `extra` so the stored
/// payload is always the full record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    #[serde(default)]
    pub id: ChunkId,
    #[serde(default)]
    pub kind: ChunkKind,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub section_path: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pmcid: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub pmid: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub doi: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_hrefs: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChunkRecord {
    /// Body text with the provenance header stripped.
    ///
    /// Everything after the second newline. A two-line text keeps only its last
    /// line; a single-line text is returned whole.
    pub fn body(&self) -> &str {
        strip_header(&self.text)
    }

    /// Fill `id` from [`identity::chunk_id`] when the parser left it empty.
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = identity::chunk_id(&self.pmcid, &self.section_path, self.body());
        }
    }

    /// Storage key. Matches the key after [`ChunkRecord::ensure_id`] for records without an id.
    pub fn point_id(&self) -> Uuid {
        if self.id.is_empty() {
            identity::point_id(&identity::chunk_id(&self.pmcid, &self.section_path, self.body()))
        } else {
            identity::point_id(&self.id)
        }
    }

    /// Full record as a JSON object, used as the store payload.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Strip the leading provenance header from a stored chunk text.
pub fn strip_header(text: &str) -> &str {
    text.splitn(HEADER_LINES + 1, HEADER_DELIMITER).last().unwrap_or(text)
}

/// Term-index → weight map stored as parallel arrays, sorted by index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Build from unordered pairs; drops non-positive weights and keeps the
    /// largest weight when an index repeats.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f32)>) -> Self {
        let mut items: Vec<(u32, f32)> = pairs.into_iter().filter(|(_, w)| *w > 0.0 && w.is_finite()).collect();
        items.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.total_cmp(&a.1)));
        items.dedup_by_key(|(i, _)| *i);
        let (indices, values) = items.into_iter().unzip();
        Self { indices, values }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product against another sorted sparse vector.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut acc) = (0usize, 0usize, 0f32);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }
}

/// Chunk plus both vectors computed by the dual encoder.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub record: ChunkRecord,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

impl EncodedChunk {
    pub fn into_point(self) -> Point {
        Point {
            id: self.record.point_id(),
            payload: self.record.to_payload(),
            dense: self.dense,
            sparse: self.sparse,
        }
    }
}

/// The unit written to a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: Uuid,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub payload: Value,
}

/// Raw result of a fused search. `score` is the fused rank score, higher is better.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: Value,
}

/// One retrieved passage handed to the synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub chunk_id: String,
    pub score: f32,
    pub text: String,
    pub section: String,
    pub full_payload: Value,
}

impl RetrievedDocument {
    fn payload_str(&self, key: &str) -> Option<&str> {
        self.full_payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Source URL from the stored record.
    pub fn url(&self) -> Option<&str> {
        self.payload_str("url")
    }

    /// Domain chunk id (`pmcid:slug:hash`) from the stored record.
    pub fn citation_id(&self) -> Option<&str> {
        self.payload_str("id")
    }

    pub fn kind(&self) -> ChunkKind {
        self.full_payload
            .get("kind")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn image_hrefs(&self) -> Vec<String> {
        self.full_payload
            .get("image_hrefs")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// A cited source. Shape A carries only `url`; Shape B adds `id` and `why_relevant`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_relevant: Option<String>,
}

impl Citation {
    pub fn url(url: impl Into<String>) -> Self {
        Self { id: None, url: url.into(), why_relevant: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageCitation {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default, alias = "caption_or_alt", alias = "why_relevant")]
    pub caption: String,
}

/// How an answer was produced; lets monitoring tell an honest low-confidence
/// answer apart from a broken pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Grounded,
    InsufficientContext,
    ParseFailure,
    DirectKnowledge,
    Unavailable,
}

/// Citation problem found by the conformance checker. Advisory only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum IntegrityViolation {
    /// `[n]` in the answer has no `citations[n-1]`.
    DanglingMarker { marker: usize },
    /// Markers do not first appear in the order 1, 2, 3, ...
    OutOfOrder { expected: usize, found: usize },
    /// Citation URL is not among the retrieved documents.
    UnknownUrl { index: usize, url: String },
    /// Citation never referenced by a marker.
    Unreferenced { index: usize },
}

/// Canonical answer produced once per query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub answer_markdown: String,
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub image_citations: Vec<ImageCitation>,
    #[serde(default)]
    pub image_keywords: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// 0–100.
    pub confidence_score: u8,
    #[serde(default)]
    pub used_context_ids: Vec<String>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<IntegrityViolation>,
}

impl AnswerResult {
    /// Answer with no citations and zero confidence.
    pub fn bare(answer_markdown: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            answer_markdown: answer_markdown.into(),
            citations: Vec::new(),
            image_citations: Vec::new(),
            image_keywords: Vec::new(),
            image_urls: Vec::new(),
            confidence_score: 0,
            used_context_ids: Vec::new(),
            outcome,
            violations: Vec::new(),
        }
    }

    /// Shape B's boolean view of the score.
    pub fn confident(&self) -> bool {
        self.confidence_score >= CONFIDENT_THRESHOLD
    }

    pub fn citation_urls(&self) -> Vec<&str> {
        self.citations.iter().map(|c| c.url.as_str()).collect()
    }
}

/// Scores at or above this map to `confident: true`.
pub const CONFIDENT_THRESHOLD: u8 = 50;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_strips_two_header_lines() {
        let rec = ChunkRecord {
            text: "Title — Results\nhttps://x | PMC1 | PMID:1 | DOI:d\nMice lost bone.\nSecond line.".into(),
            ..Default::default()
        };
        assert_eq!(rec.body(), "Mice lost bone.\nSecond line.");
        assert_eq!(strip_header("no header"), "no header");
        assert_eq!(strip_header("title\nbody"), "body");
        assert_eq!(strip_header("a\nb\n"), "");
    }

    #[test]
    fn point_id_is_stable_across_ensure_id() {
        let mut rec = ChunkRecord {
            pmcid: "PMC9".into(),
            section_path: "T — Methods".into(),
            text: "T — Methods\nhttps://x | PMC9\nRats were flown.".into(),
            ..Default::default()
        };
        let before = rec.point_id();
        rec.ensure_id();
        assert!(rec.id.starts_with("PMC9:methods:"));
        assert_eq!(rec.point_id(), before);
        assert_eq!(before, identity::point_id(&rec.id));
    }

    #[test]
    fn record_round_trips_unknown_fields() {
        let line = r#"{"id":"PMC1:intro:abcd1234","kind":"caption","section":"Intro","section_path":"T — Intro","text":"a\nb\nc","url":"https://u","pmcid":"PMC1","pmid":null,"doi":"10.1/x","image_hrefs":["https://i.jpg"],"fig_id":"01"}"#;
        let rec: ChunkRecord = serde_json::from_str(line).unwrap();
        assert_eq!(rec.kind, ChunkKind::Caption);
        assert_eq!(rec.pmid, "");
        let payload = rec.to_payload();
        assert_eq!(payload["fig_id"], "01");
        assert_eq!(payload["image_hrefs"][0], "https://i.jpg");
    }

    #[test]
    fn sparse_from_pairs_sorts_and_drops_non_positive() {
        let v = SparseVector::from_pairs([(9, 0.5), (2, 1.0), (4, 0.0), (2, 0.3), (7, -1.0)]);
        assert_eq!(v.indices, vec![2, 9]);
        assert_eq!(v.values, vec![1.0, 0.5]);
    }

    #[test]
    fn sparse_dot_only_counts_shared_terms() {
        let a = SparseVector::from_pairs([(1, 2.0), (3, 1.0)]);
        let b = SparseVector::from_pairs([(3, 4.0), (5, 1.0)]);
        assert!((a.dot(&b) - 4.0).abs() < 1e-6);
    }
}
