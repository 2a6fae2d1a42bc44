//! The two answer shapes a deployment can speak, and adapters between them
//! and the canonical [`AnswerResult`].
//!
//! Shape A: URL-string citations, `image_keywords`, integer `confidence_score`.
//! Shape B: `{id,url,why_relevant}` citations, `used_context_ids`, boolean `confident`.
//! Parsing is strict about the configured shape's required fields; citation
//! lists are accepted in either representation.

use sciqa_core::config::WireShape;
use sciqa_core::types::{AnswerResult, Citation, ImageCitation, CONFIDENT_THRESHOLD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reconcile::{reconcile_citations, reconcile_images};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireImageCitation {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub caption_or_alt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShapeA {
    pub answer_markdown: String,
    pub citations: Vec<String>,
    #[serde(default)]
    pub image_citations: Vec<WireImageCitation>,
    #[serde(default)]
    pub image_keywords: Vec<String>,
    pub confidence_score: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShapeBCitation {
    pub id: String,
    pub url: String,
    pub why_relevant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShapeB {
    pub answer_markdown: String,
    pub citations: Vec<ShapeBCitation>,
    #[serde(default)]
    pub image_citations: Vec<WireImageCitation>,
    #[serde(default)]
    pub used_context_ids: Vec<String>,
    pub confident: bool,
}

/// Fields recovered from a model reply, before retrieval-aware checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnswer {
    pub answer_markdown: String,
    pub citations: Vec<Citation>,
    pub image_citations: Vec<ImageCitation>,
    pub image_keywords: Vec<String>,
    pub used_context_ids: Vec<String>,
    pub confidence_score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    NotAnObject,
    Missing(&'static str),
    WrongType(&'static str),
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeError::NotAnObject => write!(f, "response is not a JSON object"),
            ShapeError::Missing(field) => write!(f, "required field '{field}' is missing"),
            ShapeError::WrongType(field) => write!(f, "field '{field}' has the wrong type"),
        }
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn array<'a>(obj: &'a serde_json::Map<String, Value>, field: &'static str) -> Result<&'a [Value], ShapeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(a)) => Ok(a),
        Some(_) => Err(ShapeError::WrongType(field)),
    }
}

fn score_from(value: &Value) -> Result<u8, ShapeError> {
    let n = value.as_f64().ok_or(ShapeError::WrongType("confidence_score"))?;
    Ok(n.round().clamp(0.0, 100.0) as u8)
}

pub fn parse_answer(value: &Value, shape: WireShape) -> Result<ParsedAnswer, ShapeError> {
    let obj = value.as_object().ok_or(ShapeError::NotAnObject)?;
    let answer_markdown = obj
        .get("answer_markdown")
        .ok_or(ShapeError::Missing("answer_markdown"))?
        .as_str()
        .ok_or(ShapeError::WrongType("answer_markdown"))?
        .to_string();
    let citations = reconcile_citations(array(obj, "citations")?);
    let image_citations = reconcile_images(array(obj, "image_citations")?);
    let image_keywords = strings(obj.get("image_keywords"));
    let used_context_ids = strings(obj.get("used_context_ids"));

    let confidence_score = match shape {
        WireShape::Urls => score_from(obj.get("confidence_score").ok_or(ShapeError::Missing("confidence_score"))?)?,
        WireShape::Objects => {
            let confident = obj
                .get("confident")
                .ok_or(ShapeError::Missing("confident"))?
                .as_bool()
                .ok_or(ShapeError::WrongType("confident"))?;
            if confident {
                100
            } else {
                0
            }
        }
    };

    Ok(ParsedAnswer { answer_markdown, citations, image_citations, image_keywords, used_context_ids, confidence_score })
}

fn wire_images(images: &[ImageCitation]) -> Vec<WireImageCitation> {
    images
        .iter()
        .map(|i| WireImageCitation { id: i.id.clone(), url: i.url.clone(), caption_or_alt: i.caption.clone() })
        .collect()
}

pub fn to_shape_a(result: &AnswerResult) -> ShapeA {
    ShapeA {
        answer_markdown: result.answer_markdown.clone(),
        citations: result.citations.iter().map(|c| c.url.clone()).collect(),
        image_citations: wire_images(&result.image_citations),
        image_keywords: result.image_keywords.clone(),
        confidence_score: result.confidence_score,
        image_urls: result.image_urls.clone(),
    }
}

pub fn to_shape_b(result: &AnswerResult) -> ShapeB {
    ShapeB {
        answer_markdown: result.answer_markdown.clone(),
        citations: result
            .citations
            .iter()
            .map(|c| ShapeBCitation {
                id: c.id.clone().unwrap_or_default(),
                url: c.url.clone(),
                why_relevant: c.why_relevant.clone().unwrap_or_default(),
            })
            .collect(),
        image_citations: wire_images(&result.image_citations),
        used_context_ids: result.used_context_ids.clone(),
        confident: result.confidence_score >= CONFIDENT_THRESHOLD,
    }
}

/// External JSON for `result` in the deployment's shape.
pub fn render(result: &AnswerResult, shape: WireShape) -> Value {
    let rendered = match shape {
        WireShape::Urls => serde_json::to_value(to_shape_a(result)),
        WireShape::Objects => serde_json::to_value(to_shape_b(result)),
    };
    rendered.unwrap_or(Value::Null)
}
