use std::collections::HashSet;
use std::sync::Arc;

use sciqa_core::config::{Settings, WireShape};
use sciqa_core::types::{AnswerResult, Outcome, RetrievedDocument};
use sciqa_core::Result;
use tracing::{debug, info, warn};

use crate::conformance;
use crate::extract::extract_json;
use crate::images::{self, ImageSearch, NoImageSearch};
use crate::llm::{GeminiClient, GenerationRequest, LanguageModel};
use crate::prompt::{build_prompt, INSUFFICIENT_CONTEXT_ANSWER};
use crate::repair::parse_lenient;
use crate::wire::{parse_answer, ParsedAnswer};

#[derive(Debug, Clone)]
pub struct SynthesizerOptions {
    pub shape: WireShape,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_images: usize,
}

impl Default for SynthesizerOptions {
    fn default() -> Self {
        Self { shape: WireShape::default(), max_output_tokens: None, temperature: None, max_images: 2 }
    }
}

/// Turns retrieved passages and a question into a cited [`AnswerResult`].
pub struct Synthesizer {
    llm: Arc<dyn LanguageModel>,
    images: Arc<dyn ImageSearch>,
    options: SynthesizerOptions,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, options: SynthesizerOptions) -> Self {
        Self { llm, images: Arc::new(NoImageSearch), options }
    }

    pub fn with_images(mut self, images: Arc<dyn ImageSearch>) -> Self {
        self.images = images;
        self
    }

    /// Gemini plus SerpApi (when keyed), configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let llm = Arc::new(GeminiClient::new(&settings.llm)?);
        let images: Arc<dyn ImageSearch> = images::image_search_from_settings(&settings.images)?.into();
        let options = SynthesizerOptions {
            shape: settings.answer.shape,
            max_output_tokens: Some(settings.llm.max_output_tokens),
            temperature: Some(settings.llm.temperature),
            max_images: settings.images.max_images,
        };
        Ok(Self::new(llm, options).with_images(images))
    }

    pub fn shape(&self) -> WireShape {
        self.options.shape
    }

    pub fn llm(&self) -> Arc<dyn LanguageModel> {
        Arc::clone(&self.llm)
    }

    pub async fn synthesize(&self, question: &str, docs: &[RetrievedDocument]) -> Result<AnswerResult> {
        if docs.is_empty() {
            info!("no documents retrieved, skipping generation");
            return Ok(AnswerResult::bare(INSUFFICIENT_CONTEXT_ANSWER, Outcome::InsufficientContext));
        }

        let request = GenerationRequest {
            prompt: build_prompt(question, docs, self.options.shape),
            max_output_tokens: self.options.max_output_tokens,
            temperature: self.options.temperature,
            ..Default::default()
        };
        let raw = self.llm.generate(&request).await?;

        let (strategy, candidate) = extract_json(&raw);
        debug!(?strategy, "extracted response candidate");
        let parsed = match parse_lenient(candidate) {
            Ok(value) => parse_answer(&value, self.options.shape).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let parsed = match parsed {
            Ok(p) => p,
            Err(reason) => {
                warn!(model = self.llm.name(), reason = %reason, "model response did not parse, returning raw text");
                return Ok(AnswerResult::bare(raw.trim(), Outcome::ParseFailure));
            }
        };

        let mut result = self.assemble(parsed, docs);
        if !result.violations.is_empty() {
            warn!(count = result.violations.len(), violations = ?result.violations, "citation integrity violations");
        }
        if !result.image_keywords.is_empty() && self.options.max_images > 0 {
            result.image_urls = images::enrich(self.images.as_ref(), &result.image_keywords, self.options.max_images).await;
        }
        Ok(result)
    }

    fn assemble(&self, parsed: ParsedAnswer, docs: &[RetrievedDocument]) -> AnswerResult {
        let violations = conformance::check(&parsed.answer_markdown, &parsed.citations, docs);
        let used_context_ids = if parsed.used_context_ids.is_empty() {
            used_ids_from_citations(&parsed, docs)
        } else {
            parsed.used_context_ids
        };
        AnswerResult {
            answer_markdown: parsed.answer_markdown,
            citations: parsed.citations,
            image_citations: parsed.image_citations,
            image_keywords: parsed.image_keywords,
            image_urls: Vec::new(),
            confidence_score: parsed.confidence_score,
            used_context_ids,
            outcome: Outcome::Grounded,
            violations,
        }
    }
}

/// Citation ids of the documents whose URL was cited, in retrieval order.
fn used_ids_from_citations(parsed: &ParsedAnswer, docs: &[RetrievedDocument]) -> Vec<String> {
    let cited: HashSet<&str> = parsed.citations.iter().map(|c| c.url.as_str()).collect();
    let mut seen = HashSet::new();
    docs.iter()
        .filter(|d| d.url().is_some_and(|u| cited.contains(u)))
        .filter_map(|d| d.citation_id().map(str::to_string))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
