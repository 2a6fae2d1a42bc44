//! Grounded answer synthesis: prompt, model call, response recovery, citation
//! reconciliation and integrity checks.

pub mod conformance;
pub mod extract;
pub mod images;
pub mod llm;
pub mod prompt;
pub mod reconcile;
pub mod repair;
pub mod synthesizer;
pub mod wire;

pub use images::{ImageSearch, NoImageSearch, SerpApiImageSearch};
pub use llm::{GeminiClient, GenerationRequest, LanguageModel, ScriptedModel};
pub use prompt::INSUFFICIENT_CONTEXT_ANSWER;
pub use synthesizer::{Synthesizer, SynthesizerOptions};
pub use wire::{render, ShapeA, ShapeB};
