use std::sync::Arc;

use sciqa_answer::{render, ScriptedModel, Synthesizer, SynthesizerOptions, INSUFFICIENT_CONTEXT_ANSWER};
use sciqa_core::config::WireShape;
use sciqa_core::types::{IntegrityViolation, Outcome, RetrievedDocument};
use sciqa_core::ErrorKind;
use serde_json::json;

fn doc(id: &str, url: &str, text: &str) -> RetrievedDocument {
    RetrievedDocument {
        chunk_id: format!("uuid-{id}"),
        score: 0.03,
        text: text.into(),
        section: "Results".into(),
        full_payload: json!({ "id": id, "url": url, "kind": "paragraph" }),
    }
}

fn docs() -> Vec<RetrievedDocument> {
    vec![
        doc("PMC1:results:00000001", "https://pmc/PMC1", "Mice lost 20% trabecular bone."),
        doc("PMC2:results:00000002", "https://pmc/PMC2", "Osteoclast activity rose in flight."),
        doc("PMC1:discussion:00000003", "https://pmc/PMC1", "Loss was partly reversible."),
    ]
}

fn synthesizer(model: Arc<ScriptedModel>, shape: WireShape) -> Synthesizer {
    Synthesizer::new(model, SynthesizerOptions { shape, ..Default::default() })
}

#[tokio::test]
async fn empty_documents_skip_the_model() {
    let model = Arc::new(ScriptedModel::default());
    let result = synthesizer(model.clone(), WireShape::Urls).synthesize("q", &[]).await.unwrap();
    assert_eq!(result.outcome, Outcome::InsufficientContext);
    assert_eq!(result.answer_markdown, INSUFFICIENT_CONTEXT_ANSWER);
    assert!(result.citations.is_empty());
    assert_eq!(result.confidence_score, 0);
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn prose_wrapped_fence_is_recovered() {
    let reply = "Sure, here you go:\n```json\n{\"answer_markdown\": \"Bone loss [1] with osteoclasts [2].\", \"citations\": [\"https://pmc/PMC1\", \"https://pmc/PMC2\", \"https://pmc/PMC1\",], \"image_keywords\": [], \"confidence_score\": 81}\n```\nHope that helps!";
    let model = Arc::new(ScriptedModel::replying([reply]));
    let result = synthesizer(model.clone(), WireShape::Urls).synthesize("bone?", &docs()).await.unwrap();

    assert_eq!(result.outcome, Outcome::Grounded);
    assert_eq!(result.citation_urls(), vec!["https://pmc/PMC1", "https://pmc/PMC2"]);
    assert_eq!(result.confidence_score, 81);
    assert!(result.violations.is_empty());
    assert_eq!(
        result.used_context_ids,
        vec!["PMC1:results:00000001", "PMC2:results:00000002", "PMC1:discussion:00000003"]
    );
    let prompt = &model.requests()[0].prompt;
    assert!(prompt.contains("Citation ID: PMC2:results:00000002"));
    assert!(prompt.contains("QUESTION: bone?"));
}

#[tokio::test]
async fn trailing_close_fence_without_opening_is_recovered() {
    let reply = "{\"answer_markdown\": \"Bone [1].\", \"citations\": [\"https://pmc/PMC1\"], \"confidence_score\": 80}\n```";
    let model = Arc::new(ScriptedModel::replying([reply]));
    let result = synthesizer(model, WireShape::Urls).synthesize("bone?", &docs()).await.unwrap();
    assert_eq!(result.outcome, Outcome::Grounded);
    assert_eq!(result.citation_urls(), vec!["https://pmc/PMC1"]);
    assert_eq!(result.confidence_score, 80);
}

#[tokio::test]
async fn unparseable_reply_degrades_to_raw_text() {
    let model = Arc::new(ScriptedModel::replying(["  I think bones shrink in space.  "]));
    let result = synthesizer(model, WireShape::Urls).synthesize("q", &docs()).await.unwrap();
    assert_eq!(result.outcome, Outcome::ParseFailure);
    assert_eq!(result.answer_markdown, "I think bones shrink in space.");
    assert!(result.citations.is_empty());
    assert_eq!(result.confidence_score, 0);
}

#[tokio::test]
async fn missing_required_field_is_a_parse_failure() {
    let reply = r#"{"answer_markdown": "x [1]", "citations": ["https://pmc/PMC1"]}"#;
    let model = Arc::new(ScriptedModel::replying([reply]));
    let result = synthesizer(model, WireShape::Objects).synthesize("q", &docs()).await.unwrap();
    assert_eq!(result.outcome, Outcome::ParseFailure);
}

#[tokio::test]
async fn model_errors_propagate() {
    let model = Arc::new(ScriptedModel::default());
    let err = synthesizer(model, WireShape::Urls).synthesize("q", &docs()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LlmInvocation);
}

#[tokio::test]
async fn shape_b_reply_round_trips_through_both_shapes() {
    let reply = r#"{
        "answer_markdown": "Flight raised osteoclast activity [1] and bone loss followed [2].",
        "citations": [
            {"id": "PMC2:results:00000002", "url": "https://pmc/PMC2", "why_relevant": "osteoclasts"},
            {"id": "PMC1:results:00000001", "url": "https://pmc/PMC1", "why_relevant": "bone"}
        ],
        "image_citations": [],
        "used_context_ids": ["PMC2:results:00000002", "PMC1:results:00000001"],
        "confident": true
    }"#;
    let model = Arc::new(ScriptedModel::replying([reply]));
    let result = synthesizer(model, WireShape::Objects).synthesize("q", &docs()).await.unwrap();
    assert_eq!(result.outcome, Outcome::Grounded);
    assert!(result.confident());
    assert_eq!(result.used_context_ids, vec!["PMC2:results:00000002", "PMC1:results:00000001"]);

    let b = render(&result, WireShape::Objects);
    assert_eq!(b["citations"][0]["why_relevant"], "osteoclasts");
    assert_eq!(b["confident"], true);
    let a = render(&result, WireShape::Urls);
    assert_eq!(a["citations"], json!(["https://pmc/PMC2", "https://pmc/PMC1"]));
    assert_eq!(a["confidence_score"], 100);
}

#[tokio::test]
async fn integrity_problems_are_attached_not_fatal() {
    let reply = r#"{"answer_markdown": "Claim [2].", "citations": ["https://elsewhere/x", "https://pmc/PMC1"], "confidence_score": 30}"#;
    let model = Arc::new(ScriptedModel::replying([reply]));
    let result = synthesizer(model, WireShape::Urls).synthesize("q", &docs()).await.unwrap();
    assert_eq!(result.outcome, Outcome::Grounded);
    assert!(result
        .violations
        .contains(&IntegrityViolation::UnknownUrl { index: 0, url: "https://elsewhere/x".into() }));
    assert!(result.violations.contains(&IntegrityViolation::OutOfOrder { expected: 1, found: 2 }));
    assert!(result.violations.contains(&IntegrityViolation::Unreferenced { index: 0 }));
}
