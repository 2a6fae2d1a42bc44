//! Offline citation checks over recorded `{question, documents, answer}` samples.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use sciqa_answer::conformance;
use sciqa_answer::wire::parse_answer;
use sciqa_core::config::WireShape;
use sciqa_core::types::RetrievedDocument;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Deserialize)]
struct Sample {
    #[serde(default)]
    question: String,
    #[serde(default)]
    documents: Vec<RetrievedDocument>,
    answer: Value,
}

pub fn run(path: &Path, shape: WireShape) -> Result<()> {
    let reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    let (mut samples, mut clean, mut unparsed) = (0usize, 0usize, 0usize);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: Sample = match serde_json::from_str(&line) {
            Ok(s) => s,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed sample");
                continue;
            }
        };
        samples += 1;
        let parsed = match parse_answer(&sample.answer, shape) {
            Ok(p) => p,
            Err(e) => {
                unparsed += 1;
                println!("line {}: answer does not match the {shape:?} shape: {e}", line_no + 1);
                continue;
            }
        };
        let violations = conformance::check(&parsed.answer_markdown, &parsed.citations, &sample.documents);
        if violations.is_empty() {
            clean += 1;
            continue;
        }
        println!("line {}: {}", line_no + 1, sample.question);
        for v in violations {
            println!("    {v:?}");
        }
    }
    println!("{samples} samples: {clean} clean, {} with violations, {unparsed} unparseable", samples - clean - unparsed);
    Ok(())
}
