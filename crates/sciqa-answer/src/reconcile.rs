//! Citation de-duplication. Entries may be URL strings or objects with a
//! `url` field; both dedupe by URL keeping the first occurrence. Entries
//! without a non-empty string URL are dropped.

use std::collections::HashSet;

use sciqa_core::types::{Citation, ImageCitation};
use serde_json::Value;

fn opt_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}

fn citation_from(value: &Value) -> Option<Citation> {
    match value {
        Value::String(url) => Some(Citation::url(url.trim())),
        Value::Object(_) => Some(Citation {
            id: opt_str(value, "id"),
            url: opt_str(value, "url")?.trim().to_string(),
            why_relevant: opt_str(value, "why_relevant"),
        }),
        _ => None,
    }
}

pub fn reconcile_citations(values: &[Value]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter_map(citation_from)
        .filter(|c| !c.url.is_empty())
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

pub fn reconcile_images(values: &[Value]) -> Vec<ImageCitation> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter_map(|v| match v {
            Value::String(url) => Some(ImageCitation { id: String::new(), url: url.trim().to_string(), caption: String::new() }),
            Value::Object(_) => Some(ImageCitation {
                id: opt_str(v, "id").unwrap_or_default(),
                url: opt_str(v, "url")?.trim().to_string(),
                caption: opt_str(v, "caption_or_alt")
                    .or_else(|| opt_str(v, "caption"))
                    .or_else(|| opt_str(v, "why_relevant"))
                    .unwrap_or_default(),
            }),
            _ => None,
        })
        .filter(|i| !i.url.is_empty())
        .filter(|i| seen.insert(i.url.clone()))
        .collect()
}

/// Distinct strings in first-occurrence order.
pub fn dedupe_preserving_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|s| seen.insert(s.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn mixed_representations_dedupe_by_url() {
        let values = [
            json!("https://a"),
            json!({"id": "x", "url": "https://b", "why_relevant": "r"}),
            json!({"id": "y", "url": "https://a"}),
            json!(""),
            json!(42),
            json!({"url": null}),
            json!({"id": "z"}),
            json!("https://b"),
        ];
        let out = reconcile_citations(&values);
        let urls: Vec<&str> = out.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a", "https://b"]);
        assert_eq!(out[1].id.as_deref(), Some("x"));
    }

    #[test]
    fn image_captions_accept_aliases() {
        let out = reconcile_images(&[
            json!({"id": "f1", "url": "https://i/1.jpg", "caption_or_alt": "Figure 1"}),
            json!({"id": "f2", "url": "https://i/1.jpg", "caption_or_alt": "dup"}),
            json!({"id": "f3", "url": "https://i/3.jpg", "why_relevant": "Figure 3"}),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].caption, "Figure 3");
    }

    proptest! {
        #[test]
        fn output_is_unique_and_first_occurrence_ordered(urls in proptest::collection::vec("[a-d]{0,2}", 0..30)) {
            let values: Vec<Value> = urls.iter().map(|u| json!(u)).collect();
            let out: Vec<String> = reconcile_citations(&values).into_iter().map(|c| c.url).collect();
            let expected = dedupe_preserving_order(urls.into_iter().filter(|u| !u.is_empty()));
            prop_assert_eq!(out, expected);
        }
    }
}
