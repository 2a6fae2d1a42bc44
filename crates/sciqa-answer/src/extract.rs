//! Locate the JSON object in a model reply that may carry fences or prose.
//!
//! Strategies run in priority order: a ```json fence, any ``` fence, then the
//! span from the first `{` to the last `}`. Whatever the first matching
//! strategy returns is trimmed to brace boundaries once more. A fence with no
//! closing marker extends to the end of the reply. A fence whose body holds no
//! `{` (a lone closing marker, an empty block) is skipped.

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    JsonFence,
    AnyFence,
    BraceSlice,
    /// No markers found; the reply is used as-is.
    Raw,
}

fn fenced<'a>(raw: &'a str, open: &str) -> Option<&'a str> {
    let start = raw.find(open)? + open.len();
    let rest = &raw[start..];
    let body = match rest.find(FENCE) {
        Some(end) => &rest[..end],
        None => rest,
    };
    body.contains('{').then_some(body)
}

fn brace_slice(raw: &str) -> Option<&str> {
    let first = raw.find('{')?;
    let last = raw.rfind('}')?;
    (last > first).then(|| &raw[first..=last])
}

/// Trim leading text before the first `{` and trailing text after the last `}`.
fn trim_to_braces(text: &str) -> &str {
    let mut s = text.trim();
    if !s.starts_with('{') {
        if let Some(i) = s.find('{') {
            s = &s[i..];
        }
    }
    if !s.ends_with('}') {
        if let Some(i) = s.rfind('}') {
            s = &s[..=i];
        }
    }
    s
}

pub fn extract_json(raw: &str) -> (Extraction, &str) {
    let (strategy, candidate) = if let Some(body) = fenced(raw, JSON_FENCE) {
        (Extraction::JsonFence, body)
    } else if let Some(body) = fenced(raw, FENCE) {
        (Extraction::AnyFence, body)
    } else if let Some(body) = brace_slice(raw) {
        (Extraction::BraceSlice, body)
    } else {
        (Extraction::Raw, raw)
    };
    (strategy, trim_to_braces(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fence_with_prose() {
        let raw = "Sure, here you go:\n```json\n{\"a\": 1}\n```\nHope that helps.";
        assert_eq!(extract_json(raw), (Extraction::JsonFence, "{\"a\": 1}"));
    }

    #[test]
    fn json_fence_without_close() {
        let raw = "```json\n{\"a\": {\"b\": 2}}\n";
        assert_eq!(extract_json(raw), (Extraction::JsonFence, "{\"a\": {\"b\": 2}}"));
    }

    #[test]
    fn generic_fence_with_language_tag() {
        let raw = "```JSON\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw), (Extraction::AnyFence, "{\"a\": 1}"));
    }

    #[test]
    fn closing_fence_without_opening() {
        let raw = "{\"a\": [1, 2]}\n```";
        assert_eq!(extract_json(raw), (Extraction::BraceSlice, "{\"a\": [1, 2]}"));
    }

    #[test]
    fn stray_fence_before_bare_json() {
        let raw = "Here is the answer ```\n{\"a\": 1}\nthanks";
        assert_eq!(extract_json(raw), (Extraction::AnyFence, "{\"a\": 1}"));
        let raw = "Answer below. ``` ``` {\"a\": 1}";
        assert_eq!(extract_json(raw), (Extraction::BraceSlice, "{\"a\": 1}"));
    }

    #[test]
    fn empty_json_fence_falls_through() {
        let raw = "```json\n```\n{\"a\": 1}";
        assert_eq!(extract_json(raw), (Extraction::BraceSlice, "{\"a\": 1}"));
    }

    #[test]
    fn bare_braces_inside_prose() {
        let raw = "The answer is {\"a\": \"x}\"} as requested.";
        assert_eq!(extract_json(raw), (Extraction::BraceSlice, "{\"a\": \"x}\"}"));
    }

    #[test]
    fn nothing_to_find() {
        assert_eq!(extract_json("no json here"), (Extraction::Raw, "no json here"));
        assert_eq!(extract_json("} backwards {").0, Extraction::Raw);
    }
}
