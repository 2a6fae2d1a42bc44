//! Citation integrity checks over a finished answer.
//!
//! Violations are advisory: the synthesizer logs and attaches them, it never
//! rejects an answer because of them.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use sciqa_core::types::{Citation, IntegrityViolation, RetrievedDocument};

static MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").ok());

/// `[n]` markers in order of appearance, repeats included.
pub fn markers(answer: &str) -> Vec<usize> {
    let Some(re) = MARKER.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(answer)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect()
}

/// Every problem with `citations` as used by `answer`, given the documents the
/// answer was generated from. Citation indices in violations are 0-based.
pub fn check(answer: &str, citations: &[Citation], docs: &[RetrievedDocument]) -> Vec<IntegrityViolation> {
    let found = markers(answer);
    let mut violations = Vec::new();

    let dangling: BTreeSet<usize> = found.iter().copied().filter(|n| *n == 0 || *n > citations.len()).collect();
    violations.extend(dangling.into_iter().map(|marker| IntegrityViolation::DanglingMarker { marker }));

    let mut seen = HashSet::new();
    let first_seen: Vec<usize> = found.iter().copied().filter(|n| seen.insert(*n)).collect();
    if let Some((expected, found)) = first_seen
        .iter()
        .enumerate()
        .map(|(i, n)| (i + 1, *n))
        .find(|(expected, n)| expected != n)
    {
        violations.push(IntegrityViolation::OutOfOrder { expected, found });
    }

    let known: HashSet<&str> = docs.iter().filter_map(RetrievedDocument::url).collect();
    for (index, citation) in citations.iter().enumerate() {
        if !known.contains(citation.url.as_str()) {
            violations.push(IntegrityViolation::UnknownUrl { index, url: citation.url.clone() });
        }
        if !seen.contains(&(index + 1)) {
            violations.push(IntegrityViolation::Unreferenced { index });
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(url: &str) -> RetrievedDocument {
        RetrievedDocument {
            chunk_id: url.into(),
            score: 1.0,
            text: "t".into(),
            section: "Results".into(),
            full_payload: json!({ "url": url }),
        }
    }

    #[test]
    fn clean_answer_has_no_violations() {
        let docs = [doc("https://a"), doc("https://b")];
        let cites = [Citation::url("https://a"), Citation::url("https://b")];
        assert!(check("Bone [1] and muscle [2], again bone [1].", &cites, &docs).is_empty());
    }

    #[test]
    fn reports_each_kind_of_problem() {
        let docs = [doc("https://a")];
        let cites = [Citation::url("https://a"), Citation::url("https://x"), Citation::url("https://a2")];
        let v = check("First [2], then [1], then [7] and [0].", &cites, &docs);
        assert!(v.contains(&IntegrityViolation::DanglingMarker { marker: 0 }));
        assert!(v.contains(&IntegrityViolation::DanglingMarker { marker: 7 }));
        assert!(v.contains(&IntegrityViolation::OutOfOrder { expected: 1, found: 2 }));
        assert!(v.contains(&IntegrityViolation::UnknownUrl { index: 1, url: "https://x".into() }));
        assert!(v.contains(&IntegrityViolation::Unreferenced { index: 2 }));
    }

    #[test]
    fn grouped_markers_are_not_counted() {
        assert_eq!(markers("see [1,2] and [3]"), vec![3]);
    }
}
