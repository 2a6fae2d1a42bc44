//! Deterministic, content-addressed chunk identity.
//!
//! A chunk id is `{corpus_id}:{section-slug}:{hash8}` where `hash8` is the first
//! eight hex chars of BLAKE3 over `corpus_id \n section_path \n body`. The same
//! inputs give the same id in every process; changing any input changes the
//! hash. Stores that need UUID keys get one from [`point_id`], a UUID v5 over
//! the chunk id.

use uuid::Uuid;

/// Separator between the article title and the section label in a section path.
pub const SECTION_SEPARATOR: &str = " — ";

const HASH_HEX_LEN: usize = 8;

/// Lowercase, every non-alphanumeric char mapped to `-`, outer hyphens trimmed.
pub fn slugify(section: &str) -> String {
    let slug: String = section
        .chars()
        .flat_map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                vec!['-']
            }
        })
        .collect();
    slug.trim_matches('-').to_string()
}

/// Section label of a `Title — Section` path; the whole path when there is no separator.
pub fn section_label(section_path: &str) -> &str {
    section_path
        .split_once(SECTION_SEPARATOR)
        .map_or(section_path, |(_, label)| label)
}

pub fn content_hash(corpus_id: &str, section_path: &str, body: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(corpus_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(section_path.as_bytes());
    hasher.update(b"\n");
    hasher.update(body.as_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..HASH_HEX_LEN].to_string()
}

pub fn chunk_id(corpus_id: &str, section_path: &str, body: &str) -> String {
    let slug = slugify(section_label(section_path));
    let hash = content_hash(corpus_id, section_path, body);
    format!("{corpus_id}:{slug}:{hash}")
}

/// Storage key for a chunk id.
pub fn point_id(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slug_lowercases_and_trims() {
        assert_eq!(slugify("  Materials & Methods: "), "materials---methods");
        assert_eq!(slugify("Results"), "results");
        assert_eq!(slugify("--"), "");
    }

    #[test]
    fn id_uses_section_label_for_slug() {
        let id = chunk_id("PMC123", "Bone loss in mice — Results", "Osteoclasts increased.");
        let parts: Vec<&str> = id.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PMC123");
        assert_eq!(parts[1], "results");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn point_id_is_stable_uuid_v5() {
        let a = point_id("PMC1:results:0011aabb");
        let b = point_id("PMC1:results:0011aabb");
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 5);
        assert_ne!(a, point_id("PMC1:results:0011aabc"));
    }

    proptest! {
        #[test]
        fn same_inputs_same_id(c in "[A-Z0-9]{1,8}", s in ".{0,40}", t in ".{0,200}") {
            prop_assert_eq!(chunk_id(&c, &s, &t), chunk_id(&c, &s, &t));
        }

        #[test]
        fn changing_body_changes_hash(c in "PMC[0-9]{1,6}", s in "[a-z ]{1,30}", t in "[a-z ]{5,120}") {
            let other = format!("{t}!");
            prop_assert_ne!(chunk_id(&c, &s, &t), chunk_id(&c, &s, &other));
        }

        #[test]
        fn changing_section_changes_id(c in "PMC[0-9]{1,6}", s in "[a-z]{1,30}", t in "[a-z ]{5,120}") {
            let other = format!("{s}x");
            prop_assert_ne!(chunk_id(&c, &s, &t), chunk_id(&c, &other, &t));
        }
    }
}
