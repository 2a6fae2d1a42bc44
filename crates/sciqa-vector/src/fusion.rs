//! Reciprocal Rank Fusion.
//!
//! `score(d) = Σ_lists 1 / (k + rank_list(d))` with 1-based ranks. Documents
//! absent from a list contribute nothing for it. Equal scores are ordered by the
//! best rank the document reached in any list, then by first appearance.

use std::collections::HashMap;
use std::hash::Hash;

use sciqa_core::types::ScoredPoint;
use uuid::Uuid;

pub const RRF_K: f32 = 60.0;

struct Entry<T> {
    id: T,
    score: f32,
    best_rank: usize,
}

pub fn reciprocal_rank_fusion<T>(lists: &[Vec<T>], k: f32, limit: usize) -> Vec<(T, f32)>
where
    T: Eq + Hash + Clone,
{
    let mut slots: HashMap<T, usize> = HashMap::new();
    let mut entries: Vec<Entry<T>> = Vec::new();
    for list in lists {
        for (pos, id) in list.iter().enumerate() {
            let rank = pos + 1;
            let contribution = 1.0 / (k + rank as f32);
            match slots.get(id) {
                Some(&slot) => {
                    let e = &mut entries[slot];
                    e.score += contribution;
                    e.best_rank = e.best_rank.min(rank);
                }
                None => {
                    slots.insert(id.clone(), entries.len());
                    entries.push(Entry { id: id.clone(), score: contribution, best_rank: rank });
                }
            }
        }
    }
    // stable: first appearance survives as the last tie-break
    entries.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.best_rank.cmp(&b.best_rank)));
    entries.truncate(limit);
    entries.into_iter().map(|e| (e.id, e.score)).collect()
}

/// Fuse ranked dense and sparse hits into at most `limit` points carrying the fused score.
pub fn fuse_points(dense: Vec<ScoredPoint>, sparse: Vec<ScoredPoint>, limit: usize) -> Vec<ScoredPoint> {
    let lists = vec![
        dense.iter().map(|p| p.id).collect::<Vec<Uuid>>(),
        sparse.iter().map(|p| p.id).collect::<Vec<Uuid>>(),
    ];
    let mut payloads: HashMap<Uuid, serde_json::Value> = HashMap::new();
    for p in dense.into_iter().chain(sparse) {
        payloads.entry(p.id).or_insert(p.payload);
    }
    reciprocal_rank_fusion(&lists, RRF_K, limit)
        .into_iter()
        .map(|(id, score)| ScoredPoint { id, score, payload: payloads.remove(&id).unwrap_or_default() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn shared_documents_win() {
        let fused = reciprocal_rank_fusion(&[vec!["a", "b", "c"], vec!["c", "d", "a"]], RRF_K, 10);
        let ids: Vec<&str> = fused.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["a", "c", "b", "d"]);
        assert!((fused[0].1 - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-7);
    }

    #[test]
    fn ties_prefer_best_rank_then_first_seen() {
        // x: rank 1 in list 0 only; y: rank 1 in list 1 only. Equal scores, equal best rank.
        let fused = reciprocal_rank_fusion(&[vec!["x"], vec!["y"]], RRF_K, 10);
        assert_eq!(fused[0].0, "x");
        assert_eq!(fused[1].0, "y");
    }

    #[test]
    fn limit_truncates() {
        let fused = reciprocal_rank_fusion(&[vec![1, 2, 3, 4]], RRF_K, 2);
        assert_eq!(fused.len(), 2);
        assert!(reciprocal_rank_fusion::<u8>(&[vec![], vec![]], RRF_K, 5).is_empty());
    }

    proptest! {
        #[test]
        fn improving_a_rank_never_lowers_the_score(
            others in proptest::collection::vec(1u32..1000, 1..20),
            pos in 0usize..19,
        ) {
            let mut list: Vec<u32> = others.clone();
            list.sort_unstable();
            list.dedup();
            prop_assume!(pos < list.len());
            let target = 0u32;
            let mut worse = list.clone();
            worse.insert(pos.min(worse.len()), target);
            let mut better = list.clone();
            better.insert(0, target);
            let second = vec![target];
            let score = |l: &Vec<u32>| {
                reciprocal_rank_fusion(&[l.clone(), second.clone()], RRF_K, usize::MAX)
                    .into_iter()
                    .find(|(id, _)| *id == target)
                    .map(|(_, s)| s)
                    .unwrap()
            };
            prop_assert!(score(&better) >= score(&worse));
        }

        #[test]
        fn scores_are_non_increasing(a in proptest::collection::vec(0u16..50, 0..30), b in proptest::collection::vec(0u16..50, 0..30)) {
            let mut a = a; a.dedup();
            let mut b = b; b.dedup();
            let fused = reciprocal_rank_fusion(&[a, b], RRF_K, usize::MAX);
            prop_assert!(fused.windows(2).all(|w| w[0].1 >= w[1].1));
        }
    }
}
