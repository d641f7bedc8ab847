use proptest::prelude::*;
use ragline_core::{Combinator, Metadata, Node, RetrievalResult};
use std::collections::HashMap;
use std::sync::Arc;

fn to_results(retriever: &str, hits: &[(u8, f32)]) -> Vec<RetrievalResult> {
    let mut seen = std::collections::HashSet::new();
    hits.iter()
        .filter(|(id, _)| seen.insert(*id))
        .map(|(id, score)| {
            let node = Arc::new(Node {
                id: format!("n{}", id),
                text: String::new(),
                metadata: Metadata::new(),
                parent_id: None,
                group_name: "g".to_string(),
            });
            RetrievalResult::new(node, *score, retriever)
        })
        .collect()
}

fn fused(merged: &[ragline_core::MergedResult]) -> HashMap<String, f64> {
    merged
        .iter()
        .map(|m| (m.node_id.clone(), m.fused_score))
        .collect()
}

fn hits() -> impl Strategy<Value = Vec<(u8, f32)>> {
    prop::collection::vec((0u8..12, 0.0f32..1.0), 0..8)
}

proptest! {
    #[test]
    fn sum_fusion_is_commutative(a in hits(), b in hits()) {
        let ab = Combinator::Sum.merge(vec![to_results("a", &a), to_results("b", &b)]);
        let ba = Combinator::Sum.merge(vec![to_results("b", &b), to_results("a", &a)]);
        prop_assert_eq!(fused(&ab), fused(&ba));
    }

    #[test]
    fn max_fusion_is_commutative(a in hits(), b in hits()) {
        let ab = Combinator::Max.merge(vec![to_results("a", &a), to_results("b", &b)]);
        let ba = Combinator::Max.merge(vec![to_results("b", &b), to_results("a", &a)]);
        prop_assert_eq!(fused(&ab), fused(&ba));
    }

    #[test]
    fn sum_ranking_is_non_increasing(a in hits(), b in hits(), c in hits()) {
        let merged = Combinator::Sum.merge(vec![
            to_results("a", &a),
            to_results("b", &b),
            to_results("c", &c),
        ]);
        for pair in merged.windows(2) {
            prop_assert!(pair[0].fused_score >= pair[1].fused_score);
        }
    }

    #[test]
    fn every_node_appears_once(a in hits(), b in hits()) {
        let merged = Combinator::Sum.merge(vec![to_results("a", &a), to_results("b", &b)]);
        let unique: std::collections::HashSet<_> = merged.iter().map(|m| &m.node_id).collect();
        prop_assert_eq!(unique.len(), merged.len());
    }
}
