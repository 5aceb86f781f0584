use chm_core::Tree;
use proptest::prelude::*;

fn random_tree(parents_raw: &[u32], lengths: &[f64]) -> Tree {
    let mut parents = vec![-1i64];
    for (idx, raw) in parents_raw.iter().enumerate() {
        let node = idx + 1;
        parents.push((*raw as usize % node) as i64);
    }
    let mut branch_lengths = vec![0.0];
    branch_lengths.extend_from_slice(&lengths[..parents_raw.len()]);
    Tree::from_parent_indices(&parents, &branch_lengths).unwrap()
}

proptest! {
    #[test]
    fn ages_are_non_negative_and_root_is_oldest(
        parents_raw in proptest::collection::vec(any::<u32>(), 1..12),
        lengths in proptest::collection::vec(0.01f64..5.0, 12),
    ) {
        let tree = random_tree(&parents_raw, &lengths);
        for node in 0..tree.num_nodes() {
            prop_assert!(tree.age(node) >= -1e-12);
            prop_assert!(tree.age(node) <= tree.height() + 1e-12);
        }
        prop_assert_eq!(tree.post_order().len(), tree.num_nodes());
    }

    #[test]
    fn patristic_distance_is_a_metric(
        parents_raw in proptest::collection::vec(any::<u32>(), 2..10),
        lengths in proptest::collection::vec(0.01f64..5.0, 10),
        a in any::<u32>(),
        b in any::<u32>(),
        c in any::<u32>(),
    ) {
        let tree = random_tree(&parents_raw, &lengths);
        let n = tree.num_nodes() as u32;
        let (a, b, c) = ((a % n) as usize, (b % n) as usize, (c % n) as usize);
        let ab = tree.patristic_distance(a, b);
        prop_assert!((ab - tree.patristic_distance(b, a)).abs() < 1e-9);
        prop_assert!(tree.patristic_distance(a, a).abs() < 1e-12);
        prop_assert!(ab <= tree.patristic_distance(a, c) + tree.patristic_distance(c, b) + 1e-9);
    }
}
