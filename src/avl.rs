use crate::search_tree::{BalancingPolicy, EraseEvent, NodeIdx, SearchTree, TreeCore, NIL};

/// AVL-balanced ordered map.
pub type AvlTree<K, V> = SearchTree<K, V, AvlPolicy>;

/// Height-augmented policy: every mutation walks from the change point to
/// the root recomputing heights and rotating wherever |balance| reaches 2.
#[derive(Clone, Copy, Debug, Default)]
pub struct AvlPolicy;

fn height<K, V>(core: &TreeCore<K, V, u32>, idx: NodeIdx) -> i64 {
    if idx == NIL {
        0
    } else {
        core.aux(idx) as i64
    }
}

fn update<K, V>(core: &mut TreeCore<K, V, u32>, idx: NodeIdx) {
    let h = 1 + height(core, core.left(idx)).max(height(core, core.right(idx)));
    core.set_aux(idx, h as u32);
}

fn balance<K, V>(core: &TreeCore<K, V, u32>, idx: NodeIdx) -> i64 {
    height(core, core.left(idx)) - height(core, core.right(idx))
}

fn rebalance_up<K, V>(core: &mut TreeCore<K, V, u32>, mut idx: NodeIdx) {
    while idx != NIL {
        update(core, idx);
        let b = balance(core, idx);
        if b == 2 {
            let left = core.left(idx);
            if balance(core, left) < 0 {
                // big rotation: left child leans the other way
                core.rotate_left(left);
                update(core, left);
                update(core, core.left(idx));
            }
            core.rotate_right(idx);
            update(core, idx);
            idx = core.parent(idx);
            update(core, idx);
        } else if b == -2 {
            let right = core.right(idx);
            if balance(core, right) > 0 {
                core.rotate_right(right);
                update(core, right);
                update(core, core.right(idx));
            }
            core.rotate_left(idx);
            update(core, idx);
            idx = core.parent(idx);
            update(core, idx);
        }
        idx = core.parent(idx);
    }
}

impl<K, V> BalancingPolicy<K, V> for AvlPolicy {
    type Aux = u32;

    fn on_insert(&self, core: &mut TreeCore<K, V, u32>, node: NodeIdx) {
        core.set_aux(node, 1);
        let parent = core.parent(node);
        rebalance_up(core, parent);
    }

    fn on_erase(&self, core: &mut TreeCore<K, V, u32>, event: &EraseEvent<u32>) {
        rebalance_up(core, event.parent);
    }

    fn validate(&self, core: &TreeCore<K, V, u32>) {
        fn check<K, V>(core: &TreeCore<K, V, u32>, idx: NodeIdx) -> i64 {
            if idx == NIL {
                return 0;
            }
            let lh = check(core, core.left(idx));
            let rh = check(core, core.right(idx));
            assert!((lh - rh).abs() <= 1, "avl balance violated");
            assert_eq!(core.aux(idx) as i64, 1 + lh.max(rh), "stale height");
            1 + lh.max(rh)
        }
        check(core, core.root());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::BTreeMap;

    #[test]
    fn ascending_insert_stays_logarithmic() {
        let mut tree: AvlTree<i32, i32> = AvlTree::new();
        for k in 0..1024 {
            tree.insert(k, k);
        }
        // height of an AVL tree with n nodes is < 1.45 log2(n + 2)
        assert!(tree.height() <= 15, "height {}", tree.height());
        assert_eq!(
            tree.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            (0..1024).collect::<Vec<_>>()
        );
    }

    #[test]
    fn seven_ordered_keys_make_a_perfect_tree() {
        let mut tree: AvlTree<i32, &str> = AvlTree::new();
        for (k, v) in (1..=7).zip(["a", "b", "c", "d", "e", "f", "g"]) {
            tree.insert(k, v);
        }
        assert_eq!(tree.height(), 3);
        assert_eq!(
            tree.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 6, 7]
        );
        assert_eq!(tree.erase(&4), Some("d"));
        assert_eq!(tree.height(), 3);
        assert_eq!(
            tree.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec![1, 2, 3, 5, 6, 7]
        );
    }

    #[test]
    fn random_ops_match_oracle() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xa41);
        let mut tree: AvlTree<u16, u16> = AvlTree::new();
        let mut oracle = BTreeMap::new();
        for _ in 0..2000 {
            let key = rng.gen_range(0..300);
            if rng.gen_bool(0.6) {
                let value = rng.gen();
                assert_eq!(tree.insert(key, value), oracle.insert(key, value));
            } else {
                assert_eq!(tree.erase(&key), oracle.remove(&key));
            }
        }
        assert_eq!(tree.len(), oracle.len());
        assert!(tree
            .iter()
            .map(|(k, v)| (*k, *v))
            .eq(oracle.iter().map(|(k, v)| (*k, *v))));
    }
}
