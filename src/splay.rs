use crate::search_tree::{BalancingPolicy, NodeIdx, SearchTree, TreeCore, NIL};

/// Self-adjusting ordered map. Every mutating entry point re-roots the
/// tree, so iterators must be reacquired after any operation.
pub type SplayTree<K, V> = SearchTree<K, V, SplayPolicy>;

#[derive(Clone, Copy, Debug, Default)]
pub struct SplayPolicy;

fn splay<K, V>(core: &mut TreeCore<K, V, ()>, x: NodeIdx) {
    loop {
        let p = core.parent(x);
        if p == NIL {
            return;
        }
        let g = core.parent(p);
        if g == NIL {
            // zig
            if core.left(p) == x {
                core.rotate_right(p);
            } else {
                core.rotate_left(p);
            }
            return;
        }
        let x_is_left = core.left(p) == x;
        let p_is_left = core.left(g) == p;
        if x_is_left == p_is_left {
            // zig-zig: rotate the grandparent first
            if p_is_left {
                core.rotate_right(g);
                core.rotate_right(p);
            } else {
                core.rotate_left(g);
                core.rotate_left(p);
            }
        } else {
            // zig-zag
            if x_is_left {
                core.rotate_right(p);
                core.rotate_left(g);
            } else {
                core.rotate_left(p);
                core.rotate_right(g);
            }
        }
    }
}

impl<K, V> BalancingPolicy<K, V> for SplayPolicy {
    type Aux = ();

    fn on_insert(&self, core: &mut TreeCore<K, V, ()>, node: NodeIdx) {
        splay(core, node);
    }

    fn on_access(&self, core: &mut TreeCore<K, V, ()>, node: NodeIdx) {
        splay(core, node);
    }

    /// Splay the target to the root, then join: the left subtree's maximum
    /// is splayed up and adopts the right subtree.
    fn erase(&self, core: &mut TreeCore<K, V, ()>, node: NodeIdx) -> (K, V) {
        splay(core, node);
        debug_assert_eq!(core.root(), node);
        let left = core.left(node);
        let right = core.right(node);
        let removed = core.free_node(node);
        if left == NIL {
            core.set_root(right);
            if right != NIL {
                core.node_mut(right).parent = NIL;
            }
        } else {
            core.node_mut(left).parent = NIL;
            core.set_root(left);
            let max = core.maximum(left);
            splay(core, max);
            debug_assert_eq!(core.right(max), NIL);
            core.node_mut(max).right = right;
            if right != NIL {
                core.node_mut(right).parent = max;
            }
        }
        (removed.key, removed.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::BTreeMap;

    fn root_key(tree: &SplayTree<i32, i32>) -> Option<i32> {
        let root = tree.core().root();
        (root != NIL).then(|| tree.core().node(root).key)
    }

    #[test]
    fn inserted_key_becomes_the_root() {
        let mut tree: SplayTree<i32, i32> = SplayTree::new();
        for k in [5, 1, 9, 3, 7] {
            tree.insert(k, k);
            assert_eq!(root_key(&tree), Some(k));
        }
    }

    #[test]
    fn mutable_access_re_roots() {
        let mut tree: SplayTree<i32, i32> = SplayTree::new();
        for k in 0..50 {
            tree.insert(k, k);
        }
        *tree.get_mut(&17).unwrap() += 100;
        assert_eq!(root_key(&tree), Some(17));
        assert_eq!(tree.get(&17), Some(&117));
        // shared lookups do not restructure
        tree.get(&3);
        assert_eq!(root_key(&tree), Some(17));
    }

    #[test]
    fn erase_joins_subtrees() {
        let mut tree: SplayTree<i32, i32> = SplayTree::new();
        for k in 0..100 {
            tree.insert(k, k);
        }
        for k in (0..100).step_by(3) {
            assert_eq!(tree.erase(&k), Some(k));
        }
        let expected: Vec<i32> = (0..100).filter(|k| k % 3 != 0).collect();
        assert_eq!(tree.iter().map(|(k, _)| *k).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn random_ops_match_oracle() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5b1a);
        let mut tree: SplayTree<u16, u16> = SplayTree::new();
        let mut oracle = BTreeMap::new();
        for _ in 0..2000 {
            let key = rng.gen_range(0..200);
            if rng.gen_bool(0.6) {
                let value = rng.gen();
                assert_eq!(tree.insert(key, value), oracle.insert(key, value));
            } else {
                assert_eq!(tree.erase(&key), oracle.remove(&key));
            }
        }
        assert!(tree
            .iter()
            .map(|(k, v)| (*k, *v))
            .eq(oracle.iter().map(|(k, v)| (*k, *v))));
    }
}
