use crate::search_tree::{BalancingPolicy, EraseEvent, NodeIdx, SearchTree, TreeCore, NIL};

/// Red-black ordered map keyed on user keys (unlike the allocator's size
/// tree).
pub type RbTree<K, V> = SearchTree<K, V, RedBlackPolicy>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Color {
    Red,
    Black,
}

impl Default for Color {
    fn default() -> Self {
        Color::Red
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RedBlackPolicy;

fn is_red<K, V>(core: &TreeCore<K, V, Color>, idx: NodeIdx) -> bool {
    idx != NIL && core.aux(idx) == Color::Red
}

fn set_color<K, V>(core: &mut TreeCore<K, V, Color>, idx: NodeIdx, color: Color) {
    core.set_aux(idx, color);
}

fn insert_fixup<K, V>(core: &mut TreeCore<K, V, Color>, mut z: NodeIdx) {
    while is_red(core, core.parent(z)) {
        let p = core.parent(z);
        let g = core.parent(p);
        debug_assert_ne!(g, NIL, "red root");
        if p == core.left(g) {
            let u = core.right(g);
            if is_red(core, u) {
                set_color(core, p, Color::Black);
                set_color(core, u, Color::Black);
                set_color(core, g, Color::Red);
                z = g;
            } else {
                if z == core.right(p) {
                    z = p;
                    core.rotate_left(z);
                }
                let p = core.parent(z);
                let g = core.parent(p);
                set_color(core, p, Color::Black);
                set_color(core, g, Color::Red);
                core.rotate_right(g);
            }
        } else {
            let u = core.left(g);
            if is_red(core, u) {
                set_color(core, p, Color::Black);
                set_color(core, u, Color::Black);
                set_color(core, g, Color::Red);
                z = g;
            } else {
                if z == core.left(p) {
                    z = p;
                    core.rotate_right(z);
                }
                let p = core.parent(z);
                let g = core.parent(p);
                set_color(core, p, Color::Black);
                set_color(core, g, Color::Red);
                core.rotate_left(g);
            }
        }
    }
    let root = core.root();
    set_color(core, root, Color::Black);
}

/// Double-black propagation; `x` may be [`NIL`] (treated black), `xp` is
/// its parent. The sibling is never [`NIL`] while a deficit exists.
fn erase_fixup<K, V>(core: &mut TreeCore<K, V, Color>, mut x: NodeIdx, mut xp: NodeIdx) {
    while x != core.root() && !is_red(core, x) {
        if xp == NIL {
            break;
        }
        if x == core.left(xp) {
            let mut w = core.right(xp);
            if is_red(core, w) {
                set_color(core, w, Color::Black);
                set_color(core, xp, Color::Red);
                core.rotate_left(xp);
                w = core.right(xp);
            }
            debug_assert_ne!(w, NIL);
            if !is_red(core, core.left(w)) && !is_red(core, core.right(w)) {
                set_color(core, w, Color::Red);
                x = xp;
                xp = core.parent(x);
            } else {
                if !is_red(core, core.right(w)) {
                    let wl = core.left(w);
                    set_color(core, wl, Color::Black);
                    set_color(core, w, Color::Red);
                    core.rotate_right(w);
                    w = core.right(xp);
                }
                let xp_color = core.aux(xp);
                set_color(core, w, xp_color);
                set_color(core, xp, Color::Black);
                let wr = core.right(w);
                set_color(core, wr, Color::Black);
                core.rotate_left(xp);
                x = core.root();
                xp = NIL;
            }
        } else {
            let mut w = core.left(xp);
            if is_red(core, w) {
                set_color(core, w, Color::Black);
                set_color(core, xp, Color::Red);
                core.rotate_right(xp);
                w = core.left(xp);
            }
            debug_assert_ne!(w, NIL);
            if !is_red(core, core.left(w)) && !is_red(core, core.right(w)) {
                set_color(core, w, Color::Red);
                x = xp;
                xp = core.parent(x);
            } else {
                if !is_red(core, core.left(w)) {
                    let wr = core.right(w);
                    set_color(core, wr, Color::Black);
                    set_color(core, w, Color::Red);
                    core.rotate_left(w);
                    w = core.left(xp);
                }
                let xp_color = core.aux(xp);
                set_color(core, w, xp_color);
                set_color(core, xp, Color::Black);
                let wl = core.left(w);
                set_color(core, wl, Color::Black);
                core.rotate_right(xp);
                x = core.root();
                xp = NIL;
            }
        }
    }
    if x != NIL {
        set_color(core, x, Color::Black);
    }
}

impl<K, V> BalancingPolicy<K, V> for RedBlackPolicy {
    type Aux = Color;

    fn on_insert(&self, core: &mut TreeCore<K, V, Color>, node: NodeIdx) {
        set_color(core, node, Color::Red);
        insert_fixup(core, node);
    }

    fn on_erase(&self, core: &mut TreeCore<K, V, Color>, event: &EraseEvent<Color>) {
        if event.aux == Color::Black {
            erase_fixup(core, event.replacement, event.parent);
        }
    }

    fn validate(&self, core: &TreeCore<K, V, Color>) {
        fn black_height<K, V>(core: &TreeCore<K, V, Color>, idx: NodeIdx) -> usize {
            if idx == NIL {
                return 1;
            }
            if is_red(core, idx) {
                assert!(
                    !is_red(core, core.left(idx)) && !is_red(core, core.right(idx)),
                    "red node with a red child"
                );
            }
            let lh = black_height(core, core.left(idx));
            let rh = black_height(core, core.right(idx));
            assert_eq!(lh, rh, "unequal black heights");
            lh + (core.aux(idx) == Color::Black) as usize
        }
        if core.root() != NIL {
            assert_eq!(core.aux(core.root()), Color::Black, "red root");
        }
        black_height(core, core.root());
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
        let mut tree: RbTree<i32, i32> = RbTree::new();
        for k in 0..1024 {
            tree.insert(k, k);
        }
        // rb height is at most 2 log2(n + 1)
        assert!(tree.height() <= 20, "height {}", tree.height());
    }

    #[test]
    fn random_ops_match_oracle() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x2b7e3);
        let mut tree: RbTree<u16, u16> = RbTree::new();
        let mut oracle = BTreeMap::new();
        for _ in 0..3000 {
            let key = rng.gen_range(0..400);
            if rng.gen_bool(0.55) {
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

    #[test]
    fn erase_to_empty_and_reuse() {
        let mut tree: RbTree<i32, i32> = RbTree::new();
        for k in 0..200 {
            tree.insert(k, k);
        }
        for k in 0..200 {
            assert_eq!(tree.erase(&k), Some(k));
        }
        assert!(tree.is_empty());
        for k in 0..50 {
            tree.insert(k, -k);
        }
        assert_eq!(tree.len(), 50);
    }
}
