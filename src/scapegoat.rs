use crate::search_tree::{BalancingPolicy, EraseEvent, NodeIdx, SearchTree, TreeCore, NIL};
use crate::{Error, Result};
use std::cell::Cell;

/// Weight-balanced map: subtree rebuilds instead of rotations.
pub type ScapegoatTree<K, V> = SearchTree<K, V, ScapegoatPolicy>;

/// Subtree-size policy with runtime α ∈ (0.5, 1). Insertion rebuilds every
/// weight-violating ancestor (deepest first); erasure rebuilds the whole
/// tree once it shrinks under α of its historical maximum.
#[derive(Debug)]
pub struct ScapegoatPolicy {
    alpha: f64,
    max_len: Cell<usize>,
}

impl ScapegoatPolicy {
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.5 && alpha < 1.0) {
            return Err(Error::InvalidArgument("alpha must lie in (0.5, 1)"));
        }
        Ok(ScapegoatPolicy {
            alpha,
            max_len: Cell::new(0),
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl Default for ScapegoatPolicy {
    fn default() -> Self {
        ScapegoatPolicy {
            alpha: 0.75,
            max_len: Cell::new(0),
        }
    }
}

fn size<K, V>(core: &TreeCore<K, V, u32>, idx: NodeIdx) -> usize {
    if idx == NIL {
        0
    } else {
        core.aux(idx) as usize
    }
}

fn violates<K, V>(core: &TreeCore<K, V, u32>, idx: NodeIdx, alpha: f64) -> bool {
    let heavier = size(core, core.left(idx)).max(size(core, core.right(idx)));
    heavier as f64 > alpha * size(core, idx) as f64
}

/// Rebuilds `top`'s subtree into a perfectly balanced one by midpoint
/// selection over its in-order sequence, with an explicit work stack.
fn rebuild<K, V>(core: &mut TreeCore<K, V, u32>, top: NodeIdx) {
    let parent = core.parent(top);
    let on_left = parent != NIL && core.left(parent) == top;
    let ids = core.collect_in_order(top);

    // jobs are half-open ranges hung under (parent, side)
    let mut jobs: Vec<(usize, usize, NodeIdx, bool)> = vec![(0, ids.len(), parent, on_left)];
    while let Some((lo, hi, parent, on_left)) = jobs.pop() {
        if lo == hi {
            if on_left {
                core.node_mut(parent).left = NIL;
            } else {
                core.node_mut(parent).right = NIL;
            }
            continue;
        }
        let mid = lo + (hi - lo) / 2;
        let idx = ids[mid];
        core.node_mut(idx).parent = parent;
        core.set_aux(idx, (hi - lo) as u32);
        if parent == NIL {
            core.set_root(idx);
        } else if on_left {
            core.node_mut(parent).left = idx;
        } else {
            core.node_mut(parent).right = idx;
        }
        jobs.push((lo, mid, idx, true));
        jobs.push((mid + 1, hi, idx, false));
    }
}

impl<K, V> BalancingPolicy<K, V> for ScapegoatPolicy {
    type Aux = u32;

    fn on_insert(&self, core: &mut TreeCore<K, V, u32>, node: NodeIdx) {
        core.set_aux(node, 1);
        let mut idx = core.parent(node);
        while idx != NIL {
            core.set_aux(idx, core.aux(idx) + 1);
            idx = core.parent(idx);
        }
        self.max_len.set(self.max_len.get().max(core.len()));

        // rebuild every violating ancestor, deepest first
        let mut idx = core.parent(node);
        while idx != NIL {
            let parent = core.parent(idx);
            if violates(core, idx, self.alpha) {
                rebuild(core, idx);
            }
            idx = parent;
        }
    }

    fn on_erase(&self, core: &mut TreeCore<K, V, u32>, event: &EraseEvent<u32>) {
        let mut idx = event.parent;
        while idx != NIL {
            core.set_aux(idx, core.aux(idx) - 1);
            idx = core.parent(idx);
        }
        if (core.len() as f64) < self.alpha * self.max_len.get() as f64 {
            if core.root() != NIL {
                rebuild(core, core.root());
            }
            self.max_len.set(core.len());
        }
    }

    fn validate(&self, core: &TreeCore<K, V, u32>) {
        fn check<K, V>(core: &TreeCore<K, V, u32>, idx: NodeIdx) -> usize {
            if idx == NIL {
                return 0;
            }
            let total = 1 + check(core, core.left(idx)) + check(core, core.right(idx));
            assert_eq!(core.aux(idx) as usize, total, "stale subtree size");
            total
        }
        check(core, core.root());
    }
}

/// Asserts the α-weight bound at every node; inserts maintain it, erases
/// only until the next whole-tree rebuild.
pub fn assert_weight_balanced<K, V>(core: &TreeCore<K, V, u32>, alpha: f64) {
    if core.root() == NIL {
        return;
    }
    let mut stack = vec![core.root()];
    while let Some(idx) = stack.pop() {
        assert!(
            !violates(core, idx, alpha),
            "weight balance violated at a node of size {}",
            size(core, idx)
        );
        for child in [core.left(idx), core.right(idx)] {
            if child != NIL {
                stack.push(child);
            }
        }
    }
}
