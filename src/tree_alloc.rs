use crate::memory::{BlockInfo, FitMode, MemoryResource, ResourceHandle};
use crate::util::align_up;
use crate::{Error, Result};
use std::ptr::{self, NonNull};
use std::sync::Mutex;
use tracing::{error, info, trace, warn};

const OCC_HEADER: usize = 32;
const FREE_HEADER: usize = 48;
const MIN_PAYLOAD: usize = 16;

const OCCUPIED_BIT: u8 = 0x1;
const RED_BIT: u8 = 0x2;

/// Intrusive block header. `tag`/`back`/`forward`/`parent` are present in
/// every block; `left`/`right` only exist while the block is free (an
/// occupied block's payload starts where `left` would be). Occupied blocks
/// repurpose `parent` as a pointer to the region base, which doubles as the
/// foreign-block guard.
#[repr(C)]
struct Block {
    tag: u8,
    _pad: [u8; 7],
    back: *mut Block,
    forward: *mut Block,
    parent: *mut Block,
    left: *mut Block,
    right: *mut Block,
}

/// Free blocks indexed by payload size in an intrusive red-black tree,
/// plus an address-ordered doubly-linked list over all blocks used for
/// coalescing. Block sizes are implicit: the distance to the `forward`
/// neighbor (or the region end).
pub struct RbTreeAllocator {
    region: NonNull<u8>,
    region_size: usize,
    parent: ResourceHandle,
    state: Mutex<State>,
}

struct State {
    base: *mut u8,
    size: usize,
    root: *mut Block,
    fit: FitMode,
}

// SAFETY: the region is exclusively owned; every touch of it goes through
// the state mutex.
unsafe impl Send for RbTreeAllocator {}
unsafe impl Sync for RbTreeAllocator {}

impl RbTreeAllocator {
    pub fn new(region_size: usize, parent: Option<ResourceHandle>, fit: FitMode) -> Result<Self> {
        if region_size < FREE_HEADER + MIN_PAYLOAD {
            return Err(Error::InvalidArgument("region is too small"));
        }
        let parent = parent.unwrap_or_default();
        let region = parent.allocate(region_size)?;
        let first = region.as_ptr() as *mut Block;
        // SAFETY: the region is at least one free header long
        unsafe {
            (*first).tag = 0; // free, black
            (*first).back = ptr::null_mut();
            (*first).forward = ptr::null_mut();
            (*first).parent = ptr::null_mut();
            (*first).left = ptr::null_mut();
            (*first).right = ptr::null_mut();
        }
        Ok(RbTreeAllocator {
            region,
            region_size,
            parent,
            state: Mutex::new(State {
                base: region.as_ptr(),
                size: region_size,
                root: first,
                fit,
            }),
        })
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }
}

impl MemoryResource for RbTreeAllocator {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        let mut st = self.state.lock().unwrap();
        if bytes > self.region_size {
            error!(bytes, "rb out of memory");
            return Err(Error::OutOfMemory);
        }
        let need = align_up(bytes.max(1), MIN_PAYLOAD);
        trace!(bytes, need, "rb allocate");
        if need != bytes {
            warn!(requested = bytes, granted = need, "rb rounded allocation");
        }
        // SAFETY: all block graphs below stay inside the owned region
        unsafe {
            let block = match st.fit {
                FitMode::First => st.find_first(need),
                FitMode::Best => st.find_best(need),
                FitMode::Worst => st.find_worst(need),
            };
            let Some(block) = block else {
                error!(bytes, "rb out of memory");
                return Err(Error::OutOfMemory);
            };

            st.tree_remove(block);
            let payload = st.payload(block);
            (*block).tag |= OCCUPIED_BIT;
            (*block).parent = st.base as *mut Block;

            if payload >= need + OCC_HEADER + MIN_PAYLOAD {
                // carve the tail into a new free block
                let tail = (block as *mut u8).add(OCC_HEADER + need) as *mut Block;
                (*tail).tag = 0;
                (*tail).back = block;
                (*tail).forward = (*block).forward;
                if !(*tail).forward.is_null() {
                    (*(*tail).forward).back = tail;
                }
                (*block).forward = tail;
                st.tree_insert(tail);
            }

            info!(bytes, available = st.free_total(), "rb allocated");
            st.validate();
            Ok(NonNull::new_unchecked((block as *mut u8).add(OCC_HEADER)))
        }
    }

    fn deallocate(&self, ptr: NonNull<u8>, _bytes: usize) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let base = st.base as usize;
        let addr = ptr.as_ptr() as usize;
        if addr < base + OCC_HEADER || addr >= base + st.size {
            error!("rb deallocate of foreign pointer");
            return Err(Error::ForeignBlock);
        }
        // SAFETY: pointer arithmetic stays inside the owned region
        unsafe {
            let mut block = (ptr.as_ptr().sub(OCC_HEADER)) as *mut Block;
            if (*block).tag & OCCUPIED_BIT == 0 || (*block).parent != st.base as *mut Block {
                error!("rb deallocate of foreign pointer");
                return Err(Error::ForeignBlock);
            }
            (*block).tag &= !OCCUPIED_BIT;
            (*block).parent = ptr::null_mut();

            let back = (*block).back;
            if !back.is_null() && (*back).tag & OCCUPIED_BIT == 0 {
                // extend the free predecessor over this block
                st.tree_remove(back);
                (*back).forward = (*block).forward;
                if !(*back).forward.is_null() {
                    (*(*back).forward).back = back;
                }
                block = back;
            }
            let forward = (*block).forward;
            if !forward.is_null() && (*forward).tag & OCCUPIED_BIT == 0 {
                st.tree_remove(forward);
                (*block).forward = (*forward).forward;
                if !(*block).forward.is_null() {
                    (*(*block).forward).back = block;
                }
            }
            st.tree_insert(block);

            info!(available = st.free_total(), "rb deallocated");
            st.validate();
        }
        Ok(())
    }

    fn set_fit_mode(&self, mode: FitMode) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        trace!(?mode, "rb fit mode change");
        st.fit = mode;
        Ok(())
    }

    fn blocks_info(&self) -> Vec<BlockInfo> {
        let st = self.state.lock().unwrap();
        let mut blocks = Vec::new();
        // SAFETY: walking the address list inside the region
        unsafe {
            let mut b = st.base as *mut Block;
            while !b.is_null() {
                blocks.push(BlockInfo {
                    size: st.payload(b),
                    occupied: (*b).tag & OCCUPIED_BIT != 0,
                });
                b = (*b).forward;
            }
        }
        blocks
    }

    fn available_memory(&self) -> usize {
        let st = self.state.lock().unwrap();
        unsafe { st.free_total() }
    }
}

impl Drop for RbTreeAllocator {
    fn drop(&mut self) {
        let _ = self.parent.deallocate(self.region, self.region_size);
    }
}

unsafe fn is_red(b: *mut Block) -> bool {
    !b.is_null() && (*b).tag & RED_BIT != 0
}

unsafe fn set_red(b: *mut Block, red: bool) {
    if red {
        (*b).tag |= RED_BIT;
    } else {
        (*b).tag &= !RED_BIT;
    }
}

impl State {
    unsafe fn payload(&self, b: *mut Block) -> usize {
        let end = if (*b).forward.is_null() {
            self.base as usize + self.size
        } else {
            (*b).forward as usize
        };
        end - b as usize - OCC_HEADER
    }

    unsafe fn free_total(&self) -> usize {
        let mut total = 0;
        let mut b = self.base as *mut Block;
        while !b.is_null() {
            if (*b).tag & OCCUPIED_BIT == 0 {
                total += self.payload(b);
            }
            b = (*b).forward;
        }
        total
    }

    // region fit descents

    unsafe fn find_first(&self, need: usize) -> Option<*mut Block> {
        let mut node = self.root;
        while !node.is_null() {
            if self.payload(node) >= need {
                return Some(node);
            }
            node = (*node).right;
        }
        None
    }

    unsafe fn find_best(&self, need: usize) -> Option<*mut Block> {
        let mut node = self.root;
        let mut best = None;
        while !node.is_null() {
            let size = self.payload(node);
            if size >= need {
                best = Some(node);
            }
            if size < need {
                node = (*node).right;
            } else if size > need {
                node = (*node).left;
            } else {
                break;
            }
        }
        best
    }

    unsafe fn find_worst(&self, need: usize) -> Option<*mut Block> {
        let mut node = self.root;
        let mut worst = None;
        while !node.is_null() {
            if self.payload(node) >= need {
                worst = Some(node);
            }
            node = (*node).right;
        }
        worst
    }

    // endregion fit descents

    // region size tree maintenance

    unsafe fn replace_child(&mut self, parent: *mut Block, old: *mut Block, new: *mut Block) {
        if parent.is_null() {
            self.root = new;
        } else if (*parent).left == old {
            (*parent).left = new;
        } else {
            debug_assert!((*parent).right == old);
            (*parent).right = new;
        }
    }

    unsafe fn rotate_left(&mut self, x: *mut Block) {
        let y = (*x).right;
        debug_assert!(!y.is_null());
        (*x).right = (*y).left;
        if !(*y).left.is_null() {
            (*(*y).left).parent = x;
        }
        (*y).parent = (*x).parent;
        self.replace_child((*x).parent, x, y);
        (*y).left = x;
        (*x).parent = y;
    }

    unsafe fn rotate_right(&mut self, x: *mut Block) {
        let y = (*x).left;
        debug_assert!(!y.is_null());
        (*x).left = (*y).right;
        if !(*y).right.is_null() {
            (*(*y).right).parent = x;
        }
        (*y).parent = (*x).parent;
        self.replace_child((*x).parent, x, y);
        (*y).right = x;
        (*x).parent = y;
    }

    unsafe fn tree_insert(&mut self, z: *mut Block) {
        (*z).left = ptr::null_mut();
        (*z).right = ptr::null_mut();
        set_red(z, true);

        let key = self.payload(z);
        let mut parent = ptr::null_mut();
        let mut node = self.root;
        while !node.is_null() {
            parent = node;
            node = if key < self.payload(node) {
                (*node).left
            } else {
                (*node).right
            };
        }
        (*z).parent = parent;
        if parent.is_null() {
            self.root = z;
        } else if key < self.payload(parent) {
            (*parent).left = z;
        } else {
            (*parent).right = z;
        }

        // CLRS insert fixup
        let mut z = z;
        while is_red((*z).parent) {
            let p = (*z).parent;
            let g = (*p).parent;
            debug_assert!(!g.is_null());
            if p == (*g).left {
                let u = (*g).right;
                if is_red(u) {
                    set_red(p, false);
                    set_red(u, false);
                    set_red(g, true);
                    z = g;
                } else {
                    if z == (*p).right {
                        z = p;
                        self.rotate_left(z);
                    }
                    let p = (*z).parent;
                    let g = (*p).parent;
                    set_red(p, false);
                    set_red(g, true);
                    self.rotate_right(g);
                }
            } else {
                let u = (*g).left;
                if is_red(u) {
                    set_red(p, false);
                    set_red(u, false);
                    set_red(g, true);
                    z = g;
                } else {
                    if z == (*p).left {
                        z = p;
                        self.rotate_right(z);
                    }
                    let p = (*z).parent;
                    let g = (*p).parent;
                    set_red(p, false);
                    set_red(g, true);
                    self.rotate_left(g);
                }
            }
        }
        set_red(self.root, false);
    }

    unsafe fn transplant(&mut self, u: *mut Block, v: *mut Block) {
        self.replace_child((*u).parent, u, v);
        if !v.is_null() {
            (*v).parent = (*u).parent;
        }
    }

    unsafe fn tree_remove(&mut self, z: *mut Block) {
        let mut y = z;
        let mut y_was_red = is_red(y);
        let x;
        let mut x_parent;

        if (*z).left.is_null() {
            x = (*z).right;
            x_parent = (*z).parent;
            self.transplant(z, (*z).right);
        } else if (*z).right.is_null() {
            x = (*z).left;
            x_parent = (*z).parent;
            self.transplant(z, (*z).left);
        } else {
            y = (*z).right;
            while !(*y).left.is_null() {
                y = (*y).left;
            }
            y_was_red = is_red(y);
            x = (*y).right;
            if (*y).parent == z {
                x_parent = y;
            } else {
                x_parent = (*y).parent;
                self.transplant(y, (*y).right);
                (*y).right = (*z).right;
                (*(*y).right).parent = y;
            }
            self.transplant(z, y);
            (*y).left = (*z).left;
            (*(*y).left).parent = y;
            set_red(y, is_red(z));
        }

        if y_was_red {
            return;
        }

        // CLRS delete fixup; null children are black
        let mut x = x;
        while x != self.root && !is_red(x) {
            if x_parent.is_null() {
                break;
            }
            if x == (*x_parent).left {
                let mut w = (*x_parent).right;
                if is_red(w) {
                    set_red(w, false);
                    set_red(x_parent, true);
                    self.rotate_left(x_parent);
                    w = (*x_parent).right;
                }
                debug_assert!(!w.is_null());
                if !is_red((*w).left) && !is_red((*w).right) {
                    set_red(w, true);
                    x = x_parent;
                    x_parent = (*x).parent;
                } else {
                    if !is_red((*w).right) {
                        set_red((*w).left, false);
                        set_red(w, true);
                        self.rotate_right(w);
                        w = (*x_parent).right;
                    }
                    set_red(w, is_red(x_parent));
                    set_red(x_parent, false);
                    set_red((*w).right, false);
                    self.rotate_left(x_parent);
                    x = self.root;
                    x_parent = ptr::null_mut();
                }
            } else {
                let mut w = (*x_parent).left;
                if is_red(w) {
                    set_red(w, false);
                    set_red(x_parent, true);
                    self.rotate_right(x_parent);
                    w = (*x_parent).left;
                }
                debug_assert!(!w.is_null());
                if !is_red((*w).left) && !is_red((*w).right) {
                    set_red(w, true);
                    x = x_parent;
                    x_parent = (*x).parent;
                } else {
                    if !is_red((*w).left) {
                        set_red((*w).right, false);
                        set_red(w, true);
                        self.rotate_left(w);
                        w = (*x_parent).left;
                    }
                    set_red(w, is_red(x_parent));
                    set_red(x_parent, false);
                    set_red((*w).left, false);
                    self.rotate_right(x_parent);
                    x = self.root;
                    x_parent = ptr::null_mut();
                }
            }
        }
        if !x.is_null() {
            set_red(x, false);
        }
    }

    // endregion size tree maintenance

    fn validate(&self) {
        if cfg!(debug_assertions) {
            unsafe { self.force_validate() };
        }
    }

    /// Checks the address list and size tree against each other and the
    /// red-black properties.
    unsafe fn force_validate(&self) {
        let mut list_free = Vec::new();
        let mut covered = 0usize;
        let mut prev_free = false;
        let mut b = self.base as *mut Block;
        while !b.is_null() {
            let free = (*b).tag & OCCUPIED_BIT == 0;
            covered += self.payload(b) + OCC_HEADER;
            if free {
                assert!(!prev_free, "adjacent free blocks survived coalescing");
                list_free.push(b as usize);
            }
            prev_free = free;
            b = (*b).forward;
        }
        assert_eq!(covered, self.size);

        let mut tree_free = Vec::new();
        self.collect_tree(self.root, &mut tree_free);
        list_free.sort_unstable();
        tree_free.sort_unstable();
        assert_eq!(list_free, tree_free);

        assert!(!is_red(self.root));
        self.black_height(self.root);
    }

    unsafe fn collect_tree(&self, node: *mut Block, out: &mut Vec<usize>) {
        if node.is_null() {
            return;
        }
        out.push(node as usize);
        self.collect_tree((*node).left, out);
        self.collect_tree((*node).right, out);
    }

    unsafe fn black_height(&self, node: *mut Block) -> usize {
        if node.is_null() {
            return 1;
        }
        if is_red(node) {
            assert!(!is_red((*node).left) && !is_red((*node).right), "red-red");
        }
        let lh = self.black_height((*node).left);
        let rh = self.black_height((*node).right);
        assert_eq!(lh, rh, "unequal black heights");
        lh + if is_red(node) { 0 } else { 1 }
    }
}
