use crate::memory::{BlockInfo, FitMode, MemoryResource, ResourceHandle};
use crate::util::align_up;
use crate::{Error, Result};
use std::ptr::{self, NonNull};
use std::sync::Mutex;
use tracing::{error, info, trace, warn};

const HEADER: usize = 16;
const MIN_PAYLOAD: usize = 16;

/// Per-block header: `{next_or_region, size}`. Free blocks chain to the
/// next free block in address order; occupied blocks repurpose the word as
/// a pointer to the region base (the foreign-block guard). `size` is the
/// payload size in both states.
#[repr(C)]
struct Block {
    next_or_region: *mut Block,
    size: usize,
}

/// Address-sorted singly linked free list over a single trusted region.
/// Coalescing is immediate: adjacent free blocks never exist.
pub struct SortedListAllocator {
    region: NonNull<u8>,
    region_size: usize,
    parent: ResourceHandle,
    state: Mutex<State>,
}

struct State {
    base: *mut u8,
    size: usize,
    head: *mut Block,
    fit: FitMode,
}

// SAFETY: the region is exclusively owned; all access is under the mutex.
unsafe impl Send for SortedListAllocator {}
unsafe impl Sync for SortedListAllocator {}

impl SortedListAllocator {
    pub fn new(region_size: usize, parent: Option<ResourceHandle>, fit: FitMode) -> Result<Self> {
        if region_size < HEADER + MIN_PAYLOAD {
            return Err(Error::InvalidArgument("region is too small"));
        }
        let parent = parent.unwrap_or_default();
        let region = parent.allocate(region_size)?;
        let first = region.as_ptr() as *mut Block;
        // SAFETY: the region holds at least one header
        unsafe {
            (*first).next_or_region = ptr::null_mut();
            (*first).size = region_size - HEADER;
        }
        Ok(SortedListAllocator {
            region,
            region_size,
            parent,
            state: Mutex::new(State {
                base: region.as_ptr(),
                size: region_size,
                head: first,
                fit,
            }),
        })
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }
}

impl MemoryResource for SortedListAllocator {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        let mut st = self.state.lock().unwrap();
        if bytes > self.region_size {
            error!(bytes, "list out of memory");
            return Err(Error::OutOfMemory);
        }
        let need = align_up(bytes.max(1), MIN_PAYLOAD);
        trace!(bytes, need, "list allocate");
        if need != bytes {
            warn!(requested = bytes, granted = need, "list rounded allocation");
        }
        // SAFETY: the free list stays inside the owned region
        unsafe {
            // scan the address-ordered free list per fit policy
            let mut prev: *mut Block = ptr::null_mut();
            let mut cur = st.head;
            let mut chosen: *mut Block = ptr::null_mut();
            let mut chosen_prev: *mut Block = ptr::null_mut();
            while !cur.is_null() {
                let size = (*cur).size;
                if size >= need {
                    let better = if chosen.is_null() {
                        true
                    } else {
                        match st.fit {
                            FitMode::First => false,
                            FitMode::Best => size < (*chosen).size,
                            FitMode::Worst => size >= (*chosen).size,
                        }
                    };
                    if better {
                        chosen = cur;
                        chosen_prev = prev;
                        if st.fit == FitMode::First {
                            break;
                        }
                    }
                }
                prev = cur;
                cur = (*cur).next_or_region;
            }
            if chosen.is_null() {
                error!(bytes, "list out of memory");
                return Err(Error::OutOfMemory);
            }

            if (*chosen).size >= need + HEADER + MIN_PAYLOAD {
                // the remainder keeps the chosen block's list position
                let rest = (chosen as *mut u8).add(HEADER + need) as *mut Block;
                (*rest).next_or_region = (*chosen).next_or_region;
                (*rest).size = (*chosen).size - need - HEADER;
                (*chosen).size = need;
                st.relink(chosen_prev, rest);
            } else {
                st.relink(chosen_prev, (*chosen).next_or_region);
            }
            (*chosen).next_or_region = st.base as *mut Block;

            info!(bytes, available = st.free_total(), "list allocated");
            st.validate();
            Ok(NonNull::new_unchecked((chosen as *mut u8).add(HEADER)))
        }
    }

    fn deallocate(&self, ptr: NonNull<u8>, _bytes: usize) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let base = st.base as usize;
        let addr = ptr.as_ptr() as usize;
        if addr < base + HEADER || addr >= base + st.size {
            error!("list deallocate of foreign pointer");
            return Err(Error::ForeignBlock);
        }
        // SAFETY: pointer arithmetic stays inside the owned region
        unsafe {
            let block = (ptr.as_ptr().sub(HEADER)) as *mut Block;
            if (*block).next_or_region != st.base as *mut Block {
                error!("list deallocate of foreign pointer");
                return Err(Error::ForeignBlock);
            }

            // find the address-ordered position
            let mut prev: *mut Block = ptr::null_mut();
            let mut next = st.head;
            while !next.is_null() && next < block {
                prev = next;
                next = (*next).next_or_region;
            }

            (*block).next_or_region = next;
            st.relink(prev, block);

            // coalesce with the forward neighbor, then the backward one
            if !next.is_null() && (block as *mut u8).add(HEADER + (*block).size) == next as *mut u8
            {
                (*block).size += HEADER + (*next).size;
                (*block).next_or_region = (*next).next_or_region;
            }
            if !prev.is_null() && (prev as *mut u8).add(HEADER + (*prev).size) == block as *mut u8 {
                (*prev).size += HEADER + (*block).size;
                (*prev).next_or_region = (*block).next_or_region;
            }

            info!(available = st.free_total(), "list deallocated");
            st.validate();
        }
        Ok(())
    }

    fn set_fit_mode(&self, mode: FitMode) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        trace!(?mode, "list fit mode change");
        st.fit = mode;
        Ok(())
    }

    fn blocks_info(&self) -> Vec<BlockInfo> {
        let st = self.state.lock().unwrap();
        let mut blocks = Vec::new();
        // SAFETY: address walk over contiguous blocks
        unsafe {
            st.for_each_block(|_, size, occupied| blocks.push(BlockInfo { size, occupied }));
        }
        blocks
    }

    fn available_memory(&self) -> usize {
        let st = self.state.lock().unwrap();
        unsafe { st.free_total() }
    }
}

impl Drop for SortedListAllocator {
    fn drop(&mut self) {
        let _ = self.parent.deallocate(self.region, self.region_size);
    }
}

impl State {
    unsafe fn relink(&mut self, prev: *mut Block, to: *mut Block) {
        if prev.is_null() {
            self.head = to;
        } else {
            (*prev).next_or_region = to;
        }
    }

    unsafe fn for_each_block(&self, mut f: impl FnMut(*mut Block, usize, bool)) {
        let mut addr = self.base;
        let end = self.base.add(self.size);
        while addr < end {
            let block = addr as *mut Block;
            let occupied = (*block).next_or_region == self.base as *mut Block;
            f(block, (*block).size, occupied);
            addr = addr.add(HEADER + (*block).size);
        }
    }

    unsafe fn free_total(&self) -> usize {
        let mut total = 0;
        let mut cur = self.head;
        while !cur.is_null() {
            total += (*cur).size;
            cur = (*cur).next_or_region;
        }
        total
    }

    fn validate(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        // SAFETY: read-only walks inside the region
        unsafe {
            let mut covered = 0usize;
            let mut walk_free = Vec::new();
            let mut prev_free = false;
            self.for_each_block(|b, size, occupied| {
                covered += HEADER + size;
                if !occupied {
                    assert!(!prev_free, "adjacent free blocks survived coalescing");
                    walk_free.push(b as usize);
                }
                prev_free = !occupied;
            });
            assert_eq!(covered, self.size);

            let mut list_free = Vec::new();
            let mut cur = self.head;
            while !cur.is_null() {
                if let Some(&last) = list_free.last() {
                    assert!(last < cur as usize, "free list out of address order");
                }
                list_free.push(cur as usize);
                cur = (*cur).next_or_region;
            }
            assert_eq!(walk_free, list_free);
        }
    }
}
