use crate::memory::{BlockInfo, FitMode, MemoryResource, ResourceHandle};
use crate::util::ceil_log2;
use crate::{Error, Result};
use std::ptr::NonNull;
use std::sync::Mutex;
use tracing::{error, info, trace, warn};

/// Occupied blocks carry a tag byte plus a back-pointer to the region base;
/// padding keeps payloads 16-aligned.
const OCCUPIED_HEADER: usize = 16;
const BACKPTR_OFFSET: usize = 8;
const OCCUPIED_BIT: u8 = 0x80;

/// Smallest block exponent: the block must hold the occupied header and a
/// pointer-sized payload.
pub const MIN_K: u32 = {
    let need = OCCUPIED_HEADER + std::mem::size_of::<*const u8>();
    (usize::BITS - (need - 1).leading_zeros()) as u32
};

/// Power-of-two buddy system over a single trusted region of `2^k` bytes.
///
/// Block metadata lives inside the region: one tag byte
/// `(occupied:1, size_k:7)` per block, `size_k` relative to [`MIN_K`].
/// The buddy of the block at offset `o` with size `s` sits at `o ^ s`.
pub struct BuddyAllocator {
    region: NonNull<u8>,
    region_k: u32,
    parent: ResourceHandle,
    fit: Mutex<FitMode>,
}

// SAFETY: the region is exclusively owned and all byte access happens under
// the fit-mode mutex.
unsafe impl Send for BuddyAllocator {}
unsafe impl Sync for BuddyAllocator {}

impl BuddyAllocator {
    /// `k` is the region exponent; the arena spans `2^k` bytes taken from
    /// `parent` (the system resource when `None`).
    pub fn new(k: u32, parent: Option<ResourceHandle>, fit: FitMode) -> Result<Self> {
        if k < MIN_K {
            return Err(Error::InvalidArgument("buddy region is too small"));
        }
        if k >= usize::BITS || k - MIN_K > 0x7f {
            return Err(Error::InvalidArgument("buddy region is too large"));
        }
        let parent = parent.unwrap_or_default();
        let region = parent.allocate(1usize << k)?;
        let alloc = BuddyAllocator {
            region,
            region_k: k,
            parent,
            fit: Mutex::new(fit),
        };
        // SAFETY: the region was just acquired and is at least one byte
        unsafe { alloc.set_tag(0, false, k - MIN_K) };
        Ok(alloc)
    }

    pub fn region_size(&self) -> usize {
        1usize << self.region_k
    }

    unsafe fn tag(&self, offset: usize) -> u8 {
        self.region.as_ptr().add(offset).read()
    }

    unsafe fn set_tag(&self, offset: usize, occupied: bool, rel_k: u32) {
        debug_assert!(rel_k <= 0x7f);
        let tag = if occupied { OCCUPIED_BIT } else { 0 } | rel_k as u8;
        self.region.as_ptr().add(offset).write(tag);
    }

    unsafe fn block_size(&self, offset: usize) -> usize {
        1usize << ((self.tag(offset) & 0x7f) as u32 + MIN_K)
    }

    unsafe fn occupied(&self, offset: usize) -> bool {
        self.tag(offset) & OCCUPIED_BIT != 0
    }

    /// Address-ordered walk over `(offset, size, occupied)`.
    unsafe fn for_each_block(&self, mut f: impl FnMut(usize, usize, bool)) {
        let mut offset = 0;
        while offset < self.region_size() {
            let size = self.block_size(offset);
            f(offset, size, self.occupied(offset));
            offset += size;
        }
    }

    unsafe fn find_block(&self, need: usize, fit: FitMode) -> Option<usize> {
        let mut chosen: Option<(usize, usize)> = None;
        let mut offset = 0;
        while offset < self.region_size() {
            let size = self.block_size(offset);
            if !self.occupied(offset) && size >= need {
                let better = match (fit, chosen) {
                    (_, None) => true,
                    (FitMode::First, Some(_)) => false,
                    (FitMode::Best, Some((_, s))) => size < s,
                    (FitMode::Worst, Some((_, s))) => size >= s,
                };
                if better {
                    chosen = Some((offset, size));
                    if fit == FitMode::First {
                        break;
                    }
                }
            }
            offset += size;
        }
        chosen.map(|(o, _)| o)
    }

    unsafe fn free_total(&self) -> usize {
        let mut total = 0;
        self.for_each_block(|_, size, occupied| {
            if !occupied {
                total += size;
            }
        });
        total
    }

    fn do_allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        let fit = self.fit.lock().unwrap();
        let Some(need) = bytes.checked_add(OCCUPIED_HEADER) else {
            error!(bytes, "buddy out of memory");
            return Err(Error::OutOfMemory);
        };
        trace!(bytes, need, "buddy allocate");

        unsafe {
            let Some(offset) = self.find_block(need, *fit) else {
                error!(bytes, "buddy out of memory");
                return Err(Error::OutOfMemory);
            };

            // split until the next halving would not fit
            let mut rel_k = (self.tag(offset) & 0x7f) as u32;
            while rel_k > 0 && self.block_size(offset) >= need.saturating_mul(2) {
                rel_k -= 1;
                let half = 1usize << (rel_k + MIN_K);
                self.set_tag(offset, false, rel_k);
                self.set_tag(offset + half, false, rel_k);
            }

            if self.block_size(offset) != need {
                warn!(
                    requested = bytes,
                    granted = self.block_size(offset) - OCCUPIED_HEADER,
                    "buddy rounded allocation"
                );
            }

            self.set_tag(offset, true, rel_k);
            let block = self.region.as_ptr().add(offset);
            block
                .add(BACKPTR_OFFSET)
                .cast::<*mut u8>()
                .write(self.region.as_ptr());

            info!(
                bytes,
                available = self.free_total(),
                "buddy allocated"
            );
            Ok(NonNull::new_unchecked(block.add(OCCUPIED_HEADER)))
        }
    }

    fn do_deallocate(&self, ptr: NonNull<u8>) -> Result<()> {
        let _fit = self.fit.lock().unwrap();
        let base = self.region.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        if addr < base + OCCUPIED_HEADER || addr >= base + self.region_size() {
            error!("buddy deallocate of foreign pointer");
            return Err(Error::ForeignBlock);
        }
        let mut offset = addr - base - OCCUPIED_HEADER;

        unsafe {
            let backptr = self
                .region
                .as_ptr()
                .add(offset + BACKPTR_OFFSET)
                .cast::<*mut u8>()
                .read();
            if backptr != self.region.as_ptr() || !self.occupied(offset) {
                error!("buddy deallocate of foreign pointer");
                return Err(Error::ForeignBlock);
            }

            let mut rel_k = (self.tag(offset) & 0x7f) as u32;
            self.set_tag(offset, false, rel_k);

            // merge with the buddy while it is free and equally sized
            loop {
                let size = 1usize << (rel_k + MIN_K);
                if size == self.region_size() {
                    break;
                }
                let buddy = offset ^ size;
                if self.occupied(buddy) || self.block_size(buddy) != size {
                    break;
                }
                offset = offset.min(buddy);
                rel_k += 1;
                self.set_tag(offset, false, rel_k);
            }

            info!(available = self.free_total(), "buddy deallocated");
        }
        Ok(())
    }
}

impl MemoryResource for BuddyAllocator {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        self.do_allocate(bytes)
    }

    fn deallocate(&self, ptr: NonNull<u8>, _bytes: usize) -> Result<()> {
        self.do_deallocate(ptr)
    }

    fn set_fit_mode(&self, mode: FitMode) -> Result<()> {
        let mut fit = self.fit.lock().unwrap();
        trace!(?mode, "buddy fit mode change");
        *fit = mode;
        Ok(())
    }

    fn blocks_info(&self) -> Vec<BlockInfo> {
        let _fit = self.fit.lock().unwrap();
        let mut blocks = Vec::new();
        unsafe {
            self.for_each_block(|_, size, occupied| blocks.push(BlockInfo { size, occupied }));
        }
        blocks
    }

    fn available_memory(&self) -> usize {
        let _fit = self.fit.lock().unwrap();
        unsafe { self.free_total() }
    }
}

impl Drop for BuddyAllocator {
    fn drop(&mut self) {
        let _ = self.parent.deallocate(self.region, self.region_size());
    }
}

/// Construction helper mirroring the "nearest power of two at least `n`"
/// entry point of the sibling allocators.
pub fn k_for_size(n: usize) -> u32 {
    ceil_log2(n.max(1)).max(MIN_K)
}
