use crate::{Error, Result};
use num_enum::TryFromPrimitive;
use once_cell::sync::Lazy;
use std::alloc::{alloc, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Every pointer handed out by a resource is aligned at least this much.
pub const PAYLOAD_ALIGN: usize = 16;

/// Free-block selection policy of the in-arena allocators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum FitMode {
    /// first free block with size >= request
    First = 0,
    /// smallest satisfying block, first encountered wins ties
    Best = 1,
    /// largest satisfying block, last encountered wins ties
    Worst = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub size: usize,
    pub occupied: bool,
}

/// Allocation protocol shared by the arena allocators and the system
/// default. Containers and `BigInt` route every allocation through a
/// [`ResourceHandle`] to one of these.
///
/// Implementations serialize all operations through a per-resource mutex;
/// two resources are interchangeable only if `is_equal` holds, which is
/// instance identity.
pub trait MemoryResource: Send + Sync {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>>;

    /// `bytes` is a hint; the arena allocators derive the true block size
    /// from their own metadata.
    fn deallocate(&self, ptr: NonNull<u8>, bytes: usize) -> Result<()>;

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        std::ptr::eq(
            (self as *const Self).cast::<u8>(),
            (other as *const dyn MemoryResource).cast::<u8>(),
        )
    }

    fn set_fit_mode(&self, _mode: FitMode) -> Result<()> {
        Err(Error::InvalidArgument("resource has no fit modes"))
    }

    /// Snapshot of `(size, occupied)` per block, address-ordered.
    fn blocks_info(&self) -> Vec<BlockInfo> {
        Vec::new()
    }

    /// Total size of free blocks. Unbounded resources report `usize::MAX`.
    fn available_memory(&self) -> usize {
        usize::MAX
    }
}

/// Cheap clonable handle to a shared [`MemoryResource`].
#[derive(Clone)]
pub struct ResourceHandle(Arc<dyn MemoryResource>);

impl ResourceHandle {
    pub fn new<R: MemoryResource + 'static>(resource: R) -> Self {
        ResourceHandle(Arc::new(resource))
    }

    /// The process-wide default resource over `std::alloc`.
    pub fn system() -> Self {
        SYSTEM.clone()
    }

    pub fn allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        self.0.allocate(bytes)
    }

    pub fn deallocate(&self, ptr: NonNull<u8>, bytes: usize) -> Result<()> {
        self.0.deallocate(ptr, bytes)
    }

    pub fn set_fit_mode(&self, mode: FitMode) -> Result<()> {
        self.0.set_fit_mode(mode)
    }

    pub fn blocks_info(&self) -> Vec<BlockInfo> {
        self.0.blocks_info()
    }

    pub fn available_memory(&self) -> usize {
        self.0.available_memory()
    }

    pub fn is_equal(&self, other: &ResourceHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceHandle({:p})", Arc::as_ptr(&self.0))
    }
}

static SYSTEM: Lazy<ResourceHandle> = Lazy::new(|| ResourceHandle(Arc::new(SystemResource)));

/// Pass-through to the global allocator with [`PAYLOAD_ALIGN`] layouts.
pub struct SystemResource;

impl MemoryResource for SystemResource {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>> {
        let layout = layout_for(bytes)?;
        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or(Error::OutOfMemory)
    }

    fn deallocate(&self, ptr: NonNull<u8>, bytes: usize) -> Result<()> {
        let layout = layout_for(bytes)?;
        // SAFETY: ptr came from `allocate` with the same layout
        unsafe { dealloc(ptr.as_ptr(), layout) };
        Ok(())
    }
}

fn layout_for(bytes: usize) -> Result<Layout> {
    Layout::from_size_align(bytes.max(1), PAYLOAD_ALIGN)
        .map_err(|_| Error::InvalidArgument("allocation size overflows layout"))
}
