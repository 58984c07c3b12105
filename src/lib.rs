use std::fmt;

pub mod avl;
pub mod big_int;
pub mod btree;
pub mod btree_disk;
pub mod buddy_alloc;
pub mod fraction;
pub mod list_alloc;
pub mod memory;
pub mod red_black;
pub mod res_vec;
pub mod scapegoat;
pub mod search_tree;
pub mod splay;
pub mod tree_alloc;
pub mod tree_iter;
pub mod util;

#[cfg(test)]
mod tests;

pub use big_int::BigInt;
pub use btree::BTree;
pub use btree_disk::BPlusTreeDisk;
pub use buddy_alloc::BuddyAllocator;
pub use fraction::Fraction;
pub use list_alloc::SortedListAllocator;
pub use memory::{BlockInfo, FitMode, MemoryResource, ResourceHandle};
pub use search_tree::SearchTree;
pub use tree_alloc::RbTreeAllocator;

/// Crate-wide error kinds. Structural failures (`OutOfMemory`, `Io`,
/// `ForeignBlock`) abort the operation with no user-visible state change;
/// `Domain` and `InvalidArgument` never mutate state.
#[derive(Debug)]
pub enum Error {
    OutOfMemory,
    ForeignBlock,
    InvalidArgument(&'static str),
    Domain(&'static str),
    KeyAbsent,
    IteratorOutOfRange,
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::ForeignBlock => write!(f, "block is not owned by this allocator"),
            Error::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Error::Domain(what) => write!(f, "domain error: {what}"),
            Error::KeyAbsent => write!(f, "key absent"),
            Error::IteratorOutOfRange => write!(f, "iterator out of range"),
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
