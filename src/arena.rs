//! A bump allocator for many small, variable-length arrays.
//!
//! The vocabulary stores every token's bytes here, and the Huffman tree stores
//! every code and path here, so that millions of tiny arrays cost one heap
//! allocation per block instead of one each. Nothing is freed until the arena
//! itself is dropped.
//!
//! Allocations are addressed by [`Handle`]s (block, byte offset, length)
//! rather than references, so the arena can be owned by the same struct that
//! stores the handles.

use std::fmt;
use std::marker::PhantomData;
use std::mem;

use aligned_box::AlignedBox;
use bytemuck::Pod;

use crate::error::{Error, Result};

/// Alignment of every block. Any `T` with a smaller power-of-two alignment can
/// be placed at a suitably rounded offset.
const BLOCK_ALIGNMENT: usize = 64;

/// A reference to `len` values of type `T` inside an [`Arena`].
pub struct Handle<T> {
    block: u32,
    offset: u32,
    len: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const EMPTY: Handle<T> = Handle {
        block: 0,
        offset: 0,
        len: 0,
        _marker: PhantomData,
    };

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}:{}+{})", self.block, self.offset, self.len)
    }
}

struct Block {
    data: AlignedBox<[u8]>,
    used: usize,
}

impl Block {
    fn new(size: usize) -> Result<Self> {
        let data = AlignedBox::slice_from_default(BLOCK_ALIGNMENT, size).map_err(|err| {
            Error::Allocation {
                bytes: size,
                message: format!("{err:?}"),
            }
        })?;
        Ok(Block { data, used: 0 })
    }
}

fn too_large(bytes: usize) -> Error {
    Error::Allocation {
        bytes,
        message: "arena handles are limited to 4GiB blocks".into(),
    }
}

pub struct Arena {
    block_size: usize,
    blocks: Vec<Block>,
}

impl Arena {
    /// Create an arena that allocates `block_size` bytes at a time.
    /// No memory is reserved until the first allocation.
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0 && block_size <= u32::MAX as usize);
        Arena {
            block_size,
            blocks: vec![],
        }
    }

    /// Reserve `count` zeroed values of type `T`.
    pub fn alloc<T: Pod>(&mut self, count: usize) -> Result<Handle<T>> {
        if count == 0 {
            return Ok(Handle::EMPTY);
        }
        let size = mem::size_of::<T>()
            .checked_mul(count)
            .ok_or_else(|| too_large(usize::MAX))?;
        let align = mem::align_of::<T>();
        debug_assert!(align.is_power_of_two() && align <= BLOCK_ALIGNMENT);

        let fits = self.blocks.last().map_or(false, |block| {
            let offset = (block.used + align - 1) & !(align - 1);
            offset + size <= block.data.len()
        });
        if !fits {
            // Oversized requests get a block of their own.
            self.blocks.push(Block::new(self.block_size.max(size))?);
        }

        let index = self.blocks.len() - 1;
        let block = &mut self.blocks[index];
        let offset = (block.used + align - 1) & !(align - 1);
        block.used = offset + size;
        Ok(Handle {
            block: u32::try_from(index).map_err(|_| too_large(size))?,
            offset: u32::try_from(offset).map_err(|_| too_large(size))?,
            len: u32::try_from(count).map_err(|_| too_large(size))?,
            _marker: PhantomData,
        })
    }

    /// Reserve space for a copy of `values` and fill it.
    pub fn alloc_copy<T: Pod>(&mut self, values: &[T]) -> Result<Handle<T>> {
        let handle = self.alloc::<T>(values.len())?;
        self.get_mut(handle).copy_from_slice(values);
        Ok(handle)
    }

    pub fn get<T: Pod>(&self, handle: Handle<T>) -> &[T] {
        if handle.len == 0 {
            return &[];
        }
        let start = handle.offset as usize;
        let len = handle.len as usize * mem::size_of::<T>();
        bytemuck::cast_slice(&self.blocks[handle.block as usize].data[start..][..len])
    }

    pub fn get_mut<T: Pod>(&mut self, handle: Handle<T>) -> &mut [T] {
        if handle.len == 0 {
            return &mut [];
        }
        let start = handle.offset as usize;
        let len = handle.len as usize * mem::size_of::<T>();
        bytemuck::cast_slice_mut(&mut self.blocks[handle.block as usize].data[start..][..len])
    }

    /// Total bytes reserved from the system, used or not.
    pub fn capacity(&self) -> usize {
        self.blocks.iter().map(|block| block.data.len()).sum()
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}
