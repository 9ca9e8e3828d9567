use std::mem;

/// Raw link value that points at the tail sentinel.
pub(crate) const END_LINK: u32 = u32::MAX;

/// Bytes occupied by a [`BlockLink`] before rounding up to the heap alignment.
pub(crate) const LINK_SIZE: usize = mem::size_of::<BlockLink>();

/// In-place header written at the start of every block.
///
/// While the block is free, `next` is the arena offset of the next free block
/// (or [`END_LINK`]). While the block is allocated only `size` is meaningful.
/// `size` always includes the header itself.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockLink {
  next: u32,
  size: u32,
}

impl BlockLink {
  /// `size` must fit the usable arena, which is capped at `u32::MAX` bytes.
  pub fn new(
    next: Link,
    size: usize,
  ) -> Self {
    Self {
      next: next.into_raw(),
      size: size as u32,
    }
  }

  pub fn next(&self) -> Link {
    Link::from_raw(self.next)
  }

  pub fn size(&self) -> usize {
    self.size as usize
  }
}

/// Target of a free-list link: either a real block, addressed by its offset
/// from the usable start of the arena, or the tail sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Link {
  Block(usize),
  End,
}

impl Link {
  pub fn from_raw(raw: u32) -> Self {
    if raw == END_LINK {
      Link::End
    } else {
      Link::Block(raw as usize)
    }
  }

  pub fn into_raw(self) -> u32 {
    match self {
      Link::Block(offset) => offset as u32,
      Link::End => END_LINK,
    }
  }
}
