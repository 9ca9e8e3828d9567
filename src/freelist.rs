use std::ptr::NonNull;

use crate::{
  arena::Arena,
  block::{BlockLink, LINK_SIZE, Link},
  config::Geometry,
  error::IntegrityError,
};

/// Free blocks chained in ascending size order.
///
/// Blocks are addressed by their offset from the aligned start of the arena.
/// The head sentinel lives here as `head` (size 0, never removed) and the
/// tail sentinel is [`Link::End`], whose size is the whole usable region so
/// every size-ordered scan stops at it.
///
/// ```text
///   head(0) ──► [64] ──► [112] ──► [112] ──► [720] ──► End(usable)
/// ```
pub(crate) struct FreeList<'a> {
  arena: Arena<'a>,
  geometry: Geometry,
  start: usize,
  head: Link,
}

impl<'a> FreeList<'a> {
  pub fn new(
    arena: Arena<'a>,
    geometry: Geometry,
  ) -> Self {
    let start = arena.aligned_start(geometry.alignment);

    Self {
      arena,
      geometry,
      start,
      head: Link::End,
    }
  }

  pub fn geometry(&self) -> &Geometry {
    &self.geometry
  }

  /// Address of the first usable byte.
  pub fn start_addr(&self) -> usize {
    self.arena.addr() + self.start
  }

  /// Installs a single free block spanning the whole usable region.
  pub fn install(&mut self) {
    let usable = self.geometry.usable_size;

    self.write(0, BlockLink::new(Link::End, usable));
    self.head = Link::Block(0);
  }

  /// Puts a detached block back on the list, first absorbing every listed
  /// block that touches it when merging is enabled.
  pub fn insert(
    &mut self,
    offset: usize,
    size: usize,
  ) {
    let (mut offset, mut size) = (offset, size);

    if self.geometry.merge {
      // A neighbour may sit anywhere in a size-ordered list, so walk all of it.
      let mut prev = None;
      let mut cursor = self.head;

      while let Link::Block(at) = cursor {
        let block = self.read(at);
        let next = block.next();

        if at + block.size() == offset {
          offset = at;
          size += block.size();
          self.set_link_after(prev, next);
        } else if offset + size == at {
          size += block.size();
          self.set_link_after(prev, next);
        } else {
          prev = Some(at);
        }

        cursor = next;
      }
    }

    let mut prev = None;
    let mut cursor = self.head;

    while let Link::Block(at) = cursor {
      let block = self.read(at);

      if block.size() >= size {
        break;
      }

      prev = Some(at);
      cursor = block.next();
    }

    self.write(offset, BlockLink::new(cursor, size));
    self.set_link_after(prev, Link::Block(offset));
  }

  /// Detaches the first (and therefore smallest) block of at least `wanted`
  /// bytes. Returns its offset and size.
  pub fn take_first_fit(
    &mut self,
    wanted: usize,
  ) -> Option<(usize, usize)> {
    let mut prev = None;
    let mut cursor = self.head;

    while let Link::Block(at) = cursor {
      let block = self.read(at);

      if block.size() >= wanted {
        self.set_link_after(prev, block.next());
        return Some((at, block.size()));
      }

      prev = Some(at);
      cursor = block.next();
    }

    None
  }

  /// Records the final size of a block that is being handed out.
  pub fn mark_allocated(
    &mut self,
    offset: usize,
    size: usize,
  ) {
    self.write(offset, BlockLink::new(Link::End, size));
  }

  pub fn block_size(
    &self,
    offset: usize,
  ) -> usize {
    self.read(offset).size()
  }

  /// First payload byte of the block at `offset`.
  pub fn payload(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    self
      .arena
      .ptr_at(self.start + offset + self.geometry.header_size)
  }

  /// Offset of the block whose payload starts at `ptr`.
  pub fn block_of(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    let offset = self
      .arena
      .offset_of(ptr)
      .wrapping_sub(self.start)
      .wrapping_sub(self.geometry.header_size);

    debug_assert!(
      offset < self.geometry.usable_size && offset % self.geometry.alignment == 0,
      "{ptr:p} was not handed out by this heap"
    );

    offset
  }

  /// Free blocks in list order as `(offset, size)`.
  pub fn iter(&self) -> Iter<'_, 'a> {
    Iter {
      list: self,
      cursor: self.head,
      budget: self.max_blocks(),
    }
  }

  /// Walks the list checking every structural invariant. Returns the number
  /// of bytes held by listed blocks.
  pub fn verify(&self) -> Result<usize, IntegrityError> {
    let Geometry {
      alignment,
      header_size,
      usable_size,
      merge,
    } = self.geometry;

    let mut blocks: Vec<(usize, usize)> = Vec::new();
    let mut previous = 0;
    let mut cursor = self.head;

    while let Link::Block(at) = cursor {
      if blocks.len() > self.max_blocks() {
        return Err(IntegrityError::Cycle);
      }

      if at + LINK_SIZE > usable_size {
        return Err(IntegrityError::OutOfBounds {
          offset: at,
          size: 0,
        });
      }

      let block = self.read(at);
      let size = block.size();

      if at + size > usable_size {
        return Err(IntegrityError::OutOfBounds { offset: at, size });
      }
      if at % alignment != 0 {
        return Err(IntegrityError::Misaligned { offset: at });
      }
      if size < header_size {
        return Err(IntegrityError::Undersized { offset: at, size });
      }
      if size < previous {
        return Err(IntegrityError::Unsorted {
          offset: at,
          size,
          previous,
        });
      }

      previous = size;
      blocks.push((at, size));
      cursor = block.next();
    }

    blocks.sort_unstable();

    for pair in blocks.windows(2) {
      let ((first, first_size), (second, _)) = (pair[0], pair[1]);

      if first + first_size > second {
        return Err(IntegrityError::Overlap { first, second });
      }
      if merge && first + first_size == second {
        return Err(IntegrityError::Adjacent { first, second });
      }
    }

    Ok(blocks.iter().map(|&(_, size)| size).sum())
  }

  fn max_blocks(&self) -> usize {
    self.geometry.usable_size / self.geometry.header_size
  }

  fn read(
    &self,
    offset: usize,
  ) -> BlockLink {
    self.arena.read_link(self.start + offset)
  }

  fn write(
    &mut self,
    offset: usize,
    link: BlockLink,
  ) {
    self.arena.write_link(self.start + offset, link);
  }

  /// Link leaving `prev`, where `None` is the head sentinel.
  fn set_link_after(
    &mut self,
    prev: Option<usize>,
    link: Link,
  ) {
    match prev {
      None => self.head = link,
      Some(at) => {
        let block = self.read(at);
        self.write(at, BlockLink::new(link, block.size()));
      }
    }
  }
}

pub(crate) struct Iter<'l, 'a> {
  list: &'l FreeList<'a>,
  cursor: Link,
  budget: usize,
}

impl Iterator for Iter<'_, '_> {
  type Item = (usize, usize);

  fn next(&mut self) -> Option<Self::Item> {
    let Link::Block(at) = self.cursor else {
      return None;
    };

    // A corrupted list may loop; stop once more blocks than could fit were seen.
    if self.budget == 0 || at + LINK_SIZE > self.list.geometry.usable_size {
      self.cursor = Link::End;
      return None;
    }
    self.budget -= 1;

    let block = self.list.read(at);
    self.cursor = block.next();

    Some((at, block.size()))
  }
}
