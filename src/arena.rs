use std::{
  marker::PhantomData,
  ptr::{self, NonNull},
};

use crate::{
  align_to,
  block::{BlockLink, LINK_SIZE},
};

/// The byte region every block is carved from.
///
/// An arena either borrows memory the caller already has (a static buffer, a
/// linker section, an `mmap`ed region) or owns a buffer it releases on drop.
/// All reads and writes of in-place headers go through this type; nothing
/// else in the crate dereferences arena memory.
///
/// ```text
///   base            start = align_to!(base + 1, A)
///   │               │
///   ▼               ▼
///   ┌───────────────┬──────────────────────────────────────────┬──────┐
///   │ alignment pad │          usable = total - A               │ rest │
///   └───────────────┴──────────────────────────────────────────┴──────┘
/// ```
pub struct Arena<'a> {
  base: NonNull<u8>,
  len: usize,
  owned: bool,
  _region: PhantomData<&'a mut [u8]>,
}

// SAFETY: the arena has exclusive access to its region for `'a`, no other
// handle to the bytes exists.
unsafe impl Send for Arena<'_> {}

impl<'a> Arena<'a> {
  /// Uses a caller-supplied buffer as the arena.
  pub fn from_slice(buffer: &'a mut [u8]) -> Self {
    let len = buffer.len();

    Self {
      base: NonNull::from(buffer).cast::<u8>(),
      len,
      owned: false,
      _region: PhantomData,
    }
  }

  /// Uses `len` bytes starting at `base` as the arena.
  ///
  /// # Safety
  ///
  /// The region must be valid for reads and writes for `'a` and must not be
  /// accessed through any other pointer while the arena is alive, except
  /// through payload pointers handed out by the heap built on top of it.
  pub unsafe fn from_raw_parts(
    base: NonNull<u8>,
    len: usize,
  ) -> Self {
    Self {
      base,
      len,
      owned: false,
      _region: PhantomData,
    }
  }

  /// Total size of the region in bytes, alignment slack included.
  pub fn total_size(&self) -> usize {
    self.len
  }

  pub(crate) fn addr(&self) -> usize {
    self.base.as_ptr() as usize
  }

  /// Offset from `base` of the first usable byte for the given alignment.
  ///
  /// The start is always moved forward by at least one byte and at most
  /// `alignment` bytes, so `alignment` bytes are reserved for the adjustment
  /// regardless of where the region happens to live.
  pub(crate) fn aligned_start(
    &self,
    alignment: usize,
  ) -> usize {
    let addr = self.addr();
    align_to!(addr + 1, alignment) - addr
  }

  pub(crate) fn read_link(
    &self,
    at: usize,
  ) -> BlockLink {
    self.check_header_bounds(at);
    // SAFETY: bounds checked above, headers may sit at any byte alignment.
    unsafe { ptr::read_unaligned(self.base.as_ptr().add(at).cast::<BlockLink>()) }
  }

  pub(crate) fn write_link(
    &mut self,
    at: usize,
    link: BlockLink,
  ) {
    self.check_header_bounds(at);
    // SAFETY: bounds checked above, headers may sit at any byte alignment.
    unsafe { ptr::write_unaligned(self.base.as_ptr().add(at).cast::<BlockLink>(), link) }
  }

  pub(crate) fn ptr_at(
    &self,
    at: usize,
  ) -> NonNull<u8> {
    assert!(at <= self.len, "offset {at} lies outside the arena");
    // SAFETY: `at` is within (or one past) the region.
    unsafe { self.base.add(at) }
  }

  /// Offset of `ptr` from `base`. Pointers below `base` wrap around to huge
  /// offsets and fail every later bounds check.
  pub(crate) fn offset_of(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    (ptr.as_ptr() as usize).wrapping_sub(self.addr())
  }

  fn check_header_bounds(
    &self,
    at: usize,
  ) {
    assert!(
      at.checked_add(LINK_SIZE).is_some_and(|end| end <= self.len),
      "block header at offset {at} lies outside the arena"
    );
  }
}

impl Arena<'static> {
  /// Allocates an owned, zeroed arena of `len` bytes. The buffer is released
  /// when the arena is dropped.
  pub fn with_capacity(len: usize) -> Self {
    let buffer: &'static mut [u8] = Box::leak(vec![0u8; len].into_boxed_slice());

    Self {
      base: NonNull::from(buffer).cast::<u8>(),
      len,
      owned: true,
      _region: PhantomData,
    }
  }
}

impl Drop for Arena<'_> {
  fn drop(&mut self) {
    if self.owned {
      // SAFETY: `owned` is only set by `with_capacity`, which leaked exactly
      // this boxed slice.
      unsafe {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
          self.base.as_ptr(),
          self.len,
        )));
      }
    }
  }
}
