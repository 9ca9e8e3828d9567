use std::{fmt, ptr::NonNull};

use lock_api::{Mutex, RawMutex};
use log::{debug, trace, warn};

use crate::{
  align::checked_align_to,
  arena::Arena,
  config::{Geometry, HeapConfig},
  diag::{self, FreeBlock, HeapStats},
  error::{AllocError, ConfigError, IntegrityError},
  freelist::FreeList,
};

/// Lock used when the caller does not inject one.
pub type DefaultRawMutex = spin::Mutex<()>;

/// Variable-size allocator over one fixed arena.
///
/// Every `allocate` and `free` runs under a single acquisition of `R`, so the
/// heap can be shared between preemptible tasks as long as `R` excludes them
/// from each other. Logging and the out-of-memory hook run after the lock is
/// released.
pub struct Heap<'a, R: RawMutex = DefaultRawMutex> {
  state: Mutex<R, HeapState<'a>>,
  config: HeapConfig,
  geometry: Geometry,
}

struct HeapState<'a> {
  list: FreeList<'a>,
  installed: bool,
  free_bytes: usize,
  minimum_ever_free: usize,
  allocations: usize,
  frees: usize,
}

struct Grant {
  ptr: NonNull<u8>,
  wanted: usize,
  block_size: usize,
}

impl<'a, R: RawMutex> Heap<'a, R> {
  /// Builds a heap over `arena`. The arena is not touched until the first
  /// allocation; the diagnostics below only read it.
  pub fn new(
    arena: Arena<'a>,
    config: HeapConfig,
  ) -> Result<Self, ConfigError> {
    let geometry = config.geometry(arena.total_size())?;
    let usable = geometry.usable_size;

    Ok(Self {
      state: Mutex::new(HeapState {
        list: FreeList::new(arena, geometry),
        installed: false,
        free_bytes: usable,
        minimum_ever_free: usable,
        allocations: 0,
        frees: 0,
      }),
      config,
      geometry,
    })
  }

  /// Returns a pointer to at least `size` writable bytes, aligned to the
  /// configured alignment.
  ///
  /// Fails with [`AllocError::ZeroSize`] for `size == 0` and with
  /// [`AllocError::OutOfMemory`] when no free block fits. The out-of-memory
  /// hook, if any, runs on both.
  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let (installed, outcome) = {
      let mut state = self.state.lock();
      let installed = state.ensure_installed();
      (installed, state.allocate(size))
    };

    if installed {
      debug!(
        "heap installed: {} usable bytes, alignment {}, merge {}",
        self.geometry.usable_size, self.geometry.alignment, self.geometry.merge
      );
    }

    match outcome {
      Ok(grant) => {
        trace!(
          "allocate({size}) -> {:p} | header {} | wanted {} | block {}",
          grant.ptr, self.geometry.header_size, grant.wanted, grant.block_size
        );
        Ok(grant.ptr)
      }
      Err(err) => {
        warn!("allocate({size}) failed: {err}");
        if let Some(hook) = self.config.oom_hook {
          hook();
        }
        Err(err)
      }
    }
  }

  /// Returns a block to the heap. Null is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by [`allocate`](Self::allocate)
  /// on this heap that has not been freed since. Anything else corrupts the
  /// free list.
  pub unsafe fn free(
    &self,
    ptr: *mut u8,
  ) {
    let Some(ptr) = NonNull::new(ptr) else {
      return;
    };

    let size = self.state.lock().free(ptr);

    trace!("free({ptr:p}) -> {size} bytes back on the free list");
  }

  /// Header-inclusive size recorded for an allocated block.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation from this heap.
  pub unsafe fn block_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    let state = self.state.lock();
    state.list.block_size(state.list.block_of(ptr))
  }

  pub fn free_bytes_remaining(&self) -> usize {
    self.state.lock().free_bytes
  }

  pub fn usable_size(&self) -> usize {
    self.geometry.usable_size
  }

  pub fn header_size(&self) -> usize {
    self.geometry.header_size
  }

  pub fn minimum_block_size(&self) -> usize {
    self.geometry.minimum_block_size()
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn stats(&self) -> HeapStats {
    let state = self.state.lock();

    let mut stats = HeapStats {
      usable_size: self.geometry.usable_size,
      free_bytes: state.free_bytes,
      minimum_ever_free_bytes: state.minimum_ever_free,
      successful_allocations: state.allocations,
      successful_frees: state.frees,
      ..HeapStats::default()
    };

    for (_, size) in state.free_list() {
      stats.free_blocks += 1;
      stats.largest_free_block = stats.largest_free_block.max(size);
      stats.smallest_free_block = if stats.free_blocks == 1 {
        size
      } else {
        stats.smallest_free_block.min(size)
      };
    }

    stats
  }

  /// Snapshot of the free list in list order (ascending size).
  pub fn free_blocks(&self) -> Vec<FreeBlock> {
    let state = self.state.lock();

    let start = state.list.start_addr();
    let header_size = self.geometry.header_size;

    state
      .free_list()
      .into_iter()
      .map(|(offset, size)| FreeBlock {
        start: start + offset,
        header_size,
        size,
        end: start + offset + size,
      })
      .collect()
  }

  /// Writes the free list to `out`, one block per line, followed by the
  /// usable size and the free-bytes counter. The two are read under separate
  /// lock acquisitions, so the output is only a best-effort picture while
  /// other tasks keep allocating.
  pub fn dump_free_list<W: fmt::Write>(
    &self,
    out: &mut W,
  ) -> fmt::Result {
    let blocks = self.free_blocks();
    let free_bytes = self.free_bytes_remaining();

    diag::write_free_list(out, &blocks, self.geometry.usable_size, free_bytes)
  }

  /// Walks the free list and checks its structure against the free-bytes
  /// counter. Meant for tests and debug builds; a failure means some caller
  /// broke the [`free`](Self::free) contract.
  pub fn verify(&self) -> Result<(), IntegrityError> {
    let state = self.state.lock();

    if !state.installed {
      return Ok(());
    }

    let listed = state.list.verify()?;

    if listed != state.free_bytes {
      return Err(IntegrityError::CountMismatch {
        listed,
        counter: state.free_bytes,
      });
    }

    Ok(())
  }
}

impl HeapState<'_> {
  /// Returns `true` if this call installed the arena.
  fn ensure_installed(&mut self) -> bool {
    if self.installed {
      return false;
    }

    self.list.install();
    self.installed = true;
    true
  }

  /// Free blocks as `(offset, size)` in list order. Before installation the
  /// whole usable region is reported as the single block it is about to
  /// become, without writing to the arena.
  fn free_list(&self) -> Vec<(usize, usize)> {
    if self.installed {
      self.list.iter().collect()
    } else {
      vec![(0, self.list.geometry().usable_size)]
    }
  }

  fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Grant, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let geometry = *self.list.geometry();
    let out_of_memory = AllocError::OutOfMemory { requested: size };

    let wanted = size
      .checked_add(geometry.header_size)
      .and_then(|padded| checked_align_to(padded, geometry.alignment))
      .filter(|&wanted| wanted < geometry.usable_size)
      .ok_or(out_of_memory)?;

    let (offset, found) = self.list.take_first_fit(wanted).ok_or(out_of_memory)?;

    let block_size = if found - wanted > geometry.minimum_block_size() {
      self.list.mark_allocated(offset, wanted);
      self.list.insert(offset + wanted, found - wanted);
      wanted
    } else {
      self.list.mark_allocated(offset, found);
      found
    };

    self.free_bytes -= block_size;
    self.minimum_ever_free = self.minimum_ever_free.min(self.free_bytes);
    self.allocations += 1;

    Ok(Grant {
      ptr: self.list.payload(offset),
      wanted,
      block_size,
    })
  }

  fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) -> usize {
    debug_assert!(self.installed, "free before any allocation");

    let offset = self.list.block_of(ptr);
    let size = self.list.block_size(offset);

    self.list.insert(offset, size);
    self.free_bytes += size;
    self.frees += 1;

    size
  }
}

#[cfg(test)]
mod tests {
  use std::{
    hint, ptr,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
  };

  use super::*;

  fn heap(merge: bool) -> Heap<'static> {
    Heap::new(
      Arena::with_capacity(1032),
      HeapConfig::new().with_alignment(8).with_merge(merge),
    )
    .unwrap()
  }

  fn sizes(heap: &Heap<'_>) -> Vec<usize> {
    heap.free_blocks().iter().map(|block| block.size).collect()
  }

  #[test]
  fn test_reuses_smallest_fitting_block() {
    let heap = heap(true);

    let a = heap.allocate(100).unwrap();
    let b = heap.allocate(200).unwrap();

    unsafe {
      assert_eq!(heap.block_size(a), 112);
      assert_eq!(heap.block_size(b), 208);
      assert_eq!(b.as_ptr().offset_from(a.as_ptr()), 112);
    }
    assert_eq!(heap.free_bytes_remaining(), 1024 - 112 - 208);

    unsafe { heap.free(a.as_ptr()) };
    assert_eq!(sizes(&heap), vec![112, 704]);

    let c = heap.allocate(50).unwrap();

    assert_eq!(c, a);
    unsafe { assert_eq!(heap.block_size(c), 64) };
    assert_eq!(sizes(&heap), vec![48, 704]);
    assert_eq!(heap.free_bytes_remaining(), 1024 - 64 - 208);
    assert_eq!(heap.verify(), Ok(()));
  }

  #[test]
  fn test_exact_reuse_without_merge() {
    let heap = heap(false);

    let first = heap.allocate(100).unwrap();
    unsafe { heap.free(first.as_ptr()) };
    assert_eq!(sizes(&heap), vec![112, 912]);

    let second = heap.allocate(100).unwrap();

    assert_eq!(second, first);
    unsafe { assert_eq!(heap.block_size(second), 112) };
    assert_eq!(sizes(&heap), vec![912]);
    assert_eq!(heap.verify(), Ok(()));
  }

  #[test]
  fn test_zero_size_fails_without_side_effects() {
    let heap = heap(true);

    assert_eq!(heap.allocate(0), Err(AllocError::ZeroSize));
    assert_eq!(heap.free_bytes_remaining(), 1024);
    assert_eq!(sizes(&heap), vec![1024]);
  }

  #[test]
  fn test_diagnostics_leave_fresh_arena_untouched() {
    let mut buffer = [0xAAu8; 1032];

    {
      let heap: Heap<'_> = Heap::new(
        Arena::from_slice(&mut buffer),
        HeapConfig::new().with_alignment(8),
      )
      .unwrap();

      let blocks = heap.free_blocks();
      assert_eq!(blocks.len(), 1);
      assert_eq!(blocks[0].size, 1024);
      assert_eq!(blocks[0].end - blocks[0].start, 1024);

      let stats = heap.stats();
      assert_eq!(stats.free_blocks, 1);
      assert_eq!(stats.largest_free_block, 1024);
      assert_eq!(stats.smallest_free_block, 1024);

      let mut out = String::new();
      heap.dump_free_list(&mut out).unwrap();
      assert!(out.ends_with("usable: 1024 free: 1024\n"));

      assert_eq!(heap.verify(), Ok(()));
    }

    assert!(buffer.iter().all(|&byte| byte == 0xAA));
  }

  #[test]
  fn test_snapshot_matches_after_install() {
    let heap = heap(true);
    let before = heap.free_blocks();

    let ptr = heap.allocate(8).unwrap();
    unsafe { heap.free(ptr.as_ptr()) };

    assert_eq!(heap.free_blocks(), before);
  }

  #[test]
  fn test_oversized_alignment_is_a_config_error() {
    let heap: Result<Heap<'static>, ConfigError> = Heap::new(
      Arena::with_capacity(64),
      HeapConfig::new().with_alignment(1usize << (usize::BITS - 1)),
    );

    assert!(matches!(heap, Err(ConfigError::ArenaTooSmall { total: 64, .. })));
  }

  #[test]
  fn test_null_free_is_noop() {
    let heap = heap(true);
    let before = heap.stats();

    unsafe { heap.free(ptr::null_mut()) };

    assert_eq!(heap.stats(), before);
  }

  #[test]
  fn test_exhaustion_boundary() {
    let heap = heap(true);

    // Header plus payload must stay strictly below the usable size.
    assert_eq!(
      heap.allocate(1024 - 8),
      Err(AllocError::OutOfMemory { requested: 1016 })
    );

    let whole = heap.allocate(1024 - 16).unwrap();
    unsafe { assert_eq!(heap.block_size(whole), 1024) };
    assert_eq!(heap.free_bytes_remaining(), 0);
    assert!(heap.free_blocks().is_empty());

    assert_eq!(
      heap.allocate(1024 - 16),
      Err(AllocError::OutOfMemory { requested: 1008 })
    );
    assert_eq!(heap.allocate(1), Err(AllocError::OutOfMemory { requested: 1 }));

    unsafe { heap.free(whole.as_ptr()) };
    assert_eq!(heap.free_bytes_remaining(), 1024);
    assert_eq!(heap.verify(), Ok(()));
  }

  #[test]
  fn test_split_threshold() {
    // Remainder of 24 bytes is above 2 * header: split.
    let split = heap(true);
    let ptr = split.allocate(992).unwrap();
    unsafe { assert_eq!(split.block_size(ptr), 1000) };
    assert_eq!(sizes(&split), vec![24]);
    assert_eq!(split.free_bytes_remaining(), 24);

    // Remainder of exactly 16 bytes stays as slack.
    let slack = heap(true);
    let ptr = slack.allocate(1000).unwrap();
    unsafe { assert_eq!(slack.block_size(ptr), 1024) };
    assert!(sizes(&slack).is_empty());
    assert_eq!(slack.free_bytes_remaining(), 0);
  }

  #[test]
  fn test_round_trip_restores_single_block() {
    let heap = heap(true);

    for size in [1usize, 7, 8, 100, 513, 1000] {
      let ptr = heap.allocate(size).unwrap();
      unsafe { heap.free(ptr.as_ptr()) };

      let blocks = heap.free_blocks();
      assert_eq!(heap.free_bytes_remaining(), 1024);
      assert_eq!(blocks.len(), 1);
      assert_eq!(blocks[0].size, 1024);
      assert_eq!(blocks[0].end - blocks[0].start, 1024);
    }
  }

  #[test]
  fn test_payloads_are_aligned_and_writable() {
    let heap: Heap<'static> = Heap::new(
      Arena::with_capacity(4096),
      HeapConfig::new().with_alignment(16),
    )
    .unwrap();

    let mut ptrs = Vec::new();
    for size in [1usize, 3, 24, 100, 17] {
      let ptr = heap.allocate(size).unwrap();
      assert_eq!(ptr.as_ptr() as usize % 16, 0);
      unsafe { ptr::write_bytes(ptr.as_ptr(), size as u8, size) };
      ptrs.push((ptr, size));
    }

    for (ptr, size) in &ptrs {
      let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), *size) };
      assert!(bytes.iter().all(|&byte| byte == *size as u8));
    }
  }

  #[test]
  fn test_stats() {
    let heap = heap(true);

    let a = heap.allocate(100).unwrap();
    let _b = heap.allocate(200).unwrap();
    unsafe { heap.free(a.as_ptr()) };

    assert_eq!(
      heap.stats(),
      HeapStats {
        usable_size: 1024,
        free_bytes: 816,
        minimum_ever_free_bytes: 704,
        free_blocks: 2,
        largest_free_block: 704,
        smallest_free_block: 112,
        successful_allocations: 2,
        successful_frees: 1,
      }
    );
  }

  #[test]
  fn test_dump_free_list() {
    let heap = heap(true);
    let a = heap.allocate(100).unwrap();
    let _b = heap.allocate(200).unwrap();
    unsafe { heap.free(a.as_ptr()) };

    let mut out = String::new();
    heap.dump_free_list(&mut out).unwrap();

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].contains(" 112 "));
    assert!(lines[2].contains(" 704 "));
    assert_eq!(lines[3], "usable: 1024 free: 816");
  }

  #[test]
  fn test_verify_catches_double_free() {
    let heap = heap(true);
    let a = heap.allocate(100).unwrap();
    let _b = heap.allocate(200).unwrap();

    unsafe {
      heap.free(a.as_ptr());
      heap.free(a.as_ptr());
    }

    // The second insert links the block to itself.
    assert_eq!(heap.verify(), Err(IntegrityError::Cycle));
    assert!(heap.free_blocks().len() <= 1024 / 8);
  }

  static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

  fn count_hook() {
    HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
  }

  #[test]
  fn test_oom_hook_runs_on_failure_only() {
    let heap: Heap<'static> = Heap::new(
      Arena::with_capacity(1032),
      HeapConfig::new().with_alignment(8).with_oom_hook(count_hook),
    )
    .unwrap();

    heap.allocate(64).unwrap();
    assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 0);

    assert!(heap.allocate(4096).is_err());
    assert!(heap.allocate(0).is_err());
    assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 2);
  }

  static ACQUISITIONS: AtomicUsize = AtomicUsize::new(0);

  struct CountingRawMutex {
    locked: AtomicBool,
  }

  unsafe impl RawMutex for CountingRawMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
      locked: AtomicBool::new(false),
    };

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
      while !self.try_lock() {
        hint::spin_loop();
      }
    }

    fn try_lock(&self) -> bool {
      let acquired = self
        .locked
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_ok();
      if acquired {
        ACQUISITIONS.fetch_add(1, Ordering::SeqCst);
      }
      acquired
    }

    unsafe fn unlock(&self) {
      self.locked.store(false, Ordering::Release);
    }
  }

  #[test]
  fn test_one_lock_acquisition_per_operation() {
    let mut buffer = [0u8; 264];
    let heap: Heap<'_, CountingRawMutex> =
      Heap::new(Arena::from_slice(&mut buffer), HeapConfig::new()).unwrap();

    let ptr = heap.allocate(32).unwrap();
    assert_eq!(ACQUISITIONS.load(Ordering::SeqCst), 1);

    unsafe { heap.free(ptr.as_ptr()) };
    assert_eq!(ACQUISITIONS.load(Ordering::SeqCst), 2);

    assert!(heap.allocate(0).is_err());
    assert_eq!(ACQUISITIONS.load(Ordering::SeqCst), 3);
  }
}
