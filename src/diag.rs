use std::fmt;

/// One entry of the free list, with absolute addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
  pub start: usize,
  pub header_size: usize,
  /// Header-inclusive size.
  pub size: usize,
  pub end: usize,
}

/// Point-in-time view of heap usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub usable_size: usize,
  pub free_bytes: usize,
  /// Lowest value the free-bytes counter has reached since creation.
  pub minimum_ever_free_bytes: usize,
  pub free_blocks: usize,
  pub largest_free_block: usize,
  pub smallest_free_block: usize,
  pub successful_allocations: usize,
  pub successful_frees: usize,
}

/// Renders a free-list snapshot as a table followed by a summary line.
///
/// ```text
/// start                   header       size end
/// 0x55d0c1a2b840               8         48 0x55d0c1a2b870
/// 0x55d0c1a2b980               8        704 0x55d0c1a2bc40
/// usable: 1024 free: 752
/// ```
pub(crate) fn write_free_list<W: fmt::Write>(
  out: &mut W,
  blocks: &[FreeBlock],
  usable_size: usize,
  free_bytes: usize,
) -> fmt::Result {
  writeln!(out, "{:<18} {:>11} {:>10} {:<18}", "start", "header", "size", "end")?;

  for block in blocks {
    writeln!(
      out,
      "{:<#18x} {:>11} {:>10} {:<#18x}",
      block.start, block.header_size, block.size, block.end
    )?;
  }

  writeln!(out, "usable: {usable_size} free: {free_bytes}")
}
