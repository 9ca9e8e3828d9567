use std::mem;

use crate::{align_to, block::LINK_SIZE, error::ConfigError};

/// Alignment used when none is configured: one machine word.
pub const DEFAULT_ALIGNMENT: usize = mem::size_of::<usize>();

/// Block sizes and offsets live in 32-bit header fields.
pub const MAX_USABLE_SIZE: usize = u32::MAX as usize;

/// Tunables for a [`Heap`](crate::Heap).
///
/// ```rust
/// use arenalloc::HeapConfig;
///
/// fn on_oom() {
///   eprintln!("heap exhausted");
/// }
///
/// let config = HeapConfig::new()
///   .with_alignment(16)
///   .with_merge(false)
///   .with_oom_hook(on_oom);
///
/// assert_eq!(config.alignment, 16);
/// assert!(!config.merge);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct HeapConfig {
  /// Payload alignment and block size granularity. Must be a power of two.
  pub alignment: usize,
  /// Coalesce address-adjacent free blocks when a block is freed.
  pub merge: bool,
  /// Called with the lock released after every failed allocation.
  pub oom_hook: Option<fn()>,
}

impl HeapConfig {
  pub const fn new() -> Self {
    Self {
      alignment: DEFAULT_ALIGNMENT,
      merge: true,
      oom_hook: None,
    }
  }

  pub const fn with_alignment(
    mut self,
    alignment: usize,
  ) -> Self {
    self.alignment = alignment;
    self
  }

  pub const fn with_merge(
    mut self,
    merge: bool,
  ) -> Self {
    self.merge = merge;
    self
  }

  pub const fn with_oom_hook(
    mut self,
    hook: fn(),
  ) -> Self {
    self.oom_hook = Some(hook);
    self
  }

  /// Derives the block geometry for an arena of `total` bytes.
  pub(crate) fn geometry(
    &self,
    total: usize,
  ) -> Result<Geometry, ConfigError> {
    let alignment = self.alignment;

    if !alignment.is_power_of_two() {
      return Err(ConfigError::AlignmentNotPowerOfTwo(alignment));
    }

    let header_size = align_to!(LINK_SIZE, alignment);
    let required = header_size
      .checked_mul(2)
      .and_then(|blocks| blocks.checked_add(alignment))
      .and_then(|reserved| reserved.checked_add(1));

    match required {
      Some(required) if total >= required => {}
      // An unrepresentable requirement is never met by a real arena.
      _ => {
        return Err(ConfigError::ArenaTooSmall {
          total,
          required: required.unwrap_or(usize::MAX),
        });
      }
    }

    let usable_size = total - alignment;

    if usable_size > MAX_USABLE_SIZE {
      return Err(ConfigError::ArenaTooLarge {
        usable: usable_size,
        max: MAX_USABLE_SIZE,
      });
    }

    Ok(Geometry {
      alignment,
      header_size,
      usable_size,
      merge: self.merge,
    })
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::new()
  }
}

/// Sizes fixed for the lifetime of a heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Geometry {
  pub alignment: usize,
  pub header_size: usize,
  pub usable_size: usize,
  pub merge: bool,
}

impl Geometry {
  /// A split only happens when the remainder is strictly larger than this.
  pub fn minimum_block_size(&self) -> usize {
    2 * self.header_size
  }
}
