use std::{error, fmt};

/// Why an allocation request could not be satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
  /// Zero-byte requests never produce an allocation.
  ZeroSize,
  /// No free block is large enough for `requested` payload bytes once the
  /// header and alignment padding are added, or the padded request is not
  /// strictly smaller than the usable arena.
  OutOfMemory { requested: usize },
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AllocError::ZeroSize => write!(f, "zero-size allocation request"),
      AllocError::OutOfMemory { requested } => {
        write!(f, "out of memory: no free block fits {requested} bytes")
      }
    }
  }
}

impl error::Error for AllocError {}

/// Rejected heap configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
  AlignmentNotPowerOfTwo(usize),
  /// The arena leaves no room for at least one splittable block after the
  /// alignment reservation.
  ArenaTooSmall { total: usize, required: usize },
  /// Block sizes are stored in 32-bit header fields.
  ArenaTooLarge { usable: usize, max: usize },
}

impl fmt::Display for ConfigError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      ConfigError::AlignmentNotPowerOfTwo(alignment) => {
        write!(f, "alignment {alignment} is not a power of two")
      }
      ConfigError::ArenaTooSmall { total, required } => {
        write!(f, "arena of {total} bytes is too small, at least {required} bytes are required")
      }
      ConfigError::ArenaTooLarge { usable, max } => {
        write!(f, "usable arena size {usable} exceeds the maximum of {max} bytes")
      }
    }
  }
}

impl error::Error for ConfigError {}

/// Inconsistency found while walking the free list. Any of these means a
/// caller broke the free contract (double free, foreign pointer, writes past
/// the end of a payload).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrityError {
  OutOfBounds { offset: usize, size: usize },
  Misaligned { offset: usize },
  Undersized { offset: usize, size: usize },
  Unsorted { offset: usize, size: usize, previous: usize },
  Overlap { first: usize, second: usize },
  Adjacent { first: usize, second: usize },
  Cycle,
  CountMismatch { listed: usize, counter: usize },
}

impl fmt::Display for IntegrityError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      IntegrityError::OutOfBounds { offset, size } => {
        write!(f, "free block at offset {offset} with size {size} runs past the arena")
      }
      IntegrityError::Misaligned { offset } => {
        write!(f, "free block at offset {offset} is not aligned")
      }
      IntegrityError::Undersized { offset, size } => {
        write!(f, "free block at offset {offset} has size {size}, smaller than a header")
      }
      IntegrityError::Unsorted {
        offset,
        size,
        previous,
      } => write!(
        f,
        "free block at offset {offset} with size {size} follows a block of size {previous}"
      ),
      IntegrityError::Overlap { first, second } => {
        write!(f, "free blocks at offsets {first} and {second} overlap")
      }
      IntegrityError::Adjacent { first, second } => {
        write!(f, "free blocks at offsets {first} and {second} are adjacent but not merged")
      }
      IntegrityError::Cycle => write!(f, "free list does not reach the end marker"),
      IntegrityError::CountMismatch { listed, counter } => write!(
        f,
        "free list holds {listed} bytes but the free-bytes counter says {counter}"
      ),
    }
  }
}

impl error::Error for IntegrityError {}
