/// Rounds `value` up to the next multiple of `alignment`, which must be a
/// power of two.
///
/// # Examples
///
/// ```rust
/// use arenalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(16, 8), 16);
/// assert_eq!(align_to!(5, 4), 8);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Same as [`align_to!`] but returns `None` instead of wrapping when the
/// rounded value does not fit in a `usize`.
pub(crate) fn checked_align_to(
  value: usize,
  alignment: usize,
) -> Option<usize> {
  value
    .checked_add(alignment - 1)
    .map(|bumped| bumped & !(alignment - 1))
}
