//! # arenalloc - A Fixed-Arena Heap
//!
//! This crate provides a variable-size allocator that carves every block out of
//! a single fixed byte region. It never asks an operating system for memory,
//! which makes it a fit for firmware, RTOS tasks and any other place where the
//! only memory you get is the buffer you were handed.
//!
//! ## Overview
//!
//! Free space is tracked by a singly linked list of free blocks kept in
//! ascending size order. Because the list is sorted, the first block that is
//! large enough is also the smallest one that fits:
//!
//! ```text
//!   Free List (sorted by size):
//!
//!   ┌────────┐   ┌──────┐   ┌───────┐   ┌───────┐   ┌────────────┐
//!   │ head 0 │──►│  48  │──►│  112  │──►│  704  │──►│ end usable │
//!   └────────┘   └──────┘   └───────┘   └───────┘   └────────────┘
//!    sentinel                                          sentinel
//!
//!   allocate(50) needs 64 bytes: 48 is too small, 112 fits.
//! ```
//!
//! When a block is freed it is merged with any free block that touches it
//! (optional, on by default) and put back at its sorted position. When a
//! block is much larger than the request it is split and the remainder goes
//! back on the list.
//!
//! ## Crate Structure
//!
//! ```text
//!   arenalloc
//!   ├── align      - Alignment macro (align_to!)
//!   ├── arena      - The byte region and all in-place header access
//!   ├── block      - Block header layout (internal)
//!   ├── config     - HeapConfig and derived geometry
//!   ├── diag       - Free-list snapshots, stats, text dump
//!   ├── error      - AllocError, ConfigError, IntegrityError
//!   ├── freelist   - Size-ordered list, merge engine, first fit (internal)
//!   └── heap       - Heap: locking, lazy init, allocate/free
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use arenalloc::{Arena, Heap, HeapConfig};
//!
//! let mut memory = [0u8; 1032];
//! let heap: Heap = Heap::new(Arena::from_slice(&mut memory), HeapConfig::new()).unwrap();
//!
//! let ptr = heap.allocate(100).unwrap().as_ptr();
//!
//! unsafe {
//!   ptr.write_bytes(0xAB, 100);
//!   heap.free(ptr);
//! }
//!
//! assert_eq!(heap.free_bytes_remaining(), heap.usable_size());
//! ```
//!
//! ## How It Works
//!
//! Every block starts with a small header. While the block is free the header
//! links it into the free list; while it is allocated the header sits right in
//! front of the pointer handed to the caller:
//!
//! ```text
//!   Single Allocation:
//!   ┌──────────────────────┬────────────────────────────────┐
//!   │    Block Header      │         User Data              │
//!   │  ┌────────────────┐  │                                │
//!   │  │ next: (unused) │  │  ┌──────────────────────────┐  │
//!   │  │ size: N + 8    │  │  │     N bytes usable       │  │
//!   │  └────────────────┘  │  └──────────────────────────┘  │
//!   │   8 bytes, rounded   │                                │
//!   │   up to alignment    │                                │
//!   └──────────────────────┴────────────────────────────────┘
//!                          ▲
//!                          └── Pointer returned to user
//! ```
//!
//! A request for `N` bytes takes `align_to!(N + header, alignment)` bytes. The
//! block is split when more than two headers' worth of bytes would be left
//! over; otherwise the extra bytes stay with the allocation.
//!
//! ## Concurrency
//!
//! [`Heap`] is generic over a [`lock_api::RawMutex`]. `allocate` and `free`
//! each run under one acquisition of it; the default is a spinlock from the
//! `spin` crate. On an RTOS, plug in a raw mutex that suspends the scheduler.
//!
//! ## Limitations
//!
//! - **One alignment**: every payload gets the configured alignment, no more
//! - **No realloc**: blocks never grow or shrink in place
//! - **Linear scans**: allocate and free walk the free list
//! - **Zero-size requests fail**: `allocate(0)` is an error, not a dangling pointer
//!
//! ## Safety
//!
//! [`Heap::free`] trusts its argument. Freeing a pointer that did not come from
//! the same heap, or freeing it twice, corrupts the free list.
//! [`Heap::verify`] can detect most such corruption after the fact.

pub mod align;
mod arena;
mod block;
mod config;
mod diag;
mod error;
mod freelist;
mod heap;

pub use arena::Arena;
pub use config::{DEFAULT_ALIGNMENT, HeapConfig, MAX_USABLE_SIZE};
pub use diag::{FreeBlock, HeapStats};
pub use error::{AllocError, ConfigError, IntegrityError};
pub use heap::{DefaultRawMutex, Heap};
