use std::{io::Read, ptr::NonNull};

use arenalloc::{Arena, Heap, HeapConfig};

const ARENA_SIZE: usize = 1032;

/// Waits until the user presses ENTER.
/// Useful when you want to follow the free list step by step, or inspect the
/// mapping with `pmap` while the demo is paused.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_free_list(
  label: &str,
  heap: &Heap<'_>,
) {
  let mut out = String::new();
  heap
    .dump_free_list(&mut out)
    .expect("formatting the free list");
  println!("[{label}]\n{out}");
}

fn on_out_of_memory() {
  println!("!!! out-of-memory hook called");
}

fn main() {
  simple_logger::SimpleLogger::new()
    .with_level(log::LevelFilter::Trace)
    .init()
    .expect("logger installed twice");

  // The arena comes from outside the allocator, the way a linker section or a
  // device memory window would on a target without an OS allocator.
  let region = unsafe {
    libc::mmap(
      std::ptr::null_mut(),
      ARENA_SIZE,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if region == libc::MAP_FAILED {
    eprintln!("mmap failed");
    return;
  }

  let base = NonNull::new(region.cast::<u8>()).expect("mmap returned null");
  let arena = unsafe { Arena::from_raw_parts(base, ARENA_SIZE) };

  let config = HeapConfig::new()
    .with_alignment(8)
    .with_oom_hook(on_out_of_memory);
  let heap: Heap<'_> = Heap::new(arena, config).expect("invalid heap configuration");

  println!(
    "PID = {}, arena = {:?}, usable = {} bytes, header = {} bytes",
    std::process::id(),
    base,
    heap.usable_size(),
    heap.header_size()
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Two allocations. Each takes header + payload, rounded to 8 bytes.
  // --------------------------------------------------------------------
  let a = heap.allocate(100).expect("first allocation");
  let b = heap.allocate(200).expect("second allocation");
  println!("\n[1] a = {:p} (100 bytes), b = {:p} (200 bytes)", a, b);
  print_free_list("after a, b", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free `a`. It cannot merge with `b` (still in use), so the list now
  //    holds two blocks: 112 bytes and the big remainder.
  // --------------------------------------------------------------------
  unsafe { heap.free(a.as_ptr()) };
  println!("\n[2] freed a");
  print_free_list("after free(a)", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A 50 byte request needs 64 bytes. The smallest block that fits is
  //    the one `a` left behind, even though it is not the first by address.
  // --------------------------------------------------------------------
  let c = heap.allocate(50).expect("third allocation");
  println!(
    "\n[3] c = {:p}, reused a's block? {}",
    c,
    if c == a { "Yes" } else { "No" }
  );
  print_free_list("after c", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Ask for more than the arena holds: the hook fires, nothing changes.
  // --------------------------------------------------------------------
  let too_big = heap.allocate(4096);
  println!("\n[4] allocate(4096) -> {:?}", too_big);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Free everything. Merging folds the arena back into a single block.
  // --------------------------------------------------------------------
  unsafe {
    heap.free(b.as_ptr());
    heap.free(c.as_ptr());
  }
  println!("\n[5] freed b and c");
  print_free_list("after freeing everything", &heap);
  println!("{:#?}", heap.stats());

  drop(heap);
  unsafe { libc::munmap(region, ARENA_SIZE) };

  println!("\n[6] End of example.");
}
