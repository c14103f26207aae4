//! A walk through the public allocator operations, printing the heap's
//! occupancy along the way.

use seglist_allocator::{Allocator, FixedRegion};

fn main() {
    env_logger::init();

    let mut heap: Allocator<FixedRegion<{ 64 * 1024 }>> =
        Allocator::new(FixedRegion::new()).expect("heap init failed");

    let a = heap.allocate(100).expect("allocate failed");
    heap.payload_mut(a)[..100].fill(0xAB);
    println!("allocated 100 bytes at offset {}", a);

    let b = heap.zeroed_allocate(10, 16).expect("zeroed allocate failed");
    println!("allocated 160 zeroed bytes at offset {}", b);

    let a = heap.resize(a, 300).expect("resize failed");
    println!(
        "grew the first allocation to 300 bytes at offset {} (pattern intact: {})",
        a,
        heap.payload(a)[..100].iter().all(|&b| b == 0xAB),
    );

    heap.release(b);
    heap.release(a);

    let (validity, stats) = heap.check();
    println!("heap valid: {}", validity.is_valid());
    println!(
        "{} blocks, {} free with {} bytes; region length {}",
        stats.blocks,
        stats.free_blocks,
        stats.free_bytes,
        heap.region().len(),
    );
}
