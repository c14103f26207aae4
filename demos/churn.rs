//! Allocate and release a pile of randomly sized blocks, checking heap
//! consistency along the way and reporting how the heap fared.

use rand::distributions::{Distribution, Uniform};
use rand::{Rng, RngCore, SeedableRng};

use seglist_allocator::{Allocator, FixedRegion, NO_BLOCK};

const SLOTS: usize = 64;
const ROUNDS: usize = 4096;

fn main() {
    env_logger::init();

    let mut heap: Allocator<FixedRegion<{ 128 * 1024 }>> =
        Allocator::new(FixedRegion::new()).expect("heap init failed");

    let seed: u64 = rand::thread_rng().next_u64();
    println!("using seed {}", seed);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let sizes = Uniform::new_inclusive(1usize, 512);

    let mut slots = [NO_BLOCK; SLOTS];
    for _ in 0..ROUNDS {
        let ix = rng.gen_range(0..SLOTS);
        if slots[ix] == NO_BLOCK {
            slots[ix] = heap
                .allocate(sizes.sample(&mut rng))
                .expect("allocate failed");
        } else {
            heap.release(slots[ix]);
            slots[ix] = NO_BLOCK;
        }
    }

    let (validity, stats) = heap.check();
    assert!(validity.is_valid(), "heap went inconsistent: {:?}", validity);
    println!(
        "after {} rounds: {} blocks ({} free), {} bytes free, {} bytes allocated, heap length {}",
        ROUNDS,
        stats.blocks,
        stats.free_blocks,
        stats.free_bytes,
        stats.allocated_bytes,
        heap.region().len(),
    );
}
