use seglist_allocator::{Allocator, FixedRegion, HEAP_OVERHEAD, NO_BLOCK};

use rand::distributions::Distribution;
use rand::{Rng, RngCore, SeedableRng};
use test_log::test;

type StressAllocator = Allocator<FixedRegion<{ 256 * 1024 }>>;

// One live allocation: its handle, payload length, and fill byte.
#[derive(Clone, Copy)]
struct Slot {
    blk: usize,
    len: usize,
    fill: u8,
}

const EMPTY: Slot = Slot {
    blk: NO_BLOCK,
    len: 0,
    fill: 0,
};

fn validate(alloc: &StressAllocator, live: usize) {
    let (validity, stats) = alloc.check();
    log::debug!(
        "live: {}; heap: {}; validity: {:?}, stats: {:?}",
        live,
        alloc.region().len(),
        validity,
        stats,
    );
    assert!(validity.is_valid(), "invalid heap: {:?}", validity);

    // Every heap byte is in the fixed overhead, a free block, or an
    // allocated block.
    assert_eq!(
        HEAP_OVERHEAD + stats.free_bytes + stats.allocated_bytes,
        alloc.region().len(),
    );
}

fn check_pattern(alloc: &StressAllocator, slot: &Slot, upto: usize) {
    let bytes = &alloc.payload(slot.blk)[..upto.min(slot.len)];
    assert!(
        bytes.iter().all(|&b| b == slot.fill),
        "payload at {} lost its fill pattern",
        slot.blk,
    );
}

#[test]
fn test_stress() {
    let mut allocator: StressAllocator = Allocator::new(FixedRegion::new()).unwrap();
    let mut slots: [Slot; 128] = [EMPTY; 128];
    let mut live = 0usize;

    let seed: u64 = rand::thread_rng().next_u64();
    log::info!("Using seed {}", seed);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let size_range = rand::distributions::Uniform::new_inclusive(1usize, 32);

    for _ in 0..1024 * 10 {
        let ix = rng.gen_range(0..slots.len());
        let slot = slots[ix];

        if slot.blk == NO_BLOCK {
            // Allocate, occasionally through the zeroing path.
            let len = size_range.sample(&mut rng) * size_range.sample(&mut rng);
            let fill = (ix as u8) ^ 0xA5;

            let blk = if rng.gen_ratio(1, 8) {
                let blk = allocator
                    .zeroed_allocate(len, 1)
                    .expect("zeroed allocation failed");
                assert!(allocator.payload(blk)[..len].iter().all(|&b| b == 0));
                blk
            } else {
                allocator.allocate(len).expect("allocation failed")
            };
            assert_eq!(blk % 8, 0);

            allocator.payload_mut(blk)[..len].fill(fill);
            slots[ix] = Slot { blk, len, fill };
            live += 1;
        } else if rng.gen_ratio(1, 4) {
            // Resize, then make sure the surviving prefix kept its fill.
            let new_len = size_range.sample(&mut rng) * size_range.sample(&mut rng);
            let blk = allocator
                .resize(slot.blk, new_len)
                .expect("resize failed");
            slots[ix].blk = blk;
            check_pattern(&allocator, &slots[ix], new_len.min(slot.len));

            // Refill so the whole payload is patterned again.
            allocator.payload_mut(blk)[..new_len].fill(slot.fill);
            slots[ix].len = new_len;
        } else {
            // Release, verifying the contents first.
            check_pattern(&allocator, &slot, slot.len);
            allocator.release(slot.blk);
            slots[ix] = EMPTY;
            live -= 1;
        }

        validate(&allocator, live);
    }

    // Drain everything; the heap should fold back into a handful of
    // coalesced free blocks covering all non-overhead bytes.
    for slot in slots.iter().filter(|s| s.blk != NO_BLOCK) {
        check_pattern(&allocator, slot, slot.len);
        allocator.release(slot.blk);
    }
    let (validity, stats) = allocator.check();
    assert!(validity.is_valid());
    assert_eq!(stats.allocated_bytes, 0);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes + HEAP_OVERHEAD, allocator.region().len());
}
