use ghb_prefetch::prelude::*;

fn main() {
    println!("=== GHB Prefetch Core Demo ===\n");

    demo_sequential_stream();
    demo_negative_stride();
    demo_pc_vs_page_correlation();
}

/// Walks a pure ascending-stride trace and prints what the dispatcher
/// predicts after each access, once enough history has accumulated to
/// make a call.
fn demo_sequential_stream() {
    println!("1. Sequential Stream");
    println!("--------------------");

    let config = GhbConfig::new(256, 4, 4, true, 4096, 50, 64, 4096);
    let mut dispatcher = PrefetchDispatcher::new(config);
    let pc = Some(0x4010_u64);

    for addr in (0u64..512).step_by(64) {
        let mut predicted = Vec::new();
        dispatcher.calculate_prefetch(AccessInfo::new(addr, pc), &mut predicted, &NoAccessor);
        println!("  access {addr:>5} -> predicted {predicted:?}");
    }

    println!();
}

/// Same idea, descending stride crossing a page boundary, to show the
/// admission rule letting a small negative delta through.
fn demo_negative_stride() {
    println!("2. Negative Stride Across a Page Boundary");
    println!("------------------------------------------");

    let config = GhbConfig::default();
    let mut dispatcher = PrefetchDispatcher::new(config);
    let pc = Some(0x4020_u64);

    for addr in [4096u64, 4032, 3968, 3904, 3840, 3776] {
        let mut predicted = Vec::new();
        dispatcher.calculate_prefetch(AccessInfo::new(addr, pc), &mut predicted, &NoAccessor);
        println!("  access {addr:>5} -> predicted {predicted:?}");
    }

    println!();
}

/// Shows the PC-keyed chain winning over the page-keyed chain when a
/// single page is touched by two interleaved instructions with distinct
/// strides.
fn demo_pc_vs_page_correlation() {
    println!("3. PC vs Page Correlation");
    println!("--------------------------");

    let config = GhbConfig::new(256, 4, 4, true, 4096, 50, 64, 4096);
    let mut dispatcher = PrefetchDispatcher::new(config);

    let trace = [
        (0u64, Some(0x5000_u64)),
        (8192, Some(0x5010)),
        (64, Some(0x5000)),
        (8256, Some(0x5010)),
        (128, Some(0x5000)),
        (8320, Some(0x5010)),
        (192, Some(0x5000)),
    ];

    for (addr, pc) in trace {
        let mut predicted = Vec::new();
        dispatcher.calculate_prefetch(AccessInfo::new(addr, pc), &mut predicted, &NoAccessor);
        println!("  access {addr:>5} (pc {pc:?}) -> predicted {predicted:?}");
    }
}
