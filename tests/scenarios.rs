//! End-to-end scenarios: block size 64 bytes, degree 4, pattern_length 4,
//! confidence_threshold 50, use_pc true, history_size 256, page_bytes 4096.

use ghb_prefetch::prelude::*;

fn dispatcher() -> PrefetchDispatcher {
    PrefetchDispatcher::new(GhbConfig::new(256, 4, 4, true, 4096, 50, 64, 4096))
}

fn feed_all(d: &mut PrefetchDispatcher, addrs: &[u64], pc: Option<u64>) -> Vec<Vec<(u64, i32)>> {
    addrs
        .iter()
        .map(|&addr| {
            let mut out = Vec::new();
            d.calculate_prefetch(AccessInfo::new(addr, pc), &mut out, &NoAccessor);
            out
        })
        .collect()
}

#[test]
fn scenario_pure_sequential() {
    let mut d = dispatcher();
    let addrs = [0u64, 64, 128, 192, 256, 320];
    let rounds = feed_all(&mut d, &addrs, Some(0x1000));

    let after_4th: Vec<u64> = rounds[3].iter().map(|&(a, _)| a).collect();
    assert!(after_4th.contains(&384));
    assert!(after_4th.contains(&448));

    let after_6th: Vec<u64> = rounds[5].iter().map(|&(a, _)| a).collect();
    for expected in [384u64, 448, 512, 576] {
        assert!(
            after_6th.contains(&expected),
            "expected {expected} in {after_6th:?}"
        );
    }
    // All within the first 4 KB page.
    assert!(after_6th.iter().all(|&a| a < 4096));
}

#[test]
fn scenario_negative_stride() {
    let mut d = dispatcher();
    let addrs = [4096u64, 4032, 3968, 3904, 3840];
    let rounds = feed_all(&mut d, &addrs, Some(0x2000));

    let last: Vec<u64> = rounds.last().unwrap().iter().map(|&(a, _)| a).collect();
    assert!(last.contains(&3776));
    assert!(last.contains(&3712));
}

#[test]
fn scenario_alternating() {
    let mut d = dispatcher();
    // Base 8192, deltas +64,-64,+64,-64,+64,-64.
    let addrs = [8192u64, 8256, 8192, 8256, 8192, 8256, 8192];
    let rounds = feed_all(&mut d, &addrs, Some(0x3000));

    let last = rounds.last().unwrap();
    assert!(!last.is_empty());
    assert!(last.len() <= 3);
}

#[test]
fn scenario_strided_with_gap() {
    let mut d = dispatcher();
    // deltas +8,+8,+8,+1024,+8,+8,+8,+1024
    let mut addr = 0i64;
    let mut addrs = vec![addr as u64];
    for &delta in &[8i64, 8, 8, 1024, 8, 8, 8, 1024] {
        addr += delta;
        addrs.push(addr as u64);
    }
    let rounds = feed_all(&mut d, &addrs, Some(0x4000));

    let last: Vec<u64> = rounds.last().unwrap().iter().map(|&(a, _)| a).collect();
    assert!(!last.is_empty());
    let base = *addrs.last().unwrap();
    let page = base - base % 4096;
    for &a in &last {
        assert_eq!(a - a % 4096, page, "prefetch {a} left the current page");
    }
}

#[test]
fn scenario_unpredictable() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut d = dispatcher();
    let mut rng = StdRng::seed_from_u64(42);
    let mut addr: i64 = 1 << 20;
    let mut fired = 0usize;
    let total = 1000usize;
    let warmup = 50usize;

    for i in 0..total {
        let delta = rng.gen_range(-8192i64..=8192);
        addr += delta;
        let mut out = Vec::new();
        d.calculate_prefetch(AccessInfo::new(addr as u64, Some(0x5000)), &mut out, &NoAccessor);
        if i >= warmup && !out.is_empty() {
            fired += 1;
        }
    }

    let measured = total - warmup;
    assert!(
        fired * 100 < measured * 5,
        "fired {fired}/{measured} invocations, expected < 5%"
    );
}

#[test]
fn scenario_reset() {
    let mut d = dispatcher();
    let addrs = [0u64, 64, 128, 192, 256, 320];
    feed_all(&mut d, &addrs, Some(0x1000));

    d.reset();
    assert_eq!(d.history().pattern_table_len(), 0);

    let mut out = Vec::new();
    d.calculate_prefetch(AccessInfo::new(0, Some(0x1000)), &mut out, &NoAccessor);
    assert!(out.is_empty());
}
