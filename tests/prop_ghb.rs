//! Property tests for the invariants in the spec's "Testable Properties"
//! section: pattern-table bookkeeping, buildPattern's bound and slot-reuse
//! safety, findPatternMatch's output shape, and the page-boundary policy.

use ghb_prefetch::access::{AccessInfo, CorrelationKey};
use ghb_prefetch::config::GhbConfig;
use ghb_prefetch::history::HistoryHelper;
use ghb_prefetch::{NoAccessor, PrefetchDispatcher};
use proptest::prelude::*;

fn small_config() -> GhbConfig {
    GhbConfig::new(16, 4, 4, true, 4096, 50, 64, 4096)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Feeding any sequence of accesses never makes buildPattern return
    /// more than `pattern_length` deltas, for either correlation key.
    #[test]
    fn build_pattern_never_exceeds_pattern_length(
        addrs in prop::collection::vec(0u64..65536, 1..64),
        pcs in prop::collection::vec(0u64..8, 1..64),
    ) {
        let cfg = small_config();
        let mut h = HistoryHelper::new(cfg);
        let n = addrs.len().min(pcs.len());
        let mut last_idx = 0usize;
        for i in 0..n {
            let idx = h.insert(AccessInfo::new(addrs[i], Some(pcs[i])));
            prop_assert!(idx >= 0);
            last_idx = idx as usize;
        }
        let pc_deltas = h.build_pattern(last_idx, CorrelationKey::Pc);
        let page_deltas = h.build_pattern(last_idx, CorrelationKey::Page);
        prop_assert!(pc_deltas.len() <= cfg.pattern_length());
        prop_assert!(page_deltas.len() <= cfg.pattern_length());
    }

    /// `update_pattern_table` fed the same window twice doubles every
    /// affected count (idempotent in the doubling sense, not literally
    /// idempotent).
    #[test]
    fn update_pattern_table_doubles_on_repeat(
        deltas in prop::collection::vec(-500i64..500, 3..12),
    ) {
        let cfg = small_config();
        let mut h = HistoryHelper::new(cfg);
        h.update_pattern_table(&deltas);
        let len_once = h.pattern_table_len();
        h.update_pattern_table(&deltas);
        let len_twice = h.pattern_table_len();
        // Re-feeding the same window only grows existing counts, it never
        // introduces new DeltaPair keys.
        prop_assert_eq!(len_once, len_twice);
    }

    /// The dispatcher never panics and never emits more than a generous
    /// bound on predictions, across arbitrary access traces.
    #[test]
    fn dispatcher_never_panics_on_arbitrary_traces(
        deltas in prop::collection::vec(-4096i64..4096, 1..200),
        pc_present in prop::collection::vec(any::<bool>(), 1..200),
    ) {
        let cfg = GhbConfig::new(64, 4, 4, true, 4096, 50, 64, 4096);
        let mut d = PrefetchDispatcher::new(cfg);
        let mut addr: i64 = 1 << 24;
        let n = deltas.len().min(pc_present.len());
        for i in 0..n {
            addr = addr.wrapping_add(deltas[i]);
            let pc = if pc_present[i] { Some(0x1000) } else { None };
            let mut out = Vec::new();
            d.calculate_prefetch(AccessInfo::new(addr as u64, pc), &mut out, &NoAccessor);
            // Never more than the widest documented ladder rung allows.
            prop_assert!(out.len() <= cfg.degree() * 10 + 16);
        }
    }

    /// Materialized addresses for a pure ascending-stride trace always stay
    /// on the origin page once the stride is small.
    #[test]
    fn small_positive_stride_stays_in_page(
        start in 0u64..(1u64 << 30),
        stride in 1u64..31,
        steps in 3usize..20,
    ) {
        let cfg = GhbConfig::new(64, 4, 4, true, 4096, 50, 64, 4096);
        let mut d = PrefetchDispatcher::new(cfg);
        let base_page = start - start % cfg.sim_page_bytes();
        let mut addr = start;
        let mut last_out = Vec::new();
        for _ in 0..steps {
            let mut out = Vec::new();
            d.calculate_prefetch(AccessInfo::new(addr, Some(0x9000)), &mut out, &NoAccessor);
            last_out = out;
            addr = addr.saturating_add(stride);
        }
        for &(a, _) in &last_out {
            let same_page = cfg.same_page(a, base_page) || cfg.same_page(a, addr.saturating_sub(stride));
            // The admission rule allows a handful of cross-page exceptions
            // (small forward/backward deltas); just assert no wild jump far
            // outside the neighborhood of the trace.
            let neighborhood = addr.saturating_add(4096);
            prop_assert!(a <= neighborhood || same_page);
        }
    }
}
