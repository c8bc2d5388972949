//! Drives [`HistoryHelper`] through the per-access prediction pipeline:
//! insert, correlation-key choice, an early stride detector, pattern
//! matching with a page-keyed retry, a frequency/recency fallback, and
//! address materialization under the page-boundary admission rule.

use crate::access::{AccessInfo, CorrelationKey};
use crate::config::GhbConfig;
use crate::history::HistoryHelper;

/// Marker trait for the cache-accessor hook reserved for extensions beyond
/// this core (spec §4.2.1: "unused by the core"). Every type implements it;
/// callers pass whatever accessor their simulator already has.
pub trait CacheAccessor {}
impl<T> CacheAccessor for T {}

/// A no-op accessor for callers that have nothing to pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAccessor;

/// Stateless aside from configuration; composes [`HistoryHelper`]
/// operations into one prediction per access (spec §4.2, "~30% of core").
pub struct PrefetchDispatcher {
    history: HistoryHelper,
}

impl PrefetchDispatcher {
    pub fn new(config: GhbConfig) -> Self {
        Self {
            history: HistoryHelper::new(config),
        }
    }

    pub fn reset(&mut self) {
        self.history.reset();
    }

    pub fn config(&self) -> &GhbConfig {
        self.history.config()
    }

    /// Exposes the history helper for inspection (pattern table size,
    /// emptiness), mainly useful to tests and diagnostics.
    pub fn history(&self) -> &HistoryHelper {
        &self.history
    }

    /// Runs one access through the full pipeline, appending any resulting
    /// `(address, priority)` pairs to `addresses`. Never fails; an empty
    /// append is the expected outcome when no prediction can be made.
    pub fn calculate_prefetch(
        &mut self,
        access: AccessInfo,
        addresses: &mut Vec<(u64, i32)>,
        _cache_accessor: &impl CacheAccessor,
    ) {
        if self.config().history_size() == 0 {
            return;
        }

        let config = *self.config();
        let block_addr = config.block_address(access.addr);
        let pc = if config.use_pc() { access.pc } else { None };

        let idx = self.history.insert(AccessInfo::new(block_addr, pc));
        if idx < 0 {
            return;
        }
        let idx = idx as usize;

        let pc_deltas = self.history.build_pattern(idx, CorrelationKey::Pc);
        let page_deltas = self.history.build_pattern(idx, CorrelationKey::Page);

        let deltas = if !pc_deltas.is_empty() {
            &pc_deltas
        } else if !page_deltas.is_empty() {
            &page_deltas
        } else {
            return;
        };

        let chronological: Vec<i64> = deltas.iter().rev().copied().collect();
        self.history.update_pattern_table(&chronological);

        let mut predicted = early_stride_detector(&chronological, config.degree());

        if predicted.is_empty() {
            predicted = self
                .history
                .find_pattern_match(&chronological, config.confidence_threshold());
        }

        if predicted.is_empty() && !page_deltas.is_empty() && page_deltas != pc_deltas {
            let page_chronological: Vec<i64> = page_deltas.iter().rev().copied().collect();
            self.history.update_pattern_table(&page_chronological);
            predicted = self
                .history
                .find_pattern_match(&page_chronological, config.confidence_threshold());
        }

        if predicted.is_empty() {
            predicted = self.history.fallback_pattern(&chronological);
        }

        if predicted.is_empty() {
            return;
        }

        materialize(&predicted, block_addr, &config, addresses);
    }
}

/// Cheap, high-confidence patterns checked before the statistical
/// predictor, each using the tolerance the spec states for it: simple
/// stride and alternating patterns use strict equality on the delta
/// values (the spec's "==" text); stride-amplification inside
/// `find_pattern_match` is the only place that uses the explicit `±2`
/// tolerance (spec §4.1.4 step 9).
fn early_stride_detector(chronological: &[i64], degree: usize) -> Vec<i64> {
    let n = chronological.len();
    let c = chronological;

    if n >= 2 {
        let last = c[n - 1];
        if last == c[n - 2] && last != 0 && last.abs() < 200 {
            let mut stride_count = 0usize;
            for i in (0..n).rev() {
                if c[i] == last {
                    stride_count += 1;
                } else {
                    break;
                }
            }
            if stride_count >= 2 {
                let prefetch_count = if stride_count >= 6 {
                    (2 * degree).min(stride_count)
                } else if stride_count >= 4 {
                    (degree + 2).min(stride_count)
                } else if stride_count >= 3 {
                    (degree + 1).min(stride_count)
                } else {
                    degree
                };
                return (1..=prefetch_count as i64).map(|i| last * i).collect();
            }
        }
    }

    if n >= 4
        && c[n - 1] == c[n - 3]
        && c[n - 2] == c[n - 4]
        && c[n - 1].abs() < 200
    {
        let v = c[n - 1];
        let count = degree.min(3);
        return (1..=count as i64).map(|i| v * i).collect();
    }

    if n >= 6 {
        let (d1, d2, d3, d4, d5, d6) = (c[n - 6], c[n - 5], c[n - 4], c[n - 3], c[n - 2], c[n - 1]);
        if d1 == d2 && d2 == d3 && d4 == d5 && d5 == d6 && d1 == d4 && d1.abs() < 64 && d3.abs() < 200 {
            return (1..=degree as i64).map(|i| d1 * i).collect();
        }
    }

    Vec::new()
}

/// Sorts, detects a sequential run, and converts predicted deltas into
/// absolute addresses under the page-boundary admission rule (spec
/// §4.2.5).
fn materialize(predicted: &[i64], block_addr: u64, config: &GhbConfig, addresses: &mut Vec<(u64, i32)>) {
    let mut sorted = predicted.to_vec();
    sorted.sort_by(|a, b| {
        let a_pos = *a > 0;
        let b_pos = *b > 0;
        b_pos.cmp(&a_pos).then_with(|| a.abs().cmp(&b.abs()))
    });

    let sequential = sorted.len() >= 2
        && sorted[0] != 0
        && sorted[0].abs() < 200
        && (1..sorted.len().min(3)).all(|i| sorted[i] == sorted[0] * (i as i64 + 1));
    let base_stride = sorted[0];

    let mut current_base = block_addr;
    for (i, &delta) in sorted.iter().enumerate() {
        if delta == 0 {
            continue;
        }

        let next_addr = if sequential {
            (block_addr as i64).wrapping_add(base_stride.wrapping_mul(i as i64 + 1)) as u64
        } else if i > 0 {
            let addr = (current_base as i64).wrapping_add(delta) as u64;
            current_base = addr;
            addr
        } else {
            (block_addr as i64).wrapping_add(delta) as u64
        };

        if !config.same_page(next_addr, block_addr) {
            let admitted =
                (sequential && base_stride.abs() < 64) || delta.abs() < 32 || (delta > -128 && delta < 0);
            if !admitted {
                continue;
            }
        }

        addresses.push((next_addr, 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(dispatcher: &mut PrefetchDispatcher, addrs: &[u64], pc: Option<u64>) -> Vec<(u64, i32)> {
        let mut last = Vec::new();
        for &addr in addrs {
            let mut out = Vec::new();
            dispatcher.calculate_prefetch(AccessInfo::new(addr, pc), &mut out, &NoAccessor);
            last = out;
        }
        last
    }

    fn default_config() -> GhbConfig {
        GhbConfig::new(256, 4, 4, true, 4096, 50, 64, 4096)
    }

    #[test]
    fn pure_sequential_predicts_next_blocks() {
        let mut d = PrefetchDispatcher::new(default_config());
        let addrs = [0u64, 64, 128, 192, 256, 320];
        let out = feed(&mut d, &addrs, Some(0x1000));
        let predicted_addrs: Vec<u64> = out.iter().map(|&(a, _)| a).collect();
        assert!(predicted_addrs.contains(&384));
        assert!(predicted_addrs.contains(&448));
    }

    #[test]
    fn negative_stride_crosses_page_boundary() {
        let mut d = PrefetchDispatcher::new(default_config());
        let addrs = [4096u64, 4032, 3968, 3904, 3840];
        let out = feed(&mut d, &addrs, Some(0x2000));
        let predicted_addrs: Vec<u64> = out.iter().map(|&(a, _)| a).collect();
        assert!(predicted_addrs.contains(&3776));
    }

    #[test]
    fn alternating_pattern_predicts_last_delta() {
        let mut d = PrefetchDispatcher::new(default_config());
        // Base 8192, deltas +64,-64,+64,-64,+64,-64.
        let addrs = [8192u64, 8256, 8192, 8256, 8192, 8256, 8192];
        let out = feed(&mut d, &addrs, Some(0x3000));
        assert!(!out.is_empty());
        assert!(out.len() <= 3);
    }

    #[test]
    fn strided_with_gap_matrix_pattern() {
        let mut d = PrefetchDispatcher::new(default_config());
        // deltas +8,+8,+8,+1024,+8,+8,+8,+1024
        let mut addr = 0u64;
        let mut addrs = vec![addr];
        for &delta in &[8i64, 8, 8, 1024, 8, 8, 8, 1024] {
            addr = (addr as i64 + delta) as u64;
            addrs.push(addr);
        }
        let out = feed(&mut d, &addrs, Some(0x4000));
        let predicted_addrs: Vec<u64> = out.iter().map(|&(a, _)| a).collect();
        assert!(!predicted_addrs.is_empty());
    }

    #[test]
    fn reset_clears_history_and_pattern_table() {
        let mut d = PrefetchDispatcher::new(default_config());
        let addrs = [0u64, 64, 128, 192, 256, 320];
        feed(&mut d, &addrs, Some(0x1000));
        assert!(!d.history().empty());

        d.reset();
        assert!(d.history().empty());

        let mut out = Vec::new();
        d.calculate_prefetch(AccessInfo::new(0, Some(0x1000)), &mut out, &NoAccessor);
        assert!(out.is_empty());
    }

    #[test]
    fn zero_history_size_is_a_silent_no_op() {
        let mut d = PrefetchDispatcher::new(GhbConfig::new(0, 4, 4, true, 4096, 50, 64, 4096));
        let mut out = Vec::new();
        d.calculate_prefetch(AccessInfo::new(0, Some(0x1000)), &mut out, &NoAccessor);
        assert!(out.is_empty());
    }
}
