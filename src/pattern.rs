//! The two-delta Markov pattern table and the prediction pipeline trained
//! and queried against it: adaptive confidence thresholds, chained
//! extrapolation, stride amplification, and the frequency/recency
//! fallback.

use std::collections::{BTreeMap, HashMap};

use crate::history::HistoryHelper;

/// Key into the pattern table: the two most recent deltas leading up to a
/// prediction point.
pub(crate) type DeltaPair = (i64, i64);

/// Tally of observed next-deltas following one `DeltaPair`. Ordered by
/// delta so that candidate selection over `counts` iterates (and breaks
/// score/confidence ties) in a fixed order instead of `HashMap`'s
/// per-process-randomized one — `calculate_prefetch` must stay
/// deterministic for the same access trace (spec §5).
#[derive(Debug, Clone, Default)]
pub(crate) struct PatternEntry {
    pub counts: BTreeMap<i64, u32>,
    pub total: u32,
}

impl PatternEntry {
    fn record(&mut self, delta: i64) {
        *self.counts.entry(delta).or_insert(0) += 1;
        self.total += 1;
        debug_assert_eq!(self.total, self.counts.values().sum::<u32>());
    }

    /// Integer-floor confidence percent of `delta` within this entry.
    fn confidence_of(&self, delta: i64) -> u32 {
        match self.counts.get(&delta) {
            Some(&count) if self.total > 0 => (count as u64 * 100 / self.total as u64) as u32,
            _ => 0,
        }
    }

    /// `(delta, confidence)` of the single most common next-delta, if any.
    fn top(&self) -> Option<(i64, u32)> {
        self.counts
            .iter()
            .map(|(&delta, _)| (delta, self.confidence_of(delta)))
            .max_by_key(|&(_, c)| c)
    }
}

/// Learned map from `DeltaPair` to the statistics of what followed it.
#[derive(Debug, Clone, Default)]
pub(crate) struct PatternTable {
    entries: HashMap<DeltaPair, PatternEntry>,
}

impl PatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, key: DeltaPair, delta: i64) {
        self.entries.entry(key).or_default().record(delta);
    }

    pub(crate) fn get(&self, key: &DeltaPair) -> Option<&PatternEntry> {
        self.entries.get(key)
    }
}

/// Adaptive threshold subtracted from `confidence_threshold`, per spec
/// §4.1.4 step 2. Entries with `total < 2` have no usable threshold.
fn adaptive_threshold(confidence_threshold: u32, total: u32) -> Option<u32> {
    if total < 2 {
        return None;
    }
    let (subtract, floor) = if total >= 50 {
        (30, 12)
    } else if total >= 40 {
        (25, 15)
    } else if total >= 30 {
        (22, 18)
    } else if total >= 20 {
        (18, 20)
    } else if total >= 12 {
        (15, 22)
    } else if total >= 6 {
        (10, 25)
    } else if total >= 3 {
        (8, 30)
    } else {
        (5, 35)
    };
    Some(confidence_threshold.saturating_sub(subtract).max(floor))
}

/// One candidate next-delta with its merged score, before sorting.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    delta: i64,
    score: u32,
}

/// Deterministic tie-break between two equally-scored deltas: positive
/// before non-positive, then smaller `|delta|` — the same rule the spec
/// gives for `fallbackPattern`'s sort (§4.1.5 step 2), reused wherever a
/// score/confidence tie would otherwise fall through to iteration order.
fn delta_tie_break(a: i64, b: i64) -> std::cmp::Ordering {
    (b > 0).cmp(&(a > 0)).then_with(|| a.abs().cmp(&b.abs()))
}

fn confidence_bonus(count: u32) -> u32 {
    if count >= 5 {
        8
    } else if count >= 3 {
        3
    } else {
        0
    }
}

/// Collects weighted candidates from one pattern-table key into `out`,
/// merging by max score per delta (spec §4.1.4 step 3).
fn collect_candidates(
    table: &PatternTable,
    key: DeltaPair,
    confidence_threshold: u32,
    weight: u32,
    out: &mut BTreeMap<i64, u32>,
) {
    let Some(entry) = table.get(&key) else {
        return;
    };
    let Some(threshold) = adaptive_threshold(confidence_threshold, entry.total) else {
        return;
    };
    for (&delta, &count) in &entry.counts {
        let confidence = entry.confidence_of(delta);
        if confidence < threshold {
            continue;
        }
        let score = (confidence + confidence_bonus(count)) * weight;
        out.entry(delta)
            .and_modify(|s| *s = (*s).max(score))
            .or_insert(score);
    }
}

impl HistoryHelper {
    /// Trains the pattern table on a forward-temporal delta sequence,
    /// recording the primary two-delta transitions plus wider-scale and
    /// reverse-direction variants (spec §4.1.3).
    pub fn update_pattern_table(&mut self, chronological: &[i64]) {
        let n = chronological.len();
        if n < 3 {
            return;
        }
        let c = chronological;
        for i in 0..n {
            if i + 2 >= n {
                continue;
            }
            self.pattern_table.record((c[i], c[i + 1]), c[i + 2]);
            if i + 3 < n {
                self.pattern_table.record((c[i + 1], c[i + 2]), c[i + 3]);
            }
            if i + 4 < n {
                self.pattern_table.record((c[i + 2], c[i + 3]), c[i + 4]);
            }
            if i + 5 < n {
                self.pattern_table.record((c[i + 3], c[i + 4]), c[i + 5]);
            }
            if i >= 1 && i + 3 < n {
                self.pattern_table.record((c[i - 1], c[i]), c[i + 2]);
            }
            if i >= 2 && i + 4 < n {
                self.pattern_table.record((c[i - 2], c[i - 1]), c[i + 2]);
            }
            if i >= 1 {
                self.pattern_table
                    .record((-c[i], -c[i + 1]), -c[i + 2]);
            }
        }
    }

    /// Predicts the next deltas from `chronological` using the learned
    /// pattern table: weighted candidate scoring, chained extrapolation,
    /// and stride amplification (spec §4.1.4). Returns the empty vector iff
    /// no prediction could be produced.
    pub fn find_pattern_match(&self, chronological: &[i64], confidence_threshold: u32) -> Vec<i64> {
        let n = chronological.len();
        if n < 2 {
            return Vec::new();
        }
        let c = chronological;

        let primary_key: DeltaPair = (c[n - 2], c[n - 1]);
        let secondary_keys: Vec<DeltaPair> = {
            let mut v = Vec::new();
            if n >= 3 {
                v.push((c[n - 3], c[n - 2]));
            }
            if n >= 4 {
                v.push((c[n - 4], c[n - 3]));
            }
            v
        };

        // Step 3: weighted candidates, merged across keys.
        let mut merged: BTreeMap<i64, u32> = BTreeMap::new();
        collect_candidates(&self.pattern_table, primary_key, confidence_threshold, 5, &mut merged);
        for &key in &secondary_keys {
            collect_candidates(&self.pattern_table, key, confidence_threshold, 1, &mut merged);
        }

        // Step 4/2: adaptive threshold and best entry, from the primary key only.
        let primary_entry = self.pattern_table.get(&primary_key);
        let primary_adaptive = primary_entry.and_then(|e| adaptive_threshold(confidence_threshold, e.total));
        let best_entry = primary_entry.and_then(|e| {
            let (_, top_conf) = e.top()?;
            let threshold = primary_adaptive?;
            if top_conf >= threshold {
                Some((top_conf, e.total))
            } else {
                None
            }
        });

        // Step 5: effective degree.
        let degree = self.config().degree() as u32;
        let effective_degree = match best_entry {
            Some((conf, total)) if conf >= 90 && total >= 20 => degree * 10,
            Some((conf, total)) if conf >= 85 && total >= 15 => degree * 8,
            Some((conf, total)) if conf >= 80 && total >= 10 => degree * 6,
            Some((conf, total)) if conf >= 70 && total >= 5 => degree * 4,
            Some((conf, total)) if conf >= 60 && total >= 3 => degree * 2,
            Some((conf, total)) if conf >= 50 && total >= 2 => degree * 2,
            Some((conf, _)) if conf >= 40 => (degree + 4).min((degree * 18) / 10),
            Some((conf, _)) if conf >= 30 => (degree + 2).min((degree * 15) / 10),
            _ => degree + 2,
        } as usize;

        // Step 6: sort merged candidates by score descending, emit until full.
        let mut sorted: Vec<Candidate> = merged
            .into_iter()
            .map(|(delta, score)| Candidate { delta, score })
            .collect();
        sorted.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| delta_tie_break(a.delta, b.delta)));

        let mut predicted: Vec<i64> = Vec::new();
        for cand in &sorted {
            if predicted.len() >= effective_degree {
                break;
            }
            if cand.delta != 0 && !predicted.contains(&cand.delta) {
                predicted.push(cand.delta);
            }
        }

        let adaptive = primary_adaptive.unwrap_or(confidence_threshold);

        // Step 7: lenient backfill from the primary entry, then secondaries.
        if predicted.len() < effective_degree {
            if let Some(entry) = primary_entry {
                let lenient = adaptive.saturating_sub(10).max(25);
                backfill_from_entry(entry, lenient, effective_degree, &mut predicted);
            }
        }
        if predicted.len() < effective_degree {
            let lenient = adaptive.saturating_sub(5).max(25);
            for &key in &secondary_keys {
                if predicted.len() >= effective_degree {
                    break;
                }
                if let Some(entry) = self.pattern_table.get(&key) {
                    if entry.total >= 3 {
                        backfill_from_entry(entry, lenient, effective_degree, &mut predicted);
                    }
                }
            }
        }

        // Step 8: chained extrapolation.
        if !predicted.is_empty() {
            let max_attempts = 3 * effective_degree;
            let mut attempt = 0;
            let mut chain_prev = c[n - 1];
            let mut chain_base = predicted[0];
            while predicted.len() < effective_degree && attempt < max_attempts {
                let threshold = if attempt == 0 {
                    adaptive.max(25)
                } else {
                    adaptive.saturating_sub(10).max(20)
                };
                let Some(entry) = self.pattern_table.get(&(chain_prev, chain_base)) else {
                    break;
                };
                if entry.total < 1 {
                    break;
                }
                let best = entry
                    .counts
                    .keys()
                    .filter(|&&d| d != 0 && !predicted.contains(&d))
                    .map(|&d| (d, entry.confidence_of(d)))
                    .filter(|&(_, conf)| conf >= threshold)
                    .max_by(|a, b| a.1.cmp(&b.1).then_with(|| delta_tie_break(b.0, a.0)));
                match best {
                    Some((delta, _)) => predicted.push(delta),
                    None => break,
                }
                attempt += 1;
                let len = predicted.len();
                if len >= 2 {
                    chain_prev = predicted[len - 2];
                    chain_base = predicted[len - 1];
                }
            }
        }

        // Step 9: stride amplification.
        if predicted.len() < effective_degree && n >= 2 {
            let last = c[n - 1];
            let strides: Vec<i64> = predicted
                .iter()
                .copied()
                .filter(|&p| (p - last).abs() <= 2 && p != 0 && p.abs() < 300)
                .collect();
            for p in strides {
                amplify_stride(p, effective_degree, &mut predicted);
                if predicted.len() >= effective_degree {
                    break;
                }
            }

            if predicted.len() < effective_degree {
                if let Some(value) = tail_run_stride(c, last) {
                    amplify_tail_run_stride(value, effective_degree, &mut predicted);
                }
            }
        }

        predicted
    }

    /// Frequency/recency fallback used when pattern matching produces
    /// nothing (spec §4.1.5).
    pub fn fallback_pattern(&self, chronological: &[i64]) -> Vec<i64> {
        let n = chronological.len();
        let degree = self.config().degree();
        if n == 0 {
            return Vec::new();
        }
        let window = n.min(self.config().pattern_length());
        let start = n - window;
        let c = &chronological[start..];

        let mut freq: HashMap<i64, u32> = HashMap::new();
        let mut last_seen: HashMap<i64, usize> = HashMap::new();
        for (offset, &delta) in c.iter().enumerate() {
            if delta == 0 {
                continue;
            }
            *freq.entry(delta).or_insert(0) += 1;
            last_seen.insert(delta, start + offset);
        }

        if freq.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(i64, i64)> = freq
            .iter()
            .map(|(&delta, &f)| {
                let i = last_seen[&delta];
                let recency = (n as i64) - (i as i64) + 1;
                (delta, 3 * f as i64 + 2 * recency)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| (b.0 > 0).cmp(&(a.0 > 0)))
                .then_with(|| a.0.abs().cmp(&b.0.abs()))
        });

        let top_delta = scored[0].0;

        // Step 3: consecutive run of the top delta at the tail.
        let mut run = 0usize;
        for i in (0..chronological.len()).rev().take(8) {
            if chronological[i] == top_delta {
                run += 1;
            } else {
                break;
            }
        }
        if run >= 1 && top_delta.abs() < 300 {
            let count = if run >= 8 {
                6 * degree
            } else if run >= 6 {
                5 * degree
            } else if run >= 4 {
                4 * degree
            } else if run >= 2 {
                2 * degree
            } else {
                (degree + 2).min((degree * 15) / 10)
            };
            return (1..=count as i64).map(|i| top_delta * i).collect();
        }

        // Step 4: sorted emission, then backfill with remaining uniques.
        let mut predicted: Vec<i64> = Vec::new();
        for &(delta, _) in scored.iter().take(degree) {
            predicted.push(delta);
        }
        if predicted.len() < degree {
            for &(delta, _) in scored.iter().rev() {
                if predicted.len() >= degree {
                    break;
                }
                if !predicted.contains(&delta) {
                    predicted.push(delta);
                }
            }
        }
        predicted
    }
}

/// Appends a non-duplicate, below-threshold backfill delta list from one
/// pattern entry, in descending-confidence order (spec §4.1.4 step 7).
fn backfill_from_entry(entry: &PatternEntry, threshold: u32, cap: usize, predicted: &mut Vec<i64>) {
    let mut candidates: Vec<(i64, u32)> = entry
        .counts
        .keys()
        .filter(|&&d| d != 0)
        .map(|&d| (d, entry.confidence_of(d)))
        .filter(|&(_, c)| c >= threshold)
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| delta_tie_break(a.0, b.0)));
    for (delta, _) in candidates {
        if predicted.len() >= cap {
            break;
        }
        if !predicted.contains(&delta) {
            predicted.push(delta);
        }
    }
}

/// Appends `stride*2, stride*3, ...` to `predicted` up to `cap`, skipping
/// values within ±2 of anything already present (spec §4.1.4 step 9).
fn amplify_stride(stride: i64, cap: usize, predicted: &mut Vec<i64>) {
    let amplify = if stride.abs() < 128 {
        3
    } else if stride.abs() < 256 {
        2
    } else {
        1
    };
    let remaining = cap.saturating_sub(predicted.len());
    let max_k = 1 + remaining * amplify;
    for k in 2..=max_k as i64 {
        if predicted.len() >= cap {
            break;
        }
        let Some(candidate) = stride.checked_mul(k) else {
            break;
        };
        if predicted.iter().any(|&p| (p - candidate).abs() <= 2) {
            continue;
        }
        predicted.push(candidate);
    }
}

/// Appends `value*1, value*2, ...` to `predicted` up to `cap`. Unlike
/// `amplify_stride`, `value` itself is not already a member of `predicted`
/// (it came from scanning `chronological`, not from an existing candidate),
/// so the multiplier sequence starts at 1, not 2 (spec §4.1.4 step 9,
/// second stride source: "append value·1, value·2, ...").
fn amplify_tail_run_stride(value: i64, cap: usize, predicted: &mut Vec<i64>) {
    if predicted.len() < cap && !predicted.iter().any(|&p| (p - value).abs() <= 2) {
        predicted.push(value);
    }
    amplify_stride(value, cap, predicted);
}

/// Finds a run of >= 2 tail values within ±2 of `last`, scanning at most 5
/// positions further back than the two already implied by the stride that
/// triggered amplification. Returns the most recent qualifying value.
fn tail_run_stride(chronological: &[i64], last: i64) -> Option<i64> {
    let n = chronological.len();
    if n < 2 {
        return None;
    }
    let scan = n.min(7);
    let mut run = 0usize;
    let mut candidate = None;
    for i in (0..n).rev().take(scan) {
        let v = chronological[i];
        if (v - last).abs() <= 2 {
            run += 1;
            if candidate.is_none() {
                candidate = Some(v);
            }
        } else {
            break;
        }
    }
    if run >= 2 {
        candidate.filter(|v| v.abs() < 300)
    } else {
        None
    }
}
