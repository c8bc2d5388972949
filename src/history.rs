//! The GHB circular access history: a bounded ring of recent accesses plus
//! reverse chains keyed by program counter and by page.

use std::collections::HashMap;

use crate::access::{AccessInfo, CorrelationKey, NUM_KEYS};
use crate::config::GhbConfig;
use crate::pattern::PatternTable;

/// Back-link for one correlation key on one history slot.
///
/// `prev`/`prev_seq` are kept apart so a chain walk can detect that `prev`
/// has since been overwritten by an unrelated access without having to
/// scrub back-pointers on every eviction (spec §4.1.1 rationale, §9).
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkInfo {
    pub prev: i64,
    pub prev_seq: u64,
    pub key_valid: bool,
    pub key_value: u64,
}

impl LinkInfo {
    const INVALID: Self = Self {
        prev: -1,
        prev_seq: 0,
        key_valid: false,
        key_value: 0,
    };
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct HistoryEntry {
    pub addr: u64,
    pub seq: u64,
    pub links: [LinkInfo; NUM_KEYS],
}

impl Default for HistoryEntry {
    fn default() -> Self {
        Self {
            addr: 0,
            seq: 0,
            links: [LinkInfo::INVALID; NUM_KEYS],
        }
    }
}

/// Owns the circular history buffer, the per-key last-index maps, and the
/// pattern table trained from the deltas the history produces.
///
/// This is the bulk of the GHB core (spec §2: "~70% of core"): insertion,
/// chain traversal, and (via [`crate::pattern`]) pattern learning and
/// matching all live on this type.
pub struct HistoryHelper {
    config: GhbConfig,
    entries: Vec<HistoryEntry>,
    last_index: [HashMap<u64, usize>; NUM_KEYS],
    head: usize,
    filled: bool,
    sequence_counter: u64,
    pub(crate) pattern_table: PatternTable,
}

impl HistoryHelper {
    pub fn new(config: GhbConfig) -> Self {
        let history_size = config.history_size();
        Self {
            config,
            entries: vec![HistoryEntry::default(); history_size],
            last_index: [HashMap::new(), HashMap::new()],
            head: 0,
            filled: false,
            sequence_counter: 1,
            pattern_table: PatternTable::new(),
        }
    }

    /// Returns everything to the state a fresh `HistoryHelper` with the
    /// same configuration would have.
    pub fn reset(&mut self) {
        let history_size = self.config.history_size();
        self.entries = vec![HistoryEntry::default(); history_size];
        self.last_index = [HashMap::new(), HashMap::new()];
        self.head = 0;
        self.filled = false;
        self.sequence_counter = 1;
        self.pattern_table.clear();
    }

    /// True before the very first insert.
    pub fn empty(&self) -> bool {
        !self.filled && self.head == 0
    }

    pub fn config(&self) -> &GhbConfig {
        &self.config
    }

    /// Number of distinct `DeltaPair` keys currently learned.
    pub fn pattern_table_len(&self) -> usize {
        self.pattern_table.len()
    }

    /// Inserts an access, evicting the outgoing occupant of `head` first if
    /// the ring has already wrapped. Returns the slot written, or `-1` iff
    /// `history_size` is zero (unreachable once `GhbConfig` has clamped it
    /// to `>= 1`, kept for fidelity with the spec's documented contract).
    pub fn insert(&mut self, access: AccessInfo) -> i64 {
        if self.config.history_size() == 0 {
            return -1;
        }

        let slot = self.head;

        if self.filled {
            for key in CorrelationKey::ALL {
                let idx = key.index();
                let link = self.entries[slot].links[idx];
                if link.key_valid && self.last_index[idx].get(&link.key_value) == Some(&slot) {
                    self.last_index[idx].remove(&link.key_value);
                }
            }
        }

        let seq = self.sequence_counter;
        self.sequence_counter += 1;
        let mut links = [LinkInfo::INVALID; NUM_KEYS];

        if self.config.use_pc() {
            if let Some(pc) = access.pc {
                links[CorrelationKey::Pc.index()] = self.chain_link(CorrelationKey::Pc, pc, slot);
                self.last_index[CorrelationKey::Pc.index()].insert(pc, slot);
            }
        }

        let page_key = self.config.page_key(access.addr);
        links[CorrelationKey::Page.index()] = self.chain_link(CorrelationKey::Page, page_key, slot);
        self.last_index[CorrelationKey::Page.index()].insert(page_key, slot);

        self.entries[slot] = HistoryEntry {
            addr: access.addr,
            seq,
            links,
        };

        self.head = (self.head + 1) % self.config.history_size();
        if self.head == 0 {
            self.filled = true;
        }

        slot as i64
    }

    /// Looks up the current chain head for `key_value` (before this
    /// insert's own entry replaces it) and builds the link that will point
    /// back to it, or to nothing if this is the first occurrence.
    fn chain_link(&self, key: CorrelationKey, key_value: u64, _slot: usize) -> LinkInfo {
        match self.last_index[key.index()].get(&key_value) {
            Some(&prev) => LinkInfo {
                prev: prev as i64,
                prev_seq: self.entries[prev].seq,
                key_valid: true,
                key_value,
            },
            None => LinkInfo {
                prev: -1,
                prev_seq: 0,
                key_valid: true,
                key_value,
            },
        }
    }

    /// Reverse-chronological deltas ending at `index`, along `key`, of
    /// length at most `pattern_length`. An empty result means "no
    /// prediction possible from this key" (spec §4.1.2: "returns true iff
    /// at least one delta was produced").
    pub fn build_pattern(&self, index: usize, key: CorrelationKey) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.config.pattern_length());
        let mut current = index;

        loop {
            if out.len() >= self.config.pattern_length() {
                break;
            }
            let link = self.entries[current].links[key.index()];
            if link.prev < 0 {
                break;
            }
            let prev = link.prev as usize;
            if self.entries[prev].seq != link.prev_seq {
                break;
            }
            let delta = self.entries[current].addr as i64 - self.entries[prev].addr as i64;
            out.push(delta);
            current = prev;
        }

        out
    }
}
