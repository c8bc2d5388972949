//! Construction-time tunables and the small amount of address arithmetic
//! the core would otherwise source from its enclosing framework.

/// Immutable configuration for a [`crate::dispatcher::PrefetchDispatcher`].
///
/// All numeric fields are clamped to safe minimums at construction; a
/// degenerate configuration (e.g. `degree = 0`) never produces an error, it
/// is silently made useless-but-safe instead, matching the teacher's
/// `with_config` constructors. Fields are private and reachable only
/// through [`GhbConfig::new`] (or the read-only accessors below) so that
/// clamp is an invariant of the type, not just of one constructor: a
/// struct-literal `GhbConfig { page_bytes: 0, .. }` would make every
/// division by `page_bytes` panic, which the rest of the crate is built to
/// never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhbConfig {
    /// Number of slots in the circular history buffer.
    history_size: usize,
    /// Maximum length of a reverse-chronological delta chain.
    pattern_length: usize,
    /// Nominal number of predictions emitted per access.
    degree: usize,
    /// Whether PC-keyed chains are maintained at all.
    use_pc: bool,
    /// Byte size of a page for the *pattern table's* page correlation key.
    page_bytes: u64,
    /// Baseline confidence percent threshold, in `[0, 100]`.
    confidence_threshold: u32,
    /// Cache block size, used to align incoming addresses.
    block_bytes: u64,
    /// The simulator's page size, used for the materialization
    /// page-boundary admission rule. May differ from `page_bytes`.
    sim_page_bytes: u64,
}

impl GhbConfig {
    /// Builds a configuration, clamping every field to a safe minimum.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        history_size: usize,
        pattern_length: usize,
        degree: usize,
        use_pc: bool,
        page_bytes: u64,
        confidence_threshold: u32,
        block_bytes: u64,
        sim_page_bytes: u64,
    ) -> Self {
        Self {
            history_size: history_size.max(1),
            pattern_length: pattern_length.max(1),
            degree: degree.max(1),
            use_pc,
            page_bytes: page_bytes.max(1),
            confidence_threshold: confidence_threshold.min(100),
            block_bytes: block_bytes.max(1),
            sim_page_bytes: sim_page_bytes.max(1),
        }
    }

    /// Number of slots in the circular history buffer. Always `>= 1`.
    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Maximum length of a reverse-chronological delta chain. Always `>= 1`.
    pub fn pattern_length(&self) -> usize {
        self.pattern_length
    }

    /// Nominal number of predictions emitted per access. Always `>= 1`.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Whether PC-keyed chains are maintained at all.
    pub fn use_pc(&self) -> bool {
        self.use_pc
    }

    /// Byte size of a page for the pattern table's page correlation key.
    /// Always `>= 1`.
    pub fn page_bytes(&self) -> u64 {
        self.page_bytes
    }

    /// Baseline confidence percent threshold, always in `[0, 100]`.
    pub fn confidence_threshold(&self) -> u32 {
        self.confidence_threshold
    }

    /// Cache block size used to align incoming addresses. Always `>= 1`.
    pub fn block_bytes(&self) -> u64 {
        self.block_bytes
    }

    /// The simulator's page size. Always `>= 1`.
    pub fn sim_page_bytes(&self) -> u64 {
        self.sim_page_bytes
    }

    /// Rounds `addr` down to its enclosing cache block.
    pub fn block_address(&self, addr: u64) -> u64 {
        addr - addr % self.block_bytes
    }

    /// Tests whether `a` and `b` fall on the same page, using the
    /// simulator's page size (`sim_page_bytes`), not the pattern table's
    /// `page_bytes`.
    pub fn same_page(&self, a: u64, b: u64) -> bool {
        a / self.sim_page_bytes == b / self.sim_page_bytes
    }

    /// The pattern-table page correlation key for a block address.
    pub(crate) fn page_key(&self, block_addr: u64) -> u64 {
        block_addr / self.page_bytes
    }
}

impl Default for GhbConfig {
    /// A reasonable default matching the scenarios in the spec's test
    /// section: 256-entry history, degree 4, 4 KB pages both ways, 64-byte
    /// blocks, confidence threshold 50.
    fn default() -> Self {
        Self::new(256, 4, 4, true, 4096, 50, 64, 4096)
    }
}
