//! Recovery configuration

/// Clusters examined after a file's first cluster when rebuilding a fragmented chain.
///
/// This bounds the permutation search; raising it grows the worst case factorially.
pub const DEFAULT_LOOKAHEAD_CLUSTERS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub lookahead_clusters: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            lookahead_clusters: DEFAULT_LOOKAHEAD_CLUSTERS,
        }
    }
}

impl RecoveryConfig {
    #[cfg(test)]
    pub fn with_lookahead(mut self, clusters: usize) -> Self {
        self.lookahead_clusters = clusters;
        self
    }

    /// Largest candidate pool: the first cluster plus the lookahead window
    pub fn max_pool_size(&self) -> usize {
        self.lookahead_clusters + 1
    }
}
