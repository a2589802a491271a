// file: src/models/sync.rs
use serde::{Deserialize, Serialize};

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub assignments_processed: usize,
    pub created: usize,
    pub updated: usize,
    pub cancelled: usize,
}

impl SyncStats {
    /// True when the pass changed nothing.
    pub fn is_quiet(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.cancelled == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_stats_default_is_quiet() {
        let stats = SyncStats::default();
        assert!(stats.is_quiet());
        assert_eq!(stats.assignments_processed, 0);
    }

    #[test]
    fn test_sync_stats_processed_alone_is_quiet() {
        let stats = SyncStats {
            assignments_processed: 4,
            ..SyncStats::default()
        };
        assert!(stats.is_quiet());

        let stats = SyncStats {
            cancelled: 1,
            ..stats
        };
        assert!(!stats.is_quiet());
    }
}
