use serde::Serialize;

/// Coverage proof for one crawl job
///
/// `next_block` is the first block not yet proven fetched, so the covered
/// range is always `[start_block, next_block - 1]`. It only moves forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageState {
    start_block: u64,
    next_block: u64,
    latest_block: Option<u64>,
}

/// Read-only view of coverage for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageSnapshot {
    pub start_block: u64,
    /// Highest block fully fetched; `None` means nothing is covered yet
    pub coverage_end: Option<u64>,
    pub latest_block: Option<u64>,
    pub total_unique: usize,
    pub covered: bool,
}

impl CoverageState {
    pub fn new(start_block: u64) -> Self {
        Self {
            start_block,
            next_block: start_block,
            latest_block: None,
        }
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    /// First block that still needs fetching
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// Highest block proven fetched, `None` while nothing is covered
    pub fn coverage_end(&self) -> Option<u64> {
        if self.next_block > self.start_block {
            Some(self.next_block - 1)
        } else {
            None
        }
    }

    pub fn latest_block(&self) -> Option<u64> {
        self.latest_block
    }

    /// Freezes the crawl target; later calls keep the first value
    pub fn set_latest_block(&mut self, latest_block: u64) -> u64 {
        *self.latest_block.get_or_insert(latest_block)
    }

    /// Marks every block up to and including `block` as covered
    ///
    /// Returns false (and changes nothing) if that would move coverage back.
    pub fn advance_to(&mut self, block: u64) -> bool {
        let next = block.saturating_add(1);
        if next <= self.next_block {
            return false;
        }
        self.next_block = next;
        true
    }

    /// True once coverage reaches the frozen latest block
    pub fn is_covered(&self) -> bool {
        match self.latest_block {
            Some(latest) => self.next_block > latest,
            None => false,
        }
    }

    pub fn snapshot(&self, total_unique: usize) -> CoverageSnapshot {
        CoverageSnapshot {
            start_block: self.start_block,
            coverage_end: self.coverage_end(),
            latest_block: self.latest_block,
            total_unique,
            covered: self.is_covered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_covers_nothing() {
        let state = CoverageState::new(100);
        assert_eq!(state.coverage_end(), None);
        assert_eq!(state.next_block(), 100);
        assert!(!state.is_covered());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut state = CoverageState::new(100);
        assert!(state.advance_to(150));
        assert_eq!(state.coverage_end(), Some(150));

        assert!(!state.advance_to(120));
        assert!(!state.advance_to(150));
        assert_eq!(state.coverage_end(), Some(150));

        assert!(state.advance_to(151));
        assert_eq!(state.next_block(), 152);
    }

    #[test]
    fn test_advance_below_start_is_ignored() {
        let mut state = CoverageState::new(100);
        assert!(!state.advance_to(50));
        assert_eq!(state.coverage_end(), None);
    }

    #[test]
    fn test_latest_block_is_frozen() {
        let mut state = CoverageState::new(0);
        assert_eq!(state.set_latest_block(500), 500);
        assert_eq!(state.set_latest_block(900), 500);
        assert_eq!(state.latest_block(), Some(500));
    }

    #[test]
    fn test_covered_at_latest_block() {
        let mut state = CoverageState::new(10);
        state.set_latest_block(20);
        state.advance_to(19);
        assert!(!state.is_covered());
        state.advance_to(20);
        assert!(state.is_covered());

        let snapshot = state.snapshot(7);
        assert_eq!(snapshot.coverage_end, Some(20));
        assert_eq!(snapshot.total_unique, 7);
        assert!(snapshot.covered);
    }

    #[test]
    fn test_start_beyond_latest_is_covered() {
        let mut state = CoverageState::new(50);
        state.set_latest_block(40);
        assert!(state.is_covered());
    }
}
