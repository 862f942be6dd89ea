//! Adaptive block-range segmentation
//!
//! The planner walks `[cursor, latest]` in windows small enough for every
//! query to stay under the provider's record cap:
//! - A cap hit halves the window and retries the same cursor
//! - A run of cap-free segments grows the window again
//! - A single block that still hits the cap is reported as unsplittable

use crate::config::CrawlConfig;

/// Window sizing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub default_window: u64,
    pub min_window: u64,
    pub max_window: u64,
    /// Consecutive cap-free segments before growing
    pub grow_after: u32,
    pub grow_factor: f64,
}

impl From<&CrawlConfig> for PlannerSettings {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            default_window: config.default_window,
            min_window: config.min_window,
            max_window: config.max_window,
            grow_after: config.grow_after,
            grow_factor: config.grow_factor,
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::from(&CrawlConfig::default())
    }
}

/// An inclusive block range being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub from: u64,
    pub to: u64,
    /// 1 for the first try at this cursor, incremented after every cap hit
    pub attempt: u32,
}

impl Segment {
    /// Number of blocks in the segment
    pub fn window(&self) -> u64 {
        self.to - self.from + 1
    }
}

/// What the runner should do after a cap hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapResponse {
    /// Retry the same cursor with the smaller window
    Retry { window: u64 },
    /// The segment is already at the minimum window and cannot be split
    Unsplittable,
}

/// Decides the next block range to fetch
#[derive(Debug, Clone)]
pub struct SegmentPlanner {
    settings: PlannerSettings,
    cursor: u64,
    latest: u64,
    window: u64,
    clean_streak: u32,
    attempt: u32,
}

impl SegmentPlanner {
    /// Creates a planner starting at `cursor`
    ///
    /// `window` carries the last known window across a resume; `None` starts
    /// from the configured default.
    pub fn new(settings: PlannerSettings, cursor: u64, latest: u64, window: Option<u64>) -> Self {
        let window = window
            .unwrap_or(settings.default_window)
            .clamp(settings.min_window.max(1), settings.max_window.max(1));

        Self {
            settings,
            cursor,
            latest,
            window,
            clean_streak: 0,
            attempt: 0,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }

    pub fn is_done(&self) -> bool {
        self.cursor > self.latest
    }

    /// The next segment, or `None` once the cursor has passed the latest block
    pub fn next_segment(&self) -> Option<Segment> {
        if self.is_done() {
            return None;
        }
        let to = self
            .cursor
            .saturating_add(self.window - 1)
            .min(self.latest);

        Some(Segment {
            from: self.cursor,
            to,
            attempt: self.attempt + 1,
        })
    }

    /// Shrinks the window after `segment` hit the record cap
    pub fn on_cap_hit(&mut self, segment: &Segment) -> CapResponse {
        self.clean_streak = 0;
        let min = self.settings.min_window.max(1);
        if segment.window() <= min {
            return CapResponse::Unsplittable;
        }

        // Halve what was actually fetched, which is smaller than the window
        // when the segment was cut off at the latest block
        let window = (self.window.min(segment.window()) / 2).max(min);
        self.window = window;
        self.attempt += 1;
        CapResponse::Retry { window }
    }

    /// Advances past a cap-free segment, growing the window after a streak
    ///
    /// Returns the new window when it grew.
    pub fn on_segment_complete(&mut self, segment: &Segment) -> Option<u64> {
        self.advance_past(segment);
        self.clean_streak += 1;

        if self.clean_streak < self.settings.grow_after.max(1) {
            return None;
        }
        self.clean_streak = 0;

        let grown = ((self.window as f64) * self.settings.grow_factor).ceil() as u64;
        let grown = grown.max(self.window + 1).min(self.settings.max_window);
        if grown > self.window {
            self.window = grown;
            Some(grown)
        } else {
            None
        }
    }

    /// Advances past an unsplittable segment without counting it as clean
    pub fn on_segment_forced(&mut self, segment: &Segment) {
        self.advance_past(segment);
        self.clean_streak = 0;
    }

    fn advance_past(&mut self, segment: &Segment) {
        self.cursor = segment.to.saturating_add(1);
        self.attempt = 0;
        // Saturation at u64::MAX still has to terminate
        if segment.to == u64::MAX {
            self.latest = u64::MAX - 1;
        }
    }
}
