//! Outstanding-request tracking with stall detection.
//!
//! A [`StageTracker`] holds the requests of one stage that have not yet
//! completed. It does not send anything itself: [`StageTracker::poll`] tells
//! the owner whether the stage is drained, still progressing, stalled (and
//! should be re-sent) or, when a cycle bound is configured, given up.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::warn;

/// Result of [`StageTracker::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus<K, V> {
    /// Nothing outstanding.
    Drained,
    /// Requests outstanding, ceiling not reached or progress observed.
    Waiting,
    /// The ceiling passed without progress. The owner re-sends every entry
    /// once; the timer has been restarted.
    Reissue(Vec<(K, V)>),
    /// The reissue bound was exceeded. Entries have been removed.
    Abandoned(Vec<(K, V)>),
}

#[derive(Debug, Clone)]
pub struct StageTracker<K, V> {
    stage: &'static str,
    outstanding: BTreeMap<K, V>,
    ceiling: Duration,
    max_cycles: Option<u32>,
    cycles: u32,
    last_count: usize,
    last_progress: Option<Instant>,
    /// A completion arrived since the last poll.
    progressed: bool,
}

impl<K: Ord + Clone, V: Clone> StageTracker<K, V> {
    pub fn new(stage: &'static str, ceiling: Duration, max_cycles: Option<u32>) -> Self {
        Self {
            stage,
            outstanding: BTreeMap::new(),
            ceiling,
            max_cycles,
            cycles: 0,
            last_count: 0,
            last_progress: None,
            progressed: false,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Records an outstanding request. Returns false if `key` was already
    /// outstanding, in which case the metadata is left alone.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.outstanding.contains_key(&key) {
            return false;
        }
        self.outstanding.insert(key, value);
        true
    }

    /// Marks `key` complete, returning its metadata if it was outstanding.
    pub fn complete(&mut self, key: &K) -> Option<V> {
        let value = self.outstanding.remove(key);
        self.progressed |= value.is_some();
        value
    }

    pub fn contains(&self, key: &K) -> bool {
        self.outstanding.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Number of reissues since the last observed progress.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Starts the stall timer afresh, e.g. when the stage becomes current.
    pub fn restart(&mut self, now: Instant) {
        self.last_progress = Some(now);
        self.last_count = self.outstanding.len();
        self.cycles = 0;
        self.progressed = false;
    }

    pub fn poll(&mut self, now: Instant) -> StageStatus<K, V> {
        if self.outstanding.is_empty() {
            return StageStatus::Drained;
        }

        let Some(last_progress) = self.last_progress else {
            self.restart(now);
            return StageStatus::Waiting;
        };

        if self.progressed || self.outstanding.len() != self.last_count {
            self.restart(now);
            return StageStatus::Waiting;
        }

        if now.saturating_duration_since(last_progress) < self.ceiling {
            return StageStatus::Waiting;
        }

        self.cycles += 1;
        if self.max_cycles.is_some_and(|max| self.cycles > max) {
            warn!(
                stage = self.stage,
                outstanding = self.outstanding.len(),
                cycles = self.cycles - 1,
                "giving up on stalled requests"
            );
            let abandoned = std::mem::take(&mut self.outstanding).into_iter().collect();
            self.last_count = 0;
            self.cycles = 0;
            return StageStatus::Abandoned(abandoned);
        }

        warn!(
            stage = self.stage,
            outstanding = self.outstanding.len(),
            cycle = self.cycles,
            "no progress within {:?}, reissuing",
            self.ceiling
        );
        self.last_progress = Some(now);
        StageStatus::Reissue(
            self.outstanding
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CEILING: Duration = Duration::from_secs(30);

    fn tracker(max_cycles: Option<u32>) -> (StageTracker<u32, &'static str>, Instant) {
        let start = Instant::now();
        let mut tracker = StageTracker::new("test", CEILING, max_cycles);
        tracker.insert(1, "one");
        tracker.insert(2, "two");
        tracker.restart(start);
        (tracker, start)
    }

    #[test]
    fn test_drained_when_empty() {
        let mut tracker: StageTracker<u32, ()> = StageTracker::new("empty", CEILING, None);
        assert_eq!(tracker.poll(Instant::now()), StageStatus::Drained);
    }

    #[test]
    fn test_insert_is_deduplicated() {
        let (mut tracker, _) = tracker(None);
        assert!(!tracker.insert(1, "again"));
        assert_eq!(tracker.complete(&1), Some("one"));
        assert_eq!(tracker.complete(&1), None);
    }

    #[test]
    fn test_reissue_after_ceiling_without_progress() {
        let (mut tracker, start) = tracker(None);
        assert_eq!(tracker.poll(start + Duration::from_secs(29)), StageStatus::Waiting);

        let status = tracker.poll(start + CEILING);
        assert_eq!(status, StageStatus::Reissue(vec![(1, "one"), (2, "two")]));
        // timer restarted
        assert_eq!(tracker.poll(start + CEILING + Duration::from_secs(1)), StageStatus::Waiting);
        assert!(matches!(tracker.poll(start + CEILING * 2), StageStatus::Reissue(_)));
        assert_eq!(tracker.cycles(), 2);
    }

    #[test]
    fn test_progress_resets_timer() {
        let (mut tracker, start) = tracker(None);
        tracker.complete(&2);
        assert_eq!(tracker.poll(start + CEILING), StageStatus::Waiting);
        assert_eq!(tracker.poll(start + CEILING + Duration::from_secs(29)), StageStatus::Waiting);
        assert!(matches!(tracker.poll(start + CEILING * 2), StageStatus::Reissue(entries) if entries.len() == 1));
    }

    #[test]
    fn test_completion_resets_timer_when_count_is_unchanged() {
        let (mut tracker, start) = tracker(None);
        tracker.complete(&1);
        tracker.insert(3, "three");
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.poll(start + CEILING), StageStatus::Waiting);
        assert_eq!(tracker.poll(start + CEILING * 2 - Duration::from_secs(1)), StageStatus::Waiting);
        assert_eq!(
            tracker.poll(start + CEILING * 2),
            StageStatus::Reissue(vec![(2, "two"), (3, "three")])
        );

        // completing an unknown key is not progress
        tracker.complete(&9);
        assert!(matches!(tracker.poll(start + CEILING * 3), StageStatus::Reissue(_)));
    }

    #[test]
    fn test_unbounded_never_abandons() {
        let (mut tracker, start) = tracker(None);
        for cycle in 1..=50u32 {
            assert!(matches!(tracker.poll(start + CEILING * cycle), StageStatus::Reissue(_)));
        }
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_bounded_abandons() {
        let (mut tracker, start) = tracker(Some(1));
        assert!(matches!(tracker.poll(start + CEILING), StageStatus::Reissue(_)));
        let status = tracker.poll(start + CEILING * 2);
        assert_eq!(status, StageStatus::Abandoned(vec![(1, "one"), (2, "two")]));
        assert!(tracker.is_empty());
        assert_eq!(tracker.poll(start + CEILING * 3), StageStatus::Drained);
    }
}
