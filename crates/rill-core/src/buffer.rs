//! Buffered-range tracking and stall detection
//!
//! The platform media element owns the actual bytes; this module mirrors
//! its buffered ranges, derives the forward gap at the playback position
//! and decides whether playback is stalled. The resulting health signal
//! drives both the chooser's emergency downshift and the controller's
//! BUFFERING/SEEKING states.

use crate::types::PlaybackEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Gap below which playback is considered starved while playing
const STALL_GAP_THRESHOLD: f64 = 0.5;

/// Ordered, non-overlapping, non-touching `[start, end)` intervals in
/// seconds of media time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedRanges {
    ranges: Vec<(f64, f64)>,
}

impl BufferedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an interval, merging anything it overlaps or touches.
    /// Degenerate or non-finite intervals are ignored.
    pub fn append(&mut self, start: f64, end: f64) {
        if !start.is_finite() || !end.is_finite() || start >= end {
            warn!(start, end, "Ignoring degenerate buffered range");
            return;
        }
        self.ranges.push((start, end));
        self.ranges.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
    }

    /// Remove `[start, end)`, trimming and splitting as needed
    pub fn remove(&mut self, start: f64, end: f64) {
        if !start.is_finite() || !end.is_finite() || start >= end {
            return;
        }
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        for &(s, e) in &self.ranges {
            if e <= start || s >= end {
                out.push((s, e));
                continue;
            }
            if s < start {
                out.push((s, start));
            }
            if e > end {
                out.push((end, e));
            }
        }
        self.ranges = out;
    }

    /// Distance from `position` to the end of the range containing it,
    /// or 0 outside any range
    pub fn gap(&self, position: f64) -> f64 {
        self.ranges
            .iter()
            .find(|(s, e)| *s <= position && position < *e)
            .map(|(_, e)| e - position)
            .unwrap_or(0.0)
    }

    pub fn contains(&self, position: f64) -> bool {
        self.gap(position) > 0.0
    }

    pub fn as_slice(&self) -> &[(f64, f64)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn first_start(&self) -> Option<f64> {
        self.ranges.first().map(|(s, _)| *s)
    }

    pub fn last_end(&self) -> Option<f64> {
        self.ranges.last().map(|(_, e)| *e)
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

/// Why playback is stalled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    Buffering,
    Seeking,
}

/// Derived buffer state consumed by the chooser and the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferHealth {
    /// Seconds of contiguous media ahead of the position
    pub gap: f64,
    pub stalled: bool,
    pub reason: Option<StallReason>,
    /// When the current stall began; carried unchanged while it lasts
    pub stalled_since: Option<Instant>,
}

impl Default for BufferHealth {
    fn default() -> Self {
        Self { gap: 0.0, stalled: false, reason: None, stalled_since: None }
    }
}

/// Buffer sizing policy, adjustable at any time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BufferPolicy {
    /// Seconds of media to keep ahead of the position
    pub wanted_buffer_ahead: f64,
    /// Hard ceiling on seconds buffered ahead
    pub max_buffer_ahead: f64,
    /// Seconds kept behind the position before eviction
    pub max_buffer_behind: f64,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            wanted_buffer_ahead: 30.0,
            max_buffer_ahead: f64::INFINITY,
            max_buffer_behind: f64::INFINITY,
        }
    }
}

/// Tracks buffered ranges and stall state from platform events
#[derive(Debug)]
pub struct BufferHealthMonitor {
    ranges: BufferedRanges,
    policy: BufferPolicy,
    position: f64,
    intends_to_play: bool,
    platform_waiting: bool,
    seeking: bool,
    health_tx: watch::Sender<BufferHealth>,
}

impl BufferHealthMonitor {
    pub fn new(policy: BufferPolicy) -> Self {
        let (health_tx, _) = watch::channel(BufferHealth::default());
        Self {
            ranges: BufferedRanges::new(),
            policy,
            position: 0.0,
            intends_to_play: false,
            platform_waiting: false,
            seeking: false,
            health_tx,
        }
    }

    pub fn health_watch(&self) -> watch::Receiver<BufferHealth> {
        self.health_tx.subscribe()
    }

    pub fn health(&self) -> BufferHealth {
        *self.health_tx.borrow()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn intends_to_play(&self) -> bool {
        self.intends_to_play
    }

    pub fn ranges(&self) -> &BufferedRanges {
        &self.ranges
    }

    pub fn set_policy(&mut self, policy: BufferPolicy) {
        self.policy = policy;
        self.refresh();
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    /// Fold in one platform event; health is refreshed monotonically
    /// with respect to the event order.
    pub fn handle_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Play => self.intends_to_play = true,
            PlaybackEvent::Pause => self.intends_to_play = false,
            PlaybackEvent::Seeking => {
                self.seeking = true;
                self.platform_waiting = true;
            }
            PlaybackEvent::Waiting => self.platform_waiting = true,
            PlaybackEvent::Playing => {
                self.platform_waiting = false;
                self.seeking = false;
            }
            PlaybackEvent::Ended => {
                self.intends_to_play = false;
                self.platform_waiting = false;
            }
            PlaybackEvent::TimeUpdate { position } => self.position = position,
            PlaybackEvent::RateChange { .. } => {}
        }
        self.refresh();
    }

    /// The source-buffer feeder appended `[start, end)`
    pub fn on_appended(&mut self, start: f64, end: f64) {
        self.ranges.append(start, end);
        self.refresh();
    }

    /// The source-buffer feeder removed `[start, end)`
    pub fn on_removed(&mut self, start: f64, end: f64) {
        self.ranges.remove(start, end);
        self.refresh();
    }

    /// True when the pipeline should request more media
    pub fn needs_data(&self) -> bool {
        let wanted = self.policy.wanted_buffer_ahead.min(self.policy.max_buffer_ahead);
        self.ranges.gap(self.position) < wanted
    }

    /// Intervals that exceed the retention policy and should be removed
    /// from the platform buffer
    pub fn evictable(&self) -> Vec<(f64, f64)> {
        let mut out = Vec::new();
        if self.policy.max_buffer_behind.is_finite() {
            let floor = self.position - self.policy.max_buffer_behind;
            if let Some(first) = self.ranges.first_start() {
                if first < floor {
                    out.push((first, floor));
                }
            }
        }
        if self.policy.max_buffer_ahead.is_finite() {
            let ceiling = self.position + self.policy.max_buffer_ahead;
            if let Some(last) = self.ranges.last_end() {
                if last > ceiling {
                    out.push((ceiling, last));
                }
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
        self.platform_waiting = false;
        self.seeking = false;
        self.intends_to_play = false;
        self.position = 0.0;
        self.refresh();
    }

    fn refresh(&mut self) {
        let gap = self.ranges.gap(self.position);
        let stalled =
            self.platform_waiting || (gap < STALL_GAP_THRESHOLD && self.intends_to_play);
        let previous = *self.health_tx.borrow();
        let stalled_since = if stalled {
            previous.stalled_since.or_else(|| Some(Instant::now()))
        } else {
            None
        };
        let reason = stalled.then(|| {
            if self.seeking {
                StallReason::Seeking
            } else {
                StallReason::Buffering
            }
        });
        let health = BufferHealth { gap, stalled, reason, stalled_since };
        if health != previous {
            debug!(gap, stalled, ?reason, "Buffer health changed");
            self.health_tx.send_replace(health);
        }
    }
}
