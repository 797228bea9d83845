//! Auth event debouncing and burst detection.
//!
//! The identity provider can emit the same event several times in quick
//! succession (tab focus, multi-tab echo, provider-internal retries). The
//! debouncer suppresses same-kind repeats inside a short window, and a
//! sliding burst counter catches the pathological case where events keep
//! arriving regardless of kind.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use identity_gateway::AuthEventKind;

use crate::config::CoordinatorConfig;

/// How hot the event stream currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstLevel {
    /// Normal traffic.
    Normal,
    /// Too many events; loading flags must be force-settled so the UI
    /// cannot hang, but processing continues.
    Elevated,
    /// The stream looks like a refresh loop; automatic processing stops
    /// and recovery takes over.
    LoopDetected,
}

pub(crate) struct EventDebouncer {
    window: Duration,
    burst_interval: Duration,
    elevated_threshold: usize,
    loop_threshold: usize,
    last_passed: Option<(AuthEventKind, Instant)>,
    arrivals: VecDeque<Instant>,
}

impl EventDebouncer {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            window: config.debounce_window,
            burst_interval: config.burst_interval,
            elevated_threshold: config.burst_elevated_threshold,
            loop_threshold: config.burst_loop_threshold,
            last_passed: None,
            arrivals: VecDeque::new(),
        }
    }

    /// Records an arrival and reports whether it should be suppressed.
    ///
    /// Suppression is leading-edge: the first event of a kind passes, and
    /// same-kind repeats within the window are dropped without extending
    /// it, so a steady stream still lets one event through per window.
    /// Every arrival counts toward the burst window, suppressed or not.
    pub fn observe(&mut self, kind: AuthEventKind, now: Instant) -> bool {
        self.prune(now);
        self.arrivals.push_back(now);

        let suppress = matches!(
            self.last_passed,
            Some((last_kind, at)) if last_kind == kind && now.duration_since(at) < self.window
        );
        if !suppress {
            self.last_passed = Some((kind, now));
        }
        suppress
    }

    /// Current burst level over the sliding window ending at `now`.
    pub fn burst_level(&self, now: Instant) -> BurstLevel {
        let count = self
            .arrivals
            .iter()
            .filter(|at| now.duration_since(**at) <= self.burst_interval)
            .count();
        if count > self.loop_threshold {
            BurstLevel::LoopDetected
        } else if count > self.elevated_threshold {
            BurstLevel::Elevated
        } else {
            BurstLevel::Normal
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.arrivals.front() {
            if now.duration_since(*front) > self.burst_interval {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }
}
