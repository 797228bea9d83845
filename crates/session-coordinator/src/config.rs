//! Coordinator tuning knobs.

use std::time::Duration;

/// Timing and retry configuration for the session coordinator.
///
/// Defaults are the production values; tests shrink them to keep runs fast.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Window within which a repeated auth event of the same kind is
    /// suppressed as a duplicate.
    pub debounce_window: Duration,
    /// Sliding window over which burst counting runs.
    pub burst_interval: Duration,
    /// Events within `burst_interval` above which loading flags are
    /// force-settled so the UI cannot hang on a chatty provider.
    pub burst_elevated_threshold: usize,
    /// Events within `burst_interval` above which the stream is treated as
    /// a refresh loop and automatic processing stops.
    pub burst_loop_threshold: usize,
    /// Upper bound for the initial session retrieval call.
    pub session_check_deadline: Duration,
    /// Upper bound for a profile lookup during resolution.
    pub profile_deadline: Duration,
    /// Upper bound for a token refresh call.
    pub refresh_deadline: Duration,
    /// Minimum spacing between refresh attempts.
    pub refresh_cooldown: Duration,
    /// Consecutive refresh failures tolerated before the session is
    /// invalidated.
    pub max_refresh_attempts: u32,
    /// Hard bound on the whole initial check; past it the coordinator
    /// settles whatever state it has.
    pub initial_check_timeout: Duration,
    /// Hard bound on any later loading period.
    pub loading_hard_timeout: Duration,
    /// How often the watchdog samples the loading flags.
    pub watchdog_poll_interval: Duration,
    /// How often stored-token expiry is checked.
    pub expiry_poll_interval: Duration,
    /// Refresh ahead of expiry by this much.
    pub refresh_ahead_margin: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(500),
            burst_interval: Duration::from_secs(10),
            burst_elevated_threshold: 5,
            burst_loop_threshold: 10,
            session_check_deadline: Duration::from_secs(5),
            profile_deadline: Duration::from_secs(3),
            refresh_deadline: Duration::from_secs(3),
            refresh_cooldown: Duration::from_secs(2),
            max_refresh_attempts: 2,
            initial_check_timeout: Duration::from_secs(10),
            loading_hard_timeout: Duration::from_secs(12),
            watchdog_poll_interval: Duration::from_secs(1),
            expiry_poll_interval: Duration::from_secs(60),
            refresh_ahead_margin: Duration::from_secs(300),
        }
    }
}
