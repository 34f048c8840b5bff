//! Coordinator configuration
//!
//! Configuration sections with sensible defaults for every deployment knob the
//! coordinator exposes. Construct with `CoordinatorConfig::default()` and
//! override the fields that matter for the deployment.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration for the call-session coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// General server settings
    pub general: GeneralConfig,
    /// Timer settings for deferred and periodic work
    pub timers: TimerConfig,
    /// Event fan-out settings
    pub events: EventConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            timers: TimerConfig::default(),
            events: EventConfig::default(),
        }
    }
}

/// General server settings
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    /// Address the WebSocket endpoint binds to
    pub bind_addr: SocketAddr,
    /// Soft cap on concurrently tracked sessions, used for logging only
    pub max_sessions: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("valid default bind addr"),
            max_sessions: 10_000,
        }
    }
}

/// Timer settings for deferred and periodic work
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Delay between a dial and the automatic transition to ringing
    pub ringing_delay: Duration,
    /// Interval between stale-session sweeps
    pub reaper_interval: Duration,
    /// Maximum lifetime of a session before the reaper removes it
    pub max_session_age: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            ringing_delay: Duration::from_secs(2),
            reaper_interval: Duration::from_secs(60),
            max_session_age: Duration::from_secs(4 * 3600),
        }
    }
}

impl TimerConfig {
    /// Override the dial-to-ringing delay
    pub fn with_ringing_delay(mut self, delay: Duration) -> Self {
        self.ringing_delay = delay;
        self
    }

    /// Override the reaper sweep interval
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Override the maximum session lifetime
    pub fn with_max_session_age(mut self, max_age: Duration) -> Self {
        self.max_session_age = max_age;
        self
    }
}

/// Event fan-out settings
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Per-room broadcast channel capacity; slow subscribers past this lag drop events
    pub room_capacity: usize,
    /// Per-connection outbound queue depth
    pub outbound_queue_depth: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            room_capacity: 256,
            outbound_queue_depth: 100,
        }
    }
}
