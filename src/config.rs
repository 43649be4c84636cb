//! # Engine Configuration
//!
//! Builder-style settings for sessions, reconnaissance, banner capture and
//! stress routines. Every struct has a `Default` built from the constants in
//! [`crate::constants`] and `with_*` setters.
//!
//! ```rust
//! use std::time::Duration;
//! use sploitbus::config::{ReconConfig, SessionConfig};
//!
//! let session = SessionConfig::new()
//!     .with_timeout(Duration::from_secs(2))
//!     .with_packet_logging(true);
//! assert!(session.packet_logging);
//!
//! let recon = ReconConfig::new().with_workers(30);
//! assert_eq!(recon.workers, 30);
//! ```

use std::time::Duration;

use serde::Serialize;

use crate::constants::{
    DEFAULT_BANNER_COUNT, DEFAULT_CRASH_DELAY, DEFAULT_PROBE_TIMEOUT, DEFAULT_READ_ATTEMPTS,
    DEFAULT_RETRY_PAUSE, DEFAULT_TEXT_REGISTERS, DEFAULT_TIMEOUT, DEFAULT_WORKERS,
    DEFAULT_WRITE_DELAY,
};

/// How many times a read is attempted before degrading to unknown values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts
    pub pause: Duration,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no pause
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            pause: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    #[inline]
    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_READ_ATTEMPTS,
            pause: DEFAULT_RETRY_PAUSE,
        }
    }
}

/// Settings for the primary session connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bound on connect and on each request/response exchange
    pub timeout: Duration,
    /// Read retry policy
    pub retry: RetryPolicy,
    /// Hex-dump every frame at info level
    pub packet_logging: bool,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            packet_logging: false,
        }
    }
}

/// Settings for unit-id reconnaissance and fan-out enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconConfig {
    /// Concurrent workers. Zero is treated as one.
    pub workers: usize,
    /// Bound on each probe's connect, send and receive
    pub probe_timeout: Duration,
}

impl ReconConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[inline]
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// What a banner capture reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BannerConfig {
    /// First address read in every data space
    pub start: u16,
    /// Points read per data space
    pub count: u16,
    /// Holding registers (from address 0) decoded as text
    pub text_registers: u16,
}

impl BannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, start: u16) -> Self {
        self.start = start;
        self
    }

    pub fn with_count(mut self, count: u16) -> Self {
        self.count = count;
        self
    }

    pub fn with_text_registers(mut self, count: u16) -> Self {
        self.text_registers = count;
        self
    }
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            start: 0,
            count: DEFAULT_BANNER_COUNT,
            text_registers: DEFAULT_TEXT_REGISTERS,
        }
    }
}

/// Which unit id crash-system writes are addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CrashUnitPolicy {
    /// Every write goes to the session's current unit
    #[default]
    Current,
    /// Every write picks a uniformly random unit id in 1..=254
    RandomPerWrite,
}

/// Pacing and targeting for stress routines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    /// Delay after each write of randomize, text edit, hex modify and chaos
    pub write_delay: Duration,
    /// Delay after each crash-system write
    pub crash_delay: Duration,
    /// Unit targeting for crash-system
    pub crash_unit_policy: CrashUnitPolicy,
    /// Fixed seed for the value generator; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl StressConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No pacing at all
    pub fn unpaced() -> Self {
        Self {
            write_delay: Duration::ZERO,
            crash_delay: Duration::ZERO,
            crash_unit_policy: CrashUnitPolicy::Current,
            seed: None,
        }
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Crash pacing in seconds, as operators usually give it
    pub fn with_crash_speed(mut self, seconds: f64) -> Self {
        self.crash_delay = Duration::try_from_secs_f64(seconds).unwrap_or(DEFAULT_CRASH_DELAY);
        self
    }

    pub fn with_crash_delay(mut self, delay: Duration) -> Self {
        self.crash_delay = delay;
        self
    }

    pub fn with_crash_unit_policy(mut self, policy: CrashUnitPolicy) -> Self {
        self.crash_unit_policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            write_delay: DEFAULT_WRITE_DELAY,
            crash_delay: DEFAULT_CRASH_DELAY,
            crash_unit_policy: CrashUnitPolicy::Current,
            seed: None,
        }
    }
}
