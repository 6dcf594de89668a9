//! User-facing timeout policy
//!
//! The three settings the core persists:
//! - Kept-on duration (the timeout applied while holding the screen on)
//! - Restore when battery is low
//! - Restore when the screen turns off

use serde::{Deserialize, Serialize};

/// Sentinel the OS stores for "never time out". Compared exactly, never as a
/// numeric range.
pub const ALWAYS_ON_MS: i32 = i32::MAX;

// ============================================================================
// KEPT-ON DURATION
// ============================================================================

/// The timeout value applied while activation is in effect.
///
/// The set is closed: these six options are the only values the store
/// accepts, and "always on" is its own variant rather than a large number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeptOnDuration {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    TenMinutes,
    ThirtyMinutes,
    /// Screen never times out while active
    AlwaysOn,
}

impl KeptOnDuration {
    /// All selectable options, in menu order
    pub const ALL: [KeptOnDuration; 6] = [
        KeptOnDuration::OneMinute,
        KeptOnDuration::TwoMinutes,
        KeptOnDuration::FiveMinutes,
        KeptOnDuration::TenMinutes,
        KeptOnDuration::ThirtyMinutes,
        KeptOnDuration::AlwaysOn,
    ];

    /// The millisecond value written to the OS timeout setting
    pub fn as_millis(self) -> i32 {
        match self {
            Self::OneMinute => 60_000,
            Self::TwoMinutes => 120_000,
            Self::FiveMinutes => 300_000,
            Self::TenMinutes => 600_000,
            Self::ThirtyMinutes => 1_800_000,
            Self::AlwaysOn => ALWAYS_ON_MS,
        }
    }

    /// Exact-match parse of a stored millisecond value.
    ///
    /// Returns `None` for anything outside the enumerated set, including
    /// values numerically close to the always-on sentinel.
    pub fn from_millis(ms: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_millis() == ms)
    }
}

impl std::fmt::Display for KeptOnDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneMinute => write!(f, "1 minute"),
            Self::TwoMinutes => write!(f, "2 minutes"),
            Self::FiveMinutes => write!(f, "5 minutes"),
            Self::TenMinutes => write!(f, "10 minutes"),
            Self::ThirtyMinutes => write!(f, "30 minutes"),
            Self::AlwaysOn => write!(f, "Always on"),
        }
    }
}

impl Default for KeptOnDuration {
    fn default() -> Self {
        Self::ThirtyMinutes
    }
}

// ============================================================================
// TIMEOUT POLICY
// ============================================================================

/// The persisted user policy consulted on every restore decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    /// Timeout applied while active
    pub kept_on: KeptOnDuration,

    /// Restore the saved timeout when the OS reports low battery
    pub restore_on_battery_low: bool,

    /// Restore the saved timeout when the screen turns off
    pub restore_on_screen_off: bool,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            kept_on: KeptOnDuration::default(),
            restore_on_battery_low: false,
            restore_on_screen_off: false,
        }
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Render an OS timeout value the way a settings row would show it.
///
/// Bands: seconds below one minute, minutes below one hour, hours below one
/// day, days beyond that. The always-on sentinel has its own label.
pub fn format_timeout(ms: i32) -> String {
    fn unit(n: i32, singular: &str) -> String {
        if n == 1 {
            format!("{} {}", n, singular)
        } else {
            format!("{} {}s", n, singular)
        }
    }

    if ms == ALWAYS_ON_MS {
        "Always on".to_string()
    } else if ms < 60_000 {
        unit(ms / 1_000, "second")
    } else if ms < 3_600_000 {
        unit(ms / 60_000, "minute")
    } else if ms < 86_400_000 {
        unit(ms / 3_600_000, "hour")
    } else {
        unit(ms / 86_400_000, "day")
    }
}

// ============================================================================
// TESTS
// ============================================================================
