//! Simulation time model.
//!
//! # Design
//!
//! Simulated time is a number of seconds since an arbitrary origin, held in
//! [`SimTime`].  The fluid model advances in fixed steps of `dt` seconds,
//! but controllers and demand profiles may schedule events at any instant,
//! so time is continuous rather than an integer tick.
//!
//! `SimTime` is totally ordered (`f64::total_cmp`) so it can key ordered
//! collections such as the dispatcher's event queue.  Constructors reject
//! NaN, which keeps the ordering meaningful.

use std::cmp::Ordering;
use std::fmt;

// ── SimTime ───────────────────────────────────────────────────────────────────

/// An absolute simulated time in seconds.
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    /// Time used for "never" (e.g. the next entry of an exhausted schedule).
    pub const NEVER: SimTime = SimTime(f64::INFINITY);

    /// Wrap a number of seconds.
    ///
    /// # Panics
    /// Panics if `secs` is NaN.
    #[inline]
    pub fn from_secs(secs: f64) -> Self {
        assert!(!secs.is_nan(), "SimTime cannot be NaN");
        SimTime(secs)
    }

    #[inline]
    pub fn secs(self) -> f64 {
        self.0
    }

    /// Return the time `secs` seconds after `self`.
    #[inline]
    pub fn offset(self, secs: f64) -> SimTime {
        SimTime::from_secs(self.0 + secs)
    }

    /// Seconds elapsed from `earlier` to `self` (negative if `earlier` is later).
    #[inline]
    pub fn since(self, earlier: SimTime) -> f64 {
        self.0 - earlier.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::ops::Add<f64> for SimTime {
    type Output = SimTime;
    #[inline]
    fn add(self, rhs: f64) -> SimTime {
        self.offset(rhs)
    }
}

impl std::ops::Sub for SimTime {
    type Output = f64;
    #[inline]
    fn sub(self, rhs: SimTime) -> f64 {
        self.since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:.3}s", self.0)
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Top-level run configuration.
///
/// Typically built by the application crate (or deserialized with the
/// `serde` feature) and passed to the simulation builder.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Simulated time at which the run starts, seconds.
    pub start_secs: f64,

    /// Length of the run, seconds.  The step that ends exactly at
    /// `start_secs + duration_secs` is still processed.
    pub duration_secs: f64,

    /// Master RNG seed.  The same seed always produces identical results.
    pub seed: u64,
}

impl SimConfig {
    pub fn start_time(&self) -> SimTime {
        SimTime::from_secs(self.start_secs)
    }

    /// The instant at which the run stops.
    pub fn end_time(&self) -> SimTime {
        SimTime::from_secs(self.start_secs + self.duration_secs)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_secs:    0.0,
            duration_secs: 3_600.0,
            seed:          42,
        }
    }
}
