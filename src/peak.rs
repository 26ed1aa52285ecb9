//! Lock-free "maximum since last reset" tracking.
//!
//! [`PeakTracker`] records the high-water mark of a value that is sampled far
//! more often than it is reported. Updates use a bounded compare-and-swap
//! loop; losing the race too many times yields [`UpdateTimedOut`], which
//! callers are free to ignore.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

/// Number of compare-and-swap attempts made before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

/// An atomic update lost the compare-and-swap race too many times.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("timed out updating atomic value after {attempts} attempts")]
pub struct UpdateTimedOut {
    /// Number of failed compare-and-swap attempts.
    pub attempts: usize,
}

/// Atomic cell that [`update`] can raise with compare-and-swap.
pub trait AtomicValue {
    /// Plain value stored in the cell.
    type Value: Copy + PartialOrd;

    /// Read the current value.
    fn load_value(&self) -> Self::Value;

    /// Store `new` if the cell still holds `current`.
    ///
    /// # Errors
    ///
    /// Returns the value actually found when it differs from `current`.
    fn compare_exchange_value(
        &self,
        current: Self::Value,
        new: Self::Value,
    ) -> Result<Self::Value, Self::Value>;
}

macro_rules! impl_atomic_value {
    ($($atomic:ty => $value:ty),* $(,)?) => {$(
        impl AtomicValue for $atomic {
            type Value = $value;

            fn load_value(&self) -> $value { self.load(Ordering::Acquire) }

            fn compare_exchange_value(&self, current: $value, new: $value) -> Result<$value, $value> {
                self.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            }
        }
    )*};
}

impl_atomic_value!(
    AtomicU32 => u32,
    AtomicU64 => u64,
    AtomicUsize => usize,
    AtomicI32 => i32,
    AtomicI64 => i64,
);

/// An `f64` stored as its bit pattern, for float gauges.
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Cell holding `value`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Read the current value.
    #[must_use]
    pub fn load(&self) -> f64 { f64::from_bits(self.bits.load(Ordering::Acquire)) }
}

impl AtomicValue for AtomicF64 {
    type Value = f64;

    fn load_value(&self) -> f64 { self.load() }

    fn compare_exchange_value(&self, current: f64, new: f64) -> Result<f64, f64> {
        self.bits
            .compare_exchange(
                current.to_bits(),
                new.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(f64::from_bits)
            .map_err(f64::from_bits)
    }
}

/// Apply `f` to `cell`, keeping the result only when it grows the value.
///
/// The current value is read and passed to `f`. When the candidate is not
/// greater than the current value the call returns without writing. Otherwise
/// a compare-and-swap installs the candidate; a lost race re-reads the cell
/// and tries again, at most `max_attempts` times.
///
/// Returns the value held by the cell once the call settles.
///
/// # Errors
///
/// Returns [`UpdateTimedOut`] when every one of the `max_attempts`
/// compare-and-swap attempts lost against a concurrent writer.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::AtomicU64;
///
/// use metered_listener::peak::{DEFAULT_MAX_ATTEMPTS, update};
///
/// let cell = AtomicU64::new(3);
/// assert_eq!(update(&cell, DEFAULT_MAX_ATTEMPTS, |cur| cur.max(7)), Ok(7));
/// assert_eq!(update(&cell, DEFAULT_MAX_ATTEMPTS, |cur| cur.max(5)), Ok(7));
/// ```
pub fn update<A, F>(cell: &A, max_attempts: usize, f: F) -> Result<A::Value, UpdateTimedOut>
where
    A: AtomicValue + ?Sized,
    F: Fn(A::Value) -> A::Value,
{
    let mut current = cell.load_value();
    for _ in 0..max_attempts {
        let candidate = f(current);
        if candidate <= current {
            return Ok(current);
        }
        match cell.compare_exchange_value(current, candidate) {
            Ok(_) => return Ok(candidate),
            Err(observed) => current = observed,
        }
    }
    // The last lost race may already have left a large enough value behind.
    if f(current) <= current {
        return Ok(current);
    }
    Err(UpdateTimedOut {
        attempts: max_attempts,
    })
}

/// Highest value observed since the last [`PeakTracker::take`].
#[derive(Debug)]
pub struct PeakTracker {
    value: AtomicU64,
    max_attempts: usize,
}

impl Default for PeakTracker {
    fn default() -> Self { Self::new(DEFAULT_MAX_ATTEMPTS) }
}

impl PeakTracker {
    /// Create a tracker starting at zero that retries lost races up to
    /// `max_attempts` times.
    #[must_use]
    pub fn new(max_attempts: usize) -> Self {
        Self {
            value: AtomicU64::new(0),
            max_attempts,
        }
    }

    /// Raise the peak to `value` if it exceeds the current peak.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateTimedOut`] when concurrent writers kept winning the
    /// race. The peak is best effort, so callers usually ignore this.
    pub fn observe(&self, value: u64) -> Result<u64, UpdateTimedOut> {
        update(&self.value, self.max_attempts, |current| current.max(value))
    }

    /// Current peak without resetting it.
    #[must_use]
    pub fn get(&self) -> u64 { self.value.load(Ordering::Acquire) }

    /// Return the peak and reset it to zero.
    pub fn take(&self) -> u64 { self.value.swap(0, Ordering::AcqRel) }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering},
        },
        thread,
    };

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 5, 5)]
    #[case(5, 3, 5)]
    #[case(5, 5, 5)]
    #[case(9, 10, 10)]
    fn observe_keeps_the_maximum(#[case] start: u64, #[case] seen: u64, #[case] expected: u64) {
        let tracker = PeakTracker::default();
        tracker.observe(start).expect("first observation");
        assert_eq!(tracker.observe(seen), Ok(expected));
        assert_eq!(tracker.get(), expected);
    }

    #[test]
    fn take_resets_to_zero() {
        let tracker = PeakTracker::default();
        tracker.observe(12).expect("observation");
        assert_eq!(tracker.take(), 12);
        assert_eq!(tracker.take(), 0);
        assert_eq!(tracker.get(), 0);
    }

    #[test]
    fn no_swap_when_candidate_is_not_larger() {
        let cell = AtomicU64::new(8);
        let calls = AtomicUsize::new(0);
        let result = update(&cell, 1, |current| {
            calls.fetch_add(1, Ordering::SeqCst);
            current
        });
        assert_eq!(result, Ok(8));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        // Every evaluation moves the cell under our feet, so each
        // compare-and-swap loses.
        let cell = AtomicU64::new(0);
        let result = update(&cell, 3, |current| {
            cell.fetch_add(1, Ordering::SeqCst);
            current + 100
        });
        assert_eq!(result, Err(UpdateTimedOut { attempts: 3 }));
    }

    #[test]
    fn zero_attempts_only_succeeds_without_a_write() {
        let cell = AtomicU64::new(4);
        assert_eq!(update(&cell, 0, |current| current.max(2)), Ok(4));
        assert_eq!(
            update(&cell, 0, |current| current.max(6)),
            Err(UpdateTimedOut { attempts: 0 })
        );
    }

    #[test]
    fn signed_cells_can_be_raised() {
        let cell = AtomicI64::new(-5);
        assert_eq!(update(&cell, 1, |current| current.max(-2)), Ok(-2));
        let cell = AtomicUsize::new(1);
        assert_eq!(update(&cell, 1, |current| current + 1), Ok(2));
    }

    #[test]
    fn float_gauge_keeps_the_maximum() {
        let gauge = AtomicF64::new(1.5);
        assert_eq!(update(&gauge, 1, |current| current.max(2.25)), Ok(2.25));
        assert_eq!(update(&gauge, 1, |current| current.max(0.5)), Ok(2.25));
        assert!((gauge.load() - 2.25).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_observers_agree_on_the_maximum() {
        let tracker = Arc::new(PeakTracker::new(10_000));
        let handles: Vec<_> = (1..=8_u64)
            .map(|n| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for v in 0..=(n * 100) {
                        let _ = tracker.observe(v);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("observer thread panicked");
        }
        assert_eq!(tracker.get(), 800);
    }
}
