use std::fmt::Debug;
use std::hash::Hash;

/// A location in state-time space.
///
/// Time is kept as integral ticks; `TIME_RESOLUTION` converts ticks to
/// seconds for the geometric checks.
pub trait TimedState: Clone + Debug + PartialEq + Eq + Hash + Ord + 'static {
    const TIME_RESOLUTION: f64;

    fn time(&self) -> u32;

    fn with_time(&self, t: u32) -> Self;

    /// Same location, ignoring time.
    fn same_loc(&self, other: &Self) -> bool;

    fn coords(&self) -> [f64; 3];

    fn seconds(&self) -> f64 {
        self.time() as f64 / Self::TIME_RESOLUTION
    }
}
