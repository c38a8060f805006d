use super::collision::{collision_check_3d, segments_intersect};
use super::TimedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// The transition is forbidden.
    Negative,
    /// The transition is required.
    Positive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind<S> {
    /// Exactly this departure state towards this location.
    Identical,
    /// Swept bounding box of the transition during its time window.
    BoundingBox,
    /// This move, departing any time inside `[start.t, end.t]`.
    TimeRange,
    Collision { radius: f64 },
    Overlap,
    /// Collision test applied only to transitions departing at `pivot`.
    Pyramid { pivot: u32, radius: f64 },
    XorIdentical { pos_start: S, pos_end: S },
    XorCollision { pos_start: S, pos_end: S, radius: f64 },
}

/// A forbidden (or required) transition, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint<S> {
    pub start: S,
    pub end: S,
    pub polarity: Polarity,
    pub kind: ConstraintKind<S>,
}

impl<S: TimedState> Constraint<S> {
    fn new(start: S, end: S, kind: ConstraintKind<S>) -> Self {
        debug_assert!(end.time() >= start.time(), "constraint ends before it starts");
        Constraint {
            start,
            end,
            polarity: Polarity::Negative,
            kind,
        }
    }

    pub fn identical(start: S, end: S) -> Self {
        Self::new(start, end, ConstraintKind::Identical)
    }

    pub fn bounding_box(start: S, end: S) -> Self {
        Self::new(start, end, ConstraintKind::BoundingBox)
    }

    pub fn time_range(start: S, end: S) -> Self {
        Self::new(start, end, ConstraintKind::TimeRange)
    }

    pub fn collision(start: S, end: S, radius: f64) -> Self {
        Self::new(start, end, ConstraintKind::Collision { radius })
    }

    pub fn overlap(start: S, end: S) -> Self {
        Self::new(start, end, ConstraintKind::Overlap)
    }

    pub fn pyramid(start: S, end: S, pivot: u32, radius: f64) -> Self {
        Self::new(start, end, ConstraintKind::Pyramid { pivot, radius })
    }

    pub fn xor_identical(start: S, end: S, pos_start: S, pos_end: S) -> Self {
        Self::new(start, end, ConstraintKind::XorIdentical { pos_start, pos_end })
    }

    pub fn xor_collision(start: S, end: S, pos_start: S, pos_end: S, radius: f64) -> Self {
        Self::new(
            start,
            end,
            ConstraintKind::XorCollision {
                pos_start,
                pos_end,
                radius,
            },
        )
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Time (seconds) at which `from -> to` violates this constraint, if it does.
    pub fn conflicts_with(&self, from: &S, to: &S) -> Option<f64> {
        match &self.kind {
            ConstraintKind::Identical | ConstraintKind::XorIdentical { .. } => {
                (*from == self.start && to.same_loc(&self.end)).then(|| from.seconds())
            }
            ConstraintKind::BoundingBox => self.box_conflict(from, to),
            ConstraintKind::TimeRange => (from.same_loc(&self.start)
                && to.same_loc(&self.end)
                && from.time() >= self.start.time()
                && from.time() <= self.end.time())
            .then(|| from.seconds()),
            ConstraintKind::Collision { radius } | ConstraintKind::XorCollision { radius, .. } => {
                collision_check_3d(from, to, &self.start, &self.end, *radius)
            }
            ConstraintKind::Overlap => {
                if !self.overlaps_in_time(from, to) {
                    return None;
                }
                let (p1, p2) = (planar(&self.start), planar(&self.end));
                segments_intersect(p1, p2, planar(from), planar(to)).then(|| from.seconds())
            }
            ConstraintKind::Pyramid { pivot, radius } => {
                if from.time() == *pivot {
                    collision_check_3d(from, to, &self.start, &self.end, *radius)
                } else {
                    None
                }
            }
        }
    }

    fn box_conflict(&self, from: &S, to: &S) -> Option<f64> {
        if !self.overlaps_in_time(from, to) {
            return None;
        }
        let at = self.start.seconds().max(from.seconds());
        if self.start.same_loc(to) && self.end.same_loc(from) {
            return Some(at);
        }
        let (s, e, f, t) = (
            self.start.coords(),
            self.end.coords(),
            from.coords(),
            to.coords(),
        );
        let disjoint = s[0].min(e[0]) > f[0].max(t[0])
            || s[0].max(e[0]) < f[0].min(t[0])
            || s[1].min(e[1]) > f[1].max(t[1])
            || s[1].max(e[1]) < f[1].min(t[1]);
        (!disjoint).then_some(at)
    }

    fn overlaps_in_time(&self, from: &S, to: &S) -> bool {
        self.start.time() < to.time() && from.time() < self.end.time()
    }

    /// The complementary exclusive-or constraint, with the positive and
    /// negative transitions exchanged.
    pub fn swap(&self) -> Option<Self> {
        match &self.kind {
            ConstraintKind::XorIdentical { pos_start, pos_end } => Some(
                Self::xor_identical(
                    pos_start.clone(),
                    pos_end.clone(),
                    self.start.clone(),
                    self.end.clone(),
                )
                .with_polarity(self.polarity),
            ),
            ConstraintKind::XorCollision {
                pos_start,
                pos_end,
                radius,
            } => Some(
                Self::xor_collision(
                    pos_start.clone(),
                    pos_end.clone(),
                    self.start.clone(),
                    self.end.clone(),
                    *radius,
                )
                .with_polarity(self.polarity),
            ),
            _ => None,
        }
    }

    /// The transition an agent is required to perform when this constraint is
    /// registered as positive.
    pub fn required_transition(&self) -> (&S, &S) {
        match &self.kind {
            ConstraintKind::XorIdentical { pos_start, pos_end }
            | ConstraintKind::XorCollision {
                pos_start, pos_end, ..
            } => (pos_start, pos_end),
            _ => (&self.start, &self.end),
        }
    }

    pub fn is_exclusive_or(&self) -> bool {
        matches!(
            self.kind,
            ConstraintKind::XorIdentical { .. } | ConstraintKind::XorCollision { .. }
        )
    }
}

fn planar<S: TimedState>(state: &S) -> [f64; 2] {
    let c = state.coords();
    [c[0], c[1]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::GridState;

    #[test]
    fn test_identical_ignores_arrival_time() {
        let c = Constraint::identical(GridState::at((0, 1), 1), GridState::at((0, 2), 2));
        assert!(c
            .conflicts_with(&GridState::at((0, 1), 1), &GridState::at((0, 2), 5))
            .is_some());
        // Different departure time is allowed.
        assert!(c
            .conflicts_with(&GridState::at((0, 1), 2), &GridState::at((0, 2), 3))
            .is_none());
        // Departure at time zero still reports a violation.
        let c = Constraint::identical(GridState::at((0, 0), 0), GridState::at((0, 1), 1));
        assert_eq!(
            c.conflicts_with(&GridState::at((0, 0), 0), &GridState::at((0, 1), 1)),
            Some(0.0)
        );
    }

    #[test]
    fn test_time_range_window() {
        let c = Constraint::time_range(GridState::at((0, 1), 1), GridState::at((0, 2), 3));
        for step in 1..=3 {
            assert!(c
                .conflicts_with(&GridState::at((0, 1), step), &GridState::at((0, 2), step + 1))
                .is_some());
        }
        assert!(c
            .conflicts_with(&GridState::at((0, 1), 4), &GridState::at((0, 2), 5))
            .is_none());
    }

    #[test]
    fn test_bounding_box_swap_and_overlap() {
        let c = Constraint::bounding_box(GridState::at((0, 1), 1), GridState::at((0, 2), 2));
        // Swapping the same edge.
        assert!(c
            .conflicts_with(&GridState::at((0, 2), 1), &GridState::at((0, 1), 2))
            .is_some());
        // Far away.
        assert!(c
            .conflicts_with(&GridState::at((3, 3), 1), &GridState::at((3, 4), 2))
            .is_none());
        // Outside the time window.
        assert!(c
            .conflicts_with(&GridState::at((0, 2), 3), &GridState::at((0, 1), 4))
            .is_none());
    }

    #[test]
    fn test_pyramid_only_at_pivot() {
        let c = Constraint::pyramid(GridState::at((0, 1), 1), GridState::at((0, 2), 2), 1000, 0.25);
        assert!(c
            .conflicts_with(&GridState::at((0, 3), 1), &GridState::at((0, 2), 2))
            .is_some());
        assert!(c
            .conflicts_with(&GridState::at((0, 2), 2), &GridState::at((0, 2), 3))
            .is_none());
    }

    #[test]
    fn test_overlap_needs_shared_time() {
        let c = Constraint::overlap(GridState::at((0, 2), 1), GridState::at((0, 2), 2));
        assert!(c
            .conflicts_with(&GridState::at((0, 1), 1), &GridState::at((0, 2), 2))
            .is_some());
        assert!(c
            .conflicts_with(&GridState::at((0, 1), 2), &GridState::at((0, 2), 3))
            .is_none());
    }

    #[test]
    fn test_xor_swap() {
        let a1 = GridState::at((0, 1), 1);
        let a2 = GridState::at((0, 2), 2);
        let b1 = GridState::at((0, 3), 1);
        let b2 = GridState::at((0, 2), 2);
        let c = Constraint::xor_identical(a1.clone(), a2.clone(), b1.clone(), b2.clone());
        assert_eq!(c.required_transition(), (&b1, &b2));
        let swapped = c.swap().unwrap();
        assert_eq!(swapped.start, b1);
        assert_eq!(swapped.required_transition(), (&a1, &a2));
        assert!(Constraint::identical(a1, a2).swap().is_none());
    }
}
