use std::fmt;
use std::rc::Rc;

use super::Constraint;

/// Severity of a detected conflict, as a bit set over its two sides.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cardinality(u8);

impl Cardinality {
    pub const NO_CONFLICT: Cardinality = Cardinality(0x0);
    pub const NON_CARDINAL: Cardinality = Cardinality(0x1);
    pub const LEFT_CARDINAL: Cardinality = Cardinality(0x2);
    pub const RIGHT_CARDINAL: Cardinality = Cardinality(0x4);
    pub const BOTH_CARDINAL: Cardinality = Cardinality(0x6);

    pub fn from_sides(left: bool, right: bool) -> Self {
        match (left, right) {
            (false, false) => Self::NON_CARDINAL,
            (true, false) => Self::LEFT_CARDINAL,
            (false, true) => Self::RIGHT_CARDINAL,
            (true, true) => Self::BOTH_CARDINAL,
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn left(self) -> bool {
        self.0 & Self::LEFT_CARDINAL.0 != 0
    }

    pub fn right(self) -> bool {
        self.0 & Self::RIGHT_CARDINAL.0 != 0
    }

    /// Semi- or both-cardinal.
    pub fn is_cardinal(self) -> bool {
        self.0 & Self::BOTH_CARDINAL.0 != 0
    }

    /// Whether a conflict classified as `self` replaces `recorded` as the
    /// branching candidate.
    pub fn supersedes(self, recorded: Cardinality) -> bool {
        recorded == Self::NO_CONFLICT
            || (recorded == Self::NON_CARDINAL && self.is_cardinal())
            || self == Self::BOTH_CARDINAL
    }
}

impl fmt::Debug for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::NO_CONFLICT => "NO_CONFLICT",
            Self::NON_CARDINAL => "NON_CARDINAL",
            Self::LEFT_CARDINAL => "LEFT_CARDINAL",
            Self::RIGHT_CARDINAL => "RIGHT_CARDINAL",
            Self::BOTH_CARDINAL => "BOTH_CARDINAL",
            _ => return write!(f, "Cardinality({:#x})", self.0),
        };
        f.write_str(name)
    }
}

/// A branching decision: `unit1` receives `constraints`; under exclusive-or
/// branching `unit2` either receives `partner_constraints` or must satisfy
/// the positive half of `constraints`.
#[derive(Debug, Clone)]
pub struct Conflict<S> {
    pub unit1: usize,
    pub unit2: usize,
    pub constraints: Vec<Rc<Constraint<S>>>,
    pub partner_constraints: Vec<Rc<Constraint<S>>>,
    /// Waypoint directly before the conflict on `unit1`'s trajectory.
    pub prev_wpt: usize,
    pub partner_prev_wpt: usize,
}

impl<S> Conflict<S> {
    pub fn new(unit1: usize, unit2: usize, constraint: Constraint<S>, prev_wpt: usize) -> Self {
        Conflict {
            unit1,
            unit2,
            constraints: vec![Rc::new(constraint)],
            partner_constraints: Vec::new(),
            prev_wpt,
            partner_prev_wpt: 0,
        }
    }

    pub fn with_partner(mut self, constraint: Constraint<S>, partner_prev_wpt: usize) -> Self {
        self.partner_constraints.push(Rc::new(constraint));
        self.partner_prev_wpt = partner_prev_wpt;
        self
    }

    pub fn replans_partner(&self) -> bool {
        !self.partner_constraints.is_empty()
    }
}
