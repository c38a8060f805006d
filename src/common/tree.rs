use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use super::Conflict;

type UnitPair = (usize, usize);
type IndexPair = (usize, usize);

/// Per-node memo of detected collisions, keyed by the (ordered) pair of
/// agents and holding the path indices at which they collide.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConflictCache {
    colliding: BTreeMap<UnitPair, BTreeSet<IndexPair>>,
    cardinal: BTreeMap<UnitPair, BTreeSet<IndexPair>>,
    semi: BTreeMap<UnitPair, BTreeSet<IndexPair>>,
}

fn ordered(a: usize, b: usize, ia: usize, ib: usize) -> (UnitPair, IndexPair) {
    if a <= b {
        ((a, b), (ia, ib))
    } else {
        ((b, a), (ib, ia))
    }
}

impl ConflictCache {
    pub(crate) fn set_colliding(&mut self, a: usize, b: usize, ia: usize, ib: usize) {
        let (pair, idx) = ordered(a, b, ia, ib);
        self.colliding.entry(pair).or_default().insert(idx);
    }

    pub(crate) fn set_cardinal(&mut self, a: usize, b: usize, ia: usize, ib: usize) {
        let (pair, idx) = ordered(a, b, ia, ib);
        self.cardinal.entry(pair).or_default().insert(idx);
    }

    pub(crate) fn set_semi(&mut self, a: usize, b: usize, ia: usize, ib: usize) {
        let (pair, idx) = ordered(a, b, ia, ib);
        self.semi.entry(pair).or_default().insert(idx);
    }

    /// Forget every entry involving `unit`; its trajectory changed.
    pub(crate) fn clear_unit(&mut self, unit: usize) {
        for map in [&mut self.colliding, &mut self.cardinal, &mut self.semi] {
            map.retain(|&(a, b), _| a != unit && b != unit);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.colliding.clear();
        self.cardinal.clear();
        self.semi.clear();
    }

    pub(crate) fn total(&self) -> usize {
        self.colliding.values().map(BTreeSet::len).sum()
    }

    /// The most severe cached pair: cardinal first, then semi-cardinal, then any.
    pub(crate) fn worst_pair(&self) -> Option<UnitPair> {
        [&self.cardinal, &self.semi, &self.colliding]
            .into_iter()
            .find_map(|map| {
                map.iter()
                    .find(|(_, indices)| !indices.is_empty())
                    .map(|(pair, _)| *pair)
            })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CbsTreeNode<S> {
    pub(crate) parent: usize,
    /// `None` only for the root.
    pub(crate) con: Option<Conflict<S>>,
    /// Replacement node produced by a bypass; its constraint is not enforced.
    pub(crate) bypass: bool,
    pub(crate) paths: Vec<Rc<Vec<S>>>,
    pub(crate) wpts: Vec<Vec<usize>>,
    pub(crate) satisfiable: bool,
    /// Units whose trajectory differs from the parent's.
    pub(crate) replanned: Vec<usize>,
    pub(crate) cache: ConflictCache,
}

impl<S> CbsTreeNode<S> {
    pub(crate) fn root() -> Self {
        CbsTreeNode {
            parent: 0,
            con: None,
            bypass: false,
            paths: Vec::new(),
            wpts: Vec::new(),
            satisfiable: true,
            replanned: Vec::new(),
            cache: ConflictCache::default(),
        }
    }

    pub(crate) fn child(&self, parent: usize, con: Conflict<S>) -> Self {
        CbsTreeNode {
            parent,
            con: Some(con),
            bypass: false,
            paths: self.paths.clone(),
            wpts: self.wpts.clone(),
            satisfiable: true,
            replanned: Vec::new(),
            cache: self.cache.clone(),
        }
    }

    pub(crate) fn replace_path(&mut self, unit: usize, path: Vec<S>, wpts: Vec<usize>) {
        self.paths[unit] = Rc::new(path);
        self.wpts[unit] = wpts;
        self.cache.clear_unit(unit);
        if !self.replanned.contains(&unit) {
            self.replanned.push(unit);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OpenListEntry {
    pub(crate) location: usize,
    pub(crate) cost: f64,
    pub(crate) nc: usize,
    pub(crate) cardinal: bool,
}

// Default order: cheapest first, then cardinal, then fewest conflicts.
#[derive(Debug)]
pub(crate) struct CostFirst(pub(crate) OpenListEntry);

impl Ord for CostFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .cost
            .total_cmp(&other.0.cost)
            .then_with(|| other.0.cardinal.cmp(&self.0.cardinal))
            .then_with(|| self.0.nc.cmp(&other.0.nc))
            // Older nodes first, keeps expansion deterministic.
            .then_with(|| self.0.location.cmp(&other.0.location))
    }
}

impl PartialOrd for CostFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CostFirst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CostFirst {}

// Greedy order: cardinal first, then fewest conflicts, then cheapest.
#[derive(Debug)]
pub(crate) struct CardinalFirst(pub(crate) OpenListEntry);

impl Ord for CardinalFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .cardinal
            .cmp(&self.0.cardinal)
            .then_with(|| self.0.nc.cmp(&other.0.nc))
            .then_with(|| self.0.cost.total_cmp(&other.0.cost))
            .then_with(|| self.0.location.cmp(&other.0.location))
    }
}

impl PartialOrd for CardinalFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CardinalFirst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CardinalFirst {}

#[derive(Debug)]
pub(crate) enum OpenList {
    CostFirst(BTreeSet<CostFirst>),
    CardinalFirst(BTreeSet<CardinalFirst>),
}

impl OpenList {
    pub(crate) fn new(greedy: bool) -> Self {
        if greedy {
            OpenList::CardinalFirst(BTreeSet::new())
        } else {
            OpenList::CostFirst(BTreeSet::new())
        }
    }

    pub(crate) fn push(&mut self, entry: OpenListEntry) {
        match self {
            OpenList::CostFirst(set) => {
                set.insert(CostFirst(entry));
            }
            OpenList::CardinalFirst(set) => {
                set.insert(CardinalFirst(entry));
            }
        }
    }

    pub(crate) fn pop(&mut self) -> Option<OpenListEntry> {
        match self {
            OpenList::CostFirst(set) => set.pop_first().map(|e| e.0),
            OpenList::CardinalFirst(set) => set.pop_first().map(|e| e.0),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        match self {
            OpenList::CostFirst(set) => set.len(),
            OpenList::CardinalFirst(set) => set.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry by rebuilding an empty list of the same order.
    pub(crate) fn reset(&mut self) {
        *self = OpenList::new(matches!(self, OpenList::CardinalFirst(_)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(location: usize, cost: f64, nc: usize, cardinal: bool) -> OpenListEntry {
        OpenListEntry {
            location,
            cost,
            nc,
            cardinal,
        }
    }

    fn drain(mut open: OpenList) -> Vec<usize> {
        let mut order = Vec::new();
        while let Some(e) = open.pop() {
            order.push(e.location);
        }
        order
    }

    #[test]
    fn test_default_order() {
        let mut open = OpenList::new(false);
        open.push(entry(1, 10.0, 1, false));
        open.push(entry(2, 9.0, 5, false));
        open.push(entry(3, 10.0, 3, true));
        open.push(entry(4, 10.0, 0, false));
        assert_eq!(drain(open), vec![2, 3, 4, 1]);
    }

    #[test]
    fn test_greedy_order() {
        let mut open = OpenList::new(true);
        open.push(entry(1, 10.0, 1, false));
        open.push(entry(2, 9.0, 5, false));
        open.push(entry(3, 12.0, 3, true));
        open.push(entry(4, 11.0, 1, false));
        assert_eq!(drain(open), vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_reset_keeps_order_kind() {
        let mut open = OpenList::new(true);
        open.push(entry(1, 1.0, 0, false));
        open.reset();
        assert!(open.is_empty());
        assert!(matches!(open, OpenList::CardinalFirst(_)));
    }

    #[test]
    fn test_cache_clear_unit() {
        let mut cache = ConflictCache::default();
        cache.set_colliding(2, 0, 4, 1);
        cache.set_colliding(1, 2, 3, 3);
        cache.set_colliding(0, 1, 5, 5);
        cache.set_semi(0, 1, 5, 5);
        assert_eq!(cache.total(), 3);
        assert_eq!(cache.worst_pair(), Some((0, 1)));
        cache.clear_unit(1);
        assert_eq!(cache.total(), 1);
        assert_eq!(cache.worst_pair(), Some((0, 2)));
    }
}
