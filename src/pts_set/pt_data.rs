use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use super::points_to::PointsToSet;
use crate::util::index::Idx;

/// Basic points-to store.
///
/// Maps a pointer key to its points-to set and additionally maintains the
/// reverse map (object -> pointers referencing it). The frozen analysis
/// result is backed by this structure.
///
/// K  (Key):     "owning" pointer of a points-to set.
/// D  (Data):    elements in points-to sets.
/// DS (DataSet): the points-to set; a collection of Data.
pub struct BasePTData<K, D, DS> {
    pts_map: HashMap<K, DS>,
    rev_pts_map: HashMap<D, HashSet<K>>,
}

impl<K, D, DS> fmt::Debug for BasePTData<K, D, DS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "BasePTData".fmt(f)
    }
}

impl<K, D, DS> BasePTData<K, D, DS>
where
    K: Hash + Eq + Copy,
    D: Idx,
    DS: PointsToSet<D>,
{
    pub fn new() -> BasePTData<K, D, DS> {
        BasePTData {
            pts_map: HashMap::new(),
            rev_pts_map: HashMap::new(),
        }
    }

    /// Return the points-to map.
    #[inline]
    pub fn get_pts_map(&self) -> &HashMap<K, DS> {
        &self.pts_map
    }

    /// Get the points-to set of a pointer.
    #[inline]
    pub fn get_pts(&self, var: K) -> Option<&DS> {
        self.pts_map.get(&var)
    }

    /// Get the set of pointers whose points-to set contains `elem`.
    #[inline]
    pub fn get_rev_pts(&self, elem: D) -> Option<&HashSet<K>> {
        self.rev_pts_map.get(&elem)
    }

    /// Adds an element to the points-to set associated with var.
    pub fn add_pts(&mut self, var: K, elem: D) -> bool {
        self.rev_pts_map.entry(elem).or_default().insert(var);
        self.pts_map.entry(var).or_insert_with(DS::new).insert(elem)
    }

    /// Performs pts(dst_var) = pts(dst_var) U src_ds.
    pub fn union_pts_to(&mut self, dst_var: K, src_ds: &DS) -> bool {
        for elem in src_ds.iter() {
            self.rev_pts_map.entry(elem).or_default().insert(dst_var);
        }
        let dst_ds = self.pts_map.entry(dst_var).or_insert_with(DS::new);
        dst_ds.union(src_ds)
    }
}

impl<K, D, DS> Default for BasePTData<K, D, DS>
where
    K: Hash + Eq + Copy,
    D: Idx,
    DS: PointsToSet<D>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Diff points-to store.
///
/// This is an optimisation on top of the base points-to structure: each
/// pointer's set is split into the part that has already been propagated and
/// the pending delta added since the last propagation. The solver pops a
/// pointer, propagates exactly its delta, then calls [`DiffPTData::flush`] to
/// retire the delta into the propagated part. Both parts only ever grow,
/// and the delta is obtained in time proportional to its size.
pub struct DiffPTData<K, D, DS> {
    /// Deltas yet to be propagated.
    pub(crate) diff_pts_map: HashMap<K, DS>,
    /// Points-to information already propagated.
    pub(crate) propa_pts_map: HashMap<K, DS>,

    marker: PhantomData<D>,
}

impl<K, D, DS> fmt::Debug for DiffPTData<K, D, DS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "DiffPTData".fmt(f)
    }
}

impl<K, D, DS> DiffPTData<K, D, DS>
where
    K: Hash + Eq + Copy,
    D: Idx,
    DS: PointsToSet<D> + Clone + fmt::Debug,
    for<'a> &'a DS: IntoIterator<Item = D>,
{
    pub fn new() -> DiffPTData<K, D, DS> {
        DiffPTData {
            diff_pts_map: HashMap::new(),
            propa_pts_map: HashMap::new(),
            marker: PhantomData,
        }
    }

    /// Adds an element to the pending delta of `var` unless it has already
    /// been propagated. Returns false if the element was already present.
    #[inline]
    pub fn add_pts(&mut self, var: K, elem: D) -> bool {
        if let Some(propa) = self.propa_pts_map.get(&var) {
            if propa.contains(elem) {
                return false;
            }
        }
        let diff = self.diff_pts_map.entry(var).or_insert_with(DS::new);
        diff.insert(elem)
    }

    /// diff_pts(dst_var) = diff_pts(dst_var) U (pts(src_var) - propa_pts(dst_var)).
    #[inline]
    pub fn union_pts(&mut self, dst_var: K, src_var: K) -> bool {
        if dst_var == src_var {
            return false;
        }
        let mut changed = false;
        if let Some(diff) = self.diff_pts_map.get(&src_var) {
            let src_ds = diff.clone();
            changed |= self.union_pts_to(dst_var, &src_ds);
        }
        if let Some(propa) = self.propa_pts_map.get(&src_var) {
            let src_ds = propa.clone();
            changed |= self.union_pts_to(dst_var, &src_ds);
        }
        changed
    }

    /// Performs diff_pts(dst_var) = diff_pts(dst_var) U (src_ds - propa_pts(dst_var)).
    #[inline]
    pub fn union_pts_to(&mut self, dst_var: K, src_ds: &DS) -> bool {
        let diff = self.diff_pts_map.entry(dst_var).or_insert_with(DS::new);
        let propa = self.propa_pts_map.entry(dst_var).or_insert_with(DS::new);
        let mut new = src_ds.clone();
        new.subtract(propa);
        diff.union(&new)
    }

    /// Whether `elem` is in either part of the points-to set of `var`.
    pub fn contains_pts(&self, var: K, elem: D) -> bool {
        self.diff_pts_map
            .get(&var)
            .map_or(false, |diff| diff.contains(elem))
            || self
                .propa_pts_map
                .get(&var)
                .map_or(false, |propa| propa.contains(elem))
    }

    /// Get the pending delta of `var`.
    #[inline]
    pub fn get_diff_pts(&self, var: K) -> Option<&DS> {
        self.diff_pts_map.get(&var)
    }

    /// Get the already propagated points-to set of `var`.
    #[inline]
    pub fn get_propa_pts(&self, var: K) -> Option<&DS> {
        self.propa_pts_map.get(&var)
    }

    /// Whether either part of the points-to set of `var` is non-empty.
    pub fn has_pts(&self, var: K) -> bool {
        self.diff_pts_map
            .get(&var)
            .map_or(false, |diff| !diff.is_empty())
            || self
                .propa_pts_map
                .get(&var)
                .map_or(false, |propa| !propa.is_empty())
    }

    /// Retires all pending delta elements of `var` into the propagated part.
    pub fn flush(&mut self, var: K) {
        if !self.diff_pts_map.contains_key(&var) {
            return;
        }

        let diff = self.diff_pts_map.get_mut(&var).unwrap();
        let propa = self.propa_pts_map.entry(var).or_insert_with(DS::new);
        propa.union(diff);
        diff.clear();
    }
}

impl<K, D, DS> Default for DiffPTData<K, D, DS>
where
    K: Hash + Eq + Copy,
    D: Idx,
    DS: PointsToSet<D> + Clone + fmt::Debug,
    for<'a> &'a DS: IntoIterator<Item = D>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pts_set::points_to::HybridPointsToSet;

    type Data = DiffPTData<u32, u32, HybridPointsToSet<u32>>;

    #[test]
    fn delta_is_retired_by_flush() {
        let mut data = Data::new();
        assert!(data.add_pts(0, 10));
        assert!(!data.add_pts(0, 10));
        assert_eq!(data.get_diff_pts(0).unwrap().count(), 1);

        data.flush(0);
        assert!(data.get_diff_pts(0).unwrap().is_empty());
        assert!(data.get_propa_pts(0).unwrap().contains(10));
        // Re-adding a propagated element does not create a new delta.
        assert!(!data.add_pts(0, 10));
    }

    #[test]
    fn union_skips_already_propagated_elements() {
        let mut data = Data::new();
        data.add_pts(1, 10);
        data.add_pts(1, 11);
        data.flush(1);
        data.add_pts(1, 12);

        // pts(2) = {10}; union with pts(1) must produce delta {11, 12}
        // after 10 is flushed.
        data.add_pts(2, 10);
        data.flush(2);
        assert!(data.union_pts(2, 1));
        let diff: Vec<u32> = data.get_diff_pts(2).unwrap().iter().collect();
        assert_eq!(diff, vec![11, 12]);
    }
}
