use std::fmt;
use std::marker::PhantomData;
use std::slice;

use crate::util::index::Idx;

/// Maximum number of elements kept in the sorted-array representation.
const SMALL_SET_CAPACITY: usize = 8;

const WORD_BITS: usize = u64::BITS as usize;

pub trait PointsToSet<T> {
    type Iter<'a>: Iterator<Item = T>
    where
        Self: 'a;

    fn new() -> Self;
    fn clear(&mut self);
    fn count(&self) -> usize;
    fn contains(&self, elem: T) -> bool;
    fn is_empty(&self) -> bool;
    fn superset(&self, other: &Self) -> bool;
    fn insert(&mut self, elem: T) -> bool;
    fn remove(&mut self, elem: T) -> bool;
    fn union(&mut self, other: &Self) -> bool;
    fn subtract(&mut self, other: &Self) -> bool;
    fn iter<'a>(&'a self) -> Self::Iter<'a>;
}

/// Hybrid implementation of a points-to set.
///
/// Most pointers reference very few objects, so the representation is staged:
/// empty and one-element sets are inline, sets of up to
/// [`SMALL_SET_CAPACITY`] elements use a sorted array, and anything larger
/// becomes a [`BitSet`] over the dense object ids. Growth transitions are
/// one-way. Iteration is in ascending id order for every representation.
#[derive(Clone)]
pub struct HybridPointsToSet<T> {
    points_to: HybridSet<T>,
}

impl<T: Idx + Ord> fmt::Debug for HybridPointsToSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.points_to.fmt(f)
    }
}

/// IntoIterator
impl<'a, T: Idx + Ord> IntoIterator for &'a HybridPointsToSet<T> {
    type Item = T;
    type IntoIter = HybridIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Idx + Ord> PointsToSet<T> for HybridPointsToSet<T> {
    fn new() -> Self {
        HybridPointsToSet {
            points_to: HybridSet::new(),
        }
    }

    /// Clear all elements.
    fn clear(&mut self) {
        self.points_to.clear();
    }

    /// Count the number of elements in the set.
    fn count(&self) -> usize {
        self.points_to.count()
    }

    /// Returns `true` if `self` contains `elem`.
    fn contains(&self, elem: T) -> bool {
        self.points_to.contains(elem)
    }

    fn is_empty(&self) -> bool {
        self.points_to.is_empty()
    }

    /// Is `self` a superset of `other`?
    fn superset(&self, other: &HybridPointsToSet<T>) -> bool {
        self.points_to.superset(&other.points_to)
    }

    /// Adds `elem` to this set, returns true if it was not already present.
    fn insert(&mut self, elem: T) -> bool {
        self.points_to.insert(elem)
    }

    fn remove(&mut self, elem: T) -> bool {
        self.points_to.remove(elem)
    }

    fn union(&mut self, other: &HybridPointsToSet<T>) -> bool {
        self.points_to.union(&other.points_to)
    }

    fn subtract(&mut self, other: &HybridPointsToSet<T>) -> bool {
        self.points_to.subtract(&other.points_to)
    }

    type Iter<'a> = HybridIter<'a, T>;
    fn iter(&self) -> HybridIter<'_, T> {
        self.points_to.iter()
    }
}

#[derive(Clone)]
pub enum HybridSet<T> {
    Empty,
    Singleton(T),
    /// Sorted, duplicate-free.
    SmallSet(Vec<T>),
    LargeSet(BitSet<T>),
}

impl<T: Idx + Ord> fmt::Debug for HybridSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Idx + Ord> HybridSet<T> {
    pub fn new() -> Self {
        HybridSet::Empty
    }

    /// Clear all elements.
    pub fn clear(&mut self) {
        *self = HybridSet::Empty;
    }

    /// Count the number of elements in the set.
    pub fn count(&self) -> usize {
        match self {
            HybridSet::Empty => 0,
            HybridSet::Singleton(_) => 1,
            HybridSet::SmallSet(small) => small.len(),
            HybridSet::LargeSet(large) => large.len(),
        }
    }

    /// Returns `true` if `self` contains `elem`.
    pub fn contains(&self, elem: T) -> bool {
        match self {
            HybridSet::Empty => false,
            HybridSet::Singleton(e) => *e == elem,
            HybridSet::SmallSet(small) => small.binary_search(&elem).is_ok(),
            HybridSet::LargeSet(large) => large.contains(elem),
        }
    }

    /// Is `self` a superset of `other`?
    pub fn superset(&self, other: &HybridSet<T>) -> bool {
        match (self, other) {
            (HybridSet::LargeSet(self_large), HybridSet::LargeSet(other_large)) => {
                self_large.superset(other_large)
            }
            _ => other.iter().all(|elem| self.contains(elem)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            HybridSet::Empty => true,
            HybridSet::Singleton(_) => false,
            HybridSet::SmallSet(small) => small.is_empty(),
            HybridSet::LargeSet(large) => large.is_empty(),
        }
    }

    /// Adds `elem` to this set, returns true if it was not already present.
    pub fn insert(&mut self, elem: T) -> bool {
        match self {
            HybridSet::Empty => {
                *self = HybridSet::Singleton(elem);
                true
            }
            HybridSet::Singleton(e) if *e == elem => false,
            HybridSet::Singleton(e) => {
                let mut small = Vec::with_capacity(SMALL_SET_CAPACITY);
                if *e < elem {
                    small.push(*e);
                    small.push(elem);
                } else {
                    small.push(elem);
                    small.push(*e);
                }
                *self = HybridSet::SmallSet(small);
                true
            }
            HybridSet::SmallSet(small) => match small.binary_search(&elem) {
                Ok(_) => false,
                Err(pos) if small.len() < SMALL_SET_CAPACITY => {
                    small.insert(pos, elem);
                    true
                }
                Err(_) => {
                    // The array is full. Convert to a large set.
                    let mut large = BitSet::new();
                    for elem in small {
                        large.insert(*elem);
                    }
                    let changed = large.insert(elem);
                    *self = HybridSet::LargeSet(large);
                    changed
                }
            },
            HybridSet::LargeSet(large) => large.insert(elem),
        }
    }

    /// Removes `elem`, returns true if the set changed. Note: a large set is
    /// not converted back to a smaller representation.
    pub fn remove(&mut self, elem: T) -> bool {
        match self {
            HybridSet::Empty => false,
            HybridSet::Singleton(e) => {
                if *e == elem {
                    *self = HybridSet::Empty;
                    true
                } else {
                    false
                }
            }
            HybridSet::SmallSet(small) => {
                if let Ok(pos) = small.binary_search(&elem) {
                    small.remove(pos);
                    true
                } else {
                    false
                }
            }
            HybridSet::LargeSet(large) => large.remove(elem),
        }
    }

    pub fn iter(&self) -> HybridIter<'_, T> {
        match self {
            HybridSet::Empty => HybridIter::SingleIter(None),
            HybridSet::Singleton(e) => HybridIter::SingleIter(Some(*e)),
            HybridSet::SmallSet(small) => HybridIter::SmallIter(small.iter()),
            HybridSet::LargeSet(large) => HybridIter::LargeIter(large.iter()),
        }
    }

    pub fn union(&mut self, other: &HybridSet<T>) -> bool {
        if let HybridSet::LargeSet(other_large) = other {
            if let HybridSet::LargeSet(self_large) = self {
                return self_large.union(other_large);
            }
            // Convert self to a large set first.
            let mut self_large = BitSet::new();
            for elem in self.iter() {
                self_large.insert(elem);
            }
            let changed = self_large.union(other_large);
            *self = HybridSet::LargeSet(self_large);
            return changed;
        }
        let mut changed = false;
        for elem in other.iter() {
            changed |= self.insert(elem);
        }
        changed
    }

    pub fn subtract(&mut self, other: &HybridSet<T>) -> bool {
        match self {
            HybridSet::Empty => false,
            HybridSet::Singleton(e) => {
                let e = *e;
                if other.contains(e) {
                    *self = HybridSet::Empty;
                    true
                } else {
                    false
                }
            }
            HybridSet::SmallSet(small) => {
                let mut changed = false;
                small.retain(|&elem| {
                    let contains = other.contains(elem);
                    if contains {
                        changed = true;
                    }
                    !contains
                });
                changed
            }
            HybridSet::LargeSet(self_large) => match other {
                HybridSet::LargeSet(other_large) => self_large.subtract(other_large),
                _ => {
                    let mut changed = false;
                    for elem in other.iter() {
                        changed |= self_large.remove(elem);
                    }
                    changed
                }
            },
        }
    }
}

pub enum HybridIter<'a, T: Idx> {
    SingleIter(Option<T>),
    SmallIter(slice::Iter<'a, T>),
    LargeIter(BitSetIter<'a, T>),
}

impl<'a, T: Idx> Iterator for HybridIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            HybridIter::SingleIter(single) => single.take(),
            HybridIter::SmallIter(small) => small.next().copied(),
            HybridIter::LargeIter(large) => large.next(),
        }
    }
}

/// The large representation: one bit per dense id, with a cached population
/// count.
///
/// Object ids are handed out contiguously, so a flat word vector stays
/// dense. The cached count keeps the size queries the hybrid wrapper issues
/// for its representation decisions O(1); the union/subtract bulk operations
/// pay for it by re-counting the words they touch, which they already
/// traverse anyway.
#[derive(Clone)]
pub struct BitSet<T> {
    words: Vec<u64>,
    len: usize,
    marker: PhantomData<T>,
}

impl<T: Idx> BitSet<T> {
    pub fn new() -> Self {
        BitSet {
            words: Vec::new(),
            len: 0,
            marker: PhantomData,
        }
    }

    /// The word position and in-word mask of an element.
    #[inline]
    fn slot(elem: T) -> (usize, u64) {
        let idx = elem.index();
        (idx / WORD_BITS, 1u64 << (idx % WORD_BITS))
    }

    /// The number of elements; cached, so this never scans the words.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, elem: T) -> bool {
        let (slot, mask) = Self::slot(elem);
        self.words.get(slot).map_or(false, |word| word & mask != 0)
    }

    /// Adds `elem`, growing the word vector as needed. Returns whether the
    /// set changed.
    pub fn insert(&mut self, elem: T) -> bool {
        let (slot, mask) = Self::slot(elem);
        if slot >= self.words.len() {
            self.words.resize(slot + 1, 0);
        }
        let word = &mut self.words[slot];
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        self.len += 1;
        true
    }

    /// Removes `elem`. Returns whether the set changed.
    pub fn remove(&mut self, elem: T) -> bool {
        let (slot, mask) = Self::slot(elem);
        match self.words.get_mut(slot) {
            Some(word) if *word & mask != 0 => {
                *word &= !mask;
                self.len -= 1;
                true
            }
            _ => false,
        }
    }

    /// Adds every element of `other`. Returns whether the set grew.
    pub fn union(&mut self, other: &BitSet<T>) -> bool {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        let mut len = 0;
        for (slot, word) in self.words.iter_mut().enumerate() {
            if let Some(more) = other.words.get(slot) {
                *word |= more;
            }
            len += word.count_ones() as usize;
        }
        let grew = len > self.len;
        self.len = len;
        grew
    }

    /// Removes every element of `other`. Returns whether the set shrank.
    pub fn subtract(&mut self, other: &BitSet<T>) -> bool {
        let mut len = 0;
        for (slot, word) in self.words.iter_mut().enumerate() {
            if let Some(gone) = other.words.get(slot) {
                *word &= !gone;
            }
            len += word.count_ones() as usize;
        }
        let shrank = len < self.len;
        self.len = len;
        shrank
    }

    /// Whether every element of `other` is also in `self`.
    pub fn superset(&self, other: &BitSet<T>) -> bool {
        other.words.iter().enumerate().all(|(slot, more)| {
            let have = self.words.get(slot).copied().unwrap_or(0);
            more & !have == 0
        })
    }

    /// Iterates the elements in ascending id order.
    pub fn iter(&self) -> BitSetIter<'_, T> {
        BitSetIter {
            words: &self.words,
            slot: 0,
            word: self.words.first().copied().unwrap_or(0),
            marker: PhantomData,
        }
    }
}

impl<T: Idx> Default for BitSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Idx> fmt::Debug for BitSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Walks the words in order, repeatedly stripping the lowest set bit of a
/// working copy of the current word.
pub struct BitSetIter<'a, T> {
    words: &'a [u64],
    slot: usize,
    word: u64,
    marker: PhantomData<T>,
}

impl<'a, T: Idx> Iterator for BitSetIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while self.word == 0 {
            self.slot += 1;
            self.word = *self.words.get(self.slot)?;
        }
        let bit = self.word.trailing_zeros() as usize;
        self.word &= self.word - 1;
        Some(T::new(self.slot * WORD_BITS + bit))
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rand::Rng;

    use crate::pts_set::points_to::{
        BitSet, HybridPointsToSet, HybridSet, PointsToSet, SMALL_SET_CAPACITY,
    };

    fn random_set(len: usize) -> HashSet<u32> {
        let mut rng = rand::thread_rng();
        let mut set = HashSet::new();
        while set.len() < len {
            let x = rng.gen_range(1..1000);
            set.insert(x);
        }
        set
    }

    fn random_value_from_set(set: &HashSet<u32>) -> u32 {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..set.len());
        set.iter().nth(index).cloned().unwrap()
    }

    fn from_elems(elems: &HashSet<u32>) -> HybridPointsToSet<u32> {
        let mut set = HybridPointsToSet::<u32>::new();
        for x in elems.iter() {
            set.insert(*x);
        }
        set
    }

    #[test]
    fn bit_set_tracks_its_length() {
        let mut set: BitSet<u32> = BitSet::new();
        assert!(set.is_empty());
        assert!(set.insert(130));
        assert!(set.insert(2));
        assert!(set.insert(65));
        assert!(!set.insert(2));
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![2, 65, 130]);

        assert!(set.remove(65));
        assert!(!set.remove(65));
        assert_eq!(set.len(), 2);
        assert!(!set.contains(65));
    }

    #[test]
    fn bit_set_union_grows_and_subtract_shrinks() {
        let mut a: BitSet<u32> = BitSet::new();
        let mut b: BitSet<u32> = BitSet::new();
        a.insert(1);
        a.insert(200);
        b.insert(200);
        b.insert(3);
        assert!(a.union(&b));
        assert!(!a.union(&b));
        assert!(a.superset(&b));
        assert_eq!(a.len(), 3);
        assert!(a.subtract(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1]);
        assert!(!b.superset(&a));
    }

    #[test]
    fn representation_stages() {
        let mut set = HybridPointsToSet::<u32>::new();
        assert!(matches!(set.points_to, HybridSet::Empty));
        set.insert(7);
        set.insert(7);
        assert!(matches!(set.points_to, HybridSet::Singleton(7)));
        set.insert(3);
        assert!(matches!(set.points_to, HybridSet::SmallSet(_)));
        for x in 0..SMALL_SET_CAPACITY as u32 {
            set.insert(100 + x);
        }
        assert!(matches!(set.points_to, HybridSet::LargeSet(_)));
        assert_eq!(set.count(), SMALL_SET_CAPACITY + 2);
    }

    #[test]
    fn small_set_iterates_in_ascending_order() {
        let rand_set = random_set(SMALL_SET_CAPACITY);
        let small_set = from_elems(&rand_set);
        assert!(matches!(small_set.points_to, HybridSet::SmallSet(_)));

        let elems: Vec<u32> = small_set.iter().collect();
        let mut expected: Vec<u32> = rand_set.iter().cloned().collect();
        expected.sort();
        assert_eq!(elems, expected);

        let mut small_set = small_set;
        let rand_val = random_value_from_set(&rand_set);
        assert_eq!(small_set.contains(rand_val), true);
        assert_eq!(small_set.remove(rand_val), true);
        assert_eq!(small_set.contains(rand_val), false);
        assert_eq!(small_set.count(), SMALL_SET_CAPACITY - 1);
    }

    #[test]
    fn large_set_test() {
        let rand_set = random_set(SMALL_SET_CAPACITY + 3);
        let mut large_set = from_elems(&rand_set);
        assert_eq!(large_set.count(), SMALL_SET_CAPACITY + 3);
        assert!(matches!(large_set.points_to, HybridSet::LargeSet(_)));
        assert_eq!(large_set.iter().collect::<HashSet<_>>(), rand_set);

        let rand_val = random_value_from_set(&rand_set);
        assert_eq!(large_set.contains(rand_val), true);
        assert_eq!(large_set.remove(rand_val), true);
        assert_eq!(large_set.contains(rand_val), false);
        assert_eq!(large_set.count(), SMALL_SET_CAPACITY + 2);
    }

    #[test]
    fn small_set_union_large_set() {
        let rand_small_set = random_set(5);
        let small_set = from_elems(&rand_small_set);
        let rand_large_set = random_set(SMALL_SET_CAPACITY + 3);
        let large_set = from_elems(&rand_large_set);

        let mut union_set = small_set.clone();
        union_set.union(&large_set);
        assert_eq!(union_set.superset(&small_set), true);
        assert_eq!(union_set.superset(&large_set), true);
        assert_eq!(
            union_set.iter().collect::<HashSet<_>>(),
            rand_small_set
                .union(&rand_large_set)
                .cloned()
                .collect::<HashSet<_>>()
        );
    }

    #[test]
    fn large_set_union_small_set() {
        let rand_small_set = random_set(5);
        let small_set = from_elems(&rand_small_set);
        let rand_large_set = random_set(SMALL_SET_CAPACITY + 3);
        let large_set = from_elems(&rand_large_set);

        let mut union_set = large_set.clone();
        union_set.union(&small_set);
        assert_eq!(
            union_set.iter().collect::<HashSet<_>>(),
            rand_small_set
                .union(&rand_large_set)
                .cloned()
                .collect::<HashSet<_>>()
        );
    }

    #[test]
    fn subtract_test() {
        let rand_small_set = random_set(6);
        let small_set = from_elems(&rand_small_set);
        let mut rand_large_set = random_set(SMALL_SET_CAPACITY + 3);
        for &x in rand_small_set.iter().take(3) {
            rand_large_set.insert(x);
        }
        let large_set = from_elems(&rand_large_set);

        let mut cloned_set = small_set.clone();
        assert_eq!(cloned_set.subtract(&large_set), true);
        assert_eq!(
            cloned_set.iter().collect::<HashSet<_>>(),
            rand_small_set
                .difference(&rand_large_set)
                .cloned()
                .collect::<HashSet<_>>()
        );

        cloned_set = large_set.clone();
        assert_eq!(cloned_set.subtract(&small_set), true);
        assert_eq!(
            cloned_set.iter().collect::<HashSet<_>>(),
            rand_large_set
                .difference(&rand_small_set)
                .cloned()
                .collect::<HashSet<_>>()
        );
    }
}
