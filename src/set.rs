use crate::{
    avl::Avl,
    map::Map,
    node::{Key, NoAug},
    tree::{Policy, TreePool},
};
use std::{
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
};

/// the allocation context for sets over `K`
pub type SetPool<K, P = Avl> = TreePool<K, (), P, NoAug>;

/// A persistent ordered set, a thin veneer over [`Map`] with unit values.
/// The same snapshot and pool rules apply.
pub struct Set<K, P = Avl>(Map<K, (), P, NoAug>)
where
    K: Key,
    P: Policy<K, ()>;

impl<K, P> Clone for Set<K, P>
where
    K: Key,
    P: Policy<K, ()>,
{
    fn clone(&self) -> Self {
        Set(self.0.clone())
    }
}

impl<K, P> Set<K, P>
where
    K: Key,
    P: Policy<K, ()>,
{
    pub fn new(pool: &SetPool<K, P>) -> Self {
        Set(Map::new(pool))
    }

    pub fn pool(&self) -> &SetPool<K, P> {
        self.0.pool()
    }

    /// build from a batch of elements; duplicates collapse
    pub fn from_elems(pool: &SetPool<K, P>, elems: Vec<K>, sorted: bool) -> Self {
        let elts = elems.into_iter().map(|k| (k, ())).collect();
        Set(Map::from_entries(pool, elts, sorted))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, elem: &K) -> bool {
        self.0.contains_key(elem)
    }

    /// the greatest element strictly below `elem`
    pub fn previous(&self, elem: &K) -> Option<&K> {
        self.0.previous(elem).map(|(k, _)| k)
    }

    /// the least element strictly above `elem`
    pub fn next(&self, elem: &K) -> Option<&K> {
        self.0.next(elem).map(|(k, _)| k)
    }

    /// the number of elements strictly below `elem`
    pub fn rank(&self, elem: &K) -> usize {
        self.0.rank(elem)
    }

    /// the element at position `i` in sorted order
    pub fn select(&self, i: usize) -> Option<&K> {
        self.0.select(i).map(|(k, _)| k)
    }

    /// a snapshot containing `elem`; the flag reports whether it was
    /// already present
    pub fn insert(&self, elem: K) -> (Self, bool) {
        let (m, prev) = self.0.insert(elem, ());
        (Set(m), prev.is_some())
    }

    /// a snapshot without `elem`
    pub fn remove(&self, elem: &K) -> (Self, bool) {
        let (m, prev) = self.0.remove(elem);
        (Set(m), prev.is_some())
    }

    /// insert a batch of elements in O(k log (n/k + 1))
    pub fn insert_many(&self, elems: Vec<K>, sorted: bool) -> Self {
        let elts = elems.into_iter().map(|k| (k, ())).collect();
        Set(self.0.insert_many(elts, sorted))
    }

    pub fn filter<F>(&self, f: F) -> Self
    where
        F: Fn(&K) -> bool + Sync,
    {
        Set(self.0.filter(|k, _| f(k)))
    }

    /// split into the elements below `elem` and above it; the flag reports
    /// whether `elem` itself was present
    pub fn split(&self, elem: &K) -> (Self, bool, Self) {
        let (l, v, r) = self.0.split(elem);
        (Set(l), v.is_some(), Set(r))
    }

    /// the elements with `lo <= elem <= hi`
    pub fn range(&self, lo: &K, hi: &K) -> Self {
        Set(self.0.range(lo, hi))
    }

    pub fn union(self, other: Self) -> Self {
        Set(self.0.union(other.0))
    }

    pub fn intersect(self, other: Self) -> Self {
        Set(self.0.intersect(other.0))
    }

    pub fn difference(self, other: Self) -> Self {
        Set(self.0.difference(other.0))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &K> + ExactSizeIterator + '_ {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn to_vec(&self) -> Vec<K> {
        self.0.to_vec().into_iter().map(|(k, _)| k).collect()
    }

    #[allow(dead_code)]
    pub(crate) fn invariant(&self) {
        self.0.invariant()
    }
}

impl<'a, K, P> IntoIterator for &'a Set<K, P>
where
    K: Key,
    P: Policy<K, ()>,
{
    type Item = &'a K;
    type IntoIter = std::iter::Map<
        crate::map::Iter<'a, K, (), P, NoAug>,
        fn((&'a K, &'a ())) -> &'a K,
    >;

    fn into_iter(self) -> Self::IntoIter {
        let first: fn((&'a K, &'a ())) -> &'a K = |(k, _)| k;
        self.0.iter().map(first)
    }
}

impl<K, P> Debug for Set<K, P>
where
    K: Key + Debug,
    P: Policy<K, ()>,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K, P> PartialEq for Set<K, P>
where
    K: Key,
    P: Policy<K, ()>,
{
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K, P> Eq for Set<K, P>
where
    K: Key,
    P: Policy<K, ()>,
{
}

impl<K, P> PartialOrd for Set<K, P>
where
    K: Key,
    P: Policy<K, ()>,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, P> Ord for Set<K, P>
where
    K: Key,
    P: Policy<K, ()>,
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<K, P> Hash for Set<K, P>
where
    K: Key + Hash,
    P: Policy<K, ()>,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for k in self.iter() {
            k.hash(state);
        }
    }
}
