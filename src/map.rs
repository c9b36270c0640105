use crate::{
    avl::Avl,
    node::{Aug, Key, NoAug, Value},
    pool::NIL,
    tree::TreePool,
    tree::Policy,
};
use arrayvec::ArrayVec;
use rayon::prelude::*;
use std::{
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    mem,
    ops::Index,
};

// enough for any balanced tree addressable by u32 indices; treaps exceed
// their expected depth only with vanishing probability
const MAX_DEPTH: usize = 160;

/// A persistent ordered map. `Clone` is O(1) and yields an independent
/// snapshot sharing structure with the original; all "mutating" methods
/// leave `self` untouched and return a new map. Set algebra methods consume
/// their operands instead, clone first if you still need one.
///
/// Every map lives in a [`TreePool`], and maps may only be combined with
/// maps from the same pool.
pub struct Map<K, V, P = Avl, A = NoAug>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    pool: TreePool<K, V, P, A>,
    root: u32,
}

/// a map carrying a range accumulation `R` over its entries
pub type AugMap<K, V, R, P = Avl> = Map<K, V, P, R>;

impl<K, V, P, A> Clone for Map<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn clone(&self) -> Self {
        self.pool.increase(self.root);
        Map { pool: self.pool.clone(), root: self.root }
    }
}

impl<K, V, P, A> Drop for Map<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn drop(&mut self) {
        self.pool.decrease_recursive(self.root);
    }
}

impl<K, V, P, A> Map<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    /// create an empty map in `pool`
    pub fn new(pool: &TreePool<K, V, P, A>) -> Self {
        Map { pool: pool.clone(), root: NIL }
    }

    fn mk(pool: &TreePool<K, V, P, A>, root: u32) -> Self {
        Map { pool: pool.clone(), root }
    }

    // move the root reference out without running Drop on it
    fn take_root(mut self) -> u32 {
        mem::replace(&mut self.root, NIL)
    }

    pub fn pool(&self) -> &TreePool<K, V, P, A> {
        &self.pool
    }

    /// Build a map from a batch of entries in O(n log n), or O(n) if
    /// `sorted` promises the batch is already sorted by key. Of entries
    /// with equal keys the first wins.
    pub fn from_entries(
        pool: &TreePool<K, V, P, A>,
        mut elts: Vec<(K, V)>,
        sorted: bool,
    ) -> Self {
        if !sorted {
            elts.par_sort_by(|e0, e1| e0.0.cmp(&e1.0));
        }
        elts.dedup_by(|e0, e1| e0.0 == e1.0);
        Self::mk(pool, pool.from_sorted(&elts))
    }

    /// as `from_entries`, but entries with equal keys are folded left to
    /// right with `f(accumulated, new)`
    pub fn from_entries_with<F>(
        pool: &TreePool<K, V, P, A>,
        mut elts: Vec<(K, V)>,
        sorted: bool,
        f: F,
    ) -> Self
    where
        F: Fn(&V, &V) -> V,
    {
        if !sorted {
            elts.par_sort_by(|e0, e1| e0.0.cmp(&e1.0));
        }
        let mut folded: Vec<(K, V)> = Vec::with_capacity(elts.len());
        for (k, v) in elts {
            match folded.last_mut() {
                Some(prev) if prev.0 == k => prev.1 = f(&prev.1, &v),
                _ => folded.push((k, v)),
            }
        }
        Self::mk(pool, pool.from_sorted(&folded))
    }

    pub fn len(&self) -> usize {
        self.pool.size(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    /// lookup the value `key` maps to
    pub fn get(&self, key: &K) -> Option<&V> {
        self.pool.find(self.root, key).map(|t| &self.pool.node(t).value)
    }

    /// lookup the full entry for `key`
    pub fn get_full(&self, key: &K) -> Option<(&K, &V)> {
        self.pool.find(self.root, key).map(|t| {
            let n = self.pool.node(t);
            (&n.key, &n.value)
        })
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.pool.find(self.root, key).is_some()
    }

    /// the entry with the greatest key strictly below `key`
    pub fn previous(&self, key: &K) -> Option<(&K, &V)> {
        self.pool.previous(self.root, key).map(|t| {
            let n = self.pool.node(t);
            (&n.key, &n.value)
        })
    }

    /// the entry with the least key strictly above `key`
    pub fn next(&self, key: &K) -> Option<(&K, &V)> {
        self.pool.next(self.root, key).map(|t| {
            let n = self.pool.node(t);
            (&n.key, &n.value)
        })
    }

    /// the number of entries with keys strictly below `key`
    pub fn rank(&self, key: &K) -> usize {
        self.pool.rank(self.root, key)
    }

    /// the entry at in-order position `i`, O(log n)
    pub fn select(&self, i: usize) -> Option<(&K, &V)> {
        self.pool.select(self.root, i).map(|t| {
            let n = self.pool.node(t);
            (&n.key, &n.value)
        })
    }

    /// a snapshot with `key` bound to `value`, and the value it replaced.
    /// O(log n) time and space.
    pub fn insert(&self, key: K, value: V) -> (Self, Option<V>) {
        self.pool.increase(self.root);
        let (root, prev) = self.pool.insert(self.root, key, value);
        (Self::mk(&self.pool, root), prev)
    }

    /// a snapshot without `key`, and the value it was bound to
    pub fn remove(&self, key: &K) -> (Self, Option<V>) {
        self.pool.increase(self.root);
        let (root, prev) = self.pool.remove(self.root, key);
        (Self::mk(&self.pool, root), prev)
    }

    /// the entries satisfying the predicate; O(n) work, parallel
    pub fn filter<F>(&self, f: F) -> Self
    where
        F: Fn(&K, &V) -> bool + Sync,
    {
        self.pool.increase(self.root);
        Self::mk(&self.pool, self.pool.filter(self.root, &f))
    }

    /// Insert a batch of entries in O(k log (n/k + 1)); keys already present
    /// take the batch's value. Of batch entries with equal keys the first
    /// wins.
    pub fn insert_many(&self, elts: Vec<(K, V)>, sorted: bool) -> Self {
        self.update_many(elts, sorted, |new, _cur| new.clone())
    }

    /// Insert a batch of entries, resolving keys already present with
    /// `f(batch value, current value)`. Batch entries with equal keys are
    /// folded left to right first.
    pub fn update_many<F>(&self, mut elts: Vec<(K, V)>, sorted: bool, f: F) -> Self
    where
        F: Fn(&V, &V) -> V + Sync,
    {
        if !sorted {
            elts.par_sort_by(|e0, e1| e0.0.cmp(&e1.0));
        }
        let mut folded: Vec<(K, V)> = Vec::with_capacity(elts.len());
        for (k, v) in elts {
            match folded.last_mut() {
                Some(prev) if prev.0 == k => prev.1 = f(&prev.1, &v),
                _ => folded.push((k, v)),
            }
        }
        self.pool.increase(self.root);
        let root = self.pool.multi_insert(self.root, &folded, &f);
        Self::mk(&self.pool, root)
    }

    /// split into the entries below `key`, the value at `key`, and the
    /// entries above it
    pub fn split(&self, key: &K) -> (Self, Option<V>, Self) {
        self.pool.increase(self.root);
        let s = self.pool.split(self.root, key);
        (Self::mk(&self.pool, s.left), s.value, Self::mk(&self.pool, s.right))
    }

    /// the entries with `lo <= key <= hi`
    pub fn range(&self, lo: &K, hi: &K) -> Self {
        self.pool.increase(self.root);
        Self::mk(&self.pool, self.pool.range_tree(self.root, lo, hi))
    }

    /// Union, keeping this map's value where a key is bound in both. O(m
    /// log (n/m + 1)) work, parallel.
    pub fn union(self, other: Self) -> Self {
        self.union_with(other, |cur, _other| cur.clone())
    }

    /// union resolving doubly bound keys with `f(self value, other value)`
    pub fn union_with<F>(self, other: Self, f: F) -> Self
    where
        F: Fn(&V, &V) -> V + Sync,
    {
        debug_assert!(self.pool.same_pool(&other.pool));
        let pool = self.pool.clone();
        let root = pool.union(self.take_root(), other.take_root(), &f);
        Self::mk(&pool, root)
    }

    /// intersection, keeping this map's values
    pub fn intersect(self, other: Self) -> Self {
        self.intersect_with(other, |cur, _other| cur.clone())
    }

    /// intersection resolving values with `f(self value, other value)`
    pub fn intersect_with<F>(self, other: Self, f: F) -> Self
    where
        F: Fn(&V, &V) -> V + Sync,
    {
        debug_assert!(self.pool.same_pool(&other.pool));
        let pool = self.pool.clone();
        let root = pool.intersect(self.take_root(), other.take_root(), &f);
        Self::mk(&pool, root)
    }

    /// the entries of this map whose keys are not bound in `other`
    pub fn difference(self, other: Self) -> Self {
        debug_assert!(self.pool.same_pool(&other.pool));
        let pool = self.pool.clone();
        let root = pool.difference(self.take_root(), other.take_root());
        Self::mk(&pool, root)
    }

    /// the accumulation over every entry
    pub fn aggregate(&self) -> A::Value {
        self.pool.aggregate(self.root)
    }

    /// the accumulation over entries with keys strictly below `key`
    pub fn aggregate_left_of(&self, key: &K) -> A::Value {
        self.pool.agg_below(self.root, key, false)
    }

    /// the accumulation over entries with keys strictly above `key`
    pub fn aggregate_right_of(&self, key: &K) -> A::Value {
        self.pool.agg_above(self.root, key, false)
    }

    /// the accumulation over entries with `lo <= key <= hi`
    pub fn aggregate_range(&self, lo: &K, hi: &K) -> A::Value {
        self.pool.agg_range(self.root, lo, hi)
    }

    pub fn iter(&self) -> Iter<'_, K, V, P, A> {
        Iter::new(&self.pool, self.root)
    }

    /// the entries in key order
    pub fn to_vec(&self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len());
        self.pool.collect_into(self.root, &mut out);
        out
    }

    #[allow(dead_code)]
    pub(crate) fn invariant(&self) {
        let n = self.pool.check_structure(self.root);
        assert_eq!(n, self.len());
    }
}

pub struct Iter<'a, K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    pool: &'a TreePool<K, V, P, A>,
    front: ArrayVec<u32, MAX_DEPTH>,
    back: ArrayVec<u32, MAX_DEPTH>,
    remaining: usize,
}

impl<'a, K, V, P, A> Iter<'a, K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn new(pool: &'a TreePool<K, V, P, A>, root: u32) -> Self {
        let mut t = Iter {
            pool,
            front: ArrayVec::new(),
            back: ArrayVec::new(),
            remaining: pool.size(root),
        };
        t.push_left(root);
        t.push_right(root);
        t
    }

    fn push_left(&mut self, mut t: u32) {
        while t != NIL {
            self.front.push(t);
            t = self.pool.node(t).left;
        }
    }

    fn push_right(&mut self, mut t: u32) {
        while t != NIL {
            self.back.push(t);
            t = self.pool.node(t).right;
        }
    }
}

impl<'a, K, V, P, A> Iterator for Iter<'a, K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let pool = self.pool;
        let t = self.front.pop()?;
        let n = pool.node(t);
        self.push_left(n.right);
        Some((&n.key, &n.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V, P, A> DoubleEndedIterator for Iter<'a, K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let pool = self.pool;
        let t = self.back.pop()?;
        let n = pool.node(t);
        self.push_right(n.left);
        Some((&n.key, &n.value))
    }
}

impl<'a, K, V, P, A> ExactSizeIterator for Iter<'a, K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
}

impl<'a, K, V, P, A> IntoIterator for &'a Map<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, P, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, P, A> Debug for Map<K, V, P, A>
where
    K: Key + Debug,
    V: Value + Debug,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, P, A> PartialEq for Map<K, V, P, A>
where
    K: Key,
    V: Value + PartialEq,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K, V, P, A> Eq for Map<K, V, P, A>
where
    K: Key,
    V: Value + Eq,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
}

impl<K, V, P, A> PartialOrd for Map<K, V, P, A>
where
    K: Key,
    V: Value + PartialOrd,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<K, V, P, A> Ord for Map<K, V, P, A>
where
    K: Key,
    V: Value + Ord,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<K, V, P, A> Hash for Map<K, V, P, A>
where
    K: Key + Hash,
    V: Value + Hash,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for e in self.iter() {
            e.hash(state);
        }
    }
}

impl<K, V, P, A> Index<&K> for Map<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    type Output = V;

    fn index(&self, key: &K) -> &V {
        self.get(key).expect("key not found")
    }
}
