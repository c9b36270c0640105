use crate::{
    avl::Avl,
    node::{Aug, Key, NoAug, Node, Value},
    pool::{RawPool, NIL},
};
use std::{
    cmp::Ordering,
    fmt::Debug,
    sync::{
        atomic::{
            fence,
            Ordering::{Acquire, Relaxed, Release},
        },
        Arc,
    },
};

// subtrees smaller than this are processed sequentially in the calling task
pub(crate) const PAR_GRAIN: usize = 150;

/// A balancing scheme, chosen at compile time. Implementations carry a per
/// node metric in `Data` and know how to rebuild a balanced tree out of two
/// balanced trees and a separating pivot. Everything else (split, union,
/// filter, ...) is derived from `join3` in [`TreePool`].
pub trait Policy<K: Key, V: Value>: Sized + Send + Sync + 'static {
    type Data: Copy + Send + Sync + Debug;

    /// metric seed for a freshly allocated node; anything derived from the
    /// children is recomputed by `refresh` before the node is ever read
    fn fresh_data() -> Self::Data;

    /// recompute the metric from the current children. `data` is the node's
    /// previous metric, so creation-time state (a treap priority, a node
    /// color) survives child updates.
    fn refresh<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        data: Self::Data,
        left: u32,
        right: u32,
    ) -> Self::Data;

    /// Build a balanced tree from `left`, `pivot`, and `right`, where every
    /// key in `left` orders below `pivot` and every key in `right` above it.
    /// Consumes one reference to each argument; `pivot`'s stale child links
    /// are overwritten, never read.
    fn join3<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        left: u32,
        right: u32,
        pivot: u32,
    ) -> u32;

    /// does the local balance invariant hold at `node`
    fn balanced<A: Aug<K, V>>(pool: &TreePool<K, V, Self, A>, node: u32) -> bool;
}

pub(crate) struct Split<V> {
    pub(crate) left: u32,
    pub(crate) right: u32,
    pub(crate) value: Option<V>,
}

/// The allocation context every map and set lives in. Handles are cheap to
/// clone and share one slab pool; independent pools never interfere, so tests
/// and subsystems can each keep their own. Trees from different pools must
/// never be mixed (checked by debug assertion on the facade).
pub struct TreePool<K, V, P = Avl, A = NoAug>(pub(crate) Arc<RawPool<Node<K, V, P, A>>>)
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>;

impl<K, V, P, A> Clone for TreePool<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn clone(&self) -> Self {
        TreePool(Arc::clone(&self.0))
    }
}

impl<K, V, P, A> TreePool<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    pub fn new() -> Self {
        Self::with_capacity(crate::pool::DEFAULT_CAPACITY)
    }

    /// create a pool with at least `capacity` node slots preallocated
    pub fn with_capacity(capacity: usize) -> Self {
        TreePool(Arc::new(RawPool::new(capacity)))
    }

    /// preallocate room for `extra` more nodes
    pub fn reserve(&self, extra: usize) {
        self.0.reserve(extra)
    }

    /// total node slots backed by memory
    pub fn allocated(&self) -> usize {
        self.0.allocated()
    }

    /// nodes currently reachable from some live tree
    pub fn in_use(&self) -> usize {
        self.0.in_use()
    }

    pub(crate) fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn node(&self, t: u32) -> &Node<K, V, P, A> {
        self.0.get(t)
    }

    // exclusive access; only legal on nodes no other reference can see
    pub(crate) fn node_mut(&self, t: u32) -> &mut Node<K, V, P, A> {
        debug_assert_eq!(self.node(t).refs.load(Relaxed), 1);
        unsafe { self.0.get_mut(t) }
    }

    pub(crate) fn size(&self, t: u32) -> usize {
        if t == NIL {
            0
        } else {
            self.node(t).size as usize
        }
    }

    /// recompute size, metric and accumulation from the current children
    pub(crate) fn update(&self, t: u32) {
        let (l, r, data) = {
            let n = self.node(t);
            (n.left, n.right, n.data)
        };
        let size = (1 + self.size(l) + self.size(r)) as u32;
        let data = P::refresh(self, data, l, r);
        let aug = {
            let n = self.node(t);
            let mut a = A::from_entry(&n.key, &n.value);
            if l != NIL {
                a = A::combine(a, self.node(l).aug.clone());
            }
            if r != NIL {
                a = A::combine(a, self.node(r).aug.clone());
            }
            a
        };
        let n = self.node_mut(t);
        n.size = size;
        n.data = data;
        n.aug = aug;
    }

    pub(crate) fn mk_node(&self, key: K, value: V) -> u32 {
        let t = self.0.alloc(Node::leaf(key, value, P::fresh_data()));
        self.update(t);
        t
    }

    // structural copy; the clone starts with one reference and takes shared
    // ownership of both children
    pub(crate) fn copy_node(&self, t: u32) -> u32 {
        let n = self.node(t);
        self.increase(n.left);
        self.increase(n.right);
        self.0.alloc(Node {
            key: n.key.clone(),
            value: n.value.clone(),
            left: n.left,
            right: n.right,
            size: n.size,
            refs: std::sync::atomic::AtomicU32::new(1),
            data: n.data,
            aug: n.aug.clone(),
        })
    }

    /// A uniquely owned version of `t` that is safe to mutate in place. If
    /// `t` is shared it is cloned and the caller's reference released.
    pub(crate) fn copy_if_needed(&self, t: u32) -> u32 {
        if self.node(t).refs.load(Acquire) > 1 {
            let c = self.copy_node(t);
            self.decrease_recursive(t);
            c
        } else {
            t
        }
    }

    pub(crate) fn increase(&self, t: u32) {
        if t != NIL {
            self.node(t).refs.fetch_add(1, Relaxed);
        }
    }

    /// Drop one reference to `t` without touching its children (used where
    /// child ownership has already been transferred elsewhere). Returns true
    /// if this was the last reference and the node was reclaimed.
    pub(crate) fn decrease(&self, t: u32) -> bool {
        if t == NIL {
            return false;
        }
        if self.node(t).refs.fetch_sub(1, Release) == 1 {
            fence(Acquire);
            self.0.free(t);
            true
        } else {
            false
        }
    }

    /// drop one reference to the whole subtree, reclaiming in parallel when
    /// the subtree is large enough to be worth forking for
    pub(crate) fn decrease_recursive(&self, t: u32) {
        if t == NIL {
            return;
        }
        let (l, r, big) = {
            let n = self.node(t);
            (n.left, n.right, n.size as usize >= PAR_GRAIN)
        };
        if self.decrease(t) {
            if big {
                rayon::join(|| self.decrease_recursive(l), || self.decrease_recursive(r));
            } else {
                self.decrease_recursive(l);
                self.decrease_recursive(r);
            }
        }
    }

    fn fork<L, R>(&self, parallel: bool, l: L, r: R) -> (u32, u32)
    where
        L: FnOnce() -> u32 + Send,
        R: FnOnce() -> u32 + Send,
    {
        if parallel {
            rayon::join(l, r)
        } else {
            (l(), r())
        }
    }

    // rotations mutate `t` in place, so `t` must be uniquely owned; the
    // child being lifted may still be shared and is cloned on demand

    pub(crate) fn rotate_right(&self, t: u32) -> u32 {
        let l = self.copy_if_needed(self.node(t).left);
        let lr = self.node(l).right;
        self.node_mut(t).left = lr;
        self.node_mut(l).right = t;
        self.update(t);
        self.update(l);
        l
    }

    pub(crate) fn rotate_left(&self, t: u32) -> u32 {
        let r = self.copy_if_needed(self.node(t).right);
        let rl = self.node(r).left;
        self.node_mut(t).right = rl;
        self.node_mut(r).left = t;
        self.update(t);
        self.update(r);
        r
    }

    pub(crate) fn double_rotate_right(&self, t: u32) -> u32 {
        let l = self.copy_if_needed(self.node(t).left);
        let nl = self.rotate_left(l);
        self.node_mut(t).left = nl;
        self.rotate_right(t)
    }

    pub(crate) fn double_rotate_left(&self, t: u32) -> u32 {
        let r = self.copy_if_needed(self.node(t).right);
        let nr = self.rotate_right(r);
        self.node_mut(t).right = nr;
        self.rotate_left(t)
    }

    /// Split `t` around `key` into the tree of smaller entries, the tree of
    /// larger entries, and the value bound to `key` if present. Consumes one
    /// reference to `t`; the returned trees are balanced.
    pub(crate) fn split(&self, t: u32, key: &K) -> Split<V> {
        if t == NIL {
            return Split { left: NIL, right: NIL, value: None };
        }
        let join = self.copy_if_needed(t);
        let (l, r) = {
            let n = self.node(join);
            (n.left, n.right)
        };
        match key.cmp(&self.node(join).key) {
            Ordering::Less => {
                let s = self.split(l, key);
                Split {
                    left: s.left,
                    right: P::join3(self, s.right, r, join),
                    value: s.value,
                }
            }
            Ordering::Greater => {
                let s = self.split(r, key);
                Split {
                    left: P::join3(self, l, s.left, join),
                    right: s.right,
                    value: s.value,
                }
            }
            Ordering::Equal => {
                let value = Some(self.node(join).value.clone());
                // child ownership transfers to the two result trees
                self.decrease(join);
                Split { left: l, right: r, value }
            }
        }
    }

    // detach the greatest entry of `t` as a standalone pivot node
    fn split_last(&self, t: u32) -> (u32, u32) {
        let pivot = self.copy_if_needed(t);
        let (l, r) = {
            let n = self.node(pivot);
            (n.left, n.right)
        };
        if r == NIL {
            // the pivot keeps a stale left link; join3 overwrites it
            return (l, pivot);
        }
        let (rest, last) = self.split_last(r);
        (P::join3(self, l, rest, pivot), last)
    }

    /// concatenate two trees whose key ranges are already disjoint and ordered
    pub(crate) fn join2(&self, t1: u32, t2: u32) -> u32 {
        if t1 == NIL {
            return t2;
        }
        if t2 == NIL {
            return t1;
        }
        let (rest, pivot) = self.split_last(t1);
        P::join3(self, rest, t2, pivot)
    }

    /// Union consuming both operands. Where a key is bound on both sides the
    /// result keeps `f(left value, right value)`.
    pub(crate) fn union<F>(&self, t1: u32, t2: u32, f: &F) -> u32
    where
        F: Fn(&V, &V) -> V + Sync,
    {
        if t1 == NIL {
            return t2;
        }
        if t2 == NIL {
            return t1;
        }
        let parallel = self.size(t1).min(self.size(t2)) >= PAR_GRAIN;
        let join = self.copy_if_needed(t2);
        let (l2, r2) = {
            let n = self.node(join);
            (n.left, n.right)
        };
        let s = self.split(t1, &self.node(join).key);
        if let Some(v1) = s.value.as_ref() {
            let v = f(v1, &self.node(join).value);
            self.node_mut(join).value = v;
        }
        let (left, right) = self.fork(
            parallel,
            || self.union(s.left, l2, f),
            || self.union(s.right, r2, f),
        );
        P::join3(self, left, right, join)
    }

    /// intersection consuming both operands, keeping `f(left, right)` values
    pub(crate) fn intersect<F>(&self, t1: u32, t2: u32, f: &F) -> u32
    where
        F: Fn(&V, &V) -> V + Sync,
    {
        if t1 == NIL {
            self.decrease_recursive(t2);
            return NIL;
        }
        if t2 == NIL {
            self.decrease_recursive(t1);
            return NIL;
        }
        let parallel = self.size(t1).min(self.size(t2)) >= PAR_GRAIN;
        let join = self.copy_if_needed(t2);
        let (l2, r2) = {
            let n = self.node(join);
            (n.left, n.right)
        };
        let s = self.split(t1, &self.node(join).key);
        let (left, right) = self.fork(
            parallel,
            || self.intersect(s.left, l2, f),
            || self.intersect(s.right, r2, f),
        );
        match s.value {
            Some(v1) => {
                let v = f(&v1, &self.node(join).value);
                self.node_mut(join).value = v;
                P::join3(self, left, right, join)
            }
            None => {
                // children were consumed by the recursions above
                self.decrease(join);
                self.join2(left, right)
            }
        }
    }

    /// entries of `t1` whose keys are not bound in `t2`, consuming both
    pub(crate) fn difference(&self, t1: u32, t2: u32) -> u32 {
        if t1 == NIL {
            self.decrease_recursive(t2);
            return NIL;
        }
        if t2 == NIL {
            return t1;
        }
        let parallel = self.size(t1).min(self.size(t2)) >= PAR_GRAIN;
        let join = self.copy_if_needed(t1);
        let (l1, r1) = {
            let n = self.node(join);
            (n.left, n.right)
        };
        let s = self.split(t2, &self.node(join).key);
        let (left, right) = self.fork(
            parallel,
            || self.difference(l1, s.left),
            || self.difference(r1, s.right),
        );
        if s.value.is_some() {
            self.decrease(join);
            self.join2(left, right)
        } else {
            P::join3(self, left, right, join)
        }
    }

    /// entries satisfying the predicate, consuming the operand
    pub(crate) fn filter<F>(&self, t: u32, f: &F) -> u32
    where
        F: Fn(&K, &V) -> bool + Sync,
    {
        if t == NIL {
            return NIL;
        }
        let parallel = self.size(t) >= PAR_GRAIN;
        let keep = {
            let n = self.node(t);
            f(&n.key, &n.value)
        };
        let join = self.copy_if_needed(t);
        let (l, r) = {
            let n = self.node(join);
            (n.left, n.right)
        };
        let (left, right) =
            self.fork(parallel, || self.filter(l, f), || self.filter(r, f));
        if keep {
            P::join3(self, left, right, join)
        } else {
            self.decrease(join);
            self.join2(left, right)
        }
    }

    /// build from entries sorted by key with no duplicates; O(n) work,
    /// O(log n) depth
    pub(crate) fn from_sorted(&self, a: &[(K, V)]) -> u32 {
        if a.is_empty() {
            return NIL;
        }
        let mid = a.len() / 2;
        let (l, r) = self.fork(
            a.len() >= PAR_GRAIN,
            || self.from_sorted(&a[..mid]),
            || self.from_sorted(&a[mid + 1..]),
        );
        let pivot = self.mk_node(a[mid].0.clone(), a[mid].1.clone());
        P::join3(self, l, r, pivot)
    }

    /// Insert a sorted duplicate-free batch, consuming one reference to `t`.
    /// Keys bound on both sides keep `f(batch value, tree value)`.
    pub(crate) fn multi_insert<F>(&self, t: u32, a: &[(K, V)], f: &F) -> u32
    where
        F: Fn(&V, &V) -> V + Sync,
    {
        if t == NIL {
            return self.from_sorted(a);
        }
        if a.is_empty() {
            return t;
        }
        let parallel = self.size(t).min(a.len()) >= PAR_GRAIN;
        let join = self.copy_if_needed(t);
        let (l, r) = {
            let n = self.node(join);
            (n.left, n.right)
        };
        let (mid, dup) = {
            let key = &self.node(join).key;
            let mid = a.partition_point(|(k, _)| k < key);
            (mid, a.get(mid).map_or(false, |(k, _)| k == key))
        };
        if dup {
            let v = f(&a[mid].1, &self.node(join).value);
            self.node_mut(join).value = v;
        }
        let (left, right) = self.fork(
            parallel,
            || self.multi_insert(l, &a[..mid], f),
            || self.multi_insert(r, &a[mid + dup as usize..], f),
        );
        P::join3(self, left, right, join)
    }

    /// persistent single key insert; returns the new root and the value the
    /// key was previously bound to
    pub(crate) fn insert(&self, t: u32, key: K, value: V) -> (u32, Option<V>) {
        let s = self.split(t, &key);
        let pivot = self.mk_node(key, value);
        (P::join3(self, s.left, s.right, pivot), s.value)
    }

    /// persistent single key removal
    pub(crate) fn remove(&self, t: u32, key: &K) -> (u32, Option<V>) {
        let s = self.split(t, key);
        (self.join2(s.left, s.right), s.value)
    }

    /// the subtree of entries with `lo <= key <= hi`, consuming `t`
    pub(crate) fn range_tree(&self, t: u32, lo: &K, hi: &K) -> u32 {
        let ls = self.split(t, lo);
        self.decrease_recursive(ls.left);
        let rs = self.split(ls.right, hi);
        self.decrease_recursive(rs.right);
        let mut ret = rs.left;
        if let Some(v) = ls.value {
            ret = self.insert(ret, lo.clone(), v).0;
        }
        if let Some(v) = rs.value {
            ret = self.insert(ret, hi.clone(), v).0;
        }
        ret
    }

    pub(crate) fn find(&self, mut t: u32, key: &K) -> Option<u32> {
        while t != NIL {
            let n = self.node(t);
            match key.cmp(&n.key) {
                Ordering::Less => t = n.left,
                Ordering::Greater => t = n.right,
                Ordering::Equal => return Some(t),
            }
        }
        None
    }

    /// the entry with the greatest key strictly below `key`
    pub(crate) fn previous(&self, mut t: u32, key: &K) -> Option<u32> {
        let mut best = None;
        while t != NIL {
            let n = self.node(t);
            if n.key < *key {
                best = Some(t);
                t = n.right;
            } else {
                t = n.left;
            }
        }
        best
    }

    /// the entry with the least key strictly above `key`
    pub(crate) fn next(&self, mut t: u32, key: &K) -> Option<u32> {
        let mut best = None;
        while t != NIL {
            let n = self.node(t);
            if n.key > *key {
                best = Some(t);
                t = n.left;
            } else {
                t = n.right;
            }
        }
        best
    }

    /// the number of entries with keys strictly below `key`
    pub(crate) fn rank(&self, mut t: u32, key: &K) -> usize {
        let mut below = 0;
        while t != NIL {
            let n = self.node(t);
            match key.cmp(&n.key) {
                Ordering::Less | Ordering::Equal => {
                    if *key == n.key {
                        return below + self.size(n.left);
                    }
                    t = n.left;
                }
                Ordering::Greater => {
                    below += self.size(n.left) + 1;
                    t = n.right;
                }
            }
        }
        below
    }

    /// the entry at in-order position `i` (zero based)
    pub(crate) fn select(&self, mut t: u32, mut i: usize) -> Option<u32> {
        while t != NIL {
            let n = self.node(t);
            let ls = self.size(n.left);
            match i.cmp(&ls) {
                Ordering::Less => t = n.left,
                Ordering::Equal => return Some(t),
                Ordering::Greater => {
                    i -= ls + 1;
                    t = n.right;
                }
            }
        }
        None
    }

    pub(crate) fn aggregate(&self, t: u32) -> A::Value {
        if t == NIL {
            A::empty()
        } else {
            self.node(t).aug.clone()
        }
    }

    /// accumulate entries with keys below `key`, consuming whole cached
    /// subtree accumulations along one root-to-leaf path
    pub(crate) fn agg_below(&self, mut t: u32, key: &K, inclusive: bool) -> A::Value {
        let mut ret = A::empty();
        while t != NIL {
            let n = self.node(t);
            let include = match n.key.cmp(key) {
                Ordering::Less => true,
                Ordering::Equal => inclusive,
                Ordering::Greater => false,
            };
            if include {
                if n.left != NIL {
                    ret = A::combine(ret, self.node(n.left).aug.clone());
                }
                ret = A::combine(ret, A::from_entry(&n.key, &n.value));
                t = n.right;
            } else {
                t = n.left;
            }
        }
        ret
    }

    /// accumulate entries with keys above `key`
    pub(crate) fn agg_above(&self, mut t: u32, key: &K, inclusive: bool) -> A::Value {
        let mut ret = A::empty();
        while t != NIL {
            let n = self.node(t);
            let include = match n.key.cmp(key) {
                Ordering::Greater => true,
                Ordering::Equal => inclusive,
                Ordering::Less => false,
            };
            if include {
                ret = A::combine(A::from_entry(&n.key, &n.value), ret);
                if n.right != NIL {
                    ret = A::combine(self.node(n.right).aug.clone(), ret);
                }
                t = n.left;
            } else {
                t = n.right;
            }
        }
        ret
    }

    /// accumulate entries with `lo <= key <= hi`
    pub(crate) fn agg_range(&self, mut t: u32, lo: &K, hi: &K) -> A::Value {
        while t != NIL {
            let n = self.node(t);
            if n.key < *lo {
                t = n.right;
                continue;
            }
            if *hi < n.key {
                t = n.left;
                continue;
            }
            // the root key is inside the range; both bounds resolve in the
            // two separate subtrees below it
            let left = self.agg_above(n.left, lo, true);
            let right = self.agg_below(n.right, hi, true);
            let mid = A::combine(left, A::from_entry(&n.key, &n.value));
            return A::combine(mid, right);
        }
        A::empty()
    }

    /// sequential in-order extraction
    pub(crate) fn collect_into(&self, t: u32, out: &mut Vec<(K, V)>) {
        if t == NIL {
            return;
        }
        let n = self.node(t);
        self.collect_into(n.left, out);
        out.push((n.key.clone(), n.value.clone()));
        self.collect_into(n.right, out);
    }

    /// validate BST order, sizes, refcounts and the balance invariant over
    /// the whole subtree; panics on any violation, returns the size
    #[allow(dead_code)]
    pub(crate) fn check_structure(&self, t: u32) -> usize {
        self.check_node(t, None, None)
    }

    #[allow(dead_code)]
    fn check_node(&self, t: u32, lo: Option<&K>, hi: Option<&K>) -> usize {
        if t == NIL {
            return 0;
        }
        let n = self.node(t);
        assert!(n.refs.load(Relaxed) >= 1);
        if let Some(lo) = lo {
            assert!(*lo < n.key, "key order violated");
        }
        if let Some(hi) = hi {
            assert!(n.key < *hi, "key order violated");
        }
        assert!(P::balanced(self, t), "balance violated: {:?}", n.data);
        let ls = self.check_node(n.left, lo, Some(&n.key));
        let rs = self.check_node(n.right, Some(&n.key), hi);
        assert_eq!(n.size as usize, 1 + ls + rs, "cached size wrong");
        1 + ls + rs
    }
}

impl<K, V, P, A> Default for TreePool<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    fn default() -> Self {
        Self::new()
    }
}
