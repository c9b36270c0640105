use rand::Rng;

use crate::{
    node::{Aug, Key, Value},
    pool::NIL,
    tree::{Policy, TreePool},
};

/// Treaps. Each node draws a random priority at creation which every copy
/// preserves, and the tree is a heap on priorities; join places the highest
/// priority at the root and needs no repair step afterwards.
pub struct Treap;

fn priority<K, V, A>(pool: &TreePool<K, V, Treap, A>, t: u32) -> Option<u64>
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    if t == NIL {
        None
    } else {
        Some(pool.node(t).data)
    }
}

// does t1's root outrank t2's for the root position
fn outranks<K, V, A>(pool: &TreePool<K, V, Treap, A>, t1: u32, t2: u32) -> bool
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    match (priority(pool, t1), priority(pool, t2)) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(p1), Some(p2)) => p1 >= p2,
    }
}

impl<K: Key, V: Value> Policy<K, V> for Treap {
    type Data = u64;

    fn fresh_data() -> u64 {
        rand::thread_rng().gen()
    }

    fn refresh<A: Aug<K, V>>(
        _pool: &TreePool<K, V, Self, A>,
        data: u64,
        _left: u32,
        _right: u32,
    ) -> u64 {
        data
    }

    fn join3<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        left: u32,
        right: u32,
        pivot: u32,
    ) -> u32 {
        if outranks(pool, pivot, left) && outranks(pool, pivot, right) {
            let p = pool.node_mut(pivot);
            p.left = left;
            p.right = right;
            pool.update(pivot);
            pivot
        } else if outranks(pool, left, right) {
            let t = pool.copy_if_needed(left);
            let rc = pool.node(t).right;
            let nr = Self::join3(pool, rc, right, pivot);
            pool.node_mut(t).right = nr;
            pool.update(t);
            t
        } else {
            let t = pool.copy_if_needed(right);
            let lc = pool.node(t).left;
            let nl = Self::join3(pool, left, lc, pivot);
            pool.node_mut(t).left = nl;
            pool.update(t);
            t
        }
    }

    fn balanced<A: Aug<K, V>>(pool: &TreePool<K, V, Self, A>, t: u32) -> bool {
        let n = pool.node(t);
        outranks(pool, t, n.left) && outranks(pool, t, n.right)
    }
}
