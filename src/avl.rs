use crate::{
    node::{Aug, Key, Value},
    pool::NIL,
    tree::{Policy, TreePool},
};

/// Height balanced trees. The default policy; the best all-rounder for
/// lookup heavy workloads.
pub struct Avl;

fn height<K, V, A>(pool: &TreePool<K, V, Avl, A>, t: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    if t == NIL {
        0
    } else {
        pool.node(t).data
    }
}

fn too_heavy(h1: u32, h2: u32) -> bool {
    h1 > h2 + 1
}

// restore the height invariant at `t` after one child grew; `t` must be
// uniquely owned
fn rebalance<K, V, A>(pool: &TreePool<K, V, Avl, A>, t: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    let (l, r) = {
        let n = pool.node(t);
        (n.left, n.right)
    };
    let (hl, hr) = (height(pool, l), height(pool, r));
    if too_heavy(hl, hr) {
        let single = {
            let n = pool.node(l);
            height(pool, n.left) >= height(pool, n.right)
        };
        if single {
            pool.rotate_right(t)
        } else {
            pool.double_rotate_right(t)
        }
    } else if too_heavy(hr, hl) {
        let single = {
            let n = pool.node(r);
            height(pool, n.right) >= height(pool, n.left)
        };
        if single {
            pool.rotate_left(t)
        } else {
            pool.double_rotate_left(t)
        }
    } else {
        t
    }
}

impl<K: Key, V: Value> Policy<K, V> for Avl {
    type Data = u32;

    fn fresh_data() -> u32 {
        1
    }

    fn refresh<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        _data: u32,
        left: u32,
        right: u32,
    ) -> u32 {
        1 + height(pool, left).max(height(pool, right))
    }

    fn join3<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        left: u32,
        right: u32,
        pivot: u32,
    ) -> u32 {
        let (hl, hr) = (height(pool, left), height(pool, right));
        if too_heavy(hl, hr) {
            let t = pool.copy_if_needed(left);
            let rc = pool.node(t).right;
            let nr = Self::join3(pool, rc, right, pivot);
            pool.node_mut(t).right = nr;
            pool.update(t);
            rebalance(pool, t)
        } else if too_heavy(hr, hl) {
            let t = pool.copy_if_needed(right);
            let lc = pool.node(t).left;
            let nl = Self::join3(pool, left, lc, pivot);
            pool.node_mut(t).left = nl;
            pool.update(t);
            rebalance(pool, t)
        } else {
            let p = pool.node_mut(pivot);
            p.left = left;
            p.right = right;
            pool.update(pivot);
            pivot
        }
    }

    fn balanced<A: Aug<K, V>>(pool: &TreePool<K, V, Self, A>, t: u32) -> bool {
        let n = pool.node(t);
        let (hl, hr) = (height(pool, n.left), height(pool, n.right));
        !too_heavy(hl, hr) && !too_heavy(hr, hl) && n.data == 1 + hl.max(hr)
    }
}
