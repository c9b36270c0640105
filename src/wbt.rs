use crate::{
    node::{Aug, Key, Value},
    pool::NIL,
    tree::{Policy, TreePool},
};

/// Weight balanced trees. The weight of an empty subtree is 1, so a node's
/// weight is one more than its size; balance is the alpha bound on the ratio
/// of either child's weight to the parent's.
pub struct Wbt;

const ALPHA: f64 = 0.29;
// a single rotation suffices while the inner grandchild carries at most
// this share of the lifted child's weight
const BETA: f64 = (1.0 - 2.0 * ALPHA) / (1.0 - ALPHA);

fn weight<K, V, A>(pool: &TreePool<K, V, Wbt, A>, t: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    if t == NIL {
        1
    } else {
        pool.node(t).data
    }
}

fn too_heavy(w1: u32, w2: u32) -> bool {
    ALPHA * w1 as f64 > (1.0 - ALPHA) * w2 as f64
}

// `child` is the heavy child about to be lifted; `inner_right` selects which
// of its children ends up as the inner grandchild
fn single_rotation<K, V, A>(pool: &TreePool<K, V, Wbt, A>, child: u32, inner_right: bool) -> bool
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    let n = pool.node(child);
    let inner = if inner_right {
        weight(pool, n.right)
    } else {
        weight(pool, n.left)
    };
    inner as f64 <= BETA * weight(pool, child) as f64
}

fn rebalance<K, V, A>(pool: &TreePool<K, V, Wbt, A>, t: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    let (l, r) = {
        let n = pool.node(t);
        (n.left, n.right)
    };
    let (wl, wr) = (weight(pool, l), weight(pool, r));
    if too_heavy(wl, wr) {
        if single_rotation(pool, l, true) {
            pool.rotate_right(t)
        } else {
            pool.double_rotate_right(t)
        }
    } else if too_heavy(wr, wl) {
        if single_rotation(pool, r, false) {
            pool.rotate_left(t)
        } else {
            pool.double_rotate_left(t)
        }
    } else {
        t
    }
}

impl<K: Key, V: Value> Policy<K, V> for Wbt {
    type Data = u32;

    fn fresh_data() -> u32 {
        2
    }

    fn refresh<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        _data: u32,
        left: u32,
        right: u32,
    ) -> u32 {
        weight(pool, left) + weight(pool, right)
    }

    fn join3<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        left: u32,
        right: u32,
        pivot: u32,
    ) -> u32 {
        let (wl, wr) = (weight(pool, left), weight(pool, right));
        if too_heavy(wl, wr) {
            let t = pool.copy_if_needed(left);
            let rc = pool.node(t).right;
            let nr = Self::join3(pool, rc, right, pivot);
            pool.node_mut(t).right = nr;
            pool.update(t);
            rebalance(pool, t)
        } else if too_heavy(wr, wl) {
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
        let (wl, wr) = (weight(pool, n.left), weight(pool, n.right));
        !too_heavy(wl, wr) && !too_heavy(wr, wl) && n.data == wl + wr
    }
}
