use crate::{
    node::{Aug, Key, Value},
    pool::NIL,
    tree::{Policy, TreePool},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

/// color and black height (an empty subtree counts 1)
#[derive(Clone, Copy, Debug)]
pub struct RbData {
    pub(crate) color: Color,
    pub(crate) height: u32,
}

/// Red black trees. Join blackens both roots, descends the spine of the
/// taller side until the black heights meet, attaches the pivot red, and
/// resolves red-red pairs on the way back up.
pub struct Rbt;

fn color<K, V, A>(pool: &TreePool<K, V, Rbt, A>, t: u32) -> Color
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    if t == NIL {
        Color::Black
    } else {
        pool.node(t).data.color
    }
}

fn height<K, V, A>(pool: &TreePool<K, V, Rbt, A>, t: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    if t == NIL {
        1
    } else {
        pool.node(t).data.height
    }
}

// a uniquely owned black version of `t`
fn blacken<K, V, A>(pool: &TreePool<K, V, Rbt, A>, t: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    if t == NIL || color(pool, t) == Color::Black {
        return t;
    }
    let t = pool.copy_if_needed(t);
    let h = pool.node(t).data.height;
    pool.node_mut(t).data = RbData { color: Color::Black, height: h + 1 };
    t
}

fn rebalance_right<K, V, A>(pool: &TreePool<K, V, Rbt, A>, t: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    let r = pool.node(t).right;
    if color(pool, t) == Color::Red && color(pool, r) == Color::Red {
        // push the red pair down to one red child under a black root; the
        // caller recomputes the height
        pool.node_mut(t).data.color = Color::Black;
        return t;
    }
    if color(pool, t) == Color::Black
        && color(pool, r) == Color::Black
        && height(pool, t) == height(pool, r)
    {
        let tmp = pool.rotate_left(t);
        pool.node_mut(tmp).data.color = Color::Red;
        let rc = pool.copy_if_needed(pool.node(tmp).right);
        pool.node_mut(tmp).right = rc;
        pool.node_mut(rc).data.color = Color::Black;
        pool.update(rc);
        return tmp;
    }
    t
}

fn rebalance_left<K, V, A>(pool: &TreePool<K, V, Rbt, A>, t: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    let l = pool.node(t).left;
    if color(pool, t) == Color::Red && color(pool, l) == Color::Red {
        pool.node_mut(t).data.color = Color::Black;
        return t;
    }
    if color(pool, t) == Color::Black
        && color(pool, l) == Color::Black
        && height(pool, t) == height(pool, l)
    {
        let tmp = pool.rotate_right(t);
        pool.node_mut(tmp).data.color = Color::Red;
        let lc = pool.copy_if_needed(pool.node(tmp).left);
        pool.node_mut(tmp).left = lc;
        pool.node_mut(lc).data.color = Color::Black;
        pool.update(lc);
        return tmp;
    }
    t
}

// t1 is the taller side; descend its right spine until the black heights
// meet at a black node, then attach the pivot red
fn join_right<K, V, A>(pool: &TreePool<K, V, Rbt, A>, t1: u32, t2: u32, pivot: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    if height(pool, t1) == height(pool, t2) && color(pool, t1) == Color::Black {
        let p = pool.node_mut(pivot);
        p.data.color = Color::Red;
        p.left = t1;
        p.right = t2;
        pool.update(pivot);
        return pivot;
    }
    let t = pool.copy_if_needed(t1);
    let rc = pool.node(t).right;
    let nr = join_right(pool, rc, t2, pivot);
    pool.node_mut(t).right = nr;
    // rebalance reads the stale height of `t` on purpose: equality with the
    // grown child is what signals the extra black introduced below
    let ret = rebalance_right(pool, t);
    pool.update(ret);
    ret
}

fn join_left<K, V, A>(pool: &TreePool<K, V, Rbt, A>, t1: u32, t2: u32, pivot: u32) -> u32
where
    K: Key,
    V: Value,
    A: Aug<K, V>,
{
    if height(pool, t1) == height(pool, t2) && color(pool, t2) == Color::Black {
        let p = pool.node_mut(pivot);
        p.data.color = Color::Red;
        p.left = t1;
        p.right = t2;
        pool.update(pivot);
        return pivot;
    }
    let t = pool.copy_if_needed(t2);
    let lc = pool.node(t).left;
    let nl = join_left(pool, t1, lc, pivot);
    pool.node_mut(t).left = nl;
    let ret = rebalance_left(pool, t);
    pool.update(ret);
    ret
}

impl<K: Key, V: Value> Policy<K, V> for Rbt {
    type Data = RbData;

    fn fresh_data() -> RbData {
        RbData { color: Color::Black, height: 1 }
    }

    fn refresh<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        data: RbData,
        left: u32,
        right: u32,
    ) -> RbData {
        let h = height(pool, left).max(height(pool, right))
            + (data.color == Color::Black) as u32;
        RbData { color: data.color, height: h }
    }

    fn join3<A: Aug<K, V>>(
        pool: &TreePool<K, V, Self, A>,
        left: u32,
        right: u32,
        pivot: u32,
    ) -> u32 {
        let left = blacken(pool, left);
        let right = blacken(pool, right);
        let (hl, hr) = (height(pool, left), height(pool, right));
        if hr < hl {
            join_right(pool, left, right, pivot)
        } else if hl < hr {
            join_left(pool, left, right, pivot)
        } else {
            let p = pool.node_mut(pivot);
            p.data.color = Color::Black;
            p.left = left;
            p.right = right;
            pool.update(pivot);
            pivot
        }
    }

    fn balanced<A: Aug<K, V>>(pool: &TreePool<K, V, Self, A>, t: u32) -> bool {
        let n = pool.node(t);
        let heights = height(pool, n.left) == height(pool, n.right);
        let no_red_pair = n.data.color == Color::Black
            || (color(pool, n.left) == Color::Black && color(pool, n.right) == Color::Black);
        heights && no_red_pair
    }
}
