use crate::{pool::NIL, tree::Policy};
use std::sync::atomic::AtomicU32;

/// bound alias for key types; keys are totally ordered, cheap to clone, and
/// must cross task boundaries during parallel recursion
pub trait Key: Ord + Clone + Send + Sync {}
impl<T: Ord + Clone + Send + Sync> Key for T {}

/// bound alias for mapped values
pub trait Value: Clone + Send + Sync {}
impl<T: Clone + Send + Sync> Value for T {}

/// An associative accumulator maintained bottom up over every subtree,
/// enabling O(log n) aggregate queries over key ranges. `combine` must be
/// associative; it is not required to be commutative, but range queries
/// fold subtrees in tree order, not strictly key order, so in practice a
/// commutative operator (sum, max, ...) is what you want.
pub trait Aug<K, V>: Send + Sync + 'static {
    type Value: Clone + Send + Sync;
    fn empty() -> Self::Value;
    fn from_entry(key: &K, value: &V) -> Self::Value;
    fn combine(a: Self::Value, b: Self::Value) -> Self::Value;
}

/// the default augmentation, which caches nothing
pub struct NoAug;

impl<K, V> Aug<K, V> for NoAug {
    type Value = ();
    fn empty() -> Self::Value {}
    fn from_entry(_key: &K, _value: &V) -> Self::Value {}
    fn combine(_a: Self::Value, _b: Self::Value) -> Self::Value {}
}

/// The unit of structural sharing. Children are slot indices into the node
/// pool (`NIL` for empty), and `refs` counts the number of distinct
/// parent-or-root references currently pointing at this node. Once a node is
/// reachable from more than one root it is logically immutable; algorithms
/// wanting to change it must clone it first (copy on write).
pub(crate) struct Node<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) left: u32,
    pub(crate) right: u32,
    pub(crate) size: u32,
    pub(crate) refs: AtomicU32,
    pub(crate) data: P::Data,
    pub(crate) aug: A::Value,
}

impl<K, V, P, A> Node<K, V, P, A>
where
    K: Key,
    V: Value,
    P: Policy<K, V>,
    A: Aug<K, V>,
{
    pub(crate) fn leaf(key: K, value: V, data: P::Data) -> Self {
        Node {
            key,
            value,
            left: NIL,
            right: NIL,
            size: 1,
            refs: AtomicU32::new(1),
            data,
            aug: A::empty(),
        }
    }
}
