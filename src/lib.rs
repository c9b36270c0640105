//! Persistent ordered maps and sets on join-based balanced trees.
//!
//! Maps and sets here are functionally immutable: updating one returns a new
//! version in O(log n) time and space and leaves every previously obtained
//! version intact, with the unchanged majority of the tree shared between
//! versions. On top of single key updates the trees support set algebra
//! (union, intersection, difference) in O(m log (n/m + 1)) work, bulk
//! construction and bulk insertion, order statistics (rank and select), and
//! user defined range accumulations via the [`node::Aug`] trait.
//!
//! The balancing scheme is a compile time parameter: [`avl::Avl`] (the
//! default), [`wbt::Wbt`], [`treap::Treap`] or [`rbt::Rbt`]. All of them run
//! the same generic algorithms, built from a per policy three way join.
//!
//! Large operations fork into rayon's thread pool, so combining two big maps
//! uses every core. Nodes live in a [`tree::TreePool`], a lock free slab
//! allocator; create one pool per key/value/policy combination and build
//! every related map in it:
//!
//! ```
//! use joinmap::{map::Map, tree::TreePool};
//!
//! let pool: TreePool<u64, &str> = TreePool::new();
//! let m = Map::new(&pool);
//! let (m, _) = m.insert(42, "the answer");
//! let (m2, _) = m.insert(7, "lucky");
//! assert_eq!(m.len(), 1); // m is unchanged by the second insert
//! assert_eq!(m2.get(&7), Some(&"lucky"));
//! ```

pub mod avl;
pub mod map;
pub mod node;
mod pool;
pub mod rbt;
pub mod set;
pub mod treap;
pub mod tree;
pub mod wbt;

#[cfg(test)]
mod tests;

pub use crate::{
    map::{AugMap, Map},
    set::{Set, SetPool},
    tree::TreePool,
};
