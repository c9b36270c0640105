use crate::{
    map::Map,
    node::{Aug, NoAug},
    set::Set,
    tree::TreePool,
};
use rand::{thread_rng, Rng};

const SIZE: usize = 2000;

fn random_entries(n: usize) -> Vec<(i32, i32)> {
    let mut rng = thread_rng();
    (0..n).map(|_| (rng.gen_range(0..100_000), rng.gen_range(0..1000))).collect()
}

macro_rules! policy_tests {
    ($name:ident, $policy:ty) => {
        mod $name {
            use super::*;
            use std::collections::BTreeMap;

            type TPool = TreePool<i32, i32, $policy, NoAug>;

            #[test]
            fn insert_get_remove() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let mut model = BTreeMap::new();
                    let mut m = Map::new(&pool);
                    for (k, v) in random_entries(SIZE) {
                        let (nm, prev) = m.insert(k, v);
                        assert_eq!(prev, model.insert(k, v));
                        m = nm;
                    }
                    m.invariant();
                    assert_eq!(m.len(), model.len());
                    for (k, v) in model.iter() {
                        assert_eq!(m.get(k), Some(v));
                        assert_eq!(m.get_full(k), Some((k, v)));
                        assert!(m.contains_key(k));
                    }
                    assert_eq!(m.get(&-1), None);
                    let keys: Vec<i32> = model.keys().copied().collect();
                    for k in keys {
                        let (nm, prev) = m.remove(&k);
                        assert_eq!(prev, model.remove(&k));
                        m = nm;
                    }
                    m.invariant();
                    assert!(m.is_empty());
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn snapshots_are_immutable() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let m0 =
                        Map::from_entries(&pool, vec![(2, 4), (4, 5), (6, 8)], false);
                    let (m1, prev) = m0.remove(&6);
                    assert_eq!(prev, Some(8));
                    let m2 = Map::from_entries(&pool, vec![(2, 4), (4, 5)], false);
                    assert_eq!(m1, m2);
                    assert_eq!(m0.len(), 3);
                    assert_eq!(m0.get(&6), Some(&8));
                    m0.invariant();
                    m1.invariant();
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn build_folds_duplicates() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let m = Map::from_entries_with(
                        &pool,
                        vec![(2, 4), (4, 5), (2, 6)],
                        false,
                        |a, b| a + b,
                    );
                    assert_eq!(m.len(), 2);
                    assert_eq!(m.get(&2), Some(&10));
                    assert_eq!(m.get(&4), Some(&5));
                    // without a combiner the first entry wins
                    let m = Map::from_entries(&pool, vec![(2, 4), (4, 5), (2, 6)], false);
                    assert_eq!(m.get(&2), Some(&4));
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn iteration_order() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let model: BTreeMap<i32, i32> =
                        random_entries(SIZE).into_iter().collect();
                    let m = Map::from_entries(
                        &pool,
                        model.iter().map(|(k, v)| (*k, *v)).collect(),
                        true,
                    );
                    assert!(m.iter().map(|(k, v)| (*k, *v)).eq(model
                        .iter()
                        .map(|(k, v)| (*k, *v))));
                    assert!(m.iter().rev().map(|(k, v)| (*k, *v)).eq(model
                        .iter()
                        .rev()
                        .map(|(k, v)| (*k, *v))));
                    assert_eq!(m.to_vec(), model.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>());
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn union_with_model() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let ea = random_entries(SIZE);
                    let eb = random_entries(SIZE / 3);
                    let a = Map::from_entries(&pool, ea.clone(), false);
                    let b = Map::from_entries(&pool, eb.clone(), false);
                    let mut model: BTreeMap<i32, i32> = BTreeMap::new();
                    for (k, v) in ea.iter().rev() {
                        model.insert(*k, *v);
                    }
                    let mut bmodel: BTreeMap<i32, i32> = BTreeMap::new();
                    for (k, v) in eb.iter().rev() {
                        bmodel.insert(*k, *v);
                    }
                    for (k, v) in bmodel {
                        model.entry(k).or_insert(v);
                    }
                    let u = a.union(b);
                    u.invariant();
                    assert_eq!(u.len(), model.len());
                    for (k, v) in model.iter() {
                        assert_eq!(u.get(k), Some(v));
                    }
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn intersect_difference_partition() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let a = Map::from_entries(&pool, random_entries(SIZE), false);
                    let b = Map::from_entries(&pool, random_entries(SIZE), false);
                    let inter = a.clone().intersect(b.clone());
                    let diff = a.clone().difference(b.clone());
                    inter.invariant();
                    diff.invariant();
                    for (k, v) in a.iter() {
                        if b.contains_key(k) {
                            assert_eq!(inter.get(k), Some(v));
                            assert_eq!(diff.get(k), None);
                        } else {
                            assert_eq!(inter.get(k), None);
                            assert_eq!(diff.get(k), Some(v));
                        }
                    }
                    assert_eq!(inter.len() + diff.len(), a.len());
                    // the partition reassembles to the original
                    assert_eq!(inter.union(diff), a);
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn split_then_union_is_identity() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let m = Map::from_entries(&pool, random_entries(SIZE), false);
                    let pivot = m.select(m.len() / 2).map(|(k, _)| *k).unwrap();
                    let (l, v, r) = m.split(&pivot);
                    l.invariant();
                    r.invariant();
                    assert_eq!(v, m.get(&pivot).copied());
                    assert!(l.iter().all(|(k, _)| *k < pivot));
                    assert!(r.iter().all(|(k, _)| *k > pivot));
                    let (back, _) = l.union(r).insert(pivot, v.unwrap());
                    assert_eq!(back, m);
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn update_many_matches_inserts() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let base = random_entries(SIZE);
                    let batch = random_entries(SIZE / 4);
                    let m = Map::from_entries(&pool, base.clone(), false);
                    let bulk = m.update_many(batch.clone(), false, |new, cur| new + cur);
                    bulk.invariant();
                    let mut model: BTreeMap<i32, i32> = BTreeMap::new();
                    for (k, v) in base.iter().rev() {
                        model.insert(*k, *v);
                    }
                    let mut folded: BTreeMap<i32, i32> = BTreeMap::new();
                    for (k, v) in batch {
                        folded
                            .entry(k)
                            .and_modify(|acc| *acc += v)
                            .or_insert(v);
                    }
                    for (k, v) in folded {
                        model
                            .entry(k)
                            .and_modify(|cur| *cur += v)
                            .or_insert(v);
                    }
                    assert_eq!(bulk.len(), model.len());
                    for (k, v) in model.iter() {
                        assert_eq!(bulk.get(k), Some(v));
                    }
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn filter_keeps_matches() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let m = Map::from_entries(&pool, random_entries(SIZE), false);
                    let f = m.filter(|k, _| k % 2 == 0);
                    f.invariant();
                    assert_eq!(
                        f.len(),
                        m.iter().filter(|(k, _)| *k % 2 == 0).count()
                    );
                    for (k, v) in m.iter() {
                        assert_eq!(f.get(k), if k % 2 == 0 { Some(v) } else { None });
                    }
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn rank_select_inverse() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let m = Map::from_entries(&pool, random_entries(SIZE), false);
                    for i in 0..m.len() {
                        let (k, _) = m.select(i).unwrap();
                        assert_eq!(m.rank(k), i);
                    }
                    assert_eq!(m.select(m.len()), None);
                    assert_eq!(m.rank(&i32::MAX), m.len());
                    assert_eq!(m.rank(&i32::MIN), 0);
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn next_previous_neighbors() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let m = Map::from_entries(
                        &pool,
                        vec![(1, 1), (3, 3), (5, 5), (7, 7)],
                        true,
                    );
                    assert_eq!(m.next(&0).map(|(k, _)| *k), Some(1));
                    assert_eq!(m.next(&3).map(|(k, _)| *k), Some(5));
                    assert_eq!(m.next(&7), None);
                    assert_eq!(m.previous(&8).map(|(k, _)| *k), Some(7));
                    assert_eq!(m.previous(&3).map(|(k, _)| *k), Some(1));
                    assert_eq!(m.previous(&1), None);
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn range_bounds_inclusive() {
                let pool: TPool = TreePool::with_capacity(1024);
                {
                    let m = Map::from_entries(
                        &pool,
                        vec![(1, 1), (2, 2), (4, 4), (6, 6)],
                        true,
                    );
                    let r = m.range(&0, &7);
                    assert_eq!(r, m);
                    let r = m.range(&2, &4);
                    assert_eq!(r.to_vec(), vec![(2, 2), (4, 4)]);
                    let r = m.range(&3, &3);
                    assert!(r.is_empty());
                    let r = m.range(&4, &100);
                    assert_eq!(r.to_vec(), vec![(4, 4), (6, 6)]);
                }
                assert_eq!(pool.in_use(), 0);
            }

            #[test]
            fn large_parallel_union() {
                let pool: TPool = TreePool::with_capacity(1 << 16);
                {
                    let n = 50_000;
                    let a = Map::from_entries(
                        &pool,
                        (0..n).map(|i| (i * 2, i)).collect(),
                        true,
                    );
                    let b = Map::from_entries(
                        &pool,
                        (0..n).map(|i| (i * 2 + 1, i)).collect(),
                        true,
                    );
                    let u = a.union(b);
                    u.invariant();
                    assert_eq!(u.len(), 2 * n as usize);
                }
                assert_eq!(pool.in_use(), 0);
            }
        }
    };
}

policy_tests!(avl, crate::avl::Avl);
policy_tests!(wbt, crate::wbt::Wbt);
policy_tests!(treap, crate::treap::Treap);
policy_tests!(rbt, crate::rbt::Rbt);

mod aug {
    use super::*;

    struct SumAug;

    impl Aug<i32, i32> for SumAug {
        type Value = i64;

        fn empty() -> i64 {
            0
        }

        fn from_entry(_key: &i32, value: &i32) -> i64 {
            *value as i64
        }

        fn combine(a: i64, b: i64) -> i64 {
            a + b
        }
    }

    type SPool = TreePool<i32, i32, crate::avl::Avl, SumAug>;

    #[test]
    fn aggregates() {
        let pool: SPool = TreePool::with_capacity(1024);
        {
            let m = Map::from_entries(&pool, vec![(2, 4), (4, 5), (6, 8)], true);
            assert_eq!(m.aggregate(), 17);
            assert_eq!(m.aggregate_left_of(&4), 4);
            assert_eq!(m.aggregate_right_of(&4), 8);
            assert_eq!(m.aggregate_range(&2, &4), 9);
            assert_eq!(m.aggregate_range(&3, &3), 0);
            assert_eq!(m.aggregate_left_of(&2), 0);
            assert_eq!(m.aggregate_right_of(&6), 0);
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn aggregates_match_model() {
        let pool: SPool = TreePool::with_capacity(1024);
        {
            let entries = random_entries(SIZE);
            let m = Map::from_entries(&pool, entries, false);
            let all: Vec<(i32, i32)> = m.to_vec();
            let mut rng = thread_rng();
            for _ in 0..100 {
                let lo = rng.gen_range(0..100_000);
                let hi = rng.gen_range(lo..100_001);
                let expect: i64 = all
                    .iter()
                    .filter(|(k, _)| lo <= *k && *k <= hi)
                    .map(|(_, v)| *v as i64)
                    .sum();
                assert_eq!(m.aggregate_range(&lo, &hi), expect);
                let below: i64 = all
                    .iter()
                    .filter(|(k, _)| *k < lo)
                    .map(|(_, v)| *v as i64)
                    .sum();
                assert_eq!(m.aggregate_left_of(&lo), below);
                let above: i64 = all
                    .iter()
                    .filter(|(k, _)| *k > hi)
                    .map(|(_, v)| *v as i64)
                    .sum();
                assert_eq!(m.aggregate_right_of(&hi), above);
            }
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn aggregates_survive_updates() {
        let pool: SPool = TreePool::with_capacity(1024);
        {
            let m = Map::from_entries(&pool, vec![(1, 10), (5, 50)], true);
            let (m2, _) = m.insert(3, 30);
            assert_eq!(m.aggregate(), 60);
            assert_eq!(m2.aggregate(), 90);
            let (m3, _) = m2.remove(&1);
            assert_eq!(m3.aggregate(), 80);
            assert_eq!(m2.aggregate(), 90);
        }
        assert_eq!(pool.in_use(), 0);
    }
}

mod sets {
    use super::*;
    use std::collections::BTreeSet;

    type SPool = crate::set::SetPool<i32>;

    fn random_elems(n: usize) -> Vec<i32> {
        let mut rng = thread_rng();
        (0..n).map(|_| rng.gen_range(0..10_000)).collect()
    }

    #[test]
    fn algebra_with_model() {
        let pool: SPool = TreePool::with_capacity(1024);
        {
            let ea = random_elems(SIZE);
            let eb = random_elems(SIZE);
            let ma: BTreeSet<i32> = ea.iter().copied().collect();
            let mb: BTreeSet<i32> = eb.iter().copied().collect();
            let a = Set::from_elems(&pool, ea, false);
            let b = Set::from_elems(&pool, eb, false);
            assert_eq!(
                a.clone().union(b.clone()).to_vec(),
                ma.union(&mb).copied().collect::<Vec<_>>()
            );
            assert_eq!(
                a.clone().intersect(b.clone()).to_vec(),
                ma.intersection(&mb).copied().collect::<Vec<_>>()
            );
            assert_eq!(
                a.clone().difference(b.clone()).to_vec(),
                ma.difference(&mb).copied().collect::<Vec<_>>()
            );
            let (a2, added) = a.insert(-1);
            assert!(!added);
            assert!(a2.contains(&-1));
            assert!(!a.contains(&-1));
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn order_statistics() {
        let pool: SPool = TreePool::with_capacity(1024);
        {
            let s = Set::from_elems(&pool, vec![1, 2, 4, 6], false);
            assert_eq!(s.rank(&4), 2);
            assert_eq!(s.rank(&5), 3);
            assert_eq!(s.select(0), Some(&1));
            assert_eq!(s.select(3), Some(&6));
            assert_eq!(s.select(4), None);
            assert_eq!(s.range(&0, &7).to_vec(), vec![1, 2, 4, 6]);
            assert_eq!(s.range(&2, &4).to_vec(), vec![2, 4]);
            let (l, present, r) = s.split(&4);
            assert!(present);
            assert_eq!(l.to_vec(), vec![1, 2]);
            assert_eq!(r.to_vec(), vec![6]);
        }
        assert_eq!(pool.in_use(), 0);
    }
}

mod sharing {
    use super::*;

    type TPool = TreePool<i32, i32>;

    #[test]
    fn versions_share_nodes() {
        let pool: TPool = TreePool::with_capacity(1024);
        {
            let m = Map::from_entries(
                &pool,
                (0..1000).map(|i| (i, i)).collect(),
                true,
            );
            let used = pool.in_use();
            assert_eq!(used, 1000);
            // a snapshot copies only the touched path
            let (m2, _) = m.insert(500, -1);
            assert!(pool.in_use() < used + 30);
            drop(m);
            assert_eq!(m2.get(&500), Some(&-1));
            m2.invariant();
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn clones_are_free_until_dropped() {
        let pool: TPool = TreePool::with_capacity(1024);
        {
            let m = Map::from_entries(&pool, (0..100).map(|i| (i, i)).collect(), true);
            let used = pool.in_use();
            let c1 = m.clone();
            let c2 = m.clone();
            assert_eq!(pool.in_use(), used);
            drop(m);
            drop(c1);
            assert_eq!(pool.in_use(), used);
            assert_eq!(c2.len(), 100);
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn concurrent_snapshots() {
        let pool: TPool = TreePool::with_capacity(1 << 14);
        {
            let base = Map::from_entries(
                &pool,
                (0..5000).map(|i| (i, i)).collect(),
                true,
            );
            std::thread::scope(|scope| {
                for t in 0..8 {
                    let snap = base.clone();
                    scope.spawn(move || {
                        let mut m = snap;
                        for i in 0..500 {
                            let (nm, _) = m.insert(100_000 + t * 1000 + i, i);
                            m = nm;
                        }
                        assert_eq!(m.len(), 5500);
                        m.invariant();
                    });
                }
            });
            assert_eq!(base.len(), 5000);
        }
        assert_eq!(pool.in_use(), 0);
    }
}
