use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::{
    cell::{RefCell, UnsafeCell},
    collections::HashMap,
    mem::MaybeUninit,
    process,
    sync::atomic::{
        AtomicPtr, AtomicU32, AtomicU64, AtomicUsize,
        Ordering::{AcqRel, Acquire, Relaxed, Release},
    },
};

/// the null tree / null link
pub(crate) const NIL: u32 = u32::MAX;

// blocks per free list; whole lists move between the global stack and the
// thread local caches so contention on the global stack is amortized
const LIST_LEN: u32 = 1 << 10;
const SLAB_BITS: u32 = 24;
const SLOT_MASK: u32 = (1 << SLAB_BITS) - 1;
const MAX_SLABS: usize = 254;
const MAX_SLAB_SLOTS: usize = 1 << SLAB_BITS;

pub(crate) const DEFAULT_CAPACITY: usize = 1 << 16;

fn pack(idx: u32, tag: u32) -> u64 {
    (idx as u64) | ((tag as u64) << 32)
}

fn unpack(word: u64) -> (u32, u32) {
    (word as u32, (word >> 32) as u32)
}

struct Slot<T> {
    // link to the next free block in the same list, only meaningful while
    // the slot is free
    next: AtomicU32,
    // link to the next whole list on the global stack, only meaningful for
    // a list head that is currently on the stack
    next_list: AtomicU32,
    data: UnsafeCell<MaybeUninit<T>>,
}

struct LocalList {
    len: u32,
    head: u32,
    // the block that was on top when the cache last grew past one list's
    // worth; everything below it is the older half that gets pushed back to
    // the global stack when the cache overflows
    mid: u32,
}

thread_local! {
    static LOCAL: RefCell<FxHashMap<u64, LocalList>> = RefCell::new(HashMap::default());
}

static POOL_ID: AtomicU64 = AtomicU64::new(0);

fn exhausted() -> ! {
    eprintln!("joinmap: node pool exhausted");
    process::abort()
}

/// A slab allocator for fixed size blocks of one node type. Blocks are
/// addressed by `u32` slot indices (8 bit slab id, 24 bit offset), so child
/// links inside nodes are plain integers and never dangle while the pool is
/// alive. Free blocks circulate as fixed length lists: each thread allocates
/// from a private list with no synchronization and only touches the global
/// lock-free stack when its private cache runs out or overflows.
pub(crate) struct RawPool<T> {
    id: u64,
    // global stack of free lists. The head word packs the index of the top
    // list with a tag that increments on every successful swap, so a stale
    // compare-exchange cannot succeed after the top block was recycled and
    // pushed back at the same address (the classic ABA race).
    head: AtomicU64,
    slabs: Mutex<Vec<Box<[Slot<T>]>>>,
    slab_ptrs: [AtomicPtr<Slot<T>>; MAX_SLABS],
    allocated: AtomicUsize,
    in_use: AtomicUsize,
}

unsafe impl<T: Send> Send for RawPool<T> {}
unsafe impl<T: Send + Sync> Sync for RawPool<T> {}

impl<T> RawPool<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let t = RawPool {
            id: POOL_ID.fetch_add(1, Relaxed),
            head: AtomicU64::new(pack(NIL, 0)),
            slabs: Mutex::new(Vec::new()),
            slab_ptrs: std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())),
            allocated: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
        };
        {
            let mut slabs = t.slabs.lock();
            t.grow_locked(&mut slabs, capacity.max(LIST_LEN as usize));
        }
        t
    }

    /// total slots carved from backing slabs
    pub(crate) fn allocated(&self) -> usize {
        self.allocated.load(Relaxed)
    }

    /// live nodes currently handed out
    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Relaxed)
    }

    /// grow the backing store without disturbing anything already handed out
    pub(crate) fn reserve(&self, extra: usize) {
        let mut slabs = self.slabs.lock();
        self.grow_locked(&mut slabs, extra);
    }

    fn slot(&self, idx: u32) -> &Slot<T> {
        debug_assert!(idx != NIL);
        let slab = self.slab_ptrs[(idx >> SLAB_BITS) as usize].load(Acquire);
        debug_assert!(!slab.is_null());
        unsafe { &*slab.add((idx & SLOT_MASK) as usize) }
    }

    // must be called with the slab lock held
    fn grow_locked(&self, slabs: &mut Vec<Box<[Slot<T>]>>, n: usize) {
        let mut remaining = n.div_ceil(LIST_LEN as usize) * LIST_LEN as usize;
        while remaining > 0 {
            let len = remaining.min(MAX_SLAB_SLOTS);
            remaining -= len;
            if slabs.len() == MAX_SLABS {
                exhausted()
            }
            let slab: Box<[Slot<T>]> = (0..len)
                .map(|_| Slot {
                    next: AtomicU32::new(NIL),
                    next_list: AtomicU32::new(NIL),
                    data: UnsafeCell::new(MaybeUninit::uninit()),
                })
                .collect();
            let base = (slabs.len() as u32) << SLAB_BITS;
            self.slab_ptrs[slabs.len()].store(slab.as_ptr() as *mut _, Release);
            slabs.push(slab);
            self.allocated.fetch_add(len, Relaxed);
            // chop the slab into lists and publish them
            let mut off = 0u32;
            while (off as usize) < len {
                for i in off..off + LIST_LEN - 1 {
                    self.slot(base | i).next.store(base | (i + 1), Relaxed);
                }
                self.slot(base | (off + LIST_LEN - 1)).next.store(NIL, Relaxed);
                self.push_list(base | off);
                off += LIST_LEN;
            }
        }
    }

    fn push_list(&self, list: u32) {
        loop {
            let cur = self.head.load(Acquire);
            let (top, tag) = unpack(cur);
            self.slot(list).next_list.store(top, Relaxed);
            if self
                .head
                .compare_exchange_weak(cur, pack(list, tag.wrapping_add(1)), AcqRel, Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    fn pop_list(&self) -> Option<u32> {
        loop {
            let cur = self.head.load(Acquire);
            let (top, tag) = unpack(cur);
            if top == NIL {
                return None;
            }
            let next = self.slot(top).next_list.load(Acquire);
            if self
                .head
                .compare_exchange_weak(cur, pack(next, tag.wrapping_add(1)), AcqRel, Acquire)
                .is_ok()
            {
                return Some(top);
            }
        }
    }

    fn take_list(&self) -> u32 {
        loop {
            if let Some(list) = self.pop_list() {
                return list;
            }
            // exactly one thread grows the pool, the rest retry their pop
            if let Some(mut slabs) = self.slabs.try_lock() {
                if unpack(self.head.load(Acquire)).0 == NIL {
                    self.grow_locked(&mut slabs, DEFAULT_CAPACITY);
                }
            } else {
                std::hint::spin_loop();
            }
        }
    }

    pub(crate) fn alloc(&self, value: T) -> u32 {
        let idx = LOCAL.with(|local| {
            let mut local = local.borrow_mut();
            let l = local
                .entry(self.id)
                .or_insert(LocalList { len: 0, head: NIL, mid: NIL });
            if l.len == 0 {
                l.head = self.take_list();
                l.len = LIST_LEN;
            }
            let idx = l.head;
            l.head = self.slot(idx).next.load(Relaxed);
            l.len -= 1;
            idx
        });
        unsafe { (*self.slot(idx).data.get()).write(value) };
        self.in_use.fetch_add(1, Relaxed);
        idx
    }

    pub(crate) fn free(&self, idx: u32) {
        unsafe { (*self.slot(idx).data.get()).assume_init_drop() };
        self.in_use.fetch_sub(1, Relaxed);
        LOCAL.with(|local| {
            let mut local = local.borrow_mut();
            let l = local
                .entry(self.id)
                .or_insert(LocalList { len: 0, head: NIL, mid: NIL });
            self.slot(idx).next.store(l.head, Relaxed);
            l.head = idx;
            l.len += 1;
            if l.len == LIST_LEN + 1 {
                l.mid = idx;
            } else if l.len == 2 * LIST_LEN {
                // hand the older half back to the global stack
                let older = self.slot(l.mid).next.swap(NIL, Relaxed);
                self.push_list(older);
                l.len = LIST_LEN;
            }
        })
    }

    pub(crate) fn get(&self, idx: u32) -> &T {
        unsafe { (*self.slot(idx).data.get()).assume_init_ref() }
    }

    /// Callers must guarantee the block is exclusively owned; for tree nodes
    /// that means reference count 1 and reachable from exactly one in-flight
    /// algorithm.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get_mut(&self, idx: u32) -> &mut T {
        &mut *(*self.slot(idx).data.get()).as_mut_ptr()
    }
}

// Any block still in use when the pool is dropped leaks its contents; by
// contract the pool is only torn down once every tree handle has been
// released, and the structure tests assert `in_use() == 0` at that point.
