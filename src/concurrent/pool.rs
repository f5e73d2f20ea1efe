//! Recycling object pools.
//!
//! Hot allocation sites (match slot vectors, leaf scratch buffers) draw from
//! a thread-local pile. Piles exchange full mini-pools — 1024-slot batches —
//! with a shared queue serialized by the combiner, so cross-thread traffic
//! happens per batch, not per object. A mini-pool moves through three
//! states: `Reactivate` (has slots ready to hand out), `Exhausted` (all
//! slots in use, the pool object is dissolved into a pile), and `Free` (all
//! slots returned, parked in the shared queue).

use std::cell::RefCell;
use std::collections::VecDeque;

use once_cell::sync::Lazy;

use crate::concurrent::combiner::Combiner;
use crate::expr::ExprRef;

pub const MINI_POOL_SIZE: usize = 1024;

/// A recyclable object: cheap to create fresh, and resettable to a clean
/// state so every handed-out slot is initialized exactly once per usage.
pub trait Recycled: Send + 'static {
    fn fresh() -> Self;
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Reactivate,
    Exhausted,
    Free,
}

pub struct MiniPool<T> {
    items: Vec<T>,
    state: PoolState,
}

impl<T> MiniPool<T> {
    fn full(items: Vec<T>) -> MiniPool<T> {
        MiniPool {
            items,
            state: PoolState::Free,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct SharedPools<T> {
    pools: VecDeque<MiniPool<T>>,
}

enum PoolOp<T> {
    Put(MiniPool<T>),
    Take,
}

fn apply_pool_op<T>(shared: &mut SharedPools<T>, op: PoolOp<T>) -> Option<MiniPool<T>> {
    match op {
        PoolOp::Put(mut pool) => {
            pool.state = if pool.items.len() == MINI_POOL_SIZE {
                PoolState::Free
            } else {
                PoolState::Reactivate
            };
            shared.pools.push_back(pool);
            None
        }
        PoolOp::Take => {
            let mut pool = shared.pools.pop_front()?;
            pool.state = PoolState::Reactivate;
            Some(pool)
        }
    }
}

/// The thread-local side of a pool: a pile of free objects.
pub struct Pile<T> {
    free: Vec<T>,
}

impl<T> Pile<T> {
    pub fn new() -> Pile<T> {
        Pile { free: Vec::new() }
    }
}

impl<T> Default for Pile<T> {
    fn default() -> Self {
        Pile::new()
    }
}

pub struct ObjectPool<T: Recycled> {
    shared: Combiner<SharedPools<T>, PoolOp<T>, Option<MiniPool<T>>>,
}

impl<T: Recycled> ObjectPool<T> {
    pub fn new() -> ObjectPool<T> {
        ObjectPool {
            shared: Combiner::new(
                SharedPools {
                    pools: VecDeque::new(),
                },
                apply_pool_op,
            ),
        }
    }

    /// Grabs from the pile; an empty pile pulls a mini-pool from the shared
    /// queue, and an empty queue falls back to fresh construction.
    pub fn allocate(&self, pile: &mut Pile<T>) -> T {
        if let Some(item) = pile.free.pop() {
            return item;
        }
        if let Some(mut pool) = self.shared.run(PoolOp::Take) {
            pool.state = PoolState::Exhausted;
            pile.free = std::mem::take(&mut pool.items);
            if let Some(item) = pile.free.pop() {
                return item;
            }
        }
        T::fresh()
    }

    /// Returns an object to the pile; a full pile flushes one mini-pool
    /// batch back to the shared queue.
    pub fn release(&self, pile: &mut Pile<T>, mut item: T) {
        item.reset();
        pile.free.push(item);
        if pile.free.len() >= MINI_POOL_SIZE {
            let items = std::mem::take(&mut pile.free);
            self.shared.run(PoolOp::Put(MiniPool::full(items)));
        }
    }
}

impl<T: Recycled> Default for ObjectPool<T> {
    fn default() -> Self {
        ObjectPool::new()
    }
}

// -- the kernel's pooled buffer kinds ---------------------------------------

pub type SlotBuffer = Vec<Option<ExprRef>>;
pub type IndexBuffer = Vec<usize>;

impl Recycled for SlotBuffer {
    fn fresh() -> Self {
        Vec::new()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl Recycled for IndexBuffer {
    fn fresh() -> Self {
        Vec::new()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

static SLOT_POOL: Lazy<ObjectPool<SlotBuffer>> = Lazy::new(ObjectPool::new);
static INDEX_POOL: Lazy<ObjectPool<IndexBuffer>> = Lazy::new(ObjectPool::new);

thread_local! {
    static SLOT_PILE: RefCell<Pile<SlotBuffer>> = RefCell::new(Pile::new());
    static INDEX_PILE: RefCell<Pile<IndexBuffer>> = RefCell::new(Pile::new());
}

pub fn acquire_slot_buffer() -> SlotBuffer {
    SLOT_PILE.with(|pile| SLOT_POOL.allocate(&mut pile.borrow_mut()))
}

pub fn release_slot_buffer(buffer: SlotBuffer) {
    SLOT_PILE.with(|pile| SLOT_POOL.release(&mut pile.borrow_mut(), buffer));
}

pub fn acquire_index_buffer() -> IndexBuffer {
    INDEX_PILE.with(|pile| INDEX_POOL.allocate(&mut pile.borrow_mut()))
}

pub fn release_index_buffer(buffer: IndexBuffer) {
    INDEX_PILE.with(|pile| INDEX_POOL.release(&mut pile.borrow_mut(), buffer));
}
