//! Concurrency primitives: the flat combiner and recycling object pools.

pub mod combiner;
pub mod pool;

pub use combiner::Combiner;
pub use pool::{ObjectPool, Pile, Recycled, MINI_POOL_SIZE};
