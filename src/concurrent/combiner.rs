//! A flat combiner in the style of Vyukov's combiner/aggregator.
//!
//! Threads publish argument nodes; one thread wins the combiner flag and
//! applies a batch of queued operations against the shared structure while
//! the others spin on their node's completion flag. A combiner drains at
//! most [`COMBINE_LIMIT`] operations before stepping down, handing the rest
//! to the next waiter — this bounds the worst-case latency any one thread
//! spends combining on behalf of others.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub const COMBINE_LIMIT: usize = 64;

struct OpNode<T, R> {
    arg: Mutex<Option<T>>,
    result: Mutex<Option<R>>,
    done: AtomicBool,
}

pub struct Combiner<S, T, R> {
    state: Mutex<S>,
    queue: Mutex<VecDeque<Arc<OpNode<T, R>>>>,
    combining: AtomicBool,
    apply: fn(&mut S, T) -> R,
}

impl<S, T, R> Combiner<S, T, R> {
    pub fn new(state: S, apply: fn(&mut S, T) -> R) -> Combiner<S, T, R> {
        Combiner {
            state: Mutex::new(state),
            queue: Mutex::new(VecDeque::new()),
            combining: AtomicBool::new(false),
            apply,
        }
    }

    /// Executes `arg` against the shared structure, possibly on another
    /// thread's behalf, and returns its result.
    pub fn run(&self, arg: T) -> R {
        let node = Arc::new(OpNode {
            arg: Mutex::new(Some(arg)),
            result: Mutex::new(None),
            done: AtomicBool::new(false),
        });
        self.queue.lock().push_back(Arc::clone(&node));

        let mut idle_rounds = 0usize;
        loop {
            if node.done.load(Ordering::Acquire) {
                if let Some(result) = node.result.lock().take() {
                    return result;
                }
            }

            if self
                .combining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.combine();
                self.combining.store(false, Ordering::Release);
                idle_rounds = 0;
            } else {
                idle_rounds += 1;
                if idle_rounds > 1 {
                    std::thread::yield_now();
                } else {
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Drains up to [`COMBINE_LIMIT`] queued operations. Leftovers wait for
    /// the next combiner.
    fn combine(&self) {
        let mut state = self.state.lock();
        let mut count = 0;
        while count < COMBINE_LIMIT {
            let node = self.queue.lock().pop_front();
            let node = match node {
                Some(node) => node,
                None => break,
            };
            if let Some(arg) = node.arg.lock().take() {
                let result = (self.apply)(&mut state, arg);
                *node.result.lock() = Some(result);
            }
            node.done.store(true, Ordering::Release);
            count += 1;
        }
    }
}
