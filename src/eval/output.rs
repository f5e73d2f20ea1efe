//! The output sink: where diagnostics go.
//!
//! Hosts supply one of the three implementations; writes are serialized by
//! the sink itself so concurrent evaluations interleave whole lines only.

use parking_lot::Mutex;

pub trait Output: Send + Sync {
    fn write(&self, symbol_name: &str, tag: &str, text: &str);
}

/// Writes `name::tag: text` lines to stdout.
pub struct DefaultOutput {
    lock: Mutex<()>,
}

impl DefaultOutput {
    pub fn new() -> DefaultOutput {
        DefaultOutput {
            lock: Mutex::new(()),
        }
    }
}

impl Default for DefaultOutput {
    fn default() -> Self {
        DefaultOutput::new()
    }
}

impl Output for DefaultOutput {
    fn write(&self, symbol_name: &str, tag: &str, text: &str) {
        let _guard = self.lock.lock();
        println!("{}::{}: {}", symbol_name, tag, text);
    }
}

/// Swallows everything.
pub struct NoOutput;

impl Output for NoOutput {
    fn write(&self, _symbol_name: &str, _tag: &str, _text: &str) {}
}

/// Captures messages for assertions.
pub struct TestOutput {
    messages: Mutex<Vec<(String, String, String)>>,
}

impl TestOutput {
    pub fn new() -> TestOutput {
        TestOutput {
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn take(&self) -> Vec<(String, String, String)> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Whether a `name::tag` message was emitted.
    pub fn contains(&self, symbol_name: &str, tag: &str) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|(name, t, _)| name == symbol_name && t == tag)
    }
}

impl Default for TestOutput {
    fn default() -> Self {
        TestOutput::new()
    }
}

impl Output for TestOutput {
    fn write(&self, symbol_name: &str, tag: &str, text: &str) {
        self.messages
            .lock()
            .push((symbol_name.to_string(), tag.to_string(), text.to_string()));
    }
}
