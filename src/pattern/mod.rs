//! Pattern compilation, matching and rewriting.
//!
//! Patterns are ordinary expressions; `compile` lowers them into matcher
//! trees carrying match-size bounds and a contiguous variable table. The
//! matcher runs left to right over a generic sequence view — expression
//! leaves or string characters — with O(1) backtracking through the match
//! object's fixed-slot stack. A matched rule's right-hand side is compiled
//! once into a directive tree and applied by a single traversal.

pub mod compile;
pub mod match_state;
pub mod matcher;
pub mod options;
pub mod rewrite;
pub mod sequence;
pub mod size;

pub use compile::{compile_pattern, compile_string_pattern, CompiledPattern};
pub use match_state::{Match, MatchState};
pub use rewrite::{compile_rewrite, CompiledRewrite};
pub use size::MatchSize;
