//! Error types for the evaluation kernel.

use thiserror::Error;

/// Interrupt kinds delivered through the cooperative poll.
///
/// `Return`, `Break` and `Continue` unwind to the enclosing loop handler;
/// `Abort` and `Timeout` unwind the whole top-level evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Abort,
    Timeout,
    Return,
    Break,
    Continue,
}

impl Interrupt {
    pub(crate) fn from_flag(flag: u8) -> Option<Interrupt> {
        match flag {
            1 => Some(Interrupt::Abort),
            2 => Some(Interrupt::Timeout),
            3 => Some(Interrupt::Return),
            4 => Some(Interrupt::Break),
            5 => Some(Interrupt::Continue),
            _ => None,
        }
    }

    pub(crate) fn flag(self) -> u8 {
        match self {
            Interrupt::Abort => 1,
            Interrupt::Timeout => 2,
            Interrupt::Return => 3,
            Interrupt::Break => 4,
            Interrupt::Continue => 5,
        }
    }
}

/// Errors that can abort an evaluation step.
///
/// Most diagnostics are not errors in this sense: they are reported through
/// the output sink and evaluation continues with the unevaluated expression.
/// The variants here are the ones that unwind.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Wrong number of leaves for a built-in signature.
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    /// A built-in received an argument of an unexpected kind.
    #[error("unexpected argument type: {0}")]
    TypeMismatch(String),

    /// Malformed pattern, e.g. `Pattern[1, _]` or an unsatisfiable slot
    /// reference in a rewrite body.
    #[error("malformed pattern: {0}")]
    PatternError(String),

    /// A string pattern contained a construct that is only legal in
    /// expression patterns.
    #[error("invalid string pattern: {0}")]
    StringPatternError(String),

    /// Evaluator recursion exceeded the configured bound.
    #[error("recursion depth of {0} exceeded")]
    RecursionLimit(usize),

    /// A cooperative interrupt was observed.
    #[error("evaluation interrupted: {0:?}")]
    Interrupted(Interrupt),

    /// Raised by the symbolic-form layer; demoted to a message at the
    /// evaluator boundary.
    #[error("numeric exception: {0}")]
    NumericException(String),

    /// Emitted by arithmetic primitives.
    #[error("division by zero")]
    DivisionByZero,
}

pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_flag_round_trips() {
        for interrupt in [
            Interrupt::Abort,
            Interrupt::Timeout,
            Interrupt::Return,
            Interrupt::Break,
            Interrupt::Continue,
        ] {
            assert_eq!(Interrupt::from_flag(interrupt.flag()), Some(interrupt));
        }
        assert_eq!(Interrupt::from_flag(0), None);
    }

    #[test]
    fn display_names_the_failing_step() {
        let err = EvalError::RecursionLimit(512);
        assert_eq!(err.to_string(), "recursion depth of 512 exceeded");
    }
}
