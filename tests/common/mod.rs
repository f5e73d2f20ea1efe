//! Shared helpers for the integration tests: a fresh kernel per test and
//! terse expression builders (there is no parser in the kernel).

#![allow(dead_code)]

use std::sync::Arc;

use symbolon::eval::TestOutput;
use symbolon::expr::{self, ExprRef};
use symbolon::{evaluate, Definitions, Evaluation};

pub struct Kernel {
    pub definitions: Arc<Definitions>,
    pub evaluation: Evaluation,
    pub sink: Arc<TestOutput>,
}

pub fn kernel() -> Kernel {
    let definitions = Definitions::new();
    let sink = Arc::new(TestOutput::new());
    let evaluation = Evaluation::new(
        Arc::clone(&definitions),
        Arc::clone(&sink) as Arc<dyn symbolon::Output>,
    );
    Kernel {
        definitions,
        evaluation,
        sink,
    }
}

impl Kernel {
    pub fn sym(&self, full_name: &str) -> ExprRef {
        expr::symbol(self.definitions.lookup(full_name))
    }

    pub fn system(&self, short: &str) -> ExprRef {
        expr::symbol(self.definitions.system(short))
    }

    pub fn global(&self, short: &str) -> ExprRef {
        expr::symbol(self.definitions.global(short))
    }

    pub fn call(&self, head: ExprRef, leaves: Vec<ExprRef>) -> ExprRef {
        expr::expression(head, leaves)
    }

    pub fn list(&self, leaves: Vec<ExprRef>) -> ExprRef {
        self.call(self.system("List"), leaves)
    }

    pub fn blank(&self) -> ExprRef {
        self.call(self.system("Blank"), vec![])
    }

    pub fn blank_headed(&self, head: &str) -> ExprRef {
        self.call(self.system("Blank"), vec![self.system(head)])
    }

    pub fn var(&self, name: &str) -> ExprRef {
        self.call(
            self.system("Pattern"),
            vec![self.global(name), self.blank()],
        )
    }

    pub fn var_seq(&self, name: &str) -> ExprRef {
        self.call(
            self.system("Pattern"),
            vec![
                self.global(name),
                self.call(self.system("BlankSequence"), vec![]),
            ],
        )
    }

    pub fn rule_of(&self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.call(self.system("Rule"), vec![lhs, rhs])
    }

    /// Evaluates, panicking on fatal errors.
    pub fn eval(&self, expr: &ExprRef) -> ExprRef {
        evaluate(expr, &self.evaluation).expect("evaluation succeeds")
    }

    /// Evaluates `SetDelayed[lhs, rhs]`.
    pub fn define(&self, lhs: ExprRef, rhs: ExprRef) {
        let assignment = self.call(self.system("SetDelayed"), vec![lhs, rhs]);
        self.eval(&assignment);
    }
}

pub fn int(value: i64) -> ExprRef {
    expr::integer_i64(value)
}

pub fn real(value: f64) -> ExprRef {
    expr::real(value)
}

pub fn string(text: &str) -> ExprRef {
    expr::string(text)
}

pub fn assert_same(actual: &ExprRef, expected: &ExprRef) {
    assert!(
        actual.same(expected),
        "expected {}, got {}",
        expected,
        actual
    );
}
