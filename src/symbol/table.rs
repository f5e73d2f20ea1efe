//! The symbol table: interning, well-known symbols, and the System
//! bootstrap.
//!
//! The table is the only process-wide mutable structure: a lock-protected
//! map from full name to symbol. Hosts create one `Definitions` per kernel
//! instance; tests create fresh ones, which resets all symbol state.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::expr::{self, ExprRef};
use crate::symbol::{Attributes, Symbol, SymbolRef};

/// Handles to the symbols the evaluator consults on hot paths, plus a few
/// shared constant expressions.
pub struct Symbols {
    pub list: SymbolRef,
    pub sequence: SymbolRef,
    pub plus: SymbolRef,
    pub times: SymbolRef,
    pub power: SymbolRef,
    pub minus: SymbolRef,
    pub subtract: SymbolRef,
    pub rule: SymbolRef,
    pub rule_delayed: SymbolRef,
    pub set: SymbolRef,
    pub set_delayed: SymbolRef,
    pub up_set: SymbolRef,
    pub up_set_delayed: SymbolRef,
    pub hold: SymbolRef,
    pub hold_complete: SymbolRef,
    pub hold_pattern: SymbolRef,
    pub function: SymbolRef,
    pub slot: SymbolRef,
    pub thread: SymbolRef,
    pub range: SymbolRef,
    pub same_q: SymbolRef,
    pub equal: SymbolRef,
    pub head: SymbolRef,
    pub length: SymbolRef,
    pub attributes: SymbolRef,
    pub n: SymbolRef,
    pub expand: SymbolRef,
    pub default: SymbolRef,
    pub general: SymbolRef,
    pub message_name: SymbolRef,
    pub pattern: SymbolRef,
    pub blank: SymbolRef,
    pub blank_sequence: SymbolRef,
    pub blank_null_sequence: SymbolRef,
    pub alternatives: SymbolRef,
    pub repeated: SymbolRef,
    pub repeated_null: SymbolRef,
    pub except: SymbolRef,
    pub optional: SymbolRef,
    pub options_pattern: SymbolRef,
    pub option_value: SymbolRef,
    pub pattern_test: SymbolRef,
    pub condition: SymbolRef,
    pub verbatim: SymbolRef,
    pub shortest: SymbolRef,
    pub longest: SymbolRef,
    pub string_expression: SymbolRef,
    pub word_boundary: SymbolRef,
    pub true_: SymbolRef,
    pub false_: SymbolRef,
    pub null: SymbolRef,
    pub infinity: SymbolRef,
    pub automatic: SymbolRef,
    // atom heads
    pub integer: SymbolRef,
    pub rational: SymbolRef,
    pub real: SymbolRef,
    pub complex: SymbolRef,
    pub string: SymbolRef,
    pub symbol: SymbolRef,
    // box language
    pub style_box: SymbolRef,
    pub row_box: SymbolRef,
    pub superscript_box: SymbolRef,
    pub show_string_characters: SymbolRef,
    pub number_form: SymbolRef,
    // output forms
    pub standard_form: SymbolRef,
    pub output_form: SymbolRef,
    pub full_form: SymbolRef,
    pub input_form: SymbolRef,
    pub traditional_form: SymbolRef,
    // shared constants
    pub zero: ExprRef,
    pub one: ExprRef,
    pub minus_one: ExprRef,
    pub true_expr: ExprRef,
    pub false_expr: ExprRef,
    pub null_expr: ExprRef,
}

pub struct Definitions {
    table: RwLock<FxHashMap<String, SymbolRef>>,
    symbols: OnceCell<Symbols>,
}

impl Definitions {
    pub fn new() -> Arc<Definitions> {
        let definitions = Arc::new(Definitions {
            table: RwLock::new(FxHashMap::default()),
            symbols: OnceCell::new(),
        });

        let symbols = Symbols::bootstrap(&definitions);
        let _ = definitions.symbols.set(symbols);

        bootstrap_attributes(&definitions);
        bootstrap_messages(&definitions);
        bootstrap_defaults(&definitions);
        crate::eval::builtins::register(&definitions);

        definitions
    }

    /// Interns a symbol by full name, creating it on first sight.
    pub fn lookup(&self, full_name: &str) -> SymbolRef {
        if let Some(sym) = self.table.read().get(full_name) {
            return Arc::clone(sym);
        }
        let mut table = self.table.write();
        if let Some(sym) = table.get(full_name) {
            return Arc::clone(sym);
        }
        let sym = Symbol::create(full_name);
        table.insert(full_name.to_string(), Arc::clone(&sym));
        sym
    }

    pub fn lookup_existing(&self, full_name: &str) -> Option<SymbolRef> {
        self.table.read().get(full_name).map(Arc::clone)
    }

    /// `System`-context shorthand.
    pub fn system(&self, short: &str) -> SymbolRef {
        self.lookup(&format!("System`{}", short))
    }

    /// `Global`-context shorthand for user symbols.
    pub fn global(&self, short: &str) -> SymbolRef {
        self.lookup(&format!("Global`{}", short))
    }

    pub fn symbols(&self) -> &Symbols {
        self.symbols.get().expect("symbol table bootstrapped")
    }
}

impl Symbols {
    fn bootstrap(definitions: &Definitions) -> Symbols {
        let s = |name: &str| definitions.system(name);
        let true_ = s("True");
        let false_ = s("False");
        let null = s("Null");
        Symbols {
            list: s("List"),
            sequence: s("Sequence"),
            plus: s("Plus"),
            times: s("Times"),
            power: s("Power"),
            minus: s("Minus"),
            subtract: s("Subtract"),
            rule: s("Rule"),
            rule_delayed: s("RuleDelayed"),
            set: s("Set"),
            set_delayed: s("SetDelayed"),
            up_set: s("UpSet"),
            up_set_delayed: s("UpSetDelayed"),
            hold: s("Hold"),
            hold_complete: s("HoldComplete"),
            hold_pattern: s("HoldPattern"),
            function: s("Function"),
            slot: s("Slot"),
            thread: s("Thread"),
            range: s("Range"),
            same_q: s("SameQ"),
            equal: s("Equal"),
            head: s("Head"),
            length: s("Length"),
            attributes: s("Attributes"),
            n: s("N"),
            expand: s("Expand"),
            default: s("Default"),
            general: s("General"),
            message_name: s("MessageName"),
            pattern: s("Pattern"),
            blank: s("Blank"),
            blank_sequence: s("BlankSequence"),
            blank_null_sequence: s("BlankNullSequence"),
            alternatives: s("Alternatives"),
            repeated: s("Repeated"),
            repeated_null: s("RepeatedNull"),
            except: s("Except"),
            optional: s("Optional"),
            options_pattern: s("OptionsPattern"),
            option_value: s("OptionValue"),
            pattern_test: s("PatternTest"),
            condition: s("Condition"),
            verbatim: s("Verbatim"),
            shortest: s("Shortest"),
            longest: s("Longest"),
            string_expression: s("StringExpression"),
            word_boundary: s("WordBoundary"),
            infinity: s("Infinity"),
            automatic: s("Automatic"),
            integer: s("Integer"),
            rational: s("Rational"),
            real: s("Real"),
            complex: s("Complex"),
            string: s("String"),
            symbol: s("Symbol"),
            style_box: s("StyleBox"),
            row_box: s("RowBox"),
            superscript_box: s("SuperscriptBox"),
            show_string_characters: s("ShowStringCharacters"),
            number_form: s("NumberForm"),
            standard_form: s("StandardForm"),
            output_form: s("OutputForm"),
            full_form: s("FullForm"),
            input_form: s("InputForm"),
            traditional_form: s("TraditionalForm"),
            zero: expr::integer_i64(0),
            one: expr::integer_i64(1),
            minus_one: expr::integer_i64(-1),
            true_expr: expr::symbol(Arc::clone(&true_)),
            false_expr: expr::symbol(Arc::clone(&false_)),
            null_expr: expr::symbol(Arc::clone(&null)),
            true_,
            false_,
            null,
        }
    }
}

fn bootstrap_attributes(definitions: &Definitions) {
    use Attributes as A;
    let set = |name: &str, attrs: Attributes| {
        definitions
            .system(name)
            .set_attributes(attrs)
            .expect("bootstrap attributes are hold-consistent");
    };

    let arithmetic = A::FLAT | A::LISTABLE | A::NUMERIC_FUNCTION | A::ONE_IDENTITY | A::ORDERLESS | A::PROTECTED;
    set("Plus", arithmetic);
    set("Times", arithmetic);
    set("Power", A::LISTABLE | A::NUMERIC_FUNCTION | A::ONE_IDENTITY | A::PROTECTED);
    set("Minus", A::LISTABLE | A::NUMERIC_FUNCTION | A::PROTECTED);
    set("Subtract", A::LISTABLE | A::NUMERIC_FUNCTION | A::PROTECTED);
    set("List", A::LOCKED | A::PROTECTED);
    set("Range", A::LISTABLE | A::PROTECTED);

    set("Set", A::HOLD_FIRST | A::PROTECTED | A::SEQUENCE_HOLD);
    set("SetDelayed", A::HOLD_ALL | A::PROTECTED | A::SEQUENCE_HOLD);
    set("UpSet", A::HOLD_FIRST | A::PROTECTED | A::SEQUENCE_HOLD);
    set("UpSetDelayed", A::HOLD_ALL | A::PROTECTED | A::SEQUENCE_HOLD);
    set("Rule", A::PROTECTED | A::SEQUENCE_HOLD);
    set("RuleDelayed", A::HOLD_REST | A::PROTECTED | A::SEQUENCE_HOLD);

    set("Hold", A::HOLD_ALL | A::PROTECTED);
    set("HoldComplete", A::HOLD_ALL_COMPLETE | A::PROTECTED);
    set("HoldPattern", A::HOLD_ALL | A::PROTECTED);
    set("Function", A::HOLD_ALL | A::PROTECTED);
    set("Pattern", A::HOLD_FIRST | A::PROTECTED);
    set("Condition", A::HOLD_ALL | A::PROTECTED);
    set("PatternTest", A::HOLD_REST | A::PROTECTED);
    set("Attributes", A::HOLD_ALL | A::LISTABLE | A::PROTECTED);

    for name in [
        "Sequence",
        "Blank",
        "BlankSequence",
        "BlankNullSequence",
        "Alternatives",
        "Repeated",
        "RepeatedNull",
        "Except",
        "Optional",
        "OptionsPattern",
        "OptionValue",
        "Verbatim",
        "Shortest",
        "Longest",
        "StringExpression",
        "Head",
        "Length",
        "SameQ",
        "Equal",
        "Thread",
        "N",
        "Expand",
        "Default",
        "General",
        "MessageName",
        "True",
        "False",
        "Null",
        "Infinity",
        "Automatic",
        "Integer",
        "Rational",
        "Real",
        "Complex",
        "String",
        "Symbol",
        "NumberForm",
        "StyleBox",
        "RowBox",
        "SuperscriptBox",
    ] {
        set(name, Attributes::PROTECTED);
    }
}

fn bootstrap_messages(definitions: &Definitions) {
    let symbols = definitions.symbols();
    symbols
        .thread
        .set_message("tdlen", "Objects of unequal length in `1` cannot be combined.");
    symbols
        .general
        .set_message("optx", "Unknown option `1` in `2`.");
    symbols
        .general
        .set_message("infy", "Infinite expression `1` encountered.");
    symbols
        .general
        .set_message("nmtd", "A numeric exception occurred: `1`.");
    definitions
        .system("Set")
        .set_message("wrsym", "Symbol `1` is Protected.");
}

fn bootstrap_defaults(definitions: &Definitions) {
    let symbols = definitions.symbols();
    // Default[Plus] = 0, Default[Times] = 1: filled into empty Optional
    // captures under the respective heads.
    let default_for = |sym: &SymbolRef, value: &ExprRef| {
        let pattern = expr::expr1(
            expr::symbol(Arc::clone(&symbols.default)),
            expr::symbol(Arc::clone(sym)),
        );
        let rule = Arc::new(crate::symbol::Rule::new(pattern, Arc::clone(value)));
        sym.state_mut().default_rules.add(rule);
    };
    default_for(&symbols.plus, &symbols.zero);
    default_for(&symbols.times, &symbols.one);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let defs = Definitions::new();
        let a = defs.lookup("Global`x");
        let b = defs.lookup("Global`x");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn bootstrap_sets_arithmetic_attributes() {
        let defs = Definitions::new();
        let plus = defs.symbols();
        assert!(plus.plus.has_attribute(Attributes::ORDERLESS));
        assert!(plus.plus.has_attribute(Attributes::FLAT));
        assert!(plus.plus.has_attribute(Attributes::LISTABLE));
        assert!(plus.times.has_attribute(Attributes::NUMERIC_FUNCTION));
    }

    #[test]
    fn hold_attributes_partition() {
        let defs = Definitions::new();
        assert!(defs.symbols().hold.has_attribute(Attributes::HOLD_ALL));
        assert!(defs
            .symbols()
            .hold_complete
            .has_attribute(Attributes::HOLD_ALL_COMPLETE));
        assert!(defs.symbols().set.has_attribute(Attributes::HOLD_FIRST));
    }

    #[test]
    fn messages_are_registered() {
        let defs = Definitions::new();
        assert!(defs.symbols().thread.lookup_message("tdlen").is_some());
        assert!(defs.symbols().general.lookup_message("optx").is_some());
    }

    #[test]
    fn fresh_tables_are_isolated() {
        let defs1 = Definitions::new();
        let defs2 = Definitions::new();
        let x1 = defs1.lookup("Global`x");
        x1.set_own_value(Some(expr::integer_i64(5)));
        let x2 = defs2.lookup("Global`x");
        assert!(x2.own_value().is_none());
    }
}
