//! Built-in operation registry and native procedure implementations.
//!
//! Every host-implemented callable is a [`NativeOp`]: a name, an arity
//! declaration, and an [`OpKind`]. Ordinary operations receive their
//! arguments already evaluated; special forms are a closed [`SpecialForm`]
//! variant resolved once when the registry is built, and the evaluator hands
//! them raw ASTs according to each form's suppression rule. There is no
//! runtime property probing to decide which positions evaluate.
//!
//! Error policy: arity and type checks fail with the domain taxonomy before
//! any side effect, and no native lets a lower-level failure (such as a
//! `ParseError` from re-entering the parser) cross back into the evaluator
//! untranslated.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::ast::{Value, nil, truth};
use crate::evaluator::{Environment, evaluate};
use crate::stacktrace::Stacktrace;
use crate::{LispError, LispErrorKind};

/// Canonical native procedure signature: evaluated arguments, the environment
/// active at the call site, and the stacktrace including the native's own
/// frame for attaching to failures.
pub type NativeFn = fn(&[Value], &Environment, &Stacktrace) -> Result<Value, LispError>;

/// Declared argument count bounds for a callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub(crate) fn check(self, given: usize) -> Result<(), LispErrorKind> {
        let ok = match self {
            Arity::Exact(n) => given == n,
            Arity::AtLeast(n) => given >= n,
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(LispErrorKind::Arity {
                expected: self,
                given,
            })
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// The closed set of special forms. Each dictates which argument positions
/// the evaluator passes as raw syntax: all of them for `Quote`, `Cond`,
/// `Lambda`, and `Defun`; only the name position for `Label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    Cond,
    Lambda,
    Defun,
    Label,
}

/// Implementation of a built-in: an ordinary function over evaluated
/// arguments, or a special form handled by the evaluator itself.
#[derive(Clone, Copy)]
pub enum OpKind {
    Function(NativeFn),
    Special(SpecialForm),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<native fn>)"),
            OpKind::Special(form) => write!(f, "Special({form:?})"),
        }
    }
}

/// A registered built-in operation.
#[derive(Debug)]
pub struct NativeOp {
    pub name: &'static str,
    pub arity: Arity,
    pub kind: OpKind,
}

//
// Native implementations
//

fn number_arg(value: &Value, trace: &Stacktrace) -> Result<f64, LispError> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(LispError::new(
            LispErrorKind::TypeMismatch {
                expected: "number",
                actual: other.type_name(),
            },
            trace.pin_error(other.clone()),
        )),
    }
}

fn native_add(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let mut sum = 0.0;
    for arg in args {
        sum += number_arg(arg, trace)?;
    }
    Ok(Value::Number(sum))
}

fn native_sub(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    match args {
        [x] => Ok(Value::Number(-number_arg(x, trace)?)),
        [first, rest @ ..] => {
            let mut result = number_arg(first, trace)?;
            for arg in rest {
                result -= number_arg(arg, trace)?;
            }
            Ok(Value::Number(result))
        }
        [] => Err(arity_failure(Arity::AtLeast(1), 0, trace)),
    }
}

fn native_mul(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let mut product = 1.0;
    for arg in args {
        product *= number_arg(arg, trace)?;
    }
    Ok(Value::Number(product))
}

fn native_div(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    match args {
        [x] => Ok(Value::Number(1.0 / number_arg(x, trace)?)),
        [first, divisors @ ..] => {
            let numerator = number_arg(first, trace)?;
            let mut product = 1.0;
            for divisor in divisors {
                let n = number_arg(divisor, trace)?;
                if n == 0.0 {
                    // Before computing the quotient: any zero divisor fails.
                    return Err(LispError::new(LispErrorKind::DivideByZero, trace.clone()));
                }
                product *= n;
            }
            Ok(Value::Number(numerator / product))
        }
        [] => Err(arity_failure(Arity::AtLeast(1), 0, trace)),
    }
}

fn native_atom(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let [value] = args else {
        return Err(arity_failure(Arity::Exact(1), args.len(), trace));
    };
    Ok(truth(!matches!(value, Value::List(items) if !items.is_empty())))
}

fn native_begin(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    args.last()
        .cloned()
        .ok_or_else(|| arity_failure(Arity::AtLeast(1), 0, trace))
}

fn native_car(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let [value] = args else {
        return Err(arity_failure(Arity::Exact(1), args.len(), trace));
    };
    match value {
        Value::List(items) => items.first().cloned().ok_or_else(|| {
            LispError::new(
                LispErrorKind::ListBounds("car of empty list".to_owned()),
                trace.clone(),
            )
        }),
        other => Err(type_failure("list", other, trace)),
    }
}

fn native_cdr(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let [value] = args else {
        return Err(arity_failure(Arity::Exact(1), args.len(), trace));
    };
    match value {
        Value::List(items) if items.is_empty() => Ok(nil()),
        Value::List(items) => Ok(Value::List(items[1..].to_vec())),
        other => Err(type_failure("list", other, trace)),
    }
}

fn native_cons(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let [head, tail] = args else {
        return Err(arity_failure(Arity::Exact(2), args.len(), trace));
    };
    match tail {
        Value::List(items) => {
            let mut list = Vec::with_capacity(items.len() + 1);
            list.push(head.clone());
            list.extend_from_slice(items);
            Ok(Value::List(list))
        }
        // Prepending onto an atom yields a two-element list.
        atom => Ok(Value::List(vec![head.clone(), atom.clone()])),
    }
}

fn native_eq(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let [a, b] = args else {
        return Err(arity_failure(Arity::Exact(2), args.len(), trace));
    };
    Ok(truth(a == b))
}

fn native_eval(args: &[Value], env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let [form] = args else {
        return Err(arity_failure(Arity::Exact(1), args.len(), trace));
    };
    match form {
        Value::List(items) if !items.is_empty() => evaluate(form, env, trace),
        other => Err(type_failure("non-empty list", other, trace)),
    }
}

fn native_list(args: &[Value], _env: &Environment, _trace: &Stacktrace) -> Result<Value, LispError> {
    Ok(Value::List(args.to_vec()))
}

fn native_parse(args: &[Value], _env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    let [source] = args else {
        return Err(arity_failure(Arity::Exact(1), args.len(), trace));
    };
    match source {
        Value::Str(text) => match crate::parser::parse_program(text) {
            Ok(forms) => Ok(Value::List(forms)),
            // Translate the lower-level failure into the domain taxonomy
            // before it crosses back into the evaluator.
            Err(err) => Err(LispError::new(LispErrorKind::Parse(err), trace.clone())),
        },
        other => Err(type_failure("string", other, trace)),
    }
}

fn arity_failure(expected: Arity, given: usize, trace: &Stacktrace) -> LispError {
    LispError::new(LispErrorKind::Arity { expected, given }, trace.clone())
}

fn type_failure(expected: &'static str, actual: &Value, trace: &Stacktrace) -> LispError {
    LispError::new(
        LispErrorKind::TypeMismatch {
            expected,
            actual: actual.type_name(),
        },
        trace.pin_error(actual.clone()),
    )
}

/// Registry of all built-in operations, built once at first use.
static NATIVE_OPS: LazyLock<Vec<NativeOp>> = LazyLock::new(|| {
    vec![
        // Arithmetic
        NativeOp {
            name: "+",
            arity: Arity::AtLeast(0),
            kind: OpKind::Function(native_add),
        },
        NativeOp {
            name: "-",
            arity: Arity::AtLeast(1),
            kind: OpKind::Function(native_sub),
        },
        NativeOp {
            name: "*",
            arity: Arity::AtLeast(0),
            kind: OpKind::Function(native_mul),
        },
        NativeOp {
            name: "/",
            arity: Arity::AtLeast(1),
            kind: OpKind::Function(native_div),
        },
        // Predicates and list operations
        NativeOp {
            name: "atom",
            arity: Arity::Exact(1),
            kind: OpKind::Function(native_atom),
        },
        NativeOp {
            name: "eq",
            arity: Arity::Exact(2),
            kind: OpKind::Function(native_eq),
        },
        NativeOp {
            name: "car",
            arity: Arity::Exact(1),
            kind: OpKind::Function(native_car),
        },
        NativeOp {
            name: "cdr",
            arity: Arity::Exact(1),
            kind: OpKind::Function(native_cdr),
        },
        NativeOp {
            name: "cons",
            arity: Arity::Exact(2),
            kind: OpKind::Function(native_cons),
        },
        NativeOp {
            name: "list",
            arity: Arity::Any,
            kind: OpKind::Function(native_list),
        },
        // Sequencing and re-entry
        NativeOp {
            name: "begin",
            arity: Arity::AtLeast(1),
            kind: OpKind::Function(native_begin),
        },
        NativeOp {
            name: "eval",
            arity: Arity::Exact(1),
            kind: OpKind::Function(native_eval),
        },
        NativeOp {
            name: "parse",
            arity: Arity::Exact(1),
            kind: OpKind::Function(native_parse),
        },
        // Special forms
        NativeOp {
            name: "quote",
            arity: Arity::Exact(1),
            kind: OpKind::Special(SpecialForm::Quote),
        },
        NativeOp {
            name: "cond",
            arity: Arity::AtLeast(1),
            kind: OpKind::Special(SpecialForm::Cond),
        },
        NativeOp {
            name: "lambda",
            arity: Arity::Exact(2),
            kind: OpKind::Special(SpecialForm::Lambda),
        },
        NativeOp {
            name: "defun",
            arity: Arity::Exact(3),
            kind: OpKind::Special(SpecialForm::Defun),
        },
        NativeOp {
            name: "label",
            arity: Arity::Exact(2),
            kind: OpKind::Special(SpecialForm::Label),
        },
    ]
});

/// Map from name to operation for lookups outside global-environment setup.
static NATIVE_INDEX: LazyLock<HashMap<&'static str, &'static NativeOp>> = LazyLock::new(|| {
    let ops: &'static [NativeOp] = NATIVE_OPS.as_slice();
    ops.iter().map(|op| (op.name, op)).collect()
});

/// All registered built-in operations.
pub(crate) fn natives() -> &'static [NativeOp] {
    NATIVE_OPS.as_slice()
}

/// Find a built-in operation by name.
pub fn find_native(name: &str) -> Option<&'static NativeOp> {
    NATIVE_INDEX.get(name).copied()
}
