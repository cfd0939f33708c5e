//! A minimal Lisp dialect interpreter.
//!
//! The pipeline is tokenize, parse, evaluate: [`tokenize`] turns source text
//! into position-tagged tokens, [`parse_program`] assembles them into
//! S-expression [`Value`]s, and [`evaluate`] walks a form against an
//! [`Environment`]. [`run`] does all three over a fresh global environment.
//!
//! The language is deliberately small: numbers are `f64`, the identifier `t`
//! and the empty list are the truth sentinels, functions are `(lambda ...)`
//! values with call-site environment chaining, and the built-in vocabulary
//! lives in a closed registry ([`find_native`]). Runtime failures carry a
//! [`Stacktrace`] of pending calls so the embedder can report not just what
//! failed but the chain of calls that got there.
//!
//! ```
//! use rootlisp::run;
//!
//! let results = run("(defun inc (x) (+ x 1)) (inc 41)").unwrap();
//! assert_eq!(results.last().unwrap().to_string(), "42");
//! ```

mod ast;
mod builtinops;
mod evaluator;
mod parser;
mod stacktrace;
mod tokenizer;

pub use ast::{Lambda, Value, is_true, nil, t, truth};
pub use builtinops::{Arity, NativeFn, NativeOp, OpKind, SpecialForm, find_native};
pub use evaluator::{Environment, Evaluator, create_global_env, evaluate};
pub use parser::parse_program;
pub use stacktrace::{Frame, Stacktrace};
pub use tokenizer::{Pos, Token, tokenize};

/// A failure in the lexical or syntactic layer. Carries the position of the
/// offending character or token.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: Pos,
}

impl ParseError {
    pub fn new(message: impl Into<String>, pos: Pos) -> ParseError {
        ParseError {
            message: message.into(),
            pos,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error at {}: {}", self.pos, self.message)
    }
}

impl std::error::Error for ParseError {}

/// The closed set of runtime failure conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum LispErrorKind {
    /// An identifier with no binding in the environment chain.
    Unbound(String),
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    Arity {
        expected: Arity,
        given: usize,
    },
    /// Structural access past the end of a list, such as `car` of `()`.
    ListBounds(String),
    DivideByZero,
    /// Every `cond` clause tested false.
    NoTrueBranch,
    /// A call head that evaluates to something that is not callable.
    UndefinedFunction(String),
    /// A parse failure surfaced at runtime, through the `parse` built-in.
    Parse(ParseError),
}

impl std::fmt::Display for LispErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LispErrorKind::Unbound(name) => write!(f, "identifier {name} is not bound"),
            LispErrorKind::TypeMismatch { expected, actual } => {
                write!(f, "expected {expected}, got {actual}")
            }
            LispErrorKind::Arity { expected, given } => {
                write!(f, "expected {expected} arguments, got {given}")
            }
            LispErrorKind::ListBounds(message) => write!(f, "{message}"),
            LispErrorKind::DivideByZero => write!(f, "divide by zero"),
            LispErrorKind::NoTrueBranch => write!(f, "cond: no clause evaluated to true"),
            LispErrorKind::UndefinedFunction(head) => {
                write!(f, "function \"{head}\" is undefined")
            }
            LispErrorKind::Parse(err) => write!(f, "{err}"),
        }
    }
}

/// A runtime failure: what went wrong plus the call stack live at the throw
/// site. `Display` renders both.
#[derive(Debug, Clone)]
pub struct LispError {
    pub kind: LispErrorKind,
    pub trace: Stacktrace,
}

impl LispError {
    pub fn new(kind: LispErrorKind, trace: Stacktrace) -> LispError {
        LispError { kind, trace }
    }
}

impl std::fmt::Display for LispError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.trace.render())
    }
}

impl std::error::Error for LispError {}

/// Any failure an embedder can see: a static parse failure or a runtime one.
#[derive(Debug, Clone)]
pub enum Error {
    Parse(ParseError),
    Lisp(LispError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "{err}"),
            Error::Lisp(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(err) => Some(err),
            Error::Lisp(err) => Some(err),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<LispError> for Error {
    fn from(err: LispError) -> Error {
        Error::Lisp(err)
    }
}

/// Parse and evaluate a whole program in a fresh global environment,
/// returning the value of every top-level form.
pub fn run(source: &str) -> Result<Vec<Value>, Error> {
    run_with_env(source, &create_global_env())
}

/// Like [`run`], but against a caller-supplied environment, so definitions
/// persist across invocations. Stops at the first failing form.
pub fn run_with_env(source: &str, env: &Environment) -> Result<Vec<Value>, Error> {
    let forms = parse_program(source)?;
    let mut results = Vec::with_capacity(forms.len());
    for form in &forms {
        results.push(evaluate(form, env, &Stacktrace::new())?);
    }
    Ok(results)
}
