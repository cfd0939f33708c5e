//! Core [`Value`] type shared by the parser and the evaluator. The
//! interpreter does not separate syntax from runtime values: the same variant
//! set flows out of the parser, through evaluation, and back to the embedder.
//! Lists double as S-expressions, cons pairs, and the boolean-false sentinel;
//! the identifier `t` is canonical true. Equality ignores source positions so
//! that parsed and runtime-built values compare structurally, and `Display`
//! renders a parseable form for everything except native handles.

use std::rc::Rc;

use crate::builtinops::NativeOp;
use crate::tokenizer::Pos;

/// A user-defined function: a pure `{params, body}` pair with an optional
/// name for diagnostics. No defining environment is captured; a call frame's
/// parent is always the environment active at the call site.
#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Value,
    pub name: Option<String>,
}

/// AST node and runtime value in one.
#[derive(Debug, Clone)]
pub enum Value {
    /// An identifier; the position is `Some` when the parser produced it and
    /// `None` when it was synthesized at runtime. Ignored by equality.
    Identifier(String, Option<Pos>),
    Number(f64),
    Str(String),
    /// The universal compound. `List([])` is the canonical false sentinel.
    List(Vec<Value>),
    Function(Rc<Lambda>),
    Native(&'static NativeOp),
}

/// The canonical true sentinel, the identifier `t`.
pub fn t() -> Value {
    Value::Identifier("t".to_owned(), None)
}

/// The canonical false sentinel, the empty list.
pub fn nil() -> Value {
    Value::List(Vec::new())
}

/// Map a host boolean onto the truth sentinels.
pub fn truth(condition: bool) -> Value {
    if condition {
        t()
    } else {
        nil()
    }
}

/// Only the identifier `t` counts as true; built-ins never test anything
/// else for truthiness except through explicit predicates.
pub fn is_true(value: &Value) -> bool {
    matches!(value, Value::Identifier(name, _) if name == "t")
}

impl Value {
    /// Best-effort source position for diagnostics: an identifier's own
    /// position, or the position of a list's first element.
    pub fn pos(&self) -> Option<Pos> {
        match self {
            Value::Identifier(_, pos) => *pos,
            Value::List(items) => items.first().and_then(Value::pos),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::List(items) if items.is_empty())
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Identifier(..) => "identifier",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Identifier(a, _), Value::Identifier(b, _)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Functions compare by identity; structural equality would make
            // separately constructed closures spuriously equal.
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Identifier(name, _) => write!(f, "{name}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Function(lambda) => {
                write!(f, "(lambda (")?;
                for (i, param) in lambda.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") {})", lambda.body)
            }
            Value::Native(op) => write!(f, "#<native:{}>", op.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Pos;

    fn ident(name: &str) -> Value {
        Value::Identifier(name.to_owned(), None)
    }

    #[test]
    fn test_truth_sentinels() {
        assert!(is_true(&t()));
        assert!(!is_true(&nil()));
        assert!(!is_true(&Value::Number(1.0)));
        assert_eq!(truth(true), t());
        assert_eq!(truth(false), nil());
        assert!(nil().is_nil());
        assert!(!Value::List(vec![ident("a")]).is_nil());
    }

    #[test]
    fn test_equality_ignores_positions() {
        let parsed = Value::Identifier(
            "x".to_owned(),
            Some(Pos {
                line: 3,
                column: 7,
                offset: 40,
            }),
        );
        assert_eq!(parsed, ident("x"));
        assert_ne!(ident("x"), ident("y"));
        assert_ne!(ident("x"), Value::Str("x".to_owned()));
    }

    #[test]
    fn test_function_equality_is_identity() {
        let lambda = Rc::new(Lambda {
            params: vec!["x".to_owned()],
            body: ident("x"),
            name: None,
        });
        let same = Value::Function(lambda.clone());
        let also_same = Value::Function(lambda);
        let structurally_equal = Value::Function(Rc::new(Lambda {
            params: vec!["x".to_owned()],
            body: ident("x"),
            name: None,
        }));
        assert_eq!(same, also_same);
        assert_ne!(same, structurally_equal);
    }

    #[test]
    fn test_display_renders_parseable_forms() {
        let cases = vec![
            (Value::Number(3.0), "3"),
            (Value::Number(2.5), "2.5"),
            (Value::Number(-7.0), "-7"),
            (ident("foo-bar?"), "foo-bar?"),
            (Value::Str("a\"b\\c".to_owned()), r#""a\"b\\c""#),
            (nil(), "()"),
            (
                Value::List(vec![ident("cons"), Value::Number(1.0), nil()]),
                "(cons 1 ())",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_display_function() {
        let lambda = Value::Function(Rc::new(Lambda {
            params: vec!["x".to_owned(), "y".to_owned()],
            body: Value::List(vec![ident("cons"), ident("x"), ident("y")]),
            name: Some("pair".to_owned()),
        }));
        assert_eq!(lambda.to_string(), "(lambda (x y) (cons x y))");
    }
}
