//! Diagnostic call-stack tracking. A [`Stacktrace`] is an immutable snapshot:
//! `push` returns a new value sharing the unchanged prefix through an `Rc`
//! tail, so extending is O(1) and a failure can retain the exact trace alive
//! at its throw site without copying. This subsystem never affects control
//! flow; it only travels alongside evaluation and is attached to errors.

use std::rc::Rc;

use crate::ast::Value;
use crate::tokenizer::Pos;

/// One pending call: the callee's name (if it has one), the source position
/// of the call head, and the invoking expression.
#[derive(Debug, Clone)]
pub struct Frame {
    pub name: Option<String>,
    pub pos: Option<Pos>,
    pub call: Value,
}

#[derive(Debug)]
struct Node {
    frame: Frame,
    prev: Option<Rc<Node>>,
}

/// Persistent stack of call frames plus an optional pinned error object, the
/// narrowest failing sub-expression, used for caret rendering.
#[derive(Debug, Clone, Default)]
pub struct Stacktrace {
    top: Option<Rc<Node>>,
    error_object: Option<Value>,
}

impl Stacktrace {
    pub fn new() -> Self {
        Stacktrace::default()
    }

    /// Extend with one frame. The receiver is left untouched.
    pub fn push(&self, name: Option<String>, pos: Option<Pos>, call: Value) -> Stacktrace {
        Stacktrace {
            top: Some(Rc::new(Node {
                frame: Frame { name, pos, call },
                prev: self.top.clone(),
            })),
            error_object: self.error_object.clone(),
        }
    }

    /// Record the narrowest failing sub-expression for caret rendering.
    pub fn pin_error(&self, ast: Value) -> Stacktrace {
        Stacktrace {
            top: self.top.clone(),
            error_object: Some(ast),
        }
    }

    pub fn error_object(&self) -> Option<&Value> {
        self.error_object.as_ref()
    }

    pub fn depth(&self) -> usize {
        let mut count = 0;
        let mut node = self.top.as_ref();
        while let Some(n) = node {
            count += 1;
            node = n.prev.as_ref();
        }
        count
    }

    /// All frames in call order, outermost first.
    pub fn frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut node = self.top.as_ref();
        while let Some(n) = node {
            frames.push(n.frame.clone());
            node = n.prev.as_ref();
        }
        frames.reverse();
        frames
    }

    /// Name of the innermost frame, where the failure happened.
    pub fn innermost_name(&self) -> Option<&str> {
        self.top.as_ref().and_then(|n| n.frame.name.as_deref())
    }

    /// Human-readable trace: the outermost invoking expression, an optional
    /// caret line under the failing column, then one `at <name> (<pos>)` line
    /// per frame in call order.
    pub fn render(&self) -> String {
        let frames = self.frames();
        let mut out = String::new();

        if let Some(outermost) = frames.first() {
            out.push_str("\n\t");
            out.push_str(&outermost.call.to_string());
            out.push('\n');
            if let Some(pos) = self.error_object.as_ref().and_then(Value::pos) {
                out.push('\t');
                for _ in 1..pos.column {
                    out.push(' ');
                }
                out.push_str("^\n");
            }
        }

        let lines: Vec<String> = frames
            .iter()
            .map(|frame| {
                let name = frame.name.as_deref().unwrap_or("lambda");
                match frame.pos {
                    Some(pos) => format!("at {name} ({pos})"),
                    None => format!("at {name}"),
                }
            })
            .collect();
        out.push_str(&lines.join("\n"));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Value, nil};

    fn ident(name: &str) -> Value {
        Value::Identifier(name.to_owned(), None)
    }

    fn ident_at(name: &str, line: u32, column: u32) -> Value {
        Value::Identifier(
            name.to_owned(),
            Some(Pos {
                line,
                column,
                offset: column as usize - 1,
            }),
        )
    }

    #[test]
    fn test_push_leaves_receiver_untouched() {
        let empty = Stacktrace::new();
        let one = empty.push(Some("f".to_owned()), None, nil());
        let two = one.push(Some("g".to_owned()), None, nil());

        assert_eq!(empty.depth(), 0);
        assert_eq!(one.depth(), 1);
        assert_eq!(two.depth(), 2);
        assert_eq!(one.innermost_name(), Some("f"));
        assert_eq!(two.innermost_name(), Some("g"));
    }

    #[test]
    fn test_frames_in_call_order() {
        let trace = Stacktrace::new()
            .push(Some("outer".to_owned()), None, nil())
            .push(Some("inner".to_owned()), None, nil());
        let names: Vec<_> = trace.frames().into_iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![Some("outer".to_owned()), Some("inner".to_owned())]
        );
    }

    #[test]
    fn test_shared_tail_branches() {
        // Two extensions of the same prefix see their own frame only.
        let base = Stacktrace::new().push(Some("base".to_owned()), None, nil());
        let left = base.push(Some("left".to_owned()), None, nil());
        let right = base.push(Some("right".to_owned()), None, nil());
        assert_eq!(left.innermost_name(), Some("left"));
        assert_eq!(right.innermost_name(), Some("right"));
        assert_eq!(base.depth(), 1);
    }

    #[test]
    fn test_render_with_caret() {
        let call = Value::List(vec![ident_at("/", 1, 2), Value::Number(1.0)]);
        let trace = Stacktrace::new()
            .push(
                Some("/".to_owned()),
                Some(Pos {
                    line: 1,
                    column: 2,
                    offset: 1,
                }),
                call,
            )
            .pin_error(ident_at("/", 1, 2));

        let rendered = trace.render();
        assert!(rendered.contains("(/ 1)"), "got: {rendered}");
        assert!(rendered.contains("\t ^\n"), "got: {rendered}");
        assert!(rendered.contains("at / (1:2)"), "got: {rendered}");
    }

    #[test]
    fn test_render_anonymous_frame() {
        let trace = Stacktrace::new().push(None, None, ident("x"));
        assert!(trace.render().contains("at lambda"));
    }

    #[test]
    fn test_empty_render() {
        assert_eq!(Stacktrace::new().render(), "");
    }
}
