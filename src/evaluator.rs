//! Tree-walking evaluator and the environment model behind it.
//!
//! Environments are mutable binding frames chained through parent links. The
//! chain follows call sites, not definition sites: applying a function opens a
//! fresh frame whose parent is the environment active at the call, so free
//! identifiers in a body resolve through whoever is calling. Functions carry
//! no captured environment at all.
//!
//! Failures propagate as [`LispError`]s carrying the [`Stacktrace`] that was
//! live at the throw site; the evaluator itself never panics on user input.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Lambda, Value, is_true, nil};
use crate::builtinops::{Arity, OpKind, SpecialForm, natives};
use crate::stacktrace::Stacktrace;
use crate::{LispError, LispErrorKind};

/// A binding frame with a parent link. Cheap to clone; all clones share the
/// same underlying frame, so a binding made through one handle is visible
/// through every other.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    frame: Rc<RefCell<Frame>>,
}

#[derive(Debug, Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

impl Environment {
    /// An empty root environment with no bindings and no parent.
    pub fn new() -> Environment {
        Environment::default()
    }

    /// A fresh frame whose lookups fall through to `parent`.
    pub fn child(parent: &Environment) -> Environment {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                bindings: HashMap::new(),
                parent: Some(parent.clone()),
            })),
        }
    }

    /// Resolve `name` in this frame or the nearest ancestor that binds it.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let frame = self.frame.borrow();
        if let Some(value) = frame.bindings.get(name) {
            return Some(value.clone());
        }
        frame.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    /// Bind `name` in this frame, shadowing any ancestor binding.
    pub fn bind(&self, name: String, value: Value) {
        self.frame.borrow_mut().bindings.insert(name, value);
    }
}

/// A root environment with every built-in operation bound under its name.
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for op in natives() {
        env.bind(op.name.to_owned(), Value::Native(op));
    }
    env
}

/// Evaluate one expression with default settings. Most embedders want this;
/// construct an [`Evaluator`] directly to observe intermediate evaluations.
pub fn evaluate(expr: &Value, env: &Environment, trace: &Stacktrace) -> Result<Value, LispError> {
    Evaluator::new().eval(expr, env, trace)
}

/// The evaluator proper. Stateless except for an optional trace sink invoked
/// with every expression before it is evaluated, which embedders use for
/// step-level debugging output.
#[derive(Default)]
pub struct Evaluator<'t> {
    sink: Option<&'t mut dyn FnMut(&Value)>,
}

impl<'t> Evaluator<'t> {
    pub fn new() -> Evaluator<'static> {
        Evaluator { sink: None }
    }

    pub fn with_sink(sink: &'t mut dyn FnMut(&Value)) -> Evaluator<'t> {
        Evaluator { sink: Some(sink) }
    }

    /// Evaluate `expr` in `env`. `trace` is the pending-call stack of the
    /// caller; it travels into sub-evaluations and onto any error raised.
    pub fn eval(
        &mut self,
        expr: &Value,
        env: &Environment,
        trace: &Stacktrace,
    ) -> Result<Value, LispError> {
        if let Some(sink) = self.sink.as_mut() {
            sink(expr);
        }

        match expr {
            Value::Number(_) | Value::Str(_) | Value::Function(_) | Value::Native(_) => {
                Ok(expr.clone())
            }
            Value::Identifier(name, _) => env.lookup(name).ok_or_else(|| {
                LispError::new(
                    LispErrorKind::Unbound(name.clone()),
                    trace.pin_error(expr.clone()),
                )
            }),
            Value::List(items) => match items.as_slice() {
                [] => Ok(nil()),
                [head, args @ ..] => self.eval_call(expr, head, args, env, trace),
            },
        }
    }

    fn eval_call(
        &mut self,
        call: &Value,
        head: &Value,
        args: &[Value],
        env: &Environment,
        trace: &Stacktrace,
    ) -> Result<Value, LispError> {
        let mut callee = self.eval(head, env, trace)?;

        // A call head may evaluate to quoted source, typically a quoted
        // lambda form passed through a parameter. Keep evaluating until it
        // resolves to something callable. The empty list is excluded; it is
        // a value, and it would loop forever.
        while matches!(&callee, Value::List(items) if !items.is_empty()) {
            callee = self.eval(&callee, env, trace)?;
        }

        let head_pos = head.pos();
        match callee {
            Value::Native(op) => {
                // Push the frame before the arity check so the failure
                // report names the operation being called.
                let call_trace = trace.push(Some(op.name.to_owned()), head_pos, call.clone());
                op.arity
                    .check(args.len())
                    .map_err(|kind| LispError::new(kind, call_trace.clone()))?;
                match op.kind {
                    OpKind::Special(form) => self.eval_special(form, args, env, &call_trace),
                    OpKind::Function(function) => {
                        let mut evaluated = Vec::with_capacity(args.len());
                        for arg in args {
                            evaluated.push(self.eval(arg, env, trace)?);
                        }
                        function(&evaluated, env, &call_trace)
                    }
                }
            }
            Value::Function(lambda) => {
                let call_trace = trace.push(lambda.name.clone(), head_pos, call.clone());
                Arity::Exact(lambda.params.len())
                    .check(args.len())
                    .map_err(|kind| LispError::new(kind, call_trace.clone()))?;

                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg, env, trace)?);
                }

                let frame = Environment::child(env);
                for (param, value) in lambda.params.iter().zip(evaluated) {
                    frame.bind(param.clone(), value);
                }
                self.eval(&lambda.body, &frame, &call_trace)
            }
            other => Err(LispError::new(
                LispErrorKind::UndefinedFunction(other.to_string()),
                trace.pin_error(head.clone()),
            )),
        }
    }

    /// Dispatch a special form over its raw, unevaluated arguments. Arity was
    /// already checked by the caller.
    fn eval_special(
        &mut self,
        form: SpecialForm,
        args: &[Value],
        env: &Environment,
        trace: &Stacktrace,
    ) -> Result<Value, LispError> {
        match form {
            SpecialForm::Quote => Ok(args[0].clone()),
            SpecialForm::Cond => self.eval_cond(args, env, trace),
            SpecialForm::Lambda => make_lambda(&args[0], &args[1], None, trace),
            SpecialForm::Defun => {
                let Value::Identifier(name, _) = &args[0] else {
                    return Err(type_failure("identifier", &args[0], trace));
                };
                let function = make_lambda(&args[1], &args[2], Some(name.clone()), trace)?;
                env.bind(name.clone(), function.clone());
                Ok(function)
            }
            SpecialForm::Label => {
                let Value::Identifier(name, _) = &args[0] else {
                    return Err(type_failure("identifier", &args[0], trace));
                };
                let value = self.eval(&args[1], env, trace)?;
                env.bind(name.clone(), value.clone());
                Ok(value)
            }
        }
    }

    /// Try each `(test consequent)` clause left to right. The first test that
    /// yields true selects its consequent; later clauses are never touched.
    fn eval_cond(
        &mut self,
        clauses: &[Value],
        env: &Environment,
        trace: &Stacktrace,
    ) -> Result<Value, LispError> {
        for clause in clauses {
            let Value::List(pair) = clause else {
                return Err(type_failure("clause of the form (test consequent)", clause, trace));
            };
            let [test, consequent] = pair.as_slice() else {
                return Err(type_failure(
                    "clause of the form (test consequent)",
                    clause,
                    trace,
                ));
            };
            if is_true(&self.eval(test, env, trace)?) {
                return self.eval(consequent, env, trace);
            }
        }
        Err(LispError::new(LispErrorKind::NoTrueBranch, trace.clone()))
    }
}

/// Build a function value from raw parameter-list and body syntax.
fn make_lambda(
    params_ast: &Value,
    body: &Value,
    name: Option<String>,
    trace: &Stacktrace,
) -> Result<Value, LispError> {
    let Value::List(items) = params_ast else {
        return Err(type_failure("parameter list", params_ast, trace));
    };
    let mut params = Vec::with_capacity(items.len());
    for item in items {
        let Value::Identifier(param, _) = item else {
            return Err(type_failure("identifier", item, trace));
        };
        params.push(param.clone());
    }
    Ok(Value::Function(Rc::new(Lambda {
        params,
        body: body.clone(),
        name,
    })))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::t;
    use crate::parser::parse_program;

    /// Evaluate every form of `source` in one fresh global environment and
    /// return the last result.
    fn eval_source(source: &str) -> Result<Value, LispError> {
        let env = create_global_env();
        eval_in(source, &env)
    }

    fn eval_in(source: &str, env: &Environment) -> Result<Value, LispError> {
        let forms = parse_program(source).expect("parse should succeed");
        let mut last = nil();
        for form in &forms {
            last = evaluate(form, env, &Stacktrace::new())?;
        }
        Ok(last)
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn ident(name: &str) -> Value {
        Value::Identifier(name.to_owned(), None)
    }

    #[test]
    fn test_eval_basics() {
        let cases = vec![
            ("3", num(3.0)),
            ("\"hello\"", Value::Str("hello".to_owned())),
            ("()", nil()),
            ("(+ 1 2)", num(3.0)),
            ("(* (+ 1 2) (- 10 6))", num(12.0)),
            ("(car (cdr (cons 1 (cons 2 3))))", num(2.0)),
            ("(atom 1)", t()),
            ("(atom '(1 2))", nil()),
            ("(atom ())", t()),
            ("(eq 'a 'a)", t()),
            ("(eq 'a 'b)", nil()),
            ("(quote (a b))", Value::List(vec![ident("a"), ident("b")])),
            ("'x", ident("x")),
            ("(list 1 2 3)", Value::List(vec![num(1.0), num(2.0), num(3.0)])),
            ("(begin 1 2 3)", num(3.0)),
        ];
        for (source, expected) in cases {
            assert_eq!(eval_source(source).expect(source), expected, "{source}");
        }
    }

    #[test]
    fn test_lambda_application() {
        assert_eq!(
            eval_source("((lambda (x) (cons x '(b))) 'a)").expect("lambda call"),
            Value::List(vec![ident("a"), ident("b")]),
        );
    }

    #[test]
    fn test_quoted_lambda_in_call_position() {
        // The head resolves to quoted source, which is evaluated again until
        // it becomes an actual function.
        assert_eq!(
            eval_source("((lambda (f) (f '(b c))) '(lambda (x) (cons 'a x)))")
                .expect("quoted lambda"),
            Value::List(vec![ident("a"), ident("b"), ident("c")]),
        );
    }

    #[test]
    fn test_defun_and_call() {
        assert_eq!(
            eval_source("(defun inc (x) (+ x 1)) (inc 5)").expect("defun"),
            num(6.0),
        );
    }

    #[test]
    fn test_defun_returns_the_function() {
        let result = eval_source("(defun id (x) x)").expect("defun");
        assert!(matches!(result, Value::Function(_)));
        assert_eq!(result.to_string(), "(lambda (x) x)");
    }

    #[test]
    fn test_label_binds_and_returns() {
        let env = create_global_env();
        assert_eq!(eval_in("(label x (+ 1 2))", &env).expect("label"), num(3.0));
        assert_eq!(env.lookup("x"), Some(num(3.0)));
        assert_eq!(eval_in("(+ x x)", &env).expect("use"), num(6.0));
    }

    #[test]
    fn test_recursion_through_dynamic_scope() {
        // The recursive call resolves `dec` through the call-site chain back
        // to the global frame where defun bound it.
        let source = "(defun dec (x) (cond ((eq x 0) 'done) ('t (dec (- x 1))))) (dec 5)";
        assert_eq!(eval_source(source).expect("recursion"), ident("done"));
    }

    #[test]
    fn test_call_site_environment_chaining() {
        // `y` is free in the body of `f`; it resolves through the frame of
        // the caller `g`, not through where `f` was defined.
        let source = "(defun f () y) (defun g (y) (f)) (g 42)";
        assert_eq!(eval_source(source).expect("dynamic scope"), num(42.0));
    }

    #[test]
    fn test_cond_selects_first_true_clause() {
        let cases = vec![
            ("(cond ('t 1) ('t 2))", num(1.0)),
            ("(cond (() 1) ('t 2))", num(2.0)),
            ("(cond ((eq 1 2) 'a) ((eq 1 1) 'b) ('t 'c))", ident("b")),
        ];
        for (source, expected) in cases {
            assert_eq!(eval_source(source).expect(source), expected, "{source}");
        }
    }

    #[test]
    fn test_cond_evaluates_at_most_one_consequent() {
        // Consequents bind through label; only the selected one runs.
        let env = create_global_env();
        eval_in(
            "(cond (() (label first 1)) ('t (label second 2)) ('t (label third 3)))",
            &env,
        )
        .expect("cond");
        assert_eq!(env.lookup("first"), None);
        assert_eq!(env.lookup("second"), Some(num(2.0)));
        assert_eq!(env.lookup("third"), None);
    }

    #[test]
    fn test_cond_no_true_branch() {
        let err = eval_source("(cond (() 1) ((eq 1 2) 2))").expect_err("should fail");
        assert_eq!(err.kind, LispErrorKind::NoTrueBranch);
    }

    #[test]
    fn test_cond_malformed_clause() {
        let err = eval_source("(cond (1))").expect_err("should fail");
        assert!(matches!(err.kind, LispErrorKind::TypeMismatch { .. }));

        let err = eval_source("(cond 5)").expect_err("should fail");
        assert!(matches!(err.kind, LispErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_unbound_identifier() {
        let err = eval_source("(+ 1 nope)").expect_err("should fail");
        assert_eq!(err.kind, LispErrorKind::Unbound("nope".to_owned()));
    }

    #[test]
    fn test_undefined_function() {
        let err = eval_source("(1 2)").expect_err("should fail");
        assert_eq!(err.kind, LispErrorKind::UndefinedFunction("1".to_owned()));
    }

    #[test]
    fn test_arity_failure_reports_callee() {
        let err = eval_source("(cons 1)").expect_err("should fail");
        assert_eq!(
            err.kind,
            LispErrorKind::Arity {
                expected: Arity::Exact(2),
                given: 1
            }
        );
        assert_eq!(err.trace.innermost_name(), Some("cons"));
    }

    #[test]
    fn test_arity_failure_leaves_environment_unchanged() {
        let env = create_global_env();
        eval_in("(defun two (a b) (+ a b))", &env).expect("defun");
        let err = eval_in("(two 1)", &env).expect_err("should fail");
        assert!(matches!(err.kind, LispErrorKind::Arity { .. }));
        // The parameter was never bound anywhere the caller can see.
        assert_eq!(env.lookup("a"), None);
    }

    #[test]
    fn test_divide_by_zero_trace_names_the_division() {
        let err = eval_source("(/ 1 2 0)").expect_err("should fail");
        assert_eq!(err.kind, LispErrorKind::DivideByZero);
        assert_eq!(err.trace.innermost_name(), Some("/"));
    }

    #[test]
    fn test_stacktrace_frames_in_call_order() {
        let source = "
            (defun my-failing-func (x) (/ 1 x))
            (defun test (x) (my-failing-func x))
            (test 0)";
        let err = eval_source(source).expect_err("should fail");
        assert_eq!(err.kind, LispErrorKind::DivideByZero);
        let names: Vec<_> = err
            .trace
            .frames()
            .into_iter()
            .map(|f| f.name.unwrap_or_else(|| "lambda".to_owned()))
            .collect();
        assert_eq!(names, vec!["test", "my-failing-func", "/"]);
    }

    #[test]
    fn test_stacktrace_anonymous_lambda_frame() {
        let err = eval_source("((lambda (x) (/ 1 x)) 0)").expect_err("should fail");
        let frames = err.trace.frames();
        assert_eq!(frames[0].name, None);
        assert_eq!(frames[1].name.as_deref(), Some("/"));
    }

    #[test]
    fn test_lambda_malformed_params() {
        let err = eval_source("(lambda 5 x)").expect_err("should fail");
        assert!(matches!(err.kind, LispErrorKind::TypeMismatch { .. }));

        let err = eval_source("(lambda (1) x)").expect_err("should fail");
        assert!(matches!(err.kind, LispErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_defun_requires_identifier_name() {
        let err = eval_source("(defun 5 (x) x)").expect_err("should fail");
        assert!(matches!(err.kind, LispErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_eval_native_reenters_evaluator() {
        assert_eq!(
            eval_source("(eval '(+ 1 2))").expect("eval"),
            num(3.0),
        );
        assert_eq!(
            eval_source("(eval (car (parse \"(+ 2 3)\")))").expect("parse+eval"),
            num(5.0),
        );
    }

    #[test]
    fn test_parameter_shadows_global() {
        assert_eq!(
            eval_source("(label x 1) ((lambda (x) x) 2)").expect("shadow"),
            num(2.0),
        );
    }

    #[test]
    fn test_sink_observes_every_evaluation() {
        let forms = parse_program("(+ 1 2)").expect("parse");
        let env = create_global_env();
        let mut seen = Vec::new();
        let mut record = |value: &Value| seen.push(value.to_string());
        let mut evaluator = Evaluator::with_sink(&mut record);
        evaluator
            .eval(&forms[0], &env, &Stacktrace::new())
            .expect("eval");
        assert_eq!(seen, vec!["(+ 1 2)", "+", "1", "2"]);
    }
}
