//! Promises: lazily evaluated, forced-once expressions

use super::env::{EnvRef, Slot};
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::value::Value;
use crate::ast::ExprRef;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Shared reference to a promise
pub type PromiseRef = Rc<Promise>;

/// Forcing state
#[derive(Debug, Clone)]
pub enum PromiseState {
    Unevaluated,
    UnderEvaluation,
    Evaluated(Value),
}

/// A lazily evaluated expression bound to its defining environment
pub struct Promise {
    state: RefCell<PromiseState>,
    expr: Option<ExprRef>,
    /// Released once the promise has been forced
    env: RefCell<Option<EnvRef>>,
    is_default: bool,
    /// Forced from a bare name of a missing argument
    forwarded_missing: Cell<bool>,
    /// Set while [`Promise::forwards_missing`] runs, to stop on cycles
    probing: Cell<bool>,
}

impl Promise {
    pub fn new(expr: ExprRef, env: EnvRef) -> PromiseRef {
        Rc::new(Promise::build(PromiseState::Unevaluated, Some(expr), Some(env), false))
    }

    fn build(state: PromiseState, expr: Option<ExprRef>, env: Option<EnvRef>, is_default: bool) -> Self {
        Promise {
            state: RefCell::new(state),
            expr,
            env: RefCell::new(env),
            is_default,
            forwarded_missing: Cell::new(false),
            probing: Cell::new(false),
        }
    }

    /// Promise for a formal's default expression, evaluated in the callee environment
    pub fn default_arg(expr: ExprRef, env: EnvRef) -> PromiseRef {
        Rc::new(Promise::build(PromiseState::Unevaluated, Some(expr), Some(env), true))
    }

    /// Already evaluated promise, e.g. for values re-passed by dispatch
    pub fn forced(expr: Option<ExprRef>, value: Value) -> PromiseRef {
        Rc::new(Promise::build(PromiseState::Evaluated(value), expr, None, false))
    }

    pub fn expr(&self) -> Option<&ExprRef> {
        self.expr.as_ref()
    }

    /// Defining environment, until forced
    pub fn env(&self) -> Option<EnvRef> {
        self.env.borrow().clone()
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn state(&self) -> PromiseState {
        self.state.borrow().clone()
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(*self.state.borrow(), PromiseState::Evaluated(_))
    }

    /// Cached value, if forced
    pub fn value(&self) -> Option<Value> {
        match &*self.state.borrow() {
            PromiseState::Evaluated(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether the promise stands for an argument that was not supplied: a
    /// default expression, or a bare name of a missing argument where the
    /// promise was created. Still answers after forcing released the environment.
    pub fn forwards_missing(&self) -> bool {
        if self.is_default || self.forwarded_missing.get() {
            return true;
        }
        if self.probing.replace(true) {
            return false;
        }
        let name = self.expr.as_ref().and_then(|e| e.node.as_ident());
        let missing = match (name, self.env()) {
            (Some(name), Some(env)) => argument_is_missing(name, &env).unwrap_or(false),
            _ => false,
        };
        self.probing.set(false);
        missing
    }
}

/// Whether `name` is bound in `env` to an argument that was not supplied;
/// `None` when `env` has no binding for it
pub fn argument_is_missing(name: &str, env: &EnvRef) -> Option<bool> {
    let slot = env.borrow().get(name)?.value.clone();
    Some(match slot {
        Slot::Missing => true,
        Slot::Concrete(Value::VarArgs(bundle)) => bundle.is_empty(),
        Slot::Lazy(promise) => promise.forwards_missing(),
        Slot::Concrete(_) | Slot::Active(_) => false,
    })
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expr = self.expr.as_ref().map(|e| e.node.to_string());
        f.debug_struct("Promise")
            .field("expr", &expr)
            .field("state", &self.state.borrow())
            .field("is_default", &self.is_default)
            .finish()
    }
}

/// Resets an unfinished forcing so an error never leaves the promise stuck
struct EvaluationGuard<'a>(&'a Promise);

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.borrow_mut();
        if matches!(*state, PromiseState::UnderEvaluation) {
            *state = PromiseState::Unevaluated;
        }
    }
}

impl Interpreter {
    /// Force `promise`, evaluating its expression at most once.
    ///
    /// A promise met again while it is being forced is a self-reference and
    /// reads as the missing sentinel.
    pub fn force_promise(&mut self, promise: &PromiseRef) -> InterpResult<Value> {
        match &*promise.state.borrow() {
            PromiseState::Evaluated(value) => return Ok(value.clone()),
            PromiseState::UnderEvaluation => {
                tracing::debug!(
                    expr = %promise.expr.as_ref().map(|e| e.node.to_string()).unwrap_or_default(),
                    "promise already under evaluation, reading as missing"
                );
                return Ok(Value::Missing);
            }
            PromiseState::Unevaluated => {}
        }
        let (Some(expr), Some(env)) = (promise.expr.clone(), promise.env()) else {
            return Err(RuntimeError::internal(
                "unevaluated promise without expression or environment",
            ));
        };

        *promise.state.borrow_mut() = PromiseState::UnderEvaluation;
        let guard = EvaluationGuard(promise);
        let value = self.eval(&expr, &env)?;
        *promise.state.borrow_mut() = PromiseState::Evaluated(value.clone());
        if promise.forwards_missing() {
            promise.forwarded_missing.set(true);
        }
        promise.env.borrow_mut().take();
        drop(guard);
        Ok(value)
    }

    /// Force `value` if it is a promise
    pub fn force_value(&mut self, value: Value) -> InterpResult<Value> {
        match value {
            Value::Promise(promise) => self.force_promise(&promise),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::testing::parse_expr;

    #[test]
    fn test_forcing_is_idempotent() {
        let mut interp = Interpreter::new();
        interp.eval_source("n <- 0").unwrap();
        let promise = Promise::new(
            parse_expr("{ n <<- n + 1; n * 10 }"),
            interp.global_env(),
        );
        assert_eq!(interp.force_promise(&promise).unwrap(), Value::num(10.0));
        assert_eq!(interp.force_promise(&promise).unwrap(), Value::num(10.0));
        assert_eq!(interp.eval_source("n").unwrap(), Value::num(1.0));
        assert!(promise.env().is_none());
    }

    #[test]
    fn test_error_leaves_promise_forceable() {
        let mut interp = Interpreter::new();
        let promise = Promise::new(parse_expr("stop(\"boom\")"), interp.global_env());
        let err = interp.force_promise(&promise).unwrap_err();
        assert_eq!(err.message, "boom");
        assert!(matches!(promise.state(), PromiseState::Unevaluated));
        assert!(interp.force_promise(&promise).is_err());
    }

    #[test]
    fn test_self_reference_reads_as_missing() {
        let mut interp = Interpreter::new();
        let global = interp.global_env();
        let promise = Promise::new(parse_expr("p"), global.clone());
        global
            .borrow_mut()
            .define("p", Slot::Lazy(promise.clone()))
            .unwrap();
        assert_eq!(interp.force_promise(&promise).unwrap(), Value::Missing);
    }

    #[test]
    fn test_forced_promise_needs_no_environment() {
        let mut interp = Interpreter::new();
        let promise = Promise::forced(None, Value::int(3));
        assert!(promise.is_evaluated());
        assert_eq!(interp.force_promise(&promise).unwrap(), Value::int(3));
    }
}
