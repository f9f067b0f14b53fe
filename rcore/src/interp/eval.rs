//! Expression evaluator

use super::args::{Arguments, FormalArguments};
use super::builtins::{self, Builtin, BuiltinKind};
use super::call::{CallSiteCache, Frame, STACK_GROW_SIZE, STACK_RED_ZONE};
use super::env::{self, Assignment, EnvRef, Environment, Slot};
use super::error::{ErrorKind, InterpResult, RuntimeError};
use super::promise::Promise;
use super::resolve::{ExpectedKind, LookupCache, ReadMode};
use super::s3::METHODS_TABLE;
use super::value::{Closure, Value, VectorData};
use crate::ast::{Arg, Constant, Expr, Program, SiteId, Spanned};
use crate::config::Config;
use crate::lexer::tokenize;
use crate::parser::parse;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cross-thread request to stop evaluation, checked at loop iterations and calls
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Destination of `print` and `cat`
#[derive(Debug)]
enum Output {
    Stdout,
    Captured(String),
}

/// The interpreter: one R context
pub struct Interpreter {
    empty_env: EnvRef,
    base_env: EnvRef,
    global_env: EnvRef,
    builtins: HashMap<String, Rc<Builtin>>,
    /// Closure frames, innermost last
    pub(super) frames: Vec<Frame>,
    pub(super) lookup_cache: LookupCache,
    pub(super) call_cache: CallSiteCache,
    pub(super) config: Config,
    /// Logical call depth
    pub(super) depth: usize,
    /// Whether the last value produced should be printed at top level
    pub(super) visible: bool,
    interrupt: InterruptHandle,
    output: Output,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create a new interpreter with default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let empty_env = Environment::new_empty().into_ref();

        let builtins: HashMap<String, Rc<Builtin>> = builtins::registry()
            .into_builtins()
            .into_iter()
            .map(|b| (b.name.clone(), b))
            .collect();
        let mut names: Vec<String> = builtins.keys().cloned().collect();
        names.sort();
        let mut slots: Vec<Slot> = names
            .iter()
            .map(|name| Slot::Concrete(Value::Builtin(Rc::clone(&builtins[name]))))
            .collect();
        // The methods table must exist before base is locked
        let table = env::child_env(&empty_env);
        names.push(METHODS_TABLE.to_string());
        slots.push(Slot::Concrete(Value::Env(table)));
        let base_env = Environment::from_bindings(Rc::clone(&empty_env), names, slots)
            .with_name("base")
            .into_ref();
        base_env.borrow_mut().lock(true);

        let global_env = Environment::named("R_GlobalEnv", Some(Rc::clone(&base_env))).into_ref();
        tracing::debug!(builtins = builtins.len(), "interpreter initialized");

        Interpreter {
            empty_env,
            base_env,
            global_env,
            builtins,
            frames: Vec::new(),
            lookup_cache: LookupCache::new(&config.lookup),
            call_cache: CallSiteCache::new(config.calls.site_cache_size, config.calls.max_sites),
            config,
            depth: 0,
            visible: true,
            interrupt: InterruptHandle::default(),
            output: Output::Stdout,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn global_env(&self) -> EnvRef {
        Rc::clone(&self.global_env)
    }

    pub fn base_env(&self) -> EnvRef {
        Rc::clone(&self.base_env)
    }

    pub fn empty_env(&self) -> EnvRef {
        Rc::clone(&self.empty_env)
    }

    /// The builtin registered as `name`, regardless of any shadowing binding
    pub fn builtin(&self, name: &str) -> Option<Rc<Builtin>> {
        self.builtins.get(name).cloned()
    }

    /// Handle that can interrupt this interpreter from another thread
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Visibility of the last evaluated value
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Collect output in memory instead of writing to stdout
    pub fn capture_output(&mut self) {
        self.output = Output::Captured(String::new());
    }

    /// Output collected since the last call; empty when writing to stdout
    pub fn take_output(&mut self) -> String {
        match &mut self.output {
            Output::Captured(buffer) => std::mem::take(buffer),
            Output::Stdout => String::new(),
        }
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        match &mut self.output {
            Output::Captured(buffer) => buffer.push_str(text),
            Output::Stdout => {
                let mut stdout = io::stdout().lock();
                if let Err(err) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
                    tracing::warn!(error = %err, "failed to write output");
                }
            }
        }
    }

    /// Lex, parse and evaluate `source` in the global environment
    pub fn eval_source(&mut self, source: &str) -> crate::Result<Value> {
        let tokens = tokenize(source)?;
        let program = parse("<input>", source, tokens)?;
        Ok(self.eval_program(&program)?)
    }

    /// Evaluate every top-level expression; the value of the last one is returned
    pub fn eval_program(&mut self, program: &Program) -> InterpResult<Value> {
        let mut last = Value::Null;
        for expr in &program.exprs {
            last = self.eval_expr(expr)?;
        }
        Ok(last)
    }

    /// Evaluate a top-level expression in the global environment
    pub fn eval_expr(&mut self, expr: &Spanned<Expr>) -> InterpResult<Value> {
        self.visible = true;
        let global = self.global_env();
        self.eval(expr, &global).map_err(|err| {
            if err.is_control_flow() {
                RuntimeError::user(err.message)
            } else {
                err
            }
        })
    }

    /// Print `value` the way the top level does, through `print`
    pub fn print_value(&mut self, value: &Value) -> InterpResult<()> {
        let global = self.global_env();
        let print = self.lookup_function("print", &global, None)?;
        self.invoke(&print, Arguments::positional(vec![value.clone()]), &global, "print", None)?;
        Ok(())
    }

    pub(crate) fn check_interrupt(&self) -> InterpResult<()> {
        if self.interrupt.take() {
            tracing::debug!("evaluation interrupted");
            return Err(RuntimeError::interrupted());
        }
        Ok(())
    }

    /// Evaluate an expression with automatic stack growth for deep recursion
    pub(crate) fn eval(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> InterpResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env))
    }

    fn eval_inner(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> InterpResult<Value> {
        match &expr.node {
            Expr::Const(constant) => {
                self.visible = true;
                Ok(constant_value(constant))
            }

            Expr::Ident { name, site } => {
                self.visible = true;
                if name == "..." {
                    return Err(RuntimeError::no_dots(name));
                }
                self.lookup_value(name, env, Some(*site))
            }

            Expr::Call { func, args, site } => self.eval_call(func, args, *site, env),

            Expr::Function { formals, body } => {
                self.visible = true;
                let formals = FormalArguments::from_ast(formals)?;
                Ok(Value::Closure(Rc::new(Closure {
                    formals: Rc::new(formals),
                    body: Rc::clone(body),
                    env: Rc::clone(env),
                })))
            }

            Expr::Block(exprs) => {
                self.visible = true;
                let mut last = Value::Null;
                for expr in exprs {
                    last = self.eval(expr, env)?;
                }
                Ok(last)
            }

            Expr::Paren(inner) => {
                let value = self.eval(inner, env)?;
                self.visible = true;
                Ok(value)
            }

            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval(cond, env)?;
                if condition(&cond)? {
                    self.eval(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch, env)
                } else {
                    self.visible = false;
                    Ok(Value::Null)
                }
            }

            Expr::For { var, seq, body } => {
                let seq = self.eval(seq, env)?;
                let items = match &seq {
                    Value::Null => Vec::new(),
                    Value::Vector(v) => v.data.to_values(),
                    _ => return Err(RuntimeError::invalid_argument("invalid for() loop sequence")),
                };
                for item in items {
                    self.check_interrupt()?;
                    self.assign_in(env, var, item)?;
                    if !self.loop_body(body, env)? {
                        break;
                    }
                }
                self.visible = false;
                Ok(Value::Null)
            }

            Expr::While { cond, body } => {
                loop {
                    self.check_interrupt()?;
                    let value = self.eval(cond, env)?;
                    if !condition(&value)? || !self.loop_body(body, env)? {
                        break;
                    }
                }
                self.visible = false;
                Ok(Value::Null)
            }

            Expr::Repeat { body } => {
                loop {
                    self.check_interrupt()?;
                    if !self.loop_body(body, env)? {
                        break;
                    }
                }
                self.visible = false;
                Ok(Value::Null)
            }

            Expr::Break => Err(RuntimeError::break_signal()),
            Expr::Next => Err(RuntimeError::next_signal()),

            Expr::Assign {
                target,
                value,
                superassign,
            } => {
                let value = self.eval(value, env)?;
                match &target.node {
                    Expr::Ident { name, .. } if *superassign => self.super_assign(name, value.clone(), env)?,
                    Expr::Ident { name, .. } => self.assign_in(env, name, value.clone())?,
                    Expr::Call { .. } => self.assign_replacement(target, value.clone(), env, *superassign)?,
                    _ => return Err(RuntimeError::invalid_argument("invalid assignment target")),
                }
                self.visible = false;
                Ok(value)
            }
        }
    }

    /// One loop iteration; `false` when the loop should stop
    fn loop_body(&mut self, body: &Spanned<Expr>, env: &EnvRef) -> InterpResult<bool> {
        match self.eval(body, env) {
            Ok(_) => Ok(true),
            Err(err) if err.kind == ErrorKind::Break => Ok(false),
            Err(err) if err.kind == ErrorKind::Next => Ok(true),
            Err(err) => Err(err),
        }
    }

    fn eval_call(
        &mut self,
        func: &Spanned<Expr>,
        args: &[Arg],
        site: SiteId,
        env: &EnvRef,
    ) -> InterpResult<Value> {
        let (function, name) = match &func.node {
            Expr::Ident { name, site } => (self.lookup_function(name, env, Some(*site))?, name.clone()),
            Expr::Const(Constant::Str(name)) => (self.lookup_function(name, env, None)?, name.clone()),
            other => (self.eval(func, env)?, other.to_string()),
        };
        if !function.is_function() {
            return Err(RuntimeError::not_a_function(&name));
        }
        let lazy = matches!(&function, Value::Builtin(b) if b.kind == BuiltinKind::Lazy);
        let supplied = self.promise_args(args, env, lazy)?;
        self.invoke(&function, supplied, env, &name, Some(site))
    }

    /// Supplied arguments of a call: promises, except constants and `...`
    /// for functions that take values. Lazy builtins get a promise for
    /// every argument.
    fn promise_args(&mut self, args: &[Arg], env: &EnvRef, lazy: bool) -> InterpResult<Arguments> {
        let mut pairs = Vec::with_capacity(args.len());
        for arg in args {
            let value = match &arg.value {
                None => Value::Missing,
                Some(expr) => match &expr.node {
                    Expr::Ident { name, .. } if name == "..." && !lazy => {
                        match self.resolve(name, env, ExpectedKind::Any, ReadMode::Silent, None)? {
                            Some(Value::VarArgs(dots)) => Value::VarArgs(dots),
                            _ => return Err(RuntimeError::no_dots(name)),
                        }
                    }
                    Expr::Const(constant) if !lazy => constant_value(constant),
                    _ => Value::Promise(Promise::new(Rc::clone(expr), Rc::clone(env))),
                },
            };
            pairs.push((arg.name.clone(), value));
        }
        Ok(Arguments::from_pairs(pairs))
    }

    /// Bind `name` in `env`, calling the accessor of an active binding
    pub fn assign_in(&mut self, env: &EnvRef, name: &str, value: Value) -> InterpResult<()> {
        let outcome = env.borrow_mut().define(name, Slot::from(value.clone()))?;
        if let Assignment::Active(fun) = outcome {
            self.invoke(&fun, Arguments::positional(vec![value]), env, name, None)?;
        }
        Ok(())
    }

    /// `name <<- value`: the nearest enclosing binding, else the global environment
    fn super_assign(&mut self, name: &str, value: Value, env: &EnvRef) -> InterpResult<()> {
        let parent = env.borrow().parent();
        let target = parent
            .and_then(|parent| env::lookup(&parent, name))
            .map(|(owner, _)| owner)
            .unwrap_or_else(|| self.global_env());
        self.assign_in(&target, name, value)
    }

    /// `f(x, args) <- value` as `x <- \`f<-\`(x, args, value = value)`, recursively
    /// for nested targets such as `names(x)[2] <- value`
    fn assign_replacement(
        &mut self,
        target: &Spanned<Expr>,
        value: Value,
        env: &EnvRef,
        superassign: bool,
    ) -> InterpResult<()> {
        let invalid = || RuntimeError::invalid_argument("invalid assignment target");
        let Expr::Call { func, args, .. } = &target.node else {
            return Err(invalid());
        };
        let Some(getter) = func.node.as_ident() else {
            return Err(RuntimeError::invalid_argument(
                "invalid function in complex assignment",
            ));
        };
        let Some((first, rest)) = args.split_first() else {
            return Err(invalid());
        };
        let Some(inner) = &first.value else {
            return Err(invalid());
        };

        let current = match &inner.node {
            Expr::Ident { name, .. } => {
                let mode = if superassign {
                    ReadMode::SuperLookup
                } else {
                    ReadMode::Copying
                };
                self.resolve(name, env, ExpectedKind::Any, mode, None)?
                    .ok_or_else(|| RuntimeError::unknown_variable(name))?
            }
            Expr::Call { .. } => self.eval(inner, env)?,
            _ => return Err(invalid()),
        };

        let setter_name = format!("{getter}<-");
        let setter = self.lookup_function(&setter_name, env, None)?;
        let mut pairs = vec![(None, current)];
        let rest = self.promise_args(rest, env, false)?;
        pairs.extend(
            rest.iter()
                .map(|(name, value)| (name.map(str::to_string), value.clone())),
        );
        pairs.push((Some("value".to_string()), value));
        let updated = self.invoke(&setter, Arguments::from_pairs(pairs), env, &setter_name, None)?;

        match &inner.node {
            Expr::Ident { name, .. } if superassign => self.super_assign(name, updated, env),
            Expr::Ident { name, .. } => self.assign_in(env, name, updated),
            _ => self.assign_replacement(inner, updated, env, superassign),
        }
    }
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::Null => Value::Null,
        Constant::Logical(b) => Value::from_data(VectorData::Logical(vec![*b])),
        Constant::Integer(n) => Value::from_data(VectorData::Integer(vec![*n])),
        Constant::Double(x) => Value::num(*x),
        Constant::Str(s) => Value::string(s.as_str()),
    }
}

/// Truth value of an `if`/`while` condition
fn condition(value: &Value) -> InterpResult<bool> {
    let Value::Vector(v) = value else {
        return Err(RuntimeError::invalid_argument(match value {
            Value::Null => "argument is of length zero",
            _ => "argument is not interpretable as logical",
        }));
    };
    if v.is_empty() {
        return Err(RuntimeError::invalid_argument("argument is of length zero"));
    }
    if v.len() > 1 {
        return Err(RuntimeError::invalid_argument("the condition has length > 1"));
    }
    let not_logical = || RuntimeError::invalid_argument("argument is not interpretable as logical");
    if matches!(v.data, VectorData::List(_)) {
        return Err(not_logical());
    }
    match v.data.to_logicals().and_then(|l| l[0]) {
        Some(b) => Ok(b),
        None if matches!(v.data, VectorData::Character(_)) => Err(not_logical()),
        None => Err(RuntimeError::invalid_argument(
            "missing value where TRUE/FALSE needed",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Value {
        Interpreter::new().eval_source(source).unwrap()
    }

    fn error(source: &str) -> String {
        Interpreter::new().eval_source(source).unwrap_err().to_string()
    }

    #[test]
    fn test_function_lookup_skips_non_functions() {
        assert_eq!(
            eval("c <- 1; c(c, 2)"),
            Value::doubles(vec![Some(1.0), Some(2.0)])
        );
    }

    #[test]
    fn test_closures_capture_their_environment() {
        let source = "make <- function() { n <- 0; function() { n <<- n + 1; n } }
            counter <- make()
            counter(); counter()
            c(counter(), exists(\"n\"))";
        assert_eq!(eval(source), Value::doubles(vec![Some(3.0), Some(0.0)]));
    }

    #[test]
    fn test_visibility() {
        let mut interp = Interpreter::new();
        let visible = |interp: &mut Interpreter, source: &str| {
            interp.eval_source(source).unwrap();
            interp.is_visible()
        };
        assert!(!visible(&mut interp, "x <- 1"));
        assert!(visible(&mut interp, "(x <- 1)"));
        assert!(visible(&mut interp, "x"));
        assert!(!visible(&mut interp, "invisible(x)"));
        assert!(!visible(&mut interp, "f <- function() y <- 2; f()"));
        assert!(visible(&mut interp, "g <- function() { y <- 2; y }; g()"));
        assert!(!visible(&mut interp, "if (FALSE) 1"));
        assert!(!visible(&mut interp, "for (i in 1:2) i"));
    }

    #[test]
    fn test_loops() {
        let source = "s <- 0
            for (i in 1:10) { if (i %% 2 == 0) next; if (i > 7) break; s <- s + i }
            k <- 0
            while (k < 3) k <- k + 1
            repeat { k <- k + 1; if (k >= 10) break }
            c(s, k)";
        assert_eq!(eval(source), Value::doubles(vec![Some(16.0), Some(10.0)]));
    }

    #[test]
    fn test_condition_errors() {
        assert_eq!(error("if (NULL) 1"), "Error: argument is of length zero");
        assert_eq!(error("if (NA) 1"), "Error: missing value where TRUE/FALSE needed");
        assert_eq!(error("if (\"maybe\") 1"), "Error: argument is not interpretable as logical");
    }

    #[test]
    fn test_control_flow_at_top_level_is_an_error() {
        assert_eq!(error("break"), "Error: no loop for break/next, jumping to top level");
        assert_eq!(
            error("f <- function() break; for (i in 1:3) f()"),
            "Error: no loop for break/next, jumping to top level"
        );
    }

    #[test]
    fn test_dots_outside_a_function() {
        assert_eq!(error("c(...)"), "Error: '...' used in an incorrect context");
    }

    #[test]
    fn test_super_assignment_falls_back_to_global() {
        assert_eq!(eval("f <- function() z <<- 7; f(); z"), Value::num(7.0));
    }

    #[test]
    fn test_replacement_assignment() {
        assert_eq!(
            eval("x <- 1:3; attr(x, \"unit\") <- \"m\"; names(x) <- c(\"a\", \"b\", \"c\"); x[[\"b\"]]"),
            Value::int(2)
        );
        let source = "l <- list(inner = list(v = 1))
            l$inner$v <- 5
            l$inner$v";
        assert_eq!(eval(source), Value::num(5.0));
    }

    #[test]
    fn test_replacement_does_not_alias() {
        assert_eq!(eval("a <- c(1, 2); b <- a; b[1] <- 9; a[1]"), Value::num(1.0));
    }

    #[test]
    fn test_superassign_replacement() {
        let source = "x <- c(1, 2)
            f <- function() x[2] <<- 5
            f()
            x";
        assert_eq!(eval(source), Value::doubles(vec![Some(1.0), Some(5.0)]));
    }

    #[test]
    fn test_interrupt_stops_loops() {
        let mut interp = Interpreter::new();
        interp.interrupt_handle().interrupt();
        let err = interp.eval_source("repeat {}").unwrap_err();
        assert_eq!(err.to_string(), "Error: interrupted");
        assert!(!interp.interrupt_handle().is_pending());
        assert_eq!(interp.eval_source("1").unwrap(), Value::num(1.0));
    }

    #[test]
    fn test_base_is_locked() {
        let mut interp = Interpreter::new();
        assert!(interp.base_env().borrow().is_locked());
        // Shadowing in the global environment is allowed
        assert_eq!(
            interp.eval_source("`+` <- function(e1, e2) \"plus\"; 1 + 2").unwrap(),
            Value::string("plus")
        );
    }
}
