//! Call dispatch: argument matching, frames and invocation

use super::args::{Arguments, ArgumentsSignature, FormalArguments};
use super::builtins::{Builtin, BuiltinKind, CallContext, Visibility};
use super::env::{EnvRef, Environment, Slot};
use super::error::{ErrorKind, InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::matcher::{self, MatchPlan, MatchedArg, describe_argument};
use super::promise::Promise;
use super::resolve::evict_oldest_sites;
use super::s3::DispatchContext;
use super::value::{Closure, Value};
use crate::ast::{ExprRef, SiteId};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Stack growth parameters for deep recursion
pub(super) const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
pub(super) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Call-stack record of a closure invocation.
///
/// Besides the callee environment it carries bookkeeping that is not visible
/// as variables.
#[derive(Debug)]
pub struct Frame {
    /// Callee environment
    pub env: EnvRef,
    pub function: Value,
    /// Name the function was called by
    pub name: String,
    pub caller_env: EnvRef,
    /// Visibility of the result, saved while exit handlers run
    pub visible: bool,
    /// Expressions registered with `on.exit`
    pub on_exit: Vec<ExprRef>,
    /// Set when the closure was selected by S3 dispatch
    pub dispatch: Option<Rc<DispatchContext>>,
    /// Supplied arguments, flattened
    pub args: Rc<Arguments>,
}

#[derive(Debug)]
struct CallCacheEntry {
    formals: Rc<FormalArguments>,
    signature: ArgumentsSignature,
    plan: Rc<MatchPlan>,
}

/// Recently used match plans per call site, most recent first
#[derive(Debug)]
pub struct CallSiteCache {
    capacity: usize,
    max_sites: usize,
    sites: HashMap<SiteId, VecDeque<CallCacheEntry>>,
    hits: u64,
    misses: u64,
}

impl CallSiteCache {
    pub fn new(capacity: usize, max_sites: usize) -> Self {
        CallSiteCache {
            capacity,
            max_sites,
            sites: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Sites with remembered plans
    pub fn sites(&self) -> usize {
        self.sites.len()
    }

    /// Entries currently held for `site`
    pub fn len(&self, site: SiteId) -> usize {
        self.sites.get(&site).map_or(0, VecDeque::len)
    }

    fn get(
        &mut self,
        site: SiteId,
        formals: &Rc<FormalArguments>,
        signature: &ArgumentsSignature,
    ) -> Option<Rc<MatchPlan>> {
        let entries = self.sites.get_mut(&site)?;
        // Holding the formals keeps their address from being reused
        let position = entries
            .iter()
            .position(|e| Rc::ptr_eq(&e.formals, formals) && e.signature == *signature);
        let Some(position) = position else {
            self.misses += 1;
            return None;
        };
        let entry = entries.remove(position)?;
        let plan = Rc::clone(&entry.plan);
        entries.push_front(entry);
        self.hits += 1;
        Some(plan)
    }

    fn insert(
        &mut self,
        site: SiteId,
        formals: Rc<FormalArguments>,
        signature: ArgumentsSignature,
        plan: Rc<MatchPlan>,
    ) {
        if self.capacity == 0 {
            return;
        }
        if !self.sites.contains_key(&site) && self.sites.len() >= self.max_sites {
            evict_oldest_sites(&mut self.sites);
        }
        let entries = self.sites.entry(site).or_default();
        entries.push_front(CallCacheEntry {
            formals,
            signature,
            plan,
        });
        entries.truncate(self.capacity);
    }
}

impl Interpreter {
    /// Invoke `function` with `args` on behalf of code running in `caller_env`
    pub fn invoke(
        &mut self,
        function: &Value,
        args: Arguments,
        caller_env: &EnvRef,
        name: &str,
        site: Option<SiteId>,
    ) -> InterpResult<Value> {
        self.invoke_dispatched(function, args, caller_env, name, site, None)
    }

    pub(crate) fn invoke_dispatched(
        &mut self,
        function: &Value,
        args: Arguments,
        caller_env: &EnvRef,
        name: &str,
        site: Option<SiteId>,
        dispatch: Option<Rc<DispatchContext>>,
    ) -> InterpResult<Value> {
        if self.depth >= self.config.calls.max_depth {
            return Err(RuntimeError::expression_nesting());
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || match function {
            Value::Closure(closure) => {
                self.apply_closure(closure, args, caller_env, name, site, dispatch)
            }
            Value::Builtin(builtin) => {
                let dispatched = dispatch.is_some();
                self.apply_builtin(builtin, args, caller_env, name, site, dispatched)
            }
            _ => Err(RuntimeError::not_a_function(name)),
        });
        self.depth -= 1;
        result
    }

    /// Match plan for `flat` against `formals`, from the site cache when possible
    fn match_plan(
        &mut self,
        site: Option<SiteId>,
        formals: &Rc<FormalArguments>,
        flat: &Arguments,
    ) -> InterpResult<Rc<MatchPlan>> {
        if let Some(site) = site
            && let Some(plan) = self.call_cache.get(site, formals, flat.signature())
        {
            tracing::trace!(site = site.0, "call site cache hit");
            return Ok(plan);
        }
        let describe = |i: usize| describe_argument(flat.name(i), &flat.values()[i]);
        let plan = Rc::new(matcher::plan(flat.signature(), formals, &describe)?);
        if let Some(site) = site {
            self.call_cache.insert(
                site,
                Rc::clone(formals),
                flat.signature().clone(),
                Rc::clone(&plan),
            );
        }
        Ok(plan)
    }

    fn apply_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Arguments,
        caller_env: &EnvRef,
        name: &str,
        site: Option<SiteId>,
        dispatch: Option<Rc<DispatchContext>>,
    ) -> InterpResult<Value> {
        self.check_interrupt()?;
        let flat = args.flatten();
        let plan = self.match_plan(site, &closure.formals, &flat)?;
        let matched = matcher::apply(&plan, &flat, &closure.formals);

        let mut names = closure.formals.names().to_vec();
        let mut slots = Vec::with_capacity(names.len() + 2);
        let mut defaults = Vec::new();
        for (i, arg) in matched.into_args().into_iter().enumerate() {
            match arg {
                MatchedArg::Value(value) => slots.push(Slot::from(value)),
                MatchedArg::Default(expr) => {
                    slots.push(Slot::Missing);
                    defaults.push((i, expr));
                }
                MatchedArg::Missing => slots.push(Slot::Missing),
            }
        }
        if let Some(context) = &dispatch {
            for (var, value) in [
                (".Generic", Value::string(context.generic.as_str())),
                (".Class", Value::strings(context.classes.iter().cloned())),
            ] {
                if !names.iter().any(|n| n == var) {
                    names.push(var.to_string());
                    slots.push(Slot::Concrete(value));
                }
            }
        }
        let env = Environment::from_bindings(Rc::clone(&closure.env), names, slots).into_ref();
        for (i, expr) in defaults {
            let promise = Promise::default_arg(expr, Rc::clone(&env));
            env.borrow_mut()
                .define(closure.formals.name(i), Slot::Lazy(promise))?;
        }

        self.frames.push(Frame {
            env: Rc::clone(&env),
            function: Value::Closure(Rc::clone(closure)),
            name: name.to_string(),
            caller_env: Rc::clone(caller_env),
            visible: true,
            on_exit: Vec::new(),
            dispatch,
            args: Rc::new(flat),
        });
        tracing::trace!(function = name, depth = self.depth, "enter closure");

        let result = self.eval(&closure.body, &env);
        let result = self.finish_call(result, &env);

        let frame = self.frames.pop();
        if let Some(frame) = frame {
            self.visible = frame.visible;
        }
        result
    }

    /// Resolve control transfers at the closure boundary and run exit handlers
    fn finish_call(&mut self, result: InterpResult<Value>, env: &EnvRef) -> InterpResult<Value> {
        let returned = |result: InterpResult<Value>| match result {
            Err(RuntimeError {
                kind: ErrorKind::Return { value, target },
                ..
            }) if Rc::ptr_eq(&target, env) => Ok(*value),
            Err(err) if matches!(err.kind, ErrorKind::Break | ErrorKind::Next) => {
                Err(RuntimeError::user(err.message))
            }
            other => other,
        };
        let mut result = returned(result);

        let handlers = match self.frames.last_mut() {
            Some(frame) => {
                frame.visible = self.visible;
                std::mem::take(&mut frame.on_exit)
            }
            None => Vec::new(),
        };
        for handler in handlers {
            match returned(self.eval(&handler, env)) {
                // `on.exit(return(v))` replaces the result
                Ok(value) if is_return_call(&handler) => {
                    if result.is_ok() {
                        result = Ok(value);
                    }
                }
                Ok(_) => {}
                // An error from the body takes precedence
                Err(err) => {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }
        result
    }

    fn apply_builtin(
        &mut self,
        builtin: &Rc<Builtin>,
        args: Arguments,
        caller_env: &EnvRef,
        name: &str,
        site: Option<SiteId>,
        dispatched: bool,
    ) -> InterpResult<Value> {
        let flat = args.flatten();
        let flat = match builtin.kind {
            BuiltinKind::Eager => {
                self.visible = true;
                flat.try_map(|value| self.force_value(value.clone()))?
            }
            BuiltinKind::Lazy => flat,
        };
        let plan = self.match_plan(site, &builtin.formals, &flat)?;
        let values = matcher::apply(&plan, &flat, &builtin.formals)
            .into_args()
            .into_iter()
            .map(|arg| match arg {
                MatchedArg::Value(value) => value,
                MatchedArg::Default(_) | MatchedArg::Missing => Value::Missing,
            })
            .collect();
        let ctx = CallContext {
            caller_env: Rc::clone(caller_env),
            name: name.to_string(),
            args: Rc::new(flat),
            dispatched,
        };
        if builtin.visibility == Visibility::On {
            self.visible = true;
        }
        let value = (builtin.func)(self, &ctx, values)?;
        if builtin.visibility == Visibility::Off {
            self.visible = false;
        }
        Ok(value)
    }

    /// Index of the frame whose environment is `env`, innermost first
    pub(crate) fn frame_index(&self, env: &EnvRef) -> Option<usize> {
        self.frames.iter().rposition(|f| Rc::ptr_eq(&f.env, env))
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

fn is_return_call(expr: &ExprRef) -> bool {
    match &expr.node {
        crate::ast::Expr::Call { func, .. } => func.node.as_ident() == Some("return"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_closure_is_lexically_scoped() {
        let mut interp = Interpreter::new();
        let err = interp
            .eval_source("f <- function() x; g <- function() { x <- 1; f() }; g()")
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: object 'x' not found");
    }

    #[test]
    fn test_default_evaluated_in_callee() {
        let mut interp = Interpreter::new();
        let value = interp.eval_source("f <- function(a, b = a + 1) b; f(5)").unwrap();
        assert_eq!(value, Value::num(6.0));
    }

    #[test]
    fn test_on_exit_runs_once_on_success_and_error() {
        let mut interp = Interpreter::new();
        interp
            .eval_source("n <- 0; f <- function(fail) { on.exit(n <<- n + 1); if (fail) stop(\"no\"); 1 }")
            .unwrap();
        assert_eq!(interp.eval_source("f(FALSE)").unwrap(), Value::num(1.0));
        assert_eq!(interp.eval_source("n").unwrap(), Value::num(1.0));
        let err = interp.eval_source("f(TRUE)").unwrap_err();
        assert_eq!(err.to_string(), "Error: no");
        assert_eq!(interp.eval_source("n").unwrap(), Value::num(2.0));
        assert!(interp.frames().is_empty());
    }

    #[test]
    fn test_body_error_takes_precedence_over_exit_error() {
        let mut interp = Interpreter::new();
        let err = interp
            .eval_source("f <- function() { on.exit(stop(\"cleanup\")); stop(\"body\") }; f()")
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: body");
    }

    #[test]
    fn test_return_unwinds_only_to_its_frame() {
        let mut interp = Interpreter::new();
        let value = interp
            .eval_source("g <- function(v) v; f <- function() { g(return(5)); 10 }; f()")
            .unwrap();
        assert_eq!(value, Value::num(5.0));
    }

    #[test]
    fn test_call_site_cache_reuses_plans() {
        let mut interp = Interpreter::new();
        interp
            .eval_source("f <- function(x, y = 2) x + y; s <- 0; for (i in 1:5) s <- s + f(i)")
            .unwrap();
        assert_eq!(interp.eval_source("s").unwrap(), Value::num(25.0));
        assert!(interp.call_cache.hits() > 0);
    }

    #[test]
    fn test_call_site_cache_never_changes_matching() {
        let source = "f <- function(alpha, ...) alpha; g <- function(alpha, beta) beta
            h <- function(fn, ...) fn(...)
            r <- c(h(f, 1, 2), h(g, 3, 4), h(f, al = 5), h(g, beta = 6, 7))
            r";
        let mut cached = Interpreter::new();
        let mut config = Config::default();
        config.calls.site_cache_size = 0;
        let mut uncached = Interpreter::with_config(config);
        let expected = Value::doubles(vec![Some(1.0), Some(4.0), Some(5.0), Some(6.0)]);
        assert_eq!(cached.eval_source(source).unwrap(), expected);
        assert_eq!(uncached.eval_source(source).unwrap(), expected);
    }

    #[test]
    fn test_cache_capacity_is_bounded() {
        let mut cache = CallSiteCache::new(2, 16);
        let site = SiteId::fresh();
        let formals = Rc::new(FormalArguments::builtin(&["..."]));
        for n in 0..4 {
            let signature = ArgumentsSignature::unnamed(n);
            let plan = matcher::plan(&signature, &formals, &|i| i.to_string()).unwrap();
            cache.insert(site, Rc::clone(&formals), signature, Rc::new(plan));
        }
        assert_eq!(cache.len(site), 2);
        assert!(cache.get(site, &formals, &ArgumentsSignature::unnamed(3)).is_some());
        assert!(cache.get(site, &formals, &ArgumentsSignature::unnamed(0)).is_none());
    }

    #[test]
    fn test_site_table_keeps_newest_sites() {
        let mut cache = CallSiteCache::new(1, 8);
        let formals = Rc::new(FormalArguments::builtin(&["..."]));
        let sites: Vec<SiteId> = (0..20).map(|_| SiteId::fresh()).collect();
        for &site in &sites {
            let signature = ArgumentsSignature::unnamed(1);
            let plan = matcher::plan(&signature, &formals, &|i| i.to_string()).unwrap();
            cache.insert(site, Rc::clone(&formals), signature, Rc::new(plan));
        }
        assert!(cache.sites() <= 8);
        assert_eq!(cache.len(sites[19]), 1);
        assert_eq!(cache.len(sites[0]), 0);
    }

    #[test]
    fn test_deep_recursion_reports_nesting() {
        let mut config = Config::default();
        config.calls.max_depth = 200;
        let mut interp = Interpreter::with_config(config);
        let err = interp.eval_source("f <- function(n) f(n + 1); f(0)").unwrap_err();
        assert!(err.to_string().contains("evaluation nested too deeply"));
        assert!(interp.frames().is_empty());
    }

    #[test]
    fn test_visibility_propagates_from_callee() {
        let mut interp = Interpreter::new();
        interp.eval_source("f <- function() x <- 1").unwrap();
        interp.eval_source("f()").unwrap();
        assert!(!interp.is_visible());
        interp.eval_source("g <- function() { on.exit(y <- 2); 5 }").unwrap();
        interp.eval_source("g()").unwrap();
        assert!(interp.is_visible());
    }
}
