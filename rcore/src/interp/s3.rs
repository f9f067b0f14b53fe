//! S3 method selection
//!
//! A method for `generic` on class `c` is a function named `generic.c`,
//! found either through the caller's environment chain or in the methods
//! table of the generic's defining environment.

use super::args::Arguments;
use super::env::{EnvRef, Environment, Slot};
use super::error::{ErrorKind, InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::resolve::{ExpectedKind, ReadMode};
use super::value::Value;
use std::rc::Rc;

/// Name of the per-environment registered-methods table
pub const METHODS_TABLE: &str = ".__S3MethodsTable__.";

/// Outcome of a successful method search
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub function: Value,
    pub generic: String,
    /// Name of the method found, e.g. `print.foo`
    pub method: String,
    /// Class vector from the matched class on; empty for a default method
    pub classes: Vec<String>,
    /// The full class vector searched
    pub previous: Vec<String>,
    /// Found as `group.class` rather than `generic.class`
    pub group_match: bool,
}

/// State of a dispatched call, kept in its frame for `NextMethod`
#[derive(Debug)]
pub struct DispatchContext {
    pub generic: String,
    pub group: Option<String>,
    pub method: String,
    /// Remaining classes, starting at the one the current method is for
    pub classes: Vec<String>,
    pub previous: Vec<String>,
    pub caller_env: EnvRef,
    pub def_env: EnvRef,
    pub args: Rc<Arguments>,
}

impl DispatchContext {
    pub fn new(
        found: &DispatchResult,
        group: Option<&str>,
        caller_env: EnvRef,
        def_env: EnvRef,
        args: Rc<Arguments>,
    ) -> Self {
        DispatchContext {
            generic: found.generic.clone(),
            group: group.map(str::to_string),
            method: found.method.clone(),
            classes: found.classes.clone(),
            previous: found.previous.clone(),
            caller_env,
            def_env,
            args,
        }
    }

    /// Current method is the default (or the builtin fallback)
    pub fn at_default(&self) -> bool {
        self.classes.is_empty() || self.method.ends_with(".default")
    }
}

/// Parameters of a method search
#[derive(Debug)]
pub struct MethodQuery<'a> {
    pub generic: &'a str,
    pub classes: &'a [String],
    pub group: Option<&'a str>,
    pub caller_env: &'a EnvRef,
    pub def_env: &'a EnvRef,
    /// Start after the first class (`NextMethod`)
    pub skip_first: bool,
    /// Try `generic.default` when no class matches
    pub default_method: bool,
    /// Fall back to the builtin of the same name, else fail
    pub throws_error: bool,
}

/// Search for the method selected by `query`
pub fn dispatch(interp: &mut Interpreter, query: &MethodQuery<'_>) -> InterpResult<Option<DispatchResult>> {
    let found = |function: Value, method: String, classes: Vec<String>, group_match: bool| {
        tracing::debug!(generic = query.generic, method = %method, "S3 dispatch selected method");
        DispatchResult {
            function,
            generic: query.generic.to_string(),
            method,
            classes,
            previous: query.classes.to_vec(),
            group_match,
        }
    };

    let start = usize::from(query.skip_first).min(query.classes.len());
    for (offset, class) in query.classes[start..].iter().enumerate() {
        let remaining = query.classes[start + offset..].to_vec();
        let method = format!("{}.{class}", query.generic);
        if let Some(function) = find_method(interp, &method, query)? {
            return Ok(Some(found(function, method, remaining, false)));
        }
        if let Some(group) = query.group {
            let method = format!("{group}.{class}");
            if let Some(function) = find_method(interp, &method, query)? {
                return Ok(Some(found(function, method, remaining, true)));
            }
        }
    }

    if query.default_method {
        let method = format!("{}.default", query.generic);
        if let Some(function) = find_method(interp, &method, query)? {
            return Ok(Some(found(function, method, Vec::new(), false)));
        }
    }

    if query.throws_error {
        if let Some(builtin) = interp.builtin(query.generic) {
            let method = query.generic.to_string();
            return Ok(Some(found(Value::Builtin(builtin), method, Vec::new(), false)));
        }
        tracing::debug!(generic = query.generic, "no applicable S3 method");
        return Err(RuntimeError::no_applicable_method(query.generic, query.classes));
    }
    Ok(None)
}

/// `name` as a function in the caller chain, then in the methods table
fn find_method(interp: &mut Interpreter, name: &str, query: &MethodQuery<'_>) -> InterpResult<Option<Value>> {
    let visible = match interp.resolve(
        name,
        query.caller_env,
        ExpectedKind::Function,
        ReadMode::ForcedTypeCheck,
        None,
    ) {
        Ok(found) => found,
        Err(err) if err.kind == ErrorKind::UnknownFunction => None,
        Err(err) => return Err(err),
    };
    if let Some(function) = visible {
        return Ok(Some(function));
    }

    let Some(table) = methods_table(query.def_env) else {
        return Ok(None);
    };
    let slot = table.borrow().get(name).map(|b| b.value.clone());
    let function = match slot {
        Some(Slot::Concrete(value)) => value,
        Some(Slot::Lazy(promise)) => interp.force_promise(&promise)?,
        _ => return Ok(None),
    };
    Ok(function.is_function().then_some(function))
}

/// The methods table bound locally in `env`, if any
pub fn methods_table(env: &EnvRef) -> Option<EnvRef> {
    match env.borrow().get(METHODS_TABLE).map(|b| &b.value) {
        Some(Slot::Concrete(Value::Env(table))) => Some(Rc::clone(table)),
        _ => None,
    }
}

/// The methods table of `env`, created on first use
pub fn ensure_methods_table(env: &EnvRef, empty_env: &EnvRef) -> InterpResult<EnvRef> {
    if let Some(table) = methods_table(env) {
        return Ok(table);
    }
    let table = Environment::with_parent(Rc::clone(empty_env)).into_ref();
    env.borrow_mut()
        .define(METHODS_TABLE, Slot::Concrete(Value::Env(Rc::clone(&table))))?;
    Ok(table)
}
