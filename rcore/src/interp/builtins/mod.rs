//! Builtin functions
//!
//! Builtins are registered by name into a [`Registry`] and installed into the
//! locked base environment. Eager builtins receive forced values; lazy ones
//! (the R "specials") receive promises.

mod arith;
mod attrs;
mod control;
mod data;
mod dispatch;
mod environment;

use super::args::{Arguments, FormalArguments};
use super::env::EnvRef;
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::value::Value;
use std::fmt;
use std::rc::Rc;

pub(crate) use arith::try_dispatch_internal;

/// Builtin function type: interpreter, call context, one value per formal
pub type BuiltinFn = fn(&mut Interpreter, &CallContext, Vec<Value>) -> InterpResult<Value>;

/// How arguments reach a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Arguments are forced first
    Eager,
    /// Arguments arrive as promises
    Lazy,
}

/// Visibility of a builtin's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    On,
    Off,
    /// Left as set by whatever the builtin evaluated
    Keep,
}

/// A registered builtin
pub struct Builtin {
    pub name: String,
    pub kind: BuiltinKind,
    pub visibility: Visibility,
    pub formals: Rc<FormalArguments>,
    pub func: BuiltinFn,
}

impl Builtin {
    /// Result is returned invisibly
    pub fn invisible(&mut self) -> &mut Self {
        self.visibility = Visibility::Off;
        self
    }

    /// Result visibility is decided by the code the builtin runs
    pub fn keep_visibility(&mut self) -> &mut Self {
        self.visibility = Visibility::Keep;
        self
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// What a builtin knows about the call it serves
#[derive(Debug)]
pub struct CallContext {
    pub caller_env: EnvRef,
    /// Name the builtin was called by
    pub name: String,
    /// Supplied arguments after flattening
    pub args: Rc<Arguments>,
    /// Selected by S3 dispatch: internal generics must not dispatch again
    pub dispatched: bool,
}

/// Builtins collected before installation
#[derive(Default)]
pub struct Registry {
    builtins: Vec<Builtin>,
}

impl Registry {
    fn add(&mut self, name: &str, kind: BuiltinKind, formals: &[&str], func: BuiltinFn) -> &mut Builtin {
        self.builtins.push(Builtin {
            name: name.to_string(),
            kind,
            visibility: Visibility::On,
            formals: Rc::new(FormalArguments::builtin(formals)),
            func,
        });
        let last = self.builtins.len() - 1;
        &mut self.builtins[last]
    }

    pub fn eager(&mut self, name: &str, formals: &[&str], func: BuiltinFn) -> &mut Builtin {
        self.add(name, BuiltinKind::Eager, formals, func)
    }

    pub fn lazy(&mut self, name: &str, formals: &[&str], func: BuiltinFn) -> &mut Builtin {
        self.add(name, BuiltinKind::Lazy, formals, func)
    }

    pub fn into_builtins(self) -> Vec<Rc<Builtin>> {
        self.builtins.into_iter().map(Rc::new).collect()
    }
}

/// Every builtin of the base environment
pub fn registry() -> Registry {
    let mut registry = Registry::default();
    arith::register(&mut registry);
    data::register(&mut registry);
    attrs::register(&mut registry);
    control::register(&mut registry);
    environment::register(&mut registry);
    dispatch::register(&mut registry);
    registry
}

// Argument helpers shared by the builtin groups

/// Value supplied for a formal without default
fn required<'a>(args: &'a [Value], i: usize, formal: &str) -> InterpResult<&'a Value> {
    match args.get(i) {
        Some(value) if !value.is_missing() => Ok(value),
        _ => Err(RuntimeError::argument_missing(formal)),
    }
}

fn string_arg(args: &[Value], i: usize, formal: &str) -> InterpResult<String> {
    let value = required(args, i, formal)?;
    value
        .as_str_scalar()
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::invalid_argument(format!("invalid '{formal}' argument")))
}

fn bool_arg(args: &[Value], i: usize, formal: &str, default: bool) -> InterpResult<bool> {
    match args.get(i) {
        None | Some(Value::Missing) => Ok(default),
        Some(value) => value
            .as_bool_scalar()
            .ok_or_else(|| RuntimeError::invalid_argument(format!("invalid '{formal}' argument"))),
    }
}

/// Environment argument, defaulting to the caller's environment
fn env_arg(ctx: &CallContext, args: &[Value], i: usize, formal: &str) -> InterpResult<EnvRef> {
    match args.get(i) {
        None | Some(Value::Missing) => Ok(Rc::clone(&ctx.caller_env)),
        Some(Value::Env(env)) => Ok(Rc::clone(env)),
        Some(_) => Err(RuntimeError::invalid_argument(format!(
            "invalid '{formal}' argument"
        ))),
    }
}

/// The `...` bundle matched to formal `i`
fn dots_arg(args: &[Value], i: usize) -> Rc<Arguments> {
    match args.get(i) {
        Some(Value::VarArgs(bundle)) => Rc::clone(bundle),
        _ => Rc::new(Arguments::default()),
    }
}

fn function_arg<'a>(args: &'a [Value], i: usize, formal: &str) -> InterpResult<&'a Value> {
    let value = required(args, i, formal)?;
    if value.is_function() {
        Ok(value)
    } else {
        Err(RuntimeError::invalid_argument(format!(
            "'{formal}' must be a function"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        let builtins = registry().into_builtins();
        let mut names: Vec<&str> = builtins.iter().map(|b| b.name.as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_specials_are_lazy() {
        let builtins = registry().into_builtins();
        let kind = |name: &str| {
            builtins
                .iter()
                .find(|b| b.name == name)
                .map(|b| b.kind)
                .unwrap()
        };
        assert_eq!(kind("&&"), BuiltinKind::Lazy);
        assert_eq!(kind("missing"), BuiltinKind::Lazy);
        assert_eq!(kind("on.exit"), BuiltinKind::Lazy);
        assert_eq!(kind("c"), BuiltinKind::Eager);
    }
}
