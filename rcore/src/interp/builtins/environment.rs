//! Environment builtins: creation, inspection, binding control

use super::{CallContext, Registry, bool_arg, dots_arg, env_arg, function_arg, required, string_arg};
use crate::interp::env::{self, EnvRef};
use crate::interp::error::{ErrorKind, InterpResult, RuntimeError};
use crate::interp::eval::Interpreter;
use crate::interp::promise::Promise;
use crate::interp::resolve::{ExpectedKind, ReadMode};
use crate::interp::value::Value;
use std::rc::Rc;

pub(super) fn register(reg: &mut Registry) {
    reg.eager("environment", &["fun"], builtin_environment);
    reg.eager("new.env", &["hash", "parent", "size"], builtin_new_env);
    reg.eager("emptyenv", &[], |interp, _, _| Ok(Value::Env(interp.empty_env())));
    reg.eager("globalenv", &[], |interp, _, _| Ok(Value::Env(interp.global_env())));
    reg.eager("baseenv", &[], |interp, _, _| Ok(Value::Env(interp.base_env())));
    reg.eager("parent.frame", &["n"], builtin_parent_frame);
    reg.eager("parent.env", &["env"], builtin_parent_env);
    reg.eager("parent.env<-", &["env", "value"], builtin_set_parent_env);
    reg.eager("environmentName", &["env"], builtin_environment_name);
    reg.eager("assign", &["x", "value", "pos", "envir", "inherits"], builtin_assign)
        .invisible();
    reg.eager("get", &["x", "pos", "envir", "mode", "inherits"], builtin_get);
    reg.eager(
        "exists",
        &["x", "where", "envir", "frame", "mode", "inherits"],
        builtin_exists,
    );
    reg.lazy("rm", &["...", "list", "envir"], builtin_rm).invisible();
    reg.lazy("delayedAssign", &["x", "value", "eval.env", "assign.env"], builtin_delayed_assign)
        .invisible();
    reg.eager("makeActiveBinding", &["sym", "fun", "env"], builtin_make_active_binding)
        .invisible();
    reg.eager("bindingIsActive", &["sym", "env"], builtin_binding_is_active);
    reg.eager("lockBinding", &["sym", "env"], builtin_lock_binding).invisible();
    reg.eager("unlockBinding", &["sym", "env"], builtin_unlock_binding).invisible();
    reg.eager("bindingIsLocked", &["sym", "env"], builtin_binding_is_locked);
    reg.eager("lockEnvironment", &["env", "bindings"], builtin_lock_environment)
        .invisible();
    reg.eager("environmentIsLocked", &["env"], builtin_environment_is_locked);
}

fn env_required(args: &[Value], i: usize, formal: &str) -> InterpResult<EnvRef> {
    match required(args, i, formal)? {
        Value::Env(env) => Ok(Rc::clone(env)),
        _ => Err(RuntimeError::invalid_argument(format!(
            "invalid '{formal}' argument"
        ))),
    }
}

/// `envir` if given, else `pos` when it is an environment, else the caller
fn target_env(ctx: &CallContext, args: &[Value], pos: usize, envir: usize) -> InterpResult<EnvRef> {
    match (&args[pos], &args[envir]) {
        (_, Value::Env(env)) | (Value::Env(env), Value::Missing) => Ok(Rc::clone(env)),
        (_, _) => env_arg(ctx, args, envir, "envir"),
    }
}

fn mode_kind(args: &[Value], i: usize) -> InterpResult<ExpectedKind> {
    match &args[i] {
        Value::Missing => Ok(ExpectedKind::Any),
        value => match value.as_str_scalar() {
            Some("any") => Ok(ExpectedKind::Any),
            Some("function") => Ok(ExpectedKind::Function),
            _ => Err(RuntimeError::invalid_argument("invalid 'mode' argument")),
        },
    }
}

fn builtin_environment(_interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    Ok(match &args[0] {
        Value::Missing | Value::Null => Value::Env(Rc::clone(&ctx.caller_env)),
        Value::Closure(closure) => Value::Env(Rc::clone(&closure.env)),
        _ => Value::Null,
    })
}

fn builtin_new_env(_interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let parent = env_arg(ctx, &args, 1, "parent")?;
    Ok(Value::Env(env::child_env(&parent)))
}

/// `parent.frame(n = 1)`: the environment the n-th enclosing call was made from
fn builtin_parent_frame(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let n = match &args[0] {
        Value::Missing => 1.0,
        value => value
            .as_f64_scalar()
            .filter(|n| *n >= 1.0)
            .ok_or_else(|| RuntimeError::invalid_argument("invalid 'n' value"))?,
    };
    let mut env = Rc::clone(&ctx.caller_env);
    for _ in 0..n as usize {
        match interp.frame_index(&env) {
            Some(index) => env = Rc::clone(&interp.frames[index].caller_env),
            None => return Ok(Value::Env(interp.global_env())),
        }
    }
    Ok(Value::Env(env))
}

fn builtin_parent_env(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let env = env_required(&args, 0, "env")?;
    let parent = env.borrow().parent();
    parent
        .map(Value::Env)
        .ok_or_else(|| RuntimeError::invalid_argument("the empty environment has no parent"))
}

fn builtin_set_parent_env(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let env = env_required(&args, 0, "env")?;
    let parent = env_required(&args, 1, "value")?;
    if env.borrow().parent().is_none() {
        return Err(RuntimeError::invalid_argument(
            "can not set the parent of the empty environment",
        ));
    }
    env.borrow_mut().set_parent(parent);
    Ok(Value::Env(env))
}

fn builtin_environment_name(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    Ok(match &args[0] {
        Value::Env(env) => Value::string(env.borrow().name().unwrap_or_default()),
        _ => Value::string(""),
    })
}

/// `assign(x, value, envir, inherits = FALSE)`
fn builtin_assign(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let name = string_arg(&args, 0, "x")?;
    let value = required(&args, 1, "value")?.clone();
    let mut target = target_env(ctx, &args, 2, 3)?;
    if bool_arg(&args, 4, "inherits", false)?
        && let Some((owner, _)) = env::lookup(&target, &name)
    {
        target = owner;
    }
    interp.assign_in(&target, &name, value.clone())?;
    Ok(value)
}

/// `get(x, envir, mode = "any", inherits = TRUE)`
fn builtin_get(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let name = string_arg(&args, 0, "x")?;
    let env = target_env(ctx, &args, 1, 2)?;
    let expected = mode_kind(&args, 3)?;
    let not_found = || match expected {
        ExpectedKind::Any => RuntimeError::unknown_variable(&name),
        ExpectedKind::Function => RuntimeError::new(
            ErrorKind::UnknownVariable,
            format!("object '{name}' of mode 'function' was not found"),
        ),
    };
    if !bool_arg(&args, 4, "inherits", true)? && !env.borrow().contains(&name) {
        return Err(not_found());
    }
    let found = match expected {
        ExpectedKind::Any => interp.resolve(&name, &env, expected, ReadMode::Silent, None)?,
        ExpectedKind::Function => find_function(interp, &name, &env)?,
    };
    match found {
        Some(Value::Missing) => Err(RuntimeError::argument_missing(&name)),
        Some(value) => Ok(value),
        None => Err(not_found()),
    }
}

/// The nearest function binding of `name`, skipping other values
fn find_function(interp: &mut Interpreter, name: &str, env: &EnvRef) -> InterpResult<Option<Value>> {
    match interp.resolve(name, env, ExpectedKind::Function, ReadMode::ForcedTypeCheck, None) {
        Ok(found) => Ok(found),
        Err(err) if err.kind == ErrorKind::UnknownFunction => Ok(None),
        Err(err) => Err(err),
    }
}

/// `exists(x, envir, mode = "any", inherits = TRUE)`; only forces promises
/// when a mode other than "any" is asked for
fn builtin_exists(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let name = string_arg(&args, 0, "x")?;
    let env = match (&args[1], &args[2]) {
        (Value::Env(env), Value::Missing) => Rc::clone(env),
        _ => env_arg(ctx, &args, 2, "envir")?,
    };
    let expected = mode_kind(&args, 4)?;
    let inherits = bool_arg(&args, 5, "inherits", true)?;
    let found = match (expected, inherits) {
        (ExpectedKind::Any, true) => env::lookup(&env, &name).is_some(),
        (ExpectedKind::Any, false) => env.borrow().contains(&name),
        (ExpectedKind::Function, true) => find_function(interp, &name, &env)?.is_some(),
        (ExpectedKind::Function, false) => {
            env.borrow().contains(&name)
                && interp
                    .resolve(&name, &env, ExpectedKind::Any, ReadMode::Silent, None)?
                    .is_some_and(|v| v.is_function())
        }
    };
    Ok(Value::logical(found))
}

/// `rm(..., list, envir)`: names come from the unevaluated arguments
fn builtin_rm(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let mut names = Vec::new();
    for value in dots_arg(&args, 0).values() {
        let Value::Promise(promise) = value else {
            return Err(RuntimeError::invalid_argument(
                "... must contain names or character strings",
            ));
        };
        let expr = promise.expr().map(|e| &e.node);
        let name = match expr {
            Some(expr) => match (expr.as_ident(), expr.as_const()) {
                (Some(name), _) => name.to_string(),
                (None, Some(crate::ast::Constant::Str(s))) => s.clone(),
                _ => {
                    return Err(RuntimeError::invalid_argument(
                        "... must contain names or character strings",
                    ));
                }
            },
            None => {
                return Err(RuntimeError::internal("rm argument without expression"));
            }
        };
        names.push(name);
    }
    let list = interp.force_value(args[1].clone())?;
    names.extend(list.string_elements());
    let envir = interp.force_value(args[2].clone())?;
    let env = env_arg(ctx, &[envir], 0, "envir")?;

    for name in names {
        if !env.borrow_mut().remove(&name)? {
            tracing::warn!(name = %name, "rm: object not found");
        }
    }
    Ok(Value::Null)
}

/// `delayedAssign(x, value, eval.env, assign.env)`: bind an unforced promise
fn builtin_delayed_assign(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let name = interp.force_value(args[0].clone())?;
    let name = string_arg(&[name], 0, "x")?;
    let expr = match &args[1] {
        Value::Promise(promise) => promise.expr().cloned(),
        _ => None,
    };
    let Some(expr) = expr else {
        return Err(RuntimeError::argument_missing("value"));
    };
    let eval_env = interp.force_value(args[2].clone())?;
    let eval_env = env_arg(ctx, &[eval_env], 0, "eval.env")?;
    let assign_env = interp.force_value(args[3].clone())?;
    let assign_env = env_arg(ctx, &[assign_env], 0, "assign.env")?;

    interp.assign_in(&assign_env, &name, Value::Promise(Promise::new(expr, eval_env)))?;
    Ok(Value::Null)
}

fn builtin_make_active_binding(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let name = string_arg(&args, 0, "sym")?;
    let fun = function_arg(&args, 1, "fun")?.clone();
    let env = env_required(&args, 2, "env")?;
    env.borrow_mut().make_active(&name, fun)?;
    Ok(Value::Null)
}

fn binding_args(args: &[Value]) -> InterpResult<(String, EnvRef)> {
    Ok((string_arg(args, 0, "sym")?, env_required(args, 1, "env")?))
}

fn builtin_binding_is_active(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let (name, env) = binding_args(&args)?;
    let active = env.borrow_mut().is_binding_active(&name)?;
    Ok(Value::logical(active))
}

fn builtin_lock_binding(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let (name, env) = binding_args(&args)?;
    env.borrow_mut().lock_binding(&name)?;
    Ok(Value::Null)
}

fn builtin_unlock_binding(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let (name, env) = binding_args(&args)?;
    env.borrow_mut().unlock_binding(&name)?;
    Ok(Value::Null)
}

fn builtin_binding_is_locked(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let (name, env) = binding_args(&args)?;
    let locked = env.borrow_mut().is_binding_locked(&name)?;
    Ok(Value::logical(locked))
}

fn builtin_lock_environment(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let env = env_required(&args, 0, "env")?;
    let bindings = bool_arg(&args, 1, "bindings", false)?;
    env.borrow_mut().lock(bindings);
    Ok(Value::Null)
}

fn builtin_environment_is_locked(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let env = env_required(&args, 0, "env")?;
    let locked = env.borrow().is_locked();
    Ok(Value::logical(locked))
}
