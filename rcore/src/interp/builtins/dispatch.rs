//! S3 dispatch entry points

use super::{CallContext, Registry, dots_arg, required, string_arg};
use crate::interp::args::Arguments;
use crate::interp::env::{EnvRef, Slot};
use crate::interp::error::{InterpResult, RuntimeError};
use crate::interp::eval::Interpreter;
use crate::interp::resolve::{ExpectedKind, ReadMode};
use crate::interp::s3::{self, DispatchContext, MethodQuery};
use crate::interp::value::Value;
use std::rc::Rc;

pub(super) fn register(reg: &mut Registry) {
    reg.eager("UseMethod", &["generic", "object"], builtin_use_method)
        .keep_visibility();
    reg.eager("NextMethod", &["generic", "object", "..."], builtin_next_method)
        .keep_visibility();
    reg.eager(
        "registerS3method",
        &["genname", "class", "method", "envir"],
        builtin_register_s3_method,
    )
    .invisible();
}

/// What a dispatching builtin needs from the frame of the closure calling it
struct CallerFrame {
    env: EnvRef,
    caller_env: EnvRef,
    function: Value,
    args: Rc<Arguments>,
    dispatch: Option<Rc<DispatchContext>>,
}

fn caller_frame(interp: &Interpreter, ctx: &CallContext, builtin: &str) -> InterpResult<CallerFrame> {
    let index = interp.frame_index(&ctx.caller_env).ok_or_else(|| {
        RuntimeError::invalid_argument(format!("{builtin} called from outside a function"))
    })?;
    let frame = &interp.frames[index];
    Ok(CallerFrame {
        env: Rc::clone(&frame.env),
        caller_env: Rc::clone(&frame.caller_env),
        function: frame.function.clone(),
        args: Rc::clone(&frame.args),
        dispatch: frame.dispatch.clone(),
    })
}

/// The object a generic dispatches on: the value of its first argument
fn dispatch_object(interp: &mut Interpreter, frame: &CallerFrame) -> InterpResult<Value> {
    let Value::Closure(closure) = &frame.function else {
        return Ok(Value::Null);
    };
    let Some(first) = closure.formals.names().first() else {
        return Ok(Value::Null);
    };
    let value = interp.resolve(first, &frame.env, ExpectedKind::Any, ReadMode::Silent, None)?;
    match value {
        Some(Value::VarArgs(dots)) => match dots.values().first() {
            Some(value) => interp.force_value(value.clone()),
            None => Ok(Value::Null),
        },
        Some(value) => Ok(value),
        None => Ok(Value::Null),
    }
}

/// `UseMethod(generic, object)`: call the selected method in place of the
/// generic, then return from the generic with its value
fn builtin_use_method(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let generic = string_arg(&args, 0, "generic")?;
    let frame = caller_frame(interp, ctx, "UseMethod")?;
    let object = match &args[1] {
        Value::Missing => dispatch_object(interp, &frame)?,
        object => object.clone(),
    };
    let def_env = match &frame.function {
        Value::Closure(closure) => Rc::clone(&closure.env),
        _ => interp.base_env(),
    };
    let classes = object.dispatch_class();
    let query = MethodQuery {
        generic: &generic,
        classes: &classes,
        group: None,
        caller_env: &frame.caller_env,
        def_env: &def_env,
        skip_first: false,
        default_method: true,
        throws_error: true,
    };
    let Some(found) = s3::dispatch(interp, &query)? else {
        return Err(RuntimeError::no_applicable_method(&generic, &classes));
    };
    let context = DispatchContext::new(
        &found,
        None,
        Rc::clone(&frame.caller_env),
        def_env,
        Rc::clone(&frame.args),
    );
    let value = interp.invoke_dispatched(
        &found.function,
        (*frame.args).clone(),
        &frame.caller_env,
        &found.method,
        None,
        Some(Rc::new(context)),
    )?;
    Err(RuntimeError::return_signal(value, frame.env))
}

/// Arguments of the current method, with named extras replacing same-named
/// ones and the rest appended
fn next_method_args(current: &Arguments, extra: &Arguments) -> Arguments {
    let mut pairs: Vec<(Option<String>, Value)> = current
        .iter()
        .map(|(name, value)| (name.map(str::to_string), value.clone()))
        .collect();
    for (name, value) in extra.iter() {
        let existing = name.and_then(|name| pairs.iter().position(|(n, _)| n.as_deref() == Some(name)));
        match existing {
            Some(i) => pairs[i].1 = value.clone(),
            None => pairs.push((name.map(str::to_string), value.clone())),
        }
    }
    Arguments::from_pairs(pairs)
}

/// `NextMethod()`: continue dispatch with the class after the current one
fn builtin_next_method(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let frame = caller_frame(interp, ctx, "NextMethod")?;
    let Some(current) = frame.dispatch.clone() else {
        return Err(RuntimeError::invalid_argument(
            "NextMethod called from outside a method dispatch",
        ));
    };
    let generic = match &args[0] {
        Value::Missing | Value::Null => current.generic.clone(),
        _ => string_arg(&args, 0, "generic")?,
    };
    let query = MethodQuery {
        generic: &generic,
        classes: &current.classes,
        group: current.group.as_deref(),
        caller_env: &current.caller_env,
        def_env: &current.def_env,
        skip_first: true,
        default_method: !current.at_default(),
        throws_error: true,
    };
    let Some(found) = s3::dispatch(interp, &query)? else {
        return Err(RuntimeError::no_applicable_method(&generic, &current.classes));
    };
    let call_args = next_method_args(&frame.args, &dots_arg(&args, 2));
    let context = DispatchContext::new(
        &found,
        current.group.as_deref(),
        Rc::clone(&current.caller_env),
        Rc::clone(&current.def_env),
        Rc::new(call_args.clone()),
    );
    interp.invoke_dispatched(
        &found.function,
        call_args,
        &frame.caller_env,
        &found.method,
        None,
        Some(Rc::new(context)),
    )
}

/// `registerS3method(genname, class, method, envir)`: record a method in the
/// methods table of the generic's defining environment
fn builtin_register_s3_method(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let generic = string_arg(&args, 0, "genname")?;
    let class = string_arg(&args, 1, "class")?;
    let method = match required(&args, 2, "method")? {
        Value::Vector(_) => {
            let name = string_arg(&args, 2, "method")?;
            interp.lookup_function(&name, &ctx.caller_env, None)?
        }
        value if value.is_function() => value.clone(),
        _ => return Err(RuntimeError::invalid_argument("'method' must be a function")),
    };
    let env = match &args[3] {
        Value::Env(env) => Rc::clone(env),
        Value::Missing => match interp.lookup_function(&generic, &ctx.caller_env, None)? {
            Value::Closure(closure) => Rc::clone(&closure.env),
            _ => interp.base_env(),
        },
        _ => return Err(RuntimeError::invalid_argument("invalid 'envir' argument")),
    };
    let table = s3::ensure_methods_table(&env, &interp.empty_env())?;
    let name = format!("{generic}.{class}");
    tracing::debug!(method = %name, "registered S3 method");
    table.borrow_mut().define(&name, Slot::Concrete(method))?;
    Ok(Value::Null)
}
