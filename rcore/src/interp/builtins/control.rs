//! Control transfer, exit handlers, visibility and output

use super::{CallContext, Registry, bool_arg, dots_arg, required, try_dispatch_internal};
use crate::interp::env::EnvRef;
use crate::interp::error::{InterpResult, RuntimeError};
use crate::interp::eval::Interpreter;
use crate::interp::promise::argument_is_missing;
use crate::interp::print::{self, PRINT_DIGITS};
use crate::interp::value::{Value, VectorData};

pub(super) fn register(reg: &mut Registry) {
    reg.eager("return", &["value"], builtin_return).keep_visibility();
    reg.eager("stop", &["...", "call."], builtin_stop);
    reg.lazy("on.exit", &["expr", "add", "after"], builtin_on_exit)
        .invisible();
    reg.lazy("missing", &["x"], builtin_missing);
    reg.eager("invisible", &["x"], builtin_invisible).invisible();
    reg.eager("withVisible", &["x"], builtin_with_visible)
        .keep_visibility();
    reg.eager("print", &["x", "..."], builtin_print).invisible();
    reg.eager("print.default", &["x", "..."], builtin_print_default)
        .invisible();
    reg.eager("cat", &["...", "sep"], builtin_cat).invisible();
}

fn builtin_return(_interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let value = match args.into_iter().next() {
        Some(Value::Missing) | None => Value::Null,
        Some(value) => value,
    };
    Err(RuntimeError::return_signal(value, ctx.caller_env.clone()))
}

/// `stop(...)`: the arguments pasted together become the error message
fn builtin_stop(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let message: String = dots_arg(&args, 0)
        .values()
        .iter()
        .flat_map(Value::string_elements)
        .collect();
    Err(RuntimeError::user(message))
}

/// `on.exit(expr, add = FALSE, after = TRUE)`; has no effect at top level
fn builtin_on_exit(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let expr = match &args[0] {
        Value::Promise(promise) => promise.expr().cloned(),
        _ => None,
    };
    let add = interp.force_value(args[1].clone())?;
    let add = bool_arg(&[add], 0, "add", false)?;
    let after = interp.force_value(args[2].clone())?;
    let after = bool_arg(&[after], 0, "after", true)?;

    let Some(index) = interp.frame_index(&ctx.caller_env) else {
        return Ok(Value::Null);
    };
    let handlers = &mut interp.frames[index].on_exit;
    if !add {
        handlers.clear();
    }
    if let Some(expr) = expr {
        if after {
            handlers.push(expr);
        } else {
            handlers.insert(0, expr);
        }
    }
    Ok(Value::Null)
}

/// Whether `name` is an argument of `env` that was not supplied.
///
/// An argument passed on as a bare name of a missing argument of the caller
/// counts as missing too, before and after it was forced.
fn is_missing_arg(name: &str, env: &EnvRef) -> InterpResult<bool> {
    argument_is_missing(name, env)
        .ok_or_else(|| RuntimeError::invalid_argument("'missing' can only be used for arguments"))
}

fn builtin_missing(_interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let name = match &args[0] {
        Value::Promise(promise) => promise
            .expr()
            .and_then(|e| e.node.as_ident().map(str::to_string)),
        _ => None,
    };
    let Some(name) = name else {
        return Err(RuntimeError::invalid_argument("invalid use of 'missing'"));
    };
    Ok(Value::logical(is_missing_arg(&name, &ctx.caller_env)?))
}

fn builtin_invisible(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    Ok(match &args[0] {
        Value::Missing => Value::Null,
        value => value.clone(),
    })
}

/// `withVisible(x)`: the value with the visibility its evaluation left behind
fn builtin_with_visible(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let value = required(&args, 0, "x")?.clone();
    let visible = interp.is_visible();
    interp.visible = true;
    Ok(Value::list(
        vec![value, Value::logical(visible)],
        Some(vec![Some("value".to_string()), Some("visible".to_string())]),
    ))
}

/// `print(x, ...)`, an internal generic
fn builtin_print(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    if let Some(value) = try_dispatch_internal(interp, ctx, "print", None, &[x])? {
        return Ok(value);
    }
    interp.write_output(&print::format_value(x));
    Ok(x.clone())
}

fn builtin_print_default(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    interp.write_output(&print::format_value(x));
    Ok(x.clone())
}

/// `cat(..., sep = " ")`: atomic elements written unquoted, without a newline
fn builtin_cat(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let sep = match &args[1] {
        Value::Missing => " ".to_string(),
        value => value
            .as_str_scalar()
            .map(str::to_string)
            .ok_or_else(|| RuntimeError::invalid_argument("invalid 'sep' specification"))?,
    };
    let mut items = Vec::new();
    for (i, value) in dots_arg(&args, 0).values().iter().enumerate() {
        match value {
            Value::Null => {}
            Value::Vector(v) => match &v.data {
                VectorData::Double(xs) => items.extend(xs.iter().map(|x| match x {
                    Some(x) => print::format_number(*x, PRINT_DIGITS),
                    None => "NA".to_string(),
                })),
                VectorData::List(_) => {
                    return Err(RuntimeError::type_error(format!(
                        "argument {} (type 'list') cannot be handled by 'cat'",
                        i + 1
                    )));
                }
                _ => items.extend(value.string_elements()),
            },
            other => {
                return Err(RuntimeError::type_error(format!(
                    "argument {} (type '{}') cannot be handled by 'cat'",
                    i + 1,
                    other.type_name()
                )));
            }
        }
    }
    interp.write_output(&items.join(&sep));
    Ok(Value::Null)
}
