//! Vector construction, inspection and indexing

use super::{CallContext, Registry, dots_arg, required, try_dispatch_internal};
use crate::interp::env::EnvRef;
use crate::interp::error::{InterpResult, RuntimeError};
use crate::interp::eval::Interpreter;
use crate::interp::resolve::{ExpectedKind, ReadMode};
use crate::interp::value::{Value, Vector, VectorData};
use std::rc::Rc;

pub(super) fn register(reg: &mut Registry) {
    reg.eager("c", &["..."], builtin_c);
    reg.eager("list", &["..."], builtin_list);
    reg.eager("length", &["x"], builtin_length);
    reg.eager("paste0", &["...", "collapse"], builtin_paste0);
    reg.eager("identical", &["x", "y"], builtin_identical);
    reg.eager("is.null", &["x"], builtin_is_null);
    reg.eager("is.function", &["x"], builtin_is_function);
    reg.eager("is.environment", &["x"], builtin_is_environment);
    reg.eager("names", &["x"], builtin_names);
    reg.eager("names<-", &["x", "value"], builtin_set_names);
    reg.eager("[[", &["x", "i"], builtin_index2);
    reg.eager("[", &["x", "i"], builtin_index);
    reg.eager("$", &["x", "name"], builtin_dollar);
    reg.eager("$<-", &["x", "name", "value"], builtin_set_dollar);
    reg.eager("[[<-", &["x", "i", "value"], builtin_set_index2);
    reg.eager("[<-", &["x", "i", "value"], builtin_set_index);
}

/// `c(...)`: concatenate, coercing to the highest type present
fn builtin_c(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let parts = dots_arg(&args, 0);
    let mut rank = 0;
    let mut any = false;
    for (_, value) in parts.iter() {
        match value {
            Value::Null => {}
            Value::Vector(v) => {
                rank = rank.max(v.data.rank());
                any = true;
            }
            _ => {
                rank = 4;
                any = true;
            }
        }
    }
    if !any {
        return Ok(Value::Null);
    }

    let mut data = VectorData::empty(rank);
    let mut names: Vec<Option<String>> = Vec::new();
    for (name, value) in parts.iter() {
        match value {
            Value::Null => {}
            Value::Vector(v) => {
                let inner = v.names();
                for i in 0..v.len() {
                    let element_name = inner.as_ref().and_then(|n| n[i].clone());
                    names.push(match (name, element_name) {
                        (Some(outer), Some(inner)) => Some(format!("{outer}.{inner}")),
                        (Some(outer), None) if v.len() > 1 => Some(format!("{outer}{}", i + 1)),
                        (Some(outer), None) => Some(outer.to_string()),
                        (None, inner) => inner,
                    });
                }
                data.extend(v.data.coerce(rank));
            }
            other => {
                names.push(name.map(str::to_string));
                data.extend(VectorData::List(vec![other.clone()]));
            }
        }
    }
    let mut vector = Vector::new(data);
    if names.iter().any(Option::is_some) {
        vector.set_names(names);
    }
    Ok(Value::Vector(Rc::new(vector)))
}

fn builtin_list(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let items = dots_arg(&args, 0);
    let names = items.signature().names().to_vec();
    Ok(Value::list(items.values().to_vec(), Some(names)))
}

/// `length(x)`, an internal generic
fn builtin_length(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    if let Some(value) = try_dispatch_internal(interp, ctx, "length", None, &[x])? {
        return Ok(value);
    }
    Ok(Value::int(x.len() as i64))
}

fn builtin_paste0(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let parts: Vec<Vec<String>> = dots_arg(&args, 0)
        .values()
        .iter()
        .map(Value::string_elements)
        .filter(|items| !items.is_empty())
        .collect();
    let len = parts.iter().map(Vec::len).max().unwrap_or(0);
    let pasted: Vec<String> = (0..len)
        .map(|i| parts.iter().map(|p| p[i % p.len()].as_str()).collect())
        .collect();
    match &args[1] {
        Value::Missing | Value::Null => Ok(Value::strings(pasted)),
        collapse => {
            let sep = collapse
                .as_str_scalar()
                .ok_or_else(|| RuntimeError::invalid_argument("invalid 'collapse' argument"))?;
            Ok(Value::string(pasted.join(sep)))
        }
    }
}

fn builtin_identical(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let (x, y) = (required(&args, 0, "x")?, required(&args, 1, "y")?);
    Ok(Value::logical(x == y))
}

fn builtin_is_null(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    Ok(Value::logical(matches!(required(&args, 0, "x")?, Value::Null)))
}

fn builtin_is_function(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    Ok(Value::logical(required(&args, 0, "x")?.is_function()))
}

fn builtin_is_environment(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    Ok(Value::logical(matches!(required(&args, 0, "x")?, Value::Env(_))))
}

fn builtin_names(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    match required(&args, 0, "x")? {
        Value::Env(env) => {
            let mut names = env.borrow().names();
            names.sort();
            Ok(Value::strings(names))
        }
        Value::Vector(v) => Ok(v.attr("names").cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

fn builtin_set_names(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    let Value::Vector(v) = x else {
        return Err(RuntimeError::invalid_argument("names() applied to a non-vector"));
    };
    let mut vector = (**v).clone();
    match &args[1] {
        Value::Null | Value::Missing => vector.set_attr("names", None),
        value => {
            let mut names: Vec<Option<String>> = match value {
                Value::Vector(n) => n.data.to_strings(),
                _ => return Err(RuntimeError::invalid_argument("invalid 'names' argument")),
            };
            if names.len() > vector.len() {
                return Err(RuntimeError::invalid_argument(format!(
                    "'names' attribute [{}] must be the same length as the vector [{}]",
                    names.len(),
                    vector.len()
                )));
            }
            names.resize(vector.len(), None);
            vector.set_names(names);
        }
    }
    Ok(Value::Vector(Rc::new(vector)))
}

/// One-based position of a scalar index, or the position of a name
enum Subscript {
    Position(usize),
    Name(String),
}

fn subscript(index: &Value) -> InterpResult<Subscript> {
    let invalid = || RuntimeError::invalid_argument("invalid subscript");
    let Value::Vector(v) = index else {
        return Err(invalid());
    };
    if v.len() != 1 {
        return Err(RuntimeError::invalid_argument(if v.is_empty() {
            "subscript of length 0"
        } else {
            "attempt to select more than one element"
        }));
    }
    match &v.data {
        VectorData::Character(items) => items[0].clone().map(Subscript::Name).ok_or_else(invalid),
        data => {
            let position = data.to_doubles().and_then(|d| d[0]).ok_or_else(invalid)?;
            if position < 1.0 {
                return Err(RuntimeError::invalid_argument("invalid negative subscript in get1index <real>"));
            }
            Ok(Subscript::Position(position as usize))
        }
    }
}

/// Read `name` from an environment without inheritance, `NULL` when absent
fn env_get(interp: &mut Interpreter, env: &EnvRef, name: &str) -> InterpResult<Value> {
    if !env.borrow().contains(name) {
        return Ok(Value::Null);
    }
    let value = interp.resolve(name, env, ExpectedKind::Any, ReadMode::Silent, None)?;
    Ok(value.unwrap_or(Value::Null))
}

fn builtin_index2(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    let index = subscript(required(&args, 1, "i")?)?;
    let out_of_bounds = || RuntimeError::invalid_argument("subscript out of bounds");
    match (x, index) {
        (Value::Env(env), Subscript::Name(name)) => env_get(interp, env, &name),
        (Value::Env(_), Subscript::Position(_)) => Err(RuntimeError::invalid_argument(
            "wrong args for environment subassignment",
        )),
        (Value::Vector(v), Subscript::Position(i)) if i <= v.len() => Ok(v.data.element(i - 1)),
        (Value::Vector(v), Subscript::Name(name)) => v
            .position_of(&name)
            .map(|i| v.data.element(i))
            .ok_or_else(out_of_bounds),
        (Value::Null, _) => Ok(Value::Null),
        _ => Err(out_of_bounds()),
    }
}

/// Zero-based positions selected by a `[` index; `None` selects `NA`
fn positions(vector: &Vector, index: &Value) -> InterpResult<Vec<Option<usize>>> {
    let len = vector.len();
    let Value::Vector(index) = index else {
        return Err(RuntimeError::invalid_argument("invalid subscript type"));
    };
    match &index.data {
        VectorData::Logical(mask) => {
            if mask.is_empty() {
                return Ok(Vec::new());
            }
            let total = len.max(mask.len());
            Ok((0..total)
                .filter_map(|i| match mask[i % mask.len()] {
                    Some(true) => Some((i < len).then_some(i)),
                    Some(false) => None,
                    None => Some(None),
                })
                .collect())
        }
        VectorData::Character(names) => Ok(names
            .iter()
            .map(|n| n.as_deref().and_then(|n| vector.position_of(n)))
            .collect()),
        VectorData::List(_) => Err(RuntimeError::invalid_argument("invalid subscript type 'list'")),
        data => {
            let indices = data.to_doubles().unwrap_or_default();
            let negative = indices.iter().flatten().any(|&x| x < 0.0);
            let positive = indices.iter().flatten().any(|&x| x > 0.0);
            if negative && positive {
                return Err(RuntimeError::invalid_argument(
                    "can't mix positive and negative subscripts",
                ));
            }
            if negative {
                let excluded: Vec<usize> = indices
                    .iter()
                    .flatten()
                    .map(|&x| (-x) as usize)
                    .collect();
                return Ok((0..len)
                    .filter(|i| !excluded.contains(&(i + 1)))
                    .map(Some)
                    .collect());
            }
            Ok(indices
                .iter()
                .filter(|x| **x != Some(0.0))
                .map(|x| x.map(|x| x as usize - 1))
                .collect())
        }
    }
}

fn builtin_index(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    let Value::Vector(v) = x else {
        return match x {
            Value::Null => Ok(Value::Null),
            _ => Err(RuntimeError::type_error(format!(
                "object of type '{}' is not subsettable",
                x.type_name()
            ))),
        };
    };
    if args[1].is_missing() {
        return Ok(x.clone());
    }
    let selected = positions(v, &args[1])?;
    let mut vector = Vector::new(v.data.select(&selected));
    if let Some(names) = v.names() {
        let picked = selected
            .iter()
            .map(|i| i.and_then(|i| names.get(i).cloned().flatten()))
            .collect();
        vector.set_names(picked);
    }
    Ok(Value::Vector(Rc::new(vector)))
}

fn field_name(args: &[Value]) -> InterpResult<String> {
    required(args, 1, "name")?
        .as_str_scalar()
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::invalid_argument("invalid subscript type"))
}

/// `x$name`: exact, then unique partial match on list names
fn builtin_dollar(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let name = field_name(&args)?;
    match required(&args, 0, "x")? {
        Value::Env(env) => env_get(interp, env, &name),
        Value::Null => Ok(Value::Null),
        Value::Vector(v) => {
            let VectorData::List(items) = &v.data else {
                return Err(RuntimeError::type_error("$ operator is invalid for atomic vectors"));
            };
            let names = v.names().unwrap_or_default();
            if let Some(i) = names.iter().position(|n| n.as_deref() == Some(name.as_str())) {
                return Ok(items[i].clone());
            }
            let partial: Vec<usize> = names
                .iter()
                .enumerate()
                .filter(|(_, n)| n.as_deref().is_some_and(|n| n.starts_with(name.as_str())))
                .map(|(i, _)| i)
                .collect();
            Ok(match partial.as_slice() {
                [i] => items[*i].clone(),
                _ => Value::Null,
            })
        }
        other => Err(RuntimeError::type_error(format!(
            "object of type '{}' is not subsettable",
            other.type_name()
        ))),
    }
}

/// Store `value` in list `x` under `name`; `NULL` removes the element
fn set_list_element(x: &Value, name: &str, value: &Value) -> InterpResult<Value> {
    let vector = match x {
        Value::Null => Vector::new(VectorData::List(Vec::new())),
        Value::Vector(v) if matches!(v.data, VectorData::List(_)) => (**v).clone(),
        Value::Vector(v) => {
            let mut vector = (**v).clone();
            vector.data = VectorData::List(v.data.to_values());
            vector
        }
        other => {
            return Err(RuntimeError::type_error(format!(
                "invalid type '{}' for element assignment",
                other.type_name()
            )));
        }
    };
    let mut names = vector.names().unwrap_or_else(|| vec![None; vector.len()]);
    let VectorData::List(mut items) = vector.data else {
        return Err(RuntimeError::internal("list conversion produced an atomic vector"));
    };
    let position = names.iter().position(|n| n.as_deref() == Some(name));
    match (position, value) {
        (Some(i), Value::Null) => {
            items.remove(i);
            names.remove(i);
        }
        (Some(i), value) => items[i] = value.clone(),
        (None, Value::Null) => {}
        (None, value) => {
            items.push(value.clone());
            names.push(Some(name.to_string()));
        }
    }
    let mut result = Vector {
        data: VectorData::List(items),
        attributes: vector.attributes,
    };
    result.set_names(names);
    Ok(Value::Vector(Rc::new(result)))
}

fn assign_in_env(interp: &mut Interpreter, env: &EnvRef, name: &str, value: &Value) -> InterpResult<Value> {
    interp.assign_in(env, name, value.clone())?;
    Ok(Value::Env(Rc::clone(env)))
}

fn builtin_set_dollar(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let name = field_name(&args)?;
    let value = required(&args, 2, "value")?;
    match &args[0] {
        Value::Env(env) => assign_in_env(interp, env, &name, value),
        x => set_list_element(x, &name, value),
    }
}

fn builtin_set_index2(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = &args[0];
    let value = required(&args, 2, "value")?;
    match (x, subscript(required(&args, 1, "i")?)?) {
        (Value::Env(env), Subscript::Name(name)) => assign_in_env(interp, env, &name, value),
        (Value::Env(_), Subscript::Position(_)) => Err(RuntimeError::invalid_argument(
            "wrong args for environment subassignment",
        )),
        (x, Subscript::Name(name)) if is_list_like(x) => set_list_element(x, &name, value),
        (x, Subscript::Position(i)) => replace_at(x, &[Some(i - 1)], value, true),
        (x, Subscript::Name(name)) => {
            let position = x.as_vector().and_then(|v| v.position_of(&name));
            match position {
                Some(i) => replace_at(x, &[Some(i)], value, true),
                None => append_named(x, &name, value),
            }
        }
    }
}

fn is_list_like(x: &Value) -> bool {
    match x {
        Value::Null => true,
        Value::Vector(v) => matches!(v.data, VectorData::List(_)),
        _ => false,
    }
}

fn append_named(x: &Value, name: &str, value: &Value) -> InterpResult<Value> {
    let len = x.len();
    let result = replace_at(x, &[Some(len)], value, false)?;
    let Value::Vector(v) = &result else {
        return Ok(result);
    };
    let mut vector = (**v).clone();
    let mut names = vector.names().unwrap_or_else(|| vec![None; len]);
    names.resize(len, None);
    names.push(Some(name.to_string()));
    vector.set_names(names);
    Ok(Value::Vector(Rc::new(vector)))
}

/// Replace the elements at zero-based `positions`, extending with `NA` as needed
fn replace_at(x: &Value, positions: &[Option<usize>], value: &Value, single: bool) -> InterpResult<Value> {
    let base = match x {
        Value::Null => Vector::new(VectorData::empty(0)),
        Value::Vector(v) => (**v).clone(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "object of type '{}' is not subsettable",
                other.type_name()
            )));
        }
    };
    let list_target = matches!(base.data, VectorData::List(_));
    let replacement: Vec<Value> = match value {
        _ if list_target && single => vec![value.clone()],
        Value::Vector(v) => v.data.to_values(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    if replacement.is_empty() {
        return Err(RuntimeError::invalid_argument("replacement has length zero"));
    }
    let rank = match value {
        _ if list_target => 4,
        Value::Vector(v) => base.data.rank().max(v.data.rank()),
        _ => 4,
    };
    let mut items = base.data.coerce(rank).to_values();
    let old_len = items.len();
    for (k, position) in positions.iter().enumerate() {
        let Some(i) = position else { continue };
        if *i >= items.len() {
            items.resize(*i + 1, Value::from_data(VectorData::empty(rank).with_na()));
        }
        items[*i] = replacement[k % replacement.len()].clone();
    }
    let data = VectorData::from_values(&items, rank);
    let names = base.names();
    let mut vector = Vector {
        data,
        attributes: base.attributes,
    };
    if items.len() > old_len
        && let Some(mut names) = names
    {
        names.resize(items.len(), None);
        vector.set_names(names);
    }
    Ok(Value::Vector(Rc::new(vector)))
}

fn builtin_set_index(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = &args[0];
    let value = required(&args, 2, "value")?;
    let target = match x {
        Value::Null => Vector::new(VectorData::empty(0)),
        Value::Vector(v) => (**v).clone(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "object of type '{}' is not subsettable",
                other.type_name()
            )));
        }
    };
    if args[1].is_missing() {
        let all: Vec<Option<usize>> = (0..target.len()).map(Some).collect();
        return replace_at(x, &all, value, false);
    }
    if let Value::Vector(index) = &args[1]
        && let VectorData::Character(names) = &index.data
    {
        // Unknown names append new elements
        let mut result = x.clone();
        for (k, name) in names.iter().enumerate() {
            let name = name.as_deref().unwrap_or_default();
            let element = value_element(value, k);
            let position = result.as_vector().and_then(|v| v.position_of(name));
            result = match position {
                Some(i) => replace_at(&result, &[Some(i)], &element, false)?,
                None => append_named(&result, name, &element)?,
            };
        }
        return Ok(result);
    }
    let selected = positions(&target, &args[1])?;
    replace_at(x, &selected, value, false)
}

fn value_element(value: &Value, i: usize) -> Value {
    match value {
        Value::Vector(v) if !v.is_empty() => v.data.element(i % v.len()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Value {
        Interpreter::new().eval_source(source).unwrap()
    }

    fn names_of(value: &Value) -> Vec<Option<String>> {
        value.as_vector().and_then(Vector::names).unwrap_or_default()
    }

    #[test]
    fn test_c_coerces_and_names() {
        assert_eq!(eval("c(1L, 2.5)"), Value::doubles(vec![Some(1.0), Some(2.5)]));
        assert_eq!(eval("c(TRUE, \"a\")"), Value::strings(["TRUE", "a"]));
        assert_eq!(eval("c()"), Value::Null);
        let named = eval("c(a = 1, b = c(x = 2, y = 3), 4)");
        assert_eq!(
            names_of(&named),
            vec![
                Some("a".to_string()),
                Some("b.x".to_string()),
                Some("b.y".to_string()),
                None
            ]
        );
    }

    #[test]
    fn test_paste0() {
        assert_eq!(eval("paste0(\"a\", 1:3)"), Value::strings(["a1", "a2", "a3"]));
        assert_eq!(
            eval("paste0(c(\"x\", \"y\"), collapse = \"+\")"),
            Value::string("x+y")
        );
    }

    #[test]
    fn test_indexing() {
        assert_eq!(eval("x <- c(10, 20, 30); x[2]"), Value::num(20.0));
        assert_eq!(eval("x <- c(10, 20, 30); x[-1]"), Value::doubles(vec![Some(20.0), Some(30.0)]));
        assert_eq!(
            eval("x <- c(10, 20, 30); x[c(TRUE, FALSE)]"),
            Value::doubles(vec![Some(10.0), Some(30.0)])
        );
        assert_eq!(eval("l <- list(a = 1, b = \"z\"); l[[\"b\"]]"), Value::string("z"));
        assert_eq!(eval("l <- list(alpha = 1); l$al"), Value::num(1.0));
        let err = Interpreter::new().eval_source("list(1)[[3]]").unwrap_err();
        assert_eq!(err.to_string(), "Error: subscript out of bounds");
    }

    #[test]
    fn test_replacement_functions() {
        assert_eq!(
            eval("l <- list(a = 1); l$b <- 2; l$a <- NULL; l"),
            Value::list(vec![Value::num(2.0)], Some(vec![Some("b".to_string())]))
        );
        assert_eq!(
            eval("x <- c(1, 2); x[[4]] <- 9; x"),
            Value::doubles(vec![Some(1.0), Some(2.0), None, Some(9.0)])
        );
        assert_eq!(
            eval("x <- c(a = 1, b = 2); names(x)[2] <- \"z\"; names(x)"),
            Value::strings(["a", "z"])
        );
    }

    #[test]
    fn test_environment_elements() {
        assert_eq!(eval("e <- new.env(); e$x <- 5; e[[\"x\"]]"), Value::num(5.0));
        assert_eq!(eval("e <- new.env(); e$missing"), Value::Null);
    }
}
