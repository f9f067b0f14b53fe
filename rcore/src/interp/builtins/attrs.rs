//! Attributes and classes

use super::{CallContext, Registry, bool_arg, dots_arg, required, string_arg};
use crate::interp::error::{InterpResult, RuntimeError};
use crate::interp::eval::Interpreter;
use crate::interp::value::{Value, VectorData};

pub(super) fn register(reg: &mut Registry) {
    reg.eager("class", &["x"], builtin_class);
    reg.eager("class<-", &["x", "value"], builtin_set_class);
    reg.eager("oldClass", &["x"], builtin_old_class);
    reg.eager("unclass", &["x"], builtin_unclass);
    reg.eager("inherits", &["x", "what", "which"], builtin_inherits);
    reg.eager("attr", &["x", "which"], builtin_attr);
    reg.eager("attr<-", &["x", "which", "value"], builtin_set_attr);
    reg.eager("structure", &[".Data", "..."], builtin_structure);
}

/// Set attribute `name` on `x`, or fail for values that cannot carry attributes
fn set_attribute(x: &Value, name: &str, value: Option<Value>) -> InterpResult<Value> {
    if matches!(x, Value::Null) {
        return match value {
            None => Ok(Value::Null),
            Some(_) => Err(RuntimeError::invalid_argument(
                "attempt to set an attribute on NULL",
            )),
        };
    }
    let value = match (name, value) {
        ("class", Some(classes)) if classes.is_empty() => None,
        ("class", Some(Value::Vector(v))) if !matches!(v.data, VectorData::Character(_)) => {
            return Err(RuntimeError::invalid_argument(
                "attempt to set invalid 'class' attribute",
            ));
        }
        (_, value) => value,
    };
    x.with_attr(name, value).ok_or_else(|| {
        RuntimeError::invalid_argument(format!(
            "cannot set attributes on an object of type '{}'",
            x.type_name()
        ))
    })
}

fn optional(value: &Value) -> Option<Value> {
    match value {
        Value::Null | Value::Missing => None,
        other => Some(other.clone()),
    }
}

fn builtin_class(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    Ok(Value::strings(required(&args, 0, "x")?.class_of()))
}

fn builtin_set_class(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    set_attribute(required(&args, 0, "x")?, "class", optional(&args[1]))
}

fn builtin_old_class(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    Ok(required(&args, 0, "x")?.attr("class").cloned().unwrap_or(Value::Null))
}

fn builtin_unclass(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    if !x.is_object() {
        return Ok(x.clone());
    }
    set_attribute(x, "class", None)
}

/// `inherits(x, what, which = FALSE)`
fn builtin_inherits(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let classes = required(&args, 0, "x")?.dispatch_class();
    let what = required(&args, 1, "what")?;
    if !matches!(what.as_vector().map(|v| &v.data), Some(VectorData::Character(_))) {
        return Err(RuntimeError::invalid_argument("'what' must be a character vector"));
    }
    let wanted = what.string_elements();
    if bool_arg(&args, 2, "which", false)? {
        let positions = wanted
            .iter()
            .map(|w| {
                let found = classes.iter().position(|c| c == w);
                Some(found.map_or(0, |i| i as i64 + 1))
            })
            .collect();
        return Ok(Value::from_data(VectorData::Integer(positions)));
    }
    Ok(Value::logical(wanted.iter().any(|w| classes.contains(w))))
}

fn builtin_attr(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    let which = string_arg(&args, 1, "which")?;
    Ok(x.attr(&which).cloned().unwrap_or(Value::Null))
}

fn builtin_set_attr(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let which = string_arg(&args, 1, "which")?;
    set_attribute(&args[0], &which, optional(&args[2]))
}

/// `structure(.Data, ...)`: `.Data` with each named argument set as an attribute
fn builtin_structure(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let mut result = required(&args, 0, ".Data")?.clone();
    for (name, value) in dots_arg(&args, 1).iter() {
        let Some(name) = name else {
            return Err(RuntimeError::invalid_argument(
                "attributes must be named",
            ));
        };
        let name = if name == ".Names" { "names" } else { name };
        result = set_attribute(&result, name, optional(value))?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Value {
        Interpreter::new().eval_source(source).unwrap()
    }

    #[test]
    fn test_class_attribute() {
        assert_eq!(eval("class(1)"), Value::string("numeric"));
        assert_eq!(eval("class(1L)"), Value::string("integer"));
        assert_eq!(eval("x <- 1; class(x) <- \"money\"; class(x)"), Value::string("money"));
        assert_eq!(eval("x <- structure(1, class = \"a\"); class(unclass(x))"), Value::string("numeric"));
        assert_eq!(eval("x <- structure(1, class = \"a\"); class(x) <- NULL; oldClass(x)"), Value::Null);
    }

    #[test]
    fn test_inherits() {
        assert_eq!(eval("inherits(structure(1, class = c(\"a\", \"b\")), \"b\")"), Value::logical(true));
        assert_eq!(eval("inherits(1, \"character\")"), Value::logical(false));
        assert_eq!(
            eval("inherits(structure(1, class = c(\"a\", \"b\")), c(\"z\", \"b\"), TRUE)"),
            Value::from_data(VectorData::Integer(vec![Some(0), Some(2)]))
        );
    }

    #[test]
    fn test_attr() {
        assert_eq!(eval("x <- 1; attr(x, \"unit\") <- \"kg\"; attr(x, \"unit\")"), Value::string("kg"));
        assert_eq!(eval("attr(1, \"unit\")"), Value::Null);
        assert_eq!(
            eval("names(structure(1:2, .Names = c(\"a\", \"b\")))"),
            Value::strings(["a", "b"])
        );
    }

    #[test]
    fn test_attribute_on_null_is_an_error() {
        let err = Interpreter::new()
            .eval_source("attr(NULL, \"a\") <- 1")
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: attempt to set an attribute on NULL");
    }
}
