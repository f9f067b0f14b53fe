//! The `Ops` group: arithmetic, comparison and logical operators

use super::{CallContext, Registry, required};
use crate::interp::error::{InterpResult, RuntimeError};
use crate::interp::eval::Interpreter;
use crate::interp::s3::{self, DispatchContext, MethodQuery};
use crate::interp::value::{Value, Vector, VectorData};
use std::borrow::Cow;
use std::rc::Rc;

pub(super) fn register(reg: &mut Registry) {
    let binary = &["e1", "e2"];
    reg.eager("+", binary, builtin_add);
    reg.eager("-", binary, builtin_sub);
    reg.eager("*", binary, builtin_mul);
    reg.eager("/", binary, builtin_div);
    reg.eager("^", binary, builtin_pow);
    reg.eager("%%", binary, builtin_mod);
    reg.eager("%/%", binary, builtin_int_div);
    reg.eager("==", binary, builtin_eq);
    reg.eager("!=", binary, builtin_ne);
    reg.eager("<", binary, builtin_lt);
    reg.eager(">", binary, builtin_gt);
    reg.eager("<=", binary, builtin_le);
    reg.eager(">=", binary, builtin_ge);
    reg.eager("&", binary, builtin_and);
    reg.eager("|", binary, builtin_or);
    reg.eager("!", &["x"], builtin_not);
    reg.eager(":", &["from", "to"], builtin_colon);
    reg.lazy("&&", binary, builtin_and_and);
    reg.lazy("||", binary, builtin_or_or);
}

/// Dispatch an internal generic on the first classed value of `objects`.
///
/// Returns `None` when the call was itself selected by dispatch, or when no
/// method exists, so the builtin falls through to its default behavior.
pub(crate) fn try_dispatch_internal(
    interp: &mut Interpreter,
    ctx: &CallContext,
    generic: &str,
    group: Option<&str>,
    objects: &[&Value],
) -> InterpResult<Option<Value>> {
    if ctx.dispatched {
        return Ok(None);
    }
    for object in objects {
        if !object.is_object() {
            continue;
        }
        let classes = object.dispatch_class();
        let base = interp.base_env();
        let query = MethodQuery {
            generic,
            classes: &classes,
            group,
            caller_env: &ctx.caller_env,
            def_env: &base,
            skip_first: false,
            default_method: false,
            throws_error: false,
        };
        let Some(found) = s3::dispatch(interp, &query)? else {
            continue;
        };
        let context = DispatchContext::new(
            &found,
            group,
            Rc::clone(&ctx.caller_env),
            base,
            Rc::clone(&ctx.args),
        );
        let value = interp.invoke_dispatched(
            &found.function,
            (*ctx.args).clone(),
            &ctx.caller_env,
            &found.method,
            None,
            Some(Rc::new(context)),
        )?;
        return Ok(Some(value));
    }
    Ok(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    IntDiv,
}

impl Arith {
    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
            Arith::Pow => "^",
            Arith::Mod => "%%",
            Arith::IntDiv => "%/%",
        }
    }

    fn doubles(self, a: f64, b: f64) -> f64 {
        match self {
            Arith::Add => a + b,
            Arith::Sub => a - b,
            Arith::Mul => a * b,
            Arith::Div => a / b,
            Arith::Pow => a.powf(b),
            Arith::Mod => {
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
            }
            Arith::IntDiv => (a / b).floor(),
        }
    }

    /// `None` is `NA`: overflow and integer division by zero
    fn integers(self, a: i64, b: i64) -> Option<i64> {
        match self {
            Arith::Add => a.checked_add(b),
            Arith::Sub => a.checked_sub(b),
            Arith::Mul => a.checked_mul(b),
            Arith::Mod => {
                let r = a.checked_rem(b)?;
                Some(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
            }
            Arith::IntDiv => {
                let q = a.checked_div(b)?;
                let inexact = a.checked_rem(b)? != 0;
                Some(if inexact && (a < 0) != (b < 0) { q - 1 } else { q })
            }
            Arith::Div | Arith::Pow => None,
        }
    }

    fn keeps_integers(self) -> bool {
        !matches!(self, Arith::Div | Arith::Pow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compare {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Compare {
    fn symbol(self) -> &'static str {
        match self {
            Compare::Eq => "==",
            Compare::Ne => "!=",
            Compare::Lt => "<",
            Compare::Gt => ">",
            Compare::Le => "<=",
            Compare::Ge => ">=",
        }
    }

    fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Compare::Eq => ordering == Equal,
            Compare::Ne => ordering != Equal,
            Compare::Lt => ordering == Less,
            Compare::Gt => ordering == Greater,
            Compare::Le => ordering != Greater,
            Compare::Ge => ordering != Less,
        }
    }
}

/// Operand as a vector payload; `NULL` is a zero-length logical
fn operand(value: &Value) -> Option<Cow<'_, VectorData>> {
    match value {
        Value::Null => Some(Cow::Owned(VectorData::Logical(Vec::new()))),
        Value::Vector(v) => Some(Cow::Borrowed(&v.data)),
        _ => None,
    }
}

/// Result length under recycling: zero if either side is empty
fn recycled_len(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 { 0 } else { a.max(b) }
}

/// Attributes of the operand the result takes its shape from, `e1` first
fn result_attributes(e1: &Value, e2: &Value, len: usize, names_only: bool) -> Vec<(String, Value)> {
    let source = [e1, e2]
        .into_iter()
        .filter_map(Value::as_vector)
        .find(|v| v.len() == len && !v.attributes.is_empty());
    source.map_or_else(Vec::new, |v| {
        v.attributes
            .iter()
            .filter(|(name, _)| !names_only || name == "names")
            .cloned()
            .collect()
    })
}

fn with_attributes(data: VectorData, attributes: Vec<(String, Value)>) -> Value {
    Value::Vector(Rc::new(Vector { data, attributes }))
}

fn arithmetic(op: Arith, e1: &Value, e2: &Value) -> InterpResult<Value> {
    if e2.is_missing() {
        return unary(op, e1);
    }
    let non_numeric = || RuntimeError::type_error("non-numeric argument to binary operator");
    let (Some(a), Some(b)) = (operand(e1), operand(e2)) else {
        return Err(non_numeric());
    };
    if !a.is_numeric() || !b.is_numeric() {
        return Err(non_numeric());
    }
    let len = recycled_len(a.len(), b.len());
    let attributes = result_attributes(e1, e2, len, false);
    let integer = |d: &VectorData| matches!(d, VectorData::Integer(_) | VectorData::Logical(_));
    let data = if op.keeps_integers() && integer(&a) && integer(&b) {
        let (x, y) = (a.to_integers().unwrap_or_default(), b.to_integers().unwrap_or_default());
        VectorData::Integer(
            (0..len)
                .map(|i| match (x[i % x.len()], y[i % y.len()]) {
                    (Some(p), Some(q)) => op.integers(p, q),
                    _ => None,
                })
                .collect(),
        )
    } else {
        let (x, y) = (a.to_doubles().unwrap_or_default(), b.to_doubles().unwrap_or_default());
        VectorData::Double(
            (0..len)
                .map(|i| match (x[i % x.len()], y[i % y.len()]) {
                    (Some(p), Some(q)) => Some(op.doubles(p, q)),
                    _ => None,
                })
                .collect(),
        )
    };
    Ok(with_attributes(data, attributes))
}

fn unary(op: Arith, e1: &Value) -> InterpResult<Value> {
    let invalid = || RuntimeError::type_error("invalid argument to unary operator");
    let Value::Vector(v) = e1 else {
        return Err(invalid());
    };
    let data = match (&v.data, op) {
        (_, Arith::Add) if v.data.is_numeric() => v.data.clone(),
        (VectorData::Integer(_) | VectorData::Logical(_), Arith::Sub) => VectorData::Integer(
            v.data
                .to_integers()
                .unwrap_or_default()
                .into_iter()
                .map(|n| n.and_then(i64::checked_neg))
                .collect(),
        ),
        (VectorData::Double(items), Arith::Sub) => {
            VectorData::Double(items.iter().map(|x| x.map(|x| -x)).collect())
        }
        _ => return Err(invalid()),
    };
    Ok(with_attributes(data, v.attributes.clone()))
}

fn comparison(op: Compare, e1: &Value, e2: &Value) -> InterpResult<Value> {
    let (Some(a), Some(b)) = (operand(e1), operand(e2)) else {
        return Err(RuntimeError::type_error(format!(
            "comparison ({}) is possible only for atomic and list types",
            op.symbol()
        )));
    };
    if matches!(*a, VectorData::List(_)) || matches!(*b, VectorData::List(_)) {
        return Err(RuntimeError::type_error("comparison of these types is not implemented"));
    }
    let len = recycled_len(a.len(), b.len());
    let attributes = result_attributes(e1, e2, len, true);
    let result: Vec<Option<bool>> = if a.is_numeric() && b.is_numeric() {
        let (x, y) = (a.to_doubles().unwrap_or_default(), b.to_doubles().unwrap_or_default());
        (0..len)
            .map(|i| match (x[i % x.len()], y[i % y.len()]) {
                (Some(p), Some(q)) => p.partial_cmp(&q).map(|o| op.holds(o)),
                _ => None,
            })
            .collect()
    } else {
        let (x, y) = (a.to_strings(), b.to_strings());
        (0..len)
            .map(|i| match (&x[i % x.len()], &y[i % y.len()]) {
                (Some(p), Some(q)) => Some(op.holds(p.cmp(q))),
                _ => None,
            })
            .collect()
    };
    Ok(with_attributes(VectorData::Logical(result), attributes))
}

fn logicals(value: &Value, op: &str) -> InterpResult<Vec<Option<bool>>> {
    operand(value)
        .filter(|d| !matches!(**d, VectorData::Character(_)))
        .and_then(|d| d.to_logicals())
        .ok_or_else(|| {
            RuntimeError::type_error(format!(
                "operations are possible only for numeric, logical or complex types ({op})"
            ))
        })
}

fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn elementwise_logic(e1: &Value, e2: &Value, op: &str, f: fn(Option<bool>, Option<bool>) -> Option<bool>) -> InterpResult<Value> {
    let (x, y) = (logicals(e1, op)?, logicals(e2, op)?);
    let len = recycled_len(x.len(), y.len());
    let attributes = result_attributes(e1, e2, len, true);
    let data = (0..len).map(|i| f(x[i % x.len()], y[i % y.len()])).collect();
    Ok(with_attributes(VectorData::Logical(data), attributes))
}

macro_rules! operators {
    ($($name:ident => $kind:ident :: $variant:ident),* $(,)?) => {
        $(
            fn $name(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
                binary_op(interp, ctx, &args, Op::$kind($kind::$variant))
            }
        )*
    };
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Arith(Arith),
    Compare(Compare),
}

operators! {
    builtin_add => Arith::Add,
    builtin_sub => Arith::Sub,
    builtin_mul => Arith::Mul,
    builtin_div => Arith::Div,
    builtin_pow => Arith::Pow,
    builtin_mod => Arith::Mod,
    builtin_int_div => Arith::IntDiv,
    builtin_eq => Compare::Eq,
    builtin_ne => Compare::Ne,
    builtin_lt => Compare::Lt,
    builtin_gt => Compare::Gt,
    builtin_le => Compare::Le,
    builtin_ge => Compare::Ge,
}

fn binary_op(interp: &mut Interpreter, ctx: &CallContext, args: &[Value], op: Op) -> InterpResult<Value> {
    let symbol = match op {
        Op::Arith(op) => op.symbol(),
        Op::Compare(op) => op.symbol(),
    };
    let e1 = required(args, 0, "e1")?;
    let e2 = &args[1];
    if let Some(value) = try_dispatch_internal(interp, ctx, symbol, Some("Ops"), &[e1, e2])? {
        return Ok(value);
    }
    match op {
        Op::Arith(op) => arithmetic(op, e1, e2),
        Op::Compare(op) => {
            let e2 = required(args, 1, "e2")?;
            comparison(op, e1, e2)
        }
    }
}

fn builtin_and(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let (e1, e2) = (required(&args, 0, "e1")?, required(&args, 1, "e2")?);
    if let Some(value) = try_dispatch_internal(interp, ctx, "&", Some("Ops"), &[e1, e2])? {
        return Ok(value);
    }
    elementwise_logic(e1, e2, "&", and3)
}

fn builtin_or(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let (e1, e2) = (required(&args, 0, "e1")?, required(&args, 1, "e2")?);
    if let Some(value) = try_dispatch_internal(interp, ctx, "|", Some("Ops"), &[e1, e2])? {
        return Ok(value);
    }
    elementwise_logic(e1, e2, "|", or3)
}

fn builtin_not(interp: &mut Interpreter, ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let x = required(&args, 0, "x")?;
    if let Some(value) = try_dispatch_internal(interp, ctx, "!", Some("Ops"), &[x])? {
        return Ok(value);
    }
    let attributes = x.as_vector().map(|v| v.attributes.clone()).unwrap_or_default();
    let data = logicals(x, "!")?.into_iter().map(|b| b.map(|b| !b)).collect();
    Ok(with_attributes(VectorData::Logical(data), attributes))
}

fn builtin_colon(_interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let bound = |i: usize, formal: &str| -> InterpResult<f64> {
        required(&args, i, formal)?
            .as_f64_scalar()
            .filter(|x| x.is_finite())
            .ok_or_else(|| RuntimeError::invalid_argument("NA/NaN argument"))
    };
    let (from, to) = (bound(0, "from")?, bound(1, "to")?);
    let count = (to - from).abs().floor() as usize + 1;
    let step = if from <= to { 1.0 } else { -1.0 };
    let values = (0..count).map(|i| from + step * i as f64);
    let data = if from.fract() == 0.0 && from.abs() < i64::MAX as f64 {
        VectorData::Integer(values.map(|x| Some(x as i64)).collect())
    } else {
        VectorData::Double(values.map(Some).collect())
    };
    Ok(Value::from_data(data))
}

/// Scalar condition of `&&`/`||`; `None` is `NA`
fn scalar_logic(interp: &mut Interpreter, value: &Value, op: &str, side: &str) -> InterpResult<Option<bool>> {
    let value = interp.force_value(value.clone())?;
    let items = match operand(&value).as_deref() {
        Some(VectorData::Character(_)) | None => None,
        Some(data) => data.to_logicals(),
    };
    match items {
        Some(items) if items.len() == 1 => Ok(items[0]),
        Some(items) if items.is_empty() => Err(RuntimeError::type_error(format!(
            "invalid '{side}' type in 'x {op} y'"
        ))),
        Some(_) => Err(RuntimeError::type_error(format!(
            "'length = {}' in coercion to 'logical(1)'",
            value.len()
        ))),
        None => Err(RuntimeError::type_error(format!(
            "invalid '{side}' type in 'x {op} y'"
        ))),
    }
}

fn builtin_and_and(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let lhs = scalar_logic(interp, required(&args, 0, "e1")?, "&&", "x")?;
    if lhs == Some(false) {
        return Ok(Value::logical(false));
    }
    let rhs = scalar_logic(interp, required(&args, 1, "e2")?, "&&", "y")?;
    Ok(Value::from_data(VectorData::Logical(vec![and3(lhs, rhs)])))
}

fn builtin_or_or(interp: &mut Interpreter, _ctx: &CallContext, args: Vec<Value>) -> InterpResult<Value> {
    let lhs = scalar_logic(interp, required(&args, 0, "e1")?, "||", "x")?;
    if lhs == Some(true) {
        return Ok(Value::logical(true));
    }
    let rhs = scalar_logic(interp, required(&args, 1, "e2")?, "||", "y")?;
    Ok(Value::from_data(VectorData::Logical(vec![or3(lhs, rhs)])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::interp::error::ErrorKind;

    fn eval(source: &str) -> Value {
        Interpreter::new().eval_source(source).unwrap()
    }

    #[test]
    fn test_integer_and_double_arithmetic() {
        assert_eq!(eval("1L + 2L"), Value::int(3));
        assert_eq!(eval("1L / 2L"), Value::num(0.5));
        assert_eq!(eval("2 ^ 10"), Value::num(1024.0));
        assert_eq!(eval("-7 %% 3"), Value::num(2.0));
        assert_eq!(eval("-7L %/% 2L"), Value::int(-4));
        assert_eq!(eval("5L %% -3L"), Value::int(-1));
    }

    #[test]
    fn test_recycling() {
        assert_eq!(
            eval("c(1, 2, 3, 4) * c(10, 100)"),
            Value::doubles(vec![Some(10.0), Some(200.0), Some(30.0), Some(400.0)])
        );
        assert_eq!(eval("length(c(1, 2) + NULL)"), Value::int(0));
    }

    #[test]
    fn test_comparison_and_na() {
        assert_eq!(eval("\"a\" < \"b\""), Value::logical(true));
        assert_eq!(
            eval("c(1, NA, 3) > 2"),
            Value::from_data(VectorData::Logical(vec![Some(false), None, Some(true)]))
        );
    }

    #[test]
    fn test_short_circuit_does_not_force_rhs() {
        assert_eq!(eval("FALSE && stop(\"forced\")"), Value::logical(false));
        assert_eq!(eval("TRUE || stop(\"forced\")"), Value::logical(true));
        assert_eq!(
            eval("NA && TRUE"),
            Value::from_data(VectorData::Logical(vec![None]))
        );
    }

    #[test]
    fn test_colon() {
        assert_eq!(
            eval("3:1"),
            Value::from_data(VectorData::Integer(vec![Some(3), Some(2), Some(1)]))
        );
        assert_eq!(eval("1.5:2"), Value::num(1.5));
    }

    #[test]
    fn test_non_numeric_operand() {
        let err = Interpreter::new().eval_source("\"a\" + 1").unwrap_err();
        assert_eq!(err.to_string(), "Error: non-numeric argument to binary operator");
        let Error::Runtime(err) = err else {
            panic!("expected a runtime error");
        };
        assert_eq!(err.kind, ErrorKind::TypeError);
    }
}
