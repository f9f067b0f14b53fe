//! Printing and deparsing of values

use super::env::EnvRef;
use super::value::{Closure, Value, Vector, VectorData};
use std::rc::Rc;

/// Console width used when wrapping vectors
const LINE_WIDTH: usize = 80;

/// Significant digits used by `print`
pub const PRINT_DIGITS: usize = 7;

/// Significant digits used when deparsing and converting to character
pub const DEPARSE_DIGITS: usize = 15;

/// Significant digits and decimal exponent of a finite number
#[derive(Debug, Clone, Copy)]
struct Decomposed {
    sig: usize,
    exponent: i32,
}

impl Decomposed {
    fn of(x: f64, digits: usize) -> Self {
        if x == 0.0 {
            return Decomposed { sig: 1, exponent: 0 };
        }
        let sci = format!("{:.*e}", digits.saturating_sub(1), x.abs());
        let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
        let sig = mantissa
            .trim_end_matches('0')
            .trim_end_matches('.')
            .chars()
            .filter(char::is_ascii_digit)
            .count();
        Decomposed {
            sig: sig.max(1),
            exponent: exponent.parse().unwrap_or(0),
        }
    }

    /// Decimals needed in fixed notation
    fn decimals(self) -> usize {
        usize::try_from(self.sig as i32 - 1 - self.exponent).unwrap_or(0)
    }
}

fn special(x: f64) -> Option<&'static str> {
    if x.is_nan() {
        Some("NaN")
    } else if x == f64::INFINITY {
        Some("Inf")
    } else if x == f64::NEG_INFINITY {
        Some("-Inf")
    } else {
        None
    }
}

fn fixed(x: f64, decimals: usize) -> String {
    if x == 0.0 {
        return format!("{:.*}", decimals, 0.0);
    }
    format!("{x:.decimals$}")
}

fn scientific(x: f64, mantissa_decimals: usize) -> String {
    let text = format!("{x:.mantissa_decimals$e}");
    let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.abs())
}

/// Format one number with at most `digits` significant digits, choosing
/// fixed or scientific notation by width
pub fn format_number(x: f64, digits: usize) -> String {
    if let Some(s) = special(x) {
        return s.to_string();
    }
    let d = Decomposed::of(x, digits);
    let fixed = fixed(x, d.decimals());
    let sci = scientific(x, d.sig - 1);
    if fixed.len() <= sci.len() { fixed } else { sci }
}

/// Format doubles with a common notation and number of decimals
fn format_doubles(values: &[Option<f64>], digits: usize) -> Vec<String> {
    let finite: Vec<Decomposed> = values
        .iter()
        .flatten()
        .filter(|x| x.is_finite())
        .map(|&x| Decomposed::of(x, digits))
        .collect();
    let decimals = finite.iter().map(|d| d.decimals()).max().unwrap_or(0);
    let sig = finite.iter().map(|d| d.sig).max().unwrap_or(1);
    let render = |notation: &dyn Fn(f64) -> String| -> Vec<String> {
        values
            .iter()
            .map(|x| match x {
                None => "NA".to_string(),
                Some(x) => special(*x).map_or_else(|| notation(*x), str::to_string),
            })
            .collect()
    };
    let fixed_cells = render(&|x| fixed(x, decimals));
    let sci_cells = render(&|x| scientific(x, sig - 1));
    let widest = |cells: &[String]| cells.iter().map(String::len).max().unwrap_or(0);
    if widest(&fixed_cells) <= widest(&sci_cells) {
        fixed_cells
    } else {
        sci_cells
    }
}

/// Double-quoted string with R escapes
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn logical(b: &Option<bool>) -> String {
    match b {
        Some(true) => "TRUE".to_string(),
        Some(false) => "FALSE".to_string(),
        None => "NA".to_string(),
    }
}

/// Printed cells of an atomic vector
fn format_cells(data: &VectorData) -> Vec<String> {
    match data {
        VectorData::Logical(v) => v.iter().map(logical).collect(),
        VectorData::Integer(v) => v
            .iter()
            .map(|n| n.map_or_else(|| "NA".to_string(), |n| n.to_string()))
            .collect(),
        VectorData::Double(v) => format_doubles(v, PRINT_DIGITS),
        VectorData::Character(v) => v
            .iter()
            .map(|s| s.as_deref().map_or_else(|| "NA".to_string(), quote))
            .collect(),
        VectorData::List(v) => v.iter().map(deparse_value).collect(),
    }
}

fn empty_vector(data: &VectorData) -> &'static str {
    match data {
        VectorData::Logical(_) => "logical(0)",
        VectorData::Integer(_) => "integer(0)",
        VectorData::Double(_) => "numeric(0)",
        VectorData::Character(_) => "character(0)",
        VectorData::List(_) => "list()",
    }
}

fn width(s: &str) -> usize {
    s.chars().count()
}

fn pad(cell: &str, width: usize, left: bool) -> String {
    if left {
        format!("{cell:<width$}")
    } else {
        format!("{cell:>width$}")
    }
}

fn indexed_lines(cells: &[String], left: bool, lines: &mut Vec<String>) {
    let cell_width = cells.iter().map(|c| width(c)).max().unwrap_or(0);
    let label_width = format!("[{}]", cells.len()).len();
    let per_line = (LINE_WIDTH.saturating_sub(label_width) / (cell_width + 1)).max(1);
    for (row, chunk) in cells.chunks(per_line).enumerate() {
        let label = format!("[{}]", row * per_line + 1);
        let mut line = format!("{label:>label_width$}");
        for cell in chunk {
            line.push(' ');
            line.push_str(&pad(cell, cell_width, left));
        }
        lines.push(line.trim_end().to_string());
    }
}

fn named_lines(cells: &[String], names: &[Option<String>], lines: &mut Vec<String>) {
    let labels: Vec<String> = (0..cells.len())
        .map(|i| names.get(i).cloned().flatten().unwrap_or_default())
        .collect();
    let column = cells
        .iter()
        .chain(&labels)
        .map(|c| width(c))
        .max()
        .unwrap_or(0);
    let per_line = (LINE_WIDTH / (column + 1)).max(1);
    for (chunk_labels, chunk_cells) in labels.chunks(per_line).zip(cells.chunks(per_line)) {
        let row = |items: &[String]| {
            let padded: Vec<String> = items.iter().map(|c| pad(c, column, false)).collect();
            padded.join(" ").trim_end().to_string()
        };
        lines.push(row(chunk_labels));
        lines.push(row(chunk_cells));
    }
}

fn list_lines(items: &[Value], names: Option<&[Option<String>]>, prefix: &str, lines: &mut Vec<String>) {
    if items.is_empty() {
        lines.push("list()".to_string());
        return;
    }
    for (i, item) in items.iter().enumerate() {
        let tag = match names.and_then(|n| n.get(i)).cloned().flatten() {
            Some(name) => format!("{prefix}${name}"),
            None => format!("{prefix}[[{}]]", i + 1),
        };
        lines.push(tag.clone());
        value_lines(item, &tag, lines);
        lines.push(String::new());
    }
}

fn vector_lines(vector: &Vector, prefix: &str, lines: &mut Vec<String>) {
    let names = vector.names();
    match &vector.data {
        VectorData::List(items) => list_lines(items, names.as_deref(), prefix, lines),
        data if data.is_empty() => lines.push(empty_vector(data).to_string()),
        data => {
            let cells = format_cells(data);
            match &names {
                Some(names) => named_lines(&cells, names, lines),
                None => indexed_lines(&cells, matches!(data, VectorData::Character(_)), lines),
            }
        }
    }
    for (name, value) in &vector.attributes {
        if name == "names" {
            continue;
        }
        lines.push(format!("attr(,{})", quote(name)));
        value_lines(value, "", lines);
    }
}

/// Display label of an environment
pub fn environment_label(env: &EnvRef) -> String {
    match env.borrow().name() {
        Some(name) => format!("<environment: {name}>"),
        None => format!("<environment: {:p}>", Rc::as_ptr(env)),
    }
}

fn value_lines(value: &Value, prefix: &str, lines: &mut Vec<String>) {
    match value {
        Value::Null => lines.push("NULL".to_string()),
        Value::Vector(vector) => vector_lines(vector, prefix, lines),
        Value::Closure(closure) => lines.push(deparse_closure(closure)),
        Value::Builtin(builtin) => lines.push(format!(
            "function ({}) .Primitive({})",
            builtin.formals.names().join(", "),
            quote(&builtin.name)
        )),
        Value::Env(env) => lines.push(environment_label(env)),
        Value::Promise(_) => lines.push("<promise>".to_string()),
        Value::VarArgs(_) => lines.push("<...>".to_string()),
        Value::Missing => lines.push(String::new()),
    }
}

/// `print.default` rendering, one `\n`-terminated line per output line
pub fn format_value(value: &Value) -> String {
    let mut lines = Vec::new();
    value_lines(value, "", &mut lines);
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn deparse_atoms(data: &VectorData) -> Vec<String> {
    match data {
        VectorData::Logical(v) => v.iter().map(logical).collect(),
        VectorData::Integer(v) => v
            .iter()
            .map(|n| n.map_or_else(|| "NA".to_string(), |n| format!("{n}L")))
            .collect(),
        VectorData::Double(v) => v
            .iter()
            .map(|x| x.map_or_else(|| "NA".to_string(), |x| format_number(x, DEPARSE_DIGITS)))
            .collect(),
        VectorData::Character(v) => v
            .iter()
            .map(|s| s.as_deref().map_or_else(|| "NA".to_string(), quote))
            .collect(),
        VectorData::List(v) => v.iter().map(deparse_value).collect(),
    }
}

fn deparse_closure(closure: &Closure) -> String {
    let formals = &closure.formals;
    let params: Vec<String> = (0..formals.len())
        .map(|i| match formals.default(i) {
            Some(default) => format!("{} = {}", formals.name(i), default.node),
            None => formals.name(i).to_string(),
        })
        .collect();
    format!("function({}) {}", params.join(", "), closure.body.node)
}

fn deparse_vector(vector: &Vector) -> String {
    if vector.is_empty() {
        return empty_vector(&vector.data).to_string();
    }
    let names = vector.names();
    let mut items: Vec<String> = deparse_atoms(&vector.data)
        .into_iter()
        .enumerate()
        .map(|(i, cell)| match names.as_ref().and_then(|n| n.get(i).cloned().flatten()) {
            Some(name) => format!("{name} = {cell}"),
            None => cell,
        })
        .collect();
    match &vector.data {
        VectorData::List(_) => format!("list({})", items.join(", ")),
        _ if items.len() == 1 && names.is_none() => items.remove(0),
        _ => format!("c({})", items.join(", ")),
    }
}

/// Source-like text for a value
pub fn deparse_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Vector(vector) => deparse_vector(vector),
        Value::Closure(closure) => deparse_closure(closure),
        Value::Builtin(builtin) => format!(".Primitive({})", quote(&builtin.name)),
        Value::Env(_) => "<environment>".to_string(),
        Value::Promise(promise) => match (promise.value(), promise.expr()) {
            (Some(value), _) => deparse_value(&value),
            (None, Some(expr)) => expr.node.to_string(),
            (None, None) => "NULL".to_string(),
        },
        Value::VarArgs(_) => "...".to_string(),
        Value::Missing => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(range: std::ops::RangeInclusive<i64>) -> Value {
        Value::from_data(VectorData::Integer(range.map(Some).collect()))
    }

    #[test]
    fn test_format_number_picks_narrower_notation() {
        assert_eq!(format_number(1.0, 7), "1");
        assert_eq!(format_number(-2.5, 7), "-2.5");
        assert_eq!(format_number(123456.0, 7), "123456");
        assert_eq!(format_number(100000.0, 7), "1e+05");
        assert_eq!(format_number(0.001, 7), "0.001");
        assert_eq!(format_number(0.0001, 7), "1e-04");
        assert_eq!(format_number(1.0 / 3.0, 7), "0.3333333");
        assert_eq!(format_number(0.1 + 0.2, 15), "0.3");
        assert_eq!(format_number(f64::NAN, 7), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY, 7), "-Inf");
    }

    #[test]
    fn test_vector_uses_common_decimals() {
        let v = Value::doubles(vec![Some(1.0), Some(2.5), None]);
        assert_eq!(format_value(&v), "[1] 1.0 2.5  NA\n");
    }

    #[test]
    fn test_long_vector_wraps_with_aligned_labels() {
        let printed = format_value(&ints(1..=30));
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(" [1]  1  2  3"));
        assert_eq!(lines[1], "[26] 26 27 28 29 30");
    }

    #[test]
    fn test_strings_are_quoted_and_left_aligned() {
        let v = Value::strings(["a", "bbb"]);
        assert_eq!(format_value(&v), "[1] \"a\"   \"bbb\"\n");
    }

    #[test]
    fn test_named_vector_prints_header_row() {
        let mut vector = Vector::new(VectorData::Double(vec![Some(1.0), Some(2.0)]));
        vector.set_names(vec![Some("a".to_string()), Some("bb".to_string())]);
        let v = Value::Vector(Rc::new(vector));
        assert_eq!(format_value(&v), " a bb\n 1  2\n");
    }

    #[test]
    fn test_list_and_attributes() {
        let list = Value::list(
            vec![Value::num(1.0), Value::string("x")],
            Some(vec![None, Some("b".to_string())]),
        );
        assert_eq!(format_value(&list), "[[1]]\n[1] 1\n\n$b\n[1] \"x\"\n\n");

        let classed = Value::num(1.0)
            .with_attr("class", Some(Value::string("foo")))
            .unwrap();
        assert_eq!(format_value(&classed), "[1] 1\nattr(,\"class\")\n[1] \"foo\"\n");
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(format_value(&Value::Null), "NULL\n");
        assert_eq!(format_value(&Value::doubles(vec![])), "numeric(0)\n");
        assert_eq!(format_value(&Value::list(vec![], None)), "list()\n");
    }

    #[test]
    fn test_deparse() {
        assert_eq!(deparse_value(&Value::num(2.0)), "2");
        assert_eq!(deparse_value(&Value::int(3)), "3L");
        assert_eq!(deparse_value(&Value::string("a\"b")), "\"a\\\"b\"");
        assert_eq!(deparse_value(&Value::strings(["x", "y"])), "c(\"x\", \"y\")");
        let list = Value::list(
            vec![Value::num(1.0), Value::logical(true)],
            Some(vec![Some("a".to_string()), None]),
        );
        assert_eq!(deparse_value(&list), "list(a = 1, TRUE)");
    }
}
