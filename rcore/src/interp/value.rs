//! Runtime values for the interpreter

use super::args::{Arguments, FormalArguments};
use super::builtins::Builtin;
use super::env::EnvRef;
use super::promise::PromiseRef;
use crate::ast::ExprRef;
use std::rc::Rc;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// `NULL`
    Null,
    /// Atomic vector or list, with attributes
    Vector(Rc<Vector>),
    /// User-defined function
    Closure(Rc<Closure>),
    /// Builtin function
    Builtin(Rc<Builtin>),
    /// Environment (reference semantics)
    Env(EnvRef),
    /// Unforced argument; only appears in argument lists and `...` bundles
    Promise(PromiseRef),
    /// The runtime value bound to `...`
    VarArgs(Rc<Arguments>),
    /// The missing-argument sentinel
    Missing,
}

/// Vector payload and attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    pub data: VectorData,
    pub attributes: Vec<(String, Value)>,
}

/// Vector payload; `None` elements are `NA`
#[derive(Debug, Clone)]
pub enum VectorData {
    Logical(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Character(Vec<Option<String>>),
    List(Vec<Value>),
}

/// User-defined function
#[derive(Debug)]
pub struct Closure {
    pub formals: Rc<FormalArguments>,
    pub body: ExprRef,
    /// Defining environment
    pub env: EnvRef,
}

impl Value {
    pub fn num(x: f64) -> Self {
        Value::doubles(vec![Some(x)])
    }

    pub fn int(n: i64) -> Self {
        Value::from_data(VectorData::Integer(vec![Some(n)]))
    }

    pub fn logical(b: bool) -> Self {
        Value::from_data(VectorData::Logical(vec![Some(b)]))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::from_data(VectorData::Character(vec![Some(s.into())]))
    }

    pub fn strings<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Value::from_data(VectorData::Character(
            items.into_iter().map(|s| Some(s.into())).collect(),
        ))
    }

    pub fn doubles(items: Vec<Option<f64>>) -> Self {
        Value::from_data(VectorData::Double(items))
    }

    /// List with optional element names
    pub fn list(values: Vec<Value>, names: Option<Vec<Option<String>>>) -> Self {
        let mut vector = Vector::new(VectorData::List(values));
        if let Some(names) = names
            && names.iter().any(Option::is_some)
        {
            vector.set_names(names);
        }
        Value::Vector(Rc::new(vector))
    }

    pub fn from_data(data: VectorData) -> Self {
        Value::Vector(Rc::new(Vector::new(data)))
    }

    /// R `typeof`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Vector(v) => v.data.type_name(),
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
            Value::Env(_) => "environment",
            Value::Promise(_) => "promise",
            Value::VarArgs(_) => "...",
            Value::Missing => "symbol",
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_vector(&self) -> Option<&Vector> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_env(&self) -> Option<&EnvRef> {
        match self {
            Value::Env(env) => Some(env),
            _ => None,
        }
    }

    /// R `length`
    pub fn len(&self) -> usize {
        match self {
            Value::Null | Value::Missing => 0,
            Value::Vector(v) => v.len(),
            Value::Env(env) => env.borrow().len(),
            Value::VarArgs(args) => args.len(),
            Value::Closure(_) | Value::Builtin(_) | Value::Promise(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.as_vector().and_then(|v| v.attr(name))
    }

    /// The explicit `class` attribute
    pub fn class_attr(&self) -> Option<Vec<String>> {
        self.attr("class").map(Value::string_elements)
    }

    /// Class vector used for S3 dispatch: the `class` attribute, else the
    /// implicit class of the value's type
    pub fn dispatch_class(&self) -> Vec<String> {
        if let Some(classes) = self.class_attr() {
            return classes;
        }
        let implicit: &[&str] = match self {
            Value::Null => &["NULL"],
            Value::Vector(v) => match v.data {
                VectorData::Logical(_) => &["logical"],
                VectorData::Integer(_) => &["integer", "numeric"],
                VectorData::Double(_) => &["double", "numeric"],
                VectorData::Character(_) => &["character"],
                VectorData::List(_) => &["list"],
            },
            Value::Closure(_) | Value::Builtin(_) => &["function"],
            Value::Env(_) => &["environment"],
            Value::Promise(_) | Value::VarArgs(_) | Value::Missing => &["name"],
        };
        implicit.iter().map(|s| s.to_string()).collect()
    }

    /// Class vector reported by `class()`
    pub fn class_of(&self) -> Vec<String> {
        if let Some(classes) = self.class_attr() {
            return classes;
        }
        match self {
            Value::Vector(v) if matches!(v.data, VectorData::Integer(_) | VectorData::Double(_)) => {
                let name = if matches!(v.data, VectorData::Integer(_)) {
                    "integer"
                } else {
                    "numeric"
                };
                vec![name.to_string()]
            }
            other => other.dispatch_class(),
        }
    }

    /// True when the value carries a `class` attribute
    pub fn is_object(&self) -> bool {
        self.attr("class").is_some()
    }

    /// Character elements of a vector, with `NA` rendered as "NA"
    pub fn string_elements(&self) -> Vec<String> {
        match self {
            Value::Vector(v) => v
                .data
                .to_strings()
                .into_iter()
                .map(|s| s.unwrap_or_else(|| "NA".to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// First element as a string, if this is a non-empty character vector
    pub fn as_str_scalar(&self) -> Option<&str> {
        match self {
            Value::Vector(v) => match &v.data {
                VectorData::Character(items) => items.first()?.as_deref(),
                _ => None,
            },
            _ => None,
        }
    }

    /// First element as a double, if this is a non-empty numeric vector
    pub fn as_f64_scalar(&self) -> Option<f64> {
        match self {
            Value::Vector(v) => v.data.to_doubles()?.first().copied().flatten(),
            _ => None,
        }
    }

    /// First element as a logical, if coercible and not `NA`
    pub fn as_bool_scalar(&self) -> Option<bool> {
        match self {
            Value::Vector(v) => v.data.to_logicals()?.first().copied().flatten(),
            _ => None,
        }
    }

    /// Value with the attribute `name` set; `None` removes it
    pub fn with_attr(&self, name: &str, value: Option<Value>) -> Option<Value> {
        let Value::Vector(v) = self else {
            return None;
        };
        let mut vector = (**v).clone();
        vector.set_attr(name, value);
        Some(Value::Vector(Rc::new(vector)))
    }

    /// Fresh allocation of a vector value, sharing nothing with `self`
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Vector(v) => Value::Vector(Rc::new((**v).clone())),
            other => other.clone(),
        }
    }
}

/// R `identical`
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Missing, Value::Missing) => true,
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Closure(a), Value::Closure(b)) => {
                Rc::ptr_eq(a, b)
                    || (Rc::ptr_eq(&a.formals, &b.formals)
                        && Rc::ptr_eq(&a.body, &b.body)
                        && Rc::ptr_eq(&a.env, &b.env))
            }
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Env(a), Value::Env(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::VarArgs(a), Value::VarArgs(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Vector {
    pub fn new(data: VectorData) -> Self {
        Vector {
            data,
            attributes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn set_attr(&mut self, name: &str, value: Option<Value>) {
        let existing = self.attributes.iter().position(|(n, _)| n == name);
        match (existing, value) {
            (Some(i), Some(value)) => self.attributes[i].1 = value,
            (None, Some(value)) => self.attributes.push((name.to_string(), value)),
            (Some(i), None) => {
                self.attributes.remove(i);
            }
            (None, None) => {}
        }
    }

    /// Element names, if the vector has a `names` attribute
    pub fn names(&self) -> Option<Vec<Option<String>>> {
        match self.attr("names")? {
            Value::Vector(v) => Some(
                v.data
                    .to_strings()
                    .into_iter()
                    .map(|n| n.filter(|s| !s.is_empty()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Unnamed positions are stored as ""
    pub fn set_names(&mut self, names: Vec<Option<String>>) {
        let names = names.into_iter().map(|n| Some(n.unwrap_or_default())).collect();
        let value = Value::from_data(VectorData::Character(names));
        self.set_attr("names", Some(value));
    }

    /// Position of the element called `name`
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.names()?
            .iter()
            .position(|n| n.as_deref() == Some(name))
    }
}

fn doubles_identical(a: &[Option<f64>], b: &[Option<f64>]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
            (None, None) => true,
            _ => false,
        })
}

impl PartialEq for VectorData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VectorData::Logical(a), VectorData::Logical(b)) => a == b,
            (VectorData::Integer(a), VectorData::Integer(b)) => a == b,
            (VectorData::Double(a), VectorData::Double(b)) => doubles_identical(a, b),
            (VectorData::Character(a), VectorData::Character(b)) => a == b,
            (VectorData::List(a), VectorData::List(b)) => a == b,
            _ => false,
        }
    }
}

impl VectorData {
    pub fn len(&self) -> usize {
        match self {
            VectorData::Logical(v) => v.len(),
            VectorData::Integer(v) => v.len(),
            VectorData::Double(v) => v.len(),
            VectorData::Character(v) => v.len(),
            VectorData::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            VectorData::Logical(_) => "logical",
            VectorData::Integer(_) => "integer",
            VectorData::Double(_) => "double",
            VectorData::Character(_) => "character",
            VectorData::List(_) => "list",
        }
    }

    /// Position in the coercion order logical < integer < double < character < list
    pub fn rank(&self) -> u8 {
        match self {
            VectorData::Logical(_) => 0,
            VectorData::Integer(_) => 1,
            VectorData::Double(_) => 2,
            VectorData::Character(_) => 3,
            VectorData::List(_) => 4,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            VectorData::Logical(_) | VectorData::Integer(_) | VectorData::Double(_)
        )
    }

    pub fn to_logicals(&self) -> Option<Vec<Option<bool>>> {
        Some(match self {
            VectorData::Logical(v) => v.clone(),
            VectorData::Integer(v) => v.iter().map(|x| x.map(|n| n != 0)).collect(),
            VectorData::Double(v) => v
                .iter()
                .map(|x| x.and_then(|f| (!f.is_nan()).then_some(f != 0.0)))
                .collect(),
            VectorData::Character(v) => v
                .iter()
                .map(|s| match s.as_deref() {
                    Some("TRUE" | "true" | "T" | "True") => Some(true),
                    Some("FALSE" | "false" | "F" | "False") => Some(false),
                    _ => None,
                })
                .collect(),
            VectorData::List(_) => return None,
        })
    }

    pub fn to_integers(&self) -> Option<Vec<Option<i64>>> {
        Some(match self {
            VectorData::Logical(v) => v.iter().map(|x| x.map(i64::from)).collect(),
            VectorData::Integer(v) => v.clone(),
            VectorData::Double(v) => v
                .iter()
                .map(|x| x.and_then(|f| f.is_finite().then_some(f.trunc() as i64)))
                .collect(),
            VectorData::Character(_) | VectorData::List(_) => return None,
        })
    }

    pub fn to_doubles(&self) -> Option<Vec<Option<f64>>> {
        Some(match self {
            VectorData::Logical(v) => v.iter().map(|x| x.map(|b| f64::from(u8::from(b)))).collect(),
            VectorData::Integer(v) => v.iter().map(|x| x.map(|n| n as f64)).collect(),
            VectorData::Double(v) => v.clone(),
            VectorData::Character(_) | VectorData::List(_) => return None,
        })
    }

    /// `as.character` conversion
    pub fn to_strings(&self) -> Vec<Option<String>> {
        match self {
            VectorData::Logical(v) => v
                .iter()
                .map(|x| x.map(|b| if b { "TRUE" } else { "FALSE" }.to_string()))
                .collect(),
            VectorData::Integer(v) => v.iter().map(|x| x.map(|n| n.to_string())).collect(),
            VectorData::Double(v) => v
                .iter()
                .map(|x| x.map(|f| super::print::format_number(f, 15)))
                .collect(),
            VectorData::Character(v) => v.clone(),
            VectorData::List(v) => v
                .iter()
                .map(|item| match item {
                    Value::Vector(inner) if inner.len() == 1 => {
                        inner.data.to_strings().into_iter().next().flatten()
                    }
                    other => Some(super::print::deparse_value(other)),
                })
                .collect(),
        }
    }

    /// Coerce to the type of rank `rank`
    pub fn coerce(&self, rank: u8) -> VectorData {
        match rank {
            0 => VectorData::Logical(self.to_logicals().unwrap_or_default()),
            1 => VectorData::Integer(self.to_integers().unwrap_or_default()),
            2 => VectorData::Double(self.to_doubles().unwrap_or_default()),
            3 => VectorData::Character(self.to_strings()),
            _ => VectorData::List(self.to_values()),
        }
    }

    /// Each element as a standalone value
    pub fn to_values(&self) -> Vec<Value> {
        (0..self.len()).map(|i| self.element(i)).collect()
    }

    /// Element `i` (0-based): a length-one vector, or the list item
    pub fn element(&self, i: usize) -> Value {
        match self {
            VectorData::Logical(v) => Value::from_data(VectorData::Logical(vec![v[i]])),
            VectorData::Integer(v) => Value::from_data(VectorData::Integer(vec![v[i]])),
            VectorData::Double(v) => Value::from_data(VectorData::Double(vec![v[i]])),
            VectorData::Character(v) => Value::from_data(VectorData::Character(vec![v[i].clone()])),
            VectorData::List(v) => v[i].clone(),
        }
    }

    /// Elements at `indices` (0-based); `None` or out-of-range selects `NA`
    pub fn select(&self, indices: &[Option<usize>]) -> VectorData {
        fn pick<T: Clone>(items: &[Option<T>], indices: &[Option<usize>]) -> Vec<Option<T>> {
            indices
                .iter()
                .map(|i| i.and_then(|i| items.get(i).cloned().flatten()))
                .collect()
        }
        match self {
            VectorData::Logical(v) => VectorData::Logical(pick(v, indices)),
            VectorData::Integer(v) => VectorData::Integer(pick(v, indices)),
            VectorData::Double(v) => VectorData::Double(pick(v, indices)),
            VectorData::Character(v) => VectorData::Character(pick(v, indices)),
            VectorData::List(v) => VectorData::List(
                indices
                    .iter()
                    .map(|i| i.and_then(|i| v.get(i).cloned()).unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }

    /// Empty payload of rank `rank`
    pub fn empty(rank: u8) -> VectorData {
        match rank {
            0 => VectorData::Logical(Vec::new()),
            1 => VectorData::Integer(Vec::new()),
            2 => VectorData::Double(Vec::new()),
            3 => VectorData::Character(Vec::new()),
            _ => VectorData::List(Vec::new()),
        }
    }

    /// Single-`NA` payload of the same type; a list gets one `NULL`
    pub fn with_na(self) -> VectorData {
        match self {
            VectorData::Logical(_) => VectorData::Logical(vec![None]),
            VectorData::Integer(_) => VectorData::Integer(vec![None]),
            VectorData::Double(_) => VectorData::Double(vec![None]),
            VectorData::Character(_) => VectorData::Character(vec![None]),
            VectorData::List(_) => VectorData::List(vec![Value::Null]),
        }
    }

    /// Rebuild a payload of rank `rank` from standalone element values
    pub fn from_values(items: &[Value], rank: u8) -> VectorData {
        if rank >= 4 {
            return VectorData::List(items.to_vec());
        }
        let mut data = VectorData::empty(rank);
        for item in items {
            match item {
                Value::Vector(v) if !v.is_empty() => data.extend(v.data.select(&[Some(0)]).coerce(rank)),
                _ => data.extend(VectorData::empty(rank).with_na()),
            }
        }
        data
    }

    /// Append all elements of `other`, which must have the same rank
    pub fn extend(&mut self, other: VectorData) {
        match (self, other) {
            (VectorData::Logical(a), VectorData::Logical(b)) => a.extend(b),
            (VectorData::Integer(a), VectorData::Integer(b)) => a.extend(b),
            (VectorData::Double(a), VectorData::Double(b)) => a.extend(b),
            (VectorData::Character(a), VectorData::Character(b)) => a.extend(b),
            (VectorData::List(a), VectorData::List(b)) => a.extend(b),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_class_is_implicit_without_attribute() {
        assert_eq!(Value::num(1.0).dispatch_class(), vec!["double", "numeric"]);
        assert_eq!(Value::int(1).dispatch_class(), vec!["integer", "numeric"]);
        assert_eq!(Value::Null.dispatch_class(), vec!["NULL"]);
        assert_eq!(Value::num(1.0).class_of(), vec!["numeric"]);
    }

    #[test]
    fn test_class_attribute_wins() {
        let v = Value::num(1.0)
            .with_attr("class", Some(Value::strings(["foo", "bar"])))
            .unwrap();
        assert_eq!(v.dispatch_class(), vec!["foo", "bar"]);
        assert!(v.is_object());
        let plain = v.with_attr("class", None).unwrap();
        assert!(!plain.is_object());
    }

    #[test]
    fn test_identical_treats_nan_as_equal() {
        assert_eq!(Value::num(f64::NAN), Value::num(f64::NAN));
        assert_ne!(Value::num(1.0), Value::int(1));
        assert_eq!(Value::strings(["a", "b"]), Value::strings(["a", "b"]));
    }

    #[test]
    fn test_deep_copy_is_a_fresh_allocation() {
        let v = Value::num(3.0);
        let copy = v.deep_copy();
        match (&v, &copy) {
            (Value::Vector(a), Value::Vector(b)) => assert!(!Rc::ptr_eq(a, b)),
            _ => unreachable!(),
        }
        assert_eq!(v, copy);
    }

    #[test]
    fn test_coercion() {
        let data = VectorData::Logical(vec![Some(true), None]);
        assert_eq!(data.to_doubles().unwrap(), vec![Some(1.0), None]);
        assert_eq!(
            VectorData::Double(vec![Some(0.5)]).to_strings(),
            vec![Some("0.5".to_string())]
        );
        assert!(VectorData::Character(vec![]).to_doubles().is_none());
    }

    #[test]
    fn test_list_names() {
        let list = Value::list(
            vec![Value::num(1.0), Value::num(2.0)],
            Some(vec![Some("a".to_string()), None]),
        );
        let vector = list.as_vector().unwrap();
        assert_eq!(vector.position_of("a"), Some(0));
        assert_eq!(vector.names().unwrap()[1], None);
    }
}
