//! Supplied and formal argument lists

use super::error::{InterpResult, RuntimeError};
use super::value::Value;
use crate::ast::{ExprRef, Formal};

/// Name of the varargs formal
pub const DOTS: &str = "...";

/// Ordered argument names; `None` is an unnamed position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArgumentsSignature {
    names: Vec<Option<String>>,
}

impl ArgumentsSignature {
    pub fn new(names: Vec<Option<String>>) -> Self {
        ArgumentsSignature { names }
    }

    /// Signature of `len` unnamed arguments
    pub fn unnamed(len: usize) -> Self {
        ArgumentsSignature {
            names: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, i: usize) -> Option<&str> {
        self.names.get(i)?.as_deref()
    }

    pub fn names(&self) -> &[Option<String>] {
        &self.names
    }
}

/// Supplied arguments: a signature paired one-to-one with values
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    signature: ArgumentsSignature,
    values: Vec<Value>,
}

impl Arguments {
    pub fn new(signature: ArgumentsSignature, values: Vec<Value>) -> InterpResult<Self> {
        if signature.len() != values.len() {
            return Err(RuntimeError::internal(format!(
                "argument signature has {} names for {} values",
                signature.len(),
                values.len()
            )));
        }
        Ok(Arguments { signature, values })
    }

    /// Unnamed arguments
    pub fn positional(values: Vec<Value>) -> Self {
        Arguments {
            signature: ArgumentsSignature::unnamed(values.len()),
            values,
        }
    }

    /// Builds from `(name, value)` pairs, which can never disagree in length
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Option<String>, Value)>) -> Self {
        let (names, values) = pairs.into_iter().unzip();
        Arguments {
            signature: ArgumentsSignature::new(names),
            values,
        }
    }

    pub fn signature(&self) -> &ArgumentsSignature {
        &self.signature
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn name(&self, i: usize) -> Option<&str> {
        self.signature.name(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &Value)> {
        self.signature
            .names
            .iter()
            .map(Option::as_deref)
            .zip(self.values.iter())
    }

    /// Replace every vararg bundle by its elements, in place and in order.
    /// Empty bundles contribute nothing.
    pub fn flatten(&self) -> Arguments {
        if !self.values.iter().any(|v| matches!(v, Value::VarArgs(_))) {
            return self.clone();
        }
        let mut names = Vec::with_capacity(self.values.len());
        let mut values = Vec::with_capacity(self.values.len());
        for (name, value) in self.signature.names.iter().zip(&self.values) {
            match value {
                Value::VarArgs(bundle) => {
                    names.extend(bundle.signature.names.iter().cloned());
                    values.extend(bundle.values.iter().cloned());
                }
                other => {
                    names.push(name.clone());
                    values.push(other.clone());
                }
            }
        }
        Arguments {
            signature: ArgumentsSignature::new(names),
            values,
        }
    }

    /// Same names, values mapped through `f`
    pub fn try_map(&self, mut f: impl FnMut(&Value) -> InterpResult<Value>) -> InterpResult<Arguments> {
        let values = self.values.iter().map(&mut f).collect::<InterpResult<Vec<_>>>()?;
        Ok(Arguments {
            signature: self.signature.clone(),
            values,
        })
    }
}

/// Formal parameter list of a function
#[derive(Debug)]
pub struct FormalArguments {
    names: Vec<String>,
    defaults: Vec<Option<ExprRef>>,
    dots: Option<usize>,
}

impl FormalArguments {
    pub fn new(names: Vec<String>, defaults: Vec<Option<ExprRef>>) -> InterpResult<Self> {
        if names.len() != defaults.len() {
            return Err(RuntimeError::internal("formal names and defaults differ in length"));
        }
        let mut dots = None;
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(RuntimeError::invalid_argument(format!(
                    "repeated formal argument '{name}'"
                )));
            }
            if name == DOTS {
                dots = Some(i);
            }
        }
        Ok(FormalArguments {
            names,
            defaults,
            dots,
        })
    }

    pub fn from_ast(formals: &[Formal]) -> InterpResult<Self> {
        Self::new(
            formals.iter().map(|f| f.name.clone()).collect(),
            formals.iter().map(|f| f.default.clone()).collect(),
        )
    }

    /// Formals without defaults, as declared by builtins
    pub fn builtin(names: &[&str]) -> Self {
        debug_assert!(names.iter().filter(|n| **n == DOTS).count() <= 1);
        FormalArguments {
            names: names.iter().map(|n| n.to_string()).collect(),
            defaults: vec![None; names.len()],
            dots: names.iter().position(|n| *n == DOTS),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    pub fn default(&self, i: usize) -> Option<&ExprRef> {
        self.defaults[i].as_ref()
    }

    /// Position of `...`
    pub fn dots(&self) -> Option<usize> {
        self.dots
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(pairs: Vec<(Option<&str>, f64)>) -> Value {
        Value::VarArgs(std::rc::Rc::new(Arguments::from_pairs(
            pairs
                .into_iter()
                .map(|(n, v)| (n.map(str::to_string), Value::num(v))),
        )))
    }

    #[test]
    fn test_length_mismatch_is_internal_error() {
        let err = Arguments::new(ArgumentsSignature::unnamed(2), vec![Value::Null]).unwrap_err();
        assert_eq!(err.kind, super::super::error::ErrorKind::Internal);
    }

    #[test]
    fn test_flatten_preserves_order_and_names() {
        let args = Arguments::from_pairs(vec![
            (None, Value::num(0.0)),
            (None, bundle(vec![(Some("x"), 1.0), (None, 2.0)])),
            (Some("a".to_string()), Value::num(3.0)),
        ]);
        let flat = args.flatten();
        assert_eq!(flat.len(), 4);
        assert_eq!(
            flat.signature().names(),
            &[None, Some("x".to_string()), None, Some("a".to_string())]
        );
        assert_eq!(flat.values()[2], Value::num(2.0));
    }

    #[test]
    fn test_empty_bundle_vanishes() {
        let args = Arguments::from_pairs(vec![(None, bundle(vec![])), (None, Value::num(1.0))]);
        let flat = args.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat.values()[0], Value::num(1.0));
    }

    #[test]
    fn test_formals_reject_repeated_names() {
        let names = vec!["...".to_string(), "...".to_string()];
        assert!(FormalArguments::new(names, vec![None, None]).is_err());
        let ok = FormalArguments::new(vec!["a".to_string(), "...".to_string()], vec![None, None]).unwrap();
        assert_eq!(ok.dots(), Some(1));
    }
}
