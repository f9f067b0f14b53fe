//! Argument matching
//!
//! Supplied arguments are matched to formals in three passes: exact names,
//! partial (prefix) names against formals before `...`, then positions.
//! Whatever is left goes to `...`. Without a `...` formal, arguments whose
//! names match no formal take part in positional filling, and anything still
//! left over is an error.
//!
//! Matching is split in two. [`plan`] looks only at the flattened signature
//! and the formals, so its result can be cached per call site; [`apply`] maps
//! the values of one concrete call through a plan.

use super::args::{Arguments, ArgumentsSignature, FormalArguments};
use super::error::{InterpResult, RuntimeError};
use super::print::deparse_value;
use super::value::Value;
use crate::ast::ExprRef;
use std::rc::Rc;

/// Where the value of one formal comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSource {
    /// Supplied argument at this index of the flattened list
    Supplied(usize),
    /// Unmatched, the formal's default expression applies
    Default,
    /// Unmatched, no default
    Missing,
    /// The `...` formal collects these supplied indices
    VarArgs(Vec<usize>),
}

/// Per-formal sources for one signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    sources: Vec<ArgSource>,
}

impl MatchPlan {
    pub fn sources(&self) -> &[ArgSource] {
        &self.sources
    }
}

/// Value of one formal after matching
#[derive(Debug, Clone)]
pub enum MatchedArg {
    Value(Value),
    /// Default expression, to be evaluated lazily in the callee environment
    Default(ExprRef),
    Missing,
}

/// Matching result, one entry per formal
#[derive(Debug, Clone)]
pub struct MatchedArguments {
    names: Vec<String>,
    args: Vec<MatchedArg>,
    /// Supplied name of the argument that landed on each formal
    signature: ArgumentsSignature,
}

impl MatchedArguments {
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> &[MatchedArg] {
        &self.args
    }

    pub fn into_args(self) -> Vec<MatchedArg> {
        self.args
    }

    /// Formal names, positionally aligned with the values
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Names the values were supplied under, positionally aligned with the
    /// values; `None` for unnamed, defaulted, missing and `...` positions
    pub fn signature(&self) -> &ArgumentsSignature {
        &self.signature
    }

    pub fn get(&self, formal: &str) -> Option<&MatchedArg> {
        let i = self.names.iter().position(|n| n == formal)?;
        self.args.get(i)
    }
}

fn arg_name(signature: &ArgumentsSignature, i: usize) -> Option<&str> {
    signature.name(i).filter(|name| !name.is_empty())
}

/// Match a flattened signature against `formals`.
///
/// `describe(i)` renders supplied argument `i` for "unused argument" errors.
pub fn plan(
    signature: &ArgumentsSignature,
    formals: &FormalArguments,
    describe: &dyn Fn(usize) -> String,
) -> InterpResult<MatchPlan> {
    let formal_count = formals.len();
    let dots = formals.dots();
    // Partial matching and positional filling stop at `...`
    let before_dots = dots.unwrap_or(formal_count);

    let mut assigned: Vec<Option<usize>> = vec![None; formal_count];
    let mut exact = vec![false; formal_count];
    let mut used = vec![false; signature.len()];

    for i in 0..signature.len() {
        let Some(name) = arg_name(signature, i) else {
            continue;
        };
        if let Some(f) = formals.index_of(name)
            && Some(f) != dots
        {
            if assigned[f].is_some() {
                return Err(RuntimeError::formal_matched_multiple(name));
            }
            assigned[f] = Some(i);
            exact[f] = true;
            used[i] = true;
        }
    }

    for i in 0..signature.len() {
        if used[i] {
            continue;
        }
        let Some(name) = arg_name(signature, i) else {
            continue;
        };
        let candidates: Vec<usize> = (0..before_dots)
            .filter(|&f| !exact[f] && formals.name(f).starts_with(name))
            .collect();
        match candidates.as_slice() {
            [] => {}
            [f] => {
                if assigned[*f].is_some() {
                    return Err(RuntimeError::formal_matched_multiple(formals.name(*f)));
                }
                assigned[*f] = Some(i);
                used[i] = true;
            }
            _ => return Err(RuntimeError::ambiguous_partial_match(i + 1)),
        }
    }

    let mut next = 0;
    for i in 0..signature.len() {
        if used[i] || (dots.is_some() && arg_name(signature, i).is_some()) {
            continue;
        }
        while next < before_dots && assigned[next].is_some() {
            next += 1;
        }
        if next == before_dots {
            break;
        }
        assigned[next] = Some(i);
        used[i] = true;
        next += 1;
    }

    let leftovers: Vec<usize> = (0..signature.len()).filter(|&i| !used[i]).collect();
    if dots.is_none() && !leftovers.is_empty() {
        let any_unnamed = leftovers.iter().any(|&i| arg_name(signature, i).is_none());
        let described: Vec<String> = leftovers.iter().map(|&i| describe(i)).collect();
        return Err(RuntimeError::unused_arguments(&described, any_unnamed));
    }

    let mut leftovers = Some(leftovers);
    let sources = (0..formal_count)
        .map(|f| {
            if Some(f) == dots {
                return ArgSource::VarArgs(leftovers.take().unwrap_or_default());
            }
            match assigned[f] {
                Some(i) => ArgSource::Supplied(i),
                None if formals.default(f).is_some() => ArgSource::Default,
                None => ArgSource::Missing,
            }
        })
        .collect();
    Ok(MatchPlan { sources })
}

/// Map the values of `supplied` (already flattened) through `plan`
pub fn apply(plan: &MatchPlan, supplied: &Arguments, formals: &FormalArguments) -> MatchedArguments {
    let supplied_name = |source: &ArgSource| match source {
        ArgSource::Supplied(i) => supplied.name(*i).filter(|n| !n.is_empty()).map(str::to_string),
        _ => None,
    };
    let signature = ArgumentsSignature::new(plan.sources.iter().map(supplied_name).collect());
    let unmatched = |f: usize| match formals.default(f) {
        Some(expr) => MatchedArg::Default(Rc::clone(expr)),
        None => MatchedArg::Missing,
    };
    let args = plan
        .sources
        .iter()
        .enumerate()
        .map(|(f, source)| match source {
            // An empty supplied argument counts as not supplied
            ArgSource::Supplied(i) => match &supplied.values()[*i] {
                Value::Missing => unmatched(f),
                value => MatchedArg::Value(value.clone()),
            },
            ArgSource::Default | ArgSource::Missing => unmatched(f),
            ArgSource::VarArgs(indices) => {
                let bundle = Arguments::from_pairs(indices.iter().map(|&i| {
                    (
                        supplied.signature().names()[i].clone(),
                        supplied.values()[i].clone(),
                    )
                }));
                MatchedArg::Value(Value::VarArgs(Rc::new(bundle)))
            }
        })
        .collect();
    MatchedArguments {
        names: formals.names().to_vec(),
        args,
        signature,
    }
}

/// Render a supplied argument the way it was written
pub fn describe_argument(name: Option<&str>, value: &Value) -> String {
    let text = match value {
        Value::Promise(promise) => match promise.expr() {
            Some(expr) => expr.node.to_string(),
            None => deparse_value(&promise.value().unwrap_or(Value::Null)),
        },
        other => deparse_value(other),
    };
    match name.filter(|n| !n.is_empty()) {
        Some(name) => format!("{name} = {text}"),
        None => text,
    }
}

/// Flatten `supplied` and match it against `formals`
pub fn match_arguments(supplied: &Arguments, formals: &FormalArguments) -> InterpResult<MatchedArguments> {
    let flat = supplied.flatten();
    let describe = |i: usize| describe_argument(flat.name(i), &flat.values()[i]);
    let plan = plan(flat.signature(), formals, &describe)?;
    Ok(apply(&plan, &flat, formals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Constant, Expr, Span, Spanned};
    use crate::interp::error::ErrorKind;

    fn formals(names: &[&str]) -> FormalArguments {
        FormalArguments::builtin(names)
    }

    fn named(pairs: Vec<(Option<&str>, Value)>) -> Arguments {
        Arguments::from_pairs(pairs.into_iter().map(|(n, v)| (n.map(str::to_string), v)))
    }

    fn value_of(matched: &MatchedArguments, formal: &str) -> Value {
        match matched.get(formal) {
            Some(MatchedArg::Value(v)) => v.clone(),
            other => panic!("{formal} not matched to a value: {other:?}"),
        }
    }

    #[test]
    fn test_vararg_bundle_flattens_into_positions() {
        let bundle = Value::VarArgs(Rc::new(Arguments::positional(vec![
            Value::num(1.0),
            Value::num(2.0),
        ])));
        let supplied = named(vec![(Some(""), bundle), (Some("a"), Value::num(3.0))]);
        let matched = match_arguments(&supplied, &formals(&["p1", "p2", "p3"])).unwrap();
        assert_eq!(matched.len(), 3);
        assert_eq!(value_of(&matched, "p1"), Value::num(1.0));
        assert_eq!(value_of(&matched, "p2"), Value::num(2.0));
        assert_eq!(value_of(&matched, "p3"), Value::num(3.0));
        assert_eq!(
            matched.signature().names(),
            &[None, None, Some("a".to_string())]
        );
    }

    #[test]
    fn test_result_signature_carries_bundle_names() {
        let bundle = Value::VarArgs(Rc::new(named(vec![
            (Some("x"), Value::num(1.0)),
            (None, Value::num(2.0)),
        ])));
        let supplied = named(vec![(None, bundle), (Some("a"), Value::num(3.0))]);
        let matched = match_arguments(&supplied, &formals(&["p1", "p2", "p3"])).unwrap();
        assert_eq!(value_of(&matched, "p1"), Value::num(1.0));
        assert_eq!(value_of(&matched, "p2"), Value::num(2.0));
        assert_eq!(value_of(&matched, "p3"), Value::num(3.0));
        assert_eq!(
            matched.signature().names(),
            &[Some("x".to_string()), None, Some("a".to_string())]
        );
    }

    #[test]
    fn test_exact_names_win_over_positional_fill() {
        let bundle = Value::VarArgs(Rc::new(Arguments::positional(vec![Value::num(1.0)])));
        let supplied = named(vec![
            (Some("z"), Value::num(9.0)),
            (None, bundle),
            (Some("p1"), Value::num(0.0)),
        ]);
        let matched = match_arguments(&supplied, &formals(&["p1", "p2", "p3"])).unwrap();
        assert_eq!(value_of(&matched, "p1"), Value::num(0.0));
        assert_eq!(value_of(&matched, "p2"), Value::num(9.0));
        assert_eq!(value_of(&matched, "p3"), Value::num(1.0));
    }

    #[test]
    fn test_dots_collect_leftovers_with_names() {
        let bundle = Value::VarArgs(Rc::new(named(vec![
            (Some("x"), Value::num(1.0)),
            (None, Value::num(2.0)),
        ])));
        let supplied = named(vec![(None, bundle), (Some("a"), Value::num(3.0))]);
        let matched = match_arguments(&supplied, &formals(&["...", "a"])).unwrap();
        assert_eq!(value_of(&matched, "a"), Value::num(3.0));
        let Value::VarArgs(dots) = value_of(&matched, "...") else {
            panic!("expected a bundle");
        };
        assert_eq!(dots.signature().names(), &[Some("x".to_string()), None]);
        assert_eq!(dots.values()[1], Value::num(2.0));
    }

    #[test]
    fn test_ambiguous_partial_match() {
        let supplied = named(vec![(Some("al"), Value::num(5.0))]);
        let err = match_arguments(&supplied, &formals(&["alpha", "alter"])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AmbiguousPartialMatch);
        assert_eq!(err.message, "argument 1 matches multiple formal arguments");
    }

    #[test]
    fn test_unique_partial_match() {
        let supplied = named(vec![(None, Value::num(1.0)), (Some("al"), Value::num(5.0))]);
        let matched = match_arguments(&supplied, &formals(&["alpha", "beta"])).unwrap();
        assert_eq!(value_of(&matched, "alpha"), Value::num(5.0));
        assert_eq!(value_of(&matched, "beta"), Value::num(1.0));
    }

    #[test]
    fn test_no_partial_match_after_dots() {
        let supplied = named(vec![(Some("al"), Value::num(1.0))]);
        let matched = match_arguments(&supplied, &formals(&["...", "alpha"])).unwrap();
        assert!(matches!(matched.get("alpha"), Some(MatchedArg::Missing)));
        let Value::VarArgs(dots) = value_of(&matched, "...") else {
            panic!("expected a bundle");
        };
        assert_eq!(dots.len(), 1);
    }

    #[test]
    fn test_exact_match_after_dots() {
        let supplied = named(vec![(None, Value::num(1.0)), (Some("alpha"), Value::num(2.0))]);
        let matched = match_arguments(&supplied, &formals(&["...", "alpha"])).unwrap();
        assert_eq!(value_of(&matched, "alpha"), Value::num(2.0));
    }

    #[test]
    fn test_defaults_and_empty_arguments() {
        let default: ExprRef = Rc::new(Spanned::new(
            Expr::Const(Constant::Double(10.0)),
            Span::new(0, 2),
        ));
        let formals = FormalArguments::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![None, Some(default), None],
        )
        .unwrap();
        let supplied = Arguments::positional(vec![Value::num(1.0), Value::Missing]);
        let matched = match_arguments(&supplied, &formals).unwrap();
        assert_eq!(matched.len(), 3);
        assert!(matches!(matched.get("b"), Some(MatchedArg::Default(_))));
        assert!(matches!(matched.get("c"), Some(MatchedArg::Missing)));
    }

    #[test]
    fn test_too_many_unnamed_arguments() {
        let supplied = Arguments::positional(vec![Value::num(1.0), Value::num(2.0)]);
        let err = match_arguments(&supplied, &formals(&["a"])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooManyUnnamedArguments);
        assert_eq!(err.message, "unused argument (2)");
    }

    #[test]
    fn test_unused_named_argument() {
        let supplied = named(vec![(Some("a"), Value::num(1.0)), (Some("b"), Value::num(2.0))]);
        let err = match_arguments(&supplied, &formals(&["a"])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnusedArgument);
        assert_eq!(err.message, "unused argument (b = 2)");
    }

    #[test]
    fn test_formal_matched_twice() {
        let supplied = named(vec![(Some("a"), Value::num(1.0)), (Some("a"), Value::num(2.0))]);
        let err = match_arguments(&supplied, &formals(&["a", "b"])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FormalMatchedMultiple);
    }

    #[test]
    fn test_plan_depends_only_on_signature() {
        let formals = formals(&["x", "..."]);
        let signature = ArgumentsSignature::new(vec![None, Some("k".to_string()), None]);
        let plan_a = plan(&signature, &formals, &|i| i.to_string()).unwrap();
        let plan_b = plan(&signature, &formals, &|i| i.to_string()).unwrap();
        assert_eq!(plan_a, plan_b);
        assert_eq!(
            plan_a.sources(),
            &[ArgSource::Supplied(0), ArgSource::VarArgs(vec![1, 2])]
        );
    }
}
