//! Runtime errors for the interpreter

use super::env::EnvRef;
use super::value::Value;
use thiserror::Error;

/// Runtime error during interpretation
#[derive(Debug, Clone, Error)]
#[error("Error: {message}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Kinds of runtime errors
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// `object 'x' not found`
    UnknownVariable,
    /// `could not find function "f"`
    UnknownFunction,
    /// A binding selected for a call turned out not to be a function
    NotAFunction,
    /// A formal without default was read while missing
    ArgumentMissingRequired,
    /// A supplied name is a prefix of more than one formal
    AmbiguousPartialMatch,
    /// Two supplied arguments matched the same formal
    FormalMatchedMultiple,
    /// Unnamed arguments left over without a `...` sink
    TooManyUnnamedArguments,
    /// Named arguments left over without a `...` sink
    UnusedArgument,
    /// S3 dispatch found neither a method nor a default
    NoApplicableMethod,
    /// Write to a locked binding
    LockedBindingWrite,
    /// New binding in a locked environment
    LockedEnvironment,
    /// Lookup of the empty identifier
    ZeroLengthIdentifier,
    /// `..N` past the end of `...`
    DotsBounds,
    /// `..N` or `...` used where no `...` is in scope
    NoDots,
    /// Bad argument to a builtin
    InvalidArgument,
    /// Operation applied to a value of the wrong type
    TypeError,
    /// Raised by `stop()`
    UserError,
    /// Evaluation nested past the configured depth
    ExpressionNesting,
    /// Evaluation aborted through an interrupt handle
    Interrupted,
    /// Implementation bug
    Internal,
    /// Control flow: leave the innermost loop
    Break,
    /// Control flow: next iteration of the innermost loop
    Next,
    /// Control flow: return `value` from the call whose environment is `target`
    Return { value: Box<Value>, target: EnvRef },
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        // Control flow payloads are not compared
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_variable(name: &str) -> Self {
        Self::new(ErrorKind::UnknownVariable, format!("object '{name}' not found"))
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownFunction,
            format!("could not find function \"{name}\""),
        )
    }

    pub fn not_a_function(name: &str) -> Self {
        Self::new(
            ErrorKind::NotAFunction,
            format!("attempt to apply non-function '{name}'"),
        )
    }

    pub fn argument_missing(name: &str) -> Self {
        Self::new(
            ErrorKind::ArgumentMissingRequired,
            format!("argument \"{name}\" is missing, with no default"),
        )
    }

    /// `position` is 1-based
    pub fn ambiguous_partial_match(position: usize) -> Self {
        Self::new(
            ErrorKind::AmbiguousPartialMatch,
            format!("argument {position} matches multiple formal arguments"),
        )
    }

    pub fn formal_matched_multiple(formal: &str) -> Self {
        Self::new(
            ErrorKind::FormalMatchedMultiple,
            format!("formal argument \"{formal}\" matched by multiple actual arguments"),
        )
    }

    /// `unused` are the descriptions of every leftover argument
    pub fn unused_arguments(unused: &[String], any_unnamed: bool) -> Self {
        let kind = if any_unnamed {
            ErrorKind::TooManyUnnamedArguments
        } else {
            ErrorKind::UnusedArgument
        };
        let noun = if unused.len() == 1 { "argument" } else { "arguments" };
        Self::new(kind, format!("unused {noun} ({})", unused.join(", ")))
    }

    pub fn no_applicable_method(generic: &str, classes: &[String]) -> Self {
        let class = match classes {
            [single] => single.clone(),
            many => {
                let quoted: Vec<String> = many.iter().map(|c| format!("'{c}'")).collect();
                format!("c({})", quoted.join(", "))
            }
        };
        Self::new(
            ErrorKind::NoApplicableMethod,
            format!("no applicable method for '{generic}' applied to an object of class \"{class}\""),
        )
    }

    pub fn locked_binding(name: &str) -> Self {
        Self::new(
            ErrorKind::LockedBindingWrite,
            format!("cannot change value of locked binding for '{name}'"),
        )
    }

    pub fn locked_environment() -> Self {
        Self::new(
            ErrorKind::LockedEnvironment,
            "cannot add bindings to a locked environment",
        )
    }

    pub fn zero_length_identifier() -> Self {
        Self::new(
            ErrorKind::ZeroLengthIdentifier,
            "attempt to use zero-length variable name",
        )
    }

    pub fn dots_bounds(index: usize) -> Self {
        Self::new(
            ErrorKind::DotsBounds,
            format!("the ... list does not contain {index} elements"),
        )
    }

    pub fn no_dots(name: &str) -> Self {
        let message = if name == "..." {
            "'...' used in an incorrect context".to_string()
        } else {
            format!("{name} used in an incorrect context, no ... to look in")
        };
        Self::new(ErrorKind::NoDots, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserError, message)
    }

    pub fn expression_nesting() -> Self {
        Self::new(
            ErrorKind::ExpressionNesting,
            "evaluation nested too deeply: infinite recursion / options(expressions=)?",
        )
    }

    pub fn interrupted() -> Self {
        Self::new(ErrorKind::Interrupted, "interrupted")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, format!("internal error: {}", message.into()))
    }

    pub fn break_signal() -> Self {
        Self::new(ErrorKind::Break, "no loop for break/next, jumping to top level")
    }

    pub fn next_signal() -> Self {
        Self::new(ErrorKind::Next, "no loop for break/next, jumping to top level")
    }

    pub fn return_signal(value: Value, target: EnvRef) -> Self {
        Self::new(
            ErrorKind::Return {
                value: Box::new(value),
                target,
            },
            "no function to return from, jumping to top level",
        )
    }

    /// True for `break`, `next` and `return` transfers
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Break | ErrorKind::Next | ErrorKind::Return { .. }
        )
    }
}

/// Result type for interpreter operations
pub type InterpResult<T> = Result<T, RuntimeError>;
