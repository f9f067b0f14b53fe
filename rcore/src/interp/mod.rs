//! Tree-walking evaluator: environments, promises, variable resolution and
//! call dispatch

pub mod args;
pub mod builtins;
pub mod call;
pub mod env;
pub mod error;
pub mod eval;
pub mod matcher;
pub mod print;
pub mod promise;
pub mod resolve;
pub mod s3;
pub mod shape;
pub mod value;

pub use error::{ErrorKind, InterpResult, RuntimeError};
pub use eval::{InterruptHandle, Interpreter};
pub use value::Value;

#[cfg(test)]
pub(crate) mod testing {
    use crate::ast::ExprRef;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use std::rc::Rc;

    /// First expression of `source`
    pub fn parse_expr(source: &str) -> ExprRef {
        let tokens = tokenize(source).unwrap();
        let program = parse("<test>", source, tokens).unwrap();
        Rc::new(program.exprs.into_iter().next().unwrap())
    }
}
