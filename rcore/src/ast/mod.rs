//! Abstract Syntax Tree definitions

mod expr;
mod span;

pub use expr::*;
pub use span::*;

use serde::{Deserialize, Serialize};

/// A program is a sequence of top-level expressions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub exprs: Vec<Spanned<Expr>>,
}
