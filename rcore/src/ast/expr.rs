//! Expression AST nodes

use super::{SiteId, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Shared expression reference, held by promises and closures
pub type ExprRef = Rc<Spanned<Expr>>;

/// Literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    /// Logical scalar, `None` is `NA`
    Logical(Option<bool>),
    /// Integer scalar (`1L`), `None` is `NA_integer_`
    Integer(Option<i64>),
    /// Double scalar
    Double(f64),
    /// Character scalar
    Str(String),
}

/// Expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Literal constant
    Const(Constant),

    /// Bare identifier reference
    Ident { name: String, site: SiteId },

    /// Call: callee expression and (optionally named) arguments.
    /// Operators are calls too: `a + b` is `` `+`(a, b) ``.
    Call {
        func: Box<Spanned<Expr>>,
        args: Vec<Arg>,
        site: SiteId,
    },

    /// Function literal
    Function {
        formals: Rc<Vec<Formal>>,
        body: ExprRef,
    },

    /// Block: `{ e1; e2; ... }`
    Block(Vec<Spanned<Expr>>),

    /// Parenthesized expression, always visible
    Paren(Box<Spanned<Expr>>),

    /// Conditional
    If {
        cond: Box<Spanned<Expr>>,
        then_branch: Box<Spanned<Expr>>,
        else_branch: Option<Box<Spanned<Expr>>>,
    },

    /// `for (var in seq) body`
    For {
        var: String,
        seq: Box<Spanned<Expr>>,
        body: Box<Spanned<Expr>>,
    },

    /// `while (cond) body`
    While {
        cond: Box<Spanned<Expr>>,
        body: Box<Spanned<Expr>>,
    },

    /// `repeat body`
    Repeat { body: Box<Spanned<Expr>> },

    Break,
    Next,

    /// `target <- value`, `target = value` or `target <<- value` (`superassign`).
    /// A call target (`class(x) <- v`) is a replacement assignment.
    Assign {
        target: Box<Spanned<Expr>>,
        value: Box<Spanned<Expr>>,
        superassign: bool,
    },
}

/// Call argument; `value` is `None` for an empty argument (`f(1, , 3)`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Option<ExprRef>,
}

/// Formal parameter of a function literal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formal {
    pub name: String,
    pub default: Option<ExprRef>,
}

impl Expr {
    /// Identifier name, if this is a bare identifier
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Constant value, if this is a literal
    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Expr::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Expr::Call { .. })
    }
}

const BINARY_OPS: &[&str] = &[
    "+", "-", "*", "/", "^", "==", "!=", "<", ">", "<=", ">=", "&", "&&", "|", "||", ":", "$",
];

fn is_syntactic(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_syntactic(name) {
        write!(f, "{name}")
    } else {
        write!(f, "`{name}`")
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "NULL"),
            Constant::Logical(Some(true)) => write!(f, "TRUE"),
            Constant::Logical(Some(false)) => write!(f, "FALSE"),
            Constant::Logical(None) => write!(f, "NA"),
            Constant::Integer(Some(n)) => write!(f, "{n}L"),
            Constant::Integer(None) => write!(f, "NA_integer_"),
            Constant::Double(x) => write!(f, "{x}"),
            Constant::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write_name(f, name)?;
            write!(f, " = ")?;
        }
        match &self.value {
            Some(value) => write!(f, "{}", value.node),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Ident { name, .. } => write_name(f, name),
            Expr::Call { func, args, .. } => {
                let op = func.node.as_ident();
                match (op, args.as_slice()) {
                    (Some(op), [lhs, rhs])
                        if BINARY_OPS.contains(&op) || (op.starts_with('%') && op.ends_with('%')) =>
                    {
                        if op == "$" || op == ":" || op == "^" {
                            write!(f, "{lhs}{op}{rhs}")
                        } else {
                            write!(f, "{lhs} {op} {rhs}")
                        }
                    }
                    (Some(op @ ("-" | "+" | "!")), [operand]) => write!(f, "{op}{operand}"),
                    (Some("[["), [target, rest @ ..]) => {
                        write!(f, "{target}[[")?;
                        write_args(f, rest)?;
                        write!(f, "]]")
                    }
                    (Some("["), [target, rest @ ..]) => {
                        write!(f, "{target}[")?;
                        write_args(f, rest)?;
                        write!(f, "]")
                    }
                    _ => {
                        write!(f, "{}(", func.node)?;
                        write_args(f, args)?;
                        write!(f, ")")
                    }
                }
            }
            Expr::Function { formals, body } => {
                write!(f, "function(")?;
                for (i, formal) in formals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_name(f, &formal.name)?;
                    if let Some(default) = &formal.default {
                        write!(f, " = {}", default.node)?;
                    }
                }
                write!(f, ") {}", body.node)
            }
            Expr::Block(exprs) => {
                write!(f, "{{")?;
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    write!(f, " {}", e.node)?;
                }
                write!(f, " }}")
            }
            Expr::Paren(inner) => write!(f, "({})", inner.node),
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                write!(f, "if ({}) {}", cond.node, then_branch.node)?;
                if let Some(e) = else_branch {
                    write!(f, " else {}", e.node)?;
                }
                Ok(())
            }
            Expr::For { var, seq, body } => write!(f, "for ({var} in {}) {}", seq.node, body.node),
            Expr::While { cond, body } => write!(f, "while ({}) {}", cond.node, body.node),
            Expr::Repeat { body } => write!(f, "repeat {}", body.node),
            Expr::Break => write!(f, "break"),
            Expr::Next => write!(f, "next"),
            Expr::Assign {
                target,
                value,
                superassign,
            } => {
                let op = if *superassign { "<<-" } else { "<-" };
                write!(f, "{} {op} {}", target.node, value.node)
            }
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Arg]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}
