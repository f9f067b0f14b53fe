//! rcore library
//!
//! Variable resolution and call dispatch core of an R interpreter.

pub mod ast;
pub mod config;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;

pub use ast::Span;
pub use config::Config;
pub use error::{Error, Result};
