//! Token definitions

use logos::{Lexer, Logos};

fn unescape(lex: &mut Lexer<Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            other => out.push(other),
        }
    }
    Some(out)
}

fn integer(lex: &mut Lexer<Token>) -> Option<i64> {
    let slice = lex.slice();
    slice[..slice.len() - 1].parse().ok()
}

fn backquoted(lex: &mut Lexer<Token>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_string()
}

/// R source token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // Keywords
    #[token("function")]
    Function,
    #[token("\\")]
    Lambda,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("while")]
    While,
    #[token("repeat")]
    Repeat,
    #[token("break")]
    Break,
    #[token("next")]
    Next,
    #[token("TRUE")]
    True,
    #[token("FALSE")]
    False,
    #[token("NULL")]
    Null,
    #[token("NA")]
    Na,
    #[token("Inf")]
    Inf,
    #[token("NaN")]
    NaN,

    // Literals
    #[regex(r"[0-9]+L", integer)]
    IntLit(i64),
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    NumLit(f64),
    #[regex(r#""([^"\\]|\\.)*""#, unescape)]
    #[regex(r"'([^'\\]|\\.)*'", unescape)]
    StringLit(String),

    // Identifiers, including `...`, `..1` and backquoted names
    #[regex(r"[A-Za-z][A-Za-z0-9._]*", |lex| lex.slice().to_string())]
    #[regex(r"\.([A-Za-z._][A-Za-z0-9._]*)?", |lex| lex.slice().to_string())]
    #[regex(r"`[^`]+`", backquoted)]
    Ident(String),

    // Assignment
    #[token("<-")]
    LeftAssign,
    #[token("<<-")]
    SuperAssign,
    #[token("=")]
    Eq,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[regex(r"%[^%\n]*%", |lex| lex.slice().to_string())]
    SpecialOp(String),
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("!")]
    Bang,
    #[token("&")]
    Amp,
    #[token("&&")]
    AmpAmp,
    #[token("|")]
    Pipe,
    #[token("||")]
    PipePipe,
    #[token(":")]
    Colon,
    #[token("$")]
    Dollar,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[[")]
    LDoubleBracket,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("\n")]
    Newline,
}

impl Token {
    /// Name of the function a binary operator token calls
    pub fn binary_op_name(&self) -> Option<String> {
        let name = match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Caret => "^",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::LtEq => "<=",
            Token::GtEq => ">=",
            Token::Amp => "&",
            Token::AmpAmp => "&&",
            Token::Pipe => "|",
            Token::PipePipe => "||",
            Token::Colon => ":",
            Token::SpecialOp(op) => return Some(op.clone()),
            _ => return None,
        };
        Some(name.to_string())
    }
}
