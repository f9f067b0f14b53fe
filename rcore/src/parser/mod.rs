//! Precedence-climbing parser for the supported R subset
//!
//! Operators become ordinary calls (`a + b` is `` `+`(a, b) ``) so that
//! redefinition and group-generic dispatch go through the call machinery.

use crate::ast::{Arg, Constant, Expr, Formal, Program, SiteId, Span, Spanned};
use crate::error::{Error, Result};
use crate::lexer::Token;
use std::rc::Rc;


/// Binding power of postfix operators: calls, indexing and `$`
const POSTFIX_BP: u8 = 25;
/// Right binding power of unary minus/plus
const UNARY_BP: u8 = 20;
/// Right binding power of `!`
const NOT_BP: u8 = 9;

/// Parse tokens into AST
pub fn parse(_filename: &str, source: &str, tokens: Vec<(Token, Span)>) -> Result<Program> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        newline_sensitive: vec![true],
        eof: Span::new(source.len(), source.len()),
    };
    parser.program()
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    /// Whether newlines terminate expressions in the current nesting context
    newline_sensitive: Vec<bool>,
    eof: Span,
}

fn infix_binding_power(token: &Token) -> Option<(u8, u8)> {
    let bp = match token {
        Token::Eq => (2, 1),
        Token::LeftAssign | Token::SuperAssign => (4, 3),
        Token::Pipe | Token::PipePipe => (5, 6),
        Token::Amp | Token::AmpAmp => (7, 8),
        Token::EqEq | Token::NotEq | Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => (10, 11),
        Token::Plus | Token::Minus => (12, 13),
        Token::Star | Token::Slash => (14, 15),
        Token::SpecialOp(_) => (16, 17),
        Token::Colon => (18, 19),
        Token::Caret => (23, 22),
        _ => return None,
    };
    Some(bp)
}

fn ident(name: impl Into<String>, span: Span) -> Spanned<Expr> {
    Spanned::new(
        Expr::Ident {
            name: name.into(),
            site: SiteId::fresh(),
        },
        span,
    )
}

fn call(func: Spanned<Expr>, args: Vec<Arg>, span: Span) -> Spanned<Expr> {
    Spanned::new(
        Expr::Call {
            func: Box::new(func),
            args,
            site: SiteId::fresh(),
        },
        span,
    )
}

fn positional(expr: Spanned<Expr>) -> Arg {
    Arg {
        name: None,
        value: Some(Rc::new(expr)),
    }
}

impl Parser {
    fn skips_newlines(&self) -> bool {
        !self.newline_sensitive.last().copied().unwrap_or(true)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.tokens.get(self.pos), Some((Token::Newline, _))) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        if self.skips_newlines() {
            self.skip_newlines();
        }
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&mut self) -> Span {
        if self.skips_newlines() {
            self.skip_newlines();
        }
        self.tokens.get(self.pos).map(|(_, s)| *s).unwrap_or(self.eof)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<(Token, Span)> {
        if self.skips_newlines() {
            self.skip_newlines();
        }
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<Span> {
        match self.advance() {
            Some((tok, span)) if tok == expected => Ok(span),
            Some((tok, span)) => Err(Error::parser(format!("expected {what}, found {tok:?}"), span)),
            None => Err(Error::parser(format!("expected {what}, found end of input"), self.eof)),
        }
    }

    fn with_context<T>(&mut self, sensitive: bool, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.newline_sensitive.push(sensitive);
        let result = f(self);
        self.newline_sensitive.pop();
        result
    }

    fn program(&mut self) -> Result<Program> {
        let mut exprs = Vec::new();
        loop {
            while matches!(self.peek(), Some(Token::Newline | Token::Semi)) {
                self.pos += 1;
            }
            if self.peek().is_none() {
                break;
            }
            exprs.push(self.expr(0)?);
            match self.peek() {
                None | Some(Token::Newline | Token::Semi) => {}
                Some(tok) => {
                    let tok = tok.clone();
                    let span = self.peek_span();
                    return Err(Error::parser(format!("unexpected {tok:?}"), span));
                }
            }
        }
        Ok(Program { exprs })
    }

    fn expr(&mut self, min_bp: u8) -> Result<Spanned<Expr>> {
        let mut lhs = self.prefix()?;

        loop {
            let Some(tok) = self.peek().cloned() else {
                break;
            };

            if matches!(tok, Token::LParen | Token::LBracket | Token::LDoubleBracket | Token::Dollar) {
                if POSTFIX_BP < min_bp {
                    break;
                }
                lhs = self.postfix(lhs, tok)?;
                continue;
            }

            let Some((l_bp, r_bp)) = infix_binding_power(&tok) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            let op_span = self.peek_span();
            self.advance();
            self.skip_newlines();
            let rhs = self.expr(r_bp)?;
            let span = lhs.span.merge(rhs.span);

            lhs = match tok {
                Token::LeftAssign | Token::Eq | Token::SuperAssign => {
                    let target = self.assignment_target(lhs)?;
                    Spanned::new(
                        Expr::Assign {
                            target: Box::new(target),
                            value: Box::new(rhs),
                            superassign: tok == Token::SuperAssign,
                        },
                        span,
                    )
                }
                _ => {
                    let Some(name) = tok.binary_op_name() else {
                        return Err(Error::parser(format!("unexpected {tok:?}"), op_span));
                    };
                    call(ident(name, op_span), vec![positional(lhs), positional(rhs)], span)
                }
            };
        }

        Ok(lhs)
    }

    fn assignment_target(&self, target: Spanned<Expr>) -> Result<Spanned<Expr>> {
        match &target.node {
            Expr::Ident { .. } | Expr::Call { .. } => Ok(target),
            Expr::Const(Constant::Str(name)) => Ok(ident(name.clone(), target.span)),
            _ => Err(Error::parser("invalid assignment target", target.span)),
        }
    }

    fn prefix(&mut self) -> Result<Spanned<Expr>> {
        let Some((tok, span)) = self.advance() else {
            return Err(Error::parser("unexpected end of input", self.eof));
        };

        let constant = |c: Constant| -> Result<Spanned<Expr>> { Ok(Spanned::new(Expr::Const(c), span)) };
        match tok {
            Token::NumLit(x) => constant(Constant::Double(x)),
            Token::IntLit(n) => constant(Constant::Integer(Some(n))),
            Token::StringLit(s) => constant(Constant::Str(s)),
            Token::True => constant(Constant::Logical(Some(true))),
            Token::False => constant(Constant::Logical(Some(false))),
            Token::Null => constant(Constant::Null),
            Token::Na => constant(Constant::Logical(None)),
            Token::Inf => constant(Constant::Double(f64::INFINITY)),
            Token::NaN => constant(Constant::Double(f64::NAN)),
            Token::Ident(name) => Ok(ident(name, span)),
            Token::Break => Ok(Spanned::new(Expr::Break, span)),
            Token::Next => Ok(Spanned::new(Expr::Next, span)),

            Token::Minus | Token::Plus | Token::Bang => {
                let bp = if tok == Token::Bang { NOT_BP } else { UNARY_BP };
                let operand = self.expr(bp)?;
                let name = match tok {
                    Token::Minus => "-",
                    Token::Plus => "+",
                    _ => "!",
                };
                let full = span.merge(operand.span);
                Ok(call(ident(name, span), vec![positional(operand)], full))
            }

            Token::LParen => {
                let (inner, end) = self.with_context(false, |p| {
                    let inner = p.expr(0)?;
                    let end = p.expect(Token::RParen, "')'")?;
                    Ok((inner, end))
                })?;
                Ok(Spanned::new(Expr::Paren(Box::new(inner)), span.merge(end)))
            }

            Token::LBrace => self.block(span),
            Token::Function | Token::Lambda => self.function(span),
            Token::If => self.if_expr(span),

            Token::For => {
                self.expect(Token::LParen, "'(' after for")?;
                let (var, seq) = self.with_context(false, |p| {
                    let var = match p.advance() {
                        Some((Token::Ident(name), _)) => name,
                        Some((tok, span)) => {
                            return Err(Error::parser(format!("expected loop variable, found {tok:?}"), span));
                        }
                        None => return Err(Error::parser("expected loop variable", p.eof)),
                    };
                    p.expect(Token::In, "'in'")?;
                    let seq = p.expr(0)?;
                    p.expect(Token::RParen, "')'")?;
                    Ok((var, seq))
                })?;
                self.skip_newlines();
                let body = self.expr(0)?;
                let full = span.merge(body.span);
                Ok(Spanned::new(
                    Expr::For {
                        var,
                        seq: Box::new(seq),
                        body: Box::new(body),
                    },
                    full,
                ))
            }

            Token::While => {
                let cond = self.condition()?;
                self.skip_newlines();
                let body = self.expr(0)?;
                let full = span.merge(body.span);
                Ok(Spanned::new(
                    Expr::While {
                        cond: Box::new(cond),
                        body: Box::new(body),
                    },
                    full,
                ))
            }

            Token::Repeat => {
                self.skip_newlines();
                let body = self.expr(0)?;
                let full = span.merge(body.span);
                Ok(Spanned::new(Expr::Repeat { body: Box::new(body) }, full))
            }

            other => Err(Error::parser(format!("unexpected {other:?}"), span)),
        }
    }

    fn condition(&mut self) -> Result<Spanned<Expr>> {
        self.expect(Token::LParen, "'('")?;
        self.with_context(false, |p| {
            let cond = p.expr(0)?;
            p.expect(Token::RParen, "')'")?;
            Ok(cond)
        })
    }

    fn if_expr(&mut self, start: Span) -> Result<Spanned<Expr>> {
        let cond = self.condition()?;
        self.skip_newlines();
        let then_branch = self.expr(0)?;
        let mut span = start.merge(then_branch.span);

        // Inside braces an `else` may follow on the next line.
        let save = self.pos;
        if self.newline_sensitive.len() > 1 {
            self.skip_newlines();
        }
        let else_branch = if matches!(self.peek(), Some(Token::Else)) {
            self.advance();
            self.skip_newlines();
            let e = self.expr(0)?;
            span = span.merge(e.span);
            Some(Box::new(e))
        } else {
            self.pos = save;
            None
        };

        Ok(Spanned::new(
            Expr::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            span,
        ))
    }

    fn block(&mut self, start: Span) -> Result<Spanned<Expr>> {
        let exprs = self.with_context(true, |p| {
            let mut exprs = Vec::new();
            loop {
                while matches!(p.peek(), Some(Token::Newline | Token::Semi)) {
                    p.pos += 1;
                }
                match p.peek() {
                    Some(Token::RBrace) => break,
                    None => return Err(Error::parser("unclosed '{'", start)),
                    _ => {}
                }
                exprs.push(p.expr(0)?);
                match p.peek() {
                    Some(Token::Newline | Token::Semi | Token::RBrace) => {}
                    Some(tok) => {
                        let tok = tok.clone();
                        let span = p.peek_span();
                        return Err(Error::parser(format!("unexpected {tok:?}"), span));
                    }
                    None => return Err(Error::parser("unclosed '{'", start)),
                }
            }
            Ok(exprs)
        })?;
        let end = self.expect(Token::RBrace, "'}'")?;
        Ok(Spanned::new(Expr::Block(exprs), start.merge(end)))
    }

    fn function(&mut self, start: Span) -> Result<Spanned<Expr>> {
        self.expect(Token::LParen, "'(' after function")?;
        let formals = self.with_context(false, |p| {
            let mut formals: Vec<Formal> = Vec::new();
            if matches!(p.peek(), Some(Token::RParen)) {
                p.advance();
                return Ok(formals);
            }
            loop {
                let name = match p.advance() {
                    Some((Token::Ident(name), _)) => name,
                    Some((tok, span)) => {
                        return Err(Error::parser(format!("expected parameter name, found {tok:?}"), span));
                    }
                    None => return Err(Error::parser("expected parameter name", p.eof)),
                };
                if formals.iter().any(|f| f.name == name) {
                    let span = p.peek_span();
                    return Err(Error::parser(format!("repeated formal argument '{name}'"), span));
                }
                let default = if matches!(p.peek(), Some(Token::Eq)) {
                    p.advance();
                    Some(Rc::new(p.expr(3)?))
                } else {
                    None
                };
                formals.push(Formal { name, default });
                match p.peek() {
                    Some(Token::Comma) => {
                        p.advance();
                    }
                    _ => break,
                }
            }
            p.expect(Token::RParen, "')'")?;
            Ok(formals)
        })?;
        self.skip_newlines();
        let body = self.expr(0)?;
        let span = start.merge(body.span);
        Ok(Spanned::new(
            Expr::Function {
                formals: Rc::new(formals),
                body: Rc::new(body),
            },
            span,
        ))
    }

    fn postfix(&mut self, target: Spanned<Expr>, tok: Token) -> Result<Spanned<Expr>> {
        let open = self.peek_span();
        self.advance();
        match tok {
            Token::LParen => {
                let (args, end) = self.with_context(false, |p| {
                    let args = p.arguments(Token::RParen)?;
                    let end = p.expect(Token::RParen, "')'")?;
                    Ok((args, end))
                })?;
                let span = target.span.merge(end);
                Ok(call(target, args, span))
            }
            Token::LBracket | Token::LDoubleBracket => {
                let double = tok == Token::LDoubleBracket;
                let mut args = vec![positional(target.clone())];
                let (rest, end) = self.with_context(false, |p| {
                    let rest = p.arguments(Token::RBracket)?;
                    let mut end = p.expect(Token::RBracket, "']'")?;
                    if double {
                        end = p.expect(Token::RBracket, "']]'")?;
                    }
                    Ok((rest, end))
                })?;
                args.extend(rest);
                let name = if double { "[[" } else { "[" };
                let span = target.span.merge(end);
                Ok(call(ident(name, open), args, span))
            }
            Token::Dollar => {
                let (field, end) = match self.advance() {
                    Some((Token::Ident(name) | Token::StringLit(name), span)) => (name, span),
                    Some((tok, span)) => {
                        return Err(Error::parser(format!("expected name after '$', found {tok:?}"), span));
                    }
                    None => return Err(Error::parser("expected name after '$'", self.eof)),
                };
                let field = Spanned::new(Expr::Const(Constant::Str(field)), end);
                let span = target.span.merge(end);
                Ok(call(ident("$", open), vec![positional(target), positional(field)], span))
            }
            _ => unreachable!("not a postfix operator"),
        }
    }

    fn arguments(&mut self, close: Token) -> Result<Vec<Arg>> {
        let mut args = Vec::new();
        if self.peek() == Some(&close) {
            return Ok(args);
        }
        loop {
            let name = match (self.peek().cloned(), self.peek_nth(1)) {
                (Some(Token::Ident(name) | Token::StringLit(name)), Some(Token::Eq)) => {
                    self.pos += 2;
                    Some(name)
                }
                _ => None,
            };
            let value = match self.peek() {
                Some(Token::Comma) => None,
                Some(tok) if *tok == close => None,
                _ => Some(Rc::new(self.expr(3)?)),
            };
            args.push(Arg { name, value });
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(args)
    }
}
