//! Lexer implementation using logos

mod token;

pub use token::Token;

use crate::ast::Span;
use crate::error::{Error, Result};
use logos::Logos;

/// Tokenize source code
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::new(lexer.span().start, lexer.span().end);
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(_) => {
                return Err(Error::lexer(
                    format!("unexpected input: {:?}", lexer.slice()),
                    span,
                ));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_keywords() {
        assert_eq!(
            kinds("function if else TRUE FALSE NULL"),
            vec![Token::Function, Token::If, Token::Else, Token::True, Token::False, Token::Null]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(kinds("42L"), vec![Token::IntLit(42)]);
        assert_eq!(kinds("1.5"), vec![Token::NumLit(1.5)]);
        assert_eq!(kinds(".5"), vec![Token::NumLit(0.5)]);
        assert_eq!(kinds("1e3"), vec![Token::NumLit(1000.0)]);
    }

    #[test]
    fn test_tokenize_strings_with_escapes() {
        assert_eq!(kinds(r#""a\"b""#), vec![Token::StringLit("a\"b".to_string())]);
        assert_eq!(kinds(r"'x\ny'"), vec![Token::StringLit("x\ny".to_string())]);
    }

    #[test]
    fn test_tokenize_dotted_identifiers() {
        assert_eq!(
            kinds("print.default ... ..1 .Generic"),
            vec![
                Token::Ident("print.default".to_string()),
                Token::Ident("...".to_string()),
                Token::Ident("..1".to_string()),
                Token::Ident(".Generic".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_backquoted_identifier() {
        assert_eq!(kinds("`class<-`"), vec![Token::Ident("class<-".to_string())]);
    }

    #[test]
    fn test_tokenize_assignment_operators() {
        assert_eq!(
            kinds("x <- 1; y <<- 2; z = 3"),
            vec![
                Token::Ident("x".to_string()),
                Token::LeftAssign,
                Token::NumLit(1.0),
                Token::Semi,
                Token::Ident("y".to_string()),
                Token::SuperAssign,
                Token::NumLit(2.0),
                Token::Semi,
                Token::Ident("z".to_string()),
                Token::Eq,
                Token::NumLit(3.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_special_operators() {
        assert_eq!(
            kinds("a %% b %/% c"),
            vec![
                Token::Ident("a".to_string()),
                Token::SpecialOp("%%".to_string()),
                Token::Ident("b".to_string()),
                Token::SpecialOp("%/%".to_string()),
                Token::Ident("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_comments_and_newlines() {
        assert_eq!(
            kinds("x # comment\ny"),
            vec![Token::Ident("x".to_string()), Token::Newline, Token::Ident("y".to_string())]
        );
    }

    #[test]
    fn test_tokenize_error_has_span() {
        let err = tokenize("x ? y").unwrap_err();
        assert_eq!(err.span(), Some(Span::new(2, 3)));
    }
}
