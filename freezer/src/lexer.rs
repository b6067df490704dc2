// Lexer for input override text.
//
// Tokenizes `name[shape]{type}->value` lists. Uses the `logos` crate for
// DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::ast::Span;

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Override text tokens.
///
/// Literals carry parsed values. Identifiers carry no value; use the span
/// to retrieve the text from the source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // ── Symbols ──
    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token(",")]
    Comma,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    // ── Boolean literals ──
    #[token("True")]
    #[token("true")]
    True,
    #[token("False")]
    #[token("false")]
    False,

    // ── Numeric literals ──
    //
    // A float needs a fractional part or an exponent; the longer match wins
    // over `Int` for `1.0`.
    #[regex(r"-?[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", parse_float)]
    Float(f64),

    #[regex(r"-?[0-9]+", parse_int)]
    Int(i64),

    // ── Identifier ──
    //
    // Graph node names may contain scope separators (`block/add`) and dots.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_./]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Arrow => write!(f, "->"),
            Token::Colon => write!(f, ":"),
            Token::Question => write!(f, "?"),
            Token::Comma => write!(f, ","),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::True => write!(f, "True"),
            Token::False => write!(f, "False"),
            Token::Float(v) => write!(f, "{v:?}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident => write!(f, "<name>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex an override string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span: Span = (range.start..range.end).into();
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected input {:?}", &source[range]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn full_entry() {
        let tokens = lex_ok("in1[1 4]{f32}->[1.0 2.0]");
        assert_eq!(
            tokens,
            vec![
                Token::Ident,
                Token::LBracket,
                Token::Int(1),
                Token::Int(4),
                Token::RBracket,
                Token::LBrace,
                Token::Ident,
                Token::RBrace,
                Token::Arrow,
                Token::LBracket,
                Token::Float(1.0),
                Token::Float(2.0),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn output_suffix() {
        assert_eq!(
            lex_ok("add:0"),
            vec![Token::Ident, Token::Colon, Token::Int(0)]
        );
    }

    #[test]
    fn arrow_then_negative_number() {
        assert_eq!(
            lex_ok("x->-1"),
            vec![Token::Ident, Token::Arrow, Token::Int(-1)]
        );
    }

    #[test]
    fn booleans_vs_ident() {
        assert_eq!(
            lex_ok("True false Trueish"),
            vec![Token::True, Token::False, Token::Ident]
        );
    }

    #[test]
    fn scoped_names() {
        let source = "block_1/conv.weight";
        let result = lex(source);
        assert!(result.errors.is_empty());
        assert_eq!(result.tokens.len(), 1);
        let (_, span) = &result.tokens[0];
        assert_eq!(&source[span.start..span.end], source);
    }

    #[test]
    fn exponent_float() {
        assert_eq!(lex_ok("1e3 2.5E-1"), vec![Token::Float(1000.0), Token::Float(0.25)]);
    }

    #[test]
    fn bad_character_is_reported() {
        let result = lex("in1;in2");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span.start, 3);
        assert_eq!(result.tokens.len(), 2);
    }
}
