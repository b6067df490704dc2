// Parser for input override text.
//
// Parses a token stream (from the lexer) into `OverrideSpec` records:
//
//   overrides := entry (',' entry)*
//   entry     := NAME (':' UINT)? (shape | type){0,2} ('->' value)?
//   shape     := '[' dim* ']'            dims separated by spaces or commas
//   type      := '{' NAME '}'
//   value     := '[' value* ']' | INT | FLOAT | True | False
//
// Uses chumsky combinators.
//
// Preconditions: none; the lexer is run internally.
// Postconditions: returns override records plus any parse errors.
// Failure modes: syntax errors produce `Rich` diagnostics; `parse_overrides`
//                converts the first one into a `FreezeError` of kind Syntax.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::error::{FreezeError, Result};
use crate::lexer::Token;
use crate::tensor::ElemType;

/// Result of parsing: override records plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub overrides: Option<Vec<OverrideSpec>>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse override text. Lexes then parses.
///
/// Blank text means "no overrides" and yields an empty list.
pub fn parse(source: &str) -> ParseResult {
    if source.trim().is_empty() {
        return ParseResult {
            overrides: Some(Vec::new()),
            errors: Vec::new(),
        };
    }

    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter();
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = overrides_parser(source);
    let (overrides, parse_errors) = parser.parse(stream).into_output_errors();

    // Lex errors come first: a bad character usually explains the parse error.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| Rich::custom(e.span, e.message))
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        overrides,
        errors: all_errors,
    }
}

/// Parse override text, failing on the first syntax error.
pub fn parse_overrides(source: &str) -> Result<Vec<OverrideSpec>> {
    let result = parse(source);
    if let Some(err) = result.errors.first() {
        return Err(syntax_error(source, err));
    }
    result
        .overrides
        .ok_or_else(|| FreezeError::syntax("no overrides parsed", (0..source.len()).into()))
}

/// Parse an `--input-shape` list: `[1 3],[2]` or `(1,3),(2)`.
pub fn parse_shape_list(source: &str) -> Result<Vec<ShapeSpec>> {
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }

    let lex_result = crate::lexer::lex(source);
    if let Some(e) = lex_result.errors.first() {
        return Err(FreezeError::syntax(
            format!("{} in input shape '{}'", e.message, source),
            e.span,
        ));
    }
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let stream =
        Stream::from_iter(lex_result.tokens.into_iter()).map(eoi, |(t, s): (_, _)| (t, s));

    let (shapes, errors) = shape_list_parser().parse(stream).into_output_errors();
    if let Some(err) = errors.first() {
        return Err(syntax_error(source, err));
    }
    shapes.ok_or_else(|| FreezeError::syntax("no shapes parsed", (0..len).into()))
}

/// Build a Syntax error naming the offending substring and its position.
fn syntax_error(source: &str, err: &Rich<'_, Token, SimpleSpan>) -> FreezeError {
    let span = *err.span();
    let fragment = source.get(span.start..span.end).unwrap_or("");
    let found = if fragment.is_empty() {
        "end of input".to_string()
    } else {
        format!("'{fragment}'")
    };
    FreezeError::syntax(
        format!("{} (near {} at offset {})", err, found, span.start),
        span,
    )
}

// ── Shared rules ──

fn dim_parser<'tokens, I>(
) -> impl Parser<'tokens, I, DimSpec, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    select! {
        Token::Int(-1) => DimSpec::Dynamic,
        Token::Int(n) => DimSpec::Fixed(n),
        Token::Question => DimSpec::Dynamic,
    }
    .labelled("dimension")
}

fn shape_parser<'tokens, I>(
) -> impl Parser<'tokens, I, ShapeSpec, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    dim_parser()
        .separated_by(just(Token::Comma).or_not())
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .map_with(|dims, e| ShapeSpec {
            dims,
            span: e.span(),
        })
}

fn shape_list_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Vec<ShapeSpec>, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let paren_shape = dim_parser()
        .separated_by(just(Token::Comma).or_not())
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .map_with(|dims, e| ShapeSpec {
            dims,
            span: e.span(),
        });

    shape_parser()
        .or(paren_shape)
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
}

// ── Main parser builder ──

enum Suffix {
    Shape(ShapeSpec),
    Type(TypeSpec),
}

fn overrides_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Vec<OverrideSpec>, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Name ──

    let name = just(Token::Ident)
        .map_with(move |_, e| {
            let span: SimpleSpan = e.span();
            source[span.start()..span.end()].to_string()
        })
        .labelled("input name");

    // ── Target: NAME (':' UINT)? ──

    let output_index = select! {
        Token::Int(n) if n >= 0 && n <= u32::MAX as i64 => n as u32,
    }
    .labelled("output index");

    let target = name
        .clone()
        .then(just(Token::Colon).ignore_then(output_index).or_not())
        .map_with(|(node, output), e| TargetName {
            node,
            output,
            span: e.span(),
        });

    // ── Type: '{' NAME '}' ──

    let type_spec = name
        .delimited_by(just(Token::LBrace), just(Token::RBrace))
        .try_map(|token, span: SimpleSpan| match ElemType::from_token(&token) {
            Some(elem) => Ok(TypeSpec { elem, span }),
            None => Err(Rich::custom(
                span,
                format!("unknown element type '{token}' (expected f32, f64, i32, i64, bool)"),
            )),
        });

    let suffix = shape_parser()
        .map(Suffix::Shape)
        .or(type_spec.map(Suffix::Type));

    // ── Literal value ──

    let scalar = select! {
        Token::Int(n) = e => Literal::Scalar(Scalar::Int(n), e.span()),
        Token::Float(v) = e => Literal::Scalar(Scalar::Float(v), e.span()),
        Token::True = e => Literal::Scalar(Scalar::Bool(true), e.span()),
        Token::False = e => Literal::Scalar(Scalar::Bool(false), e.span()),
    }
    .labelled("literal");

    let literal = recursive(|literal| {
        literal
            .separated_by(just(Token::Comma).or_not())
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|items, e| Literal::List(items, e.span()))
            .or(scalar)
    });

    // ── Entry ──

    let entry = target
        .then(suffix.repeated().at_most(2).collect::<Vec<_>>())
        .then(just(Token::Arrow).ignore_then(literal).or_not())
        .try_map(|((target, suffixes), value), span: SimpleSpan| {
            let mut shape: Option<ShapeSpec> = None;
            let mut elem_type: Option<TypeSpec> = None;
            for suffix in suffixes {
                match suffix {
                    Suffix::Shape(s) => {
                        if shape.is_some() {
                            return Err(Rich::custom(
                                s.span,
                                format!("shape given twice for '{}'", target.spelled()),
                            ));
                        }
                        shape = Some(s);
                    }
                    Suffix::Type(t) => {
                        if elem_type.is_some() {
                            return Err(Rich::custom(
                                t.span,
                                format!("type given twice for '{}'", target.spelled()),
                            ));
                        }
                        elem_type = Some(t);
                    }
                }
            }
            Ok(OverrideSpec {
                target,
                shape,
                elem_type,
                value,
                span,
            })
        });

    entry
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
}

// ── Tests ──
