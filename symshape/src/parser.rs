// Parser for .sym graph files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Grammar:
//   program   := graph_def*
//   graph_def := 'graph' IDENT '(' (param (',' param)*)? ')' '{' stmt* ('return' IDENT)? '}'
//   param     := IDENT ':' type
//   stmt      := IDENT '=' expr (':' type)?
//   expr      := 'call' IDENT args | 'partial' IDENT args
//              | 'switch' args args? | 'const' literal | IDENT args attrs?
//   args      := '(' (IDENT (',' IDENT)*)? ')'
//   attrs     := '{' IDENT '=' attr_value (',' ...)* '}'
//   type      := IDENT ('[' ('..' | dim (',' dim)*) ']')? | '(' type (',' type)* ')'
//   dim       := INT | '?'
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a .sym source string. Lexes then parses.
///
/// Returns an AST (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Literal: INT | FLOAT | true | false | '(' literal, ... ')' ──

    let literal = recursive(|literal| {
        let scalar = select! {
            Token::Int(n) = e => Literal::Int(n, e.span()),
            Token::Float(v) = e => Literal::Float(v, e.span()),
            Token::True = e => Literal::Bool(true, e.span()),
            Token::False = e => Literal::Bool(false, e.span()),
        };
        let tuple = literal
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map_with(|items, e| Literal::Tuple(items, e.span()));
        scalar.or(tuple)
    });

    // ── Type ──

    let ty = {
        let ident = ident.clone();
        recursive(move |ty| {
            let dim = select! {
                Token::Int(n) => n,
                Token::Question => -1,
            };
            let dims = just(Token::DotDot)
                .to(None::<Vec<i64>>)
                .or(dim
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .map(Some))
                .delimited_by(just(Token::LBracket), just(Token::RBracket));

            let named_or_tensor =
                ident
                    .then(dims.or_not())
                    .map_with(|(dtype, dims), e| match dims {
                        Some(dims) => TypeExpr::Tensor {
                            dtype,
                            dims,
                            span: e.span(),
                        },
                        None => TypeExpr::Named(dtype),
                    });

            let tuple = ty
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map_with(|elems, e| TypeExpr::Tuple(elems, e.span()));

            named_or_tensor.or(tuple)
        })
    };

    // ── Attributes: '{' name '=' value, ... '}' ──

    let attr_value = {
        let ints = select! { Token::Int(n) => n }
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(AttrValue::Ints);
        select! {
            Token::Int(n) => AttrValue::Int(n),
            Token::True => AttrValue::Bool(true),
            Token::False => AttrValue::Bool(false),
        }
        .or(ints)
    };

    let attrs = ident
        .clone()
        .then_ignore(just(Token::Equals))
        .then(attr_value)
        .map(|(name, value)| AttrDef { name, value })
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    // ── Expressions ──

    let args = ident
        .clone()
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let call_expr = just(Token::Call)
        .ignore_then(ident.clone())
        .then(args.clone())
        .map(|(callee, args)| Expr::Call { callee, args });

    let partial_expr = just(Token::Partial)
        .ignore_then(ident.clone())
        .then(args.clone())
        .map(|(callee, args)| Expr::Partial { callee, args });

    let switch_expr = just(Token::Switch)
        .ignore_then(args.clone())
        .then(args.clone().or_not())
        .map(|(branches, args)| Expr::Switch {
            branches,
            args: args.unwrap_or_default(),
        });

    let const_expr = just(Token::Const).ignore_then(literal).map(Expr::Const);

    let op_expr = ident
        .clone()
        .then(args)
        .then(attrs.or_not())
        .map(|((op, args), attrs)| Expr::Op {
            op,
            args,
            attrs: attrs.unwrap_or_default(),
        });

    let expr = choice((call_expr, partial_expr, switch_expr, const_expr, op_expr));

    // ── Statements ──

    let statement = ident
        .clone()
        .then_ignore(just(Token::Equals))
        .then(expr)
        .then(just(Token::Colon).ignore_then(ty.clone()).or_not())
        .map_with(|((name, expr), ty), e| Statement {
            name,
            expr,
            ty,
            span: e.span(),
        });

    let return_stmt = just(Token::Return).ignore_then(ident.clone());

    // ── Graph definition ──

    let param = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .then(ty)
        .map_with(|(name, ty), e| Param {
            name,
            ty,
            span: e.span(),
        });

    let params = param
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let body = statement
        .repeated()
        .collect::<Vec<_>>()
        .then(return_stmt.or_not())
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    let graph_def = just(Token::Graph)
        .ignore_then(ident)
        .then(params)
        .then(body)
        .map_with(|((name, params), (body, ret)), e| GraphDef {
            name,
            params,
            body,
            ret,
            span: e.span(),
        });

    // ── Program ──

    graph_def
        .repeated()
        .collect::<Vec<_>>()
        .map_with(|graphs, e| Program {
            graphs,
            span: e.span(),
        })
}

// ── Tests ──
