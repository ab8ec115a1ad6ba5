//! Builds the expression AST from tokenized blocks (§4.2 keyword rewrite,
//! §9 design notes).
//!
//! Two passes happen before the recursive-descent parser ever runs:
//!
//! 1. Phrase unification (`IS NOT` → `IS_NOT`, `HAS VALUE` → `HAS_VALUE`,
//!    …) merges two-word keyword phrases into one lexical word. This must
//!    happen per [`Block::Bareword`] text, since the tokenizer does not
//!    split on whitespace.
//! 2. Lexing turns each block into one or more [`Token`]s.
//!
//! The parser then produces a [`RawExpr`] and immediately applies
//! [`rewrite_keywords`] to get the canonical [`Expr`].

use crate::ast::{rewrite_keywords, Expr, RawExpr, RawKeyword};
use crate::error::{MarcoutError, Result};
use crate::tokenizer::{tokenize, Block};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IS_NOT: Regex = Regex::new(r"\bIS NOT\b").unwrap();
    static ref IS_TRUE: Regex = Regex::new(r"\bIS TRUE\b").unwrap();
    static ref IS_FALSE: Regex = Regex::new(r"\bIS FALSE\b").unwrap();
    static ref HAS_NO_VALUE: Regex = Regex::new(r"\bHAS NO VALUE\b").unwrap();
    static ref HAS_VALUE: Regex = Regex::new(r"\bHAS VALUE\b").unwrap();
    static ref STARTS_WITH: Regex = Regex::new(r"\bSTARTS WITH\b").unwrap();
}

/// Merge the DSL's two-word keyword phrases into single underscored words.
///
/// Order matters: `HAS NO VALUE` must be unified before `HAS VALUE`, or the
/// latter pattern would consume the former's `HAS … VALUE` and leave a
/// stray `NO`.
#[must_use]
pub fn unify_phrases(text: &str) -> String {
    let text = IS_NOT.replace_all(text, "IS_NOT");
    let text = IS_TRUE.replace_all(&text, "IS_TRUE");
    let text = IS_FALSE.replace_all(&text, "IS_FALSE");
    let text = HAS_NO_VALUE.replace_all(&text, "HAS_NO_VALUE");
    let text = HAS_VALUE.replace_all(&text, "HAS_VALUE");
    let text = STARTS_WITH.replace_all(&text, "STARTS_WITH");
    text.into_owned()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(f64),
    Bool(bool),
    Ident(String),
    Keyword(RawKeyword),
    Nothing,
    LParen,
    RParen,
    Comma,
    Plus,
}

fn is_open(c: char) -> bool {
    matches!(c, '(' | '[' | '{')
}

fn lex(blocks: &[Block]) -> Vec<Token> {
    let mut tokens = Vec::new();
    for block in blocks {
        match block {
            Block::StringLiteral(s) => {
                let inner = &s[1..s.len() - 1];
                tokens.push(Token::Str(inner.to_string()));
            },
            Block::Concat => tokens.push(Token::Plus),
            Block::Nestable(c) if is_open(*c) => tokens.push(Token::LParen),
            Block::Nestable(_) => tokens.push(Token::RParen),
            Block::Bareword(text) => {
                let unified = unify_phrases(text);
                for word in unified.split_whitespace() {
                    tokens.push(lex_word(word));
                }
            },
        }
    }
    tokens
}

fn lex_word(word: &str) -> Token {
    match word {
        "IS" => Token::Keyword(RawKeyword::Is),
        "IS_NOT" => Token::Keyword(RawKeyword::IsNot),
        "IS_TRUE" => Token::Keyword(RawKeyword::IsTrue),
        "IS_FALSE" => Token::Keyword(RawKeyword::IsFalse),
        "HAS_VALUE" => Token::Keyword(RawKeyword::HasValue),
        "HAS_NO_VALUE" => Token::Keyword(RawKeyword::HasNoValue),
        "STARTS_WITH" => Token::Keyword(RawKeyword::StartsWith),
        "CONTAINS" => Token::Keyword(RawKeyword::Contains),
        "NOTHING" => Token::Nothing,
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        "," => Token::Comma,
        _ => {
            if let Ok(n) = word.parse::<f64>() {
                Token::Num(n)
            } else if let Some(stripped) = word.strip_suffix(',') {
                // A bare identifier can abut a comma in an argument list
                // without intervening whitespace; split it off here since
                // the tokenizer does not treat ',' as a delimiter.
                return Token::Ident(stripped.to_string());
            } else {
                Token::Ident(word.to_string())
            }
        },
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(tok) if &tok == expected => Ok(()),
            other => Err(MarcoutError::DslParse(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    fn parse_expr(&mut self) -> Result<RawExpr> {
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<RawExpr> {
        let lhs = self.parse_relational()?;
        match self.peek() {
            Some(Token::Keyword(kw @ (RawKeyword::Is | RawKeyword::IsNot))) => {
                let kw = *kw;
                self.advance();
                let rhs = self.parse_relational()?;
                Ok(RawExpr::KeywordBinary(kw, Box::new(lhs), Box::new(rhs)))
            },
            _ => Ok(lhs),
        }
    }

    fn parse_relational(&mut self) -> Result<RawExpr> {
        let lhs = self.parse_concat()?;
        match self.peek() {
            Some(Token::Keyword(kw @ (RawKeyword::StartsWith | RawKeyword::Contains))) => {
                let kw = *kw;
                self.advance();
                let rhs = self.parse_concat()?;
                Ok(RawExpr::KeywordBinary(kw, Box::new(lhs), Box::new(rhs)))
            },
            _ => Ok(lhs),
        }
    }

    fn parse_concat(&mut self) -> Result<RawExpr> {
        let mut lhs = self.parse_postfix()?;
        while matches!(self.peek(), Some(Token::Plus)) {
            self.advance();
            let rhs = self.parse_postfix()?;
            lhs = RawExpr::Concat(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> Result<RawExpr> {
        let primary = self.parse_primary()?;
        match self.peek() {
            Some(Token::Keyword(
                kw @ (RawKeyword::IsTrue
                | RawKeyword::IsFalse
                | RawKeyword::HasValue
                | RawKeyword::HasNoValue),
            )) => {
                let kw = *kw;
                self.advance();
                Ok(RawExpr::KeywordPostfix(kw, Box::new(primary)))
            },
            _ => Ok(primary),
        }
    }

    fn parse_primary(&mut self) -> Result<RawExpr> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(RawExpr::StringLit(s)),
            Some(Token::Num(n)) => Ok(RawExpr::NumberLit(n)),
            Some(Token::Bool(b)) => Ok(RawExpr::BoolLit(b)),
            Some(Token::Nothing) => Ok(RawExpr::Nothing),
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    let args = self.parse_args()?;
                    Ok(RawExpr::Call(name, args))
                } else {
                    Ok(RawExpr::Name(name))
                }
            },
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            },
            other => Err(MarcoutError::DslParse(format!(
                "unexpected token in expression: {other:?}"
            ))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<RawExpr>> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                other => {
                    return Err(MarcoutError::DslParse(format!(
                        "expected ',' or ')' in call arguments, found {other:?}"
                    )))
                },
            }
        }
        Ok(args)
    }
}

/// Parse a raw expression string (post keyword-rewrite-ready) into the
/// final [`Expr`] AST.
///
/// # Errors
///
/// Returns [`MarcoutError::DslParse`] if tokenizing fails or the token
/// stream does not match the expression grammar.
pub fn parse_expression(input: &str) -> Result<Expr> {
    let blocks = tokenize(input)?;
    let tokens = lex(&blocks);
    let mut parser = Parser { tokens, pos: 0 };
    let raw = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(MarcoutError::DslParse(format!(
            "trailing tokens after expression: {input}"
        )));
    }
    Ok(rewrite_keywords(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp;

    #[test]
    fn parses_name() {
        assert_eq!(
            parse_expression("album_title").unwrap(),
            Expr::Name("album_title".to_string())
        );
    }

    #[test]
    fn parses_string_literal() {
        assert_eq!(
            parse_expression("\"hi\"").unwrap(),
            Expr::StringLit("hi".to_string())
        );
    }

    #[test]
    fn parses_concat() {
        let e = parse_expression("\"a\" + b").unwrap();
        assert_eq!(
            e,
            Expr::Concat(
                Box::new(Expr::StringLit("a".to_string())),
                Box::new(Expr::Name("b".to_string())),
            )
        );
    }

    #[test]
    fn parses_call() {
        let e = parse_expression("biblio_name(artist)").unwrap();
        assert_eq!(
            e,
            Expr::Call(
                "biblio_name".to_string(),
                vec![Expr::Name("artist".to_string())]
            )
        );
    }

    #[test]
    fn rewrites_is_to_eq() {
        let e = parse_expression("collection_code IS \"test\"").unwrap();
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Eq,
                Box::new(Expr::Name("collection_code".to_string())),
                Box::new(Expr::StringLit("test".to_string())),
            )
        );
    }

    #[test]
    fn rewrites_is_not_to_ne() {
        let e = parse_expression("collection_code IS NOT \"test\"").unwrap();
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Ne,
                Box::new(Expr::Name("collection_code".to_string())),
                Box::new(Expr::StringLit("test".to_string())),
            )
        );
    }

    #[test]
    fn rewrites_postfix_is_true() {
        let e = parse_expression("(x IS_TRUE)").unwrap();
        assert_eq!(
            e,
            Expr::Call("is_true".to_string(), vec![Expr::Name("x".to_string())])
        );
    }

    #[test]
    fn rewrites_has_value() {
        let e = parse_expression("(track_count HAS VALUE)").unwrap();
        assert_eq!(
            e,
            Expr::Call(
                "has_value".to_string(),
                vec![Expr::Name("track_count".to_string())]
            )
        );
    }

    #[test]
    fn rewrites_has_no_value_before_has_value() {
        let e = parse_expression("(track_count HAS NO VALUE)").unwrap();
        assert_eq!(
            e,
            Expr::Call(
                "has_no_value".to_string(),
                vec![Expr::Name("track_count".to_string())]
            )
        );
    }

    #[test]
    fn rewrites_starts_with() {
        let e = parse_expression("(a STARTS WITH b)").unwrap();
        assert_eq!(
            e,
            Expr::Call(
                "starts_with".to_string(),
                vec![Expr::Name("a".to_string()), Expr::Name("b".to_string())]
            )
        );
    }

    #[test]
    fn rewrites_contains() {
        let e = parse_expression("(a CONTAINS b)").unwrap();
        assert_eq!(
            e,
            Expr::Call(
                "contains".to_string(),
                vec![Expr::Name("a".to_string()), Expr::Name("b".to_string())]
            )
        );
    }

    #[test]
    fn nothing_literal() {
        assert_eq!(parse_expression("NOTHING").unwrap(), Expr::Nothing);
    }

    #[test]
    fn dotted_item_alias_attribute_is_one_name() {
        assert_eq!(
            parse_expression("track::title").unwrap(),
            Expr::Name("track::title".to_string())
        );
    }

    #[test]
    fn call_with_multiple_args() {
        let e = parse_expression("pretty_comma_list(genres, true)").unwrap();
        assert_eq!(
            e,
            Expr::Call(
                "pretty_comma_list".to_string(),
                vec![Expr::Name("genres".to_string()), Expr::BoolLit(true)]
            )
        );
    }
}
