//! The expression AST (§9 design notes: "a small tree-walking interpreter
//! over a typed AST" replaces the reference implementation's host-runtime
//! `eval`).
//!
//! Parsing happens in two stages: [`crate::expr_parser`] builds a
//! [`RawExpr`] that still carries the DSL's keyword operators
//! (`IS`, `STARTS_WITH`, `IS_TRUE`, …) as distinct nodes, then
//! [`rewrite_keywords`] performs the §4.2 "operator rewrite" as a pure AST
//! transformation, producing the [`Expr`] the evaluator actually walks.

/// A keyword operator recognized by the §4.2 phrase/operator rewrite,
/// still attached to its operands rather than rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKeyword {
    /// `IS` — rewritten to equality.
    Is,
    /// `IS_NOT` (from `IS NOT`) — rewritten to inequality.
    IsNot,
    /// `IS_TRUE` (from `IS TRUE`) — postfix, rewritten to `is_true(x)`.
    IsTrue,
    /// `IS_FALSE` (from `IS FALSE`) — postfix, rewritten to `is_false(x)`.
    IsFalse,
    /// `HAS_VALUE` (from `HAS VALUE`) — postfix, rewritten to `has_value(x)`.
    HasValue,
    /// `HAS_NO_VALUE` (from `HAS NO VALUE`) — postfix, rewritten to
    /// `has_no_value(x)`.
    HasNoValue,
    /// `STARTS_WITH` (from `STARTS WITH`) — infix, rewritten to
    /// `starts_with(a, b)`.
    StartsWith,
    /// `CONTAINS` — infix, rewritten to `contains(a, b)`.
    Contains,
}

/// Expression tree as produced by the parser, before keyword rewrite.
#[derive(Debug, Clone, PartialEq)]
pub enum RawExpr {
    /// A quoted string literal (quotes already stripped).
    StringLit(String),
    /// A numeric literal.
    NumberLit(f64),
    /// A `true`/`false` literal.
    BoolLit(bool),
    /// The `NOTHING` literal placeholder for an empty value.
    Nothing,
    /// A reference to an extracted variable or collection parameter.
    Name(String),
    /// A function call, e.g. `biblio_name(artist)`.
    Call(String, Vec<RawExpr>),
    /// `a + b` string concatenation.
    Concat(Box<RawExpr>, Box<RawExpr>),
    /// An infix keyword operator: `a KEYWORD b`.
    KeywordBinary(RawKeyword, Box<RawExpr>, Box<RawExpr>),
    /// A postfix keyword operator: `a KEYWORD`.
    KeywordPostfix(RawKeyword, Box<RawExpr>),
}

/// A binary comparison operator in the rewritten AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `==`, from the `IS` keyword.
    Eq,
    /// `!=`, from the `IS_NOT` keyword.
    Ne,
}

/// The rewritten expression AST the evaluator walks.
///
/// Every DSL keyword operator has already been folded into ordinary
/// [`Expr::Binary`] comparisons or [`Expr::Call`]s to built-in functions —
/// the evaluator has no notion of `IS`, `STARTS_WITH`, or any other keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A quoted string literal.
    StringLit(String),
    /// A numeric literal.
    NumberLit(f64),
    /// A `true`/`false` literal.
    BoolLit(bool),
    /// The empty-value placeholder.
    Nothing,
    /// A reference to an extracted variable or collection parameter.
    Name(String),
    /// A function call.
    Call(String, Vec<Expr>),
    /// String concatenation.
    Concat(Box<Expr>, Box<Expr>),
    /// An equality/inequality comparison.
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Perform the §4.2 operator rewrite as an AST transformation.
#[must_use]
pub fn rewrite_keywords(raw: RawExpr) -> Expr {
    match raw {
        RawExpr::StringLit(s) => Expr::StringLit(s),
        RawExpr::NumberLit(n) => Expr::NumberLit(n),
        RawExpr::BoolLit(b) => Expr::BoolLit(b),
        RawExpr::Nothing => Expr::Nothing,
        RawExpr::Name(n) => Expr::Name(n),
        RawExpr::Call(name, args) => {
            Expr::Call(name, args.into_iter().map(rewrite_keywords).collect())
        },
        RawExpr::Concat(a, b) => Expr::Concat(
            Box::new(rewrite_keywords(*a)),
            Box::new(rewrite_keywords(*b)),
        ),
        RawExpr::KeywordBinary(kw, a, b) => {
            let a = rewrite_keywords(*a);
            let b = rewrite_keywords(*b);
            match kw {
                RawKeyword::Is => Expr::Binary(BinOp::Eq, Box::new(a), Box::new(b)),
                RawKeyword::IsNot => Expr::Binary(BinOp::Ne, Box::new(a), Box::new(b)),
                RawKeyword::StartsWith => Expr::Call("starts_with".to_string(), vec![a, b]),
                RawKeyword::Contains => Expr::Call("contains".to_string(), vec![a, b]),
                RawKeyword::IsTrue | RawKeyword::IsFalse | RawKeyword::HasValue | RawKeyword::HasNoValue => {
                    unreachable!("postfix-only keyword parsed as infix")
                },
            }
        },
        RawExpr::KeywordPostfix(kw, a) => {
            let a = rewrite_keywords(*a);
            match kw {
                RawKeyword::IsTrue => Expr::Call("is_true".to_string(), vec![a]),
                RawKeyword::IsFalse => Expr::Call("is_false".to_string(), vec![a]),
                RawKeyword::HasValue => Expr::Call("has_value".to_string(), vec![a]),
                RawKeyword::HasNoValue => Expr::Call("has_no_value".to_string(), vec![a]),
                RawKeyword::Is | RawKeyword::IsNot | RawKeyword::StartsWith | RawKeyword::Contains => {
                    unreachable!("infix-only keyword parsed as postfix")
                },
            }
        },
    }
}
