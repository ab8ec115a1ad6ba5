//! Expression tokenizer (§4.1).
//!
//! Splits a single DSL expression string into concatenation-preserving
//! [`Block`]s so later stages (the keyword rewriter and the expression
//! parser) can tell literal text apart from identifiers, operators, and
//! grouping. The tokenizer does not know about keywords or the grammar; it
//! only knows about quoting, nesting, and the `+` concatenation operator.

use crate::error::{MarcoutError, Result};

/// One block of a tokenized expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// A `"…"` or `'…'` literal, outer quotes retained, inner content
    /// untouched.
    StringLiteral(String),
    /// One of `( [ { ) ] }` as its own block.
    Nestable(char),
    /// The `+` concatenation operator, always emitted as `" + "`.
    Concat,
    /// A maximal run of characters that is none of the above, with leading
    /// and trailing whitespace trimmed. Internal whitespace is preserved.
    Bareword(String),
}

const OPENERS: [char; 3] = ['(', '[', '{'];
const CLOSERS: [char; 3] = [')', ']', '}'];

fn matching_opener(closer: char) -> char {
    match closer {
        ')' => '(',
        ']' => '[',
        '}' => '{',
        _ => unreachable!("matching_opener called with non-closer"),
    }
}

/// Tokenize a single expression string into [`Block`]s.
///
/// # Errors
///
/// Returns [`MarcoutError::DslParse`] if a nestable closer does not match
/// the innermost open nestable (e.g. `]` closing a `(`), or if a string
/// literal is left unterminated at end of input.
pub fn tokenize(input: &str) -> Result<Vec<Block>> {
    let chars: Vec<char> = input.chars().collect();
    let mut blocks = Vec::new();
    let mut nesting: Vec<char> = Vec::new();
    let mut bareword = String::new();
    let mut i = 0;

    macro_rules! flush_bareword {
        () => {
            let trimmed = bareword.trim();
            if !trimmed.is_empty() {
                blocks.push(Block::Bareword(trimmed.to_string()));
            }
            bareword.clear();
        };
    }

    while i < chars.len() {
        let c = chars[i];

        if c == '"' || c == '\'' {
            flush_bareword!();
            let quote = c;
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            if i >= chars.len() {
                return Err(MarcoutError::DslParse(format!(
                    "unterminated string literal starting at position {start}"
                )));
            }
            let literal: String = chars[start..=i].iter().collect();
            blocks.push(Block::StringLiteral(literal));
            i += 1;
            continue;
        }

        if OPENERS.contains(&c) {
            flush_bareword!();
            nesting.push(c);
            blocks.push(Block::Nestable(c));
            i += 1;
            continue;
        }

        if CLOSERS.contains(&c) {
            flush_bareword!();
            match nesting.pop() {
                Some(open) if open == matching_opener(c) => {},
                Some(open) => {
                    return Err(MarcoutError::DslParse(format!(
                        "mismatched delimiter: '{c}' does not close '{open}'"
                    )));
                },
                None => {
                    return Err(MarcoutError::DslParse(format!(
                        "unmatched closing delimiter '{c}' with nothing open"
                    )));
                },
            }
            blocks.push(Block::Nestable(c));
            i += 1;
            continue;
        }

        if c == '+' {
            flush_bareword!();
            blocks.push(Block::Concat);
            i += 1;
            continue;
        }

        bareword.push(c);
        i += 1;
    }

    flush_bareword!();

    if let Some(open) = nesting.last() {
        return Err(MarcoutError::DslParse(format!(
            "unclosed delimiter '{open}' in expression: {input}"
        )));
    }

    Ok(blocks)
}

/// Concatenate blocks back into text, for the round-trip property (P1):
/// re-joining all blocks (with `+` normalized to `" + "`, which is how it
/// was already emitted) reproduces the input up to whitespace.
#[must_use]
pub fn blocks_to_string(blocks: &[Block]) -> String {
    let mut out = String::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match block {
            Block::StringLiteral(s) => out.push_str(s),
            Block::Nestable(c) => out.push(*c),
            Block::Concat => out.push('+'),
            Block::Bareword(s) => out.push_str(s),
        }
    }
    out
}
