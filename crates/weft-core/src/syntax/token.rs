//! Token definitions for the Go lexer.

/// Lexical class of a token. Literal and identifier text is recovered from the
/// source slice `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tok {
    Ident,
    Int,
    Float,
    Imag,
    Char,
    Str,
    Kw(&'static str),
    Op(&'static str),
    /// Statement terminator; `auto` marks one inserted at a newline.
    Semi { auto: bool },
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub tok: Tok,
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub end_line: u32,
}

impl Token {
    pub fn is_op(&self, op: &str) -> bool {
        matches!(self.tok, Tok::Op(o) if o == op)
    }

    pub fn is_kw(&self, kw: &str) -> bool {
        matches!(self.tok, Tok::Kw(k) if k == kw)
    }

    pub fn is_semi(&self) -> bool {
        matches!(self.tok, Tok::Semi { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.tok, Tok::Int | Tok::Float | Tok::Imag | Tok::Char | Tok::Str)
    }
}

pub const KEYWORDS: &[&str] = &[
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// Operators ordered so that the first prefix match is the longest one.
pub const OPERATORS: &[&str] = &[
    "<<=", ">>=", "&^=", "...", "&&", "||", "<-", "++", "--", "==", "!=", "<=", ">=", ":=", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "&^", "+", "-", "*", "/", "%", "&",
    "|", "^", "<", ">", "=", "!", "(", ")", "[", "]", "{", "}", ",", ".", ":", "~",
];

/// Binary operator precedence, 0 for non-binary operators.
pub fn precedence(op: &str) -> u8 {
    match op {
        "||" => 1,
        "&&" => 2,
        "==" | "!=" | "<" | "<=" | ">" | ">=" => 3,
        "+" | "-" | "|" | "^" => 4,
        "*" | "/" | "%" | "<<" | ">>" | "&" | "&^" => 5,
        _ => 0,
    }
}

pub const UNARY_PREC: u8 = 6;
pub const HIGHEST_PREC: u8 = 7;

pub fn is_assign_op(op: &str) -> bool {
    matches!(
        op,
        "=" | ":=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=" | "&^="
    )
}
