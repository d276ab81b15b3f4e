//! Go scanner with automatic semicolon insertion.
//!
//! Comments are not part of the token stream; they are collected into a side
//! list so the parser can attach them to statements and declarations.

use super::token::{Tok, Token, KEYWORDS, OPERATORS};
use super::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub end_line: u32,
}

#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

pub fn tokenize(src: &str) -> Result<Lexed, ParseError> {
    let mut lexer = Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
        insert_semi: false,
        out: Lexed::default(),
    };
    lexer.run()?;
    Ok(lexer.out)
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    insert_semi: bool,
    out: Lexed,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_blanks();
            if self.pos >= self.bytes.len() {
                if self.insert_semi {
                    self.push_auto_semi();
                }
                self.push(Tok::Eof, self.pos, self.line);
                return Ok(());
            }
            let c = self.bytes[self.pos];
            if c == b'\n' {
                if self.insert_semi {
                    self.push_auto_semi();
                }
                self.pos += 1;
                self.line += 1;
                continue;
            }
            if self.src[self.pos..].starts_with("//") {
                self.line_comment();
                continue;
            }
            if self.src[self.pos..].starts_with("/*") {
                self.block_comment()?;
                continue;
            }
            let start = self.pos;
            let line = self.line;
            let tok = if is_letter(self.peek_char()) {
                self.ident()
            } else if c.is_ascii_digit()
                || (c == b'.' && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit))
            {
                self.number()
            } else if c == b'"' {
                self.string()?
            } else if c == b'`' {
                self.raw_string()?
            } else if c == b'\'' {
                self.rune()?
            } else {
                self.operator()?
            };
            self.insert_semi = match tok {
                Tok::Ident | Tok::Int | Tok::Float | Tok::Imag | Tok::Char | Tok::Str => true,
                Tok::Kw(k) => matches!(k, "break" | "continue" | "fallthrough" | "return"),
                Tok::Op(o) => matches!(o, "++" | "--" | ")" | "]" | "}"),
                _ => false,
            };
            self.push(tok, start, line);
        }
    }

    fn push(&mut self, tok: Tok, start: usize, line: u32) {
        self.out.tokens.push(Token {
            tok,
            start,
            end: if matches!(tok, Tok::Semi { auto: true } | Tok::Eof) {
                start
            } else {
                self.pos
            },
            line,
            end_line: self.line,
        });
    }

    fn push_auto_semi(&mut self) {
        self.insert_semi = false;
        self.push(Tok::Semi { auto: true }, self.pos, self.line);
    }

    fn peek_char(&self) -> char {
        self.src[self.pos..].chars().next().unwrap_or('\0')
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_blanks(&mut self) {
        while let Some(&c) = self.bytes.get(self.pos) {
            if c == b' ' || c == b'\t' || c == b'\r' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn line_comment(&mut self) {
        let start = self.pos;
        let end = self.src[start..].find('\n').map_or(self.bytes.len(), |n| start + n);
        let text = self.src[start..end].trim_end_matches('\r').to_string();
        self.pos = end;
        self.out.comments.push(Comment {
            text,
            start,
            end,
            line: self.line,
            end_line: self.line,
        });
    }

    fn block_comment(&mut self) -> Result<(), ParseError> {
        let src = self.src;
        let start = self.pos;
        let line = self.line;
        let close = src[start + 2..]
            .find("*/")
            .ok_or_else(|| self.error("comment not terminated"))?;
        let end = start + 2 + close + 2;
        let text = &src[start..end];
        let newlines = text.matches('\n').count() as u32;
        if newlines > 0 && self.insert_semi {
            self.push_auto_semi();
        }
        self.line += newlines;
        self.pos = end;
        self.out.comments.push(Comment {
            text: text.to_string(),
            start,
            end,
            line,
            end_line: self.line,
        });
        Ok(())
    }

    fn ident(&mut self) -> Tok {
        let src = self.src;
        let start = self.pos;
        for ch in src[start..].chars() {
            if is_letter(ch) || ch.is_ascii_digit() || (!ch.is_ascii() && ch.is_numeric()) {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        let word = &src[start..self.pos];
        match KEYWORDS.iter().find(|k| **k == word) {
            Some(k) => Tok::Kw(k),
            None => Tok::Ident,
        }
    }

    fn number(&mut self) -> Tok {
        let start = self.pos;
        let hex = self.src[start..].starts_with("0x") || self.src[start..].starts_with("0X");
        if hex {
            self.pos += 2;
        }
        let mut float = false;
        while let Some(&c) = self.bytes.get(self.pos) {
            let exp = if hex {
                c == b'p' || c == b'P'
            } else {
                c == b'e' || c == b'E'
            };
            if exp {
                float = true;
                self.pos += 1;
                if matches!(self.bytes.get(self.pos), Some(b'+') | Some(b'-')) {
                    self.pos += 1;
                }
            } else if c == b'.' {
                float = true;
                self.pos += 1;
            } else if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        if text.ends_with('i') {
            Tok::Imag
        } else if float {
            Tok::Float
        } else {
            Tok::Int
        }
    }

    fn string(&mut self) -> Result<Tok, ParseError> {
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') => return Err(self.error("string literal not terminated")),
                Some(b'\\') => self.pos += 2,
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Tok::Str);
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn raw_string(&mut self) -> Result<Tok, ParseError> {
        let close = self.src[self.pos + 1..]
            .find('`')
            .ok_or_else(|| self.error("raw string literal not terminated"))?;
        let end = self.pos + 1 + close + 1;
        self.line += self.src[self.pos..end].matches('\n').count() as u32;
        self.pos = end;
        Ok(Tok::Str)
    }

    fn rune(&mut self) -> Result<Tok, ParseError> {
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') => return Err(self.error("rune literal not terminated")),
                Some(b'\\') => self.pos += 2,
                Some(b'\'') => {
                    self.pos += 1;
                    return Ok(Tok::Char);
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn operator(&mut self) -> Result<Tok, ParseError> {
        let rest = &self.src[self.pos..];
        if rest.starts_with(';') {
            self.pos += 1;
            return Ok(Tok::Semi { auto: false });
        }
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) => {
                self.pos += op.len();
                Ok(Tok::Op(op))
            }
            None => Err(self.error(format!("unexpected character {:?}", self.peek_char()))),
        }
    }
}

fn is_letter(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic() || (!c.is_ascii() && c.is_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().tokens.into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_semicolon_insertion() {
        let toks = kinds("x := f()\nreturn\n");
        assert_eq!(
            toks,
            vec![
                Tok::Ident,
                Tok::Op(":="),
                Tok::Ident,
                Tok::Op("("),
                Tok::Op(")"),
                Tok::Semi { auto: true },
                Tok::Kw("return"),
                Tok::Semi { auto: true },
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_no_semicolon_after_operator() {
        let toks = kinds("a +\nb");
        assert_eq!(
            toks,
            vec![Tok::Ident, Tok::Op("+"), Tok::Ident, Tok::Semi { auto: true }, Tok::Eof]
        );
    }

    #[test]
    fn test_comments_collected() {
        let lexed = tokenize("x // trailing\n/* block\n */ y").unwrap();
        assert_eq!(lexed.comments.len(), 2);
        assert_eq!(lexed.comments[0].text, "// trailing");
        assert_eq!(lexed.comments[1].line, 2);
        assert_eq!(lexed.comments[1].end_line, 3);
    }

    #[test]
    fn test_numbers_and_literals() {
        let toks = kinds("0x1F 1.5e-3 2i 'a' `raw\nstring` \"s\\\"q\"");
        assert_eq!(
            &toks[..6],
            &[Tok::Int, Tok::Float, Tok::Imag, Tok::Char, Tok::Str, Tok::Str]
        );
    }

    #[test]
    fn test_longest_operator_match() {
        let toks = kinds("a &^= b <- c ...");
        assert!(toks.contains(&Tok::Op("&^=")));
        assert!(toks.contains(&Tok::Op("<-")));
        assert!(toks.contains(&Tok::Op("...")));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x := \"abc\n").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
