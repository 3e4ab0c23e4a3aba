//! Hand-rolled tokenizer for the SQL subset. No external grammar crate is
//! used anywhere in the corpus for parsing text, so this follows the same
//! approach as the rest of the engine: a small explicit state machine.

use ndts_core::{NdtsError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    Star,
    Comma,
    Dot,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Slash,
    Percent,
    PipePipe,
    Eof,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { chars: src.char_indices().peekable(), src }
    }

    pub fn tokenize(src: &'a str) -> Result<Vec<Token>> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let is_eof = tok == Token::Eof;
            out.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        let Some(&(start, c)) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c == '\'' {
            return self.lex_string();
        }
        if c.is_alphabetic() || c == '_' {
            return self.lex_ident(start);
        }

        self.chars.next();
        Ok(match c {
            '*' => Token::Star,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' => Token::Eq,
            '!' => {
                self.expect_char('=')?;
                Token::Ne
            }
            '<' => match self.chars.peek() {
                Some(&(_, '>')) => {
                    self.chars.next();
                    Token::Ne
                }
                Some(&(_, '=')) => {
                    self.chars.next();
                    Token::Le
                }
                _ => Token::Lt,
            },
            '>' => {
                if matches!(self.chars.peek(), Some(&(_, '='))) {
                    self.chars.next();
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '|' => {
                self.expect_char('|')?;
                Token::PipePipe
            }
            other => return Err(NdtsError::syntax(format!("unexpected character '{other}'"))),
        })
    }

    fn expect_char(&mut self, expected: char) -> Result<()> {
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            _ => Err(NdtsError::syntax(format!("expected '{expected}'"))),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn lex_number(&mut self, start: usize) -> Result<Token> {
        let mut end = start;
        let mut is_float = false;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = idx + c.len_utf8();
                self.chars.next();
            } else if c == '.' && !is_float {
                is_float = true;
                end = idx + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        if is_float {
            text.parse::<f64>().map(Token::FloatLit).map_err(|_| NdtsError::syntax(format!("bad number literal {text}")))
        } else {
            text.parse::<i64>().map(Token::IntLit).map_err(|_| NdtsError::syntax(format!("bad number literal {text}")))
        }
    }

    fn lex_string(&mut self) -> Result<Token> {
        self.chars.next(); // opening quote
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\'')) => {
                    if matches!(self.chars.peek(), Some(&(_, '\''))) {
                        out.push('\'');
                        self.chars.next();
                    } else {
                        return Ok(Token::StringLit(out));
                    }
                }
                Some((_, c)) => out.push(c),
                None => return Err(NdtsError::syntax("unterminated string literal")),
            }
        }
    }

    fn lex_ident(&mut self, start: usize) -> Result<Token> {
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                end = idx + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        Ok(Token::Ident(self.src[start..end].to_string()))
    }
}
