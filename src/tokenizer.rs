//! Lexical layer: raw source text to a position-tagged token stream.
//!
//! The only interesting recovery rule lives in the number lexer: a lexeme
//! that starts like a number (leading digit or `-`) but fails to parse as one
//! (a bare `-`, or `1.2.3`) is re-lexed from its start as an identifier. nom's
//! backtracking gives us that cursor save/restore for free.

use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{opt, recognize},
    error::ErrorKind,
    sequence::pair,
};

use crate::ParseError;

/// A source position, 1-based line and column plus the absolute byte offset.
/// Positions are carried for diagnostics only and never affect semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One lexical token. Every token carries the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Open(Pos),
    Close(Pos),
    Quote(Pos),
    Number(f64, Pos),
    Identifier(String, Pos),
    Str(String, Pos),
}

impl Token {
    pub fn pos(&self) -> Pos {
        match self {
            Token::Open(pos)
            | Token::Close(pos)
            | Token::Quote(pos)
            | Token::Number(_, pos)
            | Token::Identifier(_, pos)
            | Token::Str(_, pos) => *pos,
        }
    }
}

/// Characters allowed in identifiers besides letters. Digits and `.` are also
/// accepted anywhere past the dispatch point, which lets rolled-back number
/// lexemes such as `1.2.3` become identifiers.
const IDENTIFIER_SPECIAL_CHARS: &str = "_-+/*?.";

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || IDENTIFIER_SPECIAL_CHARS.contains(c)
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || IDENTIFIER_SPECIAL_CHARS.contains(c)
}

/// Compute the position of a byte offset within the full input.
pub(crate) fn pos_at(input: &str, offset: usize) -> Pos {
    let seen = &input[..offset];
    let line = seen.matches('\n').count() as u32 + 1;
    let column = match seen.rfind('\n') {
        Some(newline) => (offset - newline) as u32,
        None => offset as u32 + 1,
    };
    Pos {
        line,
        column,
        offset,
    }
}

/// Lex a number: optional leading `-`, then digits and `.` greedily. Fails
/// (without consuming) when the lexeme is not a valid number, so the caller
/// can re-lex the same characters as an identifier.
fn lex_number(input: &str) -> IResult<&str, f64> {
    let (rest, lexeme) = recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit() || c == '.'),
    ))
    .parse(input)?;

    match lexeme.parse::<f64>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Float,
        ))),
    }
}

fn lex_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(is_identifier_char).parse(input)
}

/// Lex a string literal from the opening `"` to the next unescaped `"`.
/// `\"` and `\\` are unescaped; any other backslash pair is kept verbatim.
/// Fails when the input ends before the closing quote.
fn lex_string(input: &str) -> IResult<&str, String> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut iter = remaining.chars();
        match iter.next() {
            Some('"') => return Ok((iter.as_str(), chars)),
            Some('\\') => {
                match iter.next() {
                    Some('"') => chars.push('"'),
                    Some('\\') => chars.push('\\'),
                    Some(other) => {
                        chars.push('\\');
                        chars.push(other);
                    }
                    None => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            remaining,
                            ErrorKind::Char,
                        )));
                    }
                }
                remaining = iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = iter.as_str();
            }
            None => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

/// Convert source text into tokens. Total over well-formed character classes;
/// the failure modes are an unterminated string literal and a character
/// outside the language's alphabet.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        let Some(c) = rest.chars().next() else {
            break;
        };
        let pos = pos_at(input, input.len() - rest.len());

        match c {
            '(' => {
                tokens.push(Token::Open(pos));
                rest = &rest[1..];
            }
            ')' => {
                tokens.push(Token::Close(pos));
                rest = &rest[1..];
            }
            '\'' => {
                tokens.push(Token::Quote(pos));
                rest = &rest[1..];
            }
            '"' => match lex_string(rest) {
                Ok((remaining, s)) => {
                    tokens.push(Token::Str(s, pos));
                    rest = remaining;
                }
                Err(_) => return Err(ParseError::new("unterminated string", pos)),
            },
            c if c.is_ascii_digit() || c == '-' => match lex_number(rest) {
                Ok((remaining, n)) => {
                    tokens.push(Token::Number(n, pos));
                    rest = remaining;
                }
                // Rolled back: the identifier lexer consumes the same
                // characters from the lexeme start.
                Err(_) => {
                    let (remaining, name) = lex_identifier(rest).map_err(|_| {
                        ParseError::new(format!("unexpected character '{c}'"), pos)
                    })?;
                    tokens.push(Token::Identifier(name.to_owned(), pos));
                    rest = remaining;
                }
            },
            c if is_identifier_start(c) => {
                let (remaining, name) = lex_identifier(rest)
                    .map_err(|_| ParseError::new(format!("unexpected character '{c}'"), pos))?;
                tokens.push(Token::Identifier(name.to_owned(), pos));
                rest = remaining;
            }
            other => {
                return Err(ParseError::new(
                    format!("unexpected character '{other}'"),
                    pos,
                ));
            }
        }
    }

    Ok(tokens)
}
