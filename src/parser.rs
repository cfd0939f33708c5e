//! Syntactic layer: token stream to S-expression forms.
//!
//! The grammar is small enough for a hand-rolled recursive descent over the
//! token slice. The one piece of sugar is the quote mark, which desugars
//! during parsing into an explicit `(quote <form>)` call so the evaluator
//! never sees it.

use crate::ParseError;
use crate::ast::Value;
use crate::tokenizer::{Pos, Token, pos_at, tokenize};

/// Parse a whole source text into its top-level forms. Empty input is a
/// valid, empty program.
pub fn parse_program(source: &str) -> Result<Vec<Value>, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = FormParser {
        tokens: &tokens,
        index: 0,
        eof_pos: pos_at(source, source.len()),
    };

    let mut forms = Vec::new();
    while parser.peek().is_some() {
        forms.push(parser.form()?);
    }
    Ok(forms)
}

struct FormParser<'t> {
    tokens: &'t [Token],
    index: usize,
    eof_pos: Pos,
}

impl FormParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.index);
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn form(&mut self) -> Result<Value, ParseError> {
        let Some(token) = self.next().cloned() else {
            return Err(ParseError::new("unexpected end of input", self.eof_pos));
        };
        match token {
            Token::Number(n, _) => Ok(Value::Number(n)),
            Token::Str(s, _) => Ok(Value::Str(s)),
            Token::Identifier(name, pos) => Ok(Value::Identifier(name, Some(pos))),
            Token::Quote(pos) => {
                let inner = self.form()?;
                Ok(Value::List(vec![
                    Value::Identifier("quote".to_owned(), Some(pos)),
                    inner,
                ]))
            }
            Token::Open(open_pos) => {
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::Close(_)) => {
                            self.next();
                            return Ok(Value::List(items));
                        }
                        Some(_) => items.push(self.form()?),
                        None => return Err(ParseError::new("unclosed list", open_pos)),
                    }
                }
            }
            Token::Close(pos) => Err(ParseError::new("unexpected ')'", pos)),
        }
    }
}
