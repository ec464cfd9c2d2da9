use std::str::FromStr;

use crate::error::HandleError;

use super::{Kind, TypeDescriptor, TypeName};

/// Parses the textual form printed by `Display`, e.g. `(int,geom.Point)->long`.
///
/// Whitespace between tokens is ignored. Any word that is not a primitive
/// keyword names a reference type.
impl FromStr for TypeDescriptor {
    type Err = HandleError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut reader = Reader::new(input);
        reader.expect('(')?;
        let mut params = Vec::new();
        reader.skip_whitespace();
        if !reader.eat(')') {
            loop {
                params.push(reader.kind()?);
                reader.skip_whitespace();
                if reader.eat(')') {
                    break;
                }
                reader.expect(',')?;
            }
        }
        reader.expect('-')?;
        reader.expect('>')?;
        let ret = reader.kind()?;
        reader.skip_whitespace();
        if let Some(ch) = reader.peek() {
            return Err(reader.error(format!("unexpected `{}` after return type", ch)));
        }
        TypeDescriptor::new(params, ret)
            .map_err(|_| reader.error("void is only legal as a return type"))
    }
}

impl FromStr for Kind {
    type Err = HandleError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut reader = Reader::new(input);
        let kind = reader.kind()?;
        reader.skip_whitespace();
        match reader.peek() {
            None => Ok(kind),
            Some(ch) => Err(reader.error(format!("unexpected `{}`", ch))),
        }
    }
}

struct Reader<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), HandleError> {
        self.skip_whitespace();
        if self.eat(expected) {
            return Ok(());
        }
        let found = match self.peek() {
            Some(ch) => format!("`{}`", ch),
            None => "end of input".to_string(),
        };
        Err(self.error(format!("expected `{}`, found {}", expected, found)))
    }

    fn kind(&mut self) -> Result<Kind, HandleError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !is_name_char(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
        let word = &self.input[start..self.pos];
        if word.is_empty() {
            return Err(self.error("expected a type name"));
        }
        Ok(Kind::from_keyword(word).unwrap_or_else(|| Kind::Ref(TypeName::new(word))))
    }

    fn error(&self, reason: impl Into<String>) -> HandleError {
        HandleError::InvalidDescriptor {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '.' | '$')
}
