// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::str::Chars;

use crate::ast::Span;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    /// A `.name` field segment, stored without the dot.
    Field(String),
    /// A variable including its `$` sigil.
    Variable(String),
    StringLiteral(String),
    CharLiteral(char),
    NumberLiteral(String),
    Dot,
    Pipe,
    Assign,
    Declare,
    Comma,
    LeftParen,
    RightParen,
    Keyword(Keyword),
}

impl TokenKind {
    /// Short description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier {name:?}"),
            TokenKind::Field(name) => format!("field .{name}"),
            TokenKind::Variable(name) => format!("variable {name}"),
            TokenKind::StringLiteral(text) => format!("string {text:?}"),
            TokenKind::CharLiteral(ch) => format!("character {ch:?}"),
            TokenKind::NumberLiteral(text) => format!("number {text}"),
            TokenKind::Dot => "\".\"".to_string(),
            TokenKind::Pipe => "\"|\"".to_string(),
            TokenKind::Assign => "\"=\"".to_string(),
            TokenKind::Declare => "\":=\"".to_string(),
            TokenKind::Comma => "\",\"".to_string(),
            TokenKind::LeftParen => "\"(\"".to_string(),
            TokenKind::RightParen => "\")\"".to_string(),
            TokenKind::Keyword(keyword) => format!("<{}>", keyword.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    End,
    Range,
    With,
    Define,
    Template,
    Block,
    Break,
    Continue,
    Nil,
    True,
    False,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::Range => "range",
            Keyword::With => "with",
            Keyword::Define => "define",
            Keyword::Template => "template",
            Keyword::Block => "block",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Nil => "nil",
            Keyword::True => "true",
            Keyword::False => "false",
        }
    }

    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "range" => Keyword::Range,
            "with" => Keyword::With,
            "define" => Keyword::Define,
            "template" => Keyword::Template,
            "block" => Keyword::Block,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "nil" => Keyword::Nil,
            "true" => Keyword::True,
            "false" => Keyword::False,
            _ => return None,
        })
    }
}

/// Splits the body of a single action into tokens. `offset` is the byte
/// position of `input` inside the template so spans point into the source.
pub fn lex_action(input: &str, offset: usize) -> Result<Vec<Token>, Error> {
    let mut lexer = Lexer::new(input, offset);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    chars: Chars<'a>,
    pos: usize,
    offset: usize,
    peeked: Option<char>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, offset: usize) -> Self {
        Self {
            chars: input.chars(),
            pos: 0,
            offset,
            peeked: None,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.skip_whitespace();

        let start = self.pos;
        let Some(chr) = self.bump_char() else {
            return Ok(None);
        };

        let kind = match chr {
            '.' => match self.peek_char() {
                Some(next) if next.is_ascii_digit() => {
                    TokenKind::NumberLiteral(self.read_number(chr))
                }
                Some(next) if is_identifier_start(next) => {
                    let name = self.read_word(String::new());
                    TokenKind::Field(name)
                }
                _ => TokenKind::Dot,
            },
            '$' => TokenKind::Variable(self.read_word(String::from("$"))),
            '|' => TokenKind::Pipe,
            '=' => TokenKind::Assign,
            ':' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    TokenKind::Declare
                } else {
                    return Err(Error::compile_with_span(
                        "expected :=",
                        self.span_from(start),
                    ));
                }
            }
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            ',' => TokenKind::Comma,
            '"' => TokenKind::StringLiteral(self.read_string(start)?),
            '`' => TokenKind::StringLiteral(self.read_raw_string(start)?),
            '\'' => TokenKind::CharLiteral(self.read_char(start)?),
            '+' | '-' if matches!(self.peek_char(), Some(c) if c.is_ascii_digit() || c == '.') => {
                TokenKind::NumberLiteral(self.read_number(chr))
            }
            c if c.is_ascii_digit() => TokenKind::NumberLiteral(self.read_number(c)),
            c if is_identifier_start(c) => {
                let ident = self.read_word(c.to_string());
                match Keyword::from_ident(&ident) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Identifier(ident),
                }
            }
            other => {
                return Err(Error::compile_with_span(
                    format!(
                        "unrecognized character in action: U+{:04X} {other:?}",
                        u32::from(other)
                    ),
                    self.span_from(start),
                ));
            }
        };

        Ok(Some(Token {
            kind,
            span: self.span_from(start),
        }))
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.bump_char();
            } else {
                break;
            }
        }
    }

    fn read_word(&mut self, mut word: String) -> String {
        while let Some(ch) = self.peek_char() {
            if is_identifier_part(ch) {
                word.push(ch);
                self.bump_char();
            } else {
                break;
            }
        }
        word
    }

    /// Reads a numeric literal greedily; validation happens when the parser
    /// converts it into a value.
    fn read_number(&mut self, first: char) -> String {
        let mut literal = String::new();
        literal.push(first);
        let hex = |text: &str| {
            let digits = text.trim_start_matches(['+', '-']);
            digits.starts_with("0x") || digits.starts_with("0X")
        };

        while let Some(ch) = self.peek_char() {
            let exponent_sign = matches!(ch, '+' | '-')
                && match literal.chars().last() {
                    Some('e' | 'E') => !hex(&literal),
                    Some('p' | 'P') => hex(&literal),
                    _ => false,
                };
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || exponent_sign {
                literal.push(ch);
                self.bump_char();
            } else {
                break;
            }
        }
        literal
    }

    fn read_string(&mut self, start: usize) -> Result<String, Error> {
        let mut literal = String::new();
        while let Some(ch) = self.bump_char() {
            match ch {
                '"' => return Ok(literal),
                '\\' => literal.push(self.read_escape(start, '"')?),
                '\n' => break,
                other => literal.push(other),
            }
        }
        Err(Error::compile_with_span(
            "unterminated quoted string",
            self.span_from(start),
        ))
    }

    fn read_raw_string(&mut self, start: usize) -> Result<String, Error> {
        let mut literal = String::new();
        while let Some(ch) = self.bump_char() {
            match ch {
                '`' => return Ok(literal),
                '\r' => {}
                _ => literal.push(ch),
            }
        }
        Err(Error::compile_with_span(
            "unterminated raw quoted string",
            self.span_from(start),
        ))
    }

    fn read_char(&mut self, start: usize) -> Result<char, Error> {
        let value = match self.bump_char() {
            Some('\\') => self.read_escape(start, '\'')?,
            Some('\'' | '\n') | None => {
                return Err(Error::compile_with_span(
                    "malformed character constant",
                    self.span_from(start),
                ))
            }
            Some(other) => other,
        };
        if self.bump_char() != Some('\'') {
            return Err(Error::compile_with_span(
                "unterminated character constant",
                self.span_from(start),
            ));
        }
        Ok(value)
    }

    fn read_escape(&mut self, start: usize, quote: char) -> Result<char, Error> {
        let invalid = |lexer: &Self| {
            Error::compile_with_span("invalid syntax in escape sequence", lexer.span_from(start))
        };
        let Some(next) = self.bump_char() else {
            return Err(invalid(self));
        };
        let escaped = match next {
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0C}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{0B}',
            '\\' => '\\',
            c if c == quote => c,
            'x' => self.read_code_point(2, 16).ok_or_else(|| invalid(self))?,
            'u' => self.read_code_point(4, 16).ok_or_else(|| invalid(self))?,
            'U' => self.read_code_point(8, 16).ok_or_else(|| invalid(self))?,
            c @ '0'..='7' => {
                let mut value = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    let digit = self
                        .bump_char()
                        .and_then(|d| d.to_digit(8))
                        .ok_or_else(|| invalid(self))?;
                    value = value * 8 + digit;
                }
                char::from_u32(value).ok_or_else(|| invalid(self))?
            }
            _ => return Err(invalid(self)),
        };
        Ok(escaped)
    }

    fn read_code_point(&mut self, digits: usize, radix: u32) -> Option<char> {
        let mut value = 0u32;
        for _ in 0..digits {
            let digit = self.bump_char()?.to_digit(radix)?;
            value = value * radix + digit;
        }
        char::from_u32(value)
    }

    fn bump_char(&mut self) -> Option<char> {
        let ch = match self.peeked.take() {
            Some(peek) => peek,
            None => self.chars.next()?,
        };
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn peek_char(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(self.offset + start, self.offset + self.pos)
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_identifier_part(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_numeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn lexes_identifier_and_strings() {
        let tokens = lex_action(r#"default "value" .name"#, 0).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Identifier("default".into()),
                TokenKind::StringLiteral("value".into()),
                TokenKind::Field("name".into()),
            ]
        );
    }

    #[test]
    fn lexes_field_chains_and_variables() {
        let tokens = lex_action("$x.a.b . $", 0).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Variable("$x".into()),
                TokenKind::Field("a".into()),
                TokenKind::Field("b".into()),
                TokenKind::Dot,
                TokenKind::Variable("$".into()),
            ]
        );
        assert_eq!(tokens[0].span.end, tokens[1].span.start);
    }

    #[test]
    fn lexes_declarations_and_keywords() {
        let tokens = lex_action("range $i, $v := .items", 0).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Keyword(Keyword::Range),
                TokenKind::Variable("$i".into()),
                TokenKind::Comma,
                TokenKind::Variable("$v".into()),
                TokenKind::Declare,
                TokenKind::Field("items".into()),
            ]
        );
    }

    #[test]
    fn lexes_signed_and_prefixed_numbers() {
        let tokens = lex_action("-3 +1.5 0x1F 1e-3 1_000", 0).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::NumberLiteral("-3".into()),
                TokenKind::NumberLiteral("+1.5".into()),
                TokenKind::NumberLiteral("0x1F".into()),
                TokenKind::NumberLiteral("1e-3".into()),
                TokenKind::NumberLiteral("1_000".into()),
            ]
        );
    }

    #[test]
    fn decodes_escapes_and_char_literals() {
        let tokens = lex_action(r#""a\tbé\x41" 'x' '\n'"#, 0).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::StringLiteral("a\tbéA".into()),
                TokenKind::CharLiteral('x'),
                TokenKind::CharLiteral('\n'),
            ]
        );
    }

    #[test]
    fn raw_strings_keep_backslashes() {
        let tokens = lex_action(r"`a\nb`", 0).unwrap();
        assert_eq!(kinds(&tokens), vec![TokenKind::StringLiteral(r"a\nb".into())]);
    }

    #[test]
    fn spans_include_offset() {
        let tokens = lex_action("upper", 7).unwrap();
        assert_eq!(tokens[0].span, Span::new(7, 12));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = lex_action("\"unterminated", 0).unwrap_err();
        assert!(err.is_compile());
        assert!(err.message().contains("unterminated quoted string"));
    }

    #[test]
    fn errors_on_unknown_character() {
        let err = lex_action(".a != .b", 0).unwrap_err();
        assert!(err.message().contains("unrecognized character"));
    }
}
