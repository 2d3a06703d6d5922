use std::{fmt::Display, iter::Peekable, str::Chars};

use crate::color;

/// Column range of a token within its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Source location of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub span: Span,
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.span.start + 1)
    }
}

/// Tokens of the message interface definition language.
///
/// Builtin type names (`int32`, `str`, ...) are deliberately *not* keywords:
/// a type reference is just an identifier, resolved against the builtin and
/// user-type tables in a later pass.
#[derive(Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    Namespace,
    Include,
    Rpc,
    Oneway,
    Async,
    Enum,
    Type,
    Const,
    // Delimiters and operators
    OpenBrace,    // {
    CloseBrace,   // }
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    Comma,        // ,
    Colon,        // :
    Semicolon,    // ;
    Assign,       // =
    Arrow,        // ->
    /// Identifier: field, message, namespace, or type name.
    Identifier(String),
    /// Quoted include path, quotes stripped.
    StringPath(String),
    /// Integer literal, decimal or `0x` hexadecimal.
    LiteralInt(u64),
    /// One `///` line with the leading marker (and one space) stripped.
    DocComment(String),
    /// End of file.
    Eof,
    /// Error token with a message.
    Error(String),
}

/// A full token: kind plus location.
#[derive(Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    start_line_indices: Vec<usize>,
    absolute_pos: usize,
    current_line: usize,
    current_col: usize,
    emitted_eof: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.chars().peekable(),
            start_line_indices: vec![0],
            absolute_pos: 0,
            current_line: 0,
            current_col: 0,
            emitted_eof: false,
        }
    }

    /// Renders the line the token sits on with a caret marker underneath,
    /// for embedding in syntax error messages.
    pub fn display_token_in_context(&self, token: &Token) -> String {
        let line_start = self.start_line_indices[token.position.line.min(self.start_line_indices.len() - 1)];
        let line = self.source[line_start..]
            .lines()
            .next()
            .unwrap_or_default();

        let width = (token.position.span.end - token.position.span.start).max(1);
        format!(
            "{}\n{}{}{}{}",
            line,
            " ".repeat(token.position.span.start),
            color::RED,
            "^".repeat(width),
            color::END
        )
    }

    fn advance(&mut self) -> Option<char> {
        self.absolute_pos += 1;
        self.current_col += 1;
        self.chars.next()
    }

    fn advance_new_line(&mut self) -> Option<char> {
        self.current_col = 0;
        self.absolute_pos += 1;
        self.current_line += 1;
        self.start_line_indices.push(self.absolute_pos);
        self.chars.next()
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.peek() {
            if c == '\n' {
                self.advance_new_line();
            } else if c.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Consumes the rest of the current line, returning it as a slice.
    fn take_rest_of_line(&mut self) -> &'a str {
        let start = self.absolute_pos;
        while let Some(&c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
        &self.source[start..self.absolute_pos]
    }

    fn take_identifier(&mut self) -> TokenKind {
        let start = self.absolute_pos;
        while let Some(&c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let ident_str = &self.source[start..self.absolute_pos];

        match ident_str {
            "namespace" => TokenKind::Namespace,
            "include" => TokenKind::Include,
            "rpc" => TokenKind::Rpc,
            "oneway" => TokenKind::Oneway,
            "async" => TokenKind::Async,
            "enum" => TokenKind::Enum,
            "type" => TokenKind::Type,
            "const" => TokenKind::Const,
            _ => TokenKind::Identifier(ident_str.to_string()),
        }
    }

    fn take_number(&mut self) -> TokenKind {
        let start = self.absolute_pos;
        while let Some(&c) = self.peek() {
            if c.is_ascii_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        let num_str = &self.source[start..self.absolute_pos];

        let parsed = if let Some(hex) = num_str.strip_prefix("0x") {
            u64::from_str_radix(hex, 16)
        } else {
            num_str.parse::<u64>()
        };
        match parsed {
            Ok(val) => TokenKind::LiteralInt(val),
            Err(_) => TokenKind::Error(format!("invalid integer literal: '{num_str}'")),
        }
    }

    fn take_string_path(&mut self) -> TokenKind {
        self.advance(); // opening quote
        let start = self.absolute_pos;
        loop {
            match self.peek() {
                Some('"') => {
                    let path = self.source[start..self.absolute_pos].to_string();
                    self.advance(); // closing quote
                    return TokenKind::StringPath(path);
                }
                Some('\n') | None => {
                    return TokenKind::Error("unterminated string".to_string());
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Lexes everything starting with `/`: doc comments (`///`), plain
    /// comments (`//`, discarded by returning None), or an error token.
    fn take_slash(&mut self) -> Option<TokenKind> {
        self.advance(); // first '/'
        if self.peek() != Some(&'/') {
            return Some(TokenKind::Error("unrecognized character: '/'".to_string()));
        }
        self.advance(); // second '/'

        if self.peek() == Some(&'/') {
            self.advance();
            let mut text = self.take_rest_of_line();
            if let Some(stripped) = text.strip_prefix(' ') {
                text = stripped;
            }
            Some(TokenKind::DocComment(text.to_string()))
        } else {
            self.take_rest_of_line();
            None
        }
    }
}

impl<'a> From<&'a str> for Lexer<'a> {
    fn from(source: &'a str) -> Self {
        Lexer::new(source)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.skip_whitespace();

            let start_line = self.current_line;
            let start_col = self.current_col;
            let kind = match self.peek() {
                Some('{') => {
                    self.advance();
                    TokenKind::OpenBrace
                }
                Some('}') => {
                    self.advance();
                    TokenKind::CloseBrace
                }
                Some('(') => {
                    self.advance();
                    TokenKind::OpenParen
                }
                Some(')') => {
                    self.advance();
                    TokenKind::CloseParen
                }
                Some('[') => {
                    self.advance();
                    TokenKind::OpenBracket
                }
                Some(']') => {
                    self.advance();
                    TokenKind::CloseBracket
                }
                Some(',') => {
                    self.advance();
                    TokenKind::Comma
                }
                Some(':') => {
                    self.advance();
                    TokenKind::Colon
                }
                Some(';') => {
                    self.advance();
                    TokenKind::Semicolon
                }
                Some('=') => {
                    self.advance();
                    TokenKind::Assign
                }
                Some('-') => {
                    self.advance();
                    if self.peek() == Some(&'>') {
                        self.advance();
                        TokenKind::Arrow
                    } else {
                        TokenKind::Error("unrecognized character: '-'".to_string())
                    }
                }
                Some('"') => self.take_string_path(),
                Some('/') => match self.take_slash() {
                    Some(kind) => kind,
                    // A plain comment: restart at the next token.
                    None => continue,
                },
                Some(c) if c.is_ascii_alphabetic() || *c == '_' => self.take_identifier(),
                Some(c) if c.is_ascii_digit() => self.take_number(),
                None => {
                    if self.emitted_eof {
                        return None;
                    }
                    self.emitted_eof = true;
                    TokenKind::Eof
                }
                Some(c) => {
                    let kind = TokenKind::Error(format!("unrecognized character: '{c}'"));
                    self.advance();
                    kind
                }
            };

            return Some(Token {
                kind,
                position: Position {
                    line: start_line,
                    span: Span {
                        start: start_col,
                        end: self.current_col.max(start_col + 1),
                    },
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn test_message_tokens() {
        assert_eq!(
            kinds("rpc open(path: str) -> (fd: handle);"),
            vec![
                TokenKind::Rpc,
                TokenKind::Identifier("open".to_string()),
                TokenKind::OpenParen,
                TokenKind::Identifier("path".to_string()),
                TokenKind::Colon,
                TokenKind::Identifier("str".to_string()),
                TokenKind::CloseParen,
                TokenKind::Arrow,
                TokenKind::OpenParen,
                TokenKind::Identifier("fd".to_string()),
                TokenKind::Colon,
                TokenKind::Identifier("handle".to_string()),
                TokenKind::CloseParen,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds("0 42 0x10"),
            vec![
                TokenKind::LiteralInt(0),
                TokenKind::LiteralInt(42),
                TokenKind::LiteralInt(16),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_doc_comments() {
        assert_eq!(
            kinds("// ignored\n/// Opens a file.\nrpc"),
            vec![
                TokenKind::DocComment("Opens a file.".to_string()),
                TokenKind::Rpc,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_path() {
        assert_eq!(
            kinds("include \"interfaces/*.idl\";"),
            vec![
                TokenKind::Include,
                TokenKind::StringPath("interfaces/*.idl".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let kinds = kinds("include \"oops\n;");
        assert!(matches!(kinds[1], TokenKind::Error(_)));
    }

    #[test]
    fn test_empty_source_yields_single_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_doc_comment_line_numbers() {
        let tokens: Vec<Token> = Lexer::new("/// a\n\n/// b\n").collect();
        assert_eq!(tokens[0].position.line, 0);
        assert_eq!(tokens[1].position.line, 2);
    }

    #[test]
    fn test_arrow_and_brackets() {
        assert_eq!(
            kinds("x: uint8[16] -> ()"),
            vec![
                TokenKind::Identifier("x".to_string()),
                TokenKind::Colon,
                TokenKind::Identifier("uint8".to_string()),
                TokenKind::OpenBracket,
                TokenKind::LiteralInt(16),
                TokenKind::CloseBracket,
                TokenKind::Arrow,
                TokenKind::OpenParen,
                TokenKind::CloseParen,
                TokenKind::Eof,
            ]
        );
    }
}
