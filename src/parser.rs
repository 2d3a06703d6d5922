use crate::{
    ast::{ConstDef, EnumDef, EnumItem, Field, MessageDef, MessageKind, Stmt, TypeDef, TypeRef},
    error::CompileError,
    lexer::{Lexer, Token, TokenKind},
};

/// Recursive-descent parser producing the raw statement list for one source
/// text. Include expansion, namespace flattening, and doc attachment happen
/// in the builder; this stage only enforces the grammar.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current_token = lexer.next().unwrap_or(Token {
            kind: TokenKind::Eof,
            position: Default::default(),
        });
        Parser {
            lexer,
            current_token,
        }
    }

    /// Parses the whole source text. Fails fast: no partial statement list
    /// is ever returned.
    pub fn parse_unit(mut self) -> Result<Vec<Stmt>, CompileError> {
        let stmts = self.parse_stmts(true)?;
        self.consume(TokenKind::Eof)?;
        Ok(stmts)
    }

    fn advance(&mut self) {
        self.current_token = self.lexer.next().unwrap_or(Token {
            kind: TokenKind::Eof,
            position: self.current_token.position,
        });
    }

    fn error(&self, expected: &str) -> CompileError {
        let found = match &self.current_token.kind {
            TokenKind::Error(msg) => msg.clone(),
            kind => format!("{kind:?}"),
        };
        CompileError::Syntax(format!(
            "expected {expected}, found {found} at {}\n{}",
            self.current_token.position,
            self.lexer.display_token_in_context(&self.current_token)
        ))
    }

    fn consume(&mut self, expected: TokenKind) -> Result<(), CompileError> {
        if self.current_token.kind == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("{expected:?}")))
        }
    }

    fn consume_identifier(&mut self) -> Result<String, CompileError> {
        let name = match &self.current_token.kind {
            TokenKind::Identifier(id) => id.clone(),
            _ => return Err(self.error("an identifier")),
        };
        self.advance();
        Ok(name)
    }

    fn consume_literal_int(&mut self) -> Result<u64, CompileError> {
        let value = match self.current_token.kind {
            TokenKind::LiteralInt(v) => v,
            _ => return Err(self.error("an integer literal")),
        };
        self.advance();
        Ok(value)
    }

    /// Parses statements until EOF (top level) or a closing brace
    /// (namespace body).
    fn parse_stmts(&mut self, top_level: bool) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        loop {
            match &self.current_token.kind {
                TokenKind::Eof if top_level => break,
                TokenKind::CloseBrace if !top_level => break,
                TokenKind::DocComment(_) => stmts.push(self.parse_doc_block()),
                TokenKind::Namespace => stmts.push(self.parse_namespace()?),
                TokenKind::Include => stmts.push(self.parse_include()?),
                TokenKind::Rpc | TokenKind::Oneway | TokenKind::Async => {
                    stmts.push(self.parse_message()?)
                }
                TokenKind::Enum => stmts.push(self.parse_enum()?),
                TokenKind::Type => stmts.push(self.parse_typedef()?),
                TokenKind::Const => stmts.push(self.parse_const()?),
                _ => return Err(self.error("a statement")),
            }
        }
        Ok(stmts)
    }

    /// Accumulates consecutive `///` lines into one doc block. A blank line
    /// between two doc comments breaks the run, so the next one starts a
    /// fresh block.
    fn parse_doc_block(&mut self) -> Stmt {
        let mut text = String::new();
        let mut last_line = self.current_token.position.line;
        let mut first = true;

        loop {
            let line = match &self.current_token.kind {
                TokenKind::DocComment(line) => line.clone(),
                _ => break,
            };
            if !first && self.current_token.position.line != last_line + 1 {
                break;
            }
            if !first {
                text.push('\n');
            }
            text.push_str(&line);
            last_line = self.current_token.position.line;
            first = false;
            self.advance();
        }

        Stmt::Doc(text.trim().to_string())
    }

    fn parse_namespace(&mut self) -> Result<Stmt, CompileError> {
        self.consume(TokenKind::Namespace)?;
        let name = self.consume_identifier()?;
        self.consume(TokenKind::OpenBrace)?;
        let body = self.parse_stmts(false)?;
        self.consume(TokenKind::CloseBrace)?;
        Ok(Stmt::Namespace { name, body })
    }

    fn parse_include(&mut self) -> Result<Stmt, CompileError> {
        self.consume(TokenKind::Include)?;
        let pattern = match &self.current_token.kind {
            TokenKind::StringPath(path) => path.clone(),
            _ => return Err(self.error("a quoted include path")),
        };
        self.advance();
        self.consume(TokenKind::Semicolon)?;
        Ok(Stmt::Include { pattern })
    }

    fn parse_message(&mut self) -> Result<Stmt, CompileError> {
        let mut is_async = false;
        while self.current_token.kind == TokenKind::Async {
            is_async = true;
            self.advance();
        }

        let kind = match self.current_token.kind {
            TokenKind::Rpc => MessageKind::Rpc,
            TokenKind::Oneway => MessageKind::Oneway,
            _ => return Err(self.error("'rpc' or 'oneway'")),
        };
        self.advance();

        let name = self.consume_identifier()?;
        self.consume(TokenKind::OpenParen)?;
        let args = self.parse_fields()?;
        self.consume(TokenKind::CloseParen)?;

        let rets = if self.current_token.kind == TokenKind::Arrow {
            self.advance();
            self.consume(TokenKind::OpenParen)?;
            let rets = self.parse_fields()?;
            self.consume(TokenKind::CloseParen)?;
            Some(rets)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon)?;

        Ok(Stmt::Message(MessageDef {
            name,
            namespace: String::new(),
            doc: String::new(),
            kind,
            is_async,
            args,
            rets,
        }))
    }

    fn parse_fields(&mut self) -> Result<Vec<Field>, CompileError> {
        let mut fields = Vec::new();
        if !matches!(self.current_token.kind, TokenKind::Identifier(_)) {
            return Ok(fields);
        }

        loop {
            let name = self.consume_identifier()?;
            self.consume(TokenKind::Colon)?;
            let ty = self.parse_type_ref()?;
            fields.push(Field::new(name, ty));

            if self.current_token.kind != TokenKind::Comma {
                break;
            }
            self.advance();
        }
        Ok(fields)
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef, CompileError> {
        let name = self.consume_identifier()?;
        let arity = if self.current_token.kind == TokenKind::OpenBracket {
            self.advance();
            let arity = self.consume_literal_int()?;
            if arity == 0 {
                return Err(CompileError::Syntax(format!(
                    "array arity must be a positive integer at {}",
                    self.current_token.position
                )));
            }
            self.consume(TokenKind::CloseBracket)?;
            Some(arity)
        } else {
            None
        };
        Ok(TypeRef { name, arity })
    }

    fn parse_enum(&mut self) -> Result<Stmt, CompileError> {
        self.consume(TokenKind::Enum)?;
        let name = self.consume_identifier()?;
        self.consume(TokenKind::OpenBrace)?;

        let mut items = Vec::new();
        while self.current_token.kind != TokenKind::CloseBrace {
            let item_name = self.consume_identifier()?;
            self.consume(TokenKind::Assign)?;
            let value = self.consume_literal_int()?;
            items.push(EnumItem {
                name: item_name,
                value,
            });

            // Trailing comma before the closing brace is allowed.
            if self.current_token.kind != TokenKind::Comma {
                break;
            }
            self.advance();
        }

        self.consume(TokenKind::CloseBrace)?;
        self.consume(TokenKind::Semicolon)?;

        Ok(Stmt::Enum(EnumDef {
            name,
            namespace: String::new(),
            doc: String::new(),
            items,
        }))
    }

    fn parse_typedef(&mut self) -> Result<Stmt, CompileError> {
        self.consume(TokenKind::Type)?;
        let name = self.consume_identifier()?;
        self.consume(TokenKind::Assign)?;
        let ty = self.parse_type_ref()?;
        self.consume(TokenKind::Semicolon)?;

        Ok(Stmt::TypeDef(TypeDef {
            name,
            namespace: String::new(),
            doc: String::new(),
            ty,
            resolved: None,
        }))
    }

    fn parse_const(&mut self) -> Result<Stmt, CompileError> {
        self.consume(TokenKind::Const)?;
        let name = self.consume_identifier()?;
        self.consume(TokenKind::Colon)?;
        let ty = self.parse_type_ref()?;
        self.consume(TokenKind::Assign)?;
        let value = self.consume_literal_int()?;
        self.consume(TokenKind::Semicolon)?;

        Ok(Stmt::Const(ConstDef {
            name,
            namespace: String::new(),
            doc: String::new(),
            ty,
            value,
            resolved: None,
        }))
    }
}
