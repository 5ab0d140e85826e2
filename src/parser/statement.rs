//! Mapping statement grammar
//!
//! ```text
//! mapping   := query | statement*
//! statement := "map" NAME "{" statement* "}"
//!            | "let" NAME "=" query
//!            | "meta" NAME? "=" query
//!            | target "=" query
//! target    := ("root" | "this") ("." segment)* | segment ("." segment)*
//! ```

use std::sync::Arc;

use super::error::{ParseError, ParseResult};
use super::pratt::PrattParser;
use super::span::line_col;
use super::tokenizer::{Token, unescape};
use crate::mapping::{AssignmentTarget, Mapping, Statement};
use crate::query::NamedMappings;

impl<'input, 'ctx> PrattParser<'input, 'ctx> {
    /// Parse a complete mapping. A lone query is shorthand for `root = query`.
    pub fn parse_mapping_body(&mut self) -> ParseResult<Vec<Statement>> {
        if self.is_at_end() {
            return Ok(Vec::new());
        }
        if !self.starts_with_statement() {
            let line = self.line();
            let query = self.parse_expression()?;
            if !self.is_at_end() {
                return Err(self.unexpected("end of input"));
            }
            return Ok(vec![Statement::new(
                AssignmentTarget::Value(Vec::new()),
                query,
                line,
            )]);
        }
        self.parse_statements(false)
    }

    fn line(&self) -> usize {
        line_col(self.source, self.position()).0
    }

    /// Whether the upcoming tokens form a statement rather than a query
    fn starts_with_statement(&self) -> bool {
        self.starts_with_keyword_statement() || self.starts_with_path_assignment()
    }

    fn starts_with_keyword_statement(&self) -> bool {
        let mut tokens = self.lookahead();
        match tokens.next() {
            Some(Token::Identifier("map")) => {
                matches!(tokens.next(), Some(Token::Identifier(_) | Token::String(_)))
                    && matches!(tokens.next(), Some(Token::LeftBrace))
            }
            Some(Token::Identifier("let")) => {
                matches!(tokens.next(), Some(Token::Identifier(_) | Token::String(_)))
                    && matches!(tokens.next(), Some(Token::Assign))
            }
            Some(Token::Identifier("meta")) => match tokens.next() {
                Some(Token::Assign) => true,
                Some(Token::Identifier(_) | Token::String(_)) => {
                    matches!(tokens.next(), Some(Token::Assign))
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn starts_with_path_assignment(&self) -> bool {
        let mut tokens = self.lookahead();
        if !matches!(tokens.next(), Some(Token::Identifier(_) | Token::This)) {
            return false;
        }
        loop {
            match tokens.next() {
                Some(Token::Assign) => return true,
                Some(Token::Dot) => match tokens.next() {
                    Some(Token::Identifier(_) | Token::String(_) | Token::Integer(_)) => {}
                    _ => return false,
                },
                _ => return false,
            }
        }
    }

    fn parse_statements(&mut self, in_block: bool) -> ParseResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            match self.current() {
                None => break,
                Some(Token::RightBrace) if in_block => break,
                _ => {}
            }
            if let Some(statement) = self.parse_statement()? {
                statements.push(statement);
            }
        }
        Ok(statements)
    }

    /// Parse one statement; `map` declarations yield `None`
    fn parse_statement(&mut self) -> ParseResult<Option<Statement>> {
        let line = self.line();

        let target = match self.current() {
            Some(Token::Identifier("map"))
                if matches!(
                    self.peek_next()?,
                    Some(Token::Identifier(_) | Token::String(_))
                ) =>
            {
                self.nested(|parser| parser.parse_map_declaration())?;
                return Ok(None);
            }
            Some(Token::Identifier("let"))
                if !matches!(self.peek_next()?, Some(Token::Dot | Token::Assign)) =>
            {
                self.advance()?;
                AssignmentTarget::Variable(self.parse_name("variable name")?)
            }
            Some(Token::Identifier("meta")) if !matches!(self.peek_next()?, Some(Token::Dot)) => {
                self.advance()?;
                if let Some(Token::Assign) = self.current() {
                    AssignmentTarget::Metadata(None)
                } else {
                    AssignmentTarget::Metadata(Some(self.parse_name("metadata key")?))
                }
            }
            Some(Token::Dollar) => {
                return Err(ParseError::InvalidTarget {
                    message: "variables are assigned with 'let'".to_string(),
                    position: self.position(),
                });
            }
            _ => AssignmentTarget::Value(self.parse_target_path()?),
        };

        self.expect(Token::Assign)?;
        let query = self.parse_expression()?;
        Ok(Some(Statement::new(target, query, line)))
    }

    fn parse_name(&mut self, expected: &str) -> ParseResult<String> {
        let position = self.position();
        let name = match self.current() {
            Some(Token::Identifier(name)) => name.to_string(),
            Some(Token::String(raw)) => unescape(raw, position)?,
            _ => return Err(self.unexpected(expected)),
        };
        self.advance()?;
        Ok(name)
    }

    fn parse_target_path(&mut self) -> ParseResult<Vec<String>> {
        let mut path = Vec::new();
        match self.current() {
            Some(Token::Identifier("root")) | Some(Token::This) => self.advance()?,
            Some(Token::Identifier(name)) => {
                path.push(name.to_string());
                self.advance()?;
            }
            Some(
                Token::True | Token::False | Token::Null | Token::Integer(_) | Token::Float(_),
            ) => {
                return Err(ParseError::InvalidTarget {
                    message: "literals cannot be assigned to".to_string(),
                    position: self.position(),
                });
            }
            _ => return Err(self.unexpected("assignment target")),
        }

        while let Some(Token::Dot) = self.current() {
            self.advance()?;
            let position = self.position();
            match self.current() {
                Some(Token::Identifier(name)) => path.push(name.to_string()),
                Some(Token::String(raw)) => path.push(unescape(raw, position)?),
                Some(Token::Integer(i)) if *i >= 0 => path.push(i.to_string()),
                _ => return Err(self.unexpected("field path segment")),
            }
            self.advance()?;
        }
        Ok(path)
    }

    fn parse_map_declaration(&mut self) -> ParseResult<()> {
        self.advance()?;
        let position = self.position();
        let name = self.parse_name("map name")?;
        if self.declared_maps.contains_key(&name) {
            return Err(ParseError::DuplicateMap { name, position });
        }

        self.expect(Token::LeftBrace)?;
        let statements = self.parse_statements(true)?;
        self.expect(Token::RightBrace)?;

        let mapping = Mapping::new(
            name.clone(),
            statements,
            Arc::new(NamedMappings::default()),
        );
        self.declared_maps.insert(name, Arc::new(mapping));
        Ok(())
    }
}
