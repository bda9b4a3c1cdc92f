//! Statement parsing.

use crate::ast::{Block, Stmt, StmtKind};
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::Precedence;

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::Let => self.let_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Break => self.break_statement(),
            TokenKind::Continue => self.continue_statement(),
            _ => self.expression_statement(),
        }
    }

    pub(crate) fn let_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(&TokenKind::Let)?.span;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Equal)?;
        let value = self.expression(Precedence::Lowest)?;
        self.match_token(&TokenKind::Semicolon);

        let span = start.to(self.previous_span());
        Ok(Stmt::new(StmtKind::Let { name, value }, span))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(&TokenKind::Return)?.span;
        let value = self.expression(Precedence::Lowest)?;
        self.match_token(&TokenKind::Semicolon);

        let span = start.to(self.previous_span());
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn break_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(&TokenKind::Break)?.span;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::new(StmtKind::Break, start))
    }

    fn continue_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(&TokenKind::Continue)?.span;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::new(StmtKind::Continue, start))
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression(Precedence::Lowest)?;
        self.match_token(&TokenKind::Semicolon);

        let span = expr.span;
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    /// Parse a braced block of statements.
    pub(crate) fn block(&mut self) -> ParseResult<Block> {
        let start = self.expect(&TokenKind::LeftBrace)?.span;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        let end = self.expect(&TokenKind::RightBrace)?.span;
        Ok(Block::new(statements, start.to(end)))
    }
}
