//! Expression parsing (Pratt).

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::{token_precedence, Precedence};

impl Parser {
    /// Parse an expression with the given minimum binding power.
    pub(crate) fn expression(&mut self, precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.prefix()?;

        while precedence < token_precedence(&self.peek().kind) {
            left = self.infix(left)?;
        }

        Ok(left)
    }

    fn prefix(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::IntLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntLiteral(value), token.span))
            }
            TokenKind::StringLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(value), token.span))
            }
            TokenKind::BoolLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(value), token.span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, token.span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), token.span))
            }
            TokenKind::Bang => self.prefix_operator(UnaryOp::Bang),
            TokenKind::Minus => self.prefix_operator(UnaryOp::Minus),
            TokenKind::LeftParen => self.grouped(),
            TokenKind::If => self.if_expression(),
            TokenKind::While => self.while_expression(),
            TokenKind::For => self.for_expression(),
            TokenKind::Fn => self.function_literal(),
            TokenKind::LeftBracket => self.array_literal(),
            TokenKind::LeftBrace => self.hash_literal(),
            TokenKind::Eof => Err(ParserError::unexpected_eof(token.span)),
            _ => Err(ParserError::unexpected_token(
                "expression",
                format!("{}", token.kind),
                token.span,
            )),
        }
    }

    fn infix(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.peek().kind {
            TokenKind::LeftParen => self.finish_call(left),
            TokenKind::LeftBracket => self.finish_index(left),
            _ => self.binary(left),
        }
    }

    fn prefix_operator(&mut self, operator: UnaryOp) -> ParseResult<Expr> {
        let start = self.advance().span;
        let operand = self.expression(Precedence::Unary)?;
        let span = start.to(operand.span);
        Ok(Expr::new(
            ExprKind::Prefix {
                operator,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn binary(&mut self, left: Expr) -> ParseResult<Expr> {
        let token = self.advance();
        let operator = match token.kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::BangEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            TokenKind::And => BinaryOp::And,
            TokenKind::Or => BinaryOp::Or,
            kind => {
                return Err(ParserError::unexpected_token(
                    "operator",
                    format!("{}", kind),
                    token.span,
                ))
            }
        };

        let right = self.expression(token_precedence(&token.kind))?;
        let span = left.span.to(right.span);
        Ok(Expr::new(
            ExprKind::Infix {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn grouped(&mut self) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let expr = self.expression(Precedence::Lowest)?;
        self.expect(&TokenKind::RightParen)?;
        Ok(expr)
    }

    fn if_expression(&mut self) -> ParseResult<Expr> {
        let start = self.expect(&TokenKind::If)?.span;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression(Precedence::Lowest)?;
        self.expect(&TokenKind::RightParen)?;

        let consequence = self.block()?;
        let alternative = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };

        let span = start.to(self.previous_span());
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn while_expression(&mut self) -> ParseResult<Expr> {
        let start = self.expect(&TokenKind::While)?.span;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression(Precedence::Lowest)?;
        self.expect(&TokenKind::RightParen)?;
        let body = self.block()?;

        let span = start.to(self.previous_span());
        Ok(Expr::new(
            ExprKind::While {
                condition: Box::new(condition),
                body,
            },
            span,
        ))
    }

    /// `for <init?> : <cond> : <step> { body }` where init and step are
    /// let statements.
    fn for_expression(&mut self) -> ParseResult<Expr> {
        let start = self.expect(&TokenKind::For)?.span;

        let init = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.let_statement()?))
        };
        self.expect(&TokenKind::Colon)?;

        let condition = self.expression(Precedence::Lowest)?;
        self.expect(&TokenKind::Colon)?;

        let step = Box::new(self.let_statement()?);
        let body = self.block()?;

        let span = start.to(self.previous_span());
        Ok(Expr::new(
            ExprKind::For {
                init,
                condition: Box::new(condition),
                step,
                body,
            },
            span,
        ))
    }

    fn function_literal(&mut self) -> ParseResult<Expr> {
        let start = self.expect(&TokenKind::Fn)?.span;
        self.expect(&TokenKind::LeftParen)?;

        let mut parameters = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            parameters.push(self.expect_identifier()?);
            while self.match_token(&TokenKind::Comma) {
                parameters.push(self.expect_identifier()?);
            }
        }
        self.expect(&TokenKind::RightParen)?;

        let body = self.block()?;
        let span = start.to(self.previous_span());
        Ok(Expr::new(ExprKind::Function { parameters, body }, span))
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let arguments = self.expression_list(&TokenKind::RightParen)?;

        let span = callee.span.to(self.previous_span());
        Ok(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                arguments,
            },
            span,
        ))
    }

    fn finish_index(&mut self, left: Expr) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftBracket)?;
        let index = self.expression(Precedence::Lowest)?;
        self.expect(&TokenKind::RightBracket)?;

        let span = left.span.to(self.previous_span());
        Ok(Expr::new(
            ExprKind::Index {
                left: Box::new(left),
                index: Box::new(index),
            },
            span,
        ))
    }

    fn array_literal(&mut self) -> ParseResult<Expr> {
        let start = self.expect(&TokenKind::LeftBracket)?.span;
        let elements = self.expression_list(&TokenKind::RightBracket)?;

        let span = start.to(self.previous_span());
        Ok(Expr::new(ExprKind::Array(elements), span))
    }

    fn hash_literal(&mut self) -> ParseResult<Expr> {
        let start = self.expect(&TokenKind::LeftBrace)?.span;

        let mut pairs = Vec::new();
        if !self.check(&TokenKind::RightBrace) {
            loop {
                let key = self.expression(Precedence::Lowest)?;
                self.expect(&TokenKind::Colon)?;
                let value = self.expression(Precedence::Lowest)?;
                pairs.push((key, value));

                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        let span = start.to(self.previous_span());
        Ok(Expr::new(ExprKind::Hash(pairs), span))
    }

    fn expression_list(&mut self, end: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut list = Vec::new();

        if !self.check(end) {
            list.push(self.expression(Precedence::Lowest)?);
            while self.match_token(&TokenKind::Comma) {
                list.push(self.expression(Precedence::Lowest)?);
            }
        }
        self.expect(end)?;

        Ok(list)
    }
}
