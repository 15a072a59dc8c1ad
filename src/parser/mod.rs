use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ast::*;
use crate::error::CompileError;
use crate::scanner::token::{Literal, Span, Token, TokenKind};

static NEXT_ANON_FN: AtomicUsize = AtomicUsize::new(0);

/// Process-unique name for a function declared without one. The `<` and `#`
/// keep it out of the identifier namespace.
fn anonymous_name() -> String {
    format!("<fn#{}>", NEXT_ANON_FN.fetch_add(1, Ordering::Relaxed))
}

const MAX_ARGS: usize = 255;

/// Parse a token stream (ending in `Eof`) into a program.
pub fn parse(tokens: Vec<Token>) -> Result<Program, CompileError> {
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let span = tokens
                .last()
                .map_or(Span::new(0, 0, 1), |t| {
                    Span::new(t.span.offset + t.span.len, 0, t.span.line)
                });
            tokens.push(Token::new(TokenKind::Eof, "", None, span));
        }
        Self { tokens, current: 0 }
    }

    /// Parse the whole program. The first error aborts; there is no recovery.
    pub fn parse(mut self) -> Result<Program, CompileError> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.statement()?);
        }
        tracing::debug!(count = statements.len(), "parsed statements");
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek().kind {
            TokenKind::Let => self.let_statement(),
            TokenKind::LeftBrace => self.block().map(Stmt::Block),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Fn => {
                let start = self.current_span();
                self.advance(); // consume 'fn'
                Ok(Stmt::Fn(Rc::new(self.function(start)?)))
            }
            TokenKind::Return => self.return_statement(),
            _ => self.expression_statement(),
        }
    }

    /// Parses the rest of a function after `fn`: optional name, parameters,
    /// optional return annotation and body.
    fn function(&mut self, start: Span) -> Result<FnDecl, CompileError> {
        let (name, anonymous) = if self.check(TokenKind::Identifier) {
            (self.advance().lexeme.clone(), false)
        } else {
            (anonymous_name(), true)
        };

        self.consume(TokenKind::LeftParen, "'(' before parameters")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= MAX_ARGS {
                    return Err(CompileError::parse(
                        "can't have more than 255 parameters",
                        self.current_span(),
                    ));
                }
                params.push(self.parameter()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after parameters")?;

        let return_type = if self.match_token(TokenKind::Arrow) {
            Some(self.type_annotation()?)
        } else {
            None
        };

        let body = self.block()?.statements;
        let span = self.span_from(start);
        Ok(FnDecl {
            name,
            anonymous,
            params,
            return_type,
            body,
            fn_type: TypeSlot::new(),
            span,
        })
    }

    fn parameter(&mut self) -> Result<Param, CompileError> {
        let start = self.current_span();
        let name = self.expect_identifier("parameter name")?;
        let annotation = if self.match_token(TokenKind::Colon) {
            Some(self.type_annotation()?)
        } else {
            None
        };
        Ok(Param {
            name,
            annotation,
            span: self.span_from(start),
        })
    }

    fn type_annotation(&mut self) -> Result<TypeExpr, CompileError> {
        let start = self.current_span();
        if self.match_token(TokenKind::Fn) {
            self.consume(TokenKind::LeftParen, "'(' after 'fn' in type")?;
            let mut params = Vec::new();
            if !self.check(TokenKind::RightParen) {
                loop {
                    params.push(self.type_annotation()?);
                    if !self.match_token(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightParen, "')' after parameter types")?;
            let ret = if self.match_token(TokenKind::Arrow) {
                Some(Box::new(self.type_annotation()?))
            } else {
                None
            };
            Ok(TypeExpr::Function {
                params,
                ret,
                span: self.span_from(start),
            })
        } else {
            let name = self.expect_identifier("type name")?;
            Ok(TypeExpr::Named {
                name,
                span: start,
            })
        }
    }

    fn let_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'let'
        let name = self.expect_identifier("variable name after 'let'")?;

        let annotation = if self.match_token(TokenKind::Colon) {
            Some(self.type_annotation()?)
        } else {
            None
        };

        let initializer = if self.match_token(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(Stmt::Let(LetStmt {
            name,
            annotation,
            initializer,
            binding_type: TypeSlot::new(),
            span,
        }))
    }

    fn return_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'return'
        let value = if self.check(TokenKind::RightBrace) || self.is_at_end() {
            None
        } else {
            Some(self.expression()?)
        };
        let span = self.span_from(start);
        Ok(Stmt::Return(ReturnStmt { value, span }))
    }

    fn block(&mut self) -> Result<BlockStmt, CompileError> {
        let start = self.current_span();
        self.consume(TokenKind::LeftBrace, "'{' before block")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }
        self.consume(TokenKind::RightBrace, "'}' after block")?;
        let span = self.span_from(start);
        Ok(BlockStmt { statements, span })
    }

    fn if_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'if'
        let condition = self.expression()?;
        let then_branch = self.block()?;

        let else_branch = if self.match_token(TokenKind::Else) {
            if self.check(TokenKind::If) {
                Some(Box::new(self.if_statement()?))
            } else if self.check(TokenKind::LeftBrace) {
                Some(Box::new(Stmt::Block(self.block()?)))
            } else {
                let token = self.peek();
                return Err(CompileError::parse(
                    format!("expected 'if' or block after 'else', found '{}'", token.lexeme),
                    token.span,
                ));
            }
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(Stmt::If(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        }))
    }

    fn while_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'while'
        let condition = self.expression()?;
        let body = self.block()?;
        let span = self.span_from(start);
        Ok(Stmt::While(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    fn expression_statement(&mut self) -> Result<Stmt, CompileError> {
        let expression = self.expression()?;
        let span = expression.span();
        Ok(Stmt::Expression(ExprStmt { expression, span }))
    }

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, CompileError> {
        let expr = self.equality()?;

        if self.match_token(TokenKind::Equal) {
            let value = self.assignment()?;
            let span = expr.span().to(value.span());

            return match expr {
                Expr::Variable(v) => Ok(Expr::Assign(AssignExpr {
                    name: v.name,
                    value: Box::new(value),
                    value_type: TypeSlot::new(),
                    span,
                })),
                _ => Err(CompileError::parse("invalid assignment target", span)),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.comparison()?;
        while let Some(op) = self.match_binary_op(&[TokenKind::EqualEqual, TokenKind::BangEqual]) {
            let right = self.comparison()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.term()?;
        while let Some(op) = self.match_binary_op(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let right = self.term()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.factor()?;
        while let Some(op) = self.match_binary_op(&[TokenKind::Plus, TokenKind::Minus]) {
            let right = self.factor()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.unary()?;
        while let Some(op) =
            self.match_binary_op(&[TokenKind::Star, TokenKind::Slash, TokenKind::SlashSlash])
        {
            let right = self.unary()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        if self.check(TokenKind::Bang) || self.check(TokenKind::Minus) {
            let start = self.current_span();
            let op = if self.match_token(TokenKind::Bang) {
                UnaryOp::Not
            } else {
                self.advance();
                UnaryOp::Negate
            };
            let operand = self.unary()?;
            let span = start.to(operand.span());
            return Ok(Expr::Unary(UnaryExpr {
                operator: op,
                operand: Box::new(operand),
                value_type: TypeSlot::new(),
                span,
            }));
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        while self.match_token(TokenKind::LeftParen) {
            expr = self.finish_call(expr)?;
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, CompileError> {
        let mut arguments = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if arguments.len() >= MAX_ARGS {
                    return Err(CompileError::parse(
                        "can't have more than 255 arguments",
                        self.current_span(),
                    ));
                }
                arguments.push(self.expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after arguments")?;
        let span = callee.span().to(self.previous_span());
        Ok(Expr::Call(CallExpr {
            callee: Box::new(callee),
            arguments,
            value_type: TypeSlot::new(),
            span,
        }))
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.peek().clone();
        let literal = |value| {
            Ok(Expr::Literal(LiteralExpr {
                value,
                value_type: TypeSlot::new(),
                span: token.span,
            }))
        };
        match token.kind {
            TokenKind::Number => {
                self.advance();
                match token.literal {
                    Some(Literal::Number(n)) => literal(LiteralValue::number(n)),
                    _ => Err(CompileError::parse("malformed number literal", token.span)),
                }
            }
            TokenKind::String => {
                self.advance();
                match token.literal {
                    Some(Literal::Str(ref s)) => literal(LiteralValue::Str(s.clone())),
                    _ => Err(CompileError::parse("malformed string literal", token.span)),
                }
            }
            TokenKind::True => {
                self.advance();
                literal(LiteralValue::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                literal(LiteralValue::Bool(false))
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr::Variable(VariableExpr {
                    name: token.lexeme,
                    value_type: TypeSlot::new(),
                    span: token.span,
                }))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "')' after expression")?;
                let span = token.span.to(self.previous_span());
                Ok(Expr::Grouping(GroupingExpr {
                    expression: Box::new(expr),
                    value_type: TypeSlot::new(),
                    span,
                }))
            }
            TokenKind::Fn => {
                self.advance();
                let decl = self.function(token.span)?;
                let span = decl.span;
                Ok(Expr::Function(FunctionExpr {
                    decl: Rc::new(decl),
                    value_type: TypeSlot::new(),
                    span,
                }))
            }
            TokenKind::Eof => Err(CompileError::parse(
                "expected expression, found end of input",
                token.span,
            )),
            _ => Err(CompileError::parse(
                format!("expected expression, found '{}'", token.lexeme),
                token.span,
            )),
        }
    }

    // --- Helper methods ---

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_binary_op(&mut self, kinds: &[TokenKind]) -> Option<BinaryOp> {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return token_to_binary_op(kind);
            }
        }
        None
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(message))
        }
    }

    fn expect_identifier(&mut self, context: &str) -> Result<String, CompileError> {
        if self.check(TokenKind::Identifier) {
            Ok(self.advance().lexeme.clone())
        } else {
            Err(self.unexpected(context))
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        let span = Span::new(token.span.offset, token.span.len.max(1), token.span.line);
        CompileError::parse(format!("expected {expected}, found {found}"), span)
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.current.saturating_sub(1)].span
    }

    fn span_from(&self, start: Span) -> Span {
        start.to(self.previous_span())
    }
}

fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
    let span = left.span().to(right.span());
    Expr::Binary(BinaryExpr {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        value_type: TypeSlot::new(),
        span,
    })
}

fn token_to_binary_op(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Subtract),
        TokenKind::Star => Some(BinaryOp::Multiply),
        TokenKind::Slash => Some(BinaryOp::Divide),
        TokenKind::SlashSlash => Some(BinaryOp::FloorDivide),
        TokenKind::EqualEqual => Some(BinaryOp::Equal),
        TokenKind::BangEqual => Some(BinaryOp::NotEqual),
        TokenKind::Less => Some(BinaryOp::Less),
        TokenKind::LessEqual => Some(BinaryOp::LessEqual),
        TokenKind::Greater => Some(BinaryOp::Greater),
        TokenKind::GreaterEqual => Some(BinaryOp::GreaterEqual),
        _ => None,
    }
}
