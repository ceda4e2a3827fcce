//! Recursive-descent parser.
//!
//! Produces the arena-allocated AST from a token list. Expressions use
//! precedence climbing (`parse_expression(minimum)` plus a continuation
//! loop); postfix member/index/call binds tighter than any binary operator.
//!
//! Statement syntax summary:
//!
//! ```text
//! #import "util.mica";
//! #if LINUX { open :: () #extern("c"); }
//! main :: () -> i32 { return 0; }
//! Pair :: struct(T: type) { first: T, second: T }
//! Color :: enum u8 { red, green = 4, blue }
//! answer :: 6 * 7;
//! counter : i32 = 0;
//! ```

use std::path::{Component, Path, PathBuf};

use bumpalo::Bump;

use crate::ast::{
    AggregateMember, AggregateParameter, BinaryOperator, ConstantDefinition, ElseIf,
    EnumDefinition, EnumVariant, Expression, FileRange, FunctionDeclaration, FunctionParameter,
    Identifier, Statement, StaticIf, StructDefinition, StructLiteralMember, Tag, UnaryOperator,
    VariableDeclaration,
};
use crate::error::CompileError;
use crate::lexer::{tokenize_source, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum OperatorPrecedence {
    None,
    BooleanOr,
    BooleanAnd,
    BitwiseOr,
    BitwiseAnd,
    Equality,
    Comparison,
    Additive,
    Multiplicative,
    Cast,
}

pub struct Parser<'a> {
    arena: &'a Bump,
    path: &'a str,
    tokens: Vec<Token<'a>>,
    position: usize,
}

/// Tokenize and parse a whole source file.
pub fn parse_source<'a>(
    arena: &'a Bump,
    path: &'a str,
    source: &str,
) -> Result<&'a [&'a Statement<'a>], CompileError> {
    let tokens = tokenize_source(arena, path, source)?;
    let mut parser = Parser {
        arena,
        path,
        tokens,
        position: 0,
    };
    parser.parse_statements_until_end()
}

impl<'a> Parser<'a> {
    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<Token<'a>> {
        self.tokens.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn last_range(&self) -> FileRange {
        self.tokens
            .last()
            .map(|token| token.range)
            .unwrap_or_default()
    }

    fn error(&self, range: FileRange, message: impl Into<String>) -> CompileError {
        CompileError::new(self.path, range, message)
    }

    fn unexpected_end(&self) -> CompileError {
        self.error(self.last_range(), "Unexpected end of file")
    }

    fn require(&mut self) -> Result<Token<'a>, CompileError> {
        self.peek().ok_or_else(|| self.unexpected_end())
    }

    fn expect_kind(&mut self, kind: TokenKind<'a>) -> Result<Token<'a>, CompileError> {
        let token = self.require()?;
        if token.kind != kind {
            return Err(self.error(
                token.range,
                format!("Expected {}, got {}", kind.describe(), token.kind.describe()),
            ));
        }
        self.position += 1;
        Ok(token)
    }

    fn expect_identifier(&mut self) -> Result<Identifier<'a>, CompileError> {
        let token = self.require()?;
        match token.kind {
            TokenKind::Identifier(text) => {
                self.position += 1;
                Ok(Identifier {
                    text,
                    range: token.range,
                })
            }
            other => Err(self.error(
                token.range,
                format!("Expected an identifier, got {}", other.describe()),
            )),
        }
    }

    fn expect_string(&mut self) -> Result<(&'a str, FileRange), CompileError> {
        let token = self.require()?;
        match token.kind {
            TokenKind::String(text) => {
                self.position += 1;
                Ok((text, token.range))
            }
            other => Err(self.error(
                token.range,
                format!("Expected a string, got {}", other.describe()),
            )),
        }
    }

    fn check_kind(&mut self, kind: TokenKind<'a>) -> bool {
        if self.peek().map(|token| token.kind) == Some(kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek().map(|token| token.kind),
            Some(TokenKind::Identifier(text)) if text == keyword
        )
    }

    fn alloc_expression(&self, expression: Expression<'a>) -> &'a Expression<'a> {
        self.arena.alloc(expression)
    }

    fn alloc_statement(&self, statement: Statement<'a>) -> &'a Statement<'a> {
        self.arena.alloc(statement)
    }

    // -----------------------------------------------------------------------
    // Expressions

    fn parse_expression(
        &mut self,
        minimum_precedence: OperatorPrecedence,
    ) -> Result<&'a Expression<'a>, CompileError> {
        let left = self.parse_unary()?;
        self.parse_expression_continuation(minimum_precedence, left)
    }

    fn parse_expression_continuation(
        &mut self,
        minimum_precedence: OperatorPrecedence,
        mut left: &'a Expression<'a>,
    ) -> Result<&'a Expression<'a>, CompileError> {
        loop {
            let Some(token) = self.peek() else {
                return Ok(left);
            };

            let (operator, precedence) = match token.kind {
                TokenKind::DoublePipe => (Some(BinaryOperator::BooleanOr), OperatorPrecedence::BooleanOr),
                TokenKind::DoubleAmpersand => {
                    (Some(BinaryOperator::BooleanAnd), OperatorPrecedence::BooleanAnd)
                }
                TokenKind::Pipe => (Some(BinaryOperator::BitwiseOr), OperatorPrecedence::BitwiseOr),
                TokenKind::Ampersand => {
                    (Some(BinaryOperator::BitwiseAnd), OperatorPrecedence::BitwiseAnd)
                }
                TokenKind::DoubleEquals => (Some(BinaryOperator::Equal), OperatorPrecedence::Equality),
                TokenKind::BangEquals => {
                    (Some(BinaryOperator::NotEqual), OperatorPrecedence::Equality)
                }
                TokenKind::LeftArrow => {
                    (Some(BinaryOperator::LessThan), OperatorPrecedence::Comparison)
                }
                TokenKind::RightArrow => {
                    (Some(BinaryOperator::GreaterThan), OperatorPrecedence::Comparison)
                }
                TokenKind::Plus => (Some(BinaryOperator::Addition), OperatorPrecedence::Additive),
                TokenKind::Minus => {
                    (Some(BinaryOperator::Subtraction), OperatorPrecedence::Additive)
                }
                TokenKind::Asterisk => (
                    Some(BinaryOperator::Multiplication),
                    OperatorPrecedence::Multiplicative,
                ),
                TokenKind::ForwardSlash => {
                    (Some(BinaryOperator::Division), OperatorPrecedence::Multiplicative)
                }
                TokenKind::Percent => {
                    (Some(BinaryOperator::Modulo), OperatorPrecedence::Multiplicative)
                }
                TokenKind::Identifier("as") => (None, OperatorPrecedence::Cast),
                _ => return Ok(left),
            };

            if precedence <= minimum_precedence {
                return Ok(left);
            }

            self.position += 1;

            match operator {
                Some(operator) => {
                    let right = self.parse_expression(precedence)?;

                    left = self.alloc_expression(Expression::BinaryOperation {
                        operator,
                        left,
                        right,
                        range: FileRange::span(left.range(), right.range()),
                    });
                }
                None => {
                    // `expr as type`
                    let target = self.parse_unary()?;

                    left = self.alloc_expression(Expression::Cast {
                        expression: left,
                        target,
                        range: FileRange::span(left.range(), target.range()),
                    });
                }
            }
        }
    }

    /// Atom plus prefix operators plus postfix member/index/call.
    fn parse_unary(&mut self) -> Result<&'a Expression<'a>, CompileError> {
        let token = self.require()?;

        let mut expression = match token.kind {
            TokenKind::Identifier(text) => {
                self.position += 1;
                self.alloc_expression(Expression::NamedReference(Identifier {
                    text,
                    range: token.range,
                }))
            }
            TokenKind::Integer(value) => {
                self.position += 1;
                self.alloc_expression(Expression::IntegerLiteral {
                    value,
                    range: token.range,
                })
            }
            TokenKind::Float(value) => {
                self.position += 1;
                self.alloc_expression(Expression::FloatLiteral {
                    value,
                    range: token.range,
                })
            }
            TokenKind::String(characters) => {
                self.position += 1;
                self.alloc_expression(Expression::StringLiteral {
                    characters,
                    range: token.range,
                })
            }
            TokenKind::Asterisk => {
                self.position += 1;
                let operand = self.parse_unary()?;
                self.alloc_expression(Expression::UnaryOperation {
                    operator: UnaryOperator::Pointer,
                    expression: operand,
                    range: FileRange::span(token.range, operand.range()),
                })
            }
            TokenKind::Bang => {
                self.position += 1;
                let operand = self.parse_unary()?;
                self.alloc_expression(Expression::UnaryOperation {
                    operator: UnaryOperator::BooleanInvert,
                    expression: operand,
                    range: FileRange::span(token.range, operand.range()),
                })
            }
            TokenKind::Minus => {
                self.position += 1;
                let operand = self.parse_unary()?;
                self.alloc_expression(Expression::UnaryOperation {
                    operator: UnaryOperator::Negation,
                    expression: operand,
                    range: FileRange::span(token.range, operand.range()),
                })
            }
            TokenKind::Hash => {
                self.position += 1;
                let identifier = self.expect_identifier()?;

                if identifier.text != "bake" {
                    return Err(self.error(
                        identifier.range,
                        format!("Expected 'bake', got '{}'", identifier.text),
                    ));
                }

                let call = self.parse_unary()?;
                if !matches!(call, Expression::FunctionCall { .. }) {
                    return Err(self.error(call.range(), "Expected a function call"));
                }

                self.alloc_expression(Expression::Bake {
                    call,
                    range: FileRange::span(token.range, call.range()),
                })
            }
            TokenKind::OpenSquareBracket => {
                self.position += 1;
                self.parse_array_type(token.range)?
            }
            TokenKind::OpenCurlyBracket => {
                self.position += 1;
                self.parse_compound_literal(token.range)?
            }
            TokenKind::OpenRoundBracket => {
                self.position += 1;
                self.parse_parenthesized(token.range)?
            }
            other => {
                return Err(self.error(
                    token.range,
                    format!("Expected an expression, got {}", other.describe()),
                ));
            }
        };

        // Postfix: members, indexing, calls.
        loop {
            let Some(token) = self.peek() else {
                return Ok(expression);
            };

            match token.kind {
                TokenKind::Dot => {
                    self.position += 1;
                    let name = self.expect_identifier()?;
                    expression = self.alloc_expression(Expression::MemberReference {
                        expression,
                        name,
                        range: FileRange::span(expression.range(), name.range),
                    });
                }
                TokenKind::OpenSquareBracket => {
                    self.position += 1;
                    let index = self.parse_expression(OperatorPrecedence::None)?;
                    let close = self.expect_kind(TokenKind::CloseSquareBracket)?;
                    expression = self.alloc_expression(Expression::IndexReference {
                        expression,
                        index,
                        range: FileRange::span(expression.range(), close.range),
                    });
                }
                TokenKind::OpenRoundBracket => {
                    self.position += 1;

                    let mut parameters = Vec::new();
                    if !self.check_kind(TokenKind::CloseRoundBracket) {
                        loop {
                            parameters.push(self.parse_expression(OperatorPrecedence::None)?);

                            let token = self.require()?;
                            match token.kind {
                                TokenKind::Comma => {
                                    self.position += 1;
                                }
                                TokenKind::CloseRoundBracket => {
                                    self.position += 1;
                                    break;
                                }
                                other => {
                                    return Err(self.error(
                                        token.range,
                                        format!(
                                            "Expected ',' or ')', got {}",
                                            other.describe()
                                        ),
                                    ));
                                }
                            }
                        }
                    }

                    let end = self
                        .tokens
                        .get(self.position - 1)
                        .map(|token| token.range)
                        .unwrap_or_default();

                    expression = self.alloc_expression(Expression::FunctionCall {
                        expression,
                        parameters: self.arena.alloc_slice_copy(&parameters),
                        range: FileRange::span(expression.range(), end),
                    });
                }
                _ => return Ok(expression),
            }
        }
    }

    /// `[]T` or `[N]T`, with the opening bracket consumed.
    fn parse_array_type(
        &mut self,
        start: FileRange,
    ) -> Result<&'a Expression<'a>, CompileError> {
        let length = if self.check_kind(TokenKind::CloseSquareBracket) {
            None
        } else {
            let length = self.parse_expression(OperatorPrecedence::None)?;
            self.expect_kind(TokenKind::CloseSquareBracket)?;
            Some(length)
        };

        let element = self.parse_unary()?;

        Ok(self.alloc_expression(Expression::ArrayType {
            element,
            length,
            range: FileRange::span(start, element.range()),
        }))
    }

    /// `{ a, b, c }` or `{ x = 1, y = 2 }`, with the opening brace consumed.
    fn parse_compound_literal(
        &mut self,
        start: FileRange,
    ) -> Result<&'a Expression<'a>, CompileError> {
        if let Some(close) = self.peek() {
            if close.kind == TokenKind::CloseCurlyBracket {
                self.position += 1;
                return Ok(self.alloc_expression(Expression::ArrayLiteral {
                    elements: &[],
                    range: FileRange::span(start, close.range),
                }));
            }
        }

        let is_struct_literal = matches!(
            (
                self.peek().map(|token| token.kind),
                self.peek_at(1).map(|token| token.kind)
            ),
            (Some(TokenKind::Identifier(_)), Some(TokenKind::Equals))
        );

        if is_struct_literal {
            let mut members = Vec::new();
            let end;
            loop {
                let name = self.expect_identifier()?;
                self.expect_kind(TokenKind::Equals)?;
                let value = self.parse_expression(OperatorPrecedence::None)?;

                members.push(StructLiteralMember { name, value });

                let token = self.require()?;
                match token.kind {
                    TokenKind::Comma => {
                        self.position += 1;
                    }
                    TokenKind::CloseCurlyBracket => {
                        self.position += 1;
                        end = token.range;
                        break;
                    }
                    other => {
                        return Err(self.error(
                            token.range,
                            format!("Expected ',' or '}}', got {}", other.describe()),
                        ));
                    }
                }
            }

            Ok(self.alloc_expression(Expression::StructLiteral {
                members: self.arena.alloc_slice_copy(&members),
                range: FileRange::span(start, end),
            }))
        } else {
            let mut elements = Vec::new();
            let end;
            loop {
                elements.push(self.parse_expression(OperatorPrecedence::None)?);

                let token = self.require()?;
                match token.kind {
                    TokenKind::Comma => {
                        self.position += 1;
                    }
                    TokenKind::CloseCurlyBracket => {
                        self.position += 1;
                        end = token.range;
                        break;
                    }
                    other => {
                        return Err(self.error(
                            token.range,
                            format!("Expected ',' or '}}', got {}", other.describe()),
                        ));
                    }
                }
            }

            Ok(self.alloc_expression(Expression::ArrayLiteral {
                elements: self.arena.alloc_slice_copy(&elements),
                range: FileRange::span(start, end),
            }))
        }
    }

    /// A parenthesized expression or a function-type expression, with the
    /// opening bracket consumed.
    fn parse_parenthesized(
        &mut self,
        start: FileRange,
    ) -> Result<&'a Expression<'a>, CompileError> {
        // `()` or `(name: T, ...)` or `($T, ...)` is a function type.
        let function_type_parameters = match self.peek().map(|token| token.kind) {
            Some(TokenKind::CloseRoundBracket) | Some(TokenKind::Dollar) => true,
            Some(TokenKind::Identifier(_)) => {
                self.peek_at(1).map(|token| token.kind) == Some(TokenKind::Colon)
            }
            _ => false,
        };

        if function_type_parameters {
            let parameters = self.parse_function_parameters()?;
            return self.finish_function_type(start, parameters);
        }

        // Otherwise: one or more comma-separated expressions. A following
        // `->` turns them into unnamed function-type parameters.
        let mut expressions = Vec::new();
        loop {
            expressions.push(self.parse_expression(OperatorPrecedence::None)?);

            let token = self.require()?;
            match token.kind {
                TokenKind::Comma => {
                    self.position += 1;
                }
                TokenKind::CloseRoundBracket => {
                    self.position += 1;
                    break;
                }
                other => {
                    return Err(self.error(
                        token.range,
                        format!("Expected ',' or ')', got {}", other.describe()),
                    ));
                }
            }
        }

        if self.peek().map(|token| token.kind) == Some(TokenKind::Arrow)
            || expressions.len() > 1
        {
            let parameters: Vec<FunctionParameter<'a>> = expressions
                .iter()
                .map(|&ty| FunctionParameter {
                    name: Identifier {
                        text: "",
                        range: ty.range(),
                    },
                    ty: Some(ty),
                    polymorphic_determiner: None,
                    is_constant: false,
                })
                .collect();

            return self.finish_function_type(start, parameters);
        }

        Ok(expressions[0])
    }

    fn finish_function_type(
        &mut self,
        start: FileRange,
        parameters: Vec<FunctionParameter<'a>>,
    ) -> Result<&'a Expression<'a>, CompileError> {
        let mut end = self
            .tokens
            .get(self.position.saturating_sub(1))
            .map(|token| token.range)
            .unwrap_or(start);

        let return_type = if self.check_kind(TokenKind::Arrow) {
            let return_type = self.parse_unary()?;
            end = return_type.range();
            Some(return_type)
        } else {
            None
        };

        let tags = self.parse_tags()?;
        if let Some(tag) = tags.last() {
            end = tag.range;
        }

        Ok(self.alloc_expression(Expression::FunctionType {
            parameters: self.arena.alloc_slice_copy(&parameters),
            return_type,
            tags: self.arena.alloc_slice_copy(&tags),
            range: FileRange::span(start, end),
        }))
    }

    /// `(` already consumed; parses up to and including `)`.
    fn parse_function_parameters(
        &mut self,
    ) -> Result<Vec<FunctionParameter<'a>>, CompileError> {
        let mut parameters = Vec::new();

        if self.check_kind(TokenKind::CloseRoundBracket) {
            return Ok(parameters);
        }

        loop {
            let is_constant = self.check_kind(TokenKind::Dollar);
            let name = self.expect_identifier()?;
            self.expect_kind(TokenKind::Colon)?;

            let (ty, polymorphic_determiner) = if self.check_kind(TokenKind::Dollar) {
                let determiner = self.expect_identifier()?;
                (None, Some(determiner))
            } else {
                let ty = self.parse_expression(OperatorPrecedence::None)?;
                (Some(ty), None)
            };

            parameters.push(FunctionParameter {
                name,
                ty,
                polymorphic_determiner,
                is_constant,
            });

            let token = self.require()?;
            match token.kind {
                TokenKind::Comma => {
                    self.position += 1;
                }
                TokenKind::CloseRoundBracket => {
                    self.position += 1;
                    break;
                }
                other => {
                    return Err(self.error(
                        token.range,
                        format!("Expected ',' or ')', got {}", other.describe()),
                    ));
                }
            }
        }

        Ok(parameters)
    }

    fn parse_tags(&mut self) -> Result<Vec<Tag<'a>>, CompileError> {
        let mut tags = Vec::new();

        while let Some(token) = self.peek() {
            if token.kind != TokenKind::Hash {
                break;
            }
            self.position += 1;

            let name = self.expect_identifier()?;
            let mut end = name.range;

            let mut parameters = Vec::new();
            if self.check_kind(TokenKind::OpenRoundBracket) {
                if !self.check_kind(TokenKind::CloseRoundBracket) {
                    loop {
                        parameters.push(self.parse_expression(OperatorPrecedence::None)?);

                        let token = self.require()?;
                        match token.kind {
                            TokenKind::Comma => {
                                self.position += 1;
                            }
                            TokenKind::CloseRoundBracket => {
                                self.position += 1;
                                end = token.range;
                                break;
                            }
                            other => {
                                return Err(self.error(
                                    token.range,
                                    format!("Expected ',' or ')', got {}", other.describe()),
                                ));
                            }
                        }
                    }
                }
            }

            tags.push(Tag {
                name,
                parameters: self.arena.alloc_slice_copy(&parameters),
                range: FileRange::span(token.range, end),
            });
        }

        Ok(tags)
    }

    // -----------------------------------------------------------------------
    // Statements

    fn parse_statements_until_end(
        &mut self,
    ) -> Result<&'a [&'a Statement<'a>], CompileError> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }
        Ok(self.arena.alloc_slice_copy(&statements))
    }

    fn parse_block(&mut self) -> Result<(&'a [&'a Statement<'a>], FileRange), CompileError> {
        self.expect_kind(TokenKind::OpenCurlyBracket)?;

        let mut statements = Vec::new();
        loop {
            let token = self.require()?;
            if token.kind == TokenKind::CloseCurlyBracket {
                self.position += 1;
                return Ok((self.arena.alloc_slice_copy(&statements), token.range));
            }

            statements.push(self.parse_statement()?);
        }
    }

    fn parse_statement(&mut self) -> Result<&'a Statement<'a>, CompileError> {
        let token = self.require()?;
        let first_range = token.range;

        match token.kind {
            TokenKind::Hash => {
                self.position += 1;
                let directive = self.expect_identifier()?;

                match directive.text {
                    "import" => {
                        let (path, _) = self.expect_string()?;
                        let last = self.expect_kind(TokenKind::Semicolon)?;

                        let absolute_path = self.resolve_import_path(path);
                        let name = import_name(path);

                        Ok(self.alloc_statement(Statement::Import {
                            path,
                            name: self.arena.alloc_str(name),
                            absolute_path,
                            range: FileRange::span(first_range, last.range),
                        }))
                    }
                    "if" => {
                        let condition = self.parse_expression(OperatorPrecedence::None)?;
                        let (statements, last_range) = self.parse_block()?;

                        Ok(self.alloc_statement(Statement::StaticIf(StaticIf {
                            condition,
                            statements,
                            range: FileRange::span(first_range, last_range),
                        })))
                    }
                    "bake" => {
                        // A bake in statement position is an expression
                        // statement.
                        let call = self.parse_unary()?;
                        if !matches!(call, Expression::FunctionCall { .. }) {
                            return Err(self.error(call.range(), "Expected a function call"));
                        }

                        let bake = self.alloc_expression(Expression::Bake {
                            call,
                            range: FileRange::span(first_range, call.range()),
                        });

                        let last = self.expect_kind(TokenKind::Semicolon)?;

                        Ok(self.alloc_statement(Statement::ExpressionStatement {
                            expression: bake,
                            range: FileRange::span(first_range, last.range),
                        }))
                    }
                    other => Err(self.error(
                        directive.range,
                        format!("Expected 'import', 'if' or 'bake', got '{other}'"),
                    )),
                }
            }
            TokenKind::Identifier("if") => self.parse_if_statement(),
            TokenKind::Identifier("while") => {
                self.position += 1;
                let condition = self.parse_expression(OperatorPrecedence::None)?;
                let (statements, last_range) = self.parse_block()?;

                Ok(self.alloc_statement(Statement::WhileLoop {
                    condition,
                    statements,
                    range: FileRange::span(first_range, last_range),
                }))
            }
            TokenKind::Identifier("for") => self.parse_for_statement(),
            TokenKind::Identifier("return") => {
                self.position += 1;

                let value = if self.peek().map(|token| token.kind) == Some(TokenKind::Semicolon)
                {
                    None
                } else {
                    Some(self.parse_expression(OperatorPrecedence::None)?)
                };

                let last = self.expect_kind(TokenKind::Semicolon)?;

                Ok(self.alloc_statement(Statement::ReturnStatement {
                    value,
                    range: FileRange::span(first_range, last.range),
                }))
            }
            TokenKind::Identifier("break") => {
                self.position += 1;
                let last = self.expect_kind(TokenKind::Semicolon)?;

                Ok(self.alloc_statement(Statement::BreakStatement {
                    range: FileRange::span(first_range, last.range),
                }))
            }
            TokenKind::Identifier("using") => {
                self.position += 1;
                let module = self.parse_expression(OperatorPrecedence::None)?;
                let last = self.expect_kind(TokenKind::Semicolon)?;

                Ok(self.alloc_statement(Statement::UsingStatement {
                    module,
                    range: FileRange::span(first_range, last.range),
                }))
            }
            TokenKind::Identifier(name) => {
                match self.peek_at(1).map(|token| token.kind) {
                    Some(TokenKind::DoubleColon) => {
                        let name = Identifier {
                            text: name,
                            range: token.range,
                        };
                        self.position += 2;
                        self.parse_constant_declaration(first_range, name)
                    }
                    Some(TokenKind::Colon) => {
                        let name = Identifier {
                            text: name,
                            range: token.range,
                        };
                        self.position += 2;

                        let ty = self.parse_expression(OperatorPrecedence::None)?;

                        let initializer = if self.check_kind(TokenKind::Equals) {
                            Some(self.parse_expression(OperatorPrecedence::None)?)
                        } else {
                            None
                        };

                        let tags = self.parse_tags()?;
                        let last = self.expect_kind(TokenKind::Semicolon)?;

                        Ok(self.alloc_statement(Statement::VariableDeclaration(
                            VariableDeclaration {
                                name,
                                ty: Some(ty),
                                initializer,
                                tags: self.arena.alloc_slice_copy(&tags),
                                range: FileRange::span(first_range, last.range),
                            },
                        )))
                    }
                    Some(TokenKind::ColonEquals) => {
                        let name = Identifier {
                            text: name,
                            range: token.range,
                        };
                        self.position += 2;

                        let initializer = self.parse_expression(OperatorPrecedence::None)?;
                        let tags = self.parse_tags()?;
                        let last = self.expect_kind(TokenKind::Semicolon)?;

                        Ok(self.alloc_statement(Statement::VariableDeclaration(
                            VariableDeclaration {
                                name,
                                ty: None,
                                initializer: Some(initializer),
                                tags: self.arena.alloc_slice_copy(&tags),
                                range: FileRange::span(first_range, last.range),
                            },
                        )))
                    }
                    _ => self.parse_expression_statement(),
                }
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<&'a Statement<'a>, CompileError> {
        let expression = self.parse_expression(OperatorPrecedence::None)?;
        let first_range = expression.range();

        let token = self.require()?;
        match token.kind {
            TokenKind::Semicolon => {
                self.position += 1;
                Ok(self.alloc_statement(Statement::ExpressionStatement {
                    expression,
                    range: FileRange::span(first_range, token.range),
                }))
            }
            TokenKind::Equals => {
                self.position += 1;
                let value = self.parse_expression(OperatorPrecedence::None)?;
                let last = self.expect_kind(TokenKind::Semicolon)?;

                Ok(self.alloc_statement(Statement::Assignment {
                    target: expression,
                    value,
                    range: FileRange::span(first_range, last.range),
                }))
            }
            TokenKind::PlusEquals
            | TokenKind::MinusEquals
            | TokenKind::AsteriskEquals
            | TokenKind::ForwardSlashEquals
            | TokenKind::PercentEquals
            | TokenKind::AmpersandEquals
            | TokenKind::PipeEquals => {
                let operator = match token.kind {
                    TokenKind::PlusEquals => BinaryOperator::Addition,
                    TokenKind::MinusEquals => BinaryOperator::Subtraction,
                    TokenKind::AsteriskEquals => BinaryOperator::Multiplication,
                    TokenKind::ForwardSlashEquals => BinaryOperator::Division,
                    TokenKind::PercentEquals => BinaryOperator::Modulo,
                    TokenKind::AmpersandEquals => BinaryOperator::BitwiseAnd,
                    _ => BinaryOperator::BitwiseOr,
                };

                self.position += 1;
                let value = self.parse_expression(OperatorPrecedence::None)?;
                let last = self.expect_kind(TokenKind::Semicolon)?;

                Ok(self.alloc_statement(Statement::BinaryOperationAssignment {
                    target: expression,
                    operator,
                    value,
                    range: FileRange::span(first_range, last.range),
                }))
            }
            other => Err(self.error(
                token.range,
                format!("Expected ';' or an assignment, got {}", other.describe()),
            )),
        }
    }

    fn parse_if_statement(&mut self) -> Result<&'a Statement<'a>, CompileError> {
        let first = self.require()?;
        self.position += 1; // "if"

        let condition = self.parse_expression(OperatorPrecedence::None)?;
        let (statements, mut last_range) = self.parse_block()?;

        let mut else_ifs = Vec::new();
        let mut else_statements: &'a [&'a Statement<'a>] = &[];

        while self.check_keyword("else") {
            self.position += 1;

            if self.check_keyword("if") {
                self.position += 1;

                let condition = self.parse_expression(OperatorPrecedence::None)?;
                let (statements, range) = self.parse_block()?;
                last_range = range;

                else_ifs.push(ElseIf {
                    condition,
                    statements,
                });
            } else {
                let (statements, range) = self.parse_block()?;
                last_range = range;
                else_statements = statements;
                break;
            }
        }

        Ok(self.alloc_statement(Statement::IfStatement {
            condition,
            statements,
            else_ifs: self.arena.alloc_slice_copy(&else_ifs),
            else_statements,
            range: FileRange::span(first.range, last_range),
        }))
    }

    fn parse_for_statement(&mut self) -> Result<&'a Statement<'a>, CompileError> {
        let first = self.require()?;
        self.position += 1; // "for"

        // `for i: from..to { }` or `for from..to { }`
        let index_name = match (
            self.peek().map(|token| token.kind),
            self.peek_at(1).map(|token| token.kind),
        ) {
            (Some(TokenKind::Identifier(text)), Some(TokenKind::Colon)) => {
                let range = self.require()?.range;
                self.position += 2;
                Some(Identifier { text, range })
            }
            _ => None,
        };

        let from = self.parse_expression(OperatorPrecedence::None)?;
        self.expect_kind(TokenKind::DoubleDot)?;
        let to = self.parse_expression(OperatorPrecedence::None)?;

        let (statements, last_range) = self.parse_block()?;

        Ok(self.alloc_statement(Statement::ForLoop {
            index_name,
            from,
            to,
            statements,
            range: FileRange::span(first.range, last_range),
        }))
    }

    /// After `name ::` — a function, struct, union, enum, or constant.
    fn parse_constant_declaration(
        &mut self,
        first_range: FileRange,
        name: Identifier<'a>,
    ) -> Result<&'a Statement<'a>, CompileError> {
        let token = self.require()?;

        match token.kind {
            TokenKind::Identifier("struct") => {
                self.position += 1;
                let is_union = if self.check_keyword("union") {
                    self.position += 1;
                    true
                } else {
                    false
                };
                self.parse_aggregate_definition(first_range, name, is_union)
            }
            TokenKind::Identifier("union") => {
                self.position += 1;
                self.parse_aggregate_definition(first_range, name, true)
            }
            TokenKind::Identifier("enum") => {
                self.position += 1;
                self.parse_enum_definition(first_range, name)
            }
            TokenKind::OpenRoundBracket if self.looks_like_function_signature() => {
                self.position += 1;
                let parameters = self.parse_function_parameters()?;

                let return_type = if self.check_kind(TokenKind::Arrow) {
                    Some(self.parse_unary()?)
                } else {
                    None
                };

                let tags = self.parse_tags()?;

                let token = self.require()?;
                let (has_body, statements, last_range) = match token.kind {
                    TokenKind::OpenCurlyBracket => {
                        let (statements, last_range) = self.parse_block()?;
                        (true, statements, last_range)
                    }
                    TokenKind::Semicolon => {
                        self.position += 1;
                        (false, &[][..], token.range)
                    }
                    other => {
                        return Err(self.error(
                            token.range,
                            format!("Expected '{{' or ';', got {}", other.describe()),
                        ));
                    }
                };

                Ok(self.alloc_statement(Statement::FunctionDeclaration(
                    FunctionDeclaration {
                        name,
                        parameters: self.arena.alloc_slice_copy(&parameters),
                        return_type,
                        tags: self.arena.alloc_slice_copy(&tags),
                        has_body,
                        statements,
                        range: FileRange::span(first_range, last_range),
                    },
                )))
            }
            _ => {
                let expression = self.parse_expression(OperatorPrecedence::None)?;
                let last = self.expect_kind(TokenKind::Semicolon)?;

                Ok(self.alloc_statement(Statement::ConstantDefinition(ConstantDefinition {
                    name,
                    expression,
                    range: FileRange::span(first_range, last.range),
                })))
            }
        }
    }

    /// Whether the upcoming `( ...` is a function signature rather than a
    /// parenthesized constant expression.
    fn looks_like_function_signature(&self) -> bool {
        match self.peek_at(1).map(|token| token.kind) {
            Some(TokenKind::CloseRoundBracket) | Some(TokenKind::Dollar) => true,
            Some(TokenKind::Identifier(_)) => {
                self.peek_at(2).map(|token| token.kind) == Some(TokenKind::Colon)
            }
            _ => false,
        }
    }

    fn parse_aggregate_definition(
        &mut self,
        first_range: FileRange,
        name: Identifier<'a>,
        is_union: bool,
    ) -> Result<&'a Statement<'a>, CompileError> {
        let mut parameters = Vec::new();

        if self.check_kind(TokenKind::OpenRoundBracket)
            && !self.check_kind(TokenKind::CloseRoundBracket)
        {
            loop {
                let name = self.expect_identifier()?;
                self.expect_kind(TokenKind::Colon)?;
                let ty = self.parse_expression(OperatorPrecedence::None)?;

                parameters.push(AggregateParameter { name, ty });

                let token = self.require()?;
                match token.kind {
                    TokenKind::Comma => {
                        self.position += 1;
                    }
                    TokenKind::CloseRoundBracket => {
                        self.position += 1;
                        break;
                    }
                    other => {
                        return Err(self.error(
                            token.range,
                            format!("Expected ',' or ')', got {}", other.describe()),
                        ));
                    }
                }
            }
        }

        self.expect_kind(TokenKind::OpenCurlyBracket)?;

        let mut members = Vec::new();
        let last_range;
        loop {
            let token = self.require()?;
            if token.kind == TokenKind::CloseCurlyBracket {
                self.position += 1;
                last_range = token.range;
                break;
            }

            let name = self.expect_identifier()?;
            self.expect_kind(TokenKind::Colon)?;
            let ty = self.parse_expression(OperatorPrecedence::None)?;

            members.push(AggregateMember { name, ty });

            let token = self.require()?;
            match token.kind {
                TokenKind::Comma => {
                    self.position += 1;
                }
                TokenKind::CloseCurlyBracket => {
                    self.position += 1;
                    last_range = token.range;
                    break;
                }
                other => {
                    return Err(self.error(
                        token.range,
                        format!("Expected ',' or '}}', got {}", other.describe()),
                    ));
                }
            }
        }

        Ok(self.alloc_statement(Statement::StructDefinition(StructDefinition {
            name,
            is_union,
            parameters: self.arena.alloc_slice_copy(&parameters),
            members: self.arena.alloc_slice_copy(&members),
            range: FileRange::span(first_range, last_range),
        })))
    }

    fn parse_enum_definition(
        &mut self,
        first_range: FileRange,
        name: Identifier<'a>,
    ) -> Result<&'a Statement<'a>, CompileError> {
        let backing_type = if self.peek().map(|token| token.kind)
            == Some(TokenKind::OpenCurlyBracket)
        {
            None
        } else {
            Some(self.parse_expression(OperatorPrecedence::None)?)
        };

        self.expect_kind(TokenKind::OpenCurlyBracket)?;

        let mut variants = Vec::new();
        let last_range;
        loop {
            let token = self.require()?;
            if token.kind == TokenKind::CloseCurlyBracket {
                self.position += 1;
                last_range = token.range;
                break;
            }

            let name = self.expect_identifier()?;

            let value = if self.check_kind(TokenKind::Equals) {
                Some(self.parse_expression(OperatorPrecedence::None)?)
            } else {
                None
            };

            variants.push(EnumVariant { name, value });

            let token = self.require()?;
            match token.kind {
                TokenKind::Comma => {
                    self.position += 1;
                }
                TokenKind::CloseCurlyBracket => {
                    self.position += 1;
                    last_range = token.range;
                    break;
                }
                other => {
                    return Err(self.error(
                        token.range,
                        format!("Expected ',' or '}}', got {}", other.describe()),
                    ));
                }
            }
        }

        Ok(self.alloc_statement(Statement::EnumDefinition(EnumDefinition {
            name,
            backing_type,
            variants: self.arena.alloc_slice_copy(&variants),
            range: FileRange::span(first_range, last_range),
        })))
    }

    /// Join an import path onto the importing file's directory and normalize
    /// it lexically so repeated imports of one file deduplicate.
    fn resolve_import_path(&self, import_path: &str) -> &'a str {
        let base = Path::new(self.path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let joined = base.join(import_path);

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        normalized.push("..");
                    }
                }
                other => normalized.push(other),
            }
        }

        self.arena.alloc_str(&normalized.to_string_lossy())
    }
}

fn import_name(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<'a>(arena: &'a Bump, source: &str) -> &'a [&'a Statement<'a>] {
        parse_source(arena, "/test/main.mica", source).unwrap()
    }

    #[test]
    fn parses_trivial_function() {
        let arena = Bump::new();
        let statements = parse(&arena, "main :: () -> i32 { return 0; }");

        assert_eq!(statements.len(), 1);
        let Statement::FunctionDeclaration(declaration) = statements[0] else {
            panic!("expected a function declaration");
        };

        assert_eq!(declaration.name.text, "main");
        assert!(declaration.has_body);
        assert!(declaration.parameters.is_empty());
        assert!(declaration.return_type.is_some());
        assert_eq!(declaration.statements.len(), 1);
        assert!(matches!(
            declaration.statements[0],
            Statement::ReturnStatement { .. }
        ));
    }

    #[test]
    fn function_without_body_is_a_declaration() {
        let arena = Bump::new();
        let statements = parse(&arena, "callback :: (value: i32) -> i32;");

        let Statement::FunctionDeclaration(declaration) = statements[0] else {
            panic!("expected a function declaration");
        };
        assert!(!declaration.has_body);
        assert_eq!(declaration.parameters.len(), 1);
        assert_eq!(declaration.parameters[0].name.text, "value");
    }

    #[test]
    fn parses_polymorphic_parameters() {
        let arena = Bump::new();
        let statements = parse(&arena, "id :: ($T: type, value: $T) -> i32 { return 0; }");

        let Statement::FunctionDeclaration(declaration) = statements[0] else {
            panic!("expected a function declaration");
        };

        assert!(declaration.parameters[0].is_constant);
        assert!(!declaration.parameters[0].is_polymorphic_determiner());
        assert!(!declaration.parameters[1].is_constant);
        assert_eq!(
            declaration.parameters[1].polymorphic_determiner.unwrap().text,
            "T"
        );
        assert!(declaration.is_polymorphic());
    }

    #[test]
    fn parses_constant_definition() {
        let arena = Bump::new();
        let statements = parse(&arena, "answer :: 6 * 7;");

        let Statement::ConstantDefinition(definition) = statements[0] else {
            panic!("expected a constant definition");
        };
        assert_eq!(definition.name.text, "answer");
        assert!(matches!(
            definition.expression,
            Expression::BinaryOperation {
                operator: BinaryOperator::Multiplication,
                ..
            }
        ));
    }

    #[test]
    fn precedence_orders_boolean_below_comparison() {
        let arena = Bump::new();
        let statements = parse(&arena, "x :: 1 < 2 && 3 < 4;");

        let Statement::ConstantDefinition(definition) = statements[0] else {
            panic!("expected a constant definition");
        };

        let Expression::BinaryOperation { operator, left, right, .. } = definition.expression
        else {
            panic!("expected a binary operation");
        };

        assert_eq!(*operator, BinaryOperator::BooleanAnd);
        assert!(matches!(
            left,
            Expression::BinaryOperation {
                operator: BinaryOperator::LessThan,
                ..
            }
        ));
        assert!(matches!(
            right,
            Expression::BinaryOperation {
                operator: BinaryOperator::LessThan,
                ..
            }
        ));
    }

    #[test]
    fn parses_struct_union_and_enum_definitions() {
        let arena = Bump::new();
        let statements = parse(
            &arena,
            "Pair :: struct(T: type) { first: T, second: T }\n\
             Value :: union { integer: i64, float: f64 }\n\
             Color :: enum u8 { red, green = 4, blue }",
        );

        let Statement::StructDefinition(pair) = statements[0] else {
            panic!("expected a struct definition");
        };
        assert!(!pair.is_union);
        assert_eq!(pair.parameters.len(), 1);
        assert_eq!(pair.members.len(), 2);

        let Statement::StructDefinition(value) = statements[1] else {
            panic!("expected a union definition");
        };
        assert!(value.is_union);

        let Statement::EnumDefinition(color) = statements[2] else {
            panic!("expected an enum definition");
        };
        assert!(color.backing_type.is_some());
        assert_eq!(color.variants.len(), 3);
        assert!(color.variants[1].value.is_some());
    }

    #[test]
    fn parses_static_if_and_import() {
        let arena = Bump::new();
        let statements = parse(
            &arena,
            "#import \"util.mica\";\n#if LINUX { x :: 1; }",
        );

        let Statement::Import {
            name,
            absolute_path,
            ..
        } = statements[0]
        else {
            panic!("expected an import");
        };
        assert_eq!(*name, "util");
        assert_eq!(*absolute_path, "/test/util.mica");

        let Statement::StaticIf(static_if) = statements[1] else {
            panic!("expected a static if");
        };
        assert_eq!(static_if.statements.len(), 1);
    }

    #[test]
    fn parses_variable_declarations_and_assignments() {
        let arena = Bump::new();
        let statements = parse(
            &arena,
            "main :: () {\n\
               x : i32 = 1;\n\
               y := 2;\n\
               z : i32;\n\
               x = 3;\n\
               x += 4;\n\
             }",
        );

        let Statement::FunctionDeclaration(declaration) = statements[0] else {
            panic!("expected a function declaration");
        };

        assert!(matches!(
            declaration.statements[0],
            Statement::VariableDeclaration(VariableDeclaration {
                ty: Some(_),
                initializer: Some(_),
                ..
            })
        ));
        assert!(matches!(
            declaration.statements[1],
            Statement::VariableDeclaration(VariableDeclaration {
                ty: None,
                initializer: Some(_),
                ..
            })
        ));
        assert!(matches!(
            declaration.statements[2],
            Statement::VariableDeclaration(VariableDeclaration {
                ty: Some(_),
                initializer: None,
                ..
            })
        ));
        assert!(matches!(statements_of(declaration)[3], Statement::Assignment { .. }));
        assert!(matches!(
            statements_of(declaration)[4],
            Statement::BinaryOperationAssignment {
                operator: BinaryOperator::Addition,
                ..
            }
        ));
    }

    fn statements_of<'a>(
        declaration: &'a FunctionDeclaration<'a>,
    ) -> &'a [&'a Statement<'a>] {
        declaration.statements
    }

    #[test]
    fn parses_control_flow() {
        let arena = Bump::new();
        let statements = parse(
            &arena,
            "main :: () {\n\
               if a { } else if b { } else { }\n\
               while a { break; }\n\
               for i: 0..10 { }\n\
               for 0..10 { }\n\
             }",
        );

        let Statement::FunctionDeclaration(declaration) = statements[0] else {
            panic!("expected a function declaration");
        };

        let Statement::IfStatement {
            else_ifs,
            else_statements,
            ..
        } = declaration.statements[0]
        else {
            panic!("expected an if statement");
        };
        assert_eq!(else_ifs.len(), 1);
        assert!(else_statements.is_empty());

        assert!(matches!(
            declaration.statements[1],
            Statement::WhileLoop { .. }
        ));

        let Statement::ForLoop { index_name, .. } = declaration.statements[2] else {
            panic!("expected a for loop");
        };
        assert_eq!(index_name.unwrap().text, "i");

        let Statement::ForLoop { index_name, .. } = declaration.statements[3] else {
            panic!("expected a for loop");
        };
        assert!(index_name.is_none());
    }

    #[test]
    fn parses_tags() {
        let arena = Bump::new();
        let statements = parse(
            &arena,
            "ExitProcess :: (code: u32) #extern(\"kernel32\") #call_conv(\"stdcall\");",
        );

        let Statement::FunctionDeclaration(declaration) = statements[0] else {
            panic!("expected a function declaration");
        };

        assert_eq!(declaration.tags.len(), 2);
        assert_eq!(declaration.tags[0].name.text, "extern");
        assert_eq!(declaration.tags[0].parameters.len(), 1);
        assert_eq!(declaration.tags[1].name.text, "call_conv");
        assert!(!declaration.has_body);
    }

    #[test]
    fn parses_postfix_chains() {
        let arena = Bump::new();
        let statements = parse(&arena, "x :: a.b[0].c(1, 2);");

        let Statement::ConstantDefinition(definition) = statements[0] else {
            panic!("expected a constant definition");
        };

        let Expression::FunctionCall { expression, parameters, .. } = definition.expression
        else {
            panic!("expected a call");
        };
        assert_eq!(parameters.len(), 2);
        assert!(matches!(expression, Expression::MemberReference { .. }));
    }

    #[test]
    fn parses_array_types_and_literals() {
        let arena = Bump::new();
        let statements = parse(
            &arena,
            "a :: []u8;\nb :: [4]u8;\nc :: {1, 2, 3};\nd :: {x = 1, y = 2};",
        );

        let Statement::ConstantDefinition(a) = statements[0] else {
            panic!()
        };
        assert!(matches!(
            a.expression,
            Expression::ArrayType { length: None, .. }
        ));

        let Statement::ConstantDefinition(b) = statements[1] else {
            panic!()
        };
        assert!(matches!(
            b.expression,
            Expression::ArrayType {
                length: Some(_),
                ..
            }
        ));

        let Statement::ConstantDefinition(c) = statements[2] else {
            panic!()
        };
        assert!(matches!(
            c.expression,
            Expression::ArrayLiteral { elements, .. } if elements.len() == 3
        ));

        let Statement::ConstantDefinition(d) = statements[3] else {
            panic!()
        };
        assert!(matches!(
            d.expression,
            Expression::StructLiteral { members, .. } if members.len() == 2
        ));
    }

    #[test]
    fn parses_casts_and_bake() {
        let arena = Bump::new();
        let statements = parse(&arena, "x :: 1 as u8;\ny :: #bake f(i32);");

        let Statement::ConstantDefinition(x) = statements[0] else {
            panic!()
        };
        assert!(matches!(x.expression, Expression::Cast { .. }));

        let Statement::ConstantDefinition(y) = statements[1] else {
            panic!()
        };
        assert!(matches!(y.expression, Expression::Bake { .. }));
    }

    #[test]
    fn parses_function_type_expressions() {
        let arena = Bump::new();
        let statements = parse(&arena, "F :: (i32, bool) -> i32;\nG :: () -> void;");

        // Unnamed parameter lists parse as function-type expressions.
        let Statement::ConstantDefinition(f) = statements[0] else {
            panic!()
        };
        let Expression::FunctionType { parameters, return_type, .. } = f.expression else {
            panic!("expected a function type, got {:?}", f.expression);
        };
        assert_eq!(parameters.len(), 2);
        assert!(return_type.is_some());

        // An empty signature with no body parses as a bodyless function
        // declaration, which also resolves to a function type.
        let Statement::FunctionDeclaration(g) = statements[1] else {
            panic!()
        };
        assert!(!g.has_body);
    }

    #[test]
    fn rejects_garbage() {
        let arena = Bump::new();
        assert!(parse_source(&arena, "t.mica", "main ::").is_err());
        assert!(parse_source(&arena, "t.mica", "x : = ;").is_err());
        assert!(parse_source(&arena, "t.mica", "#frobnicate;").is_err());
    }
}
