//! Recursive descent parser for the textual goto-program format.
//!
//! Parsing lowers directly onto [`FunctionBuilder`]: labels, gotos and loop
//! numbering are resolved by the builder, so the parser only has to produce
//! statements and typed expressions. Local identifiers are qualified as
//! `function::name` so symbol names are unique program-wide.

use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use symgo_goto::{BuildError, FunctionBuilder, GotoProgram, SymbolTable};
use symgo_ir::{BinOp, Expr, ExprKind, ExprRef, Name, Type, TypeRef, UnOp};
use thiserror::Error;

/// Parser error.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected token at {span}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unexpected end of file at {span}")]
    UnexpectedEof { span: Span },
    #[error("invalid syntax at {span}: {message}")]
    InvalidSyntax { message: String, span: Span },
    #[error("unknown variable '{name}' at {span}")]
    UnknownVariable { name: String, span: Span },
    #[error("type mismatch at {span}: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        span: Span,
    },
    #[error("duplicate function '{name}' at {span}")]
    DuplicateFunction { name: String, span: Span },
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl ParseError {
    /// Get the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span } => *span,
            ParseError::InvalidSyntax { span, .. } => *span,
            ParseError::UnknownVariable { span, .. } => *span,
            ParseError::TypeMismatch { span, .. } => *span,
            ParseError::DuplicateFunction { span, .. } => *span,
            ParseError::Build(_) => Span::dummy(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a complete program from source text.
pub fn parse(source: &str) -> ParseResult<GotoProgram> {
    parse_named(source, "<input>")
}

/// Parse a complete program, recording `file` in instruction locations.
pub fn parse_named(source: &str, file: &str) -> ParseResult<GotoProgram> {
    Parser::new(source, file).parse_program()
}

/// Per-function scope: declared locals and parameters.
struct FunctionScope {
    function: Name,
    return_type: TypeRef,
    vars: ahash::AHashMap<String, (Name, TypeRef)>,
}

impl FunctionScope {
    fn new(function: Name, return_type: TypeRef) -> Self {
        FunctionScope {
            function,
            return_type,
            vars: ahash::AHashMap::new(),
        }
    }

    /// Register a local, returning its program-wide qualified name.
    fn declare(&mut self, name: &str, ty: TypeRef) -> Name {
        let qualified = Name::new(&format!("{}::{}", self.function, name));
        self.vars
            .insert(name.to_string(), (qualified.clone(), ty));
        qualified
    }

    fn lookup(&self, name: &str) -> Option<&(Name, TypeRef)> {
        self.vars.get(name)
    }
}

/// Parser for goto-program source text.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
}

impl Parser {
    pub fn new(source: &str, file: &str) -> Self {
        let tokens: Vec<_> = Lexer::new(source)
            .tokenize()
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .collect();
        Self {
            tokens,
            pos: 0,
            file: file.to_string(),
        }
    }

    /// Parse all functions in the input.
    pub fn parse_program(&mut self) -> ParseResult<GotoProgram> {
        let mut program = GotoProgram::new();
        while !self.is_at_end() {
            self.parse_function(&mut program)?;
        }
        Ok(program)
    }

    fn parse_function(&mut self, program: &mut GotoProgram) -> ParseResult<()> {
        self.expect(TokenKind::Fn)?;
        let name_span = self.current_span();
        let name = self.parse_ident()?;
        if program.function(&Name::new(&name)).is_some() {
            return Err(ParseError::DuplicateFunction {
                name,
                span: name_span,
            });
        }

        self.expect(TokenKind::LParen)?;
        let mut parameters = Vec::new();
        while self.peek_kind() != &TokenKind::RParen {
            if !parameters.is_empty() {
                self.expect(TokenKind::Comma)?;
            }
            let pname = self.parse_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            parameters.push((pname, ty));
        }
        self.expect(TokenKind::RParen)?;

        let return_type = if self.peek_kind() == &TokenKind::Arrow {
            self.advance();
            self.parse_type()?
        } else {
            Type::Empty.rc()
        };

        let fname = Name::new(&name);
        let mut scope = FunctionScope::new(fname.clone(), return_type.clone());
        let mut builder = FunctionBuilder::new(fname, return_type).file(self.file.as_str());
        for (pname, ty) in parameters {
            let qualified = scope.declare(&pname, ty.clone());
            program.symbols.insert(qualified.clone(), ty.clone());
            builder.parameter(qualified, ty);
        }

        self.expect(TokenKind::LBrace)?;
        while self.peek_kind() != &TokenKind::RBrace {
            if self.is_at_end() {
                return Err(ParseError::UnexpectedEof {
                    span: self.current_span(),
                });
            }
            self.parse_statement(&mut builder, &mut scope, &mut program.symbols)?;
        }
        self.expect(TokenKind::RBrace)?;

        program.add_function(builder.finish()?);
        Ok(())
    }

    fn parse_statement(
        &mut self,
        builder: &mut FunctionBuilder,
        scope: &mut FunctionScope,
        symbols: &mut SymbolTable,
    ) -> ParseResult<()> {
        builder.at_line(self.current_span().line);
        match self.peek_kind().clone() {
            TokenKind::Decl => {
                self.advance();
                let name = self.parse_ident()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                let qualified = scope.declare(&name, ty.clone());
                symbols.insert(qualified.clone(), ty.clone());
                builder.decl(qualified, ty);
            }
            TokenKind::Goto => {
                self.advance();
                let label = self.parse_ident()?;
                let condition = if self.peek_kind() == &TokenKind::If {
                    self.advance();
                    let span = self.current_span();
                    let cond = self.parse_expr(scope)?;
                    self.require_bool(&cond, span)?;
                    cond
                } else {
                    Expr::bool_const(true)
                };
                builder.goto_if(condition, Name::new(&label));
            }
            TokenKind::Assume => {
                self.advance();
                let span = self.current_span();
                let cond = self.parse_expr(scope)?;
                self.require_bool(&cond, span)?;
                builder.assume(cond);
            }
            TokenKind::Assert => {
                self.advance();
                let span = self.current_span();
                let cond = self.parse_expr(scope)?;
                self.require_bool(&cond, span)?;
                let message = if self.peek_kind() == &TokenKind::Comma {
                    self.advance();
                    self.parse_string()?
                } else {
                    "assertion".to_string()
                };
                builder.assert(cond, message);
            }
            TokenKind::Call => {
                self.advance();
                self.parse_call(builder, scope)?;
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.starts_expression() {
                    let span = self.current_span();
                    let value = self.parse_expr(scope)?;
                    let value = self.adapt(value, &scope.return_type);
                    if value.ty != scope.return_type {
                        return Err(ParseError::TypeMismatch {
                            expected: scope.return_type.to_string(),
                            actual: value.ty.to_string(),
                            span,
                        });
                    }
                    Some(value)
                } else {
                    None
                };
                builder.ret(value);
            }
            TokenKind::AtomicBegin => {
                self.advance();
                builder.atomic_begin();
            }
            TokenKind::AtomicEnd => {
                self.advance();
                builder.atomic_end();
            }
            TokenKind::Skip => {
                self.advance();
                builder.skip();
            }
            TokenKind::Output => {
                self.advance();
                let mut arguments = vec![self.parse_expr(scope)?];
                while self.peek_kind() == &TokenKind::Comma {
                    self.advance();
                    arguments.push(self.parse_expr(scope)?);
                }
                builder.output(arguments);
            }
            TokenKind::Throw => {
                self.advance();
                let tag = self.parse_ident()?;
                let value = if self.peek_kind() == &TokenKind::LParen {
                    self.advance();
                    let value = self.parse_expr(scope)?;
                    self.expect(TokenKind::RParen)?;
                    Some(value)
                } else {
                    None
                };
                builder.throw(Name::new(&tag), value);
            }
            TokenKind::Catch => {
                self.advance();
                let mut handlers = Vec::new();
                loop {
                    let tag = self.parse_ident()?;
                    self.expect(TokenKind::Arrow)?;
                    let label = self.parse_ident()?;
                    handlers.push((Name::new(&tag), Name::new(&label)));
                    if self.peek_kind() != &TokenKind::Comma {
                        break;
                    }
                    self.advance();
                }
                builder.catch(handlers);
            }
            TokenKind::Ident(name) => {
                // Label or assignment.
                if self.peek_ahead_kind(1) == &TokenKind::Colon {
                    self.advance();
                    self.advance();
                    builder.label(Name::new(&name));
                } else {
                    self.parse_assignment(builder, scope)?;
                }
            }
            TokenKind::Star => {
                self.parse_assignment(builder, scope)?;
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "statement".to_string(),
                    found: other.to_string(),
                    span: self.current_span(),
                });
            }
        }
        Ok(())
    }

    fn parse_assignment(
        &mut self,
        builder: &mut FunctionBuilder,
        scope: &mut FunctionScope,
    ) -> ParseResult<()> {
        let span = self.current_span();
        let lhs = self.parse_unary(scope)?;
        self.expect(TokenKind::ColonEq)?;
        let rhs = self.parse_expr(scope)?;
        let rhs = self.adapt(rhs, &lhs.ty);
        if lhs.ty != rhs.ty {
            return Err(ParseError::TypeMismatch {
                expected: lhs.ty.to_string(),
                actual: rhs.ty.to_string(),
                span,
            });
        }
        builder.assign(lhs, rhs);
        Ok(())
    }

    fn parse_call(
        &mut self,
        builder: &mut FunctionBuilder,
        scope: &mut FunctionScope,
    ) -> ParseResult<()> {
        // `call f(...)` or `call lvalue := f(...)`.
        let direct = matches!(self.peek_kind(), TokenKind::Ident(_))
            && self.peek_ahead_kind(1) == &TokenKind::LParen;
        let lhs = if direct {
            None
        } else {
            let lhs = self.parse_unary(scope)?;
            self.expect(TokenKind::ColonEq)?;
            Some(lhs)
        };

        let function = self.parse_ident()?;
        self.expect(TokenKind::LParen)?;
        let mut arguments = Vec::new();
        while self.peek_kind() != &TokenKind::RParen {
            if !arguments.is_empty() {
                self.expect(TokenKind::Comma)?;
            }
            arguments.push(self.parse_expr(scope)?);
        }
        self.expect(TokenKind::RParen)?;

        builder.call(lhs, Name::new(&function), arguments);
        Ok(())
    }

    /// Could the current token start an expression? Used to decide whether a
    /// `return` carries a value.
    fn starts_expression(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Integer(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Nondet
            | TokenKind::LParen
            | TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Tilde
            | TokenKind::Amp
            | TokenKind::Star => true,
            TokenKind::Ident(_) => {
                // An identifier followed by `:` is a label, by `:=` the start
                // of an assignment statement.
                !matches!(
                    self.peek_ahead_kind(1),
                    TokenKind::Colon | TokenKind::ColonEq
                )
            }
            _ => false,
        }
    }

    // === Expressions ===

    fn parse_expr(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        self.parse_implies(scope)
    }

    fn parse_implies(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        let lhs = self.parse_or(scope)?;
        if self.peek_kind() == &TokenKind::Implies {
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_implies(scope)?;
            self.require_bool(&lhs, span)?;
            self.require_bool(&rhs, span)?;
            return Ok(Expr::implies(lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        let mut lhs = self.parse_and(scope)?;
        while self.peek_kind() == &TokenKind::PipePipe {
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_and(scope)?;
            self.require_bool(&lhs, span)?;
            self.require_bool(&rhs, span)?;
            lhs = Expr::or(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        let mut lhs = self.parse_comparison(scope)?;
        while self.peek_kind() == &TokenKind::AmpAmp {
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_comparison(scope)?;
            self.require_bool(&lhs, span)?;
            self.require_bool(&rhs, span)?;
            lhs = Expr::and(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        let lhs = self.parse_bitor(scope)?;
        let op = match self.peek_kind() {
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::BangEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        let span = self.current_span();
        self.advance();
        let rhs = self.parse_bitor(scope)?;
        let (lhs, rhs) = self.unify(lhs, rhs, span)?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn parse_bitor(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        self.parse_left_assoc(scope, &[(TokenKind::Pipe, BinOp::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        self.parse_left_assoc(scope, &[(TokenKind::Caret, BinOp::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        self.parse_left_assoc(scope, &[(TokenKind::Amp, BinOp::BitAnd)], Self::parse_shift)
    }

    fn parse_shift(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        self.parse_left_assoc(
            scope,
            &[
                (TokenKind::Shl, BinOp::Shl),
                (TokenKind::UShr, BinOp::LShr),
                (TokenKind::Shr, BinOp::AShr),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        self.parse_left_assoc(
            scope,
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        self.parse_left_assoc(
            scope,
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Mod),
            ],
            Self::parse_cast,
        )
    }

    fn parse_left_assoc(
        &mut self,
        scope: &FunctionScope,
        ops: &[(TokenKind, BinOp)],
        next: fn(&mut Self, &FunctionScope) -> ParseResult<ExprRef>,
    ) -> ParseResult<ExprRef> {
        let mut lhs = next(self, scope)?;
        'outer: loop {
            for (token, op) in ops {
                if self.peek_kind() == token {
                    let span = self.current_span();
                    self.advance();
                    let rhs = next(self, scope)?;
                    let (l, r) = self.unify(lhs, rhs, span)?;
                    lhs = Expr::binary(*op, l, r);
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_cast(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        let mut value = self.parse_unary(scope)?;
        while self.peek_kind() == &TokenKind::As {
            self.advance();
            let ty = self.parse_type()?;
            value = Expr::typecast(value, ty);
        }
        Ok(value)
    }

    fn parse_unary(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::neg(self.parse_unary(scope)?))
            }
            TokenKind::Bang => {
                self.advance();
                let value = self.parse_unary(scope)?;
                self.require_bool(&value, span)?;
                Ok(Expr::not(value))
            }
            TokenKind::Tilde => {
                self.advance();
                Ok(Expr::unary(UnOp::BitNot, self.parse_unary(scope)?))
            }
            TokenKind::Amp => {
                self.advance();
                Ok(Expr::address_of(self.parse_unary(scope)?))
            }
            TokenKind::Star => {
                self.advance();
                let value = self.parse_unary(scope)?;
                if !value.ty.is_pointer() {
                    return Err(ParseError::TypeMismatch {
                        expected: "pointer".to_string(),
                        actual: value.ty.to_string(),
                        span,
                    });
                }
                Ok(Expr::dereference(value))
            }
            _ => self.parse_postfix(scope),
        }
    }

    fn parse_postfix(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        let mut value = self.parse_primary(scope)?;
        loop {
            match self.peek_kind() {
                TokenKind::LBracket => {
                    let span = self.current_span();
                    self.advance();
                    let index = self.parse_expr(scope)?;
                    self.expect(TokenKind::RBracket)?;
                    if !value.ty.is_array() {
                        return Err(ParseError::TypeMismatch {
                            expected: "array".to_string(),
                            actual: value.ty.to_string(),
                            span,
                        });
                    }
                    value = Expr::index(value, index);
                }
                TokenKind::Dot => {
                    let span = self.current_span();
                    self.advance();
                    let member = self.parse_ident()?;
                    let base_ty = value.ty.clone();
                    let Type::Struct { members, .. } = &*base_ty else {
                        return Err(ParseError::TypeMismatch {
                            expected: "struct".to_string(),
                            actual: value.ty.to_string(),
                            span,
                        });
                    };
                    let Some(m) = members.iter().find(|m| m.name.as_str() == member) else {
                        return Err(ParseError::InvalidSyntax {
                            message: format!("no member '{}' on {}", member, value.ty),
                            span,
                        });
                    };
                    let ty = m.ty.clone();
                    value = Expr::member(value, Name::new(&member), ty);
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_primary(&mut self, scope: &FunctionScope) -> ParseResult<ExprRef> {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Integer(value) => {
                self.advance();
                // Bare literals default to i32 and adapt to context later.
                Ok(Expr::int_const(value, Type::Signed { width: 32 }.rc()))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::bool_const(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::bool_const(false))
            }
            TokenKind::Nondet => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let ty = self.parse_type()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::nondet(ty))
            }
            TokenKind::LParen => {
                self.advance();
                let value = self.parse_expr(scope)?;
                self.expect(TokenKind::RParen)?;
                Ok(value)
            }
            TokenKind::Ident(name) => {
                self.advance();
                match scope.lookup(&name) {
                    Some((qualified, ty)) => Ok(Expr::symbol(qualified.clone(), ty.clone())),
                    None => Err(ParseError::UnknownVariable { name, span }),
                }
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: other.to_string(),
                span,
            }),
        }
    }

    // === Types ===

    fn parse_type(&mut self) -> ParseResult<TypeRef> {
        let span = self.current_span();
        let name = self.parse_ident()?;
        let mut ty = match name.as_str() {
            "bool" => Type::Bool.rc(),
            "fixed" => {
                self.expect(TokenKind::LParen)?;
                let width = self.parse_integer()? as u32;
                self.expect(TokenKind::Comma)?;
                let integer_bits = self.parse_integer()? as u32;
                self.expect(TokenKind::RParen)?;
                if integer_bits > width {
                    return Err(ParseError::InvalidSyntax {
                        message: format!(
                            "fixed({}, {}) has more integer bits than total bits",
                            width, integer_bits
                        ),
                        span,
                    });
                }
                Type::Fixedbv {
                    width,
                    integer_bits,
                }
                .rc()
            }
            "ptr" => {
                self.expect(TokenKind::Lt)?;
                let pointee = self.parse_type()?;
                self.expect(TokenKind::Gt)?;
                Type::Pointer { pointee }.rc()
            }
            other => match parse_bv_type(other) {
                Some(ty) => ty,
                // Unknown names become forward references resolved through
                // the symbol table.
                None => Type::Symbolic {
                    name: Name::new(other),
                }
                .rc(),
            },
        };

        // Array suffixes: `i32[4][2]` nests outside-in.
        while self.peek_kind() == &TokenKind::LBracket {
            self.advance();
            let size = self.parse_integer()?;
            self.expect(TokenKind::RBracket)?;
            ty = Type::Array {
                element: ty,
                size: Some(Expr::int_const(size, Type::Signed { width: 32 }.rc())),
                infinite: false,
            }
            .rc();
        }

        Ok(ty)
    }

    // === Literal adaptation ===

    /// Retype an all-literal integer subtree to `target` (the type of the
    /// other operand or of the assignment destination).
    fn adapt(&self, e: ExprRef, target: &TypeRef) -> ExprRef {
        if e.ty != *target && target.is_bv() && is_pure_int_literal(&e) {
            retype_literal(&e, target)
        } else {
            e
        }
    }

    /// Make both operands of a binary operator agree on a type, adapting
    /// whichever side is a pure literal.
    fn unify(
        &self,
        lhs: ExprRef,
        rhs: ExprRef,
        span: Span,
    ) -> ParseResult<(ExprRef, ExprRef)> {
        if lhs.ty == rhs.ty {
            return Ok((lhs, rhs));
        }
        let rhs_adapted = self.adapt(rhs, &lhs.ty);
        if lhs.ty == rhs_adapted.ty {
            return Ok((lhs, rhs_adapted));
        }
        let lhs_adapted = self.adapt(lhs, &rhs_adapted.ty);
        if lhs_adapted.ty == rhs_adapted.ty {
            return Ok((lhs_adapted, rhs_adapted));
        }
        Err(ParseError::TypeMismatch {
            expected: lhs_adapted.ty.to_string(),
            actual: rhs_adapted.ty.to_string(),
            span,
        })
    }

    fn require_bool(&self, e: &ExprRef, span: Span) -> ParseResult<()> {
        if e.ty.is_bool() {
            Ok(())
        } else {
            Err(ParseError::TypeMismatch {
                expected: "bool".to_string(),
                actual: e.ty.to_string(),
                span,
            })
        }
    }

    // === Token plumbing ===

    fn peek_kind(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_ahead_kind(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.peek_kind() == &kind {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind.to_string(),
                found: self.peek_kind().to_string(),
                span: self.current_span(),
            })
        }
    }

    fn parse_ident(&mut self) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "identifier".to_string(),
                found: other.to_string(),
                span: self.current_span(),
            }),
        }
    }

    fn parse_integer(&mut self) -> ParseResult<i128> {
        match *self.peek_kind() {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(value)
            }
            ref other => Err(ParseError::UnexpectedToken {
                expected: "integer".to_string(),
                found: other.to_string(),
                span: self.current_span(),
            }),
        }
    }

    fn parse_string(&mut self) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Str(value) => {
                self.advance();
                Ok(value)
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "string".to_string(),
                found: other.to_string(),
                span: self.current_span(),
            }),
        }
    }
}

/// Recognise `i8`..`i64`/`u8`..`u64` style bitvector type names.
fn parse_bv_type(name: &str) -> Option<TypeRef> {
    let (signed, rest) = match name.split_at(1) {
        ("i", rest) => (true, rest),
        ("u", rest) => (false, rest),
        _ => return None,
    };
    let width: u32 = rest.parse().ok()?;
    if width == 0 || width > 128 {
        return None;
    }
    Some(if signed {
        Type::Signed { width }.rc()
    } else {
        Type::Unsigned { width }.rc()
    })
}

/// A subtree made only of integer literals and arithmetic over them; such a
/// tree may be retyped wholesale to match its context.
fn is_pure_int_literal(e: &ExprRef) -> bool {
    match &e.kind {
        ExprKind::IntConst(_) => true,
        ExprKind::Unary {
            op: UnOp::Neg | UnOp::BitNot,
            value,
        } => is_pure_int_literal(value),
        ExprKind::Binary { op, lhs, rhs } if !op.is_relational() && !op.is_connective() => {
            is_pure_int_literal(lhs) && is_pure_int_literal(rhs)
        }
        _ => false,
    }
}

fn retype_literal(e: &ExprRef, ty: &TypeRef) -> ExprRef {
    match &e.kind {
        ExprKind::IntConst(v) => Expr::int_const(symgo_ir::normalise(ty, *v), ty.clone()),
        ExprKind::Unary { op, value } => Expr::unary(*op, retype_literal(value, ty)),
        ExprKind::Binary { op, lhs, rhs } => {
            Expr::binary(*op, retype_literal(lhs, ty), retype_literal(rhs, ty))
        }
        _ => e.clone(),
    }
}
