//! Recursive-descent parser for the script subset.

use super::ast::*;
use super::lexer::{Lexer, TemplateChunk, Tok, Token};
use super::ScriptError;
use crate::error::SourcePosition;
use std::rc::Rc;

const RESERVED: &[&str] = &[
    "break", "case", "catch", "const", "continue", "default", "do", "else", "false", "finally",
    "for", "function", "if", "let", "new", "null", "return", "switch", "throw", "true", "try",
    "typeof", "var", "void", "while",
];

/// How deeply statements and expressions may nest. Chains such as `a + b + c`
/// or `a.b.c` count one level per link.
const MAX_NESTING_DEPTH: usize = 128;

/// Parse a whole script. Top-level `return` and `await` are allowed, since
/// scripts run as the body of an async function.
pub fn parse_script(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

fn parse_embedded_expression(
    source: &str,
    start: SourcePosition,
    depth: usize,
) -> Result<Expr, ScriptError> {
    let tokens = Lexer::starting_at(source, start).tokenize()?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth,
    };
    let expr = parser.expression()?;
    if !parser.at_eof() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn deepen(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ScriptError::syntax("too deeply nested", self.pos()));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `parse` one nesting level down.
    fn nested<T>(&mut self, parse: fn(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        self.deepen()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.index.min(last)]
    }

    fn peek_tok(&self, offset: usize) -> &Tok {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.index + offset).min(last)].tok
    }

    fn pos(&self) -> SourcePosition {
        self.current().pos
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().tok, Tok::Eof)
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.current().tok, Tok::Punct(p) if *p == punct)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.current().tok, Tok::Ident(name) if name == word)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ScriptError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ScriptError {
        let token = self.current();
        let message = match &token.tok {
            Tok::Eof => "Unexpected end of input".to_string(),
            Tok::Num(n) => format!("Unexpected number {}", n),
            Tok::Str(_) | Tok::Template(_) => "Unexpected string".to_string(),
            Tok::Ident(name) if RESERVED.contains(&name.as_str()) => {
                format!("Unexpected token '{}'", name)
            }
            Tok::Ident(name) => format!("Unexpected identifier '{}'", name),
            Tok::Punct(p) => format!("Unexpected token '{}'", p),
        };
        ScriptError::syntax(message, token.pos)
    }

    fn binding_name(&mut self) -> Result<String, ScriptError> {
        match &self.current().tok {
            Tok::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Automatic semicolon insertion, reduced to the cases scripts rely on.
    fn end_statement(&mut self) -> Result<(), ScriptError> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() {
            return Ok(());
        }
        if self.current().newline_before {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.nested(Self::statement_body)
    }

    fn statement_body(&mut self) -> Result<Stmt, ScriptError> {
        let pos = self.pos();
        let tok = self.current().tok.clone();
        let kind = match &tok {
            Tok::Punct("{") => StmtKind::Block(self.block()?),
            Tok::Punct(";") => {
                self.advance();
                StmtKind::Empty
            }
            Tok::Ident(word) => match word.as_str() {
                "let" | "const" | "var" => {
                    let kind = self.declaration()?;
                    self.end_statement()?;
                    kind
                }
                "function" => StmtKind::Function(self.function(false, true)?),
                "async" if matches!(self.peek_tok(1), Tok::Ident(w) if w == "function") => {
                    self.advance();
                    StmtKind::Function(self.function(true, true)?)
                }
                "return" => {
                    self.advance();
                    let value = if self.is_punct(";")
                        || self.is_punct("}")
                        || self.at_eof()
                        || self.current().newline_before
                    {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.end_statement()?;
                    StmtKind::Return(value)
                }
                "if" => self.if_statement()?,
                "while" => {
                    self.advance();
                    let test = self.parenthesized()?;
                    let body = Box::new(self.statement()?);
                    StmtKind::While { test, body }
                }
                "do" => {
                    self.advance();
                    let body = Box::new(self.statement()?);
                    if !self.eat_keyword("while") {
                        return Err(self.unexpected());
                    }
                    let test = self.parenthesized()?;
                    self.eat_punct(";");
                    StmtKind::DoWhile { body, test }
                }
                "for" => self.for_statement()?,
                "switch" => self.switch_statement()?,
                "break" => {
                    self.advance();
                    self.end_statement()?;
                    StmtKind::Break
                }
                "continue" => {
                    self.advance();
                    self.end_statement()?;
                    StmtKind::Continue
                }
                "throw" => {
                    self.advance();
                    if self.current().newline_before {
                        return Err(ScriptError::syntax("Illegal newline after throw", pos));
                    }
                    let value = self.expression()?;
                    self.end_statement()?;
                    StmtKind::Throw(value)
                }
                "try" => self.try_statement()?,
                _ => {
                    let expr = self.expression()?;
                    self.end_statement()?;
                    StmtKind::Expr(expr)
                }
            },
            _ => {
                let expr = self.expression()?;
                self.end_statement()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, pos })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parenthesized(&mut self) -> Result<Expr, ScriptError> {
        self.expect_punct("(")?;
        let expr = self.expression()?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    fn declaration(&mut self) -> Result<StmtKind, ScriptError> {
        let keyword = self.advance();
        let mutable = !matches!(&keyword.tok, Tok::Ident(w) if w == "const");
        let mut names = Vec::new();
        loop {
            let name_pos = self.pos();
            let name = self.binding_name()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else if !mutable {
                return Err(ScriptError::syntax(
                    "Missing initializer in const declaration",
                    name_pos,
                ));
            } else {
                None
            };
            names.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(StmtKind::Declare { mutable, names })
    }

    fn if_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.advance();
        let test = self.parenthesized()?;
        let then = Box::new(self.statement()?);
        let otherwise = if self.eat_keyword("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            test,
            then,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.advance();
        self.expect_punct("(")?;

        let declares = matches!(self.peek_tok(0), Tok::Ident(w) if w == "let" || w == "const" || w == "var");
        if declares && matches!(self.peek_tok(2), Tok::Ident(w) if w == "of") {
            let mutable = !self.is_keyword("const");
            self.advance();
            let name = self.binding_name()?;
            self.advance();
            let iterable = self.assignment()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(StmtKind::ForOf {
                mutable,
                name,
                iterable,
                body,
            });
        }

        let init = if self.is_punct(";") {
            None
        } else {
            let pos = self.pos();
            let kind = if declares {
                self.declaration()?
            } else {
                StmtKind::Expr(self.expression()?)
            };
            Some(Box::new(Stmt { kind, pos }))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn switch_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.advance();
        let discriminant = self.parenthesized()?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_keyword("case") {
                Some(self.expression()?)
            } else if self.eat_keyword("default") {
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !self.is_keyword("case") && !self.is_keyword("default") && !self.is_punct("}")
            {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(StmtKind::Switch {
            discriminant,
            cases,
        })
    }

    fn try_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.advance();
        let body = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_keyword("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_name()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_keyword("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(ScriptError::syntax("Missing catch or finally after try", self.pos()));
        }
        Ok(StmtKind::Try {
            body,
            param,
            handler,
            finalizer,
        })
    }

    /// Parses `function name?(params) { body }`; the `function` keyword is current.
    fn function(&mut self, is_async: bool, require_name: bool) -> Result<Rc<FunctionDef>, ScriptError> {
        let pos = self.pos();
        self.advance();
        let name = if matches!(self.peek_tok(0), Tok::Ident(_)) {
            Some(self.binding_name()?)
        } else if require_name {
            return Err(self.unexpected());
        } else {
            None
        };
        let params = self.parameters()?;
        let body = FunctionBody::Block(self.block()?);
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body,
            is_async,
            pos,
        }))
    }

    fn parameters(&mut self) -> Result<Vec<String>, ScriptError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            params.push(self.binding_name()?);
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(params)
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.assignment()
    }

    /// Whether the `(` at the cursor starts an arrow function's parameter list.
    fn at_arrow_parameters(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0;
        loop {
            match self.peek_tok(offset) {
                Tok::Punct("(") => depth += 1,
                Tok::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.peek_tok(offset + 1), Tok::Punct("=>"));
                    }
                }
                Tok::Eof => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    fn arrow_function(&mut self, is_async: bool) -> Result<Expr, ScriptError> {
        let pos = self.pos();
        let params = if self.is_punct("(") {
            self.parameters()?
        } else {
            vec![self.binding_name()?]
        };
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(self.assignment()?)
        };
        Ok(Expr {
            kind: ExprKind::Function(Rc::new(FunctionDef {
                name: None,
                params,
                body,
                is_async,
                pos,
            })),
            pos,
        })
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::assignment_body)
    }

    fn assignment_body(&mut self) -> Result<Expr, ScriptError> {
        if self.is_keyword("async") {
            let next_is_arrow = match self.peek_tok(1) {
                Tok::Ident(_) => matches!(self.peek_tok(2), Tok::Punct("=>")),
                Tok::Punct("(") => {
                    self.index += 1;
                    let arrow = self.at_arrow_parameters();
                    self.index -= 1;
                    arrow
                }
                _ => false,
            };
            if next_is_arrow {
                self.advance();
                return self.arrow_function(true);
            }
        }
        if matches!(self.peek_tok(0), Tok::Ident(name) if !RESERVED.contains(&name.as_str()))
            && matches!(self.peek_tok(1), Tok::Punct("=>"))
        {
            return self.arrow_function(false);
        }
        if self.is_punct("(") && self.at_arrow_parameters() {
            return self.arrow_function(false);
        }

        let target = self.conditional()?;
        let op = match &self.current().tok {
            Tok::Punct("=") => AssignOp::Assign,
            Tok::Punct("+=") => AssignOp::Add,
            Tok::Punct("-=") => AssignOp::Sub,
            Tok::Punct("*=") => AssignOp::Mul,
            Tok::Punct("/=") => AssignOp::Div,
            Tok::Punct("%=") => AssignOp::Rem,
            Tok::Punct("**=") => AssignOp::Pow,
            _ => return Ok(target),
        };
        if !is_assignable(&target) {
            return Err(ScriptError::syntax(
                "Invalid left-hand side in assignment",
                target.pos,
            ));
        }
        self.advance();
        let value = self.assignment()?;
        let pos = target.pos;
        Ok(Expr {
            kind: ExprKind::Assign(op, Box::new(target), Box::new(value)),
            pos,
        })
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let test = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        let pos = test.pos;
        Ok(Expr {
            kind: ExprKind::Conditional(Box::new(test), Box::new(consequent), Box::new(alternate)),
            pos,
        })
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut left = self.unary()?;
        loop {
            let Some((precedence, op)) = binary_operator(&self.current().tok) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            let op_pos = self.advance().pos;
            // `**` is right associative.
            let next_min = if matches!(op, Operator::Binary(BinaryOp::Pow)) {
                precedence
            } else {
                precedence + 1
            };
            let right = self.binary(next_min)?;
            let kind = match op {
                Operator::Binary(op) => ExprKind::Binary(op, Box::new(left), Box::new(right)),
                Operator::Logical(op) => ExprKind::Logical(op, Box::new(left), Box::new(right)),
            };
            left = Expr { kind, pos: op_pos };
            self.deepen()?;
        }
        self.depth = depth;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::unary_body)
    }

    fn unary_body(&mut self) -> Result<Expr, ScriptError> {
        let pos = self.pos();
        let op = match &self.current().tok {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Ident(w) if w == "typeof" => Some(UnaryOp::Typeof),
            Tok::Ident(w) if w == "void" => Some(UnaryOp::Void),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary(op, Box::new(operand)),
                pos,
            });
        }
        if self.is_keyword("await") {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr {
                kind: ExprKind::Await(Box::new(operand)),
                pos,
            });
        }
        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            self.advance();
            let target = self.unary()?;
            if !is_assignable(&target) {
                return Err(ScriptError::syntax(
                    "Invalid left-hand side expression in prefix operation",
                    target.pos,
                ));
            }
            return Ok(Expr {
                kind: ExprKind::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                },
                pos,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let expr = self.call_member()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.current().newline_before {
            let increment = self.is_punct("++");
            if !is_assignable(&expr) {
                return Err(ScriptError::syntax(
                    "Invalid left-hand side expression in postfix operation",
                    expr.pos,
                ));
            }
            self.advance();
            let pos = expr.pos;
            return Ok(Expr {
                kind: ExprKind::Update {
                    increment,
                    prefix: false,
                    target: Box::new(expr),
                },
                pos,
            });
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            args.push(self.assignment()?);
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn property_name(&mut self) -> Result<String, ScriptError> {
        match &self.current().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn call_member(&mut self) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut expr = if self.is_keyword("new") {
            let pos = self.advance().pos;
            let mut callee = self.primary()?;
            while self.is_punct(".") {
                self.advance();
                let name = self.property_name()?;
                let member_pos = callee.pos;
                callee = Expr {
                    kind: ExprKind::Member(Box::new(callee), name),
                    pos: member_pos,
                };
                self.deepen()?;
            }
            let args = if self.is_punct("(") {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr {
                kind: ExprKind::New(Box::new(callee), args),
                pos,
            }
        } else {
            self.primary()?
        };

        loop {
            if self.is_punct(".") {
                self.advance();
                let pos = self.pos();
                let name = self.property_name()?;
                expr = Expr {
                    kind: ExprKind::Member(Box::new(expr), name),
                    pos,
                };
            } else if self.is_punct("[") {
                let pos = self.advance().pos;
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr {
                    kind: ExprKind::Index(Box::new(expr), Box::new(index)),
                    pos,
                };
            } else if self.is_punct("(") {
                let pos = expr.pos;
                let args = self.arguments()?;
                expr = Expr {
                    kind: ExprKind::Call(Box::new(expr), args),
                    pos,
                };
            } else {
                self.depth = depth;
                return Ok(expr);
            }
            self.deepen()?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let pos = self.pos();
        let kind = match self.current().tok.clone() {
            Tok::Num(n) => {
                self.advance();
                ExprKind::Num(n)
            }
            Tok::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Tok::Template(chunks) => {
                self.advance();
                let mut parts = Vec::with_capacity(chunks.len());
                for chunk in chunks {
                    parts.push(match chunk {
                        TemplateChunk::Text(text) => TemplatePart::Text(text),
                        TemplateChunk::Code(code, start) => {
                            TemplatePart::Expr(parse_embedded_expression(&code, start, self.depth)?)
                        }
                    });
                }
                ExprKind::Template(parts)
            }
            Tok::Ident(word) => match word.as_str() {
                "true" => {
                    self.advance();
                    ExprKind::Bool(true)
                }
                "false" => {
                    self.advance();
                    ExprKind::Bool(false)
                }
                "null" => {
                    self.advance();
                    ExprKind::Null
                }
                "function" => ExprKind::Function(self.function(false, false)?),
                "async" if matches!(self.peek_tok(1), Tok::Ident(w) if w == "function") => {
                    self.advance();
                    ExprKind::Function(self.function(true, false)?)
                }
                _ if RESERVED.contains(&word.as_str()) => return Err(self.unexpected()),
                _ => {
                    self.advance();
                    ExprKind::Ident(word)
                }
            },
            Tok::Punct("(") => {
                self.advance();
                let expr = self.expression()?;
                self.expect_punct(")")?;
                return Ok(expr);
            }
            Tok::Punct("[") => {
                self.advance();
                let mut elements = Vec::new();
                while !self.eat_punct("]") {
                    elements.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        self.expect_punct("]")?;
                        break;
                    }
                }
                ExprKind::Array(elements)
            }
            Tok::Punct("{") => {
                self.advance();
                let mut properties = Vec::new();
                while !self.eat_punct("}") {
                    let key_pos = self.pos();
                    let (key, shorthand) = match &self.current().tok {
                        Tok::Ident(name) => (name.clone(), true),
                        Tok::Str(s) => (s.clone(), false),
                        Tok::Num(n) => (super::value::number_to_string(*n), false),
                        _ => return Err(self.unexpected()),
                    };
                    self.advance();
                    let value = if self.eat_punct(":") {
                        self.assignment()?
                    } else if shorthand && !RESERVED.contains(&key.as_str()) {
                        Expr {
                            kind: ExprKind::Ident(key.clone()),
                            pos: key_pos,
                        }
                    } else {
                        return Err(self.unexpected());
                    };
                    properties.push((key, value));
                    if !self.eat_punct(",") {
                        self.expect_punct("}")?;
                        break;
                    }
                }
                ExprKind::Object(properties)
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Expr { kind, pos })
    }
}

enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn binary_operator(tok: &Tok) -> Option<(u8, Operator)> {
    let Tok::Punct(p) = tok else {
        return None;
    };
    let entry = match *p {
        "??" => (1, Operator::Logical(LogicalOp::Nullish)),
        "||" => (2, Operator::Logical(LogicalOp::Or)),
        "&&" => (3, Operator::Logical(LogicalOp::And)),
        "==" => (4, Operator::Binary(BinaryOp::Eq)),
        "!=" => (4, Operator::Binary(BinaryOp::NotEq)),
        "===" => (4, Operator::Binary(BinaryOp::StrictEq)),
        "!==" => (4, Operator::Binary(BinaryOp::StrictNotEq)),
        "<" => (5, Operator::Binary(BinaryOp::Lt)),
        ">" => (5, Operator::Binary(BinaryOp::Gt)),
        "<=" => (5, Operator::Binary(BinaryOp::LtEq)),
        ">=" => (5, Operator::Binary(BinaryOp::GtEq)),
        "+" => (6, Operator::Binary(BinaryOp::Add)),
        "-" => (6, Operator::Binary(BinaryOp::Sub)),
        "*" => (7, Operator::Binary(BinaryOp::Mul)),
        "/" => (7, Operator::Binary(BinaryOp::Div)),
        "%" => (7, Operator::Binary(BinaryOp::Rem)),
        "**" => (8, Operator::Binary(BinaryOp::Pow)),
        _ => return None,
    };
    Some(entry)
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Ident(_) | ExprKind::Member(..) | ExprKind::Index(..)
    )
}
