use std::str::FromStr;

use intake_core::Value;
use rust_decimal::Decimal;

use crate::ast::{BinaryOp, Expr, Function, UnaryOp};
use crate::errors::RuleCompilationError;
use crate::lexer::{SpannedToken, Token, tokenize};

/// Maximum nesting depth for parenthesised groups, calls and unary chains.
pub const MAX_NESTING: usize = 32;

/// Maximum height of the tree built from chained binary operators.
///
/// `a AND b AND c` nests to the left, so a long flat chain is as deep as
/// it is long.
pub const MAX_DEPTH: usize = 128;

/// Parse a rule expression into an AST.
///
/// Only syntax, the function whitelist and arity are checked here; field
/// references and types are resolved by the compiler.
pub fn parse_expression(input: &str) -> Result<Expr, RuleCompilationError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        nesting: 0,
        call_sites: 0,
    };
    let expr = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    index: usize,
    nesting: usize,
    call_sites: usize,
}

impl Parser {
    fn parse_or(&mut self) -> Result<Expr, RuleCompilationError> {
        let mut left = self.parse_and()?;
        let mut depth = left.depth();
        while self.current().token == Token::Or {
            let position = self.advance_position();
            let right = self.parse_and()?;
            depth = chain_depth(depth, &right, position)?;
            left = binary(BinaryOp::Or, left, right, position);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, RuleCompilationError> {
        let mut left = self.parse_not()?;
        let mut depth = left.depth();
        while self.current().token == Token::And {
            let position = self.advance_position();
            let right = self.parse_not()?;
            depth = chain_depth(depth, &right, position)?;
            left = binary(BinaryOp::And, left, right, position);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, RuleCompilationError> {
        if self.current().token == Token::Not {
            let position = self.advance_position();
            let expr = self.with_nesting(position, |parser| parser.parse_not())?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
                position,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, RuleCompilationError> {
        let left = self.parse_sum()?;
        let op = match self.current().token {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Gt => BinaryOp::Gt,
            Token::Le => BinaryOp::Le,
            Token::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        let position = self.advance_position();
        let right = self.parse_sum()?;
        chain_depth(left.depth(), &right, position)?;
        Ok(binary(op, left, right, position))
    }

    fn parse_sum(&mut self) -> Result<Expr, RuleCompilationError> {
        let mut left = self.parse_product()?;
        let mut depth = left.depth();
        loop {
            let op = match self.current().token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            let position = self.advance_position();
            let right = self.parse_product()?;
            depth = chain_depth(depth, &right, position)?;
            left = binary(op, left, right, position);
        }
    }

    fn parse_product(&mut self) -> Result<Expr, RuleCompilationError> {
        let mut left = self.parse_unary()?;
        let mut depth = left.depth();
        loop {
            let op = match self.current().token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            let position = self.advance_position();
            let right = self.parse_unary()?;
            depth = chain_depth(depth, &right, position)?;
            left = binary(op, left, right, position);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, RuleCompilationError> {
        if self.current().token == Token::Minus {
            let position = self.advance_position();
            let expr = self.with_nesting(position, |parser| parser.parse_unary())?;
            return Ok(match expr {
                Expr::Literal(Value::Number(number)) => Expr::Literal(Value::Number(-number)),
                expr => Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(expr),
                    position,
                },
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, RuleCompilationError> {
        let SpannedToken { token, position } = self.current().clone();
        match token {
            Token::Number(raw) => {
                self.advance();
                let normalized = if raw.starts_with('.') {
                    format!("0{raw}")
                } else {
                    raw.clone()
                };
                let number = Decimal::from_str(&normalized)
                    .map_err(|_| RuleCompilationError::InvalidNumber { raw, position })?;
                Ok(Expr::Literal(Value::Number(number)))
            }
            Token::Text(text) => {
                self.advance();
                Ok(Expr::Literal(Value::Text(text)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            Token::Ident(name) => {
                self.advance();
                if self.current().token == Token::LParen {
                    self.advance();
                    self.with_nesting(position, |parser| parser.parse_call(&name, position))
                } else {
                    Ok(Expr::Field { name, position })
                }
            }
            Token::LParen => {
                self.advance();
                self.with_nesting(position, |parser| {
                    let expr = parser.parse_or()?;
                    parser.expect(Token::RParen, "`)`")?;
                    Ok(expr)
                })
            }
            other => Err(RuleCompilationError::UnexpectedToken {
                expected: "field, literal, function call or `(`",
                found: other.describe(),
                position,
            }),
        }
    }

    fn parse_call(&mut self, name: &str, position: usize) -> Result<Expr, RuleCompilationError> {
        let function =
            Function::from_name(name).ok_or_else(|| RuleCompilationError::UnknownFunction {
                name: name.to_string(),
                position,
            })?;

        let mut args = Vec::new();
        if self.current().token == Token::RParen {
            self.advance();
        } else {
            loop {
                args.push(self.parse_or()?);
                if self.current().token == Token::Comma {
                    self.advance();
                    continue;
                }
                self.expect(Token::RParen, "`,` or `)` after argument")?;
                break;
            }
        }

        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(RuleCompilationError::Arity {
                function: function.name(),
                expected: function.arity_label(),
                found: args.len(),
            });
        }

        let call_site = self.call_sites;
        self.call_sites += 1;
        Ok(Expr::Call {
            function,
            args,
            call_site,
            position,
        })
    }

    fn with_nesting<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<T, RuleCompilationError>,
    ) -> Result<T, RuleCompilationError> {
        if self.nesting + 1 > MAX_NESTING {
            return Err(RuleCompilationError::NestingTooDeep {
                max: MAX_NESTING,
                position,
            });
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), RuleCompilationError> {
        if self.current().token == token {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_eof(&self) -> Result<(), RuleCompilationError> {
        if self.current().token == Token::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn unexpected(&self, expected: &'static str) -> RuleCompilationError {
        RuleCompilationError::UnexpectedToken {
            expected,
            found: self.current().token.describe(),
            position: self.current().position,
        }
    }

    fn current(&self) -> &SpannedToken {
        // The lexer always terminates the stream with Eof and `advance` never
        // moves past it.
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }

    /// Consume the current token and return its position.
    fn advance_position(&mut self) -> usize {
        let position = self.current().position;
        self.advance();
        position
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, position: usize) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        position,
    }
}

fn chain_depth(left: usize, right: &Expr, position: usize) -> Result<usize, RuleCompilationError> {
    let depth = 1 + left.max(right.depth());
    if depth > MAX_DEPTH {
        return Err(RuleCompilationError::NestingTooDeep {
            max: MAX_DEPTH,
            position,
        });
    }
    Ok(depth)
}
