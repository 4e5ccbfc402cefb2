//! Pratt (precedence-climbing) expression parsing.
//!
//! Binding powers for an infix operator come in `(r_bp, l_bp)` pairs:
//! strictly decreasing pairs make the operator left-associative, strictly
//! increasing pairs right-associative. Higher numbers bind tighter.

use super::{ParseError, ParseResult, Parser};
use crate::ast::{BinaryOp, Constant, ExprKind, Expression, Fixity, UnaryOp};
use crate::lexer::{Token, TokenKind};

type Precedence = u16;

const PREFIX_BINDING_POWER: Precedence = 27;
const POSTFIX_BINDING_POWER: Precedence = 28;
/// Call arguments parse at the assignment right-hand binding power, so a
/// top-level `,` separates arguments instead of being the comma operator.
const ARGUMENT_BINDING_POWER: Precedence = 3;
/// The else arm of `?:` parses at the highest precedence so that
/// `a < b ? x = 1 : y = 2` groups as `(a < b ? x = 1 : y) = 2`, matching C.
const TERNARY_ELSE_BINDING_POWER: Precedence = 28;

fn infix_binding_power(op: BinaryOp) -> (Precedence, Precedence) {
    match op {
        BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => (26, 25),
        BinaryOp::Plus | BinaryOp::Minus => (24, 23),
        BinaryOp::LeftShift | BinaryOp::RightShift => (22, 21),
        BinaryOp::LessThan
        | BinaryOp::LessThanEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanEqual => (20, 19),
        BinaryOp::Equal | BinaryOp::NotEqual => (18, 17),
        BinaryOp::BitwiseAnd => (16, 15),
        BinaryOp::BitwiseXor => (14, 13),
        BinaryOp::BitwiseOr => (12, 11),
        BinaryOp::LogicalAnd => (10, 9),
        BinaryOp::LogicalOr => (8, 7),
        BinaryOp::Assign => (3, 4),
        BinaryOp::Comma => (2, 1),
    }
}

fn ternary_binding_power() -> (Precedence, Precedence) {
    (5, 6)
}

fn infix_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Asterisk => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::Modulo => BinaryOp::Modulo,
        TokenKind::Plus => BinaryOp::Plus,
        TokenKind::Dash => BinaryOp::Minus,
        TokenKind::LeftShift => BinaryOp::LeftShift,
        TokenKind::RightShift => BinaryOp::RightShift,
        TokenKind::LessThan => BinaryOp::LessThan,
        TokenKind::LessThanEqual => BinaryOp::LessThanEqual,
        TokenKind::GreaterThan => BinaryOp::GreaterThan,
        TokenKind::GreaterThanEqual => BinaryOp::GreaterThanEqual,
        TokenKind::EqualEqual => BinaryOp::Equal,
        TokenKind::NotEqual => BinaryOp::NotEqual,
        TokenKind::BitwiseAnd => BinaryOp::BitwiseAnd,
        TokenKind::BitwiseXor => BinaryOp::BitwiseXor,
        TokenKind::BitwiseOr => BinaryOp::BitwiseOr,
        TokenKind::LogicAnd => BinaryOp::LogicalAnd,
        TokenKind::LogicOr => BinaryOp::LogicalOr,
        TokenKind::Equals => BinaryOp::Assign,
        TokenKind::Comma => BinaryOp::Comma,
        _ => return None,
    })
}

/// The underlying operator of a compound-assignment token.
fn compound_assignment_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::PlusEquals => BinaryOp::Plus,
        TokenKind::MinusEquals => BinaryOp::Minus,
        TokenKind::TimesEquals => BinaryOp::Multiply,
        TokenKind::DivideEquals => BinaryOp::Divide,
        TokenKind::ModuloEquals => BinaryOp::Modulo,
        TokenKind::AndEquals => BinaryOp::BitwiseAnd,
        TokenKind::OrEquals => BinaryOp::BitwiseOr,
        TokenKind::XorEquals => BinaryOp::BitwiseXor,
        TokenKind::LeftShiftEquals => BinaryOp::LeftShift,
        TokenKind::RightShiftEquals => BinaryOp::RightShift,
        _ => return None,
    })
}

fn prefix_op(kind: TokenKind) -> Option<UnaryOp> {
    Some(match kind {
        TokenKind::PlusPlus => UnaryOp::Increment,
        TokenKind::DashDash => UnaryOp::Decrement,
        TokenKind::Plus => UnaryOp::Plus,
        TokenKind::Dash => UnaryOp::Minus,
        TokenKind::Bang => UnaryOp::LogicalNot,
        TokenKind::Tilde => UnaryOp::BitwiseNot,
        _ => return None,
    })
}

fn postfix_op(kind: TokenKind) -> Option<UnaryOp> {
    Some(match kind {
        TokenKind::PlusPlus => UnaryOp::Increment,
        TokenKind::DashDash => UnaryOp::Decrement,
        _ => return None,
    })
}

impl<'src> Parser<'src> {
    pub(crate) fn parse_expression(&mut self, min_bp: Precedence) -> ParseResult<Expression<()>> {
        let mut lhs = self.parse_prefix_expression()?;

        loop {
            let token = self.peek();
            if token.kind == TokenKind::Eof {
                break;
            }

            if token.kind == TokenKind::LeftParen {
                let name = match &lhs.kind {
                    ExprKind::Var(name) => name.clone(),
                    _ => return Err(ParseError::InvalidCallTarget { line: token.line }),
                };
                self.advance(); // consume `(`
                let mut args = vec![];
                while self.peek().kind != TokenKind::RightParen {
                    args.push(self.parse_expression(ARGUMENT_BINDING_POWER)?);
                    if self.peek().kind != TokenKind::Comma {
                        break;
                    }
                    self.advance(); // consume `,`
                }
                self.expect(TokenKind::RightParen, "`)` in function call")?;
                lhs = Expression::untyped(ExprKind::Call { name, args });
                continue;
            }

            if let Some(op) = postfix_op(token.kind) {
                if POSTFIX_BINDING_POWER < min_bp {
                    break;
                }
                self.advance();
                self.require_lvalue(&lhs, postfix_context(op), token)?;
                lhs = Expression::untyped(ExprKind::Unary {
                    fixity: Fixity::Postfix,
                    op,
                    operand: Box::new(lhs),
                });
                continue;
            }

            if let Some(op) = infix_op(token.kind) {
                let (r_bp, l_bp) = infix_binding_power(op);
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let rhs = self.parse_expression(r_bp)?;
                // plain assignment lvalues are validated during code
                // generation, so `a < b ? x = 1 : y = 2` still parses with
                // the C grouping before being rejected
                lhs = Expression::untyped(ExprKind::Binary {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                });
                continue;
            }

            if let Some(op) = compound_assignment_op(token.kind) {
                self.advance();
                self.require_lvalue(&lhs, "compound assignment", token)?;
                let rhs = self.parse_expression(min_bp)?;
                // `a op= b` becomes `a = (a op b)`; duplicating the lvalue
                // sub-tree is fine while only bare identifiers are
                // assignable
                let computed = Expression::untyped(ExprKind::Binary {
                    op,
                    left: Box::new(lhs.clone()),
                    right: Box::new(rhs),
                });
                lhs = Expression::untyped(ExprKind::Binary {
                    op: BinaryOp::Assign,
                    left: Box::new(lhs),
                    right: Box::new(computed),
                });
                continue;
            }

            if token.kind == TokenKind::QuestionMark {
                let (_r_bp, l_bp) = ternary_binding_power();
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let if_true = self.parse_expression(min_bp)?;
                self.expect(TokenKind::Colon, "`:` in ternary expression")?;
                let if_false = self.parse_expression(TERNARY_ELSE_BINDING_POWER)?;
                lhs = Expression::untyped(ExprKind::Ternary {
                    condition: Box::new(lhs),
                    if_true: Box::new(if_true),
                    if_false: Box::new(if_false),
                });
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    fn parse_prefix_expression(&mut self) -> ParseResult<Expression<()>> {
        let token = self.peek();
        match token.kind {
            TokenKind::Identifier => {
                self.advance();
                Ok(Expression::untyped(ExprKind::Var(
                    token.lexeme.to_owned(),
                )))
            }
            TokenKind::IntConstant => self.parse_int_constant(),
            TokenKind::DoubleConstant => self.parse_double_constant(),
            TokenKind::CharConstant => {
                self.advance();
                let byte = token.lexeme.as_bytes()[1] as i8;
                Ok(Expression::untyped(ExprKind::Constant(Constant::Char(
                    byte,
                ))))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                self.expect(TokenKind::RightParen, "`)`")?;
                Ok(Expression::untyped(ExprKind::Grouping(Box::new(inner))))
            }
            _ => {
                if let Some(op) = prefix_op(token.kind) {
                    self.advance();
                    let operand = self.parse_expression(PREFIX_BINDING_POWER)?;
                    if matches!(op, UnaryOp::Increment | UnaryOp::Decrement) {
                        self.require_lvalue(&operand, prefix_context(op), token)?;
                    }
                    return Ok(Expression::untyped(ExprKind::Unary {
                        fixity: Fixity::Prefix,
                        op,
                        operand: Box::new(operand),
                    }));
                }
                Err(ParseError::UnexpectedToken {
                    expected: "expression".to_owned(),
                    found: token.to_string(),
                    line: token.line,
                })
            }
        }
    }

    /// The parser's lvalue validator: the only assignable expression in this
    /// subset is a bare identifier (possibly wrapped in parentheses or the
    /// result of another assignment).
    fn require_lvalue(
        &self,
        expr: &Expression<()>,
        context: &'static str,
        token: Token<'src>,
    ) -> ParseResult<()> {
        if expr.lvalue_name().is_none() {
            return Err(ParseError::InvalidLvalue {
                context,
                line: token.line,
            });
        }
        Ok(())
    }

    /// Parse an integer-kinded constant, mapping the suffix to the value's
    /// type. The suffix length is derived from the trailing alphabetic bytes
    /// of the lexeme, which the lexer leaves in place.
    fn parse_int_constant(&mut self) -> ParseResult<Expression<()>> {
        let token = self.advance();
        let (digits, suffix) = split_suffix(token.lexeme);
        let invalid = || ParseError::InvalidConstant {
            kind: "integer",
            lexeme: token.lexeme.to_owned(),
            line: token.line,
        };

        let constant = match suffix.as_str() {
            "" => Constant::Int(digits.parse().map_err(|_| invalid())?),
            "u" => Constant::UnsignedInt(digits.parse().map_err(|_| invalid())?),
            "l" => Constant::Long(digits.parse().map_err(|_| invalid())?),
            "ul" | "lu" => Constant::UnsignedLong(digits.parse().map_err(|_| invalid())?),
            "ll" => Constant::LongLong(digits.parse().map_err(|_| invalid())?),
            "ull" | "llu" => Constant::UnsignedLongLong(digits.parse().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };
        Ok(Expression::untyped(ExprKind::Constant(constant)))
    }

    fn parse_double_constant(&mut self) -> ParseResult<Expression<()>> {
        let token = self.advance();
        let (digits, suffix) = split_suffix(token.lexeme);
        let invalid = || ParseError::InvalidConstant {
            kind: "floating-point",
            lexeme: token.lexeme.to_owned(),
            line: token.line,
        };

        let constant = match suffix.as_str() {
            "" => Constant::Double(digits.parse().map_err(|_| invalid())?),
            "f" => Constant::Float(digits.parse().map_err(|_| invalid())?),
            "l" => Constant::LongDouble(digits.parse().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };
        Ok(Expression::untyped(ExprKind::Constant(constant)))
    }
}

fn split_suffix(lexeme: &str) -> (&str, String) {
    let suffix_len = lexeme
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    let (digits, suffix) = lexeme.split_at(lexeme.len() - suffix_len);
    (digits, suffix.to_ascii_lowercase())
}

fn prefix_context(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Increment => "prefix `++`",
        _ => "prefix `--`",
    }
}

fn postfix_context(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Increment => "postfix `++`",
        _ => "postfix `--`",
    }
}
