//! Compile-time evaluation of static-initialiser expressions.
//!
//! A pure recursive evaluator over the expression tree. Only integer
//! arithmetic is supported; side-effecting operators, function calls,
//! identifier references and casts are rejected rather than evaluated.
//! Short-circuiting is unnecessary here: with all side-effecting constructs
//! rejected, fully evaluating both operands of `&&`/`||` is observationally
//! the same.

use thiserror::Error;

use crate::ast::{BinaryOp, Constant, ExprKind, Expression, UnaryOp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstEvalError {
    #[error("division by zero in compile-time expression")]
    DivisionByZero,
    #[error("assignment is not supported in compile-time expressions")]
    Assignment,
    #[error("`++` and `--` are not supported in compile-time expressions")]
    Increment,
    #[error("function calls are not supported in compile-time expressions")]
    FunctionCall,
    #[error("variable `{name}` referenced in compile-time expression; variables are not supported here")]
    VariableReference { name: String },
    #[error("casts are not supported in compile-time expressions")]
    Cast,
    #[error("only `int` operands are supported in compile-time expressions")]
    NonIntegerOperand,
    #[error("compile-time operands have different types")]
    MixedOperandTypes,
}

pub type ConstEvalResult<T> = Result<T, ConstEvalError>;

/// Fold an expression to a literal value. Works on any stage of the AST
/// since the attached info is never consulted.
pub fn evaluate<T>(expression: &Expression<T>) -> ConstEvalResult<Constant> {
    match &expression.kind {
        ExprKind::Grouping(inner) => evaluate(inner),
        ExprKind::Constant(value) => Ok(*value),
        ExprKind::Var(name) => Err(ConstEvalError::VariableReference { name: name.clone() }),
        ExprKind::Call { .. } => Err(ConstEvalError::FunctionCall),
        ExprKind::Convert(_) => Err(ConstEvalError::Cast),
        ExprKind::Unary { op, operand, .. } => {
            if matches!(op, UnaryOp::Increment | UnaryOp::Decrement) {
                return Err(ConstEvalError::Increment);
            }
            evaluate_unary(*op, evaluate(operand)?)
        }
        ExprKind::Binary { op, left, right } => {
            if *op == BinaryOp::Assign {
                return Err(ConstEvalError::Assignment);
            }
            evaluate_binary(*op, evaluate(left)?, evaluate(right)?)
        }
        ExprKind::Ternary {
            condition,
            if_true,
            if_false,
        } => {
            let condition = as_int(evaluate(condition)?)?;
            let if_true = evaluate(if_true)?;
            let if_false = evaluate(if_false)?;
            Ok(if condition != 0 { if_true } else { if_false })
        }
    }
}

fn as_int(value: Constant) -> ConstEvalResult<i32> {
    match value {
        Constant::Int(v) => Ok(v),
        _ => Err(ConstEvalError::NonIntegerOperand),
    }
}

fn evaluate_unary(op: UnaryOp, operand: Constant) -> ConstEvalResult<Constant> {
    let value = as_int(operand)?;
    let result = match op {
        UnaryOp::Plus => value,
        UnaryOp::Minus => value.wrapping_neg(),
        UnaryOp::LogicalNot => i32::from(value == 0),
        UnaryOp::BitwiseNot => !value,
        UnaryOp::Increment | UnaryOp::Decrement => return Err(ConstEvalError::Increment),
    };
    Ok(Constant::Int(result))
}

fn evaluate_binary(op: BinaryOp, left: Constant, right: Constant) -> ConstEvalResult<Constant> {
    let left = as_int(left)?;
    let right = match right {
        Constant::Int(value) => value,
        _ => return Err(ConstEvalError::MixedOperandTypes),
    };

    let result = match op {
        BinaryOp::Multiply => left.wrapping_mul(right),
        BinaryOp::Divide => {
            if right == 0 {
                return Err(ConstEvalError::DivisionByZero);
            }
            left.wrapping_div(right)
        }
        BinaryOp::Modulo => {
            if right == 0 {
                return Err(ConstEvalError::DivisionByZero);
            }
            left.wrapping_rem(right)
        }
        BinaryOp::Plus => left.wrapping_add(right),
        BinaryOp::Minus => left.wrapping_sub(right),
        BinaryOp::LeftShift => left.wrapping_shl(right as u32),
        BinaryOp::RightShift => left.wrapping_shr(right as u32),
        BinaryOp::LessThan => i32::from(left < right),
        BinaryOp::LessThanEqual => i32::from(left <= right),
        BinaryOp::GreaterThan => i32::from(left > right),
        BinaryOp::GreaterThanEqual => i32::from(left >= right),
        BinaryOp::Equal => i32::from(left == right),
        BinaryOp::NotEqual => i32::from(left != right),
        BinaryOp::BitwiseAnd => left & right,
        BinaryOp::BitwiseXor => left ^ right,
        BinaryOp::BitwiseOr => left | right,
        BinaryOp::LogicalAnd => i32::from(left != 0 && right != 0),
        BinaryOp::LogicalOr => i32::from(left != 0 || right != 0),
        // the left-hand value is discarded; evaluating it is still pointless
        // but harmless without side effects
        BinaryOp::Comma => right,
        BinaryOp::Assign => return Err(ConstEvalError::Assignment),
    };
    Ok(Constant::Int(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn eval(input: &str) -> ConstEvalResult<Constant> {
        let tokens = Lexer::new(input).lex().expect("lexes");
        let mut parser = Parser::new(tokens);
        let expr = parser.parse_expression(0).expect("parses");
        evaluate(&expr)
    }

    #[test]
    fn test_folds_arithmetic_with_precedence() {
        assert_eq!(eval("2 * 3 + 4"), Ok(Constant::Int(10)));
        assert_eq!(eval("2 + 3 * 4"), Ok(Constant::Int(14)));
        assert_eq!(eval("(2 + 3) * 4"), Ok(Constant::Int(20)));
    }

    #[test]
    fn test_folds_unary_operators() {
        assert_eq!(eval("-5"), Ok(Constant::Int(-5)));
        assert_eq!(eval("!5"), Ok(Constant::Int(0)));
        assert_eq!(eval("!0"), Ok(Constant::Int(1)));
        assert_eq!(eval("~0"), Ok(Constant::Int(-1)));
        assert_eq!(eval("+7"), Ok(Constant::Int(7)));
    }

    #[test]
    fn test_folds_comparisons_shifts_and_bitwise() {
        assert_eq!(eval("1 < 2"), Ok(Constant::Int(1)));
        assert_eq!(eval("2 <= 1"), Ok(Constant::Int(0)));
        assert_eq!(eval("1 << 4"), Ok(Constant::Int(16)));
        assert_eq!(eval("6 & 3"), Ok(Constant::Int(2)));
        assert_eq!(eval("6 ^ 3"), Ok(Constant::Int(5)));
        assert_eq!(eval("4 | 1"), Ok(Constant::Int(5)));
    }

    #[test]
    fn test_folds_logical_and_ternary() {
        assert_eq!(eval("1 && 0"), Ok(Constant::Int(0)));
        assert_eq!(eval("1 || 0"), Ok(Constant::Int(1)));
        assert_eq!(eval("1 ? 2 : 3"), Ok(Constant::Int(2)));
        assert_eq!(eval("0 ? 2 : 3"), Ok(Constant::Int(3)));
    }

    #[test]
    fn test_folds_comma_to_right_operand() {
        assert_eq!(eval("(1, 2)"), Ok(Constant::Int(2)));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1 / 0"), Err(ConstEvalError::DivisionByZero));
        assert_eq!(eval("1 % 0"), Err(ConstEvalError::DivisionByZero));
    }

    #[test]
    fn test_rejects_side_effects_and_calls() {
        assert_eq!(eval("f()"), Err(ConstEvalError::FunctionCall));
        assert_eq!(eval("++x"), Err(ConstEvalError::Increment));
        assert_eq!(eval("x = 1"), Err(ConstEvalError::Assignment));
    }

    #[test]
    fn test_rejects_identifier_references() {
        assert_eq!(
            eval("a + 1"),
            Err(ConstEvalError::VariableReference {
                name: "a".to_owned()
            })
        );
    }

    #[test]
    fn test_rejects_non_int_operands() {
        assert_eq!(eval("1.5 + 1.5"), Err(ConstEvalError::NonIntegerOperand));
        assert_eq!(eval("1l + 1l"), Err(ConstEvalError::NonIntegerOperand));
        assert_eq!(eval("1 + 1l"), Err(ConstEvalError::MixedOperandTypes));
    }

    #[test]
    fn test_plain_literal_of_any_kind_passes_through() {
        assert_eq!(eval("1.5"), Ok(Constant::Double(1.5)));
        assert_eq!(eval("'A'"), Ok(Constant::Char(65)));
    }
}
