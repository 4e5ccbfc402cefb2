//! Type checking for validated programs.
//!
//! Walks expressions bottom-up, computing the type of every node and
//! materialising implicit conversions as explicit `Convert` nodes, so the
//! back end never has to widen on its own. Statement-level rules convert
//! `return` values and declaration initialisers to their target types.

use thiserror::Error;

use crate::ast::{
    BinaryOp, BlockItem, CompoundStatement, Declaration, ExprKind, Expression,
    FunctionDefinition, Statement, TypeCategory, TypeDesc, UnaryOp, ValidatedItem,
    ValidatedProgram,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("unsupported operand types for `{op}`: [{left}] and [{right}]")]
    UnsupportedOperands {
        op: String,
        left: String,
        right: String,
    },
    #[error("`{op}` requires an integer operand, found [{ty}]")]
    IntegerOperandRequired { op: String, ty: String },
    #[error("cannot convert from type [{from}] to type [{to}]")]
    NotConvertible { from: String, to: String },
    #[error("condition of ternary expression has type [{ty}], which is not truthy")]
    TernaryConditionNotTruthy { ty: String },
    #[error("user casts are not supported")]
    UnsupportedCast,
    #[error("expression was not typed during name resolution")]
    MissingResolvedType,
}

pub type TypeResult<T> = Result<T, TypeError>;

pub fn check(
    program: ValidatedProgram<Option<TypeDesc>>,
) -> TypeResult<ValidatedProgram<TypeDesc>> {
    let items = program
        .items
        .into_iter()
        .map(|item| match item {
            ValidatedItem::Function(def) => Ok(ValidatedItem::Function(check_function(def)?)),
            ValidatedItem::Global(global) => Ok(ValidatedItem::Global(global)),
        })
        .collect::<TypeResult<Vec<_>>>()?;
    Ok(ValidatedProgram { items })
}

fn check_function(
    def: FunctionDefinition<Option<TypeDesc>>,
) -> TypeResult<FunctionDefinition<TypeDesc>> {
    let return_type = def.return_type.clone();
    Ok(FunctionDefinition {
        return_type: def.return_type,
        name: def.name,
        params: def.params,
        body: check_compound(def.body, &return_type)?,
    })
}

fn check_compound(
    block: CompoundStatement<Option<TypeDesc>>,
    return_type: &TypeDesc,
) -> TypeResult<CompoundStatement<TypeDesc>> {
    let items = block
        .items
        .into_iter()
        .map(|item| match item {
            BlockItem::Statement(stmt) => {
                Ok(BlockItem::Statement(check_statement(stmt, return_type)?))
            }
            BlockItem::Declaration(decl) => Ok(BlockItem::Declaration(check_declaration(decl)?)),
        })
        .collect::<TypeResult<Vec<_>>>()?;
    Ok(CompoundStatement { items })
}

fn check_statement(
    statement: Statement<Option<TypeDesc>>,
    return_type: &TypeDesc,
) -> TypeResult<Statement<TypeDesc>> {
    Ok(match statement {
        Statement::Return(expr) => {
            let expr = check_expression(expr)?;
            if !convertible(return_type, &expr.info) {
                return Err(TypeError::NotConvertible {
                    from: expr.info.name.clone(),
                    to: return_type.name.clone(),
                });
            }
            Statement::Return(convert_if_needed(expr, return_type))
        }
        Statement::Expression(expr) => {
            Statement::Expression(expr.map(check_expression).transpose()?)
        }
        Statement::If {
            condition,
            then_branch,
            else_branch,
        } => Statement::If {
            condition: check_expression(condition)?,
            then_branch: Box::new(check_statement(*then_branch, return_type)?),
            else_branch: else_branch
                .map(|stmt| check_statement(*stmt, return_type).map(Box::new))
                .transpose()?,
        },
        Statement::Compound(block) => Statement::Compound(check_compound(block, return_type)?),
    })
}

fn check_declaration(
    decl: Declaration<Option<TypeDesc>>,
) -> TypeResult<Declaration<TypeDesc>> {
    let init = match decl.init {
        Some(init) => {
            let init = check_expression(init)?;
            if !convertible(&decl.ty, &init.info) {
                return Err(TypeError::NotConvertible {
                    from: init.info.name.clone(),
                    to: decl.ty.name.clone(),
                });
            }
            Some(convert_if_needed(init, &decl.ty))
        }
        None => None,
    };
    Ok(Declaration {
        ty: decl.ty,
        name: decl.name,
        init,
    })
}

fn check_expression(expr: Expression<Option<TypeDesc>>) -> TypeResult<Expression<TypeDesc>> {
    match expr.kind {
        ExprKind::Grouping(inner) => {
            let inner = check_expression(*inner)?;
            let ty = inner.info.clone();
            Ok(Expression::new(ExprKind::Grouping(Box::new(inner)), ty))
        }
        ExprKind::Constant(value) => {
            let ty = value.type_desc();
            Ok(Expression::new(ExprKind::Constant(value), ty))
        }
        ExprKind::Var(name) => {
            let ty = expr.info.ok_or(TypeError::MissingResolvedType)?;
            Ok(Expression::new(ExprKind::Var(name), ty))
        }
        ExprKind::Call { name, args } => {
            let ty = expr.info.ok_or(TypeError::MissingResolvedType)?;
            let args = args
                .into_iter()
                .map(check_expression)
                .collect::<TypeResult<Vec<_>>>()?;
            Ok(Expression::new(ExprKind::Call { name, args }, ty))
        }
        ExprKind::Convert(_) => Err(TypeError::UnsupportedCast),
        ExprKind::Unary {
            fixity,
            op,
            operand,
        } => {
            let operand = check_expression(*operand)?;
            let ty = match op {
                UnaryOp::Increment | UnaryOp::Decrement | UnaryOp::BitwiseNot => {
                    if !operand.info.category.is_integer() {
                        return Err(TypeError::IntegerOperandRequired {
                            op: op.to_string(),
                            ty: operand.info.name.clone(),
                        });
                    }
                    operand.info.clone()
                }
                // every supported category is numeric
                UnaryOp::Plus | UnaryOp::Minus => operand.info.clone(),
                UnaryOp::LogicalNot => TypeDesc::int(),
            };
            Ok(Expression::new(
                ExprKind::Unary {
                    fixity,
                    op,
                    operand: Box::new(operand),
                },
                ty,
            ))
        }
        ExprKind::Binary { op, left, right } => {
            let left = check_expression(*left)?;
            let right = check_expression(*right)?;
            check_binary(op, left, right)
        }
        ExprKind::Ternary {
            condition,
            if_true,
            if_false,
        } => {
            let condition = check_expression(*condition)?;
            if !convertible(&condition.info, &TypeDesc::int()) {
                return Err(TypeError::TernaryConditionNotTruthy {
                    ty: condition.info.name.clone(),
                });
            }
            let if_true = check_expression(*if_true)?;
            let if_false = check_expression(*if_false)?;
            let (if_true, if_false, ty) = widen_to_common(if_true, if_false, "?:")?;
            Ok(Expression::new(
                ExprKind::Ternary {
                    condition: Box::new(condition),
                    if_true: Box::new(if_true),
                    if_false: Box::new(if_false),
                },
                ty,
            ))
        }
    }
}

fn check_binary(
    op: BinaryOp,
    left: Expression<TypeDesc>,
    right: Expression<TypeDesc>,
) -> TypeResult<Expression<TypeDesc>> {
    let (left, right, ty) = match op {
        BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Plus | BinaryOp::Minus => {
            widen_to_common(left, right, op)?
        }

        BinaryOp::Modulo => {
            require_integer_operands(op, &left, &right)?;
            widen_to_common(left, right, op)?
        }

        // bitwise operators take the left operand's type; no widening is
        // synthesised for the right operand
        BinaryOp::LeftShift
        | BinaryOp::RightShift
        | BinaryOp::BitwiseAnd
        | BinaryOp::BitwiseXor
        | BinaryOp::BitwiseOr => {
            require_integer_operands(op, &left, &right)?;
            let ty = left.info.clone();
            (left, right, ty)
        }

        BinaryOp::LessThan
        | BinaryOp::LessThanEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanEqual
        | BinaryOp::Equal
        | BinaryOp::NotEqual => {
            let (left, right, _) = widen_to_common(left, right, op)?;
            (left, right, TypeDesc::int())
        }

        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
            let int = TypeDesc::int();
            let left = convert_if_needed(left, &int);
            let right = convert_if_needed(right, &int);
            (left, right, int)
        }

        BinaryOp::Assign => {
            if !convertible(&left.info, &right.info) {
                return Err(TypeError::NotConvertible {
                    from: right.info.name.clone(),
                    to: left.info.name.clone(),
                });
            }
            let ty = left.info.clone();
            let right = convert_if_needed(right, &ty);
            (left, right, ty)
        }

        BinaryOp::Comma => {
            // deliberately tighter than standard C, which places no
            // convertibility requirement on the discarded operand
            if !convertible(&left.info, &right.info) {
                return Err(TypeError::NotConvertible {
                    from: left.info.name.clone(),
                    to: right.info.name.clone(),
                });
            }
            let ty = right.info.clone();
            (left, right, ty)
        }
    };

    Ok(Expression::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        ty,
    ))
}

/// Convertibility: identical canonical names, or an INT↔DOUBLE category
/// pair. (Typedef aliases would extend this once they exist.)
fn convertible(a: &TypeDesc, b: &TypeDesc) -> bool {
    a == b
        || (a.category == TypeCategory::Double && b.category == TypeCategory::Int)
        || (a.category == TypeCategory::Int && b.category == TypeCategory::Double)
}

fn convert_if_needed(expr: Expression<TypeDesc>, target: &TypeDesc) -> Expression<TypeDesc> {
    if expr.info == *target {
        return expr;
    }
    Expression::new(ExprKind::Convert(Box::new(expr)), target.clone())
}

/// The arithmetic widening rule. Operands of the same type pass through;
/// same-category operands widen the narrower side (the left side wins ties
/// between equally sized types of different names); an INT/DOUBLE pair
/// converts the integer side. Anything else is an operand-type error.
fn widen_to_common(
    left: Expression<TypeDesc>,
    right: Expression<TypeDesc>,
    op: impl ToString,
) -> TypeResult<(Expression<TypeDesc>, Expression<TypeDesc>, TypeDesc)> {
    use TypeCategory::*;

    if left.info == right.info {
        let ty = left.info.clone();
        return Ok((left, right, ty));
    }

    if left.info.category == right.info.category {
        return Ok(if left.info.size >= right.info.size {
            let ty = left.info.clone();
            let right = convert_if_needed(right, &ty);
            (left, right, ty)
        } else {
            let ty = right.info.clone();
            let left = convert_if_needed(left, &ty);
            (left, right, ty)
        });
    }

    match (left.info.category, right.info.category) {
        (Double, Int) => {
            let ty = left.info.clone();
            let right = convert_if_needed(right, &ty);
            Ok((left, right, ty))
        }
        (Int, Double) => {
            let ty = right.info.clone();
            let left = convert_if_needed(left, &ty);
            Ok((left, right, ty))
        }
        _ => Err(TypeError::UnsupportedOperands {
            op: op.to_string(),
            left: left.info.name.clone(),
            right: right.info.name.clone(),
        }),
    }
}

fn require_integer_operands(
    op: BinaryOp,
    left: &Expression<TypeDesc>,
    right: &Expression<TypeDesc>,
) -> TypeResult<()> {
    for side in [left, right] {
        if !side.info.category.is_integer() {
            return Err(TypeError::IntegerOperandRequired {
                op: op.to_string(),
                ty: side.info.name.clone(),
            });
        }
    }
    Ok(())
}
