//! Display impls for the AST.
//!
//! Expressions print fully parenthesised, so the output makes the parsed
//! grouping explicit; this is what `--emit-ast` shows and what the
//! precedence tests compare against.

use std::fmt::{self, Display, Formatter};

use super::expression::{BinaryOp, ExprKind, Expression, Fixity, UnaryOp};
use super::statement::{
    BlockItem, CompoundStatement, Declaration, FunctionDeclaration, FunctionDefinition, Program,
    Statement, TopLevelItem,
};

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Increment => "++",
            UnaryOp::Decrement => "--",
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::LogicalNot => "!",
            UnaryOp::BitwiseNot => "~",
        })
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanEqual => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::BitwiseAnd => "&",
            BinaryOp::BitwiseXor => "^",
            BinaryOp::BitwiseOr => "|",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Assign => "=",
            BinaryOp::Comma => ",",
        })
    }
}

impl<T> Display for Expression<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Grouping(inner) => write!(f, "({inner})"),
            ExprKind::Constant(value) => write!(f, "{value}"),
            ExprKind::Var(name) => f.write_str(name),
            ExprKind::Unary {
                fixity: Fixity::Prefix,
                op,
                operand,
            } => write!(f, "({op}{operand})"),
            ExprKind::Unary {
                fixity: Fixity::Postfix,
                op,
                operand,
            } => write!(f, "({operand}{op})"),
            ExprKind::Binary {
                op: BinaryOp::Comma,
                left,
                right,
            } => write!(f, "({left}, {right})"),
            ExprKind::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            ExprKind::Ternary {
                condition,
                if_true,
                if_false,
            } => write!(f, "({condition} ? {if_true} : {if_false})"),
            ExprKind::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            ExprKind::Convert(inner) => write!(f, "convert({inner})"),
        }
    }
}

impl<T> Statement<T> {
    fn fmt_indented(&self, f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        match self {
            Statement::Return(expr) => writeln!(f, "{pad}return {expr};"),
            Statement::Expression(Some(expr)) => writeln!(f, "{pad}{expr};"),
            Statement::Expression(None) => writeln!(f, "{pad};"),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                writeln!(f, "{pad}if {condition}")?;
                then_branch.fmt_indented(f, depth + 1)?;
                if let Some(else_branch) = else_branch {
                    writeln!(f, "{pad}else")?;
                    else_branch.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
            Statement::Compound(block) => block.fmt_indented(f, depth),
        }
    }
}

impl<T> CompoundStatement<T> {
    fn fmt_indented(&self, f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        writeln!(f, "{pad}{{")?;
        for item in &self.items {
            match item {
                BlockItem::Statement(stmt) => stmt.fmt_indented(f, depth + 1)?,
                BlockItem::Declaration(decl) => {
                    writeln!(f, "{}{decl}", "    ".repeat(depth + 1))?
                }
            }
        }
        writeln!(f, "{pad}}}")
    }
}

impl<T> Display for Statement<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl<T> Display for Declaration<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.init {
            Some(init) => write!(f, "{} {} = {init};", self.ty, self.name),
            None => write!(f, "{} {};", self.ty, self.name),
        }
    }
}

impl Display for FunctionDeclaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(");")
    }
}

impl<T> Display for FunctionDefinition<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, (ty, name)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match name {
                Some(name) => write!(f, "{ty} {name}")?,
                None => write!(f, "{ty}")?,
            }
        }
        writeln!(f, ")")?;
        self.body.fmt_indented(f, 0)
    }
}

impl<T> Display for Program<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            match item {
                TopLevelItem::FunctionDeclaration(decl) => writeln!(f, "{decl}")?,
                TopLevelItem::FunctionDefinition(def) => writeln!(f, "{def}")?,
                TopLevelItem::GlobalDeclaration(decl) => writeln!(f, "{decl}")?,
            }
        }
        Ok(())
    }
}
