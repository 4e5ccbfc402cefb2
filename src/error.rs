//! The compiler-wide error type.

use thiserror::Error;

use crate::compiler::CodegenError;
use crate::consteval::ConstEvalError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::typechecker::TypeError;
use crate::validator::ValidationError;

/// Any fatal diagnostic the pipeline can produce. Every stage error
/// converts into this, so the driver can thread the whole pipeline with
/// `?`. The compiler is batch-style: the first error aborts compilation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    ConstEval(#[from] ConstEvalError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}
