//! Compiler for a small subset of C targeting x86-64.
//!
//! The pipeline is linear: `lex → parse → validate → type-check → emit`.
//! Each stage consumes the previous stage's output and owns its own tables;
//! the first error aborts the batch with a diagnostic.

pub mod asm;
pub mod ast;
pub mod compiler;
pub mod consteval;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod typechecker;
pub mod util;
pub mod validator;

pub use error::CompileError;

use lexer::Lexer;
use parser::Parser;

/// Compile one translation unit of C source into AT&T-syntax x86-64
/// assembly text.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let tokens = Lexer::new(source).lex()?;
    let program = Parser::new(tokens).parse()?;
    let validated = validator::validate(program)?;
    let typed = typechecker::check(validated)?;
    let assembly = compiler::emit_program(&typed)?;
    Ok(assembly)
}
