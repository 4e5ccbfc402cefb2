//! x86-64 code generation.
//!
//! The emitter is a stack machine: every expression leaves exactly one
//! 64-bit value on the runtime stack, and every operator pops its operands
//! and pushes its result. `%rax` and `%rcx` are the scratch registers,
//! division uses `%rdx:%rax`, and the callee-saved registers are preserved
//! even though this emitter never allocates into them. Simple and correct
//! over fast: nothing is reordered or peephole-optimised.

mod scope;

pub use scope::FrameScopes;

use std::collections::HashMap;

use thiserror::Error;

use crate::asm::{Cond, Instruction, Operand, Reg};
use crate::ast::{
    BinaryOp, BlockItem, CompoundStatement, Declaration, ExprKind, Expression, Fixity,
    FunctionDefinition, Statement, TypeCategory, TypeDesc, UnaryOp, ValidatedGlobal,
    ValidatedItem, ValidatedProgram,
};

use Instruction::*;
use Operand::*;
use Reg::*;

/// `%rbx` and `%r12`–`%r15` are pushed in the prologue.
const CALLEE_SAVED_BYTES: u64 = 40;

/// System V integer argument registers, in order.
const ARG_REGS: [Reg; 6] = [Rdi, Rsi, Rdx, Rcx, R8, R9];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("type [{ty}] is not supported by the x86-64 backend")]
    UnsupportedType { ty: String },
    #[error("function `{name}` takes more than six parameters, which is not supported")]
    TooManyParameters { name: String },
    #[error("call to `{name}` passes more than six arguments, which is not supported")]
    TooManyArguments { name: String },
    #[error("invalid lvalue: only a variable can be assigned")]
    InvalidLvalue,
    #[error("variable `{name}` is not declared in any accessible scope")]
    UndeclaredVariable { name: String },
    #[error("variable `{name}` is already declared in this scope")]
    DuplicateVariable { name: String },
    #[error("stack frame imbalance at end of function `{name}`: expected offset {expected}, found {found}")]
    StackImbalance {
        name: String,
        expected: u64,
        found: u64,
    },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Lower a typed, validated program to assembly text.
pub fn emit_program(program: &ValidatedProgram<TypeDesc>) -> CodegenResult<String> {
    let mut compiler = Compiler::new();
    compiler.compile_program(program)?;
    Ok(compiler.finish())
}

pub struct Compiler {
    instructions: Vec<Instruction>,
    scopes: FrameScopes,
    globals: HashMap<String, TypeDesc>,
    current_rbp_offset: u64,
    label_counter: u32,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            instructions: vec![],
            scopes: FrameScopes::new(),
            globals: HashMap::new(),
            current_rbp_offset: 0,
            label_counter: 0,
        }
    }

    fn finish(self) -> String {
        let mut output = String::new();
        for instruction in &self.instructions {
            match instruction {
                Label(_) => output.push_str(&instruction.to_string()),
                _ => {
                    output.push('\t');
                    output.push_str(&instruction.to_string());
                }
            }
            output.push('\n');
        }
        output
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Labels are numbered from a counter that is monotonic across the
    /// whole translation unit, so every label pair is unique.
    fn next_label_number(&mut self) -> u32 {
        let number = self.label_counter;
        self.label_counter += 1;
        number
    }

    fn compile_program(&mut self, program: &ValidatedProgram<TypeDesc>) -> CodegenResult<()> {
        let globals: Vec<&ValidatedGlobal> = program
            .items
            .iter()
            .filter_map(|item| match item {
                ValidatedItem::Global(global) => Some(global),
                _ => None,
            })
            .collect();

        for global in &globals {
            self.globals
                .insert(global.name.clone(), global.ty.clone());
        }

        if !globals.is_empty() {
            self.emit(Data);
            for global in globals {
                self.compile_global(global)?;
            }
        }

        self.emit(Text);
        for item in &program.items {
            if let ValidatedItem::Function(def) = item {
                self.compile_function(def)?;
            }
        }
        Ok(())
    }

    fn compile_global(&mut self, global: &ValidatedGlobal) -> CodegenResult<()> {
        if global.ty.category == TypeCategory::Double {
            return Err(CodegenError::UnsupportedType {
                ty: global.ty.name.clone(),
            });
        }
        let value = global
            .value
            .as_i64()
            .ok_or_else(|| CodegenError::UnsupportedType {
                ty: global.value.type_desc().name,
            })?;

        self.emit(Globl(global.name.clone()));
        self.emit(Align(8));
        self.emit(Label(global.name.clone()));
        self.emit(Quad(value));
        Ok(())
    }

    fn compile_function(&mut self, def: &FunctionDefinition<TypeDesc>) -> CodegenResult<()> {
        check_backend_type(&def.return_type)?;
        if def.params.len() > ARG_REGS.len() {
            return Err(CodegenError::TooManyParameters {
                name: def.name.clone(),
            });
        }

        self.emit(Globl(def.name.clone()));
        self.emit(Label(def.name.clone()));
        self.emit_prologue();

        self.scopes.create_new_scope();
        let body = self.compile_function_body(def);
        let scope_bytes = self.scopes.destroy_current_scope();
        self.current_rbp_offset -= scope_bytes;
        body?;

        if self.current_rbp_offset != CALLEE_SAVED_BYTES {
            return Err(CodegenError::StackImbalance {
                name: def.name.clone(),
                expected: CALLEE_SAVED_BYTES,
                found: self.current_rbp_offset,
            });
        }
        Ok(())
    }

    fn compile_function_body(&mut self, def: &FunctionDefinition<TypeDesc>) -> CodegenResult<()> {
        for (index, (ty, name)) in def.params.iter().enumerate() {
            check_backend_type(ty)?;
            if let Some(name) = name {
                let offset = self.allocate_slot(name);
                self.emit(Mov(Register(ARG_REGS[index]), Frame(offset)));
            }
        }

        for item in &def.body.items {
            self.compile_block_item(item)?;
        }

        // control can fall off the end of a non-`main` function with no
        // trailing return; the frame must still be unwound
        if !ends_with_return(&def.body) {
            self.emit_epilogue();
        }
        Ok(())
    }

    fn emit_prologue(&mut self) {
        self.emit(Push(Register(Rbp)));
        self.emit(Mov(Register(Rsp), Register(Rbp)));
        self.emit(Push(Register(Rbx)));
        self.emit(Push(Register(R12)));
        self.emit(Push(Register(R13)));
        self.emit(Push(Register(R14)));
        self.emit(Push(Register(R15)));
        self.current_rbp_offset = CALLEE_SAVED_BYTES;
    }

    /// Locals and expression temporaries may still be live below the
    /// callee-saved block when a `return` executes inside a nested scope,
    /// so `%rsp` is repositioned before the pops. Restore order is the
    /// reverse of the prologue's pushes.
    fn emit_epilogue(&mut self) {
        self.emit(Lea(Frame(CALLEE_SAVED_BYTES), Register(Rsp)));
        self.emit(Pop(Register(R15)));
        self.emit(Pop(Register(R14)));
        self.emit(Pop(Register(R13)));
        self.emit(Pop(Register(R12)));
        self.emit(Pop(Register(Rbx)));
        self.emit(Mov(Register(Rbp), Register(Rsp)));
        self.emit(Pop(Register(Rbp)));
        self.emit(Ret);
    }

    fn compile_block_item(&mut self, item: &BlockItem<TypeDesc>) -> CodegenResult<()> {
        match item {
            BlockItem::Statement(stmt) => self.compile_statement(stmt),
            BlockItem::Declaration(decl) => self.compile_declaration(decl),
        }
    }

    fn compile_declaration(&mut self, decl: &Declaration<TypeDesc>) -> CodegenResult<()> {
        check_backend_type(&decl.ty)?;
        if self.scopes.contains_in_current_scope(&decl.name) {
            return Err(CodegenError::DuplicateVariable {
                name: decl.name.clone(),
            });
        }
        let offset = self.allocate_slot(&decl.name);

        if let Some(init) = &decl.init {
            self.compile_expression(init)?;
            self.emit(Pop(Register(Rax)));
            self.emit(Mov(Register(Rax), Frame(offset)));
        }
        Ok(())
    }

    /// Claim the next eight-byte slot below the last one and move `%rsp`
    /// past it.
    fn allocate_slot(&mut self, name: &str) -> u64 {
        self.current_rbp_offset += 8;
        let offset = self.current_rbp_offset;
        self.scopes.add(name, offset);
        self.emit(Sub(Immediate(8), Register(Rsp)));
        offset
    }

    fn compile_statement(&mut self, statement: &Statement<TypeDesc>) -> CodegenResult<()> {
        match statement {
            Statement::Return(expr) => {
                self.compile_expression(expr)?;
                self.emit(Pop(Register(Rax)));
                self.emit_epilogue();
                Ok(())
            }
            Statement::Expression(Some(expr)) => {
                self.compile_expression(expr)?;
                // discard the value to keep the machine stack balanced
                self.emit(Pop(Register(Rcx)));
                Ok(())
            }
            Statement::Expression(None) => Ok(()),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => self.compile_if(condition, then_branch, else_branch.as_deref()),
            Statement::Compound(block) => self.compile_compound(block),
        }
    }

    fn compile_compound(&mut self, block: &CompoundStatement<TypeDesc>) -> CodegenResult<()> {
        self.scopes.create_new_scope();
        let result = block
            .items
            .iter()
            .try_for_each(|item| self.compile_block_item(item));
        let scope_bytes = self.scopes.destroy_current_scope();
        self.current_rbp_offset -= scope_bytes;
        if scope_bytes > 0 {
            self.emit(Add(Immediate(scope_bytes as i64), Register(Rsp)));
        }
        result
    }

    fn compile_if(
        &mut self,
        condition: &Expression<TypeDesc>,
        then_branch: &Statement<TypeDesc>,
        else_branch: Option<&Statement<TypeDesc>>,
    ) -> CodegenResult<()> {
        self.compile_expression(condition)?;
        self.emit(Pop(Register(Rax)));
        self.emit(Cmp(Immediate(0), Register(Rax)));

        let end_label = format!("_end_{}", self.next_label_number());
        match else_branch {
            Some(else_branch) => {
                let else_label = format!("_else_{}", self.next_label_number());
                self.emit(Je(else_label.clone()));
                self.compile_statement(then_branch)?;
                self.emit(Jmp(end_label.clone()));
                self.emit(Label(else_label));
                self.compile_statement(else_branch)?;
            }
            None => {
                self.emit(Je(end_label.clone()));
                self.compile_statement(then_branch)?;
            }
        }
        self.emit(Label(end_label));
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expression<TypeDesc>) -> CodegenResult<()> {
        match &expr.kind {
            ExprKind::Grouping(inner) => self.compile_expression(inner),

            ExprKind::Constant(value) => {
                let value = value
                    .as_i64()
                    .ok_or_else(|| CodegenError::UnsupportedType {
                        ty: expr.info.name.clone(),
                    })?;
                self.emit(Mov(Immediate(value), Register(Rcx)));
                self.emit(Push(Register(Rcx)));
                Ok(())
            }

            ExprKind::Var(name) => {
                self.load_variable(name)?;
                self.emit(Push(Register(Rax)));
                Ok(())
            }

            ExprKind::Unary {
                fixity,
                op: op @ (UnaryOp::Increment | UnaryOp::Decrement),
                operand,
            } => self.compile_increment(*fixity, *op, operand),

            ExprKind::Unary { op, operand, .. } => {
                self.compile_expression(operand)?;
                self.emit(Pop(Register(Rax)));
                match op {
                    UnaryOp::Plus => {}
                    UnaryOp::Minus => self.emit(Neg(Register(Rax))),
                    UnaryOp::BitwiseNot => self.emit(Not(Register(Rax))),
                    UnaryOp::LogicalNot => {
                        self.emit(Cmp(Immediate(0), Register(Rax)));
                        self.emit(Mov(Immediate(0), Register(Rax)));
                        self.emit(Set(Cond::E, Al));
                    }
                    UnaryOp::Increment | UnaryOp::Decrement => unreachable!("handled above"),
                }
                self.emit(Push(Register(Rax)));
                Ok(())
            }

            ExprKind::Binary {
                op: BinaryOp::LogicalAnd,
                left,
                right,
            } => self.compile_logical_and(left, right),

            ExprKind::Binary {
                op: BinaryOp::LogicalOr,
                left,
                right,
            } => self.compile_logical_or(left, right),

            ExprKind::Binary {
                op: BinaryOp::Assign,
                left,
                right,
            } => {
                let name = left.lvalue_name().ok_or(CodegenError::InvalidLvalue)?;
                self.compile_expression(right)?;
                self.emit(Pop(Register(Rax)));
                self.store_variable(name)?;
                // assignment is itself an expression whose value is the
                // stored value
                self.emit(Push(Register(Rax)));
                Ok(())
            }

            ExprKind::Binary {
                op: BinaryOp::Comma,
                left,
                right,
            } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.emit(Pop(Register(Rax)));
                self.emit(Pop(Register(Rcx)));
                self.emit(Push(Register(Rax)));
                Ok(())
            }

            ExprKind::Binary { op, left, right } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.emit(Pop(Register(Rcx)));
                self.emit(Pop(Register(Rax)));
                self.compile_binary_op(*op);
                Ok(())
            }

            ExprKind::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                self.compile_expression(condition)?;
                self.emit(Pop(Register(Rax)));
                self.emit(Cmp(Immediate(0), Register(Rax)));

                let else_label = format!("_else_{}", self.next_label_number());
                let end_label = format!("_end_{}", self.next_label_number());
                self.emit(Je(else_label.clone()));
                self.compile_expression(if_true)?;
                self.emit(Jmp(end_label.clone()));
                self.emit(Label(else_label));
                self.compile_expression(if_false)?;
                self.emit(Label(end_label));
                Ok(())
            }

            ExprKind::Call { name, args } => {
                if args.len() > ARG_REGS.len() {
                    return Err(CodegenError::TooManyArguments { name: name.clone() });
                }
                for arg in args {
                    self.compile_expression(arg)?;
                }
                for index in (0..args.len()).rev() {
                    self.emit(Pop(Register(ARG_REGS[index])));
                }
                self.emit(Call(name.clone()));
                self.emit(Push(Register(Rax)));
                Ok(())
            }

            ExprKind::Convert(inner) => {
                self.compile_expression(inner)?;
                self.compile_conversion(&expr.info)
            }
        }
    }

    /// Both operands are on the stack, right on top; pop into `%rcx` and
    /// `%rax` and push the result.
    fn compile_binary_op(&mut self, op: BinaryOp) {
        match op {
            BinaryOp::Multiply => {
                self.emit(Imul(Register(Rcx), Register(Rax)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::Divide => {
                // sign-extend into %rdx for the 128-bit dividend
                self.emit(Cqo);
                self.emit(Idiv(Register(Rcx)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::Modulo => {
                self.emit(Cqo);
                self.emit(Idiv(Register(Rcx)));
                // the remainder lands in %rdx
                self.emit(Push(Register(Rdx)));
            }
            BinaryOp::Plus => {
                self.emit(Add(Register(Rcx), Register(Rax)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::Minus => {
                self.emit(Sub(Register(Rcx), Register(Rax)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::LeftShift => {
                self.emit(Sal(Register(Rax)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::RightShift => {
                self.emit(Sar(Register(Rax)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::BitwiseAnd => {
                self.emit(And(Register(Rcx), Register(Rax)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::BitwiseXor => {
                self.emit(Xor(Register(Rcx), Register(Rax)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::BitwiseOr => {
                self.emit(Or(Register(Rcx), Register(Rax)));
                self.emit(Push(Register(Rax)));
            }
            BinaryOp::LessThan => self.compile_comparison(Cond::L),
            BinaryOp::LessThanEqual => self.compile_comparison(Cond::Le),
            BinaryOp::GreaterThan => self.compile_comparison(Cond::G),
            BinaryOp::GreaterThanEqual => self.compile_comparison(Cond::Ge),
            BinaryOp::Equal => self.compile_comparison(Cond::E),
            BinaryOp::NotEqual => self.compile_comparison(Cond::Ne),
            BinaryOp::LogicalAnd
            | BinaryOp::LogicalOr
            | BinaryOp::Assign
            | BinaryOp::Comma => {
                unreachable!("lowered before reaching the generic binary path")
            }
        }
    }

    fn compile_comparison(&mut self, cond: Cond) {
        self.emit(Cmp(Register(Rcx), Register(Rax)));
        self.emit(Mov(Immediate(0), Register(Rax)));
        self.emit(Set(cond, Al));
        self.emit(Push(Register(Rax)));
    }

    fn compile_logical_and(
        &mut self,
        left: &Expression<TypeDesc>,
        right: &Expression<TypeDesc>,
    ) -> CodegenResult<()> {
        self.compile_expression(left)?;
        self.emit(Pop(Register(Rax)));
        self.emit(Cmp(Immediate(0), Register(Rax)));

        let clause2_label = format!("_clause2_{}", self.next_label_number());
        let end_label = format!("_end_{}", self.next_label_number());
        self.emit(Jne(clause2_label.clone()));

        // short circuit: left was zero, the whole expression is 0
        self.emit(Mov(Immediate(0), Register(Rax)));
        self.emit(Jmp(end_label.clone()));

        self.emit(Label(clause2_label));
        self.compile_expression(right)?;
        self.emit(Pop(Register(Rax)));
        self.emit(Cmp(Immediate(0), Register(Rax)));
        self.emit(Mov(Immediate(0), Register(Rax)));
        self.emit(Set(Cond::Ne, Al));
        self.emit(Label(end_label));

        self.emit(Push(Register(Rax)));
        Ok(())
    }

    fn compile_logical_or(
        &mut self,
        left: &Expression<TypeDesc>,
        right: &Expression<TypeDesc>,
    ) -> CodegenResult<()> {
        self.compile_expression(left)?;
        self.emit(Pop(Register(Rax)));
        self.emit(Cmp(Immediate(0), Register(Rax)));

        let clause2_label = format!("_clause2_{}", self.next_label_number());
        let end_label = format!("_end_{}", self.next_label_number());
        self.emit(Je(clause2_label.clone()));

        // short circuit: left was non-zero, the whole expression is 1
        self.emit(Mov(Immediate(1), Register(Rax)));
        self.emit(Jmp(end_label.clone()));

        self.emit(Label(clause2_label));
        self.compile_expression(right)?;
        self.emit(Pop(Register(Rax)));
        self.emit(Cmp(Immediate(0), Register(Rax)));
        self.emit(Mov(Immediate(0), Register(Rax)));
        self.emit(Set(Cond::Ne, Al));
        self.emit(Label(end_label));

        self.emit(Push(Register(Rax)));
        Ok(())
    }

    fn compile_increment(
        &mut self,
        fixity: Fixity,
        op: UnaryOp,
        operand: &Expression<TypeDesc>,
    ) -> CodegenResult<()> {
        // evaluate the operand for its side effects, then work on the
        // variable slot directly
        self.compile_expression(operand)?;
        self.emit(Pop(Register(Rax)));

        let name = operand.lvalue_name().ok_or(CodegenError::InvalidLvalue)?;
        self.load_variable(name)?;

        let delta = Immediate(1);
        match fixity {
            Fixity::Prefix => {
                match op {
                    UnaryOp::Increment => self.emit(Add(delta, Register(Rax))),
                    _ => self.emit(Sub(delta, Register(Rax))),
                }
                self.store_variable(name)?;
                self.emit(Push(Register(Rax)));
            }
            Fixity::Postfix => {
                // keep the old value around while the slot is updated
                self.emit(Mov(Register(Rax), Register(Rcx)));
                match op {
                    UnaryOp::Increment => self.emit(Add(delta, Register(Rax))),
                    _ => self.emit(Sub(delta, Register(Rax))),
                }
                self.store_variable(name)?;
                self.emit(Push(Register(Rcx)));
            }
        }
        Ok(())
    }

    /// Value conversions materialised by the type checker. Everything on
    /// the machine stack is a 64-bit slot, so converting to a narrower
    /// integer type re-extends the low bytes; widening to the 64-bit types
    /// is the identity.
    fn compile_conversion(&mut self, target: &TypeDesc) -> CodegenResult<()> {
        if target.category == TypeCategory::Double {
            return Err(CodegenError::UnsupportedType {
                ty: target.name.clone(),
            });
        }
        if target.size == 8 {
            return Ok(());
        }

        let sub_register = match target.size {
            1 => Al,
            2 => Ax,
            _ => Eax,
        };
        self.emit(Pop(Register(Rax)));
        match target.category {
            TypeCategory::Int => self.emit(SignExtend(sub_register)),
            _ => self.emit(ZeroExtend(sub_register)),
        }
        self.emit(Push(Register(Rax)));
        Ok(())
    }

    fn load_variable(&mut self, name: &str) -> CodegenResult<()> {
        if let Some(offset) = self.scopes.find(name) {
            self.emit(Mov(Frame(offset), Register(Rax)));
        } else if self.globals.contains_key(name) {
            self.emit(Mov(Global(name.to_owned()), Register(Rax)));
        } else {
            return Err(CodegenError::UndeclaredVariable {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    /// Store `%rax` into the variable's slot.
    fn store_variable(&mut self, name: &str) -> CodegenResult<()> {
        if let Some(offset) = self.scopes.find(name) {
            self.emit(Mov(Register(Rax), Frame(offset)));
        } else if self.globals.contains_key(name) {
            self.emit(Mov(Register(Rax), Global(name.to_owned())));
        } else {
            return Err(CodegenError::UndeclaredVariable {
                name: name.to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn check_backend_type(ty: &TypeDesc) -> CodegenResult<()> {
    if ty.category == TypeCategory::Double {
        return Err(CodegenError::UnsupportedType {
            ty: ty.name.clone(),
        });
    }
    Ok(())
}

fn ends_with_return<T>(body: &CompoundStatement<T>) -> bool {
    matches!(
        body.items.last(),
        Some(BlockItem::Statement(Statement::Return(_)))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::{typechecker, validator};

    fn emit(input: &str) -> CodegenResult<String> {
        let tokens = Lexer::new(input).lex().expect("lexes");
        let program = Parser::new(tokens).parse().expect("parses");
        let validated = validator::validate(program).expect("validates");
        let typed = typechecker::check(validated).expect("type checks");
        emit_program(&typed)
    }

    #[track_caller]
    fn assert_contains_in_order(haystack: &str, needles: &[&str]) {
        let mut position = 0;
        for needle in needles {
            match haystack[position..].find(needle) {
                Some(found) => position += found + needle.len(),
                None => panic!(
                    "expected `{needle}` (in order) in emitted assembly:\n{haystack}"
                ),
            }
        }
    }

    #[test]
    fn test_simplest_program() {
        let asm = emit("int main() { return 42; }").unwrap();
        assert_contains_in_order(
            &asm,
            &[
                ".globl main",
                "main:",
                "pushq %rbp",
                "movq %rsp, %rbp",
                "movq $42, %rcx",
                "pushq %rcx",
                "popq %rax",
                "ret",
            ],
        );
    }

    #[test]
    fn test_prologue_preserves_callee_saved_registers() {
        let asm = emit("int main() { return 0; }").unwrap();
        assert_contains_in_order(
            &asm,
            &[
                "pushq %rbx",
                "pushq %r12",
                "pushq %r13",
                "pushq %r14",
                "pushq %r15",
                // restored in reverse order
                "popq %r15",
                "popq %r14",
                "popq %r13",
                "popq %r12",
                "popq %rbx",
                "movq %rbp, %rsp",
                "popq %rbp",
                "ret",
            ],
        );
    }

    #[test]
    fn test_binary_operator_pops_and_pushes() {
        let asm = emit("int main() { return 1 + 2 * 3; }").unwrap();
        assert_contains_in_order(
            &asm,
            &[
                "movq $1, %rcx",
                "movq $2, %rcx",
                "movq $3, %rcx",
                "imulq %rcx, %rax",
                "addq %rcx, %rax",
            ],
        );
    }

    #[test]
    fn test_division_and_modulo_use_rdx_rax() {
        let asm = emit("int main() { return 7 / 2 + 7 % 2; }").unwrap();
        assert_contains_in_order(&asm, &["cqo", "idivq %rcx", "pushq %rax"]);
        assert_contains_in_order(&asm, &["cqo", "idivq %rcx", "pushq %rdx"]);
    }

    #[test]
    fn test_shifts_use_cl_count() {
        let asm = emit("int main() { return (1 << 3) + (16 >> 2); }").unwrap();
        assert_contains_in_order(&asm, &["salq %cl, %rax"]);
        assert_contains_in_order(&asm, &["sarq %cl, %rax"]);
    }

    #[test]
    fn test_comparison_sets_flags_into_al() {
        let asm = emit("int main() { return 1 < 2; }").unwrap();
        assert_contains_in_order(
            &asm,
            &["cmpq %rcx, %rax", "movq $0, %rax", "setl %al", "pushq %rax"],
        );
    }

    #[test]
    fn test_short_circuit_or_skips_right_operand() {
        // `1 / 0` must never reach the constant evaluator and the emitted
        // code must branch around the division
        let asm = emit("int main() { return 1 || (1 / 0); }").unwrap();
        assert_contains_in_order(
            &asm,
            &[
                "cmpq $0, %rax",
                "je _clause2_0",
                "movq $1, %rax",
                "jmp _end_1",
                "_clause2_0:",
                "idivq",
                "_end_1:",
            ],
        );
    }

    #[test]
    fn test_short_circuit_and_yields_zero_on_false() {
        let asm = emit("int main() { return 0 && 1; }").unwrap();
        assert_contains_in_order(
            &asm,
            &[
                "cmpq $0, %rax",
                "jne _clause2_0",
                "movq $0, %rax",
                "jmp _end_1",
                "_clause2_0:",
            ],
        );
    }

    #[test]
    fn test_label_numbers_are_unique_across_functions() {
        let asm = emit(
            "int f() { return 1 || 2; } int main() { return 3 || 4; }",
        )
        .unwrap();
        assert_contains_in_order(&asm, &["_clause2_0", "_end_1", "_clause2_2", "_end_3"]);
    }

    #[test]
    fn test_variable_shadowing_uses_distinct_slots() {
        let asm = emit("int main() { int x = 1; { int x = 2; return x; } }").unwrap();
        // outer x lives at -48(%rbp), the shadowing x at -56(%rbp), and the
        // return loads the inner slot
        assert_contains_in_order(
            &asm,
            &[
                "movq %rax, -48(%rbp)",
                "movq %rax, -56(%rbp)",
                "movq -56(%rbp), %rax",
            ],
        );
    }

    #[test]
    fn test_block_exit_reclaims_stack() {
        let asm = emit("int main() { { int x = 1; int y = 2; } return 0; }").unwrap();
        assert_contains_in_order(&asm, &["subq $8, %rsp", "subq $8, %rsp", "addq $16, %rsp"]);
    }

    #[test]
    fn test_assignment_stores_and_repushes() {
        let asm = emit("int main() { int x = 0; x = 5; return x; }").unwrap();
        assert_contains_in_order(
            &asm,
            &[
                "movq $5, %rcx",
                "pushq %rcx",
                "popq %rax",
                "movq %rax, -48(%rbp)",
                "pushq %rax",
            ],
        );
    }

    #[test]
    fn test_prefix_and_postfix_increment() {
        let prefix = emit("int main() { int x = 1; return ++x; }").unwrap();
        assert_contains_in_order(
            &prefix,
            &["movq -48(%rbp), %rax", "addq $1, %rax", "movq %rax, -48(%rbp)", "pushq %rax"],
        );

        let postfix = emit("int main() { int x = 1; return x--; }").unwrap();
        assert_contains_in_order(
            &postfix,
            &[
                "movq -48(%rbp), %rax",
                "movq %rax, %rcx",
                "subq $1, %rax",
                "movq %rax, -48(%rbp)",
                "pushq %rcx",
            ],
        );
    }

    #[test]
    fn test_if_else_branches() {
        let asm = emit("int main() { if (1) return 2; else return 3; return 0; }").unwrap();
        assert_contains_in_order(
            &asm,
            &["cmpq $0, %rax", "je _else_1", "jmp _end_0", "_else_1:", "_end_0:"],
        );
    }

    #[test]
    fn test_ternary_both_arms_push() {
        let asm = emit("int main() { return 1 ? 2 : 3; }").unwrap();
        assert_contains_in_order(
            &asm,
            &[
                "je _else_0",
                "movq $2, %rcx",
                "jmp _end_1",
                "_else_0:",
                "movq $3, %rcx",
                "_end_1:",
                "popq %rax",
            ],
        );
    }

    #[test]
    fn test_function_call_uses_system_v_registers() {
        let asm = emit(
            "int add(int a, int b) { return a + b; } int main() { return add(1, 2); }",
        )
        .unwrap();
        assert_contains_in_order(&asm, &["popq %rsi", "popq %rdi", "call add", "pushq %rax"]);
        // parameters spill from their registers into frame slots
        assert_contains_in_order(
            &asm,
            &["movq %rdi, -48(%rbp)", "movq %rsi, -56(%rbp)"],
        );
    }

    #[test]
    fn test_call_to_declared_function_emits_plain_call() {
        let asm = emit("int putchar(int); int main() { return putchar(65); }").unwrap();
        assert_contains_in_order(&asm, &["popq %rdi", "call putchar"]);
    }

    #[test]
    fn test_globals_are_emitted_and_loaded_rip_relative() {
        let asm = emit("int g = 2 * 3 + 4; int main() { return g; }").unwrap();
        assert_contains_in_order(
            &asm,
            &[".data", ".globl g", ".align 8", "g:", ".quad 10", ".text", "movq g(%rip), %rax"],
        );
    }

    #[test]
    fn test_global_assignment_stores_rip_relative(){
        let asm = emit("int g; int main() { g = 7; return g; }").unwrap();
        assert_contains_in_order(&asm, &["movq %rax, g(%rip)"]);
    }

    #[test]
    fn test_conversion_reextends_narrow_targets() {
        // `'a' + 1` widens the char operand to int through an explicit
        // conversion node: re-extend the low 32 bits
        let asm = emit("int main() { return 'a' + 1; }").unwrap();
        assert_contains_in_order(&asm, &["movq $97, %rcx", "movslq %eax, %rax"]);
    }

    #[test]
    fn test_double_typed_code_is_refused() {
        assert_eq!(
            emit("double d() { return 1.5; }"),
            Err(CodegenError::UnsupportedType {
                ty: "double".to_owned()
            })
        );
        assert!(matches!(
            emit("int main() { double x = 1.5; return 0; }"),
            Err(CodegenError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_invalid_assignment_target_is_rejected() {
        assert_eq!(
            emit("int main() { 1 = 2; return 0; }"),
            Err(CodegenError::InvalidLvalue)
        );
    }

    #[test]
    fn test_frame_counter_balances_after_nested_blocks() {
        use crate::ast::Constant;

        fn int_expr(kind: ExprKind<TypeDesc>) -> Expression<TypeDesc> {
            Expression::new(kind, TypeDesc::int())
        }

        let mut compiler = Compiler::new();
        compiler.current_rbp_offset = CALLEE_SAVED_BYTES;
        compiler.scopes.create_new_scope();
        let depth_before = compiler.scopes.depth();

        // { int a = 1; { int b = a; b; } }
        let inner = Statement::Compound(CompoundStatement {
            items: vec![
                BlockItem::Declaration(Declaration {
                    ty: TypeDesc::int(),
                    name: "b".to_owned(),
                    init: Some(int_expr(ExprKind::Var("a".to_owned()))),
                }),
                BlockItem::Statement(Statement::Expression(Some(int_expr(ExprKind::Var(
                    "b".to_owned(),
                ))))),
            ],
        });
        let statement = Statement::Compound(CompoundStatement {
            items: vec![
                BlockItem::Declaration(Declaration {
                    ty: TypeDesc::int(),
                    name: "a".to_owned(),
                    init: Some(int_expr(ExprKind::Constant(Constant::Int(1)))),
                }),
                BlockItem::Statement(inner),
            ],
        });
        compiler.compile_statement(&statement).unwrap();

        assert_eq!(compiler.scopes.depth(), depth_before);
        assert_eq!(compiler.current_rbp_offset, CALLEE_SAVED_BYTES);
    }

    #[test]
    fn test_fall_off_end_still_unwinds_frame() {
        let asm = emit("int f() { 1; }").unwrap();
        assert_contains_in_order(&asm, &["popq %rbx", "movq %rbp, %rsp", "popq %rbp", "ret"]);
    }
}
