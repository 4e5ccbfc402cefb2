//! End-to-end scenarios: source text in, assembly text out.

use mcc::ast::{Constant, TypeDesc, ValidatedGlobal, ValidatedItem};
use mcc::lexer::Lexer;
use mcc::parser::Parser;
use mcc::{validator, CompileError};

fn compile(source: &str) -> Result<String, CompileError> {
    mcc::compile(source)
}

#[track_caller]
fn assert_contains_in_order(haystack: &str, needles: &[&str]) {
    let mut position = 0;
    for needle in needles {
        match haystack[position..].find(needle) {
            Some(found) => position += found + needle.len(),
            None => panic!("expected `{needle}` (in order) in:\n{haystack}"),
        }
    }
}

#[test]
fn compile_simplest_program() {
    let asm = compile("int main() { return 42; }").expect("compiles");
    assert_contains_in_order(
        &asm,
        &[
            ".globl main",
            "main:",
            "pushq %rbp",
            "movq %rsp, %rbp",
            "movq $42, %rcx",
            "popq %rax",
            "ret",
        ],
    );
}

#[test]
fn compile_arithmetic_precedence() {
    // 1 + 2 * 3: the multiplication is the right child of the addition, so
    // its imul is emitted before the add
    let source = "int main() { return 1 + 2 * 3; }";

    let tokens = Lexer::new(source).lex().expect("lexes");
    let program = Parser::new(tokens).parse().expect("parses");
    assert!(program.to_string().contains("(1 + (2 * 3))"));

    let asm = compile(source).expect("compiles");
    assert_contains_in_order(&asm, &["imulq %rcx, %rax", "addq %rcx, %rax"]);
}

#[test]
fn compile_short_circuit_or_without_evaluating_division() {
    // `1 / 0` sits behind a branch; it must neither hit the compile-time
    // evaluator nor run before the short-circuit test
    let asm = compile("int main() { return 1 || (1 / 0); }").expect("compiles");
    assert_contains_in_order(
        &asm,
        &[
            "cmpq $0, %rax",
            "je _clause2_0",
            "movq $1, %rax",
            "jmp _end_1",
            "_clause2_0:",
            "idivq %rcx",
            "_end_1:",
        ],
    );
}

#[test]
fn compile_variable_shadowing_to_distinct_slots() {
    let asm =
        compile("int main() { int x = 1; { int x = 2; return x; } }").expect("compiles");
    assert_contains_in_order(
        &asm,
        &[
            "movq %rax, -48(%rbp)", // outer x
            "movq %rax, -56(%rbp)", // inner x, its own slot
            "movq -56(%rbp), %rax", // the return reads the inner binding
        ],
    );
}

#[test]
fn global_initialiser_folds_to_a_literal() {
    let source = "int g = 2 * 3 + 4; int main() { return g; }";

    let tokens = Lexer::new(source).lex().expect("lexes");
    let program = Parser::new(tokens).parse().expect("parses");
    let validated = validator::validate(program).expect("validates");
    let global = validated.items.iter().find_map(|item| match item {
        ValidatedItem::Global(global) => Some(global),
        _ => None,
    });
    assert_eq!(
        global,
        Some(&ValidatedGlobal {
            ty: TypeDesc::int(),
            name: "g".to_owned(),
            value: Constant::Int(10),
        })
    );

    let asm = compile(source).expect("compiles");
    assert_contains_in_order(&asm, &[".data", "g:", ".quad 10", ".text", "movq g(%rip), %rax"]);
}

#[test]
fn matching_redeclarations_compile() {
    assert!(compile("int f(int); int f(int); int f(int x) { return x; } int main() { return f(1); }").is_ok());
}

#[test]
fn mismatched_redeclaration_is_rejected() {
    let err = compile("int f(int); long f(int);").unwrap_err();
    assert!(err.to_string().contains("return type mismatch"));
}

#[test]
fn compile_function_calls_and_recursion() {
    let asm = compile(
        "int sum(int n) { if (n <= 0) return 0; return n + sum(n - 1); } \
         int main() { return sum(3); }",
    )
    .expect("compiles");
    assert_contains_in_order(&asm, &[".globl sum", "sum:", "call sum", ".globl main", "call sum"]);
}

#[test]
fn compile_compound_assignment_and_increments() {
    let asm = compile(
        "int main() { int x = 1; x += 2; x <<= 1; x--; return x; }",
    )
    .expect("compiles");
    assert_contains_in_order(&asm, &["addq %rcx, %rax", "salq %cl, %rax", "subq $1, %rax"]);
}

#[test]
fn compile_ternary_and_if_chains() {
    let asm = compile(
        "int main() { int x = 3; if (x > 2) x = x % 2; else x = 0; return x ? 10 : 20; }",
    )
    .expect("compiles");
    assert_contains_in_order(&asm, &["setg %al", "idivq %rcx", "pushq %rdx"]);
    assert_contains_in_order(&asm, &["je _else_", "jmp _end_", "_else_", "_end_"]);
}
