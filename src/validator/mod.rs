//! Name resolution and scope validation.
//!
//! One traversal over the parsed program. Functions and globals land in
//! declaration/definition tables, every identifier reference is resolved
//! against the scope stack (shadowing allowed, same-scope redeclaration
//! rejected), calls are checked for arity, and global initialisers are
//! folded through the constant evaluator. The output contains definitions
//! only: globals are deduplicated and declared-but-undefined ones become
//! zero-initialised definitions.

mod scope;

pub use scope::ScopeStack;

use std::collections::HashMap;

use thiserror::Error;

use crate::ast::{
    BlockItem, CompoundStatement, Constant, Declaration, ExprKind, Expression,
    FunctionDeclaration, FunctionDefinition, Program, Statement, TopLevelItem, TypeDesc,
    ValidatedGlobal, ValidatedItem, ValidatedProgram,
};
use crate::consteval::{self, ConstEvalError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("variable `{name}` is not declared in any accessible scope")]
    UndeclaredVariable { name: String },
    #[error("variable `{name}` is already declared in this scope")]
    DuplicateLocal { name: String },
    #[error("function `{name}` is not declared or defined")]
    UndeclaredFunction { name: String },
    #[error("function `{name}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("function `{name}` return type mismatch with earlier declaration")]
    ReturnTypeMismatch { name: String },
    #[error("function `{name}` parameter count mismatch with earlier declaration")]
    ParamCountMismatch { name: String },
    #[error("function `{name}` parameter type mismatch with earlier declaration")]
    ParamTypeMismatch { name: String },
    #[error("function `{name}` is already defined")]
    DuplicateFunctionDefinition { name: String },
    #[error("`{name}` is declared as both a function and a global variable")]
    FunctionGlobalCollision { name: String },
    #[error("global variable `{name}` redeclared with a different type")]
    GlobalTypeMismatch { name: String },
    #[error("global variable `{name}` is already defined")]
    DuplicateGlobalDefinition { name: String },
    #[error("user casts are not supported")]
    UnsupportedCast,
    #[error("in initialiser of `{name}`: {source}")]
    GlobalInitialiser {
        name: String,
        source: ConstEvalError,
    },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn validate(program: Program<()>) -> ValidationResult<ValidatedProgram<Option<TypeDesc>>> {
    Validator::new().run(program)
}

#[derive(Default)]
struct Validator {
    scopes: ScopeStack,
    function_sigs: HashMap<String, FunctionDeclaration>,
    defined_functions: Vec<String>,
    functions: Vec<FunctionDefinition<Option<TypeDesc>>>,
    global_declarations: HashMap<String, TypeDesc>,
    global_definitions: HashMap<String, (TypeDesc, Constant)>,
    global_order: Vec<String>,
}

impl Validator {
    fn new() -> Self {
        Self::default()
    }

    fn run(mut self, program: Program<()>) -> ValidationResult<ValidatedProgram<Option<TypeDesc>>> {
        for item in program.items {
            match item {
                TopLevelItem::FunctionDeclaration(decl) => {
                    self.validate_function_declaration(&decl)?;
                }
                TopLevelItem::FunctionDefinition(def) => {
                    self.validate_function_definition(def)?;
                }
                TopLevelItem::GlobalDeclaration(decl) => {
                    self.validate_global_declaration(decl)?;
                }
            }
        }

        let mut items: Vec<ValidatedItem<Option<TypeDesc>>> = self
            .functions
            .into_iter()
            .map(ValidatedItem::Function)
            .collect();

        for name in self.global_order {
            let (ty, value) = match self.global_definitions.remove(&name) {
                Some(definition) => definition,
                // declared but never defined: becomes zero-initialised
                None => (self.global_declarations[&name].clone(), Constant::Int(0)),
            };
            items.push(ValidatedItem::Global(ValidatedGlobal { ty, name, value }));
        }

        Ok(ValidatedProgram { items })
    }

    fn validate_function_declaration(&mut self, decl: &FunctionDeclaration) -> ValidationResult<()> {
        self.check_no_global_named(&decl.name)?;

        if let Some(existing) = self.function_sigs.get(&decl.name) {
            check_signatures_match(existing, decl)?;
        } else {
            self.function_sigs.insert(decl.name.clone(), decl.clone());
        }
        Ok(())
    }

    fn validate_function_definition(
        &mut self,
        def: FunctionDefinition<()>,
    ) -> ValidationResult<()> {
        self.check_no_global_named(&def.name)?;

        if self.defined_functions.contains(&def.name) {
            return Err(ValidationError::DuplicateFunctionDefinition {
                name: def.name.clone(),
            });
        }
        let signature = def.signature();
        if let Some(existing) = self.function_sigs.get(&def.name) {
            check_signatures_match(existing, &signature)?;
        }
        // register before walking the body so recursive calls resolve
        self.function_sigs.insert(def.name.clone(), signature);
        self.defined_functions.push(def.name.clone());

        self.scopes.create_new_scope();
        for (ty, name) in &def.params {
            if let Some(name) = name {
                self.scopes.declare(name, ty.clone());
            }
        }
        // the function body shares the parameter scope
        let body = self.check_block_items(def.body.items);
        self.scopes.destroy_current_scope();

        self.functions.push(FunctionDefinition {
            return_type: def.return_type,
            name: def.name,
            params: def.params,
            body: CompoundStatement { items: body? },
        });
        Ok(())
    }

    fn validate_global_declaration(&mut self, decl: Declaration<()>) -> ValidationResult<()> {
        if self.function_sigs.contains_key(&decl.name) {
            return Err(ValidationError::FunctionGlobalCollision { name: decl.name });
        }

        let Declaration { ty, name, init } = decl;

        if let Some(init) = init {
            if self.global_definitions.contains_key(&name) {
                return Err(ValidationError::DuplicateGlobalDefinition { name });
            }
            if let Some(declared) = self.global_declarations.get(&name) {
                if *declared != ty {
                    return Err(ValidationError::GlobalTypeMismatch { name });
                }
            }
            let value = consteval::evaluate(&init)
                .map_err(|source| ValidationError::GlobalInitialiser {
                    name: name.clone(),
                    source,
                })?;
            if !self.global_order.contains(&name) {
                self.global_order.push(name.clone());
            }
            self.global_definitions.insert(name, (ty, value));
        } else {
            if let Some(declared) = self.global_declarations.get(&name) {
                if *declared != ty {
                    return Err(ValidationError::GlobalTypeMismatch { name });
                }
            }
            if let Some((defined, _)) = self.global_definitions.get(&name) {
                if *defined != ty {
                    return Err(ValidationError::GlobalTypeMismatch { name });
                }
            }
            if !self.global_order.contains(&name) {
                self.global_order.push(name.clone());
            }
            self.global_declarations.insert(name, ty);
        }
        Ok(())
    }

    fn check_no_global_named(&self, name: &str) -> ValidationResult<()> {
        if self.global_declarations.contains_key(name) || self.global_definitions.contains_key(name)
        {
            return Err(ValidationError::FunctionGlobalCollision {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn check_block_items(
        &mut self,
        items: Vec<BlockItem<()>>,
    ) -> ValidationResult<Vec<BlockItem<Option<TypeDesc>>>> {
        items
            .into_iter()
            .map(|item| match item {
                BlockItem::Statement(stmt) => {
                    Ok(BlockItem::Statement(self.check_statement(stmt)?))
                }
                BlockItem::Declaration(decl) => {
                    Ok(BlockItem::Declaration(self.check_local_declaration(decl)?))
                }
            })
            .collect()
    }

    fn check_local_declaration(
        &mut self,
        decl: Declaration<()>,
    ) -> ValidationResult<Declaration<Option<TypeDesc>>> {
        if self.scopes.contains_in_current_scope(&decl.name) {
            return Err(ValidationError::DuplicateLocal { name: decl.name });
        }
        self.scopes.declare(&decl.name, decl.ty.clone());

        let init = decl.init.map(|init| self.check_expression(init)).transpose()?;
        Ok(Declaration {
            ty: decl.ty,
            name: decl.name,
            init,
        })
    }

    fn check_statement(
        &mut self,
        statement: Statement<()>,
    ) -> ValidationResult<Statement<Option<TypeDesc>>> {
        Ok(match statement {
            Statement::Return(expr) => Statement::Return(self.check_expression(expr)?),
            Statement::Expression(expr) => Statement::Expression(
                expr.map(|expr| self.check_expression(expr)).transpose()?,
            ),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => Statement::If {
                condition: self.check_expression(condition)?,
                then_branch: Box::new(self.check_statement(*then_branch)?),
                else_branch: else_branch
                    .map(|stmt| self.check_statement(*stmt).map(Box::new))
                    .transpose()?,
            },
            Statement::Compound(block) => {
                self.scopes.create_new_scope();
                let items = self.check_block_items(block.items);
                self.scopes.destroy_current_scope();
                Statement::Compound(CompoundStatement { items: items? })
            }
        })
    }

    /// Resolve names in an expression, attaching the declared type to
    /// identifier references and the return type to calls. Other interior
    /// nodes stay untyped until the type-checking pass.
    fn check_expression(
        &mut self,
        expr: Expression<()>,
    ) -> ValidationResult<Expression<Option<TypeDesc>>> {
        Ok(match expr.kind {
            ExprKind::Grouping(inner) => Expression::new(
                ExprKind::Grouping(Box::new(self.check_expression(*inner)?)),
                None,
            ),
            ExprKind::Constant(value) => {
                Expression::new(ExprKind::Constant(value), Some(value.type_desc()))
            }
            ExprKind::Var(name) => {
                let ty = self.resolve_variable(&name)?;
                Expression::new(ExprKind::Var(name), Some(ty))
            }
            ExprKind::Unary {
                fixity,
                op,
                operand,
            } => Expression::new(
                ExprKind::Unary {
                    fixity,
                    op,
                    operand: Box::new(self.check_expression(*operand)?),
                },
                None,
            ),
            ExprKind::Binary { op, left, right } => Expression::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(self.check_expression(*left)?),
                    right: Box::new(self.check_expression(*right)?),
                },
                None,
            ),
            ExprKind::Ternary {
                condition,
                if_true,
                if_false,
            } => Expression::new(
                ExprKind::Ternary {
                    condition: Box::new(self.check_expression(*condition)?),
                    if_true: Box::new(self.check_expression(*if_true)?),
                    if_false: Box::new(self.check_expression(*if_false)?),
                },
                None,
            ),
            ExprKind::Call { name, args } => {
                let signature = self
                    .function_sigs
                    .get(&name)
                    .ok_or_else(|| ValidationError::UndeclaredFunction { name: name.clone() })?;
                if signature.params.len() != args.len() {
                    return Err(ValidationError::ArityMismatch {
                        name,
                        expected: signature.params.len(),
                        found: args.len(),
                    });
                }
                let return_type = signature.return_type.clone();
                let args = args
                    .into_iter()
                    .map(|arg| self.check_expression(arg))
                    .collect::<ValidationResult<Vec<_>>>()?;
                Expression::new(ExprKind::Call { name, args }, Some(return_type))
            }
            ExprKind::Convert(_) => return Err(ValidationError::UnsupportedCast),
        })
    }

    fn resolve_variable(&self, name: &str) -> ValidationResult<TypeDesc> {
        if let Some(ty) = self.scopes.find(name) {
            return Ok(ty.clone());
        }
        if let Some((ty, _)) = self.global_definitions.get(name) {
            return Ok(ty.clone());
        }
        if let Some(ty) = self.global_declarations.get(name) {
            return Ok(ty.clone());
        }
        Err(ValidationError::UndeclaredVariable {
            name: name.to_owned(),
        })
    }
}

fn check_signatures_match(
    existing: &FunctionDeclaration,
    new: &FunctionDeclaration,
) -> ValidationResult<()> {
    if existing.return_type != new.return_type {
        return Err(ValidationError::ReturnTypeMismatch {
            name: new.name.clone(),
        });
    }
    if existing.params.len() != new.params.len() {
        return Err(ValidationError::ParamCountMismatch {
            name: new.name.clone(),
        });
    }
    for (a, b) in existing.params.iter().zip(&new.params) {
        if a != b {
            return Err(ValidationError::ParamTypeMismatch {
                name: new.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn validate_source(input: &str) -> ValidationResult<ValidatedProgram<Option<TypeDesc>>> {
        let tokens = Lexer::new(input).lex().expect("lexes");
        let program = Parser::new(tokens).parse().expect("parses");
        validate(program)
    }

    #[test]
    fn test_undeclared_variable() {
        assert_eq!(
            validate_source("int main() { return x; }"),
            Err(ValidationError::UndeclaredVariable {
                name: "x".to_owned()
            })
        );
    }

    #[test]
    fn test_duplicate_local_in_same_scope() {
        assert_eq!(
            validate_source("int main() { int x = 1; int x = 2; return x; }"),
            Err(ValidationError::DuplicateLocal {
                name: "x".to_owned()
            })
        );
    }

    #[test]
    fn test_shadowing_in_inner_scope_is_allowed() {
        assert!(validate_source("int main() { int x = 1; { int x = 2; return x; } }").is_ok());
    }

    #[test]
    fn test_matching_redeclarations_compile() {
        assert!(
            validate_source("int f(int); int f(int); int f(int x) { return x; }").is_ok()
        );
    }

    #[test]
    fn test_return_type_mismatch_is_rejected() {
        assert_eq!(
            validate_source("int f(int); long f(int);"),
            Err(ValidationError::ReturnTypeMismatch {
                name: "f".to_owned()
            })
        );
    }

    #[test]
    fn test_param_type_mismatch_is_rejected() {
        assert_eq!(
            validate_source("int f(int); int f(long);"),
            Err(ValidationError::ParamTypeMismatch {
                name: "f".to_owned()
            })
        );
    }

    #[test]
    fn test_duplicate_definition_is_rejected() {
        assert_eq!(
            validate_source("int f() { return 1; } int f() { return 2; }"),
            Err(ValidationError::DuplicateFunctionDefinition {
                name: "f".to_owned()
            })
        );
    }

    #[test]
    fn test_function_global_collision() {
        assert_eq!(
            validate_source("int f() { return 1; } int f = 2;"),
            Err(ValidationError::FunctionGlobalCollision {
                name: "f".to_owned()
            })
        );
        assert_eq!(
            validate_source("int g = 2; int g() { return 1; }"),
            Err(ValidationError::FunctionGlobalCollision {
                name: "g".to_owned()
            })
        );
    }

    #[test]
    fn test_call_arity_mismatch() {
        assert_eq!(
            validate_source("int f(int a, int b) { return a; } int main() { return f(1); }"),
            Err(ValidationError::ArityMismatch {
                name: "f".to_owned(),
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_call_to_undeclared_function() {
        assert_eq!(
            validate_source("int main() { return f(); }"),
            Err(ValidationError::UndeclaredFunction {
                name: "f".to_owned()
            })
        );
    }

    #[test]
    fn test_recursive_call_resolves() {
        assert!(validate_source("int f(int n) { return f(n); }").is_ok());
    }

    #[test]
    fn test_global_initialiser_is_folded() {
        let program = validate_source("int g = 2 * 3 + 4; int main() { return g; }").unwrap();
        let global = program.items.iter().find_map(|item| match item {
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
    }

    #[test]
    fn test_declared_global_becomes_zero_initialised() {
        let program = validate_source("int g; int main() { return g; }").unwrap();
        assert!(program.items.iter().any(|item| matches!(
            item,
            ValidatedItem::Global(ValidatedGlobal {
                value: Constant::Int(0),
                ..
            })
        )));
    }

    #[test]
    fn test_declaration_then_definition_is_single_definition() {
        let program = validate_source("int g; int g = 7;").unwrap();
        let globals: Vec<_> = program
            .items
            .iter()
            .filter_map(|item| match item {
                ValidatedItem::Global(global) => Some(global),
                _ => None,
            })
            .collect();
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].value, Constant::Int(7));
    }

    #[test]
    fn test_duplicate_global_definition_is_rejected() {
        assert_eq!(
            validate_source("int g = 1; int g = 2;"),
            Err(ValidationError::DuplicateGlobalDefinition {
                name: "g".to_owned()
            })
        );
    }

    #[test]
    fn test_global_redeclaration_type_mismatch() {
        assert_eq!(
            validate_source("int g; long g;"),
            Err(ValidationError::GlobalTypeMismatch {
                name: "g".to_owned()
            })
        );
    }

    #[test]
    fn test_global_initialiser_rejects_identifier_references() {
        assert!(matches!(
            validate_source("int a = 2; int b = a;"),
            Err(ValidationError::GlobalInitialiser { .. })
        ));
    }

    #[test]
    fn test_validated_symbols_are_unique_and_disjoint() {
        let program = validate_source(
            "int f(); int f() { return 1; } int g = 1; int h; int main() { return f(); }",
        )
        .unwrap();
        let mut function_names = vec![];
        let mut global_names = vec![];
        for item in &program.items {
            match item {
                ValidatedItem::Function(def) => function_names.push(def.name.clone()),
                ValidatedItem::Global(global) => global_names.push(global.name.clone()),
            }
        }
        let mut unique_functions = function_names.clone();
        unique_functions.dedup();
        assert_eq!(function_names, unique_functions);
        let mut unique_globals = global_names.clone();
        unique_globals.dedup();
        assert_eq!(global_names, unique_globals);
        assert!(function_names.iter().all(|name| !global_names.contains(name)));
    }

    #[test]
    fn test_scope_stack_balance_around_compound_statements() {
        let mut validator = Validator::new();
        validator.scopes.create_new_scope();
        let depth_before = validator.scopes.depth();

        let tokens = Lexer::new("{ int x = 1; { int y = x; } }").lex().unwrap();
        let mut parser = Parser::new(tokens);
        let statement = parser.parse_statement().unwrap();
        validator.check_statement(statement).unwrap();

        assert_eq!(validator.scopes.depth(), depth_before);
    }

    #[test]
    fn test_scope_stack_balance_on_error_paths() {
        let mut validator = Validator::new();
        validator.scopes.create_new_scope();
        let depth_before = validator.scopes.depth();

        let tokens = Lexer::new("{ int x = 1; { return missing; } }").lex().unwrap();
        let mut parser = Parser::new(tokens);
        let statement = parser.parse_statement().unwrap();
        assert!(validator.check_statement(statement).is_err());

        assert_eq!(validator.scopes.depth(), depth_before);
    }
}
