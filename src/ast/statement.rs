use super::constant::Constant;
use super::expression::Expression;
use super::types::TypeDesc;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement<T> {
    Return(Expression<T>),
    /// An expression statement; `None` is the null statement `;`.
    Expression(Option<Expression<T>>),
    If {
        condition: Expression<T>,
        then_branch: Box<Statement<T>>,
        else_branch: Option<Box<Statement<T>>>,
    },
    Compound(CompoundStatement<T>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundStatement<T> {
    pub items: Vec<BlockItem<T>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockItem<T> {
    Statement(Statement<T>),
    Declaration(Declaration<T>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration<T> {
    pub ty: TypeDesc,
    pub name: String,
    pub init: Option<Expression<T>>,
}

/// A function declaration only carries parameter types; names are optional
/// in that position and dropped if present.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub return_type: TypeDesc,
    pub name: String,
    pub params: Vec<TypeDesc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition<T> {
    pub return_type: TypeDesc,
    pub name: String,
    pub params: Vec<(TypeDesc, Option<String>)>,
    pub body: CompoundStatement<T>,
}

impl<T> FunctionDefinition<T> {
    /// The declaration-shaped view of this definition's signature.
    pub fn signature(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            return_type: self.return_type.clone(),
            name: self.name.clone(),
            params: self.params.iter().map(|(ty, _)| ty.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevelItem<T> {
    FunctionDeclaration(FunctionDeclaration),
    FunctionDefinition(FunctionDefinition<T>),
    GlobalDeclaration(Declaration<T>),
}

/// The parse result: top-level items in source order. Symbol validation and
/// typing happen in later passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Program<T> {
    pub items: Vec<TopLevelItem<T>>,
}

/// A global after validation: exactly one definition per name, with the
/// initialiser folded to a literal (zero when the source never defined it).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedGlobal {
    pub ty: TypeDesc,
    pub name: String,
    pub value: Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedItem<T> {
    Function(FunctionDefinition<T>),
    Global(ValidatedGlobal),
}

/// The post-semantic-analysis program: definitions only, deduplicated, in
/// source order (functions in definition order, then globals).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedProgram<T> {
    pub items: Vec<ValidatedItem<T>>,
}
