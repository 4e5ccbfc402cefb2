//! Parser for the supported C subset.
//!
//! Recursive descent over declarations and statements, with a Pratt
//! (precedence-climbing) expression parser in [`expression`]. The parser
//! performs no symbol validation; undeclared names, arity mismatches and the
//! like are caught by the validator pass.

mod expression;

use thiserror::Error;

use crate::ast::{
    BlockItem, CompoundStatement, Constant, Declaration, ExprKind, Expression,
    FunctionDeclaration, FunctionDefinition, Program, Statement, TopLevelItem, TypeDesc,
};
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found `{found}`")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: u32,
    },
    #[error("line {line}: `{construct}` is not supported")]
    Unsupported { construct: String, line: u32 },
    #[error("line {line}: invalid type name `{spelling}`")]
    InvalidType { spelling: String, line: u32 },
    #[error("line {line}: invalid {kind} constant `{lexeme}`")]
    InvalidConstant {
        kind: &'static str,
        lexeme: String,
        line: u32,
    },
    #[error("line {line}: invalid lvalue in {context}")]
    InvalidLvalue { context: &'static str, line: u32 },
    #[error("line {line}: called expression is not a function name")]
    InvalidCallTarget { line: u32 },
    #[error("unexpected end of file")]
    UnexpectedEof,
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    current: usize,
}

impl<'src> Parser<'src> {
    /// The token stream must be terminated by an `Eof` token, which is what
    /// [`crate::lexer::Lexer::lex`] produces.
    pub fn new(tokens: Vec<Token<'src>>) -> Self {
        debug_assert!(matches!(
            tokens.last().map(|t| t.kind),
            Some(TokenKind::Eof)
        ));
        Self { tokens, current: 0 }
    }

    pub fn parse(mut self) -> ParseResult<Program<()>> {
        let mut items = vec![];
        while self.peek().kind != TokenKind::Eof {
            items.push(self.parse_top_level_item()?);
        }
        Ok(Program { items })
    }

    pub(crate) fn peek(&self) -> Token<'src> {
        self.peek_n(0)
    }

    pub(crate) fn peek_n(&self, lookahead: usize) -> Token<'src> {
        let last = self.tokens.len() - 1;
        self.tokens[(self.current + lookahead).min(last)]
    }

    pub(crate) fn advance(&mut self) -> Token<'src> {
        let token = self.peek();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token<'src>> {
        let token = self.advance();
        if token.kind != kind {
            return Err(ParseError::UnexpectedToken {
                expected: expected.to_owned(),
                found: token.to_string(),
                line: token.line,
            });
        }
        Ok(token)
    }

    fn parse_top_level_item(&mut self) -> ParseResult<TopLevelItem<()>> {
        let return_type = self.parse_type()?;
        let name_token = self.expect(TokenKind::Identifier, "identifier")?;
        let name = name_token.lexeme.to_owned();

        if self.peek().kind != TokenKind::LeftParen {
            // global variable declaration, with or without initialiser
            let init = self.parse_optional_initializer()?;
            self.expect(TokenKind::Semicolon, "`;` in global variable declaration")?;
            return Ok(TopLevelItem::GlobalDeclaration(Declaration {
                ty: return_type,
                name,
                init,
            }));
        }

        self.advance(); // consume `(`
        let params = self.parse_parameter_list()?;
        self.expect(TokenKind::RightParen, "`)` in function declaration")?;

        match self.peek().kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(TopLevelItem::FunctionDeclaration(FunctionDeclaration {
                    return_type,
                    name,
                    params: params.into_iter().map(|(ty, _)| ty).collect(),
                }))
            }
            TokenKind::LeftCurly => {
                let mut body = self.parse_compound_statement()?;
                if name == "main" && !has_return_statement(&body) {
                    // `main` falls back to returning 0, so the emitter never
                    // has to deal with control falling off its end
                    body.items.push(BlockItem::Statement(Statement::Return(
                        Expression::untyped(ExprKind::Constant(Constant::Int(0))),
                    )));
                }
                Ok(TopLevelItem::FunctionDefinition(FunctionDefinition {
                    return_type,
                    name,
                    params,
                    body,
                }))
            }
            _ => {
                let token = self.peek();
                Err(ParseError::UnexpectedToken {
                    expected: "`;` or `{` after function declarator".to_owned(),
                    found: token.to_string(),
                    line: token.line,
                })
            }
        }
    }

    fn parse_parameter_list(&mut self) -> ParseResult<Vec<(TypeDesc, Option<String>)>> {
        let mut params = vec![];
        if self.peek().kind == TokenKind::RightParen {
            return Ok(params); // e.g. `int main()`
        }
        loop {
            if !self.at_type_start() {
                let token = self.peek();
                return Err(ParseError::UnexpectedToken {
                    expected: "type name in parameter list".to_owned(),
                    found: token.to_string(),
                    line: token.line,
                });
            }
            let ty = self.parse_type()?;
            let name = if self.peek().kind == TokenKind::Identifier {
                Some(self.advance().lexeme.to_owned())
            } else {
                None
            };
            params.push((ty, name));

            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(params)
    }

    pub(crate) fn parse_statement(&mut self) -> ParseResult<Statement<()>> {
        match self.peek().kind {
            TokenKind::Eof => Err(ParseError::UnexpectedEof),
            TokenKind::ReturnKeyword => {
                self.advance();
                let expr = self.parse_expression(0)?;
                self.expect(TokenKind::Semicolon, "`;` in statement")?;
                Ok(Statement::Return(expr))
            }
            TokenKind::IfKeyword => self.parse_if_statement(),
            TokenKind::LeftCurly => Ok(Statement::Compound(self.parse_compound_statement()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Expression(None))
            }
            _ => {
                let expr = self.parse_expression(0)?;
                self.expect(TokenKind::Semicolon, "`;` in statement")?;
                Ok(Statement::Expression(Some(expr)))
            }
        }
    }

    fn parse_if_statement(&mut self) -> ParseResult<Statement<()>> {
        self.expect(TokenKind::IfKeyword, "`if` keyword")?;
        self.expect(TokenKind::LeftParen, "`(` in if statement")?;
        let condition = self.parse_expression(0)?;
        self.expect(TokenKind::RightParen, "`)` in if statement")?;

        let then_branch = Box::new(self.parse_statement()?);

        if self.peek().kind != TokenKind::ElseKeyword {
            return Ok(Statement::If {
                condition,
                then_branch,
                else_branch: None,
            });
        }
        self.advance(); // consume `else`
        let else_branch = Some(Box::new(self.parse_statement()?));
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_compound_statement(&mut self) -> ParseResult<CompoundStatement<()>> {
        self.expect(TokenKind::LeftCurly, "`{` in statement")?;

        let mut items = vec![];
        while self.peek().kind != TokenKind::RightCurly {
            if self.peek().kind == TokenKind::Eof {
                return Err(ParseError::UnexpectedEof);
            }
            if self.at_type_start() {
                items.push(BlockItem::Declaration(self.parse_declaration()?));
            } else {
                items.push(BlockItem::Statement(self.parse_statement()?));
            }
        }
        self.advance(); // consume `}`

        Ok(CompoundStatement { items })
    }

    fn parse_declaration(&mut self) -> ParseResult<Declaration<()>> {
        let ty = self.parse_type()?;
        let name = self
            .expect(TokenKind::Identifier, "identifier in declaration")?
            .lexeme
            .to_owned();
        let init = self.parse_optional_initializer()?;
        self.expect(TokenKind::Semicolon, "`;` in declaration")?;
        Ok(Declaration { ty, name, init })
    }

    fn parse_optional_initializer(&mut self) -> ParseResult<Option<Expression<()>>> {
        if self.peek().kind != TokenKind::Equals {
            return Ok(None);
        }
        self.advance(); // consume `=`
        Ok(Some(self.parse_expression(0)?))
    }

    fn at_type_start(&self) -> bool {
        is_type_keyword(self.peek().kind)
            || matches!(
                self.peek().kind,
                TokenKind::StructKeyword | TokenKind::TypedefKeyword
            )
    }

    /// Parse a (possibly multi-word) type name into its descriptor, using
    /// the canonical spelling, size and alignment from the primitive table.
    fn parse_type(&mut self) -> ParseResult<TypeDesc> {
        let first = self.peek();
        match first.kind {
            TokenKind::StructKeyword | TokenKind::TypedefKeyword => {
                return Err(ParseError::Unsupported {
                    construct: first.lexeme.to_owned(),
                    line: first.line,
                });
            }
            _ => {}
        }
        if !is_type_keyword(first.kind) {
            return Err(ParseError::UnexpectedToken {
                expected: "type name".to_owned(),
                found: first.to_string(),
                line: first.line,
            });
        }

        let mut words = vec![];
        while is_type_keyword(self.peek().kind) {
            words.push(self.advance().lexeme);
        }
        let spelling = words.join(" ");

        canonical_type_name(&words)
            .as_deref()
            .and_then(TypeDesc::primitive)
            .ok_or(ParseError::InvalidType {
                spelling,
                line: first.line,
            })
    }
}

fn is_type_keyword(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::CharKeyword
            | TokenKind::ShortKeyword
            | TokenKind::IntKeyword
            | TokenKind::LongKeyword
            | TokenKind::FloatKeyword
            | TokenKind::DoubleKeyword
            | TokenKind::SignedKeyword
            | TokenKind::UnsignedKeyword
    )
}

/// Reduce a sequence of type keywords to the canonical spelling used by the
/// primitive table, or `None` when the combination is not a valid type.
/// `short int`, `long int` and friends collapse onto their canonical names.
fn canonical_type_name(words: &[&str]) -> Option<String> {
    let mut signed = false;
    let mut unsigned = false;
    let mut longs = 0u32;
    let mut ints = 0u32;
    let mut base: Option<&str> = None;

    for &word in words {
        match word {
            "signed" if !signed && !unsigned => signed = true,
            "unsigned" if !signed && !unsigned => unsigned = true,
            "long" if longs < 2 => longs += 1,
            "int" if ints == 0 => ints += 1,
            "char" | "short" | "float" | "double" if base.is_none() => base = Some(word),
            _ => return None,
        }
    }

    // `int` may accompany `short` and `long`, nothing else
    if ints > 0 && matches!(base, Some("char" | "float" | "double")) {
        return None;
    }

    let name = match (base, longs) {
        (Some("float"), 0) if !signed && !unsigned && ints == 0 => "float",
        (Some("double"), 0) if !signed && !unsigned => "double",
        (Some("double"), 1) if !signed && !unsigned => "long double",
        (Some("char"), 0) if unsigned => "unsigned char",
        (Some("char"), 0) if signed => "signed char",
        (Some("char"), 0) => "char",
        (Some("short"), 0) if unsigned => "unsigned short",
        (Some("short"), 0) => "short",
        (None, 0) if unsigned => "unsigned int",
        (None, 0) if signed || ints > 0 => "int",
        (None, 1) if unsigned => "unsigned long",
        (None, 1) => "long",
        (None, 2) if unsigned => "unsigned long long",
        (None, 2) => "long long",
        _ => return None,
    };
    Some(name.to_owned())
}

fn has_return_statement(body: &CompoundStatement<()>) -> bool {
    body.items
        .iter()
        .any(|item| matches!(item, BlockItem::Statement(Statement::Return(_))))
}
