//! Syntax analysis.
//!
//! A recursive-descent parser that builds an [`ir::Program`] in a single
//! pass. Parsing stops at the first grammar violation; there is neither
//! recovery nor aggregation of errors.
//!
//! A program starts with a run of static data initializers of the form
//! `[data+8] = 10`. Each one is recognized by a bounded lookahead, and
//! the first construct that is not an initializer permanently switches
//! the parser to statements.
//!
//! Besides the grammar itself, the parser enforces the shape rules that
//! keep every statement down to a single primitive operation: at most one
//! binary operator per expression, no operators at all inside call
//! arguments, literal offsets only, unique labels and known jump targets.

use std::{collections::HashMap, iter::Peekable, marker::PhantomData};
use thiserror::Error;

use crate::{
    ir::{
        BaseOffset, BinaryOperator, Condition, DataInitialization, Expression, Indirect,
        JumpTarget, Label, Place, Program, Section, Space, Statement, UnaryOperator, Width,
    },
    lex::{Identifier, Keyword, Token},
    source::{Located, Location},
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1} instead")]
    Expected(&'static str, Token),

    #[error("Abrupt end of program")]
    UnexpectedEof,

    #[error("Alignment must be 8 or 16, found {0}")]
    BadAlignment(u64),

    #[error("Offset {0} is out of range, the maximum is {max}", max = i32::MAX)]
    BadOffset(u64),

    #[error("At most one binary operator is allowed in {0}")]
    NestedOperation(&'static str),

    #[error("Operators are not allowed in {0}")]
    ComputedOperand(&'static str),

    #[error("Region `const` is read-only")]
    ReadOnly,

    #[error("Label `{0}` is defined more than once")]
    DuplicateLabel(Label),

    #[error("Label `{0}` is not defined")]
    UndefinedLabel(Label),

    #[error("Initializer for `[{0}+{1}]` overlaps a previous one")]
    OverlappingData(Section, u64),
}

/// A stream of tokens.
pub trait TokenStream<'a>: Iterator<Item = &'a Located<Token>> + Clone {}

impl<'a, I> TokenStream<'a> for I where I: Iterator<Item = &'a Located<Token>> + Clone {}

/// Parses a whole program.
///
/// `start` is the location of the first character, used for errors that
/// occur before any token is read.
pub fn parse<'a>(tokens: impl TokenStream<'a>, start: Location) -> Result<Program, Located<ParserError>> {
    let mut parser = Parser {
        tokens: tokens.peekable(),
        last_known: start,
        lifetime_hack: PhantomData,
    };

    parser.program().map_err(Failure::coerce)
}

#[derive(Clone)]
struct Parser<'a, I: TokenStream<'a>> {
    tokens: Peekable<I>,
    last_known: Location,
    lifetime_hack: PhantomData<&'a ()>,
}

/// A weak failure means that a rule did not apply at all. A strict
/// failure means that it applied but was violated.
enum Failure {
    Weak(Located<ParserError>),
    Strict(Located<ParserError>),
}

impl Failure {
    fn weak(self) -> Self {
        Failure::Weak(self.coerce())
    }

    fn coerce(self) -> Located<ParserError> {
        match self {
            Failure::Weak(error) => error,
            Failure::Strict(error) => error,
        }
    }
}

type Parse<T> = Result<T, Failure>;

/// Where an expression appears, for shape checks and error messages.
#[derive(Copy, Clone)]
enum Role {
    Value,
    Operand,
    Condition,
    Argument,
    Address,
}

impl Role {
    fn describe(self) -> &'static str {
        match self {
            Role::Value => "an assigned value",
            Role::Operand => "the operand of a compound assignment",
            Role::Condition => "condition operands",
            Role::Argument => "syscall arguments",
            Role::Address => "legacy access addresses",
        }
    }
}

impl<'a, I: TokenStream<'a>> Parser<'a, I> {
    fn program(&mut self) -> Parse<Program> {
        self.skip_newlines();

        let mut data: Vec<Located<DataInitialization>> = Vec::new();
        while let Ok(init) = self.attempt(Parser::data_initialization) {
            let (location, init) = init.split();

            let overlaps = data.iter().map(Located::val).any(|other| {
                other.section == init.section
                    && other.offset < init.offset.saturating_add(8)
                    && init.offset < other.offset.saturating_add(8)
            });

            if overlaps {
                return Err(Failure::Strict(Located::at(
                    ParserError::OverlappingData(init.section, init.offset),
                    location,
                )));
            }

            data.push(Located::at(init, location));
            self.skip_newlines();
        }

        let mut statements = Vec::new();
        let end = loop {
            self.skip_newlines();
            if let Token::Eof = self.peek()? {
                break self.peek_location();
            }

            statements.push(self.statement()?);
            self.terminator()?;
        };

        check_labels(&statements)?;
        Ok(Program {
            data,
            statements,
            end,
        })
    }

    fn data_initialization(&mut self) -> Parse<Located<DataInitialization>> {
        let start = self.peek_location();

        let access = match self.access().map_err(Failure::weak)?.into_inner() {
            BaseOffset {
                space: Space::Region(section),
                offset,
            } => (section, offset),

            _ => return self.fail(ParserError::Expected("a region", Token::Keyword(Keyword::Sp))).map_err(Failure::weak),
        };

        self.expect(Token::Assign).map_err(Failure::weak)?;

        let negative = self.accept(Token::Binary(BinaryOperator::Sub));
        let value = match self.next()?.into_inner() {
            Token::Number(number) => number as i64,
            found => return self.fail(ParserError::Expected("a literal", found)).map_err(Failure::weak),
        };

        self.accept(Token::Wide);
        let location = Location::span(start, &self.last_known);

        // Only a bare literal makes this an initializer
        match self.peek()? {
            Token::Newline | Token::Eof => (),
            found => {
                let found = found.clone();
                return self.fail(ParserError::Expected("end of line", found)).map_err(Failure::weak);
            }
        }

        let (section, offset) = access;
        let value = if negative { value.wrapping_neg() } else { value };

        Ok(Located::at(
            DataInitialization {
                section,
                offset,
                value,
            },
            location,
        ))
    }

    fn statement(&mut self) -> Parse<Located<Statement>> {
        let start = self.peek_location();

        let statement = match self.peek()?.clone() {
            Token::Hash => self.label()?,
            Token::Keyword(Keyword::Goto) => self.goto()?,
            Token::Keyword(Keyword::Pass) => self.pass()?,
            Token::Keyword(Keyword::Align) => self.align()?,
            Token::Keyword(Keyword::Syscall) => self.syscall(None)?,
            Token::Keyword(Keyword::Sp) => self.stack_pointer_update()?,
            Token::OpenSquare | Token::Id(_) => self.memory_statement()?,

            found => {
                self.next()?;
                self.fail(ParserError::Expected("a statement", found))?
            }
        };

        Ok(Located::at(statement, Location::span(start, &self.last_known)))
    }

    fn label(&mut self) -> Parse<Statement> {
        self.expect(Token::Hash)?;
        let name = self.id()?;

        Ok(Statement::Label(Label(name.into_inner().name())))
    }

    fn goto(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Goto)?;

        let target = match self.next()?.into_inner() {
            Token::Keyword(Keyword::End) => JumpTarget::End,
            Token::Id(id) => JumpTarget::Label(Label(id.name())),
            found => self.fail(ParserError::Expected("a label or `END`", found))?,
        };

        if self.accept(Token::Keyword(Keyword::If)) {
            let condition = self.condition()?;
            Ok(Statement::ConditionalGoto { target, condition })
        } else {
            Ok(Statement::Goto(target))
        }
    }

    fn pass(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Pass)?;

        if self.accept(Token::Binary(BinaryOperator::Mul)) {
            Ok(Statement::Pass(self.number()?))
        } else {
            Ok(Statement::Pass(1))
        }
    }

    fn align(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Align)?;

        match self.number()? {
            8 => Ok(Statement::Align(8)),
            16 => Ok(Statement::Align(16)),
            other => self.fail(ParserError::BadAlignment(other)),
        }
    }

    fn syscall(&mut self, output: Option<Place>) -> Parse<Statement> {
        self.keyword(Keyword::Syscall)?;
        let name = self.id()?.into_inner().name();

        let mut arguments = Vec::new();
        while self.accept(Token::Comma) {
            arguments.push(self.operand(Role::Argument)?);
        }

        Ok(Statement::Syscall {
            name,
            arguments,
            output,
        })
    }

    fn stack_pointer_update(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Sp)?;

        let operator = match self.next()?.into_inner() {
            Token::Assign => None,
            Token::Compound(operator) => Some(operator),
            found => self.fail(ParserError::Expected("`=` or a compound assignment", found))?,
        };

        let value = match operator {
            None => self.value()?,
            Some(_) => self.operand(Role::Operand)?,
        };

        Ok(Statement::StackPointerUpdate { operator, value })
    }

    fn memory_statement(&mut self) -> Parse<Statement> {
        let target = self.place()?;

        match self.next()?.into_inner() {
            Token::Compound(operator) => {
                let value = self.operand(Role::Operand)?;
                Ok(Statement::CompoundAssignment {
                    target,
                    operator,
                    value,
                })
            }

            Token::Assign => {
                if let Token::Keyword(Keyword::Syscall) = self.peek()? {
                    return self.syscall(Some(target));
                }

                // `(` may open either a ternary condition or a subexpression
                if let Ok(condition) = self.attempt(Parser::ternary_head) {
                    let then = self.value()?;
                    self.expect(Token::Colon)?;
                    let otherwise = self.value()?;

                    return Ok(Statement::TernaryAssignment {
                        target,
                        condition,
                        then,
                        otherwise,
                    });
                }

                let value = self.value()?;
                if self.accept(Token::Keyword(Keyword::If)) {
                    let condition = self.condition()?;
                    Ok(Statement::ConditionalAssignment {
                        target,
                        value,
                        condition,
                    })
                } else {
                    Ok(Statement::Assignment { target, value })
                }
            }

            found => self.fail(ParserError::Expected("`=` or a compound assignment", found)),
        }
    }

    fn ternary_head(&mut self) -> Parse<Condition> {
        self.expect(Token::OpenParen).map_err(Failure::weak)?;
        let condition = self.condition()?;
        self.expect(Token::CloseParen)?;
        self.expect(Token::Question)?;

        Ok(condition)
    }

    fn condition(&mut self) -> Parse<Condition> {
        let left = self.operand(Role::Condition)?;

        let comparison = match self.next()?.into_inner() {
            Token::Compare(comparison) => comparison,
            found => self.fail(ParserError::Expected("a comparison", found))?,
        };

        let right = self.operand(Role::Condition)?;
        Ok(Condition {
            left,
            comparison,
            right,
        })
    }

    /// A store destination.
    fn place(&mut self) -> Parse<Place> {
        let legacy = matches!(self.peek()?, Token::Id(id) if legacy_width(id).is_some());
        let (location, place) = if legacy {
            self.legacy()?.map(Place::Indirect).split()
        } else {
            self.access()?.map(Place::Access).split()
        };

        match place {
            Place::Access(BaseOffset {
                space: Space::Region(Section::Const),
                ..
            }) => Err(Failure::Strict(Located::at(ParserError::ReadOnly, location))),

            place => Ok(place),
        }
    }

    /// `[base+offset]` or its `s[..]`, `d[..]`, `c[..]` sugar.
    fn access(&mut self) -> Parse<Located<BaseOffset>> {
        let start = self.peek_location();

        let access = match self.next()?.into_inner() {
            Token::OpenSquare => {
                let space = match self.next()?.into_inner() {
                    Token::Keyword(Keyword::Sp) => Space::Stack,
                    Token::Keyword(Keyword::Data) => Space::Region(Section::Data),
                    Token::Keyword(Keyword::Const) => Space::Region(Section::Const),
                    found => self.fail(ParserError::Expected("`sp`, `data` or `const`", found))?,
                };

                let offset = if self.accept(Token::Binary(BinaryOperator::Add)) {
                    self.offset()?
                } else {
                    0
                };

                self.expect(Token::CloseSquare)?;
                BaseOffset { space, offset }
            }

            Token::Id(id) => {
                let space = match id.as_ref() {
                    "s" => Space::Stack,
                    "d" => Space::Region(Section::Data),
                    "c" => Space::Region(Section::Const),
                    _ => self.fail(ParserError::Expected("a memory reference", Token::Id(id)))?,
                };

                self.expect(Token::OpenSquare)?;
                let offset = self.offset()?;
                self.expect(Token::CloseSquare)?;

                BaseOffset { space, offset }
            }

            found => self.fail(ParserError::Expected("a memory reference", found))?,
        };

        Ok(Located::at(access, Location::span(start, &self.last_known)))
    }

    /// `m8[atom]` through `m64[atom]`.
    fn legacy(&mut self) -> Parse<Located<Indirect>> {
        let (start, token) = self.next()?.split();

        let width = match &token {
            Token::Id(id) => legacy_width(id),
            _ => None,
        };

        let width = match width {
            Some(width) => width,
            None => self.fail(ParserError::Expected("a legacy access", token))?,
        };

        self.expect(Token::OpenSquare)?;
        let address = self.operand(Role::Address)?;
        self.expect(Token::CloseSquare)?;

        let indirect = Indirect {
            width,
            address: Box::new(address),
        };

        Ok(Located::at(indirect, Location::span(start, &self.last_known)))
    }

    fn offset(&mut self) -> Parse<u64> {
        let offset = self.number()?;
        if i32::try_from(offset).is_err() {
            return self.fail(ParserError::BadOffset(offset));
        }

        Ok(offset)
    }

    /// An expression with at most one binary operator.
    fn value(&mut self) -> Parse<Expression> {
        let (location, expr) = self.expr()?.split();
        if binary_operations(&expr) > 1 {
            return Err(Failure::Strict(Located::at(
                ParserError::NestedOperation(Role::Value.describe()),
                location,
            )));
        }

        Ok(expr)
    }

    /// An expression constrained by its role.
    fn operand(&mut self, role: Role) -> Parse<Expression> {
        let (location, expr) = self.expr()?.split();

        let allowed = match role {
            Role::Value => binary_operations(&expr) <= 1,
            Role::Operand | Role::Condition => binary_operations(&expr) == 0,
            Role::Argument | Role::Address => is_atom(&expr, matches!(role, Role::Argument)),
        };

        if allowed {
            Ok(expr)
        } else {
            let error = ParserError::ComputedOperand(role.describe());
            Err(Failure::Strict(Located::at(error, location)))
        }
    }

    /// Flat, left-associative binary operations over unary operands.
    fn expr(&mut self) -> Parse<Located<Expression>> {
        let start = self.peek_location();
        let mut expr = self.unary()?;

        while let Token::Binary(operator) = self.peek()? {
            let operator = *operator;
            self.next()?;

            let right = self.unary()?;
            expr = Expression::Binary(Box::new(expr), operator, Box::new(right));
        }

        Ok(Located::at(expr, Location::span(start, &self.last_known)))
    }

    fn unary(&mut self) -> Parse<Expression> {
        let operator = match self.peek()? {
            Token::Binary(BinaryOperator::Sub) => UnaryOperator::Neg,
            Token::Tilde => UnaryOperator::Not,
            _ => return self.primary(),
        };

        self.next()?;
        let operand = self.unary()?;

        Ok(Expression::Unary(operator, Box::new(operand)))
    }

    fn primary(&mut self) -> Parse<Expression> {
        match self.peek()?.clone() {
            Token::Number(value) => {
                self.next()?;
                let wide = self.accept(Token::Wide);

                Ok(Expression::Number {
                    value: value as i64,
                    wide,
                })
            }

            Token::Keyword(Keyword::Sp) => {
                self.next()?;
                Ok(Expression::StackPointer)
            }

            Token::Keyword(Keyword::Data) => {
                self.next()?;
                Ok(Expression::BaseAddress(Section::Data))
            }

            Token::Keyword(Keyword::Const) => {
                self.next()?;
                Ok(Expression::BaseAddress(Section::Const))
            }

            Token::OpenParen => {
                self.next()?;
                let expr = self.expr()?.into_inner();
                self.expect(Token::CloseParen)?;

                Ok(expr)
            }

            Token::Id(id) if legacy_width(&id).is_some() => {
                Ok(Expression::Indirect(self.legacy()?.into_inner()))
            }

            Token::OpenSquare | Token::Id(_) => Ok(Expression::Access(self.access()?.into_inner())),

            found => {
                self.next()?;
                self.fail(ParserError::Expected("an expression", found))
            }
        }
    }

    /// Statements end at a line break or at the end of input.
    fn terminator(&mut self) -> Parse<()> {
        match self.peek()? {
            Token::Eof => Ok(()),
            Token::Newline => self.next().map(drop),
            found => {
                let found = found.clone();
                self.next()?;
                self.fail(ParserError::Expected("end of line", found))
            }
        }
    }

    fn skip_newlines(&mut self) {
        while self.accept(Token::Newline) {}
    }

    fn attempt<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        let mut fork = self.clone();

        let result = rule(&mut fork);
        if result.is_ok() {
            *self = fork;
        }

        result
    }

    fn number(&mut self) -> Parse<u64> {
        match self.next()?.into_inner() {
            Token::Number(number) => Ok(number),
            found => self.fail(ParserError::Expected("a literal number", found)),
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(id) => Ok(Located::at(id, location)),
            found => self.fail(ParserError::Expected("an identifier", found)),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    /// Consumes the next token if it is `token`.
    fn accept(&mut self, token: Token) -> bool {
        match self.tokens.peek() {
            Some(next) if *next.val() == token => {
                self.last_known = next.location().clone();
                self.tokens.next();
                true
            }

            _ => false,
        }
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        let found = self.next()?.into_inner();
        if found == token {
            Ok(())
        } else {
            let expected = match token {
                Token::Assign => "`=`",
                Token::Colon => "`:`",
                Token::Question => "`?`",
                Token::OpenParen => "`(`",
                Token::CloseParen => "`)`",
                Token::OpenSquare => "`[`",
                Token::CloseSquare => "`]`",
                Token::Hash => "`#`",
                Token::Keyword(Keyword::Goto) => "`goto`",
                Token::Keyword(Keyword::Pass) => "`pass`",
                Token::Keyword(Keyword::Align) => "`align`",
                Token::Keyword(Keyword::Syscall) => "`syscall`",
                Token::Keyword(Keyword::Sp) => "`sp`",
                _ => "another token",
            };

            self.fail(ParserError::Expected(expected, found))
        }
    }

    fn peek(&mut self) -> Parse<&Token> {
        match self.tokens.peek() {
            Some(token) => Ok(token.val()),
            None => Err(Failure::Strict(Located::at(
                ParserError::UnexpectedEof,
                self.last_known.clone(),
            ))),
        }
    }

    fn peek_location(&mut self) -> Location {
        match self.tokens.peek() {
            Some(token) => token.location().clone(),
            None => self.last_known.clone(),
        }
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token.clone())
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Failure::Strict(Located::at(error, self.last_known.clone())))
    }
}

/// Width of a legacy access prefix, if `id` is one.
fn legacy_width(id: &Identifier) -> Option<Width> {
    match id.as_ref() {
        "m8" => Some(Width::Byte),
        "m16" => Some(Width::Word),
        "m32" => Some(Width::Dword),
        "m64" => Some(Width::Qword),
        _ => None,
    }
}

/// Counts binary operators anywhere in an expression.
fn binary_operations(expr: &Expression) -> usize {
    match expr {
        Expression::Binary(left, _, right) => {
            1 + binary_operations(left) + binary_operations(right)
        }

        Expression::Unary(_, operand) => binary_operations(operand),
        _ => 0,
    }
}

/// Operator-free operands. Legacy accesses count when `indirect` is set.
fn is_atom(expr: &Expression, indirect: bool) -> bool {
    match expr {
        Expression::Number { .. }
        | Expression::StackPointer
        | Expression::BaseAddress(_)
        | Expression::Access(_) => true,

        Expression::Indirect(_) => indirect,
        Expression::Binary(..) | Expression::Unary(..) => false,
    }
}

/// Labels must be unique and every jump must land on one.
fn check_labels(statements: &[Located<Statement>]) -> Parse<()> {
    let mut defined = HashMap::new();
    for statement in statements {
        if let Statement::Label(label) = statement.val() {
            if defined.insert(label.clone(), statement.location()).is_some() {
                return Err(Failure::Strict(Located::at(
                    ParserError::DuplicateLabel(label.clone()),
                    statement.location().clone(),
                )));
            }
        }
    }

    for statement in statements {
        let target = match statement.val() {
            Statement::Goto(target) => target,
            Statement::ConditionalGoto { target, .. } => target,
            _ => continue,
        };

        if let JumpTarget::Label(label) = target {
            if !defined.contains_key(label) {
                return Err(Failure::Strict(Located::at(
                    ParserError::UndefinedLabel(label.clone()),
                    statement.location().clone(),
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, source};

    fn program(text: &str) -> Result<Program, Located<ParserError>> {
        let (start, stream) = source::consume(text.as_bytes(), "<test>");
        let tokens = Lexer::new(start.clone(), stream)
            .tokenize()
            .expect("lexical error in test input");

        parse(tokens.iter(), start)
    }

    fn statements(text: &str) -> Vec<String> {
        let program = program(text).unwrap();
        program
            .statements
            .iter()
            .map(|statement| statement.val().to_string())
            .collect()
    }

    fn error(text: &str) -> ParserError {
        match program(text) {
            Ok(_) => panic!("expected a syntax error in {:?}", text),
            Err(error) => error.into_inner(),
        }
    }

    #[test]
    fn leading_initializers_become_static_data() {
        let program = program("\n[data+0] = 10\nd[8] = -2\n[const+16] = 0xFF{wide}\ns[0] = d[0]\n[data+24] = 1\n").unwrap();

        let data: Vec<_> = program.data.iter().map(|init| *init.val()).collect();
        assert_eq!(
            data,
            vec![
                DataInitialization { section: Section::Data, offset: 0, value: 10 },
                DataInitialization { section: Section::Data, offset: 8, value: -2 },
                DataInitialization { section: Section::Const, offset: 16, value: 255 },
            ]
        );

        // Once statements begin, region stores are ordinary assignments
        assert_eq!(program.statements.len(), 2);
        assert_eq!(program.statements[1].val().to_string(), "[data+24] = 1");
    }

    #[test]
    fn non_literal_initializer_switches_to_statements() {
        let program = program("[data+0] = 1 + 2\n[data+8] = 3\n").unwrap();

        assert!(program.data.is_empty());
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn sugar_is_identical_to_bracket_form() {
        let sugar = program("s[8] = d[16] + c[24]").unwrap();
        let plain = program("[sp+8] = [data+16] + [const+24]").unwrap();

        assert_eq!(sugar.statements[0].val(), plain.statements[0].val());
        assert_eq!(sugar.statements[0].val().to_string(), "[sp+8] = [data+16] + [const+24]");
    }

    #[test]
    fn region_name_is_an_address_not_a_value() {
        let program = program("s[0] = data\ns[0] = d[0]").unwrap();

        let values: Vec<_> = program
            .statements
            .iter()
            .map(|statement| match statement.val() {
                Statement::Assignment { value, .. } => value.clone(),
                other => panic!("unexpected {}", other),
            })
            .collect();

        assert_eq!(values[0], Expression::BaseAddress(Section::Data));
        assert_eq!(
            values[1],
            Expression::Access(BaseOffset {
                space: Space::Region(Section::Data),
                offset: 0
            })
        );
    }

    #[test]
    fn parses_every_statement_form() {
        let text = "\
            #top\n\
            s[0] = 7\n\
            s[8] = s[0] if s[16] <u 3\n\
            s[8] = (s[0] >=s -1) ? s[16] : 0x10\n\
            s[8] >>u= 2\n\
            goto top if s[8] != 0\n\
            pass\n\
            pass * 3\n\
            sp -= 16\n\
            sp = sp + 8\n\
            align 16\n\
            syscall ExitProcess, s[0]\n\
            s[24] = syscall GetStdHandle, 0xFFFFFFFFFFFFFFF5\n\
            m32[sp] = m8[d[0]]\n\
            goto END\n";

        assert_eq!(
            statements(text),
            vec![
                "#top",
                "[sp+0] = 7",
                "[sp+8] = [sp+0] if [sp+16] <u 3",
                "[sp+8] = ([sp+0] >=s -1) ? [sp+16] : 16",
                "[sp+8] >>u= 2",
                "goto top if [sp+8] != 0",
                "pass",
                "pass * 3",
                "sp -= 16",
                "sp = sp + 8",
                "align 16",
                "syscall ExitProcess, [sp+0]",
                "[sp+24] = syscall GetStdHandle, -11",
                "m32[sp] = m8[[data+0]]",
                "goto END",
            ]
        );
    }

    #[test]
    fn parenthesized_values_are_not_ternaries() {
        assert_eq!(statements("s[0] = (s[8] + 1)"), vec!["[sp+0] = [sp+8] + 1"]);
        assert_eq!(statements("s[0] = -(s[8])"), vec!["[sp+0] = -[sp+8]"]);
    }

    #[test]
    fn operators_are_counted_through_parentheses() {
        assert!(matches!(error("sp = sp - 8 * 2"), ParserError::NestedOperation(_)));
        assert!(matches!(error("s[0] = (1 - 2) * 3"), ParserError::NestedOperation(_)));

        match program_value("s[0] = -(1 - 2)") {
            Expression::Unary(UnaryOperator::Neg, operand) => {
                assert!(matches!(*operand, Expression::Binary(_, BinaryOperator::Sub, _)))
            }

            other => panic!("unexpected {}", other),
        }
    }

    fn program_value(text: &str) -> Expression {
        match program(text).map(|program| program.statements) {
            Ok(statements) => match statements[0].val() {
                Statement::Assignment { value, .. } => value.clone(),
                other => panic!("unexpected {}", other),
            },

            Err(error) => panic!("unexpected error: {}", error.val()),
        }
    }

    #[test]
    fn enforces_operation_shape() {
        assert!(matches!(error("s[0] = 1 + 2 + 3"), ParserError::NestedOperation(_)));
        assert!(matches!(error("s[0] += s[8] + 1"), ParserError::ComputedOperand(_)));
        assert!(matches!(error("goto END if s[0] + 1 == 2"), ParserError::ComputedOperand(_)));
        assert!(matches!(error("syscall Sleep, s[0] + 1"), ParserError::ComputedOperand(_)));
        assert!(matches!(error("syscall Sleep, -1"), ParserError::ComputedOperand(_)));
        assert!(matches!(error("s[0] = m8[m8[sp]]"), ParserError::ComputedOperand(_)));

        // Unary prefixes are fine inside conditions
        assert_eq!(statements("goto END if -s[0] <s ~1"), vec!["goto END if -[sp+0] <s ~1"]);
    }

    #[test]
    fn rejects_invalid_statements() {
        assert!(matches!(error("align 4"), ParserError::BadAlignment(4)));
        assert!(matches!(error("s[0] = 1\nc[0] = 1"), ParserError::ReadOnly));
        assert!(matches!(error("s[0] = 1\n[const+8] += 1"), ParserError::ReadOnly));
        assert!(matches!(error("s[2147483648] = 0"), ParserError::BadOffset(2147483648)));
        assert!(matches!(error("s[0] = 1 s[8] = 2"), ParserError::Expected("end of line", _)));
        assert!(matches!(error("[sp+sp] = 1"), ParserError::Expected(..)));
        assert!(matches!(error("x[0] = 1"), ParserError::Expected("a memory reference", _)));
        assert!(matches!(error("goto 12"), ParserError::Expected(..)));
        assert!(matches!(error("s[0] = "), ParserError::Expected("an expression", Token::Newline)));
    }

    #[test]
    fn validates_labels() {
        assert!(matches!(
            error("#a\npass\n#a"),
            ParserError::DuplicateLabel(Label(name)) if &*name == "a"
        ));

        assert!(matches!(
            error("goto nowhere"),
            ParserError::UndefinedLabel(Label(name)) if &*name == "nowhere"
        ));

        // Forward jumps are fine
        assert_eq!(statements("goto later\n#later").len(), 2);
    }

    #[test]
    fn rejects_overlapping_initializers() {
        assert!(matches!(
            error("[data+0] = 1\n[data+4] = 2"),
            ParserError::OverlappingData(Section::Data, 4)
        ));

        // Same offsets in different regions do not overlap
        assert_eq!(program("d[0] = 1\nc[0] = 2").unwrap().data.len(), 2);
    }

    #[test]
    fn errors_point_at_the_offending_token() {
        let error = program("pass\npass\nalign 12").unwrap_err();

        assert_eq!(error.location().start().line(), 3);
        assert_eq!(error.location().start().column(), 7);
    }
}
