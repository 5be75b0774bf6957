//! Intermediate representation.
//!
//! A [`Program`] is the validated output of [`crate::parse`]. It is plain
//! data: structural validity is already guaranteed when one of these
//! trees exists, and the generator consumes it exactly once.
//!
//! A bare region name used as a value ([`Expression::BaseAddress`]) and an
//! access into that region ([`Expression::Access`]) are different shapes.
//! The former is the address of the region, the latter the 64-bit value
//! stored at some offset of it.

use crate::source::{Located, Location};
use std::{
    fmt::{self, Display},
    rc::Rc,
};

/// A whole program.
///
/// `end` is where the input ends. The exit sequence that follows the
/// last statement is attributed to it.
#[derive(Debug)]
pub struct Program {
    pub data: Vec<Located<DataInitialization>>,
    pub statements: Vec<Located<Statement>>,
    pub end: Location,
}

/// One of the two static memory regions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    /// Mutable region, `data`.
    Data,

    /// Read-only region, `const`.
    Const,
}

/// Static contents of eight bytes of a region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DataInitialization {
    pub section: Section,
    pub offset: u64,
    pub value: i64,
}

/// Base of a [`BaseOffset`] access.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Space {
    Stack,
    Region(Section),
}

/// `[base+offset]`, with a constant offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BaseOffset {
    pub space: Space,
    pub offset: u64,
}

/// Access width of the legacy sized forms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
    Dword,
    Qword,
}

/// Legacy sized access through an address held by an atom (`m8[...]`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Indirect {
    pub width: Width,
    pub address: Box<Expression>,
}

/// Store destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Place {
    Access(BaseOffset),
    Indirect(Indirect),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    Number { value: i64, wide: bool },
    StackPointer,
    BaseAddress(Section),
    Access(BaseOffset),
    Indirect(Indirect),
    Binary(Box<Expression>, BinaryOperator, Box<Expression>),
    Unary(UnaryOperator, Box<Expression>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    SignedDiv,
    UnsignedDiv,
    SignedRem,
    UnsignedRem,
    And,
    Or,
    Xor,
    Shl,
    SignedShr,
    UnsignedShr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    SignedLess,
    UnsignedLess,
    SignedLessOrEqual,
    UnsignedLessOrEqual,
    SignedGreater,
    UnsignedGreater,
    SignedGreaterOrEqual,
    UnsignedGreaterOrEqual,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub left: Expression,
    pub comparison: Comparison,
    pub right: Expression,
}

/// A label name, as written after `#`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub Rc<str>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JumpTarget {
    Label(Label),

    /// `END`, the generator-inserted end of program.
    End,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Label(Label),

    Assignment {
        target: Place,
        value: Expression,
    },

    ConditionalAssignment {
        target: Place,
        value: Expression,
        condition: Condition,
    },

    TernaryAssignment {
        target: Place,
        condition: Condition,
        then: Expression,
        otherwise: Expression,
    },

    CompoundAssignment {
        target: Place,
        operator: BinaryOperator,
        value: Expression,
    },

    Goto(JumpTarget),

    ConditionalGoto {
        target: JumpTarget,
        condition: Condition,
    },

    /// `pass * n`, `n` no-ops.
    Pass(u64),

    /// `sp = value` when `operator` is `None`, `sp op= value` otherwise.
    StackPointerUpdate {
        operator: Option<BinaryOperator>,
        value: Expression,
    },

    Align(u8),

    Syscall {
        name: Rc<str>,
        arguments: Vec<Expression>,
        output: Option<Place>,
    },
}

impl Display for Section {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Section::Data => "data",
            Section::Const => "const",
        })
    }
}

impl Display for DataInitialization {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "[{}+{}] = {}", self.section, self.offset, self.value)
    }
}

impl Display for BaseOffset {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.space {
            Space::Stack => write!(fmt, "[sp+{}]", self.offset),
            Space::Region(section) => write!(fmt, "[{}+{}]", section, self.offset),
        }
    }
}

impl Display for Indirect {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = match self.width {
            Width::Byte => 8,
            Width::Word => 16,
            Width::Dword => 32,
            Width::Qword => 64,
        };

        write!(fmt, "m{}[{}]", bits, self.address)
    }
}

impl Display for Place {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Access(access) => access.fmt(fmt),
            Place::Indirect(indirect) => indirect.fmt(fmt),
        }
    }
}

impl Display for Expression {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Number { value, wide: false } => write!(fmt, "{}", value),
            Expression::Number { value, wide: true } => write!(fmt, "{} {{wide}}", value),
            Expression::StackPointer => fmt.write_str("sp"),
            Expression::BaseAddress(section) => section.fmt(fmt),
            Expression::Access(access) => access.fmt(fmt),
            Expression::Indirect(indirect) => indirect.fmt(fmt),
            Expression::Binary(left, operator, right) => {
                write!(fmt, "{} {} {}", Operand(left.as_ref()), operator, Operand(right.as_ref()))
            }

            Expression::Unary(operator, operand) => {
                write!(fmt, "{}{}", operator, Operand(operand.as_ref()))
            }
        }
    }
}

/// Parenthesizes compound subexpressions.
struct Operand<'a>(&'a Expression);

impl Display for Operand<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            expr @ (Expression::Binary(..) | Expression::Unary(..)) => write!(fmt, "({})", expr),
            expr => expr.fmt(fmt),
        }
    }
}

impl Display for BinaryOperator {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOperator::*;

        fmt.write_str(match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            SignedDiv => "/s",
            UnsignedDiv => "/u",
            SignedRem => "%s",
            UnsignedRem => "%u",
            And => "&",
            Or => "|",
            Xor => "^",
            Shl => "<<",
            SignedShr => ">>s",
            UnsignedShr => ">>u",
        })
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            UnaryOperator::Neg => "-",
            UnaryOperator::Not => "~",
        })
    }
}

impl Display for Comparison {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Comparison::*;

        fmt.write_str(match self {
            Equal => "==",
            NotEqual => "!=",
            SignedLess => "<s",
            UnsignedLess => "<u",
            SignedLessOrEqual => "<=s",
            UnsignedLessOrEqual => "<=u",
            SignedGreater => ">s",
            UnsignedGreater => ">u",
            SignedGreaterOrEqual => ">=s",
            UnsignedGreaterOrEqual => ">=u",
        })
    }
}

impl Display for Condition {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {} {}", self.left, self.comparison, self.right)
    }
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl Display for JumpTarget {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpTarget::Label(label) => label.fmt(fmt),
            JumpTarget::End => fmt.write_str("END"),
        }
    }
}

impl Display for Statement {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Statement::*;

        match self {
            Label(label) => write!(fmt, "#{}", label),
            Assignment { target, value } => write!(fmt, "{} = {}", target, value),

            ConditionalAssignment {
                target,
                value,
                condition,
            } => write!(fmt, "{} = {} if {}", target, value, condition),

            TernaryAssignment {
                target,
                condition,
                then,
                otherwise,
            } => write!(fmt, "{} = ({}) ? {} : {}", target, condition, then, otherwise),

            CompoundAssignment {
                target,
                operator,
                value,
            } => write!(fmt, "{} {}= {}", target, operator, value),

            Goto(target) => write!(fmt, "goto {}", target),
            ConditionalGoto { target, condition } => {
                write!(fmt, "goto {} if {}", target, condition)
            }

            Pass(1) => fmt.write_str("pass"),
            Pass(count) => write!(fmt, "pass * {}", count),

            StackPointerUpdate {
                operator: None,
                value,
            } => write!(fmt, "sp = {}", value),

            StackPointerUpdate {
                operator: Some(operator),
                value,
            } => write!(fmt, "sp {}= {}", operator, value),

            Align(boundary) => write!(fmt, "align {}", boundary),

            Syscall {
                name,
                arguments,
                output,
            } => {
                if let Some(output) = output {
                    write!(fmt, "{} = ", output)?;
                }

                write!(fmt, "syscall {}", name)?;
                for argument in arguments {
                    write!(fmt, ", {}", argument)?;
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(offset: u64) -> Expression {
        Expression::Access(BaseOffset {
            space: Space::Stack,
            offset,
        })
    }

    #[test]
    fn displays_statements_in_source_syntax() {
        let statement = Statement::Assignment {
            target: Place::Access(BaseOffset {
                space: Space::Stack,
                offset: 0,
            }),
            value: Expression::Binary(
                Box::new(Expression::Access(BaseOffset {
                    space: Space::Region(Section::Data),
                    offset: 8,
                })),
                BinaryOperator::SignedShr,
                Box::new(Expression::Unary(
                    UnaryOperator::Not,
                    Box::new(Expression::Number {
                        value: 3,
                        wide: false,
                    }),
                )),
            ),
        };

        assert_eq!(statement.to_string(), "[sp+0] = [data+8] >>s (~3)");
    }

    #[test]
    fn displays_syscalls_and_conditions() {
        let call = Statement::Syscall {
            name: Rc::from("WriteFile"),
            arguments: vec![stack(8), Expression::BaseAddress(Section::Const)],
            output: Some(Place::Access(BaseOffset {
                space: Space::Stack,
                offset: 16,
            })),
        };

        assert_eq!(call.to_string(), "[sp+16] = syscall WriteFile, [sp+8], const");

        let jump = Statement::ConditionalGoto {
            target: JumpTarget::End,
            condition: Condition {
                left: stack(0),
                comparison: Comparison::UnsignedGreaterOrEqual,
                right: Expression::Number {
                    value: 0x10,
                    wide: true,
                },
            },
        };

        assert_eq!(jump.to_string(), "goto END if [sp+0] >=u 16 {wide}");
    }
}
