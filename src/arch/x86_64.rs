//! x86-64 registers, operands and instructions.
//!
//! Instructions are kept in Intel operand order (destination first).
//! Dialects that use a different order reverse them while formatting.

use crate::ir::{Comparison, Width};

/// General-purpose register.
///
/// Only the registers that the lowering rules touch are listed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsp,
    R8,
    R9,
    R10,
    R11,
}

impl Reg {
    /// Windows x64 argument registers, in order.
    pub const ARGUMENTS: [Reg; 4] = [Reg::Rcx, Reg::Rdx, Reg::R8, Reg::R9];

    /// Name of the register when accessed with some width.
    pub fn name(self, width: Width) -> &'static str {
        use {Reg::*, Width::*};

        match (self, width) {
            (Rax, Qword) => "rax",
            (Rax, Dword) => "eax",
            (Rax, Word) => "ax",
            (Rax, Byte) => "al",
            (Rbx, Qword) => "rbx",
            (Rbx, Dword) => "ebx",
            (Rbx, Word) => "bx",
            (Rbx, Byte) => "bl",
            (Rcx, Qword) => "rcx",
            (Rcx, Dword) => "ecx",
            (Rcx, Word) => "cx",
            (Rcx, Byte) => "cl",
            (Rdx, Qword) => "rdx",
            (Rdx, Dword) => "edx",
            (Rdx, Word) => "dx",
            (Rdx, Byte) => "dl",
            (Rsp, Qword) => "rsp",
            (Rsp, Dword) => "esp",
            (Rsp, Word) => "sp",
            (Rsp, Byte) => "spl",
            (R8, Qword) => "r8",
            (R8, Dword) => "r8d",
            (R8, Word) => "r8w",
            (R8, Byte) => "r8b",
            (R9, Qword) => "r9",
            (R9, Dword) => "r9d",
            (R9, Word) => "r9w",
            (R9, Byte) => "r9b",
            (R10, Qword) => "r10",
            (R10, Dword) => "r10d",
            (R10, Word) => "r10w",
            (R10, Byte) => "r10b",
            (R11, Qword) => "r11",
            (R11, Dword) => "r11d",
            (R11, Word) => "r11w",
            (R11, Byte) => "r11b",
        }
    }

    /// Accesses the low `width` bytes of this register.
    pub fn sized(self, width: Width) -> Operand {
        Operand::Reg(self, width)
    }
}

/// Base of a memory operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Base {
    /// A register holds the base address.
    Reg(Reg),

    /// Absolute address of a symbol.
    Absolute(&'static str),

    /// Address of a symbol, relative to the next instruction.
    RipRelative(&'static str),
}

/// A memory operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Memory {
    pub base: Base,
    pub displacement: i64,
    pub width: Width,
}

impl Memory {
    /// A full quadword at `displacement` from a register.
    pub fn at(reg: Reg, displacement: i64) -> Self {
        Memory {
            base: Base::Reg(reg),
            displacement,
            width: Width::Qword,
        }
    }

    /// Same operand with another access width.
    pub fn sized(self, width: Width) -> Self {
        Memory { width, ..self }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg, Width),
    Imm(i64),
    Mem(Memory),

    /// Address of a symbol as an immediate.
    Symbol(&'static str),

    /// Jump or call target.
    Target(String),
}

impl From<Reg> for Operand {
    fn from(reg: Reg) -> Self {
        Operand::Reg(reg, Width::Qword)
    }
}

impl From<Memory> for Operand {
    fn from(memory: Memory) -> Self {
        Operand::Mem(memory)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Imm(value)
    }
}

/// Condition codes for conditional jumps.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cond {
    E,
    Ne,
    L,
    Ge,
    Le,
    G,
    B,
    Ae,
    Be,
    A,
}

impl Cond {
    /// Condition that holds exactly when this one does not.
    pub fn inverse(self) -> Cond {
        use Cond::*;

        match self {
            E => Ne,
            Ne => E,
            L => Ge,
            Ge => L,
            Le => G,
            G => Le,
            B => Ae,
            Ae => B,
            Be => A,
            A => Be,
        }
    }

    /// Mnemonic suffix, as in `j<suffix>`.
    pub fn suffix(self) -> &'static str {
        use Cond::*;

        match self {
            E => "e",
            Ne => "ne",
            L => "l",
            Ge => "ge",
            Le => "le",
            G => "g",
            B => "b",
            Ae => "ae",
            Be => "be",
            A => "a",
        }
    }
}

impl From<Comparison> for Cond {
    fn from(comparison: Comparison) -> Self {
        use Comparison::*;

        // Signed orderings test SF/OF, unsigned ones test CF
        match comparison {
            Equal => Cond::E,
            NotEqual => Cond::Ne,
            SignedLess => Cond::L,
            SignedGreaterOrEqual => Cond::Ge,
            SignedLessOrEqual => Cond::Le,
            SignedGreater => Cond::G,
            UnsignedLess => Cond::B,
            UnsignedGreaterOrEqual => Cond::Ae,
            UnsignedLessOrEqual => Cond::Be,
            UnsignedGreater => Cond::A,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Mov,

    /// `mov` with a full 64-bit immediate.
    MovAbs,

    /// Zero-extending load.
    MovZx,

    Lea,
    Add,
    Sub,
    Imul,
    And,
    Or,
    Xor,
    Shl,
    Sar,
    Shr,
    Neg,
    Not,

    /// Sign-extends `rax` into `rdx:rax`.
    Cqo,

    Idiv,
    Div,
    Cmp,
    Jmp,
    J(Cond),
    Call,
    Nop,
}

/// An instruction, operands in Intel order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: &[Operand]) -> Self {
        Instruction {
            opcode,
            operands: operands.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negated_conditions_are_complementary() {
        let all = [
            Comparison::Equal,
            Comparison::NotEqual,
            Comparison::SignedLess,
            Comparison::UnsignedLess,
            Comparison::SignedLessOrEqual,
            Comparison::UnsignedLessOrEqual,
            Comparison::SignedGreater,
            Comparison::UnsignedGreater,
            Comparison::SignedGreaterOrEqual,
            Comparison::UnsignedGreaterOrEqual,
        ];

        for comparison in all.iter().copied() {
            let cond = Cond::from(comparison);
            assert_ne!(cond, cond.inverse());
            assert_eq!(cond, cond.inverse().inverse());
        }

        assert_eq!(Cond::from(Comparison::SignedLess).suffix(), "l");
        assert_eq!(Cond::from(Comparison::UnsignedLess).suffix(), "b");
        assert_eq!(Cond::from(Comparison::UnsignedGreater).inverse().suffix(), "be");
    }
}
