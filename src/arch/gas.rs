//! GNU assembler dialect: AT&T operand order, `#` comments.
//!
//! External symbols are not declared. The GNU toolchain resolves them
//! through import libraries at link time.

use super::{Base, Dialect, Instruction, Memory, Opcode, Operand, ENTRY};
use crate::ir::{Section, Width};

use std::{
    collections::BTreeSet,
    fmt::{self, Write},
};

pub struct Gas;

impl Dialect for Gas {
    const COMMENT: &'static str = "#";

    fn preamble<W: Write>(output: &mut W, _externs: &BTreeSet<&str>) -> fmt::Result {
        writeln!(output, "\t.code64")?;
        writeln!(output, "\t.globl {}", ENTRY)
    }

    fn region_section<W: Write>(output: &mut W, section: Section) -> fmt::Result {
        match section {
            Section::Data => writeln!(output, "\t.section .data"),
            Section::Const => writeln!(output, "\t.section .rdata,\"dr\""),
        }
    }

    fn text_section<W: Write>(output: &mut W) -> fmt::Result {
        writeln!(output, "\t.text")
    }

    fn align<W: Write>(output: &mut W, bytes: u32) -> fmt::Result {
        writeln!(output, "\t.balign {}", bytes)
    }

    fn quad<W: Write>(output: &mut W, value: i64) -> fmt::Result {
        writeln!(output, "\t.quad {}", value)
    }

    fn zero<W: Write>(output: &mut W, bytes: u64) -> fmt::Result {
        writeln!(output, "\t.zero {}", bytes)
    }

    fn instruction<W: Write>(output: &mut W, instruction: &Instruction) -> fmt::Result {
        let Instruction { opcode, operands } = instruction;

        // Zero-extending loads encode the source width in the mnemonic
        let source_width = match operands.get(1) {
            Some(Operand::Mem(memory)) => memory.width,
            _ => Width::Qword,
        };

        let mnemonic: String = match opcode {
            Opcode::Mov => "mov".into(),
            Opcode::MovAbs => "movabs".into(),
            Opcode::MovZx if source_width == Width::Byte => "movzbq".into(),
            Opcode::MovZx => "movzwq".into(),
            Opcode::Lea => "lea".into(),
            Opcode::Add => "add".into(),
            Opcode::Sub => "sub".into(),
            Opcode::Imul => "imul".into(),
            Opcode::And => "and".into(),
            Opcode::Or => "or".into(),
            Opcode::Xor => "xor".into(),
            Opcode::Shl => "shl".into(),
            Opcode::Sar => "sar".into(),
            Opcode::Shr => "shr".into(),
            Opcode::Neg => "neg".into(),
            Opcode::Not => "not".into(),
            Opcode::Cqo => "cqto".into(),
            Opcode::Idiv => "idiv".into(),
            Opcode::Div => "div".into(),
            Opcode::Cmp => "cmp".into(),
            Opcode::Jmp => "jmp".into(),
            Opcode::J(cond) => format!("j{}", cond.suffix()),
            Opcode::Call => "call".into(),
            Opcode::Nop => "nop".into(),
        };

        if operands.is_empty() {
            return writeln!(output, "\t{}", mnemonic);
        }

        write!(output, "\t{:8}", mnemonic)?;
        for (i, operand) in operands.iter().rev().enumerate() {
            if i > 0 {
                output.write_str(", ")?;
            }

            match operand {
                Operand::Reg(reg, width) => write!(output, "%{}", reg.name(*width))?,
                Operand::Imm(value) => write!(output, "${}", value)?,
                Operand::Mem(memory) => memory_operand(output, memory)?,
                Operand::Symbol(symbol) => write!(output, "${}", symbol)?,
                Operand::Target(target) => output.write_str(target)?,
            }
        }

        writeln!(output)
    }
}

fn memory_operand<W: Write>(output: &mut W, memory: &Memory) -> fmt::Result {
    let (symbol, register) = match &memory.base {
        Base::Reg(reg) => (None, Some(reg.name(Width::Qword))),
        Base::Absolute(symbol) => (Some(symbol), None),
        Base::RipRelative(symbol) => (Some(symbol), Some("rip")),
    };

    match (symbol, memory.displacement) {
        (Some(symbol), 0) => output.write_str(symbol)?,
        (Some(symbol), displacement) if displacement < 0 => write!(output, "{}{}", symbol, displacement)?,
        (Some(symbol), displacement) => write!(output, "{}+{}", symbol, displacement)?,
        (None, 0) => (),
        (None, displacement) => write!(output, "{}", displacement)?,
    }

    match register {
        Some(register) => write!(output, "(%{})", register),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Cond, Reg};

    fn format(opcode: Opcode, operands: &[Operand]) -> String {
        let mut output = String::new();
        Gas::instruction(&mut output, &Instruction::new(opcode, operands)).unwrap();

        output.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn reverses_operands_and_adds_sigils() {
        let stack = Memory::at(Reg::Rsp, 16);
        assert_eq!(format(Opcode::Mov, &[Reg::Rax.into(), stack.into()]), "mov 16(%rsp), %rax");
        assert_eq!(format(Opcode::Mov, &[Reg::Rcx.into(), Operand::Imm(-3)]), "mov $-3, %rcx");
        assert_eq!(format(Opcode::Sar, &[Reg::Rax.into(), Reg::Rcx.sized(Width::Byte)]), "sar %cl, %rax");
        assert_eq!(format(Opcode::J(Cond::G), &[Operand::Target("kair_L_loop".into())]), "jg kair_L_loop");
    }

    #[test]
    fn formats_region_operands() {
        let relative = Memory {
            base: Base::RipRelative("kair_data"),
            displacement: 8,
            width: Width::Qword,
        };

        let absolute = Memory {
            base: Base::Absolute("kair_const"),
            ..relative.clone()
        };

        assert_eq!(format(Opcode::Mov, &[relative.into(), Reg::Rax.into()]), "mov %rax, kair_data+8(%rip)");
        assert_eq!(format(Opcode::Mov, &[Reg::Rax.into(), absolute.into()]), "mov kair_const+8, %rax");
        assert_eq!(
            format(Opcode::MovAbs, &[Reg::Rdx.into(), Operand::Symbol("kair_data")]),
            "movabs $kair_data, %rdx"
        );
    }

    #[test]
    fn encodes_widths_in_mnemonics() {
        let word = Memory::at(Reg::R11, 0).sized(Width::Word);
        assert_eq!(format(Opcode::MovZx, &[Reg::Rax.into(), word.into()]), "movzwq (%r11), %rax");

        let byte = Memory::at(Reg::R11, 0).sized(Width::Byte);
        assert_eq!(format(Opcode::MovZx, &[Reg::Rax.into(), byte.into()]), "movzbq (%r11), %rax");
        assert_eq!(format(Opcode::Cqo, &[]), "cqto");
    }
}
