//! NASM dialect: Intel operand order, `;` comments.

use super::{Base, Dialect, Instruction, Memory, Opcode, Operand, ENTRY};
use crate::ir::{Section, Width};

use std::{
    collections::BTreeSet,
    fmt::{self, Write},
};

pub struct Nasm;

impl Dialect for Nasm {
    const COMMENT: &'static str = ";";

    fn preamble<W: Write>(output: &mut W, externs: &BTreeSet<&str>) -> fmt::Result {
        writeln!(output, "bits 64")?;
        writeln!(output, "global {}", ENTRY)?;

        for symbol in externs {
            writeln!(output, "extern {}", symbol)?;
        }

        Ok(())
    }

    fn region_section<W: Write>(output: &mut W, section: Section) -> fmt::Result {
        let name = match section {
            Section::Data => ".data",
            Section::Const => ".rdata",
        };

        writeln!(output, "section {}", name)
    }

    fn text_section<W: Write>(output: &mut W) -> fmt::Result {
        writeln!(output, "section .text")
    }

    fn align<W: Write>(output: &mut W, bytes: u32) -> fmt::Result {
        writeln!(output, "align {}", bytes)
    }

    fn quad<W: Write>(output: &mut W, value: i64) -> fmt::Result {
        writeln!(output, "\tdq {}", value)
    }

    fn zero<W: Write>(output: &mut W, bytes: u64) -> fmt::Result {
        writeln!(output, "\ttimes {} db 0", bytes)
    }

    fn instruction<W: Write>(output: &mut W, instruction: &Instruction) -> fmt::Result {
        let Instruction { opcode, operands } = instruction;

        let mnemonic: String = match opcode {
            Opcode::Mov | Opcode::MovAbs => "mov".into(),
            Opcode::MovZx => "movzx".into(),
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
            Opcode::Cqo => "cqo".into(),
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
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                output.write_str(", ")?;
            }

            match operand {
                Operand::Reg(reg, width) => output.write_str(reg.name(*width))?,

                // NASM only picks the imm64 encoding on its own for large values
                Operand::Imm(value) if *opcode == Opcode::MovAbs => {
                    write!(output, "strict qword {}", value)?
                }

                Operand::Imm(value) => write!(output, "{}", value)?,
                Operand::Mem(memory) => memory_operand(output, memory, *opcode != Opcode::Lea)?,
                Operand::Symbol(symbol) => output.write_str(symbol)?,
                Operand::Target(target) => output.write_str(target)?,
            }
        }

        writeln!(output)
    }
}

fn memory_operand<W: Write>(output: &mut W, memory: &Memory, sized: bool) -> fmt::Result {
    if sized {
        let size = match memory.width {
            Width::Byte => "byte",
            Width::Word => "word",
            Width::Dword => "dword",
            Width::Qword => "qword",
        };

        write!(output, "{} ", size)?;
    }

    match &memory.base {
        Base::Reg(reg) => write!(output, "[{}", reg.name(Width::Qword))?,
        Base::Absolute(symbol) => write!(output, "[{}", symbol)?,
        Base::RipRelative(symbol) => write!(output, "[rel {}", symbol)?,
    }

    match memory.displacement {
        0 => output.write_str("]"),
        displacement if displacement < 0 => write!(output, "-{}]", displacement.unsigned_abs()),
        displacement => write!(output, "+{}]", displacement),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Cond, Reg};

    fn format(opcode: Opcode, operands: &[Operand]) -> String {
        let mut output = String::new();
        Nasm::instruction(&mut output, &Instruction::new(opcode, operands)).unwrap();

        output.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn formats_intel_operands() {
        let stack = Memory::at(Reg::Rsp, 16);
        assert_eq!(format(Opcode::Mov, &[Reg::Rax.into(), stack.into()]), "mov rax, qword [rsp+16]");

        let region = Memory {
            base: Base::RipRelative("kair_data"),
            displacement: 8,
            width: Width::Qword,
        };

        assert_eq!(
            format(Opcode::Mov, &[region.clone().into(), Reg::Rax.into()]),
            "mov qword [rel kair_data+8], rax"
        );

        assert_eq!(
            format(Opcode::Lea, &[Reg::Rcx.into(), region.into()]),
            "lea rcx, [rel kair_data+8]"
        );

        let byte = Memory::at(Reg::R11, 0).sized(Width::Byte);
        assert_eq!(format(Opcode::MovZx, &[Reg::Rax.into(), byte.into()]), "movzx rax, byte [r11]");
        assert_eq!(format(Opcode::Shl, &[Reg::Rax.into(), Reg::Rcx.sized(Width::Byte)]), "shl rax, cl");
        assert_eq!(format(Opcode::Cqo, &[]), "cqo");
        assert_eq!(format(Opcode::J(Cond::Be), &[Operand::Target("kair_G0".into())]), "jbe kair_G0");
    }

    #[test]
    fn forces_wide_immediates() {
        assert_eq!(format(Opcode::MovAbs, &[Reg::Rax.into(), Operand::Imm(1)]), "mov rax, strict qword 1");
        assert_eq!(
            format(Opcode::MovAbs, &[Reg::R8.into(), Operand::Symbol("kair_const")]),
            "mov r8, kair_const"
        );
    }

    #[test]
    fn declares_externs() {
        let mut output = String::new();
        let externs = ["WriteFile", "ExitProcess"].iter().copied().collect();
        Nasm::preamble(&mut output, &externs).unwrap();

        assert_eq!(output, "bits 64\nglobal _start\nextern ExitProcess\nextern WriteFile\n");
    }
}
