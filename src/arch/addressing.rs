//! Region addressing strategies.

use super::{region_symbol, Addressing, Base, Instruction, Memory, Opcode, Operand, Reg};
use crate::ir::{Section, Width};

/// Regions are reached through absolute addresses.
///
/// Requires the image to be linked below 2 GiB, since displacements are
/// 32-bit sign-extended values.
pub struct SymbolRelative;

/// Regions are reached through displacements from `rip`.
pub struct RipRelative;

impl Addressing for SymbolRelative {
    fn memory(section: Section, displacement: i64, width: Width) -> Memory {
        Memory {
            base: Base::Absolute(region_symbol(section)),
            displacement,
            width,
        }
    }

    fn base_address(section: Section, reg: Reg) -> Instruction {
        let symbol = Operand::Symbol(region_symbol(section));
        Instruction::new(Opcode::MovAbs, &[reg.into(), symbol])
    }
}

impl Addressing for RipRelative {
    fn memory(section: Section, displacement: i64, width: Width) -> Memory {
        Memory {
            base: Base::RipRelative(region_symbol(section)),
            displacement,
            width,
        }
    }

    fn base_address(section: Section, reg: Reg) -> Instruction {
        let memory = Self::memory(section, 0, Width::Qword);
        Instruction::new(Opcode::Lea, &[reg.into(), memory.into()])
    }
}
