//! Target-specific details.
//!
//! The lowering engine in [`crate::codegen`] is written once and knows
//! nothing about assembler syntax or about how static regions are
//! reached. Both concerns are abstracted here: a [`Dialect`] turns
//! instructions and directives into text, and an [`Addressing`] strategy
//! decides how region operands and region base addresses look. The pair
//! is selected per invocation through the `dispatch_target!()` macro.

use crate::ir::{Section, Width};
use std::{
    collections::BTreeSet,
    fmt::{self, Write},
    str::FromStr,
};

use unicase::Ascii as NoCase;

mod addressing;
mod gas;
mod nasm;
mod x86_64;

pub use addressing::{RipRelative, SymbolRelative};
pub use gas::Gas;
pub use nasm::Nasm;
pub use x86_64::{Base, Cond, Instruction, Memory, Opcode, Operand, Reg};

/// Entry symbol, a fixed contract with the downstream linker.
pub const ENTRY: &str = "_start";

/// Label that precedes the exit sequence.
pub const END: &str = "kair_end";

/// Symbol that names the start of a region.
pub fn region_symbol(section: Section) -> &'static str {
    match section {
        Section::Data => "kair_data",
        Section::Const => "kair_const",
    }
}

/// Assembler syntax.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Syntax {
    /// Intel operand order, as accepted by NASM.
    Nasm,

    /// AT&T operand order, as accepted by the GNU assembler.
    Gas,
}

/// How static regions are reached.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressMode {
    /// Absolute addresses resolved by the linker.
    Symbol,

    /// Displacements from the instruction pointer.
    RipRelative,
}

impl FromStr for Syntax {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        const NAMES: &[(NoCase<&str>, Syntax)] = &[
            (NoCase::new("nasm"), Syntax::Nasm),
            (NoCase::new("intel"), Syntax::Nasm),
            (NoCase::new("gas"), Syntax::Gas),
            (NoCase::new("att"), Syntax::Gas),
        ];

        NAMES
            .iter()
            .find(|&&(name, _)| name == NoCase::new(string))
            .map(|&(_, syntax)| syntax)
            .ok_or(())
    }
}

impl FromStr for AddressMode {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        const NAMES: &[(NoCase<&str>, AddressMode)] = &[
            (NoCase::new("symbol"), AddressMode::Symbol),
            (NoCase::new("absolute"), AddressMode::Symbol),
            (NoCase::new("rip"), AddressMode::RipRelative),
            (NoCase::new("relative"), AddressMode::RipRelative),
        ];

        NAMES
            .iter()
            .find(|&&(name, _)| name == NoCase::new(string))
            .map(|&(_, mode)| mode)
            .ok_or(())
    }
}

/// Assembler syntax dialect.
///
/// Implementors format directives and instructions. Every method writes
/// whole lines, newline included.
pub trait Dialect {
    /// Line comment marker.
    const COMMENT: &'static str;

    /// Everything that precedes the first section: mode, exported entry
    /// symbol and, if the dialect needs them, external declarations.
    fn preamble<W: Write>(output: &mut W, externs: &BTreeSet<&str>) -> fmt::Result;

    /// Switches to the section that holds a region.
    fn region_section<W: Write>(output: &mut W, section: Section) -> fmt::Result;

    /// Switches to the code section.
    fn text_section<W: Write>(output: &mut W) -> fmt::Result;

    /// Aligns the location counter.
    fn align<W: Write>(output: &mut W, bytes: u32) -> fmt::Result;

    /// One 64-bit value.
    fn quad<W: Write>(output: &mut W, value: i64) -> fmt::Result;

    /// A run of zero bytes.
    fn zero<W: Write>(output: &mut W, bytes: u64) -> fmt::Result;

    /// A single instruction.
    fn instruction<W: Write>(output: &mut W, instruction: &Instruction) -> fmt::Result;

    /// A label definition.
    fn label<W: Write>(output: &mut W, symbol: &str) -> fmt::Result {
        writeln!(output, "{}:", symbol)
    }

    /// A comment line.
    fn comment<W: Write>(output: &mut W, text: &str) -> fmt::Result {
        writeln!(output, "\t{} {}", Self::COMMENT, text)
    }
}

/// Strategy for operands that refer to static regions.
///
/// The lowering algorithm is the same for every strategy. Only these two
/// primitives differ.
pub trait Addressing {
    /// Memory operand for `width` bytes at `displacement` into a region.
    fn memory(section: Section, displacement: i64, width: Width) -> Memory;

    /// Loads the base address of a region into a register.
    fn base_address(section: Section, reg: Reg) -> Instruction;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("NASM".parse(), Ok(Syntax::Nasm));
        assert_eq!("Gas".parse(), Ok(Syntax::Gas));
        assert_eq!("att".parse(), Ok(Syntax::Gas));
        assert_eq!("masm".parse::<Syntax>(), Err(()));

        assert_eq!("symbol".parse(), Ok(AddressMode::Symbol));
        assert_eq!("RIP".parse(), Ok(AddressMode::RipRelative));
        assert_eq!("sib".parse::<AddressMode>(), Err(()));
    }
}
