/// Instantiates generic code for the dialect and addressing strategy
/// selected by a `Target`.
///
/// `$dialect` and `$addressing` become type aliases visible to `$expr`.
macro_rules! dispatch_target {
    ($dialect:ident, $addressing:ident: $target:expr => $expr:expr) => {{
        use crate::arch::{AddressMode, Gas, Nasm, RipRelative, SymbolRelative, Syntax};

        match ($target.syntax, $target.addressing) {
            (Syntax::Nasm, AddressMode::Symbol) => {
                type $dialect = Nasm;
                type $addressing = SymbolRelative;
                $expr
            }

            (Syntax::Nasm, AddressMode::RipRelative) => {
                type $dialect = Nasm;
                type $addressing = RipRelative;
                $expr
            }

            (Syntax::Gas, AddressMode::Symbol) => {
                type $dialect = Gas;
                type $addressing = SymbolRelative;
                $expr
            }

            (Syntax::Gas, AddressMode::RipRelative) => {
                type $dialect = Gas;
                type $addressing = RipRelative;
                $expr
            }
        }
    }};
}

/// Emits one instruction. Operands are anything convertible to
/// `arch::Operand`.
macro_rules! emit {
    ($generator:expr, $opcode:expr) => {
        $generator.instruction($opcode, &[])
    };

    ($generator:expr, $opcode:expr, $($operand:expr),+) => {
        $generator.instruction($opcode, &[$(crate::arch::Operand::from($operand)),+])
    };
}
