//! Compiler for KAIR, a register-machine intermediate language.
//!
//! # Front end
//! Every program derives from a single source file. The file is first
//! broken into a token stream by lexical analysis in [`lex`]. The token
//! stream is then arranged into the tree described in [`ir`] by the
//! recursive-descent parser in [`parse`], which also enforces the static
//! shape rules of the language: every statement performs exactly one
//! primitive operation over literal offsets.
//!
//! # Back end
//! The IR is lowered, one statement at a time and without optimization,
//! into x86-64 assembly text for the Windows x64 calling convention. The
//! lowering engine is written once and parametrized by an assembler
//! dialect and an addressing strategy for static regions; see
//! [`target`]. Assembling and linking the output is left to external
//! tools.
//!
//! # Failure
//! The pipeline is fail-fast. The first error from any phase aborts the
//! compilation and is reported through [`error::Diagnostics`].

#[macro_use]
mod macros;

pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod source;

mod arch;
mod codegen;

use std::io::BufRead;

use error::Diagnostics;
use lex::Lexer;

/// Code emission.
///
/// This module reexports enough internal items related to code generation
/// to lower IR for a specific assembler and addressing strategy.
pub mod target {
    pub use crate::arch::{AddressMode, Syntax};
    pub use crate::codegen::{
        emit, pack, shadow_space, Chunk, CodegenError, EmitOptions, Target,
    };
}

/// Runs the whole pipeline on a source text.
///
/// `name` identifies the source in diagnostics, usually by its path.
pub fn compile<R, S>(reader: R, name: S, target: &target::Target) -> Result<String, Diagnostics>
where
    R: BufRead,
    S: Into<String>,
{
    let (start, stream) = source::consume(reader, name);

    let tokens = Lexer::new(start.clone(), stream)
        .tokenize()
        .map_err(|error| Diagnostics::from(error).kind("Lexical error"))?;

    let program = parse::parse(tokens.iter(), start)
        .map_err(|error| Diagnostics::from(error).kind("Syntax error"))?;

    target::emit(&program, target)
        .map_err(|error| Diagnostics::from(error).kind("Code generation error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;

    #[test]
    fn reports_the_first_failing_phase() {
        let lexical = compile("s[0] = @".as_bytes(), "<test>", &Target::default()).unwrap_err();
        assert!(lexical.to_string().starts_with("Lexical error: "));

        let syntax = compile("s[0] = 1\ngoto nowhere".as_bytes(), "<test>", &Target::default())
            .unwrap_err();

        assert!(syntax.to_string().starts_with("Syntax error: Label `nowhere` is not defined"));
        assert_eq!(syntax.location().start().line(), 2);
    }

    #[test]
    fn compiles_an_empty_program() {
        let asm = compile("".as_bytes(), "<test>", &Target::default()).unwrap();

        assert!(asm.contains("_start:"));
        assert!(asm.contains("kair_end:"));
        assert!(asm.contains("call    ExitProcess"));
    }
}
