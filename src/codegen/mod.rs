//! Code generation.
//!
//! Statements are lowered one at a time into fixed, self-contained
//! instruction sequences. There is no allocator and nothing is spilled:
//! every temporary lives in a register with a fixed role.
//!
//! | Role                                  | Register |
//! |---------------------------------------|----------|
//! | result, left operand, dividend        | `rax`    |
//! | right operand, shift count            | `rcx`    |
//! | high half of dividend, remainder      | `rdx`    |
//! | left operand preservation             | `r10`    |
//! | caller frame while stacking arguments | `r10`    |
//! | legacy access addresses               | `r11`    |
//! | syscall alignment remainder           | `rbx`    |
//!
//! The stack pointer of the source program is the machine stack pointer.
//! Only `sp` updates, `align` and the syscall sequence ever write to it,
//! since every other stack access is a static offset from its value.

use crate::{
    arch::{
        region_symbol, AddressMode, Addressing, Cond, Dialect, Instruction, Memory, Opcode,
        Operand, Reg, Syntax, END, ENTRY,
    },
    ir::{
        BaseOffset, BinaryOperator, Condition, DataInitialization, Expression, JumpTarget, Label,
        Place, Program, Section, Space, Statement, UnaryOperator, Width,
    },
    source::{Located, Location},
};

use bitflags::bitflags;
use std::{
    collections::BTreeSet,
    fmt::{self, Write},
    marker::PhantomData,
};

use thiserror::Error;

mod data;

pub use data::{pack, Chunk};

/// Stack bytes that the callee may use as home for register arguments.
const SHADOW_SPACE: u64 = 32;

/// Callees that never return. No cleanup follows a call to them.
const NON_RETURNING: &[&str] = &["ExitProcess", "ExitThread", "FatalExit"];

/// Callee of the exit sequence.
const EXIT: &str = "ExitProcess";

bitflags! {
    /// Options that affect the emitted text but not its behavior.
    pub struct EmitOptions: u32 {
        /// Precede each lowered statement with a comment quoting it.
        const ANNOTATE = 0x01;
    }
}

/// Output configuration, fixed for a whole invocation.
#[derive(Copy, Clone, Debug)]
pub struct Target {
    pub syntax: Syntax,
    pub addressing: AddressMode,
    pub options: EmitOptions,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            syntax: Syntax::Nasm,
            addressing: AddressMode::Symbol,
            options: EmitOptions::empty(),
        }
    }
}

/// A program shape that the generator cannot lower.
///
/// These signal a mismatch between parser and generator, not a problem
/// with user input.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Failed to format output")]
    Format(#[from] fmt::Error),

    #[error("Unsupported construct: {0}")]
    Unsupported(&'static str),

    #[error("Initializer for `[{0}+{1}]` overlaps a previous one")]
    Overlap(Section, u64),
}

/// Stack bytes reserved around a call with some number of arguments.
///
/// The 32-byte shadow area plus one slot for each argument after the
/// fourth, rounded up to keep the stack pointer 16-byte aligned.
pub fn shadow_space(arguments: usize) -> u64 {
    let stacked = arguments.saturating_sub(Reg::ARGUMENTS.len()) as u64;
    (SHADOW_SPACE + 8 * stacked + 15) & !15
}

/// Lowers a whole program to assembly text.
pub fn emit(program: &Program, target: &Target) -> Result<String, Located<CodegenError>> {
    dispatch_target!(D, A: target => Generator::<D, A>::new(target.options).program(program))
}

struct Generator<D, A> {
    output: String,
    options: EmitOptions,
    next_label: u32,

    /// Register that holds the program's stack pointer.
    frame: Reg,

    strategy: PhantomData<(D, A)>,
}

impl<D: Dialect, A: Addressing> Generator<D, A> {
    fn new(options: EmitOptions) -> Self {
        Generator {
            output: String::new(),
            options,
            next_label: 0,
            frame: Reg::Rsp,
            strategy: PhantomData,
        }
    }

    fn program(mut self, program: &Program) -> Result<String, Located<CodegenError>> {
        let at_end = |error| Located::at(error, program.end.clone());

        self.header(program).map_err(at_end)?;
        for section in [Section::Data, Section::Const].iter().copied() {
            self.region(program, section)?;
        }

        self.entry().map_err(at_end)?;
        for statement in &program.statements {
            let (location, statement) = (statement.location(), statement.val());
            self.lower(statement, location)
                .map_err(|error| Located::at(error, location.clone()))?;
        }

        self.exit().map_err(at_end)?;
        Ok(self.output)
    }

    fn header(&mut self, program: &Program) -> Result<(), CodegenError> {
        writeln!(self.output, "{} KAIR program, Windows x64 ABI", D::COMMENT)?;

        let mut externs: BTreeSet<&str> = program
            .statements
            .iter()
            .filter_map(|statement| match statement.val() {
                Statement::Syscall { name, .. } => Some(&**name),
                _ => None,
            })
            .collect();

        externs.insert(EXIT);
        D::preamble(&mut self.output, &externs)?;

        Ok(())
    }

    fn region(&mut self, program: &Program, section: Section) -> Result<(), Located<CodegenError>> {
        let initializations: Vec<DataInitialization> = program
            .data
            .iter()
            .map(Located::val)
            .filter(|init| init.section == section)
            .copied()
            .collect();

        let chunks = pack(&initializations).map_err(|error| {
            let location = match &error {
                CodegenError::Overlap(_, offset) => program
                    .data
                    .iter()
                    .find(|init| init.val().section == section && init.val().offset == *offset)
                    .map(|init| init.location().clone()),

                _ => None,
            };

            Located::at(error, location.unwrap_or_else(|| program.end.clone()))
        })?;

        self.region_chunks(section, &chunks)
            .map_err(|error| Located::at(error, program.end.clone()))
    }

    fn region_chunks(&mut self, section: Section, chunks: &[Chunk]) -> Result<(), CodegenError> {
        writeln!(self.output)?;
        D::region_section(&mut self.output, section)?;
        D::align(&mut self.output, 8)?;
        D::label(&mut self.output, region_symbol(section))?;

        for chunk in chunks {
            match *chunk {
                Chunk::Zero(bytes) => D::zero(&mut self.output, bytes)?,
                Chunk::Quad(value) => D::quad(&mut self.output, value)?,
            }
        }

        Ok(())
    }

    fn entry(&mut self) -> Result<(), CodegenError> {
        writeln!(self.output)?;
        D::text_section(&mut self.output)?;
        self.label(ENTRY)
    }

    /// The end label and the exit sequence, which passes `[sp+0]` as
    /// the process exit code.
    fn exit(&mut self) -> Result<(), CodegenError> {
        self.label(END)?;

        let code = Expression::Access(BaseOffset {
            space: Space::Stack,
            offset: 0,
        });

        self.syscall(EXIT, &[code], None)
    }

    fn lower(&mut self, statement: &Statement, location: &Location) -> Result<(), CodegenError> {
        if self.options.contains(EmitOptions::ANNOTATE) {
            let text = format!("{}: {}", location.start().line(), statement);
            D::comment(&mut self.output, &text)?;
        }

        match statement {
            Statement::Label(label) => self.label(&label_symbol(label)),

            Statement::Assignment { target, value } => {
                self.load(value, Reg::Rax)?;
                self.store(target)
            }

            Statement::ConditionalAssignment {
                target,
                value,
                condition,
            } => {
                let skip = self.generated_label();

                self.compare(condition)?;
                self.branch(Cond::from(condition.comparison).inverse(), &skip)?;
                self.load(value, Reg::Rax)?;
                self.store(target)?;

                self.label(&skip)
            }

            Statement::TernaryAssignment {
                target,
                condition,
                then,
                otherwise,
            } => {
                let other = self.generated_label();
                let done = self.generated_label();

                self.compare(condition)?;
                self.branch(Cond::from(condition.comparison).inverse(), &other)?;
                self.load(then, Reg::Rax)?;
                self.store(target)?;
                emit!(self, Opcode::Jmp, Operand::Target(done.clone()))?;

                self.label(&other)?;
                self.load(otherwise, Reg::Rax)?;
                self.store(target)?;

                self.label(&done)
            }

            Statement::CompoundAssignment {
                target,
                operator,
                value,
            } => {
                self.operate(&place_value(target), *operator, value)?;
                self.store(target)
            }

            Statement::Goto(target) => emit!(self, Opcode::Jmp, Operand::Target(jump_symbol(target))),

            Statement::ConditionalGoto { target, condition } => {
                self.compare(condition)?;
                self.branch(Cond::from(condition.comparison), &jump_symbol(target))
            }

            Statement::Pass(count) => {
                for _ in 0..*count {
                    emit!(self, Opcode::Nop)?;
                }

                Ok(())
            }

            Statement::StackPointerUpdate { operator, value } => {
                match operator {
                    None => self.load(value, Reg::Rax)?,
                    Some(operator) => self.operate(&Expression::StackPointer, *operator, value)?,
                }

                emit!(self, Opcode::Mov, Reg::Rsp, Reg::Rax)
            }

            Statement::Align(boundary) => {
                let mask = -i64::from(*boundary);
                emit!(self, Opcode::And, Reg::Rsp, Operand::Imm(mask))
            }

            Statement::Syscall {
                name,
                arguments,
                output,
            } => self.syscall(name, arguments, output.as_ref()),
        }
    }

    /// Evaluates an expression into a register.
    fn load(&mut self, expr: &Expression, reg: Reg) -> Result<(), CodegenError> {
        match expr {
            Expression::Number { value, wide } => {
                let opcode = if *wide || i32::try_from(*value).is_err() {
                    Opcode::MovAbs
                } else {
                    Opcode::Mov
                };

                emit!(self, opcode, reg, Operand::Imm(*value))
            }

            Expression::StackPointer => {
                let frame = self.frame;
                emit!(self, Opcode::Mov, reg, frame)
            }

            // Address of the region, never its contents
            Expression::BaseAddress(section) => self.raw(A::base_address(*section, reg)),

            Expression::Access(access) => {
                let memory = self.memory(access)?;
                emit!(self, Opcode::Mov, reg, memory)
            }

            Expression::Indirect(indirect) => {
                self.load(&indirect.address, Reg::R11)?;

                let memory = Memory::at(Reg::R11, 0).sized(indirect.width);
                match indirect.width {
                    Width::Byte | Width::Word => emit!(self, Opcode::MovZx, reg, memory),

                    // 32-bit writes clear the upper half
                    Width::Dword => emit!(self, Opcode::Mov, reg.sized(Width::Dword), memory),
                    Width::Qword => emit!(self, Opcode::Mov, reg, memory),
                }
            }

            Expression::Unary(operator, operand) => {
                self.load(operand, reg)?;

                let opcode = match operator {
                    UnaryOperator::Neg => Opcode::Neg,
                    UnaryOperator::Not => Opcode::Not,
                };

                emit!(self, opcode, reg)
            }

            Expression::Binary(left, operator, right) if reg == Reg::Rax => {
                self.operate(left, *operator, right)
            }

            Expression::Binary(..) => Err(CodegenError::Unsupported("operation outside of rax")),
        }
    }

    /// Applies a binary operator, leaving the result in `rax`.
    fn operate(
        &mut self,
        left: &Expression,
        operator: BinaryOperator,
        right: &Expression,
    ) -> Result<(), CodegenError> {
        use BinaryOperator::*;

        self.load(left, Reg::Rax)?;
        emit!(self, Opcode::Mov, Reg::R10, Reg::Rax)?;
        self.load(right, Reg::Rcx)?;
        emit!(self, Opcode::Mov, Reg::Rax, Reg::R10)?;

        let count = Reg::Rcx.sized(Width::Byte);
        match operator {
            Add => emit!(self, Opcode::Add, Reg::Rax, Reg::Rcx),
            Sub => emit!(self, Opcode::Sub, Reg::Rax, Reg::Rcx),
            Mul => emit!(self, Opcode::Imul, Reg::Rax, Reg::Rcx),
            And => emit!(self, Opcode::And, Reg::Rax, Reg::Rcx),
            Or => emit!(self, Opcode::Or, Reg::Rax, Reg::Rcx),
            Xor => emit!(self, Opcode::Xor, Reg::Rax, Reg::Rcx),
            Shl => emit!(self, Opcode::Shl, Reg::Rax, count),
            SignedShr => emit!(self, Opcode::Sar, Reg::Rax, count),
            UnsignedShr => emit!(self, Opcode::Shr, Reg::Rax, count),

            SignedDiv | SignedRem => {
                emit!(self, Opcode::Cqo)?;
                emit!(self, Opcode::Idiv, Reg::Rcx)?;
                self.remainder(operator == SignedRem)
            }

            UnsignedDiv | UnsignedRem => {
                let high = Reg::Rdx.sized(Width::Dword);
                emit!(self, Opcode::Xor, high.clone(), high)?;
                emit!(self, Opcode::Div, Reg::Rcx)?;
                self.remainder(operator == UnsignedRem)
            }
        }
    }

    /// Division leaves the quotient in `rax` and the remainder in `rdx`.
    fn remainder(&mut self, wanted: bool) -> Result<(), CodegenError> {
        if wanted {
            emit!(self, Opcode::Mov, Reg::Rax, Reg::Rdx)
        } else {
            Ok(())
        }
    }

    /// Stores `rax` into a place.
    fn store(&mut self, place: &Place) -> Result<(), CodegenError> {
        match place {
            Place::Access(BaseOffset {
                space: Space::Region(Section::Const),
                ..
            }) => Err(CodegenError::Unsupported("store into a read-only region")),

            Place::Access(access) => {
                let memory = self.memory(access)?;
                emit!(self, Opcode::Mov, memory, Reg::Rax)
            }

            Place::Indirect(indirect) => {
                self.load(&indirect.address, Reg::R11)?;

                let memory = Memory::at(Reg::R11, 0).sized(indirect.width);
                emit!(self, Opcode::Mov, memory, Reg::Rax.sized(indirect.width))
            }
        }
    }

    fn compare(&mut self, condition: &Condition) -> Result<(), CodegenError> {
        self.load(&condition.left, Reg::Rax)?;
        self.load(&condition.right, Reg::Rcx)?;
        emit!(self, Opcode::Cmp, Reg::Rax, Reg::Rcx)
    }

    fn branch(&mut self, cond: Cond, symbol: &str) -> Result<(), CodegenError> {
        emit!(self, Opcode::J(cond), Operand::Target(symbol.to_owned()))
    }

    /// Calls a host entry point under the Windows x64 convention.
    fn syscall(
        &mut self,
        name: &str,
        arguments: &[Expression],
        output: Option<&Place>,
    ) -> Result<(), CodegenError> {
        let space = shadow_space(arguments.len());
        let split = arguments.len().min(Reg::ARGUMENTS.len());
        let (in_registers, stacked) = arguments.split_at(split);

        for (argument, reg) in in_registers.iter().zip(Reg::ARGUMENTS.iter().copied()) {
            self.load(argument, reg)?;
        }

        if !stacked.is_empty() {
            emit!(self, Opcode::Mov, Reg::R10, Reg::Rsp)?;
        }

        // Nothing about the current stack pointer is known statically
        emit!(self, Opcode::Mov, Reg::Rbx, Reg::Rsp)?;
        emit!(self, Opcode::And, Reg::Rbx, Operand::Imm(15))?;
        emit!(self, Opcode::Sub, Reg::Rsp, Reg::Rbx)?;
        emit!(self, Opcode::Sub, Reg::Rsp, Operand::Imm(space as i64))?;

        if !stacked.is_empty() {
            self.frame = Reg::R10;
            for (i, argument) in stacked.iter().enumerate() {
                self.load(argument, Reg::Rax)?;

                let slot = Memory::at(Reg::Rsp, (SHADOW_SPACE + 8 * i as u64) as i64);
                emit!(self, Opcode::Mov, slot, Reg::Rax)?;
            }

            self.frame = Reg::Rsp;
        }

        emit!(self, Opcode::Call, Operand::Target(name.to_owned()))?;
        if NON_RETURNING.contains(&name) {
            return Ok(());
        }

        // rbx is non-volatile, so the remainder is still there
        emit!(self, Opcode::Add, Reg::Rsp, Operand::Imm(space as i64))?;
        emit!(self, Opcode::Add, Reg::Rsp, Reg::Rbx)?;

        match output {
            Some(output) => self.store(output),
            None => Ok(()),
        }
    }

    fn memory(&self, access: &BaseOffset) -> Result<Memory, CodegenError> {
        let displacement = i32::try_from(access.offset)
            .map_err(|_| CodegenError::Unsupported("offset beyond 32 bits"))?;

        let displacement = i64::from(displacement);
        Ok(match access.space {
            Space::Stack => Memory::at(self.frame, displacement),
            Space::Region(section) => A::memory(section, displacement, Width::Qword),
        })
    }

    fn generated_label(&mut self) -> String {
        let label = format!("kair_G{}", self.next_label);
        self.next_label += 1;

        label
    }

    fn label(&mut self, symbol: &str) -> Result<(), CodegenError> {
        D::label(&mut self.output, symbol)?;
        Ok(())
    }

    fn instruction(&mut self, opcode: Opcode, operands: &[Operand]) -> Result<(), CodegenError> {
        self.raw(Instruction::new(opcode, operands))
    }

    fn raw(&mut self, instruction: Instruction) -> Result<(), CodegenError> {
        D::instruction(&mut self.output, &instruction)?;
        Ok(())
    }
}

fn label_symbol(Label(name): &Label) -> String {
    format!("kair_L_{}", name)
}

fn jump_symbol(target: &JumpTarget) -> String {
    match target {
        JumpTarget::Label(label) => label_symbol(label),
        JumpTarget::End => END.to_owned(),
    }
}

/// Reads back the current value of a place.
fn place_value(place: &Place) -> Expression {
    match place {
        Place::Access(access) => Expression::Access(*access),
        Place::Indirect(indirect) => Expression::Indirect(indirect.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_shadow_space_to_sixteen_bytes() {
        assert_eq!(shadow_space(0), 32);
        assert_eq!(shadow_space(4), 32);
        assert_eq!(shadow_space(5), 48);
        assert_eq!(shadow_space(6), 48);
        assert_eq!(shadow_space(7), 64);
    }
}
