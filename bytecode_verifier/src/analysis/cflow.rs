// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-method control-flow information.
//!
//! [`CflowMethodInfo`] is built once per method from its decoded instructions and try blocks. It
//! records, per bytecode byte, whether an instruction starts there, whether it is a jump target,
//! whether it is protected by a try block, and whether it belongs to an exception handler body.
//! Construction rejects structurally malformed methods; everything it accepts can be walked by
//! the abstract interpreter without bounds surprises.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::bytecode::{DecodedInstr, decode_instructions};
use crate::diagnostics::DiagnosticCode;
use crate::format::DecodeError;
use crate::program::TryBlock;

bitflags::bitflags! {
    /// Per-byte control-flow flags.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CflowFlags: u8 {
        /// An instruction starts here.
        const INSTRUCTION = 1 << 0;
        /// The instruction is covered by a try block.
        const EXCEPTION_SOURCE = 1 << 1;
        /// The instruction belongs to a catch handler body.
        const EXCEPTION_HANDLER = 1 << 2;
        /// Some jump lands here.
        const JUMP_TARGET = 1 << 3;
    }
}

/// A structural defect that prevents verification of the whole method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CflowError {
    /// The method has no instructions.
    EmptyMethodBody,
    /// The bytecode could not be decoded.
    Decode(DecodeError),
    /// A jump leaves the method.
    InvalidJumpTarget {
        /// Jumping instruction.
        pc: u32,
        /// Absolute target.
        target: i64,
    },
    /// A jump lands between instruction boundaries.
    JumpIntoInstructionInterior {
        /// Jumping instruction.
        pc: u32,
        /// Absolute target.
        target: u32,
    },
    /// A jump enters a handler body from outside it.
    JumpIntoExceptionHandler {
        /// Jumping instruction.
        pc: u32,
        /// Absolute target.
        target: u32,
    },
    /// Execution falls from outside a handler into its body.
    FallthroughIntoExceptionHandler {
        /// Instruction that falls through.
        pc: u32,
    },
    /// The last instruction can fall off the end of the method.
    BadLastInstruction {
        /// Offset of the last instruction.
        pc: u32,
    },
    /// A try range is empty, out of bounds, or not instruction-aligned.
    InvalidTryBlock {
        /// First protected offset.
        start: u32,
        /// One past the last protected offset.
        end: u32,
    },
    /// A catch handler range is empty, out of bounds, or not instruction-aligned.
    InvalidCatchBlock {
        /// Handler start.
        start: u32,
        /// One past the handler end.
        end: u32,
    },
}

impl CflowError {
    /// Diagnostic code reported for this error.
    #[must_use]
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::EmptyMethodBody => DiagnosticCode::EmptyMethodBody,
            Self::Decode(_) => DiagnosticCode::BytecodeDecodeFailure,
            Self::InvalidJumpTarget { .. } => DiagnosticCode::InvalidJumpTarget,
            Self::JumpIntoInstructionInterior { .. } => DiagnosticCode::JumpIntoInstructionInterior,
            Self::JumpIntoExceptionHandler { .. } => DiagnosticCode::JumpIntoExceptionHandler,
            Self::FallthroughIntoExceptionHandler { .. } => {
                DiagnosticCode::FallthroughIntoExceptionHandler
            }
            Self::BadLastInstruction { .. } => DiagnosticCode::BadLastInstruction,
            Self::InvalidTryBlock { .. } => DiagnosticCode::InvalidTryBlock,
            Self::InvalidCatchBlock { .. } => DiagnosticCode::InvalidCatchBlock,
        }
    }

    /// Offset the error is attributed to, if any.
    #[must_use]
    pub fn pc(&self) -> Option<u32> {
        match self {
            Self::InvalidJumpTarget { pc, .. }
            | Self::JumpIntoInstructionInterior { pc, .. }
            | Self::JumpIntoExceptionHandler { pc, .. }
            | Self::FallthroughIntoExceptionHandler { pc }
            | Self::BadLastInstruction { pc } => Some(*pc),
            Self::InvalidTryBlock { start, .. } | Self::InvalidCatchBlock { start, .. } => {
                Some(*start)
            }
            Self::Decode(e) => match e {
                DecodeError::UnexpectedEof { offset } | DecodeError::UnknownOpcode { offset, .. } => {
                    u32::try_from(*offset).ok()
                }
                DecodeError::OutOfBounds => None,
            },
            Self::EmptyMethodBody => None,
        }
    }
}

impl fmt::Display for CflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMethodBody => write!(f, "method body is empty"),
            Self::Decode(e) => write!(f, "decode failed: {e}"),
            Self::InvalidJumpTarget { pc, target } => {
                write!(f, "jump at {pc} targets {target}, outside the method")
            }
            Self::JumpIntoInstructionInterior { pc, target } => {
                write!(f, "jump at {pc} targets the middle of an instruction at {target}")
            }
            Self::JumpIntoExceptionHandler { pc, target } => {
                write!(f, "jump at {pc} enters exception handler body at {target}")
            }
            Self::FallthroughIntoExceptionHandler { pc } => {
                write!(f, "instruction at {pc} falls through into an exception handler")
            }
            Self::BadLastInstruction { pc } => {
                write!(f, "last instruction at {pc} is not a jump, return, or throw")
            }
            Self::InvalidTryBlock { start, end } => write!(f, "invalid try block [{start}, {end})"),
            Self::InvalidCatchBlock { start, end } => {
                write!(f, "invalid catch block [{start}, {end})")
            }
        }
    }
}

impl core::error::Error for CflowError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for CflowError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

/// Immutable control-flow facts for one method.
#[derive(Clone, Debug)]
pub struct CflowMethodInfo {
    flags: Vec<CflowFlags>,
    /// Sorted handler start offsets followed by the code length.
    handler_starts: Vec<u32>,
    instrs: Vec<DecodedInstr>,
}

impl CflowMethodInfo {
    /// Decodes `bytecode` and builds control-flow info for it.
    pub fn build(bytecode: &[u8], try_blocks: &[TryBlock]) -> Result<Self, CflowError> {
        let instrs = decode_instructions(bytecode)?;
        Self::from_decoded(instrs, bytecode.len(), try_blocks)
    }

    /// Builds control-flow info from an already decoded instruction stream of `code_len` bytes.
    pub fn from_decoded(
        instrs: Vec<DecodedInstr>,
        code_len: usize,
        try_blocks: &[TryBlock],
    ) -> Result<Self, CflowError> {
        let len = u32::try_from(code_len).map_err(|_| DecodeError::OutOfBounds)?;
        let Some(last) = instrs.last() else {
            return Err(CflowError::EmptyMethodBody);
        };
        let last_pc = last.offset;

        let mut flags = vec![CflowFlags::empty(); code_len];
        for di in &instrs {
            flags[di.offset as usize] |= CflowFlags::INSTRUCTION;
        }
        let is_boundary =
            |flags: &[CflowFlags], pc: u32| pc == len || flags[pc as usize].contains(CflowFlags::INSTRUCTION);

        for di in &instrs {
            let Some(target) = di.jump_target() else {
                continue;
            };
            let in_range = u32::try_from(target).ok().filter(|t| *t < len);
            let Some(t) = in_range else {
                return Err(CflowError::InvalidJumpTarget { pc: di.offset, target });
            };
            if !flags[t as usize].contains(CflowFlags::INSTRUCTION) {
                return Err(CflowError::JumpIntoInstructionInterior { pc: di.offset, target: t });
            }
            flags[t as usize] |= CflowFlags::JUMP_TARGET;
        }

        for tb in try_blocks {
            let (start, end) = (tb.start_pc, tb.end_pc());
            if start >= end || end > len || !is_boundary(&flags, start) || !is_boundary(&flags, end)
            {
                return Err(CflowError::InvalidTryBlock { start, end });
            }
            for di in instrs.iter().filter(|d| tb.covers(d.offset)) {
                flags[di.offset as usize] |= CflowFlags::EXCEPTION_SOURCE;
            }
        }

        let mut catches: Vec<(u32, u32)> = try_blocks
            .iter()
            .flat_map(|tb| &tb.catches)
            .map(|c| (c.handler_pc, c.handler_pc.saturating_add(c.code_size)))
            .collect();
        catches.sort_unstable();
        catches.dedup();
        let mut handler_starts = Vec::with_capacity(catches.len() + 1);
        for &(start, end) in &catches {
            if start >= end || end > len || !is_boundary(&flags, start) {
                return Err(CflowError::InvalidCatchBlock { start, end });
            }
            for di in instrs.iter().filter(|d| (start..end).contains(&d.offset)) {
                flags[di.offset as usize] |= CflowFlags::EXCEPTION_HANDLER;
            }
            handler_starts.push(start);
        }
        handler_starts.dedup();
        handler_starts.push(len);

        let info = Self {
            flags,
            handler_starts,
            instrs,
        };

        if info.instrs.last().is_some_and(DecodedInstr::falls_through) {
            return Err(CflowError::BadLastInstruction { pc: last_pc });
        }
        for di in &info.instrs {
            let here = info.handler_of(di.offset);
            if let Some(t) = di.jump_target().and_then(|t| u32::try_from(t).ok())
                && info.is_exception_handler(t)
                && info.handler_of(t) != here
            {
                return Err(CflowError::JumpIntoExceptionHandler { pc: di.offset, target: t });
            }
            let next = di.next_offset();
            if di.falls_through()
                && next < len
                && info.is_exception_handler(next)
                && info.handler_of(next) != here
            {
                return Err(CflowError::FallthroughIntoExceptionHandler { pc: di.offset });
            }
        }
        Ok(info)
    }

    /// Code length in bytes.
    #[must_use]
    pub fn code_len(&self) -> u32 {
        self.handler_starts.last().copied().unwrap_or(0)
    }

    /// Flags at `pc`; empty outside the method.
    #[must_use]
    pub fn flags(&self, pc: u32) -> CflowFlags {
        self.flags.get(pc as usize).copied().unwrap_or_default()
    }

    /// Returns `true` if an instruction starts at `pc`.
    #[must_use]
    pub fn is_instruction(&self, pc: u32) -> bool {
        self.flags(pc).contains(CflowFlags::INSTRUCTION)
    }

    /// Returns `true` if some jump lands at `pc`.
    #[must_use]
    pub fn is_jump_target(&self, pc: u32) -> bool {
        self.flags(pc).contains(CflowFlags::JUMP_TARGET)
    }

    /// Returns `true` if the instruction at `pc` is protected by a try block.
    #[must_use]
    pub fn is_exception_source(&self, pc: u32) -> bool {
        self.flags(pc).contains(CflowFlags::EXCEPTION_SOURCE)
    }

    /// Returns `true` if `pc` lies in a handler body.
    #[must_use]
    pub fn is_exception_handler(&self, pc: u32) -> bool {
        self.flags(pc).contains(CflowFlags::EXCEPTION_HANDLER)
    }

    /// Start of the handler body containing `pc`, if any.
    #[must_use]
    pub fn handler_of(&self, pc: u32) -> Option<u32> {
        if !self.is_exception_handler(pc) {
            return None;
        }
        let starts = &self.handler_starts[..self.handler_starts.len().saturating_sub(1)];
        let i = starts.partition_point(|s| *s <= pc);
        i.checked_sub(1).map(|i| starts[i])
    }

    /// Sorted handler start offsets, without the trailing code-length sentinel.
    #[must_use]
    pub fn handler_starts(&self) -> &[u32] {
        &self.handler_starts[..self.handler_starts.len().saturating_sub(1)]
    }

    /// Decoded instructions in offset order.
    #[must_use]
    pub fn instructions(&self) -> &[DecodedInstr] {
        &self.instrs
    }

    /// Index into [`CflowMethodInfo::instructions`] of the instruction starting at `pc`.
    #[must_use]
    pub fn instr_index(&self, pc: u32) -> Option<usize> {
        self.instrs.binary_search_by_key(&pc, |d| d.offset).ok()
    }

    /// The instruction starting at `pc`.
    #[must_use]
    pub fn instr_at(&self, pc: u32) -> Option<&DecodedInstr> {
        self.instr_index(pc).map(|i| &self.instrs[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::opcode::Opcode;
    use crate::program::CatchBlock;
    use alloc::vec;

    fn try_block(start: u32, length: u32, handler_pc: u32, code_size: u32) -> TryBlock {
        TryBlock {
            start_pc: start,
            length,
            catches: vec![CatchBlock {
                type_id: None,
                handler_pc,
                code_size,
            }],
        }
    }

    #[test]
    fn marks_targets_sources_and_handlers() {
        // 0: ldai 1      (try)
        // 5: jeqz 11     (try)
        // 10: return.void
        // 11: return.void (jump target)
        // 12: sta v0     (handler)
        // 14: return.void (handler)
        let mut a = Asm::new();
        let l = a.label();
        a.ldai(1);
        a.jump(Opcode::Jeqz, l);
        a.op(Opcode::ReturnVoid);
        a.place(l).unwrap();
        a.op(Opcode::ReturnVoid);
        a.v(Opcode::StaObj, 0);
        a.op(Opcode::ReturnVoid);
        let bytes = a.finish().unwrap();

        let info = CflowMethodInfo::build(&bytes, &[try_block(0, 10, 12, 3)]).unwrap();
        assert!(info.is_exception_source(0) && info.is_exception_source(5));
        assert!(!info.is_exception_source(10));
        assert!(info.is_jump_target(11));
        assert!(info.is_exception_handler(12) && info.is_exception_handler(14));
        assert_eq!(info.handler_of(14), Some(12));
        assert_eq!(info.handler_of(11), None);
        assert_eq!(info.handler_starts(), [12]);
        assert_eq!(info.code_len(), 15);
        assert_eq!(info.instr_at(11).map(|d| d.opcode), Some(Opcode::ReturnVoid));
        assert!(info.instr_at(12 + 1).is_none());
    }

    #[test]
    fn rejects_bad_jumps() {
        let bytes = [Opcode::Jmp.byte(), 100, 0, 0, 0];
        assert_eq!(
            CflowMethodInfo::build(&bytes, &[]).unwrap_err(),
            CflowError::InvalidJumpTarget { pc: 0, target: 100 }
        );
        let bytes = [Opcode::Jmp.byte(), 2, 0, 0, 0];
        assert_eq!(
            CflowMethodInfo::build(&bytes, &[]).unwrap_err().code(),
            DiagnosticCode::JumpIntoInstructionInterior
        );
    }

    #[test]
    fn rejects_fall_off_end() {
        let bytes = [Opcode::Nop.byte()];
        assert_eq!(
            CflowMethodInfo::build(&bytes, &[]).unwrap_err(),
            CflowError::BadLastInstruction { pc: 0 }
        );
        assert_eq!(
            CflowMethodInfo::build(&[], &[]).unwrap_err(),
            CflowError::EmptyMethodBody
        );
    }

    #[test]
    fn rejects_entering_handler_outside_dispatch() {
        // 0: nop (try)  1: nop  2: return.void (handler)
        let bytes = [Opcode::Nop.byte(), Opcode::Nop.byte(), Opcode::ReturnVoid.byte()];
        assert_eq!(
            CflowMethodInfo::build(&bytes, &[try_block(0, 1, 2, 1)]).unwrap_err(),
            CflowError::FallthroughIntoExceptionHandler { pc: 1 }
        );

        let mut a = Asm::new();
        let h = a.label();
        a.jmp(h);
        a.place(h).unwrap();
        a.op(Opcode::ReturnVoid);
        let bytes = a.finish().unwrap();
        assert_eq!(
            CflowMethodInfo::build(&bytes, &[try_block(0, 5, 5, 1)]).unwrap_err(),
            CflowError::JumpIntoExceptionHandler { pc: 0, target: 5 }
        );
    }

    #[test]
    fn rejects_misaligned_ranges() {
        let mut a = Asm::new();
        a.ldai(0);
        a.op(Opcode::Return);
        let bytes = a.finish().unwrap();
        assert_eq!(
            CflowMethodInfo::build(&bytes, &[try_block(0, 3, 5, 1)]).unwrap_err(),
            CflowError::InvalidTryBlock { start: 0, end: 3 }
        );
        assert_eq!(
            CflowMethodInfo::build(&bytes, &[try_block(0, 5, 5, 9)]).unwrap_err(),
            CflowError::InvalidCatchBlock { start: 5, end: 14 }
        );
    }

    #[test]
    fn accepted_streams_survive_reencoding() {
        let mut a = Asm::new();
        let top = a.label();
        a.place(top).unwrap();
        a.ldai(3);
        a.jump(Opcode::Jnez, top);
        a.op(Opcode::ReturnVoid);
        let bytes = a.finish().unwrap();
        let info = CflowMethodInfo::build(&bytes, &[]).unwrap();
        let again = crate::bytecode::encode_instructions(info.instructions());
        assert_eq!(again, bytes);
        assert!(CflowMethodInfo::build(&again, &[]).is_ok());
    }
}
