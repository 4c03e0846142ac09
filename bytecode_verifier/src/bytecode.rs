// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bytecode decoding.
//!
//! Decoding happens in two steps: the raw [`Operands`] of an instruction are read according to
//! its opcode's [`Format`], then lifted into a typed [`Instr`] grouped by opcode family. The
//! verifier dispatches on [`Instr`]; the raw operands are kept so a decoded stream can be
//! re-encoded byte-for-byte.

use alloc::vec::Vec;
use core::fmt;

use crate::format::{DecodeError, Reader, Writer};
use crate::opcode::{Format, Opcode};
use crate::program::EntityId;

/// A register operand: the accumulator or a virtual register.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reg {
    /// The accumulator.
    Acc,
    /// Virtual register `v<n>`.
    V(u16),
}

impl From<u8> for Reg {
    fn from(r: u8) -> Self {
        Self::V(u16::from(r))
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acc => write!(f, "acc"),
            Self::V(n) => write!(f, "v{n}"),
        }
    }
}

/// Raw operands, laid out as the opcode's [`Format`] describes.
///
/// Unused fields are zero.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Operands {
    /// Register operands in encoding order.
    pub regs: [u8; 4],
    /// Immediate (`i32`/`i64`/`u8`, sign- or zero-extended).
    pub imm: i64,
    /// Entity id.
    pub id: u16,
    /// Relative jump offset.
    pub jump: i32,
}

/// A decoded instruction with its byte offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedInstr {
    /// Byte offset within the method bytecode.
    pub offset: u32,
    /// Opcode.
    pub opcode: Opcode,
    /// Raw operands.
    pub operands: Operands,
    /// Typed instruction.
    pub instr: Instr,
}

impl DecodedInstr {
    /// Offset of the instruction that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset
            .saturating_add(u32::try_from(self.opcode.format().size()).unwrap_or(u32::MAX))
    }

    /// Absolute jump target, if the instruction jumps. May lie outside the method.
    #[must_use]
    pub fn jump_target(&self) -> Option<i64> {
        self.opcode
            .is_jump()
            .then(|| i64::from(self.offset) + i64::from(self.operands.jump))
    }

    /// Returns `true` if execution may continue at [`DecodedInstr::next_offset`].
    #[must_use]
    pub fn falls_through(&self) -> bool {
        !self.opcode.is_terminator()
    }
}

impl fmt::Display for DecodedInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = self.opcode.format();
        write!(f, "{:>5}: {}", self.offset, self.opcode.mnemonic())?;
        let mut sep = " ";
        if format.has_id() && !matches!(format, Format::VId | Format::VVId) {
            write!(f, "{sep}@{}", self.operands.id)?;
            sep = ", ";
        }
        for r in &self.operands.regs[..format.reg_count()] {
            write!(f, "{sep}v{r}")?;
            sep = ", ";
        }
        match format {
            Format::VId | Format::VVId => write!(f, "{sep}@{}", self.operands.id)?,
            Format::VImm32 | Format::VImm64 | Format::Imm32 | Format::Imm64 => {
                write!(f, "{sep}{}", self.operands.imm)?;
            }
            Format::IdVImm | Format::IdVVVImm => write!(f, "{sep}acc@{}", self.operands.imm)?,
            Format::Jump | Format::VJump => {
                let target = i64::from(self.offset) + i64::from(self.operands.jump);
                write!(f, "{sep}->{target}")?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Operand width/category for moves, field accesses, and returns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    /// 32-bit primitive.
    B32,
    /// 64-bit primitive.
    B64,
    /// Object reference.
    Obj,
}

/// Constant immediate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Imm {
    /// `i32` constant.
    I32(i32),
    /// `i64` constant.
    I64(i64),
    /// `f32` constant as raw IEEE bits.
    F32(u32),
    /// `f64` constant as raw IEEE bits.
    F64(u64),
}

/// Comparison performed by a conditional jump.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Cond {
    /// `==`.
    Eq,
    /// `!=`.
    Ne,
    /// `<`.
    Lt,
    /// `>`.
    Gt,
    /// `<=`.
    Le,
    /// `>=`.
    Ge,
}

/// Numeric category of an arithmetic instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NumKind {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

/// Binary arithmetic/logic operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs, reason = "operation names are self-describing")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ashr,
}

/// Unary operation on the accumulator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Not,
}

/// Comparison producing an `i32` in the accumulator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs, reason = "mirrors the opcode mnemonics")]
pub enum CmpOp {
    Cmp64,
    Ucmp,
    Ucmp64,
    Fcmpl,
    Fcmpg,
    Fcmpl64,
    Fcmpg64,
}

/// Primitive conversion of the accumulator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs, reason = "mirrors the opcode mnemonics")]
pub enum Conversion {
    I32toI64,
    I32toF32,
    I32toF64,
    I32toU1,
    I32toI8,
    I32toU8,
    I32toI16,
    I32toU16,
    I64toI32,
    I64toF32,
    I64toF64,
    U32toI64,
    U32toF64,
    U64toI32,
    F32toI32,
    F32toI64,
    F32toF64,
    F64toI32,
    F64toI64,
    F64toF32,
}

/// Element kind read by an array load.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs, reason = "mirrors the opcode mnemonics")]
pub enum ArrayLoad {
    I8,
    U8,
    I16,
    U16,
    I32,
    I64,
    F32,
    F64,
    Obj,
}

/// Element kind written by an array store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs, reason = "mirrors the opcode mnemonics")]
pub enum ArrayStore {
    B8,
    B16,
    B32,
    B64,
    F32,
    F64,
    Obj,
}

/// How a call or constructor receives its arguments.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallArgs {
    /// Explicit registers.
    Regs {
        /// Register operands; only the first `count` are meaningful.
        regs: [u8; 4],
        /// Number of register operands.
        count: u8,
    },
    /// Consecutive registers starting at `start`.
    Range {
        /// First argument register.
        start: u8,
    },
    /// Explicit registers with the accumulator spliced in at `acc_pos`.
    WithAcc {
        /// Register operands; only the first `count` are meaningful.
        regs: [u8; 4],
        /// Number of register operands.
        count: u8,
        /// Argument position taken by the accumulator.
        acc_pos: u8,
    },
}

/// Return instruction variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// `return`.
    B32,
    /// `return.64`.
    B64,
    /// `return.obj`.
    Obj,
    /// `return.void`.
    Void,
}

/// Typed instruction, one variant per opcode family.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs, reason = "fields are described by the variant docs")]
pub enum Instr {
    /// No-op.
    Nop,
    /// `dst = src`.
    Mov { width: Width, dst: u8, src: u8 },
    /// `dst = null`.
    MovNull { dst: u8 },
    /// `dst = imm`.
    MovImm { dst: u8, imm: Imm },
    /// `acc = src`.
    Lda { width: Width, src: u8 },
    /// `acc = imm`.
    LdaImm { imm: Imm },
    /// `acc = string constant`.
    LdaStr { id: EntityId },
    /// `acc = class object`.
    LdaType { id: EntityId },
    /// `acc = null`.
    LdaNull,
    /// `dst = acc`.
    Sta { width: Width, dst: u8 },
    /// Unconditional jump.
    Jmp { target: i64 },
    /// Jump if `acc <cond> 0` (32-bit integers).
    JmpZero { cond: Cond, target: i64 },
    /// Jump if `acc <cond> null` (`Eq`/`Ne` only).
    JmpZeroObj { cond: Cond, target: i64 },
    /// Jump if `acc <cond> reg` (32-bit integers).
    JmpReg { cond: Cond, reg: u8, target: i64 },
    /// Jump if `acc <cond> reg` by reference identity (`Eq`/`Ne` only).
    JmpRegObj { cond: Cond, reg: u8, target: i64 },
    /// `acc = acc <op> rhs`.
    Binary { op: BinOp, kind: NumKind, rhs: u8 },
    /// `acc = lhs <op> rhs` (32-bit integers).
    BinaryRegs { op: BinOp, lhs: u8, rhs: u8 },
    /// `acc = acc <op> imm` (32-bit integers).
    BinaryImm { op: BinOp, imm: i32 },
    /// `reg += imm` (32-bit integers).
    Inci { reg: u8, imm: i32 },
    /// `acc = <op> acc`.
    Unary { op: UnaryOp, kind: NumKind },
    /// `acc = compare(acc, rhs)`.
    Compare { op: CmpOp, rhs: u8 },
    /// `acc = convert(acc)`.
    Convert { conv: Conversion },
    /// `acc = array[acc]`.
    LoadArray { elem: ArrayLoad, array: u8 },
    /// `array[index] = acc`.
    StoreArray { elem: ArrayStore, array: u8, index: u8 },
    /// `acc = len(array)`.
    LenArray { array: u8 },
    /// `dst = new <id>[size]`.
    NewArray { dst: u8, size: u8, id: EntityId },
    /// `dst = new <id>` (uninitialized).
    NewObject { dst: u8, id: EntityId },
    /// `acc = new <ctor.class>(args...)`.
    InitObject { id: EntityId, args: CallArgs },
    /// `dst = obj.field` (or a static field when `obj` is `None`).
    LoadField {
        width: Width,
        dst: Reg,
        obj: Option<u8>,
        id: EntityId,
        volatile: bool,
    },
    /// `obj.field = src` (or a static field when `obj` is `None`).
    StoreField {
        width: Width,
        src: Reg,
        obj: Option<u8>,
        id: EntityId,
        volatile: bool,
    },
    /// Method call; `virt` selects virtual dispatch.
    Call {
        virt: bool,
        id: EntityId,
        args: CallArgs,
    },
    /// Return from the method.
    Return { kind: ReturnKind },
    /// `acc = (id) acc`.
    CheckCast { id: EntityId },
    /// `acc = acc instanceof id`.
    IsInstance { id: EntityId },
    /// Throw the exception in `reg`.
    Throw { reg: u8 },
    /// Enter the monitor of `acc`.
    MonitorEnter,
    /// Exit the monitor of `acc`.
    MonitorExit,
}

impl Instr {
    /// Lifts raw operands into a typed instruction.
    #[must_use]
    pub fn from_operands(op: Opcode, offset: u32, o: &Operands) -> Self {
        use Opcode as O;

        let [r0, r1, r2, r3] = o.regs;
        let id = EntityId(o.id);
        let target = i64::from(offset) + i64::from(o.jump);
        #[allow(clippy::cast_possible_truncation, reason = "imm32 formats hold an i32")]
        let imm32 = o.imm as i32;
        #[allow(clippy::cast_sign_loss, reason = "raw float bits")]
        let bits32 = imm32 as u32;
        #[allow(clippy::cast_sign_loss, reason = "raw float bits")]
        let bits64 = o.imm as u64;
        #[allow(clippy::cast_possible_truncation, reason = "accumulator positions are one byte")]
        let acc_pos = o.imm as u8;

        match op {
            O::Nop => Self::Nop,
            O::Mov => Self::Mov { width: Width::B32, dst: r0, src: r1 },
            O::Mov64 => Self::Mov { width: Width::B64, dst: r0, src: r1 },
            O::MovObj => Self::Mov { width: Width::Obj, dst: r0, src: r1 },
            O::Movi => Self::MovImm { dst: r0, imm: Imm::I32(imm32) },
            O::Movi64 => Self::MovImm { dst: r0, imm: Imm::I64(o.imm) },
            O::Fmovi => Self::MovImm { dst: r0, imm: Imm::F32(bits32) },
            O::Fmovi64 => Self::MovImm { dst: r0, imm: Imm::F64(bits64) },
            O::MovNull => Self::MovNull { dst: r0 },

            O::Lda => Self::Lda { width: Width::B32, src: r0 },
            O::Lda64 => Self::Lda { width: Width::B64, src: r0 },
            O::LdaObj => Self::Lda { width: Width::Obj, src: r0 },
            O::Ldai => Self::LdaImm { imm: Imm::I32(imm32) },
            O::Ldai64 => Self::LdaImm { imm: Imm::I64(o.imm) },
            O::Fldai => Self::LdaImm { imm: Imm::F32(bits32) },
            O::Fldai64 => Self::LdaImm { imm: Imm::F64(bits64) },
            O::LdaStr => Self::LdaStr { id },
            O::LdaType => Self::LdaType { id },
            O::LdaNull => Self::LdaNull,
            O::Sta => Self::Sta { width: Width::B32, dst: r0 },
            O::Sta64 => Self::Sta { width: Width::B64, dst: r0 },
            O::StaObj => Self::Sta { width: Width::Obj, dst: r0 },

            O::Jmp => Self::Jmp { target },
            O::Jeqz => Self::JmpZero { cond: Cond::Eq, target },
            O::Jnez => Self::JmpZero { cond: Cond::Ne, target },
            O::Jltz => Self::JmpZero { cond: Cond::Lt, target },
            O::Jgtz => Self::JmpZero { cond: Cond::Gt, target },
            O::Jlez => Self::JmpZero { cond: Cond::Le, target },
            O::Jgez => Self::JmpZero { cond: Cond::Ge, target },
            O::JeqzObj => Self::JmpZeroObj { cond: Cond::Eq, target },
            O::JnezObj => Self::JmpZeroObj { cond: Cond::Ne, target },
            O::Jeq => Self::JmpReg { cond: Cond::Eq, reg: r0, target },
            O::Jne => Self::JmpReg { cond: Cond::Ne, reg: r0, target },
            O::Jlt => Self::JmpReg { cond: Cond::Lt, reg: r0, target },
            O::Jgt => Self::JmpReg { cond: Cond::Gt, reg: r0, target },
            O::Jle => Self::JmpReg { cond: Cond::Le, reg: r0, target },
            O::Jge => Self::JmpReg { cond: Cond::Ge, reg: r0, target },
            O::JeqObj => Self::JmpRegObj { cond: Cond::Eq, reg: r0, target },
            O::JneObj => Self::JmpRegObj { cond: Cond::Ne, reg: r0, target },

            O::Add2 | O::Sub2 | O::Mul2 | O::Div2 | O::Mod2 | O::And2 | O::Or2 | O::Xor2
            | O::Shl2 | O::Shr2 | O::Ashr2 => Self::Binary {
                op: bin_op(op.byte() - O::Add2.byte()),
                kind: NumKind::I32,
                rhs: r0,
            },
            O::Add264 | O::Sub264 | O::Mul264 | O::Div264 | O::Mod264 | O::And264
            | O::Or264 | O::Xor264 | O::Shl264 | O::Shr264 | O::Ashr264 => Self::Binary {
                op: bin_op(op.byte() - O::Add264.byte()),
                kind: NumKind::I64,
                rhs: r0,
            },
            O::Fadd2 | O::Fsub2 | O::Fmul2 | O::Fdiv2 | O::Fmod2 => Self::Binary {
                op: bin_op(op.byte() - O::Fadd2.byte()),
                kind: NumKind::F32,
                rhs: r0,
            },
            O::Fadd264 | O::Fsub264 | O::Fmul264 | O::Fdiv264 | O::Fmod264 => Self::Binary {
                op: bin_op(op.byte() - O::Fadd264.byte()),
                kind: NumKind::F64,
                rhs: r0,
            },
            O::Add | O::Sub | O::Mul | O::Div | O::Mod | O::And | O::Or | O::Xor | O::Shl
            | O::Shr | O::Ashr => Self::BinaryRegs {
                op: bin_op(op.byte() - O::Add.byte()),
                lhs: r0,
                rhs: r1,
            },
            O::Addi | O::Subi | O::Muli | O::Divi | O::Modi | O::Andi | O::Ori | O::Xori
            | O::Shli | O::Shri | O::Ashri => Self::BinaryImm {
                op: bin_op(op.byte() - O::Addi.byte()),
                imm: imm32,
            },
            O::Inci => Self::Inci { reg: r0, imm: imm32 },

            O::Neg => Self::Unary { op: UnaryOp::Neg, kind: NumKind::I32 },
            O::Neg64 => Self::Unary { op: UnaryOp::Neg, kind: NumKind::I64 },
            O::Not => Self::Unary { op: UnaryOp::Not, kind: NumKind::I32 },
            O::Not64 => Self::Unary { op: UnaryOp::Not, kind: NumKind::I64 },
            O::Fneg => Self::Unary { op: UnaryOp::Neg, kind: NumKind::F32 },
            O::Fneg64 => Self::Unary { op: UnaryOp::Neg, kind: NumKind::F64 },

            O::Cmp64 => Self::Compare { op: CmpOp::Cmp64, rhs: r0 },
            O::Ucmp => Self::Compare { op: CmpOp::Ucmp, rhs: r0 },
            O::Ucmp64 => Self::Compare { op: CmpOp::Ucmp64, rhs: r0 },
            O::Fcmpl => Self::Compare { op: CmpOp::Fcmpl, rhs: r0 },
            O::Fcmpg => Self::Compare { op: CmpOp::Fcmpg, rhs: r0 },
            O::Fcmpl64 => Self::Compare { op: CmpOp::Fcmpl64, rhs: r0 },
            O::Fcmpg64 => Self::Compare { op: CmpOp::Fcmpg64, rhs: r0 },

            O::I32toi64 => Self::Convert { conv: Conversion::I32toI64 },
            O::I32tof32 => Self::Convert { conv: Conversion::I32toF32 },
            O::I32tof64 => Self::Convert { conv: Conversion::I32toF64 },
            O::I32tou1 => Self::Convert { conv: Conversion::I32toU1 },
            O::I32toi8 => Self::Convert { conv: Conversion::I32toI8 },
            O::I32tou8 => Self::Convert { conv: Conversion::I32toU8 },
            O::I32toi16 => Self::Convert { conv: Conversion::I32toI16 },
            O::I32tou16 => Self::Convert { conv: Conversion::I32toU16 },
            O::I64toi32 => Self::Convert { conv: Conversion::I64toI32 },
            O::I64tof32 => Self::Convert { conv: Conversion::I64toF32 },
            O::I64tof64 => Self::Convert { conv: Conversion::I64toF64 },
            O::U32toi64 => Self::Convert { conv: Conversion::U32toI64 },
            O::U32tof64 => Self::Convert { conv: Conversion::U32toF64 },
            O::U64toi32 => Self::Convert { conv: Conversion::U64toI32 },
            O::F32toi32 => Self::Convert { conv: Conversion::F32toI32 },
            O::F32toi64 => Self::Convert { conv: Conversion::F32toI64 },
            O::F32tof64 => Self::Convert { conv: Conversion::F32toF64 },
            O::F64toi32 => Self::Convert { conv: Conversion::F64toI32 },
            O::F64toi64 => Self::Convert { conv: Conversion::F64toI64 },
            O::F64tof32 => Self::Convert { conv: Conversion::F64toF32 },

            O::Ldarr8 => Self::LoadArray { elem: ArrayLoad::I8, array: r0 },
            O::Ldarru8 => Self::LoadArray { elem: ArrayLoad::U8, array: r0 },
            O::Ldarr16 => Self::LoadArray { elem: ArrayLoad::I16, array: r0 },
            O::Ldarru16 => Self::LoadArray { elem: ArrayLoad::U16, array: r0 },
            O::Ldarr => Self::LoadArray { elem: ArrayLoad::I32, array: r0 },
            O::Ldarr64 => Self::LoadArray { elem: ArrayLoad::I64, array: r0 },
            O::Fldarr32 => Self::LoadArray { elem: ArrayLoad::F32, array: r0 },
            O::Fldarr64 => Self::LoadArray { elem: ArrayLoad::F64, array: r0 },
            O::LdarrObj => Self::LoadArray { elem: ArrayLoad::Obj, array: r0 },
            O::Starr8 => Self::StoreArray { elem: ArrayStore::B8, array: r0, index: r1 },
            O::Starr16 => Self::StoreArray { elem: ArrayStore::B16, array: r0, index: r1 },
            O::Starr => Self::StoreArray { elem: ArrayStore::B32, array: r0, index: r1 },
            O::Starr64 => Self::StoreArray { elem: ArrayStore::B64, array: r0, index: r1 },
            O::Fstarr32 => Self::StoreArray { elem: ArrayStore::F32, array: r0, index: r1 },
            O::Fstarr64 => Self::StoreArray { elem: ArrayStore::F64, array: r0, index: r1 },
            O::StarrObj => Self::StoreArray { elem: ArrayStore::Obj, array: r0, index: r1 },
            O::Lenarr => Self::LenArray { array: r0 },
            O::Newarr => Self::NewArray { dst: r0, size: r1, id },

            O::Newobj => Self::NewObject { dst: r0, id },
            O::InitobjShort => Self::InitObject { id, args: regs_args(o.regs, 2) },
            O::Initobj => Self::InitObject { id, args: regs_args(o.regs, 4) },
            O::InitobjRange => Self::InitObject { id, args: CallArgs::Range { start: r0 } },

            O::Ldobj => load(Width::B32, Reg::Acc, Some(r0), id, false),
            O::Ldobj64 => load(Width::B64, Reg::Acc, Some(r0), id, false),
            O::LdobjObj => load(Width::Obj, Reg::Acc, Some(r0), id, false),
            O::LdobjV => load(Width::B32, Reg::from(r0), Some(r1), id, false),
            O::LdobjV64 => load(Width::B64, Reg::from(r0), Some(r1), id, false),
            O::LdobjVObj => load(Width::Obj, Reg::from(r0), Some(r1), id, false),
            O::Stobj => store(Width::B32, Reg::Acc, Some(r0), id, false),
            O::Stobj64 => store(Width::B64, Reg::Acc, Some(r0), id, false),
            O::StobjObj => store(Width::Obj, Reg::Acc, Some(r0), id, false),
            O::StobjV => store(Width::B32, Reg::from(r0), Some(r1), id, false),
            O::StobjV64 => store(Width::B64, Reg::from(r0), Some(r1), id, false),
            O::StobjVObj => store(Width::Obj, Reg::from(r0), Some(r1), id, false),
            O::LdobjVolatile => load(Width::B32, Reg::Acc, Some(r0), id, true),
            O::LdobjVolatile64 => load(Width::B64, Reg::Acc, Some(r0), id, true),
            O::LdobjVolatileObj => load(Width::Obj, Reg::Acc, Some(r0), id, true),
            O::StobjVolatile => store(Width::B32, Reg::Acc, Some(r0), id, true),
            O::StobjVolatile64 => store(Width::B64, Reg::Acc, Some(r0), id, true),
            O::StobjVolatileObj => store(Width::Obj, Reg::Acc, Some(r0), id, true),
            O::Ldstatic => load(Width::B32, Reg::Acc, None, id, false),
            O::Ldstatic64 => load(Width::B64, Reg::Acc, None, id, false),
            O::LdstaticObj => load(Width::Obj, Reg::Acc, None, id, false),
            O::Ststatic => store(Width::B32, Reg::Acc, None, id, false),
            O::Ststatic64 => store(Width::B64, Reg::Acc, None, id, false),
            O::StstaticObj => store(Width::Obj, Reg::Acc, None, id, false),
            O::LdstaticVolatile => load(Width::B32, Reg::Acc, None, id, true),
            O::LdstaticVolatile64 => load(Width::B64, Reg::Acc, None, id, true),
            O::LdstaticVolatileObj => load(Width::Obj, Reg::Acc, None, id, true),
            O::StstaticVolatile => store(Width::B32, Reg::Acc, None, id, true),
            O::StstaticVolatile64 => store(Width::B64, Reg::Acc, None, id, true),
            O::StstaticVolatileObj => store(Width::Obj, Reg::Acc, None, id, true),

            O::CallShort | O::CallVirtShort => Self::Call {
                virt: op == O::CallVirtShort,
                id,
                args: regs_args(o.regs, 2),
            },
            O::Call | O::CallVirt => Self::Call {
                virt: op == O::CallVirt,
                id,
                args: regs_args(o.regs, 4),
            },
            O::CallRange | O::CallVirtRange => Self::Call {
                virt: op == O::CallVirtRange,
                id,
                args: CallArgs::Range { start: r0 },
            },
            O::CallAccShort | O::CallVirtAccShort => Self::Call {
                virt: op == O::CallVirtAccShort,
                id,
                args: CallArgs::WithAcc { regs: [r0, 0, 0, 0], count: 1, acc_pos },
            },
            O::CallAcc | O::CallVirtAcc => Self::Call {
                virt: op == O::CallVirtAcc,
                id,
                args: CallArgs::WithAcc { regs: [r0, r1, r2, r3], count: 3, acc_pos },
            },

            O::Return => Self::Return { kind: ReturnKind::B32 },
            O::Return64 => Self::Return { kind: ReturnKind::B64 },
            O::ReturnObj => Self::Return { kind: ReturnKind::Obj },
            O::ReturnVoid => Self::Return { kind: ReturnKind::Void },
            O::Checkcast => Self::CheckCast { id },
            O::Isinstance => Self::IsInstance { id },
            O::Throw => Self::Throw { reg: r0 },
            O::Monitorenter => Self::MonitorEnter,
            O::Monitorexit => Self::MonitorExit,
        }
    }
}

const BIN_OPS: [BinOp; 11] = [
    BinOp::Add,
    BinOp::Sub,
    BinOp::Mul,
    BinOp::Div,
    BinOp::Mod,
    BinOp::And,
    BinOp::Or,
    BinOp::Xor,
    BinOp::Shl,
    BinOp::Shr,
    BinOp::Ashr,
];

fn bin_op(index: u8) -> BinOp {
    BIN_OPS[usize::from(index) % BIN_OPS.len()]
}

fn regs_args(regs: [u8; 4], count: u8) -> CallArgs {
    CallArgs::Regs { regs, count }
}

fn load(width: Width, dst: Reg, obj: Option<u8>, id: EntityId, volatile: bool) -> Instr {
    Instr::LoadField {
        width,
        dst,
        obj,
        id,
        volatile,
    }
}

fn store(width: Width, src: Reg, obj: Option<u8>, id: EntityId, volatile: bool) -> Instr {
    Instr::StoreField {
        width,
        src,
        obj,
        id,
        volatile,
    }
}

fn read_operands(r: &mut Reader<'_>, format: Format) -> Result<Operands, DecodeError> {
    let mut o = Operands::default();
    if format.has_id() && !matches!(format, Format::VId | Format::VVId) {
        o.id = r.read_u16_le()?;
    }
    for slot in &mut o.regs[..format.reg_count()] {
        *slot = r.read_u8()?;
    }
    match format {
        Format::VId | Format::VVId => o.id = r.read_u16_le()?,
        Format::VImm32 | Format::Imm32 => o.imm = i64::from(r.read_i32_le()?),
        Format::VImm64 | Format::Imm64 => o.imm = r.read_i64_le()?,
        Format::IdVImm | Format::IdVVVImm => o.imm = i64::from(r.read_u8()?),
        Format::Jump | Format::VJump => o.jump = r.read_i32_le()?,
        _ => {}
    }
    Ok(o)
}

/// Appends one encoded instruction to `w`.
pub fn encode_instr(w: &mut Writer, op: Opcode, o: &Operands) {
    let format = op.format();
    w.write_u8(op.byte());
    if format.has_id() && !matches!(format, Format::VId | Format::VVId) {
        w.write_u16_le(o.id);
    }
    for &r in &o.regs[..format.reg_count()] {
        w.write_u8(r);
    }
    match format {
        Format::VId | Format::VVId => w.write_u16_le(o.id),
        #[allow(clippy::cast_possible_truncation, reason = "imm32 formats hold an i32")]
        Format::VImm32 | Format::Imm32 => w.write_i32_le(o.imm as i32),
        Format::VImm64 | Format::Imm64 => w.write_i64_le(o.imm),
        #[allow(clippy::cast_possible_truncation, reason = "accumulator positions are one byte")]
        #[allow(clippy::cast_sign_loss, reason = "accumulator positions are one byte")]
        Format::IdVImm | Format::IdVVVImm => w.write_u8(o.imm as u8),
        Format::Jump | Format::VJump => w.write_i32_le(o.jump),
        _ => {}
    }
}

/// Re-encodes a decoded instruction stream.
#[must_use]
pub fn encode_instructions(instrs: &[DecodedInstr]) -> Vec<u8> {
    let mut w = Writer::new();
    for di in instrs {
        encode_instr(&mut w, di.opcode, &di.operands);
    }
    w.into_vec()
}

/// Decodes every instruction in `bytes`.
pub fn decode_instructions(bytes: &[u8]) -> Result<Vec<DecodedInstr>, DecodeError> {
    let mut r = Reader::new(bytes);
    let mut out: Vec<DecodedInstr> = Vec::new();
    while !r.is_empty() {
        let at = r.offset();
        let offset = u32::try_from(at).map_err(|_| DecodeError::OutOfBounds)?;
        let byte = r.read_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::UnknownOpcode {
            offset: at,
            opcode: byte,
        })?;
        let operands = read_operands(&mut r, opcode.format())?;
        out.push(DecodedInstr {
            offset,
            opcode,
            operands,
            instr: Instr::from_operands(opcode, offset, &operands),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn decodes_offsets_and_operands() {
        // ldai 10; sta v1; jmp -6
        let bytes = vec![
            Opcode::Ldai.byte(),
            10,
            0,
            0,
            0,
            Opcode::Sta.byte(),
            1,
            Opcode::Jmp.byte(),
            0xF9,
            0xFF,
            0xFF,
            0xFF,
        ];
        let d = decode_instructions(&bytes).unwrap();
        assert_eq!(d.len(), 3);
        assert_eq!(d[0].instr, Instr::LdaImm { imm: Imm::I32(10) });
        assert_eq!(
            d[1].instr,
            Instr::Sta {
                width: Width::B32,
                dst: 1
            }
        );
        assert_eq!(d[2].offset, 7);
        assert_eq!(d[2].jump_target(), Some(0));
        assert!(!d[2].falls_through());
        assert_eq!(encode_instructions(&d), bytes);
    }

    #[test]
    fn rejects_unknown_opcode_and_truncation() {
        assert_eq!(
            decode_instructions(&[Opcode::Nop.byte(), 0xFF]),
            Err(DecodeError::UnknownOpcode {
                offset: 1,
                opcode: 0xFF
            })
        );
        assert_eq!(
            decode_instructions(&[Opcode::Ldai.byte(), 1, 2]),
            Err(DecodeError::UnexpectedEof { offset: 1 })
        );
    }

    #[test]
    fn lifts_families() {
        let o = Operands {
            regs: [3, 4, 0, 0],
            id: 9,
            ..Operands::default()
        };
        assert_eq!(
            Instr::from_operands(Opcode::Xor264, 0, &o),
            Instr::Binary {
                op: BinOp::Xor,
                kind: NumKind::I64,
                rhs: 3
            }
        );
        assert_eq!(
            Instr::from_operands(Opcode::StobjV, 0, &o),
            Instr::StoreField {
                width: Width::B32,
                src: Reg::V(3),
                obj: Some(4),
                id: EntityId(9),
                volatile: false
            }
        );
        assert_eq!(
            Instr::from_operands(Opcode::CallVirtAcc, 0, &Operands { imm: 1, ..o }),
            Instr::Call {
                virt: true,
                id: EntityId(9),
                args: CallArgs::WithAcc {
                    regs: [3, 4, 0, 0],
                    count: 3,
                    acc_pos: 1
                }
            }
        );
    }

    #[test]
    fn display_is_readable() {
        let o = Operands {
            regs: [2, 0, 0, 0],
            id: 5,
            ..Operands::default()
        };
        let di = DecodedInstr {
            offset: 4,
            opcode: Opcode::CallShort,
            operands: o,
            instr: Instr::from_operands(Opcode::CallShort, 4, &o),
        };
        assert_eq!(di.to_string(), "    4: call.short @5, v2, v0");
    }
}
