// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Abstract interpreter.
//!
//! [`abstract_interpret`] runs one straight-line stretch of a method, starting at an entry point
//! whose context has been loaded into the [`ExecContext`](crate::exec_context::ExecContext), and
//! applies one transfer function per instruction to the current [`RegContext`]. A run ends at a
//! terminator, at the first failed precondition, or when execution falls into a jump target; in
//! the last case the context is handed to the target's checkpoint instead of being carried on.
//!
//! Transfer functions return [`ControlFlow`]: `Break` ends the run (the path is dead or failed),
//! `Continue` moves on to the next instruction.

mod calls;
mod objects;

use alloc::format;
use alloc::string::String;
use core::ops::ControlFlow::{self, Break, Continue};

use crate::bytecode::{
    CmpOp, Cond, Conversion, DecodedInstr, Imm, Instr, NumKind, Reg, ReturnKind, UnaryOp, Width,
};
use crate::context::{Lookup, VerificationContext};
use crate::diagnostics::DiagnosticCode as D;
use crate::exec_context::EntryKind;
use crate::program::{ClassId, EntityId, FieldId, MethodId, PoolEntry};
use crate::reg_context::{Atv, RegContext};
use crate::status::VerificationStatus;
use crate::trace::TraceMask;
use crate::types::Type;

type Flow<T = ()> = ControlFlow<(), T>;

/// Interprets from `entry` until the run ends and returns the run's status.
pub(crate) fn abstract_interpret(
    ctx: &mut VerificationContext<'_>,
    entry: u32,
    kind: EntryKind,
) -> VerificationStatus {
    ctx.run_status = VerificationStatus::Ok;
    let cflow = ctx.cflow;
    let Some(start) = cflow.instr_index(entry) else {
        return ctx.report(
            D::InvalidJumpTarget,
            Some(entry),
            VerificationStatus::Error,
            format!("no instruction starts at entry point {entry}"),
        );
    };
    log::trace!("{}: run from {entry} ({kind:?})", ctx.method_name);
    if ctx.tracing(TraceMask::ENTRY)
        && let Some(t) = ctx.trace.as_deref_mut()
    {
        t.entry_point(entry, kind, ctx.exec.current());
    }

    let in_handler = kind == EntryKind::ExceptionHandler;
    let mut prev: Option<u32> = None;
    for di in &cflow.instructions()[start..] {
        let pc = di.offset;
        if let Some(from) = prev
            && cflow.is_jump_target(pc)
        {
            let out = ctx.exec.process_fallthrough(from, pc, ctx.ts);
            report_conflicts(ctx, from, pc, &out.conflicting);
            break;
        }
        if cflow.is_exception_source(pc) {
            let out = ctx.exec.store_current_reg_context_for_addr(pc, ctx.ts);
            report_conflicts(ctx, pc, pc, &out.conflicting);
        }
        if ctx.debug && ctx.breakpoints.contains(&pc) {
            breakpoint(ctx, pc);
        }
        if ctx.tracing(TraceMask::INSTR)
            && let Some(t) = ctx.trace.as_deref_mut()
        {
            t.instr(di, ctx.exec.current());
        }

        let flow = Interp {
            ctx: &mut *ctx,
            pc,
            in_handler,
        }
        .step(di);
        if flow.is_break() || ctx.run_status.is_error() || !di.falls_through() {
            break;
        }
        prev = Some(pc);
    }
    ctx.run_status
}

fn breakpoint(ctx: &mut VerificationContext<'_>, pc: u32) {
    log::debug!(
        "{}: breakpoint at {pc}: {}",
        ctx.method_name,
        ctx.exec.current().dump(ctx.ts)
    );
    if ctx.tracing(TraceMask::BREAKPOINT)
        && let Some(t) = ctx.trace.as_deref_mut()
    {
        t.breakpoint(pc, ctx.exec.current());
    }
}

fn report_conflicts(ctx: &mut VerificationContext<'_>, pc: u32, target: u32, regs: &[Reg]) {
    for r in regs {
        ctx.report(
            D::ConflictingRegister,
            Some(pc),
            VerificationStatus::Ok,
            format!("{r} has conflicting types at {target} and is undefined there"),
        );
    }
}

/// Register category moved, loaded, stored, or returned by a `width` instruction.
const fn category(width: Width) -> Type {
    match width {
        Width::B32 => Type::BITS32,
        Width::B64 => Type::BITS64,
        Width::Obj => Type::REFERENCE,
    }
}

const fn num_group(kind: NumKind) -> Type {
    match kind {
        NumKind::I32 => Type::INTEGRAL32,
        NumKind::I64 => Type::INTEGRAL64,
        NumKind::F32 => Type::FLOAT32,
        NumKind::F64 => Type::FLOAT64,
    }
}

const fn imm_type(imm: Imm) -> Type {
    match imm {
        Imm::I32(_) => Type::I32,
        Imm::I64(_) => Type::I64,
        Imm::F32(_) => Type::F32,
        Imm::F64(_) => Type::F64,
    }
}

const fn compare_group(op: CmpOp) -> Type {
    match op {
        CmpOp::Ucmp => Type::INTEGRAL32,
        CmpOp::Cmp64 | CmpOp::Ucmp64 => Type::INTEGRAL64,
        CmpOp::Fcmpl | CmpOp::Fcmpg => Type::FLOAT32,
        CmpOp::Fcmpl64 | CmpOp::Fcmpg64 => Type::FLOAT64,
    }
}

/// Required source group and produced type of a conversion.
const fn conversion(conv: Conversion) -> (Type, Type) {
    use Conversion as C;
    match conv {
        C::I32toI64 => (Type::INTEGRAL32, Type::I64),
        C::I32toF32 => (Type::INTEGRAL32, Type::F32),
        C::I32toF64 => (Type::INTEGRAL32, Type::F64),
        C::I32toU1 => (Type::INTEGRAL32, Type::U1),
        C::I32toI8 => (Type::INTEGRAL32, Type::I8),
        C::I32toU8 => (Type::INTEGRAL32, Type::U8),
        C::I32toI16 => (Type::INTEGRAL32, Type::I16),
        C::I32toU16 => (Type::INTEGRAL32, Type::U16),
        C::I64toI32 => (Type::INTEGRAL64, Type::I32),
        C::I64toF32 => (Type::INTEGRAL64, Type::F32),
        C::I64toF64 => (Type::INTEGRAL64, Type::F64),
        C::U32toI64 => (Type::INTEGRAL32, Type::I64),
        C::U32toF64 => (Type::INTEGRAL32, Type::F64),
        C::U64toI32 => (Type::INTEGRAL64, Type::I32),
        C::F32toI32 => (Type::FLOAT32, Type::I32),
        C::F32toI64 => (Type::FLOAT32, Type::I64),
        C::F32toF64 => (Type::FLOAT32, Type::F64),
        C::F64toI32 => (Type::FLOAT64, Type::I32),
        C::F64toI64 => (Type::FLOAT64, Type::I64),
        C::F64toF32 => (Type::FLOAT64, Type::F32),
    }
}

/// Transfer-function state for the instruction at `pc`.
pub(crate) struct Interp<'c, 'a> {
    ctx: &'c mut VerificationContext<'a>,
    pc: u32,
    in_handler: bool,
}

impl Interp<'_, '_> {
    fn step(&mut self, di: &DecodedInstr) -> Flow {
        match di.instr {
            Instr::Nop => Continue(()),
            Instr::Mov { width, dst, src } => self.handle_move(width, Reg::from(dst), Reg::from(src)),
            Instr::MovNull { dst } => {
                self.set_const(Reg::from(dst), Type::NULL_REF);
                Continue(())
            }
            Instr::MovImm { dst, imm } => {
                self.set_const(Reg::from(dst), imm_type(imm));
                Continue(())
            }
            Instr::Lda { width, src } => self.handle_move(width, Reg::Acc, Reg::from(src)),
            Instr::LdaImm { imm } => {
                self.set_const(Reg::Acc, imm_type(imm));
                Continue(())
            }
            Instr::LdaStr { .. } => {
                let t = self.ctx.ts.string_type();
                self.set(Reg::Acc, t);
                Continue(())
            }
            Instr::LdaType { id } => self.handle_lda_type(id),
            Instr::LdaNull => {
                self.set_const(Reg::Acc, Type::NULL_REF);
                Continue(())
            }
            Instr::Sta { width, dst } => self.handle_move(width, Reg::from(dst), Reg::Acc),

            Instr::Jmp { target } => {
                self.branch(target)?;
                Break(())
            }
            Instr::JmpZero { target, .. } => {
                self.check_reg(Reg::Acc, Type::INTEGRAL32)?;
                self.branch(target)
            }
            Instr::JmpZeroObj { cond, target } => self.handle_jmp_zero_obj(cond, target),
            Instr::JmpReg { reg, target, .. } => {
                self.check_reg(Reg::Acc, Type::INTEGRAL32)?;
                self.check_reg(Reg::from(reg), Type::INTEGRAL32)?;
                self.branch(target)
            }
            Instr::JmpRegObj { reg, target, .. } => {
                self.check_reg(Reg::Acc, Type::REFERENCE)?;
                self.check_reg(Reg::from(reg), Type::REFERENCE)?;
                self.branch(target)
            }

            Instr::Binary { kind, rhs, .. } => {
                let group = num_group(kind);
                let acc = self.check_reg(Reg::Acc, group)?;
                self.check_reg(Reg::from(rhs), group)?;
                self.set(Reg::Acc, acc.ty);
                Continue(())
            }
            Instr::BinaryRegs { lhs, rhs, .. } => {
                self.check_reg(Reg::from(lhs), Type::INTEGRAL32)?;
                self.check_reg(Reg::from(rhs), Type::INTEGRAL32)?;
                self.set(Reg::Acc, Type::I32);
                Continue(())
            }
            Instr::BinaryImm { .. } => {
                let acc = self.check_reg(Reg::Acc, Type::INTEGRAL32)?;
                self.set(Reg::Acc, acc.ty);
                Continue(())
            }
            Instr::Inci { reg, .. } => {
                let r = Reg::from(reg);
                let v = self.check_reg(r, Type::INTEGRAL32)?;
                self.set(r, v.ty);
                Continue(())
            }
            Instr::Unary { op, kind } => {
                let acc = self.check_reg(Reg::Acc, num_group(kind))?;
                let out = match (op, kind) {
                    (UnaryOp::Neg, NumKind::I32) => Type::I32,
                    (UnaryOp::Neg, NumKind::I64) => Type::I64,
                    _ => acc.ty,
                };
                self.set(Reg::Acc, out);
                Continue(())
            }
            Instr::Compare { op, rhs } => {
                let group = compare_group(op);
                self.check_reg(Reg::Acc, group)?;
                self.check_reg(Reg::from(rhs), group)?;
                self.set(Reg::Acc, Type::I32);
                Continue(())
            }
            Instr::Convert { conv } => {
                let (from, to) = conversion(conv);
                self.check_reg(Reg::Acc, from)?;
                self.set(Reg::Acc, to);
                Continue(())
            }

            Instr::LoadArray { elem, array } => self.handle_load_array(elem, array),
            Instr::StoreArray { elem, array, index } => self.handle_store_array(elem, array, index),
            Instr::LenArray { array } => self.handle_len_array(array),
            Instr::NewArray { dst, size, .. } => self.handle_new_array(dst, size),
            Instr::NewObject { dst, .. } => self.handle_new_object(dst),
            Instr::InitObject { args, .. } => self.handle_init_object(args),
            Instr::LoadField {
                width,
                dst,
                obj,
                volatile,
                ..
            } => self.handle_load_field(width, dst, obj, volatile),
            Instr::StoreField {
                width,
                src,
                obj,
                volatile,
                ..
            } => self.handle_store_field(width, src, obj, volatile),
            Instr::Call { virt, args, .. } => self.handle_call(virt, args),
            Instr::Return { kind } => self.handle_return(kind),
            Instr::CheckCast { .. } => self.handle_check_cast(),
            Instr::IsInstance { .. } => self.handle_is_instance(),
            Instr::Throw { reg } => self.handle_throw(reg),
            Instr::MonitorEnter | Instr::MonitorExit => self.handle_monitor(),
        }
    }

    // Reporting and register access.

    fn report(&mut self, code: D, at_least: VerificationStatus, message: String) -> VerificationStatus {
        self.ctx.report(code, Some(self.pc), at_least, message)
    }

    /// Reports `code` at `at_least` and ends the run.
    fn fail<T>(&mut self, code: D, at_least: VerificationStatus, message: String) -> Flow<T> {
        self.report(code, at_least, message);
        Break(())
    }

    fn name(&self, t: Type) -> String {
        self.ctx.type_name(t)
    }

    fn current(&self) -> &RegContext {
        self.ctx.exec.current()
    }

    fn get(&self, reg: Reg) -> Option<Atv> {
        self.current().get(reg).copied()
    }

    fn is_subtype(&mut self, a: Type, b: Type) -> bool {
        self.ctx.ts.is_subtype(a, b)
    }

    /// The value in `reg`, which must be defined.
    fn defined(&mut self, reg: Reg) -> Flow<Atv> {
        match self.get(reg) {
            Some(atv) => Continue(atv),
            None => self.fail(
                D::UndefinedRegister,
                VerificationStatus::Warning,
                format!("{reg} is undefined"),
            ),
        }
    }

    /// The value in `reg`, which must be defined and a subtype of `expected`.
    fn check_reg(&mut self, reg: Reg, expected: Type) -> Flow<Atv> {
        let atv = self.defined(reg)?;
        if !self.is_subtype(atv.ty, expected) {
            let code = if reg == Reg::Acc {
                D::BadAccumulatorType
            } else {
                D::BadRegisterType
            };
            let msg = format!(
                "{reg} is {}, expected {}",
                self.name(atv.ty),
                self.name(expected)
            );
            return self.fail(code, VerificationStatus::Warning, msg);
        }
        Continue(atv)
    }

    /// Defines `reg` as a new value of type `ty`.
    fn set(&mut self, reg: Reg, ty: Type) {
        let origin = self.ctx.exec.fresh_origin();
        let atv = Atv::with_origin(ty, origin, Some(self.pc));
        self.ctx.exec.current_mut().set(reg, atv);
    }

    /// Defines `reg` as a constant of type `ty`.
    fn set_const(&mut self, reg: Reg, ty: Type) {
        let atv = Atv::new(ty, Some(self.pc));
        self.ctx.exec.current_mut().set(reg, atv);
    }

    /// Copies `src` into `dst`; both end up sharing one origin.
    fn assign(&mut self, dst: Reg, src: Reg) {
        let Some(mut atv) = self.get(src) else {
            return;
        };
        if atv.origin.is_none() {
            atv.origin = Some(self.ctx.exec.fresh_origin());
            self.ctx.exec.current_mut().set(src, atv);
        }
        self.ctx.exec.current_mut().set(dst, atv);
    }

    /// Retypes `reg` and every register sharing its origin.
    fn set_same_origin(&mut self, reg: Reg, ty: Type) {
        let Some(atv) = self.get(reg) else {
            return;
        };
        self.ctx
            .exec
            .current_mut()
            .change_values_of_same_origin(reg, Atv { ty, ..atv });
    }

    // Operand resolution.

    fn class_operand(&mut self) -> Flow<ClassId> {
        match self.ctx.resolved.class_at(self.pc) {
            Lookup::Resolved(c) => Continue(c),
            Lookup::Unresolved => self.fail(
                D::CannotResolveClassId,
                VerificationStatus::Ok,
                String::from("class operand cannot be resolved"),
            ),
            Lookup::NotCached => self.fail(
                D::CacheMissForClassAtOffset,
                VerificationStatus::Ok,
                String::from("no class operand was resolved here"),
            ),
        }
    }

    fn method_operand(&mut self) -> Flow<MethodId> {
        match self.ctx.resolved.method_at(self.pc) {
            Lookup::Resolved(m) => Continue(m),
            Lookup::Unresolved => self.fail(
                D::CannotResolveMethodId,
                VerificationStatus::Ok,
                String::from("method operand cannot be resolved"),
            ),
            Lookup::NotCached => self.fail(
                D::CacheMissForMethodAtOffset,
                VerificationStatus::Ok,
                String::from("no method operand was resolved here"),
            ),
        }
    }

    fn field_operand(&mut self) -> Flow<FieldId> {
        match self.ctx.resolved.field_at(self.pc) {
            Lookup::Resolved(f) => Continue(f),
            Lookup::Unresolved => self.fail(
                D::CannotResolveFieldId,
                VerificationStatus::Error,
                String::from("field operand cannot be resolved"),
            ),
            Lookup::NotCached => self.fail(
                D::CacheMissForFieldAtOffset,
                VerificationStatus::Error,
                String::from("no field operand was resolved here"),
            ),
        }
    }

    // Control transfer.

    /// Hands the current context to the jump target.
    fn branch(&mut self, target: i64) -> Flow {
        let to = u32::try_from(target)
            .ok()
            .filter(|t| self.ctx.cflow.is_instruction(*t));
        let Some(to) = to else {
            return self.fail(
                D::InvalidJumpTarget,
                VerificationStatus::Error,
                format!("jump target {target} is not an instruction"),
            );
        };
        let kind = if self.in_handler {
            EntryKind::ExceptionHandler
        } else {
            EntryKind::Jump
        };
        let ctx = &mut *self.ctx;
        let out = ctx.exec.process_jump(self.pc, to, kind, ctx.ts);
        report_conflicts(ctx, self.pc, to, &out.conflicting);
        Continue(())
    }

    // Handlers.

    fn handle_move(&mut self, width: Width, dst: Reg, src: Reg) -> Flow {
        self.check_reg(src, category(width))?;
        self.assign(dst, src);
        Continue(())
    }

    fn handle_lda_type(&mut self, id: EntityId) -> Flow {
        let program = self.ctx.program.clone();
        if let Some(e) = program.pool_entry(id)
            && !matches!(e, PoolEntry::Class(_))
        {
            return self.fail(
                D::BadLdaType,
                VerificationStatus::Warning,
                format!("operand @{} of lda.type does not name a type", id.0),
            );
        }
        self.class_operand()?;
        let t = self.ctx.ts.class_type();
        self.set(Reg::Acc, t);
        Continue(())
    }

    fn handle_jmp_zero_obj(&mut self, cond: Cond, target: i64) -> Flow {
        let acc = self.check_reg(Reg::Acc, Type::REFERENCE)?;
        if cond == Cond::Eq {
            // The taken edge sees a null accumulator; the fallthrough keeps the value.
            self.set_same_origin(Reg::Acc, Type::NULL_REF);
            let flow = self.branch(target);
            self.ctx
                .exec
                .current_mut()
                .change_values_of_same_origin(Reg::Acc, acc);
            flow
        } else {
            self.branch(target)?;
            self.set_same_origin(Reg::Acc, Type::NULL_REF);
            Continue(())
        }
    }

    fn handle_return(&mut self, kind: ReturnKind) -> Flow {
        let declared = self.ctx.return_type;
        match kind {
            ReturnKind::Void => {
                if let Some(t) = declared {
                    let msg = format!("return.void in a method returning {}", self.name(t));
                    self.report(D::BadReturnInstructionType, VerificationStatus::Error, msg);
                }
            }
            ReturnKind::B32 | ReturnKind::B64 => {
                let (cat, floor) = if kind == ReturnKind::B32 {
                    (Type::BITS32, VerificationStatus::Warning)
                } else {
                    (Type::BITS64, VerificationStatus::Error)
                };
                let slot = declared.filter(|t| self.ctx.ts.is_subtype(*t, cat));
                let Some(slot) = slot else {
                    let msg = format!(
                        "{} return in a method returning {}",
                        self.name(cat),
                        declared.map_or_else(|| String::from("void"), |t| self.name(t))
                    );
                    return self.fail(D::BadReturnInstructionType, floor, msg);
                };
                let acc = self.defined(Reg::Acc)?;
                let group = self.ctx.ts.normalized_type_of(acc.ty);
                let slot_group = self.ctx.ts.normalized_type_of(slot);
                let fits = self.is_subtype(acc.ty, cat) && self.is_subtype(group, slot_group);
                if !fits {
                    let msg = format!(
                        "accumulator holds {}, method returns {}",
                        self.name(acc.ty),
                        self.name(slot)
                    );
                    self.report(D::BadAccumulatorReturnValueType, floor, msg);
                }
            }
            ReturnKind::Obj => {
                let slot = declared.filter(|t| self.ctx.ts.is_subtype(*t, Type::REFERENCE));
                let Some(slot) = slot else {
                    return self.fail(
                        D::BadReturnInstructionType,
                        VerificationStatus::Error,
                        String::from("return.obj in a method that does not return a reference"),
                    );
                };
                let acc = self.defined(Reg::Acc)?;
                if !self.is_subtype(acc.ty, slot) {
                    let msg = format!(
                        "accumulator holds {}, method returns {}",
                        self.name(acc.ty),
                        self.name(slot)
                    );
                    self.report(
                        D::BadAccumulatorReturnValueType,
                        VerificationStatus::Warning,
                        msg,
                    );
                }
            }
        }
        Break(())
    }
}
