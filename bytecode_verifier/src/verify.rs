// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixpoint driver for one method: the method body first, then every reachable exception
//! handler.
//!
//! The entry context holds the formal parameters in the registers that follow the method's
//! locals. Every jump target, handler start, and protected instruction is a checkpoint. The body
//! is interpreted until no entry point is pending; afterwards each try block's handler context is
//! the join of the contexts stored at its protected instructions, with the caught exception in
//! the accumulator.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::absint::abstract_interpret;
use crate::bytecode::Reg;
use crate::context::VerificationContext;
use crate::diagnostics::DiagnosticCode;
use crate::exec_context::{EntryKind, NextEntry};
use crate::program::{CatchBlock, TryBlock};
use crate::reg_context::{Atv, RegContext};
use crate::status::VerificationStatus;
use crate::types::Type;

/// Seeds the entry context, the declared return type, and every checkpoint.
pub(crate) fn prepare(ctx: &mut VerificationContext<'_>, num_vregs: u16, try_blocks: &[TryBlock]) {
    let sig = ctx.ts.method_signature(ctx.method);
    for (i, &t) in sig.args.iter().enumerate() {
        let Some(reg) = u16::try_from(i)
            .ok()
            .and_then(|i| num_vregs.checked_add(i))
        else {
            break;
        };
        let origin = ctx.exec.fresh_origin();
        ctx.exec
            .current_mut()
            .set(Reg::V(reg), Atv::with_origin(t, origin, None));
    }
    ctx.return_type = sig.result;
    log::trace!(
        "{}: entry registers {}",
        ctx.method_name,
        ctx.exec.current().dump(ctx.ts)
    );

    let cflow = ctx.cflow;
    ctx.exec.set_check_point(0);
    for di in cflow.instructions() {
        let pc = di.offset;
        let protected = try_blocks.iter().any(|tb| tb.covers(pc));
        if cflow.is_jump_target(pc) || (protected && cflow.is_exception_source(pc)) {
            ctx.exec.set_check_point(pc);
        }
    }
    for &pc in cflow.handler_starts() {
        if pc < cflow.code_len() {
            ctx.exec.set_check_point(pc);
        }
    }

    ctx.exec.add_entry_point(0, EntryKind::MethodStart);
    ctx.exec.store_current_reg_context_for_addr(0, ctx.ts);
}

/// Runs the body and every reachable handler to a fixpoint and returns the method's status.
pub(crate) fn verify_method_body(
    ctx: &mut VerificationContext<'_>,
    try_blocks: &[TryBlock],
) -> VerificationStatus {
    let mut worst = verify_entry_points(ctx);
    if worst.is_error() {
        return worst;
    }

    for tb in try_blocks {
        let Some(base) = handler_context(ctx, tb) else {
            log::debug!(
                "{}: try block [{}, {}) cannot throw, its handlers are unreachable",
                ctx.method_name,
                tb.start_pc,
                tb.end_pc()
            );
            continue;
        };
        for catch in &tb.catches {
            worst.raise(verify_handler(ctx, catch, &base));
            if worst.is_error() {
                return worst;
            }
        }
    }

    if ctx.exec.get_entry_point_for_checking() == NextEntry::NoEntryPointsWithContext {
        let pending: Vec<String> = ctx
            .exec
            .entry_points()
            .map(|(pc, _)| format!("{pc}"))
            .collect();
        let first = ctx.exec.entry_points().next().map(|(pc, _)| pc);
        worst.raise(ctx.report(
            DiagnosticCode::UnreachableCode,
            first,
            VerificationStatus::Warning,
            format!("entry points never reached: {}", pending.join(", ")),
        ));
    }
    worst
}

/// Drains every pending entry point that has a context.
///
/// A failing run does not stop the loop; other pending paths are still checked so independent
/// failures are all reported.
fn verify_entry_points(ctx: &mut VerificationContext<'_>) -> VerificationStatus {
    let relaxed = ctx.config.allow.error_in_exception_handler;
    let mut worst = VerificationStatus::Ok;
    while let NextEntry::Ready { pc, kind } = ctx.exec.get_entry_point_for_checking() {
        log::trace!("{}: checking block at {pc} ({kind:?})", ctx.method_name);
        let mut result = abstract_interpret(ctx, pc, kind);
        if relaxed && kind == EntryKind::ExceptionHandler && result.is_error() {
            result = VerificationStatus::Warning;
        }
        worst.raise(result);
    }
    worst
}

/// Join of the contexts stored at the protected instructions of `tb`, or `None` if no protected
/// instruction was reached.
fn handler_context(ctx: &mut VerificationContext<'_>, tb: &TryBlock) -> Option<RegContext> {
    let cflow = ctx.cflow;
    let mut sources: Vec<(u32, RegContext)> = ctx
        .exec
        .contexts_in(tb.start_pc, tb.end_pc())
        .filter(|(pc, _)| cflow.is_exception_source(*pc))
        .map(|(pc, c)| (pc, c.clone()))
        .collect();
    sources.sort_unstable_by_key(|(pc, _)| *pc);

    let mut sources = sources.into_iter();
    let (_, mut joined) = sources.next()?;
    for (_, c) in sources {
        joined.union_with(&c, ctx.ts);
    }
    let conflicting: Vec<Reg> = joined.conflicting().collect();
    if !conflicting.is_empty() {
        log::debug!(
            "{}: registers {conflicting:?} conflict across try block [{}, {})",
            ctx.method_name,
            tb.start_pc,
            tb.end_pc()
        );
    }
    joined.remove_inconsistent_regs();
    joined.clear_conflicts();
    Some(joined)
}

fn verify_handler(
    ctx: &mut VerificationContext<'_>,
    catch: &CatchBlock,
    base: &RegContext,
) -> VerificationStatus {
    let exception = catch
        .type_id
        .and_then(|id| ctx.program.resolve_class(id));
    let ty = match exception {
        Some(c) => {
            ctx.ts.register_class(c);
            Type::Class(c)
        }
        None => ctx.ts.throwable_type(),
    };
    log::debug!(
        "{}: exception handler at {} for {}",
        ctx.method_name,
        catch.handler_pc,
        ctx.type_name(ty)
    );

    let mut entry = base.clone();
    if ty.is_consistent() {
        let origin = ctx.exec.fresh_origin();
        entry.set(Reg::Acc, Atv::with_origin(ty, origin, None));
    }
    ctx.exec.set_current(entry);
    ctx.exec
        .add_entry_point(catch.handler_pc, EntryKind::ExceptionHandler);
    ctx.exec
        .store_current_reg_context_for_addr(catch.handler_pc, ctx.ts);
    verify_entry_points(ctx)
}

#[cfg(test)]
mod tests {
    use crate::absint::tests::{codes, run};
    use crate::asm::{Asm, ProgramBuilder};
    use crate::diagnostics::DiagnosticCode as D;
    use crate::job::VerifyReport;
    use crate::opcode::Opcode;
    use crate::program::{CatchBlock, EntityId, MethodFlags, TryBlock, TypeDesc};
    use crate::status::VerificationStatus;
    use alloc::vec;

    /// `Main::f(i32)` whose body calls `Util::may_throw` inside a try block.
    fn with_handler(
        protected: impl FnOnce(&mut Asm, EntityId),
        handler: impl FnOnce(&mut Asm),
    ) -> VerifyReport {
        let mut pb = ProgramBuilder::new();
        let util = pb.class("Util").build();
        pb.method(util, "may_throw")
            .flags(MethodFlags::STATIC)
            .declare();
        let callee = pb.method_ref("Util", "may_throw");

        let mut a = Asm::new();
        a.movi(0, 1);
        let start = a.pc();
        protected(&mut a, callee);
        a.call(Opcode::CallShort, callee, &[]);
        let end = a.pc();
        a.v(Opcode::Lda, 0).op(Opcode::Return);
        let handler_pc = a.pc();
        handler(&mut a);
        let code = a.finish().unwrap();
        let handler_len = u32::try_from(code.len()).unwrap() - handler_pc;

        let main = pb.class("Main").build();
        let m = pb
            .method(main, "f")
            .flags(MethodFlags::STATIC)
            .arg(TypeDesc::I32)
            .ret(TypeDesc::I32)
            .code(2, code)
            .try_block(TryBlock {
                start_pc: start,
                length: end - start,
                catches: vec![CatchBlock {
                    type_id: None,
                    handler_pc,
                    code_size: handler_len,
                }],
            })
            .declare();
        run(pb.build(), m)
    }

    #[test]
    fn handler_sees_registers_defined_before_try() {
        let r = with_handler(
            |_, _| {},
            |a| {
                a.v(Opcode::StaObj, 1).v(Opcode::Lda, 0).op(Opcode::Return);
            },
        );
        assert_eq!(r.status, VerificationStatus::Ok, "{:?}", r.diagnostics);
    }

    #[test]
    fn handler_accumulator_holds_the_exception() {
        let r = with_handler(
            |_, _| {},
            |a| {
                a.op(Opcode::Return);
            },
        );
        assert_eq!(codes(&r), [D::BadAccumulatorReturnValueType]);
    }

    #[test]
    fn registers_retyped_inside_try_are_undefined_in_handler() {
        let r = with_handler(
            |a, callee| {
                a.call(Opcode::CallShort, callee, &[]);
                a.v(Opcode::MovNull, 0);
            },
            |a| {
                a.v(Opcode::Lda, 0).op(Opcode::Return);
            },
        );
        assert!(codes(&r).contains(&D::UndefinedRegister), "{:?}", r.diagnostics);
    }

    #[test]
    fn dead_try_block_leaves_handler_unchecked() {
        let mut pb = ProgramBuilder::new();
        let mut a = Asm::new();
        let out = a.label();
        a.jmp(out);
        let start = a.pc();
        a.ldai(1).op(Opcode::Return);
        let end = a.pc();
        a.place(out).unwrap();
        a.op(Opcode::ReturnVoid);
        let handler_pc = a.pc();
        a.v(Opcode::Lda, 5).op(Opcode::Return);
        let code = a.finish().unwrap();
        let handler_len = u32::try_from(code.len()).unwrap() - handler_pc;
        let main = pb.class("Main").build();
        let m = pb
            .method(main, "f")
            .flags(MethodFlags::STATIC)
            .code(6, code)
            .try_block(TryBlock {
                start_pc: start,
                length: end - start,
                catches: vec![CatchBlock {
                    type_id: None,
                    handler_pc,
                    code_size: handler_len,
                }],
            })
            .declare();
        let r = run(pb.build(), m);
        assert_eq!(r.status, VerificationStatus::Ok, "{:?}", r.diagnostics);
        assert!(r.diagnostics.is_empty());
    }

    #[test]
    fn independent_failures_are_all_reported() {
        let mut pb = ProgramBuilder::new();
        let mut a = Asm::new();
        let other = a.label();
        a.v(Opcode::Lda, 1).jump(Opcode::Jeqz, other);
        a.op(Opcode::ReturnVoid);
        a.place(other).unwrap();
        a.v(Opcode::Lda64, 1).op(Opcode::ReturnVoid);
        let main = pb.class("Main").build();
        let m = pb
            .method(main, "f")
            .flags(MethodFlags::STATIC)
            .arg(TypeDesc::I32)
            .ret(TypeDesc::I32)
            .code(1, a.finish().unwrap())
            .declare();
        let r = run(pb.build(), m);
        let c = codes(&r);
        assert_eq!(
            c.iter()
                .filter(|c| **c == D::BadReturnInstructionType)
                .count(),
            1
        );
        assert!(c.contains(&D::BadRegisterType), "{c:?}");
        assert_eq!(r.status, VerificationStatus::Error);
    }
}
