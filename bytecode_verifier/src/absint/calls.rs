// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Call and constructor transfer functions.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::ops::ControlFlow::{Break, Continue};

use super::{Flow, Interp};
use crate::bytecode::{CallArgs, Reg};
use crate::compat::{Compat, check_primitive};
use crate::diagnostics::DiagnosticCode as D;
use crate::program::{CONSTRUCTOR_NAME, MethodId};
use crate::status::VerificationStatus::{Error, Ok as Fine, Warning};
use crate::types::Type;

impl Interp<'_, '_> {
    /// Argument registers of a call in formal order; `formals` sizes a range call.
    fn call_regs(&mut self, args: CallArgs, formals: usize) -> Flow<Vec<Reg>> {
        match args {
            CallArgs::Regs { regs, count } => Continue(
                regs[..usize::from(count)]
                    .iter()
                    .copied()
                    .map(Reg::from)
                    .collect(),
            ),
            CallArgs::Range { start } => Continue(
                (0..formals)
                    .map(|i| {
                        let i = u16::try_from(i).unwrap_or(u16::MAX);
                        Reg::V(u16::from(start).saturating_add(i))
                    })
                    .collect(),
            ),
            CallArgs::WithAcc {
                regs,
                count,
                acc_pos,
            } => {
                if acc_pos > count {
                    let msg = format!("accumulator position {acc_pos} with {count} registers");
                    return self.fail(D::AccumulatorPositionIsOutOfRange, Warning, msg);
                }
                let mut out: Vec<Reg> = regs[..usize::from(count)]
                    .iter()
                    .copied()
                    .map(Reg::from)
                    .collect();
                out.insert(usize::from(acc_pos), Reg::Acc);
                Continue(out)
            }
        }
    }

    fn skips_call_checks(&self, callee: &str) -> bool {
        self.ctx.debug && self.ctx.config.skips_call_checks(callee)
    }

    /// Checks actual arguments against the formals of `method`.
    ///
    /// For constructors `constructed` is the object being built; it fills the receiver slot and
    /// `regs` supplies the remaining formals.
    fn check_method_args(
        &mut self,
        method: MethodId,
        regs: &[Reg],
        constructed: Option<Type>,
    ) -> Flow {
        let sig = self.ctx.ts.method_signature(method);
        let callee = self.ctx.program.method_full_name(method);
        let needed = sig.args.len() - usize::from(constructed.is_some() && !sig.args.is_empty());
        if regs.len() < needed {
            let msg = format!("{callee} takes {needed} arguments, {} given", regs.len());
            return self.fail(D::BadCallTooFewParameters, Warning, msg);
        }
        let relaxed = self.ctx.config.allow.wrong_subclassing_in_method_args;
        let mut actuals = regs.iter().copied();

        for (i, &formal) in sig.args.iter().enumerate() {
            let (actual, slot) = match constructed {
                Some(t) if i == 0 => (t, None),
                _ => {
                    let Some(r) = actuals.next() else {
                        break;
                    };
                    (self.defined(r)?.ty, Some(r))
                }
            };
            let what = slot.map_or_else(|| String::from("receiver"), |r| format!("{r}"));

            if formal.is_bot() {
                if actual.is_bot() {
                    break;
                }
                let msg = format!("formal {i} of {callee} has an unresolved type");
                return self.fail(D::BadCallFormalIsBot, Warning, msg);
            }
            if formal.is_top() {
                break;
            }

            let formal_ref = self.is_subtype(formal, Type::REFERENCE);
            let actual_ref = self.is_subtype(actual, Type::REFERENCE);
            if formal_ref && actual_ref && slot.is_some() {
                if self.is_subtype(actual, formal) {
                    continue;
                }
                // Relaxed mismatches fall through to the wrong-register check below.
                if !relaxed {
                    let msg = format!(
                        "{what} holds {}, {callee} expects {}",
                        self.name(actual),
                        self.name(formal)
                    );
                    return self.fail(D::BadCallIncompatibleParameter, Warning, msg);
                }
            } else {
                let norm_formal = self.ctx.ts.normalized_type_of(formal);
                let norm_actual = self.ctx.ts.normalized_type_of(actual);
                if !self.is_subtype(norm_actual, norm_formal) {
                    let msg = format!(
                        "{what} holds {}, {callee} expects {}",
                        self.name(actual),
                        self.name(formal)
                    );
                    return self.fail(D::BadCallIncompatibleParameter, Warning, msg);
                }
            }

            if self.is_subtype(formal, Type::PRIMITIVE) {
                if !self.is_subtype(actual, Type::PRIMITIVE) {
                    let msg = format!("{what} is not a primitive value");
                    return self.fail(D::BadCallWrongRegister, Warning, msg);
                }
                match check_primitive(self.ctx.ts, actual, formal) {
                    Compat::Ok => {}
                    Compat::Narrowing => {
                        let msg = format!(
                            "{what} holds {}, narrowed to {}",
                            self.name(actual),
                            self.name(formal)
                        );
                        self.report(D::BadCallWrongParameter, Warning, msg);
                    }
                    Compat::Incompatible => {
                        let msg = format!(
                            "{what} holds {}, {callee} expects {}",
                            self.name(actual),
                            self.name(formal)
                        );
                        return self.fail(D::BadCallWrongParameter, Error, msg);
                    }
                }
                continue;
            }

            if !self.is_subtype(actual, formal) {
                let code = if slot.is_none() {
                    D::BadCallWrongParameter
                } else {
                    D::BadCallWrongRegister
                };
                let msg = format!(
                    "{what} holds {}, {callee} expects {}",
                    self.name(actual),
                    self.name(formal)
                );
                let floor = if relaxed { Warning } else { Error };
                self.report(code, floor, msg);
                if !relaxed {
                    return Break(());
                }
            }
        }
        Continue(())
    }

    pub(super) fn handle_call(&mut self, virt: bool, args: CallArgs) -> Flow {
        let method = self.method_operand()?;
        let program = self.ctx.program.clone();
        let Some(m) = program.method(method) else {
            return self.fail(
                D::CannotResolveMethodId,
                Fine,
                String::from("method operand names no method"),
            );
        };
        let callee = program.method_full_name(method);
        if virt && m.is_static() {
            let msg = format!("virtual call of static method {callee}");
            return self.fail(D::BadCallStaticMethodAsVirtual, Error, msg);
        }
        if !virt && m.is_abstract() {
            let msg = format!("non-virtual call of abstract method {callee}");
            return self.fail(D::BadCallStaticallyAbstractMethod, Warning, msg);
        }

        let sig = self.ctx.ts.method_signature(method);
        let regs = self.call_regs(args, sig.args.len())?;
        if self.skips_call_checks(&callee) {
            log::debug!("{}: argument checks skipped for {callee}", self.ctx.method_name);
        } else {
            self.check_method_args(method, &regs, None)?;
        }
        match sig.result {
            Some(t) => self.set(Reg::Acc, t),
            None => self.ctx.exec.current_mut().clear(Reg::Acc),
        }
        Continue(())
    }

    pub(super) fn handle_init_object(&mut self, args: CallArgs) -> Flow {
        let class = self.class_operand()?;
        let ty = Type::Class(class);
        if self.ctx.ts.is_array_class(ty) {
            return self.handle_array_ctor(ty, args);
        }

        let method = self.method_operand()?;
        let program = self.ctx.program.clone();
        let Some(m) = program.method(method) else {
            return self.fail(
                D::CannotResolveMethodId,
                Fine,
                String::from("constructor operand names no method"),
            );
        };
        let callee = program.method_full_name(method);
        if m.is_static() || !m.is_constructor() || m.name != CONSTRUCTOR_NAME {
            let msg = format!("initobj calls {callee}, which is not a constructor");
            return self.fail(D::InitobjCallsNotConstructor, Warning, msg);
        }

        let sig = self.ctx.ts.method_signature(method);
        let regs = self.call_regs(args, sig.args.len().saturating_sub(1))?;
        let constructed = Type::Class(m.class);
        if self.skips_call_checks(&callee) {
            log::debug!("{}: argument checks skipped for {callee}", self.ctx.method_name);
        } else {
            self.check_method_args(method, &regs, Some(constructed))?;
        }
        self.set(Reg::Acc, constructed);
        Continue(())
    }

    /// `initobj` on an array class takes one `i32` size per dimension.
    fn handle_array_ctor(&mut self, ty: Type, args: CallArgs) -> Flow {
        let mut dims = 0_usize;
        let mut t = ty;
        while self.ctx.ts.is_array_class(t) {
            dims += 1;
            match self.ctx.ts.array_element_type(t) {
                Some(e) => t = e,
                None => break,
            }
        }
        let regs: Vec<Reg> = match args {
            CallArgs::Regs { regs, count } | CallArgs::WithAcc { regs, count, .. } => regs
                [..usize::from(count).min(dims)]
                .iter()
                .copied()
                .map(Reg::from)
                .collect(),
            CallArgs::Range { start } => (0..dims)
                .map(|i| {
                    let i = u16::try_from(i).unwrap_or(u16::MAX);
                    Reg::V(u16::from(start).saturating_add(i))
                })
                .collect(),
        };
        for &r in &regs {
            let atv = self.defined(r)?;
            if !self.is_subtype(atv.ty, Type::INTEGRAL32) {
                let msg = format!("{r} holds {}, dimension must be i32", self.name(atv.ty));
                return self.fail(D::BadRegisterType, Error, msg);
            }
        }
        if regs.len() < dims {
            let msg = format!(
                "{} needs {dims} dimensions, {} given",
                self.name(ty),
                regs.len()
            );
            return self.fail(D::TooFewArrayConstructorArgs, Warning, msg);
        }
        self.set(Reg::Acc, ty);
        Continue(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::super::tests::{codes, method, run};
    use crate::asm::{Asm, ProgramBuilder};
    use crate::config::VerifierConfig;
    use crate::diagnostics::DiagnosticCode as D;
    use crate::job::verify_method;
    use crate::opcode::Opcode;
    use crate::program::{ClassFlags, MethodFlags, TypeDesc};
    use crate::status::VerificationStatus;

    fn r(name: &str) -> TypeDesc {
        TypeDesc::Ref(name.into())
    }

    fn empty_body() -> alloc::vec::Vec<u8> {
        let mut a = Asm::new();
        a.op(Opcode::ReturnVoid);
        a.finish().unwrap()
    }

    #[test]
    fn static_call_passes_arguments_and_result() {
        let mut pb = ProgramBuilder::new();
        let util = pb.class("Util").build();
        let mut body = Asm::new();
        body.v(Opcode::Lda, 0).v(Opcode::Add2, 1).op(Opcode::Return);
        pb.method(util, "sum")
            .flags(MethodFlags::STATIC)
            .arg(TypeDesc::I32)
            .arg(TypeDesc::I32)
            .ret(TypeDesc::I32)
            .code(0, body.finish().unwrap())
            .declare();
        let sum = pb.method_ref("Util", "sum");
        let mut a = Asm::new();
        a.movi(0, 1)
            .movi(1, 2)
            .call(Opcode::CallShort, sum, &[0, 1])
            .op(Opcode::Return);
        let m = method(&mut pb, &[], TypeDesc::I32, 2, a);
        let rep = run(pb.build(), m);
        assert_eq!(rep.status, VerificationStatus::Ok, "{:?}", rep.diagnostics);
    }

    #[test]
    fn too_few_arguments_are_reported() {
        let mut pb = ProgramBuilder::new();
        let util = pb.class("Util").build();
        pb.method(util, "three")
            .flags(MethodFlags::STATIC)
            .arg(TypeDesc::I32)
            .arg(TypeDesc::I32)
            .arg(TypeDesc::I32)
            .declare();
        let three = pb.method_ref("Util", "three");
        let mut a = Asm::new();
        a.movi(0, 1)
            .call(Opcode::CallShort, three, &[0, 0])
            .op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[], TypeDesc::Void, 1, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::BadCallTooFewParameters]);
    }

    #[test]
    fn virtual_call_of_static_method_is_an_error() {
        let mut pb = ProgramBuilder::new();
        let util = pb.class("Util").build();
        pb.method(util, "f").flags(MethodFlags::STATIC).declare();
        let f = pb.method_ref("Util", "f");
        let mut a = Asm::new();
        a.call(Opcode::CallVirtShort, f, &[]).op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[], TypeDesc::Void, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::BadCallStaticMethodAsVirtual]);
        assert_eq!(rep.status, VerificationStatus::Error);
    }

    #[test]
    fn direct_call_of_abstract_method_is_reported() {
        let mut pb = ProgramBuilder::new();
        let shape = pb.class("Shape").flags(ClassFlags::ABSTRACT).build();
        pb.method(shape, "area")
            .flags(MethodFlags::ABSTRACT)
            .ret(TypeDesc::F64)
            .declare();
        let area = pb.method_ref("Shape", "area");
        let mut a = Asm::new();
        a.call(Opcode::CallShort, area, &[0])
            .op(Opcode::Return64);
        let m = method(&mut pb, &[r("Shape")], TypeDesc::F64, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::BadCallStaticallyAbstractMethod]);

        let mut pb = ProgramBuilder::new();
        let shape = pb.class("Shape").flags(ClassFlags::ABSTRACT).build();
        pb.method(shape, "area")
            .flags(MethodFlags::ABSTRACT)
            .ret(TypeDesc::F64)
            .declare();
        let area = pb.method_ref("Shape", "area");
        let mut a = Asm::new();
        a.call(Opcode::CallVirtShort, area, &[0])
            .op(Opcode::Return64);
        let m = method(&mut pb, &[r("Shape")], TypeDesc::F64, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(rep.status, VerificationStatus::Ok, "{:?}", rep.diagnostics);
    }

    #[test]
    fn receiver_of_unrelated_class_is_rejected() {
        let mut pb = ProgramBuilder::new();
        let a_class = pb.class("A").build();
        pb.class("B").build();
        pb.method(a_class, "m").declare();
        let m_ref = pb.method_ref("A", "m");
        let mut a = Asm::new();
        a.call(Opcode::CallVirtShort, m_ref, &[0])
            .op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[r("B")], TypeDesc::Void, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::BadCallIncompatibleParameter]);
        assert_eq!(rep.status, VerificationStatus::Warning);
    }

    #[test]
    fn relaxed_subclassing_reports_the_wrong_register_and_continues() {
        let mut pb = ProgramBuilder::new();
        let a_class = pb.class("A").build();
        pb.class("B").build();
        pb.method(a_class, "m").declare();
        let m_ref = pb.method_ref("A", "m");
        let mut a = Asm::new();
        a.call(Opcode::CallVirtShort, m_ref, &[0])
            .op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[r("B")], TypeDesc::Void, 0, a);
        let mut config = VerifierConfig::default();
        config.allow.wrong_subclassing_in_method_args = true;
        let rep = verify_method(&Arc::new(pb.build()), m, &config);
        assert_eq!(codes(&rep), [D::BadCallWrongRegister]);
        assert_eq!(rep.diagnostics[0].pc, Some(0));
        assert_eq!(rep.status, VerificationStatus::Warning);
    }

    #[test]
    fn accumulator_argument_position_is_checked() {
        let mut pb = ProgramBuilder::new();
        let util = pb.class("Util").build();
        pb.method(util, "two")
            .flags(MethodFlags::STATIC)
            .arg(TypeDesc::I32)
            .arg(TypeDesc::F64)
            .declare();
        let two = pb.method_ref("Util", "two");

        let mut a = Asm::new();
        a.fldai64(1.5)
            .movi(0, 1)
            .call_acc(Opcode::CallAccShort, two, &[0], 1)
            .op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[], TypeDesc::Void, 1, a);
        let rep = run(pb.clone().build(), m);
        assert_eq!(rep.status, VerificationStatus::Ok, "{:?}", rep.diagnostics);

        let mut a = Asm::new();
        a.fldai64(1.5)
            .movi(0, 1)
            .call_acc(Opcode::CallAccShort, two, &[0], 0)
            .op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[], TypeDesc::Void, 1, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::BadCallIncompatibleParameter]);
    }

    #[test]
    fn initobj_constructs_the_declaring_class() {
        let mut pb = ProgramBuilder::new();
        let point = pb.class("Point").build();
        pb.ctor(point)
            .arg(TypeDesc::I32)
            .code(1, empty_body())
            .declare();
        let ctor = pb.method_ref("Point", ".ctor");
        let mut a = Asm::new();
        a.movi(0, 3)
            .call(Opcode::InitobjShort, ctor, &[0])
            .op(Opcode::ReturnObj);
        let m = method(&mut pb, &[], r("Point"), 1, a);
        let rep = run(pb.build(), m);
        assert_eq!(rep.status, VerificationStatus::Ok, "{:?}", rep.diagnostics);
    }

    #[test]
    fn initobj_of_plain_method_is_rejected() {
        let mut pb = ProgramBuilder::new();
        let point = pb.class("Point").build();
        pb.method(point, "reset").code(0, empty_body()).declare();
        let reset = pb.method_ref("Point", "reset");
        let mut a = Asm::new();
        a.call(Opcode::InitobjShort, reset, &[])
            .op(Opcode::ReturnObj);
        let m = method(&mut pb, &[], r("Point"), 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::InitobjCallsNotConstructor]);
    }

    #[test]
    fn multi_dimensional_array_constructor_counts_dimensions() {
        let mut pb = ProgramBuilder::new();
        let ctor = pb.method_ref("[[i32", ".ctor");
        let mut a = Asm::new();
        a.movi(0, 2)
            .movi(1, 3)
            .call(Opcode::InitobjShort, ctor, &[0, 1])
            .op(Opcode::ReturnObj);
        let m = method(&mut pb, &[], r("[[i32"), 2, a);
        let rep = run(pb.clone().build(), m);
        assert_eq!(rep.status, VerificationStatus::Ok, "{:?}", rep.diagnostics);

        // The short form carries two dimension registers.
        let cube = pb.method_ref("[[[i32", ".ctor");
        let mut a = Asm::new();
        a.movi(0, 2)
            .movi(1, 3)
            .call(Opcode::InitobjShort, cube, &[0, 1])
            .op(Opcode::ReturnObj);
        let m = method(&mut pb, &[], r("[[[i32"), 2, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::TooFewArrayConstructorArgs]);
    }
}
