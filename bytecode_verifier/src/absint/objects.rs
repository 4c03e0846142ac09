// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Object, array, field, and cast transfer functions.

use alloc::format;
use alloc::string::String;
use core::ops::ControlFlow::{Break, Continue};

use super::{Flow, Interp, category};
use crate::bytecode::{ArrayLoad, ArrayStore, Reg, Width};
use crate::compat::{Compat, check_primitive};
use crate::diagnostics::DiagnosticCode as D;
use crate::reg_context::Atv;
use crate::status::VerificationStatus::{Error, Ok as Fine, Warning};
use crate::types::Type;

impl Interp<'_, '_> {
    /// The array in `array`, which must be a non-null array value with a known element type.
    fn array_operand(&mut self, array: u8) -> Flow<(Type, Type)> {
        let arr = self.check_reg(Reg::from(array), Type::ARRAY)?;
        if arr.ty == Type::NULL_REF {
            return self.fail(D::AlwaysNpe, Fine, format!("v{array} is always null"));
        }
        match self.ctx.ts.array_element_type(arr.ty) {
            Some(elem) => Continue((arr.ty, elem)),
            None => {
                let msg = format!("element type of {} is unknown", self.name(arr.ty));
                self.fail(D::BadArrayElementType, Warning, msg)
            }
        }
    }

    pub(super) fn handle_load_array(&mut self, kind: ArrayLoad, array: u8) -> Flow {
        self.check_reg(Reg::Acc, Type::INTEGRAL32)?;
        let (arr, elem) = self.array_operand(array)?;
        let fits = match kind {
            ArrayLoad::I8 => [Type::U1, Type::I8].contains(&elem),
            ArrayLoad::U8 => [Type::U1, Type::U8].contains(&elem),
            ArrayLoad::I16 => elem == Type::I16,
            ArrayLoad::U16 => elem == Type::U16,
            ArrayLoad::I32 => [Type::I32, Type::U32].contains(&elem),
            ArrayLoad::I64 => [Type::I64, Type::U64].contains(&elem),
            ArrayLoad::F32 => elem == Type::F32,
            ArrayLoad::F64 => elem == Type::F64,
            ArrayLoad::Obj => self.is_subtype(elem, Type::REFERENCE),
        };
        if !fits {
            let msg = format!("{kind:?} load from {}", self.name(arr));
            return self.fail(D::BadArrayElementType, Warning, msg);
        }
        self.set(Reg::Acc, elem);
        Continue(())
    }

    pub(super) fn handle_store_array(&mut self, kind: ArrayStore, array: u8, index: u8) -> Flow {
        self.check_reg(Reg::from(index), Type::INTEGRAL32)?;
        let acc = self.defined(Reg::Acc)?;
        let (arr, elem) = self.array_operand(array)?;
        let (group, elems): (Type, &[Type]) = match kind {
            ArrayStore::B8 => (Type::INTEGRAL32, &[Type::U1, Type::I8, Type::U8]),
            ArrayStore::B16 => (Type::INTEGRAL32, &[Type::I16, Type::U16]),
            ArrayStore::B32 => (Type::INTEGRAL32, &[Type::I32, Type::U32]),
            ArrayStore::B64 => (Type::INTEGRAL64, &[Type::I64, Type::U64]),
            ArrayStore::F32 => (Type::FLOAT32, &[Type::F32]),
            ArrayStore::F64 => (Type::FLOAT64, &[Type::F64]),
            ArrayStore::Obj => return self.store_reference(acc, arr, elem),
        };
        if !elems.contains(&elem) {
            let msg = format!("{kind:?} store into {}", self.name(arr));
            return self.fail(D::BadArrayElementType, Warning, msg);
        }
        if !self.is_subtype(acc.ty, group) {
            let msg = format!(
                "cannot store {} into {}",
                self.name(acc.ty),
                self.name(arr)
            );
            return self.fail(D::BadAccumulatorType, Warning, msg);
        }
        match check_primitive(self.ctx.ts, acc.ty, elem) {
            Compat::Ok => {}
            c => {
                let msg = format!(
                    "{} narrowed into {} element",
                    self.name(acc.ty),
                    self.name(elem)
                );
                self.report(D::BadArrayElementType, c.status(), msg);
                if c == Compat::Incompatible {
                    return Break(());
                }
            }
        }
        Continue(())
    }

    fn store_reference(&mut self, acc: Atv, arr: Type, elem: Type) -> Flow {
        if !self.is_subtype(elem, Type::REFERENCE) {
            let msg = format!("reference store into {}", self.name(arr));
            return self.fail(D::BadArrayElementType, Warning, msg);
        }
        if !self.is_subtype(acc.ty, elem) {
            let msg = format!(
                "cannot store {} into {}",
                self.name(acc.ty),
                self.name(arr)
            );
            return self.fail(D::BadAccumulatorType, Warning, msg);
        }
        if acc.ty != Type::NULL_REF && self.needs_store_check(elem) {
            let pc = self.pc;
            if !self.ctx.array_store_checks.contains(&pc) {
                self.ctx.array_store_checks.push(pc);
            }
        }
        Continue(())
    }

    /// Reference stores into arrays whose element class can be subclassed are checked at
    /// run time.
    fn needs_store_check(&self, elem: Type) -> bool {
        match elem.class() {
            Some(c) => !self.ctx.program.class(c).is_some_and(|d| d.is_final()),
            None => true,
        }
    }

    pub(super) fn handle_len_array(&mut self, array: u8) -> Flow {
        let arr = self.check_reg(Reg::from(array), Type::ARRAY)?;
        if arr.ty == Type::NULL_REF {
            return self.fail(D::AlwaysNpe, Fine, format!("v{array} is always null"));
        }
        self.set(Reg::Acc, Type::I32);
        Continue(())
    }

    pub(super) fn handle_new_array(&mut self, dst: u8, size: u8) -> Flow {
        self.check_reg(Reg::from(size), Type::INTEGRAL32)?;
        let class = self.class_operand()?;
        let t = Type::Class(class);
        if !self.ctx.ts.is_array_class(t) {
            let msg = format!("{} is not an array class", self.name(t));
            return self.fail(D::BadNewArrayType, Warning, msg);
        }
        self.set(Reg::from(dst), t);
        Continue(())
    }

    pub(super) fn handle_new_object(&mut self, dst: u8) -> Flow {
        let class = self.class_operand()?;
        let t = Type::Class(class);
        let abstract_class = self
            .ctx
            .program
            .class(class)
            .is_some_and(|d| d.is_interface() || d.is_abstract());
        if self.ctx.ts.is_array_class(t) || abstract_class {
            let msg = format!("cannot instantiate {}", self.name(t));
            return self.fail(D::BadNewObjectType, Warning, msg);
        }
        self.set(Reg::from(dst), t);
        Continue(())
    }

    /// Resolves the field operand and checks the access shape; returns the field's type.
    fn check_field_access(&mut self, width: Width, obj: Option<u8>, volatile: bool) -> Flow<Type> {
        let field = self.field_operand()?;
        let program = self.ctx.program.clone();
        let Some(f) = program.field(field) else {
            return self.fail(
                D::CannotResolveFieldId,
                Error,
                String::from("field operand names no field"),
            );
        };
        match (obj, f.is_static()) {
            (Some(_), true) => {
                let msg = format!("instance access to static field {}", f.name);
                return self.fail(D::ExpectedInstanceField, Error, msg);
            }
            (None, false) => {
                let msg = format!("static access to instance field {}", f.name);
                return self.fail(D::ExpectedStaticOrInstanceField, Warning, msg);
            }
            _ => {}
        }
        if volatile != f.is_volatile() {
            let msg = format!(
                "{} access to {}volatile field {}",
                if volatile { "volatile" } else { "plain" },
                if f.is_volatile() { "" } else { "non-" },
                f.name
            );
            return self.fail(D::ExpectedVolatileField, Warning, msg);
        }
        let ty = self.ctx.ts.field_type(field).unwrap_or(Type::BOTTOM);

        if let Some(o) = obj {
            let r = Reg::from(o);
            let atv = self.check_reg(r, Type::REFERENCE)?;
            if atv.ty == Type::NULL_REF {
                return self.fail(D::AlwaysNpe, Fine, format!("{r} is always null"));
            }
            let owner = Type::Class(f.class);
            if !self.is_subtype(atv.ty, owner) {
                let msg = format!(
                    "{r} holds {}, field {} belongs to {}",
                    self.name(atv.ty),
                    f.name,
                    self.name(owner)
                );
                self.report(D::InconsistentRegisterAndFieldTypes, Warning, msg);
            }
        }

        let cat = category(width);
        if !self.is_subtype(ty, cat) {
            let msg = format!(
                "field {} is {}, instruction expects {}",
                f.name,
                self.name(ty),
                self.name(cat)
            );
            return self.fail(D::UnexpectedFieldType, Warning, msg);
        }
        Continue(ty)
    }

    pub(super) fn handle_load_field(
        &mut self,
        width: Width,
        dst: Reg,
        obj: Option<u8>,
        volatile: bool,
    ) -> Flow {
        let ty = self.check_field_access(width, obj, volatile)?;
        self.set(dst, ty);
        Continue(())
    }

    pub(super) fn handle_store_field(
        &mut self,
        width: Width,
        src: Reg,
        obj: Option<u8>,
        volatile: bool,
    ) -> Flow {
        let value = self.check_reg(src, category(width))?;
        let ty = self.check_field_access(width, obj, volatile)?;
        let compat = if width == Width::Obj {
            if self.is_subtype(value.ty, ty) {
                Compat::Ok
            } else {
                Compat::Incompatible
            }
        } else {
            check_primitive(self.ctx.ts, value.ty, ty)
        };
        if compat != Compat::Ok {
            let msg = format!(
                "{src} holds {}, field is {}",
                self.name(value.ty),
                self.name(ty)
            );
            let floor = if width == Width::Obj {
                Warning
            } else {
                compat.status()
            };
            self.report(D::BadFieldValueType, floor, msg);
            if compat == Compat::Incompatible {
                return Break(());
            }
        }
        Continue(())
    }

    /// Returns `true` if no value can be both an `a` and a `b`.
    fn disjoint_arrays(&mut self, a: Type, b: Type) -> bool {
        let ts = &mut *self.ctx.ts;
        match (ts.array_element_type(a), ts.array_element_type(b)) {
            (Some(ea), Some(eb)) => !ts.is_subtype(ea, eb) && !ts.is_subtype(eb, ea),
            _ => false,
        }
    }

    pub(super) fn handle_check_cast(&mut self) -> Flow {
        let class = self.class_operand()?;
        let target = Type::Class(class);
        let acc = self.defined(Reg::Acc)?;
        if !self.is_subtype(acc.ty, Type::REFERENCE) {
            let msg = format!("cannot cast {}", self.name(acc.ty));
            return self.fail(D::NonObjectAccumulatorType, Warning, msg);
        }
        if self.is_subtype(acc.ty, Type::NULL_REF) {
            self.report(
                D::AccumulatorAlwaysNull,
                Fine,
                String::from("checkcast of a null accumulator"),
            );
            self.set(Reg::Acc, target);
            return Continue(());
        }
        if self.is_subtype(acc.ty, target) {
            let msg = format!("{} is already {}", self.name(acc.ty), self.name(target));
            self.report(D::RedundantCheckCast, Fine, msg);
            return Continue(());
        }
        if self.ctx.ts.is_array_class(target) {
            let acc_is_array = self.ctx.ts.is_array_class(acc.ty);
            if !acc_is_array && !self.is_subtype(target, acc.ty) {
                let msg = format!("{} is never {}", self.name(acc.ty), self.name(target));
                return self.fail(D::ImpossibleCheckCast, Fine, msg);
            }
            if acc_is_array && self.disjoint_arrays(acc.ty, target) {
                let msg = format!("{} is never {}", self.name(acc.ty), self.name(target));
                return self.fail(D::ImpossibleArrayCheckCast, Fine, msg);
            }
        }
        let narrowed = self.ctx.ts.meet(target, acc.ty);
        if narrowed.is_bot() {
            let msg = format!("{} is never {}", self.name(acc.ty), self.name(target));
            return self.fail(D::ImpossibleCheckCast, Fine, msg);
        }
        self.set_same_origin(Reg::Acc, narrowed);
        Continue(())
    }

    pub(super) fn handle_is_instance(&mut self) -> Flow {
        let class = self.class_operand()?;
        let target = Type::Class(class);
        let acc = self.defined(Reg::Acc)?;
        if !self.is_subtype(acc.ty, Type::REFERENCE) {
            let msg = format!("isinstance on {}", self.name(acc.ty));
            return self.fail(D::NonObjectAccumulatorType, Error, msg);
        }
        if self.is_subtype(acc.ty, Type::NULL_REF) {
            self.report(
                D::AccumulatorAlwaysNull,
                Fine,
                String::from("isinstance of a null accumulator"),
            );
        } else if self.is_subtype(acc.ty, target) {
            let msg = format!("{} is always {}", self.name(acc.ty), self.name(target));
            self.report(D::RedundantIsInstance, Fine, msg);
        } else if self.ctx.ts.is_array_class(target)
            && self.ctx.ts.is_array_class(acc.ty)
            && self.disjoint_arrays(acc.ty, target)
        {
            let msg = format!("{} is never {}", self.name(acc.ty), self.name(target));
            self.report(D::ImpossibleArrayIsInstance, Fine, msg);
        } else if self.ctx.ts.meet(target, acc.ty).is_bot() {
            let msg = format!("{} is never {}", self.name(acc.ty), self.name(target));
            self.report(D::ImpossibleIsInstance, Fine, msg);
        }
        self.set(Reg::Acc, Type::I32);
        Continue(())
    }

    pub(super) fn handle_throw(&mut self, reg: u8) -> Flow {
        let throwable = self.ctx.ts.throwable_type();
        let r = Reg::from(reg);
        let v = self.check_reg(r, throwable)?;
        if v.ty == Type::NULL_REF {
            self.report(D::AlwaysNpe, Fine, format!("throw of {r}, which is always null"));
        }
        Break(())
    }

    pub(super) fn handle_monitor(&mut self) -> Flow {
        let acc = self.check_reg(Reg::Acc, Type::REFERENCE)?;
        if acc.ty == Type::NULL_REF {
            return self.fail(
                D::AlwaysNpeAccumulator,
                Fine,
                String::from("monitor operand is always null"),
            );
        }
        Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, method, run};
    use crate::asm::{Asm, ProgramBuilder};
    use crate::diagnostics::DiagnosticCode as D;
    use crate::opcode::Opcode;
    use crate::program::{ClassFlags, FieldFlags, TypeDesc};
    use crate::status::VerificationStatus;

    fn r(name: &str) -> TypeDesc {
        TypeDesc::Ref(name.into())
    }

    #[test]
    fn int_array_round_trip_through_registers() {
        let mut pb = ProgramBuilder::new();
        let arr = pb.class_ref("[i32");
        let mut a = Asm::new();
        a.movi(0, 4)
            .vv_id(Opcode::Newarr, 1, 0, arr)
            .ldai(7)
            .vv(Opcode::Starr, 1, 0)
            .ldai(0)
            .v(Opcode::Ldarr, 1)
            .op(Opcode::Return);
        let m = method(&mut pb, &[], TypeDesc::I32, 2, a);
        let r = run(pb.build(), m);
        assert_eq!(r.status, VerificationStatus::Ok, "{:?}", r.diagnostics);
    }

    #[test]
    fn wrong_element_width_is_reported() {
        let mut pb = ProgramBuilder::new();
        let arr = pb.class_ref("[i32");
        let mut a = Asm::new();
        a.movi(0, 4)
            .vv_id(Opcode::Newarr, 1, 0, arr)
            .ldai(0)
            .v(Opcode::Ldarr64, 1)
            .op(Opcode::Return64);
        let m = method(&mut pb, &[], TypeDesc::I64, 2, a);
        let r = run(pb.build(), m);
        assert_eq!(codes(&r), [D::BadArrayElementType]);
    }

    #[test]
    fn arrays_from_both_branches_keep_their_common_element_type() {
        let build = |tail: Opcode| {
            let mut pb = ProgramBuilder::new();
            let base = pb.class("A").build();
            pb.class("B").extends(base).build();
            pb.class("C").extends(base).build();
            let arr_b = pb.class_ref("[B");
            let arr_c = pb.class_ref("[C");
            pb.class_ref("[A");
            let mut a = Asm::new();
            let other = a.label();
            let join = a.label();
            a.movi(0, 2).v(Opcode::Lda, 2).jump(Opcode::Jeqz, other);
            a.vv_id(Opcode::Newarr, 1, 0, arr_b).jmp(join);
            a.place(other).unwrap();
            a.vv_id(Opcode::Newarr, 1, 0, arr_c);
            a.place(join).unwrap();
            a.ldai(0).v(Opcode::LdarrObj, 1).op(tail);
            let m = method(&mut pb, &[TypeDesc::I32], r("A"), 2, a);
            run(pb.build(), m)
        };

        let ok = build(Opcode::ReturnObj);
        assert_eq!(ok.status, VerificationStatus::Ok, "{:?}", ok.diagnostics);

        // The path continues past the load, so later findings are still seen.
        let bad = build(Opcode::ReturnVoid);
        assert_eq!(codes(&bad), [D::BadReturnInstructionType]);
        assert_eq!(bad.status, VerificationStatus::Error);
    }

    #[test]
    fn null_array_is_always_npe() {
        let mut pb = ProgramBuilder::new();
        let mut a = Asm::new();
        a.v(Opcode::MovNull, 0)
            .v(Opcode::Lenarr, 0)
            .op(Opcode::Return);
        let m = method(&mut pb, &[], TypeDesc::I32, 1, a);
        let r = run(pb.build(), m);
        assert_eq!(codes(&r), [D::AlwaysNpe]);
        assert_eq!(r.status, VerificationStatus::Ok);
    }

    #[test]
    fn reference_store_into_open_array_needs_runtime_check() {
        let mut pb = ProgramBuilder::new();
        let base = pb.class("Base").build();
        pb.class("Leaf").extends(base).flags(ClassFlags::FINAL).build();
        let bases = pb.class_ref("[Base");
        let leaves = pb.class_ref("[Leaf");
        let mut a = Asm::new();
        a.movi(0, 1)
            .vv_id(Opcode::Newarr, 1, 0, bases)
            .vv_id(Opcode::Newarr, 2, 0, leaves)
            .v(Opcode::LdaObj, 3);
        let open = a.pc();
        a.vv(Opcode::StarrObj, 1, 0)
            .v(Opcode::LdaObj, 4).vv(Opcode::StarrObj, 2, 0).op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[r("Base"), r("Leaf")], TypeDesc::Void, 3, a);
        let r = run(pb.build(), m);
        assert_eq!(r.status, VerificationStatus::Ok, "{:?}", r.diagnostics);
        assert_eq!(r.array_store_checks, [open]);
    }

    #[test]
    fn instance_fields_check_receiver_and_value() {
        let mut pb = ProgramBuilder::new();
        let point = pb.class("Point").build();
        pb.field(point, "x", TypeDesc::I32, FieldFlags::empty());
        pb.field(point, "count", TypeDesc::I64, FieldFlags::STATIC);
        let x = pb.field_ref("Point", "x");
        let count = pb.field_ref("Point", "count");
        let mut a = Asm::new();
        a.ldai(3)
            .v_id(Opcode::Stobj, 0, x)
            .v_id(Opcode::Ldobj, 0, x)
            .id(Opcode::Ldstatic64, count)
            .op(Opcode::Return64);
        let m = method(&mut pb, &[r("Point")], TypeDesc::I64, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(rep.status, VerificationStatus::Ok, "{:?}", rep.diagnostics);
    }

    #[test]
    fn static_field_through_instance_access_is_an_error() {
        let mut pb = ProgramBuilder::new();
        let point = pb.class("Point").build();
        pb.field(point, "count", TypeDesc::I32, FieldFlags::STATIC);
        let count = pb.field_ref("Point", "count");
        let mut a = Asm::new();
        a.v_id(Opcode::Ldobj, 0, count).op(Opcode::Return);
        let m = method(&mut pb, &[r("Point")], TypeDesc::I32, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::ExpectedInstanceField]);
        assert_eq!(rep.status, VerificationStatus::Error);
    }

    #[test]
    fn unresolved_field_is_an_error() {
        let mut pb = ProgramBuilder::new();
        pb.class("Point").build();
        let missing = pb.field_ref("Point", "nope");
        let mut a = Asm::new();
        a.v_id(Opcode::Ldobj, 0, missing).op(Opcode::Return);
        let m = method(&mut pb, &[r("Point")], TypeDesc::I32, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::CannotResolveFieldId]);
        assert_eq!(rep.status, VerificationStatus::Error);
    }

    #[test]
    fn checkcast_narrows_aliases() {
        let mut pb = ProgramBuilder::new();
        let animal = pb.class("Animal").build();
        let dog = pb.class("Dog").extends(animal).build();
        pb.field(dog, "tail", TypeDesc::I32, FieldFlags::empty());
        let dog_ref = pb.class_ref("Dog");
        let tail = pb.field_ref("Dog", "tail");
        let mut a = Asm::new();
        a.v(Opcode::LdaObj, 1)
            .v(Opcode::StaObj, 0)
            .id(Opcode::Checkcast, dog_ref)
            .v_id(Opcode::Ldobj, 0, tail)
            .op(Opcode::Return);
        let m = method(&mut pb, &[r("Animal")], TypeDesc::I32, 1, a);
        let rep = run(pb.build(), m);
        assert_eq!(rep.status, VerificationStatus::Ok, "{:?}", rep.diagnostics);
    }

    #[test]
    fn cast_null_does_not_retype_its_aliases() {
        let mut pb = ProgramBuilder::new();
        let base = pb.class("A").build();
        pb.class("B").extends(base).build();
        pb.class("C").extends(base).build();
        let a_ref = pb.class_ref("A");
        let b_ref = pb.class_ref("B");
        let mut a = Asm::new();
        a.v(Opcode::MovNull, 0)
            .v(Opcode::LdaObj, 0)
            .id(Opcode::Checkcast, a_ref)
            .id(Opcode::Checkcast, b_ref)
            .v(Opcode::LdaObj, 0)
            .op(Opcode::ReturnObj);
        let m = method(&mut pb, &[], r("C"), 1, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::AccumulatorAlwaysNull]);
        assert_eq!(rep.status, VerificationStatus::Ok);
    }

    #[test]
    fn impossible_checkcast_ends_the_path() {
        let mut pb = ProgramBuilder::new();
        pb.class("A").flags(ClassFlags::FINAL).build();
        pb.class("B").flags(ClassFlags::FINAL).build();
        let b = pb.class_ref("B");
        let mut a = Asm::new();
        a.v(Opcode::LdaObj, 0)
            .id(Opcode::Checkcast, b)
            .op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[r("A")], TypeDesc::Void, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::ImpossibleCheckCast]);
        assert_eq!(rep.status, VerificationStatus::Ok);
    }

    #[test]
    fn isinstance_yields_i32() {
        let mut pb = ProgramBuilder::new();
        pb.class("A").build();
        let a_ref = pb.class_ref("A");
        let mut a = Asm::new();
        a.v(Opcode::LdaObj, 0)
            .id(Opcode::Isinstance, a_ref)
            .op(Opcode::Return);
        let m = method(&mut pb, &[r("A")], TypeDesc::I32, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::RedundantIsInstance]);
        assert_eq!(rep.status, VerificationStatus::Ok);
    }

    #[test]
    fn throw_requires_throwable() {
        let mut pb = ProgramBuilder::new();
        pb.class("A").build();
        let mut a = Asm::new();
        a.v(Opcode::Throw, 0);
        let m = method(&mut pb, &[r("A")], TypeDesc::Void, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::BadRegisterType]);
    }

    #[test]
    fn monitor_on_null_is_reported() {
        let mut pb = ProgramBuilder::new();
        let mut a = Asm::new();
        a.op(Opcode::LdaNull)
            .op(Opcode::Monitorenter)
            .op(Opcode::ReturnVoid);
        let m = method(&mut pb, &[], TypeDesc::Void, 0, a);
        let rep = run(pb.build(), m);
        assert_eq!(codes(&rep), [D::AlwaysNpeAccumulator]);
    }
}
