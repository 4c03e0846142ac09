// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bytecode and program builders.
//!
//! [`Asm`] assembles method bodies without hand-computing jump offsets; [`ProgramBuilder`]
//! declares classes, fields, methods, and constant-pool references. Both exist for tests,
//! benchmarks, and tools that synthesize programs; the verifier itself only reads [`Program`].
//!
//! ## Example
//!
//! ```
//! use bytecode_verifier::asm::{Asm, ProgramBuilder};
//! use bytecode_verifier::opcode::Opcode;
//! use bytecode_verifier::program::TypeDesc;
//!
//! let mut a = Asm::new();
//! let done = a.label();
//! a.ldai(0);
//! a.jump(Opcode::Jeqz, done);
//! a.ldai(1);
//! a.place(done)?;
//! a.op(Opcode::Return);
//!
//! let mut pb = ProgramBuilder::new();
//! let class = pb.class("Main").build();
//! let _m = pb
//!     .method(class, "f")
//!     .flags(bytecode_verifier::program::MethodFlags::STATIC)
//!     .ret(TypeDesc::I32)
//!     .code(0, a.finish()?)
//!     .declare();
//! let _program = pb.build();
//! # Ok::<(), bytecode_verifier::asm::UnresolvedLabel>(())
//! ```

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::bytecode::{Operands, encode_instr};
use crate::format::Writer;
use crate::opcode::{Format, Opcode};
use crate::program::{
    ClassDef, ClassFlags, ClassId, EntityId, FieldDef, FieldFlags, FieldId, MethodCode, MethodDef,
    MethodFlags, MethodId, PoolEntry, Program, SourceLang, TryBlock, TypeDesc, WellKnownClasses,
    CONSTRUCTOR_NAME, names,
};

/// A label for jump targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A label was referenced but never placed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedLabel;

impl fmt::Display for UnresolvedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label was referenced but never placed")
    }
}

impl core::error::Error for UnresolvedLabel {}

/// Bytecode builder.
#[derive(Clone, Debug, Default)]
pub struct Asm {
    out: Writer,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
}

#[derive(Copy, Clone, Debug)]
struct Fixup {
    /// Offset of the jumping instruction; jump offsets are relative to it.
    from: u32,
    /// Offset of the `i32` operand to patch.
    at: usize,
    label: Label,
}

impl Asm {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current byte offset.
    #[must_use]
    pub fn pc(&self) -> u32 {
        u32::try_from(self.out.len()).unwrap_or(u32::MAX)
    }

    /// Allocates a new label.
    #[must_use]
    pub fn label(&mut self) -> Label {
        let id = u32::try_from(self.labels.len()).unwrap_or(u32::MAX);
        self.labels.push(None);
        Label(id)
    }

    /// Places `label` at the current offset.
    pub fn place(&mut self, label: Label) -> Result<(), UnresolvedLabel> {
        let pc = self.pc();
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(UnresolvedLabel)?;
        *slot = Some(pc);
        Ok(())
    }

    /// Finalizes and returns the encoded bytecode.
    pub fn finish(mut self) -> Result<Vec<u8>, UnresolvedLabel> {
        for f in &self.fixups {
            let Some(target) = self.labels.get(f.label.0 as usize).and_then(|x| *x) else {
                return Err(UnresolvedLabel);
            };
            let rel = i64::from(target) - i64::from(f.from);
            let rel = i32::try_from(rel).map_err(|_| UnresolvedLabel)?;
            self.out
                .patch_i32_le(f.at, rel)
                .map_err(|_| UnresolvedLabel)?;
        }
        Ok(self.out.into_vec())
    }

    /// Emits `op` with explicit raw operands.
    pub fn emit(&mut self, op: Opcode, operands: Operands) -> &mut Self {
        encode_instr(&mut self.out, op, &operands);
        self
    }

    /// Emits an operand-less instruction (`return`, `lda.null`, conversions, ...).
    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.emit(op, Operands::default())
    }

    /// Emits a one-register instruction (`lda v`, `add2 v`, `throw v`, ...).
    pub fn v(&mut self, op: Opcode, r: u8) -> &mut Self {
        self.emit(op, regs(&[r]))
    }

    /// Emits a two-register instruction (`mov v1, v2`, `starr v1, v2`, ...).
    pub fn vv(&mut self, op: Opcode, a: u8, b: u8) -> &mut Self {
        self.emit(op, regs(&[a, b]))
    }

    /// Emits an id-only instruction (`checkcast`, `ldstatic`, `lda.str`, ...).
    pub fn id(&mut self, op: Opcode, id: EntityId) -> &mut Self {
        self.emit(
            op,
            Operands {
                id: id.0,
                ..Operands::default()
            },
        )
    }

    /// Emits a register + id instruction (`newobj`, `ldobj`, `stobj`, ...).
    pub fn v_id(&mut self, op: Opcode, r: u8, id: EntityId) -> &mut Self {
        self.emit(
            op,
            Operands {
                id: id.0,
                ..regs(&[r])
            },
        )
    }

    /// Emits a two-register + id instruction (`newarr`, `ldobj.v`, `stobj.v`, ...).
    pub fn vv_id(&mut self, op: Opcode, a: u8, b: u8, id: EntityId) -> &mut Self {
        self.emit(
            op,
            Operands {
                id: id.0,
                ..regs(&[a, b])
            },
        )
    }

    /// Emits a call or `initobj` with explicit argument registers.
    ///
    /// For range encodings pass the first register only.
    pub fn call(&mut self, op: Opcode, id: EntityId, args: &[u8]) -> &mut Self {
        self.emit(
            op,
            Operands {
                id: id.0,
                ..regs(args)
            },
        )
    }

    /// Emits an accumulator-operand call; the accumulator is argument `acc_pos`.
    pub fn call_acc(&mut self, op: Opcode, id: EntityId, args: &[u8], acc_pos: u8) -> &mut Self {
        self.emit(
            op,
            Operands {
                id: id.0,
                imm: i64::from(acc_pos),
                ..regs(args)
            },
        )
    }

    /// `ldai imm`.
    pub fn ldai(&mut self, imm: i32) -> &mut Self {
        self.imm(Opcode::Ldai, i64::from(imm))
    }

    /// `ldai.64 imm`.
    pub fn ldai64(&mut self, imm: i64) -> &mut Self {
        self.imm(Opcode::Ldai64, imm)
    }

    /// `fldai imm`.
    pub fn fldai(&mut self, imm: f32) -> &mut Self {
        self.imm(Opcode::Fldai, i64::from(imm.to_bits()))
    }

    /// `fldai.64 imm`.
    pub fn fldai64(&mut self, imm: f64) -> &mut Self {
        self.imm(Opcode::Fldai64, i64::from_ne_bytes(imm.to_bits().to_ne_bytes()))
    }

    /// `movi v, imm`.
    pub fn movi(&mut self, r: u8, imm: i32) -> &mut Self {
        self.emit(
            Opcode::Movi,
            Operands {
                imm: i64::from(imm),
                ..regs(&[r])
            },
        )
    }

    /// `movi.64 v, imm`.
    pub fn movi64(&mut self, r: u8, imm: i64) -> &mut Self {
        self.emit(
            Opcode::Movi64,
            Operands {
                imm,
                ..regs(&[r])
            },
        )
    }

    /// `inci v, imm`.
    pub fn inci(&mut self, r: u8, imm: i32) -> &mut Self {
        self.emit(
            Opcode::Inci,
            Operands {
                imm: i64::from(imm),
                ..regs(&[r])
            },
        )
    }

    /// Emits an immediate-only instruction (`addi`, `ldai`, ...).
    pub fn imm(&mut self, op: Opcode, imm: i64) -> &mut Self {
        self.emit(
            op,
            Operands {
                imm,
                ..Operands::default()
            },
        )
    }

    /// Emits an accumulator-compared jump (`jmp`, `jeqz`, `jnez.obj`, ...).
    pub fn jump(&mut self, op: Opcode, target: Label) -> &mut Self {
        self.jump_with(op, &[], target)
    }

    /// Emits a register-compared jump (`jeq v, target`, ...).
    pub fn jump_reg(&mut self, op: Opcode, r: u8, target: Label) -> &mut Self {
        self.jump_with(op, &[r], target)
    }

    /// `jmp target`.
    pub fn jmp(&mut self, target: Label) -> &mut Self {
        self.jump(Opcode::Jmp, target)
    }

    fn jump_with(&mut self, op: Opcode, rs: &[u8], target: Label) -> &mut Self {
        let from = self.pc();
        self.emit(op, regs(rs));
        // The offset is the trailing four bytes for both jump formats.
        debug_assert!(matches!(op.format(), Format::Jump | Format::VJump));
        let at = self.out.len().saturating_sub(4);
        self.fixups.push(Fixup {
            from,
            at,
            label: target,
        });
        self
    }
}

fn regs(rs: &[u8]) -> Operands {
    let mut o = Operands::default();
    for (slot, &r) in o.regs.iter_mut().zip(rs) {
        *slot = r;
    }
    o
}

/// Convenience builder for constructing [`Program`]s.
///
/// A new builder already contains the well-known classes (see [`names`]). Array classes
/// referenced by name anywhere in the program are created by [`ProgramBuilder::build`].
#[derive(Clone, Debug)]
pub struct ProgramBuilder {
    classes: Vec<ClassDef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    pool: Vec<PoolEntry>,
    class_index: HashMap<String, ClassId>,
    well_known: WellKnownClasses,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// Creates a builder holding only the well-known classes.
    #[must_use]
    pub fn new() -> Self {
        let mut pb = Self {
            classes: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            pool: Vec::new(),
            class_index: HashMap::new(),
            well_known: WellKnownClasses {
                object: ClassId(0),
                class_class: ClassId(0),
                string: ClassId(0),
                throwable: ClassId(0),
            },
        };
        let object = pb.push_class(ClassDef {
            name: names::OBJECT.into(),
            super_class: None,
            interfaces: Vec::new(),
            flags: ClassFlags::empty(),
            component: None,
        });
        pb.well_known.object = object;
        pb.well_known.class_class = pb.class(names::CLASS).flags(ClassFlags::FINAL).build();
        pb.well_known.string = pb.class(names::STRING).flags(ClassFlags::FINAL).build();
        pb.well_known.throwable = pb.class(names::THROWABLE).build();
        pb
    }

    /// Well-known classes.
    #[must_use]
    pub fn well_known(&self) -> WellKnownClasses {
        self.well_known
    }

    /// Looks up a declared class by name.
    #[must_use]
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.class_index.get(name).copied()
    }

    /// Starts declaring class `name`. Its superclass defaults to the root object class.
    pub fn class(&mut self, name: &str) -> ClassBuilder<'_> {
        let object = self.well_known.object;
        ClassBuilder {
            pb: self,
            def: ClassDef {
                name: name.into(),
                super_class: Some(object),
                interfaces: Vec::new(),
                flags: ClassFlags::empty(),
                component: None,
            },
        }
    }

    /// Returns the array class with elements of type `elem`, creating it if needed.
    pub fn array_class(&mut self, elem: &TypeDesc) -> ClassId {
        let name = elem.array_name();
        if let Some(id) = self.class_id(&name) {
            return id;
        }
        if let Some(inner) = elem.array_component() {
            self.array_class(&inner);
        }
        self.push_class(ClassDef {
            name,
            super_class: Some(self.well_known.object),
            interfaces: Vec::new(),
            flags: ClassFlags::FINAL,
            component: Some(elem.clone()),
        })
    }

    fn push_class(&mut self, def: ClassDef) -> ClassId {
        let id = ClassId(u32::try_from(self.classes.len()).unwrap_or(u32::MAX));
        self.class_index.insert(def.name.clone(), id);
        self.classes.push(def);
        id
    }

    /// Declares a field.
    pub fn field(&mut self, class: ClassId, name: &str, ty: TypeDesc, flags: FieldFlags) -> FieldId {
        let id = FieldId(u32::try_from(self.fields.len()).unwrap_or(u32::MAX));
        self.fields.push(FieldDef {
            name: name.into(),
            class,
            ty,
            flags,
        });
        id
    }

    /// Starts declaring method `name` of `class`.
    pub fn method(&mut self, class: ClassId, name: &str) -> MethodBuilder<'_> {
        MethodBuilder {
            pb: self,
            def: MethodDef {
                name: name.into(),
                class,
                flags: MethodFlags::empty(),
                args: Vec::new(),
                ret: TypeDesc::Void,
                lang: SourceLang::Core,
                code: None,
            },
        }
    }

    /// Starts declaring an instance constructor of `class`.
    pub fn ctor(&mut self, class: ClassId) -> MethodBuilder<'_> {
        self.method(class, CONSTRUCTOR_NAME)
            .flags(MethodFlags::CONSTRUCTOR)
    }

    fn intern(&mut self, e: PoolEntry) -> EntityId {
        if let Some(i) = self.pool.iter().position(|x| *x == e) {
            return EntityId(u16::try_from(i).unwrap_or(u16::MAX));
        }
        let id = EntityId(u16::try_from(self.pool.len()).unwrap_or(u16::MAX));
        self.pool.push(e);
        id
    }

    /// Interns a class reference.
    pub fn class_ref(&mut self, name: &str) -> EntityId {
        self.intern(PoolEntry::Class(name.into()))
    }

    /// Interns a method reference.
    pub fn method_ref(&mut self, class: &str, name: &str) -> EntityId {
        self.intern(PoolEntry::Method {
            class: class.into(),
            name: name.into(),
        })
    }

    /// Interns a field reference.
    pub fn field_ref(&mut self, class: &str, name: &str) -> EntityId {
        self.intern(PoolEntry::Field {
            class: class.into(),
            name: name.into(),
        })
    }

    /// Interns a string literal.
    pub fn string(&mut self, s: &str) -> EntityId {
        self.intern(PoolEntry::String(s.into()))
    }

    /// Builds the [`Program`], creating every array class it names.
    #[must_use]
    pub fn build(mut self) -> Program {
        let mut arrays: Vec<TypeDesc> = Vec::new();
        let mut note = |d: &TypeDesc| {
            if let Some(elem) = d.array_component() {
                arrays.push(elem);
            }
        };
        for e in &self.pool {
            match e {
                PoolEntry::Class(name)
                | PoolEntry::Method { class: name, .. }
                | PoolEntry::Field { class: name, .. } => note(&TypeDesc::from_name(name)),
                PoolEntry::String(_) => {}
            }
        }
        for f in &self.fields {
            note(&f.ty);
        }
        for m in &self.methods {
            m.args.iter().for_each(&mut note);
            note(&m.ret);
        }
        for elem in &arrays {
            self.array_class(elem);
        }

        let mut method_index = HashMap::new();
        for (i, m) in self.methods.iter().enumerate() {
            let id = MethodId(u32::try_from(i).unwrap_or(u32::MAX));
            method_index.entry((m.class, m.name.clone())).or_insert(id);
        }
        let mut field_index = HashMap::new();
        for (i, f) in self.fields.iter().enumerate() {
            let id = FieldId(u32::try_from(i).unwrap_or(u32::MAX));
            field_index.entry((f.class, f.name.clone())).or_insert(id);
        }

        Program {
            classes: self.classes,
            methods: self.methods,
            fields: self.fields,
            pool: self.pool,
            class_index: self.class_index,
            method_index,
            field_index,
            well_known: self.well_known,
        }
    }
}

/// Builder returned by [`ProgramBuilder::class`].
#[derive(Debug)]
pub struct ClassBuilder<'a> {
    pb: &'a mut ProgramBuilder,
    def: ClassDef,
}

impl ClassBuilder<'_> {
    /// Sets the superclass.
    #[must_use]
    pub fn extends(mut self, super_class: ClassId) -> Self {
        self.def.super_class = Some(super_class);
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn implements(mut self, iface: ClassId) -> Self {
        self.def.interfaces.push(iface);
        self
    }

    /// Adds modifiers.
    #[must_use]
    pub fn flags(mut self, flags: ClassFlags) -> Self {
        self.def.flags |= flags;
        self
    }

    /// Marks the class as an interface.
    #[must_use]
    pub fn interface(self) -> Self {
        self.flags(ClassFlags::INTERFACE | ClassFlags::ABSTRACT)
    }

    /// Declares the class.
    pub fn build(self) -> ClassId {
        self.pb.push_class(self.def)
    }
}

/// Builder returned by [`ProgramBuilder::method`].
#[derive(Debug)]
pub struct MethodBuilder<'a> {
    pb: &'a mut ProgramBuilder,
    def: MethodDef,
}

impl MethodBuilder<'_> {
    /// Appends a parameter.
    #[must_use]
    pub fn arg(mut self, ty: TypeDesc) -> Self {
        self.def.args.push(ty);
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn ret(mut self, ty: TypeDesc) -> Self {
        self.def.ret = ty;
        self
    }

    /// Adds modifiers.
    #[must_use]
    pub fn flags(mut self, flags: MethodFlags) -> Self {
        self.def.flags |= flags;
        self
    }

    /// Sets the source language.
    #[must_use]
    pub fn lang(mut self, lang: SourceLang) -> Self {
        self.def.lang = lang;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn code(mut self, num_vregs: u16, bytecode: Vec<u8>) -> Self {
        let code = self.def.code.get_or_insert_with(MethodCode::default);
        code.num_vregs = num_vregs;
        code.bytecode = bytecode;
        self
    }

    /// Adds a try block. Call after [`MethodBuilder::code`].
    #[must_use]
    pub fn try_block(mut self, block: TryBlock) -> Self {
        self.def
            .code
            .get_or_insert_with(MethodCode::default)
            .try_blocks
            .push(block);
        self
    }

    /// Declares the method.
    pub fn declare(self) -> MethodId {
        let id = MethodId(u32::try_from(self.pb.methods.len()).unwrap_or(u32::MAX));
        self.pb.methods.push(self.def);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instr, decode_instructions};

    #[test]
    fn asm_resolves_forward_and_backward_labels() {
        let mut a = Asm::new();
        let top = a.label();
        let out = a.label();
        a.place(top).unwrap();
        a.ldai(1);
        a.jump(Opcode::Jeqz, out);
        a.jmp(top);
        a.place(out).unwrap();
        a.op(Opcode::ReturnVoid);

        let d = decode_instructions(&a.finish().unwrap()).unwrap();
        assert_eq!(d[1].instr, Instr::JmpZero {
            cond: crate::bytecode::Cond::Eq,
            target: 15
        });
        assert_eq!(d[2].jump_target(), Some(0));
    }

    #[test]
    fn asm_reports_unplaced_label() {
        let mut a = Asm::new();
        let l = a.label();
        a.jmp(l);
        assert_eq!(a.finish(), Err(UnresolvedLabel));
    }

    #[test]
    fn builder_interns_and_materializes_arrays() {
        let mut pb = ProgramBuilder::new();
        let c0 = pb.class_ref("[[i32");
        let c1 = pb.class_ref("[[i32");
        assert_eq!(c0, c1);
        let p = pb.build();
        let outer = p.resolve_class(c0).unwrap();
        let inner = p.class_by_name("[i32").unwrap();
        assert_eq!(
            p.class(outer).unwrap().component,
            Some(TypeDesc::Ref("[i32".into()))
        );
        assert_eq!(p.class(inner).unwrap().component, Some(TypeDesc::I32));
    }
}
