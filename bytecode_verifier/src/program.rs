// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loaded program model.
//!
//! A [`Program`] is the verifier's view of everything the class linker has loaded: classes with
//! their hierarchy, methods with signatures and code, fields, and a constant pool that bytecode
//! operands index into. It is immutable once built (see [`crate::asm::ProgramBuilder`]) and is
//! shared across verifier threads behind an `Arc`.
//!
//! Lookups return `Option`: an unresolvable reference is a verification finding, not a panic.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

/// Index of a class in [`Program::classes`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub u32);

/// Index of a method in [`Program::methods`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId(pub u32);

/// Index of a field in [`Program::fields`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub u32);

/// Constant-pool index carried by an instruction operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u16);

/// Source language a method was compiled from. Each language gets its own verifier processors.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceLang {
    /// The runtime's core language.
    #[default]
    Core,
    /// The extended static language.
    Ets,
}

impl fmt::Display for SourceLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Ets => write!(f, "ets"),
        }
    }
}

bitflags::bitflags! {
    /// Class modifiers.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u8 {
        /// The class is an interface.
        const INTERFACE = 1 << 0;
        /// The class is abstract.
        const ABSTRACT = 1 << 1;
        /// The class cannot be subclassed.
        const FINAL = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Method modifiers.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u8 {
        /// Static method (no receiver).
        const STATIC = 1 << 0;
        /// Abstract method (no body).
        const ABSTRACT = 1 << 1;
        /// Instance constructor.
        const CONSTRUCTOR = 1 << 2;
        /// Native method.
        const NATIVE = 1 << 3;
        /// Runtime intrinsic. Never verified.
        const INTRINSIC = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Field modifiers.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FieldFlags: u8 {
        /// Static field.
        const STATIC = 1 << 0;
        /// Volatile field.
        const VOLATILE = 1 << 1;
    }
}

/// A type as written in a descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs, reason = "primitive names are self-describing")]
pub enum TypeDesc {
    Void,
    U1,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// A class or array class by name. Array class names are `[` followed by the element name.
    Ref(String),
}

impl TypeDesc {
    /// Parses a descriptor name. Anything that is not a primitive name is a reference.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "void" => Self::Void,
            "u1" => Self::U1,
            "i8" => Self::I8,
            "u8" => Self::U8,
            "i16" => Self::I16,
            "u16" => Self::U16,
            "i32" => Self::I32,
            "u32" => Self::U32,
            "i64" => Self::I64,
            "u64" => Self::U64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => Self::Ref(name.into()),
        }
    }

    /// Returns `true` for class and array descriptors.
    #[must_use]
    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    /// Returns the element descriptor if this names an array class.
    #[must_use]
    pub fn array_component(&self) -> Option<Self> {
        match self {
            Self::Ref(name) => name.strip_prefix('[').map(Self::from_name),
            _ => None,
        }
    }

    /// Returns the name of the array class whose elements are `self`.
    #[must_use]
    pub fn array_name(&self) -> String {
        alloc::format!("[{self}")
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Void => "void",
            Self::U1 => "u1",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Ref(name) => name,
        };
        f.write_str(s)
    }
}

/// A loaded class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDef {
    /// Fully qualified name.
    pub name: String,
    /// Direct superclass; `None` only for the root object class and interfaces.
    pub super_class: Option<ClassId>,
    /// Directly implemented interfaces.
    pub interfaces: Vec<ClassId>,
    /// Modifiers.
    pub flags: ClassFlags,
    /// Element type for array classes.
    pub component: Option<TypeDesc>,
}

impl ClassDef {
    /// Returns `true` for array classes.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.component.is_some()
    }

    /// Returns `true` for interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(ClassFlags::INTERFACE)
    }

    /// Returns `true` for final classes.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags.contains(ClassFlags::FINAL)
    }

    /// Returns `true` for abstract classes.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(ClassFlags::ABSTRACT)
    }
}

/// A loaded field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declaring class.
    pub class: ClassId,
    /// Declared type.
    pub ty: TypeDesc,
    /// Modifiers.
    pub flags: FieldFlags,
}

impl FieldDef {
    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }

    /// Returns `true` for volatile fields.
    #[must_use]
    pub fn is_volatile(&self) -> bool {
        self.flags.contains(FieldFlags::VOLATILE)
    }
}

/// A catch clause of a try block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchBlock {
    /// Caught class; `None` catches everything.
    pub type_id: Option<EntityId>,
    /// Handler start offset.
    pub handler_pc: u32,
    /// Handler body size in bytes.
    pub code_size: u32,
}

/// A protected bytecode range and its handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryBlock {
    /// First protected offset.
    pub start_pc: u32,
    /// Protected range size in bytes.
    pub length: u32,
    /// Handlers, in declaration order.
    pub catches: Vec<CatchBlock>,
}

impl TryBlock {
    /// One past the last protected offset.
    #[must_use]
    pub fn end_pc(&self) -> u32 {
        self.start_pc.saturating_add(self.length)
    }

    /// Returns `true` if `pc` is protected by this block.
    #[must_use]
    pub fn covers(&self, pc: u32) -> bool {
        (self.start_pc..self.end_pc()).contains(&pc)
    }
}

/// Method body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodCode {
    /// Number of local virtual registers. Arguments follow in `v<num_vregs>..`.
    pub num_vregs: u16,
    /// Encoded instructions.
    pub bytecode: Vec<u8>,
    /// Try blocks, in declaration order.
    pub try_blocks: Vec<TryBlock>,
}

/// A loaded method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDef {
    /// Simple name; constructors are named [`CONSTRUCTOR_NAME`].
    pub name: String,
    /// Declaring class.
    pub class: ClassId,
    /// Modifiers.
    pub flags: MethodFlags,
    /// Declared parameters, excluding the receiver.
    pub args: Vec<TypeDesc>,
    /// Declared return type.
    pub ret: TypeDesc,
    /// Source language.
    pub lang: SourceLang,
    /// Body, absent for abstract and native methods.
    pub code: Option<MethodCode>,
}

impl MethodDef {
    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns `true` for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ABSTRACT)
    }

    /// Returns `true` for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::CONSTRUCTOR)
    }

    /// Returns `true` for runtime intrinsics.
    #[must_use]
    pub fn is_intrinsic(&self) -> bool {
        self.flags.contains(MethodFlags::INTRINSIC)
    }
}

/// Name of instance constructors.
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// Constant-pool entry referenced by an [`EntityId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolEntry {
    /// A class by name.
    Class(String),
    /// A method by declaring class and name; resolution searches superclasses.
    Method {
        /// Class name.
        class: String,
        /// Method name.
        name: String,
    },
    /// A field by declaring class and name; resolution searches superclasses.
    Field {
        /// Class name.
        class: String,
        /// Field name.
        name: String,
    },
    /// A string literal.
    String(String),
}

/// Classes the verifier needs by role.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WellKnownClasses {
    /// Root of the class hierarchy.
    pub object: ClassId,
    /// Type of class objects (`lda.type`).
    pub class_class: ClassId,
    /// Type of string literals (`lda.str`).
    pub string: ClassId,
    /// Root of throwable types; the type of catch-all handlers.
    pub throwable: ClassId,
}

/// Default names of the well-known classes.
pub mod names {
    /// Root object class.
    pub const OBJECT: &str = "std.core.Object";
    /// Class-object class.
    pub const CLASS: &str = "std.core.Class";
    /// String class.
    pub const STRING: &str = "std.core.String";
    /// Throwable root.
    pub const THROWABLE: &str = "std.core.Throwable";
}

/// An immutable loaded program.
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) classes: Vec<ClassDef>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) pool: Vec<PoolEntry>,
    pub(crate) class_index: HashMap<String, ClassId>,
    pub(crate) method_index: HashMap<(ClassId, String), MethodId>,
    pub(crate) field_index: HashMap<(ClassId, String), FieldId>,
    pub(crate) well_known: WellKnownClasses,
}

impl Program {
    /// All classes.
    #[must_use]
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    /// All methods.
    #[must_use]
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    /// All fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Iterates over every method id.
    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> + '_ {
        (0..self.methods.len()).map(|i| MethodId(u32::try_from(i).unwrap_or(u32::MAX)))
    }

    /// Returns the class `id`.
    #[must_use]
    pub fn class(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id.0 as usize)
    }

    /// Returns the method `id`.
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&MethodDef> {
        self.methods.get(id.0 as usize)
    }

    /// Returns the field `id`.
    #[must_use]
    pub fn field(&self, id: FieldId) -> Option<&FieldDef> {
        self.fields.get(id.0 as usize)
    }

    /// Returns the pool entry `id`.
    #[must_use]
    pub fn pool_entry(&self, id: EntityId) -> Option<&PoolEntry> {
        self.pool.get(usize::from(id.0))
    }

    /// Well-known classes.
    #[must_use]
    pub fn well_known(&self) -> WellKnownClasses {
        self.well_known
    }

    /// Looks up a class by name.
    #[must_use]
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_index.get(name).copied()
    }

    /// Iterates over `class` and its superclasses, nearest first.
    pub fn superclass_chain(&self, class: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        let mut next = Some(class);
        let mut steps = 0_usize;
        core::iter::from_fn(move || {
            let cur = next?;
            steps += 1;
            // A cyclic hierarchy is malformed; stop rather than loop.
            next = if steps > self.classes.len() {
                None
            } else {
                self.class(cur).and_then(|c| c.super_class)
            };
            Some(cur)
        })
    }

    /// Looks up a method by class and name, searching superclasses.
    #[must_use]
    pub fn find_method(&self, class: ClassId, name: &str) -> Option<MethodId> {
        self.superclass_chain(class)
            .find_map(|c| self.method_index.get(&(c, String::from(name))).copied())
    }

    /// Looks up a field by class and name, searching superclasses.
    #[must_use]
    pub fn find_field(&self, class: ClassId, name: &str) -> Option<FieldId> {
        self.superclass_chain(class)
            .find_map(|c| self.field_index.get(&(c, String::from(name))).copied())
    }

    /// Resolves a class operand.
    #[must_use]
    pub fn resolve_class(&self, id: EntityId) -> Option<ClassId> {
        match self.pool_entry(id)? {
            PoolEntry::Class(name) => self.class_by_name(name),
            _ => None,
        }
    }

    /// Resolves a method operand.
    #[must_use]
    pub fn resolve_method(&self, id: EntityId) -> Option<MethodId> {
        match self.pool_entry(id)? {
            PoolEntry::Method { class, name } => self.find_method(self.class_by_name(class)?, name),
            _ => None,
        }
    }

    /// Resolves a field operand.
    #[must_use]
    pub fn resolve_field(&self, id: EntityId) -> Option<FieldId> {
        match self.pool_entry(id)? {
            PoolEntry::Field { class, name } => self.find_field(self.class_by_name(class)?, name),
            _ => None,
        }
    }

    /// Resolves the class named by a method or field operand, even if the member itself is
    /// missing. Array constructors are referenced this way.
    #[must_use]
    pub fn resolve_owner(&self, id: EntityId) -> Option<ClassId> {
        match self.pool_entry(id)? {
            PoolEntry::Method { class, .. } | PoolEntry::Field { class, .. } => {
                self.class_by_name(class)
            }
            _ => None,
        }
    }

    /// Returns `Class::name` for diagnostics and configuration lookups.
    #[must_use]
    pub fn method_full_name(&self, id: MethodId) -> String {
        let Some(m) = self.method(id) else {
            return alloc::format!("<method {}>", id.0);
        };
        let class = self.class(m.class).map_or("<unknown>", |c| c.name.as_str());
        alloc::format!("{class}::{}", m.name)
    }

    /// Returns a stable 64-bit id for `id`, derived from its name and signature.
    ///
    /// Used as the key of persistent verification-result caches.
    #[must_use]
    pub fn method_uid(&self, id: MethodId) -> u64 {
        let mut h = Fnv1a64::new();
        h.update(self.method_full_name(id).as_bytes());
        if let Some(m) = self.method(id) {
            for a in &m.args {
                h.update(b"\x00");
                h.update(alloc::format!("{a}").as_bytes());
            }
            h.update(b"\x01");
            h.update(alloc::format!("{}", m.ret).as_bytes());
        }
        h.finish()
    }
}

struct Fnv1a64(u64);

impl Fnv1a64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    fn new() -> Self {
        Self(Self::OFFSET)
    }

    fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn finish(self) -> u64 {
        self.0
    }
}
