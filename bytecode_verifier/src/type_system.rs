// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subtyping, join, and meet over builtin and class-backed types.
//!
//! A [`TypeSystem`] is owned by one verifier processor and reused by every method that processor
//! verifies, so the per-class supertype sets and per-method signatures it memoizes are computed
//! once per program rather than once per method.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use crate::program::{ClassId, FieldId, MethodId, Program, SourceLang, TypeDesc};
use crate::types::{Builtin, Type};

/// Resolved method signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Formal parameters; instance methods start with the receiver.
    pub args: Vec<Type>,
    /// Return type, `None` for `void`.
    pub result: Option<Type>,
}

/// Type lattice operations for one program and one source language.
#[derive(Debug)]
pub struct TypeSystem {
    program: Arc<Program>,
    lang: SourceLang,
    supertypes: HashMap<ClassId, HashSet<ClassId>>,
    signatures: HashMap<MethodId, Arc<Signature>>,
    field_types: HashMap<FieldId, Type>,
    normalized: HashMap<Type, Type>,
}

impl TypeSystem {
    /// Creates an empty type system over `program`.
    #[must_use]
    pub fn new(program: Arc<Program>, lang: SourceLang) -> Self {
        Self {
            program,
            lang,
            supertypes: HashMap::new(),
            signatures: HashMap::new(),
            field_types: HashMap::new(),
            normalized: HashMap::new(),
        }
    }

    /// The program this type system describes.
    #[must_use]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Source language served.
    #[must_use]
    pub fn lang(&self) -> SourceLang {
        self.lang
    }

    /// Number of classes whose supertype sets are cached.
    #[must_use]
    pub fn known_classes(&self) -> usize {
        self.supertypes.len()
    }

    /// Root object class type.
    #[must_use]
    pub fn object_type(&self) -> Type {
        Type::Class(self.program.well_known().object)
    }

    /// Class-object type (result of `lda.type`).
    #[must_use]
    pub fn class_type(&self) -> Type {
        Type::Class(self.program.well_known().class_class)
    }

    /// String type (result of `lda.str`).
    #[must_use]
    pub fn string_type(&self) -> Type {
        Type::Class(self.program.well_known().string)
    }

    /// Throwable root type.
    #[must_use]
    pub fn throwable_type(&self) -> Type {
        Type::Class(self.program.well_known().throwable)
    }

    /// Computes and caches the supertype set of `class`.
    pub fn register_class(&mut self, class: ClassId) {
        if self.supertypes.contains_key(&class) {
            return;
        }
        let mut set = HashSet::new();
        let mut stack = Vec::from([class]);
        while let Some(c) = stack.pop() {
            if !set.insert(c) {
                continue;
            }
            if let Some(def) = self.program.class(c) {
                stack.extend(def.super_class);
                stack.extend(def.interfaces.iter().copied());
            }
        }
        log::trace!(
            "registered class {} with {} supertypes",
            self.class_name(class),
            set.len()
        );
        self.supertypes.insert(class, set);
    }

    /// Caches the signature of `method` and registers every class it names.
    pub fn register_method(&mut self, method: MethodId) {
        let sig = self.method_signature(method);
        for t in sig.args.iter().chain(&sig.result) {
            if let Type::Class(c) = t {
                self.register_class(*c);
            }
        }
    }

    /// Caches the type of `field`.
    pub fn register_field(&mut self, field: FieldId) {
        if let Some(Type::Class(c)) = self.field_type(field) {
            self.register_class(c);
        }
    }

    /// Returns `true` if `class` is `ancestor` or inherits from it.
    pub fn class_has_supertype(&mut self, class: ClassId, ancestor: ClassId) -> bool {
        self.register_class(class);
        self.supertypes
            .get(&class)
            .is_some_and(|s| s.contains(&ancestor))
    }

    /// Maps a descriptor to a type. `void` has no type; unresolved classes map to `bot`.
    #[must_use]
    pub fn type_of_desc(&self, desc: &TypeDesc) -> Option<Type> {
        Some(match desc {
            TypeDesc::Void => return None,
            TypeDesc::U1 => Type::U1,
            TypeDesc::I8 => Type::I8,
            TypeDesc::U8 => Type::U8,
            TypeDesc::I16 => Type::I16,
            TypeDesc::U16 => Type::U16,
            TypeDesc::I32 => Type::I32,
            TypeDesc::U32 => Type::U32,
            TypeDesc::I64 => Type::I64,
            TypeDesc::U64 => Type::U64,
            TypeDesc::F32 => Type::F32,
            TypeDesc::F64 => Type::F64,
            TypeDesc::Ref(name) => self
                .program
                .class_by_name(name)
                .map_or(Type::BOTTOM, Type::Class),
        })
    }

    /// Returns the element type of an array class.
    #[must_use]
    pub fn array_element_type(&self, t: Type) -> Option<Type> {
        let def = self.program.class(t.class()?)?;
        self.type_of_desc(def.component.as_ref()?)
    }

    /// Returns `true` if `t` is an array class.
    #[must_use]
    pub fn is_array_class(&self, t: Type) -> bool {
        t.class()
            .and_then(|c| self.program.class(c))
            .is_some_and(|d| d.is_array())
    }

    /// Human-readable name for diagnostics.
    #[must_use]
    pub fn type_name(&self, t: Type) -> String {
        match t {
            Type::Builtin(b) => b.name().into(),
            Type::Class(c) => self.class_name(c),
        }
    }

    fn class_name(&self, c: ClassId) -> String {
        self.program
            .class(c)
            .map_or_else(|| alloc::format!("<class {}>", c.0), |d| d.name.clone())
    }

    /// Resolves and caches the signature of `method`.
    ///
    /// Unknown methods get an empty `void` signature.
    pub fn method_signature(&mut self, method: MethodId) -> Arc<Signature> {
        if let Some(sig) = self.signatures.get(&method) {
            return sig.clone();
        }
        let program = self.program.clone();
        let sig = match program.method(method) {
            Some(m) => {
                let mut args = Vec::with_capacity(m.args.len() + 1);
                if !m.is_static() {
                    args.push(Type::Class(m.class));
                }
                args.extend(
                    m.args
                        .iter()
                        .map(|d| self.type_of_desc(d).unwrap_or(Type::BOTTOM)),
                );
                Signature {
                    args,
                    result: self.type_of_desc(&m.ret),
                }
            }
            None => Signature {
                args: Vec::new(),
                result: None,
            },
        };
        let sig = Arc::new(sig);
        self.signatures.insert(method, sig.clone());
        sig
    }

    /// Resolves and caches the declared type of `field`.
    pub fn field_type(&mut self, field: FieldId) -> Option<Type> {
        if let Some(t) = self.field_types.get(&field) {
            return Some(*t);
        }
        let t = self
            .type_of_desc(&self.program.field(field)?.ty)
            .unwrap_or(Type::BOTTOM);
        self.field_types.insert(field, t);
        Some(t)
    }

    /// Returns `true` if `a <: b`.
    pub fn is_subtype(&mut self, a: Type, b: Type) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (Type::Builtin(x), Type::Builtin(y)) => x.is_subtype_of(y),
            (Type::Builtin(x), Type::Class(_)) => {
                matches!(x, Builtin::Bottom | Builtin::NullReference)
            }
            (Type::Class(c), Type::Builtin(y)) => match y {
                Builtin::Top | Builtin::Reference | Builtin::Object => true,
                Builtin::TypeClass => c == self.program.well_known().class_class,
                Builtin::Array => self.is_array_class(a),
                _ => false,
            },
            (Type::Class(c), Type::Class(d)) => self.class_is_subtype(c, d),
        }
    }

    fn class_is_subtype(&mut self, c: ClassId, d: ClassId) -> bool {
        let program = self.program.clone();
        let Some(target) = program.class(d) else {
            return false;
        };
        if let Some(target_elem) = &target.component {
            let Some(source_elem) = program.class(c).and_then(|s| s.component.as_ref()) else {
                return false;
            };
            if !target_elem.is_ref() || !source_elem.is_ref() {
                return source_elem == target_elem;
            }
            let (Some(s), Some(t)) = (
                self.type_of_desc(source_elem),
                self.type_of_desc(target_elem),
            ) else {
                return false;
            };
            return self.is_subtype(s, t);
        }
        self.class_has_supertype(c, d)
    }

    /// Least upper bound of `a` and `b`.
    ///
    /// Returns `bot` when the only common supertype is `top`; callers treat that as a conflict.
    pub fn join(&mut self, a: Type, b: Type) -> Type {
        if self.is_subtype(a, b) {
            return b;
        }
        if self.is_subtype(b, a) {
            return a;
        }
        let lub = match (a, b) {
            (Type::Builtin(x), Type::Builtin(y)) => x.lub(y),
            (Type::Class(c), Type::Class(d)) => {
                if self.is_array_class(a) && self.is_array_class(b) {
                    return self.join_arrays(c, d);
                }
                if let Some(t) = self.join_classes(c, d) {
                    return t;
                }
                self.class_image(c).lub(self.class_image(d))
            }
            (Type::Class(c), Type::Builtin(y)) | (Type::Builtin(y), Type::Class(c)) => {
                self.class_image(c).lub(y)
            }
        };
        if lub == Builtin::Top {
            Type::BOTTOM
        } else {
            Type::Builtin(lub)
        }
    }

    fn class_image(&self, c: ClassId) -> Builtin {
        if self.is_array_class(Type::Class(c)) {
            Builtin::Array
        } else {
            Builtin::Object
        }
    }

    /// Reference arrays join componentwise; anything else is the builtin array node.
    fn join_arrays(&mut self, c: ClassId, d: ClassId) -> Type {
        let program = self.program.clone();
        let (Some(ce), Some(de)) = (
            program.class(c).and_then(|x| x.component.as_ref()),
            program.class(d).and_then(|x| x.component.as_ref()),
        ) else {
            return Type::ARRAY;
        };
        if !ce.is_ref() || !de.is_ref() {
            return Type::ARRAY;
        }
        let (Some(s), Some(t)) = (self.type_of_desc(ce), self.type_of_desc(de)) else {
            return Type::ARRAY;
        };
        let Type::Class(elem) = self.join(s, t) else {
            return Type::ARRAY;
        };
        program
            .class(elem)
            .and_then(|e| program.class_by_name(&TypeDesc::Ref(e.name.clone()).array_name()))
            .map_or(Type::ARRAY, Type::Class)
    }

    fn join_classes(&mut self, c: ClassId, d: ClassId) -> Option<Type> {
        self.register_class(c);
        self.register_class(d);
        let common: Vec<ClassId> = match (self.supertypes.get(&c), self.supertypes.get(&d)) {
            (Some(sc), Some(sd)) => {
                let mut v: Vec<ClassId> = sc.intersection(sd).copied().collect();
                v.sort_unstable();
                v
            }
            _ => return None,
        };
        let mut minimal = Vec::new();
        for &m in &common {
            let dominated = common
                .iter()
                .any(|&n| n != m && self.class_has_supertype(n, m));
            if !dominated {
                minimal.push(m);
            }
        }
        if let [only] = minimal.as_slice() {
            return Some(Type::Class(*only));
        }
        let program = self.program.clone();
        let chain_d: Vec<ClassId> = program.superclass_chain(d).collect();
        program
            .superclass_chain(c)
            .find(|x| chain_d.contains(x))
            .map(Type::Class)
    }

    /// Greatest lower bound approximation used by `checkcast`/`isinstance`.
    ///
    /// Returns `bot` when no value can have both types.
    pub fn meet(&mut self, a: Type, b: Type) -> Type {
        if self.is_subtype(a, b) {
            return a;
        }
        if self.is_subtype(b, a) {
            return b;
        }
        let (Type::Class(c), Type::Class(d)) = (a, b) else {
            return Type::BOTTOM;
        };
        let program = self.program.clone();
        let (Some(x), Some(y)) = (program.class(c), program.class(d)) else {
            return Type::BOTTOM;
        };
        if x.is_final() || y.is_final() || (!x.is_interface() && !y.is_interface()) {
            Type::BOTTOM
        } else {
            a
        }
    }

    /// Collapses primitive types to the group used for assignability checks.
    pub fn normalized_type_of(&mut self, t: Type) -> Type {
        if let Some(n) = self.normalized.get(&t) {
            return *n;
        }
        let n = match t {
            Type::Builtin(Builtin::Bottom | Builtin::Top) | Type::Class(_) => t,
            Type::Builtin(b) => [
                Builtin::Integral32,
                Builtin::Integral64,
                Builtin::Float32,
                Builtin::Float64,
            ]
            .into_iter()
            .find(|g| b.is_subtype_of(*g))
            .map_or(t, Type::Builtin),
        };
        self.normalized.insert(t, n);
        n
    }
}
