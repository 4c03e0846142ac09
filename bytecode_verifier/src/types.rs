// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Abstract types.
//!
//! A [`Type`] is either a fixed [`Builtin`] lattice node or a class-backed type. The builtin part
//! of the lattice is small and closed, so its transitive supertype relation and pairwise least
//! upper bounds are tabulated at compile time. Subtyping that involves classes lives in
//! [`TypeSystem`](crate::type_system::TypeSystem).

use core::fmt;

use crate::program::ClassId;

/// Fixed lattice nodes.
///
/// Declaration order matters: [`Builtin::lub`] scans candidates in this order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
#[allow(missing_docs, reason = "see `Builtin::name`")]
pub enum Builtin {
    Top,
    U1,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
    I64,
    U64,
    Integral8,
    Integral16,
    Integral32,
    Integral64,
    Float32,
    Float64,
    Bits32,
    Bits64,
    Primitive,
    Reference,
    NullReference,
    Object,
    TypeClass,
    Array,
    Bottom,
}

const COUNT: usize = 27;

const fn bit(b: Builtin) -> u32 {
    1 << (b as u32)
}

const fn bits(list: &[Builtin]) -> u32 {
    let mut m = 0;
    let mut i = 0;
    while i < list.len() {
        m |= bit(list[i]);
        i += 1;
    }
    m
}

const fn direct_supertypes(b: Builtin) -> u32 {
    use Builtin as B;
    match b {
        B::U1 => bits(&[B::U8, B::I8]),
        B::I8 => bits(&[B::I16, B::Integral8]),
        B::U8 => bits(&[B::U16, B::I16, B::Integral8]),
        B::I16 => bits(&[B::I32, B::Integral16]),
        B::U16 => bits(&[B::I32, B::U32, B::Integral16]),
        B::I32 | B::U32 => bit(B::Integral32),
        B::F32 => bit(B::Float32),
        B::F64 => bit(B::Float64),
        B::I64 | B::U64 => bit(B::Integral64),
        B::Integral8 => bit(B::Integral16),
        B::Integral16 => bit(B::Integral32),
        B::Integral32 | B::Float32 => bit(B::Bits32),
        B::Integral64 | B::Float64 => bit(B::Bits64),
        B::Bits32 | B::Bits64 => bit(B::Primitive),
        B::Primitive | B::Reference => bit(B::Top),
        B::NullReference => bits(&[B::Reference, B::Object, B::TypeClass, B::Array]),
        B::Object | B::TypeClass => bit(B::Reference),
        B::Array => bit(B::Object),
        B::Bottom => bits(&[
            B::U1,
            B::I8,
            B::U8,
            B::I16,
            B::U16,
            B::I32,
            B::U32,
            B::F32,
            B::F64,
            B::I64,
            B::U64,
            B::NullReference,
            B::Object,
            B::Array,
        ]),
        B::Top => 0,
    }
}

/// Reflexive-transitive supertype sets, indexed by `Builtin as usize`.
const SUPERTYPES: [u32; COUNT] = {
    let mut t = [0_u32; COUNT];
    let mut i = 0;
    while i < COUNT {
        t[i] = (1 << i) | direct_supertypes(Builtin::ALL[i]);
        i += 1;
    }
    let mut changed = true;
    while changed {
        changed = false;
        let mut i = 0;
        while i < COUNT {
            let mut acc = t[i];
            let mut j = 0;
            while j < COUNT {
                if t[i] & (1 << j) != 0 {
                    acc |= t[j];
                }
                j += 1;
            }
            if acc != t[i] {
                t[i] = acc;
                changed = true;
            }
            i += 1;
        }
    }
    t
};

const LUB: [[Builtin; COUNT]; COUNT] = {
    let mut t = [[Builtin::Top; COUNT]; COUNT];
    let mut a = 0;
    while a < COUNT {
        let mut b = 0;
        while b < COUNT {
            let common = SUPERTYPES[a] & SUPERTYPES[b];
            let mut candidate = Builtin::Top;
            let mut c = 0;
            while c < COUNT {
                if common & (1 << c) != 0 && SUPERTYPES[c] & bit(candidate) != 0 {
                    candidate = Builtin::ALL[c];
                }
                c += 1;
            }
            t[a][b] = candidate;
            b += 1;
        }
        a += 1;
    }
    t
};

impl Builtin {
    /// All nodes, in declaration order.
    pub const ALL: [Self; COUNT] = [
        Self::Top,
        Self::U1,
        Self::I8,
        Self::U8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::F32,
        Self::F64,
        Self::I64,
        Self::U64,
        Self::Integral8,
        Self::Integral16,
        Self::Integral32,
        Self::Integral64,
        Self::Float32,
        Self::Float64,
        Self::Bits32,
        Self::Bits64,
        Self::Primitive,
        Self::Reference,
        Self::NullReference,
        Self::Object,
        Self::TypeClass,
        Self::Array,
        Self::Bottom,
    ];

    /// Returns `true` if `self <: other` within the builtin lattice.
    #[must_use]
    pub const fn is_subtype_of(self, other: Self) -> bool {
        SUPERTYPES[self as usize] & bit(other) != 0
    }

    /// Least upper bound within the builtin lattice. `Top` if only `Top` is common.
    #[must_use]
    pub const fn lub(self, other: Self) -> Self {
        LUB[self as usize][other as usize]
    }

    /// Returns `true` for the reference-side nodes (`reference` and below, excluding `bot`).
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(
            self,
            Self::Reference | Self::NullReference | Self::Object | Self::TypeClass | Self::Array
        )
    }

    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::U1 => "u1",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::Integral8 => "integral8",
            Self::Integral16 => "integral16",
            Self::Integral32 => "integral32",
            Self::Integral64 => "integral64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bits32 => "bits32",
            Self::Bits64 => "bits64",
            Self::Primitive => "primitive",
            Self::Reference => "reference",
            Self::NullReference => "null_ref",
            Self::Object => "object",
            Self::TypeClass => "type_class",
            Self::Array => "array",
            Self::Bottom => "bot",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An abstract type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// A fixed lattice node.
    Builtin(Builtin),
    /// A loaded class or array class.
    Class(ClassId),
}

#[allow(missing_docs, reason = "named after the builtin they wrap")]
impl Type {
    pub const TOP: Self = Self::Builtin(Builtin::Top);
    pub const BOTTOM: Self = Self::Builtin(Builtin::Bottom);
    pub const U1: Self = Self::Builtin(Builtin::U1);
    pub const I8: Self = Self::Builtin(Builtin::I8);
    pub const U8: Self = Self::Builtin(Builtin::U8);
    pub const I16: Self = Self::Builtin(Builtin::I16);
    pub const U16: Self = Self::Builtin(Builtin::U16);
    pub const I32: Self = Self::Builtin(Builtin::I32);
    pub const U32: Self = Self::Builtin(Builtin::U32);
    pub const I64: Self = Self::Builtin(Builtin::I64);
    pub const U64: Self = Self::Builtin(Builtin::U64);
    pub const F32: Self = Self::Builtin(Builtin::F32);
    pub const F64: Self = Self::Builtin(Builtin::F64);
    pub const INTEGRAL32: Self = Self::Builtin(Builtin::Integral32);
    pub const INTEGRAL64: Self = Self::Builtin(Builtin::Integral64);
    pub const FLOAT32: Self = Self::Builtin(Builtin::Float32);
    pub const FLOAT64: Self = Self::Builtin(Builtin::Float64);
    pub const BITS32: Self = Self::Builtin(Builtin::Bits32);
    pub const BITS64: Self = Self::Builtin(Builtin::Bits64);
    pub const PRIMITIVE: Self = Self::Builtin(Builtin::Primitive);
    pub const REFERENCE: Self = Self::Builtin(Builtin::Reference);
    pub const NULL_REF: Self = Self::Builtin(Builtin::NullReference);
    pub const OBJECT: Self = Self::Builtin(Builtin::Object);
    pub const TYPE_CLASS: Self = Self::Builtin(Builtin::TypeClass);
    pub const ARRAY: Self = Self::Builtin(Builtin::Array);

    /// Returns the builtin node, if this is not class-backed.
    #[must_use]
    pub const fn builtin(self) -> Option<Builtin> {
        match self {
            Self::Builtin(b) => Some(b),
            Self::Class(_) => None,
        }
    }

    /// Returns the class, if this is class-backed.
    #[must_use]
    pub const fn class(self) -> Option<ClassId> {
        match self {
            Self::Builtin(_) => None,
            Self::Class(c) => Some(c),
        }
    }

    /// Returns `true` for `top`.
    #[must_use]
    pub const fn is_top(self) -> bool {
        matches!(self, Self::Builtin(Builtin::Top))
    }

    /// Returns `true` for `bot`.
    #[must_use]
    pub const fn is_bot(self) -> bool {
        matches!(self, Self::Builtin(Builtin::Bottom))
    }

    /// Returns `false` only for `top`, the result of joining unrelated values.
    #[must_use]
    pub const fn is_consistent(self) -> bool {
        !self.is_top()
    }
}

impl From<Builtin> for Type {
    fn from(b: Builtin) -> Self {
        Self::Builtin(b)
    }
}

impl From<ClassId> for Type {
    fn from(c: ClassId) -> Self {
        Self::Class(c)
    }
}
