// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opcode byte values and operand formats.
//!
//! Every instruction is one opcode byte followed by the operands its [`Format`] names, in order.
//! Registers are one byte, entity ids are little-endian `u16`, jump offsets are little-endian
//! `i32` relative to the start of the jumping instruction.

/// Operand layout of an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// No operands.
    None,
    /// `v`.
    V,
    /// `v1, v2`.
    VV,
    /// `v, imm:i32`.
    VImm32,
    /// `v, imm:i64`.
    VImm64,
    /// `imm:i32`.
    Imm32,
    /// `imm:i64`.
    Imm64,
    /// `id`.
    Id,
    /// `v, id`.
    VId,
    /// `v1, v2, id`.
    VVId,
    /// `off:i32`.
    Jump,
    /// `v, off:i32`.
    VJump,
    /// `id, v`.
    IdV,
    /// `id, v1, v2`.
    IdVV,
    /// `id, v1, v2, v3, v4`.
    IdVVVV,
    /// `id, v, imm:u8`.
    IdVImm,
    /// `id, v1, v2, v3, imm:u8`.
    IdVVVImm,
}

impl Format {
    /// Number of register operands.
    #[must_use]
    pub const fn reg_count(self) -> usize {
        match self {
            Self::None | Self::Imm32 | Self::Imm64 | Self::Id | Self::Jump => 0,
            Self::V | Self::VImm32 | Self::VImm64 | Self::VId | Self::VJump | Self::IdV => 1,
            Self::IdVImm => 1,
            Self::VV | Self::VVId | Self::IdVV => 2,
            Self::IdVVVImm => 3,
            Self::IdVVVV => 4,
        }
    }

    /// Encoded size in bytes, including the opcode byte.
    #[must_use]
    pub const fn size(self) -> usize {
        let imm = match self {
            Self::VImm32 | Self::Imm32 | Self::Jump | Self::VJump => 4,
            Self::VImm64 | Self::Imm64 => 8,
            Self::IdVImm | Self::IdVVVImm => 1,
            _ => 0,
        };
        1 + self.reg_count() + imm + if self.has_id() { 2 } else { 0 }
    }

    /// Returns `true` if the format carries an entity id.
    #[must_use]
    pub const fn has_id(self) -> bool {
        matches!(
            self,
            Self::Id
                | Self::VId
                | Self::VVId
                | Self::IdV
                | Self::IdVV
                | Self::IdVVVV
                | Self::IdVImm
                | Self::IdVVVImm
        )
    }
}

macro_rules! opcodes {
    ($($name:ident = $byte:literal, $mnemonic:literal, $format:ident;)*) => {
        /// Instruction opcodes.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(missing_docs, reason = "see `Opcode::mnemonic`")]
        pub enum Opcode {
            $($name = $byte,)*
        }

        impl Opcode {
            /// All opcodes, in byte order.
            pub const ALL: &'static [Self] = &[$(Self::$name,)*];

            /// Parses an opcode byte.
            #[must_use]
            pub const fn from_u8(b: u8) -> Option<Self> {
                match b {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Assembly mnemonic.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }

            /// Operand layout.
            #[must_use]
            pub const fn format(self) -> Format {
                match self {
                    $(Self::$name => Format::$format,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None;
    Mov = 0x01, "mov", VV;
    Mov64 = 0x02, "mov.64", VV;
    MovObj = 0x03, "mov.obj", VV;
    Movi = 0x04, "movi", VImm32;
    Movi64 = 0x05, "movi.64", VImm64;
    Fmovi = 0x06, "fmovi", VImm32;
    Fmovi64 = 0x07, "fmovi.64", VImm64;
    MovNull = 0x08, "mov.null", V;

    Lda = 0x10, "lda", V;
    Lda64 = 0x11, "lda.64", V;
    LdaObj = 0x12, "lda.obj", V;
    Ldai = 0x13, "ldai", Imm32;
    Ldai64 = 0x14, "ldai.64", Imm64;
    Fldai = 0x15, "fldai", Imm32;
    Fldai64 = 0x16, "fldai.64", Imm64;
    LdaStr = 0x17, "lda.str", Id;
    LdaType = 0x18, "lda.type", Id;
    LdaNull = 0x19, "lda.null", None;
    Sta = 0x1A, "sta", V;
    Sta64 = 0x1B, "sta.64", V;
    StaObj = 0x1C, "sta.obj", V;

    Jmp = 0x20, "jmp", Jump;
    Jeqz = 0x21, "jeqz", Jump;
    Jnez = 0x22, "jnez", Jump;
    Jltz = 0x23, "jltz", Jump;
    Jgtz = 0x24, "jgtz", Jump;
    Jlez = 0x25, "jlez", Jump;
    Jgez = 0x26, "jgez", Jump;
    JeqzObj = 0x27, "jeqz.obj", Jump;
    JnezObj = 0x28, "jnez.obj", Jump;
    Jeq = 0x29, "jeq", VJump;
    Jne = 0x2A, "jne", VJump;
    Jlt = 0x2B, "jlt", VJump;
    Jgt = 0x2C, "jgt", VJump;
    Jle = 0x2D, "jle", VJump;
    Jge = 0x2E, "jge", VJump;
    JeqObj = 0x2F, "jeq.obj", VJump;
    JneObj = 0x30, "jne.obj", VJump;

    Add2 = 0x40, "add2", V;
    Sub2 = 0x41, "sub2", V;
    Mul2 = 0x42, "mul2", V;
    Div2 = 0x43, "div2", V;
    Mod2 = 0x44, "mod2", V;
    And2 = 0x45, "and2", V;
    Or2 = 0x46, "or2", V;
    Xor2 = 0x47, "xor2", V;
    Shl2 = 0x48, "shl2", V;
    Shr2 = 0x49, "shr2", V;
    Ashr2 = 0x4A, "ashr2", V;
    Add264 = 0x4B, "add2.64", V;
    Sub264 = 0x4C, "sub2.64", V;
    Mul264 = 0x4D, "mul2.64", V;
    Div264 = 0x4E, "div2.64", V;
    Mod264 = 0x4F, "mod2.64", V;
    And264 = 0x50, "and2.64", V;
    Or264 = 0x51, "or2.64", V;
    Xor264 = 0x52, "xor2.64", V;
    Shl264 = 0x53, "shl2.64", V;
    Shr264 = 0x54, "shr2.64", V;
    Ashr264 = 0x55, "ashr2.64", V;
    Fadd2 = 0x56, "fadd2", V;
    Fsub2 = 0x57, "fsub2", V;
    Fmul2 = 0x58, "fmul2", V;
    Fdiv2 = 0x59, "fdiv2", V;
    Fmod2 = 0x5A, "fmod2", V;
    Fadd264 = 0x5B, "fadd2.64", V;
    Fsub264 = 0x5C, "fsub2.64", V;
    Fmul264 = 0x5D, "fmul2.64", V;
    Fdiv264 = 0x5E, "fdiv2.64", V;
    Fmod264 = 0x5F, "fmod2.64", V;

    Add = 0x60, "add", VV;
    Sub = 0x61, "sub", VV;
    Mul = 0x62, "mul", VV;
    Div = 0x63, "div", VV;
    Mod = 0x64, "mod", VV;
    And = 0x65, "and", VV;
    Or = 0x66, "or", VV;
    Xor = 0x67, "xor", VV;
    Shl = 0x68, "shl", VV;
    Shr = 0x69, "shr", VV;
    Ashr = 0x6A, "ashr", VV;

    Addi = 0x70, "addi", Imm32;
    Subi = 0x71, "subi", Imm32;
    Muli = 0x72, "muli", Imm32;
    Divi = 0x73, "divi", Imm32;
    Modi = 0x74, "modi", Imm32;
    Andi = 0x75, "andi", Imm32;
    Ori = 0x76, "ori", Imm32;
    Xori = 0x77, "xori", Imm32;
    Shli = 0x78, "shli", Imm32;
    Shri = 0x79, "shri", Imm32;
    Ashri = 0x7A, "ashri", Imm32;
    Inci = 0x7B, "inci", VImm32;

    Neg = 0x80, "neg", None;
    Neg64 = 0x81, "neg.64", None;
    Not = 0x82, "not", None;
    Not64 = 0x83, "not.64", None;
    Fneg = 0x84, "fneg", None;
    Fneg64 = 0x85, "fneg.64", None;

    Cmp64 = 0x88, "cmp.64", V;
    Ucmp = 0x89, "ucmp", V;
    Ucmp64 = 0x8A, "ucmp.64", V;
    Fcmpl = 0x8B, "fcmpl", V;
    Fcmpg = 0x8C, "fcmpg", V;
    Fcmpl64 = 0x8D, "fcmpl.64", V;
    Fcmpg64 = 0x8E, "fcmpg.64", V;

    I32toi64 = 0x90, "i32toi64", None;
    I32tof32 = 0x91, "i32tof32", None;
    I32tof64 = 0x92, "i32tof64", None;
    I32tou1 = 0x93, "i32tou1", None;
    I32toi8 = 0x94, "i32toi8", None;
    I32tou8 = 0x95, "i32tou8", None;
    I32toi16 = 0x96, "i32toi16", None;
    I32tou16 = 0x97, "i32tou16", None;
    I64toi32 = 0x98, "i64toi32", None;
    I64tof32 = 0x99, "i64tof32", None;
    I64tof64 = 0x9A, "i64tof64", None;
    U32toi64 = 0x9B, "u32toi64", None;
    U32tof64 = 0x9C, "u32tof64", None;
    U64toi32 = 0x9D, "u64toi32", None;
    F32toi32 = 0x9E, "f32toi32", None;
    F32toi64 = 0x9F, "f32toi64", None;
    F32tof64 = 0xA0, "f32tof64", None;
    F64toi32 = 0xA1, "f64toi32", None;
    F64toi64 = 0xA2, "f64toi64", None;
    F64tof32 = 0xA3, "f64tof32", None;

    Ldarr8 = 0xB0, "ldarr.8", V;
    Ldarru8 = 0xB1, "ldarru8", V;
    Ldarr16 = 0xB2, "ldarr.16", V;
    Ldarru16 = 0xB3, "ldarru16", V;
    Ldarr = 0xB4, "ldarr", V;
    Ldarr64 = 0xB5, "ldarr.64", V;
    Fldarr32 = 0xB6, "fldarr.32", V;
    Fldarr64 = 0xB7, "fldarr.64", V;
    LdarrObj = 0xB8, "ldarr.obj", V;
    Starr8 = 0xB9, "starr.8", VV;
    Starr16 = 0xBA, "starr.16", VV;
    Starr = 0xBB, "starr", VV;
    Starr64 = 0xBC, "starr.64", VV;
    Fstarr32 = 0xBD, "fstarr.32", VV;
    Fstarr64 = 0xBE, "fstarr.64", VV;
    StarrObj = 0xBF, "starr.obj", VV;
    Lenarr = 0xC0, "lenarr", V;
    Newarr = 0xC1, "newarr", VVId;

    Newobj = 0xC2, "newobj", VId;
    InitobjShort = 0xC3, "initobj.short", IdVV;
    Initobj = 0xC4, "initobj", IdVVVV;
    InitobjRange = 0xC5, "initobj.range", IdV;

    Ldobj = 0xC8, "ldobj", VId;
    Ldobj64 = 0xC9, "ldobj.64", VId;
    LdobjObj = 0xCA, "ldobj.obj", VId;
    LdobjV = 0xCB, "ldobj.v", VVId;
    LdobjV64 = 0xCC, "ldobj.v.64", VVId;
    LdobjVObj = 0xCD, "ldobj.v.obj", VVId;
    Stobj = 0xCE, "stobj", VId;
    Stobj64 = 0xCF, "stobj.64", VId;
    StobjObj = 0xD0, "stobj.obj", VId;
    StobjV = 0xD1, "stobj.v", VVId;
    StobjV64 = 0xD2, "stobj.v.64", VVId;
    StobjVObj = 0xD3, "stobj.v.obj", VVId;
    LdobjVolatile = 0xD4, "ldobj.volatile", VId;
    LdobjVolatile64 = 0xD5, "ldobj.volatile.64", VId;
    LdobjVolatileObj = 0xD6, "ldobj.volatile.obj", VId;
    StobjVolatile = 0xD7, "stobj.volatile", VId;
    StobjVolatile64 = 0xD8, "stobj.volatile.64", VId;
    StobjVolatileObj = 0xD9, "stobj.volatile.obj", VId;
    Ldstatic = 0xDA, "ldstatic", Id;
    Ldstatic64 = 0xDB, "ldstatic.64", Id;
    LdstaticObj = 0xDC, "ldstatic.obj", Id;
    Ststatic = 0xDD, "ststatic", Id;
    Ststatic64 = 0xDE, "ststatic.64", Id;
    StstaticObj = 0xDF, "ststatic.obj", Id;
    LdstaticVolatile = 0xE0, "ldstatic.volatile", Id;
    LdstaticVolatile64 = 0xE1, "ldstatic.volatile.64", Id;
    LdstaticVolatileObj = 0xE2, "ldstatic.volatile.obj", Id;
    StstaticVolatile = 0xE3, "ststatic.volatile", Id;
    StstaticVolatile64 = 0xE4, "ststatic.volatile.64", Id;
    StstaticVolatileObj = 0xE5, "ststatic.volatile.obj", Id;

    CallShort = 0xE8, "call.short", IdVV;
    Call = 0xE9, "call", IdVVVV;
    CallRange = 0xEA, "call.range", IdV;
    CallAccShort = 0xEB, "call.acc.short", IdVImm;
    CallAcc = 0xEC, "call.acc", IdVVVImm;
    CallVirtShort = 0xED, "call.virt.short", IdVV;
    CallVirt = 0xEE, "call.virt", IdVVVV;
    CallVirtRange = 0xEF, "call.virt.range", IdV;
    CallVirtAccShort = 0xF0, "call.virt.acc.short", IdVImm;
    CallVirtAcc = 0xF1, "call.virt.acc", IdVVVImm;

    Return = 0xF4, "return", None;
    Return64 = 0xF5, "return.64", None;
    ReturnObj = 0xF6, "return.obj", None;
    ReturnVoid = 0xF7, "return.void", None;

    Checkcast = 0xF8, "checkcast", Id;
    Isinstance = 0xF9, "isinstance", Id;
    Throw = 0xFA, "throw", V;
    Monitorenter = 0xFB, "monitorenter", None;
    Monitorexit = 0xFC, "monitorexit", None;
}

impl Opcode {
    /// Returns the opcode byte value.
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Parses an opcode from its byte value.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        Self::from_u8(b)
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub const fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Jmp
                | Self::Return
                | Self::Return64
                | Self::ReturnObj
                | Self::ReturnVoid
                | Self::Throw
        )
    }

    /// Returns `true` if the instruction carries a jump offset.
    #[must_use]
    pub const fn is_jump(self) -> bool {
        matches!(self.format(), Format::Jump | Format::VJump)
    }
}

#[cfg(test)]
mod tests {
    use super::{Format, Opcode};

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(Opcode::Nop as u8, 0x00);
        assert_eq!(Opcode::Ldai as u8, 0x13);
        assert_eq!(Opcode::Jmp as u8, 0x20);
        assert_eq!(Opcode::CallVirtShort as u8, 0xED);
        assert_eq!(Opcode::Return as u8, 0xF4);
        assert_eq!(Opcode::Monitorexit as u8, 0xFC);
    }

    #[test]
    fn opcode_bytes_round_trip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op), "{}", op.mnemonic());
        }
        assert_eq!(Opcode::from_byte(0xFF), None);
    }

    #[test]
    fn opcode_terminator_classification() {
        assert!(Opcode::Jmp.is_terminator());
        assert!(Opcode::ReturnVoid.is_terminator());
        assert!(Opcode::Throw.is_terminator());
        assert!(!Opcode::Jeqz.is_terminator());
        assert!(!Opcode::Nop.is_terminator());
        assert!(Opcode::Jeqz.is_jump());
        assert!(!Opcode::Throw.is_jump());
    }

    #[test]
    fn format_sizes() {
        assert_eq!(Format::None.size(), 1);
        assert_eq!(Format::VV.size(), 3);
        assert_eq!(Format::Imm64.size(), 9);
        assert_eq!(Format::VJump.size(), 6);
        assert_eq!(Format::IdVVVV.size(), 7);
        assert_eq!(Format::IdVVVImm.size(), 7);
        assert_eq!(Opcode::Newarr.format().size(), 5);
    }
}
