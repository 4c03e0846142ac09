// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostic codes reported while verifying a method.
//!
//! Every check the verifier performs is identified by a [`DiagnosticCode`]. The call site decides
//! the minimum [`VerificationStatus`] a failed check contributes; the per-code severity table in
//! [`VerifierConfig`](crate::config::VerifierConfig) may promote it further or hide it.

use alloc::string::String;
use core::fmt;

use crate::status::VerificationStatus;

/// Broad family a [`DiagnosticCode`] belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Malformed control flow or encoding. Always fatal for the method.
    Structural,
    /// A class, method, or field reference could not be resolved.
    Resolution,
    /// An operand does not have the type an instruction requires.
    TypeSoundness,
    /// A path that statically cannot complete normally (for example a guaranteed NPE).
    DeadPath,
    /// An instruction that can be removed without changing behavior.
    Redundancy,
}

macro_rules! diagnostic_codes {
    ($($kind:ident => [$($code:ident),* $(,)?]),* $(,)?) => {
        /// Identifies one kind of verifier finding.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[allow(missing_docs, reason = "variant names are the documentation")]
        pub enum DiagnosticCode {
            $($($code,)*)*
        }

        impl DiagnosticCode {
            /// All codes, in declaration order.
            pub const ALL: &'static [Self] = &[$($(Self::$code,)*)*];

            /// Returns the family this code belongs to.
            #[must_use]
            pub const fn kind(self) -> DiagnosticKind {
                match self {
                    $($(Self::$code)|* => DiagnosticKind::$kind,)*
                }
            }

            /// Returns the code's name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $($(Self::$code => stringify!($code),)*)*
                }
            }
        }
    };
}

diagnostic_codes! {
    Structural => [
        BytecodeDecodeFailure,
        EmptyMethodBody,
        TooManyRegisters,
        InvalidJumpTarget,
        JumpIntoInstructionInterior,
        JumpIntoExceptionHandler,
        FallthroughIntoExceptionHandler,
        BadLastInstruction,
        InvalidTryBlock,
        InvalidCatchBlock,
    ],
    Resolution => [
        CannotResolveClassId,
        CannotResolveMethodId,
        CannotResolveFieldId,
        CacheMissForClassAtOffset,
        CacheMissForMethodAtOffset,
        CacheMissForFieldAtOffset,
    ],
    TypeSoundness => [
        UndefinedRegister,
        BadRegisterType,
        BadAccumulatorType,
        BadArrayElementType,
        ConflictingRegister,
        BadCallTooFewParameters,
        BadCallIncompatibleParameter,
        BadCallWrongRegister,
        BadCallWrongParameter,
        BadCallFormalIsBot,
        BadCallStaticMethodAsVirtual,
        BadCallStaticallyAbstractMethod,
        AccumulatorPositionIsOutOfRange,
        InitobjCallsNotConstructor,
        TooFewArrayConstructorArgs,
        ExpectedStaticOrInstanceField,
        ExpectedVolatileField,
        ExpectedInstanceField,
        InconsistentRegisterAndFieldTypes,
        UnexpectedFieldType,
        BadFieldValueType,
        BadReturnInstructionType,
        BadAccumulatorReturnValueType,
        NonObjectAccumulatorType,
        BadLdaType,
        BadNewObjectType,
        BadNewArrayType,
        UnreachableCode,
    ],
    DeadPath => [
        AlwaysNpe,
        AlwaysNpeAccumulator,
        AccumulatorAlwaysNull,
        ImpossibleCheckCast,
        ImpossibleArrayCheckCast,
        ImpossibleIsInstance,
        ImpossibleArrayIsInstance,
    ],
    Redundancy => [
        RedundantCheckCast,
        RedundantIsInstance,
    ],
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single reported finding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// What was found.
    pub code: DiagnosticCode,
    /// Byte offset of the offending instruction, if the finding is tied to one.
    pub pc: Option<u32>,
    /// Status this finding contributed after configuration was applied.
    pub status: VerificationStatus,
    /// Human-readable detail.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pc {
            Some(pc) => write!(f, "[{}] pc={pc} {}: {}", self.status, self.code, self.message),
            None => write!(f, "[{}] {}: {}", self.status, self.code, self.message),
        }
    }
}
