// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks for the verifier.
//!
//! Tracing is optional and is designed to be `no_std` friendly.
//! The interpreter only emits events requested by a [`TraceMask`].
//!
//! To enable tracing, pass a [`VerifierTrace`] to
//! [`verify_method_traced`](crate::job::verify_method_traced).

use crate::bytecode::DecodedInstr;
use crate::diagnostics::Diagnostic;
use crate::exec_context::EntryKind;
use crate::program::MethodId;
use crate::reg_context::RegContext;
use crate::status::VerificationStatus;

/// A set of trace events requested by a [`VerifierTrace`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceMask(u32);

impl core::ops::BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl TraceMask {
    /// No tracing.
    pub const NONE: Self = Self(0);
    /// Trace method boundaries.
    ///
    /// Enables:
    /// - [`VerifierTrace::method_start`]
    /// - [`VerifierTrace::method_end`]
    pub const METHOD: Self = Self(1 << 0);
    /// Trace each straight-line run.
    ///
    /// Enables:
    /// - [`VerifierTrace::entry_point`]
    pub const ENTRY: Self = Self(1 << 1);
    /// Trace each interpreted instruction.
    ///
    /// Enables:
    /// - [`VerifierTrace::instr`]
    pub const INSTR: Self = Self(1 << 2);
    /// Trace reported diagnostics.
    ///
    /// Enables:
    /// - [`VerifierTrace::diagnostic`]
    pub const DIAGNOSTIC: Self = Self(1 << 3);
    /// Trace configured breakpoints.
    ///
    /// Enables:
    /// - [`VerifierTrace::breakpoint`]
    pub const BREAKPOINT: Self = Self(1 << 4);

    /// Returns `true` if this mask includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// A sink that observes the abstract interpreter.
pub trait VerifierTrace {
    /// Returns the set of events the sink wants.
    fn mask(&self) -> TraceMask {
        TraceMask::NONE
    }

    /// Called before the first phase of a method runs.
    ///
    /// Called only if `mask()` includes [`TraceMask::METHOD`].
    fn method_start(&mut self, _method: MethodId, _name: &str) {}

    /// Called when the interpreter starts a straight-line run.
    ///
    /// Called only if `mask()` includes [`TraceMask::ENTRY`].
    ///
    /// - `pc`: entry address
    /// - `kind`: why the run starts here
    /// - `ctx`: register context loaded from the checkpoint
    fn entry_point(&mut self, _pc: u32, _kind: EntryKind, _ctx: &RegContext) {}

    /// Called before each instruction is interpreted.
    ///
    /// Called only if `mask()` includes [`TraceMask::INSTR`].
    fn instr(&mut self, _instr: &DecodedInstr, _ctx: &RegContext) {}

    /// Called for every reported (non-hidden) diagnostic.
    ///
    /// Called only if `mask()` includes [`TraceMask::DIAGNOSTIC`].
    fn diagnostic(&mut self, _diagnostic: &Diagnostic) {}

    /// Called when the interpreter reaches a configured breakpoint in debug mode.
    ///
    /// Called only if `mask()` includes [`TraceMask::BREAKPOINT`].
    fn breakpoint(&mut self, _pc: u32, _ctx: &RegContext) {}

    /// Called once the method's status is known.
    ///
    /// Called only if `mask()` includes [`TraceMask::METHOD`].
    fn method_end(&mut self, _method: MethodId, _status: VerificationStatus) {}
}
