// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-method verification state.
//!
//! A [`ResolutionTable`] is built once per method before any type analysis runs and is only read
//! afterwards. A [`VerificationContext`] bundles it with the control-flow facts, the fixpoint
//! state, the processor's [`TypeSystem`], and the diagnostics sink for the duration of one method.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::analysis::cflow::CflowMethodInfo;
use crate::config::VerifierConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::exec_context::ExecContext;
use crate::program::{ClassId, FieldId, MethodId, Program};
use crate::status::VerificationStatus;
use crate::trace::{TraceMask, VerifierTrace};
use crate::type_system::TypeSystem;
use crate::types::Type;

/// Outcome of looking up an operand in a [`ResolutionTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The operand resolved to `T`.
    Resolved(T),
    /// The operand was looked up but names nothing loaded.
    Unresolved,
    /// No operand of this kind was recorded at the offset.
    NotCached,
}

impl<T> From<Option<&Option<T>>> for Lookup<T>
where
    T: Copy,
{
    fn from(v: Option<&Option<T>>) -> Self {
        match v {
            Some(Some(t)) => Self::Resolved(*t),
            Some(None) => Self::Unresolved,
            None => Self::NotCached,
        }
    }
}

/// Operands of one method resolved once, keyed by instruction offset.
#[derive(Clone, Debug, Default)]
pub struct ResolutionTable {
    classes: HashMap<u32, Option<ClassId>>,
    methods: HashMap<u32, Option<MethodId>>,
    fields: HashMap<u32, Option<FieldId>>,
}

impl ResolutionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the class operand at `pc`.
    pub fn insert_class(&mut self, pc: u32, class: Option<ClassId>) {
        self.classes.insert(pc, class);
    }

    /// Records the method operand at `pc`.
    pub fn insert_method(&mut self, pc: u32, method: Option<MethodId>) {
        self.methods.insert(pc, method);
    }

    /// Records the field operand at `pc`.
    pub fn insert_field(&mut self, pc: u32, field: Option<FieldId>) {
        self.fields.insert(pc, field);
    }

    /// Class operand at `pc`. For `initobj` this is the constructed class.
    #[must_use]
    pub fn class_at(&self, pc: u32) -> Lookup<ClassId> {
        self.classes.get(&pc).into()
    }

    /// Method operand at `pc`.
    #[must_use]
    pub fn method_at(&self, pc: u32) -> Lookup<MethodId> {
        self.methods.get(&pc).into()
    }

    /// Field operand at `pc`.
    #[must_use]
    pub fn field_at(&self, pc: u32) -> Lookup<FieldId> {
        self.fields.get(&pc).into()
    }

    /// Every resolved class, method, and field, for registration with a [`TypeSystem`].
    pub fn resolved(
        &self,
    ) -> (
        impl Iterator<Item = ClassId> + '_,
        impl Iterator<Item = MethodId> + '_,
        impl Iterator<Item = FieldId> + '_,
    ) {
        (
            self.classes.values().flatten().copied(),
            self.methods.values().flatten().copied(),
            self.fields.values().flatten().copied(),
        )
    }

    /// Number of recorded operands, resolved or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len() + self.methods.len() + self.fields.len()
    }

    /// Returns `true` if no operand was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the abstract interpreter needs while verifying one method.
pub struct VerificationContext<'a> {
    /// Program being verified.
    pub program: Arc<Program>,
    /// Method being verified.
    pub method: MethodId,
    /// `Class::method`, for logs and configuration lookups.
    pub method_name: String,
    /// Control-flow facts.
    pub cflow: &'a CflowMethodInfo,
    /// Operands resolved ahead of interpretation.
    pub resolved: &'a ResolutionTable,
    /// Type lattice of the verifying processor.
    pub ts: &'a mut TypeSystem,
    /// Verifier configuration.
    pub config: &'a VerifierConfig,
    /// Debug mode: honors call-check skips and breakpoints.
    pub debug: bool,
    /// Fixpoint state.
    pub exec: ExecContext,
    /// Declared return type; `None` for `void`.
    pub return_type: Option<Type>,
    /// Findings reported so far.
    pub diagnostics: Vec<Diagnostic>,
    /// Offsets of reference-array stores that need a runtime element check.
    pub array_store_checks: Vec<u32>,
    /// Breakpoint offsets (debug mode only).
    pub breakpoints: Vec<u32>,
    /// Status of the straight-line run in progress.
    pub run_status: VerificationStatus,
    /// Optional observer.
    pub trace: Option<&'a mut (dyn VerifierTrace + 'a)>,
}

impl core::fmt::Debug for VerificationContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VerificationContext")
            .field("method", &self.method_name)
            .field("debug", &self.debug)
            .field("diagnostics", &self.diagnostics.len())
            .field("run_status", &self.run_status)
            .finish_non_exhaustive()
    }
}

impl<'a> VerificationContext<'a> {
    /// Reports a finding at `pc` whose call site requires at least `at_least`.
    ///
    /// Returns the status after configuration was applied; the status of the run in progress is
    /// raised to it. Hidden codes are not recorded but their status still counts.
    pub fn report(
        &mut self,
        code: DiagnosticCode,
        pc: Option<u32>,
        at_least: VerificationStatus,
        message: String,
    ) -> VerificationStatus {
        let status = self.config.status_for(code, at_least);
        self.run_status.raise(status);
        if self.config.is_hidden(code) {
            return status;
        }
        let d = Diagnostic {
            code,
            pc,
            status,
            message,
        };
        match status {
            VerificationStatus::Ok => log::debug!("{}: {d}", self.method_name),
            VerificationStatus::Warning | VerificationStatus::Error => {
                log::warn!("{}: {d}", self.method_name);
            }
        }
        if let Some(t) = self.trace.as_deref_mut()
            && t.mask().contains(TraceMask::DIAGNOSTIC)
        {
            t.diagnostic(&d);
        }
        self.diagnostics.push(d);
        status
    }

    /// Human-readable name of `t`.
    #[must_use]
    pub fn type_name(&self, t: Type) -> String {
        self.ts.type_name(t)
    }

    /// Returns `true` if the trace sink wants events in `mask`.
    #[must_use]
    pub fn tracing(&self, mask: TraceMask) -> bool {
        self.trace.as_deref().is_some_and(|t| t.mask().contains(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ProgramBuilder;
    use crate::config::Severity;
    use crate::program::SourceLang;
    use alloc::string::ToString;
    use alloc::vec;

    #[derive(Default)]
    struct Collect(Vec<DiagnosticCode>);

    impl VerifierTrace for Collect {
        fn mask(&self) -> TraceMask {
            TraceMask::DIAGNOSTIC
        }

        fn diagnostic(&mut self, d: &Diagnostic) {
            self.0.push(d.code);
        }
    }

    #[test]
    fn lookups_distinguish_missing_from_unresolved() {
        let mut t = ResolutionTable::new();
        t.insert_class(4, Some(ClassId(2)));
        t.insert_class(8, None);
        assert_eq!(t.class_at(4), Lookup::Resolved(ClassId(2)));
        assert_eq!(t.class_at(8), Lookup::Unresolved);
        assert_eq!(t.class_at(12), Lookup::NotCached);
        assert_eq!(t.method_at(4), Lookup::NotCached);
        assert_eq!(t.resolved().0.collect::<Vec<_>>(), [ClassId(2)]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn report_applies_configuration() {
        let program = Arc::new(ProgramBuilder::new().build());
        let mut ts = TypeSystem::new(program.clone(), SourceLang::Core);
        let cflow = CflowMethodInfo::build(&[crate::opcode::Opcode::ReturnVoid.byte()], &[])
            .unwrap();
        let resolved = ResolutionTable::new();
        let config = VerifierConfig::default()
            .with_severity(DiagnosticCode::AlwaysNpe, Severity::Hidden)
            .with_severity(DiagnosticCode::RedundantCheckCast, Severity::Error);
        let mut sink = Collect::default();
        let mut ctx = VerificationContext {
            program,
            method: MethodId(0),
            method_name: "A::f".to_string(),
            cflow: &cflow,
            resolved: &resolved,
            ts: &mut ts,
            config: &config,
            debug: false,
            exec: ExecContext::new(1, 0),
            return_type: None,
            diagnostics: vec![],
            array_store_checks: vec![],
            breakpoints: vec![],
            run_status: VerificationStatus::Ok,
            trace: Some(&mut sink),
        };
        let s = ctx.report(
            DiagnosticCode::AlwaysNpe,
            Some(0),
            VerificationStatus::Ok,
            "null array".to_string(),
        );
        assert_eq!(s, VerificationStatus::Ok);
        assert!(ctx.diagnostics.is_empty());

        let s = ctx.report(
            DiagnosticCode::RedundantCheckCast,
            Some(0),
            VerificationStatus::Ok,
            "cast".to_string(),
        );
        assert_eq!(s, VerificationStatus::Error);
        assert_eq!(ctx.run_status, VerificationStatus::Error);
        assert_eq!(ctx.diagnostics.len(), 1);
        drop(ctx);
        assert_eq!(sink.0, [DiagnosticCode::RedundantCheckCast]);
    }
}
