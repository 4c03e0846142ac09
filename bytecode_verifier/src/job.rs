// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Verification of a single method.
//!
//! A job runs four phases and stops at the first one that fails:
//!
//! 1. decode the body and resolve every class, method, and field operand once, into a
//!    [`ResolutionTable`] keyed by instruction offset;
//! 2. build and validate [`CflowMethodInfo`];
//! 3. register every resolved entity with the [`TypeSystem`];
//! 4. run the abstract interpreter to a fixpoint over the body and every reachable handler.
//!
//! Structural failures in phases 1 and 2 are always errors. The status of phase 4 is the maximum
//! over every check performed.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use crate::analysis::cflow::CflowMethodInfo;
use crate::bytecode::{DecodedInstr, Instr, decode_instructions};
use crate::config::VerifierConfig;
use crate::context::{ResolutionTable, VerificationContext};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::exec_context::ExecContext;
use crate::program::{MethodId, Program};
use crate::status::VerificationStatus;
use crate::trace::{TraceMask, VerifierTrace};
use crate::type_system::TypeSystem;
use crate::verify;

/// Outcome of verifying one method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyReport {
    /// Verified method.
    pub method: MethodId,
    /// Maximum status over every check performed.
    pub status: VerificationStatus,
    /// Findings, in the order they were reported.
    pub diagnostics: Vec<Diagnostic>,
    /// Offsets of reference-array stores that need a runtime element check.
    pub array_store_checks: Vec<u32>,
}

impl VerifyReport {
    fn new(method: MethodId) -> Self {
        Self {
            method,
            status: VerificationStatus::Ok,
            diagnostics: Vec::new(),
            array_store_checks: Vec::new(),
        }
    }

    /// Returns `true` unless the method must not be executed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.status.is_error()
    }

    /// Records a failure that ends the job before type analysis.
    fn fatal(
        &mut self,
        config: &VerifierConfig,
        name: &str,
        code: DiagnosticCode,
        pc: Option<u32>,
        message: String,
    ) {
        let status = config.status_for(code, VerificationStatus::Error);
        self.status.raise(status);
        let d = Diagnostic {
            code,
            pc,
            status,
            message,
        };
        log::warn!("{name}: {d}");
        if !config.is_hidden(code) {
            self.diagnostics.push(d);
        }
    }
}

/// Resolves the class, method, and field operands of `instrs`.
///
/// `initobj` records both the constructed class and the constructor; the class is resolved even
/// when the constructor is not, which is how array constructors are referenced.
#[must_use]
pub fn resolve_operands(program: &Program, instrs: &[DecodedInstr]) -> ResolutionTable {
    let mut table = ResolutionTable::new();
    for di in instrs {
        let pc = di.offset;
        match di.instr {
            Instr::NewObject { id, .. }
            | Instr::NewArray { id, .. }
            | Instr::CheckCast { id }
            | Instr::IsInstance { id }
            | Instr::LdaType { id } => {
                let class = program.resolve_class(id);
                if class.is_none() {
                    log::debug!("pc={pc}: class @{} is not loaded", id.0);
                }
                table.insert_class(pc, class);
            }
            Instr::InitObject { id, .. } => {
                table.insert_class(pc, program.resolve_owner(id));
                table.insert_method(pc, program.resolve_method(id));
            }
            Instr::Call { id, .. } => {
                let method = program.resolve_method(id);
                if method.is_none() {
                    log::debug!("pc={pc}: method @{} is not loaded", id.0);
                }
                table.insert_method(pc, method);
            }
            Instr::LoadField { id, .. } | Instr::StoreField { id, .. } => {
                let field = program.resolve_field(id);
                if field.is_none() {
                    log::debug!("pc={pc}: field @{} is not loaded", id.0);
                }
                table.insert_field(pc, field);
            }
            _ => {}
        }
    }
    table
}

/// Verifies `method` with a fresh [`TypeSystem`].
#[must_use]
pub fn verify_method(
    program: &Arc<Program>,
    method: MethodId,
    config: &VerifierConfig,
) -> VerifyReport {
    let mut ts = new_type_system(program, method);
    run(&mut ts, method, config, false, None)
}

/// Like [`verify_method`], reporting progress to `trace`.
///
/// Tracing implies debug mode: configured breakpoints and call-check skips apply.
pub fn verify_method_traced(
    program: &Arc<Program>,
    method: MethodId,
    config: &VerifierConfig,
    trace: &mut dyn VerifierTrace,
) -> VerifyReport {
    let mut ts = new_type_system(program, method);
    run(&mut ts, method, config, true, Some(trace))
}

fn new_type_system(program: &Arc<Program>, method: MethodId) -> TypeSystem {
    let lang = program.method(method).map(|m| m.lang).unwrap_or_default();
    TypeSystem::new(program.clone(), lang)
}

/// Runs every phase for `method` on a processor's type system.
pub(crate) fn run(
    ts: &mut TypeSystem,
    method: MethodId,
    config: &VerifierConfig,
    debug: bool,
    mut trace: Option<&mut dyn VerifierTrace>,
) -> VerifyReport {
    let program = ts.program().clone();
    let name = program.method_full_name(method);
    if let Some(t) = trace.as_deref_mut()
        && t.mask().contains(TraceMask::METHOD)
    {
        t.method_start(method, &name);
    }
    log::debug!("verifying {name}");

    let report = run_phases(
        ts,
        &program,
        method,
        &name,
        config,
        debug,
        match &mut trace {
            Some(t) => Some(&mut **t as &mut dyn VerifierTrace),
            None => None,
        },
    );

    log::debug!("{name}: {}", report.status);
    if let Some(t) = trace
        && t.mask().contains(TraceMask::METHOD)
    {
        t.method_end(method, report.status);
    }
    report
}

#[allow(
    clippy::too_many_arguments,
    reason = "internal helper threading the job state"
)]
fn run_phases(
    ts: &mut TypeSystem,
    program: &Arc<Program>,
    method: MethodId,
    name: &str,
    config: &VerifierConfig,
    debug: bool,
    trace: Option<&mut dyn VerifierTrace>,
) -> VerifyReport {
    let mut report = VerifyReport::new(method);
    let Some(def) = program.method(method) else {
        report.fatal(
            config,
            name,
            DiagnosticCode::CannotResolveMethodId,
            None,
            format!("no method with id {}", method.0),
        );
        return report;
    };
    let Some(code) = &def.code else {
        log::debug!("{name}: no code to verify");
        return report;
    };

    let num_regs = usize::from(code.num_vregs) + def.args.len() + usize::from(!def.is_static());
    if !u32::try_from(num_regs).is_ok_and(|n| n <= config.max_regs_per_method) {
        report.fatal(
            config,
            name,
            DiagnosticCode::TooManyRegisters,
            None,
            format!(
                "{num_regs} registers, at most {} allowed",
                config.max_regs_per_method
            ),
        );
        return report;
    }

    // Phase 1: operands.
    let instrs = match decode_instructions(&code.bytecode) {
        Ok(instrs) => instrs,
        Err(e) => {
            report.fatal(
                config,
                name,
                DiagnosticCode::BytecodeDecodeFailure,
                None,
                e.to_string(),
            );
            return report;
        }
    };
    let resolved = resolve_operands(program, &instrs);
    log::trace!("{name}: {} operands resolved", resolved.len());

    // Phase 2: control flow.
    let cflow =
        match CflowMethodInfo::from_decoded(instrs, code.bytecode.len(), &code.try_blocks) {
            Ok(cflow) => cflow,
            Err(e) => {
                report.fatal(config, name, e.code(), e.pc(), e.to_string());
                return report;
            }
        };

    // Phase 3: type system.
    ts.register_method(method);
    let (classes, methods, fields) = resolved.resolved();
    for c in classes {
        ts.register_class(c);
    }
    for m in methods {
        ts.register_method(m);
    }
    for f in fields {
        ts.register_field(f);
    }

    // Phase 4: abstract interpretation.
    let breakpoints = if debug {
        config.breakpoints_for(name).collect()
    } else {
        vec![]
    };
    let mut ctx = VerificationContext {
        program: program.clone(),
        method,
        method_name: name.into(),
        cflow: &cflow,
        resolved: &resolved,
        ts,
        config,
        debug,
        exec: ExecContext::new(code.bytecode.len(), num_regs),
        return_type: None,
        diagnostics: Vec::new(),
        array_store_checks: Vec::new(),
        breakpoints,
        run_status: VerificationStatus::Ok,
        trace: match trace {
            Some(t) => Some(t as &mut dyn VerifierTrace),
            None => None,
        },
    };
    verify::prepare(&mut ctx, code.num_vregs, &code.try_blocks);
    let status = verify::verify_method_body(&mut ctx, &code.try_blocks);

    report.status.raise(status);
    report.diagnostics = ctx.diagnostics;
    report.array_store_checks = ctx.array_store_checks;
    report.array_store_checks.sort_unstable();
    report
}
