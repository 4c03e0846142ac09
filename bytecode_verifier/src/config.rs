// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Verifier configuration.
//!
//! Configuration never changes what the verifier computes about types; it only clamps or
//! promotes the [`VerificationStatus`] a finding contributes, and relaxes a few checks that some
//! producers are known to violate.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::diagnostics::DiagnosticCode;
use crate::status::VerificationStatus;

/// Configured severity for a [`DiagnosticCode`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    /// Not reported; the call site's minimum status still applies.
    Hidden,
    /// Reported, and contributes at least [`VerificationStatus::Warning`].
    Warning,
    /// Reported, and contributes [`VerificationStatus::Error`].
    Error,
}

impl Severity {
    /// Returns the minimum status this severity forces.
    #[must_use]
    pub const fn status(self) -> VerificationStatus {
        match self {
            Self::Hidden => VerificationStatus::Ok,
            Self::Warning => VerificationStatus::Warning,
            Self::Error => VerificationStatus::Error,
        }
    }
}

/// Checks that may be relaxed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Relaxations {
    /// Accept reference arguments that are not subtypes of the formal parameter type.
    pub wrong_subclassing_in_method_args: bool,
    /// Downgrade errors found while verifying exception handlers to warnings.
    pub error_in_exception_handler: bool,
}

/// A debug-mode breakpoint: logs the register context when the interpreter reaches `offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Breakpoint {
    /// Full method name (`Class::method`).
    pub method: String,
    /// Bytecode offset within the method.
    pub offset: u32,
}

/// Per-method knobs consulted only in
/// [`VerificationMode::Debug`](crate::service::VerificationMode::Debug).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DebugConfig {
    /// Methods (by full name) that are reported as verified without being checked.
    pub skip_methods: Vec<String>,
    /// Callees (by full name) whose call sites skip argument checking.
    pub skip_call_checks: Vec<String>,
    /// Breakpoints.
    pub breakpoints: Vec<Breakpoint>,
}

/// Verifier configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VerifierConfig {
    /// Severity overrides, keyed by diagnostic code.
    pub severities: BTreeMap<DiagnosticCode, Severity>,
    /// Relaxed checks.
    pub allow: Relaxations,
    /// Debug-mode knobs.
    pub debug: DebugConfig,
    /// Maximum number of virtual registers (including arguments) per method.
    pub max_regs_per_method: u32,
    /// Number of verification processors kept per source language.
    pub processors_per_lang: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            severities: BTreeMap::new(),
            allow: Relaxations::default(),
            debug: DebugConfig::default(),
            max_regs_per_method: 65_535,
            processors_per_lang: 4,
        }
    }
}

impl VerifierConfig {
    /// Overrides the severity of `code`.
    #[must_use]
    pub fn with_severity(mut self, code: DiagnosticCode, severity: Severity) -> Self {
        self.severities.insert(code, severity);
        self
    }

    /// Returns the configured severity of `code`, if any.
    #[must_use]
    pub fn severity(&self, code: DiagnosticCode) -> Option<Severity> {
        self.severities.get(&code).copied()
    }

    /// Returns `true` if findings with `code` are not reported.
    #[must_use]
    pub fn is_hidden(&self, code: DiagnosticCode) -> bool {
        self.severity(code) == Some(Severity::Hidden)
    }

    /// Returns the status a finding with `code` contributes when its call site requires at least
    /// `at_least`.
    #[must_use]
    pub fn status_for(&self, code: DiagnosticCode, at_least: VerificationStatus) -> VerificationStatus {
        let configured = self
            .severity(code)
            .map_or(VerificationStatus::Ok, Severity::status);
        at_least.max(configured)
    }

    /// Returns `true` if `method` is listed in [`DebugConfig::skip_methods`].
    #[must_use]
    pub fn skips_method(&self, method: &str) -> bool {
        self.debug.skip_methods.iter().any(|m| m == method)
    }

    /// Returns `true` if calls to `callee` skip argument checking.
    #[must_use]
    pub fn skips_call_checks(&self, callee: &str) -> bool {
        self.debug.skip_call_checks.iter().any(|m| m == callee)
    }

    /// Returns the breakpoint offsets configured for `method`.
    pub fn breakpoints_for<'a>(&'a self, method: &'a str) -> impl Iterator<Item = u32> + 'a {
        self.debug
            .breakpoints
            .iter()
            .filter(move |b| b.method == method)
            .map(|b| b.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_site_minimum_applies_without_override() {
        let cfg = VerifierConfig::default();
        assert_eq!(
            cfg.status_for(DiagnosticCode::BadRegisterType, VerificationStatus::Warning),
            VerificationStatus::Warning
        );
        assert_eq!(
            cfg.status_for(DiagnosticCode::AlwaysNpe, VerificationStatus::Ok),
            VerificationStatus::Ok
        );
    }

    #[test]
    fn severity_override_promotes_but_never_demotes() {
        let cfg = VerifierConfig::default()
            .with_severity(DiagnosticCode::BadRegisterType, Severity::Error)
            .with_severity(DiagnosticCode::ExpectedInstanceField, Severity::Hidden);
        assert_eq!(
            cfg.status_for(DiagnosticCode::BadRegisterType, VerificationStatus::Warning),
            VerificationStatus::Error
        );
        assert_eq!(
            cfg.status_for(DiagnosticCode::ExpectedInstanceField, VerificationStatus::Error),
            VerificationStatus::Error
        );
        assert!(cfg.is_hidden(DiagnosticCode::ExpectedInstanceField));
    }

    #[test]
    fn debug_lookups_match_full_names() {
        let mut cfg = VerifierConfig::default();
        cfg.debug.skip_methods.push("A::f".into());
        cfg.debug.breakpoints.push(Breakpoint {
            method: "A::g".into(),
            offset: 3,
        });
        assert!(cfg.skips_method("A::f"));
        assert!(!cfg.skips_method("A::g"));
        assert_eq!(cfg.breakpoints_for("A::g").collect::<Vec<_>>(), [3]);
    }
}
