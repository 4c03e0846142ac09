// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `bytecode_verifier`: an abstract-interpretation verifier for an accumulator-based register
//! bytecode.
//!
//! Before a method may run it must be proven type-safe and control-flow-safe without executing
//! it. The verifier reconstructs control flow ([`analysis::cflow`]), interprets every reachable
//! instruction over an abstract register file ([`reg_context`]) until every join point reaches a
//! fixpoint ([`exec_context`]), and checks each instruction against a subtyping lattice
//! ([`type_system`]).
//!
//! Use [`job::verify_method`] to verify one method and get a full report, or share a
//! [`service::VerifierService`] between threads to gate execution.
//!
//! ## Example
//!
//! ```
//! extern crate alloc;
//!
//! use alloc::sync::Arc;
//!
//! use bytecode_verifier::asm::{Asm, ProgramBuilder};
//! use bytecode_verifier::config::VerifierConfig;
//! use bytecode_verifier::diagnostics::DiagnosticCode;
//! use bytecode_verifier::job::verify_method;
//! use bytecode_verifier::opcode::Opcode;
//! use bytecode_verifier::program::{MethodFlags, TypeDesc};
//! use bytecode_verifier::status::VerificationStatus;
//!
//! let mut pb = ProgramBuilder::new();
//! let main = pb.class("Main").build();
//!
//! let mut a = Asm::new();
//! a.fldai(10.0).op(Opcode::Return);
//! let f = pb
//!     .method(main, "f")
//!     .flags(MethodFlags::STATIC)
//!     .ret(TypeDesc::I32)
//!     .code(0, a.finish()?)
//!     .declare();
//!
//! let program = Arc::new(pb.build());
//! let report = verify_method(&program, f, &VerifierConfig::default());
//! assert_eq!(report.status, VerificationStatus::Warning);
//! assert_eq!(
//!     report.diagnostics[0].code,
//!     DiagnosticCode::BadAccumulatorReturnValueType
//! );
//! # Ok::<(), bytecode_verifier::asm::UnresolvedLabel>(())
//! ```

#![no_std]

extern crate alloc;

pub(crate) mod absint;
pub mod analysis;
pub mod asm;
pub mod bytecode;
pub(crate) mod compat;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod exec_context;
pub mod format;
pub mod job;
pub mod opcode;
pub mod program;
pub mod reg_context;
pub mod service;
pub mod status;
pub mod trace;
pub mod type_system;
pub mod types;
pub(crate) mod verify;
