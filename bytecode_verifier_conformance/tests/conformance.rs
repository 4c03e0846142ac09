// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use std::sync::Arc;
use std::thread;

use bytecode_verifier::analysis::cflow::CflowMethodInfo;
use bytecode_verifier::asm::{Asm, ProgramBuilder};
use bytecode_verifier::bytecode::{Reg, encode_instructions};
use bytecode_verifier::config::{Severity, VerifierConfig};
use bytecode_verifier::diagnostics::DiagnosticCode as D;
use bytecode_verifier::exec_context::{EntryKind, ExecContext, NextEntry};
use bytecode_verifier::job::{VerifyReport, verify_method};
use bytecode_verifier::opcode::Opcode;
use bytecode_verifier::program::{
    CatchBlock, ClassId, MethodFlags, MethodId, Program, SourceLang, TryBlock, TypeDesc,
};
use bytecode_verifier::reg_context::{Atv, RegContext};
use bytecode_verifier::service::{Status, VerificationMode, VerifierService};
use bytecode_verifier::status::VerificationStatus;
use bytecode_verifier::type_system::TypeSystem;
use bytecode_verifier::types::{Builtin, Type};

fn r(name: &str) -> TypeDesc {
    TypeDesc::Ref(name.into())
}

fn static_method(
    pb: &mut ProgramBuilder,
    name: &str,
    ret: TypeDesc,
    num_vregs: u16,
    a: Asm,
) -> MethodId {
    let main = match pb.class_id("Main") {
        Some(c) => c,
        None => pb.class("Main").build(),
    };
    pb.method(main, name)
        .flags(MethodFlags::STATIC)
        .ret(ret)
        .code(num_vregs, a.finish().unwrap())
        .declare()
}

fn verify(pb: ProgramBuilder, m: MethodId, config: &VerifierConfig) -> VerifyReport {
    verify_method(&Arc::new(pb.build()), m, config)
}

fn codes(r: &VerifyReport) -> Vec<D> {
    r.diagnostics.iter().map(|d| d.code).collect()
}

/// `Point`, `Point3 : Point`, and `Line`, all direct or indirect subclasses of `Object`.
fn shapes(pb: &mut ProgramBuilder) -> (ClassId, ClassId, ClassId) {
    let point = pb.class("Point").build();
    let point3 = pb.class("Point3").extends(point).build();
    let line = pb.class("Line").build();
    (point, point3, line)
}

#[test]
fn integer_constant_return_verifies() {
    let mut pb = ProgramBuilder::new();
    let mut a = Asm::new();
    a.ldai(10).op(Opcode::Return);
    let m = static_method(&mut pb, "ten", TypeDesc::I32, 0, a);
    let r = verify(pb, m, &VerifierConfig::default());
    assert_eq!(r.status, VerificationStatus::Ok);
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
}

#[test]
fn float_constant_returned_as_integer_never_passes() {
    let build = || {
        let mut pb = ProgramBuilder::new();
        let mut a = Asm::new();
        a.fldai(10.0).op(Opcode::Return);
        let m = static_method(&mut pb, "ten", TypeDesc::I32, 0, a);
        (pb, m)
    };

    let (pb, m) = build();
    let r = verify(pb, m, &VerifierConfig::default());
    assert_eq!(r.status, VerificationStatus::Warning);
    assert_eq!(codes(&r), [D::BadAccumulatorReturnValueType]);

    let (pb, m) = build();
    let strict = VerifierConfig::default()
        .with_severity(D::BadAccumulatorReturnValueType, Severity::Error);
    let r = verify(pb, m, &strict);
    assert_eq!(r.status, VerificationStatus::Error);
    assert!(!r.is_ok());

    let (pb, m) = build();
    let hidden = VerifierConfig::default()
        .with_severity(D::BadAccumulatorReturnValueType, Severity::Hidden);
    let r = verify(pb, m, &hidden);
    assert_eq!(r.status, VerificationStatus::Warning);
    assert!(r.diagnostics.is_empty());
}

#[test]
fn checkcast_of_null_is_informational() {
    let mut pb = ProgramBuilder::new();
    shapes(&mut pb);
    let point = pb.class_ref("Point");
    let mut a = Asm::new();
    a.op(Opcode::LdaNull)
        .id(Opcode::Checkcast, point)
        .op(Opcode::ReturnObj);
    let m = static_method(&mut pb, "cast", r("Point"), 0, a);
    let r = verify(pb, m, &VerifierConfig::default());
    assert_eq!(r.status, VerificationStatus::Ok);
    assert_eq!(codes(&r), [D::AccumulatorAlwaysNull]);
}

#[test]
fn virtual_call_of_static_method_fails() {
    let mut pb = ProgramBuilder::new();
    let util = pb.class("Util").build();
    pb.method(util, "twice")
        .flags(MethodFlags::STATIC)
        .arg(TypeDesc::I32)
        .ret(TypeDesc::I32)
        .declare();
    let twice = pb.method_ref("Util", "twice");
    let mut a = Asm::new();
    a.movi(0, 1)
        .call(Opcode::CallVirtShort, twice, &[0])
        .op(Opcode::Return);
    let m = static_method(&mut pb, "f", TypeDesc::I32, 1, a);
    let r = verify(pb, m, &VerifierConfig::default());
    assert_eq!(r.status, VerificationStatus::Error);
    assert_eq!(codes(&r), [D::BadCallStaticMethodAsVirtual]);
}

#[test]
fn incompatible_incoming_types_conflict_at_join() {
    let mut pb = ProgramBuilder::new();
    let mut a = Asm::new();
    let other = a.label();
    let join = a.label();
    a.movi(1, 0).v(Opcode::Lda, 1).jump(Opcode::Jeqz, other);
    a.movi(0, 1).jmp(join);
    a.place(other).unwrap();
    a.v(Opcode::MovNull, 0);
    a.place(join).unwrap();
    a.v(Opcode::Lda, 0).op(Opcode::Return);
    let m = static_method(&mut pb, "f", TypeDesc::I32, 2, a);
    let r = verify(pb, m, &VerifierConfig::default());
    let c = codes(&r);
    assert!(c.contains(&D::ConflictingRegister), "{c:?}");
    assert!(c.contains(&D::UndefinedRegister), "{c:?}");
    assert!(!c.contains(&D::BadAccumulatorReturnValueType), "{c:?}");
}

#[test]
fn try_block_without_reachable_sources_hides_its_handler() {
    let mut pb = ProgramBuilder::new();
    let mut a = Asm::new();
    let out = a.label();
    a.ldai(0).jmp(out);
    let start = a.pc();
    a.ldai(1).op(Opcode::Return);
    let end = a.pc();
    a.place(out).unwrap();
    a.op(Opcode::Return);
    let handler_pc = a.pc();
    a.fldai(1.0).op(Opcode::Return);
    let code = a.finish().unwrap();
    let code_size = u32::try_from(code.len()).unwrap() - handler_pc;

    let main = pb.class("Main").build();
    let m = pb
        .method(main, "f")
        .flags(MethodFlags::STATIC)
        .ret(TypeDesc::I32)
        .code(0, code)
        .try_block(TryBlock {
            start_pc: start,
            length: end - start,
            catches: vec![CatchBlock {
                type_id: None,
                handler_pc,
                code_size,
            }],
        })
        .declare();
    let r = verify(pb, m, &VerifierConfig::default());
    assert_eq!(r.status, VerificationStatus::Ok);
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
}

#[test]
fn handler_errors_can_be_relaxed() {
    let build = || {
        let mut pb = ProgramBuilder::new();
        let util = pb.class("Util").build();
        pb.method(util, "may_throw")
            .flags(MethodFlags::STATIC)
            .declare();
        let callee = pb.method_ref("Util", "may_throw");
        let mut a = Asm::new();
        let start = a.pc();
        a.call(Opcode::CallShort, callee, &[]);
        let end = a.pc();
        a.ldai(0).op(Opcode::Return);
        let handler_pc = a.pc();
        a.op(Opcode::ReturnVoid);
        let code = a.finish().unwrap();
        let code_size = u32::try_from(code.len()).unwrap() - handler_pc;
        let main = pb.class("Main").build();
        let m = pb
            .method(main, "f")
            .flags(MethodFlags::STATIC)
            .ret(TypeDesc::I32)
            .code(0, code)
            .try_block(TryBlock {
                start_pc: start,
                length: end - start,
                catches: vec![CatchBlock {
                    type_id: None,
                    handler_pc,
                    code_size,
                }],
            })
            .declare();
        (pb, m)
    };

    let (pb, m) = build();
    let r = verify(pb, m, &VerifierConfig::default());
    assert_eq!(r.status, VerificationStatus::Error);
    assert_eq!(codes(&r), [D::BadReturnInstructionType]);

    let (pb, m) = build();
    let mut relaxed = VerifierConfig::default();
    relaxed.allow.error_in_exception_handler = true;
    let r = verify(pb, m, &relaxed);
    assert_eq!(r.status, VerificationStatus::Warning);
}

fn all_types(pb: &mut ProgramBuilder) -> (TypeSystem, Vec<Type>) {
    let (point, point3, line) = shapes(pb);
    let program = Arc::new(std::mem::take(pb).build());
    let mut ts = TypeSystem::new(program, SourceLang::Core);
    for c in [point, point3, line] {
        ts.register_class(c);
    }
    let mut types: Vec<Type> = Builtin::ALL.iter().copied().map(Type::Builtin).collect();
    types.extend([
        ts.object_type(),
        ts.string_type(),
        ts.throwable_type(),
        Type::Class(point),
        Type::Class(point3),
        Type::Class(line),
    ]);
    (ts, types)
}

#[test]
fn subtyping_is_reflexive_and_transitive() {
    let (mut ts, types) = all_types(&mut ProgramBuilder::new());
    for &a in &types {
        assert!(ts.is_subtype(a, a), "{}", ts.type_name(a));
    }
    for &a in &types {
        for &b in &types {
            if !ts.is_subtype(a, b) {
                continue;
            }
            for &c in &types {
                if ts.is_subtype(b, c) {
                    assert!(
                        ts.is_subtype(a, c),
                        "{} <: {} <: {}",
                        ts.type_name(a),
                        ts.type_name(b),
                        ts.type_name(c)
                    );
                }
            }
        }
    }
}

#[test]
fn register_join_is_an_upper_bound() {
    let (mut ts, types) = all_types(&mut ProgramBuilder::new());
    let v0 = Reg::V(0);
    for &a in &types {
        let mut ctx_a = RegContext::new(1);
        ctx_a.set(v0, Atv::new(a, None));

        let mut same = ctx_a.clone();
        same.union_with(&ctx_a, &mut ts);
        assert_eq!(same, ctx_a, "{}", ts.type_name(a));

        for &b in &types {
            let mut ctx_b = RegContext::new(1);
            ctx_b.set(v0, Atv::new(b, None));
            let mut joined = ctx_a.clone();
            joined.union_with(&ctx_b, &mut ts);
            if joined.is_conflicting(v0) {
                continue;
            }
            let Some(j) = joined.get(v0).map(|v| v.ty) else {
                continue;
            };
            assert!(
                ts.is_subtype(a, j) && ts.is_subtype(b, j),
                "join({}, {}) = {}",
                ts.type_name(a),
                ts.type_name(b),
                ts.type_name(j)
            );
        }
    }
}

#[test]
fn unrelated_classes_join_to_common_superclass() {
    let mut pb = ProgramBuilder::new();
    let (point, point3, line) = shapes(&mut pb);
    let mut ts = TypeSystem::new(Arc::new(pb.build()), SourceLang::Core);
    assert_eq!(
        ts.join(Type::Class(point3), Type::Class(point)),
        Type::Class(point)
    );
    let object = ts.object_type();
    assert_eq!(ts.join(Type::Class(point3), Type::Class(line)), object);
    assert_eq!(ts.join(Type::NULL_REF, Type::Class(line)), Type::Class(line));
}

#[test]
fn stored_contexts_reach_a_fixpoint() {
    let mut pb = ProgramBuilder::new();
    let (point, point3, line) = shapes(&mut pb);
    let mut ts = TypeSystem::new(Arc::new(pb.build()), SourceLang::Core);
    let v0 = Reg::V(0);
    let mut exec = ExecContext::new(16, 1);
    exec.set_check_point(8);

    let incoming = [point3, line, point, point3];
    for (from, class) in (0_u32..).zip(incoming) {
        exec.current_mut().set(v0, Atv::new(Type::Class(class), None));
        exec.process_jump(from, 8, EntryKind::Jump, &mut ts);
    }
    let Some(stored) = exec.reg_context_at(8).cloned() else {
        panic!("no context stored at the jump target");
    };

    for class in incoming {
        let mut flow = RegContext::new(1);
        flow.set(v0, Atv::new(Type::Class(class), None));
        let out = exec.store_reg_context_for_addr(8, &flow, &mut ts);
        assert!(!out.changed);
        assert!(out.conflicting.is_empty());
    }
    assert_eq!(exec.reg_context_at(8), Some(&stored));

    // A revisited jump whose target did not change is not queued again.
    while let NextEntry::Ready { .. } = exec.get_entry_point_for_checking() {}
    exec.set_current(stored);
    exec.process_jump(0, 8, EntryKind::Jump, &mut ts);
    assert_eq!(exec.get_entry_point_for_checking(), NextEntry::AllDone);
}

#[test]
fn loops_verify_to_a_fixpoint() {
    let mut pb = ProgramBuilder::new();
    let mut a = Asm::new();
    let head = a.label();
    let done = a.label();
    a.movi(0, 0).movi(1, 10);
    a.place(head).unwrap();
    a.v(Opcode::Lda, 1).jump(Opcode::Jeqz, done);
    a.inci(0, 2).inci(1, -1).jmp(head);
    a.place(done).unwrap();
    a.v(Opcode::Lda, 0).op(Opcode::Return);
    let m = static_method(&mut pb, "sum", TypeDesc::I32, 2, a);
    let r = verify(pb, m, &VerifierConfig::default());
    assert_eq!(r.status, VerificationStatus::Ok, "{:?}", r.diagnostics);
}

#[test]
fn reencoded_instruction_stream_builds_the_same_control_flow() {
    let mut pb = ProgramBuilder::new();
    pb.class("Util").build();
    let callee = pb.method_ref("Util", "g");
    let mut a = Asm::new();
    let head = a.label();
    let out = a.label();
    a.movi(0, 3);
    a.place(head).unwrap();
    let start = a.pc();
    a.call(Opcode::CallShort, callee, &[0]);
    a.v(Opcode::Lda, 0).jump(Opcode::Jeqz, out);
    let end = a.pc();
    a.inci(0, -1).jmp(head);
    a.place(out).unwrap();
    a.op(Opcode::ReturnVoid);
    let handler_pc = a.pc();
    a.op(Opcode::ReturnVoid);
    let code = a.finish().unwrap();
    let blocks = [TryBlock {
        start_pc: start,
        length: end - start,
        catches: vec![CatchBlock {
            type_id: None,
            handler_pc,
            code_size: 1,
        }],
    }];

    let first = CflowMethodInfo::build(&code, &blocks).unwrap();
    let bytes = encode_instructions(first.instructions());
    assert_eq!(bytes, code);
    let second = CflowMethodInfo::build(&bytes, &blocks).unwrap();
    for pc in 0..first.code_len() {
        assert_eq!(first.flags(pc), second.flags(pc), "pc={pc}");
    }
    assert_eq!(first.handler_starts(), second.handler_starts());
}

fn many_methods(count: usize) -> (Arc<Program>, Vec<(MethodId, bool)>) {
    let mut pb = ProgramBuilder::new();
    let mut methods = Vec::new();
    for i in 0..count {
        let mut a = Asm::new();
        let ok = i % 3 != 0;
        if ok {
            a.ldai(i32::try_from(i).unwrap()).op(Opcode::Return);
        } else {
            a.op(Opcode::ReturnVoid);
        }
        let m = static_method(&mut pb, &format!("m{i}"), TypeDesc::I32, 0, a);
        methods.push((m, ok));
    }
    (Arc::new(pb.build()), methods)
}

#[test]
fn service_is_shared_between_threads() {
    let (program, methods) = many_methods(48);
    let config = VerifierConfig {
        processors_per_lang: 2,
        ..VerifierConfig::default()
    };
    let service = Arc::new(VerifierService::new(program, config));
    let methods = Arc::new(methods);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let service = Arc::clone(&service);
            let methods = Arc::clone(&methods);
            thread::spawn(move || {
                for (i, &(m, ok)) in methods.iter().enumerate() {
                    if (i + t) % 2 == 0 {
                        continue;
                    }
                    let expected = if ok { Status::Ok } else { Status::Failed };
                    assert_eq!(service.verify(m, VerificationMode::OnDemand), expected);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(service.processors(SourceLang::Core) <= 2);
    for &(m, ok) in methods.iter() {
        let expected = if ok { Status::Ok } else { Status::Failed };
        assert_eq!(service.verify(m, VerificationMode::OnDemand), expected);
    }
}

#[test]
fn configuration_loads_from_json() {
    let json = r#"{
        "severities": { "AlwaysNpe": "error", "RedundantCheckCast": "hidden" },
        "allow": { "wrong_subclassing_in_method_args": true },
        "debug": { "skip_methods": ["Main::f"] },
        "max_regs_per_method": 256
    }"#;
    let config: VerifierConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.severity(D::AlwaysNpe), Some(Severity::Error));
    assert!(config.is_hidden(D::RedundantCheckCast));
    assert!(config.allow.wrong_subclassing_in_method_args);
    assert!(!config.allow.error_in_exception_handler);
    assert!(config.skips_method("Main::f"));
    assert_eq!(config.max_regs_per_method, 256);
    assert_eq!(
        config.processors_per_lang,
        VerifierConfig::default().processors_per_lang
    );

    let back: VerifierConfig =
        serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
    assert_eq!(back, config);
    assert_eq!(
        serde_json::to_string(&VerificationStatus::Warning).unwrap(),
        "\"warning\""
    );
}
