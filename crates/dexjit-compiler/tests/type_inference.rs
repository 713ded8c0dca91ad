//! Type inference driven through the public API

use std::sync::Arc;

use dexjit_compiler::dex::{DexFile, DexFileSet, MethodReference};
use dexjit_compiler::mir::{BlockId, CompilationUnit, Mir, MirGraph, MirGraphBuilder, Opcode};
use dexjit_compiler::typing::InferencePhase;
use dexjit_compiler::{CompileError, JitConfig, JitEngine, OptimizationFlags, TypeInference};
use pretty_assertions::assert_eq;

fn method_builder(return_type: &str, params: &[&str], num_vregs: u32) -> MirGraphBuilder {
    let mut dex = DexFile::new("classes.dex");
    dex.add_method("LMain;", "work", return_type, params).unwrap();
    let mut files = DexFileSet::new();
    let dex_file = files.add(dex);
    let cu = CompilationUnit {
        method: MethodReference {
            dex_file,
            method_idx: 0,
        },
        is_static: true,
    };
    MirGraphBuilder::new(num_vregs, params.len() as u32, Arc::new(files), cu)
}

/// One block after the entry block holding `build`'s instructions
fn straight_line(
    return_type: &str,
    num_vregs: u32,
    build: impl FnOnce(&mut MirGraphBuilder, BlockId),
) -> MirGraph {
    let mut b = method_builder(return_type, &[], num_vregs);
    let body = b.add_block();
    b.set_fall_through(b.entry_block(), body);
    build(&mut b, body);
    b.build().unwrap()
}

#[test]
fn test_loop_counter_is_core() {
    let mut b = method_builder("V", &[], 1);
    let (start, head, body, done) = (b.add_block(), b.add_block(), b.add_block(), b.add_block());
    b.set_fall_through(b.entry_block(), start);
    b.set_fall_through(start, head);
    b.add_edge(head, body).add_edge(head, done);
    b.add_edge(body, head);

    let init = b.new_sreg(0);
    let phi = b.new_sreg(0);
    let next = b.new_sreg(0);
    b.push(start, Mir::new(Opcode::Const4).with_ssa(&[], &[init]));
    b.push(head, Mir::new(Opcode::Phi).with_ssa(&[init, next], &[phi]));
    b.push(head, Mir::new(Opcode::IfEqz).with_ssa(&[phi], &[]));
    b.push(body, Mir::new(Opcode::AddIntLit8).with_ssa(&[phi], &[next]));
    b.push(body, Mir::new(Opcode::Goto));
    b.push(done, Mir::new(Opcode::ReturnVoid));
    let mut graph = b.build().unwrap();

    let mut inference = TypeInference::new(&graph).unwrap();
    assert!(inference.converge(&graph, None).converged);
    let report = inference.finish(&mut graph);
    assert!(report.is_clean());

    for s_reg in [init, phi, next] {
        let loc = graph.reg_locations()[s_reg as usize];
        assert!(loc.defined && loc.core && !loc.fp && !loc.wide, "s{s_reg}: {loc:?}");
    }
}

#[test]
fn test_return_value_takes_method_return_type() {
    let mut graph = straight_line("F", 1, |b, body| {
        let value = b.new_sreg(0);
        b.push(body, Mir::new(Opcode::Const).with_ssa(&[], &[value]));
        b.push(body, Mir::new(Opcode::Return).with_ssa(&[value], &[]));
    });

    let mut inference = TypeInference::new(&graph).unwrap();
    inference.converge(&graph, None);
    inference.finish(&mut graph);
    let loc = graph.reg_locations()[1];
    assert!(loc.fp && !loc.core && !loc.wide);
}

#[test]
fn test_finish_is_repeatable() {
    let mut graph = straight_line("V", 3, |b, body| {
        let value = b.new_sreg(0);
        let (f, i) = (b.new_sreg(1), b.new_sreg(2));
        b.push(body, Mir::new(Opcode::Const4).with_ssa(&[], &[value]));
        b.push(body, Mir::new(Opcode::AddFloat).with_ssa(&[value, value], &[f]));
        b.push(body, Mir::new(Opcode::AddInt).with_ssa(&[value, value], &[i]));
        b.push(body, Mir::new(Opcode::ReturnVoid));
    });

    let mut inference = TypeInference::new(&graph).unwrap();
    inference.converge(&graph, None);
    let preview = inference.conflicts();
    let first = inference.finish(&mut graph);
    let locations = graph.reg_locations().to_vec();
    let second = inference.finish(&mut graph);

    assert_eq!(preview, first);
    assert_eq!(first, second);
    assert_eq!(graph.reg_locations(), locations.as_slice());
    assert_eq!(inference.phase(), InferencePhase::Finished);
}

#[test]
fn test_engine_reports_disabled_promotion() {
    let mut graph = straight_line("V", 3, |b, body| {
        let value = b.new_sreg(0);
        let (f, i) = (b.new_sreg(1), b.new_sreg(2));
        b.push(body, Mir::new(Opcode::Const4).with_ssa(&[], &[value]));
        b.push(body, Mir::new(Opcode::AddFloat).with_ssa(&[value, value], &[f]));
        b.push(body, Mir::new(Opcode::AddInt).with_ssa(&[value, value], &[i]));
        b.push(body, Mir::new(Opcode::ReturnVoid));
    });

    let report = JitEngine::new().compile_method(&mut graph).unwrap();
    assert!(report.promotion_disabled);
    assert!(report.converged);
    assert_eq!(report.passes_run, vec!["type-inference".to_string()]);
}

#[test]
fn test_engine_applies_configured_disabled_optimizations() {
    let mut graph = straight_line("V", 1, |b, body| {
        let value = b.new_sreg(0);
        b.push(body, Mir::new(Opcode::Const4).with_ssa(&[], &[value]));
        b.push(body, Mir::new(Opcode::ReturnVoid));
    });

    let engine = JitEngine::with_config(JitConfig {
        disabled_optimizations: OptimizationFlags::NULL_CHECK_ELIMINATION,
        ..Default::default()
    });
    let report = engine.compile_method(&mut graph).unwrap();
    assert!(!report.promotion_disabled);
    assert!(graph
        .disable_opt()
        .contains(OptimizationFlags::NULL_CHECK_ELIMINATION));
}

#[test]
fn test_engine_punts_on_size_conflict() {
    let mut graph = straight_line("V", 4, |b, body| {
        let (narrow, partner) = (b.new_sreg(0), b.new_sreg(1));
        let (lo, hi) = (b.new_sreg(2), b.new_sreg(3));
        b.push(body, Mir::new(Opcode::Const4).with_ssa(&[], &[narrow]));
        b.push(
            body,
            Mir::new(Opcode::AddLong).with_ssa(&[narrow, partner, narrow, partner], &[lo, hi]),
        );
        b.push(body, Mir::new(Opcode::ReturnVoid));
    });

    let err = JitEngine::new().compile_method(&mut graph).unwrap_err();
    assert!(matches!(
        err,
        CompileError::PuntToInterpreter { sreg: 4, vreg: 0, .. }
    ));
    assert!(err.to_string().contains("punting to interpreter"));
    assert!(graph.punted_to_interpreter());
}

#[test]
fn test_engine_punts_when_wide_half_and_int_meet_at_phi() {
    let mut b = method_builder("V", &[], 2);
    let (head, left, right, join) = (b.add_block(), b.add_block(), b.add_block(), b.add_block());
    b.set_fall_through(b.entry_block(), head);
    b.add_edge(head, left).add_edge(head, right);
    b.set_fall_through(left, join);
    b.set_fall_through(right, join);

    let (lo, hi) = (b.new_sreg(0), b.new_sreg(1));
    let int = b.new_sreg(1);
    let phi = b.new_sreg(1);
    b.push(head, Mir::new(Opcode::IfEqz).with_ssa(&[0], &[]));
    b.push(left, Mir::new(Opcode::ConstWide16).with_ssa(&[], &[lo, hi]));
    b.push(right, Mir::new(Opcode::Const4).with_ssa(&[], &[int]));
    b.push(join, Mir::new(Opcode::Phi).with_ssa(&[hi, int], &[phi]));
    b.push(join, Mir::new(Opcode::ReturnVoid));
    let mut graph = b.build().unwrap();

    let err = JitEngine::new().compile_method(&mut graph).unwrap_err();
    assert!(matches!(
        err,
        CompileError::PuntToInterpreter { sreg, vreg: 1, .. } if sreg == phi as usize
    ));
    assert!(graph.punted_to_interpreter());
}

#[test]
fn test_visit_bound_stops_early_but_still_finishes() {
    let mut graph = straight_line("V", 1, |b, body| {
        let value = b.new_sreg(0);
        b.push(body, Mir::new(Opcode::Const4).with_ssa(&[], &[value]));
        b.push(body, Mir::new(Opcode::ReturnVoid));
    });

    let engine = JitEngine::with_config(JitConfig {
        max_traversal_visits: Some(1),
        ..Default::default()
    });
    let report = engine.compile_method(&mut graph).unwrap();
    assert!(!report.converged);
    assert_eq!(report.block_visits, 1);
    assert!(!graph.punted_to_interpreter());
}
