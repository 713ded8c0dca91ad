//! Per-method MIR pass pipeline
//!
//! Each pass implements [`MirPass`] and transforms a [`MirGraph`] in place.
//! [`PassDriver`] runs them in order and stops at the first error; a method
//! that fails here is left to the interpreter.

use thiserror::Error;
use tracing::debug;

use crate::dex::DexFileError;
use crate::engine::JitConfig;
use crate::mir::{GraphError, MirGraph, OptimizationFlags};
use crate::stack_map::CodeInfoMismatch;
use crate::typing::TypeInference;

/// Errors from compiling one method
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{method}: v{vreg} (s{sreg}) is used both narrow and wide, punting to interpreter")]
    PuntToInterpreter { method: String, sreg: usize, vreg: u32 },
    #[error("Stack map verification failed: {0}")]
    StackMapVerification(#[from] CodeInfoMismatch),
    #[error("Dex file error: {0}")]
    Dex(#[from] DexFileError),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

/// What a pass reports back to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassOutcome {
    /// Blocks processed while iterating to a fixed point
    pub block_visits: usize,
    /// False when the visit bound stopped the pass early
    pub converged: bool,
}

/// An analysis or optimization pass over one method
pub trait MirPass: Send + Sync {
    /// Name of this pass (for diagnostics)
    fn name(&self) -> &str;

    /// Whether the pass should run on this graph
    fn gate(&self, graph: &MirGraph) -> bool {
        !graph.punted_to_interpreter()
    }

    fn run(&self, graph: &mut MirGraph, config: &JitConfig) -> Result<PassOutcome, CompileError>;
}

/// Infers register types and publishes them as register locations
pub struct TypeInferencePass;

impl MirPass for TypeInferencePass {
    fn name(&self) -> &str {
        "type-inference"
    }

    fn run(&self, graph: &mut MirGraph, config: &JitConfig) -> Result<PassOutcome, CompileError> {
        let mut inference = TypeInference::new(graph)?;
        let stats = inference.converge(graph, config.max_traversal_visits);
        let report = inference.finish(graph);
        if let Some(sreg) = report.size_conflict {
            return Err(CompileError::PuntToInterpreter {
                method: graph.pretty_method(),
                sreg,
                vreg: graph.sreg_to_vreg(sreg as i32),
            });
        }
        Ok(PassOutcome {
            block_visits: stats.visits,
            converged: stats.converged,
        })
    }
}

/// Summary of one method's trip through the driver
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilationReport {
    pub passes_run: Vec<String>,
    pub passes_skipped: Vec<String>,
    pub block_visits: usize,
    /// Every pass reached its fixed point
    pub converged: bool,
    pub promotion_disabled: bool,
}

/// Runs a sequence of passes
pub struct PassDriver {
    passes: Vec<Box<dyn MirPass>>,
}

impl PassDriver {
    /// Create a driver with the default pass pipeline
    pub fn new() -> Self {
        PassDriver {
            passes: vec![Box::new(TypeInferencePass)],
        }
    }

    /// Create an empty driver (no passes)
    pub fn empty() -> Self {
        PassDriver { passes: vec![] }
    }

    pub fn add_pass(&mut self, pass: Box<dyn MirPass>) {
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> impl Iterator<Item = &str> {
        self.passes.iter().map(|p| p.name())
    }

    /// Run all passes in order, stopping at the first error
    pub fn run(
        &self,
        graph: &mut MirGraph,
        config: &JitConfig,
    ) -> Result<CompilationReport, CompileError> {
        let mut report = CompilationReport {
            converged: true,
            ..Default::default()
        };
        for pass in &self.passes {
            if !pass.gate(graph) {
                report.passes_skipped.push(pass.name().to_string());
                continue;
            }
            let outcome = pass.run(graph, config)?;
            debug!(
                pass = pass.name(),
                visits = outcome.block_visits,
                converged = outcome.converged,
                "pass finished"
            );
            report.passes_run.push(pass.name().to_string());
            report.block_visits += outcome.block_visits;
            report.converged &= outcome.converged;
        }
        report.promotion_disabled = graph.disable_opt().contains(OptimizationFlags::PROMOTE_REGS);
        Ok(report)
    }
}

impl Default for PassDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dex::{DexFile, DexFileSet, MethodReference};
    use crate::mir::{CompilationUnit, Mir, MirGraphBuilder, Opcode};

    fn graph_with(body: impl FnOnce(&mut MirGraphBuilder, crate::mir::BlockId)) -> MirGraph {
        let mut dex = DexFile::new("pipeline.dex");
        dex.add_method("LFoo;", "run", "V", &[]).unwrap();
        let mut files = DexFileSet::new();
        let dex_file = files.add(dex);
        let cu = CompilationUnit {
            method: MethodReference {
                dex_file,
                method_idx: 0,
            },
            is_static: true,
        };
        let mut b = MirGraphBuilder::new(4, 0, Arc::new(files), cu);
        let block = b.add_block();
        b.set_fall_through(b.entry_block(), block);
        body(&mut b, block);
        b.build().unwrap()
    }

    struct Punt;

    impl MirPass for Punt {
        fn name(&self) -> &str {
            "punt"
        }

        fn run(&self, graph: &mut MirGraph, _: &JitConfig) -> Result<PassOutcome, CompileError> {
            graph.punt_to_interpreter();
            Ok(PassOutcome::default())
        }
    }

    #[test]
    fn test_default_driver_runs_type_inference() {
        let driver = PassDriver::default();
        assert_eq!(driver.pass_names().collect::<Vec<_>>(), vec!["type-inference"]);

        let mut graph = graph_with(|b, block| {
            let s = b.new_sreg(0);
            b.push(block, Mir::new(Opcode::Const4).with_ssa(&[], &[s]));
            b.push(block, Mir::new(Opcode::ReturnVoid));
        });
        let report = driver.run(&mut graph, &JitConfig::default()).unwrap();
        assert_eq!(report.passes_run, vec!["type-inference".to_string()]);
        assert!(report.converged);
        assert!(report.block_visits > 0);
        assert!(!report.promotion_disabled);
    }

    #[test]
    fn test_gate_skips_passes_after_a_punt() {
        let mut driver = PassDriver::empty();
        driver.add_pass(Box::new(Punt));
        driver.add_pass(Box::new(TypeInferencePass));

        let mut graph = graph_with(|b, block| {
            b.push(block, Mir::new(Opcode::ReturnVoid));
        });
        let report = driver.run(&mut graph, &JitConfig::default()).unwrap();
        assert_eq!(report.passes_run, vec!["punt".to_string()]);
        assert_eq!(report.passes_skipped, vec!["type-inference".to_string()]);
    }

    #[test]
    fn test_size_conflict_becomes_an_error() {
        let mut graph = graph_with(|b, block| {
            let (narrow, partner) = (b.new_sreg(0), b.new_sreg(1));
            let (lo, hi) = (b.new_sreg(2), b.new_sreg(3));
            b.push(block, Mir::new(Opcode::Const4).with_ssa(&[], &[narrow]));
            b.push(
                block,
                Mir::new(Opcode::AddLong).with_ssa(&[narrow, partner, narrow, partner], &[lo, hi]),
            );
            b.push(block, Mir::new(Opcode::ReturnVoid));
        });
        let err = PassDriver::new()
            .run(&mut graph, &JitConfig::default())
            .unwrap_err();
        match err {
            CompileError::PuntToInterpreter { sreg, vreg, .. } => {
                assert_eq!(sreg, 4);
                assert_eq!(vreg, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(graph.punted_to_interpreter());
    }
}
