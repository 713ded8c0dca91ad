//! Top-level compiler entry points: per-method passes and stack map encoding.

use tracing::debug;

use crate::mir::{MirGraph, OptimizationFlags};
use crate::pipeline::{CompilationReport, CompileError, PassDriver};
use crate::stack_map::StackMapStream;

/// Configuration for the method compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitConfig {
    /// Re-read every encoded stack map and compare it with its entries
    /// (default: on in debug builds)
    pub verify_stack_maps: bool,
    /// Optimizations disabled before any pass runs (default: none)
    pub disabled_optimizations: OptimizationFlags,
    /// Upper bound on blocks visited while iterating to a fixed point
    /// (default: unbounded)
    pub max_traversal_visits: Option<usize>,
}

impl Default for JitConfig {
    fn default() -> Self {
        JitConfig {
            verify_stack_maps: cfg!(debug_assertions),
            disabled_optimizations: OptimizationFlags::empty(),
            max_traversal_visits: None,
        }
    }
}

/// Compiles methods one at a time
pub struct JitEngine {
    config: JitConfig,
    driver: PassDriver,
}

impl JitEngine {
    /// Create an engine with default configuration
    pub fn new() -> Self {
        Self::with_config(JitConfig::default())
    }

    pub fn with_config(config: JitConfig) -> Self {
        Self::with_driver(config, PassDriver::new())
    }

    /// Create an engine with a custom pass pipeline
    pub fn with_driver(config: JitConfig, driver: PassDriver) -> Self {
        JitEngine { config, driver }
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn driver(&self) -> &PassDriver {
        &self.driver
    }

    /// Run the pass pipeline over one method
    pub fn compile_method(&self, graph: &mut MirGraph) -> Result<CompilationReport, CompileError> {
        graph.disable_optimization(self.config.disabled_optimizations);
        let report = self.driver.run(graph, &self.config)?;
        debug!(
            method = %graph.pretty_method(),
            passes = report.passes_run.len(),
            visits = report.block_visits,
            "method compiled"
        );
        Ok(report)
    }

    /// Encode the collected stack maps into a code info blob
    pub fn encode_stack_maps(&self, stream: &mut StackMapStream) -> Result<Vec<u8>, CompileError> {
        let size = stream.prepare_for_fill_in();
        let mut code_info = vec![0u8; size];
        stream.fill_in(&mut code_info);
        if self.config.verify_stack_maps {
            stream.check_code_info(&code_info)?;
        }
        Ok(code_info)
    }
}

impl Default for JitEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack_map::{CodeInfo, DexRegisterLocationKind};

    #[test]
    fn test_engine_with_config() {
        let config = JitConfig {
            max_traversal_visits: Some(64),
            disabled_optimizations: OptimizationFlags::GLOBAL_VALUE_NUMBERING,
            ..Default::default()
        };
        let engine = JitEngine::with_config(config);
        assert_eq!(engine.config().max_traversal_visits, Some(64));
        assert_eq!(engine.driver().pass_names().count(), 1);
    }

    #[test]
    fn test_encode_stack_maps() {
        let engine = JitEngine::with_config(JitConfig {
            verify_stack_maps: true,
            ..Default::default()
        });
        let mut stream = StackMapStream::new();
        stream.begin_stack_map_entry(4, 32, 0x2, None, 1);
        stream.add_dex_register_entry(DexRegisterLocationKind::InRegister, 5);
        stream.end_stack_map_entry();

        let code_info = engine.encode_stack_maps(&mut stream).unwrap();
        assert_eq!(code_info.len() % 4, 0);
        let info = CodeInfo::new(&code_info);
        assert_eq!(info.overall_size(), code_info.len());
        let map = info.stack_map_for_native_pc_offset(32).unwrap();
        assert_eq!(map.dex_pc(), 4);
        assert_eq!(info.dex_register_map_of(&map).machine_register(0), 5);
    }
}
