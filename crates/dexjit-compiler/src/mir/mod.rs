//! Mid-level IR
//!
//! SSA-form instructions grouped into basic blocks, as produced by the dex
//! front end. Type inference and the later optimization passes operate on a
//! [`MirGraph`] built with [`MirGraphBuilder`].

pub mod analysis;
pub mod builder;
pub mod dataflow;
pub mod display;
pub mod graph;
pub mod instr;
pub mod iterator;
pub mod opcode;

pub use builder::{GraphError, MirGraphBuilder};
pub use dataflow::DataFlowAttrs;
pub use graph::{
    BasicBlock, BlockId, BlockType, CompilationUnit, DataFlowInfo, MirGraph, OptimizationFlags,
    RegLocation,
};
pub use instr::{Mir, MirFlags, MirId, MirMeta, SsaRepresentation, INVALID_SREG};
pub use iterator::{
    LoopRepeatingTopologicalSortIterator, PreOrderDfsIterator, RepeatingTopologicalSortIterator,
    TopologicalSortIterator,
};
pub use opcode::Opcode;
