//! Dex Method Compiler Core
//!
//! This crate provides the parts of a dex method compiler that sit between
//! the SSA front end and code generation:
//! - **MIR**: SSA instructions, basic blocks and traversal orders (`mir` module)
//! - **Typing**: register type inference with check-cast narrowing (`typing` module)
//! - **Stack maps**: safepoint metadata encoding and decoding (`stack_map` module)
//! - **Pipeline**: per-method passes and the compiler entry point (`pipeline`, `engine`)
//!
//! # Example
//!
//! ```rust,ignore
//! use dexjit_compiler::{JitEngine, StackMapStream, DexRegisterLocationKind};
//!
//! let engine = JitEngine::new();
//! let report = engine.compile_method(&mut graph)?;
//!
//! let mut stream = StackMapStream::new();
//! stream.begin_stack_map_entry(0, 64, 0x3, None, 2);
//! stream.add_dex_register_entry(DexRegisterLocationKind::InStack, 0);
//! stream.add_dex_register_entry(DexRegisterLocationKind::Constant, -2);
//! stream.end_stack_map_entry();
//! let code_info = engine.encode_stack_maps(&mut stream)?;
//! ```

#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Dense bit sets
pub mod bit_vector;

/// In-memory dex metadata and lowering infos
pub mod dex;

/// Mid-level IR
pub mod mir;

/// Register type inference
pub mod typing;

/// Stack map encoding
pub mod stack_map;

/// Pass pipeline
pub mod pipeline;

/// Compiler entry points
pub mod engine;

// ============================================================================
// Re-exports
// ============================================================================

pub use bit_vector::BitVector;
pub use dex::{DexFile, DexFileError, DexFileId, DexFileSet, InvokeType, MethodReference};
pub use engine::{JitConfig, JitEngine};
pub use mir::{MirGraph, MirGraphBuilder, OptimizationFlags, RegLocation};
pub use pipeline::{CompilationReport, CompileError, MirPass, PassDriver, TypeInferencePass};
pub use stack_map::{
    CodeInfo, CodeInfoMismatch, DexRegisterLocation, DexRegisterLocationKind, DexRegisterMap,
    InlineInfo, StackMap, StackMapStream,
};
pub use typing::{ConflictReport, Type, TypeInference};
