//! Type inference over the SSA form
//!
//! Decides for every SSA register whether it holds a narrow or wide value and
//! whether that value lives in a core, floating-point or reference register.

pub mod check_cast;
pub mod inference;
pub mod signatures;
pub mod types;

pub use check_cast::{CheckCastData, PredecessorFilter, SplitSRegData};
pub use inference::{ConflictReport, ConvergenceStats, InferencePhase, TypeInference};
pub use signatures::MethodSignature;
pub use types::Type;
