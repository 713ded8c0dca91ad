//! Stack maps
//!
//! Per-safepoint metadata emitted next to compiled code: the dex pc, the
//! native pc, which machine registers and stack slots hold references, where
//! every dex register lives, and the chain of inlined frames. The runtime
//! reads it back through [`CodeInfo`] when it walks stacks.

pub mod code_info;
pub mod encoding;
pub mod location;
pub mod region;
pub mod stream;

pub use code_info::{CodeInfo, DexRegisterMap, InlineInfo, StackMap};
pub use encoding::{CodeInfoHeader, InlineInfoEncoding, StackMapEncoding, StackMapFlags};
pub use location::{DexRegisterLocation, DexRegisterLocationKind};
pub use region::{BitRegion, MemoryRegion, MemoryRegionMut};
pub use stream::{CodeInfoMismatch, StackMapStream};
