//! Lowering info: per-method, deduplicated resolution results for the field
//! and method references the MIR uses. MIR instructions refer to these tables by
//! dense index instead of carrying raw dex indices.

use super::{DexFileId, InvokeType, MethodReference};

/// Width/class of a field access as encoded by the opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemAccessType {
    Word,
    Wide,
    Object,
    Boolean,
    Byte,
    Char,
    Short,
}

/// A field identified by its dex file and field index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldReference {
    pub dex_file: DexFileId,
    pub field_idx: u32,
}

/// Resolution result for one field reference used by the method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLoweringInfo {
    /// Field index in the compilation unit's own dex file
    pub field_idx: u32,
    pub mem_access_type: MemAccessType,
    pub is_static: bool,
    /// Declaring field, when resolution succeeded
    pub declaring: Option<FieldReference>,
}

impl FieldLoweringInfo {
    /// Unresolved field access
    pub fn unresolved(field_idx: u32, mem_access_type: MemAccessType, is_static: bool) -> Self {
        FieldLoweringInfo {
            field_idx,
            mem_access_type,
            is_static,
            declaring: None,
        }
    }

    /// Field access resolved to a declaring field, possibly in another dex file
    pub fn resolved(
        field_idx: u32,
        mem_access_type: MemAccessType,
        is_static: bool,
        declaring: FieldReference,
    ) -> Self {
        FieldLoweringInfo {
            field_idx,
            mem_access_type,
            is_static,
            declaring: Some(declaring),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.declaring.is_some()
    }
}

/// Resolution result for one call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLoweringInfo {
    /// Method index in the compilation unit's own dex file
    pub method_idx: u32,
    pub invoke_type: InvokeType,
    /// Declaring method, when resolution succeeded
    pub declaring: Option<MethodReference>,
}

impl MethodLoweringInfo {
    pub fn unresolved(method_idx: u32, invoke_type: InvokeType) -> Self {
        MethodLoweringInfo {
            method_idx,
            invoke_type,
            declaring: None,
        }
    }

    pub fn resolved(method_idx: u32, invoke_type: InvokeType, declaring: MethodReference) -> Self {
        MethodLoweringInfo {
            method_idx,
            invoke_type,
            declaring: Some(declaring),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.declaring.is_some()
    }

    pub fn is_static(&self) -> bool {
        self.invoke_type.is_static()
    }
}
