//! Resolved dex metadata
//!
//! An in-memory view of the tables the compiler reads from a dex file: type
//! descriptors, field ids, method prototypes and method ids. Nothing here parses
//! the on-disk format; the tables are populated by the loader (or by tests)
//! through the `add_*` builders, which validate descriptors as they go.

pub mod lowering;

use std::fmt;

use rustc_hash::FxHashMap;

pub use lowering::{FieldLoweringInfo, FieldReference, MemAccessType, MethodLoweringInfo};

/// Errors raised while populating dex tables
#[derive(Debug, thiserror::Error)]
pub enum DexFileError {
    #[error("Invalid type descriptor '{0}'")]
    InvalidDescriptor(String),
    #[error("Type index {0} out of range")]
    TypeIndexOutOfRange(u32),
    #[error("Proto index {0} out of range")]
    ProtoIndexOutOfRange(u32),
    #[error("Method index {index} out of range in {location}")]
    MethodIndexOutOfRange { location: String, index: u32 },
    #[error("Field index {index} out of range in {location}")]
    FieldIndexOutOfRange { location: String, index: u32 },
    #[error("Dex file {0} not in the compilation set")]
    UnknownDexFile(DexFileId),
}

/// Dense index of a dex file within a [`DexFileSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexFileId(pub u32);

impl fmt::Display for DexFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dex{}", self.0)
    }
}

/// How a call site dispatches
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeType {
    Static = 0,
    Direct = 1,
    Virtual = 2,
    Super = 3,
    Interface = 4,
}

impl InvokeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Static),
            1 => Some(Self::Direct),
            2 => Some(Self::Virtual),
            3 => Some(Self::Super),
            4 => Some(Self::Interface),
            _ => None,
        }
    }

    pub fn is_static(self) -> bool {
        self == Self::Static
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldId {
    pub class_idx: u32,
    pub type_idx: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoId {
    /// Shorty: return type char followed by one char per parameter
    pub shorty: String,
    pub return_type_idx: u32,
    pub parameters: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodId {
    pub class_idx: u32,
    pub proto_idx: u32,
    pub name: String,
}

/// A method identified by its dex file and method index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodReference {
    pub dex_file: DexFileId,
    pub method_idx: u32,
}

/// Check a type descriptor: a primitive (`V` only at depth 0), `L...;`, or up
/// to 255 leading `[` followed by a non-void component.
pub fn is_valid_descriptor(desc: &str) -> bool {
    let component = desc.trim_start_matches('[');
    let depth = desc.len() - component.len();
    if depth > 255 {
        return false;
    }
    match component.as_bytes() {
        [b'V'] => depth == 0,
        [b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D'] => true,
        [b'L', .., b';'] => component.len() > 2 && !component[1..component.len() - 1].contains(';'),
        _ => false,
    }
}

/// Shorty character of a valid descriptor
pub fn shorty_char(desc: &str) -> char {
    match desc.as_bytes().first() {
        Some(b'[') | Some(b'L') => 'L',
        Some(&c) => c as char,
        None => 'V',
    }
}

/// Type, field, proto and method tables of one dex file
#[derive(Debug, Clone, Default)]
pub struct DexFile {
    location: String,
    type_descriptors: Vec<String>,
    type_lookup: FxHashMap<String, u32>,
    field_ids: Vec<FieldId>,
    proto_ids: Vec<ProtoId>,
    method_ids: Vec<MethodId>,
}

impl DexFile {
    /// Create an empty dex file
    pub fn new(location: impl Into<String>) -> Self {
        DexFile {
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Intern a type descriptor, returning its type index
    pub fn add_type(&mut self, descriptor: &str) -> Result<u32, DexFileError> {
        if let Some(&idx) = self.type_lookup.get(descriptor) {
            return Ok(idx);
        }
        if !is_valid_descriptor(descriptor) {
            return Err(DexFileError::InvalidDescriptor(descriptor.to_string()));
        }
        let idx = self.type_descriptors.len() as u32;
        self.type_descriptors.push(descriptor.to_string());
        self.type_lookup.insert(descriptor.to_string(), idx);
        Ok(idx)
    }

    /// Add a field id `class.name:type`
    pub fn add_field(&mut self, class: &str, name: &str, ty: &str) -> Result<u32, DexFileError> {
        if ty == "V" {
            return Err(DexFileError::InvalidDescriptor(ty.to_string()));
        }
        let class_idx = self.add_type(class)?;
        let type_idx = self.add_type(ty)?;
        self.field_ids.push(FieldId {
            class_idx,
            type_idx,
            name: name.to_string(),
        });
        Ok(self.field_ids.len() as u32 - 1)
    }

    /// Add a prototype, computing its shorty
    pub fn add_proto(&mut self, return_type: &str, params: &[&str]) -> Result<u32, DexFileError> {
        let return_type_idx = self.add_type(return_type)?;
        let mut shorty = String::with_capacity(params.len() + 1);
        shorty.push(shorty_char(return_type));
        let mut parameters = Vec::with_capacity(params.len());
        for param in params {
            if *param == "V" {
                return Err(DexFileError::InvalidDescriptor(param.to_string()));
            }
            parameters.push(self.add_type(param)?);
            shorty.push(shorty_char(param));
        }
        if let Some(idx) = self
            .proto_ids
            .iter()
            .position(|p| p.return_type_idx == return_type_idx && p.parameters == parameters)
        {
            return Ok(idx as u32);
        }
        self.proto_ids.push(ProtoId {
            shorty,
            return_type_idx,
            parameters,
        });
        Ok(self.proto_ids.len() as u32 - 1)
    }

    /// Add a method id `class.name(params)return`
    pub fn add_method(
        &mut self,
        class: &str,
        name: &str,
        return_type: &str,
        params: &[&str],
    ) -> Result<u32, DexFileError> {
        let class_idx = self.add_type(class)?;
        let proto_idx = self.add_proto(return_type, params)?;
        self.method_ids.push(MethodId {
            class_idx,
            proto_idx,
            name: name.to_string(),
        });
        Ok(self.method_ids.len() as u32 - 1)
    }

    pub fn num_type_ids(&self) -> usize {
        self.type_descriptors.len()
    }

    pub fn num_field_ids(&self) -> usize {
        self.field_ids.len()
    }

    pub fn num_method_ids(&self) -> usize {
        self.method_ids.len()
    }

    /// Look up a type index by descriptor
    pub fn find_type(&self, descriptor: &str) -> Option<u32> {
        self.type_lookup.get(descriptor).copied()
    }

    pub fn type_descriptor(&self, type_idx: u32) -> Result<&str, DexFileError> {
        self.type_descriptors
            .get(type_idx as usize)
            .map(String::as_str)
            .ok_or(DexFileError::TypeIndexOutOfRange(type_idx))
    }

    pub fn field_id(&self, field_idx: u32) -> Result<&FieldId, DexFileError> {
        self.field_ids
            .get(field_idx as usize)
            .ok_or_else(|| DexFileError::FieldIndexOutOfRange {
                location: self.location.clone(),
                index: field_idx,
            })
    }

    pub fn method_id(&self, method_idx: u32) -> Result<&MethodId, DexFileError> {
        self.method_ids
            .get(method_idx as usize)
            .ok_or_else(|| DexFileError::MethodIndexOutOfRange {
                location: self.location.clone(),
                index: method_idx,
            })
    }

    pub fn proto_id(&self, proto_idx: u32) -> Result<&ProtoId, DexFileError> {
        self.proto_ids
            .get(proto_idx as usize)
            .ok_or(DexFileError::ProtoIndexOutOfRange(proto_idx))
    }

    /// Prototype of a method
    pub fn method_prototype(&self, method_idx: u32) -> Result<&ProtoId, DexFileError> {
        let method_id = self.method_id(method_idx)?;
        self.proto_id(method_id.proto_idx)
    }

    pub fn method_shorty(&self, method_idx: u32) -> Result<&str, DexFileError> {
        Ok(self.method_prototype(method_idx)?.shorty.as_str())
    }

    /// `Lpkg/Cls;.name` for log messages; falls back to the raw index
    pub fn pretty_method(&self, method_idx: u32) -> String {
        match self.method_id(method_idx) {
            Ok(id) => match self.type_descriptor(id.class_idx) {
                Ok(class) => format!("{}.{}", class, id.name),
                Err(_) => format!("<method {}>.{}", method_idx, id.name),
            },
            Err(_) => format!("<method {}@{}>", method_idx, self.location),
        }
    }

    /// Check that every index stored in the tables is in range
    pub fn validate(&self) -> Result<(), DexFileError> {
        for field in &self.field_ids {
            self.type_descriptor(field.class_idx)?;
            self.type_descriptor(field.type_idx)?;
        }
        for proto in &self.proto_ids {
            self.type_descriptor(proto.return_type_idx)?;
            for &param in &proto.parameters {
                self.type_descriptor(param)?;
            }
        }
        for method in &self.method_ids {
            self.type_descriptor(method.class_idx)?;
            self.proto_id(method.proto_idx)?;
        }
        Ok(())
    }
}

/// The dex files visible to one compilation
#[derive(Debug, Clone, Default)]
pub struct DexFileSet {
    files: Vec<DexFile>,
}

impl DexFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dex file, returning its id
    pub fn add(&mut self, file: DexFile) -> DexFileId {
        self.files.push(file);
        DexFileId(self.files.len() as u32 - 1)
    }

    pub fn get(&self, id: DexFileId) -> Result<&DexFile, DexFileError> {
        self.files
            .get(id.0 as usize)
            .ok_or(DexFileError::UnknownDexFile(id))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_validation() {
        assert!(is_valid_descriptor("I"));
        assert!(is_valid_descriptor("V"));
        assert!(is_valid_descriptor("[[J"));
        assert!(is_valid_descriptor("Ljava/lang/Object;"));
        assert!(is_valid_descriptor("[Lfoo/Bar;"));
        assert!(!is_valid_descriptor("[V"));
        assert!(!is_valid_descriptor("L;"));
        assert!(!is_valid_descriptor("Lfoo"));
        assert!(!is_valid_descriptor("Q"));
        assert!(!is_valid_descriptor(""));
    }

    #[test]
    fn test_add_method_builds_shorty() {
        let mut dex = DexFile::new("test.dex");
        let m = dex
            .add_method("LFoo;", "bar", "D", &["I", "[J", "Ljava/lang/String;"])
            .unwrap();
        assert_eq!(dex.method_shorty(m).unwrap(), "DILL");
        assert_eq!(dex.pretty_method(m), "LFoo;.bar");
        let proto = dex.method_prototype(m).unwrap();
        assert_eq!(dex.type_descriptor(proto.parameters[1]).unwrap(), "[J");
        dex.validate().unwrap();
    }

    #[test]
    fn test_types_are_interned() {
        let mut dex = DexFile::new("test.dex");
        let a = dex.add_type("LFoo;").unwrap();
        let b = dex.add_type("LFoo;").unwrap();
        assert_eq!(a, b);
        assert_eq!(dex.num_type_ids(), 1);
        assert_eq!(dex.find_type("LFoo;"), Some(a));
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let mut dex = DexFile::new("test.dex");
        assert!(matches!(
            dex.add_type("[V"),
            Err(DexFileError::InvalidDescriptor(_))
        ));
        assert!(dex.add_field("LFoo;", "x", "V").is_err());
        assert!(dex.add_proto("V", &["V"]).is_err());
        assert!(matches!(
            dex.method_id(3),
            Err(DexFileError::MethodIndexOutOfRange { index: 3, .. })
        ));
    }
}
