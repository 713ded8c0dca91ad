//! Field and method type tables
//!
//! Built once per method from the lowering-info tables, in index order, and
//! read-only afterwards.

use crate::dex::{DexFile, DexFileError, MemAccessType};
use crate::mir::MirGraph;

use super::types::Type;

/// Declared types of a method, with an implicit `this` first for
/// non-static methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub return_type: Type,
    pub param_types: Vec<Type>,
}

impl MethodSignature {
    /// Precise signature from the method's prototype. Array-typed parameters
    /// keep their shape.
    pub fn from_method(
        dex_file: &DexFile,
        method_idx: u32,
        is_static: bool,
    ) -> Result<Self, DexFileError> {
        let method_id = dex_file.method_id(method_idx)?;
        let proto = dex_file.proto_id(method_id.proto_idx)?;
        let return_type = Type::dex_type(dex_file, proto.return_type_idx)?;

        let mut param_types = Vec::with_capacity(proto.parameters.len() + usize::from(!is_static));
        if !is_static {
            param_types.push(Type::dex_type(dex_file, method_id.class_idx)?);
        }
        for &type_idx in &proto.parameters {
            param_types.push(Type::dex_type(dex_file, type_idx)?);
        }
        Ok(MethodSignature {
            return_type,
            param_types,
        })
    }

    /// Coarse signature from a shorty such as `"JLI"`; references are never
    /// array-typed here
    pub fn from_shorty(shorty: &str, is_static: bool) -> Self {
        let mut chars = shorty.chars();
        let return_type = match chars.next() {
            Some('V') | None => Type::uninitialized(),
            Some(c) => Type::shorty_type(c),
        };
        let this_type = (!is_static).then(Type::non_array_ref_type);
        let param_types = this_type
            .into_iter()
            .chain(chars.map(Type::shorty_type))
            .collect();
        MethodSignature {
            return_type,
            param_types,
        }
    }

    pub fn num_params(&self) -> usize {
        self.param_types.len()
    }

    /// Number of vregs the parameters occupy
    pub fn num_param_vregs(&self) -> usize {
        self.param_types
            .iter()
            .map(|t| if t.wide() { 2 } else { 1 })
            .sum()
    }
}

/// Declared type of a field
pub fn field_type(dex_file: &DexFile, field_idx: u32) -> Result<Type, DexFileError> {
    let field_id = dex_file.field_id(field_idx)?;
    Type::dex_type(dex_file, field_id.type_idx)
}

/// One type per instance-field lowering info. Resolved fields are looked up
/// through their declaring dex file.
pub fn prepare_ifield_types(graph: &MirGraph) -> Result<Vec<Type>, DexFileError> {
    let own_dex = graph.dex_file()?;
    graph
        .ifield_lowering_infos()
        .iter()
        .map(|info| {
            let ty = match info.declaring {
                Some(declaring) => {
                    field_type(graph.dex_files().get(declaring.dex_file)?, declaring.field_idx)?
                }
                None => field_type(own_dex, info.field_idx)?,
            };
            debug_assert_eq!(info.mem_access_type == MemAccessType::Wide, ty.wide());
            debug_assert_eq!(info.mem_access_type == MemAccessType::Object, ty.is_ref());
            Ok(ty)
        })
        .collect()
}

/// One type per static-field lowering info, always from the method's own
/// dex file
pub fn prepare_sfield_types(graph: &MirGraph) -> Result<Vec<Type>, DexFileError> {
    let own_dex = graph.dex_file()?;
    graph
        .sfield_lowering_infos()
        .iter()
        .map(|info| field_type(own_dex, info.field_idx))
        .collect()
}

/// One signature per call-site lowering info
pub fn prepare_signatures(graph: &MirGraph) -> Result<Vec<MethodSignature>, DexFileError> {
    let own_dex = graph.dex_file()?;
    graph
        .method_lowering_infos()
        .iter()
        .map(|info| match info.declaring {
            Some(declaring) => MethodSignature::from_method(
                graph.dex_files().get(declaring.dex_file)?,
                declaring.method_idx,
                info.is_static(),
            ),
            None => MethodSignature::from_method(own_dex, info.method_idx, info.is_static()),
        })
        .collect()
}

/// Signature of the method being compiled
pub fn current_method_signature(graph: &MirGraph) -> Result<MethodSignature, DexFileError> {
    let cu = graph.compilation_unit();
    MethodSignature::from_method(graph.dex_file()?, cu.method.method_idx, cu.is_static)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dex() -> DexFile {
        let mut dex = DexFile::new("sample.dex");
        dex.add_method("LFoo;", "bar", "J", &["[I", "D", "LBaz;"]).unwrap();
        dex.add_method("LFoo;", "run", "V", &[]).unwrap();
        dex.add_field("LFoo;", "count", "I").unwrap();
        dex.add_field("LFoo;", "items", "[[Ljava/lang/Object;").unwrap();
        dex
    }

    #[test]
    fn test_signature_from_method() {
        let dex = sample_dex();
        let sig = MethodSignature::from_method(&dex, 0, false).unwrap();
        assert_eq!(sig.return_type, Type::shorty_type('J'));
        assert_eq!(
            sig.param_types,
            vec![
                Type::non_array_ref_type(),
                Type::from_descriptor("[I"),
                Type::shorty_type('D'),
                Type::non_array_ref_type(),
            ]
        );
        assert_eq!(sig.num_param_vregs(), 5);

        let run = MethodSignature::from_method(&dex, 1, true).unwrap();
        assert!(!run.return_type.is_defined());
        assert_eq!(run.num_params(), 0);
    }

    #[test]
    fn test_signature_from_shorty() {
        let sig = MethodSignature::from_shorty("DLJ", false);
        assert_eq!(sig.return_type, Type::shorty_type('D'));
        assert_eq!(sig.num_params(), 3);
        assert_eq!(sig.num_param_vregs(), 4);
        assert!(MethodSignature::from_shorty("V", true).param_types.is_empty());
    }

    #[test]
    fn test_field_types() {
        let dex = sample_dex();
        assert_eq!(field_type(&dex, 0).unwrap(), Type::shorty_type('I'));
        assert_eq!(field_type(&dex, 1).unwrap().array_depth(), 2);
        assert!(field_type(&dex, 9).is_err());
    }
}
