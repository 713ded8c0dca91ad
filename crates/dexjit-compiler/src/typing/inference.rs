//! SSA type inference
//!
//! Runs in three phases over one method:
//!
//! 1. Seed types that are known outright: parameters, field loads, call
//!    results, constants of a known class and the targets of check-casts.
//! 2. Propagate reference and array types forward through moves, phis,
//!    check-casts and `aget-object`, walking each loop twice.
//! 3. [`TypeInference::apply`] each block, driven until no block changes,
//!    merging the width and register class every instruction implies into
//!    its defs and uses.
//!
//! [`TypeInference::finish`] then writes the result into the graph's
//! register locations.

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::dex::DexFileError;
use crate::mir::{
    BlockId, DataFlowAttrs, LoopRepeatingTopologicalSortIterator, Mir, MirGraph, MirId, Opcode,
    OptimizationFlags, PreOrderDfsIterator, RepeatingTopologicalSortIterator,
};

use super::check_cast::{CheckCastData, PredecessorFilter};
use super::signatures::{self, MethodSignature};
use super::types::Type;

/// How far an engine has progressed. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InferencePhase {
    Constructed,
    Initialized,
    RefsPropagated,
    FullyConverged,
    Finished,
}

/// Conflicts found in the final types of the original SSA registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConflictReport {
    /// First register used both as a narrow and as a wide value
    pub size_conflict: Option<usize>,
    /// Last register used with more than one register class
    pub type_conflict: Option<usize>,
}

impl ConflictReport {
    fn of(types: &[Type]) -> Self {
        ConflictReport {
            size_conflict: types.iter().position(|t| t.size_conflict()),
            type_conflict: types.iter().rposition(|t| t.type_conflict()),
        }
    }

    /// A size conflict cannot be compiled; the method must run interpreted
    pub fn punts(&self) -> bool {
        self.size_conflict.is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.size_conflict.is_none() && self.type_conflict.is_none()
    }
}

/// Outcome of [`TypeInference::converge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceStats {
    pub visits: usize,
    pub converged: bool,
}

/// Type inference state for one method
#[derive(Debug)]
pub struct TypeInference {
    check_cast_data: Option<CheckCastData>,
    num_original_sregs: usize,
    ifields: Vec<Type>,
    sfields: Vec<Type>,
    signatures: Vec<MethodSignature>,
    current_method_signature: MethodSignature,
    /// Array type of every `filled-new-array`, resolved up front
    filled_array_types: FxHashMap<MirId, Type>,
    sregs: Vec<Type>,
    phase: InferencePhase,
}

impl TypeInference {
    /// Run the seeding and reference propagation phases
    pub fn new(graph: &MirGraph) -> Result<Self, DexFileError> {
        let check_cast_data = Self::init_check_cast_data(graph)?;
        let num_sregs = check_cast_data
            .as_ref()
            .map_or(graph.num_ssa_regs(), CheckCastData::num_sregs);

        let mut inference = TypeInference {
            check_cast_data,
            num_original_sregs: graph.num_ssa_regs(),
            ifields: signatures::prepare_ifield_types(graph)?,
            sfields: signatures::prepare_sfield_types(graph)?,
            signatures: signatures::prepare_signatures(graph)?,
            current_method_signature: signatures::current_method_signature(graph)?,
            filled_array_types: FxHashMap::default(),
            sregs: vec![Type::uninitialized(); num_sregs],
            phase: InferencePhase::Constructed,
        };

        inference.initialize_sregs(graph)?;
        inference.phase = InferencePhase::Initialized;

        let mut iter = LoopRepeatingTopologicalSortIterator::new(graph);
        let mut changed = false;
        let mut visits = 0usize;
        while let Some(bb) = iter.next(graph, changed) {
            changed = inference.propagate_refs(graph, bb, iter.loop_head());
            visits += 1;
        }
        inference.phase = InferencePhase::RefsPropagated;

        debug!(
            method = %graph.pretty_method(),
            sregs = inference.num_original_sregs,
            modified_sregs = inference.sregs.len() - inference.num_original_sregs,
            visits,
            "reference types propagated"
        );
        Ok(inference)
    }

    pub fn phase(&self) -> InferencePhase {
        self.phase
    }

    /// Current type of an original or modified SSA register
    pub fn sreg_type(&self, s_reg: usize) -> Type {
        self.sregs[s_reg]
    }

    pub fn num_original_sregs(&self) -> usize {
        self.num_original_sregs
    }

    pub fn check_cast_data(&self) -> Option<&CheckCastData> {
        self.check_cast_data.as_ref()
    }

    pub fn current_method_signature(&self) -> &MethodSignature {
        &self.current_method_signature
    }

    // ===== Phase 1: seeding =====

    fn init_check_cast_data(graph: &MirGraph) -> Result<Option<CheckCastData>, DexFileError> {
        if !graph.has_check_cast() {
            return Ok(None);
        }
        let dex_file = graph.dex_file()?;
        let mut data = CheckCastData::new(graph);
        for bb in PreOrderDfsIterator::new(graph) {
            for (index, mir) in graph.block(bb).mirs.iter().enumerate() {
                if mir.opcode == Opcode::CheckCast {
                    let ty = Type::dex_type(dex_file, mir.v_b)?;
                    let id = MirId {
                        block: bb,
                        index: index as u32,
                    };
                    data.add_check_cast(graph, id, ty);
                }
            }
        }
        // Check-casts in unreachable code never split anything.
        if data.num_check_casts() == 0 {
            return Ok(None);
        }
        data.add_pseudo_phis(graph);
        Ok(Some(data))
    }

    fn initialize_sregs(&mut self, graph: &MirGraph) -> Result<(), DexFileError> {
        let mut entry_param_s_reg = graph.first_in_vreg() as usize;
        for &param_type in &self.current_method_signature.param_types {
            self.sregs[entry_param_s_reg] = param_type;
            entry_param_s_reg += if param_type.wide() { 2 } else { 1 };
        }
        debug_assert_eq!(
            entry_param_s_reg,
            (graph.first_in_vreg() + graph.num_ins()) as usize
        );

        let dex_file = graph.dex_file()?;
        for block in graph.blocks() {
            for (index, mir) in block.mirs.iter().enumerate() {
                let id = MirId {
                    block: block.id,
                    index: index as u32,
                };
                let defs = mir.defs();
                let opcode = mir.opcode;

                if (opcode.is_const() || opcode.is_move()) && mir.is_callee() {
                    // Inlined return value; the callee's signature gives the type.
                    if let Some(return_type) = mir
                        .meta
                        .method_lowering_info()
                        .and_then(|idx| self.signatures.get(idx))
                        .map(|sig| sig.return_type)
                    {
                        self.set_def_types(defs, return_type);
                    }
                    continue;
                }

                match opcode {
                    Opcode::MoveException
                    | Opcode::ConstString
                    | Opcode::ConstStringJumbo
                    | Opcode::ConstClass => {
                        self.sregs[defs[0] as usize] = Type::non_array_ref_type();
                    }
                    Opcode::NewInstance => {
                        let ty = Type::dex_type(dex_file, mir.v_b)?;
                        debug_assert_eq!(ty.array_depth(), 0, "new-instance of an array type");
                        self.sregs[defs[0] as usize] = ty;
                    }
                    Opcode::NewArray => {
                        let ty = Type::dex_type(dex_file, mir.v_c)?;
                        debug_assert_ne!(ty.array_depth(), 0, "new-array of a non-array type");
                        self.sregs[defs[0] as usize] = ty;
                    }
                    Opcode::FilledNewArray | Opcode::FilledNewArrayRange => {
                        let array_type = Type::dex_type(dex_file, mir.v_b)?;
                        self.filled_array_types.insert(id, array_type);
                        if let Some(move_result) = graph.find_move_result(id) {
                            let result_def = graph.mir(move_result).defs()[0];
                            self.sregs[result_def as usize] = array_type;
                        }
                    }
                    op if op.is_invoke() => {
                        let Some(return_type) = mir
                            .meta
                            .method_lowering_info()
                            .and_then(|idx| self.signatures.get(idx))
                            .map(|sig| sig.return_type)
                        else {
                            continue;
                        };
                        if !return_type.is_defined() {
                            continue;
                        }
                        if let Some(move_result) = graph.find_move_result(id) {
                            self.set_def_types(graph.mir(move_result).defs(), return_type);
                        }
                    }
                    _ => {
                        let attrs = mir.data_flow_attrs();
                        let field_type = if attrs.contains(DataFlowAttrs::IFIELD) {
                            mir.meta
                                .ifield_lowering_info()
                                .and_then(|idx| self.ifields.get(idx).copied())
                        } else if attrs.contains(DataFlowAttrs::SFIELD) {
                            mir.meta
                                .sfield_lowering_info()
                                .and_then(|idx| self.sfields.get(idx).copied())
                        } else {
                            None
                        };
                        // Loads only; stores are typed in phase 3.
                        if let Some(field_type) = field_type {
                            if attrs.contains(DataFlowAttrs::DA) {
                                self.set_def_types(defs, field_type);
                            }
                        }
                    }
                }
            }
        }

        if let Some(data) = &self.check_cast_data {
            data.initialize_check_cast_sregs(&mut self.sregs);
        }
        Ok(())
    }

    /// Seed a def with `ty`, and its high half for a wide type
    fn set_def_types(&mut self, defs: &[i32], ty: Type) {
        let Some(&low) = defs.first() else {
            return;
        };
        if ty.wide() {
            if let Some(&high) = defs.get(1) {
                self.sregs[high as usize] = ty.to_high_word();
            }
        }
        self.sregs[low as usize] = ty;
    }

    // ===== Phase 2: reference propagation =====

    fn propagate_refs(
        &mut self,
        graph: &MirGraph,
        bb: BlockId,
        loop_head: Option<(u16, bool)>,
    ) -> bool {
        let filter = PredecessorFilter::new(graph, bb, loop_head);
        let mut changed = false;
        if let Some(data) = self.check_cast_data.as_mut() {
            data.start(bb);
            changed |= data.process_pseudo_phis(graph, bb, filter, &mut self.sregs);
        }

        let block = graph.block(bb);
        for (index, mir) in block.mirs.iter().enumerate() {
            match mir.opcode {
                Opcode::Phi => {
                    let mut merged_type = Type::uninitialized();
                    for (pred_idx, &pred) in block.predecessors.iter().enumerate() {
                        if !filter.accepts(graph, pred) {
                            continue;
                        }
                        let Some(&input) = mir.uses().get(pred_idx) else {
                            continue;
                        };
                        let input = self.phi_input_modified_sreg(graph, input, bb, pred_idx);
                        if self.sregs[input].is_ref() {
                            merged_type.merge_pure_ref_and_array(self.sregs[input]);
                        }
                    }
                    if merged_type.is_ref() {
                        let def = mir.defs()[0] as usize;
                        changed |= self.sregs[def].merge_pure_ref_and_array(merged_type);
                    }
                }
                op if op.is_move_object() => {
                    if mir.is_callee() {
                        continue;
                    }
                    let src = self.sregs[self.modified_sreg(mir.uses()[0])];
                    if src.is_ref() {
                        changed |= self.sregs[mir.defs()[0] as usize].copy(src);
                    }
                }
                Opcode::CheckCast => {
                    if let Some(data) = self.check_cast_data.as_mut() {
                        data.process_check_cast(MirId {
                            block: bb,
                            index: index as u32,
                        });
                    }
                }
                Opcode::AgetObject => {
                    let array_type = self.sregs[self.modified_sreg(mir.uses()[0])];
                    if array_type.is_ref() {
                        if array_type.array_depth() == 0 {
                            warn!(
                                method = %graph.pretty_method(),
                                offset = mir.offset,
                                "aget-object on a non-array reference"
                            );
                        } else {
                            let component_type = array_type.component_type();
                            changed |= self.sregs[mir.defs()[0] as usize].copy(component_type);
                        }
                    }
                }
                _ => {}
            }
        }
        changed
    }

    // ===== Phase 3: width and class =====

    /// Merge the types every instruction of `bb` implies. Returns whether
    /// any register changed.
    pub fn apply(&mut self, graph: &MirGraph, bb: BlockId) -> bool {
        debug_assert!(self.phase >= InferencePhase::RefsPropagated);
        debug_assert!(self.phase < InferencePhase::Finished);
        let mut changed = false;
        if let Some(data) = self.check_cast_data.as_mut() {
            data.start(bb);
        }
        for (index, mir) in graph.block(bb).mirs.iter().enumerate() {
            let id = MirId {
                block: bb,
                index: index as u32,
            };
            changed |= self.infer_type_and_size(graph, bb, id, mir);
        }
        changed
    }

    /// Drive [`apply`](Self::apply) over the whole method until a full pass
    /// changes nothing, or until `max_visits` blocks have been processed
    pub fn converge(&mut self, graph: &MirGraph, max_visits: Option<usize>) -> ConvergenceStats {
        let mut iter = RepeatingTopologicalSortIterator::new(graph);
        let mut changed = false;
        let mut visits = 0usize;
        while let Some(bb) = iter.next(graph, changed) {
            if max_visits.is_some_and(|max| visits >= max) {
                warn!(
                    method = %graph.pretty_method(),
                    visits,
                    "type inference stopped before reaching a fixed point"
                );
                return ConvergenceStats {
                    visits,
                    converged: false,
                };
            }
            visits += 1;
            changed = self.apply(graph, bb);
            if changed {
                trace!(block = %bb, "types changed");
            }
        }
        self.phase = InferencePhase::FullyConverged;
        debug!(
            method = %graph.pretty_method(),
            visits,
            passes = iter.repeats() + 1,
            "type inference converged"
        );
        ConvergenceStats {
            visits,
            converged: true,
        }
    }

    fn infer_type_and_size(&mut self, graph: &MirGraph, bb: BlockId, id: MirId, mir: &Mir) -> bool {
        if mir.ssa_rep.is_none() {
            return false;
        }
        let attrs = mir.data_flow_attrs();
        let uses = mir.uses();
        let defs = mir.defs();
        let mut changed = false;

        if attrs.contains(DataFlowAttrs::NULL_TRANSFER_N) {
            debug_assert_eq!(uses.len(), graph.block(bb).predecessors.len());
            let def = defs[0] as usize;
            let mut merged_type = self.sregs[def];
            for (pred_idx, &input) in uses.iter().enumerate() {
                let input = self.phi_input_modified_sreg(graph, input, bb, pred_idx);
                if self.sregs[input].is_defined() {
                    merged_type.merge_non_array_flags(self.sregs[input]);
                }
            }
            if !merged_type.is_defined() {
                // Nothing known about any input yet.
            } else if merged_type.high_word() {
                // High halves of wide values are tracked through their low halves.
                if !merged_type.low_word() {
                    changed |= self.sregs[def].set_high_word();
                    for (pred_idx, &input) in uses.iter().enumerate() {
                        let input = self.phi_input_modified_sreg(graph, input, bb, pred_idx);
                        changed |= self.sregs[input].set_high_word();
                    }
                } else {
                    // A high word meets a low word: size conflict.
                    changed |= self.sregs[def].set_low_word();
                    changed |= self.sregs[def].set_high_word();
                }
            } else {
                changed |= update_sreg_from_low_word_type(&mut self.sregs, def, merged_type);
                for (pred_idx, &input) in uses.iter().enumerate() {
                    let input = self.phi_input_modified_sreg(graph, input, bb, pred_idx);
                    changed |= update_sreg_from_low_word_type(&mut self.sregs, input, merged_type);
                }
            }
            return changed;
        }

        if attrs.contains(DataFlowAttrs::CHK_CAST) {
            if let Some(data) = self.check_cast_data.as_mut() {
                data.process_check_cast(id);
            }
            // The cast register itself keeps its original name here.
            return self.sregs[uses[0] as usize].set_ref();
        }

        if attrs.contains(DataFlowAttrs::DA) {
            let s_reg = defs[0] as usize;
            changed |= self.sregs[s_reg].set_low_word();
            changed |= set_class_flags(
                &mut self.sregs[s_reg],
                attrs,
                DataFlowAttrs::FP_A,
                DataFlowAttrs::CORE_A,
                DataFlowAttrs::REF_A,
            );
            if attrs.contains(DataFlowAttrs::A_WIDE) {
                changed |= self.sregs[s_reg].set_wide();
                debug_assert_eq!(defs[1] as usize, s_reg + 1);
                let low_word = self.sregs[s_reg];
                changed |= self.sregs[defs[1] as usize].merge_high_word(low_word);
            } else {
                changed |= self.sregs[s_reg].set_narrow();
            }
        }

        let operands = [
            (
                DataFlowAttrs::UA,
                DataFlowAttrs::A_WIDE,
                DataFlowAttrs::FP_A,
                DataFlowAttrs::CORE_A,
                DataFlowAttrs::REF_A,
            ),
            (
                DataFlowAttrs::UB,
                DataFlowAttrs::B_WIDE,
                DataFlowAttrs::FP_B,
                DataFlowAttrs::CORE_B,
                DataFlowAttrs::REF_B,
            ),
            (
                DataFlowAttrs::UC,
                DataFlowAttrs::C_WIDE,
                DataFlowAttrs::FP_C,
                DataFlowAttrs::CORE_C,
                DataFlowAttrs::REF_C,
            ),
        ];
        let mut next = 0usize;
        for (used, wide, fp, core, reference) in operands {
            if !attrs.contains(used) {
                continue;
            }
            let mod_s_reg = self.modified_sreg(uses[next]);
            changed |= self.sregs[mod_s_reg].set_low_word();
            changed |= set_class_flags(&mut self.sregs[mod_s_reg], attrs, fp, core, reference);
            if attrs.contains(wide) {
                changed |= self.sregs[mod_s_reg].set_wide();
                let high = self.modified_sreg(uses[next + 1]);
                debug_assert_eq!(high, mod_s_reg + 1);
                let low_word = self.sregs[mod_s_reg];
                changed |= self.sregs[high].merge_high_word(low_word);
                next += 2;
            } else {
                changed |= self.sregs[mod_s_reg].set_narrow();
                next += 1;
            }
        }

        if attrs.contains(DataFlowAttrs::IS_MOVE) {
            let used = self.modified_sreg(uses[0]);
            let defined = defs[0] as usize;
            let def_type = self.sregs[defined];
            changed |= update_sreg_from_low_word_type(&mut self.sregs, used, def_type);
            let use_type = self.sregs[used];
            changed |= update_sreg_from_low_word_type(&mut self.sregs, defined, use_type);
        }

        if attrs.intersects(DataFlowAttrs::IFIELD | DataFlowAttrs::SFIELD) {
            let field_type = if attrs.contains(DataFlowAttrs::IFIELD) {
                mir.meta
                    .ifield_lowering_info()
                    .and_then(|idx| self.ifields.get(idx).copied())
            } else {
                mir.meta
                    .sfield_lowering_info()
                    .and_then(|idx| self.sfields.get(idx).copied())
            };
            if let Some(field_type) = field_type {
                let target = if attrs.contains(DataFlowAttrs::DA) {
                    defs[0] as usize
                } else {
                    self.modified_sreg(uses[0])
                };
                changed |= update_sreg_from_low_word_type(&mut self.sregs, target, field_type);
            }
        }

        if attrs.intersects(DataFlowAttrs::HAS_RANGE_CHKS) {
            let array = self.modified_sreg(uses[uses.len() - 2]);
            let array_type = self.sregs[array];
            if array_type.array_depth() != 0 {
                let target = if attrs.contains(DataFlowAttrs::DA) {
                    defs[0] as usize
                } else {
                    self.modified_sreg(uses[0])
                };
                changed |= update_sreg_from_low_word_type(
                    &mut self.sregs,
                    target,
                    array_type.component_type(),
                );
            } else if array_type.is_ref() {
                warn!(
                    method = %graph.pretty_method(),
                    offset = mir.offset,
                    opcode = %mir.opcode,
                    "array access on a non-array reference"
                );
            }
        }

        if mir.opcode.is_return_value() {
            let target = self.modified_sreg(uses[0]);
            let return_type = self.current_method_signature.return_type;
            if return_type.is_defined() {
                changed |= update_sreg_from_low_word_type(&mut self.sregs, target, return_type);
            }
        }

        if attrs.intersects(DataFlowAttrs::FORMAT_35C | DataFlowAttrs::FORMAT_3RC) {
            if attrs.contains(DataFlowAttrs::NON_NULL_RET) {
                // filled-new-array: every argument is an element.
                let array_type = self.filled_array_types.get(&id).copied();
                if let Some(array_type) = array_type.filter(|t| t.array_depth() != 0) {
                    let component_type = array_type.component_type();
                    for &arg in uses {
                        let mod_s_reg = self.modified_sreg(arg);
                        changed |= self.sregs[mod_s_reg].merge_non_array_flags(component_type);
                    }
                }
            } else if let Some(sig_idx) = mir
                .meta
                .method_lowering_info()
                .filter(|&idx| idx < self.signatures.len())
            {
                let mut next = 0usize;
                for param_idx in 0..self.signatures[sig_idx].num_params() {
                    if next >= uses.len() {
                        break;
                    }
                    let param_type = self.signatures[sig_idx].param_types[param_idx];
                    let mod_s_reg = self.modified_sreg(uses[next]);
                    changed |= update_sreg_from_low_word_type(&mut self.sregs, mod_s_reg, param_type);
                    next += if param_type.wide() { 2 } else { 1 };
                }
            }
        }

        changed
    }

    // ===== Finish =====

    /// Final types of the original registers, with the facts found for the
    /// narrowed versions folded back in
    pub fn final_types(&self) -> Vec<Type> {
        let mut types = self.sregs.clone();
        if let Some(data) = &self.check_cast_data {
            data.merge_check_cast_conflicts(&mut types);
        }
        types.truncate(self.num_original_sregs);
        types
    }

    /// Conflicts in the current final types
    pub fn conflicts(&self) -> ConflictReport {
        ConflictReport::of(&self.final_types())
    }

    /// Publish the inferred types to the graph's register locations.
    ///
    /// A size conflict punts the method to the interpreter and leaves the
    /// locations untouched. A type conflict disables register promotion.
    pub fn finish(&mut self, graph: &mut MirGraph) -> ConflictReport {
        let types = self.final_types();
        let report = ConflictReport::of(&types);
        self.phase = InferencePhase::Finished;

        if let Some(s_reg) = report.size_conflict {
            warn!(
                method = %graph.pretty_method(),
                s_reg,
                v_reg = graph.sreg_to_vreg(s_reg as i32),
                "size conflict, punting to interpreter"
            );
            graph.punt_to_interpreter();
            return report;
        }

        for (s_reg, ty) in types.iter().enumerate() {
            let loc = graph.reg_location_mut(s_reg);
            loc.wide = ty.wide();
            loc.defined = ty.is_defined();
            loc.fp = ty.fp();
            loc.core = ty.core();
            loc.reference = ty.is_ref();
            loc.high_word = ty.high_word();
        }

        if let Some(s_reg) = report.type_conflict {
            warn!(
                method = %graph.pretty_method(),
                s_reg,
                v_reg = graph.sreg_to_vreg(s_reg as i32),
                "type conflict, disabling register promotion"
            );
            graph.disable_optimization(OptimizationFlags::PROMOTE_REGS);
        }
        report
    }

    // ===== Helpers =====

    fn modified_sreg(&self, s_reg: i32) -> usize {
        match &self.check_cast_data {
            Some(data) => data.modified_sreg(s_reg) as usize,
            None => s_reg as usize,
        }
    }

    fn phi_input_modified_sreg(
        &self,
        graph: &MirGraph,
        s_reg: i32,
        bb: BlockId,
        pred_idx: usize,
    ) -> usize {
        match &self.check_cast_data {
            Some(data) => data.phi_input_modified_sreg(graph, s_reg, bb, pred_idx) as usize,
            None => s_reg as usize,
        }
    }
}

fn set_class_flags(
    ty: &mut Type,
    attrs: DataFlowAttrs,
    fp: DataFlowAttrs,
    core: DataFlowAttrs,
    reference: DataFlowAttrs,
) -> bool {
    let mut changed = false;
    if attrs.contains(fp) {
        changed |= ty.set_fp();
    }
    if attrs.contains(core) {
        changed |= ty.set_core();
    }
    if attrs.contains(reference) {
        changed |= ty.set_ref();
    }
    changed
}

/// Merge a low-word type into `sregs[mod_s_reg]` and, for a wide result,
/// its high half into the next register
fn update_sreg_from_low_word_type(sregs: &mut [Type], mod_s_reg: usize, low_word_type: Type) -> bool {
    let mut changed = sregs[mod_s_reg].merge_non_array_flags(low_word_type);
    let merged = sregs[mod_s_reg];
    if merged.wide() && !merged.narrow() && merged.low_word() {
        if let Some(high) = sregs.get_mut(mod_s_reg + 1) {
            changed |= high.merge_high_word(merged);
        }
    }
    changed
}
