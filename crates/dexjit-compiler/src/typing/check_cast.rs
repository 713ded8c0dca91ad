//! Split SSA registers at check-casts
//!
//! Types are propagated backwards from uses as well as forwards, but the
//! narrowed type a `check-cast` establishes must not leak to uses before the
//! cast. Every register that is the operand of a check-cast is therefore
//! tracked as several *modified* SSA registers: the original one, one per
//! check-cast, and one per pseudo-phi where differently typed versions meet.
//! Modified registers are numbered after the graph's own SSA registers.

use std::collections::BTreeMap;

use tracing::debug;

use crate::bit_vector::BitVector;
use crate::mir::{BlockId, BlockType, MirGraph, MirId, TopologicalSortIterator, INVALID_SREG};

use super::types::Type;

/// Which predecessors a merge at a block may read.
///
/// On the initial walk over a loop head only predecessors ordered before the
/// head are merged; back-edge inputs join once the loop is recalculated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredecessorFilter {
    use_all: bool,
    loop_head_idx: u16,
}

impl PredecessorFilter {
    /// `loop_head` is the innermost loop being walked, as reported by the
    /// loop-repeating iterator
    pub fn new(graph: &MirGraph, bb: BlockId, loop_head: Option<(u16, bool)>) -> Self {
        match loop_head {
            Some((loop_head_idx, recalculating)) => PredecessorFilter {
                use_all: recalculating || loop_head_idx != graph.topological_index(bb),
                loop_head_idx,
            },
            None => PredecessorFilter::all(),
        }
    }

    pub fn all() -> Self {
        PredecessorFilter {
            use_all: true,
            loop_head_idx: 0,
        }
    }

    pub fn uses_all_predecessors(self) -> bool {
        self.use_all
    }

    pub fn accepts(self, graph: &MirGraph, pred: BlockId) -> bool {
        self.use_all || graph.topological_index(pred) < self.loop_head_idx
    }
}

/// Versions of one split register, by block id
#[derive(Debug, Clone)]
pub struct SplitSRegData {
    current_mod_s_reg: i32,
    starting_mod_s_reg: Vec<i32>,
    ending_mod_s_reg: Vec<i32>,
    /// Before pseudo-phi placement: blocks defining a version (the original
    /// definition and the check-casts). Afterwards: blocks with a pseudo-phi.
    def_phi_blocks: BitVector,
}

impl SplitSRegData {
    fn new(num_blocks: usize) -> Self {
        SplitSRegData {
            current_mod_s_reg: INVALID_SREG,
            starting_mod_s_reg: vec![INVALID_SREG; num_blocks],
            ending_mod_s_reg: vec![INVALID_SREG; num_blocks],
            def_phi_blocks: BitVector::new(num_blocks),
        }
    }

    /// Version in effect at the current point of the block being processed
    pub fn current(&self) -> i32 {
        self.current_mod_s_reg
    }

    /// Version live on entry to `bb`, or [`INVALID_SREG`]
    pub fn starting(&self, bb: BlockId) -> i32 {
        self.starting_mod_s_reg[bb.index()]
    }

    /// Version live at the end of `bb`, or [`INVALID_SREG`]
    pub fn ending(&self, bb: BlockId) -> i32 {
        self.ending_mod_s_reg[bb.index()]
    }

    pub fn has_pseudo_phi(&self, bb: BlockId) -> bool {
        self.def_phi_blocks.is_set(bb.index())
    }

    pub fn pseudo_phi_blocks(&self) -> &BitVector {
        &self.def_phi_blocks
    }
}

#[derive(Debug, Clone, Copy)]
struct CheckCastEntry {
    /// Register the check-cast narrows
    s_reg: i32,
    /// Register carrying the narrowed type
    mod_s_reg: i32,
    ty: Type,
}

/// Check-cast bookkeeping for one method
#[derive(Debug, Clone)]
pub struct CheckCastData {
    num_blocks: usize,
    num_original_sregs: usize,
    num_sregs: usize,
    check_cast_map: BTreeMap<MirId, CheckCastEntry>,
    split_sreg_data: BTreeMap<i32, SplitSRegData>,
}

impl CheckCastData {
    pub fn new(graph: &MirGraph) -> Self {
        CheckCastData {
            num_blocks: graph.num_blocks(),
            num_original_sregs: graph.num_ssa_regs(),
            num_sregs: graph.num_ssa_regs(),
            check_cast_map: BTreeMap::new(),
            split_sreg_data: BTreeMap::new(),
        }
    }

    /// Original plus modified SSA registers
    pub fn num_sregs(&self) -> usize {
        self.num_sregs
    }

    pub fn num_modified_sregs(&self) -> usize {
        self.num_sregs - self.num_original_sregs
    }

    pub fn num_check_casts(&self) -> usize {
        self.check_cast_map.len()
    }

    pub fn split_sreg_data(&self, s_reg: i32) -> Option<&SplitSRegData> {
        self.split_sreg_data.get(&s_reg)
    }

    /// The modified register and target type of a registered check-cast
    pub fn check_cast_sreg(&self, mir: MirId) -> Option<(i32, Type)> {
        self.check_cast_map
            .get(&mir)
            .map(|entry| (entry.mod_s_reg, entry.ty))
    }

    /// Register the check-cast `mir` casting to `ty`
    pub fn add_check_cast(&mut self, graph: &MirGraph, mir: MirId, ty: Type) {
        debug_assert!(ty.is_pure_ref());
        let s_reg = graph.mir(mir).uses()[0];
        let mod_s_reg = self.num_sregs as i32;
        self.num_sregs += 1;
        self.check_cast_map.insert(
            mir,
            CheckCastEntry {
                s_reg,
                mod_s_reg,
                ty,
            },
        );

        let num_blocks = self.num_blocks;
        let data = self.split_sreg_data.entry(s_reg).or_insert_with(|| {
            let mut data = SplitSRegData::new(num_blocks);
            let def_bb = find_def_block(graph, mir.block, s_reg);
            data.ending_mod_s_reg[def_bb.index()] = s_reg;
            data.def_phi_blocks.set(def_bb.index());
            data
        });
        data.ending_mod_s_reg[mir.block.index()] = mod_s_reg;
        data.def_phi_blocks.set(mir.block.index());
    }

    /// Place pseudo-phis and compute the starting and ending versions of
    /// every split register in every block. Runs once, after all check-casts
    /// have been added.
    pub fn add_pseudo_phis(&mut self, graph: &MirGraph) {
        debug_assert!(!self.split_sreg_data.is_empty());
        let mut num_pseudo_phis = 0usize;

        for (&s_reg, data) in self.split_sreg_data.iter_mut() {
            // Iterated dominance frontier of the defining blocks.
            let mut phi_blocks = BitVector::new(self.num_blocks);
            let mut input_blocks = data.def_phi_blocks.clone();
            loop {
                for idx in input_blocks.indexes() {
                    if let Some(frontier) = graph.block(BlockId(idx as u32)).dom_frontier.as_ref() {
                        phi_blocks.union_with(frontier);
                    }
                }
                if !input_blocks.union_with(&phi_blocks) {
                    break;
                }
            }

            // Keep the pseudo-phis where the same original register is live.
            data.def_phi_blocks.clear_all();
            let v_reg = graph.sreg_to_vreg(s_reg);
            for phi_idx in phi_blocks.indexes() {
                if is_sreg_live_at_start(graph, BlockId(phi_idx as u32), v_reg, s_reg) {
                    data.starting_mod_s_reg[phi_idx] = self.num_sregs as i32;
                    self.num_sregs += 1;
                    data.def_phi_blocks.set(phi_idx);
                    num_pseudo_phis += 1;
                }
            }

            // Rename the versions in topological order.
            for bb in TopologicalSortIterator::new(graph) {
                let block = graph.block(bb);
                if block.data_flow_info.is_none() || block.block_type == BlockType::Entry {
                    continue;
                }
                let idx = bb.index();
                if data.def_phi_blocks.is_set(idx) {
                    debug_assert_ne!(data.starting_mod_s_reg[idx], INVALID_SREG);
                } else {
                    debug_assert_eq!(data.starting_mod_s_reg[idx], INVALID_SREG);
                    if is_sreg_live_at_start(graph, bb, v_reg, s_reg) {
                        let pred_ending = graph
                            .find_topologically_earliest_predecessor(bb)
                            .map_or(INVALID_SREG, |pred| data.ending_mod_s_reg[pred.index()]);
                        data.starting_mod_s_reg[idx] = if pred_ending != INVALID_SREG {
                            pred_ending
                        } else {
                            s_reg
                        };
                    } else if data.ending_mod_s_reg[idx] != INVALID_SREG {
                        // The original definition starts from the original register.
                        data.starting_mod_s_reg[idx] = s_reg;
                    }
                }
                if data.ending_mod_s_reg[idx] == INVALID_SREG {
                    data.ending_mod_s_reg[idx] = data.starting_mod_s_reg[idx];
                }
            }
        }

        debug!(
            check_casts = self.check_cast_map.len(),
            split_sregs = self.split_sreg_data.len(),
            pseudo_phis = num_pseudo_phis,
            "placed check-cast pseudo-phis"
        );
    }

    /// Seed the narrowed registers with their cast types
    pub fn initialize_check_cast_sregs(&self, sregs: &mut [Type]) {
        for entry in self.check_cast_map.values() {
            sregs[entry.mod_s_reg as usize] = entry.ty;
        }
    }

    /// Fold the width and class facts found for each narrowed register back
    /// into the register it was cast from
    pub fn merge_check_cast_conflicts(&self, sregs: &mut [Type]) {
        for entry in self.check_cast_map.values() {
            let narrowed = sregs[entry.mod_s_reg as usize];
            sregs[entry.s_reg as usize].merge_non_array_flags(narrowed);
        }
    }

    /// Reset every split register to its version on entry to `bb`
    pub fn start(&mut self, bb: BlockId) {
        for data in self.split_sreg_data.values_mut() {
            data.current_mod_s_reg = data.starting_mod_s_reg[bb.index()];
        }
    }

    /// Merge the reference types flowing into the pseudo-phis of `bb`
    pub fn process_pseudo_phis(
        &self,
        graph: &MirGraph,
        bb: BlockId,
        filter: PredecessorFilter,
        sregs: &mut [Type],
    ) -> bool {
        let mut changed = false;
        for data in self.split_sreg_data.values() {
            debug_assert_eq!(data.current_mod_s_reg, data.starting_mod_s_reg[bb.index()]);
            if !data.def_phi_blocks.is_set(bb.index()) {
                continue;
            }
            let mut merged_type = Type::uninitialized();
            for &pred in &graph.block(bb).predecessors {
                if !filter.accepts(graph, pred) {
                    continue;
                }
                let Ok(input) = usize::try_from(data.ending_mod_s_reg[pred.index()]) else {
                    continue;
                };
                if sregs[input].is_ref() {
                    merged_type.merge_pure_ref_and_array(sregs[input]);
                }
            }
            if merged_type.is_ref() {
                changed |=
                    sregs[data.current_mod_s_reg as usize].merge_pure_ref_and_array(merged_type);
            } else {
                // Only an untyped null reaches a loop head on its initial merge.
                debug_assert!(!filter.uses_all_predecessors());
            }
        }
        changed
    }

    /// Switch the cast register to its narrowed version from here on
    pub fn process_check_cast(&mut self, mir: MirId) {
        let Some(entry) = self.check_cast_map.get(&mir) else {
            debug_assert!(false, "unregistered check-cast {:?}", mir);
            return;
        };
        if let Some(data) = self.split_sreg_data.get_mut(&entry.s_reg) {
            data.current_mod_s_reg = entry.mod_s_reg;
        }
    }

    /// Version of `s_reg` in effect at the current point
    pub fn modified_sreg(&self, s_reg: i32) -> i32 {
        match self.split_sreg_data.get(&s_reg) {
            Some(data) => {
                debug_assert_ne!(data.current_mod_s_reg, INVALID_SREG);
                data.current_mod_s_reg
            }
            None => s_reg,
        }
    }

    /// Version of the phi input `s_reg` at the end of predecessor `pred_idx`
    /// of `bb`
    pub fn phi_input_modified_sreg(
        &self,
        graph: &MirGraph,
        s_reg: i32,
        bb: BlockId,
        pred_idx: usize,
    ) -> i32 {
        match self.split_sreg_data.get(&s_reg) {
            Some(data) => {
                let pred = graph.block(bb).predecessors[pred_idx];
                match data.ending_mod_s_reg[pred.index()] {
                    INVALID_SREG => s_reg,
                    mod_s_reg => mod_s_reg,
                }
            }
            None => s_reg,
        }
    }
}

/// Block holding the definition of `s_reg`, found by walking up the
/// topologically earliest predecessors from `bb` until `s_reg` is no longer
/// the current name of its vreg. Parameters are defined by the entry block.
fn find_def_block(graph: &MirGraph, mut bb: BlockId, s_reg: i32) -> BlockId {
    if graph.is_in_vreg(s_reg) {
        return graph.entry_block();
    }
    let v_reg = graph.sreg_to_vreg(s_reg) as usize;
    while let Some(pred) = graph.find_topologically_earliest_predecessor(bb) {
        let defined_in_bb = graph
            .block(pred)
            .data_flow_info
            .as_ref()
            .is_none_or(|info| info.vreg_to_ssa_map_exit[v_reg] != s_reg);
        if defined_in_bb {
            return bb;
        }
        bb = pred;
    }
    bb
}

/// Whether `s_reg` is live into `bb` and reaches it from every predecessor
fn is_sreg_live_at_start(graph: &MirGraph, bb: BlockId, v_reg: u32, s_reg: i32) -> bool {
    debug_assert_eq!(v_reg, graph.sreg_to_vreg(s_reg));
    let block = graph.block(bb);
    let Some(info) = block.data_flow_info.as_ref() else {
        return false;
    };
    if !info.live_in_v.is_set(v_reg as usize) {
        return false;
    }
    block.predecessors.iter().all(|&pred| {
        graph
            .block(pred)
            .data_flow_info
            .as_ref()
            .is_some_and(|info| info.vreg_to_ssa_map_exit[v_reg as usize] == s_reg)
    })
}
