//! The MIR graph: basic blocks addressed by dense id, plus the per-method SSA
//! facts (sreg to vreg mapping, topological order, loop ends) and the output
//! records that later passes consume.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::bit_vector::BitVector;
use crate::dex::{
    DexFile, DexFileError, DexFileSet, FieldLoweringInfo, MethodLoweringInfo, MethodReference,
};

use super::instr::{Mir, MirId};

/// Dense basic block index into [`MirGraph`]'s block table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Entry,
    Exit,
    Dalvik,
}

/// Vreg-level facts of one block, computed before SSA renaming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFlowInfo {
    /// Vregs live on entry to the block
    pub live_in_v: BitVector,
    /// SSA name of each vreg at the end of the block
    pub vreg_to_ssa_map_exit: Vec<i32>,
}

/// A basic block
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub block_type: BlockType,
    pub mirs: Vec<Mir>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    /// Successor reached without a taken branch
    pub fall_through: Option<BlockId>,
    pub dom_frontier: Option<BitVector>,
    /// `None` for unreachable blocks
    pub data_flow_info: Option<DataFlowInfo>,
}

impl BasicBlock {
    pub fn new(id: BlockId, block_type: BlockType) -> Self {
        BasicBlock {
            id,
            block_type,
            mirs: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            fall_through: None,
            dom_frontier: None,
            data_flow_info: None,
        }
    }
}

bitflags! {
    /// Optimizations that may be disabled per method
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OptimizationFlags: u32 {
        const LOAD_STORE_ELIMINATION = 1 << 0;
        const NULL_CHECK_ELIMINATION = 1 << 1;
        /// Register promotion relies on the core/fp split of every vreg
        const PROMOTE_REGS = 1 << 2;
        const GLOBAL_VALUE_NUMBERING = 1 << 3;
        const BRANCH_FUSING = 1 << 4;
    }
}

/// Final typing of one SSA register, read by the register allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegLocation {
    pub wide: bool,
    pub defined: bool,
    pub fp: bool,
    pub core: bool,
    pub reference: bool,
    pub high_word: bool,
    pub s_reg_low: i32,
    pub orig_sreg: i32,
}

/// The method being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilationUnit {
    pub method: MethodReference,
    pub is_static: bool,
}

/// SSA-form MIR of one method
#[derive(Debug, Clone)]
pub struct MirGraph {
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) entry: BlockId,
    pub(crate) exit: BlockId,
    pub(crate) num_vregs: u32,
    pub(crate) num_ins: u32,
    /// Vreg of every SSA register
    pub(crate) ssa_base_vregs: Vec<u32>,
    /// Depth-first pre-order of the reachable blocks
    pub(crate) dfs_order: Vec<BlockId>,
    pub(crate) topological_order: Vec<BlockId>,
    /// Position of each block in the topological order, by block id
    pub(crate) topological_order_indexes: Vec<u16>,
    /// For a loop head at topological index `i`, the index one past the loop
    /// body; zero for other blocks
    pub(crate) loop_ends: Vec<u16>,
    pub(crate) dex_files: Arc<DexFileSet>,
    pub(crate) cu: CompilationUnit,
    pub(crate) ifield_lowering_infos: Vec<FieldLoweringInfo>,
    pub(crate) sfield_lowering_infos: Vec<FieldLoweringInfo>,
    pub(crate) method_lowering_infos: Vec<MethodLoweringInfo>,
    pub(crate) reg_locations: Vec<RegLocation>,
    pub(crate) punt_to_interpreter: bool,
    pub(crate) disable_opt: OptimizationFlags,
}

impl MirGraph {
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    pub fn exit_block(&self) -> BlockId {
        self.exit
    }

    pub fn mir(&self, id: MirId) -> &Mir {
        &self.blocks[id.block.index()].mirs[id.index as usize]
    }

    pub fn num_vregs(&self) -> u32 {
        self.num_vregs
    }

    pub fn num_ins(&self) -> u32 {
        self.num_ins
    }

    /// Ins occupy the highest vregs
    pub fn first_in_vreg(&self) -> u32 {
        self.num_vregs - self.num_ins
    }

    pub fn num_ssa_regs(&self) -> usize {
        self.ssa_base_vregs.len()
    }

    pub fn sreg_to_vreg(&self, s_reg: i32) -> u32 {
        self.ssa_base_vregs[s_reg as usize]
    }

    /// Whether `s_reg` is the initial SSA name of a parameter vreg
    pub fn is_in_vreg(&self, s_reg: i32) -> bool {
        let first_in = self.first_in_vreg() as i32;
        s_reg >= first_in && s_reg < first_in + self.num_ins as i32
    }

    pub fn dfs_order(&self) -> &[BlockId] {
        &self.dfs_order
    }

    pub fn topological_order(&self) -> &[BlockId] {
        &self.topological_order
    }

    pub fn topological_order_indexes(&self) -> &[u16] {
        &self.topological_order_indexes
    }

    pub fn topological_index(&self, bb: BlockId) -> u16 {
        self.topological_order_indexes[bb.index()]
    }

    pub fn loop_ends(&self) -> &[u16] {
        &self.loop_ends
    }

    pub fn compilation_unit(&self) -> CompilationUnit {
        self.cu
    }

    pub fn dex_files(&self) -> &DexFileSet {
        &self.dex_files
    }

    /// The dex file the method being compiled comes from
    pub fn dex_file(&self) -> Result<&DexFile, DexFileError> {
        self.dex_files.get(self.cu.method.dex_file)
    }

    /// `Lpkg/Cls;.name` of the method being compiled
    pub fn pretty_method(&self) -> String {
        match self.dex_file() {
            Ok(dex) => dex.pretty_method(self.cu.method.method_idx),
            Err(_) => format!("<method {}>", self.cu.method.method_idx),
        }
    }

    pub fn ifield_lowering_infos(&self) -> &[FieldLoweringInfo] {
        &self.ifield_lowering_infos
    }

    pub fn sfield_lowering_infos(&self) -> &[FieldLoweringInfo] {
        &self.sfield_lowering_infos
    }

    pub fn method_lowering_infos(&self) -> &[MethodLoweringInfo] {
        &self.method_lowering_infos
    }

    pub fn has_check_cast(&self) -> bool {
        self.blocks
            .iter()
            .flat_map(|bb| bb.mirs.iter())
            .any(|mir| mir.opcode == super::Opcode::CheckCast)
    }

    /// Follow `mir` to the `move-result*` that consumes its result, looking
    /// through pseudo instructions and into a fall-through successor that has
    /// no other predecessor.
    pub fn find_move_result(&self, id: MirId) -> Option<MirId> {
        let mut cursor = self.advance_mir(id);
        while let Some(next) = cursor {
            let opcode = self.mir(next).opcode;
            if opcode.is_move_result() {
                return Some(next);
            }
            if !opcode.is_pseudo() {
                return None;
            }
            cursor = self.advance_mir(next);
        }
        None
    }

    fn advance_mir(&self, id: MirId) -> Option<MirId> {
        let mut block = self.block(id.block);
        let mut index = id.index as usize + 1;
        while index >= block.mirs.len() {
            let next = block.fall_through.map(|ft| self.block(ft))?;
            if next.predecessors.len() != 1 {
                return None;
            }
            block = next;
            index = 0;
        }
        Some(MirId {
            block: block.id,
            index: index as u32,
        })
    }

    /// Predecessor of `bb` with the smallest topological index. Only
    /// meaningful for reachable non-entry blocks, which always have a
    /// predecessor ordered before them.
    pub fn find_topologically_earliest_predecessor(&self, bb: BlockId) -> Option<BlockId> {
        let block = self.block(bb);
        let own_idx = self.topological_index(bb);
        let best = block
            .predecessors
            .iter()
            .copied()
            .min_by_key(|&pred| self.topological_index(pred))?;
        debug_assert!(self.topological_index(best) < own_idx);
        Some(best)
    }

    pub fn reg_locations(&self) -> &[RegLocation] {
        &self.reg_locations
    }

    pub fn reg_location_mut(&mut self, s_reg: usize) -> &mut RegLocation {
        &mut self.reg_locations[s_reg]
    }

    /// Abandon native compilation of this method
    pub fn punt_to_interpreter(&mut self) {
        self.punt_to_interpreter = true;
    }

    pub fn punted_to_interpreter(&self) -> bool {
        self.punt_to_interpreter
    }

    pub fn disable_opt(&self) -> OptimizationFlags {
        self.disable_opt
    }

    pub fn disable_optimization(&mut self, flags: OptimizationFlags) {
        self.disable_opt |= flags;
    }
}
