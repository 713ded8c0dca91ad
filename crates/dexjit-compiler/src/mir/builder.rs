//! Construction of SSA-form [`MirGraph`]s
//!
//! The builder takes blocks, edges and already-renamed instructions, then
//! derives everything later passes read: predecessors, dominance frontiers,
//! the loop-aware topological order, vreg liveness and the exit SSA maps.
//!
//! SSA registers `0..num_vregs` are the initial names of the vregs (the method
//! parameters among them); further registers are allocated with
//! [`MirGraphBuilder::new_sreg`].

use std::sync::Arc;

use tracing::debug;

use crate::dex::{DexFileSet, FieldLoweringInfo, MethodLoweringInfo};

use super::analysis;
use super::dataflow::DataFlowAttrs;
use super::graph::{
    BasicBlock, BlockId, BlockType, CompilationUnit, DataFlowInfo, MirGraph, OptimizationFlags,
    RegLocation,
};
use super::instr::{Mir, MirId, MirMeta};
use super::opcode::Opcode;

/// Malformed graph input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Method has {num_ins} ins but only {num_vregs} vregs")]
    TooManyIns { num_ins: u32, num_vregs: u32 },
    #[error("Unknown block {0}")]
    UnknownBlock(BlockId),
    #[error("Too many blocks ({0}) for 16-bit topological indexes")]
    TooManyBlocks(usize),
    #[error("Vreg v{vreg} out of range in new SSA register")]
    VregOutOfRange { vreg: u32 },
    #[error("Instruction {block}:{index} uses undefined SSA register {s_reg}")]
    UnknownSReg { block: BlockId, index: u32, s_reg: i32 },
    #[error("SSA register {s_reg} defined more than once")]
    DuplicateDef { s_reg: i32 },
    #[error("{opcode} at {block}:{index} has {defs} defs and {uses} uses")]
    OperandCount {
        block: BlockId,
        index: u32,
        opcode: Opcode,
        defs: usize,
        uses: usize,
    },
    #[error("Phi at {block}:{index} has {uses} inputs but the block has {preds} predecessors")]
    PhiArity {
        block: BlockId,
        index: u32,
        uses: usize,
        preds: usize,
    },
    #[error("Instruction {block}:{index} refers to missing lowering info {meta:?}")]
    UnknownLoweringInfo {
        block: BlockId,
        index: u32,
        meta: MirMeta,
    },
}

/// Builds one method's [`MirGraph`]
pub struct MirGraphBuilder {
    blocks: Vec<BasicBlock>,
    num_vregs: u32,
    num_ins: u32,
    ssa_base_vregs: Vec<u32>,
    dex_files: Arc<DexFileSet>,
    cu: CompilationUnit,
    ifield_lowering_infos: Vec<FieldLoweringInfo>,
    sfield_lowering_infos: Vec<FieldLoweringInfo>,
    method_lowering_infos: Vec<MethodLoweringInfo>,
}

impl MirGraphBuilder {
    /// Start a graph with an entry block (`bb0`) and an exit block (`bb1`)
    pub fn new(
        num_vregs: u32,
        num_ins: u32,
        dex_files: Arc<DexFileSet>,
        cu: CompilationUnit,
    ) -> Self {
        MirGraphBuilder {
            blocks: vec![
                BasicBlock::new(BlockId(0), BlockType::Entry),
                BasicBlock::new(BlockId(1), BlockType::Exit),
            ],
            num_vregs,
            num_ins,
            ssa_base_vregs: (0..num_vregs).collect(),
            dex_files,
            cu,
            ifield_lowering_infos: Vec::new(),
            sfield_lowering_infos: Vec::new(),
            method_lowering_infos: Vec::new(),
        }
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn exit_block(&self) -> BlockId {
        BlockId(1)
    }

    /// Add an empty code block
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, BlockType::Dalvik));
        id
    }

    /// Add a control-flow edge. Successor order is kept.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> &mut Self {
        let succs = &mut self.blocks[from.index()].successors;
        if !succs.contains(&to) {
            succs.push(to);
        }
        self
    }

    /// Add the edge taken when `from` runs off its end
    pub fn set_fall_through(&mut self, from: BlockId, to: BlockId) -> &mut Self {
        self.add_edge(from, to);
        self.blocks[from.index()].fall_through = Some(to);
        self
    }

    /// Append an instruction to `bb`
    pub fn push(&mut self, bb: BlockId, mir: Mir) -> MirId {
        let mirs = &mut self.blocks[bb.index()].mirs;
        mirs.push(mir);
        MirId {
            block: bb,
            index: (mirs.len() - 1) as u32,
        }
    }

    /// Allocate a fresh SSA name for `vreg`
    pub fn new_sreg(&mut self, vreg: u32) -> i32 {
        self.ssa_base_vregs.push(vreg);
        (self.ssa_base_vregs.len() - 1) as i32
    }

    pub fn add_ifield(&mut self, info: FieldLoweringInfo) -> MirMeta {
        self.ifield_lowering_infos.push(info);
        MirMeta::IField((self.ifield_lowering_infos.len() - 1) as u32)
    }

    pub fn add_sfield(&mut self, info: FieldLoweringInfo) -> MirMeta {
        self.sfield_lowering_infos.push(info);
        MirMeta::SField((self.sfield_lowering_infos.len() - 1) as u32)
    }

    pub fn add_method(&mut self, info: MethodLoweringInfo) -> MirMeta {
        self.method_lowering_infos.push(info);
        MirMeta::Method((self.method_lowering_infos.len() - 1) as u32)
    }

    /// Validate the input and compute the derived analyses
    pub fn build(self) -> Result<MirGraph, GraphError> {
        let MirGraphBuilder {
            mut blocks,
            num_vregs,
            num_ins,
            ssa_base_vregs,
            dex_files,
            cu,
            ifield_lowering_infos,
            sfield_lowering_infos,
            method_lowering_infos,
        } = self;

        if num_ins > num_vregs {
            return Err(GraphError::TooManyIns {
                num_ins,
                num_vregs,
            });
        }
        if blocks.len() >= u16::MAX as usize {
            return Err(GraphError::TooManyBlocks(blocks.len()));
        }
        if let Some(&vreg) = ssa_base_vregs.iter().find(|&&v| v >= num_vregs) {
            return Err(GraphError::VregOutOfRange { vreg });
        }
        for block in &blocks {
            if let Some(bad) = block
                .successors
                .iter()
                .chain(block.fall_through.iter())
                .find(|s| s.index() >= blocks.len())
            {
                return Err(GraphError::UnknownBlock(*bad));
            }
        }

        analysis::compute_predecessors(&mut blocks);
        validate_instructions(
            &blocks,
            &ssa_base_vregs,
            num_vregs,
            ifield_lowering_infos.len(),
            sfield_lowering_infos.len(),
            method_lowering_infos.len(),
        )?;

        let entry = BlockId(0);
        let orders = analysis::compute_dfs_orders(&blocks, entry);
        let idom = analysis::compute_dominators(&blocks, entry, &orders);
        analysis::compute_dominance_frontiers(&mut blocks, &idom);
        let topo = analysis::compute_topological_order(&blocks, entry, &idom);

        let reachable: Vec<bool> = idom.iter().map(Option::is_some).collect();
        let live_ins =
            analysis::compute_vreg_liveness(&blocks, &reachable, &ssa_base_vregs, num_vregs as usize);
        let exit_maps =
            analysis::compute_exit_maps(&blocks, &topo, &ssa_base_vregs, num_vregs as usize);
        for ((block, live_in), exit_map) in blocks.iter_mut().zip(live_ins).zip(exit_maps) {
            block.data_flow_info = exit_map.map(|vreg_to_ssa_map_exit| DataFlowInfo {
                live_in_v: live_in,
                vreg_to_ssa_map_exit,
            });
        }

        let reg_locations = (0..ssa_base_vregs.len() as i32)
            .map(|s_reg| RegLocation {
                s_reg_low: s_reg,
                orig_sreg: s_reg,
                ..RegLocation::default()
            })
            .collect();

        debug!(
            blocks = blocks.len(),
            reachable = topo.order.len(),
            ssa_regs = ssa_base_vregs.len(),
            "built MIR graph"
        );

        Ok(MirGraph {
            blocks,
            entry,
            exit: BlockId(1),
            num_vregs,
            num_ins,
            ssa_base_vregs,
            dfs_order: orders.pre_order,
            topological_order: topo.order,
            topological_order_indexes: topo.indexes,
            loop_ends: topo.loop_ends,
            dex_files,
            cu,
            ifield_lowering_infos,
            sfield_lowering_infos,
            method_lowering_infos,
            reg_locations,
            punt_to_interpreter: false,
            disable_opt: OptimizationFlags::empty(),
        })
    }
}

fn validate_instructions(
    blocks: &[BasicBlock],
    ssa_base_vregs: &[u32],
    num_vregs: u32,
    num_ifields: usize,
    num_sfields: usize,
    num_methods: usize,
) -> Result<(), GraphError> {
    let num_sregs = ssa_base_vregs.len() as i32;
    let mut defined = vec![false; ssa_base_vregs.len()];
    for slot in defined.iter_mut().take(num_vregs as usize) {
        *slot = true;
    }

    for block in blocks {
        for (index, mir) in block.mirs.iter().enumerate() {
            let index = index as u32;
            for &s_reg in mir.uses().iter().chain(mir.defs()) {
                if s_reg < 0 || s_reg >= num_sregs {
                    return Err(GraphError::UnknownSReg {
                        block: block.id,
                        index,
                        s_reg,
                    });
                }
            }
            for &s_reg in mir.defs() {
                if std::mem::replace(&mut defined[s_reg as usize], true) {
                    return Err(GraphError::DuplicateDef { s_reg });
                }
            }
            if !operand_counts_match(mir) {
                return Err(GraphError::OperandCount {
                    block: block.id,
                    index,
                    opcode: mir.opcode,
                    defs: mir.defs().len(),
                    uses: mir.uses().len(),
                });
            }
            if mir.opcode == Opcode::Phi && mir.uses().len() != block.predecessors.len() {
                return Err(GraphError::PhiArity {
                    block: block.id,
                    index,
                    uses: mir.uses().len(),
                    preds: block.predecessors.len(),
                });
            }
            let in_range = match mir.meta {
                MirMeta::None => true,
                MirMeta::IField(idx) => (idx as usize) < num_ifields,
                MirMeta::SField(idx) => (idx as usize) < num_sfields,
                MirMeta::Method(idx) => (idx as usize) < num_methods,
            };
            if !in_range {
                return Err(GraphError::UnknownLoweringInfo {
                    block: block.id,
                    index,
                    meta: mir.meta,
                });
            }
        }
    }
    Ok(())
}

/// Whether the SSA operands agree with the opcode's operand shape. Invoke-like
/// opcodes take any number of uses; a phi takes one use per predecessor,
/// which is checked separately.
fn operand_counts_match(mir: &Mir) -> bool {
    let attrs = mir.data_flow_attrs();
    let expected_defs = match (attrs.contains(DataFlowAttrs::DA), attrs.contains(DataFlowAttrs::A_WIDE)) {
        (false, _) => 0,
        (true, false) => 1,
        (true, true) => 2,
    };
    if mir.defs().len() != expected_defs {
        return false;
    }
    if mir.opcode == Opcode::Phi
        || attrs.intersects(DataFlowAttrs::FORMAT_35C | DataFlowAttrs::FORMAT_3RC)
    {
        return true;
    }
    let width = |used: DataFlowAttrs, wide: DataFlowAttrs| match (attrs.contains(used), attrs.contains(wide)) {
        (false, _) => 0,
        (true, false) => 1,
        (true, true) => 2,
    };
    let expected_uses = width(DataFlowAttrs::UA, DataFlowAttrs::A_WIDE)
        + width(DataFlowAttrs::UB, DataFlowAttrs::B_WIDE)
        + width(DataFlowAttrs::UC, DataFlowAttrs::C_WIDE);
    mir.uses().len() == expected_uses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{DexFileId, MethodReference};

    fn new_builder(num_vregs: u32, num_ins: u32) -> MirGraphBuilder {
        let cu = CompilationUnit {
            method: MethodReference {
                dex_file: DexFileId(0),
                method_idx: 0,
            },
            is_static: true,
        };
        MirGraphBuilder::new(num_vregs, num_ins, Arc::new(DexFileSet::new()), cu)
    }

    #[test]
    fn test_diamond_exit_maps_and_liveness() {
        let mut b = new_builder(2, 0);
        let (head, left, right, join) = (b.add_block(), b.add_block(), b.add_block(), b.add_block());
        b.set_fall_through(b.entry_block(), head);
        b.add_edge(head, left).add_edge(head, right);
        b.set_fall_through(left, join);
        b.set_fall_through(right, join);

        let s_left = b.new_sreg(0);
        let s_right = b.new_sreg(0);
        let s_phi = b.new_sreg(0);
        b.push(head, Mir::new(Opcode::IfEqz).with_ssa(&[1], &[]));
        b.push(left, Mir::new(Opcode::Const4).with_ssa(&[], &[s_left]));
        b.push(right, Mir::new(Opcode::Const4).with_ssa(&[], &[s_right]));
        b.push(join, Mir::new(Opcode::Phi).with_ssa(&[s_left, s_right], &[s_phi]));
        b.push(join, Mir::new(Opcode::ReturnVoid));
        let graph = b.build().unwrap();

        let exit_of = |bb: BlockId| graph.block(bb).data_flow_info.as_ref().unwrap().vreg_to_ssa_map_exit.clone();
        assert_eq!(exit_of(left), vec![s_left, 1]);
        assert_eq!(exit_of(join), vec![s_phi, 1]);

        let head_live = &graph.block(head).data_flow_info.as_ref().unwrap().live_in_v;
        assert!(head_live.is_set(1));
        assert!(!head_live.is_set(0));
        assert!(graph.block(join).data_flow_info.as_ref().unwrap().live_in_v.is_empty());

        let df_left = graph.block(left).dom_frontier.as_ref().unwrap();
        assert!(df_left.is_set(join.index()));
        assert_eq!(graph.topological_order()[0], graph.entry_block());
        assert_eq!(graph.reg_locations().len(), 5);
        assert_eq!(graph.reg_locations()[4].orig_sreg, 4);
    }

    #[test]
    fn test_unreachable_block_has_no_data_flow_info() {
        let mut b = new_builder(1, 0);
        let body = b.add_block();
        let dead = b.add_block();
        b.set_fall_through(b.entry_block(), body);
        b.push(dead, Mir::new(Opcode::ReturnVoid));
        let graph = b.build().unwrap();
        assert!(graph.block(dead).data_flow_info.is_none());
        assert!(graph.block(body).data_flow_info.is_some());
        assert_eq!(graph.topological_order().len(), 2);
    }

    #[test]
    fn test_rejects_malformed_input() {
        let mut b = new_builder(1, 0);
        let body = b.add_block();
        b.set_fall_through(b.entry_block(), body);
        b.push(body, Mir::new(Opcode::Move).with_ssa(&[7], &[0]));
        assert_eq!(
            b.build().unwrap_err(),
            GraphError::UnknownSReg {
                block: body,
                index: 0,
                s_reg: 7
            }
        );

        let mut b = new_builder(1, 0);
        let body = b.add_block();
        b.set_fall_through(b.entry_block(), body);
        b.push(body, Mir::new(Opcode::Const4).with_ssa(&[], &[0]));
        assert_eq!(b.build().unwrap_err(), GraphError::DuplicateDef { s_reg: 0 });

        let b = new_builder(1, 2);
        assert!(matches!(b.build(), Err(GraphError::TooManyIns { .. })));
    }

    #[test]
    fn test_find_move_result_crosses_fall_through() {
        let mut b = new_builder(2, 0);
        let call = b.add_block();
        let next = b.add_block();
        b.set_fall_through(b.entry_block(), call);
        b.set_fall_through(call, next);
        let result = b.new_sreg(0);
        let invoke = b.push(call, Mir::new(Opcode::InvokeStatic));
        b.push(next, Mir::new(Opcode::MoveResult).with_ssa(&[], &[result]));
        let graph = b.build().unwrap();
        let found = graph.find_move_result(invoke).unwrap();
        assert_eq!(found, MirId { block: next, index: 0 });
    }
}
