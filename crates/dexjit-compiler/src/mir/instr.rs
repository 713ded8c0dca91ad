//! MIR instructions and their SSA operands

use bitflags::bitflags;

use super::dataflow::DataFlowAttrs;
use super::graph::BlockId;
use super::opcode::Opcode;

/// Sentinel for "no SSA register"
pub const INVALID_SREG: i32 = -1;

bitflags! {
    /// Per-instruction optimization flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MirFlags: u32 {
        const IGNORE_NULL_CHECK = 1 << 0;
        const IGNORE_RANGE_CHECK = 1 << 1;
        /// Instruction was inlined from a callee and stands for its return value
        const CALLEE = 1 << 2;
        /// Instruction was eliminated by an earlier pass
        const NOP = 1 << 3;
    }
}

/// Position of an instruction inside the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MirId {
    pub block: BlockId,
    pub index: u32,
}

/// Which lowering-info table an instruction indexes, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirMeta {
    #[default]
    None,
    IField(u32),
    SField(u32),
    Method(u32),
}

impl MirMeta {
    pub fn ifield_lowering_info(self) -> Option<usize> {
        match self {
            MirMeta::IField(idx) => Some(idx as usize),
            _ => None,
        }
    }

    pub fn sfield_lowering_info(self) -> Option<usize> {
        match self {
            MirMeta::SField(idx) => Some(idx as usize),
            _ => None,
        }
    }

    pub fn method_lowering_info(self) -> Option<usize> {
        match self {
            MirMeta::Method(idx) => Some(idx as usize),
            _ => None,
        }
    }
}

/// SSA operands of an instruction: uses in A, B, C order (wide operands take two
/// consecutive entries), defs likewise. For a `Phi` there is one use per
/// predecessor, in predecessor order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SsaRepresentation {
    pub uses: Vec<i32>,
    pub defs: Vec<i32>,
}

impl SsaRepresentation {
    pub fn new(uses: Vec<i32>, defs: Vec<i32>) -> Self {
        SsaRepresentation { uses, defs }
    }

    pub fn num_uses(&self) -> usize {
        self.uses.len()
    }

    pub fn num_defs(&self) -> usize {
        self.defs.len()
    }
}

/// One MIR instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Mir {
    pub opcode: Opcode,
    pub v_a: u32,
    pub v_b: u32,
    pub v_c: u32,
    /// Dex pc of the instruction
    pub offset: u32,
    pub optimization_flags: MirFlags,
    pub meta: MirMeta,
    pub ssa_rep: Option<SsaRepresentation>,
}

impl Mir {
    /// Create an instruction with no operands
    pub fn new(opcode: Opcode) -> Self {
        Mir {
            opcode,
            v_a: 0,
            v_b: 0,
            v_c: 0,
            offset: 0,
            optimization_flags: MirFlags::empty(),
            meta: MirMeta::None,
            ssa_rep: None,
        }
    }

    pub fn with_operands(mut self, v_a: u32, v_b: u32, v_c: u32) -> Self {
        self.v_a = v_a;
        self.v_b = v_b;
        self.v_c = v_c;
        self
    }

    pub fn with_ssa(mut self, uses: &[i32], defs: &[i32]) -> Self {
        self.ssa_rep = Some(SsaRepresentation::new(uses.to_vec(), defs.to_vec()));
        self
    }

    pub fn with_meta(mut self, meta: MirMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_flags(mut self, flags: MirFlags) -> Self {
        self.optimization_flags |= flags;
        self
    }

    pub fn at_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn data_flow_attrs(&self) -> DataFlowAttrs {
        self.opcode.data_flow_attrs()
    }

    pub fn uses(&self) -> &[i32] {
        self.ssa_rep.as_ref().map_or(&[], |ssa| ssa.uses.as_slice())
    }

    pub fn defs(&self) -> &[i32] {
        self.ssa_rep.as_ref().map_or(&[], |ssa| ssa.defs.as_slice())
    }

    pub fn is_callee(&self) -> bool {
        self.optimization_flags.contains(MirFlags::CALLEE)
    }
}
