//! Pretty-printing for MIR
//!
//! Display implementations for debugging and dump output.

use std::fmt;

use super::graph::{BasicBlock, BlockType, MirGraph};
use super::instr::{Mir, MirMeta};

impl fmt::Display for MirGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "method {} (vregs: {}, ins: {}, sregs: {}) {{",
            self.pretty_method(),
            self.num_vregs(),
            self.num_ins(),
            self.num_ssa_regs()
        )?;

        for block in self.blocks() {
            write!(f, "{}", block)?;
        }

        writeln!(f, "}}")
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_type {
            BlockType::Entry => writeln!(f, "  {} (entry):", self.id)?,
            BlockType::Exit => writeln!(f, "  {} (exit):", self.id)?,
            BlockType::Dalvik => writeln!(f, "  {}:", self.id)?,
        }
        if !self.predecessors.is_empty() {
            write!(f, "    ; preds:")?;
            for pred in &self.predecessors {
                write!(f, " {}", pred)?;
            }
            writeln!(f)?;
        }

        for mir in &self.mirs {
            writeln!(f, "    {}", mir)?;
        }

        if !self.successors.is_empty() {
            write!(f, "    ; succs:")?;
            for succ in &self.successors {
                write!(f, " {}", succ)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Mir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.defs().is_empty() {
            format_sregs(f, self.defs())?;
            write!(f, " = ")?;
        }
        write!(f, "{}", self.opcode)?;
        if !self.uses().is_empty() {
            write!(f, " ")?;
            format_sregs(f, self.uses())?;
        }
        match self.meta {
            MirMeta::None => {}
            MirMeta::IField(idx) => write!(f, " ifield#{}", idx)?,
            MirMeta::SField(idx) => write!(f, " sfield#{}", idx)?,
            MirMeta::Method(idx) => write!(f, " method#{}", idx)?,
        }
        if self.is_callee() {
            write!(f, " [callee]")?;
        }
        Ok(())
    }
}

fn format_sregs(f: &mut fmt::Formatter<'_>, sregs: &[i32]) -> fmt::Result {
    for (i, s_reg) in sregs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "s{}", s_reg)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::mir::{Mir, MirFlags, MirMeta, Opcode};

    #[test]
    fn test_mir_display() {
        let mir = Mir::new(Opcode::Iget)
            .with_ssa(&[2], &[5])
            .with_meta(MirMeta::IField(1));
        assert_eq!(mir.to_string(), "s5 = iget s2 ifield#1");

        let wide = Mir::new(Opcode::AddLong).with_ssa(&[0, 1, 2, 3], &[4, 5]);
        assert_eq!(wide.to_string(), "s4, s5 = add-long s0, s1, s2, s3");

        let callee = Mir::new(Opcode::Const4)
            .with_ssa(&[], &[3])
            .with_flags(MirFlags::CALLEE);
        assert_eq!(callee.to_string(), "s3 = const/4 [callee]");
    }
}
