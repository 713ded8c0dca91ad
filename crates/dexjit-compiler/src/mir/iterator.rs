//! Block iteration orders over a [`MirGraph`]

use crate::bit_vector::BitVector;

use super::graph::{BlockId, MirGraph};

/// Reachable blocks in depth-first pre-order
pub struct PreOrderDfsIterator<'g> {
    order: std::slice::Iter<'g, BlockId>,
}

impl<'g> PreOrderDfsIterator<'g> {
    pub fn new(graph: &'g MirGraph) -> Self {
        PreOrderDfsIterator {
            order: graph.dfs_order().iter(),
        }
    }
}

impl Iterator for PreOrderDfsIterator<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        self.order.next().copied()
    }
}

/// Reachable blocks in topological order, each exactly once
pub struct TopologicalSortIterator<'g> {
    order: std::slice::Iter<'g, BlockId>,
}

impl<'g> TopologicalSortIterator<'g> {
    pub fn new(graph: &'g MirGraph) -> Self {
        TopologicalSortIterator {
            order: graph.topological_order().iter(),
        }
    }
}

impl Iterator for TopologicalSortIterator<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        self.order.next().copied()
    }
}

/// Topological order repeated as a whole until a full pass reports no change
#[derive(Debug)]
pub struct RepeatingTopologicalSortIterator {
    idx: usize,
    end_idx: usize,
    changed: bool,
    repeats: usize,
}

impl RepeatingTopologicalSortIterator {
    pub fn new(graph: &MirGraph) -> Self {
        RepeatingTopologicalSortIterator {
            idx: 0,
            end_idx: graph.topological_order().len(),
            changed: false,
            repeats: 0,
        }
    }

    /// Completed passes after the first
    pub fn repeats(&self) -> usize {
        self.repeats
    }

    /// Next block to process; `had_change` refers to the block returned by
    /// the previous call
    pub fn next(&mut self, graph: &MirGraph, had_change: bool) -> Option<BlockId> {
        self.changed |= had_change;
        if self.idx == self.end_idx {
            if !self.changed || self.end_idx == 0 {
                return None;
            }
            self.changed = false;
            self.idx = 0;
            self.repeats += 1;
        }
        let bb = graph.topological_order()[self.idx];
        self.idx += 1;
        Some(bb)
    }
}

/// Topological order that repeats a loop body until no block in it changes.
///
/// The caller reports after each block whether processing it changed
/// anything; a change invalidates the block's successors. When the walk
/// reaches the end of a loop, the loop is walked again from its head unless
/// the head was already recalculated and nothing invalidated it since.
///
/// The iterator does not borrow the graph so the caller can keep mutable
/// state alongside it; pass the same graph to every call.
#[derive(Debug)]
pub struct LoopRepeatingTopologicalSortIterator {
    idx: usize,
    end_idx: usize,
    visited: BitVector,
    /// (topological index of the loop head, recalculating)
    loop_head_stack: Vec<(u16, bool)>,
}

impl LoopRepeatingTopologicalSortIterator {
    pub fn new(graph: &MirGraph) -> Self {
        LoopRepeatingTopologicalSortIterator {
            idx: 0,
            end_idx: graph.topological_order().len(),
            visited: BitVector::new(graph.num_blocks()),
            loop_head_stack: Vec::new(),
        }
    }

    /// Innermost loop being walked: its head's topological index and whether
    /// this is a repeated walk
    pub fn loop_head(&self) -> Option<(u16, bool)> {
        self.loop_head_stack.last().copied()
    }

    pub fn loop_head_stack(&self) -> &[(u16, bool)] {
        &self.loop_head_stack
    }

    /// Next block to process; `had_change` refers to the block returned by
    /// the previous call and is ignored on the first call
    pub fn next(&mut self, graph: &MirGraph, had_change: bool) -> Option<BlockId> {
        let order = graph.topological_order();
        let loop_ends = graph.loop_ends();

        if self.idx != 0 {
            let last = order[self.idx - 1];
            self.visited.set(last.index());
            if had_change {
                for succ in &graph.block(last).successors {
                    self.visited.clear(succ.index());
                }
            }
        }

        loop {
            while let Some(&(head_idx, recalculated)) = self.loop_head_stack.last() {
                if loop_ends[head_idx as usize] as usize != self.idx {
                    break;
                }
                self.loop_head_stack.pop();
                let head = order[head_idx as usize];
                if !recalculated || !self.visited.is_set(head.index()) {
                    self.loop_head_stack.push((head_idx, true));
                    self.idx = head_idx as usize + 1;
                    return Some(head);
                }
            }

            if self.idx == self.end_idx {
                return None;
            }

            let idx = self.idx;
            self.idx += 1;
            let bb = order[idx];
            if !self.visited.is_set(bb.index()) {
                if loop_ends[idx] != 0 {
                    self.loop_head_stack.push((idx as u16, false));
                }
                return Some(bb);
            }
        }
    }
}
