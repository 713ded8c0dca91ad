//! Graph analyses the SSA builder runs before handing a graph to the optimizer:
//! DFS orders, dominators and dominance frontiers, a loop-aware topological
//! order, vreg liveness and the per-block exit SSA maps.

use std::collections::BTreeSet;

use crate::bit_vector::BitVector;

use super::graph::{BasicBlock, BlockId};

/// Pre-order and post-order of the blocks reachable from `entry`
#[derive(Debug, Clone, Default)]
pub struct DfsOrders {
    pub pre_order: Vec<BlockId>,
    pub post_order: Vec<BlockId>,
}

impl DfsOrders {
    pub fn is_reachable(&self, bb: BlockId) -> bool {
        self.pre_order.contains(&bb)
    }
}

/// Fill every block's predecessor list from the successor lists
pub fn compute_predecessors(blocks: &mut [BasicBlock]) {
    for block in blocks.iter_mut() {
        block.predecessors.clear();
    }
    let edges: Vec<(BlockId, BlockId)> = blocks
        .iter()
        .flat_map(|b| b.successors.iter().map(move |&s| (b.id, s)))
        .collect();
    for (from, to) in edges {
        let preds = &mut blocks[to.index()].predecessors;
        if !preds.contains(&from) {
            preds.push(from);
        }
    }
}

/// Iterative depth-first walk in successor order
pub fn compute_dfs_orders(blocks: &[BasicBlock], entry: BlockId) -> DfsOrders {
    let mut visited = vec![false; blocks.len()];
    let mut orders = DfsOrders::default();
    // (block, next successor position)
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited[entry.index()] = true;
    orders.pre_order.push(entry);

    while let Some(top) = stack.last_mut() {
        let (bb, pos) = *top;
        match blocks[bb.index()].successors.get(pos) {
            Some(&succ) => {
                top.1 += 1;
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    orders.pre_order.push(succ);
                    stack.push((succ, 0));
                }
            }
            None => {
                orders.post_order.push(bb);
                stack.pop();
            }
        }
    }
    orders
}

/// Immediate dominators (Cooper, Harvey and Kennedy). The entry dominates
/// itself; unreachable blocks get `None`.
pub fn compute_dominators(
    blocks: &[BasicBlock],
    entry: BlockId,
    orders: &DfsOrders,
) -> Vec<Option<BlockId>> {
    let mut rpo_number = vec![usize::MAX; blocks.len()];
    let rpo: Vec<BlockId> = orders.post_order.iter().rev().copied().collect();
    for (i, bb) in rpo.iter().enumerate() {
        rpo_number[bb.index()] = i;
    }

    let mut idom: Vec<Option<BlockId>> = vec![None; blocks.len()];
    idom[entry.index()] = Some(entry);

    let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| -> BlockId {
        while a != b {
            while rpo_number[a.index()] > rpo_number[b.index()] {
                a = idom[a.index()].unwrap_or(entry);
            }
            while rpo_number[b.index()] > rpo_number[a.index()] {
                b = idom[b.index()].unwrap_or(entry);
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &bb in rpo.iter().skip(1) {
            let mut new_idom: Option<BlockId> = None;
            for &pred in &blocks[bb.index()].predecessors {
                if idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, pred, current),
                });
            }
            if new_idom.is_some() && idom[bb.index()] != new_idom {
                idom[bb.index()] = new_idom;
                changed = true;
            }
        }
    }
    idom
}

/// Whether `a` dominates `b`
pub fn dominates(idom: &[Option<BlockId>], a: BlockId, mut b: BlockId) -> bool {
    loop {
        if a == b {
            return true;
        }
        match idom[b.index()] {
            Some(parent) if parent != b => b = parent,
            _ => return false,
        }
    }
}

/// Set `dom_frontier` on every reachable block
pub fn compute_dominance_frontiers(blocks: &mut [BasicBlock], idom: &[Option<BlockId>]) {
    let num_blocks = blocks.len();
    let mut frontiers: Vec<Option<BitVector>> = (0..num_blocks)
        .map(|i| idom[i].map(|_| BitVector::new(num_blocks)))
        .collect();

    for block in blocks.iter() {
        let Some(block_idom) = idom[block.id.index()] else {
            continue;
        };
        let reachable_preds: Vec<BlockId> = block
            .predecessors
            .iter()
            .copied()
            .filter(|p| idom[p.index()].is_some())
            .collect();
        if reachable_preds.len() < 2 {
            continue;
        }
        for pred in reachable_preds {
            let mut runner = pred;
            while runner != block_idom {
                if let Some(df) = frontiers[runner.index()].as_mut() {
                    df.set(block.id.index());
                }
                match idom[runner.index()] {
                    Some(next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }

    for (block, df) in blocks.iter_mut().zip(frontiers) {
        block.dom_frontier = df;
    }
}

/// Topological order with loop information
#[derive(Debug, Clone, Default)]
pub struct TopologicalOrder {
    pub order: Vec<BlockId>,
    /// By block id; `u16::MAX` for unreachable blocks
    pub indexes: Vec<u16>,
    /// By topological index; one past the loop body for loop heads, else 0
    pub loop_ends: Vec<u16>,
}

/// Natural loop of every loop head, keyed by head. A back edge is an edge
/// whose target dominates its source.
pub fn find_natural_loops(
    blocks: &[BasicBlock],
    idom: &[Option<BlockId>],
) -> Vec<(BlockId, BitVector)> {
    let mut loops: Vec<(BlockId, BitVector)> = Vec::new();
    for block in blocks {
        if idom[block.id.index()].is_none() {
            continue;
        }
        for &pred in &block.predecessors {
            if idom[pred.index()].is_none() || !dominates(idom, block.id, pred) {
                continue;
            }
            let pos = match loops.iter().position(|(h, _)| *h == block.id) {
                Some(pos) => pos,
                None => {
                    let mut body = BitVector::new(blocks.len());
                    body.set(block.id.index());
                    loops.push((block.id, body));
                    loops.len() - 1
                }
            };
            let body = &mut loops[pos].1;
            let mut worklist = vec![pred];
            while let Some(bb) = worklist.pop() {
                if body.set(bb.index()) {
                    worklist.extend(
                        blocks[bb.index()]
                            .predecessors
                            .iter()
                            .copied()
                            .filter(|p| idom[p.index()].is_some()),
                    );
                }
            }
        }
    }
    loops
}

/// Topologically sort the reachable blocks, ignoring back edges, such that
/// every natural loop body is contiguous and starts with its head.
pub fn compute_topological_order(
    blocks: &[BasicBlock],
    entry: BlockId,
    idom: &[Option<BlockId>],
) -> TopologicalOrder {
    let loops = find_natural_loops(blocks, idom);
    let loop_of = |bb: BlockId| loops.iter().find(|(h, _)| *h == bb).map(|(_, body)| body);
    let is_back_edge = |from: BlockId, to: BlockId| dominates(idom, to, from);

    let reachable: Vec<bool> = idom.iter().map(Option::is_some).collect();
    let num_reachable = reachable.iter().filter(|&&r| r).count();

    let mut in_degree = vec![0usize; blocks.len()];
    for block in blocks.iter().filter(|b| reachable[b.id.index()]) {
        for &succ in &block.successors {
            if !is_back_edge(block.id, succ) {
                in_degree[succ.index()] += 1;
            }
        }
    }

    let mut result = TopologicalOrder {
        order: Vec::with_capacity(num_reachable),
        indexes: vec![u16::MAX; blocks.len()],
        loop_ends: Vec::with_capacity(num_reachable),
    };
    let mut emitted = BitVector::new(blocks.len());
    let mut ready: BTreeSet<BlockId> = BTreeSet::new();
    let mut open_loops: Vec<BlockId> = Vec::new();
    ready.insert(entry);

    while result.order.len() < num_reachable {
        while let Some(&head) = open_loops.last() {
            let finished = loop_of(head)
                .is_none_or(|body| body.indexes().all(|b| emitted.is_set(b)));
            if !finished {
                break;
            }
            open_loops.pop();
            let head_idx = result.indexes[head.index()] as usize;
            result.loop_ends[head_idx] = result.order.len() as u16;
        }

        let in_innermost = |bb: &BlockId| match open_loops.last().and_then(|&h| loop_of(h)) {
            Some(body) => body.is_set(bb.index()),
            None => true,
        };
        let Some(next) = ready
            .iter()
            .copied()
            .find(in_innermost)
            .or_else(|| ready.iter().next().copied())
        else {
            // Only irreducible leftovers; nothing more can be ordered.
            break;
        };
        ready.remove(&next);

        result.indexes[next.index()] = result.order.len() as u16;
        result.order.push(next);
        result.loop_ends.push(0);
        emitted.set(next.index());
        if loop_of(next).is_some() {
            open_loops.push(next);
        }

        for &succ in &blocks[next.index()].successors {
            if is_back_edge(next, succ) {
                continue;
            }
            in_degree[succ.index()] -= 1;
            if in_degree[succ.index()] == 0 {
                ready.insert(succ);
            }
        }
    }

    while let Some(head) = open_loops.pop() {
        let head_idx = result.indexes[head.index()] as usize;
        result.loop_ends[head_idx] = result.order.len() as u16;
    }
    result
}

/// Global vreg liveness. Phis are ignored so the result matches liveness of
/// the code before SSA renaming. Unreachable blocks get an empty set.
pub fn compute_vreg_liveness(
    blocks: &[BasicBlock],
    reachable: &[bool],
    ssa_base_vregs: &[u32],
    num_vregs: usize,
) -> Vec<BitVector> {
    let mut use_sets = Vec::with_capacity(blocks.len());
    let mut def_sets = Vec::with_capacity(blocks.len());
    for block in blocks {
        let mut use_set = BitVector::new(num_vregs);
        let mut def_set = BitVector::new(num_vregs);
        for mir in block.mirs.iter().filter(|m| !m.opcode.is_pseudo()) {
            for &s_reg in mir.uses() {
                let v_reg = ssa_base_vregs[s_reg as usize] as usize;
                if !def_set.is_set(v_reg) {
                    use_set.set(v_reg);
                }
            }
            for &s_reg in mir.defs() {
                def_set.set(ssa_base_vregs[s_reg as usize] as usize);
            }
        }
        use_sets.push(use_set);
        def_sets.push(def_set);
    }

    let mut live_in: Vec<BitVector> = use_sets.clone();
    let mut changed = true;
    while changed {
        changed = false;
        for block in blocks.iter().rev() {
            let idx = block.id.index();
            if !reachable[idx] {
                continue;
            }
            let mut out = BitVector::new(num_vregs);
            for succ in &block.successors {
                out.union_with(&live_in[succ.index()]);
            }
            out.subtract(&def_sets[idx]);
            changed |= live_in[idx].union_with(&out);
        }
    }
    for (idx, set) in live_in.iter_mut().enumerate() {
        if !reachable[idx] {
            set.clear_all();
        }
    }
    live_in
}

/// SSA name of every vreg at the end of each reachable block. Blocks are
/// visited in topological order and start from the exit map of their earliest
/// predecessor; the entry block maps each vreg to its initial SSA name.
pub fn compute_exit_maps(
    blocks: &[BasicBlock],
    topo: &TopologicalOrder,
    ssa_base_vregs: &[u32],
    num_vregs: usize,
) -> Vec<Option<Vec<i32>>> {
    let mut exit_maps: Vec<Option<Vec<i32>>> = vec![None; blocks.len()];
    for (pos, &bb) in topo.order.iter().enumerate() {
        let block = &blocks[bb.index()];
        let mut map = if pos == 0 {
            (0..num_vregs as i32).collect::<Vec<_>>()
        } else {
            block
                .predecessors
                .iter()
                .filter(|p| topo.indexes[p.index()] != u16::MAX)
                .min_by_key(|p| topo.indexes[p.index()])
                .and_then(|p| exit_maps[p.index()].clone())
                .unwrap_or_else(|| (0..num_vregs as i32).collect())
        };
        for mir in &block.mirs {
            for &def in mir.defs() {
                map[ssa_base_vregs[def as usize] as usize] = def;
            }
        }
        exit_maps[bb.index()] = Some(map);
    }
    exit_maps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::graph::BlockType;

    fn blocks_from_edges(n: usize, edges: &[(u32, u32)]) -> Vec<BasicBlock> {
        let mut blocks: Vec<BasicBlock> = (0..n)
            .map(|i| BasicBlock::new(BlockId(i as u32), BlockType::Dalvik))
            .collect();
        for &(from, to) in edges {
            blocks[from as usize].successors.push(BlockId(to));
        }
        compute_predecessors(&mut blocks);
        blocks
    }

    #[test]
    fn test_diamond_dominators_and_frontiers() {
        // 0 -> 1 -> {2, 3} -> 4
        let mut blocks = blocks_from_edges(5, &[(0, 1), (1, 2), (1, 3), (2, 4), (3, 4)]);
        let orders = compute_dfs_orders(&blocks, BlockId(0));
        let idom = compute_dominators(&blocks, BlockId(0), &orders);
        assert_eq!(idom[4], Some(BlockId(1)));
        assert_eq!(idom[2], Some(BlockId(1)));
        compute_dominance_frontiers(&mut blocks, &idom);
        let df2 = blocks[2].dom_frontier.as_ref().unwrap();
        assert_eq!(df2.indexes().collect::<Vec<_>>(), vec![4]);
        assert!(blocks[1].dom_frontier.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_loop_body_is_contiguous() {
        // 0 -> 1 (head) -> 2 -> 3 -> 1 ; 1 -> 4 (exit)
        let blocks = blocks_from_edges(5, &[(0, 1), (1, 4), (1, 2), (2, 3), (3, 1)]);
        let orders = compute_dfs_orders(&blocks, BlockId(0));
        let idom = compute_dominators(&blocks, BlockId(0), &orders);
        let topo = compute_topological_order(&blocks, BlockId(0), &idom);
        let order: Vec<u32> = topo.order.iter().map(|b| b.0).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(topo.loop_ends, vec![0, 4, 0, 0, 0]);
    }

    #[test]
    fn test_self_loop_and_unreachable_block() {
        let blocks = blocks_from_edges(4, &[(0, 1), (1, 1), (1, 2)]);
        let orders = compute_dfs_orders(&blocks, BlockId(0));
        assert!(!orders.is_reachable(BlockId(3)));
        let idom = compute_dominators(&blocks, BlockId(0), &orders);
        assert_eq!(idom[3], None);
        let topo = compute_topological_order(&blocks, BlockId(0), &idom);
        assert_eq!(topo.order.len(), 3);
        assert_eq!(topo.indexes[3], u16::MAX);
        assert_eq!(topo.loop_ends[1], 2);
    }

    #[test]
    fn test_nested_loops_end_in_order() {
        // 0 -> 1 (outer) -> 2 (inner) -> 3 -> 2 ; 3 -> 4 -> 1 ; 1 -> 5
        let blocks = blocks_from_edges(
            6,
            &[(0, 1), (1, 2), (1, 5), (2, 3), (3, 2), (3, 4), (4, 1)],
        );
        let orders = compute_dfs_orders(&blocks, BlockId(0));
        let idom = compute_dominators(&blocks, BlockId(0), &orders);
        let topo = compute_topological_order(&blocks, BlockId(0), &idom);
        let order: Vec<u32> = topo.order.iter().map(|b| b.0).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(topo.loop_ends[1], 5);
        assert_eq!(topo.loop_ends[2], 4);
    }
}
