use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Bfs;

// BFS traversal of the segment graph
// Returns node ids in the order they were visited: every parent node is
// visited before its children
pub(super) fn bfs(graph: &DiGraphMap<usize, ()>, start: usize) -> Vec<usize> {
    let mut bfs = Bfs::new(graph, start);
    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(node) = bfs.next(graph) {
        order.push(node);
    }
    order
}

// Reverse BFS: every child is visited before its parent
pub(super) fn post_order(bfs: &[usize]) -> impl Iterator<Item = usize> + '_ {
    bfs.iter().rev().copied()
}
