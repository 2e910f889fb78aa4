//! The pending-path tree.
//!
//! Merges mutation paths recorded during a batch, drops any path subsumed by
//! an already-terminal ancestor, and enumerates the minimal terminal set in
//! shortest-first (breadth-first) order.

use std::collections::HashMap;
use syncmux_wire::path::{Path, PathSegment};

#[derive(Default)]
struct Node {
    terminal: bool,
    /// Set only when `terminal` becomes true; breaks BFS ties between
    /// terminals at the same depth by original insertion order.
    insertion_seq: Option<u64>,
    children: HashMap<PathSegment, Node>,
}

impl Node {
    fn is_empty(&self) -> bool {
        !self.terminal && self.children.is_empty()
    }
}

/// A prefix tree of path segments tracking which subtrees need republishing.
pub struct PathTree {
    root: Node,
    next_seq: u64,
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTree {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            next_seq: 0,
        }
    }

    /// Record `path` as needing republication. A no-op if an ancestor (or
    /// the path itself) is already terminal; prunes any descendant
    /// terminals the new path subsumes.
    pub fn add(&mut self, path: Path) {
        if self.root.terminal {
            return;
        }
        let mut node = &mut self.root;
        for segment in &path {
            if node.terminal {
                return;
            }
            node = node.children.entry(segment.clone()).or_default();
        }
        if node.terminal {
            return;
        }
        node.terminal = true;
        node.insertion_seq = Some(self.next_seq);
        self.next_seq += 1;
        node.children.clear();
    }

    /// The minimal set of terminal paths, shortest-first; paths at equal
    /// depth are ordered by insertion order.
    pub fn get_paths(&self) -> Vec<Path> {
        let mut found: Vec<(usize, u64, Path)> = Vec::new();
        let mut queue: std::collections::VecDeque<(Path, &Node)> =
            std::collections::VecDeque::new();
        queue.push_back((Vec::new(), &self.root));
        while let Some((prefix, node)) = queue.pop_front() {
            if node.terminal {
                found.push((
                    prefix.len(),
                    node.insertion_seq.unwrap_or(0),
                    prefix.clone(),
                ));
                continue;
            }
            for (segment, child) in &node.children {
                let mut next = prefix.clone();
                next.push(segment.clone());
                queue.push_back((next, child));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        found.into_iter().map(|(_, _, path)| path).collect()
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncmux_wire::path::PathSegment::{Index, Key};

    fn p(segs: &[&str]) -> Path {
        segs.iter().map(|s| Key((*s).to_owned())).collect()
    }

    #[test]
    fn empty_tree_has_no_paths() {
        let tree = PathTree::new();
        assert!(tree.is_empty());
        assert!(tree.get_paths().is_empty());
    }

    #[test]
    fn sibling_writes_are_both_reported() {
        let mut tree = PathTree::new();
        tree.add(p(&["a"]));
        tree.add(p(&["b"]));
        let mut paths = tree.get_paths();
        paths.sort_by_key(|p| format!("{p:?}"));
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn ancestor_terminal_subsumes_descendant_writes() {
        let mut tree = PathTree::new();
        tree.add(p(&["x", "y"]));
        tree.add(p(&["x"]));
        assert_eq!(tree.get_paths(), vec![p(&["x"])]);
    }

    #[test]
    fn adding_under_existing_terminal_prefix_is_a_no_op() {
        let mut tree = PathTree::new();
        tree.add(p(&["x"]));
        tree.add(p(&["x", "y"]));
        assert_eq!(tree.get_paths(), vec![p(&["x"])]);
    }

    #[test]
    fn empty_path_subsumes_everything_and_is_reported_once() {
        let mut tree = PathTree::new();
        tree.add(p(&["a"]));
        tree.add(vec![]);
        tree.add(p(&["b"]));
        assert_eq!(tree.get_paths(), vec![Vec::<PathSegment>::new()]);
    }

    #[test]
    fn get_paths_never_contains_a_proper_prefix_pair() {
        let mut tree = PathTree::new();
        tree.add(p(&["a", "b"]));
        tree.add(p(&["a", "c"]));
        tree.add(p(&["d"]));
        let paths = tree.get_paths();
        for i in 0..paths.len() {
            for j in 0..paths.len() {
                if i != j {
                    assert!(!syncmux_wire::path::is_proper_prefix(&paths[i], &paths[j]));
                }
            }
        }
    }

    #[test]
    fn enumeration_is_shortest_first_with_insertion_order_tiebreak() {
        let mut tree = PathTree::new();
        tree.add(p(&["zz"]));
        tree.add(p(&["aa"]));
        tree.add(p(&["m", "n"]));
        let paths = tree.get_paths();
        // both single-segment paths (any order among themselves is fine per
        // their own insertion order) must precede the two-segment path.
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], p(&["zz"]));
        assert_eq!(paths[1], p(&["aa"]));
        assert_eq!(paths[2], p(&["m", "n"]));
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut tree = PathTree::new();
        tree.add(p(&["a"]));
        tree.clear();
        assert!(tree.is_empty());
    }

    #[test]
    fn array_index_segments_are_supported() {
        let mut tree = PathTree::new();
        tree.add(vec![Key("items".to_owned()), Index(0)]);
        assert_eq!(
            tree.get_paths(),
            vec![vec![Key("items".to_owned()), Index(0)]]
        );
    }
}
